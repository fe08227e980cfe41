//! Minecraft core resolution: version JSON, game jar, libraries, natives and
//! assets, reduced to [`ArtifactRef`]s for the download pool.

use crate::error::{InstallError, InstallResult};
use crate::game::installer::core::artifact::{ArtifactRef, HashAlgorithm, HashCode};
use crate::game::installer::core::downloader::download_json;
use crate::game::installer::modloaders::LoaderContext;
use crate::game::installer::types::{Arch, OsType, Side};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

#[derive(Deserialize, Serialize, Debug)]
struct VersionManifest {
    versions: Vec<VersionEntry>,
}

#[derive(Deserialize, Serialize, Debug)]
struct VersionEntry {
    id: String,
    url: String,
    #[serde(default)]
    sha1: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub id: String,
    #[serde(default)]
    pub asset_index: Option<AssetIndex>,
    #[serde(default)]
    pub downloads: HashMap<String, Download>,
    #[serde(default)]
    pub libraries: Vec<Library>,
    pub main_class: String,
    #[serde(default)]
    pub minecraft_arguments: Option<String>,
    #[serde(default)]
    pub arguments: Option<serde_json::Value>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndex {
    pub id: String,
    pub url: String,
    pub sha1: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub total_size: Option<u64>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Download {
    pub url: String,
    pub sha1: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Library {
    pub name: String,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub natives: Option<HashMap<String, String>>,
    #[serde(default)]
    pub extract: Option<ExtractRules>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LibraryDownloads {
    #[serde(default)]
    pub artifact: Option<LibraryArtifact>,
    #[serde(default)]
    pub classifiers: Option<HashMap<String, LibraryArtifact>>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LibraryArtifact {
    pub url: String,
    pub sha1: String,
    #[serde(default)]
    pub size: Option<u64>,
    pub path: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Rule {
    pub action: String,
    #[serde(default)]
    pub os: Option<OsRule>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ExtractRules {
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
}

#[derive(Deserialize, Debug)]
struct AssetIndexFile {
    objects: HashMap<String, AssetObject>,
}

#[derive(Deserialize, Debug)]
struct AssetObject {
    hash: String,
    size: u64,
}

/// A natives jar plus what to leave out when unpacking it.
#[derive(Debug, Clone)]
pub struct NativeLibrary {
    pub artifact: ArtifactRef,
    pub exclude: Vec<String>,
}

/// Everything FETCHING_CORE downloads, grouped by kind.
#[derive(Debug, Clone, Default)]
pub struct CoreArtifacts {
    pub game_jar: Option<ArtifactRef>,
    pub libraries: Vec<ArtifactRef>,
    pub natives: Vec<NativeLibrary>,
    pub asset_index: Option<ArtifactRef>,
}

impl CoreArtifacts {
    /// Game jar, libraries, natives and the asset index, in that order.
    pub fn all(&self) -> Vec<ArtifactRef> {
        self.game_jar
            .iter()
            .cloned()
            .chain(self.libraries.iter().cloned())
            .chain(self.natives.iter().map(|n| n.artifact.clone()))
            .chain(self.asset_index.iter().cloned())
            .collect()
    }
}

/// Check if rules allow this library on `os`/`arch`. Later rules win.
pub fn check_rules(rules: &[Rule], os: OsType, arch: Arch) -> bool {
    if rules.is_empty() {
        return true;
    }

    let mut allowed = false;
    for rule in rules {
        let matches = match &rule.os {
            Some(os_rule) => {
                let name_matches = os_rule
                    .name
                    .as_ref()
                    .map(|n| n == os.as_str())
                    .unwrap_or(true);
                let arch_matches = os_rule
                    .arch
                    .as_ref()
                    .map(|a| match a.as_str() {
                        "x86" => arch == Arch::X86,
                        "arm64" | "aarch64" => arch == Arch::Arm64,
                        other => other == arch.bits(),
                    })
                    .unwrap_or(true);
                name_matches && arch_matches
            }
            None => true,
        };
        if matches {
            allowed = rule.action == "allow";
        }
    }
    allowed
}

/// The classifier key a library publishes its natives under for this platform.
pub fn natives_classifier(library: &Library, os: OsType, arch: Arch) -> Option<String> {
    library
        .natives
        .as_ref()?
        .get(os.as_str())
        .map(|key| key.replace("${arch}", arch.bits()))
}

fn metadata_path(base: &Path, relative: &str) -> InstallResult<PathBuf> {
    let candidate = Path::new(relative);
    if candidate.is_absolute()
        || candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(InstallError::config(format!(
            "invalid artifact path from metadata: {}",
            relative
        )));
    }
    Ok(relative
        .split('/')
        .fold(base.to_path_buf(), |acc, segment| acc.join(segment)))
}

fn sha1(text: &str) -> InstallResult<HashCode> {
    HashCode::parse(HashAlgorithm::Sha1, text)
}

fn library_artifact(
    name: String,
    artifact: &LibraryArtifact,
    libraries_dir: &Path,
) -> InstallResult<ArtifactRef> {
    Ok(ArtifactRef::new(
        name,
        artifact.url.clone(),
        metadata_path(libraries_dir, &artifact.path)?,
    )
    .with_optional_size(artifact.size)
    .with_hash(sha1(&artifact.sha1)?))
}

/// Fetch the version manifest, then the version JSON it points at, verified
/// against the manifest's sha1 and stored at `paths.version_json`.
pub async fn fetch_version_info(ctx: &LoaderContext) -> InstallResult<VersionInfo> {
    let manifest_url = &ctx.config.endpoints.version_manifest;
    log::info!("Downloading version manifest from {}", manifest_url);
    let manifest: VersionManifest = download_json(&ctx.client, manifest_url).await?;

    let entry = manifest
        .versions
        .iter()
        .find(|v| v.id == ctx.minecraft_version())
        .ok_or_else(|| {
            InstallError::config(format!(
                "Minecraft version {} not found in version manifest",
                ctx.minecraft_version()
            ))
        })?;
    log::debug!("Found version entry: {}", entry.id);

    let artifact = ArtifactRef::new(
        format!("{}.json", entry.id),
        entry.url.clone(),
        &ctx.paths.version_json,
    )
    .with_optional_hash(entry.sha1.as_deref().map(sha1).transpose()?);
    ctx.fetch_required(vec![artifact], "Downloading version metadata")
        .await?;

    let bytes = tokio::fs::read(&ctx.paths.version_json).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Artifacts for the version on the current platform. Servers only need the
/// server jar.
pub fn core_artifacts(ctx: &LoaderContext, info: &VersionInfo) -> InstallResult<CoreArtifacts> {
    core_artifacts_for(ctx, info, OsType::current(), Arch::current())
}

pub fn core_artifacts_for(
    ctx: &LoaderContext,
    info: &VersionInfo,
    os: OsType,
    arch: Arch,
) -> InstallResult<CoreArtifacts> {
    let side = ctx.side();
    let jar_key = side.as_str();
    let download = info.downloads.get(jar_key).ok_or_else(|| {
        InstallError::config(format!("version {} has no {} download", info.id, jar_key))
    })?;
    let game_jar = ArtifactRef::new(
        format!("minecraft {} {}", jar_key, info.id),
        download.url.clone(),
        &ctx.paths.minecraft_jar,
    )
    .with_optional_size(download.size)
    .with_hash(sha1(&download.sha1)?);

    let mut core = CoreArtifacts {
        game_jar: Some(game_jar),
        ..Default::default()
    };
    if side == Side::Server {
        return Ok(core);
    }

    let libraries_dir = &ctx.paths.libraries_dir;
    for library in &info.libraries {
        if !check_rules(&library.rules, os, arch) {
            log::debug!("Skipping library due to rules: {}", library.name);
            continue;
        }
        let Some(downloads) = &library.downloads else {
            continue;
        };
        if let Some(artifact) = &downloads.artifact {
            core.libraries
                .push(library_artifact(library.name.clone(), artifact, libraries_dir)?);
        }
        if let Some(key) = natives_classifier(library, os, arch) {
            match downloads.classifiers.as_ref().and_then(|c| c.get(&key)) {
                Some(native) => core.natives.push(NativeLibrary {
                    artifact: library_artifact(format!("{}:{}", library.name, key), native, libraries_dir)?,
                    exclude: library
                        .extract
                        .as_ref()
                        .and_then(|e| e.exclude.clone())
                        .unwrap_or_default(),
                }),
                None => log::warn!("{} has no {} natives", library.name, key),
            }
        }
    }

    if let Some(index) = &info.asset_index {
        core.asset_index = Some(
            ArtifactRef::new(
                format!("asset index {}", index.id),
                index.url.clone(),
                ctx.paths
                    .assets_dir
                    .join("indexes")
                    .join(format!("{}.json", index.id)),
            )
            .with_optional_size(index.size)
            .with_hash(sha1(&index.sha1)?),
        );
    }
    Ok(core)
}

/// Every object listed in a downloaded asset index.
pub async fn asset_objects(ctx: &LoaderContext, index: &ArtifactRef) -> InstallResult<Vec<ArtifactRef>> {
    let bytes = tokio::fs::read(&index.destination).await?;
    let file: AssetIndexFile = serde_json::from_slice(&bytes)?;
    let resources = ctx.config.endpoints.resources.trim_end_matches('/');
    let objects_dir = ctx.paths.assets_dir.join("objects");

    let mut objects: Vec<(&String, &AssetObject)> = file.objects.iter().collect();
    objects.sort_by(|a, b| a.0.cmp(b.0));

    objects
        .into_iter()
        .map(|(name, object)| {
            let hash = sha1(&object.hash)
                .map_err(|e| InstallError::config(format!("asset {} has an invalid hash: {}", name, e)))?;
            // Validated sha1 hex is ASCII, so the two-byte prefix is a char boundary.
            let hex = hash.value();
            let prefix = &hex[..2];
            Ok(ArtifactRef::new(
                name.clone(),
                format!("{}/{}/{}", resources, prefix, hex),
                objects_dir.join(prefix).join(&hex),
            )
            .with_size(object.size)
            .with_hash(hash))
        })
        .collect()
}

/// Unpack natives jars into `dest`, honouring each library's exclude list.
pub async fn extract_natives(natives: Vec<NativeLibrary>, dest: PathBuf) -> InstallResult<usize> {
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&dest)?;
        let mut extracted = 0;
        for native in &natives {
            let file = std::fs::File::open(&native.artifact.destination)?;
            let mut archive = zip::ZipArchive::new(file)?;
            for i in 0..archive.len() {
                let mut entry = archive.by_index(i)?;
                let name = entry.name().to_string();
                if entry.is_dir() || native.exclude.iter().any(|e| name.starts_with(e)) {
                    continue;
                }
                let Some(relative) = entry.enclosed_name() else {
                    continue;
                };
                let out_path = dest.join(relative);
                if let Some(parent) = out_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut out = std::fs::File::create(&out_path)?;
                std::io::copy(&mut entry, &mut out)?;
                extracted += 1;
            }
        }
        Ok(extracted)
    })
    .await
    .map_err(|e| InstallError::Other(e.into()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::installer::config::InstallerConfig;
    use crate::game::installer::core::hashing::HashEngine;
    use crate::game::installer::types::{
        CancelToken, InstancePaths, LoaderRequest, LoaderVersionSelector, Side, SilentProgressReporter,
    };
    use std::sync::Arc;

    fn context(dir: &Path) -> LoaderContext {
        let config = InstallerConfig::new(dir.join("data"));
        let root = dir.join("instance");
        LoaderContext {
            client: reqwest::Client::new(),
            paths: InstancePaths::resolve(&config, &root, "1.20.1", Side::Client),
            config: Arc::new(config),
            hashes: Arc::new(HashEngine::new(16)),
            reporter: Arc::new(SilentProgressReporter),
            cancel: CancelToken::never(),
            request: LoaderRequest {
                minecraft_version: "1.20.1".to_string(),
                selector: LoaderVersionSelector::Latest,
                side: Side::Client,
                temp_dir: dir.join("tmp"),
            },
        }
    }

    fn index_with(dir: &Path, objects: serde_json::Value) -> ArtifactRef {
        let path = dir.join("index.json");
        let body = serde_json::json!({ "objects": objects });
        std::fs::write(&path, serde_json::to_vec(&body).unwrap()).unwrap();
        ArtifactRef::new("asset index", "", path)
    }

    #[tokio::test]
    async fn asset_objects_use_the_hash_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let hash = "bdf48ef6b5d0d23bbb02e17d04865216179f510a";
        let index = index_with(
            dir.path(),
            serde_json::json!({"icons/icon_16x16.png": {"hash": hash, "size": 3665}}),
        );

        let objects = asset_objects(&ctx, &index).await.unwrap();
        assert_eq!(objects.len(), 1);
        assert!(objects[0].url.ends_with(&format!("/bd/{}", hash)));
        assert_eq!(
            objects[0].destination,
            ctx.paths.assets_dir.join("objects").join("bd").join(hash)
        );
        assert_eq!(objects[0].size, Some(3665));
    }

    #[tokio::test]
    async fn malformed_asset_hashes_are_configuration_errors() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        for bad in ["é", "a", "zz48ef6b5d0d23bbb02e17d04865216179f510a0"] {
            let index = index_with(
                dir.path(),
                serde_json::json!({"minecraft/sounds/x.ogg": {"hash": bad, "size": 1}}),
            );
            let err = asset_objects(&ctx, &index).await.unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::ConfigurationError, "{}", bad);
        }
    }

    fn rule(action: &str, name: Option<&str>) -> Rule {
        Rule {
            action: action.to_string(),
            os: name.map(|n| OsRule {
                name: Some(n.to_string()),
                arch: None,
            }),
        }
    }

    #[test]
    fn later_rules_win() {
        let rules = vec![rule("allow", None), rule("disallow", Some("osx"))];
        assert!(check_rules(&rules, OsType::Linux, Arch::X64));
        assert!(!check_rules(&rules, OsType::MacOS, Arch::Arm64));

        let only_osx = vec![rule("allow", Some("osx"))];
        assert!(!check_rules(&only_osx, OsType::Windows, Arch::X64));
        assert!(check_rules(&[], OsType::Windows, Arch::X64));
    }

    #[test]
    fn natives_classifier_substitutes_arch() {
        let library: Library = serde_json::from_value(serde_json::json!({
            "name": "tv.twitch:twitch-platform:6.5",
            "natives": {"windows": "natives-windows-${arch}", "linux": "natives-linux"}
        }))
        .unwrap();
        assert_eq!(
            natives_classifier(&library, OsType::Windows, Arch::X86).as_deref(),
            Some("natives-windows-32")
        );
        assert_eq!(
            natives_classifier(&library, OsType::Linux, Arch::X64).as_deref(),
            Some("natives-linux")
        );
        assert_eq!(natives_classifier(&library, OsType::MacOS, Arch::X64), None);
    }

    #[test]
    fn metadata_paths_cannot_escape() {
        let base = Path::new("/libs");
        assert!(metadata_path(base, "../etc/passwd").is_err());
        assert!(metadata_path(base, "/etc/passwd").is_err());
        assert_eq!(
            metadata_path(base, "org/lwjgl/lwjgl.jar").unwrap(),
            base.join("org").join("lwjgl").join("lwjgl.jar")
        );
    }
}
