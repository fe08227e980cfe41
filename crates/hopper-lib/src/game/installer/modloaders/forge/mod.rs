//! Installer-based loaders: Forge and NeoForge ship a bootstrap jar carrying
//! an install profile, bundled libraries and a processor chain.

pub mod parser;
pub mod processor;
pub mod profile;

use self::parser::{bundled_library, parse_install_profile, parse_version_json};
use self::processor::{InstallProfileProcessor, ProcessorEnvironment, ProcessorRunner};
use self::profile::{ForgeInstallProfile, ForgeLibrary, ForgeVersionInfo, InstallProfile, WellKnownTokens};
use super::{neoforge, LaunchArguments, LoaderContext, ResolvedLoader};
use crate::error::{InstallError, InstallResult};
use crate::game::installer::config::Endpoints;
use crate::game::installer::core::artifact::{ArtifactRef, HashAlgorithm, HashCode};
use crate::game::installer::core::downloader::{
    download_json, download_optional_text, download_text, extract_zip,
};
use crate::game::installer::core::traits::LoaderStrategy;
use crate::game::installer::types::{LoaderKind, LoaderRequest, LoaderVersionSelector, Side};
use crate::utils::maven::MavenCoordinate;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerFlavor {
    Forge,
    NeoForge,
}

impl InstallerFlavor {
    pub fn kind(&self) -> LoaderKind {
        match self {
            InstallerFlavor::Forge => LoaderKind::Forge,
            InstallerFlavor::NeoForge => LoaderKind::NeoForge,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            InstallerFlavor::Forge => "Forge",
            InstallerFlavor::NeoForge => "NeoForge",
        }
    }

    pub fn maven_url<'a>(&self, endpoints: &'a Endpoints) -> &'a str {
        match self {
            InstallerFlavor::Forge => &endpoints.forge_maven,
            InstallerFlavor::NeoForge => &endpoints.neoforge_maven,
        }
    }

    /// Maven coordinate of the loader itself for a resolved version.
    pub fn coordinate(&self, minecraft_version: &str, version: &str) -> MavenCoordinate {
        let (group, artifact) = match self {
            InstallerFlavor::Forge => ("net.minecraftforge", "forge"),
            InstallerFlavor::NeoForge => ("net.neoforged", neoforge::artifact_for(minecraft_version)),
        };
        MavenCoordinate {
            group: group.to_string(),
            artifact: artifact.to_string(),
            version: version.to_string(),
            classifier: None,
            extension: "jar".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Promotions {
    #[serde(default)]
    promos: HashMap<String, String>,
}

/// Forge maven versions carry the Minecraft version as a prefix. Builds for
/// Minecraft 1.10 were also published with a `-1.10.0` suffix.
pub fn forge_maven_version(minecraft_version: &str, version: &str) -> String {
    let prefixed = if version.starts_with(&format!("{}-", minecraft_version)) {
        version.to_string()
    } else {
        format!("{}-{}", minecraft_version, version)
    };
    if minecraft_version == "1.10" && !prefixed.ends_with("-1.10.0") {
        format!("{}-1.10.0", prefixed)
    } else {
        prefixed
    }
}

/// Pick the promoted build for `minecraft_version`. A missing recommended
/// promotion falls back to the latest one.
pub fn promoted_version(
    promos: &HashMap<String, String>,
    minecraft_version: &str,
    recommended: bool,
) -> InstallResult<String> {
    if recommended {
        if let Some(version) = promos.get(&format!("{}-recommended", minecraft_version)) {
            return Ok(forge_maven_version(minecraft_version, version));
        }
        log::warn!(
            "No recommended Forge build for Minecraft {}, using the latest",
            minecraft_version
        );
    }
    promos
        .get(&format!("{}-latest", minecraft_version))
        .map(|version| forge_maven_version(minecraft_version, version))
        .ok_or_else(|| {
            InstallError::config(format!("no Forge promotion for Minecraft {}", minecraft_version))
        })
}

#[derive(Debug, Deserialize)]
struct MavenMetadata {
    versioning: Versioning,
}

#[derive(Debug, Deserialize)]
struct Versioning {
    versions: Versions,
}

#[derive(Debug, Deserialize)]
struct Versions {
    #[serde(default)]
    version: Vec<String>,
}

/// Versions listed in a maven `maven-metadata.xml`.
pub fn parse_maven_metadata(xml: &str) -> InstallResult<Vec<String>> {
    let metadata: MavenMetadata = serde_xml_rs::from_str(xml)
        .map_err(|e| InstallError::config(format!("invalid maven metadata: {}", e)))?;
    Ok(metadata.versioning.versions.version)
}

async fn check_forge_exact(ctx: &LoaderContext, version: &str) -> InstallResult<()> {
    let url = format!(
        "{}/net/minecraftforge/forge/maven-metadata.xml",
        ctx.config.endpoints.forge_maven.trim_end_matches('/')
    );
    let xml = download_text(&ctx.client, &url).await?;
    let versions = parse_maven_metadata(&xml)?;
    log::debug!("Forge maven lists {} versions", versions.len());
    if versions.iter().any(|v| v == version) {
        Ok(())
    } else {
        Err(InstallError::config(format!(
            "Forge {} does not exist for Minecraft {}",
            version,
            ctx.minecraft_version()
        )))
    }
}

pub struct InstallerLoader {
    flavor: InstallerFlavor,
    version: Option<String>,
    installer_jar: Option<PathBuf>,
    extracted_dir: Option<PathBuf>,
    profile: Option<ForgeInstallProfile>,
    version_info: Option<ForgeVersionInfo>,
}

impl InstallerLoader {
    pub fn new(flavor: InstallerFlavor) -> Self {
        Self {
            flavor,
            version: None,
            installer_jar: None,
            extracted_dir: None,
            profile: None,
            version_info: None,
        }
    }

    pub fn forge() -> Self {
        Self::new(InstallerFlavor::Forge)
    }

    pub fn neoforge() -> Self {
        Self::new(InstallerFlavor::NeoForge)
    }

    pub fn flavor(&self) -> InstallerFlavor {
        self.flavor
    }

    fn version(&self) -> InstallResult<&str> {
        self.version.as_deref().ok_or_else(|| {
            InstallError::config(format!("{} version not resolved", self.flavor.display_name()))
        })
    }

    fn extracted(&self) -> InstallResult<(&Path, &ForgeInstallProfile, &ForgeVersionInfo)> {
        match (&self.extracted_dir, &self.profile, &self.version_info) {
            (Some(dir), Some(profile), Some(info)) => Ok((dir.as_path(), profile, info)),
            _ => Err(InstallError::config(format!(
                "{} installer has not been extracted",
                self.flavor.display_name()
            ))),
        }
    }

    /// The side-specific patched game jar the processors produce.
    pub fn patched_jar(&self, ctx: &LoaderContext) -> InstallResult<MavenCoordinate> {
        let version = self.version()?;
        Ok(self
            .flavor
            .coordinate(ctx.minecraft_version(), version)
            .with_classifier(ctx.side().as_str()))
    }

    async fn resolve(&mut self, ctx: &LoaderContext, request: &LoaderRequest) -> InstallResult<String> {
        let mc = ctx.minecraft_version();
        let version = match (self.flavor, &request.selector) {
            (_, LoaderVersionSelector::Pinned(v)) => v.clone(),
            (InstallerFlavor::Forge, LoaderVersionSelector::Latest | LoaderVersionSelector::Recommended) => {
                let promotions: Promotions =
                    download_json(&ctx.client, &ctx.config.endpoints.forge_promotions).await?;
                let recommended = request.selector == LoaderVersionSelector::Recommended;
                promoted_version(&promotions.promos, mc, recommended)?
            }
            (InstallerFlavor::Forge, LoaderVersionSelector::Exact(v)) => {
                let version = forge_maven_version(mc, v);
                check_forge_exact(ctx, &version).await?;
                version
            }
            (InstallerFlavor::NeoForge, LoaderVersionSelector::Latest | LoaderVersionSelector::Recommended) => {
                neoforge::latest(ctx).await?
            }
            (InstallerFlavor::NeoForge, LoaderVersionSelector::Exact(v)) => {
                neoforge::check_exact(ctx, v).await?;
                v.clone()
            }
        };
        log::info!("Using {} version: {}", self.flavor.display_name(), version);
        self.version = Some(version.clone());
        Ok(version)
    }

    async fn fetch_installer(&mut self, ctx: &LoaderContext) -> InstallResult<()> {
        let display = self.flavor.display_name();
        let coords = self
            .flavor
            .coordinate(ctx.minecraft_version(), self.version()?)
            .with_classifier("installer");
        let url = coords.url(self.flavor.maven_url(&ctx.config.endpoints));

        let sha1 = match download_optional_text(&ctx.client, &format!("{}.sha1", url)).await {
            Ok(Some(text)) => text
                .split_whitespace()
                .next()
                .and_then(|s| HashCode::parse(HashAlgorithm::Sha1, s).ok()),
            Ok(None) => None,
            Err(e) => {
                log::warn!("Could not fetch {} installer checksum: {}", display, e);
                None
            }
        };
        if sha1.is_none() {
            log::warn!("{} installer {} will not be verified", display, coords);
        }

        let installer_jar = ctx.temp_dir().join(coords.file_name());
        let artifact = ArtifactRef::new(format!("{} installer {}", display, coords.version), url, &installer_jar)
            .with_optional_hash(sha1)
            .allow_hash_failure(ctx.config.disable_installer_hash_check);
        ctx.fetch_required(vec![artifact], &format!("Downloading {} installer", display))
            .await?;

        let extracted = ctx.temp_dir().join(format!("{}-installer", coords.artifact));
        let entries = extract_zip(&installer_jar, &extracted).await?;
        log::debug!("Extracted {} installer entries to {:?}", entries, extracted);

        let profile = parse_install_profile(&extracted).await?;
        let version_info = match &profile {
            ForgeInstallProfile::Modern(p) => parse_version_json(&extracted, p.json.as_deref()).await?,
            ForgeInstallProfile::Legacy(p) => p.version_info.clone(),
        };

        self.installer_jar = Some(installer_jar);
        self.extracted_dir = Some(extracted);
        self.profile = Some(profile);
        self.version_info = Some(version_info);
        Ok(())
    }

    fn library_ref(
        &self,
        ctx: &LoaderContext,
        library: &ForgeLibrary,
        extracted: &Path,
        default_repository: &str,
    ) -> InstallResult<Option<ArtifactRef>> {
        let coords = MavenCoordinate::parse(&library.name)?;
        let libraries_dir = &ctx.paths.libraries_dir;

        if let Some(ForgeInstallProfile::Legacy(legacy)) = &self.profile {
            if library.name == legacy.install.path {
                return Ok(Some(
                    ArtifactRef::new(coords.to_string(), "", coords.local_path(libraries_dir))
                        .with_local_source(extracted.join(&legacy.install.file_path)),
                ));
            }
        }

        match library.downloads.as_ref().and_then(|d| d.artifact.as_ref()) {
            Some(artifact) => {
                let relative = artifact.path.clone().unwrap_or_else(|| coords.relative_path());
                let destination = relative
                    .split('/')
                    .fold(libraries_dir.clone(), |acc, segment| acc.join(segment));
                let hash = artifact
                    .sha1
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .map(|s| HashCode::parse(HashAlgorithm::Sha1, s))
                    .transpose()?;
                let mut artifact_ref = ArtifactRef::new(coords.to_string(), artifact.url.clone(), destination)
                    .with_optional_size(artifact.size)
                    .with_optional_hash(hash);
                if artifact.url.is_empty() {
                    match bundled_library(extracted, &relative) {
                        Some(source) => artifact_ref = artifact_ref.with_local_source(source),
                        None => {
                            log::debug!(
                                "{} has no download and is not bundled; a processor produces it",
                                library.name
                            );
                            return Ok(None);
                        }
                    }
                }
                Ok(Some(artifact_ref))
            }
            None => {
                let repository = library
                    .url
                    .as_deref()
                    .filter(|u| !u.is_empty())
                    .unwrap_or(default_repository);
                let mut artifact_ref = ArtifactRef::new(
                    coords.to_string(),
                    coords.url(repository),
                    coords.local_path(libraries_dir),
                );
                if let Some(source) = bundled_library(extracted, &coords.relative_path()) {
                    artifact_ref = artifact_ref.with_local_source(source);
                }
                Ok(Some(artifact_ref))
            }
        }
    }

    fn library_refs(&self, ctx: &LoaderContext) -> InstallResult<Vec<ArtifactRef>> {
        let (extracted, profile, info) = self.extracted()?;
        let (installer_libraries, default_repository): (&[ForgeLibrary], &str) = match profile {
            ForgeInstallProfile::Modern(p) => (p.libraries.as_slice(), self.flavor.maven_url(&ctx.config.endpoints)),
            ForgeInstallProfile::Legacy(_) => (&[][..], ctx.config.endpoints.libraries.as_str()),
        };

        let mut seen = HashSet::new();
        let mut refs = Vec::new();
        for library in installer_libraries.iter().chain(info.libraries.iter()) {
            if !library.required_on(ctx.side()) || !seen.insert(library.name.clone()) {
                continue;
            }
            if let Some(artifact) = self.library_ref(ctx, library, extracted, default_repository)? {
                refs.push(artifact);
            }
        }
        Ok(refs)
    }

    fn build_install_profile(&self, ctx: &LoaderContext) -> InstallResult<Option<InstallProfile>> {
        let (_, profile, _) = self.extracted()?;
        let ForgeInstallProfile::Modern(modern) = profile else {
            return Ok(None);
        };
        let installer = self
            .installer_jar
            .as_deref()
            .ok_or_else(|| InstallError::config("installer jar missing"))?;
        let mut install_profile = InstallProfile::from_modern(modern);
        install_profile.inject_well_known(&WellKnownTokens {
            side: ctx.side(),
            root: &ctx.paths.root,
            minecraft_jar: &ctx.paths.minecraft_jar,
            minecraft_version: ctx.minecraft_version(),
            installer,
            library_dir: &ctx.paths.libraries_dir,
        });
        Ok(Some(install_profile))
    }

    /// Library whose jar a server starts from, copied to the instance root.
    fn server_launch_library(&self, ctx: &LoaderContext) -> InstallResult<Option<MavenCoordinate>> {
        if !ctx.side().is_server() {
            return Ok(None);
        }
        let (_, profile, _) = self.extracted()?;
        let coords = match profile {
            ForgeInstallProfile::Legacy(p) => Some(p.install.path.as_str()),
            ForgeInstallProfile::Modern(p) => p.path.as_deref(),
        };
        coords.map(MavenCoordinate::parse).transpose()
    }

    async fn process(&self, ctx: &LoaderContext, runner: &dyn ProcessorRunner) -> InstallResult<()> {
        let (extracted, _, info) = self.extracted()?;

        if let Some(profile) = self.build_install_profile(ctx)? {
            let env = ProcessorEnvironment {
                side: ctx.side(),
                libraries_dir: ctx.paths.libraries_dir.clone(),
                installer_dir: extracted.to_path_buf(),
                temp_dir: ctx.temp_dir().clone(),
                version_json: Some(ctx.paths.version_json.clone()),
            };
            InstallProfileProcessor::new(runner, ctx.hashes.clone(), ctx.cancel.clone(), ctx.reporter.clone())
                .run(&profile, &env)
                .await?;
        }

        if let Some(coords) = self.server_launch_library(ctx)? {
            let source = coords.local_path(&ctx.paths.libraries_dir);
            let target = ctx.paths.root.join(coords.file_name());
            tokio::fs::copy(&source, &target).await.map_err(|e| {
                InstallError::config(format!("server launch jar {} unavailable: {}", coords, e))
            })?;
            log::info!("Copied server launch jar to {:?}", target);
        }

        if ctx.side() == Side::Client {
            let dir = ctx.paths.versions_dir.join(&info.id);
            tokio::fs::create_dir_all(&dir).await?;
            crate::game::installer::transaction::write_atomic(
                &dir.join(format!("{}.json", info.id)),
                &serde_json::to_vec_pretty(info)?,
            )
            .await?;
        }
        Ok(())
    }
}

impl LoaderStrategy for InstallerLoader {
    fn kind(&self) -> LoaderKind {
        self.flavor.kind()
    }

    fn resolve_version<'a>(
        &'a mut self,
        ctx: &'a LoaderContext,
        request: &'a LoaderRequest,
    ) -> BoxFuture<'a, InstallResult<String>> {
        Box::pin(self.resolve(ctx, request))
    }

    fn download_and_extract_installer<'a>(
        &'a mut self,
        ctx: &'a LoaderContext,
    ) -> BoxFuture<'a, InstallResult<()>> {
        Box::pin(self.fetch_installer(ctx))
    }

    fn install_profile(&self, ctx: &LoaderContext) -> InstallResult<Option<InstallProfile>> {
        self.build_install_profile(ctx)
    }

    fn libraries(&self, ctx: &LoaderContext) -> InstallResult<Vec<ArtifactRef>> {
        self.library_refs(ctx)
    }

    fn run_processors<'a>(
        &'a mut self,
        ctx: &'a LoaderContext,
        runner: &'a dyn ProcessorRunner,
    ) -> BoxFuture<'a, InstallResult<()>> {
        Box::pin(self.process(ctx, runner))
    }

    fn resolved(&self, ctx: &LoaderContext) -> InstallResult<ResolvedLoader> {
        let (_, _, info) = self.extracted()?;
        let main_class = info.main_class.clone().ok_or_else(|| {
            InstallError::config(format!("{} version {} has no main class", self.flavor.display_name(), info.id))
        })?;

        let mut libraries = self.library_refs(ctx)?;
        let patched = self.patched_jar(ctx)?;
        let patched_path = patched.local_path(&ctx.paths.libraries_dir);
        if patched_path.is_file() && !libraries.iter().any(|l| l.destination == patched_path) {
            libraries.push(ArtifactRef::new(patched.to_string(), "", patched_path));
        }

        Ok(ResolvedLoader {
            kind: self.flavor.kind(),
            version: self.version()?.to_string(),
            main_class,
            libraries,
            arguments: LaunchArguments::from_version_json(
                info.arguments.as_ref(),
                info.minecraft_arguments.clone(),
            ),
            server_jar: self.server_launch_library(ctx)?.map(|c| c.file_name()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::installer::config::InstallerConfig;
    use crate::game::installer::core::hashing::HashEngine;
    use crate::game::installer::types::{CancelToken, InstancePaths, SilentProgressReporter};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FORGE_METADATA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>net.minecraftforge</groupId>
  <artifactId>forge</artifactId>
  <versioning>
    <latest>1.20.1-47.2.0</latest>
    <versions>
      <version>1.20.1-47.2.0</version>
      <version>1.20.1-47.1.0</version>
      <version>1.10-12.18.0.2000-1.10.0</version>
    </versions>
  </versioning>
</metadata>"#;

    fn context(server: &MockServer, dir: &Path, minecraft_version: &str, selector: LoaderVersionSelector) -> LoaderContext {
        let mut config = InstallerConfig::new(dir.join("data"));
        config.endpoints = Endpoints::rebased(&server.uri());
        let root = dir.join("instance");
        LoaderContext {
            client: reqwest::Client::new(),
            paths: InstancePaths::resolve(&config, &root, minecraft_version, Side::Client),
            config: Arc::new(config),
            hashes: Arc::new(HashEngine::new(16)),
            reporter: Arc::new(SilentProgressReporter),
            cancel: CancelToken::never(),
            request: LoaderRequest {
                minecraft_version: minecraft_version.to_string(),
                selector,
                side: Side::Client,
                temp_dir: dir.join("tmp"),
            },
        }
    }

    async fn serve_metadata(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/forge-maven/net/minecraftforge/forge/maven-metadata.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FORGE_METADATA))
            .mount(server)
            .await;
    }

    #[test]
    fn forge_versions_gain_the_minecraft_prefix_once() {
        assert_eq!(forge_maven_version("1.20.1", "47.2.0"), "1.20.1-47.2.0");
        assert_eq!(forge_maven_version("1.20.1", "1.20.1-47.2.0"), "1.20.1-47.2.0");
    }

    #[test]
    fn minecraft_1_10_builds_carry_the_branch_suffix() {
        assert_eq!(forge_maven_version("1.10", "12.18.0.2000"), "1.10-12.18.0.2000-1.10.0");
        assert_eq!(
            forge_maven_version("1.10", "1.10-12.18.0.2000-1.10.0"),
            "1.10-12.18.0.2000-1.10.0"
        );
        assert_eq!(forge_maven_version("1.10.2", "12.18.3.2511"), "1.10.2-12.18.3.2511");

        let url = InstallerFlavor::Forge
            .coordinate("1.10", &forge_maven_version("1.10", "12.18.0.2000"))
            .with_classifier("installer")
            .url("https://maven.minecraftforge.net/");
        assert!(url.ends_with("/1.10-12.18.0.2000-1.10.0/forge-1.10-12.18.0.2000-1.10.0-installer.jar"));
    }

    #[test]
    fn recommended_promotion_falls_back_to_latest() {
        let mut promos = HashMap::new();
        promos.insert("1.20.1-latest".to_string(), "47.2.20".to_string());
        promos.insert("1.20.1-recommended".to_string(), "47.2.0".to_string());
        promos.insert("1.21.1-latest".to_string(), "52.0.16".to_string());

        assert_eq!(promoted_version(&promos, "1.20.1", true).unwrap(), "1.20.1-47.2.0");
        assert_eq!(promoted_version(&promos, "1.20.1", false).unwrap(), "1.20.1-47.2.20");
        assert_eq!(promoted_version(&promos, "1.21.1", true).unwrap(), "1.21.1-52.0.16");

        let err = promoted_version(&promos, "1.7.2", true).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ConfigurationError);
    }

    #[test]
    fn maven_metadata_lists_versions() {
        let versions = parse_maven_metadata(FORGE_METADATA).unwrap();
        assert_eq!(versions.len(), 3);
        assert!(versions.contains(&"1.20.1-47.1.0".to_string()));

        let err = parse_maven_metadata("not xml").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ConfigurationError);
    }

    #[tokio::test]
    async fn listed_exact_version_resolves() {
        let server = MockServer::start().await;
        serve_metadata(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&server, dir.path(), "1.20.1", LoaderVersionSelector::Exact("47.1.0".into()));

        let mut loader = InstallerLoader::forge();
        let version = loader.resolve(&ctx, &ctx.request).await.unwrap();
        assert_eq!(version, "1.20.1-47.1.0");
    }

    #[tokio::test]
    async fn unlisted_exact_version_is_a_configuration_error() {
        let server = MockServer::start().await;
        serve_metadata(&server).await;
        Mock::given(method("GET"))
            .and(path("/forge-maven/net/minecraftforge/forge/1.20.1-99.9.9/forge-1.20.1-99.9.9-installer.jar"))
            .respond_with(ResponseTemplate::new(404))
            .expect(0)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&server, dir.path(), "1.20.1", LoaderVersionSelector::Exact("99.9.9".into()));

        let mut loader = InstallerLoader::forge();
        let err = loader.resolve(&ctx, &ctx.request).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ConfigurationError);
        assert!(err.to_string().contains("1.20.1-99.9.9"));
        assert!(loader.version.is_none());
    }

    #[tokio::test]
    async fn recommended_selector_reads_promotions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forge/promotions_slim.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "homepage": "https://files.minecraftforge.net/",
                "promos": {"1.10-latest": "12.18.0.2000", "1.10-recommended": "12.18.0.2000"}
            })))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&server, dir.path(), "1.10", LoaderVersionSelector::Recommended);

        let mut loader = InstallerLoader::forge();
        let version = loader.resolve(&ctx, &ctx.request).await.unwrap();
        assert_eq!(version, "1.10-12.18.0.2000-1.10.0");
    }

    #[test]
    fn installer_urls_follow_maven_layout() {
        let endpoints = Endpoints::default();
        let forge = InstallerFlavor::Forge
            .coordinate("1.20.1", "1.20.1-47.2.0")
            .with_classifier("installer");
        assert_eq!(
            forge.url(InstallerFlavor::Forge.maven_url(&endpoints)),
            "https://maven.minecraftforge.net/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar"
        );

        let neo = InstallerFlavor::NeoForge
            .coordinate("1.21.1", "21.1.65")
            .with_classifier("installer");
        assert_eq!(
            neo.url(InstallerFlavor::NeoForge.maven_url(&endpoints)),
            "https://maven.neoforged.net/releases/net/neoforged/neoforge/21.1.65/neoforge-21.1.65-installer.jar"
        );
    }

    #[test]
    fn patched_jar_classifier_follows_side() {
        let coords = InstallerFlavor::NeoForge.coordinate("1.20.1", "1.20.1-47.1.106");
        assert_eq!(coords.artifact, "forge");
        assert_eq!(
            coords.with_classifier(Side::Server.as_str()).file_name(),
            "forge-1.20.1-47.1.106-server.jar"
        );
    }
}
