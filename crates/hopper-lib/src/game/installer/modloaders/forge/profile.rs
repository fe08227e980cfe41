//! Forge-style install profile schema (modern and pre-1.13) and the domain
//! [`InstallProfile`] the processor chain runs from.

use crate::game::installer::types::Side;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Library entry shared by `install_profile.json` and `version.json`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForgeLibrary {
    pub name: String,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    /// Repository base for entries without `downloads`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub checksums: Option<Vec<String>>,
    #[serde(default)]
    pub clientreq: Option<bool>,
    #[serde(default)]
    pub serverreq: Option<bool>,
}

impl ForgeLibrary {
    /// Pre-1.13 profiles flag which side needs a library. Unflagged entries
    /// are needed by both.
    pub fn required_on(&self, side: Side) -> bool {
        if self.clientreq.is_none() && self.serverreq.is_none() {
            return true;
        }
        let flag = match side {
            Side::Client => self.clientreq,
            Side::Server => self.serverreq,
        };
        flag.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryDownloads {
    #[serde(default)]
    pub artifact: Option<LibraryArtifact>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryArtifact {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub path: Option<String>,
}

/// The loader's own version JSON.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgeVersionInfo {
    pub id: String,
    #[serde(default)]
    pub inherits_from: Option<String>,
    #[serde(default)]
    pub main_class: Option<String>,
    #[serde(default)]
    pub arguments: Option<serde_json::Value>,
    #[serde(default)]
    pub minecraft_arguments: Option<String>,
    #[serde(default)]
    pub libraries: Vec<ForgeLibrary>,
}

/// One `data` entry: the value differs per side.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SidedValue {
    pub client: String,
    pub server: String,
}

impl SidedValue {
    pub fn both(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            client: value.clone(),
            server: value,
        }
    }

    pub fn for_side(&self, side: Side) -> &str {
        match side {
            Side::Client => &self.client,
            Side::Server => &self.server,
        }
    }
}

/// Declared output value: a bare hash, or a hash plus a token later
/// processors may reference to find the output's path.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawOutput {
    Hash(String),
    Detailed {
        hash: String,
        #[serde(default)]
        token: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProcessor {
    pub jar: String,
    #[serde(default)]
    pub main_class: Option<String>,
    #[serde(default)]
    pub classpath: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub outputs: BTreeMap<String, RawOutput>,
    #[serde(default)]
    pub sides: Option<Vec<String>>,
}

/// `install_profile.json` for 1.13 and newer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModernInstallProfile {
    #[serde(default)]
    pub spec: i32,
    pub version: String,
    /// Path of the version JSON inside the installer, e.g. `/version.json`.
    #[serde(default)]
    pub json: Option<String>,
    /// Coordinates of the loader jar a server copies to its root (1.13-1.16).
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub minecraft: Option<String>,
    #[serde(default)]
    pub data: BTreeMap<String, SidedValue>,
    #[serde(default)]
    pub processors: Vec<RawProcessor>,
    #[serde(default)]
    pub libraries: Vec<ForgeLibrary>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyInstallSection {
    /// Coordinates of the universal jar.
    pub path: String,
    /// Universal jar file name inside the installer.
    pub file_path: String,
    #[serde(default)]
    pub minecraft: Option<String>,
}

/// Pre-1.13 `install_profile.json`: no processors, a bundled universal jar.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyInstallProfile {
    pub install: LegacyInstallSection,
    pub version_info: ForgeVersionInfo,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ForgeInstallProfile {
    Legacy(LegacyInstallProfile),
    Modern(ModernInstallProfile),
}

/// A declared processor output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredOutput {
    /// `{TOKEN}`, `[coords]` or a path.
    pub path: String,
    /// `{TOKEN}`, `'literal'` or bare sha1 hex.
    pub hash: String,
    /// Published token bound to the resolved output path.
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processor {
    /// Maven coordinates of the processor jar.
    pub jar: String,
    pub main_class: Option<String>,
    pub classpath: Vec<String>,
    pub args: Vec<String>,
    pub outputs: Vec<DeclaredOutput>,
    pub sides: Option<Vec<String>>,
}

impl Processor {
    pub fn runs_on(&self, side: Side) -> bool {
        match &self.sides {
            Some(sides) => sides.iter().any(|s| s == side.as_str()),
            None => true,
        }
    }
}

impl From<RawProcessor> for Processor {
    fn from(raw: RawProcessor) -> Self {
        let outputs = raw
            .outputs
            .into_iter()
            .map(|(path, output)| match output {
                RawOutput::Hash(hash) => DeclaredOutput {
                    path,
                    hash,
                    token: None,
                },
                RawOutput::Detailed { hash, token } => DeclaredOutput { path, hash, token },
            })
            .collect();
        Self {
            jar: raw.jar,
            main_class: raw.main_class,
            classpath: raw.classpath,
            args: raw.args,
            outputs,
            sides: raw.sides,
        }
    }
}

/// Values for the tokens every install profile can reference.
#[derive(Debug, Clone)]
pub struct WellKnownTokens<'a> {
    pub side: Side,
    pub root: &'a Path,
    pub minecraft_jar: &'a Path,
    pub minecraft_version: &'a str,
    pub installer: &'a Path,
    pub library_dir: &'a Path,
}

/// Token substitutions plus an ordered processor chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallProfile {
    pub version_id: String,
    pub data: BTreeMap<String, SidedValue>,
    pub processors: Vec<Processor>,
}

impl InstallProfile {
    pub fn new(version_id: impl Into<String>) -> Self {
        Self {
            version_id: version_id.into(),
            ..Default::default()
        }
    }

    pub fn from_modern(profile: &ModernInstallProfile) -> Self {
        Self {
            version_id: profile.version.clone(),
            data: profile.data.clone(),
            processors: profile.processors.iter().cloned().map(Processor::from).collect(),
        }
    }

    /// Bind `key` to a literal value on both sides, overriding any profile entry.
    pub fn inject(&mut self, key: &str, value: impl AsRef<str>) {
        self.data
            .insert(key.to_string(), SidedValue::both(format!("'{}'", value.as_ref())));
    }

    pub fn inject_well_known(&mut self, tokens: &WellKnownTokens<'_>) {
        self.inject("SIDE", tokens.side.as_str());
        self.inject("ROOT", tokens.root.to_string_lossy());
        self.inject("MINECRAFT_JAR", tokens.minecraft_jar.to_string_lossy());
        self.inject("MINECRAFT_VERSION", tokens.minecraft_version);
        self.inject("INSTALLER", tokens.installer.to_string_lossy());
        self.inject("LIBRARY_DIR", tokens.library_dir.to_string_lossy());
    }

    pub fn value(&self, key: &str, side: Side) -> Option<&str> {
        self.data.get(key).map(|v| v.for_side(side))
    }

    pub fn processors_for(&self, side: Side) -> impl Iterator<Item = &Processor> {
        self.processors.iter().filter(move |p| p.runs_on(side))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODERN: &str = r#"{
        "spec": 1,
        "profile": "forge",
        "version": "1.20.1-forge-47.2.0",
        "json": "/version.json",
        "minecraft": "1.20.1",
        "data": {
            "MAPPINGS": {"client": "[de.oceanlabs.mcp:mcp_config:1.20.1@zip]", "server": "[de.oceanlabs.mcp:mcp_config:1.20.1@zip]"},
            "BINPATCH": {"client": "/data/client.lzma", "server": "/data/server.lzma"}
        },
        "processors": [
            {"sides": ["server"], "jar": "net.minecraftforge:installertools:1.3.0", "classpath": [], "args": ["--task", "EXTRACT_FILES"]},
            {"jar": "net.minecraftforge:binarypatcher:1.1.1", "classpath": ["net.sf.jopt-simple:jopt-simple:5.0.4"],
             "args": ["--clean", "{MC_SRG}", "--output", "{PATCHED}"],
             "outputs": {"{PATCHED}": "{PATCHED_SHA}"}}
        ],
        "libraries": [
            {"name": "net.minecraftforge:binarypatcher:1.1.1", "downloads": {"artifact": {
                "path": "net/minecraftforge/binarypatcher/1.1.1/binarypatcher-1.1.1.jar",
                "url": "https://maven.minecraftforge.net/net/minecraftforge/binarypatcher/1.1.1/binarypatcher-1.1.1.jar",
                "sha1": "2a2e8d1b4d3c1f2e0e1cfa2ea8f1a1b1c3d4e5f6", "size": 1234}}}
        ]
    }"#;

    const LEGACY: &str = r#"{
        "install": {
            "profileName": "Forge",
            "target": "1.7.10-Forge10.13.4.1614-1.7.10",
            "path": "net.minecraftforge:forge:1.7.10-10.13.4.1614-1.7.10",
            "version": "Forge 10.13.4.1614",
            "filePath": "forge-1.7.10-10.13.4.1614-1.7.10-universal.jar",
            "minecraft": "1.7.10"
        },
        "versionInfo": {
            "id": "1.7.10-Forge10.13.4.1614-1.7.10",
            "mainClass": "net.minecraft.launchwrapper.Launch",
            "minecraftArguments": "--username ${auth_player_name} --tweakClass cpw.mods.fml.common.launcher.FMLTweaker",
            "libraries": [
                {"name": "net.minecraftforge:forge:1.7.10-10.13.4.1614-1.7.10", "url": "http://files.minecraftforge.net/maven/"},
                {"name": "net.minecraft:launchwrapper:1.12", "serverreq": true},
                {"name": "lzma:lzma:0.0.1", "clientreq": true}
            ]
        }
    }"#;

    #[test]
    fn parses_both_profile_generations() {
        match serde_json::from_str::<ForgeInstallProfile>(MODERN).unwrap() {
            ForgeInstallProfile::Modern(p) => {
                assert_eq!(p.processors.len(), 2);
                assert_eq!(p.json.as_deref(), Some("/version.json"));
            }
            other => panic!("expected modern profile, got {:?}", other),
        }
        match serde_json::from_str::<ForgeInstallProfile>(LEGACY).unwrap() {
            ForgeInstallProfile::Legacy(p) => {
                assert_eq!(p.install.file_path, "forge-1.7.10-10.13.4.1614-1.7.10-universal.jar");
                assert_eq!(p.version_info.libraries.len(), 3);
            }
            other => panic!("expected legacy profile, got {:?}", other),
        }
    }

    #[test]
    fn legacy_side_flags() {
        let ForgeInstallProfile::Legacy(p) = serde_json::from_str::<ForgeInstallProfile>(LEGACY).unwrap() else {
            panic!("legacy");
        };
        let libs = &p.version_info.libraries;
        assert!(libs[0].required_on(Side::Server));
        assert!(libs[1].required_on(Side::Server));
        assert!(!libs[1].required_on(Side::Client));
        assert!(!libs[2].required_on(Side::Server));
    }

    #[test]
    fn injected_tokens_override_and_filter_by_side() {
        let ForgeInstallProfile::Modern(raw) = serde_json::from_str::<ForgeInstallProfile>(MODERN).unwrap() else {
            panic!("modern");
        };
        let mut profile = InstallProfile::from_modern(&raw);
        profile.data.insert("SIDE".into(), SidedValue::both("bogus"));
        profile.inject_well_known(&WellKnownTokens {
            side: Side::Client,
            root: Path::new("/inst"),
            minecraft_jar: Path::new("/inst/mc.jar"),
            minecraft_version: "1.20.1",
            installer: Path::new("/tmp/installer.jar"),
            library_dir: Path::new("/inst/libraries"),
        });

        assert_eq!(profile.value("SIDE", Side::Server), Some("'client'"));
        assert_eq!(profile.value("BINPATCH", Side::Server), Some("/data/server.lzma"));
        assert_eq!(profile.value("LIBRARY_DIR", Side::Client), Some("'/inst/libraries'"));
        assert_eq!(profile.processors_for(Side::Client).count(), 1);
        assert_eq!(profile.processors_for(Side::Server).count(), 2);
        assert_eq!(profile.processors[1].outputs[0].path, "{PATCHED}");
    }

    #[test]
    fn detailed_outputs_publish_tokens() {
        let raw: RawProcessor = serde_json::from_str(
            r#"{"jar": "a:b:1", "outputs": {"out/a.jar": {"hash": "'abc'", "token": "A_JAR"}}}"#,
        )
        .unwrap();
        let processor = Processor::from(raw);
        assert_eq!(processor.outputs[0].token.as_deref(), Some("A_JAR"));
    }
}
