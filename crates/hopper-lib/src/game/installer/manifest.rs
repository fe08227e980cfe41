use crate::error::InstallResult;
use crate::game::installer::modloaders::{LaunchArguments, ResolvedLoader};
use crate::game::installer::pack::{PackFile, Provenance};
use crate::game::installer::transaction::write_json_atomic;
use crate::game::installer::types::{LoaderKind, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const INSTANCE_MANIFEST_FILE: &str = "instance.json";
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderRecord {
    pub kind: LoaderKind,
    pub version: String,
}

/// One installed pack file. `hash` is the value the pack manifest declared,
/// recorded as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledMod {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub provenance: Provenance,
}

impl From<&PackFile> for InstalledMod {
    fn from(file: &PackFile) -> Self {
        Self {
            name: file.name.clone(),
            path: file.path.clone(),
            hash: file.hash.clone(),
            size: file.size,
            provenance: file.provenance.clone(),
        }
    }
}

/// What a finished install looks like, written to `<root>/instance.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceManifest {
    pub schema_version: u32,
    pub name: String,
    #[serde(default)]
    pub pack_version: String,
    pub minecraft_version: String,
    pub side: Side,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader: Option<LoaderRecord>,
    pub main_class: String,
    #[serde(default)]
    pub arguments: LaunchArguments,
    /// Bootstrap jar relative to the root, for server installs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_jar: Option<String>,
    #[serde(default)]
    pub mods: Vec<InstalledMod>,
    pub installed_at: DateTime<Utc>,
}

impl InstanceManifest {
    pub fn new(name: impl Into<String>, minecraft_version: impl Into<String>, side: Side) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            name: name.into(),
            pack_version: String::new(),
            minecraft_version: minecraft_version.into(),
            side,
            loader: None,
            main_class: String::new(),
            arguments: LaunchArguments::default(),
            server_jar: None,
            mods: Vec::new(),
            installed_at: Utc::now(),
        }
    }

    /// Loader fields override the vanilla main class and arguments.
    pub fn apply_loader(&mut self, loader: &ResolvedLoader) {
        self.loader = Some(LoaderRecord {
            kind: loader.kind,
            version: loader.version.clone(),
        });
        if !loader.main_class.is_empty() {
            self.main_class = loader.main_class.clone();
        }
        let args = &loader.arguments;
        self.arguments.game.extend(args.game.iter().cloned());
        self.arguments.jvm.extend(args.jvm.iter().cloned());
        if args.legacy_minecraft_arguments.is_some() {
            self.arguments.legacy_minecraft_arguments = args.legacy_minecraft_arguments.clone();
        }
        if loader.server_jar.is_some() {
            self.server_jar = loader.server_jar.clone();
        }
    }

    pub fn path_in(root: &Path) -> PathBuf {
        root.join(INSTANCE_MANIFEST_FILE)
    }

    pub async fn write(&self, root: &Path) -> InstallResult<PathBuf> {
        let path = Self::path_in(root);
        write_json_atomic(&path, self).await?;
        log::info!("Wrote instance manifest {:?} ({} mods)", path, self.mods.len());
        Ok(path)
    }

    /// The manifest of a previous install, if there is one.
    pub async fn read(root: &Path) -> InstallResult<Option<Self>> {
        let path = Self::path_in(root);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
