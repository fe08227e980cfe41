//! The uniform pack file list every catalog format is reduced to before
//! anything is downloaded.

use crate::error::{InstallError, InstallResult};
use crate::game::installer::core::artifact::{ArtifactRef, HashAlgorithm, HashCode};
use crate::game::installer::types::Side;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path};

/// Which installs a pack file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackSide {
    Client,
    Server,
    #[default]
    Both,
}

impl PackSide {
    pub fn includes(&self, side: Side) -> bool {
        match self {
            PackSide::Both => true,
            PackSide::Client => side == Side::Client,
            PackSide::Server => side == Side::Server,
        }
    }
}

/// Where a file came from, recorded verbatim in the instance manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// `curseforge`, `modrinth`, `ftb` or `url`.
    pub catalog: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackFile {
    pub name: String,
    pub url: String,
    /// Destination relative to the instance root, `/` separated.
    pub path: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub side: PackSide,
    /// A failed download is logged and the file left out of the manifest.
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub allow_hash_failure: bool,
    #[serde(default)]
    pub provenance: Provenance,
}

impl PackFile {
    pub fn validate(&self) -> InstallResult<()> {
        if self.url.trim().is_empty() {
            return Err(InstallError::config(format!("{} has no download URL", self.name)));
        }
        url::Url::parse(&self.url).map_err(|e| {
            InstallError::config(format!("{} has an invalid download URL {}: {}", self.name, self.url, e))
        })?;
        let path = Path::new(&self.path);
        if self.path.is_empty()
            || path.is_absolute()
            || self.path.starts_with('/')
            || self.path.starts_with('\\')
            || path
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
            || self.path.split(['/', '\\']).any(|segment| segment == "..")
        {
            return Err(InstallError::config(format!(
                "{} has an invalid destination path: {}",
                self.name, self.path
            )));
        }
        Ok(())
    }

    pub fn hash_code(&self) -> InstallResult<Option<HashCode>> {
        self.hash.as_deref().map(HashCode::infer).transpose()
    }

    pub fn to_artifact(&self, instance_root: &Path) -> InstallResult<ArtifactRef> {
        self.validate()?;
        let destination = self
            .path
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .fold(instance_root.to_path_buf(), |acc, segment| acc.join(segment));
        Ok(ArtifactRef::new(self.name.clone(), self.url.clone(), destination)
            .with_optional_size(self.size)
            .with_optional_hash(self.hash_code()?)
            .allow_hash_failure(self.allow_hash_failure))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackManifest {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub files: Vec<PackFile>,
}

impl PackManifest {
    /// Reject the whole manifest if any entry is malformed, before any
    /// download starts.
    pub fn validate(&self) -> InstallResult<()> {
        for file in &self.files {
            file.validate()?;
            file.hash_code()?;
        }
        Ok(())
    }

    /// Files for `side`, in manifest order.
    pub fn files_for(&self, side: Side) -> impl Iterator<Item = &PackFile> {
        self.files.iter().filter(move |f| f.side.includes(side))
    }

    /// Reduce a Modrinth `modrinth.index.json` to the uniform list. The
    /// strongest hash the index carries wins.
    pub fn from_modrinth(index: &ModrinthIndex) -> InstallResult<Self> {
        let files = index
            .files
            .iter()
            .map(|file| {
                let url = file.downloads.first().cloned().ok_or_else(|| {
                    InstallError::config(format!("{} has no download URL", file.path))
                })?;
                let hash = [HashAlgorithm::Sha512, HashAlgorithm::Sha1]
                    .iter()
                    .find_map(|algo| file.hashes.get(algo.as_str()).cloned());
                let (side, optional) = match &file.env {
                    Some(env) => modrinth_side(env),
                    None => (PackSide::Both, false),
                };
                let name = file
                    .path
                    .rsplit('/')
                    .next()
                    .unwrap_or(&file.path)
                    .to_string();
                Ok(PackFile {
                    name,
                    url,
                    path: file.path.clone(),
                    size: Some(file.file_size),
                    hash,
                    side,
                    optional,
                    allow_hash_failure: false,
                    provenance: Provenance {
                        catalog: "modrinth".to_string(),
                        project_id: None,
                        file_id: None,
                    },
                })
            })
            .collect::<InstallResult<Vec<_>>>()?;
        Ok(Self {
            name: index.name.clone(),
            version: index.version_id.clone(),
            files,
        })
    }
}

/// Modrinth modpack index (`modrinth.index.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModrinthIndex {
    pub version_id: String,
    pub name: String,
    #[serde(default)]
    pub files: Vec<ModrinthFile>,
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModrinthFile {
    pub path: String,
    #[serde(default)]
    pub hashes: HashMap<String, String>,
    #[serde(default)]
    pub env: Option<ModrinthEnv>,
    #[serde(default)]
    pub downloads: Vec<String>,
    #[serde(default)]
    pub file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModrinthEnv {
    #[serde(default = "default_required")]
    pub client: String,
    #[serde(default = "default_required")]
    pub server: String,
}

fn default_required() -> String {
    "required".to_string()
}

fn modrinth_side(env: &ModrinthEnv) -> (PackSide, bool) {
    let client = env.client != "unsupported";
    let server = env.server != "unsupported";
    let side = match (client, server) {
        (true, false) => PackSide::Client,
        (false, true) => PackSide::Server,
        _ => PackSide::Both,
    };
    let optional = env.client == "optional" || env.server == "optional";
    (side, optional)
}
