//! Installer settings.
//!
//! URL defaults are plain constants; `InstallerConfig` carries the values an
//! install run actually uses so every endpoint can be redirected (mirrors, tests).

use crate::error::{InstallError, InstallResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const REQUEST_TIMEOUT_SECS: u64 = 120;
pub const PROCESSOR_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_CONCURRENCY: usize = 8;

// URL Constants
pub const VANILLA_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";
pub const MINECRAFT_RESOURCES_URL: &str = "https://resources.download.minecraft.net/";
pub const MINECRAFT_LIBRARIES_URL: &str = "https://libraries.minecraft.net/";
pub const FABRIC_META_URL: &str = "https://meta.fabricmc.net/v2";
pub const FABRIC_MAVEN_URL: &str = "https://maven.fabricmc.net/";
pub const QUILT_META_URL: &str = "https://meta.quiltmc.org/v3";
pub const QUILT_MAVEN_URL: &str = "https://maven.quiltmc.org/repository/release/";
pub const LEGACY_FABRIC_META_URL: &str = "https://meta.legacyfabric.net/v2";
pub const LEGACY_FABRIC_MAVEN_URL: &str = "https://maven.legacyfabric.net/";
pub const FORGE_MAVEN_URL: &str = "https://maven.minecraftforge.net/";
pub const FORGE_PROMOTIONS_URL: &str =
    "https://files.minecraftforge.net/net/minecraftforge/forge/promotions_slim.json";
pub const NEOFORGE_MAVEN_URL: &str = "https://maven.neoforged.net/releases/";
pub const NEOFORGE_VERSIONS_URL: &str =
    "https://maven.neoforged.net/api/maven/versions/releases/";

/// Remote endpoints used during an install.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub version_manifest: String,
    pub resources: String,
    pub libraries: String,
    pub fabric_meta: String,
    pub fabric_maven: String,
    pub quilt_meta: String,
    pub quilt_maven: String,
    pub legacy_fabric_meta: String,
    pub legacy_fabric_maven: String,
    pub forge_maven: String,
    pub forge_promotions: String,
    pub neoforge_maven: String,
    pub neoforge_versions: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            version_manifest: VANILLA_MANIFEST_URL.to_string(),
            resources: MINECRAFT_RESOURCES_URL.to_string(),
            libraries: MINECRAFT_LIBRARIES_URL.to_string(),
            fabric_meta: FABRIC_META_URL.to_string(),
            fabric_maven: FABRIC_MAVEN_URL.to_string(),
            quilt_meta: QUILT_META_URL.to_string(),
            quilt_maven: QUILT_MAVEN_URL.to_string(),
            legacy_fabric_meta: LEGACY_FABRIC_META_URL.to_string(),
            legacy_fabric_maven: LEGACY_FABRIC_MAVEN_URL.to_string(),
            forge_maven: FORGE_MAVEN_URL.to_string(),
            forge_promotions: FORGE_PROMOTIONS_URL.to_string(),
            neoforge_maven: NEOFORGE_MAVEN_URL.to_string(),
            neoforge_versions: NEOFORGE_VERSIONS_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Point every endpoint at one base URL, keeping the default path layout.
    /// Used to aim a whole install at a mirror or a local mock server.
    pub fn rebased(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            version_manifest: format!("{}/mc/game/version_manifest_v2.json", base),
            resources: format!("{}/resources/", base),
            libraries: format!("{}/libraries/", base),
            fabric_meta: format!("{}/fabric-meta/v2", base),
            fabric_maven: format!("{}/fabric-maven/", base),
            quilt_meta: format!("{}/quilt-meta/v3", base),
            quilt_maven: format!("{}/quilt-maven/", base),
            legacy_fabric_meta: format!("{}/legacyfabric-meta/v2", base),
            legacy_fabric_maven: format!("{}/legacyfabric-maven/", base),
            forge_maven: format!("{}/forge-maven/", base),
            forge_promotions: format!("{}/forge/promotions_slim.json", base),
            neoforge_maven: format!("{}/neoforge-maven/", base),
            neoforge_versions: format!("{}/neoforge-versions/", base),
        }
    }
}

impl Endpoints {
    fn all(&self) -> [(&'static str, &str); 13] {
        [
            ("version_manifest", &self.version_manifest),
            ("resources", &self.resources),
            ("libraries", &self.libraries),
            ("fabric_meta", &self.fabric_meta),
            ("fabric_maven", &self.fabric_maven),
            ("quilt_meta", &self.quilt_meta),
            ("quilt_maven", &self.quilt_maven),
            ("legacy_fabric_meta", &self.legacy_fabric_meta),
            ("legacy_fabric_maven", &self.legacy_fabric_maven),
            ("forge_maven", &self.forge_maven),
            ("forge_promotions", &self.forge_promotions),
            ("neoforge_maven", &self.neoforge_maven),
            ("neoforge_versions", &self.neoforge_versions),
        ]
    }

    /// Every endpoint must be an absolute http(s) URL.
    pub fn validate(&self) -> InstallResult<()> {
        for (name, value) in self.all() {
            let parsed = url::Url::parse(value)
                .map_err(|e| InstallError::config(format!("endpoint {} is not a URL ({}): {}", name, e, value)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(InstallError::config(format!(
                    "endpoint {} must use http or https: {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Settings for one installer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Shared data root holding `libraries/`, `assets/`, `versions/` and `tmp/`.
    pub data_dir: PathBuf,
    /// Worker count for download pools.
    pub concurrency: usize,
    pub request_timeout_secs: u64,
    pub hash_cache_capacity: usize,
    /// Compare hashes of existing files when deciding what to download.
    pub verify_hashes: bool,
    /// Accept loader installer jars whose sha1 sidecar disagrees.
    pub disable_installer_hash_check: bool,
    /// Java used for install profile processors; looked up on PATH when unset.
    pub java_path: Option<PathBuf>,
    pub processor_timeout_secs: u64,
    /// Overall deadline for a single pool's blocking wait.
    pub pool_deadline_secs: Option<u64>,
    pub endpoints: Endpoints,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            hash_cache_capacity: super::core::hashing::DEFAULT_CACHE_CAPACITY,
            verify_hashes: true,
            disable_installer_hash_check: false,
            java_path: None,
            processor_timeout_secs: PROCESSOR_TIMEOUT_SECS,
            pool_deadline_secs: None,
            endpoints: Endpoints::default(),
        }
    }
}

impl InstallerConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Load settings from a JSON file. Missing keys take their defaults.
    pub fn load(path: &Path) -> InstallResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: InstallerConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        log::debug!("Loaded installer config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> InstallResult<()> {
        if self.concurrency == 0 {
            return Err(InstallError::config("concurrency must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(InstallError::config("request_timeout_secs must be at least 1"));
        }
        self.endpoints.validate()
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.data_dir.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.data_dir.join("assets")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.data_dir.join("versions")
    }

    /// Parent of every run's scratch directory.
    pub fn scratch_root(&self) -> PathBuf {
        self.data_dir.join("tmp")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn processor_timeout(&self) -> Duration {
        Duration::from_secs(self.processor_timeout_secs)
    }

    pub fn pool_deadline(&self) -> Option<Duration> {
        self.pool_deadline_secs.map(Duration::from_secs)
    }

    /// The shared HTTP client for an install run.
    pub fn http_client(&self) -> InstallResult<reqwest::Client> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(self.concurrency)
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .timeout(self.request_timeout())
            .user_agent(concat!("hopper-lib/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(client)
    }
}
