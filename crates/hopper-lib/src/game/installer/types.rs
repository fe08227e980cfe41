use super::config::InstallerConfig;
use super::core::artifact::ArtifactRef;
use crate::error::InstallError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::sync::watch;

/// Orchestrator states, in the order a run visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallStage {
    ResolvingManifest,
    FetchingCore,
    InstallingLoader,
    FetchingModArtifacts,
    RunningLoaderProcessors,
    Finalizing,
    Done,
    Cancelled,
    Failed,
}

impl InstallStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstallStage::Done | InstallStage::Cancelled | InstallStage::Failed
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            InstallStage::ResolvingManifest => "Resolving manifest",
            InstallStage::FetchingCore => "Downloading Minecraft",
            InstallStage::InstallingLoader => "Installing mod loader",
            InstallStage::FetchingModArtifacts => "Downloading mods",
            InstallStage::RunningLoaderProcessors => "Running loader processors",
            InstallStage::Finalizing => "Finalizing instance",
            InstallStage::Done => "Done",
            InstallStage::Cancelled => "Cancelled",
            InstallStage::Failed => "Failed",
        }
    }

    /// Share of the overall progress bar covered by this stage, as
    /// `(start, span)` fractions.
    pub fn progress_window(&self) -> (f32, f32) {
        match self {
            InstallStage::ResolvingManifest => (0.0, 0.05),
            InstallStage::FetchingCore => (0.05, 0.40),
            InstallStage::InstallingLoader => (0.45, 0.15),
            InstallStage::FetchingModArtifacts => (0.60, 0.25),
            InstallStage::RunningLoaderProcessors => (0.85, 0.10),
            InstallStage::Finalizing => (0.95, 0.05),
            InstallStage::Done | InstallStage::Cancelled | InstallStage::Failed => (1.0, 0.0),
        }
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Progress sink implemented by the presentation layer.
/// The engine only reports; it never renders anything.
pub trait ProgressReporter: Send + Sync {
    /// A new orchestrator stage started.
    fn stage_changed(&self, stage: InstallStage, label: &str);

    /// Overall progress, 0.0 to 1.0.
    fn set_progress(&self, fraction: f32);

    /// Progress within the current stage, 0.0 to 1.0, with a short label
    /// such as "Downloading libraries (12/40)".
    fn set_sub_progress(&self, fraction: f32, label: &str);

    /// Bytes transferred so far for the current pool. `total` grows as
    /// unknown sizes are learned from responses.
    fn update_bytes(&self, _transferred: u64, _total: u64) {}

    /// One artifact finished (downloaded, copied or already present).
    fn artifact_done(&self, _artifact: &ArtifactRef) {}
}

/// A progress reporter that does nothing (silent).
/// Useful for background prefetch or tests.
pub struct SilentProgressReporter;

impl ProgressReporter for SilentProgressReporter {
    fn stage_changed(&self, _stage: InstallStage, _label: &str) {}
    fn set_progress(&self, _fraction: f32) {}
    fn set_sub_progress(&self, _fraction: f32, _label: &str) {}
}

/// Read side of the cancellation flag. The engine only reads it.
#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Write side of the cancellation flag, held by the presentation layer.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelToken {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A connected handle/token pair.
    pub fn pair() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx })
    }

    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Checkpoint helper: `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), InstallError> {
        if self.is_cancelled() {
            Err(InstallError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        // Send only fails once every token is gone, at which point nobody cares.
        let _ = self.tx.send(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Client,
    Server,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Client => "client",
            Side::Server => "server",
        }
    }

    pub fn is_server(&self) -> bool {
        *self == Side::Server
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mod loader families the engine can install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    Forge,
    NeoForge,
    Fabric,
    Quilt,
    LegacyFabric,
}

impl LoaderKind {
    pub const ALL: [LoaderKind; 5] = [
        LoaderKind::Forge,
        LoaderKind::NeoForge,
        LoaderKind::Fabric,
        LoaderKind::Quilt,
        LoaderKind::LegacyFabric,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderKind::Forge => "forge",
            LoaderKind::NeoForge => "neoforge",
            LoaderKind::Fabric => "fabric",
            LoaderKind::Quilt => "quilt",
            LoaderKind::LegacyFabric => "legacyfabric",
        }
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoaderKind {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "forge" => Ok(LoaderKind::Forge),
            "neoforge" => Ok(LoaderKind::NeoForge),
            "fabric" => Ok(LoaderKind::Fabric),
            "quilt" => Ok(LoaderKind::Quilt),
            "legacyfabric" => Ok(LoaderKind::LegacyFabric),
            _ => Err(InstallError::config(format!("Unknown loader kind: {}", s))),
        }
    }
}

/// How the loader version is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "version")]
pub enum LoaderVersionSelector {
    /// Newest version the loader's metadata service offers.
    Latest,
    /// The build the loader promotes as recommended, falling back to latest
    /// where there is no such promotion.
    Recommended,
    /// A specific version, checked against the metadata service when possible.
    Exact(String),
    /// A forced override used verbatim.
    Pinned(String),
}

/// Input to a loader strategy.
#[derive(Debug, Clone)]
pub struct LoaderRequest {
    pub minecraft_version: String,
    pub selector: LoaderVersionSelector,
    pub side: Side,
    pub temp_dir: PathBuf,
}

/// Operating system types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsType {
    Windows,
    MacOS,
    Linux,
}

impl OsType {
    /// Detect the current OS
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            OsType::Windows
        } else if cfg!(target_os = "macos") {
            OsType::MacOS
        } else {
            OsType::Linux
        }
    }

    /// OS name as used by Mojang library rules and `natives` maps.
    pub fn as_str(&self) -> &'static str {
        match self {
            OsType::Windows => "windows",
            OsType::Linux => "linux",
            OsType::MacOS => "osx",
        }
    }
}

/// Architecture types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X64,
    X86,
    Arm64,
    Arm32,
}

impl Arch {
    /// Detect the current architecture
    pub fn current() -> Self {
        if cfg!(target_arch = "aarch64") {
            Arch::Arm64
        } else if cfg!(target_arch = "arm") {
            Arch::Arm32
        } else if cfg!(target_arch = "x86") {
            Arch::X86
        } else {
            Arch::X64
        }
    }

    /// Pointer width as substituted for `${arch}` in native classifiers.
    pub fn bits(&self) -> &'static str {
        match self {
            Arch::X64 | Arch::Arm64 => "64",
            Arch::X86 | Arch::Arm32 => "32",
        }
    }
}

/// Where one run puts things on disk.
///
/// Clients share libraries and versions through the data dir. Servers keep
/// everything inside the instance root so the directory can be shipped as is.
#[derive(Debug, Clone)]
pub struct InstancePaths {
    pub root: PathBuf,
    pub libraries_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub versions_dir: PathBuf,
    /// The game jar processors and launchers point at.
    pub minecraft_jar: PathBuf,
    pub version_json: PathBuf,
}

impl InstancePaths {
    pub fn resolve(config: &InstallerConfig, root: &Path, minecraft_version: &str, side: Side) -> Self {
        let versions_dir = config.versions_dir();
        let version_dir = versions_dir.join(minecraft_version);
        let (libraries_dir, minecraft_jar) = match side {
            Side::Client => (
                config.libraries_dir(),
                version_dir.join(format!("{}.jar", minecraft_version)),
            ),
            Side::Server => (
                root.join("libraries"),
                root.join(format!("minecraft_server.{}.jar", minecraft_version)),
            ),
        };
        Self {
            root: root.to_path_buf(),
            libraries_dir,
            assets_dir: config.assets_dir(),
            versions_dir,
            minecraft_jar,
            version_json: version_dir.join(format!("{}.json", minecraft_version)),
        }
    }
}
