pub mod config;
pub mod core;
pub mod manifest;
pub mod modloaders;
pub mod pack;
pub mod session;
pub mod transaction;
pub mod types;
pub mod vanilla;

use crate::error::{ErrorKind, InstallError, InstallResult};
use self::config::InstallerConfig;
use self::core::hashing::HashEngine;
use self::core::pool::{DownloadPool, PoolReport};
use self::core::traits::LoaderStrategy;
use self::manifest::{InstalledMod, InstanceManifest};
use self::modloaders::forge::parser::extract_main_class_from_jar;
use self::modloaders::forge::processor::{JavaProcessorRunner, ProcessorRunner};
use self::modloaders::{LaunchArguments, LoaderContext, LoaderRegistry};
use self::pack::{PackFile, PackManifest};
use self::session::InstallSession;
use self::types::{
    CancelToken, InstallStage, InstancePaths, LoaderKind, LoaderRequest, LoaderVersionSelector,
    ProgressReporter, Side,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Which loader to install, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderChoice {
    pub kind: LoaderKind,
    pub selector: LoaderVersionSelector,
}

/// One instance to install or update.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// Instance directory. Existing content is updated in place, never removed.
    pub root: PathBuf,
    pub minecraft_version: String,
    pub side: Side,
    pub loader: Option<LoaderChoice>,
    pub pack: PackManifest,
}

/// What the presentation layer sees when a run fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallFailure {
    pub stage: InstallStage,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug)]
pub enum InstallOutcome {
    Done(InstanceManifest),
    /// Cancelled while `stage` was running.
    Cancelled { stage: InstallStage },
    Failed(InstallFailure),
}

impl InstallOutcome {
    pub fn stage(&self) -> InstallStage {
        match self {
            InstallOutcome::Done(_) => InstallStage::Done,
            InstallOutcome::Cancelled { .. } => InstallStage::Cancelled,
            InstallOutcome::Failed(_) => InstallStage::Failed,
        }
    }
}

/// Drives one instance through
/// `RESOLVING_MANIFEST → FETCHING_CORE → INSTALLING_LOADER →
/// FETCHING_MOD_ARTIFACTS → RUNNING_LOADER_PROCESSORS → FINALIZING → DONE`.
pub struct InstanceInstaller {
    config: Arc<InstallerConfig>,
    reporter: Arc<dyn ProgressReporter>,
    hashes: Arc<HashEngine>,
    registry: LoaderRegistry,
    runner: Arc<dyn ProcessorRunner>,
}

/// Per-run state that outlives a single stage.
struct RunState {
    ctx: LoaderContext,
    strategy: Option<Box<dyn LoaderStrategy>>,
    vanilla: Option<vanilla::VersionInfo>,
    mods: Vec<InstalledMod>,
}

impl InstanceInstaller {
    pub fn new(config: InstallerConfig, reporter: Arc<dyn ProgressReporter>) -> Self {
        let hashes = Arc::new(
            HashEngine::new(config.hash_cache_capacity).with_hash_checks(config.verify_hashes),
        );
        let runner = Arc::new(JavaProcessorRunner::from_config(&config));
        Self {
            config: Arc::new(config),
            reporter,
            hashes,
            registry: LoaderRegistry::standard(),
            runner,
        }
    }

    pub fn with_processor_runner(mut self, runner: Arc<dyn ProcessorRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Share one hash cache across several installers.
    pub fn with_hash_engine(mut self, hashes: Arc<HashEngine>) -> Self {
        self.hashes = hashes;
        self
    }

    pub fn with_registry(mut self, registry: LoaderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    /// Run an install to a terminal state. Temp dirs created by the run are
    /// removed whatever the outcome.
    pub async fn install(&self, request: InstallRequest, cancel: CancelToken) -> InstallOutcome {
        log::info!(
            "Starting installation: minecraft={}, side={}, loader={:?}, root={:?}",
            request.minecraft_version,
            request.side,
            request.loader,
            request.root
        );

        let mut session = match self
            .config
            .validate()
            .and_then(|_| InstallSession::start(&self.config.scratch_root(), cancel, self.reporter.clone()))
        {
            Ok(session) => session,
            Err(err) => {
                return InstallOutcome::Failed(InstallFailure {
                    stage: InstallStage::ResolvingManifest,
                    kind: err.kind(),
                    message: err.to_string(),
                })
            }
        };

        let result = self.run(&mut session, &request).await;
        let stage = session.stage();
        let outcome = match result {
            Ok(manifest) => InstallOutcome::Done(manifest),
            Err(err) if err.is_cancelled() || session.is_cancelled() => {
                log::warn!("Installation cancelled during {}", stage.label());
                if let Err(e) = session.advance(InstallStage::Cancelled) {
                    log::debug!("{}", e);
                }
                InstallOutcome::Cancelled { stage }
            }
            Err(err) => {
                log::error!("Installation failed during {}: {}", stage.label(), err);
                if let Err(e) = session.advance(InstallStage::Failed) {
                    log::debug!("{}", e);
                }
                InstallOutcome::Failed(InstallFailure {
                    stage,
                    kind: err.kind(),
                    message: err.to_string(),
                })
            }
        };

        session.cleanup();
        let (transferred, total) = session.bytes();
        log::info!(
            "Installation finished as {:?} ({} bytes downloaded, {} bytes verified)",
            outcome.stage(),
            transferred,
            total
        );
        outcome
    }

    async fn run(&self, session: &mut InstallSession, request: &InstallRequest) -> InstallResult<InstanceManifest> {
        let mut state = self.resolve_manifest(session, request).await?;

        session.cancel_token().check()?;
        session.advance(InstallStage::FetchingCore)?;
        self.fetch_core(session, &mut state).await?;

        session.cancel_token().check()?;
        session.advance(InstallStage::InstallingLoader)?;
        self.install_loader(session, &mut state).await?;

        session.cancel_token().check()?;
        session.advance(InstallStage::FetchingModArtifacts)?;
        self.fetch_mods(session, &mut state, &request.pack).await?;

        session.cancel_token().check()?;
        session.advance(InstallStage::RunningLoaderProcessors)?;
        if let Some(strategy) = state.strategy.as_mut() {
            strategy.run_processors(&state.ctx, self.runner.as_ref()).await?;
        }

        session.cancel_token().check()?;
        session.advance(InstallStage::Finalizing)?;
        let manifest = self.finalize(&state, &request.pack).await?;

        session.advance(InstallStage::Done)?;
        Ok(manifest)
    }

    /// Everything that can fail as a configuration error is settled here,
    /// before the first large download.
    async fn resolve_manifest(
        &self,
        session: &mut InstallSession,
        request: &InstallRequest,
    ) -> InstallResult<RunState> {
        request.pack.validate()?;
        if request.minecraft_version.trim().is_empty() {
            return Err(InstallError::config("minecraft version is required"));
        }

        let mut strategy = request
            .loader
            .as_ref()
            .map(|choice| self.registry.create(choice.kind))
            .transpose()?;

        tokio::fs::create_dir_all(&request.root).await?;
        let loader_temp = session.scratch_subdir("loader")?;

        let loader_request = LoaderRequest {
            minecraft_version: request.minecraft_version.clone(),
            selector: request
                .loader
                .as_ref()
                .map(|c| c.selector.clone())
                .unwrap_or(LoaderVersionSelector::Latest),
            side: request.side,
            temp_dir: loader_temp,
        };
        let ctx = LoaderContext {
            client: self.config.http_client()?,
            config: self.config.clone(),
            hashes: self.hashes.clone(),
            reporter: self.reporter.clone(),
            cancel: session.cancel_token().clone(),
            paths: InstancePaths::resolve(&self.config, &request.root, &request.minecraft_version, request.side),
            request: loader_request,
        };

        let info = vanilla::fetch_version_info(&ctx).await?;
        session.stage_progress(0.5);

        if let Some(strategy) = strategy.as_mut() {
            let version = strategy.resolve_version(&ctx, &ctx.request).await?;
            log::info!("Resolved {} version {}", strategy.kind(), version);
        }
        session.stage_progress(1.0);

        Ok(RunState {
            ctx,
            strategy,
            vanilla: Some(info),
            mods: Vec::new(),
        })
    }

    async fn fetch_core(&self, session: &mut InstallSession, state: &mut RunState) -> InstallResult<()> {
        let ctx = &state.ctx;
        let info = state
            .vanilla
            .as_ref()
            .ok_or_else(|| InstallError::config("version metadata not resolved"))?;
        let core = vanilla::core_artifacts(ctx, info)?;

        let report = ctx.fetch_required(core.all(), "Downloading Minecraft").await?;
        session.record_pool(&report);
        session.stage_progress(0.4);

        if let Some(index) = &core.asset_index {
            session.cancel_token().check()?;
            let objects = vanilla::asset_objects(ctx, index).await?;
            let report = ctx.fetch_required(objects, "Downloading assets").await?;
            session.record_pool(&report);
        }
        session.stage_progress(0.9);

        if !core.natives.is_empty() {
            let natives_dir = ctx
                .paths
                .versions_dir
                .join(ctx.minecraft_version())
                .join("natives");
            let extracted = vanilla::extract_natives(core.natives.clone(), natives_dir).await?;
            log::debug!("Extracted {} native files", extracted);
        }
        session.stage_progress(1.0);
        Ok(())
    }

    async fn install_loader(&self, session: &mut InstallSession, state: &mut RunState) -> InstallResult<()> {
        let Some(strategy) = state.strategy.as_mut() else {
            log::debug!("No mod loader requested");
            return Ok(());
        };
        let ctx = &state.ctx;

        strategy.download_and_extract_installer(ctx).await?;
        session.stage_progress(0.3);

        if let Some(profile) = strategy.install_profile(ctx)? {
            log::debug!(
                "Install profile {} declares {} processors",
                profile.version_id,
                profile.processors_for(ctx.side()).count()
            );
        }

        let libraries = strategy.libraries(ctx)?;
        let label = format!("Downloading {} libraries", strategy.kind());
        let report = ctx.fetch_required(libraries, &label).await?;
        session.record_pool(&report);
        session.stage_progress(1.0);
        Ok(())
    }

    /// Optional files that fail are left out of the instance manifest; any
    /// other failure fails the run.
    async fn fetch_mods(
        &self,
        session: &mut InstallSession,
        state: &mut RunState,
        pack: &PackManifest,
    ) -> InstallResult<()> {
        let ctx = &state.ctx;
        let files: Vec<&PackFile> = pack.files_for(ctx.side()).collect();
        let mut by_destination = HashMap::new();
        let mut artifacts = Vec::with_capacity(files.len());
        for file in &files {
            let artifact = file.to_artifact(&ctx.paths.root)?;
            by_destination.insert(artifact.destination.clone(), *file);
            artifacts.push(artifact);
        }

        let pool = DownloadPool::from_artifacts(artifacts);
        let report = pool
            .execute_all(&ctx.pool_context("Downloading mods"))
            .await;
        session.record_pool(&report);
        let skipped = tolerate_optional_failures(report, &by_destination)?;

        state.mods = files
            .iter()
            .filter(|f| !skipped.iter().any(|s| s == &f.path))
            .map(|f| InstalledMod::from(*f))
            .collect();
        session.stage_progress(1.0);
        Ok(())
    }

    async fn finalize(&self, state: &RunState, pack: &PackManifest) -> InstallResult<InstanceManifest> {
        let ctx = &state.ctx;
        let mut manifest = InstanceManifest::new(pack.name.clone(), ctx.minecraft_version(), ctx.side());
        manifest.pack_version = pack.version.clone();

        if let Some(info) = &state.vanilla {
            manifest.main_class = info.main_class.clone();
            manifest.arguments =
                LaunchArguments::from_version_json(info.arguments.as_ref(), info.minecraft_arguments.clone());
        }
        if ctx.side().is_server() {
            let jar = ctx.paths.minecraft_jar.clone();
            manifest.server_jar = jar.file_name().map(|n| n.to_string_lossy().into_owned());
            match tokio::task::spawn_blocking(move || extract_main_class_from_jar(&jar)).await {
                Ok(Ok(main_class)) => manifest.main_class = main_class,
                Ok(Err(e)) => log::warn!("Could not read server main class: {}", e),
                Err(e) => log::warn!("Could not read server main class: {}", e),
            }
        }
        if let Some(strategy) = &state.strategy {
            manifest.apply_loader(&strategy.resolved(ctx)?);
        }
        manifest.mods = state.mods.clone();

        manifest.write(&ctx.paths.root).await?;
        Ok(manifest)
    }
}

/// Split pool failures into tolerated (optional files) and fatal ones.
/// Returns the pack paths of the tolerated failures.
fn tolerate_optional_failures(
    mut report: PoolReport,
    files: &HashMap<PathBuf, &PackFile>,
) -> InstallResult<Vec<String>> {
    let mut skipped = Vec::new();
    let mut fatal = Vec::new();
    for failure in report.failed.drain(..) {
        match files.get(&failure.artifact.destination) {
            Some(file) if file.optional => {
                log::warn!("Skipping optional file {}: {}", file.name, failure.error);
                skipped.push(file.path.clone());
            }
            _ => fatal.push(failure),
        }
    }
    report.failed = fatal;
    report.into_required()?;
    Ok(skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::installer::core::artifact::ArtifactRef;
    use crate::game::installer::core::pool::FailedArtifact;
    use crate::game::installer::pack::{PackSide, Provenance};

    fn pack_file(path: &str, optional: bool) -> PackFile {
        PackFile {
            name: path.to_string(),
            url: format!("https://cdn.example/{}", path),
            path: path.to_string(),
            size: None,
            hash: None,
            side: PackSide::Both,
            optional,
            allow_hash_failure: false,
            provenance: Provenance::default(),
        }
    }

    fn failure(dest: &str) -> FailedArtifact {
        FailedArtifact {
            artifact: ArtifactRef::new(dest, "", dest),
            error: InstallError::transport(dest, "HTTP 404"),
        }
    }

    #[test]
    fn optional_failures_are_skipped() {
        let optional = pack_file("mods/extra.jar", true);
        let mut files = HashMap::new();
        files.insert(PathBuf::from("mods/extra.jar"), &optional);

        let report = PoolReport {
            failed: vec![failure("mods/extra.jar")],
            ..Default::default()
        };
        let skipped = tolerate_optional_failures(report, &files).unwrap();
        assert_eq!(skipped, vec!["mods/extra.jar".to_string()]);
    }

    #[test]
    fn required_failure_is_fatal() {
        let required = pack_file("mods/core.jar", false);
        let mut files = HashMap::new();
        files.insert(PathBuf::from("mods/core.jar"), &required);

        let report = PoolReport {
            failed: vec![failure("mods/core.jar")],
            ..Default::default()
        };
        let err = tolerate_optional_failures(report, &files).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
    }

    #[test]
    fn outcome_stage_is_terminal() {
        let outcome = InstallOutcome::Cancelled {
            stage: InstallStage::FetchingCore,
        };
        assert!(outcome.stage().is_terminal());
    }
}
