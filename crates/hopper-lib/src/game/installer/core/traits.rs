use crate::error::InstallResult;
use crate::game::installer::core::artifact::ArtifactRef;
use crate::game::installer::modloaders::forge::processor::ProcessorRunner;
use crate::game::installer::modloaders::forge::profile::InstallProfile;
use crate::game::installer::modloaders::{LoaderContext, ResolvedLoader};
use crate::game::installer::types::{LoaderKind, LoaderRequest};
use futures::future::BoxFuture;

/// One mod loader installation protocol.
///
/// The orchestrator drives a strategy through these calls in order:
/// `resolve_version`, `download_and_extract_installer`, `install_profile`,
/// `libraries`, `run_processors`, `resolved`. Installer-based loaders only know
/// their final main class and arguments after `run_processors`.
pub trait LoaderStrategy: Send + Sync {
    fn kind(&self) -> LoaderKind;

    /// Pick the concrete loader version for `request`.
    fn resolve_version<'a>(
        &'a mut self,
        ctx: &'a LoaderContext,
        request: &'a LoaderRequest,
    ) -> BoxFuture<'a, InstallResult<String>>;

    /// Fetch and unpack the loader's bootstrap into the request's temp dir.
    /// A no-op for loaders that only publish a JSON profile.
    fn download_and_extract_installer<'a>(
        &'a mut self,
        ctx: &'a LoaderContext,
    ) -> BoxFuture<'a, InstallResult<()>>;

    /// The processor pipeline description, with well-known tokens injected.
    /// `None` for loaders without processors.
    fn install_profile(&self, ctx: &LoaderContext) -> InstallResult<Option<InstallProfile>>;

    /// Every artifact the loader needs on disk before its processors run and
    /// the instance can launch.
    fn libraries(&self, ctx: &LoaderContext) -> InstallResult<Vec<ArtifactRef>>;

    /// Run the processor chain or, for meta-API loaders on the server side,
    /// assemble the server launch jar.
    fn run_processors<'a>(
        &'a mut self,
        ctx: &'a LoaderContext,
        runner: &'a dyn ProcessorRunner,
    ) -> BoxFuture<'a, InstallResult<()>>;

    /// Final runtime requirements.
    fn resolved(&self, ctx: &LoaderContext) -> InstallResult<ResolvedLoader>;
}
