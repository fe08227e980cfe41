use crate::error::{InstallError, InstallResult};
use crate::game::installer::core::pool::PoolReport;
use crate::game::installer::transaction::ScratchSpace;
use crate::game::installer::types::{CancelToken, InstallStage, ProgressReporter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Mutable state of one install run. Owned by the orchestrator and never
/// shared between runs.
pub struct InstallSession {
    stage: InstallStage,
    bytes_transferred: u64,
    bytes_total: u64,
    cancel: CancelToken,
    reporter: Arc<dyn ProgressReporter>,
    scratch: ScratchSpace,
}

impl InstallSession {
    pub fn start(
        scratch_root: &Path,
        cancel: CancelToken,
        reporter: Arc<dyn ProgressReporter>,
    ) -> InstallResult<Self> {
        let scratch = ScratchSpace::create(scratch_root)?;
        let stage = InstallStage::ResolvingManifest;
        reporter.stage_changed(stage, stage.label());
        reporter.set_progress(0.0);
        log::info!("[install:{}] {}", scratch.run_id(), stage.label());
        Ok(Self {
            stage,
            bytes_transferred: 0,
            bytes_total: 0,
            cancel,
            reporter,
            scratch,
        })
    }

    pub fn stage(&self) -> InstallStage {
        self.stage
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// A directory inside the scratch space; removed with it on cleanup.
    pub fn scratch_subdir(&self, name: &str) -> InstallResult<PathBuf> {
        self.scratch.subdir(name)
    }

    /// Move to `next`. Only the immediate successor of the current stage is
    /// accepted, plus `Cancelled`/`Failed` from any non-terminal stage.
    pub fn advance(&mut self, next: InstallStage) -> InstallResult<()> {
        let allowed = if self.stage.is_terminal() {
            false
        } else {
            match next {
                InstallStage::Cancelled | InstallStage::Failed => true,
                _ => successor(self.stage) == Some(next),
            }
        };
        if !allowed {
            return Err(InstallError::config(format!(
                "invalid stage transition {:?} -> {:?}",
                self.stage, next
            )));
        }

        self.stage = next;
        log::info!("[install:{}] {}", self.scratch.run_id(), next.label());
        self.reporter.stage_changed(next, next.label());
        self.reporter.set_progress(next.progress_window().0);
        Ok(())
    }

    /// Fraction of the current stage, mapped onto the overall bar.
    pub fn stage_progress(&self, fraction: f32) {
        let (start, span) = self.stage.progress_window();
        self.reporter
            .set_progress(start + span * fraction.clamp(0.0, 1.0));
    }

    pub fn record_pool(&mut self, report: &PoolReport) {
        self.bytes_transferred += report.bytes_transferred;
        self.bytes_total += report
            .succeeded
            .iter()
            .filter_map(|c| c.artifact.size)
            .sum::<u64>();
    }

    pub fn bytes(&self) -> (u64, u64) {
        (self.bytes_transferred, self.bytes_total)
    }

    /// Remove the run's scratch space, loader downloads and extracted
    /// installers included. Failures are logged; a leftover scratch dir never
    /// changes the outcome of the run.
    pub fn cleanup(&mut self) {
        if let Err(e) = self.scratch.cleanup() {
            log::warn!("{}", e);
        }
    }
}

fn successor(stage: InstallStage) -> Option<InstallStage> {
    use InstallStage::*;
    match stage {
        ResolvingManifest => Some(FetchingCore),
        FetchingCore => Some(InstallingLoader),
        InstallingLoader => Some(FetchingModArtifacts),
        FetchingModArtifacts => Some(RunningLoaderProcessors),
        RunningLoaderProcessors => Some(Finalizing),
        Finalizing => Some(Done),
        Done | Cancelled | Failed => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::installer::types::SilentProgressReporter;

    fn session(root: &Path) -> InstallSession {
        InstallSession::start(root, CancelToken::never(), Arc::new(SilentProgressReporter)).unwrap()
    }

    #[test]
    fn stages_only_move_forward_one_step() {
        let root = tempfile::tempdir().unwrap();
        let mut s = session(root.path());
        assert!(s.advance(InstallStage::InstallingLoader).is_err());
        s.advance(InstallStage::FetchingCore).unwrap();
        assert!(s.advance(InstallStage::FetchingCore).is_err());
        assert!(s.advance(InstallStage::ResolvingManifest).is_err());
        s.advance(InstallStage::Failed).unwrap();
        assert!(s.advance(InstallStage::Cancelled).is_err());
        assert_eq!(s.stage(), InstallStage::Failed);
    }

    #[test]
    fn full_walk_reaches_done() {
        let root = tempfile::tempdir().unwrap();
        let mut s = session(root.path());
        let mut stage = s.stage();
        while let Some(next) = successor(stage) {
            s.advance(next).unwrap();
            stage = next;
        }
        assert_eq!(s.stage(), InstallStage::Done);
    }

    #[test]
    fn cleanup_removes_extracted_installers() {
        let root = tempfile::tempdir().unwrap();
        let mut s = session(&root.path().join("tmp"));
        let scratch = s.scratch_dir().to_path_buf();
        let loader = s.scratch_subdir("loader").unwrap();
        assert!(loader.starts_with(&scratch));
        let extracted = loader.join("forge-installer").join("maven");
        std::fs::create_dir_all(&extracted).unwrap();
        std::fs::write(extracted.join("forge.jar"), b"jar").unwrap();

        s.cleanup();
        assert!(!scratch.exists());
        assert!(root.path().join("tmp").exists());
        s.cleanup();
    }
}
