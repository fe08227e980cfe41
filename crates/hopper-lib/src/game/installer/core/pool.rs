use super::artifact::ArtifactRef;
use super::downloader::{copy_artifact, fetch_artifact, ByteCounter};
use super::hashing::HashEngine;
use crate::error::{InstallError, InstallResult};
use crate::game::installer::types::{CancelToken, ProgressReporter};
use futures::stream::{self, FuturesUnordered, StreamExt};
use futures::FutureExt;
use reqwest::Client;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// What happened to an artifact that ended up present at its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactAction {
    Downloaded,
    Copied,
    AlreadyPresent,
    /// Shared its destination with an earlier artifact in the same pool,
    /// which did the actual work.
    Deduplicated,
}

#[derive(Debug, Clone)]
pub struct CompletedArtifact {
    pub artifact: ArtifactRef,
    pub action: ArtifactAction,
}

#[derive(Debug)]
pub struct FailedArtifact {
    pub artifact: ArtifactRef,
    pub error: InstallError,
}

/// Aggregate outcome of one pool execution. Per-artifact failures are
/// collected here; the caller decides whether they are fatal.
#[derive(Debug, Default)]
pub struct PoolReport {
    pub succeeded: Vec<CompletedArtifact>,
    pub failed: Vec<FailedArtifact>,
    /// Artifacts never started because of cancellation or the deadline.
    pub not_started: Vec<ArtifactRef>,
    pub cancelled: bool,
    pub timed_out: bool,
    pub bytes_transferred: u64,
}

impl PoolReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.not_started.is_empty()
    }

    pub fn count(&self, action: ArtifactAction) -> usize {
        self.succeeded.iter().filter(|c| c.action == action).count()
    }

    pub fn succeeded_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.succeeded.iter().map(|c| &c.artifact.destination)
    }

    /// Treat every artifact in the pool as mandatory: the first failure,
    /// a cancellation or a missed deadline becomes the error.
    pub fn into_required(mut self) -> InstallResult<Self> {
        if self.cancelled {
            return Err(InstallError::Cancelled);
        }
        if !self.failed.is_empty() {
            for extra in self.failed.iter().skip(1) {
                log::error!("[pool] {} also failed: {}", extra.artifact.name, extra.error);
            }
            return Err(self.failed.swap_remove(0).error);
        }
        if self.timed_out || !self.not_started.is_empty() {
            let name = self
                .not_started
                .first()
                .map(|a| a.name.clone())
                .unwrap_or_else(|| "download pool".to_string());
            return Err(InstallError::transport(name, "pool deadline reached"));
        }
        Ok(self)
    }
}

/// Result of [`DownloadPool::execute`].
pub enum PoolExecution {
    Completed(PoolReport),
    /// Fire-and-forget batch; join the handle to observe the outcome.
    Background(JoinHandle<PoolReport>),
}

/// Everything a pool needs from its surroundings, passed in explicitly.
#[derive(Clone)]
pub struct PoolContext {
    pub client: Client,
    pub hashes: Arc<HashEngine>,
    pub reporter: Arc<dyn ProgressReporter>,
    pub cancel: CancelToken,
    pub workers: usize,
    pub deadline: Option<Duration>,
    /// Prefix for sub-progress labels, e.g. "Downloading libraries".
    pub label: String,
}

impl PoolContext {
    pub fn new(
        client: Client,
        hashes: Arc<HashEngine>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            client,
            hashes,
            reporter,
            cancel,
            workers: crate::game::installer::config::DEFAULT_CONCURRENCY,
            deadline: None,
            label: "Downloading".to_string(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// A batch of artifacts executed once. Each install stage builds a fresh pool.
#[derive(Debug, Clone, Default)]
pub struct DownloadPool {
    artifacts: Vec<ArtifactRef>,
    wait_for_completion: bool,
}

struct Group {
    primary: ArtifactRef,
    duplicates: Vec<ArtifactRef>,
}

impl DownloadPool {
    pub fn new() -> Self {
        Self {
            artifacts: Vec::new(),
            wait_for_completion: true,
        }
    }

    pub fn from_artifacts(artifacts: Vec<ArtifactRef>) -> Self {
        Self {
            artifacts,
            wait_for_completion: true,
        }
    }

    /// Background pools return from `execute` immediately after dispatch.
    pub fn background(mut self) -> Self {
        self.wait_for_completion = false;
        self
    }

    pub fn waits_for_completion(&self) -> bool {
        self.wait_for_completion
    }

    pub fn push(&mut self, artifact: ArtifactRef) {
        self.artifacts.push(artifact);
    }

    pub fn extend(&mut self, artifacts: impl IntoIterator<Item = ArtifactRef>) {
        self.artifacts.extend(artifacts);
    }

    pub fn artifacts(&self) -> &[ArtifactRef] {
        &self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Sum of known sizes. Unknown sizes count as 0 here and are added to the
    /// running total once a response reports them.
    pub fn total_bytes(&self) -> u64 {
        self.artifacts.iter().filter_map(|a| a.size).sum()
    }

    /// New pool holding only the artifacts whose destination is missing or
    /// wrong. Checks run in parallel; order is preserved.
    pub async fn filter_needed(&self, hashes: &Arc<HashEngine>, workers: usize) -> DownloadPool {
        let needed: Vec<ArtifactRef> = stream::iter(self.artifacts.iter().cloned())
            .map(|artifact| {
                let hashes = hashes.clone();
                async move {
                    let check = artifact.clone();
                    let needs = tokio::task::spawn_blocking(move || hashes.needs_download(&check))
                        .await
                        .unwrap_or(true);
                    (artifact, needs)
                }
            })
            .buffered(workers.max(1))
            .filter_map(|(artifact, needs)| async move { needs.then_some(artifact) })
            .collect()
            .await;

        log::debug!(
            "filter_needed: {}/{} artifacts need work",
            needed.len(),
            self.artifacts.len()
        );

        DownloadPool {
            artifacts: needed,
            wait_for_completion: self.wait_for_completion,
        }
    }

    /// Run the pool according to its wait flag.
    pub async fn execute(self, ctx: PoolContext) -> PoolExecution {
        if self.wait_for_completion {
            PoolExecution::Completed(self.execute_all(&ctx).await)
        } else {
            log::debug!("Dispatching {} artifacts in background", self.artifacts.len());
            PoolExecution::Background(tokio::spawn(async move { self.execute_all(&ctx).await }))
        }
    }

    fn grouped(&self) -> Vec<Group> {
        let mut groups: Vec<Group> = Vec::new();
        let mut by_destination: HashMap<PathBuf, usize> = HashMap::new();
        for artifact in &self.artifacts {
            match by_destination.get(&artifact.destination) {
                Some(&idx) => groups[idx].duplicates.push(artifact.clone()),
                None => {
                    by_destination.insert(artifact.destination.clone(), groups.len());
                    groups.push(Group {
                        primary: artifact.clone(),
                        duplicates: Vec::new(),
                    });
                }
            }
        }
        groups
    }

    /// Execute every artifact on a bounded set of workers and wait for them.
    ///
    /// Destinations are deduplicated before dispatch, so one path is never
    /// written by two workers. Cancellation and the optional deadline are
    /// checked before each artifact starts; an artifact already running is
    /// allowed to finish.
    pub async fn execute_all(&self, ctx: &PoolContext) -> PoolReport {
        let groups = self.grouped();
        let total = groups.len();
        let mut report = PoolReport::default();
        if total == 0 {
            return report;
        }

        let total_bytes = groups.iter().filter_map(|g| g.primary.size).sum();
        let counter = Arc::new(ByteCounter::new(total_bytes, ctx.reporter.clone()));
        let finished = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(ctx.workers.max(1)));
        let deadline = ctx.deadline.map(|d| tokio::time::Instant::now() + d);

        log::info!("{}: {} artifacts ({} bytes known)", ctx.label, total, total_bytes);
        ctx.reporter.set_sub_progress(0.0, &format!("{} (0/{})", ctx.label, total));

        let mut running = FuturesUnordered::new();
        let mut pending: Vec<Option<Group>> = groups.into_iter().map(Some).collect();

        for idx in 0..pending.len() {
            if ctx.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let permit = match deadline {
                Some(at) => {
                    match tokio::time::timeout_at(at, semaphore.clone().acquire_owned()).await {
                        Ok(Ok(permit)) => permit,
                        Ok(Err(_)) => break,
                        Err(_) => {
                            report.timed_out = true;
                            break;
                        }
                    }
                }
                None => match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            // The flag may have flipped while waiting for a free worker.
            if ctx.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if deadline.is_some_and(|at| tokio::time::Instant::now() >= at) {
                report.timed_out = true;
                break;
            }

            let Some(artifact) = pending[idx].as_ref().map(|g| g.primary.clone()) else {
                continue;
            };

            let client = ctx.client.clone();
            let hashes = ctx.hashes.clone();
            let reporter = ctx.reporter.clone();
            let counter = counter.clone();
            let finished = finished.clone();
            let label = ctx.label.clone();

            let handle = tokio::spawn(async move {
                let result = process_artifact(&client, &hashes, &artifact, &counter).await;
                match &result {
                    Ok(action) => log::debug!("{}: {:?}", artifact.name, action),
                    Err(e) => log::warn!("{} failed: {}", artifact.name, e),
                }

                let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                let fraction = if counter.total() > 0 {
                    counter.transferred() as f32 / counter.total() as f32
                } else {
                    done as f32 / total as f32
                };
                reporter.set_sub_progress(fraction.min(1.0), &format!("{} ({}/{})", label, done, total));
                reporter.artifact_done(&artifact);
                drop(permit);
                result
            });
            running.push(handle.map(move |joined| (idx, joined)));
        }

        let mut outcomes: Vec<(usize, InstallResult<ArtifactAction>)> = Vec::with_capacity(total);
        while let Some((idx, joined)) = running.next().await {
            let result = joined.unwrap_or_else(|e| {
                Err(InstallError::Other(anyhow::anyhow!("download worker failed: {}", e)))
            });
            outcomes.push((idx, result));
        }
        outcomes.sort_by_key(|(idx, _)| *idx);

        let mut started = vec![false; pending.len()];
        for (idx, result) in outcomes {
            started[idx] = true;
            let Some(group) = pending[idx].take() else {
                continue;
            };
            match result {
                Ok(action) => {
                    report.succeeded.push(CompletedArtifact {
                        artifact: group.primary,
                        action,
                    });
                    report
                        .succeeded
                        .extend(group.duplicates.into_iter().map(|artifact| CompletedArtifact {
                            artifact,
                            action: ArtifactAction::Deduplicated,
                        }));
                }
                Err(error) => {
                    let primary_name = group.primary.name.clone();
                    report.failed.push(FailedArtifact {
                        artifact: group.primary,
                        error,
                    });
                    report
                        .failed
                        .extend(group.duplicates.into_iter().map(|artifact| FailedArtifact {
                            error: InstallError::transport(
                                &artifact.name,
                                format!("shares destination with failed artifact {}", primary_name),
                            ),
                            artifact,
                        }));
                }
            }
        }

        for (idx, slot) in pending.into_iter().enumerate() {
            if let (false, Some(group)) = (started[idx], slot) {
                report.not_started.push(group.primary);
                report.not_started.extend(group.duplicates);
            }
        }

        report.bytes_transferred = counter.transferred();
        log::info!(
            "{}: {} succeeded, {} failed, {} not started{}{}",
            ctx.label,
            report.succeeded.len(),
            report.failed.len(),
            report.not_started.len(),
            if report.cancelled { " (cancelled)" } else { "" },
            if report.timed_out { " (deadline reached)" } else { "" }
        );
        report
    }
}

async fn process_artifact(
    client: &Client,
    hashes: &Arc<HashEngine>,
    artifact: &ArtifactRef,
    counter: &ByteCounter,
) -> InstallResult<ArtifactAction> {
    let needs = {
        let hashes = hashes.clone();
        let check = artifact.clone();
        tokio::task::spawn_blocking(move || hashes.needs_download(&check))
            .await
            .unwrap_or(true)
    };
    if !needs {
        counter.add_transferred(artifact.size.unwrap_or(0));
        return Ok(ArtifactAction::AlreadyPresent);
    }

    if let Some(source) = &artifact.local_source {
        if tokio::fs::metadata(source).await.map(|m| m.is_file()).unwrap_or(false) {
            match copy_artifact(artifact, source, counter).await {
                Ok(()) => return Ok(ArtifactAction::Copied),
                Err(e) if !artifact.url.is_empty() => {
                    log::warn!(
                        "Local copy of {} from {:?} failed ({}), fetching instead",
                        artifact.name,
                        source,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    if artifact.url.is_empty() {
        return Err(InstallError::transport(
            &artifact.name,
            "no download URL and no local copy available",
        ));
    }

    fetch_artifact(client, artifact, counter).await?;
    Ok(ArtifactAction::Downloaded)
}
