use super::artifact::{ArtifactRef, HashAlgorithm, HashCode};
use super::hashing::{hash_file, StreamHasher};
use crate::error::{InstallError, InstallResult};
use crate::game::installer::types::ProgressReporter;
use futures::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::{create_dir_all, File};
use tokio::io::AsyncWriteExt;

/// Byte accounting shared by the workers of one pool execution.
pub struct ByteCounter {
    transferred: AtomicU64,
    total: AtomicU64,
    reporter: Arc<dyn ProgressReporter>,
}

impl ByteCounter {
    pub fn new(total: u64, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            transferred: AtomicU64::new(0),
            total: AtomicU64::new(total),
            reporter,
        }
    }

    pub fn add_transferred(&self, bytes: u64) {
        let transferred = self.transferred.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.reporter
            .update_bytes(transferred, self.total.load(Ordering::Relaxed));
    }

    /// Grow the total when an artifact without a known size reports its length.
    pub fn add_total(&self, bytes: u64) {
        self.total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

fn part_path(path: &Path) -> PathBuf {
    let tmp_name = format!(
        "{}.part",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("download")
    );
    path.with_file_name(tmp_name)
}

/// Compare what was written against the artifact's expectations.
/// Mismatches are downgraded to a warning for `allow_hash_failure` artifacts.
fn verify_written(
    artifact: &ArtifactRef,
    written: u64,
    actual_hash: Option<HashCode>,
) -> InstallResult<()> {
    let mut mismatch = None;

    if let Some(expected) = artifact.size {
        if written != expected {
            mismatch = Some((format!("{} bytes", expected), format!("{} bytes", written)));
        }
    }

    if mismatch.is_none() {
        if let (Some(expected), Some(actual)) = (&artifact.hash, actual_hash) {
            if &actual != expected {
                mismatch = Some((expected.to_string(), actual.to_string()));
            } else {
                log::debug!("{} validated: {}", expected.algorithm(), actual.value());
            }
        }
    }

    match mismatch {
        None => Ok(()),
        Some((expected, actual)) if artifact.allow_hash_failure => {
            log::warn!(
                "Accepting {} despite verification mismatch (expected {}, got {})",
                artifact.name,
                expected,
                actual
            );
            Ok(())
        }
        Some((expected, actual)) => Err(InstallError::VerificationMismatch {
            artifact: artifact.name.clone(),
            expected,
            actual,
        }),
    }
}

/// Fetch one artifact over HTTP into `<destination>.part`, verify it, then
/// rename it into place. Single attempt; the caller decides what a failure means.
pub async fn fetch_artifact(
    client: &Client,
    artifact: &ArtifactRef,
    counter: &ByteCounter,
) -> InstallResult<()> {
    let path = artifact.destination();
    log::debug!("Downloading: {} -> {:?}", artifact.url, path);
    let start = Instant::now();

    if let Some(parent) = path.parent() {
        create_dir_all(parent).await?;
    }

    let response = client
        .get(&artifact.url)
        .send()
        .await
        .map_err(|e| InstallError::transport(&artifact.name, e))?;

    if !response.status().is_success() {
        return Err(InstallError::transport(
            &artifact.name,
            format!("HTTP error {}: {}", response.status(), artifact.url),
        ));
    }

    if artifact.size.is_none() {
        if let Some(len) = response.content_length() {
            counter.add_total(len);
        }
    }

    let tmp_path = part_path(path);
    let outcome = async {
        let (downloaded, streamed) = write_part(artifact, response, &tmp_path, counter).await?;
        let actual_hash = match (streamed, &artifact.hash) {
            (Some(code), _) => Some(code),
            (None, Some(expected)) => Some(hash_on_disk(&tmp_path, expected.algorithm()).await?),
            (None, None) => None,
        };
        verify_written(artifact, downloaded, actual_hash)?;
        Ok::<u64, InstallError>(downloaded)
    }
    .await;

    let downloaded = match outcome {
        Ok(downloaded) => downloaded,
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }
    };

    tokio::fs::rename(&tmp_path, path).await?;

    let secs = start.elapsed().as_secs_f64();
    log::debug!(
        "Download stats: url={}, size={} bytes, time={:.2}s, throughput={:.2} MB/s",
        artifact.url,
        downloaded,
        secs,
        (downloaded as f64 / 1024.0 / 1024.0) / secs.max(0.001)
    );
    Ok(())
}

/// Stream a response body into `tmp_path`. Digest algorithms are hashed on
/// the fly; the fingerprint is left to a pass over the written file.
async fn write_part(
    artifact: &ArtifactRef,
    response: reqwest::Response,
    tmp_path: &Path,
    counter: &ByteCounter,
) -> InstallResult<(u64, Option<HashCode>)> {
    let mut file = File::create(tmp_path).await?;
    let mut hasher = artifact
        .hash
        .as_ref()
        .and_then(|h| StreamHasher::new(h.algorithm()));
    let mut downloaded: u64 = 0;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| InstallError::transport(&artifact.name, e))?;
        file.write_all(&chunk).await?;
        if let Some(h) = hasher.as_mut() {
            h.update(&chunk);
        }
        downloaded += chunk.len() as u64;
        counter.add_transferred(chunk.len() as u64);
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok((downloaded, hasher.map(StreamHasher::finish)))
}

async fn hash_on_disk(path: &Path, algorithm: HashAlgorithm) -> InstallResult<HashCode> {
    let path = path.to_path_buf();
    let hashed = tokio::task::spawn_blocking(move || hash_file(&path, algorithm))
        .await
        .map_err(|e| InstallError::Other(anyhow::anyhow!("hash task failed: {}", e)))?;
    Ok(hashed?)
}

/// Copy an already-present file into the artifact's destination, verifying
/// the copy the same way a download is verified.
pub async fn copy_artifact(
    artifact: &ArtifactRef,
    source: &Path,
    counter: &ByteCounter,
) -> InstallResult<()> {
    let path = artifact.destination();
    log::debug!("Copying: {:?} -> {:?}", source, path);

    if let Some(parent) = path.parent() {
        create_dir_all(parent).await?;
    }

    let tmp_path = part_path(path);
    let written = tokio::fs::copy(source, &tmp_path).await?;
    if artifact.size.is_none() {
        counter.add_total(written);
    }
    counter.add_transferred(written);

    let check = match &artifact.hash {
        Some(expected) => match hash_on_disk(&tmp_path, expected.algorithm()).await {
            Ok(actual) => verify_written(artifact, written, Some(actual)),
            Err(e) => Err(e),
        },
        None => verify_written(artifact, written, None),
    };

    if let Err(e) = check {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Download JSON using an existing Client and deserialize
pub async fn download_json<T: serde::de::DeserializeOwned>(
    client: &Client,
    url: &str,
) -> InstallResult<T> {
    log::debug!("Downloading JSON: {}", url);
    let text = download_text(client, url).await?;
    Ok(serde_json::from_str(&text)?)
}

/// GET a small text resource, failing on any non-success status.
pub async fn download_text(client: &Client, url: &str) -> InstallResult<String> {
    match download_optional_text(client, url).await? {
        Some(text) => Ok(text),
        None => Err(InstallError::transport(url, "HTTP error 404 Not Found")),
    }
}

/// GET a small text resource; `None` when the server answers 404.
pub async fn download_optional_text(client: &Client, url: &str) -> InstallResult<Option<String>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| InstallError::transport(url, e))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(InstallError::transport(
            url,
            format!("HTTP error {}", response.status()),
        ));
    }

    let text = response
        .text()
        .await
        .map_err(|e| InstallError::transport(url, e))?;
    Ok(Some(text))
}

/// Extract a zip archive on disk into `dest_dir`. Entries that would escape
/// `dest_dir` are skipped.
pub async fn extract_zip(archive_path: &Path, dest_dir: &Path) -> InstallResult<usize> {
    let archive_path = archive_path.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();

    tokio::task::spawn_blocking(move || -> InstallResult<usize> {
        log::debug!("Extracting {:?} to {:?}", archive_path, dest_dir);
        std::fs::create_dir_all(&dest_dir)?;

        let file = std::fs::File::open(&archive_path)?;
        let mut archive = zip::ZipArchive::new(file)?;
        let mut extracted = 0;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let relative = match entry.enclosed_name() {
                Some(p) => p.to_path_buf(),
                None => {
                    log::warn!("Skipping unsafe zip entry: {}", entry.name());
                    continue;
                }
            };
            let outpath = dest_dir.join(relative);

            if entry.is_dir() {
                std::fs::create_dir_all(&outpath)?;
                continue;
            }
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = std::fs::File::create(&outpath)?;
            std::io::copy(&mut entry, &mut outfile)?;
            extracted += 1;
        }

        log::debug!("Zip extraction complete ({} files)", extracted);
        Ok(extracted)
    })
    .await
    .map_err(|e| InstallError::Other(anyhow::anyhow!("extract task failed: {}", e)))?
}
