use super::artifact::{ArtifactRef, HashAlgorithm, HashCode};
use sha1::{Digest, Sha1};
use sha2::{Sha256, Sha512};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

const READ_CHUNK_SIZE: usize = 16384;
pub const DEFAULT_CACHE_CAPACITY: usize = 127;

/// Bytes removed before computing a fingerprint: TAB, LF, CR, SPACE.
fn is_fingerprint_whitespace(b: u8) -> bool {
    matches!(b, 9 | 10 | 13 | 32)
}

/// Incremental hasher for the digest algorithms.
///
/// The fingerprint is not one of them: it seeds its state with the stripped
/// length, so it cannot be computed in a single pass over unseen input.
pub enum StreamHasher {
    Md5(md5::Context),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl StreamHasher {
    /// `None` for algorithms that need two passes over the input.
    pub fn new(algorithm: HashAlgorithm) -> Option<Self> {
        match algorithm {
            HashAlgorithm::Md5 => Some(StreamHasher::Md5(md5::Context::new())),
            HashAlgorithm::Sha1 => Some(StreamHasher::Sha1(Sha1::new())),
            HashAlgorithm::Sha256 => Some(StreamHasher::Sha256(Sha256::new())),
            HashAlgorithm::Sha512 => Some(StreamHasher::Sha512(Sha512::new())),
            HashAlgorithm::Fingerprint => None,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            StreamHasher::Md5(ctx) => ctx.consume(chunk),
            StreamHasher::Sha1(h) => h.update(chunk),
            StreamHasher::Sha256(h) => h.update(chunk),
            StreamHasher::Sha512(h) => h.update(chunk),
        }
    }

    pub fn finish(self) -> HashCode {
        match self {
            StreamHasher::Md5(ctx) => HashCode::Md5(format!("{:x}", ctx.compute())),
            StreamHasher::Sha1(h) => HashCode::Sha1(format!("{:x}", h.finalize())),
            StreamHasher::Sha256(h) => HashCode::Sha256(format!("{:x}", h.finalize())),
            StreamHasher::Sha512(h) => HashCode::Sha512(format!("{:x}", h.finalize())),
        }
    }
}

const MURMUR_M: u32 = 0x5bd1e995;
const MURMUR_R: u32 = 24;
const FINGERPRINT_SEED: u32 = 1;

/// MurmurHash2 (32-bit, little-endian blocks) fed one byte at a time.
/// Up to three bytes are carried between chunks until a block is full.
struct Murmur2 {
    h: u32,
    tail: [u8; 4],
    tail_len: usize,
}

impl Murmur2 {
    fn new(seed: u32, len: u32) -> Self {
        Self {
            h: seed ^ len,
            tail: [0; 4],
            tail_len: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        self.tail[self.tail_len] = byte;
        self.tail_len += 1;
        if self.tail_len == 4 {
            let mut k = u32::from_le_bytes(self.tail);
            k = k.wrapping_mul(MURMUR_M);
            k ^= k >> MURMUR_R;
            k = k.wrapping_mul(MURMUR_M);
            self.h = self.h.wrapping_mul(MURMUR_M) ^ k;
            self.tail_len = 0;
        }
    }

    fn finish(self) -> u32 {
        let mut h = self.h;
        if self.tail_len >= 3 {
            h ^= (self.tail[2] as u32) << 16;
        }
        if self.tail_len >= 2 {
            h ^= (self.tail[1] as u32) << 8;
        }
        if self.tail_len >= 1 {
            h ^= self.tail[0] as u32;
            h = h.wrapping_mul(MURMUR_M);
        }
        h ^= h >> 13;
        h = h.wrapping_mul(MURMUR_M);
        h ^= h >> 15;
        h
    }
}

fn stripped(chunk: &[u8]) -> impl Iterator<Item = u8> + '_ {
    chunk
        .iter()
        .copied()
        .filter(|b| !is_fingerprint_whitespace(*b))
}

/// Read `path` in fixed-size chunks, handing each one to `f`.
fn for_each_chunk(path: &Path, mut f: impl FnMut(&[u8])) -> std::io::Result<()> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut buffer = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            return Ok(());
        }
        f(&buffer[..n]);
    }
}

/// CurseForge fingerprint of a file. The first pass counts the stripped
/// length the hash is seeded with, the second mixes the stripped bytes.
fn fingerprint_file(path: &Path) -> std::io::Result<HashCode> {
    let mut len: u64 = 0;
    for_each_chunk(path, |chunk| len += stripped(chunk).count() as u64)?;

    let mut murmur = Murmur2::new(FINGERPRINT_SEED, len as u32);
    for_each_chunk(path, |chunk| stripped(chunk).for_each(|b| murmur.push(b)))?;
    Ok(HashCode::Fingerprint(murmur.finish()))
}

/// Hash an in-memory buffer.
pub fn hash_bytes(bytes: &[u8], algorithm: HashAlgorithm) -> HashCode {
    match StreamHasher::new(algorithm) {
        Some(mut hasher) => {
            hasher.update(bytes);
            hasher.finish()
        }
        None => {
            let data: Vec<u8> = stripped(bytes).collect();
            HashCode::Fingerprint(murmur2::murmur2(&data, FINGERPRINT_SEED))
        }
    }
}

/// Hash a file by reading it in fixed-size chunks; it is never held in
/// memory whole.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> std::io::Result<HashCode> {
    let Some(mut hasher) = StreamHasher::new(algorithm) else {
        return fingerprint_file(path);
    };
    for_each_chunk(path, |chunk| hasher.update(chunk))?;
    Ok(hasher.finish())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: PathBuf,
    algorithm: HashAlgorithm,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    len: u64,
    modified: Option<SystemTime>,
    code: HashCode,
    last_used: u64,
}

/// Small least-recently-used map. Capacity is in the low hundreds, so eviction
/// scans for the oldest tick instead of maintaining a linked list.
struct LruCache {
    capacity: usize,
    tick: u64,
    entries: HashMap<CacheKey, CacheEntry>,
}

impl LruCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tick: 0,
            entries: HashMap::with_capacity(capacity),
        }
    }

    fn get(&mut self, key: &CacheKey, len: u64, modified: Option<SystemTime>) -> Option<HashCode> {
        self.tick += 1;
        let tick = self.tick;
        let stale = match self.entries.get_mut(key) {
            Some(entry) if entry.len == len && entry.modified == modified => {
                entry.last_used = tick;
                return Some(entry.code.clone());
            }
            Some(_) => true,
            None => false,
        };
        if stale {
            self.entries.remove(key);
        }
        None
    }

    fn insert(&mut self, key: CacheKey, len: u64, modified: Option<SystemTime>, code: HashCode) {
        if self.capacity == 0 {
            return;
        }
        self.tick += 1;
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                len,
                modified,
                code,
                last_used: self.tick,
            },
        );
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Computes and compares content hashes, memoising file hashes keyed by
/// path, size and mtime.
///
/// Shared between download workers through an `Arc`; the cache is the only
/// mutable state and sits behind a mutex.
pub struct HashEngine {
    cache: Mutex<LruCache>,
    verify_hashes: bool,
}

impl Default for HashEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl HashEngine {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            verify_hashes: true,
        }
    }

    /// Disable hash comparison in `needs_download`; size checks still apply.
    pub fn with_hash_checks(mut self, enabled: bool) -> Self {
        self.verify_hashes = enabled;
        self
    }

    pub fn verifies_hashes(&self) -> bool {
        self.verify_hashes
    }

    /// Hash a file, consulting the cache first. Entries whose recorded size or
    /// mtime no longer match the file are dropped and recomputed.
    pub fn hash(&self, path: &Path, algorithm: HashAlgorithm) -> std::io::Result<HashCode> {
        let metadata = std::fs::metadata(path)?;
        let len = metadata.len();
        let modified = metadata.modified().ok();
        let key = CacheKey {
            path: path.to_path_buf(),
            algorithm,
        };

        if let Some(code) = self.lock_cache().get(&key, len, modified) {
            log::trace!("Hash cache hit: {:?}", path);
            return Ok(code);
        }

        let code = hash_file(path, algorithm)?;
        self.lock_cache().insert(key, len, modified, code.clone());
        Ok(code)
    }

    /// Hash a file bypassing the cache, for files that may have been rewritten
    /// within the filesystem's mtime granularity.
    pub fn hash_uncached(&self, path: &Path, algorithm: HashAlgorithm) -> std::io::Result<HashCode> {
        hash_file(path, algorithm)
    }

    pub fn hash_bytes(&self, bytes: &[u8], algorithm: HashAlgorithm) -> HashCode {
        hash_bytes(bytes, algorithm)
    }

    /// Whether `artifact` has to be fetched. Never fails: anything that prevents
    /// proving the destination is correct counts as "needs download".
    pub fn needs_download(&self, artifact: &ArtifactRef) -> bool {
        if artifact.is_unverifiable() {
            return true;
        }

        let path = artifact.destination();
        let metadata = match std::fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return true,
            Err(_) => return true,
        };

        if let Some(expected) = artifact.size {
            if metadata.len() != expected {
                log::debug!(
                    "Size mismatch for {} ({} != {}), needs download",
                    artifact.name,
                    metadata.len(),
                    expected
                );
                return true;
            }
        }

        if !self.verify_hashes {
            return false;
        }

        if let Some(expected) = &artifact.hash {
            return match self.hash(path, expected.algorithm()) {
                Ok(actual) if &actual == expected => false,
                Ok(actual) => {
                    log::debug!(
                        "Hash mismatch for {} ({} != {}), needs download",
                        artifact.name,
                        actual,
                        expected
                    );
                    true
                }
                Err(e) => {
                    log::warn!("Could not hash {:?}: {}", path, e);
                    true
                }
            };
        }

        false
    }

    pub fn cached_entries(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LruCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
