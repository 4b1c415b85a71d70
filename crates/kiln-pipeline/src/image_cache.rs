//! Content-addressed store of optimized images.
//!
//! Keys hash the optimizer fingerprint together with the source bytes, so a
//! settings change never serves stale results. The cache lives outside the
//! build root and survives `clean`.

use std::{
    fs, io,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

use sha2::{Digest, Sha256};
use tracing::trace;

static NEXT_TEMP: AtomicU64 = AtomicU64::new(0);

/// On-disk image cache.
#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    /// Create a cache rooted at `dir`. Nothing is created until the first
    /// [`ImageCache::put`].
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache key for `bytes` optimized under `fingerprint`.
    #[must_use]
    pub fn key(fingerprint: &str, bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(fingerprint.as_bytes());
        hasher.update([0u8]);
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    /// Cached bytes for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let bytes = fs::read(self.path(key)).ok()?;
        trace!(key, "image cache hit");
        Some(bytes)
    }

    /// Store `bytes` under `key`. The entry appears atomically.
    pub fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = path.with_extension(format!(
            "{}-{}.tmp",
            std::process::id(),
            NEXT_TEMP.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp, bytes)?;
        fs::rename(&temp, &path)
    }

    fn path(&self, key: &str) -> PathBuf {
        let shard = key.get(..2).unwrap_or("00");
        self.dir.join(shard).join(key)
    }
}
