//! Crash-safe, multi-process-safe on-disk cache for OCR results.
//!
//! One JSON sidecar file per source document, living next to it so cache and
//! source travel together. Reads never fail: a missing, unreadable, or
//! mismatched file is simply a miss. Writes are read-merge-replace cycles
//! under an exclusive lock file, so two processes caching different pages of
//! the same document at the same time never clobber each other's entries.

use crate::ExtractError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Sidecar addressing and lock protocol parameters.
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    /// Appended to the source file name to form the sidecar path.
    pub suffix: String,
    /// Poll interval while waiting for the lock file.
    pub lock_poll: Duration,
    /// Give up on the lock after this long.
    pub lock_timeout: Duration,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            suffix: ".ocr-cache.json".into(),
            lock_poll: Duration::from_millis(25),
            lock_timeout: Duration::from_millis(5000),
        }
    }
}

/// One cached page-level OCR result.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OcrPageEntry {
    pub text: String,
    #[serde(default)]
    pub provider: String,
    /// Hash of the provider configuration this entry was produced under.
    #[serde(default)]
    pub provider_hash: String,
    #[serde(default)]
    pub updated_at: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One cached per-image OCR result, keyed `"page/index"`.
pub type OcrImageEntry = OcrPageEntry;

/// The sidecar document. Unknown keys are carried through `extra` so newer
/// tool versions sharing a document directory stay compatible.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OcrSidecar {
    pub fingerprint: String,
    #[serde(default)]
    pub pdf_path: String,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
    #[serde(default)]
    pub ocr_provider: String,
    #[serde(default)]
    pub pages: BTreeMap<String, OcrPageEntry>,
    #[serde(default)]
    pub images: BTreeMap<String, OcrImageEntry>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl OcrSidecar {
    /// Look up a page entry valid under the given provider hash.
    pub fn page(&self, page: u32, provider_hash: &str) -> Option<&OcrPageEntry> {
        self.pages
            .get(&page.to_string())
            .filter(|entry| entry.provider_hash == provider_hash)
    }

    /// Look up an image entry valid under the given provider hash.
    pub fn image(&self, page: u32, index: usize, provider_hash: &str) -> Option<&OcrImageEntry> {
        self.images
            .get(&image_key(page, index))
            .filter(|entry| entry.provider_hash == provider_hash)
    }
}

/// Key for a per-image entry.
pub fn image_key(page: u32, index: usize) -> String {
    format!("{}/{}", page, index)
}

/// Deterministic sidecar path: same directory, file name plus fixed suffix.
pub fn cache_path(source: &Path, config: &SidecarConfig) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{}{}", name, config.suffix))
}

/// Read the sidecar for a source document. Any failure, and any fingerprint
/// mismatch, is a miss.
pub fn read(source: &Path, fingerprint: &str, config: &SidecarConfig) -> Option<OcrSidecar> {
    let path = cache_path(source, config);
    let data = fs::read(&path).ok()?;
    let sidecar: OcrSidecar = match serde_json::from_slice(&data) {
        Ok(s) => s,
        Err(e) => {
            warn!("ignoring unreadable OCR cache {}: {}", path.display(), e);
            return None;
        }
    };
    if sidecar.fingerprint != fingerprint {
        debug!(
            "OCR cache {} has stale fingerprint, treating as miss",
            path.display()
        );
        return None;
    }
    Some(sidecar)
}

/// Exclusive advisory lock: an atomically created `.lock` file, removed on
/// drop so it is released even when the guarded write fails.
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(path: PathBuf, config: &SidecarConfig) -> Result<Self, ExtractError> {
        let start = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if start.elapsed() >= config.lock_timeout {
                        return Err(ExtractError::LockTimeout {
                            path: path.clone(),
                            waited_ms: start.elapsed().as_millis() as u64,
                        });
                    }
                    std::thread::sleep(config.lock_poll);
                }
                Err(e) => return Err(ExtractError::Io(e)),
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}

/// Merge an update into the on-disk sidecar under the lock, then persist via
/// write-to-temp-then-rename so no reader ever observes a half-written file.
///
/// New page/image entries replace matching keys and all other keys from both
/// sides are unioned. A fingerprint change discards the prior pages and
/// images entirely and starts fresh under the new fingerprint.
pub fn merge_write(
    source: &Path,
    update: OcrSidecar,
    config: &SidecarConfig,
) -> Result<(), ExtractError> {
    let path = cache_path(source, config);
    let lock_path = PathBuf::from(format!("{}.lock", path.display()));
    let _lock = LockFile::acquire(lock_path, config)?;

    // Re-read under the lock: another process may have written since any
    // earlier read.
    let current: Option<OcrSidecar> = fs::read(&path)
        .ok()
        .and_then(|data| serde_json::from_slice(&data).ok());

    let now = now_millis();
    let merged = match current {
        Some(mut existing) if existing.fingerprint == update.fingerprint => {
            existing.pages.extend(update.pages);
            existing.images.extend(update.images);
            existing.extra.extend(update.extra);
            existing.pdf_path = update.pdf_path;
            existing.ocr_provider = update.ocr_provider;
            existing.updated_at = now;
            if existing.created_at == 0 {
                existing.created_at = now;
            }
            existing
        }
        other => {
            if other.is_some() {
                debug!(
                    "fingerprint changed for {}, discarding prior OCR cache entries",
                    path.display()
                );
            }
            OcrSidecar {
                created_at: now,
                updated_at: now,
                ..update
            }
        }
    };

    let tmp_path = PathBuf::from(format!("{}.tmp", path.display()));
    let data = serde_json::to_vec_pretty(&merged)?;
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Milliseconds since the unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
