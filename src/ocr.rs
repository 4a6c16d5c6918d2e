//! OCR decision heuristic, provider configuration, and the backend contract.
//!
//! The heuristic decides from already-extracted text and image density
//! whether invoking OCR is likely to add value, so image-light text pages
//! never pay for a backend call. Decisions are cheap to reuse but not free to
//! recompute, so they get their own small bounded cache.

use crate::lru::{LruCache, LruConfig};
use crate::ExtractError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Identifying configuration of an OCR backend. Two providers that differ in
/// any identifying field hash differently and never share cache entries.
#[derive(Debug, Clone, Serialize)]
pub struct OcrProvider {
    pub name: String,
    /// Provider type, e.g. "vision-api" or "local".
    pub kind: String,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    pub extras: BTreeMap<String, String>,
    /// Call deadline passed through to the backend; not part of the
    /// provider's identity.
    #[serde(skip)]
    pub timeout: Duration,
}

impl Default for OcrProvider {
    fn default() -> Self {
        Self {
            name: "default".into(),
            kind: "vision".into(),
            endpoint: None,
            model: None,
            language: None,
            extras: BTreeMap::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl OcrProvider {
    /// Canonical JSON of the identifying fields. Field order is fixed by the
    /// struct declaration and `extras` is a sorted map, so equal
    /// configurations always encode identically.
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).expect("provider encoding")
    }

    /// Short stable hash of the canonical form, stored with cache entries.
    pub fn provider_hash(&self) -> String {
        let digest = Sha256::digest(self.canonical().as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        hex[..16].to_string()
    }
}

/// Text extracted by a backend for one image.
#[derive(Debug, Clone)]
pub struct OcrText {
    pub provider: String,
    pub text: String,
}

/// The pluggable OCR backend. Implementations are expected to fail on error
/// or when the provider's timeout elapses.
pub trait OcrBackend: Send + Sync {
    fn perform_ocr(&self, image_base64: &str, provider: &OcrProvider)
        -> Result<OcrText, ExtractError>;
}

/// Why the heuristic decided the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrReason {
    TextTooShort,
    TextTooLong,
    NonAsciiRatioHigh,
    ImageTextRatioHigh,
    TextWithinThresholds,
}

impl OcrReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrReason::TextTooShort => "text_too_short",
            OcrReason::TextTooLong => "text_too_long",
            OcrReason::NonAsciiRatioHigh => "non_ascii_ratio_high",
            OcrReason::ImageTextRatioHigh => "image_text_ratio_high",
            OcrReason::TextWithinThresholds => "text_within_thresholds",
        }
    }
}

impl fmt::Display for OcrReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The heuristic's verdict for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcrDecision {
    pub needs_ocr: bool,
    pub reason: OcrReason,
}

/// Heuristic thresholds.
#[derive(Debug, Clone)]
pub struct OcrHeuristicConfig {
    /// Below this many characters the page clearly needs OCR.
    pub min_text_len: usize,
    /// Above this many characters OCR is clearly unnecessary.
    pub max_text_len: usize,
    /// Garbled-text trigger: at least this many non-ASCII characters...
    pub non_ascii_min_count: usize,
    /// ...making up at least this fraction of the non-whitespace text.
    pub non_ascii_min_ratio: f32,
    /// Image-dominant trigger: image ops per text character.
    pub image_text_ratio: f32,
}

impl Default for OcrHeuristicConfig {
    fn default() -> Self {
        Self {
            min_text_len: 50,
            max_text_len: 1000,
            non_ascii_min_count: 10,
            non_ascii_min_ratio: 0.3,
            image_text_ratio: 0.02,
        }
    }
}

/// Decide whether OCR is worth invoking for a page, from its extracted text
/// and image-operation count.
pub fn assess_page(text: &str, image_count: u32, config: &OcrHeuristicConfig) -> OcrDecision {
    let text_len = text.chars().count();

    if text_len < config.min_text_len {
        return OcrDecision {
            needs_ocr: true,
            reason: OcrReason::TextTooShort,
        };
    }
    if text_len > config.max_text_len {
        return OcrDecision {
            needs_ocr: false,
            reason: OcrReason::TextTooLong,
        };
    }

    // Garbled or mis-encoded extraction shows up as a high non-ASCII ratio
    // over the non-whitespace text.
    let non_ws: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    let non_ascii = non_ws.iter().filter(|c| !c.is_ascii()).count();
    if !non_ws.is_empty() {
        let ratio = non_ascii as f32 / non_ws.len() as f32;
        if non_ascii >= config.non_ascii_min_count && ratio >= config.non_ascii_min_ratio {
            return OcrDecision {
                needs_ocr: true,
                reason: OcrReason::NonAsciiRatioHigh,
            };
        }
    }

    // Image-dominant pages with sparse incidental text.
    if image_count as f32 / text_len.max(1) as f32 >= config.image_text_ratio {
        return OcrDecision {
            needs_ocr: true,
            reason: OcrReason::ImageTextRatioHigh,
        };
    }

    OcrDecision {
        needs_ocr: false,
        reason: OcrReason::TextWithinThresholds,
    }
}

/// Per-`(fingerprint, page)` decision cache, separate from the result caches.
pub struct OcrDecisionCache {
    inner: LruCache<OcrDecision>,
}

#[derive(Serialize)]
struct DecisionKey<'a> {
    fingerprint: &'a str,
    page: u32,
}

impl OcrDecisionCache {
    pub fn new() -> Self {
        Self {
            inner: LruCache::new(LruConfig {
                max_entries: 500,
                ttl: None,
            }),
        }
    }

    fn key(fingerprint: &str, page: u32) -> String {
        serde_json::to_string(&DecisionKey { fingerprint, page }).expect("decision key encoding")
    }

    pub fn get(&self, fingerprint: &str, page: u32) -> Option<OcrDecision> {
        self.inner.get(&Self::key(fingerprint, page))
    }

    pub fn set(&self, fingerprint: &str, page: u32, decision: OcrDecision) {
        self.inner.set(&Self::key(fingerprint, page), decision);
    }
}

impl Default for OcrDecisionCache {
    fn default() -> Self {
        Self::new()
    }
}
