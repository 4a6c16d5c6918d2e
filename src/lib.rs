//! Reading-order text extraction from positioned page content, served
//! through a layered cache.
//!
//! This library provides:
//! - Position-aware line grouping and table-region detection over decoded
//!   page content
//! - Text normalization with optional structural markers and per-page
//!   character budgets
//! - Page-selection parsing with a "sample, don't explode" guard for
//!   unbounded requests
//! - A bounded in-memory LRU/TTL cache and a multi-process-safe on-disk
//!   sidecar cache for OCR results
//! - An OCR decision heuristic that avoids paying for backend calls on
//!   text-complete pages

pub mod cache;
pub mod extractor;
pub mod lines;
pub mod lru;
pub mod normalize;
pub mod ocr;
pub mod pages;
pub mod pipeline;
pub mod sidecar;
pub mod source;
pub mod tables;
pub mod transform;

pub use cache::{CacheConfig, CacheReport, CacheScope, ContentCaches, OcrTextKey, PageTextKey};
pub use extractor::PdfSource;
pub use lines::{ContentItem, LineGroupConfig};
pub use lru::{CacheStats, LruCache, LruConfig};
pub use normalize::{NormalizeOptions, NormalizedPage};
pub use ocr::{OcrBackend, OcrDecision, OcrProvider, OcrReason, OcrText};
pub use pages::{PagePlan, PagePlanConfig, TargetPages};
pub use pipeline::{
    ContentService, ExtractOptions, ExtractOutcome, OcrOptions, OcrOrigin, OcrOutcome,
    OcrPageText, PageText, ServiceConfig,
};
pub use sidecar::{OcrSidecar, SidecarConfig};
pub use source::{DocumentSource, ImageFetch, PageContent, RasterImage, TextRun};
pub use tables::{TableDetectConfig, TableRegion};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Rejected input, naming the offending parameter. Never silently
    /// coerced.
    #[error("invalid {param}: {message}")]
    InvalidParams {
        param: &'static str,
        message: String,
    },
    /// The decoder could not read the document or a page.
    #[error("decode error: {0}")]
    Decode(String),
    /// The sidecar write lock could not be acquired in time. Fatal for that
    /// write only.
    #[error("could not acquire cache lock {path:?} after {waited_ms}ms")]
    LockTimeout { path: PathBuf, waited_ms: u64 },
    #[error("cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// The OCR backend failed or timed out.
    #[error("OCR error: {0}")]
    Ocr(String),
}

impl From<lopdf::Error> for ExtractError {
    fn from(e: lopdf::Error) -> Self {
        ExtractError::Decode(e.to_string())
    }
}
