//! Cache keys and the two-scope in-memory cache registry.
//!
//! Keys are exhaustively-fielded structs with a canonical fixed-order
//! encoding, so a forgotten option is a compile error rather than a silent
//! key collision. Two independent scopes exist: page text and OCR text, each
//! independently configured and clearable.

use crate::lru::{CacheStats, LruCache, LruConfig};
use crate::normalize::NormalizedPage;
use serde::Serialize;

/// Cache key for one page's normalized text. Every field that influences the
/// output is part of the key.
#[derive(Debug, Serialize)]
pub struct PageTextKey<'a> {
    pub fingerprint: &'a str,
    pub page: u32,
    pub include_image_indexes: bool,
    pub preserve_whitespace: bool,
    pub trim_lines: bool,
    pub max_chars_per_page: Option<usize>,
}

/// Cache key for one page's OCR text. Folds in the resolved provider's
/// canonical fingerprint so differently configured providers never collide.
#[derive(Debug, Serialize)]
pub struct OcrTextKey<'a> {
    pub fingerprint: &'a str,
    pub page: u32,
    pub provider: &'a str,
}

fn encode<K: Serialize>(key: &K) -> String {
    // Field order is fixed by the struct declaration, so the encoding is
    // canonical. Serialization of these flat structs cannot fail.
    serde_json::to_string(key).expect("cache key encoding")
}

impl PageTextKey<'_> {
    pub fn encode(&self) -> String {
        encode(self)
    }
}

impl OcrTextKey<'_> {
    pub fn encode(&self) -> String {
        encode(self)
    }
}

/// Which cache scope an administrative operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    /// Page-text scope only.
    Text,
    /// OCR-text scope only.
    Ocr,
    /// Both scopes.
    All,
}

/// Configuration for both scopes.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    pub page_text: LruConfig,
    pub ocr_text: LruConfig,
}

/// Introspection snapshot of one scope.
#[derive(Debug, Clone)]
pub struct CacheReport {
    pub scope: &'static str,
    pub stats: CacheStats,
    pub keys: Vec<String>,
}

/// The two process-local cache scopes, explicitly constructed and injected
/// into whatever needs them.
pub struct ContentCaches {
    page_text: LruCache<NormalizedPage>,
    ocr_text: LruCache<String>,
}

impl ContentCaches {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            page_text: LruCache::new(config.page_text),
            ocr_text: LruCache::new(config.ocr_text),
        }
    }

    pub fn get_page_text(&self, key: &PageTextKey<'_>) -> Option<NormalizedPage> {
        self.page_text.get(&key.encode())
    }

    pub fn set_page_text(&self, key: &PageTextKey<'_>, page: NormalizedPage) {
        self.page_text.set(&key.encode(), page);
    }

    pub fn get_ocr_text(&self, key: &OcrTextKey<'_>) -> Option<String> {
        self.ocr_text.get(&key.encode())
    }

    pub fn set_ocr_text(&self, key: &OcrTextKey<'_>, text: String) {
        self.ocr_text.set(&key.encode(), text);
    }

    /// Drop all entries in the named scope.
    pub fn clear(&self, scope: CacheScope) {
        match scope {
            CacheScope::Text => self.page_text.clear(),
            CacheScope::Ocr => self.ocr_text.clear(),
            CacheScope::All => {
                self.page_text.clear();
                self.ocr_text.clear();
            }
        }
    }

    /// Entry counts, key lists, and eviction counters for both scopes.
    pub fn report(&self) -> Vec<CacheReport> {
        vec![
            CacheReport {
                scope: "text",
                stats: self.page_text.stats(),
                keys: self.page_text.keys(),
            },
            CacheReport {
                scope: "ocr",
                stats: self.ocr_text.stats(),
                keys: self.ocr_text.keys(),
            },
        ]
    }
}

impl Default for ContentCaches {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
