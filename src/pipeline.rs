//! Extraction and OCR orchestration with write-through caching.
//!
//! A page-text request flows page selection, then per page: decoder, line
//! grouping, table detection, normalization, with results written through the
//! in-memory page cache. An OCR request flows memory cache, disk sidecar,
//! decision heuristic, backend call, then write-through to both caches.
//! Batch work is bounded: a fixed number of sources in flight, and pages
//! within a source processed in fixed-size chunks.

use crate::cache::{CacheConfig, CacheReport, CacheScope, ContentCaches, OcrTextKey, PageTextKey};
use crate::lines::{self, ImageContent, LineGroupConfig, TextContent};
use crate::normalize::{normalize_page, NormalizeOptions};
use crate::ocr::{
    assess_page, OcrBackend, OcrDecisionCache, OcrHeuristicConfig, OcrProvider, OcrReason,
};
use crate::pages::{plan_pages, resolve_target_pages, PagePlanConfig};
use crate::sidecar::{self, OcrPageEntry, OcrSidecar, SidecarConfig};
use crate::source::{DocumentSource, ImageFetch};
use crate::tables::TableDetectConfig;
use crate::transform;
use crate::ExtractError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Sources processed concurrently in one batch.
const SOURCE_BATCH: usize = 3;
/// Pages of one source processed concurrently in one chunk.
const PAGE_BATCH: usize = 6;

/// All tuning for one service instance.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub cache: CacheConfig,
    pub lines: LineGroupConfig,
    pub tables: TableDetectConfig,
    pub pages: PagePlanConfig,
    pub sidecar: SidecarConfig,
    pub ocr: OcrHeuristicConfig,
}

/// Options for one page-text extraction call.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Explicit page list, 1-indexed.
    pub pages: Option<Vec<i64>>,
    /// Range string like `"1-3,5,7-"`.
    pub page_range: Option<String>,
    /// Lift the sampling guard when no pages are named.
    pub allow_full_document: bool,
    /// Insert structural markers (tables, image placements).
    pub include_image_indexes: bool,
    pub preserve_whitespace: bool,
    pub trim_lines: bool,
    pub max_chars_per_page: Option<usize>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            pages: None,
            page_range: None,
            allow_full_document: false,
            include_image_indexes: false,
            preserve_whitespace: false,
            trim_lines: true,
            max_chars_per_page: None,
        }
    }
}

/// Extracted text for one page.
#[derive(Debug, Clone)]
pub struct PageText {
    pub page: u32,
    pub lines: Vec<String>,
    pub text: String,
    pub truncated: bool,
    pub from_cache: bool,
}

/// Result of one extraction call: best effort with warnings.
#[derive(Debug, Clone, Default)]
pub struct ExtractOutcome {
    pub pages: Vec<PageText>,
    pub warnings: Vec<String>,
    /// Requested pages beyond the document end (soft failure).
    pub invalid_pages: Vec<u32>,
    /// Present when the sampling guard capped the request.
    pub guard_warning: Option<String>,
}

/// Options for one OCR call.
#[derive(Debug, Clone, Default)]
pub struct OcrOptions {
    pub pages: Option<Vec<i64>>,
    pub page_range: Option<String>,
    pub allow_full_document: bool,
    /// Skip the decision heuristic and always invoke the backend.
    pub force: bool,
}

/// Where an OCR result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrOrigin {
    MemoryCache,
    DiskCache,
    Backend,
    /// The heuristic decided OCR was unnecessary; `text` holds the plain
    /// extracted text.
    Skipped,
}

/// OCR output for one page.
#[derive(Debug, Clone)]
pub struct OcrPageText {
    pub page: u32,
    pub text: String,
    pub origin: OcrOrigin,
    /// The heuristic's reasoning, when it ran.
    pub reason: Option<OcrReason>,
}

/// Result of one OCR call.
#[derive(Debug, Clone, Default)]
pub struct OcrOutcome {
    pub pages: Vec<OcrPageText>,
    pub warnings: Vec<String>,
    pub guard_warning: Option<String>,
}

/// The extraction service: explicitly constructed caches plus tuning,
/// injected wherever content is served from.
pub struct ContentService {
    caches: ContentCaches,
    decisions: OcrDecisionCache,
    config: ServiceConfig,
}

impl ContentService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            caches: ContentCaches::new(config.cache.clone()),
            decisions: OcrDecisionCache::new(),
            config,
        }
    }

    /// Extract reading-ordered text for the selected pages of one document.
    pub fn extract_pages(
        &self,
        source: &dyn DocumentSource,
        options: &ExtractOptions,
    ) -> Result<ExtractOutcome, ExtractError> {
        let target = resolve_target_pages(
            options.pages.as_deref(),
            options.page_range.as_deref(),
            &self.config.pages,
        )?;
        let plan = plan_pages(
            &target,
            source.page_count(),
            options.allow_full_document,
            &self.config.pages,
        );

        let mut pages = Vec::with_capacity(plan.pages.len());
        let mut warnings = target.warnings;
        for chunk in plan.pages.chunks(PAGE_BATCH) {
            let processed: Vec<(PageText, Option<String>)> = chunk
                .par_iter()
                .map(|&page| self.extract_single(source, page, options))
                .collect();
            for (page, warning) in processed {
                pages.push(page);
                warnings.extend(warning);
            }
        }

        if !plan.invalid_pages.is_empty() {
            warnings.push(format!(
                "{} requested pages exceed the document's {} pages and were skipped",
                plan.invalid_pages.len(),
                source.page_count()
            ));
        }

        Ok(ExtractOutcome {
            pages,
            warnings,
            invalid_pages: plan.invalid_pages,
            guard_warning: plan.guard_warning,
        })
    }

    /// Extract several documents in bounded concurrent batches.
    pub fn extract_batch(
        &self,
        sources: &[&dyn DocumentSource],
        options: &ExtractOptions,
    ) -> Vec<Result<ExtractOutcome, ExtractError>> {
        let mut outcomes = Vec::with_capacity(sources.len());
        for chunk in sources.chunks(SOURCE_BATCH) {
            let processed: Vec<Result<ExtractOutcome, ExtractError>> = chunk
                .par_iter()
                .map(|source| self.extract_pages(*source, options))
                .collect();
            outcomes.extend(processed);
        }
        outcomes
    }

    /// One page: cache check, decode, group, normalize, write through. A
    /// decoder failure becomes a placeholder page plus a warning; it never
    /// aborts the surrounding call.
    fn extract_single(
        &self,
        source: &dyn DocumentSource,
        page: u32,
        options: &ExtractOptions,
    ) -> (PageText, Option<String>) {
        let key = PageTextKey {
            fingerprint: source.fingerprint(),
            page,
            include_image_indexes: options.include_image_indexes,
            preserve_whitespace: options.preserve_whitespace,
            trim_lines: options.trim_lines,
            max_chars_per_page: options.max_chars_per_page,
        };

        if let Some(cached) = self.caches.get_page_text(&key) {
            debug!("page text cache hit for page {}", page);
            return (
                PageText {
                    page,
                    lines: cached.lines,
                    text: cached.text,
                    truncated: cached.truncated,
                    from_cache: true,
                },
                None,
            );
        }

        let content = match source.page_content(page) {
            Ok(content) => content,
            Err(e) => {
                warn!("page {} extraction failed: {}", page, e);
                let placeholder = format!("[Page {} extraction failed: {}]", page, e);
                return (
                    PageText {
                        page,
                        lines: vec![placeholder.clone()],
                        text: placeholder,
                        truncated: false,
                        from_cache: false,
                    },
                    Some(format!("page {}: {}", page, e)),
                );
            }
        };

        let runs: Vec<TextContent> = content
            .runs
            .iter()
            .map(|run| {
                let (x, y) = transform::apply(&content.viewport, &run.transform);
                TextContent {
                    x,
                    y,
                    text: run.text.clone(),
                    font_size: run.height,
                    width: run.width,
                }
            })
            .collect();

        let mut items = lines::order_items(runs, &self.config.lines);
        let images: Vec<ImageContent> = content
            .images
            .iter()
            .map(|op| {
                let (x, y) = transform::apply(&content.viewport, &op.transform);
                ImageContent {
                    x,
                    y,
                    width: op.width,
                    height: op.height,
                    format: op.format.clone(),
                }
            })
            .collect();
        lines::merge_images(&mut items, images);

        let normalize_options = NormalizeOptions {
            preserve_whitespace: options.preserve_whitespace,
            trim_lines: options.trim_lines,
            max_chars_per_page: options.max_chars_per_page,
            insert_markers: options.include_image_indexes,
        };
        let normalized = normalize_page(
            &items,
            &normalize_options,
            &self.config.lines,
            &self.config.tables,
        );
        self.caches.set_page_text(&key, normalized.clone());

        (
            PageText {
                page,
                lines: normalized.lines,
                text: normalized.text,
                truncated: normalized.truncated,
                from_cache: false,
            },
            None,
        )
    }

    /// OCR the selected pages: memory cache, disk sidecar, decision
    /// heuristic, backend, write-through.
    pub fn ocr_pages(
        &self,
        source: &dyn DocumentSource,
        backend: &dyn OcrBackend,
        provider: &OcrProvider,
        options: &OcrOptions,
    ) -> Result<OcrOutcome, ExtractError> {
        let target = resolve_target_pages(
            options.pages.as_deref(),
            options.page_range.as_deref(),
            &self.config.pages,
        )?;
        let plan = plan_pages(
            &target,
            source.page_count(),
            options.allow_full_document,
            &self.config.pages,
        );

        let fingerprint = source.fingerprint().to_string();
        let provider_key = provider.canonical();
        let provider_hash = provider.provider_hash();
        let disk = source
            .source_path()
            .and_then(|path| sidecar::read(path, &fingerprint, &self.config.sidecar));

        let mut pages = Vec::with_capacity(plan.pages.len());
        let mut warnings = target.warnings;
        let mut pending: BTreeMap<String, OcrPageEntry> = BTreeMap::new();

        for &page in &plan.pages {
            let key = OcrTextKey {
                fingerprint: &fingerprint,
                page,
                provider: &provider_key,
            };

            if let Some(text) = self.caches.get_ocr_text(&key) {
                debug!("OCR cache hit for page {}", page);
                pages.push(OcrPageText {
                    page,
                    text,
                    origin: OcrOrigin::MemoryCache,
                    reason: None,
                });
                continue;
            }

            if let Some(entry) = disk.as_ref().and_then(|s| s.page(page, &provider_hash)) {
                debug!("OCR disk cache hit for page {}", page);
                self.caches.set_ocr_text(&key, entry.text.clone());
                pages.push(OcrPageText {
                    page,
                    text: entry.text.clone(),
                    origin: OcrOrigin::DiskCache,
                    reason: None,
                });
                continue;
            }

            if !options.force {
                let decision = self.page_decision(source, &fingerprint, page);
                if !decision.needs_ocr {
                    let text = source.page_text(page).unwrap_or_default();
                    pages.push(OcrPageText {
                        page,
                        text,
                        origin: OcrOrigin::Skipped,
                        reason: Some(decision.reason),
                    });
                    continue;
                }
            }

            match source.rasterize_page(page, provider.timeout) {
                Ok(ImageFetch::Ready(image)) => {
                    let encoded = BASE64.encode(&image.data);
                    match backend.perform_ocr(&encoded, provider) {
                        Ok(result) => {
                            self.caches.set_ocr_text(&key, result.text.clone());
                            pending.insert(
                                page.to_string(),
                                OcrPageEntry {
                                    text: result.text.clone(),
                                    provider: result.provider,
                                    provider_hash: provider_hash.clone(),
                                    updated_at: sidecar::now_millis(),
                                    extra: BTreeMap::new(),
                                },
                            );
                            pages.push(OcrPageText {
                                page,
                                text: result.text,
                                origin: OcrOrigin::Backend,
                                reason: None,
                            });
                        }
                        Err(e) => warnings.push(format!("page {}: OCR failed: {}", page, e)),
                    }
                }
                Ok(ImageFetch::TimedOut) => {
                    warnings.push(format!("page {}: image retrieval timed out", page));
                }
                Err(e) => warnings.push(format!("page {}: {}", page, e)),
            }
        }

        // One merged write for everything the backend produced. A lock
        // timeout here is fatal for the write, and so for the call.
        if !pending.is_empty() {
            if let Some(path) = source.source_path() {
                let update = OcrSidecar {
                    fingerprint: fingerprint.clone(),
                    pdf_path: path.display().to_string(),
                    ocr_provider: provider.name.clone(),
                    pages: pending,
                    ..Default::default()
                };
                sidecar::merge_write(path, update, &self.config.sidecar)?;
            }
        }

        Ok(OcrOutcome {
            pages,
            warnings,
            guard_warning: plan.guard_warning,
        })
    }

    /// OCR one embedded image, write-through to both caches.
    pub fn ocr_image(
        &self,
        source: &dyn DocumentSource,
        backend: &dyn OcrBackend,
        provider: &OcrProvider,
        page: u32,
        index: usize,
    ) -> Result<OcrPageText, ExtractError> {
        let fingerprint = source.fingerprint().to_string();
        let provider_key = format!("{}#{}", provider.canonical(), index);
        let provider_hash = provider.provider_hash();
        let key = OcrTextKey {
            fingerprint: &fingerprint,
            page,
            provider: &provider_key,
        };

        if let Some(text) = self.caches.get_ocr_text(&key) {
            return Ok(OcrPageText {
                page,
                text,
                origin: OcrOrigin::MemoryCache,
                reason: None,
            });
        }

        let disk = source
            .source_path()
            .and_then(|path| sidecar::read(path, &fingerprint, &self.config.sidecar));
        if let Some(entry) = disk.as_ref().and_then(|s| s.image(page, index, &provider_hash)) {
            self.caches.set_ocr_text(&key, entry.text.clone());
            return Ok(OcrPageText {
                page,
                text: entry.text.clone(),
                origin: OcrOrigin::DiskCache,
                reason: None,
            });
        }

        let image = match source.rasterize_image(page, index, provider.timeout)? {
            ImageFetch::Ready(image) => image,
            ImageFetch::TimedOut => {
                return Err(ExtractError::Ocr(format!(
                    "image {}/{} retrieval timed out",
                    page, index
                )))
            }
        };
        let result = backend.perform_ocr(&BASE64.encode(&image.data), provider)?;
        self.caches.set_ocr_text(&key, result.text.clone());

        if let Some(path) = source.source_path() {
            let mut images = BTreeMap::new();
            images.insert(
                sidecar::image_key(page, index),
                OcrPageEntry {
                    text: result.text.clone(),
                    provider: result.provider.clone(),
                    provider_hash,
                    updated_at: sidecar::now_millis(),
                    extra: BTreeMap::new(),
                },
            );
            let update = OcrSidecar {
                fingerprint,
                pdf_path: path.display().to_string(),
                ocr_provider: provider.name.clone(),
                images,
                ..Default::default()
            };
            sidecar::merge_write(path, update, &self.config.sidecar)?;
        }

        Ok(OcrPageText {
            page,
            text: result.text,
            origin: OcrOrigin::Backend,
            reason: None,
        })
    }

    fn page_decision(
        &self,
        source: &dyn DocumentSource,
        fingerprint: &str,
        page: u32,
    ) -> crate::ocr::OcrDecision {
        if let Some(decision) = self.decisions.get(fingerprint, page) {
            return decision;
        }
        let text = source.page_text(page).unwrap_or_default();
        let image_count = source
            .page_content(page)
            .map(|c| c.images.len() as u32)
            .unwrap_or(0);
        let decision = assess_page(&text, image_count, &self.config.ocr);
        self.decisions.set(fingerprint, page, decision);
        decision
    }

    /// Entry counts, key lists, and eviction counters per scope.
    pub fn cache_report(&self) -> Vec<CacheReport> {
        self.caches.report()
    }

    /// Drop cached results in the named scope.
    pub fn clear_cache(&self, scope: CacheScope) {
        self.caches.clear(scope);
    }
}

impl Default for ContentService {
    fn default() -> Self {
        Self::new(ServiceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OcrText;
    use crate::source::{ImageOp, PageContent, RasterImage, TextRun};
    use crate::transform::IDENTITY;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FakeSource {
        fingerprint: String,
        path: Option<PathBuf>,
        pages: Vec<PageContent>,
        plain_text: Vec<String>,
        fail_pages: HashSet<u32>,
        content_calls: AtomicU32,
    }

    impl FakeSource {
        fn new(pages: Vec<PageContent>) -> Self {
            let plain_text = pages
                .iter()
                .map(|p| {
                    p.runs
                        .iter()
                        .map(|r| r.text.as_str())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect();
            Self {
                fingerprint: "fake-fp".into(),
                path: None,
                pages,
                plain_text,
                fail_pages: HashSet::new(),
                content_calls: AtomicU32::new(0),
            }
        }

        fn text_page(lines: &[&str]) -> PageContent {
            let runs = lines
                .iter()
                .enumerate()
                .map(|(i, text)| TextRun {
                    text: text.to_string(),
                    transform: [1.0, 0.0, 0.0, 1.0, 72.0, 100.0 + i as f32 * 20.0],
                    height: Some(12.0),
                    width: None,
                })
                .collect();
            PageContent {
                viewport: IDENTITY,
                runs,
                images: vec![],
            }
        }
    }

    impl DocumentSource for FakeSource {
        fn fingerprint(&self) -> &str {
            &self.fingerprint
        }

        fn source_path(&self) -> Option<&Path> {
            self.path.as_deref()
        }

        fn page_count(&self) -> u32 {
            self.pages.len() as u32
        }

        fn page_content(&self, page: u32) -> Result<PageContent, ExtractError> {
            self.content_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_pages.contains(&page) {
                return Err(ExtractError::Decode(format!("page {} unreadable", page)));
            }
            self.pages
                .get(page as usize - 1)
                .cloned()
                .ok_or_else(|| ExtractError::Decode(format!("page {} not found", page)))
        }

        fn page_text(&self, page: u32) -> Result<String, ExtractError> {
            self.plain_text
                .get(page as usize - 1)
                .cloned()
                .ok_or_else(|| ExtractError::Decode(format!("page {} not found", page)))
        }

        fn rasterize_image(
            &self,
            page: u32,
            index: usize,
            _timeout: Duration,
        ) -> Result<ImageFetch, ExtractError> {
            let content = self.page_content(page)?;
            let op = content
                .images
                .get(index)
                .ok_or_else(|| ExtractError::Decode("no such image".into()))?;
            Ok(ImageFetch::Ready(RasterImage {
                data: vec![0xFF, 0xD8, 0xFF],
                format: op.format.clone(),
                width: op.width,
                height: op.height,
            }))
        }

        fn rasterize_page(&self, page: u32, timeout: Duration) -> Result<ImageFetch, ExtractError> {
            let content = self.page_content(page)?;
            if content.images.is_empty() {
                return Ok(ImageFetch::Ready(RasterImage {
                    data: vec![0xFF, 0xD8, 0xFF],
                    format: Some("jpeg".into()),
                    width: 612,
                    height: 792,
                }));
            }
            self.rasterize_image(page, 0, timeout)
        }
    }

    struct FakeBackend {
        calls: AtomicU32,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
            }
        }
    }

    impl OcrBackend for FakeBackend {
        fn perform_ocr(
            &self,
            _image_base64: &str,
            provider: &OcrProvider,
        ) -> Result<OcrText, ExtractError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(OcrText {
                provider: provider.name.clone(),
                text: format!("ocr result {}", call),
            })
        }
    }

    fn ten_page_source() -> FakeSource {
        FakeSource::new(
            (0..10)
                .map(|i| {
                    let line = format!("page {} body text", i + 1);
                    FakeSource::text_page(&[line.as_str()])
                })
                .collect(),
        )
    }

    #[test]
    fn test_sampling_guard_limits_pages() {
        let service = ContentService::default();
        let source = ten_page_source();
        let outcome = service
            .extract_pages(&source, &ExtractOptions::default())
            .unwrap();
        assert_eq!(outcome.pages.len(), 5);
        assert!(outcome.guard_warning.is_some());
    }

    #[test]
    fn test_allow_full_document_processes_everything() {
        let service = ContentService::default();
        let source = ten_page_source();
        let outcome = service
            .extract_pages(
                &source,
                &ExtractOptions {
                    allow_full_document: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(outcome.pages.len(), 10);
        assert!(outcome.guard_warning.is_none());
        assert_eq!(outcome.pages[9].text, "page 10 body text");
    }

    #[test]
    fn test_results_ordered_by_page() {
        let service = ContentService::default();
        let source = ten_page_source();
        let outcome = service
            .extract_pages(
                &source,
                &ExtractOptions {
                    allow_full_document: true,
                    ..Default::default()
                },
            )
            .unwrap();
        let pages: Vec<u32> = outcome.pages.iter().map(|p| p.page).collect();
        assert_eq!(pages, (1..=10).collect::<Vec<u32>>());
    }

    #[test]
    fn test_second_extract_hits_cache() {
        let service = ContentService::default();
        let source = ten_page_source();
        let options = ExtractOptions {
            pages: Some(vec![1, 2]),
            ..Default::default()
        };

        let first = service.extract_pages(&source, &options).unwrap();
        assert!(first.pages.iter().all(|p| !p.from_cache));
        let calls_after_first = source.content_calls.load(Ordering::SeqCst);

        let second = service.extract_pages(&source, &options).unwrap();
        assert!(second.pages.iter().all(|p| p.from_cache));
        assert_eq!(source.content_calls.load(Ordering::SeqCst), calls_after_first);
        assert_eq!(first.pages[0].text, second.pages[0].text);
    }

    #[test]
    fn test_option_change_misses_cache() {
        let service = ContentService::default();
        let source = ten_page_source();
        let options = ExtractOptions {
            pages: Some(vec![1]),
            ..Default::default()
        };
        service.extract_pages(&source, &options).unwrap();

        let different = ExtractOptions {
            max_chars_per_page: Some(5),
            ..options
        };
        let outcome = service.extract_pages(&source, &different).unwrap();
        assert!(!outcome.pages[0].from_cache);
        assert!(outcome.pages[0].truncated);
    }

    #[test]
    fn test_failed_page_becomes_placeholder_with_warning() {
        let service = ContentService::default();
        let mut source = ten_page_source();
        source.fail_pages.insert(2);

        let outcome = service
            .extract_pages(
                &source,
                &ExtractOptions {
                    pages: Some(vec![1, 2, 3]),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(outcome.pages.len(), 3);
        assert!(outcome.pages[1].text.contains("extraction failed"));
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].starts_with("page 2"));
    }

    #[test]
    fn test_invalid_pages_reported_not_fatal() {
        let service = ContentService::default();
        let source = ten_page_source();
        let outcome = service
            .extract_pages(
                &source,
                &ExtractOptions {
                    pages: Some(vec![1, 99]),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(outcome.pages.len(), 1);
        assert_eq!(outcome.invalid_pages, vec![99]);
        assert!(!outcome.warnings.is_empty());
    }

    #[test]
    fn test_bad_page_spec_is_fatal() {
        let service = ContentService::default();
        let source = ten_page_source();
        let err = service
            .extract_pages(
                &source,
                &ExtractOptions {
                    page_range: Some("5-3".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidParams { .. }));
    }

    #[test]
    fn test_batch_processes_all_sources() {
        let service = ContentService::default();
        let a = ten_page_source();
        let b = ten_page_source();
        let c = ten_page_source();
        let d = ten_page_source();
        let sources: Vec<&dyn DocumentSource> = vec![&a, &b, &c, &d];
        let outcomes = service.extract_batch(&sources, &ExtractOptions::default());
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|o| o.is_ok()));
    }

    #[test]
    fn test_ocr_heuristic_skips_text_heavy_page() {
        let service = ContentService::default();
        let long_line = "plenty of extracted text ".repeat(50);
        let source = FakeSource::new(vec![FakeSource::text_page(&[long_line.as_str()])]);
        let backend = FakeBackend::new();

        let outcome = service
            .ocr_pages(
                &source,
                &backend,
                &OcrProvider::default(),
                &OcrOptions::default(),
            )
            .unwrap();
        assert_eq!(outcome.pages[0].origin, OcrOrigin::Skipped);
        assert_eq!(outcome.pages[0].reason, Some(OcrReason::TextTooLong));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ocr_backend_called_for_sparse_page() {
        let service = ContentService::default();
        let source = FakeSource::new(vec![FakeSource::text_page(&["tiny"])]);
        let backend = FakeBackend::new();

        let outcome = service
            .ocr_pages(
                &source,
                &backend,
                &OcrProvider::default(),
                &OcrOptions::default(),
            )
            .unwrap();
        assert_eq!(outcome.pages[0].origin, OcrOrigin::Backend);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        // Second call is served from memory.
        let again = service
            .ocr_pages(
                &source,
                &backend,
                &OcrProvider::default(),
                &OcrOptions::default(),
            )
            .unwrap();
        assert_eq!(again.pages[0].origin, OcrOrigin::MemoryCache);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ocr_force_bypasses_heuristic() {
        let service = ContentService::default();
        let long_line = "plenty of extracted text ".repeat(50);
        let source = FakeSource::new(vec![FakeSource::text_page(&[long_line.as_str()])]);
        let backend = FakeBackend::new();

        let outcome = service
            .ocr_pages(
                &source,
                &backend,
                &OcrProvider::default(),
                &OcrOptions {
                    force: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(outcome.pages[0].origin, OcrOrigin::Backend);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ocr_writes_and_reads_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let pdf_path = dir.path().join("doc.pdf");
        std::fs::write(&pdf_path, b"stub").unwrap();

        let service = ContentService::default();
        let mut source = FakeSource::new(vec![FakeSource::text_page(&["tiny"])]);
        source.path = Some(pdf_path.clone());
        let backend = FakeBackend::new();
        let provider = OcrProvider::default();

        let outcome = service
            .ocr_pages(&source, &backend, &provider, &OcrOptions::default())
            .unwrap();
        assert_eq!(outcome.pages[0].origin, OcrOrigin::Backend);

        // A fresh service (empty memory cache) must hit the sidecar.
        let fresh = ContentService::default();
        let outcome = fresh
            .ocr_pages(&source, &backend, &provider, &OcrOptions::default())
            .unwrap();
        assert_eq!(outcome.pages[0].origin, OcrOrigin::DiskCache);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ocr_provider_change_misses_caches() {
        let dir = tempfile::tempdir().unwrap();
        let pdf_path = dir.path().join("doc.pdf");
        std::fs::write(&pdf_path, b"stub").unwrap();

        let service = ContentService::default();
        let mut source = FakeSource::new(vec![FakeSource::text_page(&["tiny"])]);
        source.path = Some(pdf_path);
        let backend = FakeBackend::new();

        service
            .ocr_pages(
                &source,
                &backend,
                &OcrProvider::default(),
                &OcrOptions::default(),
            )
            .unwrap();

        let mut other = OcrProvider::default();
        other.model = Some("different-model".into());
        let outcome = service
            .ocr_pages(&source, &backend, &other, &OcrOptions::default())
            .unwrap();
        assert_eq!(outcome.pages[0].origin, OcrOrigin::Backend);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ocr_image_round_trip() {
        let service = ContentService::default();
        let mut page = FakeSource::text_page(&["tiny"]);
        page.images.push(ImageOp {
            name: "Im1".into(),
            transform: IDENTITY,
            width: 640,
            height: 480,
            format: Some("jpeg".into()),
        });
        let source = FakeSource::new(vec![page]);
        let backend = FakeBackend::new();
        let provider = OcrProvider::default();

        let first = service
            .ocr_image(&source, &backend, &provider, 1, 0)
            .unwrap();
        assert_eq!(first.origin, OcrOrigin::Backend);
        let second = service
            .ocr_image(&source, &backend, &provider, 1, 0)
            .unwrap();
        assert_eq!(second.origin, OcrOrigin::MemoryCache);
        assert_eq!(first.text, second.text);
    }

    #[test]
    fn test_cache_admin_surface() {
        let service = ContentService::default();
        let source = ten_page_source();
        service
            .extract_pages(
                &source,
                &ExtractOptions {
                    pages: Some(vec![1]),
                    ..Default::default()
                },
            )
            .unwrap();

        let report = service.cache_report();
        assert_eq!(report[0].stats.entries, 1);
        service.clear_cache(CacheScope::All);
        assert!(service.cache_report().iter().all(|r| r.stats.entries == 0));
    }
}
