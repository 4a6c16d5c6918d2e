//! Boundary contracts for the external document decoder.
//!
//! The decoder owns all parsing: given raw document bytes it produces pages,
//! and per page an ordered list of positioned text runs, the image-paint
//! operations from the drawing-operation list, and a viewport transform. This
//! crate only consumes those outputs; `crate::extractor` ships one
//! implementation backed by lopdf.

use crate::transform::Matrix;
use crate::ExtractError;
use std::path::Path;
use std::time::Duration;

/// One positioned text run as produced by the decoder for a page.
#[derive(Debug, Clone)]
pub struct TextRun {
    /// The decoded string for this run.
    pub text: String,
    /// The run's own transform in the page's native coordinate space.
    pub transform: Matrix,
    /// Rendered text height, used as the font size where known.
    pub height: Option<f32>,
    /// Measured advance width of the run, where the decoder knows it.
    pub width: Option<f32>,
}

/// An image-paint operation extracted from a page's drawing operations.
#[derive(Debug, Clone)]
pub struct ImageOp {
    /// Resource name of the painted image.
    pub name: String,
    /// Placement transform in the page's native coordinate space.
    pub transform: Matrix,
    /// Intrinsic pixel width, 0 when the decoder could not resolve it.
    pub width: u32,
    /// Intrinsic pixel height, 0 when the decoder could not resolve it.
    pub height: u32,
    /// Image format hint (e.g. "jpeg"), if known.
    pub format: Option<String>,
}

/// Decoded content of one page.
#[derive(Debug, Clone)]
pub struct PageContent {
    /// Maps the page's native coordinate space to top-down viewport space.
    pub viewport: Matrix,
    /// Text runs in stream order.
    pub runs: Vec<TextRun>,
    /// Image-paint operations in stream order.
    pub images: Vec<ImageOp>,
}

/// A rasterized image handed back by the decoder.
#[derive(Debug, Clone)]
pub struct RasterImage {
    /// Raw encoded image bytes.
    pub data: Vec<u8>,
    /// Format of `data`, if known.
    pub format: Option<String>,
    pub width: u32,
    pub height: u32,
}

/// Outcome of a bounded-wait image retrieval.
#[derive(Debug, Clone)]
pub enum ImageFetch {
    /// The image was produced within the deadline.
    Ready(RasterImage),
    /// The decoder could not produce the image in time.
    TimedOut,
}

/// The external document decoder.
///
/// `Send + Sync` so sources can be shared across the bounded batch workers.
pub trait DocumentSource: Send + Sync {
    /// Stable identifier for the document's content, used to validate cache
    /// entries.
    fn fingerprint(&self) -> &str;

    /// Filesystem path of the source document, if it has one. The on-disk
    /// OCR cache is a sidecar of this path; path-less sources skip it.
    fn source_path(&self) -> Option<&Path>;

    /// Total number of pages in the document.
    fn page_count(&self) -> u32;

    /// Positioned content for one page (1-indexed).
    fn page_content(&self, page: u32) -> Result<PageContent, ExtractError>;

    /// Plain extracted text for one page, used by the OCR decision heuristic.
    fn page_text(&self, page: u32) -> Result<String, ExtractError>;

    /// Retrieve one embedded image by its index in the page's image-paint
    /// sequence, waiting at most `timeout`.
    fn rasterize_image(
        &self,
        page: u32,
        index: usize,
        timeout: Duration,
    ) -> Result<ImageFetch, ExtractError>;

    /// Rasterize a whole page for OCR, waiting at most `timeout`.
    fn rasterize_page(&self, page: u32, timeout: Duration) -> Result<ImageFetch, ExtractError>;
}
