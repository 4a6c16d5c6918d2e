//! Built-in document source backed by lopdf.
//!
//! Walks page content streams tracking graphics and text state to produce
//! positioned text runs and image-paint operations. Parsing itself (object
//! model, stream decoding, font encodings) is lopdf's job; this module only
//! consumes decoded operations.

use crate::source::{DocumentSource, ImageFetch, ImageOp, PageContent, RasterImage, TextRun};
use crate::transform::{self, Matrix, IDENTITY};
use crate::ExtractError;
use log::debug;
use lopdf::{Document, Object, ObjectId};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A loaded PDF document exposing positioned page content.
pub struct PdfSource {
    doc: Document,
    path: Option<PathBuf>,
    fingerprint: String,
    pages: BTreeMap<u32, ObjectId>,
}

impl PdfSource {
    /// Load from a file, keeping the path so the OCR sidecar can live next
    /// to it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ExtractError> {
        let buffer = std::fs::read(&path)?;
        let mut source = Self::load_mem(&buffer)?;
        source.path = Some(path.as_ref().to_path_buf());
        Ok(source)
    }

    /// Load from a memory buffer. Path-less sources have no sidecar.
    pub fn load_mem(buffer: &[u8]) -> Result<Self, ExtractError> {
        let doc = Document::load_mem(buffer)?;
        let fingerprint = derive_fingerprint(&doc, buffer);
        let pages = doc.get_pages();
        Ok(Self {
            doc,
            path: None,
            fingerprint,
            pages,
        })
    }

    fn page_id(&self, page: u32) -> Result<ObjectId, ExtractError> {
        self.pages
            .get(&page)
            .copied()
            .ok_or_else(|| ExtractError::Decode(format!("page {} not found", page)))
    }

    /// Height of the page's media box, used to flip into top-down viewport
    /// space.
    fn page_height(&self, page_id: ObjectId) -> f32 {
        let media_box = self
            .doc
            .get_dictionary(page_id)
            .ok()
            .and_then(|dict| match dict.get(b"MediaBox") {
                Ok(Object::Array(values)) => Some(values.clone()),
                Ok(Object::Reference(id)) => match self.doc.get_object(*id) {
                    Ok(Object::Array(values)) => Some(values.clone()),
                    _ => None,
                },
                _ => None,
            });

        match media_box.as_deref() {
            Some([_, y0, _, y1]) => {
                let y0 = get_number(y0).unwrap_or(0.0);
                let y1 = get_number(y1).unwrap_or(792.0);
                (y1 - y0).abs()
            }
            _ => 792.0, // US Letter
        }
    }

    /// Resolve an image XObject's intrinsic dimensions and format hint.
    fn image_info(&self, page_id: ObjectId, name: &[u8]) -> Option<(u32, u32, Option<String>)> {
        let page_dict = self.doc.get_dictionary(page_id).ok()?;
        let resources = match page_dict.get(b"Resources") {
            Ok(Object::Reference(id)) => self.doc.get_dictionary(*id).ok(),
            Ok(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        }?;
        let xobjects = match resources.get(b"XObject") {
            Ok(Object::Reference(id)) => self.doc.get_dictionary(*id).ok(),
            Ok(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        }?;

        let stream = match xobjects.get(name) {
            Ok(Object::Reference(id)) => self.doc.get_object(*id).ok()?.as_stream().ok()?,
            Ok(Object::Stream(stream)) => stream,
            _ => return None,
        };

        if stream.dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
            return None;
        }

        let width = stream
            .dict
            .get(b"Width")
            .ok()
            .and_then(|w| w.as_i64().ok())
            .unwrap_or(0) as u32;
        let height = stream
            .dict
            .get(b"Height")
            .ok()
            .and_then(|h| h.as_i64().ok())
            .unwrap_or(0) as u32;

        Some((width, height, format_from_filter(&stream.dict)))
    }

    /// Raw bytes of an image XObject, as stored for self-contained formats
    /// (JPEG, JPEG 2000) and decompressed otherwise.
    fn image_bytes(&self, page_id: ObjectId, name: &[u8]) -> Option<RasterImage> {
        let (width, height, format) = self.image_info(page_id, name)?;
        let page_dict = self.doc.get_dictionary(page_id).ok()?;
        let resources = match page_dict.get(b"Resources") {
            Ok(Object::Reference(id)) => self.doc.get_dictionary(*id).ok(),
            Ok(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        }?;
        let xobjects = match resources.get(b"XObject") {
            Ok(Object::Reference(id)) => self.doc.get_dictionary(*id).ok(),
            Ok(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        }?;
        let stream = match xobjects.get(name) {
            Ok(Object::Reference(id)) => self.doc.get_object(*id).ok()?.as_stream().ok()?,
            Ok(Object::Stream(stream)) => stream,
            _ => return None,
        };

        let data = match format.as_deref() {
            Some("jpeg") | Some("jp2") => stream.content.clone(),
            _ => stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone()),
        };

        Some(RasterImage {
            data,
            format,
            width,
            height,
        })
    }
}

impl DocumentSource for PdfSource {
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
        let page_id = self.page_id(page)?;
        let height = self.page_height(page_id);
        let viewport: Matrix = [1.0, 0.0, 0.0, -1.0, 0.0, height];
        let (runs, images) = self.walk_page(page_id)?;
        Ok(PageContent {
            viewport,
            runs,
            images,
        })
    }

    fn page_text(&self, page: u32) -> Result<String, ExtractError> {
        self.doc
            .extract_text(&[page])
            .map_err(|e| ExtractError::Decode(e.to_string()))
    }

    fn rasterize_image(
        &self,
        page: u32,
        index: usize,
        _timeout: Duration,
    ) -> Result<ImageFetch, ExtractError> {
        // Embedded images decode synchronously; the deadline matters for
        // sources that render remotely.
        let page_id = self.page_id(page)?;
        let (_, images) = self.walk_page(page_id)?;
        let op = images
            .get(index)
            .ok_or_else(|| ExtractError::Decode(format!("page {} has no image {}", page, index)))?;
        match self.image_bytes(page_id, op.name.as_bytes()) {
            Some(image) => Ok(ImageFetch::Ready(image)),
            None => Err(ExtractError::Decode(format!(
                "image {:?} on page {} could not be decoded",
                op.name, page
            ))),
        }
    }

    fn rasterize_page(&self, page: u32, timeout: Duration) -> Result<ImageFetch, ExtractError> {
        // Without a renderer, the best page raster is the largest embedded
        // image; for scanned documents that is the page.
        let page_id = self.page_id(page)?;
        let (_, images) = self.walk_page(page_id)?;
        let largest = images
            .iter()
            .enumerate()
            .max_by_key(|(_, op)| op.width as u64 * op.height as u64)
            .map(|(index, _)| index)
            .ok_or_else(|| {
                ExtractError::Decode(format!("page {} has no rasterizable image", page))
            })?;
        self.rasterize_image(page, largest, timeout)
    }
}

impl PdfSource {
    /// Walk a page's content stream tracking graphics and text state,
    /// producing positioned text runs and image-paint operations in stream
    /// order.
    fn walk_page(&self, page_id: ObjectId) -> Result<(Vec<TextRun>, Vec<ImageOp>), ExtractError> {
        use lopdf::content::Content;

        let doc = &self.doc;
        let fonts = doc.get_page_fonts(page_id).unwrap_or_default();
        let content_data = doc.get_page_content(page_id);
        let content =
            Content::decode(&content_data).map_err(|e| ExtractError::Decode(e.to_string()))?;

        let mut runs = Vec::new();
        let mut images = Vec::new();

        // Graphics state
        let mut ctm = IDENTITY;
        let mut ctm_stack: Vec<Matrix> = Vec::new();

        // Text state
        let mut current_font = String::new();
        let mut current_font_size: f32 = 12.0;
        let mut text_matrix = IDENTITY;
        let mut line_matrix = IDENTITY;
        let mut in_text_block = false;

        let mut push_run = |text: String, text_matrix: &Matrix, ctm: &Matrix, size: f32| {
            if text.trim().is_empty() {
                return;
            }
            let rendered_size = size * transform::effective_scale(text_matrix);
            runs.push(TextRun {
                text,
                transform: transform::multiply(ctm, text_matrix),
                height: Some(rendered_size),
                width: None,
            });
        };

        for op in &content.operations {
            match op.operator.as_str() {
                "q" => {
                    ctm_stack.push(ctm);
                }
                "Q" => {
                    if let Some(saved) = ctm_stack.pop() {
                        ctm = saved;
                    }
                }
                "cm" => {
                    if op.operands.len() >= 6 {
                        let new_matrix = [
                            get_number(&op.operands[0]).unwrap_or(1.0),
                            get_number(&op.operands[1]).unwrap_or(0.0),
                            get_number(&op.operands[2]).unwrap_or(0.0),
                            get_number(&op.operands[3]).unwrap_or(1.0),
                            get_number(&op.operands[4]).unwrap_or(0.0),
                            get_number(&op.operands[5]).unwrap_or(0.0),
                        ];
                        ctm = transform::multiply(&ctm, &new_matrix);
                    }
                }
                "BT" => {
                    in_text_block = true;
                    text_matrix = IDENTITY;
                    line_matrix = IDENTITY;
                }
                "ET" => {
                    in_text_block = false;
                }
                "Tf" => {
                    if op.operands.len() >= 2 {
                        if let Ok(name) = op.operands[0].as_name() {
                            current_font = String::from_utf8_lossy(name).to_string();
                        }
                        if let Some(size) = get_number(&op.operands[1]) {
                            current_font_size = size;
                        }
                    }
                }
                "Td" | "TD" => {
                    if op.operands.len() >= 2 {
                        let tx = get_number(&op.operands[0]).unwrap_or(0.0);
                        let ty = get_number(&op.operands[1]).unwrap_or(0.0);
                        line_matrix[4] += tx;
                        line_matrix[5] += ty;
                        text_matrix = line_matrix;
                    }
                }
                "Tm" => {
                    if op.operands.len() >= 6 {
                        for (i, operand) in op.operands.iter().take(6).enumerate() {
                            text_matrix[i] =
                                get_number(operand).unwrap_or(if i == 0 || i == 3 { 1.0 } else { 0.0 });
                        }
                        line_matrix = text_matrix;
                    }
                }
                "T*" => {
                    // Approximate line height
                    line_matrix[5] -= current_font_size * 1.2;
                    text_matrix = line_matrix;
                }
                "Tj" => {
                    if in_text_block && !op.operands.is_empty() {
                        if let Some(text) =
                            decode_text_operand(&op.operands[0], doc, &fonts, &current_font)
                        {
                            push_run(text, &text_matrix, &ctm, current_font_size);
                        }
                    }
                }
                "TJ" => {
                    if in_text_block && !op.operands.is_empty() {
                        if let Ok(array) = op.operands[0].as_array() {
                            let mut combined = String::new();
                            for item in array {
                                if let Some(text) =
                                    decode_text_operand(item, doc, &fonts, &current_font)
                                {
                                    combined.push_str(&text);
                                }
                            }
                            push_run(combined, &text_matrix, &ctm, current_font_size);
                        }
                    }
                }
                "'" => {
                    line_matrix[5] -= current_font_size * 1.2;
                    text_matrix = line_matrix;
                    if !op.operands.is_empty() {
                        if let Some(text) =
                            decode_text_operand(&op.operands[0], doc, &fonts, &current_font)
                        {
                            push_run(text, &text_matrix, &ctm, current_font_size);
                        }
                    }
                }
                "Do" => {
                    if let Some(Ok(name)) = op.operands.first().map(|o| o.as_name()) {
                        let name_string = String::from_utf8_lossy(name).to_string();
                        match self.image_info(page_id, name) {
                            Some((width, height, format)) => images.push(ImageOp {
                                name: name_string,
                                transform: ctm,
                                width,
                                height,
                                format,
                            }),
                            None => {
                                // Form XObjects and unresolvable images still
                                // count as paint operations.
                                debug!("unresolved XObject {:?}", name_string);
                                images.push(ImageOp {
                                    name: name_string,
                                    transform: ctm,
                                    width: 0,
                                    height: 0,
                                    format: None,
                                });
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        Ok((runs, images))
    }
}

/// Derive the document fingerprint: the PDF file identifier when present,
/// else a content hash.
fn derive_fingerprint(doc: &Document, buffer: &[u8]) -> String {
    if let Ok(Object::Array(ids)) = doc.trailer.get(b"ID") {
        if let Some(Object::String(bytes, _)) = ids.first() {
            if !bytes.is_empty() {
                return bytes.iter().map(|b| format!("{:02x}", b)).collect();
            }
        }
    }
    let digest = Sha256::digest(buffer);
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..32].to_string()
}

/// Helper to get f32 from Object
fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Extract text from a text operand, handling encoding
fn decode_text_operand(
    obj: &Object,
    doc: &Document,
    fonts: &BTreeMap<Vec<u8>, &lopdf::Dictionary>,
    current_font: &str,
) -> Option<String> {
    if let Object::String(bytes, _) = obj {
        // Try to decode using font encoding
        if let Some(font_dict) = fonts.get(current_font.as_bytes()) {
            if let Ok(encoding) = font_dict.get_font_encoding(doc) {
                if let Ok(text) = Document::decode_text(&encoding, bytes) {
                    return Some(text);
                }
            }
        }

        // Fallback: try UTF-16BE then Latin-1
        if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
            let utf16: Vec<u16> = bytes[2..]
                .chunks_exact(2)
                .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                .collect();
            return Some(String::from_utf16_lossy(&utf16));
        }

        // Latin-1 fallback
        Some(bytes.iter().map(|&b| b as char).collect())
    } else {
        None
    }
}

/// Map a stream's Filter entry to an image format hint.
fn format_from_filter(dict: &lopdf::Dictionary) -> Option<String> {
    let filter = dict.get(b"Filter").ok()?;
    let name = match filter {
        Object::Name(name) => name.clone(),
        Object::Array(filters) => match filters.last() {
            Some(Object::Name(name)) => name.clone(),
            _ => return None,
        },
        _ => return None,
    };
    match name.as_slice() {
        b"DCTDecode" => Some("jpeg".into()),
        b"JPXDecode" => Some("jp2".into()),
        b"CCITTFaxDecode" => Some("tiff".into()),
        _ => None,
    }
}
