//! Final line/text assembly for one page.
//!
//! Turns an ordered content sequence into line strings, optionally inserting
//! structural markers for detected tables and image placements, and enforcing
//! a per-page character budget.

use crate::lines::{assemble_line, ContentItem, LineGroupConfig, TextContent};
use crate::tables::{detect_tables, TableDetectConfig, TableRegion};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Normalization options for one extraction call.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Keep runs of whitespace instead of collapsing them.
    pub preserve_whitespace: bool,
    /// Trim each line. On by default.
    pub trim_lines: bool,
    /// Hard character budget for the page's joined text.
    pub max_chars_per_page: Option<usize>,
    /// Insert `[TABLE DETECTED: ...]` and `[IMAGE ...]` marker lines. Off by
    /// default; the off state reproduces legacy marker-less output exactly.
    pub insert_markers: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            preserve_whitespace: false,
            trim_lines: true,
            max_chars_per_page: None,
            insert_markers: false,
        }
    }
}

/// Normalized output for one page; the unit stored in the page-text cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPage {
    pub lines: Vec<String>,
    /// The lines joined by newline.
    pub text: String,
    /// True when the character budget cut the output short.
    pub truncated: bool,
}

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Accumulates output lines against an optional character budget.
///
/// The budget counts characters of the joined text, including the newline
/// between lines. The instant a line would exceed it, the line is cut to
/// exactly fill the remainder and accumulation stops.
struct LineBudget {
    lines: Vec<String>,
    used: usize,
    max: Option<usize>,
    truncated: bool,
}

impl LineBudget {
    fn new(max: Option<usize>) -> Self {
        Self {
            lines: Vec::new(),
            used: 0,
            max,
            truncated: false,
        }
    }

    /// Returns false once the budget is exhausted.
    fn push(&mut self, line: String) -> bool {
        if self.truncated {
            return false;
        }
        let separator = usize::from(!self.lines.is_empty());
        let length = line.chars().count();

        if let Some(max) = self.max {
            if self.used + separator + length > max {
                let remaining = max as i64 - self.used as i64 - separator as i64;
                if remaining > 0 {
                    let cut: String = line.chars().take(remaining as usize).collect();
                    self.used += separator + remaining as usize;
                    self.lines.push(cut);
                }
                self.truncated = true;
                return false;
            }
        }

        self.used += separator + length;
        self.lines.push(line);
        true
    }

    /// Blank padding around a marker; skipped when it would double up.
    fn pad(&mut self) {
        match self.lines.last() {
            Some(last) if last.is_empty() => {}
            None => {}
            Some(_) => {
                self.push(String::new());
            }
        }
    }

    fn finish(mut self) -> NormalizedPage {
        // Trailing marker padding carries no content.
        while self.lines.last().is_some_and(|l| l.is_empty()) {
            self.lines.pop();
        }
        let text = self.lines.join("\n");
        NormalizedPage {
            lines: self.lines,
            text,
            truncated: self.truncated,
        }
    }
}

/// Normalize one page's ordered content sequence.
pub fn normalize_page(
    items: &[ContentItem],
    options: &NormalizeOptions,
    line_config: &LineGroupConfig,
    table_config: &TableDetectConfig,
) -> NormalizedPage {
    let regions: Vec<TableRegion> = if options.insert_markers {
        detect_tables(items, table_config)
    } else {
        Vec::new()
    };

    let mut budget = LineBudget::new(options.max_chars_per_page);
    let mut current: Vec<&TextContent> = Vec::new();
    let mut current_y = 0.0f32;
    let mut image_index = 0u32;

    for (index, item) in items.iter().enumerate() {
        if budget.truncated {
            break;
        }

        if let Some(region) = regions.iter().find(|r| r.start_index == index) {
            flush(&mut current, &mut budget, options, line_config);
            budget.pad();
            budget.push(format!(
                "[TABLE DETECTED: {} cols × {} rows]",
                region.cols, region.rows
            ));
            budget.push(String::new());
        }

        match item {
            ContentItem::Text(text) => {
                let eps = line_config.epsilon(text.font_size);
                if current.is_empty() {
                    current_y = text.y;
                    current.push(text);
                } else if (text.y - current_y).abs() <= eps {
                    current.push(text);
                } else {
                    flush(&mut current, &mut budget, options, line_config);
                    current_y = text.y;
                    current.push(text);
                }
            }
            ContentItem::Image(image) => {
                image_index += 1;
                if options.insert_markers {
                    flush(&mut current, &mut budget, options, line_config);
                    budget.pad();
                    let format_suffix = image
                        .format
                        .as_deref()
                        .map(|f| format!(", {}", f))
                        .unwrap_or_default();
                    budget.push(format!(
                        "[IMAGE {}: {}x{}px{}]",
                        image_index, image.width, image.height, format_suffix
                    ));
                    budget.push(String::new());
                }
            }
        }
    }

    flush(&mut current, &mut budget, options, line_config);
    budget.finish()
}

/// Assemble and emit the buffered line, dropping lines that normalize to
/// nothing.
fn flush(
    current: &mut Vec<&TextContent>,
    budget: &mut LineBudget,
    options: &NormalizeOptions,
    line_config: &LineGroupConfig,
) {
    if current.is_empty() {
        return;
    }
    let mut line = assemble_line(current, line_config);
    current.clear();

    if !options.preserve_whitespace {
        line = WHITESPACE_RE.replace_all(&line, " ").into_owned();
    }
    if options.trim_lines {
        line = line.trim().to_string();
    }
    if line.is_empty() {
        return;
    }
    budget.push(line);
}
