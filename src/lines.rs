//! Line grouping for positioned content.
//!
//! Clusters positioned text runs into visual lines using a font-size-derived
//! vertical tolerance, orders them into reading order, and reassembles line
//! strings with gap-based space insertion. The spacing heuristic reconstructs
//! natural reading order from positioned character runs without access to the
//! original word boundaries, so it is inherently approximate.

/// A positioned text run after viewport transformation.
#[derive(Debug, Clone)]
pub struct TextContent {
    pub x: f32,
    /// Top-down viewport-space y.
    pub y: f32,
    pub text: String,
    pub font_size: Option<f32>,
    /// Measured advance width, where known.
    pub width: Option<f32>,
}

/// A positioned image placement after viewport transformation.
#[derive(Debug, Clone)]
pub struct ImageContent {
    pub x: f32,
    pub y: f32,
    /// Intrinsic pixel width.
    pub width: u32,
    /// Intrinsic pixel height.
    pub height: u32,
    pub format: Option<String>,
}

/// One item of a page's content sequence, sorted ascending by y
/// (top-to-bottom in viewport space).
#[derive(Debug, Clone)]
pub enum ContentItem {
    Text(TextContent),
    Image(ImageContent),
}

impl ContentItem {
    pub fn y(&self) -> f32 {
        match self {
            ContentItem::Text(t) => t.y,
            ContentItem::Image(i) => i.y,
        }
    }

    pub fn as_text(&self) -> Option<&TextContent> {
        match self {
            ContentItem::Text(t) => Some(t),
            ContentItem::Image(_) => None,
        }
    }
}

/// Tuning constants for grouping and spacing.
///
/// These are empirically tuned values; downstream output depends on the exact
/// defaults, so change them deliberately.
#[derive(Debug, Clone)]
pub struct LineGroupConfig {
    /// Vertical tolerance as a fraction of font size.
    pub epsilon_factor: f32,
    /// Vertical tolerance when no usable font size is present.
    pub default_epsilon: f32,
    /// Horizontal gap threshold for space insertion, as a fraction of font
    /// size.
    pub gap_factor: f32,
    /// Gap threshold when no usable font size is present.
    pub default_gap: f32,
    /// Estimated glyph width as a fraction of font size, used when a run has
    /// no measured width.
    pub glyph_width_ratio: f32,
}

impl Default for LineGroupConfig {
    fn default() -> Self {
        Self {
            epsilon_factor: 0.2,
            default_epsilon: 2.5,
            gap_factor: 0.35,
            default_gap: 3.0,
            glyph_width_ratio: 0.5,
        }
    }
}

impl LineGroupConfig {
    /// Vertical tolerance for one run.
    pub fn epsilon(&self, font_size: Option<f32>) -> f32 {
        match font_size {
            Some(size) if size > 0.0 => size * self.epsilon_factor,
            _ => self.default_epsilon,
        }
    }

    /// Horizontal space-insertion threshold for one run.
    pub fn gap_threshold(&self, font_size: Option<f32>) -> f32 {
        match font_size {
            Some(size) if size > 0.0 => size * self.gap_factor,
            _ => self.default_gap,
        }
    }

    /// Estimated end x of a run.
    pub fn run_end(&self, run: &TextContent) -> f32 {
        let width = run.width.unwrap_or_else(|| {
            let glyph = run.font_size.filter(|s| *s > 0.0).unwrap_or(12.0) * self.glyph_width_ratio;
            run.text.chars().count() as f32 * glyph
        });
        run.x + width
    }
}

/// Order text runs into reading order: cluster into lines by y, sort lines
/// top-to-bottom, sort within a line left-to-right, and flatten.
///
/// Each run keeps its own position and font size so downstream structural
/// detection can still see per-cell geometry.
pub fn order_items(runs: Vec<TextContent>, config: &LineGroupConfig) -> Vec<ContentItem> {
    if runs.is_empty() {
        return Vec::new();
    }

    // First-match scan against open groups, keyed by the first member's y.
    let mut groups: Vec<(f32, Vec<TextContent>)> = Vec::new();
    for run in runs {
        let eps = config.epsilon(run.font_size);
        match groups.iter_mut().find(|(y, _)| (run.y - *y).abs() <= eps) {
            Some((_, members)) => members.push(run),
            None => groups.push((run.y, vec![run])),
        }
    }

    groups.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut items = Vec::new();
    for (_, mut members) in groups {
        members.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
        items.extend(members.into_iter().map(ContentItem::Text));
    }
    items
}

/// Merge image placements into an already line-ordered sequence, keeping the
/// whole sequence sorted ascending by y.
pub fn merge_images(items: &mut Vec<ContentItem>, images: Vec<ImageContent>) {
    for image in images {
        let at = items
            .iter()
            .position(|item| item.y() > image.y)
            .unwrap_or(items.len());
        items.insert(at, ContentItem::Image(image));
    }
}

/// Trailing characters that make an inserted space redundant or wrong.
fn suppresses_space_after(text: &str) -> bool {
    match text.chars().last() {
        Some(c) => c.is_whitespace() || matches!(c, ',' | ';' | ':' | '.' | '!' | '?' | '-' | ')'),
        None => true,
    }
}

/// Leading characters that already supply their own separation.
fn suppresses_space_before(text: &str) -> bool {
    match text.chars().next() {
        Some(c) => c.is_whitespace() || (c.is_ascii_punctuation() && c != '(' && c != '['),
        None => true,
    }
}

/// Concatenate the runs of one visual line (already sorted by x) into a line
/// string, inserting a single space only where the horizontal gap between
/// adjacent runs exceeds the per-run threshold and neither side already
/// supplies whitespace or punctuation.
pub fn assemble_line(runs: &[&TextContent], config: &LineGroupConfig) -> String {
    let mut out = String::new();
    let mut prev: Option<&TextContent> = None;

    for run in runs {
        if let Some(p) = prev {
            let gap = run.x - config.run_end(p);
            let threshold = config.gap_threshold(p.font_size.or(run.font_size));
            if gap > threshold
                && !suppresses_space_after(&out)
                && !suppresses_space_before(&run.text)
            {
                out.push(' ');
            }
        }
        out.push_str(&run.text);
        prev = Some(run);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, x: f32, y: f32, size: f32) -> TextContent {
        TextContent {
            x,
            y,
            text: text.into(),
            font_size: Some(size),
            width: None,
        }
    }

    fn texts(items: &[ContentItem]) -> Vec<&str> {
        items
            .iter()
            .filter_map(|i| i.as_text().map(|t| t.text.as_str()))
            .collect()
    }

    #[test]
    fn test_epsilon_from_font_size() {
        let config = LineGroupConfig::default();
        assert_eq!(config.epsilon(Some(10.0)), 2.0);
        assert_eq!(config.epsilon(Some(0.0)), 2.5);
        assert_eq!(config.epsilon(None), 2.5);
    }

    #[test]
    fn test_within_epsilon_groups_same_line() {
        let config = LineGroupConfig::default();
        // 12pt -> epsilon 2.4; dy = 2.0 stays on one line
        let items = order_items(
            vec![run("World", 160.0, 102.0, 12.0), run("Hello", 100.0, 100.0, 12.0)],
            &config,
        );
        assert_eq!(texts(&items), vec!["Hello", "World"]);
        assert_eq!(items[0].y(), 100.0);
    }

    #[test]
    fn test_beyond_epsilon_splits_lines() {
        let config = LineGroupConfig::default();
        // 12pt -> epsilon 2.4; dy = 2.5 splits
        let items = order_items(
            vec![run("b", 100.0, 102.5, 12.0), run("a", 100.0, 100.0, 12.0)],
            &config,
        );
        assert_eq!(texts(&items), vec!["a", "b"]);
    }

    #[test]
    fn test_lines_sorted_top_to_bottom() {
        let config = LineGroupConfig::default();
        let items = order_items(
            vec![
                run("third", 100.0, 300.0, 12.0),
                run("first", 100.0, 100.0, 12.0),
                run("second", 100.0, 200.0, 12.0),
            ],
            &config,
        );
        assert_eq!(texts(&items), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_runs_sorted_by_x_within_line() {
        let config = LineGroupConfig::default();
        let items = order_items(
            vec![
                run("c", 300.0, 100.0, 12.0),
                run("a", 100.0, 100.0, 12.0),
                run("b", 200.0, 100.0, 12.0),
            ],
            &config,
        );
        assert_eq!(texts(&items), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_assemble_inserts_space_on_wide_gap() {
        let config = LineGroupConfig::default();
        // "Hello" at 12pt estimated width 5 * 6 = 30, ends at 130.
        // Next run at 160 leaves a 30pt gap, well past the 4.2 threshold.
        let a = run("Hello", 100.0, 100.0, 12.0);
        let b = run("World", 160.0, 100.0, 12.0);
        assert_eq!(assemble_line(&[&a, &b], &config), "Hello World");
    }

    #[test]
    fn test_assemble_no_space_on_adjacent_runs() {
        let config = LineGroupConfig::default();
        // "Hel" ends at 118; "lo" starts at 118: zero gap, one word.
        let a = run("Hel", 100.0, 100.0, 12.0);
        let b = run("lo", 118.0, 100.0, 12.0);
        assert_eq!(assemble_line(&[&a, &b], &config), "Hello");
    }

    #[test]
    fn test_assemble_suppresses_space_after_punctuation() {
        let config = LineGroupConfig::default();
        let a = run("end-", 100.0, 100.0, 12.0);
        let b = run("less", 160.0, 100.0, 12.0);
        assert_eq!(assemble_line(&[&a, &b], &config), "end-less");

        let c = run("wait,", 100.0, 100.0, 12.0);
        let d = run(" next", 160.0, 100.0, 12.0);
        assert_eq!(assemble_line(&[&c, &d], &config), "wait, next");
    }

    #[test]
    fn test_assemble_suppresses_space_before_punctuation() {
        let config = LineGroupConfig::default();
        let a = run("done", 100.0, 100.0, 12.0);
        let b = run(".", 160.0, 100.0, 12.0);
        assert_eq!(assemble_line(&[&a, &b], &config), "done.");
    }

    #[test]
    fn test_assemble_respects_measured_width() {
        let config = LineGroupConfig::default();
        let mut a = run("wide", 100.0, 100.0, 12.0);
        a.width = Some(100.0); // ends at 200
        let b = run("next", 202.0, 100.0, 12.0);
        // 2pt gap under the 4.2 threshold: no space
        assert_eq!(assemble_line(&[&a, &b], &config), "widenext");
    }

    #[test]
    fn test_merge_images_keeps_y_order() {
        let config = LineGroupConfig::default();
        let mut items = order_items(
            vec![run("top", 100.0, 100.0, 12.0), run("bottom", 100.0, 300.0, 12.0)],
            &config,
        );
        merge_images(
            &mut items,
            vec![ImageContent {
                x: 50.0,
                y: 200.0,
                width: 640,
                height: 480,
                format: Some("jpeg".into()),
            }],
        );
        assert_eq!(items.len(), 3);
        assert!(matches!(items[1], ContentItem::Image(_)));
        assert!(items.windows(2).all(|w| w[0].y() <= w[1].y()));
    }

    #[test]
    fn test_order_items_empty() {
        let config = LineGroupConfig::default();
        assert!(order_items(Vec::new(), &config).is_empty());
    }
}
