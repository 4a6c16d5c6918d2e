//! Table region detection over a page's ordered content sequence.
//!
//! Scans a line-ordered item sequence for grid-aligned sub-regions by
//! clustering x positions into columns and y positions into rows. This is a
//! heuristic: false positives and negatives are expected on irregular
//! layouts. The contract is determinism (same input, same regions) and the
//! 3x3 minimum grid as a hard cutoff.

use crate::lines::{ContentItem, TextContent};

/// A detected grid-aligned region, as indices into the page's content
/// sequence. Recomputed per extraction, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRegion {
    /// First item of the region (the scan position where the grid matched).
    pub start_index: usize,
    /// Last item of the region's last grid row, inclusive.
    pub end_index: usize,
    pub cols: usize,
    pub rows: usize,
}

/// Tuning constants for grid detection.
///
/// The column-tolerance formula is empirically tuned; downstream consumers
/// depend on the exact defaults.
#[derive(Debug, Clone)]
pub struct TableDetectConfig {
    /// Minimum columns and rows for a region.
    pub min_grid: usize,
    /// Minimum text items with known x before detection is attempted.
    pub min_items: usize,
    /// Items considered per scan window.
    pub window: usize,
    /// Column tolerance as a fraction of the average font size.
    pub font_factor: f32,
    /// Column tolerance as a fraction of the estimated page width.
    pub page_width_factor: f32,
    /// Clamp bounds for the column tolerance.
    pub tolerance_min: f32,
    pub tolerance_max: f32,
    /// Empirical glyph-width ratio used to back out a font size from
    /// inter-item spacing when no sizes are known.
    pub glyph_width_ratio: f32,
    /// Last-resort font size estimate.
    pub default_font_size: f32,
    /// Row tolerance as a fraction of the average font size.
    pub row_factor: f32,
    /// Row tolerance floor.
    pub row_tolerance_min: f32,
}

impl Default for TableDetectConfig {
    fn default() -> Self {
        Self {
            min_grid: 3,
            min_items: 9,
            window: 50,
            font_factor: 0.5,
            page_width_factor: 0.05,
            tolerance_min: 10.0,
            tolerance_max: 50.0,
            glyph_width_ratio: 0.5,
            default_font_size: 12.0,
            row_factor: 0.2,
            row_tolerance_min: 2.5,
        }
    }
}

/// Scan a page's ordered content sequence for non-overlapping table regions.
pub fn detect_tables(items: &[ContentItem], config: &TableDetectConfig) -> Vec<TableRegion> {
    let mut regions = Vec::new();
    let mut start = 0;

    while start < items.len() {
        let remaining_text = items[start..]
            .iter()
            .filter(|i| i.as_text().is_some())
            .count();
        if remaining_text < config.min_items {
            break;
        }

        let window_end = (start + config.window).min(items.len());
        let window: Vec<(usize, &TextContent)> = items[start..window_end]
            .iter()
            .enumerate()
            .filter_map(|(offset, item)| item.as_text().map(|t| (start + offset, t)))
            .collect();

        if window.len() < config.min_items {
            start += 1;
            continue;
        }

        match try_region(start, &window, config) {
            Some(region) => {
                start = region.end_index + 1;
                regions.push(region);
            }
            None => start += 1,
        }
    }

    regions
}

/// Attempt to match a grid over one scan window starting at `start`.
///
/// Columns come from single-linkage clustering of x positions; rows from the
/// same pass over y. The region must begin with at least `min_grid`
/// consecutive rows that each populate all columns but one; the first row
/// that falls short ends the region, so surrounding prose is never swallowed.
fn try_region(
    start: usize,
    window: &[(usize, &TextContent)],
    config: &TableDetectConfig,
) -> Option<TableRegion> {
    let avg_font = average_font_size(window, config);
    let tolerance = column_tolerance(window, avg_font, config);

    let mut xs: Vec<f32> = window.iter().map(|(_, t)| t.x).collect();
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let columns = cluster(&xs, tolerance);
    if columns.len() < config.min_grid {
        return None;
    }

    let row_tolerance = (avg_font * config.row_factor).max(config.row_tolerance_min);
    let mut ys: Vec<f32> = window.iter().map(|(_, t)| t.y).collect();
    ys.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let row_centers = cluster(&ys, row_tolerance);

    // Per row (top to bottom): which columns are populated, and the last
    // item index seen.
    let mut rows: Vec<(Vec<bool>, usize)> = vec![(vec![false; columns.len()], 0); row_centers.len()];
    for (index, item) in window {
        let row = match nearest(&row_centers, item.y) {
            Some(r) => r,
            None => continue,
        };
        rows[row].1 = rows[row].1.max(*index);
        if let Some(col) = nearest_within(&columns, item.x, tolerance) {
            rows[row].0[col] = true;
        }
    }

    // Count consecutive qualifying rows from the top of the window,
    // tolerating one missing cell per row.
    let required = columns.len() - 1;
    let mut qualifying = 0usize;
    let mut end_index = 0usize;
    for (cells, last) in &rows {
        if cells.iter().filter(|c| **c).count() >= required {
            qualifying += 1;
            end_index = end_index.max(*last);
        } else {
            break;
        }
    }

    if qualifying < config.min_grid {
        return None;
    }

    Some(TableRegion {
        start_index: start,
        end_index,
        cols: columns.len(),
        rows: qualifying,
    })
}

/// Column-clustering tolerance:
/// `clamp(max(avg_font * 0.5, page_width_estimate * 0.05), 10, 50)`.
fn column_tolerance(window: &[(usize, &TextContent)], avg_font: f32, config: &TableDetectConfig) -> f32 {
    let min_x = window.iter().map(|(_, t)| t.x).fold(f32::INFINITY, f32::min);
    let max_x = window
        .iter()
        .map(|(_, t)| t.x)
        .fold(f32::NEG_INFINITY, f32::max);
    let page_width = (max_x - min_x).max(0.0);

    (avg_font * config.font_factor)
        .max(page_width * config.page_width_factor)
        .clamp(config.tolerance_min, config.tolerance_max)
}

/// Average font size over a window, estimated from inter-item horizontal
/// spacing when no sizes are known, falling back to the configured default.
fn average_font_size(window: &[(usize, &TextContent)], config: &TableDetectConfig) -> f32 {
    let sizes: Vec<f32> = window
        .iter()
        .filter_map(|(_, t)| t.font_size.filter(|s| *s > 0.0))
        .collect();
    if !sizes.is_empty() {
        return sizes.iter().sum::<f32>() / sizes.len() as f32;
    }

    let mut xs: Vec<f32> = window.iter().map(|(_, t)| t.x).collect();
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let gaps: Vec<f32> = xs
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|g| *g > 0.0)
        .collect();
    if gaps.is_empty() {
        return config.default_font_size;
    }

    let avg_gap = gaps.iter().sum::<f32>() / gaps.len() as f32;
    let estimate = avg_gap / config.glyph_width_ratio;
    if estimate > 0.0 {
        estimate
    } else {
        config.default_font_size
    }
}

/// Single-linkage clustering over sorted values: a new cluster starts
/// whenever the gap to the previous member exceeds the tolerance. Returns
/// cluster centers in ascending order.
fn cluster(sorted: &[f32], tolerance: f32) -> Vec<f32> {
    let mut centers = Vec::new();
    let mut members: Vec<f32> = Vec::new();

    for &v in sorted {
        if let Some(&last) = members.last() {
            if v - last > tolerance {
                centers.push(members.iter().sum::<f32>() / members.len() as f32);
                members.clear();
            }
        }
        members.push(v);
    }
    if !members.is_empty() {
        centers.push(members.iter().sum::<f32>() / members.len() as f32);
    }

    centers
}

/// Index of the nearest center, if any exist.
fn nearest(centers: &[f32], value: f32) -> Option<usize> {
    centers
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (value - *a)
                .abs()
                .partial_cmp(&(value - *b).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(idx, _)| idx)
}

/// Index of the nearest center within the tolerance, if any.
fn nearest_within(centers: &[f32], value: f32, tolerance: f32) -> Option<usize> {
    nearest(centers, value).filter(|&idx| (value - centers[idx]).abs() <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_item(text: &str, x: f32, y: f32) -> ContentItem {
        ContentItem::Text(TextContent {
            x,
            y,
            text: text.into(),
            font_size: Some(10.0),
            width: None,
        })
    }

    fn grid_at(cols: usize, rows: usize, y0: f32) -> Vec<ContentItem> {
        let mut items = Vec::new();
        for r in 0..rows {
            for c in 0..cols {
                items.push(make_item(
                    &format!("r{}c{}", r, c),
                    100.0 + c as f32 * 120.0,
                    y0 + r as f32 * 20.0,
                ));
            }
        }
        items
    }

    fn grid(cols: usize, rows: usize) -> Vec<ContentItem> {
        grid_at(cols, rows, 100.0)
    }

    #[test]
    fn test_too_few_items_rejected() {
        let config = TableDetectConfig::default();
        // 2x4 = 8 items, below the 9-item floor
        assert!(detect_tables(&grid(2, 4), &config).is_empty());
    }

    #[test]
    fn test_minimum_grid_detected() {
        let config = TableDetectConfig::default();
        let regions = detect_tables(&grid(3, 3), &config);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].cols, 3);
        assert_eq!(regions[0].rows, 3);
        assert_eq!(regions[0].start_index, 0);
        assert_eq!(regions[0].end_index, 8);
    }

    #[test]
    fn test_five_by_four_grid() {
        // 5 rows x 4 columns of evenly spaced items: exactly one region.
        let config = TableDetectConfig::default();
        let regions = detect_tables(&grid(4, 5), &config);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].cols, 4);
        assert!(regions[0].rows >= 5);
    }

    #[test]
    fn test_two_columns_never_reported() {
        let config = TableDetectConfig::default();
        // Plenty of items, but only two x clusters.
        assert!(detect_tables(&grid(2, 10), &config).is_empty());
    }

    #[test]
    fn test_single_column_prose_not_detected() {
        let config = TableDetectConfig::default();
        let items: Vec<ContentItem> = (0..12)
            .map(|i| make_item("a line of prose text", 72.0, 100.0 + i as f32 * 14.0))
            .collect();
        assert!(detect_tables(&items, &config).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let config = TableDetectConfig::default();
        let items = grid(4, 5);
        assert_eq!(detect_tables(&items, &config), detect_tables(&items, &config));
    }

    #[test]
    fn test_tolerates_one_missing_cell_per_row() {
        let config = TableDetectConfig::default();
        let mut items = grid(4, 4);
        // Knock one cell out of the second row: row still qualifies.
        items.remove(5);
        let regions = detect_tables(&items, &config);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].cols, 4);
        assert_eq!(regions[0].rows, 4);
    }

    #[test]
    fn test_prose_before_grid_excluded_from_region() {
        let config = TableDetectConfig::default();
        let mut items: Vec<ContentItem> = (0..4)
            .map(|i| make_item("intro prose", 100.0, 20.0 + i as f32 * 14.0))
            .collect();
        let first_grid_index = items.len();
        items.extend(grid(3, 4));
        let regions = detect_tables(&items, &config);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].start_index, first_grid_index);
        assert_eq!(regions[0].cols, 3);
        assert_eq!(regions[0].rows, 4);
    }

    #[test]
    fn test_scan_resumes_after_region() {
        let config = TableDetectConfig::default();
        let mut items = grid(3, 3);
        // A prose row separates two grids sharing the same columns.
        items.push(make_item("interleaved prose", 100.0, 180.0));
        items.extend(grid_at(3, 3, 260.0));
        let regions = detect_tables(&items, &config);
        assert_eq!(regions.len(), 2);
        assert!(regions[0].end_index < regions[1].start_index);
        assert_eq!(regions[0].rows, 3);
        assert_eq!(regions[1].rows, 3);
    }
}
