//! Page selection: specification parsing and processing-plan guards.
//!
//! Callers name pages either as an explicit list or as a range string like
//! `"1-3,5,7-"`. Resolution never silently coerces bad input, and the
//! processing plan never silently walks an entire huge document: callers who
//! omit page selection get a bounded sample plus a warning explaining how to
//! lift the cap.

use crate::ExtractError;

/// Resolved page targets: deduplicated, ascending page numbers plus any
/// non-fatal parsing warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetPages {
    /// `None` when the caller named no pages at all.
    pub pages: Option<Vec<u32>>,
    pub warnings: Vec<String>,
}

/// Guard configuration for the processing plan.
#[derive(Debug, Clone)]
pub struct PagePlanConfig {
    /// Pages processed when a caller asks for full text without opting in.
    pub sample_page_limit: u32,
    /// Cap applied to open-ended ranges like `"7-"`.
    pub max_range_size: u32,
}

impl Default for PagePlanConfig {
    fn default() -> Self {
        Self {
            sample_page_limit: 5,
            max_range_size: 10_000,
        }
    }
}

/// The pages one extraction call will actually process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagePlan {
    pub pages: Vec<u32>,
    /// Requested pages beyond the document's page count. A warning, never an
    /// error.
    pub invalid_pages: Vec<u32>,
    /// Set when the sampling guard capped an unbounded request.
    pub guard_warning: Option<String>,
}

/// Resolve a page specification from an explicit list and/or a range string.
///
/// Both may be given; the results are merged. Malformed input is rejected
/// with an error naming the offending source.
pub fn resolve_target_pages(
    pages: Option<&[i64]>,
    page_range: Option<&str>,
    config: &PagePlanConfig,
) -> Result<TargetPages, ExtractError> {
    let mut resolved: Vec<u32> = Vec::new();
    let mut warnings = Vec::new();

    if let Some(list) = pages {
        for (position, &value) in list.iter().enumerate() {
            if value < 1 {
                return Err(ExtractError::InvalidParams {
                    param: "pages",
                    message: format!("pages[{}] must be a positive integer, got {}", position, value),
                });
            }
            resolved.push(value as u32);
        }
    }

    if let Some(range) = page_range {
        resolved.extend(parse_page_range(range, config.max_range_size, &mut warnings)?);
    }

    if pages.is_none() && page_range.is_none() {
        return Ok(TargetPages::default());
    }

    resolved.sort_unstable();
    resolved.dedup();

    Ok(TargetPages {
        pages: Some(resolved),
        warnings,
    })
}

/// Parse a range string like `"1-3,5,7-"`. Open-ended ranges are capped at
/// `start + max_range_size` with a warning.
fn parse_page_range(
    range: &str,
    max_range_size: u32,
    warnings: &mut Vec<String>,
) -> Result<Vec<u32>, ExtractError> {
    let mut pages = Vec::new();

    for raw in range.split(',') {
        let token = raw.trim();
        if token.is_empty() {
            return Err(ExtractError::InvalidParams {
                param: "page_range",
                message: format!("empty segment in {:?}", range),
            });
        }

        match token.split_once('-') {
            None => pages.push(parse_page_number(token, range)?),
            Some((start, "")) => {
                let start = parse_page_number(start, range)?;
                let end = start.saturating_add(max_range_size);
                warnings.push(format!(
                    "open-ended range {:?} truncated to pages {}-{}",
                    token, start, end
                ));
                pages.extend(start..=end);
            }
            Some((start, end)) => {
                let start = parse_page_number(start, range)?;
                let end = parse_page_number(end, range)?;
                if end < start {
                    return Err(ExtractError::InvalidParams {
                        param: "page_range",
                        message: format!("inverted range {:?} in {:?}", token, range),
                    });
                }
                pages.extend(start..=end);
            }
        }
    }

    Ok(pages)
}

fn parse_page_number(token: &str, source: &str) -> Result<u32, ExtractError> {
    let value: u32 = token.trim().parse().map_err(|_| ExtractError::InvalidParams {
        param: "page_range",
        message: format!("invalid page number {:?} in {:?}", token.trim(), source),
    })?;
    if value == 0 {
        return Err(ExtractError::InvalidParams {
            param: "page_range",
            message: format!("page numbers start at 1, got 0 in {:?}", source),
        });
    }
    Ok(value)
}

/// Decide which pages to process given the resolved targets and the
/// document's page count.
pub fn plan_pages(
    target: &TargetPages,
    total_pages: u32,
    allow_full_document: bool,
    config: &PagePlanConfig,
) -> PagePlan {
    match &target.pages {
        Some(requested) => {
            let (pages, invalid_pages): (Vec<u32>, Vec<u32>) =
                requested.iter().partition(|&&p| p <= total_pages);
            PagePlan {
                pages,
                invalid_pages,
                guard_warning: None,
            }
        }
        None if allow_full_document => PagePlan {
            pages: (1..=total_pages).collect(),
            ..Default::default()
        },
        None => {
            let limit = config.sample_page_limit.min(total_pages);
            let guard_warning = (limit < total_pages).then(|| {
                format!(
                    "no pages requested; processed only the first {} of {} pages. \
                     Pass explicit pages or set allow_full_document to process everything.",
                    limit, total_pages
                )
            });
            PagePlan {
                pages: (1..=limit).collect(),
                invalid_pages: Vec::new(),
                guard_warning,
            }
        }
    }
}
