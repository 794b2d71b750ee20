//! Heading detection from typography.

use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::TextItem;

use super::lists::LIST_MARKER;

static MARKER_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([•\-*]|\d+[.)]|[a-zA-Z][.)])$").unwrap());
static DIGITS_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d\s.,:/()-]+$").unwrap());

/// Longest text that can still read as a heading.
const MAX_HEADING_CHARS: usize = 110;
/// Score needed to keep a candidate.
const MIN_SCORE: f32 = 2.0;
/// Distinct sizes that map to levels 1 through 6.
const MAX_LEVELS: usize = 6;

/// A heading candidate in reading order.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedHeading {
    pub text: String,
    pub level: u8,
    pub page: u32,
    /// Index of the source text item
    pub item: usize,
}

/// Font size rounded to a tenth of a point, as a hashable key.
fn size_key(size: f32) -> i32 {
    (size * 10.0).round() as i32
}

/// Most common font size across the items.
pub fn body_font_size(items: &[&TextItem]) -> f32 {
    let mut histogram: BTreeMap<i32, usize> = BTreeMap::new();
    for item in items {
        *histogram.entry(size_key(item.font_size)).or_default() += 1;
    }
    // Ties resolve to the smaller size.
    histogram
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(k, _)| *k as f32 / 10.0)
        .unwrap_or(12.0)
}

fn modal_color(items: &[&TextItem]) -> Option<String> {
    let mut counts: HashMap<Option<&str>, usize> = HashMap::new();
    for item in items {
        *counts.entry(item.color.as_deref()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .and_then(|(color, _)| color.map(str::to_string))
}

/// Typographic prominence of one item relative to the body text.
pub fn heading_score(item: &TextItem, body_size: f32, modal_color: Option<&str>) -> f32 {
    let mut score = 0.0;
    if item.is_bold() {
        score += 2.0;
    }
    if item.font_size >= body_size + 1.5 {
        score += 3.0;
    }
    let text = item.text.trim();
    let has_letters = text.chars().any(char::is_alphabetic);
    if text.chars().count() > 3 && has_letters && text == text.to_uppercase() {
        score += 1.5;
    }
    if item.color.as_deref() != modal_color {
        score += 1.0;
    }
    score
}

/// Whether text is plausible as a heading at all.
pub fn is_plausible_heading(text: &str) -> bool {
    let text = text.trim();
    text.chars().count() <= MAX_HEADING_CHARS
        && text.chars().filter(|c| c.is_alphabetic()).count() >= 2
        && !MARKER_ONLY.is_match(text)
        && !DIGITS_ONLY.is_match(text)
}

/// Force the first level to 1 and never step deeper by more than one.
pub fn normalize_levels(levels: &[u8]) -> Vec<u8> {
    let mut normalized = Vec::with_capacity(levels.len());
    let mut previous: Option<u8> = None;
    for &level in levels {
        let level = match previous {
            None => 1,
            Some(prev) => level.clamp(1, prev + 1),
        };
        normalized.push(level.min(6));
        previous = Some(level.min(6));
    }
    normalized
}

/// Detect headings among `candidates` (indices into `items`).
///
/// Statistics (body size, modal colour) come from all `items`, so removing
/// list items or table cells from the candidates does not shift them.
pub fn detect_headings(items: &[TextItem], candidates: &[usize]) -> Vec<DetectedHeading> {
    let all: Vec<&TextItem> = items.iter().collect();
    let body_size = body_font_size(&all);
    let color = modal_color(&all);

    let mut found: Vec<(usize, f32)> = candidates
        .iter()
        .copied()
        .filter_map(|idx| items.get(idx).map(|item| (idx, item)))
        .filter(|(_, item)| is_plausible_heading(&item.text))
        .filter(|(_, item)| !LIST_MARKER.is_match(item.text.trim_start()))
        .filter(|(_, item)| heading_score(item, body_size, color.as_deref()) >= MIN_SCORE)
        .map(|(idx, item)| (idx, item.font_size))
        .collect();

    let mut sizes: Vec<i32> = found.iter().map(|(_, s)| size_key(*s)).collect();
    sizes.sort_unstable_by(|a, b| b.cmp(a));
    sizes.dedup();
    sizes.truncate(MAX_LEVELS);

    found.sort_by(|a, b| {
        let (ia, ib) = (&items[a.0], &items[b.0]);
        ia.page
            .cmp(&ib.page)
            .then(ib.y.total_cmp(&ia.y))
            .then(ia.x.total_cmp(&ib.x))
    });

    let raw_levels: Vec<u8> = found
        .iter()
        .map(|(_, size)| {
            sizes
                .iter()
                .position(|s| *s == size_key(*size))
                .map(|p| p as u8 + 1)
                .unwrap_or(6)
        })
        .collect();
    let levels = normalize_levels(&raw_levels);

    let mut seen = HashSet::new();
    let headings: Vec<DetectedHeading> = found
        .iter()
        .zip(levels)
        .filter_map(|(&(idx, _), level)| {
            let item = &items[idx];
            let text = item.text.trim().to_string();
            seen.insert((item.page, level, text.clone()))
                .then(|| DetectedHeading {
                    text,
                    level,
                    page: item.page,
                    item: idx,
                })
        })
        .collect();

    log::debug!(
        "Heading detection: body size {:.1}, {} headings from {} candidates",
        body_size,
        headings.len(),
        candidates.len()
    );
    headings
}
