//! Running header, footer and page-number detection.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::ParsedDocument;

static PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(page\s+)?(\d{1,4}|[ivxlcdm]{1,7})(\s+(of|/)\s+\d{1,4})?$").unwrap()
});

/// Minimum pages before repetition means anything.
const MIN_PAGES: u32 = 3;
/// Distinct pages a repeated run must appear on.
const MIN_REPEATS: usize = 3;
/// Distance from the top or bottom edge that counts as margin.
const MARGIN_BAND: f32 = 60.0;

/// Why an item was treated as pagination furniture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactReason {
    /// Same text at the same spot on several pages
    Repeated,
    /// A page number in the top or bottom margin
    PageNumber,
}

/// A text item excluded from semantic tagging.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactItem {
    pub item: usize,
    pub page: u32,
    pub reason: ArtifactReason,
}

/// Whether text reads as a bare page number.
pub fn is_page_number(text: &str) -> bool {
    PAGE_NUMBER.is_match(text.trim())
}

/// Text with digits removed, so "Page 3" and "Page 4" share a key.
fn repeat_key(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_digit())
        .collect()
}

/// Detect running headers, footers and page numbers.
///
/// Documents shorter than three pages never yield artifacts.
pub fn detect_artifacts(doc: &ParsedDocument) -> Vec<ArtifactItem> {
    if doc.page_count < MIN_PAGES {
        return Vec::new();
    }

    let mut buckets: HashMap<(i32, i32, String), HashSet<u32>> = HashMap::new();
    for item in &doc.text_items {
        let key = (item.x.round() as i32, item.y.round() as i32, repeat_key(&item.text));
        buckets.entry(key).or_default().insert(item.page);
    }

    let artifacts: Vec<ArtifactItem> = doc
        .text_items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let key = (item.x.round() as i32, item.y.round() as i32, repeat_key(&item.text));
            let repeated = buckets.get(&key).map(|pages| pages.len() >= MIN_REPEATS).unwrap_or(false);
            let reason = if repeated {
                ArtifactReason::Repeated
            } else {
                let height = doc.page_size(item.page).height;
                let in_margin = item.y <= MARGIN_BAND || item.y >= height - MARGIN_BAND;
                if in_margin && is_page_number(&item.text) {
                    ArtifactReason::PageNumber
                } else {
                    return None;
                }
            };
            Some(ArtifactItem {
                item: idx,
                page: item.page,
                reason,
            })
        })
        .collect();

    log::debug!("Artifact detection: {} of {} items", artifacts.len(), doc.text_items.len());
    artifacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TextItem;

    fn doc(pages: u32) -> ParsedDocument {
        let mut doc = ParsedDocument::new(pages);
        for page in 1..=pages {
            doc.text_items.push(TextItem::new("ACME Quarterly", 72.0, 760.0, 9.0, page));
            doc.text_items
                .push(TextItem::new("Body text continues", 72.0, 700.0 - page as f32 * 12.0, 11.0, page));
            doc.text_items
                .push(TextItem::new(page.to_string(), 300.0 + page as f32 * 40.0, 30.0, 9.0, page));
        }
        doc
    }

    #[test]
    fn test_page_number_tokens() {
        assert!(is_page_number("12"));
        assert!(is_page_number("xiv"));
        assert!(is_page_number("Page 3 of 10"));
        assert!(is_page_number("4 / 9"));
        assert!(!is_page_number("Chapter 3"));
        assert!(!is_page_number("12345"));
    }

    #[test]
    fn test_detects_running_header_and_numbers() {
        let doc = doc(4);
        let artifacts = detect_artifacts(&doc);

        let repeated = artifacts.iter().filter(|a| a.reason == ArtifactReason::Repeated).count();
        let numbers = artifacts.iter().filter(|a| a.reason == ArtifactReason::PageNumber).count();
        assert_eq!(repeated, 4);
        assert_eq!(numbers, 4);
    }

    #[test]
    fn test_short_documents_have_no_artifacts() {
        assert!(detect_artifacts(&doc(2)).is_empty());
    }

    #[test]
    fn test_page_number_in_body_is_kept() {
        let mut doc = ParsedDocument::new(3);
        doc.text_items.push(TextItem::new("42", 72.0, 400.0, 11.0, 1));
        assert!(detect_artifacts(&doc).is_empty());
    }
}
