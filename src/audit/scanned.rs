//! Scanned / image-only document policy.

use serde::{Deserialize, Serialize};

use crate::model::ParsedDocument;

/// Born-digital floors: above all three, a document is not scanned.
const MIN_ITEMS_PER_PAGE: f64 = 2.0;
const MIN_CHARS_PER_PAGE: f64 = 20.0;
const MIN_CHARS_PER_ITEM: f64 = 6.0;

/// Below both of these, a document without semantics is scanned.
const SCANNED_ITEMS_PER_PAGE: f64 = 20.0;
const SCANNED_CHARS_PER_PAGE: f64 = 120.0;

/// Text density measurements behind the scanned decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDensity {
    pub items_per_page: f64,
    pub chars_per_page: f64,
    pub chars_per_item: f64,
}

impl TextDensity {
    /// Measure a document. Whitespace does not count as characters.
    pub fn measure(doc: &ParsedDocument) -> Self {
        let pages = doc.page_count.max(1) as f64;
        let items = doc.text_items.len() as f64;
        let chars = doc
            .text_items
            .iter()
            .map(|item| item.text.chars().filter(|c| !c.is_whitespace()).count())
            .sum::<usize>() as f64;

        Self {
            items_per_page: items / pages,
            chars_per_page: chars / pages,
            chars_per_item: if items > 0.0 { chars / items } else { 0.0 },
        }
    }

    fn is_born_digital(&self) -> bool {
        self.items_per_page >= MIN_ITEMS_PER_PAGE
            && self.chars_per_page >= MIN_CHARS_PER_PAGE
            && self.chars_per_item >= MIN_CHARS_PER_ITEM
    }
}

/// Whether a document looks scanned or image-only.
///
/// Any semantic signal (structure tree, tags, forms, outline) rules it out.
pub fn is_likely_scanned(doc: &ParsedDocument) -> bool {
    if doc.has_semantic_signals() {
        return false;
    }
    let density = TextDensity::measure(doc);
    if density.is_born_digital() {
        return false;
    }
    density.items_per_page < SCANNED_ITEMS_PER_PAGE && density.chars_per_page < SCANNED_CHARS_PER_PAGE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FormField, TextItem};

    fn doc(pages: u32, texts: &[&str]) -> ParsedDocument {
        let mut doc = ParsedDocument::new(pages);
        for (i, text) in texts.iter().enumerate() {
            doc.text_items
                .push(TextItem::new(*text, 72.0, 700.0 - i as f32 * 14.0, 11.0, 1));
        }
        doc
    }

    #[test]
    fn test_sparse_document_is_scanned() {
        assert!(is_likely_scanned(&doc(2, &["x", "y"])));
        assert!(is_likely_scanned(&doc(3, &[])));
    }

    #[test]
    fn test_born_digital_floor() {
        let texts = ["Quarterly results", "Revenue grew strongly"];
        assert!(!is_likely_scanned(&doc(1, &texts)));
    }

    #[test]
    fn test_dense_short_runs_are_not_scanned() {
        let texts: Vec<&str> = std::iter::repeat("ab").take(40).collect();
        assert!(!is_likely_scanned(&doc(1, &texts)));
    }

    #[test]
    fn test_semantic_signal_wins() {
        let mut d = doc(2, &[]);
        d.forms.push(FormField::new("name"));
        assert!(!is_likely_scanned(&d));
    }

    #[test]
    fn test_density_ignores_whitespace() {
        let density = TextDensity::measure(&doc(1, &["a b c"]));
        assert_eq!(density.chars_per_page, 3.0);
        assert_eq!(density.chars_per_item, 3.0);
    }
}
