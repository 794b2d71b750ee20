//! Document-level types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{FormField, ImageItem, Link, OutlineEntry, StructureBindingSummary, Tag, TextItem};

/// Remediation mode recorded by a previous pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemediationMode {
    /// Structure exists but is not verifiably bound to content.
    AnalysisOnly,
    /// Structure elements reference real marked content.
    ContentBound,
}

impl RemediationMode {
    /// The literal used in the persisted manifest.
    pub fn as_str(self) -> &'static str {
        match self {
            RemediationMode::AnalysisOnly => "analysis-only",
            RemediationMode::ContentBound => "content-bound",
        }
    }

    /// Parse the manifest literal. Anything else is rejected.
    pub fn from_literal(value: &str) -> Option<Self> {
        match value {
            "analysis-only" => Some(RemediationMode::AnalysisOnly),
            "content-bound" => Some(RemediationMode::ContentBound),
            _ => None,
        }
    }
}

impl fmt::Display for RemediationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page dimensions in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    /// Width in points
    pub width: f32,
    /// Height in points
    pub height: f32,
}

impl Default for PageSize {
    fn default() -> Self {
        // US Letter
        Self {
            width: 612.0,
            height: 792.0,
        }
    }
}

/// One parsed snapshot of a PDF.
///
/// All page references are 1-indexed and never exceed `page_count`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedDocument {
    /// Number of pages
    pub page_count: u32,

    /// Info dictionary entries plus derived keys such as `pdfuaid:part`
    pub metadata: BTreeMap<String, Option<String>>,

    /// Declared document language
    pub language: Option<String>,

    /// Document title
    pub title: Option<String>,

    /// Whether a structure tree was found
    pub has_structure_tree: bool,

    /// How well the structure tree is bound to content
    pub structure_binding: Option<StructureBindingSummary>,

    /// Mode recorded by a previous remediation pass
    pub remediation_mode: Option<RemediationMode>,

    /// Structure tags in document order
    pub tags: Vec<Tag>,

    /// Positioned text runs
    pub text_items: Vec<TextItem>,

    /// Painted images
    pub images: Vec<ImageItem>,

    /// Link annotations
    pub links: Vec<Link>,

    /// Flattened outline (bookmarks)
    pub outlines: Vec<OutlineEntry>,

    /// Interactive form fields
    pub forms: Vec<FormField>,

    /// Per-page dimensions, index 0 is page 1
    #[serde(default)]
    pub page_sizes: Vec<PageSize>,
}

impl ParsedDocument {
    /// Create an empty snapshot with the given page count.
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            ..Default::default()
        }
    }

    /// Non-blank metadata value.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(|v| v.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Set a metadata value.
    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), Some(value.into()));
    }

    /// Size of a page (1-indexed), Letter when unknown.
    pub fn page_size(&self, page: u32) -> PageSize {
        page.checked_sub(1)
            .and_then(|idx| self.page_sizes.get(idx as usize))
            .copied()
            .unwrap_or_default()
    }

    /// Text items on one page, in extraction order.
    pub fn text_on_page(&self, page: u32) -> impl Iterator<Item = &TextItem> {
        self.text_items.iter().filter(move |item| item.page == page)
    }

    /// Whether the document carries any semantic signal at all.
    pub fn has_semantic_signals(&self) -> bool {
        self.has_structure_tree
            || !self.tags.is_empty()
            || !self.forms.is_empty()
            || !self.outlines.is_empty()
    }

    /// Whether existing structure is bound to marked content.
    pub fn has_content_binding(&self) -> bool {
        self.structure_binding
            .as_ref()
            .map(|b| b.has_content_binding)
            .unwrap_or(false)
    }

    /// Count of tags with the given role.
    pub fn tag_count(&self, role: &str) -> usize {
        self.tags.iter().filter(|t| t.kind == role).count()
    }

    /// Whole-document plain text.
    pub fn plain_text(&self) -> String {
        self.text_items
            .iter()
            .map(|item| item.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_ignores_blank_values() {
        let mut doc = ParsedDocument::new(1);
        doc.set_meta("Subject", "   ");
        doc.metadata.insert("Author".into(), None);
        doc.set_meta("Title", " Annual report ");

        assert_eq!(doc.meta("Subject"), None);
        assert_eq!(doc.meta("Author"), None);
        assert_eq!(doc.meta("Title"), Some("Annual report"));
        assert_eq!(doc.meta("Missing"), None);
    }

    #[test]
    fn test_page_size_defaults_to_letter() {
        let mut doc = ParsedDocument::new(2);
        doc.page_sizes.push(PageSize {
            width: 595.0,
            height: 842.0,
        });

        assert_eq!(doc.page_size(1).width, 595.0);
        assert_eq!(doc.page_size(2), PageSize::default());
        assert_eq!(doc.page_size(0), PageSize::default());
    }

    #[test]
    fn test_remediation_mode_literals() {
        assert_eq!(
            RemediationMode::from_literal("content-bound"),
            Some(RemediationMode::ContentBound)
        );
        assert_eq!(RemediationMode::from_literal("bound"), None);
        let json = serde_json::to_string(&RemediationMode::AnalysisOnly).unwrap();
        assert_eq!(json, "\"analysis-only\"");
    }

    #[test]
    fn test_semantic_signals() {
        let mut doc = ParsedDocument::new(1);
        assert!(!doc.has_semantic_signals());
        doc.outlines.push(OutlineEntry::new("Intro", 1));
        assert!(doc.has_semantic_signals());
    }
}
