//! Source-type classification.
//!
//! Accessibility checkers export their findings as PDFs, and those exports
//! regularly get uploaded in place of the document they describe. The
//! classifier flags such artifacts from the file name and text density.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::ParsedDocument;

static REPORT_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(report|accessibility[\s-]?checker|checker|audit|acrobat\s*-\s*report|ai\s*-\s*report)\b",
    )
    .unwrap()
});

/// What kind of document an upload appears to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    /// A genuine document worth remediating
    ContentDocument,
    /// An exported checker report
    CheckerReportArtifact,
    /// Not enough signal either way
    MixedOrUncertain,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::ContentDocument => write!(f, "content-document"),
            SourceType::CheckerReportArtifact => write!(f, "checker-report-artifact"),
            SourceType::MixedOrUncertain => write!(f, "mixed-or-uncertain"),
        }
    }
}

/// Confidence attached to a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

/// Outcome of [`classify_source`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAssessment {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub confidence: Confidence,
    pub reasons: Vec<String>,
    pub suggested_action: String,
}

impl SourceAssessment {
    fn new(
        source_type: SourceType,
        confidence: Confidence,
        reasons: [&str; 2],
        suggested_action: &str,
    ) -> Self {
        Self {
            source_type,
            confidence,
            reasons: reasons.iter().map(|r| r.to_string()).collect(),
            suggested_action: suggested_action.to_string(),
        }
    }
}

/// Whether a file name looks like a checker report export.
pub fn name_looks_like_report(file_name: &str) -> bool {
    REPORT_NAME_PATTERN.is_match(file_name)
}

fn has_heading_tag(doc: &ParsedDocument) -> bool {
    doc.tags.iter().any(|t| t.heading_level().is_some())
}

/// Classify a parsed upload by file name and content density.
pub fn classify_source(file_name: &str, doc: &ParsedDocument) -> SourceAssessment {
    let looks_like_report = name_looks_like_report(file_name);
    let text_count = doc.text_items.len();
    let page_count = doc.page_count as usize;
    let has_user_facing_structure = !doc.outlines.is_empty()
        || has_heading_tag(doc)
        || !doc.links.is_empty()
        || !doc.forms.is_empty();

    let sparse_threshold = (page_count * 6).max(20);
    let rich_threshold = (page_count * 30).max(120);
    let image_dominant = text_count == 0 && !doc.images.is_empty();
    let very_sparse = text_count < sparse_threshold;
    let rich_text = text_count >= rich_threshold;

    if looks_like_report
        && (image_dominant
            || (page_count <= 4 && very_sparse && !has_user_facing_structure)
            || page_count <= 2)
    {
        return SourceAssessment::new(
            SourceType::CheckerReportArtifact,
            Confidence::High,
            [
                "Filename strongly matches accessibility-report naming patterns.",
                "Document content is sparse and resembles a checker output artifact rather than a source document.",
            ],
            "Use the original source PDF for remediation. Keep this file as QA evidence only.",
        );
    }

    if looks_like_report && very_sparse {
        return SourceAssessment::new(
            SourceType::CheckerReportArtifact,
            Confidence::Medium,
            [
                "Filename suggests report/checker output.",
                "Extracted content is limited for a publishable content PDF.",
            ],
            "Verify this is the source document before remediation. If this is a report export, upload the source PDF.",
        );
    }

    if rich_text || has_user_facing_structure || (page_count > 2 && text_count > sparse_threshold) {
        let confidence = if rich_text || has_user_facing_structure {
            Confidence::High
        } else {
            Confidence::Medium
        };
        return SourceAssessment::new(
            SourceType::ContentDocument,
            confidence,
            [
                "Document contains substantial readable content and/or navigation structure.",
                "Layout characteristics match a source document suitable for remediation.",
            ],
            "Proceed with remediation and manual review workflow.",
        );
    }

    SourceAssessment::new(
        SourceType::MixedOrUncertain,
        Confidence::Low,
        [
            "Document characteristics are ambiguous (limited text/structure).",
            "It may be scanned content, an export artifact, or a partially structured source file.",
        ],
        "Run remediation, then verify output in desktop checker and assistive-technology smoke tests.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageItem, OutlineEntry, TextItem};

    fn doc_with_text(pages: u32, items: usize) -> ParsedDocument {
        let mut doc = ParsedDocument::new(pages);
        for i in 0..items {
            let page = (i as u32 % pages) + 1;
            doc.text_items
                .push(TextItem::new(format!("Line {}", i), 72.0, 700.0 - i as f32, 11.0, page));
        }
        doc
    }

    #[test]
    fn test_report_name_pattern() {
        assert!(name_looks_like_report("Accessibility Checker results.pdf"));
        assert!(name_looks_like_report("acrobat - report.pdf"));
        assert!(!name_looks_like_report("q3_audit.pdf"));
        assert!(name_looks_like_report("audit.pdf"));
        assert!(!name_looks_like_report("brochure.pdf"));
    }

    #[test]
    fn test_image_only_report_is_artifact() {
        let mut doc = ParsedDocument::new(3);
        doc.images.push(ImageItem::new("img-1-1", 1, 0.0, 0.0, 600.0, 780.0));
        let assessment = classify_source("accessibility report.pdf", &doc);
        assert_eq!(assessment.source_type, SourceType::CheckerReportArtifact);
        assert_eq!(assessment.confidence, Confidence::High);
    }

    #[test]
    fn test_sparse_long_report_is_medium() {
        let mut doc = doc_with_text(10, 30);
        doc.outlines.push(OutlineEntry::new("Summary", 1));
        let assessment = classify_source("checker report.pdf", &doc);
        assert_eq!(assessment.source_type, SourceType::CheckerReportArtifact);
        assert_eq!(assessment.confidence, Confidence::Medium);
    }

    #[test]
    fn test_rich_document() {
        let doc = doc_with_text(2, 200);
        let assessment = classify_source("handbook.pdf", &doc);
        assert_eq!(assessment.source_type, SourceType::ContentDocument);
        assert_eq!(assessment.confidence, Confidence::High);
    }

    #[test]
    fn test_moderate_document_is_medium() {
        let doc = doc_with_text(3, 40);
        let assessment = classify_source("handbook.pdf", &doc);
        assert_eq!(assessment.source_type, SourceType::ContentDocument);
        assert_eq!(assessment.confidence, Confidence::Medium);
    }

    #[test]
    fn test_ambiguous_document() {
        let doc = doc_with_text(1, 5);
        let assessment = classify_source("scan.pdf", &doc);
        assert_eq!(assessment.source_type, SourceType::MixedOrUncertain);
        assert_eq!(assessment.reasons.len(), 2);
    }

    #[test]
    fn test_serializes_type_key() {
        let doc = doc_with_text(1, 5);
        let json = serde_json::to_value(classify_source("scan.pdf", &doc)).unwrap();
        assert_eq!(json["type"], "mixed-or-uncertain");
        assert_eq!(json["confidence"], "low");
    }
}
