//! The rule registry.
//!
//! Rules are plain data: an id, fixed metadata and a check function. The
//! engine runs every entry of [`RULES`] and never looks rules up by name.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::{AuditFinding, Category, FindingLocation, Severity};
use crate::heuristics::{detect_artifacts, detect_tables, LIST_MARKER};
use crate::model::{ParsedDocument, RemediationMode};

static SUSPICIOUS_ALT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(image|img|scan|photo)[-_\d\s]*\.(png|jpg|jpeg|gif)$").unwrap());
pub(crate) static GENERIC_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(click here|read more|https?://)").unwrap());
static RGB_FUNCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^rgb\(\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*\)$").unwrap());
static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^#?([0-9a-f]{2})([0-9a-f]{2})([0-9a-f]{2})$").unwrap());

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct AuditContext<'a> {
    pub doc: &'a ParsedDocument,
    /// Result of the scanned-document policy
    pub likely_scanned: bool,
}

/// What a check reports before rule metadata is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub description: String,
    pub location: FindingLocation,
}

impl Violation {
    fn new(description: impl Into<String>, location: FindingLocation) -> Self {
        Self {
            description: description.into(),
            location,
        }
    }

    fn document(description: impl Into<String>) -> Vec<Self> {
        vec![Self::new(description, FindingLocation::document())]
    }
}

/// One registered rule.
#[derive(Clone, Copy)]
pub struct AuditRule {
    pub id: &'static str,
    pub category: Category,
    pub severity: Severity,
    pub wcag: &'static str,
    pub recommendation: &'static str,
    /// Short imperative shown to people fixing the document
    pub title: &'static str,
    pub auto_fixable: bool,
    check: fn(&AuditContext<'_>) -> Vec<Violation>,
}

impl fmt::Debug for AuditRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditRule")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("severity", &self.severity)
            .finish_non_exhaustive()
    }
}

impl AuditRule {
    /// Run the check and attach rule metadata to every violation.
    pub fn evaluate(&self, ctx: &AuditContext<'_>) -> Vec<AuditFinding> {
        (self.check)(ctx)
            .into_iter()
            .map(|v| AuditFinding {
                rule_id: self.id.to_string(),
                category: self.category,
                severity: self.severity,
                description: v.description,
                wcag_criterion: self.wcag.to_string(),
                location: v.location,
                recommendation: self.recommendation.to_string(),
                auto_fixable: self.auto_fixable,
            })
            .collect()
    }
}

/// Look up a registered rule.
pub fn rule(id: &str) -> Option<&'static AuditRule> {
    RULES.iter().find(|r| r.id == id)
}

/// Action title for a rule id, with a category fallback.
pub fn action_title(rule_id: &str, category: Category) -> String {
    match rule(rule_id) {
        Some(rule) => rule.title.to_string(),
        None => format!("Fix remaining {} issue", category.label().to_lowercase()),
    }
}

fn check_pdfua_identifier(ctx: &AuditContext<'_>) -> Vec<Violation> {
    if ctx.doc.meta("pdfuaid:part").is_some() {
        return vec![];
    }
    Violation::document("Missing PDF/UA metadata identifier.")
}

fn check_untagged(ctx: &AuditContext<'_>) -> Vec<Violation> {
    if ctx.doc.has_structure_tree {
        return vec![];
    }
    Violation::document("Document is untagged (no StructTreeRoot found).")
}

fn check_language(ctx: &AuditContext<'_>) -> Vec<Violation> {
    let has_language = ctx
        .doc
        .language
        .as_deref()
        .map(|l| !l.trim().is_empty())
        .unwrap_or(false);
    if has_language {
        return vec![];
    }
    Violation::document("Document language is not set.")
}

fn check_scanned(ctx: &AuditContext<'_>) -> Vec<Violation> {
    if !ctx.likely_scanned {
        return vec![];
    }
    Violation::document("Document appears to be scanned or image-only; little or no real text was found.")
}

fn check_unbound_structure(ctx: &AuditContext<'_>) -> Vec<Violation> {
    let doc = ctx.doc;
    if !doc.has_structure_tree {
        return vec![];
    }
    let unbound = match &doc.structure_binding {
        Some(binding) => binding.is_unbound(),
        None => {
            doc.remediation_mode == Some(RemediationMode::AnalysisOnly) && !doc.tags.is_empty()
        }
    };
    if !unbound {
        return vec![];
    }
    Violation::document(
        "Structure tree has elements but none reference page content (no MCIDs or content references).",
    )
}

fn check_skipped_heading_levels(ctx: &AuditContext<'_>) -> Vec<Violation> {
    let mut headings: Vec<(u32, u8)> = ctx
        .doc
        .tags
        .iter()
        .filter_map(|t| t.heading_level().map(|level| (t.page.unwrap_or(0), level)))
        .collect();
    headings.sort_by_key(|(page, _)| *page);

    let skipped = headings.windows(2).any(|w| w[1].1 > w[0].1 + 1);
    if !skipped {
        return vec![];
    }
    vec![Violation::new(
        "Skipped heading level detected.",
        FindingLocation::element("Heading tree"),
    )]
}

fn check_missing_headings(ctx: &AuditContext<'_>) -> Vec<Violation> {
    let doc = ctx.doc;
    if doc.page_count <= 1 || doc.tags.iter().any(|t| t.heading_level().is_some()) {
        return vec![];
    }
    Violation::document("No headings detected in multi-page document.")
}

fn check_missing_alt(ctx: &AuditContext<'_>) -> Vec<Violation> {
    ctx.doc
        .images
        .iter()
        .filter(|image| !image.is_decorative() && image.alt_text().is_none())
        .map(|image| {
            Violation::new(
                "Image is missing alt text.",
                FindingLocation::page_element(image.page, image.id.clone()),
            )
        })
        .collect()
}

fn check_filename_alt(ctx: &AuditContext<'_>) -> Vec<Violation> {
    ctx.doc
        .images
        .iter()
        .filter(|image| image.alt_text().map(|alt| SUSPICIOUS_ALT.is_match(alt)).unwrap_or(false))
        .map(|image| {
            Violation::new(
                "Image alt text appears to be filename-like.",
                FindingLocation::page_element(image.page, image.id.clone()),
            )
        })
        .collect()
}

fn check_table_rows(ctx: &AuditContext<'_>) -> Vec<Violation> {
    let tags = &ctx.doc.tags;
    let missing_rows = tags
        .iter()
        .filter(|t| t.kind == "Table")
        .any(|table| !tags.iter().any(|t| t.kind == "TR" && t.page == table.page));
    if !missing_rows {
        return vec![];
    }
    vec![Violation::new(
        "Table tags missing row structure.",
        FindingLocation::element("Table"),
    )]
}

fn check_untagged_tables(ctx: &AuditContext<'_>) -> Vec<Violation> {
    let doc = ctx.doc;
    if doc.tag_count("Table") > 0 {
        return vec![];
    }
    let artifacts: Vec<usize> = detect_artifacts(doc).iter().map(|a| a.item).collect();
    let candidates: Vec<usize> = (0..doc.text_items.len())
        .filter(|idx| !artifacts.contains(idx))
        .collect();
    detect_tables(&doc.text_items, &candidates)
        .iter()
        .map(|table| {
            Violation::new(
                "Tabular layout detected without table tags.",
                FindingLocation::page(table.page),
            )
        })
        .take(1)
        .collect()
}

fn check_untagged_lists(ctx: &AuditContext<'_>) -> Vec<Violation> {
    let doc = ctx.doc;
    let list_lines = doc
        .text_items
        .iter()
        .filter(|item| LIST_MARKER.is_match(&item.text))
        .count();
    if list_lines <= 2 || doc.tag_count("L") > 0 {
        return vec![];
    }
    Violation::document("List-like text found without semantic list tags.")
}

fn check_link_text(ctx: &AuditContext<'_>) -> Vec<Violation> {
    ctx.doc
        .links
        .iter()
        .filter(|link| GENERIC_LINK.is_match(link.text.trim()))
        .map(|link| {
            Violation::new(
                "Link text is not meaningful out of context.",
                FindingLocation::page_element(link.page, link.text.clone()),
            )
        })
        .collect()
}

fn check_bookmarks(ctx: &AuditContext<'_>) -> Vec<Violation> {
    let doc = ctx.doc;
    if doc.page_count <= 4 || !doc.outlines.is_empty() {
        return vec![];
    }
    Violation::document("Long document is missing bookmarks/outlines.")
}

/// Parse `#rrggbb` or `rgb(r, g, b)`.
pub(crate) fn parse_color(color: &str) -> Option<[u8; 3]> {
    let channels = |caps: regex::Captures<'_>, radix: u32| -> Option<[u8; 3]> {
        let mut rgb = [0u8; 3];
        for (i, slot) in rgb.iter_mut().enumerate() {
            let value = u32::from_str_radix(caps.get(i + 1)?.as_str(), radix).ok()?;
            *slot = u8::try_from(value).ok()?;
        }
        Some(rgb)
    };
    if let Some(caps) = RGB_FUNCTION.captures(color) {
        return channels(caps, 10);
    }
    HEX_COLOR.captures(color).and_then(|caps| channels(caps, 16))
}

fn relative_luminance(rgb: [u8; 3]) -> f64 {
    let linear = |channel: u8| {
        let c = channel as f64 / 255.0;
        if c <= 0.03928 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    0.2126 * linear(rgb[0]) + 0.7152 * linear(rgb[1]) + 0.0722 * linear(rgb[2])
}

/// WCAG contrast ratio, rounded to two decimals.
pub fn contrast_ratio(foreground: [u8; 3], background: [u8; 3]) -> f64 {
    let (a, b) = (relative_luminance(foreground), relative_luminance(background));
    let ratio = (a.max(b) + 0.05) / (a.min(b) + 0.05);
    (ratio * 100.0).round() / 100.0
}

fn check_contrast(ctx: &AuditContext<'_>) -> Vec<Violation> {
    const WHITE: [u8; 3] = [255, 255, 255];
    let mut flagged_pages = Vec::new();
    let mut violations = Vec::new();

    for item in &ctx.doc.text_items {
        let Some(fg) = item.color.as_deref().and_then(parse_color) else {
            continue;
        };
        let ratio = contrast_ratio(fg, WHITE);
        let large = item.font_size >= 18.0 || (item.is_bold() && item.font_size >= 14.0);
        let threshold = if large { 3.0 } else { 4.5 };

        if ratio < threshold && !flagged_pages.contains(&item.page) {
            flagged_pages.push(item.page);
            violations.push(Violation::new(
                format!(
                    "Text may have insufficient contrast ratio ({}:1) against assumed white background.",
                    ratio
                ),
                FindingLocation::page(item.page),
            ));
        }
    }
    violations
}

fn check_form_labels(ctx: &AuditContext<'_>) -> Vec<Violation> {
    ctx.doc
        .forms
        .iter()
        .filter(|form| form.label_text().is_none())
        .map(|form| {
            Violation::new(
                format!("Form field {} is missing label metadata.", form.name),
                FindingLocation::element(form.name.clone()),
            )
        })
        .collect()
}

fn check_required_fields(ctx: &AuditContext<'_>) -> Vec<Violation> {
    let unclear = ctx
        .doc
        .forms
        .iter()
        .any(|form| form.is_required() && form.label_text().is_none());
    if !unclear {
        return vec![];
    }
    Violation::document("Required field indication may be unclear.")
}

fn check_subject(ctx: &AuditContext<'_>) -> Vec<Violation> {
    if ctx.doc.meta("Subject").is_some() {
        return vec![];
    }
    Violation::document("Document subject metadata is missing.")
}

fn check_tab_order(ctx: &AuditContext<'_>) -> Vec<Violation> {
    if ctx.doc.has_structure_tree {
        return vec![];
    }
    Violation::document("Cannot confirm structure-based tab order.")
}

/// Every rule, in display order.
pub static RULES: &[AuditRule] = &[
    AuditRule {
        id: "DOC-001",
        category: Category::DocumentStructure,
        severity: Severity::Major,
        wcag: "4.1.2 Name, Role, Value",
        recommendation: "Include PDF/UA identifier metadata on remediation output.",
        title: "Add PDF accessibility metadata (PDF/UA)",
        auto_fixable: true,
        check: check_pdfua_identifier,
    },
    AuditRule {
        id: "DOC-002",
        category: Category::DocumentStructure,
        severity: Severity::Critical,
        wcag: "1.3.1 Info and Relationships",
        recommendation: "Generate a complete semantic tag tree.",
        title: "Add accessibility tags to the document",
        auto_fixable: true,
        check: check_untagged,
    },
    AuditRule {
        id: "DOC-003",
        category: Category::DocumentStructure,
        severity: Severity::Major,
        wcag: "3.1.1 Language of Page",
        recommendation: "Set /Lang in the catalog.",
        title: "Set the document language",
        auto_fixable: true,
        check: check_language,
    },
    AuditRule {
        id: "DOC-004",
        category: Category::DocumentStructure,
        severity: Severity::Critical,
        wcag: "1.4.5 Images of Text",
        recommendation: "Run OCR to add a real text layer, then rebuild the tag tree.",
        title: "Run OCR and rebuild tags for scanned content",
        auto_fixable: false,
        check: check_scanned,
    },
    AuditRule {
        id: "DOC-005",
        category: Category::DocumentStructure,
        severity: Severity::Critical,
        wcag: "1.3.1 Info and Relationships",
        recommendation: "Bind structure elements to marked content (MCIDs) and build a parent tree.",
        title: "Bind tags to real page content before publishing",
        auto_fixable: true,
        check: check_unbound_structure,
    },
    AuditRule {
        id: "HDG-001",
        category: Category::Headings,
        severity: Severity::Major,
        wcag: "1.3.1 Info and Relationships",
        recommendation: "Maintain contiguous heading levels.",
        title: "Fix heading levels so they do not skip",
        auto_fixable: true,
        check: check_skipped_heading_levels,
    },
    AuditRule {
        id: "HDG-002",
        category: Category::Headings,
        severity: Severity::Minor,
        wcag: "2.4.6 Headings and Labels",
        recommendation: "Add section headings.",
        title: "Add headings to organize the document",
        auto_fixable: true,
        check: check_missing_headings,
    },
    AuditRule {
        id: "IMG-001",
        category: Category::Images,
        severity: Severity::Critical,
        wcag: "1.1.1 Non-text Content",
        recommendation: "Provide meaningful alt text.",
        title: "Write alt text for each meaningful image",
        auto_fixable: false,
        check: check_missing_alt,
    },
    AuditRule {
        id: "IMG-002",
        category: Category::Images,
        severity: Severity::Major,
        wcag: "1.1.1 Non-text Content",
        recommendation: "Replace filename-like alt text with descriptive text.",
        title: "Replace filename-like alt text",
        auto_fixable: false,
        check: check_filename_alt,
    },
    AuditRule {
        id: "TBL-001",
        category: Category::Tables,
        severity: Severity::Major,
        wcag: "1.3.1 Info and Relationships",
        recommendation: "Ensure Table > TR > TH/TD hierarchy.",
        title: "Fix table structure tags",
        auto_fixable: true,
        check: check_table_rows,
    },
    AuditRule {
        id: "TBL-002",
        category: Category::Tables,
        severity: Severity::Major,
        wcag: "1.3.1 Info and Relationships",
        recommendation: "Tag visual tables with Table, TR, TH and TD elements.",
        title: "Tag visual tables as real tables",
        auto_fixable: true,
        check: check_untagged_tables,
    },
    AuditRule {
        id: "LST-001",
        category: Category::Lists,
        severity: Severity::Major,
        wcag: "1.3.1 Info and Relationships",
        recommendation: "Use L, LI, Lbl, and LBody tags.",
        title: "Convert list-looking text into tagged lists",
        auto_fixable: true,
        check: check_untagged_lists,
    },
    AuditRule {
        id: "LNK-001",
        category: Category::Links,
        severity: Severity::Major,
        wcag: "2.4.4 Link Purpose (In Context)",
        recommendation: "Use descriptive link text.",
        title: "Rewrite unclear link text",
        auto_fixable: false,
        check: check_link_text,
    },
    AuditRule {
        id: "LNK-002",
        category: Category::Links,
        severity: Severity::Minor,
        wcag: "2.4.5 Multiple Ways",
        recommendation: "Generate outline entries from headings.",
        title: "Add bookmarks for easier navigation",
        auto_fixable: true,
        check: check_bookmarks,
    },
    AuditRule {
        id: "CLR-001",
        category: Category::Color,
        severity: Severity::Minor,
        wcag: "1.4.3 Contrast (Minimum)",
        recommendation: "Verify text contrast against the actual page background meets WCAG AA ratio of 4.5:1 (3:1 for large text).",
        title: "Check and improve color contrast",
        auto_fixable: false,
        check: check_contrast,
    },
    AuditRule {
        id: "FRM-001",
        category: Category::Forms,
        severity: Severity::Major,
        wcag: "3.3.2 Labels or Instructions",
        recommendation: "Set form tooltip (/TU) or label association.",
        title: "Add labels to form fields",
        auto_fixable: true,
        check: check_form_labels,
    },
    AuditRule {
        id: "FRM-002",
        category: Category::Forms,
        severity: Severity::Minor,
        wcag: "1.3.1 Info and Relationships",
        recommendation: "Programmatically mark required fields.",
        title: "Mark required fields programmatically",
        auto_fixable: true,
        check: check_required_fields,
    },
    AuditRule {
        id: "META-001",
        category: Category::Metadata,
        severity: Severity::Minor,
        wcag: "2.4.2 Page Titled",
        recommendation: "Set document subject metadata.",
        title: "Add subject metadata",
        auto_fixable: true,
        check: check_subject,
    },
    AuditRule {
        id: "META-002",
        category: Category::Metadata,
        severity: Severity::Major,
        wcag: "2.4.3 Focus Order",
        recommendation: "Set page tabs to follow structure order (/Tabs /S).",
        title: "Set tab order to follow structure",
        auto_fixable: true,
        check: check_tab_order,
    },
];
