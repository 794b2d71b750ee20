//! Audit finding types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How badly a finding blocks assistive technology.
///
/// Variants are ordered worst first, so `min()` picks the worst severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    /// Points deducted from the score for one violated rule.
    pub fn weight(self) -> u32 {
        match self {
            Severity::Critical => 15,
            Severity::Major => 8,
            Severity::Minor => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Major => write!(f, "major"),
            Severity::Minor => write!(f, "minor"),
        }
    }
}

/// Finding category, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Document Structure")]
    DocumentStructure,
    #[serde(rename = "Headings & Structure")]
    Headings,
    #[serde(rename = "Images & Non-Text Content")]
    Images,
    #[serde(rename = "Tables")]
    Tables,
    #[serde(rename = "Lists")]
    Lists,
    #[serde(rename = "Links & Navigation")]
    Links,
    #[serde(rename = "Color & Visual")]
    Color,
    #[serde(rename = "Forms")]
    Forms,
    #[serde(rename = "Metadata & Navigation")]
    Metadata,
}

impl Category {
    /// All categories in display order.
    pub const ALL: [Category; 9] = [
        Category::DocumentStructure,
        Category::Headings,
        Category::Images,
        Category::Tables,
        Category::Lists,
        Category::Links,
        Category::Color,
        Category::Forms,
        Category::Metadata,
    ];

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Category::DocumentStructure => "Document Structure",
            Category::Headings => "Headings & Structure",
            Category::Images => "Images & Non-Text Content",
            Category::Tables => "Tables",
            Category::Lists => "Lists",
            Category::Links => "Links & Navigation",
            Category::Color => "Color & Visual",
            Category::Forms => "Forms",
            Category::Metadata => "Metadata & Navigation",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a finding applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
}

impl FindingLocation {
    /// Document-wide location.
    pub fn document() -> Self {
        Self::default()
    }

    pub fn page(page: u32) -> Self {
        Self {
            page: Some(page),
            element: None,
        }
    }

    pub fn element(element: impl Into<String>) -> Self {
        Self {
            page: None,
            element: Some(element.into()),
        }
    }

    pub fn page_element(page: u32, element: impl Into<String>) -> Self {
        Self {
            page: Some(page),
            element: Some(element.into()),
        }
    }
}

/// One rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFinding {
    pub rule_id: String,
    pub category: Category,
    pub severity: Severity,
    pub description: String,
    pub wcag_criterion: String,
    pub location: FindingLocation,
    pub recommendation: String,
    pub auto_fixable: bool,
}

/// Findings plus the derived score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    pub findings: Vec<AuditFinding>,
    /// Compliance score in `0..=100`
    pub score: u32,
    /// Whether the document was judged scanned or image-only
    pub likely_scanned: bool,
}

impl AuditResult {
    /// Distinct rule ids that fired, sorted.
    pub fn failed_rules(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.findings.iter().map(|f| f.rule_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Whether a rule fired at all.
    pub fn has_rule(&self, rule_id: &str) -> bool {
        self.findings.iter().any(|f| f.rule_id == rule_id)
    }

    /// Number of findings with the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    /// Findings grouped by category for display.
    ///
    /// Groups are sorted by their worst severity, then by category name.
    /// Within a group, findings sort by severity then rule id.
    pub fn grouped(&self) -> Vec<(Category, Vec<&AuditFinding>)> {
        let mut groups: Vec<(Category, Vec<&AuditFinding>)> = Category::ALL
            .iter()
            .map(|&category| {
                let mut findings: Vec<&AuditFinding> =
                    self.findings.iter().filter(|f| f.category == category).collect();
                findings.sort_by(|a, b| a.severity.cmp(&b.severity).then(a.rule_id.cmp(&b.rule_id)));
                (category, findings)
            })
            .filter(|(_, findings)| !findings.is_empty())
            .collect();

        groups.sort_by(|a, b| {
            let worst = |g: &[&AuditFinding]| g.iter().map(|f| f.severity).min();
            worst(&a.1)
                .cmp(&worst(&b.1))
                .then(a.0.label().cmp(b.0.label()))
        });
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(rule: &str, category: Category, severity: Severity) -> AuditFinding {
        AuditFinding {
            rule_id: rule.to_string(),
            category,
            severity,
            description: String::new(),
            wcag_criterion: String::new(),
            location: FindingLocation::document(),
            recommendation: String::new(),
            auto_fixable: false,
        }
    }

    #[test]
    fn test_severity_order_and_weight() {
        assert!(Severity::Critical < Severity::Major);
        assert_eq!([Severity::Minor, Severity::Critical].iter().min(), Some(&Severity::Critical));
        assert_eq!(Severity::Major.weight(), 8);
    }

    #[test]
    fn test_grouped_sorts_by_worst_severity() {
        let result = AuditResult {
            findings: vec![
                finding("META-001", Category::Metadata, Severity::Minor),
                finding("IMG-001", Category::Images, Severity::Critical),
                finding("LNK-001", Category::Links, Severity::Major),
                finding("DOC-003", Category::DocumentStructure, Severity::Major),
            ],
            score: 50,
            likely_scanned: false,
        };

        let order: Vec<Category> = result.grouped().into_iter().map(|(c, _)| c).collect();
        assert_eq!(
            order,
            vec![
                Category::Images,
                Category::DocumentStructure,
                Category::Links,
                Category::Metadata
            ]
        );
    }

    #[test]
    fn test_category_serializes_label() {
        let json = serde_json::to_string(&Category::Images).unwrap();
        assert_eq!(json, "\"Images & Non-Text Content\"");
    }

    #[test]
    fn test_failed_rules_are_distinct() {
        let result = AuditResult {
            findings: vec![
                finding("IMG-001", Category::Images, Severity::Critical),
                finding("IMG-001", Category::Images, Severity::Critical),
                finding("DOC-002", Category::DocumentStructure, Severity::Critical),
            ],
            ..Default::default()
        };
        assert_eq!(result.failed_rules(), vec!["DOC-002", "IMG-001"]);
        assert_eq!(result.count(Severity::Critical), 3);
    }
}
