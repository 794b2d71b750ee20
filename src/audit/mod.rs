//! Accessibility audit.
//!
//! [`evaluate`] is a pure function of the parsed document: running it twice
//! on the same snapshot yields identical results.

mod rules;
mod scanned;
mod scoring;
mod types;

pub use rules::{action_title, contrast_ratio, rule, AuditContext, AuditRule, Violation, RULES};
pub use scanned::{is_likely_scanned, TextDensity};
pub use scoring::{compliance_score, SCANNED_CAP, UNTAGGED_CAP};
pub use types::{AuditFinding, AuditResult, Category, FindingLocation, Severity};

pub(crate) use rules::{parse_color, GENERIC_LINK};

use crate::model::ParsedDocument;

/// Run every registered rule and score the findings.
pub fn evaluate(doc: &ParsedDocument) -> AuditResult {
    let ctx = AuditContext {
        doc,
        likely_scanned: is_likely_scanned(doc),
    };
    let findings: Vec<AuditFinding> = RULES.iter().flat_map(|rule| rule.evaluate(&ctx)).collect();
    let score = compliance_score(&findings);

    log::debug!(
        "Audit: {} findings across {} rules, score {}",
        findings.len(),
        RULES.len(),
        score
    );

    AuditResult {
        findings,
        score,
        likely_scanned: ctx.likely_scanned,
    }
}
