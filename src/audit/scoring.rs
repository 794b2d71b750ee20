//! Compliance scoring.

use std::collections::BTreeMap;

use super::types::{AuditFinding, Severity};

/// Rule whose firing caps the score at [`SCANNED_CAP`].
pub const SCANNED_RULE: &str = "DOC-004";
/// Rule whose firing caps the score at [`UNTAGGED_CAP`].
pub const UNTAGGED_RULE: &str = "DOC-002";

pub const SCANNED_CAP: u32 = 15;
pub const UNTAGGED_CAP: u32 = 40;

/// Score findings on a 0..=100 scale.
///
/// Each violated rule is charged once, at its worst severity, so repeated
/// instances of the same rule never compound.
pub fn compliance_score(findings: &[AuditFinding]) -> u32 {
    let mut worst: BTreeMap<&str, Severity> = BTreeMap::new();
    for finding in findings {
        worst
            .entry(finding.rule_id.as_str())
            .and_modify(|s| *s = (*s).min(finding.severity))
            .or_insert(finding.severity);
    }

    let penalty: u32 = worst.values().map(|s| s.weight()).sum();
    let mut score = 100u32.saturating_sub(penalty);

    if worst.contains_key(SCANNED_RULE) {
        score = score.min(SCANNED_CAP);
    }
    if worst.contains_key(UNTAGGED_RULE) {
        score = score.min(UNTAGGED_CAP);
    }
    score
}
