//! Score shown to people, as opposed to the internal audit score.

use crate::audit::{AuditResult, Severity};
use crate::service::VerificationResult;

/// Which audit a score belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreVariant {
    Original,
    Remediated,
}

/// Remediated output never shows 100 unless it has no critical findings and
/// the external verifier reported compliance. It shows 99 instead.
pub fn displayed_score(
    audit: Option<&AuditResult>,
    variant: ScoreVariant,
    verification: Option<&VerificationResult>,
) -> Option<u32> {
    let audit = audit?;
    if variant == ScoreVariant::Remediated && audit.score >= 100 {
        let verified = verification.and_then(|v| v.compliant) == Some(true);
        if audit.count(Severity::Critical) > 0 || !verified {
            return Some(99);
        }
    }
    Some(audit.score)
}
