//! Evidence pack: a JSON audit trail for one processed document.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audit::AuditFinding;
use crate::classify::SourceAssessment;
use crate::model::{ParsedDocument, RemediationMode, StructureBindingSummary};
use crate::pipeline::{DocumentOutcome, DocumentStatus, OcrStatus};
use crate::remediate::{fingerprint, Iteration, StopReason};
use crate::service::VerificationResult;

use super::score::{displayed_score, ScoreVariant};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceDocument {
    pub name: String,
    pub size_bytes: usize,
    pub uploaded_fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediated_fingerprint: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceProcessing {
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub ocr: OcrStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation_mode: Option<RemediationMode>,
    pub iterations: Vec<Iteration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceScores {
    pub original_internal: Option<u32>,
    pub original_displayed: Option<u32>,
    pub remediated_internal: Option<u32>,
    pub remediated_displayed: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureSummary {
    pub has_struct_tree: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation_mode: Option<RemediationMode>,
    pub structure_binding: Option<StructureBindingSummary>,
    pub tag_count: usize,
}

impl StructureSummary {
    fn of(parsed: &ParsedDocument, mode: Option<RemediationMode>) -> Self {
        Self {
            has_struct_tree: parsed.has_structure_tree,
            remediation_mode: mode,
            structure_binding: parsed.structure_binding.clone(),
            tag_count: parsed.tags.len(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BeforeAfter<T> {
    pub original: T,
    pub remediated: T,
}

/// Read-only audit trail for one document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidencePack {
    pub generated_at: DateTime<Utc>,
    pub document: EvidenceDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_assessment: Option<SourceAssessment>,
    pub processing: EvidenceProcessing,
    pub scoring: EvidenceScores,
    pub findings: BeforeAfter<Vec<AuditFinding>>,
    pub structure: BeforeAfter<Option<StructureSummary>>,
    pub verification: Option<VerificationResult>,
}

impl EvidencePack {
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Assemble the evidence pack for an outcome.
pub fn build_evidence_pack(outcome: &DocumentOutcome, now: DateTime<Utc>) -> EvidencePack {
    let post_audit = outcome.post_audit();
    let verification = outcome.verification();

    EvidencePack {
        generated_at: now,
        document: EvidenceDocument {
            name: outcome.name.clone(),
            size_bytes: outcome.size_bytes,
            uploaded_fingerprint: outcome.fingerprint.clone(),
            remediated_fingerprint: outcome.remediated_bytes().map(fingerprint),
        },
        source_assessment: outcome.assessment.clone(),
        processing: EvidenceProcessing {
            status: outcome.status,
            message: outcome.message.clone(),
            ocr: outcome.ocr.clone(),
            remediation_mode: outcome.remediation_mode(),
            iterations: outcome
                .remediation
                .as_ref()
                .map(|r| r.iterations.clone())
                .unwrap_or_default(),
            stop_reason: outcome.stop_reason(),
        },
        scoring: EvidenceScores {
            original_internal: outcome.audit.as_ref().map(|a| a.score),
            original_displayed: displayed_score(outcome.audit.as_ref(), ScoreVariant::Original, None),
            remediated_internal: post_audit.map(|a| a.score),
            remediated_displayed: displayed_score(post_audit, ScoreVariant::Remediated, verification),
        },
        findings: BeforeAfter {
            original: outcome.audit.as_ref().map(|a| a.findings.clone()).unwrap_or_default(),
            remediated: post_audit.map(|a| a.findings.clone()).unwrap_or_default(),
        },
        structure: BeforeAfter {
            original: outcome.parsed.as_ref().map(|p| StructureSummary::of(p, None)),
            remediated: outcome
                .remediated_parsed()
                .map(|p| StructureSummary::of(p, outcome.remediation_mode())),
        },
        verification: verification.cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{RemediationOptions, Remediator};

    #[test]
    fn test_failed_document_pack() {
        let remediator = Remediator::new(RemediationOptions::default());
        let outcome = remediator.process("broken.pdf", b"garbage");
        let pack = build_evidence_pack(&outcome, Utc::now());

        assert_eq!(pack.processing.status, DocumentStatus::Failed);
        assert!(pack.scoring.original_internal.is_none());
        assert!(pack.document.remediated_fingerprint.is_none());

        let json: serde_json::Value = serde_json::from_str(&pack.to_json().unwrap()).unwrap();
        assert_eq!(json["processing"]["status"], "failed");
        assert_eq!(json["document"]["name"], "broken.pdf");
        assert!(json["verification"].is_null());
    }
}
