//! Standards verification results.
//!
//! Verification reports arrive as JSON or XML in several dialects. Both are
//! normalized into one [`VerificationResult`].

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result, ServiceErrorKind};

/// Pass/fail counters reported by the verifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed_rules: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_rules: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed_checks: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_checks: Option<u64>,
}

impl VerificationSummary {
    fn is_empty(&self) -> bool {
        self.passed_rules.is_none()
            && self.failed_rules.is_none()
            && self.passed_checks.is_none()
            && self.failed_checks.is_none()
    }
}

/// Outcome of one verification call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// `false` when the service was not available at all
    pub attempted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliant: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<VerificationSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Verdict derived from a [`VerificationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Compliant,
    NonCompliant,
    /// Counts or a statement arrived, but no verdict could be derived
    Indeterminate,
    Unavailable,
}

impl VerificationResult {
    /// The service could not be reached or is not deployed.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            attempted: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Map a service failure to a result. Only unavailability means "not attempted".
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::ExternalService {
                kind: ServiceErrorKind::Unavailable,
                message,
            } => Self::unavailable(message.clone()),
            other => Self {
                attempted: true,
                reason: Some(other.to_string()),
                ..Default::default()
            },
        }
    }

    pub fn verdict(&self) -> Verdict {
        if !self.attempted {
            return Verdict::Unavailable;
        }
        match self.compliant {
            Some(true) => Verdict::Compliant,
            Some(false) => Verdict::NonCompliant,
            None => Verdict::Indeterminate,
        }
    }

    /// Failed checks when reported, else failed rules.
    pub fn failure_score(&self) -> Option<u64> {
        let summary = self.summary.as_ref()?;
        summary.failed_checks.or(summary.failed_rules)
    }

    /// Whether the report says the document is not yet compliant.
    pub fn reports_failures(&self) -> bool {
        self.compliant == Some(false)
            || self
                .summary
                .map(|s| s.failed_rules.unwrap_or(0) > 0 || s.failed_checks.unwrap_or(0) > 0)
                .unwrap_or(false)
    }
}

/// A standards verification service.
pub trait Verifier: Send + Sync {
    /// Verify a document. Service failures are errors; findings are not.
    fn verify(&self, pdf: &[u8]) -> Result<VerificationResult>;
}

/// Normalize a verification report body of either format.
pub fn normalize_report(body: &str, content_type: Option<&str>) -> VerificationResult {
    let payload = body.trim();
    if payload.is_empty() {
        return VerificationResult {
            attempted: true,
            reason: Some("Verification service returned an empty report.".to_string()),
            ..Default::default()
        };
    }

    let content_type = content_type.unwrap_or("").to_lowercase();
    let expects_json =
        content_type.contains("json") || payload.starts_with('{') || payload.starts_with('[');
    let expects_xml = content_type.contains("xml")
        || payload.starts_with('<')
        || payload.contains("<validationReport");

    if expects_json {
        match serde_json::from_str::<Value>(payload) {
            Ok(value) => {
                if let Some(result) = normalize_json(&value) {
                    return result;
                }
            }
            Err(e) => log::debug!("Verification report is not JSON: {}", e),
        }
    }
    if expects_xml || !expects_json {
        if let Some(result) = normalize_xml(payload) {
            return result;
        }
    }

    VerificationResult {
        attempted: true,
        reason: Some("Unable to parse verification report.".to_string()),
        ..Default::default()
    }
}

fn lookup<'a>(record: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| {
        record
            .get(*key)
            .or_else(|| record.get(&format!("@{}", key)))
    })
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn summary_from(count: impl Fn(&str) -> Option<u64>) -> Option<VerificationSummary> {
    let summary = VerificationSummary {
        passed_rules: count("passedRules"),
        failed_rules: count("failedRules"),
        passed_checks: count("passedChecks"),
        failed_checks: count("failedChecks"),
    };
    (!summary.is_empty()).then_some(summary)
}

fn json_summary(record: Option<&serde_json::Map<String, Value>>) -> Option<VerificationSummary> {
    let record = record?;
    summary_from(|key| lookup(record, &[key]).and_then(as_count))
}

/// The object that looks like a validation report, searched depth first.
fn find_report(node: &Value) -> Option<&serde_json::Map<String, Value>> {
    match node {
        Value::Array(items) => items.iter().find_map(find_report),
        Value::Object(record) => {
            if let Some(Value::Object(nested)) = record.get("validationReport") {
                return Some(nested);
            }
            let looks_like_report = ["isCompliant", "@isCompliant", "profileName", "@profileName", "details"]
                .iter()
                .any(|k| record.contains_key(*k));
            if looks_like_report {
                return Some(record);
            }
            record.values().find_map(find_report)
        }
        _ => None,
    }
}

fn find_compliance(node: &Value) -> Option<bool> {
    match node {
        Value::Array(items) => items.iter().find_map(find_compliance),
        Value::Object(record) => lookup(record, &["isCompliant", "compliant"])
            .and_then(as_bool)
            .or_else(|| record.values().find_map(find_compliance)),
        _ => None,
    }
}

/// Verdict from counts, then from the statement wording.
fn infer_compliance(summary: Option<&VerificationSummary>, statement: Option<&str>) -> Option<bool> {
    if let Some(failed) = summary.and_then(|s| s.failed_rules) {
        return Some(failed == 0);
    }
    if let Some(failed) = summary.and_then(|s| s.failed_checks) {
        return Some(failed == 0);
    }
    let statement = statement?.to_lowercase();
    if statement.contains("not compliant") || statement.contains("non-compliant") {
        Some(false)
    } else if statement.contains("compliant") {
        Some(true)
    } else if statement.contains("failed") || statement.contains("fails") {
        Some(false)
    } else {
        None
    }
}

/// Normalize a JSON report. `None` when nothing resembling a report is found.
pub fn normalize_json(value: &Value) -> Option<VerificationResult> {
    let report = find_report(value)?;
    let details = report.get("details").and_then(Value::as_object);
    let summary = json_summary(details).or_else(|| json_summary(Some(report)));
    let statement = lookup(report, &["statement"]).and_then(as_text);
    let compliant = lookup(report, &["isCompliant"])
        .and_then(as_bool)
        .or_else(|| find_compliance(&Value::Object(report.clone())))
        .or_else(|| infer_compliance(summary.as_ref(), statement.as_deref()));

    Some(VerificationResult {
        attempted: true,
        compliant,
        profile: lookup(report, &["profileName", "validationProfile"]).and_then(as_text),
        statement,
        summary,
        reason: None,
    })
}

fn attributes(element: &BytesStart<'_>) -> HashMap<String, String> {
    element
        .attributes()
        .filter_map(|attr| attr.ok())
        .filter_map(|attr| {
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
            let value = attr.unescape_value().ok()?.trim().to_string();
            Some((key, value))
        })
        .collect()
}

/// Normalize an XML report from its `validationReport` and `details` attributes.
pub fn normalize_xml(xml: &str) -> Option<VerificationResult> {
    let mut reader = Reader::from_str(xml);
    let mut report: Option<HashMap<String, String>> = None;
    let mut details: Option<HashMap<String, String>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"validationReport" if report.is_none() => report = Some(attributes(&e)),
                b"details" if details.is_none() => details = Some(attributes(&e)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                log::debug!("Stopped reading verification XML: {}", e);
                break;
            }
        }
        if report.is_some() && details.is_some() {
            break;
        }
    }

    let report = report?;
    let text = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| report.get(*k))
            .filter(|v| !v.is_empty())
            .cloned()
    };
    let summary = details
        .as_ref()
        .and_then(|d| summary_from(|key| d.get(key).and_then(|v| v.parse().ok())));
    let statement = text(&["statement"]);
    let compliant = text(&["isCompliant", "compliant"])
        .and_then(|v| as_bool(&Value::String(v)))
        .or_else(|| infer_compliance(summary.as_ref(), statement.as_deref()));

    Some(VerificationResult {
        attempted: true,
        compliant,
        profile: text(&["profileName", "validationProfile"]),
        statement,
        summary,
        reason: None,
    })
}
