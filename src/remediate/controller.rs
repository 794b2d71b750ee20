//! Iterative remediation loop.
//!
//! Each iteration builds, re-parses, re-audits and optionally verifies. The
//! loop stops on compliance, a repeated output, a failure score that stops
//! improving, an unavailable verifier or the iteration cap.

use std::cmp::Ordering;

use serde::Serialize;

use crate::audit::{self, AuditResult};
use crate::error::Result;
use crate::model::ParsedDocument;
use crate::parser::PdfParser;
use crate::service::{VerificationResult, Verifier};

use super::builder::{build, BuildOptions, BuildStats};
use super::manifest::RemediationManifest;

/// Iteration cap.
pub const MAX_ITERATIONS: u32 = 3;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Compliant,
    NoChange,
    NoImprovement,
    MaxIterations,
    ServiceUnavailable,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::Compliant => "compliant",
            StopReason::NoChange => "no_change",
            StopReason::NoImprovement => "no_improvement",
            StopReason::MaxIterations => "max_iterations",
            StopReason::ServiceUnavailable => "service_unavailable",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether to run another iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopDecision {
    #[serde(rename = "continue")]
    pub proceed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<StopReason>,
}

impl LoopDecision {
    fn next() -> Self {
        Self {
            proceed: true,
            reason: None,
        }
    }

    fn stop(reason: StopReason) -> Self {
        Self {
            proceed: false,
            reason: Some(reason),
        }
    }
}

/// Inputs to one stop decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct IterationSignals<'a> {
    pub iteration: u32,
    pub max_iterations: u32,
    pub verification: Option<&'a VerificationResult>,
    pub fingerprint: &'a str,
    pub previous_fingerprint: Option<&'a str>,
    pub failure_score: Option<u64>,
    pub previous_failure_score: Option<u64>,
}

/// Decide whether to continue. Conditions are checked in a fixed order.
pub fn decide(signals: &IterationSignals<'_>) -> LoopDecision {
    if let Some(verification) = signals.verification {
        if !verification.attempted {
            return LoopDecision::stop(StopReason::ServiceUnavailable);
        }
        if verification.compliant == Some(true) {
            return LoopDecision::stop(StopReason::Compliant);
        }
    }
    if signals.previous_fingerprint == Some(signals.fingerprint) {
        return LoopDecision::stop(StopReason::NoChange);
    }
    if let (Some(current), Some(previous)) = (signals.failure_score, signals.previous_failure_score) {
        if current >= previous {
            return LoopDecision::stop(StopReason::NoImprovement);
        }
    }
    if signals.iteration >= signals.max_iterations {
        return LoopDecision::stop(StopReason::MaxIterations);
    }
    LoopDecision::next()
}

/// Strided FNV-1a digest of the bytes, prefixed with the length.
///
/// Large files are sampled (at most ~256 bytes visited), so this only
/// detects "same output again", not tampering.
pub fn fingerprint(bytes: &[u8]) -> String {
    let step = (bytes.len() / 256).max(1);
    let mut hash: u32 = 2_166_136_261;
    for byte in bytes.iter().step_by(step) {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(16_777_619);
    }
    format!("{}:{}", bytes.len(), hash)
}

/// External failed checks, else external failed rules.
///
/// `None` without a verifier or when the verifier reported no counts; the
/// internal audit never stands in for it.
pub fn failure_score(verification: Option<&VerificationResult>) -> Option<u64> {
    verification.and_then(VerificationResult::failure_score)
}

/// One completed iteration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    pub iteration: u32,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    #[serde(skip)]
    pub parsed: ParsedDocument,
    pub fingerprint: String,
    pub score: u32,
    pub audit: AuditResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_score: Option<u64>,
    pub decision: LoopDecision,
    pub stats: BuildStats,
    #[serde(skip)]
    pub manifest: RemediationManifest,
}

impl Iteration {
    fn is_compliant(&self) -> bool {
        self.verification
            .as_ref()
            .and_then(|v| v.compliant)
            .unwrap_or(false)
    }
}

/// Pick the iteration to keep.
///
/// Candidates scoring below the baseline are only considered when nothing
/// else is left. Then: lower failure score, external compliance, higher
/// internal score, earlier iteration.
pub fn select_best(iterations: &[Iteration], baseline_score: u32) -> Option<&Iteration> {
    let non_regressing: Vec<&Iteration> = iterations
        .iter()
        .filter(|it| it.score >= baseline_score)
        .collect();
    let pool = if non_regressing.is_empty() {
        iterations.iter().collect()
    } else {
        non_regressing
    };

    pool.into_iter().min_by(|a, b| compare_candidates(a, b))
}

fn compare_candidates(a: &Iteration, b: &Iteration) -> Ordering {
    let failures = |it: &Iteration| it.failure_score.unwrap_or(u64::MAX);
    failures(a)
        .cmp(&failures(b))
        .then_with(|| b.is_compliant().cmp(&a.is_compliant()))
        .then_with(|| b.score.cmp(&a.score))
        .then_with(|| a.iteration.cmp(&b.iteration))
}

/// Everything the loop produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopOutcome {
    pub iterations: Vec<Iteration>,
    /// Index into `iterations` of the selected candidate
    pub best: usize,
    pub stop_reason: StopReason,
}

impl LoopOutcome {
    pub fn best(&self) -> &Iteration {
        &self.iterations[self.best]
    }
}

/// Runs build passes until a stop condition holds.
pub struct RemediationLoop<'a> {
    options: BuildOptions,
    max_iterations: u32,
    verifier: Option<&'a dyn Verifier>,
}

impl<'a> RemediationLoop<'a> {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            max_iterations: MAX_ITERATIONS,
            verifier: None,
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_verifier(mut self, verifier: Option<&'a dyn Verifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Run the loop. Iterations are strictly sequential; each one starts
    /// from the previous iteration's output.
    pub fn run(&self, parsed: &ParsedDocument, source: Option<&[u8]>, baseline: &AuditResult) -> Result<LoopOutcome> {
        let mut iterations: Vec<Iteration> = Vec::new();
        let mut current = parsed.clone();
        let mut current_source: Option<Vec<u8>> = source.map(<[u8]>::to_vec);
        let mut feedback: Option<VerificationResult> = None;
        let mut stop_reason = StopReason::MaxIterations;

        for iteration in 1..=self.max_iterations {
            let options = self.options.clone().with_verifier_feedback(feedback.take());
            let output = build(&current, current_source.as_deref(), &options)?;
            let reparsed = PdfParser::from_bytes(&output.bytes)?.parse()?;
            let audit = audit::evaluate(&reparsed);
            let verification = self.verifier.map(|verifier| {
                verifier
                    .verify(&output.bytes)
                    .unwrap_or_else(|e| {
                        log::warn!("Verification failed: {}", e);
                        VerificationResult::from_error(&e)
                    })
            });

            let fingerprint = fingerprint(&output.bytes);
            let failure = failure_score(verification.as_ref());
            let previous = iterations.last();
            let decision = decide(&IterationSignals {
                iteration,
                max_iterations: self.max_iterations,
                verification: verification.as_ref(),
                fingerprint: &fingerprint,
                previous_fingerprint: previous.map(|p| p.fingerprint.as_str()),
                failure_score: failure,
                previous_failure_score: previous.and_then(|p| p.failure_score),
            });
            log::info!(
                "Iteration {}: score {} (baseline {}), failures {:?}, {}",
                iteration,
                audit.score,
                baseline.score,
                failure,
                decision
                    .reason
                    .map(StopReason::as_str)
                    .unwrap_or("continue")
            );

            iterations.push(Iteration {
                iteration,
                bytes: output.bytes.clone(),
                parsed: reparsed.clone(),
                fingerprint,
                score: audit.score,
                audit,
                verification: verification.clone(),
                failure_score: failure,
                decision,
                stats: output.stats,
                manifest: output.manifest,
            });

            if let Some(reason) = decision.reason {
                stop_reason = reason;
                break;
            }
            current = reparsed;
            current_source = Some(output.bytes);
            feedback = verification;
        }

        let best = select_best(&iterations, baseline.score)
            .map(|chosen| chosen.iteration as usize - 1)
            .unwrap_or(0);
        Ok(LoopOutcome {
            iterations,
            best,
            stop_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TextItem;
    use crate::service::VerificationSummary;

    fn verified(compliant: Option<bool>, failed_checks: Option<u64>) -> VerificationResult {
        VerificationResult {
            attempted: true,
            compliant,
            summary: failed_checks.map(|n| VerificationSummary {
                failed_checks: Some(n),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn candidate(iteration: u32, score: u32, failure: Option<u64>, compliant: Option<bool>) -> Iteration {
        Iteration {
            iteration,
            bytes: Vec::new(),
            parsed: ParsedDocument::new(1),
            fingerprint: iteration.to_string(),
            score,
            audit: AuditResult::default(),
            verification: Some(verified(compliant, failure)),
            failure_score: failure,
            decision: LoopDecision::next(),
            stats: BuildStats::default(),
            manifest: RemediationManifest::default(),
        }
    }

    #[test]
    fn test_compliant_wins_over_everything() {
        let result = verified(Some(true), Some(50));
        let decision = decide(&IterationSignals {
            iteration: 1,
            max_iterations: 3,
            verification: Some(&result),
            fingerprint: "same",
            previous_fingerprint: Some("same"),
            failure_score: Some(50),
            previous_failure_score: Some(1),
        });
        assert_eq!(decision, LoopDecision::stop(StopReason::Compliant));
        assert_eq!(
            serde_json::to_value(decision).unwrap(),
            serde_json::json!({"continue": false, "reason": "compliant"})
        );
    }

    #[test]
    fn test_unavailable_checked_first() {
        let result = VerificationResult::unavailable("down");
        let decision = decide(&IterationSignals {
            iteration: 1,
            max_iterations: 3,
            verification: Some(&result),
            fingerprint: "a",
            ..Default::default()
        });
        assert_eq!(decision.reason, Some(StopReason::ServiceUnavailable));
    }

    #[test]
    fn test_decision_order() {
        let base = IterationSignals {
            iteration: 2,
            max_iterations: 3,
            fingerprint: "b",
            previous_fingerprint: Some("a"),
            failure_score: Some(4),
            previous_failure_score: Some(6),
            ..Default::default()
        };
        assert_eq!(decide(&base), LoopDecision::next());

        let same = IterationSignals {
            previous_fingerprint: Some("b"),
            ..base
        };
        assert_eq!(decide(&same).reason, Some(StopReason::NoChange));

        let worse = IterationSignals {
            failure_score: Some(6),
            ..base
        };
        assert_eq!(decide(&worse).reason, Some(StopReason::NoImprovement));

        let undefined = IterationSignals {
            failure_score: None,
            iteration: 3,
            ..base
        };
        assert_eq!(decide(&undefined).reason, Some(StopReason::MaxIterations));
    }

    #[test]
    fn test_indeterminate_verification_continues() {
        let result = verified(None, None);
        let decision = decide(&IterationSignals {
            iteration: 1,
            max_iterations: 3,
            verification: Some(&result),
            fingerprint: "a",
            ..Default::default()
        });
        assert!(decision.proceed);
    }

    #[test]
    fn test_fingerprint_stable() {
        let bytes: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(fingerprint(&bytes), fingerprint(&bytes.clone()));
        assert!(fingerprint(&bytes).starts_with("10000:"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
        assert_eq!(fingerprint(b""), "0:2166136261");
    }

    #[test]
    fn test_failure_score_only_from_verifier() {
        assert_eq!(failure_score(None), None);
        assert_eq!(failure_score(Some(&verified(None, None))), None);
        assert_eq!(failure_score(Some(&verified(None, Some(7)))), Some(7));
    }

    #[test]
    fn test_select_best_never_regresses_below_baseline() {
        let iterations = vec![
            candidate(1, 60, Some(10), Some(false)),
            candidate(2, 40, Some(1), Some(false)),
        ];
        assert_eq!(select_best(&iterations, 50).unwrap().iteration, 1);
        // With nothing at or above the baseline, fall back to the full pool.
        assert_eq!(select_best(&iterations, 90).unwrap().iteration, 2);
    }

    #[test]
    fn test_select_best_prefers_lower_failures_then_compliance() {
        let iterations = vec![
            candidate(1, 80, Some(5), Some(false)),
            candidate(2, 70, Some(3), Some(false)),
            candidate(3, 70, Some(3), Some(true)),
        ];
        assert_eq!(select_best(&iterations, 50).unwrap().iteration, 3);
        assert!(select_best(&[], 50).is_none());
    }

    struct AlwaysCompliant;

    impl Verifier for AlwaysCompliant {
        fn verify(&self, _pdf: &[u8]) -> Result<VerificationResult> {
            Ok(verified(Some(true), Some(0)))
        }
    }

    fn report() -> ParsedDocument {
        let mut doc = ParsedDocument::new(1);
        doc.text_items = vec![
            TextItem::new("Summary", 72.0, 740.0, 20.0, 1),
            TextItem::new("The project finished on schedule and budget.", 72.0, 700.0, 11.0, 1),
        ];
        doc
    }

    #[test]
    fn test_loop_stops_when_verifier_reports_compliance() {
        let parsed = report();
        let baseline = audit::evaluate(&parsed);
        let verifier = AlwaysCompliant;
        let outcome = RemediationLoop::new(BuildOptions::new())
            .with_verifier(Some(&verifier))
            .run(&parsed, None, &baseline)
            .unwrap();
        assert_eq!(outcome.iterations.len(), 1);
        assert_eq!(outcome.stop_reason, StopReason::Compliant);
        assert!(outcome.best().score >= baseline.score);
    }

    #[test]
    fn test_loop_is_bounded() {
        let parsed = report();
        let baseline = audit::evaluate(&parsed);
        let outcome = RemediationLoop::new(BuildOptions::new())
            .run(&parsed, None, &baseline)
            .unwrap();
        assert!(outcome.iterations.len() <= MAX_ITERATIONS as usize);
        assert!(outcome.iterations.last().map(|it| !it.decision.proceed).unwrap_or(false));
    }

    #[test]
    fn test_loop_without_verifier_never_reports_no_improvement() {
        let parsed = report();
        let baseline = audit::evaluate(&parsed);
        let outcome = RemediationLoop::new(BuildOptions::new())
            .run(&parsed, None, &baseline)
            .unwrap();
        assert!(outcome.iterations.iter().all(|it| it.failure_score.is_none()));
        assert!(matches!(
            outcome.stop_reason,
            StopReason::MaxIterations | StopReason::NoChange
        ));
    }
}
