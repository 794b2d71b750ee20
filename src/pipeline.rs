//! Per-document pipeline and batch processing.
//!
//! parse → classify → audit → optional recognition → remediation loop.
//! A failure in a later stage keeps everything the earlier stages produced.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use crate::audit::{self, AuditResult};
use crate::classify::{classify_source, SourceAssessment};
use crate::model::{ParsedDocument, RemediationMode};
use crate::parser::{ParseOptions, PdfParser};
use crate::remediate::{
    fingerprint, BuildOptions, Iteration, LoopOutcome, RemediationLoop, StopReason, MAX_ITERATIONS,
};
use crate::service::{recognition_language, Recognizer, VerificationResult, Verifier};

/// Options for [`Remediator`].
#[derive(Debug, Clone)]
pub struct RemediationOptions {
    pub max_iterations: u32,
    /// Output language; the document's own when `None`
    pub language: Option<String>,
    /// Overlay all recognized text, not only tagged runs
    pub text_layer: bool,
    pub strict_metadata: bool,
    pub parse: ParseOptions,
}

impl Default for RemediationOptions {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            language: None,
            text_layer: false,
            strict_metadata: false,
            parse: ParseOptions::default(),
        }
    }
}

impl RemediationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_text_layer(mut self, enabled: bool) -> Self {
        self.text_layer = enabled;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict_metadata = true;
        self
    }
}

/// Final state of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Remediated,
    /// Parsed and audited, but remediation failed
    AuditOnly,
    Failed,
}

/// What happened with text recognition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrStatus {
    pub attempted: bool,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Everything known about one processed document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentOutcome {
    pub name: String,
    pub size_bytes: usize,
    pub fingerprint: String,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<SourceAssessment>,
    #[serde(skip)]
    pub parsed: Option<ParsedDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditResult>,
    pub ocr: OcrStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<LoopOutcome>,
}

impl DocumentOutcome {
    fn new(name: &str, bytes: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            size_bytes: bytes.len(),
            fingerprint: fingerprint(bytes),
            status: DocumentStatus::Failed,
            message: None,
            assessment: None,
            parsed: None,
            audit: None,
            ocr: OcrStatus::default(),
            remediation: None,
        }
    }

    fn failed(mut self, status: DocumentStatus, message: String) -> Self {
        log::warn!("{}: {}", self.name, message);
        self.status = status;
        self.message = Some(message);
        self
    }

    /// The selected remediation iteration.
    pub fn best(&self) -> Option<&Iteration> {
        self.remediation.as_ref().map(LoopOutcome::best)
    }

    pub fn remediated_bytes(&self) -> Option<&[u8]> {
        self.best().map(|it| it.bytes.as_slice())
    }

    pub fn post_audit(&self) -> Option<&AuditResult> {
        self.best().map(|it| &it.audit)
    }

    pub fn remediated_parsed(&self) -> Option<&ParsedDocument> {
        self.best().map(|it| &it.parsed)
    }

    pub fn verification(&self) -> Option<&VerificationResult> {
        self.best().and_then(|it| it.verification.as_ref())
    }

    pub fn remediation_mode(&self) -> Option<RemediationMode> {
        self.best().and_then(|it| it.manifest.remediation_mode)
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.remediation.as_ref().map(|r| r.stop_reason)
    }
}

/// Runs the full pipeline for one document at a time.
///
/// A `Remediator` holds no per-document state, so one instance can serve
/// many documents in parallel.
pub struct Remediator<'a> {
    options: RemediationOptions,
    verifier: Option<&'a dyn Verifier>,
    recognizer: Option<&'a dyn Recognizer>,
}

impl<'a> Remediator<'a> {
    pub fn new(options: RemediationOptions) -> Self {
        Self {
            options,
            verifier: None,
            recognizer: None,
        }
    }

    pub fn with_verifier(mut self, verifier: &'a dyn Verifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_recognizer(mut self, recognizer: &'a dyn Recognizer) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    fn parse(&self, bytes: &[u8]) -> crate::Result<ParsedDocument> {
        PdfParser::from_bytes_with_options(bytes, self.options.parse.clone())?.parse()
    }

    /// Parse, classify and audit only.
    pub fn audit(&self, name: &str, bytes: &[u8]) -> DocumentOutcome {
        let mut outcome = DocumentOutcome::new(name, bytes);
        let parsed = match self.parse(bytes) {
            Ok(parsed) => parsed,
            Err(e) => return outcome.failed(DocumentStatus::Failed, e.to_string()),
        };
        outcome.assessment = Some(classify_source(name, &parsed));
        outcome.audit = Some(audit::evaluate(&parsed));
        outcome.parsed = Some(parsed);
        outcome.status = DocumentStatus::AuditOnly;
        outcome
    }

    /// Run the whole pipeline on one document.
    pub fn process(&self, name: &str, bytes: &[u8]) -> DocumentOutcome {
        let mut outcome = self.audit(name, bytes);
        let (Some(parsed), Some(baseline)) = (outcome.parsed.clone(), outcome.audit.clone()) else {
            return outcome;
        };

        let language = BuildOptions {
            language: self.options.language.clone(),
            ..BuildOptions::default()
        }
        .effective_language(&parsed);

        let mut working = parsed;
        let mut working_bytes = bytes.to_vec();
        if baseline.likely_scanned {
            match self.recognizer {
                Some(recognizer) => {
                    outcome.ocr.attempted = true;
                    match self.recognize(recognizer, bytes, &language) {
                        Ok((recognized, recognized_bytes)) => {
                            working = recognized;
                            working_bytes = recognized_bytes;
                            outcome.ocr.applied = true;
                        }
                        Err(e) => outcome.ocr.reason = Some(e.to_string()),
                    }
                }
                None => outcome.ocr.reason = Some("recognition service not configured".to_string()),
            }
        }

        let build_options = BuildOptions {
            language: Some(language),
            text_layer: self.options.text_layer || outcome.ocr.applied,
            strict_metadata: self.options.strict_metadata,
            ..BuildOptions::default()
        };
        let run = RemediationLoop::new(build_options)
            .with_max_iterations(self.options.max_iterations)
            .with_verifier(self.verifier)
            .run(&working, Some(&working_bytes), &baseline);

        match run {
            Ok(result) => {
                log::info!(
                    "{}: score {} -> {} after {} iteration(s), {}",
                    name,
                    baseline.score,
                    result.best().score,
                    result.iterations.len(),
                    result.stop_reason
                );
                outcome.remediation = Some(result);
                outcome.status = DocumentStatus::Remediated;
                outcome
            }
            Err(e) => outcome.failed(DocumentStatus::AuditOnly, format!("remediation failed: {}", e)),
        }
    }

    fn recognize(
        &self,
        recognizer: &dyn Recognizer,
        bytes: &[u8],
        language: &str,
    ) -> crate::Result<(ParsedDocument, Vec<u8>)> {
        log::info!("Requesting text recognition ({})", recognition_language(language));
        let recognized = recognizer.recognize(bytes, language)?;
        let parsed = self.parse(&recognized)?;
        Ok((parsed, recognized))
    }

    /// Read and process a file. Read errors become a failed outcome.
    pub fn process_file(&self, path: &Path) -> DocumentOutcome {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        match std::fs::read(path) {
            Ok(bytes) => self.process(&name, &bytes),
            Err(e) => DocumentOutcome::new(&name, &[]).failed(DocumentStatus::Failed, e.to_string()),
        }
    }
}

/// Process documents in parallel. Output order matches input order.
pub fn process_batch(remediator: &Remediator<'_>, documents: &[(String, Vec<u8>)]) -> Vec<DocumentOutcome> {
    documents
        .par_iter()
        .map(|(name, bytes)| remediator.process(name, bytes))
        .collect()
}

/// Process files in parallel. Output order matches input order.
pub fn process_paths(remediator: &Remediator<'_>, paths: &[PathBuf]) -> Vec<DocumentOutcome> {
    paths
        .par_iter()
        .map(|path| remediator.process_file(path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_input_fails_only_that_document() {
        let remediator = Remediator::new(RemediationOptions::default());
        let outcome = remediator.process("broken.pdf", b"not a pdf at all");
        assert_eq!(outcome.status, DocumentStatus::Failed);
        assert!(outcome.message.is_some());
        assert!(outcome.audit.is_none());
        assert!(outcome.remediated_bytes().is_none());
    }

    #[test]
    fn test_missing_file_is_failed_outcome() {
        let remediator = Remediator::new(RemediationOptions::default());
        let outcome = remediator.process_file(Path::new("/nonexistent/input.pdf"));
        assert_eq!(outcome.status, DocumentStatus::Failed);
        assert_eq!(outcome.name, "input.pdf");
    }

    #[test]
    fn test_options_builder() {
        let options = RemediationOptions::new()
            .with_language("es")
            .with_text_layer(true)
            .with_max_iterations(2)
            .strict();
        assert_eq!(options.language.as_deref(), Some("es"));
        assert!(options.text_layer);
        assert_eq!(options.max_iterations, 2);
        assert!(options.strict_metadata);
    }
}
