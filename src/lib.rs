//! # pdf-remediate
//!
//! PDF accessibility auditing and automated remediation.
//!
//! The library parses a PDF into a [`ParsedDocument`], audits it against a
//! fixed set of accessibility rules, and rewrites it with a structure tree
//! bound to real marked content, normalized metadata and an embedded
//! remediation manifest.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_remediate::{audit_file, remediate_file, RemediationOptions};
//!
//! fn main() -> pdf_remediate::Result<()> {
//!     let audit = audit_file("document.pdf")?;
//!     println!("Score before: {}", audit.score);
//!
//!     let outcome = remediate_file("document.pdf", RemediationOptions::default());
//!     if let Some(bytes) = outcome.remediated_bytes() {
//!         std::fs::write("document.accessible.pdf", bytes)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Audit**: rule registry with WCAG references, capped 0-100 score
//! - **Structure**: headings, lists, tables, paragraphs and figures inferred
//!   from layout, injected as a content-bound structure tree
//! - **Idempotent**: an embedded manifest lets repeated passes converge
//! - **Collaborators**: pluggable verification and text recognition services
//! - **Batch**: documents processed in parallel with Rayon

pub mod audit;
pub mod classify;
pub mod detect;
pub mod error;
pub mod heuristics;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod remediate;
pub mod report;
pub mod service;

// Re-export commonly used types
pub use audit::{evaluate, AuditFinding, AuditResult, Category, Severity};
pub use classify::{classify_source, SourceAssessment, SourceType};
pub use detect::{is_pdf_bytes, sniff_bytes, sniff_path, PdfHeader};
pub use error::{Error, Result, ServiceErrorKind};
pub use model::{
    FormField, ImageItem, Link, OutlineEntry, PageSize, ParsedDocument, RemediationMode,
    StructureBindingSummary, Tag, TextItem,
};
pub use parser::{ErrorMode, ParseOptions, PdfParser};
pub use pipeline::{
    process_batch, process_paths, DocumentOutcome, DocumentStatus, RemediationOptions, Remediator,
};
pub use remediate::{build, BuildOptions, BuildOutput, RemediationManifest, StopReason};
pub use report::{build_evidence_pack, displayed_score, EvidencePack};
pub use service::{
    CircuitBreaker, GuardedService, Recognizer, ServicePolicy, Verdict, VerificationResult, Verifier,
};

use std::io::Read;
use std::path::Path;

/// Parse a PDF file.
///
/// # Example
///
/// ```no_run
/// use pdf_remediate::parse_file;
///
/// let doc = parse_file("document.pdf").unwrap();
/// println!("Pages: {}", doc.page_count);
/// ```
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<ParsedDocument> {
    PdfParser::open(path)?.parse()
}

/// Parse a PDF file with custom options.
pub fn parse_file_with_options<P: AsRef<Path>>(path: P, options: ParseOptions) -> Result<ParsedDocument> {
    PdfParser::open_with_options(path, options)?.parse()
}

/// Parse a PDF from bytes.
pub fn parse_bytes(data: &[u8]) -> Result<ParsedDocument> {
    PdfParser::from_bytes(data)?.parse()
}

/// Parse a PDF from a reader.
pub fn parse_reader<R: Read>(reader: R) -> Result<ParsedDocument> {
    PdfParser::from_reader(reader)?.parse()
}

/// Parse and audit a PDF file.
///
/// # Example
///
/// ```no_run
/// use pdf_remediate::audit_file;
///
/// let result = audit_file("document.pdf").unwrap();
/// for finding in &result.findings {
///     println!("{} {}", finding.rule_id, finding.description);
/// }
/// ```
pub fn audit_file<P: AsRef<Path>>(path: P) -> Result<AuditResult> {
    Ok(audit::evaluate(&parse_file(path)?))
}

/// Parse and audit PDF bytes.
pub fn audit_bytes(data: &[u8]) -> Result<AuditResult> {
    Ok(audit::evaluate(&parse_bytes(data)?))
}

/// Run the full pipeline on a file, without external services.
///
/// Failures are reported in the outcome, never as a panic.
pub fn remediate_file<P: AsRef<Path>>(path: P, options: RemediationOptions) -> DocumentOutcome {
    Remediator::new(options).process_file(path.as_ref())
}

/// Run the full pipeline on in-memory bytes, without external services.
pub fn remediate_bytes(name: &str, data: &[u8], options: RemediationOptions) -> DocumentOutcome {
    Remediator::new(options).process(name, data)
}
