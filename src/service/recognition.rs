//! Text recognition (OCR) collaborator.

use crate::error::{Error, Result, ServiceErrorKind};

/// A service that adds a recognized-text layer to a scanned document.
pub trait Recognizer: Send + Sync {
    /// Return the recognized document bytes. `language` is a BCP-47 tag.
    fn recognize(&self, pdf: &[u8], language: &str) -> Result<Vec<u8>>;
}

/// Three-letter recognition language for a BCP-47 tag.
pub fn recognition_language(language: &str) -> &'static str {
    let lower = language.trim().to_lowercase();
    let primary = lower.split(['-', '_']).next().unwrap_or("");
    match primary {
        "es" => "spa",
        "fr" => "fra",
        "de" => "deu",
        "it" => "ita",
        "pt" => "por",
        _ => "eng",
    }
}

/// Check an HTTP response from a recognition service.
///
/// Anything other than a non-empty `application/pdf` 2xx body is a failure.
pub fn accept_response(status: u16, content_type: Option<&str>, body: Vec<u8>) -> Result<Vec<u8>> {
    if !(200..300).contains(&status) {
        let kind = ServiceErrorKind::from_status(status);
        let message = match kind {
            ServiceErrorKind::Unavailable => "recognition service unavailable".to_string(),
            ServiceErrorKind::TooLarge => "input exceeds upload limits".to_string(),
            ServiceErrorKind::Timeout => "recognition timed out".to_string(),
            _ => format!("recognition service returned {}", status),
        };
        return Err(Error::service(kind, message));
    }
    let is_pdf = content_type
        .map(|ct| ct.to_lowercase().contains("application/pdf"))
        .unwrap_or(false);
    if !is_pdf {
        return Err(Error::service(
            ServiceErrorKind::UnexpectedContent,
            format!("expected application/pdf, got {}", content_type.unwrap_or("nothing")),
        ));
    }
    if body.is_empty() {
        return Err(Error::service(
            ServiceErrorKind::UnexpectedContent,
            "recognition returned an empty document",
        ));
    }
    Ok(body)
}
