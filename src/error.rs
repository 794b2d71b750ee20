//! Error types for pdf-remediate.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for pdf-remediate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while parsing, auditing or remediating a PDF.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input is not recognized as PDF.
    #[error("Unknown file format: not a valid PDF")]
    UnknownFormat,

    /// The PDF version is not supported.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// The bytes could not be parsed into a document. Fatal for that document.
    #[error("Malformed PDF input: {0}")]
    MalformedInput(String),

    /// The PDF document is encrypted.
    #[error("Document is encrypted")]
    Encrypted,

    /// A required PDF object is missing.
    #[error("Missing required object: {0}")]
    MissingObject(String),

    /// Page number is out of range.
    #[error("Page {0} is out of range (document has {1} pages)")]
    PageOutOfRange(u32, u32),

    /// An embedded remediation manifest was rejected.
    #[error("Manifest decode error: {0}")]
    ManifestDecode(String),

    /// A collaborating service (verification, recognition) failed.
    #[error("External service error ({kind}): {message}")]
    ExternalService {
        /// Failure classification
        kind: ServiceErrorKind,
        /// Human readable detail
        message: String,
    },

    /// A character could not be represented in the output font.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Serialization error (manifest, reports).
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for an external service failure.
    pub fn service(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Error::ExternalService {
            kind,
            message: message.into(),
        }
    }

    /// Whether a retry may succeed. Only external service failures can be transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::ExternalService { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }
}

/// Classification of external service failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// The request exceeded its deadline.
    Timeout,
    /// The service is not deployed or declared itself unavailable.
    Unavailable,
    /// The input exceeds the service upload limits.
    TooLarge,
    /// Any other non-2xx status.
    Status(u16),
    /// The response body or content type was not what the caller expects.
    UnexpectedContent,
    /// The service could not be reached at all.
    Unreachable,
}

impl ServiceErrorKind {
    /// Map an HTTP status code to a failure kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 | 501 | 503 => ServiceErrorKind::Unavailable,
            413 => ServiceErrorKind::TooLarge,
            504 => ServiceErrorKind::Timeout,
            other => ServiceErrorKind::Status(other),
        }
    }

    /// Transient failures are retried with backoff; everything else is reported immediately.
    pub fn is_transient(self) -> bool {
        match self {
            ServiceErrorKind::Timeout | ServiceErrorKind::Unreachable => true,
            ServiceErrorKind::Status(code) => code == 429 || code == 500 || code == 502,
            ServiceErrorKind::Unavailable
            | ServiceErrorKind::TooLarge
            | ServiceErrorKind::UnexpectedContent => false,
        }
    }
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceErrorKind::Timeout => write!(f, "timeout"),
            ServiceErrorKind::Unavailable => write!(f, "unavailable"),
            ServiceErrorKind::TooLarge => write!(f, "input too large"),
            ServiceErrorKind::Status(code) => write!(f, "status {}", code),
            ServiceErrorKind::UnexpectedContent => write!(f, "unexpected content"),
            ServiceErrorKind::Unreachable => write!(f, "unreachable"),
        }
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            lopdf::Error::Decryption(_) => Error::Encrypted,
            _ => Error::MalformedInput(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Encrypted;
        assert_eq!(err.to_string(), "Document is encrypted");

        let err = Error::PageOutOfRange(10, 5);
        assert_eq!(
            err.to_string(),
            "Page 10 is out of range (document has 5 pages)"
        );

        let err = Error::service(ServiceErrorKind::Status(502), "bad gateway");
        assert_eq!(
            err.to_string(),
            "External service error (status 502): bad gateway"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ServiceErrorKind::from_status(503), ServiceErrorKind::Unavailable);
        assert_eq!(ServiceErrorKind::from_status(404), ServiceErrorKind::Unavailable);
        assert_eq!(ServiceErrorKind::from_status(413), ServiceErrorKind::TooLarge);
        assert_eq!(ServiceErrorKind::from_status(504), ServiceErrorKind::Timeout);
        assert_eq!(ServiceErrorKind::from_status(500), ServiceErrorKind::Status(500));
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::service(ServiceErrorKind::Timeout, "t").is_transient());
        assert!(Error::service(ServiceErrorKind::Status(502), "g").is_transient());
        assert!(!Error::service(ServiceErrorKind::Unavailable, "u").is_transient());
        assert!(!Error::service(ServiceErrorKind::TooLarge, "l").is_transient());
        assert!(!Error::MalformedInput("x".into()).is_transient());
    }
}
