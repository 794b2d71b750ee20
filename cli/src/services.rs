//! HTTP clients for the verification and recognition services.

use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::header::CONTENT_TYPE;
use tokio::runtime::Runtime;

use pdf_remediate::error::ServiceErrorKind;
use pdf_remediate::service::{accept_response, normalize_report, recognition_language};
use pdf_remediate::{Error, Recognizer, Result, VerificationResult, Verifier};

/// Default validation profile.
pub const DEFAULT_PROFILE: &str = "ua1";

/// Resolve the validation endpoint for a service base URL.
///
/// `https://host` and `https://host/api/validate` both gain the profile;
/// a URL that already names a profile is used as is.
pub fn validation_url(service_url: &str, profile: &str) -> String {
    let base = service_url.trim().trim_end_matches('/');
    let profile = urlencoding_profile(profile);
    let lower = base.to_lowercase();
    if let Some(idx) = lower.rfind("/api/validate/") {
        if !base[idx + "/api/validate/".len()..].contains('/') {
            return base.to_string();
        }
    }
    if lower.ends_with("/api/validate") {
        return format!("{}/{}", base, profile);
    }
    format!("{}/api/validate/{}", base, profile)
}

fn urlencoding_profile(profile: &str) -> String {
    profile
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect()
}

fn transport_error(err: reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        ServiceErrorKind::Timeout
    } else {
        ServiceErrorKind::Unreachable
    };
    Error::service(kind, err.to_string())
}

fn pdf_part(pdf: &[u8]) -> Result<Part> {
    Part::bytes(pdf.to_vec())
        .file_name("document.pdf")
        .mime_str("application/pdf")
        .map_err(|e| Error::Other(e.to_string()))
}

/// Shared HTTP plumbing: a client with a deadline and a runtime to drive it.
#[derive(Clone)]
struct HttpService {
    runtime: Arc<Runtime>,
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpService {
    fn new(runtime: Arc<Runtime>, url: String, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self {
            runtime,
            client,
            url,
            token,
        })
    }

    /// POST a multipart form and return status, content type and body.
    fn post(&self, form: Form, accept: &str) -> Result<(u16, Option<String>, Vec<u8>)> {
        self.runtime.block_on(async {
            let mut request = self
                .client
                .post(&self.url)
                .header("Accept", accept)
                .multipart(form);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            let response = request.send().await.map_err(transport_error)?;
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await.map_err(transport_error)?;
            Ok((status, content_type, body.to_vec()))
        })
    }
}

/// Standards verification over HTTP.
#[derive(Clone)]
pub struct HttpVerifier {
    http: HttpService,
}

impl HttpVerifier {
    pub fn new(
        runtime: Arc<Runtime>,
        service_url: &str,
        profile: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let url = validation_url(service_url, profile);
        log::debug!("Verification endpoint: {}", url);
        Ok(Self {
            http: HttpService::new(runtime, url, token, timeout)?,
        })
    }
}

impl Verifier for HttpVerifier {
    fn verify(&self, pdf: &[u8]) -> Result<VerificationResult> {
        let form = Form::new().part("file", pdf_part(pdf)?);
        let (status, content_type, body) = self.http.post(form, "application/json")?;
        if !(200..300).contains(&status) {
            return Err(Error::service(
                ServiceErrorKind::from_status(status),
                format!("verification service returned {}", status),
            ));
        }
        Ok(normalize_report(&String::from_utf8_lossy(&body), content_type.as_deref()))
    }
}

/// Text recognition over HTTP.
#[derive(Clone)]
pub struct HttpRecognizer {
    http: HttpService,
}

impl HttpRecognizer {
    pub fn new(runtime: Arc<Runtime>, service_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpService::new(runtime, service_url.trim().to_string(), token, timeout)?,
        })
    }
}

impl Recognizer for HttpRecognizer {
    fn recognize(&self, pdf: &[u8], language: &str) -> Result<Vec<u8>> {
        let form = Form::new()
            .part("file", pdf_part(pdf)?)
            .text("language", recognition_language(language));
        let (status, content_type, body) = self.http.post(form, "application/pdf")?;
        accept_response(status, content_type.as_deref(), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_url() {
        assert_eq!(
            validation_url("https://verapdf.example.com", "ua1"),
            "https://verapdf.example.com/api/validate/ua1"
        );
        assert_eq!(
            validation_url("https://verapdf.example.com/api/validate/", "ua2"),
            "https://verapdf.example.com/api/validate/ua2"
        );
        assert_eq!(
            validation_url("https://verapdf.example.com/api/validate/ua1", "ua2"),
            "https://verapdf.example.com/api/validate/ua1"
        );
        assert_eq!(
            validation_url("http://localhost:8080/base/", "ua1"),
            "http://localhost:8080/base/api/validate/ua1"
        );
    }
}
