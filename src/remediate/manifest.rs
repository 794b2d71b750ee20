//! Remediation manifest codec.
//!
//! A remediated file carries a compact JSON record of what the remediation
//! pass set, URL-encoded behind [`MANIFEST_PREFIX`] inside the `Keywords`
//! metadata field. Re-parsing a remediated file reads the record back so the
//! second pass sees the same structural facts the first pass wrote.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{FormField, ImageItem, Link, OutlineEntry, RemediationMode, Tag};

/// Marker that precedes the encoded manifest.
pub const MANIFEST_PREFIX: &str = "AccessiblePDFManifest=";

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 3;

/// Persisted record of one remediation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_struct_tree: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_ua_part: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_mode: Option<RemediationMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outlines: Vec<OutlineEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forms: Vec<FormField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}

#[derive(Clone, Copy)]
enum FieldKind {
    Number,
    Bool,
    Str,
    Mode,
    Array,
}

const FIELDS: &[(&str, FieldKind)] = &[
    ("version", FieldKind::Number),
    ("hasStructTree", FieldKind::Bool),
    ("language", FieldKind::Str),
    ("pdfUaPart", FieldKind::Str),
    ("remediationMode", FieldKind::Mode),
    ("tags", FieldKind::Array),
    ("outlines", FieldKind::Array),
    ("forms", FieldKind::Array),
    ("images", FieldKind::Array),
    ("links", FieldKind::Array),
];

/// Encode a manifest into its marker-prefixed string form.
pub fn encode(manifest: &RemediationManifest) -> Result<String> {
    let json = serde_json::to_string(manifest)?;
    Ok(format!("{}{}", MANIFEST_PREFIX, urlencoding::encode(&json)))
}

/// Decode a manifest from a metadata field value.
///
/// Returns `None` when the value holds no marker or the payload is rejected.
/// Rejections are logged and never surface as errors.
pub fn decode(value: &str) -> Option<RemediationManifest> {
    match try_decode(value) {
        Ok(manifest) => manifest,
        Err(e) => {
            log::warn!("Ignoring embedded manifest: {}", e);
            None
        }
    }
}

/// Strict decoding. `Ok(None)` means no marker was present.
pub fn try_decode(value: &str) -> Result<Option<RemediationManifest>> {
    let Some(start) = value.find(MANIFEST_PREFIX) else {
        return Ok(None);
    };
    let rest = &value[start + MANIFEST_PREFIX.len()..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .unwrap_or(rest.len());
    let encoded = &rest[..end];
    if encoded.is_empty() {
        return Err(Error::ManifestDecode("empty payload".to_string()));
    }

    let decoded = urlencoding::decode(encoded)
        .map_err(|e| Error::ManifestDecode(format!("bad percent-encoding: {}", e)))?;
    let parsed: Value = serde_json::from_str(&decoded)
        .map_err(|e| Error::ManifestDecode(format!("invalid JSON: {}", e)))?;
    let object = parsed
        .as_object()
        .ok_or_else(|| Error::ManifestDecode("payload is not an object".to_string()))?;

    let mut recognized = 0;
    for (name, kind) in FIELDS {
        let Some(field) = object.get(*name) else {
            continue;
        };
        recognized += 1;
        let valid = match kind {
            FieldKind::Number => field.is_u64(),
            FieldKind::Bool => field.is_boolean(),
            FieldKind::Str => field.is_string(),
            FieldKind::Mode => field
                .as_str()
                .and_then(RemediationMode::from_literal)
                .is_some(),
            FieldKind::Array => field.is_array(),
        };
        if !valid {
            return Err(Error::ManifestDecode(format!("field `{}` has wrong type", name)));
        }
    }
    if recognized == 0 {
        return Err(Error::ManifestDecode("no recognized fields".to_string()));
    }

    let manifest = serde_json::from_value(parsed)
        .map_err(|e| Error::ManifestDecode(format!("malformed entries: {}", e)))?;
    Ok(Some(manifest))
}

/// Split a keyword field into entries, dropping stale manifest markers.
pub fn keyword_entries(keywords: &str) -> Vec<String> {
    keywords
        .split(|c: char| c == ';' || c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|k| !k.is_empty() && !k.starts_with(MANIFEST_PREFIX))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_language_and_mode() {
        let manifest = RemediationManifest {
            language: Some("en-US".into()),
            remediation_mode: Some(RemediationMode::ContentBound),
            ..Default::default()
        };
        let encoded = encode(&manifest).unwrap();
        assert!(encoded.starts_with(MANIFEST_PREFIX));
        assert!(!encoded.contains(' '));

        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.language.as_deref(), Some("en-US"));
        assert_eq!(decoded.remediation_mode, Some(RemediationMode::ContentBound));
    }

    #[test]
    fn test_decode_without_marker() {
        assert!(decode("annual report, finance").is_none());
        assert!(matches!(try_decode("plain keywords"), Ok(None)));
    }

    #[test]
    fn test_decode_stops_at_separator() {
        let manifest = RemediationManifest {
            language: Some("fr-FR".into()),
            ..Default::default()
        };
        let value = format!("accessible; {}; wcag remediated", encode(&manifest).unwrap());
        assert_eq!(decode(&value).unwrap().language.as_deref(), Some("fr-FR"));
    }

    #[test]
    fn test_rejects_bad_mode() {
        let payload = urlencoding::encode(r#"{"remediationMode":"fully-bound"}"#).into_owned();
        let value = format!("{}{}", MANIFEST_PREFIX, payload);
        assert!(decode(&value).is_none());
        assert!(matches!(try_decode(&value), Err(Error::ManifestDecode(_))));
    }

    #[test]
    fn test_rejects_wrong_types() {
        let payload = urlencoding::encode(r#"{"language":42}"#).into_owned();
        assert!(decode(&format!("{}{}", MANIFEST_PREFIX, payload)).is_none());

        let payload = urlencoding::encode(r#"{"tags":"H1"}"#).into_owned();
        assert!(decode(&format!("{}{}", MANIFEST_PREFIX, payload)).is_none());
    }

    #[test]
    fn test_rejects_unrecognized_payload() {
        let payload = urlencoding::encode(r#"{"foo":"bar"}"#).into_owned();
        assert!(decode(&format!("{}{}", MANIFEST_PREFIX, payload)).is_none());
        assert!(decode(&format!("{}%7Bnot-json", MANIFEST_PREFIX)).is_none());
        assert!(decode(MANIFEST_PREFIX).is_none());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let payload =
            urlencoding::encode(r#"{"language":"de-DE","futureField":{"x":1}}"#).into_owned();
        let decoded = decode(&format!("{}{}", MANIFEST_PREFIX, payload)).unwrap();
        assert_eq!(decoded.language.as_deref(), Some("de-DE"));
        assert!(decoded.tags.is_empty());
    }

    #[test]
    fn test_keyword_entries_strip_markers() {
        let entries = keyword_entries("finance, AccessiblePDFManifest=%7B%7D; report");
        assert_eq!(entries, vec!["finance", "report"]);
    }
}
