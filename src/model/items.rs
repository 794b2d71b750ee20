//! Content items extracted from a page.

use serde::{Deserialize, Serialize};

/// A positioned run of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextItem {
    /// The text content
    pub text: String,
    /// X position (left edge)
    pub x: f32,
    /// Y position (baseline, PDF user space, origin bottom-left)
    pub y: f32,
    /// Approximate advance width
    pub width: f32,
    /// Approximate height
    pub height: f32,
    /// Font name (e.g., "Helvetica-Bold")
    pub font_name: String,
    /// Font size in points
    pub font_size: f32,
    /// Whether the font looks bold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    /// Whether the font looks italic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    /// Fill colour as `#rrggbb`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Page number (1-indexed)
    pub page: u32,
}

impl TextItem {
    /// Create a text item in Helvetica.
    pub fn new(text: impl Into<String>, x: f32, y: f32, font_size: f32, page: u32) -> Self {
        let text = text.into();
        let width = estimate_width(&text, font_size);
        Self {
            text,
            x,
            y,
            width,
            height: font_size,
            font_name: "Helvetica".to_string(),
            font_size,
            bold: Some(false),
            italic: Some(false),
            color: None,
            page,
        }
    }

    /// Set the font name and derive bold/italic from it.
    pub fn with_font(mut self, font_name: impl Into<String>) -> Self {
        self.font_name = font_name.into();
        self.bold = Some(font_looks_bold(&self.font_name));
        self.italic = Some(font_looks_italic(&self.font_name));
        self
    }

    /// Set the fill colour.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Whether the run renders bold.
    pub fn is_bold(&self) -> bool {
        self.bold.unwrap_or(false)
    }
}

/// Rough advance width when glyph metrics are unavailable.
pub(crate) fn estimate_width(text: &str, font_size: f32) -> f32 {
    (text.chars().count() as f32 * font_size * 0.5).max(1.0)
}

/// Font names containing a weight keyword render bold.
pub(crate) fn font_looks_bold(font_name: &str) -> bool {
    let lower = font_name.to_lowercase();
    ["bold", "black", "demi", "semi"]
        .iter()
        .any(|k| lower.contains(k))
}

pub(crate) fn font_looks_italic(font_name: &str) -> bool {
    let lower = font_name.to_lowercase();
    lower.contains("italic") || lower.contains("oblique")
}

/// An image painted on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageItem {
    /// Stable id, `img-{page}-{n}`
    pub id: String,
    /// Page number (1-indexed)
    pub page: u32,
    /// Left edge
    pub x: f32,
    /// Bottom edge
    pub y: f32,
    /// Width in points
    pub width: f32,
    /// Height in points
    pub height: f32,
    /// Alternate text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    /// Marked as decorative
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decorative: Option<bool>,
}

impl ImageItem {
    /// Create an image without alt text.
    pub fn new(id: impl Into<String>, page: u32, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            id: id.into(),
            page,
            x,
            y,
            width,
            height,
            alt: None,
            decorative: None,
        }
    }

    /// Set alt text.
    pub fn with_alt(mut self, alt: impl Into<String>) -> Self {
        self.alt = Some(alt.into());
        self
    }

    /// Alt text when present and non-blank.
    pub fn alt_text(&self) -> Option<&str> {
        self.alt.as_deref().map(str::trim).filter(|a| !a.is_empty())
    }

    /// Whether the image is flagged decorative.
    pub fn is_decorative(&self) -> bool {
        self.decorative.unwrap_or(false)
    }
}

/// A link annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Visible or declared link text
    pub text: String,
    /// Target URI, or `#page-N` for internal destinations
    pub url: String,
    /// Page number (1-indexed)
    pub page: u32,
}

impl Link {
    /// Create a link.
    pub fn new(text: impl Into<String>, url: impl Into<String>, page: u32) -> Self {
        Self {
            text: text.into(),
            url: url.into(),
            page,
        }
    }
}

/// A flattened outline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    /// Bookmark title
    pub title: String,
    /// Destination page (1-indexed)
    pub page: u32,
}

impl OutlineEntry {
    /// Create an outline entry.
    pub fn new(title: impl Into<String>, page: u32) -> Self {
        Self {
            title: title.into(),
            page,
        }
    }
}

/// An interactive form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    /// Fully qualified field name
    pub name: String,
    /// Accessible label (`/TU`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Whether the field is required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

impl FormField {
    /// Create an unlabeled, optional field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            required: None,
        }
    }

    /// Label when present and non-blank.
    pub fn label_text(&self) -> Option<&str> {
        self.label.as_deref().map(str::trim).filter(|l| !l.is_empty())
    }

    /// Whether the field is required.
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }
}

/// A structure tag declared by the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Role name (H1, P, Table, ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Page the element belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Actual text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Alternate description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    /// Table header scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Tag {
    /// Create a tag with a role and optional page.
    pub fn new(kind: impl Into<String>, page: Option<u32>) -> Self {
        Self {
            kind: kind.into(),
            page,
            text: None,
            alt: None,
            scope: None,
        }
    }

    /// Heading level for H1..H6 roles.
    pub fn heading_level(&self) -> Option<u8> {
        heading_level(&self.kind)
    }
}

/// Level of an `H1`..`H6` role name.
pub(crate) fn heading_level(role: &str) -> Option<u8> {
    let digits = role.strip_prefix('H')?;
    match digits.parse::<u8>() {
        Ok(level @ 1..=6) if digits.len() == 1 => Some(level),
        _ => None,
    }
}
