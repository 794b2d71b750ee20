//! Standard font substitution and WinAnsi encoding.
//!
//! Written text never embeds a font program: every run is drawn with one of
//! the fourteen standard Type 1 faces, picked from the source font name.

use lopdf::{dictionary, Dictionary};
use unicode_normalization::UnicodeNormalization;

use crate::error::{Error, Result};

/// A standard Type 1 face used for written text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
}

#[derive(Clone, Copy)]
enum Family {
    Sans,
    Serif,
    Mono,
}

impl StandardFont {
    /// `/BaseFont` name.
    pub fn base_font(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::HelveticaBoldOblique => "Helvetica-BoldOblique",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::TimesBold => "Times-Bold",
            StandardFont::TimesItalic => "Times-Italic",
            StandardFont::TimesBoldItalic => "Times-BoldItalic",
            StandardFont::Courier => "Courier",
            StandardFont::CourierBold => "Courier-Bold",
            StandardFont::CourierOblique => "Courier-Oblique",
            StandardFont::CourierBoldOblique => "Courier-BoldOblique",
        }
    }

    /// Name under which the face is registered in page resources.
    ///
    /// The `RF` prefix keeps clear of names a source document already uses.
    pub fn resource_name(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "RF1",
            StandardFont::HelveticaBold => "RF2",
            StandardFont::HelveticaOblique => "RF3",
            StandardFont::HelveticaBoldOblique => "RF4",
            StandardFont::TimesRoman => "RF5",
            StandardFont::TimesBold => "RF6",
            StandardFont::TimesItalic => "RF7",
            StandardFont::TimesBoldItalic => "RF8",
            StandardFont::Courier => "RF9",
            StandardFont::CourierBold => "RF10",
            StandardFont::CourierOblique => "RF11",
            StandardFont::CourierBoldOblique => "RF12",
        }
    }

    /// Font dictionary for this face.
    pub fn dictionary(self) -> Dictionary {
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => self.base_font(),
            "Encoding" => "WinAnsiEncoding",
        }
    }

    fn from_family(family: Family, bold: bool, italic: bool) -> Self {
        match (family, bold, italic) {
            (Family::Sans, false, false) => StandardFont::Helvetica,
            (Family::Sans, true, false) => StandardFont::HelveticaBold,
            (Family::Sans, false, true) => StandardFont::HelveticaOblique,
            (Family::Sans, true, true) => StandardFont::HelveticaBoldOblique,
            (Family::Serif, false, false) => StandardFont::TimesRoman,
            (Family::Serif, true, false) => StandardFont::TimesBold,
            (Family::Serif, false, true) => StandardFont::TimesItalic,
            (Family::Serif, true, true) => StandardFont::TimesBoldItalic,
            (Family::Mono, false, false) => StandardFont::Courier,
            (Family::Mono, true, false) => StandardFont::CourierBold,
            (Family::Mono, false, true) => StandardFont::CourierOblique,
            (Family::Mono, true, true) => StandardFont::CourierBoldOblique,
        }
    }
}

/// Pick a standard face for a source font name.
///
/// `courier`/`mono` map to Courier, `sans` to Helvetica (checked before
/// `serif`, since "sans-serif" contains both), `times`/`serif` to Times, and
/// anything else to Helvetica.
pub fn map_font(font_name: &str, bold: bool, italic: bool) -> StandardFont {
    let name = font_name.to_lowercase();
    let family = if name.contains("courier") || name.contains("mono") {
        Family::Mono
    } else if name.contains("sans") {
        Family::Sans
    } else if name.contains("times") || name.contains("serif") {
        Family::Serif
    } else {
        Family::Sans
    };
    StandardFont::from_family(family, bold, italic)
}

/// Encode one character to its WinAnsi byte.
pub fn encode_char(c: char) -> Result<u8> {
    let code = c as u32;
    let byte = match code {
        0x09 | 0x0A | 0x0D => code as u8,
        0x20..=0x7E => code as u8,
        0xA0..=0xFF => code as u8,
        _ => match c {
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8A,
            '‹' => 0x8B,
            'Œ' => 0x8C,
            'Ž' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9A,
            '›' => 0x9B,
            'œ' => 0x9C,
            'ž' => 0x9E,
            'Ÿ' => 0x9F,
            _ => {
                return Err(Error::Encoding(format!(
                    "U+{:04X} has no WinAnsi code",
                    code
                )))
            }
        },
    };
    Ok(byte)
}

/// NFC-normalize and encode text for a WinAnsi font.
///
/// Characters without a code are replaced with `*`. Returns the bytes and the
/// number of substitutions made.
pub fn encode_win_ansi(text: &str) -> (Vec<u8>, usize) {
    let mut bytes = Vec::with_capacity(text.len());
    let mut substituted = 0;
    for c in text.nfc() {
        match encode_char(c) {
            Ok(byte) => bytes.push(byte),
            Err(e) => {
                log::warn!("Substituting unencodable character: {}", e);
                bytes.push(b'*');
                substituted += 1;
            }
        }
    }
    (bytes, substituted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_family_mapping() {
        assert_eq!(map_font("CourierNewPSMT", false, false), StandardFont::Courier);
        assert_eq!(map_font("DejaVuSansMono", true, false), StandardFont::CourierBold);
        assert_eq!(map_font("Times New Roman", false, true), StandardFont::TimesItalic);
        assert_eq!(map_font("NotoSerif-Bold", true, false), StandardFont::TimesBold);
        assert_eq!(map_font("OpenSans", false, false), StandardFont::Helvetica);
        assert_eq!(map_font("Arial", true, true), StandardFont::HelveticaBoldOblique);
        assert_eq!(map_font("", false, false), StandardFont::Helvetica);
    }

    #[test]
    fn test_sans_serif_is_sans() {
        assert_eq!(map_font("Microsoft Sans Serif", false, false), StandardFont::Helvetica);
    }

    #[test]
    fn test_resource_names_are_distinct() {
        let faces = [
            StandardFont::Helvetica,
            StandardFont::HelveticaBold,
            StandardFont::TimesRoman,
            StandardFont::CourierBoldOblique,
        ];
        let mut names: Vec<&str> = faces.iter().map(|f| f.resource_name()).collect();
        names.dedup();
        assert_eq!(names.len(), faces.len());
    }

    #[test]
    fn test_encode_win_ansi() {
        let (bytes, substituted) = encode_win_ansi("Café • “quoted” – 5€");
        assert_eq!(substituted, 0);
        assert_eq!(bytes[3], 0xE9);
        assert!(bytes.contains(&0x95));
        assert!(bytes.contains(&0x93));
        assert!(bytes.contains(&0x80));
    }

    #[test]
    fn test_encode_substitutes_unmapped() {
        let (bytes, substituted) = encode_win_ansi("a\tb\n漢");
        assert_eq!(bytes, b"a\tb\n*".to_vec());
        assert_eq!(substituted, 1);
    }

    #[test]
    fn test_nfc_composes_before_encoding() {
        // "e" followed by a combining acute accent
        let (bytes, substituted) = encode_win_ansi("e\u{301}");
        assert_eq!(substituted, 0);
        assert_eq!(bytes, vec![0xE9]);
    }

    #[test]
    fn test_encode_char_error() {
        assert!(matches!(encode_char('漢'), Err(Error::Encoding(_))));
        assert_eq!(encode_char('A').unwrap(), b'A');
    }
}
