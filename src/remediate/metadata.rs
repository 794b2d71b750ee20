//! Document metadata: Info dictionary, catalog entries and the XMP packet.

use chrono::{DateTime, SecondsFormat, Utc};
use lopdf::{dictionary, Document as LopdfDocument, Object, ObjectId, Stream, StringFormat};
use quick_xml::escape::escape;

use crate::error::{Error, Result};
use crate::model::ParsedDocument;
use crate::parser::format_pdf_date;

use super::manifest::keyword_entries;

pub const PRODUCER: &str = "PDF Remediator";
pub const DEFAULT_TITLE: &str = "Accessible remediated PDF";
pub const DEFAULT_AUTHOR: &str = "PDF Remediator";
pub const DEFAULT_SUBJECT: &str = "Accessibility remediated document";

/// Keywords every remediated file carries.
const REMEDIATION_KEYWORDS: [&str; 3] = ["accessible", "wcag", "remediated"];

/// Resolved metadata for a remediated document. Fields are never blank.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: String,
    pub language: String,
    pub pdf_ua_part: Option<String>,
    /// Ask viewers to show the title instead of the file name
    pub display_doc_title: bool,
}

impl DocumentMetadata {
    /// Take values from the parsed document, falling back to fixed defaults.
    pub fn resolve(parsed: &ParsedDocument, language: &str, manifest_entry: &str) -> Self {
        let title = parsed
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or_else(|| parsed.meta("Title"))
            .unwrap_or(DEFAULT_TITLE);
        Self {
            title: title.to_string(),
            author: parsed.meta("Author").unwrap_or(DEFAULT_AUTHOR).to_string(),
            subject: parsed.meta("Subject").unwrap_or(DEFAULT_SUBJECT).to_string(),
            keywords: merge_keywords(parsed.meta("Keywords"), manifest_entry),
            language: language.to_string(),
            pdf_ua_part: None,
            display_doc_title: false,
        }
    }
}

/// Merge existing keywords with the remediation keywords and manifest.
///
/// Stale manifest entries are dropped and duplicates removed; the fresh
/// manifest always comes last.
pub fn merge_keywords(existing: Option<&str>, manifest_entry: &str) -> String {
    let mut entries: Vec<String> = Vec::new();
    let candidates = existing
        .map(keyword_entries)
        .unwrap_or_default()
        .into_iter()
        .chain(REMEDIATION_KEYWORDS.iter().map(|k| k.to_string()));
    for entry in candidates {
        if !entries.contains(&entry) {
            entries.push(entry);
        }
    }
    if !manifest_entry.is_empty() {
        entries.push(manifest_entry.to_string());
    }
    entries.join(" ")
}

/// A PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
pub fn text_string(value: &str) -> Object {
    if value.is_ascii() {
        Object::String(value.as_bytes().to_vec(), StringFormat::Literal)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in value.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

/// XMP packet mirroring the Info dictionary.
pub fn xmp_packet(meta: &DocumentMetadata, now: DateTime<Utc>) -> String {
    let pdfua = meta
        .pdf_ua_part
        .as_deref()
        .map(|part| format!("   <pdfuaid:part>{}</pdfuaid:part>\n", escape(part)))
        .unwrap_or_default();
    format!(
        concat!(
            "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n",
            "<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n",
            " <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n",
            "  <rdf:Description rdf:about=\"\"\n",
            "    xmlns:dc=\"http://purl.org/dc/elements/1.1/\"\n",
            "    xmlns:pdf=\"http://ns.adobe.com/pdf/1.3/\"\n",
            "    xmlns:xmp=\"http://ns.adobe.com/xap/1.0/\"\n",
            "    xmlns:pdfuaid=\"http://www.aiim.org/pdfua/ns/id/\">\n",
            "   <dc:title><rdf:Alt><rdf:li xml:lang=\"x-default\">{title}</rdf:li></rdf:Alt></dc:title>\n",
            "   <dc:creator><rdf:Seq><rdf:li>{author}</rdf:li></rdf:Seq></dc:creator>\n",
            "   <dc:description><rdf:Alt><rdf:li xml:lang=\"x-default\">{subject}</rdf:li></rdf:Alt></dc:description>\n",
            "   <dc:language><rdf:Bag><rdf:li>{language}</rdf:li></rdf:Bag></dc:language>\n",
            "   <pdf:Producer>{producer}</pdf:Producer>\n",
            "   <xmp:CreatorTool>{producer}</xmp:CreatorTool>\n",
            "   <xmp:ModifyDate>{date}</xmp:ModifyDate>\n",
            "{pdfua}",
            "  </rdf:Description>\n",
            " </rdf:RDF>\n",
            "</x:xmpmeta>\n",
            "<?xpacket end=\"w\"?>"
        ),
        title = escape(&meta.title),
        author = escape(&meta.author),
        subject = escape(&meta.subject),
        language = escape(&meta.language),
        producer = PRODUCER,
        date = now.to_rfc3339_opts(SecondsFormat::Secs, true),
        pdfua = pdfua,
    )
}

/// Info dictionary id, moving an inline or missing dictionary into an object.
fn info_id(doc: &mut LopdfDocument) -> ObjectId {
    let existing = doc.trailer.get(b"Info").ok().cloned();
    match existing {
        Some(Object::Reference(id)) if doc.get_dictionary(id).is_ok() => id,
        Some(Object::Dictionary(inline)) => {
            let id = doc.add_object(inline);
            doc.trailer.set("Info", id);
            id
        }
        _ => {
            let id = doc.add_object(dictionary! {});
            doc.trailer.set("Info", id);
            id
        }
    }
}

/// Catalog `/Metadata` stream that can be rewritten in place.
fn existing_metadata_id(doc: &LopdfDocument, root: ObjectId) -> Option<ObjectId> {
    let id = doc
        .get_dictionary(root)
        .ok()?
        .get(b"Metadata")
        .ok()?
        .as_reference()
        .ok()?;
    matches!(doc.get_object(id), Ok(Object::Stream(_))).then_some(id)
}

/// Write metadata into the Info dictionary, the catalog and XMP.
///
/// An existing XMP stream is replaced under its own object id, so repeated
/// passes do not accumulate orphaned packets.
pub fn write_metadata(doc: &mut LopdfDocument, meta: &DocumentMetadata, now: DateTime<Utc>) -> Result<()> {
    let info = info_id(doc);
    {
        let dict = doc.get_object_mut(info)?.as_dict_mut()?;
        dict.set("Title", text_string(&meta.title));
        dict.set("Author", text_string(&meta.author));
        dict.set("Subject", text_string(&meta.subject));
        dict.set("Keywords", text_string(&meta.keywords));
        dict.set("Creator", text_string(PRODUCER));
        dict.set("Producer", text_string(PRODUCER));
        dict.set("ModDate", text_string(&format_pdf_date(now)));
    }

    let mut xmp = Stream::new(
        dictionary! { "Type" => "Metadata", "Subtype" => "XML" },
        xmp_packet(meta, now).into_bytes(),
    );
    xmp.allows_compression = false;

    let root = doc
        .trailer
        .get(b"Root")
        .and_then(|r| r.as_reference())
        .map_err(|_| Error::MissingObject("Root".to_string()))?;
    let xmp_id = match existing_metadata_id(doc, root) {
        Some(id) => {
            doc.objects.insert(id, Object::Stream(xmp));
            id
        }
        None => doc.add_object(xmp),
    };

    let catalog = doc.get_object_mut(root)?.as_dict_mut()?;
    catalog.set("Lang", text_string(&meta.language));
    catalog.set("Metadata", xmp_id);
    if meta.display_doc_title {
        catalog.set("ViewerPreferences", dictionary! { "DisplayDocTitle" => true });
    }
    Ok(())
}
