//! PDF document parser using lopdf.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::detect::{sniff_bytes, sniff_path};
use crate::error::Result;
use crate::model::{
    FormField, ImageItem, Link, OutlineEntry, PageSize, ParsedDocument, TextItem,
};
use crate::remediate::manifest::{self, RemediationManifest};

use super::content::{inherited, resolve_array, resolve_dict, ContentInterpreter};
use super::options::{ErrorMode, ParseOptions};
use super::structure::{collect_tags, inspect_binding, struct_tree_root};
use super::text::{clean_text, dict_text, number, object_text};

/// PDF document parser.
pub struct PdfParser {
    doc: LopdfDocument,
    options: ParseOptions,
}

impl PdfParser {
    /// Open a PDF file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, ParseOptions::default())
    }

    /// Open a PDF file with custom options.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ParseOptions) -> Result<Self> {
        let path = path.as_ref();
        sniff_path(path)?;
        let doc = LopdfDocument::load(path)?;
        Ok(Self { doc, options })
    }

    /// Parse a PDF from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_bytes_with_options(data, ParseOptions::default())
    }

    /// Parse a PDF from bytes with custom options.
    pub fn from_bytes_with_options(data: &[u8], options: ParseOptions) -> Result<Self> {
        sniff_bytes(data)?;
        let doc = LopdfDocument::load_mem(data)?;
        Ok(Self { doc, options })
    }

    /// Parse a PDF from a reader.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(&data)
    }

    /// Get the number of pages.
    pub fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }

    /// Check if the document is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.doc.is_encrypted()
    }

    /// Get PDF version.
    pub fn version(&self) -> String {
        self.doc.version.to_string()
    }

    /// Parse the document into a [`ParsedDocument`].
    pub fn parse(&self) -> Result<ParsedDocument> {
        let pages = self.doc.get_pages();
        let page_numbers: HashMap<ObjectId, u32> =
            pages.iter().map(|(num, id)| (*id, *num)).collect();

        let mut parsed = ParsedDocument::new(pages.len() as u32);
        parsed.metadata = self.extract_metadata();

        for (&page_num, &page_id) in &pages {
            parsed.page_sizes.push(self.page_size(page_id));

            match ContentInterpreter::new(&self.doc, page_num, self.options.max_images_per_page)
                .run_page(page_id)
            {
                Ok(content) => {
                    parsed.text_items.extend(content.text_items);
                    parsed.images.extend(content.images);
                }
                Err(e) => {
                    if self.options.error_mode == ErrorMode::Strict {
                        return Err(e);
                    }
                    log::warn!("Failed to read content of page {}: {}", page_num, e);
                }
            }

            self.extract_annotations(page_id, page_num, &page_numbers, &mut parsed);
        }

        parsed.text_items = dedupe_text(parsed.text_items);
        parsed.images = dedupe_images(parsed.images);
        parsed.links = dedupe_links(parsed.links);
        parsed.forms = dedupe_forms(parsed.forms);
        parsed.outlines = dedupe_outlines(self.extract_outlines(&page_numbers));

        parsed.tags = collect_tags(&self.doc, &page_numbers, self.options.max_struct_nodes);
        let binding = inspect_binding(&self.doc, self.options.max_binding_nodes);
        parsed.has_structure_tree = struct_tree_root(&self.doc).is_some()
            || binding.struct_elem_count > 0
            || binding.has_parent_tree;
        parsed.structure_binding = Some(binding);

        parsed.language = self.extract_language(&parsed.metadata);
        parsed.title = parsed.meta("Title").map(str::to_string);

        if self.options.decode_manifest {
            let found = parsed
                .meta("Keywords")
                .and_then(manifest::decode)
                .or_else(|| parsed.meta("Subject").and_then(manifest::decode));
            if let Some(found) = found {
                apply_manifest(&mut parsed, found);
            }
        }

        Ok(parsed)
    }

    /// Every Info dictionary entry as text, plus `pdfuaid:part` from XMP.
    fn extract_metadata(&self) -> BTreeMap<String, Option<String>> {
        let mut metadata = BTreeMap::new();

        let info = self
            .doc
            .trailer
            .get(b"Info")
            .ok()
            .and_then(|info| resolve_dict(&self.doc, Some(info)));
        if let Some(info) = info {
            for (key, value) in info.iter() {
                let value = self
                    .doc
                    .dereference(value)
                    .ok()
                    .and_then(|(_, obj)| object_text(obj));
                metadata.insert(String::from_utf8_lossy(key).to_string(), value);
            }
        }

        if let Some(part) = self.xmp_packet().as_deref().and_then(xmp_pdfua_part) {
            metadata.insert("pdfuaid:part".to_string(), Some(part));
        }

        metadata
    }

    fn xmp_packet(&self) -> Option<String> {
        let catalog = self.doc.catalog().ok()?;
        let id = catalog.get(b"Metadata").ok()?.as_reference().ok()?;
        let stream = self.doc.get_object(id).ok()?.as_stream().ok()?;
        let bytes = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        Some(String::from_utf8_lossy(&bytes).to_string())
    }

    fn extract_language(&self, metadata: &BTreeMap<String, Option<String>>) -> Option<String> {
        let from_catalog = self
            .doc
            .catalog()
            .ok()
            .and_then(|c| dict_text(c, b"Lang"));
        let from_info = ["Language", "Lang"].iter().find_map(|key| {
            metadata
                .get(*key)
                .and_then(|v| v.as_deref())
                .and_then(clean_text)
        });
        from_catalog
            .or(from_info)
            .or_else(|| self.xmp_packet().as_deref().and_then(xmp_language))
    }

    fn page_size(&self, page_id: ObjectId) -> PageSize {
        let media_box = inherited(&self.doc, page_id, b"MediaBox")
            .and_then(|obj| resolve_array(&self.doc, Some(obj)));
        match media_box {
            Some(arr) if arr.len() >= 4 => {
                let v: Vec<f32> = arr.iter().map(|o| number(o).unwrap_or(0.0)).collect();
                let width = (v[2] - v[0]).abs();
                let height = (v[3] - v[1]).abs();
                if width > 0.0 && height > 0.0 {
                    PageSize { width, height }
                } else {
                    PageSize::default()
                }
            }
            _ => PageSize::default(),
        }
    }

    fn extract_annotations(
        &self,
        page_id: ObjectId,
        page_num: u32,
        page_numbers: &HashMap<ObjectId, u32>,
        parsed: &mut ParsedDocument,
    ) {
        let Some(annots) = self
            .doc
            .get_dictionary(page_id)
            .ok()
            .and_then(|page| resolve_array(&self.doc, page.get(b"Annots").ok()))
        else {
            return;
        };

        for (index, annot) in annots.iter().enumerate() {
            let Some(dict) = resolve_dict(&self.doc, Some(annot)) else {
                continue;
            };
            let subtype = dict.get(b"Subtype").and_then(|s| s.as_name()).unwrap_or(&[]);

            match subtype {
                b"Link" => {
                    let Some(url) = self.link_url(dict, page_numbers) else {
                        continue;
                    };
                    let text = dict_text(dict, b"Contents").unwrap_or_else(|| url.clone());
                    parsed.links.push(Link::new(text, url, page_num));
                }
                b"Widget" => {
                    let name = self
                        .field_name(dict)
                        .unwrap_or_else(|| format!("field-{}-{}", page_num, index + 1));
                    let flags = self
                        .field_attr(dict, b"Ff")
                        .and_then(|o| o.as_i64().ok())
                        .unwrap_or(0);
                    parsed.forms.push(FormField {
                        name,
                        label: self
                            .field_attr(dict, b"TU")
                            .and_then(object_text)
                            .and_then(|s| clean_text(&s)),
                        required: Some(flags & 0x2 != 0),
                    });
                }
                _ => {}
            }
        }
    }

    /// URI action target, or `#page-N` for an internal destination.
    fn link_url(&self, annot: &Dictionary, page_numbers: &HashMap<ObjectId, u32>) -> Option<String> {
        resolve_dict(&self.doc, annot.get(b"A").ok())
            .and_then(|action| dict_text(action, b"URI"))
            .or_else(|| {
                self.link_destination(annot, page_numbers)
                    .map(|page| format!("#page-{}", page))
            })
    }

    fn link_destination(
        &self,
        annot: &Dictionary,
        page_numbers: &HashMap<ObjectId, u32>,
    ) -> Option<u32> {
        if let Ok(dest) = annot.get(b"Dest") {
            return self.resolve_destination(dest, page_numbers);
        }
        let action = resolve_dict(&self.doc, annot.get(b"A").ok())?;
        self.resolve_destination(action.get(b"D").ok()?, page_numbers)
    }

    /// Resolve an explicit or named destination to a page number.
    fn resolve_destination(
        &self,
        dest: &Object,
        page_numbers: &HashMap<ObjectId, u32>,
    ) -> Option<u32> {
        let (_, dest) = self.doc.dereference(dest).ok()?;
        let explicit = match dest {
            Object::Array(arr) => arr,
            Object::Name(_) | Object::String(..) => {
                let key = match dest {
                    Object::Name(n) => n.as_slice(),
                    Object::String(s, _) => s.as_slice(),
                    _ => return None,
                };
                let named = self.named_destination(key)?;
                match named {
                    Object::Array(arr) => arr,
                    Object::Dictionary(d) => resolve_array(&self.doc, d.get(b"D").ok())?,
                    _ => return None,
                }
            }
            Object::Dictionary(d) => resolve_array(&self.doc, d.get(b"D").ok())?,
            _ => return None,
        };

        match explicit.first()? {
            Object::Reference(id) => page_numbers.get(id).copied(),
            Object::Integer(index) => u32::try_from(*index).ok().map(|i| i + 1),
            _ => None,
        }
    }

    fn named_destination(&self, key: &[u8]) -> Option<&Object> {
        let catalog = self.doc.catalog().ok()?;
        if let Some(dests) = resolve_dict(&self.doc, catalog.get(b"Dests").ok()) {
            if let Ok(found) = dests.get(key) {
                return self.doc.dereference(found).ok().map(|(_, o)| o);
            }
        }
        let names = resolve_dict(&self.doc, catalog.get(b"Names").ok())?;
        let tree = resolve_dict(&self.doc, names.get(b"Dests").ok())?;
        self.name_tree_lookup(tree, key, 0)
    }

    fn name_tree_lookup<'a>(&'a self, node: &'a Dictionary, key: &[u8], depth: u8) -> Option<&'a Object> {
        if depth > 32 {
            return None;
        }
        if let Some(names) = resolve_array(&self.doc, node.get(b"Names").ok()) {
            for pair in names.chunks(2) {
                if let [Object::String(name, _), value] = pair {
                    if name.as_slice() == key {
                        return self.doc.dereference(value).ok().map(|(_, o)| o);
                    }
                }
            }
        }
        let kids = resolve_array(&self.doc, node.get(b"Kids").ok())?;
        kids.iter()
            .filter_map(|k| resolve_dict(&self.doc, Some(k)))
            .find_map(|kid| self.name_tree_lookup(kid, key, depth + 1))
    }

    /// Fully qualified field name, joining `/T` up the `/Parent` chain.
    fn field_name(&self, widget: &Dictionary) -> Option<String> {
        let mut parts = Vec::new();
        let mut current = Some(widget);
        for _ in 0..32 {
            let Some(dict) = current else { break };
            if let Some(part) = dict_text(dict, b"T") {
                parts.push(part);
            }
            current = resolve_dict(&self.doc, dict.get(b"Parent").ok());
        }
        if parts.is_empty() {
            return None;
        }
        parts.reverse();
        Some(parts.join("."))
    }

    /// Field attribute on the widget or the nearest ancestor that declares it.
    fn field_attr<'a>(&'a self, widget: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        let mut current = Some(widget);
        for _ in 0..32 {
            let dict = current?;
            if let Ok(value) = dict.get(key) {
                return self.doc.dereference(value).ok().map(|(_, o)| o);
            }
            current = resolve_dict(&self.doc, dict.get(b"Parent").ok());
        }
        None
    }

    /// Link and widget annotations, located so a writer can edit them in place.
    ///
    /// Names and URLs are computed exactly as [`PdfParser::parse`] computes
    /// them, so entries line up with the parsed `links` and `forms`.
    pub(crate) fn annotation_targets(&self) -> Vec<AnnotationTarget> {
        let pages = self.doc.get_pages();
        let page_numbers: HashMap<ObjectId, u32> =
            pages.iter().map(|(num, id)| (*id, *num)).collect();
        let mut targets = Vec::new();

        for (&page_num, &page_id) in &pages {
            let Some(annots) = self
                .doc
                .get_dictionary(page_id)
                .ok()
                .and_then(|page| resolve_array(&self.doc, page.get(b"Annots").ok()))
            else {
                continue;
            };

            for (index, annot) in annots.iter().enumerate() {
                let Some(dict) = resolve_dict(&self.doc, Some(annot)) else {
                    continue;
                };
                let kind = match dict.get(b"Subtype").and_then(|s| s.as_name()).unwrap_or(&[]) {
                    b"Link" => match self.link_url(dict, &page_numbers) {
                        Some(url) => AnnotationKind::Link { url },
                        None => continue,
                    },
                    b"Widget" => AnnotationKind::Field {
                        name: self
                            .field_name(dict)
                            .unwrap_or_else(|| format!("field-{}-{}", page_num, index + 1)),
                        holder: self.field_holder(dict),
                    },
                    _ => continue,
                };
                targets.push(AnnotationTarget {
                    page: page_num,
                    page_id,
                    index,
                    kind,
                });
            }
        }
        targets
    }

    /// The ancestor field that carries `/T` when the widget itself does not.
    fn field_holder(&self, widget: &Dictionary) -> Option<ObjectId> {
        if widget.has(b"T") {
            return None;
        }
        let mut parent = widget.get(b"Parent").and_then(|p| p.as_reference()).ok();
        for _ in 0..32 {
            let id = parent?;
            let dict = self.doc.get_dictionary(id).ok()?;
            if dict.has(b"T") {
                return Some(id);
            }
            parent = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
        }
        None
    }

    /// Give up the parser and keep the loaded object graph.
    pub(crate) fn into_document(self) -> LopdfDocument {
        self.doc
    }

    /// Flatten the outline tree in display order.
    fn extract_outlines(&self, page_numbers: &HashMap<ObjectId, u32>) -> Vec<OutlineEntry> {
        let mut outlines = Vec::new();
        let Some(root) = self
            .doc
            .catalog()
            .ok()
            .and_then(|c| resolve_dict(&self.doc, c.get(b"Outlines").ok()))
        else {
            return outlines;
        };

        let mut stack: Vec<ObjectId> = Vec::new();
        if let Ok(first) = root.get(b"First").and_then(|f| f.as_reference()) {
            stack.push(first);
        }
        let mut visited: HashSet<ObjectId> = HashSet::new();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) || visited.len() > self.options.max_outline_nodes {
                continue;
            }
            let Ok(item) = self.doc.get_dictionary(id) else {
                continue;
            };

            let title = dict_text(item, b"Title");
            let page = self.link_destination(item, page_numbers);
            if let (Some(title), Some(page)) = (title, page) {
                outlines.push(OutlineEntry::new(title, page));
            }

            // Siblings are visited after the children.
            if let Ok(next) = item.get(b"Next").and_then(|n| n.as_reference()) {
                stack.push(next);
            }
            if let Ok(first) = item.get(b"First").and_then(|f| f.as_reference()) {
                stack.push(first);
            }
        }

        outlines
    }
}

/// An annotation found by [`PdfParser::annotation_targets`].
#[derive(Debug, Clone)]
pub(crate) struct AnnotationTarget {
    pub page: u32,
    pub page_id: ObjectId,
    /// Position in the page's `/Annots` array
    pub index: usize,
    pub kind: AnnotationKind,
}

#[derive(Debug, Clone)]
pub(crate) enum AnnotationKind {
    Link { url: String },
    Field {
        name: String,
        /// Field dictionary owning `/T`; `None` when the widget holds it
        holder: Option<ObjectId>,
    },
}

/// Merge an embedded manifest into the parsed snapshot.
///
/// The manifest records what a prior pass intentionally set, so its language
/// and flags take precedence over what the object graph exposes.
fn apply_manifest(parsed: &mut ParsedDocument, manifest: RemediationManifest) {
    if let Some(part) = manifest.pdf_ua_part.as_deref().and_then(clean_text) {
        if parsed.meta("pdfuaid:part").is_none() {
            parsed.set_meta("pdfuaid:part", part);
        }
    }
    if let Some(language) = manifest.language.as_deref().and_then(clean_text) {
        parsed.language = Some(language);
    }
    if manifest.has_struct_tree == Some(true) {
        parsed.has_structure_tree = true;
    }
    parsed.remediation_mode = manifest.remediation_mode;

    for image in parsed.images.iter_mut().filter(|i| i.alt_text().is_none()) {
        if let Some(alt) = manifest
            .images
            .iter()
            .find(|m| m.id == image.id)
            .and_then(|m| m.alt_text())
        {
            image.alt = Some(alt.to_string());
        }
    }
    for field in parsed.forms.iter_mut().filter(|f| f.label_text().is_none()) {
        if let Some(label) = manifest
            .forms
            .iter()
            .find(|m| m.name == field.name)
            .and_then(|m| m.label_text())
        {
            field.label = Some(label.to_string());
        }
    }
    for link in parsed.links.iter_mut() {
        if let Some(recorded) = manifest
            .links
            .iter()
            .find(|m| m.page == link.page && m.url == link.url && !m.text.trim().is_empty())
        {
            link.text = recorded.text.clone();
        }
    }

    if parsed.outlines.is_empty() {
        parsed.outlines = manifest
            .outlines
            .into_iter()
            .filter(|o| o.page >= 1 && o.page <= parsed.page_count)
            .collect();
    }
    if parsed.tags.is_empty() {
        parsed.tags = manifest
            .tags
            .into_iter()
            .filter(|t| t.page.map_or(true, |p| p >= 1 && p <= parsed.page_count))
            .collect();
    }
}

static RE_PDFUA_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"pdfuaid:part\s*(?:=\s*["']\s*|>\s*)(\d+)"#).unwrap());

static RE_DC_LANGUAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<dc:language>.*?<rdf:li[^>]*>\s*([^<\s]+)\s*</rdf:li>").unwrap()
});

fn xmp_pdfua_part(xmp: &str) -> Option<String> {
    RE_PDFUA_PART.captures(xmp).map(|c| c[1].to_string())
}

fn xmp_language(xmp: &str) -> Option<String> {
    RE_DC_LANGUAGE.captures(xmp).map(|c| c[1].to_string())
}

fn dedupe_text(items: Vec<TextItem>) -> Vec<TextItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            seen.insert((
                item.page,
                item.text.clone(),
                item.x.round() as i64,
                item.y.round() as i64,
            ))
        })
        .collect()
}

fn dedupe_images(images: Vec<ImageItem>) -> Vec<ImageItem> {
    let mut seen = HashSet::new();
    images
        .into_iter()
        .filter(|img| {
            seen.insert((
                img.page,
                img.x.round() as i64,
                img.y.round() as i64,
                img.width.round() as i64,
                img.height.round() as i64,
            ))
        })
        .collect()
}

fn dedupe_links(links: Vec<Link>) -> Vec<Link> {
    let mut seen = HashSet::new();
    links
        .into_iter()
        .map(|link| Link {
            text: clean_text(&link.text).unwrap_or_else(|| "Link".to_string()),
            url: clean_text(&link.url).unwrap_or_default(),
            page: link.page,
        })
        .filter(|link| seen.insert((link.page, link.text.clone(), link.url.clone())))
        .collect()
}

fn dedupe_forms(forms: Vec<FormField>) -> Vec<FormField> {
    let mut seen = HashSet::new();
    forms
        .into_iter()
        .filter(|f| !f.name.is_empty() && seen.insert(f.name.clone()))
        .collect()
}

fn dedupe_outlines(outlines: Vec<OutlineEntry>) -> Vec<OutlineEntry> {
    let mut seen = HashSet::new();
    outlines
        .into_iter()
        .filter(|o| seen.insert((o.page, o.title.clone())))
        .collect()
}
