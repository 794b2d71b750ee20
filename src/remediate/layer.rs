//! Marked-content text layers.
//!
//! Structure elements can only reference content that sits inside a marked
//! content sequence carrying an `/MCID`. This module writes those sequences:
//! as an invisible overlay on top of existing pages, or as the visible text
//! of pages rebuilt from scratch.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document as LopdfDocument, Object, ObjectId, Stream, StringFormat};

use crate::audit::parse_color;
use crate::error::Result;
use crate::model::{ParsedDocument, TextItem};
use crate::parser::{page_content, page_resources, resolve_dict};

use super::fonts::{encode_win_ansi, map_font, StandardFont};
use super::tagger::TagNode;

const MAX_TEXT_CHARS: usize = 500;
const MIN_OVERLAY_SIZE: f32 = 6.0;
const MAX_OVERLAY_SIZE: f32 = 72.0;

/// Items drawn per rebuilt page.
const MAX_REBUILT_ITEMS: usize = 300;
/// Rebuilt text keeps clear of the page edge.
const REBUILT_MARGIN: f32 = 20.0;
const MIN_REBUILT_SIZE: f32 = 8.0;

/// Which source items ended up in marked content, and under which MCID.
#[derive(Debug, Clone, Default)]
pub struct ContentBindings {
    spans: HashMap<usize, (u32, i64)>,
    /// Characters replaced while encoding
    pub substitutions: usize,
}

impl ContentBindings {
    /// Page and MCID of a bound text item.
    pub fn get(&self, item: usize) -> Option<(u32, i64)> {
        self.spans.get(&item).copied()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Pages carrying at least one binding.
    pub fn pages(&self) -> HashSet<u32> {
        self.spans.values().map(|(page, _)| *page).collect()
    }
}

/// A text run placed inside a marked-content sequence.
struct BoundSpan<'a> {
    item: &'a TextItem,
    role: &'a str,
    mcid: i64,
}

/// Assign MCIDs to tree spans in pre-order, numbering per page from
/// `first_mcid(page)`.
fn bind_spans<'a>(
    tree: &'a TagNode,
    parsed: &'a ParsedDocument,
    cap: usize,
    eligible: impl Fn(usize) -> bool,
    first_mcid: impl Fn(u32) -> i64,
) -> (BTreeMap<u32, Vec<BoundSpan<'a>>>, ContentBindings) {
    let mut by_page: BTreeMap<u32, Vec<BoundSpan<'a>>> = BTreeMap::new();
    let mut bindings = ContentBindings::default();

    'nodes: for node in tree.preorder() {
        for &idx in &node.spans {
            if bindings.spans.len() >= cap {
                log::debug!("Tagged layer capped at {} items", cap);
                break 'nodes;
            }
            let Some(item) = parsed.text_items.get(idx) else {
                continue;
            };
            if item.text.trim().is_empty()
                || item.page == 0
                || item.page > parsed.page_count
                || !eligible(idx)
                || bindings.spans.contains_key(&idx)
            {
                continue;
            }
            let spans = by_page.entry(item.page).or_default();
            let mcid = first_mcid(item.page) + spans.len() as i64;
            spans.push(BoundSpan {
                item,
                role: node.role.as_str(),
                mcid,
            });
            bindings.spans.insert(idx, (item.page, mcid));
        }
    }
    (by_page, bindings)
}

/// Placement and face for one drawn run.
struct Placement {
    x: f32,
    y: f32,
    size: f32,
    font: StandardFont,
    invisible: bool,
}

fn show_text(ops: &mut Vec<Operation>, item: &TextItem, at: &Placement, substitutions: &mut usize) {
    let text: String = item.text.trim().chars().take(MAX_TEXT_CHARS).collect();
    let (bytes, substituted) = encode_win_ansi(&text);
    *substitutions += substituted;

    ops.push(Operation::new("BT", vec![]));
    if at.invisible {
        ops.push(Operation::new("Tr", vec![3.into()]));
    } else {
        let [r, g, b] = item
            .color
            .as_deref()
            .and_then(parse_color)
            .unwrap_or([0, 0, 0]);
        ops.push(Operation::new(
            "rg",
            vec![
                (r as f32 / 255.0).into(),
                (g as f32 / 255.0).into(),
                (b as f32 / 255.0).into(),
            ],
        ));
    }
    ops.push(Operation::new(
        "Tf",
        vec![Object::Name(at.font.resource_name().as_bytes().to_vec()), at.size.into()],
    ));
    ops.push(Operation::new(
        "Tm",
        vec![1.into(), 0.into(), 0.into(), 1.into(), at.x.into(), at.y.into()],
    ));
    ops.push(Operation::new("Tj", vec![Object::String(bytes, StringFormat::Literal)]));
    ops.push(Operation::new("ET", vec![]));
}

fn begin_tagged(ops: &mut Vec<Operation>, role: &str, mcid: i64) {
    ops.push(Operation::new(
        "BDC",
        vec![
            Object::Name(role.as_bytes().to_vec()),
            Object::Dictionary(dictionary! { "MCID" => mcid }),
        ],
    ));
}

fn face(item: &TextItem) -> StandardFont {
    map_font(
        &item.font_name,
        item.is_bold(),
        item.italic.unwrap_or(false),
    )
}

/// Shared font objects, created on first use.
#[derive(Default)]
struct FontTable {
    ids: BTreeMap<StandardFont, ObjectId>,
}

impl FontTable {
    fn id(&mut self, doc: &mut LopdfDocument, font: StandardFont) -> ObjectId {
        *self
            .ids
            .entry(font)
            .or_insert_with(|| doc.add_object(font.dictionary()))
    }

    fn resource_dict(&self, used: &HashSet<StandardFont>) -> Dictionary {
        let mut dict = Dictionary::new();
        for (font, id) in self.ids.iter().filter(|(f, _)| used.contains(f)) {
            dict.set(font.resource_name(), Object::Reference(*id));
        }
        dict
    }
}

/// Flate-compressed content stream.
fn flate_stream(content: &[u8]) -> Result<Stream> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content)?;
    let compressed = encoder.finish()?;
    Ok(Stream::new(dictionary! { "Filter" => "FlateDecode" }, compressed))
}

/// Content stream references of a page, flattening a referenced array.
fn content_refs(doc: &LopdfDocument, page_id: ObjectId) -> Vec<Object> {
    let Ok(contents) = doc.get_dictionary(page_id).and_then(|p| p.get(b"Contents")) else {
        return Vec::new();
    };
    match contents {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Array(arr)) => arr.clone(),
            Ok(_) => vec![Object::Reference(*id)],
            Err(_) => Vec::new(),
        },
        Object::Array(arr) => arr.clone(),
        _ => Vec::new(),
    }
}

/// Lowest unused MCID of every page that already carries marked content.
fn next_free_mcids(doc: &LopdfDocument) -> HashMap<u32, i64> {
    doc.get_pages()
        .into_iter()
        .filter_map(|(page, page_id)| {
            let bytes = page_content(doc, page_id).ok()?;
            let content = Content::decode(&bytes).ok()?;
            let highest = content
                .operations
                .iter()
                .filter(|op| op.operator == "BDC")
                .filter_map(|op| op.operands.get(1)?.as_dict().ok())
                .filter_map(|props| props.get(b"MCID").ok()?.as_i64().ok())
                .max()?;
            Some((page, highest + 1))
        })
        .collect()
}

/// Write an invisible tagged overlay over existing pages.
///
/// Existing content is wrapped in `q`/`Q` so its graphics state cannot leak
/// into the overlay. Positions are clamped to the page and sizes to 6-72 pt.
/// New MCIDs start above any the page already uses.
pub fn overlay_tagged_text(
    doc: &mut LopdfDocument,
    parsed: &ParsedDocument,
    tree: &TagNode,
    cap: usize,
) -> Result<ContentBindings> {
    let taken = next_free_mcids(doc);
    let (by_page, mut bindings) = bind_spans(tree, parsed, cap, |_| true, |page| {
        taken.get(&page).copied().unwrap_or(0)
    });
    let pages = doc.get_pages();
    let mut fonts = FontTable::default();

    for (page, spans) in &by_page {
        let Some(&page_id) = pages.get(page) else {
            continue;
        };
        let size = parsed.page_size(*page);
        let mut used = HashSet::new();
        let mut ops = Vec::new();

        for span in spans {
            let font = face(span.item);
            used.insert(font);
            fonts.id(doc, font);
            begin_tagged(&mut ops, span.role, span.mcid);
            let at = Placement {
                x: span.item.x.clamp(0.0, (size.width - 1.0).max(0.0)),
                y: span.item.y.clamp(0.0, (size.height - 1.0).max(0.0)),
                size: span.item.font_size.clamp(MIN_OVERLAY_SIZE, MAX_OVERLAY_SIZE),
                font,
                invisible: true,
            };
            show_text(&mut ops, span.item, &at, &mut bindings.substitutions);
            ops.push(Operation::new("EMC", vec![]));
        }

        let existing = content_refs(doc, page_id);
        let mut overlay = Vec::new();
        if !existing.is_empty() {
            overlay.extend_from_slice(b"Q\n");
        }
        overlay.extend(Content { operations: ops }.encode()?);

        let mut contents = Vec::with_capacity(existing.len() + 2);
        if !existing.is_empty() {
            contents.push(Object::Reference(doc.add_object(flate_stream(b"q\n")?)));
            contents.extend(existing);
        }
        contents.push(Object::Reference(doc.add_object(flate_stream(&overlay)?)));

        let mut resources = page_resources(doc, page_id).cloned().unwrap_or_default();
        let mut font_dict = resolve_dict(doc, resources.get(b"Font").ok())
            .cloned()
            .unwrap_or_default();
        let added = fonts.resource_dict(&used);
        for (name, value) in added.iter() {
            font_dict.set(name.clone(), value.clone());
        }
        resources.set("Font", Object::Dictionary(font_dict));

        let page_dict = doc.get_object_mut(page_id)?.as_dict_mut()?;
        page_dict.set("Contents", Object::Array(contents));
        page_dict.set("Resources", Object::Dictionary(resources));
    }

    log::debug!(
        "Tagged overlay: {} runs on {} pages",
        bindings.len(),
        by_page.len()
    );
    Ok(bindings)
}

/// Build a new document from the parsed text alone.
///
/// Each page draws up to 300 of its items. Runs the tree binds are drawn
/// inside their marked-content sequence; the rest are `/Artifact`.
pub fn rebuild_pages(
    parsed: &ParsedDocument,
    tree: &TagNode,
    cap: usize,
) -> Result<(LopdfDocument, ContentBindings)> {
    let mut drawable: HashSet<usize> = HashSet::new();
    let mut per_page: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (idx, item) in parsed.text_items.iter().enumerate() {
        let page_items = per_page.entry(item.page).or_default();
        if page_items.len() < MAX_REBUILT_ITEMS && !item.text.trim().is_empty() {
            page_items.push(idx);
            drawable.insert(idx);
        }
    }
    let (by_page, mut bindings) = bind_spans(tree, parsed, cap, |idx| drawable.contains(&idx), |_| 0);

    let mut doc = LopdfDocument::with_version("1.7");
    let pages_id = doc.new_object_id();
    let mut fonts = FontTable::default();
    let mut kids = Vec::new();

    for page in 1..=parsed.page_count.max(1) {
        let size = parsed.page_size(page);
        let mut used = HashSet::new();
        let mut ops = Vec::new();
        let spans = by_page.get(&page).map(Vec::as_slice).unwrap_or(&[]);
        let placement = |item: &TextItem, font: StandardFont| Placement {
            x: item.x.max(REBUILT_MARGIN),
            y: item.y.max(REBUILT_MARGIN),
            size: item.font_size.max(MIN_REBUILT_SIZE),
            font,
            invisible: false,
        };

        for span in spans {
            let font = face(span.item);
            used.insert(font);
            begin_tagged(&mut ops, span.role, span.mcid);
            show_text(&mut ops, span.item, &placement(span.item, font), &mut bindings.substitutions);
            ops.push(Operation::new("EMC", vec![]));
        }
        for &idx in per_page.get(&page).map(Vec::as_slice).unwrap_or(&[]) {
            if bindings.get(idx).is_some() {
                continue;
            }
            let item = &parsed.text_items[idx];
            let font = face(item);
            used.insert(font);
            ops.push(Operation::new("BMC", vec![Object::Name(b"Artifact".to_vec())]));
            show_text(&mut ops, item, &placement(item, font), &mut bindings.substitutions);
            ops.push(Operation::new("EMC", vec![]));
        }

        for font in &used {
            fonts.id(&mut doc, *font);
        }
        let content = Content { operations: ops }.encode()?;
        let content_id = doc.add_object(flate_stream(&content)?);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), size.width.into(), size.height.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => fonts.resource_dict(&used),
            },
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    log::debug!(
        "Rebuilt {} pages with {} tagged runs",
        parsed.page_count.max(1),
        bindings.len()
    );
    Ok((doc, bindings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics;
    use crate::remediate::tagger::build_tag_tree;

    fn sample() -> ParsedDocument {
        let mut doc = ParsedDocument::new(2);
        doc.text_items = vec![
            TextItem::new("Annual Report", 72.0, 740.0, 24.0, 1),
            TextItem::new("The year closed with strong results.", 72.0, 700.0, 11.0, 1),
            TextItem::new("Outlook remains positive for next year.", 72.0, 700.0, 11.0, 2),
        ];
        doc
    }

    fn tree(doc: &ParsedDocument) -> TagNode {
        build_tag_tree(doc, &heuristics::plan(doc), &[], 400)
    }

    fn page_text(doc: &LopdfDocument, page: u32) -> Vec<u8> {
        let page_id = doc.get_pages()[&page];
        page_content(doc, page_id).unwrap()
    }

    fn page_mcids(doc: &LopdfDocument, page: u32) -> Vec<i64> {
        let content = Content::decode(&page_text(doc, page)).unwrap();
        content
            .operations
            .iter()
            .filter(|op| op.operator == "BDC")
            .filter_map(|op| op.operands.get(1)?.as_dict().ok())
            .filter_map(|props| props.get(b"MCID").ok()?.as_i64().ok())
            .collect()
    }

    #[test]
    fn test_bind_spans_numbers_per_page() {
        let doc = sample();
        let tree = tree(&doc);
        let (by_page, bindings) = bind_spans(&tree, &doc, 100, |_| true, |_| 0);

        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings.get(0), Some((1, 0)));
        assert_eq!(bindings.get(1), Some((1, 1)));
        assert_eq!(bindings.get(2), Some((2, 0)));
        assert_eq!(by_page[&1][0].role, "H1");
        assert_eq!(by_page[&1][1].role, "P");
    }

    #[test]
    fn test_bind_spans_respects_cap() {
        let doc = sample();
        let tree = tree(&doc);
        let (_, bindings) = bind_spans(&tree, &doc, 2, |_| true, |_| 0);
        assert_eq!(bindings.len(), 2);
        assert!(bindings.get(2).is_none());
    }

    #[test]
    fn test_rebuild_pages_marks_content() {
        let doc = sample();
        let (built, bindings) = rebuild_pages(&doc, &tree(&doc), 1200).unwrap();

        assert_eq!(built.get_pages().len(), 2);
        assert_eq!(bindings.pages().len(), 2);
        let content = String::from_utf8_lossy(&page_text(&built, 1)).to_string();
        assert!(content.contains("MCID"));
        assert!(content.contains("/H1"));
        assert!(content.contains("(Annual Report)"));
    }

    #[test]
    fn test_rebuild_empty_document_has_one_page() {
        let doc = ParsedDocument::new(0);
        let (built, bindings) = rebuild_pages(&doc, &TagNode::new("Document"), 1200).unwrap();
        assert_eq!(built.get_pages().len(), 1);
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_overlay_wraps_existing_content() {
        let doc = sample();
        let (mut built, _) = rebuild_pages(&doc, &TagNode::new("Document"), 1200).unwrap();
        let bindings = overlay_tagged_text(&mut built, &doc, &tree(&doc), 1200).unwrap();
        assert_eq!(bindings.len(), 3);

        let content = String::from_utf8_lossy(&page_text(&built, 1)).to_string();
        assert!(content.starts_with("q"));
        assert!(content.contains("3 Tr"));
        assert!(content.contains("BDC"));

        let page_id = built.get_pages()[&1];
        let resources = page_resources(&built, page_id).unwrap();
        let fonts = resolve_dict(&built, resources.get(b"Font").ok()).unwrap();
        assert!(fonts.has(b"RF1"));
    }

    #[test]
    fn test_overlay_numbers_above_existing_mcids() {
        let doc = sample();
        let tree = tree(&doc);
        let (mut built, first) = rebuild_pages(&doc, &tree, 1200).unwrap();
        assert_eq!(first.get(0), Some((1, 0)));
        assert_eq!(next_free_mcids(&built).get(&1), Some(&2));

        let second = overlay_tagged_text(&mut built, &doc, &tree, 1200).unwrap();
        assert_eq!(second.get(0), Some((1, 2)));
        assert_eq!(second.get(2), Some((2, 1)));

        for page in 1..=2 {
            let mcids = page_mcids(&built, page);
            let unique: HashSet<i64> = mcids.iter().copied().collect();
            assert_eq!(unique.len(), mcids.len(), "page {} reuses an MCID", page);
        }
        assert_eq!(page_mcids(&built, 1), vec![0, 1, 2, 3]);
    }
}
