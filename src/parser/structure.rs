//! Structure tree reading and content-binding inspection.

use std::collections::{HashMap, HashSet};

use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId};

use crate::model::{StructureBindingSummary, Tag};

use super::content::{resolve_array, resolve_dict};
use super::text::dict_text;

/// Standard structure types that never go through the role map.
const STANDARD_ROLES: &[&str] = &[
    "Document", "Part", "Art", "Sect", "Div", "BlockQuote", "Caption", "TOC", "TOCI", "Index",
    "NonStruct", "Private", "P", "H", "H1", "H2", "H3", "H4", "H5", "H6", "L", "LI", "Lbl",
    "LBody", "Table", "TR", "TH", "TD", "THead", "TBody", "TFoot", "Span", "Quote", "Note",
    "Reference", "BibEntry", "Code", "Link", "Annot", "Ruby", "Warichu", "Figure", "Formula",
    "Form",
];

/// The catalog's `/StructTreeRoot`, if any.
pub(crate) fn struct_tree_root(doc: &LopdfDocument) -> Option<&Dictionary> {
    let catalog = doc.catalog().ok()?;
    resolve_dict(doc, catalog.get(b"StructTreeRoot").ok())
}

/// Walk the structure tree and collect declared tags in document order.
pub(crate) fn collect_tags(
    doc: &LopdfDocument,
    page_numbers: &HashMap<ObjectId, u32>,
    max_nodes: usize,
) -> Vec<Tag> {
    let Some(root) = struct_tree_root(doc) else {
        return Vec::new();
    };
    let role_map = resolve_dict(doc, root.get(b"RoleMap").ok());

    let mut tags = Vec::new();
    let mut stack: Vec<&Object> = Vec::new();
    if let Ok(k) = root.get(b"K") {
        stack.push(k);
    }
    let mut visited: HashSet<ObjectId> = HashSet::new();
    let mut processed = 0usize;

    while let Some(node) = stack.pop() {
        if let Object::Reference(id) = node {
            if !visited.insert(*id) {
                continue;
            }
        }
        let resolved = match doc.dereference(node) {
            Ok((_, obj)) => obj,
            Err(_) => continue,
        };

        if let Object::Array(items) = resolved {
            stack.extend(items.iter().rev());
            continue;
        }
        let Ok(dict) = resolved.as_dict() else {
            continue;
        };

        processed += 1;
        if processed > max_nodes {
            log::warn!("Structure tree exceeds {} nodes, stopping walk", max_nodes);
            break;
        }

        if let Ok(role) = dict.get(b"S").and_then(|s| s.as_name_str()) {
            let role = map_role(role, role_map);
            let mut tag = Tag::new(
                if role == "Root" { "Document".to_string() } else { role },
                dict.get(b"Pg")
                    .and_then(|p| p.as_reference())
                    .ok()
                    .and_then(|id| page_numbers.get(&id).copied()),
            );
            tag.alt = dict_text(dict, b"Alt");
            tag.text = dict_text(dict, b"ActualText");
            tag.scope = attribute_scope(doc, dict);
            tags.push(tag);
        }

        if let Ok(kids) = dict.get(b"K") {
            stack.push(kids);
        }
    }

    dedupe_tags(tags)
}

fn map_role(role: &str, role_map: Option<&Dictionary>) -> String {
    if STANDARD_ROLES.contains(&role) {
        return role.to_string();
    }
    role_map
        .and_then(|m| m.get(role.as_bytes()).ok())
        .and_then(|o| o.as_name_str().ok())
        .unwrap_or(role)
        .to_string()
}

fn attribute_scope(doc: &LopdfDocument, dict: &Dictionary) -> Option<String> {
    let attrs = dict.get(b"A").ok()?;
    let scope_of = |d: &Dictionary| {
        d.get(b"Scope")
            .and_then(|s| s.as_name_str())
            .ok()
            .map(str::to_string)
    };
    if let Some(d) = resolve_dict(doc, Some(attrs)) {
        return scope_of(d);
    }
    resolve_array(doc, Some(attrs))?
        .iter()
        .filter_map(|o| resolve_dict(doc, Some(o)))
        .find_map(scope_of)
}

fn dedupe_tags(tags: Vec<Tag>) -> Vec<Tag> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter(|t| !t.kind.is_empty())
        .filter(|t| {
            seen.insert((
                t.kind.clone(),
                t.page,
                t.text.clone(),
                t.alt.clone(),
                t.scope.clone(),
            ))
        })
        .collect()
}

/// Count how well the structure tree is bound to marked content.
pub(crate) fn inspect_binding(doc: &LopdfDocument, max_nodes: usize) -> StructureBindingSummary {
    let mut summary = StructureBindingSummary::default();
    let root = struct_tree_root(doc);

    if let Some(parent_tree) = root.and_then(|r| r.get(b"ParentTree").ok()) {
        summary.has_parent_tree = true;
        summary.has_parent_tree_entries = parent_tree_has_entries(doc, parent_tree, max_nodes);
    }

    let mut queue: Vec<&Object> = Vec::new();
    if let Some(k) = root.and_then(|r| r.get(b"K").ok()) {
        queue.push(k);
    }
    let mut visited: HashSet<ObjectId> = HashSet::new();
    let mut processed = 0usize;

    while let Some(raw) = queue.pop() {
        if let Object::Reference(id) = raw {
            if !visited.insert(*id) {
                continue;
            }
        }
        let Ok((_, node)) = doc.dereference(raw) else {
            continue;
        };

        if let Object::Array(items) = node {
            queue.extend(items.iter().rev());
            continue;
        }
        let Ok(dict) = node.as_dict() else {
            continue;
        };

        processed += 1;
        if processed > max_nodes {
            break;
        }

        let looks_struct_elem =
            dict.has(b"S") || dict.has(b"P") || dict.has(b"Pg") || dict.has(b"K");
        if !looks_struct_elem {
            continue;
        }
        count_element(doc, dict, &mut summary);

        if let Ok(kids) = dict.get(b"K") {
            queue.push(kids);
        }
    }

    if summary.struct_elem_count == 0 {
        // Trees with a broken /K chain still leave their elements in the object table.
        for object in doc.objects.values() {
            let Ok(dict) = object.as_dict() else {
                continue;
            };
            let is_struct_type = dict
                .get(b"Type")
                .and_then(|t| t.as_name())
                .map(|t| t == b"StructElem")
                .unwrap_or(false);
            let has_signals = is_struct_type || dict.has(b"K") || dict.has(b"P") || dict.has(b"Pg");
            if !dict.has(b"S") || !has_signals {
                continue;
            }
            count_element(doc, dict, &mut summary);
        }
    }

    summary.finish()
}

fn count_element(doc: &LopdfDocument, dict: &Dictionary, summary: &mut StructureBindingSummary) {
    summary.struct_elem_count += 1;
    if dict.has(b"Pg") {
        summary.struct_elem_with_page_ref += 1;
    }
    if dict.has(b"MCID") {
        summary.struct_elem_with_mcid += 1;
    }
    if let Ok(role) = dict.get(b"S").and_then(|s| s.as_name_str()) {
        summary.count_role(role);
    }
    if let Ok(kids) = dict.get(b"K") {
        let (numeric, mcr) = count_content_refs(doc, kids, 0);
        summary.struct_elem_with_numeric_k += numeric;
        summary.struct_elem_with_mcr += mcr;
    }
}

/// Returns (numeric /K entries, marked-content reference dictionaries).
fn count_content_refs(doc: &LopdfDocument, value: &Object, depth: u8) -> (usize, usize) {
    if depth > 16 {
        return (0, 0);
    }
    let resolved = match doc.dereference(value) {
        Ok((_, obj)) => obj,
        Err(_) => return (0, 0),
    };
    match resolved {
        Object::Integer(_) => (1, 0),
        Object::Array(items) => items.iter().fold((0, 0), |acc, item| {
            let (n, m) = count_content_refs(doc, item, depth + 1);
            (acc.0 + n, acc.1 + m)
        }),
        Object::Dictionary(dict) if is_content_reference(dict) => (0, 1),
        _ => (0, 0),
    }
}

fn is_content_reference(dict: &Dictionary) -> bool {
    let type_name = dict.get(b"Type").and_then(|t| t.as_name()).unwrap_or(&[]);
    type_name == b"MCR" || type_name == b"OBJR" || dict.has(b"MCID")
}

fn parent_tree_has_entries(doc: &LopdfDocument, parent_tree: &Object, max_nodes: usize) -> bool {
    let mut stack: Vec<&Dictionary> = Vec::new();
    if let Some(root) = resolve_dict(doc, Some(parent_tree)) {
        stack.push(root);
    }
    let mut processed = 0usize;

    while let Some(node) = stack.pop() {
        processed += 1;
        if processed > max_nodes {
            break;
        }
        if resolve_array(doc, node.get(b"Nums").ok())
            .map(|nums| !nums.is_empty())
            .unwrap_or(false)
        {
            return true;
        }
        if let Some(kids) = resolve_array(doc, node.get(b"Kids").ok()) {
            stack.extend(kids.iter().filter_map(|k| resolve_dict(doc, Some(k))));
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn tagged_doc(with_mcid: bool) -> LopdfDocument {
        let mut doc = LopdfDocument::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );

        let root_id = doc.new_object_id();
        let doc_elem_id = doc.new_object_id();
        let mut heading = dictionary! {
            "Type" => "StructElem",
            "S" => "Heading1",
            "P" => doc_elem_id,
            "Pg" => page_id,
            "Alt" => Object::string_literal("Title"),
        };
        if with_mcid {
            heading.set("K", 0);
        }
        let heading_id = doc.add_object(heading);
        doc.objects.insert(
            doc_elem_id,
            Object::Dictionary(dictionary! {
                "Type" => "StructElem",
                "S" => "Document",
                "P" => root_id,
                "K" => vec![heading_id.into()],
            }),
        );
        doc.objects.insert(
            root_id,
            Object::Dictionary(dictionary! {
                "Type" => "StructTreeRoot",
                "K" => doc_elem_id,
                "RoleMap" => dictionary! { "Heading1" => "H1" },
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "StructTreeRoot" => root_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn page_map(doc: &LopdfDocument) -> HashMap<ObjectId, u32> {
        doc.get_pages().into_iter().map(|(n, id)| (id, n)).collect()
    }

    #[test]
    fn test_collect_tags_applies_role_map() {
        let doc = tagged_doc(false);
        let tags = collect_tags(&doc, &page_map(&doc), 1000);
        let kinds: Vec<&str> = tags.iter().map(|t| t.kind.as_str()).collect();
        assert_eq!(kinds, vec!["Document", "H1"]);
        assert_eq!(tags[1].page, Some(1));
        assert_eq!(tags[1].alt.as_deref(), Some("Title"));
    }

    #[test]
    fn test_unbound_tree() {
        let doc = tagged_doc(false);
        let summary = inspect_binding(&doc, 1000);
        assert_eq!(summary.struct_elem_count, 2);
        assert_eq!(summary.struct_elem_with_page_ref, 1);
        assert!(!summary.has_content_binding);
        assert!(summary.is_unbound());
    }

    #[test]
    fn test_numeric_kid_binds_content() {
        let doc = tagged_doc(true);
        let summary = inspect_binding(&doc, 1000);
        assert_eq!(summary.struct_elem_with_numeric_k, 1);
        assert!(summary.has_content_binding);
    }

    #[test]
    fn test_no_tree() {
        let doc = LopdfDocument::with_version("1.5");
        let summary = inspect_binding(&doc, 1000);
        assert_eq!(summary.struct_elem_count, 0);
        assert!(!summary.has_parent_tree);
    }
}
