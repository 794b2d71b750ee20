//! Structure tree injection.
//!
//! The tag tree is flattened into an arena before anything is written, so
//! every element's object id is known up front. Parents are allocated before
//! their children, which keeps `/P` pointing at registered objects.

use std::collections::{BTreeMap, BTreeSet};

use lopdf::{dictionary, Dictionary, Document as LopdfDocument, Object, ObjectId};

use crate::error::{Error, Result};

use super::layer::ContentBindings;
use super::metadata::text_string;
use super::tagger::TagNode;

/// Roles defined by the PDF standard structure types.
const STANDARD_ROLES: &[&str] = &[
    "Document", "Part", "Art", "Sect", "Div", "BlockQuote", "Caption", "TOC", "TOCI", "Index",
    "NonStruct", "Private", "P", "H", "H1", "H2", "H3", "H4", "H5", "H6", "L", "LI", "Lbl", "LBody",
    "Table", "TR", "TH", "TD", "THead", "TBody", "TFoot", "Span", "Quote", "Note", "Reference",
    "BibEntry", "Code", "Link", "Annot", "Ruby", "RB", "RT", "RP", "Warichu", "WT", "WP", "Figure",
    "Formula", "Form",
];

/// What an injection wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionStats {
    pub elements: usize,
    pub marked_content_refs: usize,
    pub pages_with_content: usize,
}

struct ArenaNode<'a> {
    node: &'a TagNode,
    parent: Option<usize>,
    children: Vec<usize>,
}

fn flatten<'a>(node: &'a TagNode, parent: Option<usize>, arena: &mut Vec<ArenaNode<'a>>) -> usize {
    let idx = arena.len();
    arena.push(ArenaNode {
        node,
        parent,
        children: Vec::new(),
    });
    for child in &node.children {
        let child_idx = flatten(child, Some(idx), arena);
        arena[idx].children.push(child_idx);
    }
    idx
}

fn catalog_id(doc: &LopdfDocument) -> Result<ObjectId> {
    doc.trailer
        .get(b"Root")
        .and_then(|r| r.as_reference())
        .map_err(|_| Error::MissingObject("Root".to_string()))
}

/// Mark the document as tagged and make every page follow structure order.
///
/// Used on its own when existing structure is kept.
pub fn mark_tagged(doc: &mut LopdfDocument) -> Result<()> {
    let pages: Vec<ObjectId> = doc.get_pages().values().copied().collect();
    for page_id in pages {
        doc.get_object_mut(page_id)?
            .as_dict_mut()?
            .set("Tabs", Object::Name(b"S".to_vec()));
    }
    let root = catalog_id(doc)?;
    doc.get_object_mut(root)?
        .as_dict_mut()?
        .set("MarkInfo", dictionary! { "Marked" => true });
    Ok(())
}

/// Replace the document's structure tree with `tree`.
///
/// Bound text items become marked-content references of the node that owns
/// them, and the parent tree maps each page's MCIDs back to those nodes. An
/// empty tree yields a lone `Document` element.
pub fn inject_structure(
    doc: &mut LopdfDocument,
    tree: &TagNode,
    bindings: &ContentBindings,
) -> Result<InjectionStats> {
    let pages = doc.get_pages();
    let mut arena = Vec::new();
    flatten(tree, None, &mut arena);

    let root_id = doc.new_object_id();
    let ids: Vec<ObjectId> = arena.iter().map(|_| doc.new_object_id()).collect();

    let mut parent_tree: BTreeMap<u32, BTreeMap<i64, ObjectId>> = BTreeMap::new();
    let mut custom_roles: BTreeSet<&str> = BTreeSet::new();
    let mut stats = InjectionStats {
        elements: arena.len(),
        ..Default::default()
    };

    for (idx, entry) in arena.iter().enumerate() {
        let node = entry.node;
        let own: Vec<(u32, i64)> = node.spans.iter().filter_map(|&i| bindings.get(i)).collect();
        let page = node.page.or_else(|| own.first().map(|(p, _)| *p));
        let page_ref = page.and_then(|p| pages.get(&p)).copied();

        let mut dict = dictionary! {
            "Type" => "StructElem",
            "S" => Object::Name(node.role.as_bytes().to_vec()),
            "P" => Object::Reference(entry.parent.map(|p| ids[p]).unwrap_or(root_id)),
        };
        if let Some(page_ref) = page_ref {
            dict.set("Pg", Object::Reference(page_ref));
        }

        let mut kids: Vec<Object> = Vec::new();
        for (span_page, mcid) in &own {
            let Some(&span_page_ref) = pages.get(span_page) else {
                continue;
            };
            if Some(span_page_ref) == page_ref {
                kids.push(Object::Integer(*mcid));
            } else {
                kids.push(Object::Dictionary(dictionary! {
                    "Type" => "MCR",
                    "Pg" => Object::Reference(span_page_ref),
                    "MCID" => *mcid,
                }));
            }
            parent_tree.entry(*span_page).or_default().insert(*mcid, ids[idx]);
            stats.marked_content_refs += 1;
        }
        kids.extend(entry.children.iter().map(|&c| Object::Reference(ids[c])));
        if !kids.is_empty() {
            dict.set("K", Object::Array(kids));
        }

        if let Some(alt) = node.alt.as_deref().filter(|a| !a.trim().is_empty()) {
            dict.set("Alt", text_string(alt));
        }
        if node.role == "TH" {
            let scope = node.scope.as_deref().unwrap_or("Column");
            dict.set(
                "A",
                dictionary! {
                    "O" => "Table",
                    "Scope" => Object::Name(scope.as_bytes().to_vec()),
                },
            );
        }
        if !STANDARD_ROLES.contains(&node.role.as_str()) {
            custom_roles.insert(node.role.as_str());
        }

        doc.objects.insert(ids[idx], Object::Dictionary(dict));
    }

    let mut nums = Vec::new();
    for (page, entries) in &parent_tree {
        let max_mcid = entries.keys().copied().max().unwrap_or(0);
        let mut slots: Vec<Object> = (0..=max_mcid).map(|_| Object::Null).collect();
        for (mcid, id) in entries {
            slots[*mcid as usize] = Object::Reference(*id);
        }
        let slots_id = doc.add_object(Object::Array(slots));
        nums.push(Object::Integer(i64::from(page - 1)));
        nums.push(Object::Reference(slots_id));
    }
    let next_key = parent_tree.keys().max().map(|p| i64::from(*p)).unwrap_or(0);
    let parent_tree_id = doc.add_object(dictionary! { "Nums" => nums });

    let mut root = dictionary! {
        "Type" => "StructTreeRoot",
        "K" => Object::Reference(ids[0]),
        "ParentTree" => Object::Reference(parent_tree_id),
        "ParentTreeNextKey" => next_key,
    };
    if !custom_roles.is_empty() {
        let mut role_map = Dictionary::new();
        for role in &custom_roles {
            role_map.set(role.as_bytes().to_vec(), Object::Name(b"Span".to_vec()));
        }
        root.set("RoleMap", role_map);
    }
    doc.objects.insert(root_id, Object::Dictionary(root));

    for (&page_num, &page_id) in &pages {
        let page_dict = doc.get_object_mut(page_id)?.as_dict_mut()?;
        if parent_tree.contains_key(&page_num) {
            page_dict.set("StructParents", i64::from(page_num - 1));
        } else {
            page_dict.remove(b"StructParents");
        }
    }
    stats.pages_with_content = parent_tree.len();

    let catalog = catalog_id(doc)?;
    doc.get_object_mut(catalog)?
        .as_dict_mut()?
        .set("StructTreeRoot", Object::Reference(root_id));
    mark_tagged(doc)?;

    let pruned = doc.prune_objects();
    log::debug!(
        "Injected {} structure elements, {} content refs, pruned {} objects",
        stats.elements,
        stats.marked_content_refs,
        pruned.len()
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics;
    use crate::model::{ParsedDocument, TextItem};
    use crate::remediate::layer::rebuild_pages;
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

    fn struct_root(doc: &LopdfDocument) -> &Dictionary {
        let id = doc
            .catalog()
            .unwrap()
            .get(b"StructTreeRoot")
            .unwrap()
            .as_reference()
            .unwrap();
        doc.get_dictionary(id).unwrap()
    }

    #[test]
    fn test_inject_empty_tree() {
        let parsed = ParsedDocument::new(1);
        let tree = TagNode::new("Document");
        let (mut doc, bindings) = rebuild_pages(&parsed, &tree, 1200).unwrap();
        let stats = inject_structure(&mut doc, &tree, &bindings).unwrap();

        assert_eq!(stats.elements, 1);
        assert_eq!(stats.marked_content_refs, 0);
        let root = struct_root(&doc);
        let document = doc
            .get_dictionary(root.get(b"K").unwrap().as_reference().unwrap())
            .unwrap();
        assert_eq!(document.get(b"S").unwrap().as_name().unwrap(), b"Document");
        assert!(document.get(b"K").is_err());
    }

    #[test]
    fn test_parents_registered_before_children() {
        let parsed = sample();
        let tree = build_tag_tree(&parsed, &heuristics::plan(&parsed), &[], 400);
        let (mut doc, bindings) = rebuild_pages(&parsed, &tree, 1200).unwrap();
        let stats = inject_structure(&mut doc, &tree, &bindings).unwrap();
        assert_eq!(stats.marked_content_refs, 3);
        assert_eq!(stats.pages_with_content, 2);

        let root_id = doc
            .catalog()
            .unwrap()
            .get(b"StructTreeRoot")
            .unwrap()
            .as_reference()
            .unwrap();
        for (id, object) in &doc.objects {
            let Ok(dict) = object.as_dict() else { continue };
            if dict.get(b"Type").and_then(|t| t.as_name()).ok() != Some(b"StructElem".as_slice()) {
                continue;
            }
            let parent = dict.get(b"P").unwrap().as_reference().unwrap();
            assert!(parent == root_id || parent.0 < id.0);
            assert!(doc.objects.contains_key(&parent));
        }
    }

    #[test]
    fn test_parent_tree_and_page_flags() {
        let parsed = sample();
        let tree = build_tag_tree(&parsed, &heuristics::plan(&parsed), &[], 400);
        let (mut doc, bindings) = rebuild_pages(&parsed, &tree, 1200).unwrap();
        inject_structure(&mut doc, &tree, &bindings).unwrap();

        let root = struct_root(&doc);
        assert_eq!(root.get(b"ParentTreeNextKey").unwrap().as_i64().unwrap(), 2);
        let parent_tree = doc
            .get_dictionary(root.get(b"ParentTree").unwrap().as_reference().unwrap())
            .unwrap();
        let nums = parent_tree.get(b"Nums").unwrap().as_array().unwrap();
        assert_eq!(nums.len(), 4);
        assert_eq!(nums[0].as_i64().unwrap(), 0);

        for (num, page_id) in doc.get_pages() {
            let page = doc.get_dictionary(page_id).unwrap();
            assert_eq!(page.get(b"Tabs").unwrap().as_name().unwrap(), b"S");
            assert_eq!(
                page.get(b"StructParents").unwrap().as_i64().unwrap(),
                i64::from(num - 1)
            );
        }
        let catalog = doc.catalog().unwrap();
        let mark_info = catalog.get(b"MarkInfo").unwrap().as_dict().unwrap();
        assert!(mark_info.get(b"Marked").unwrap().as_bool().unwrap());
    }

    #[test]
    fn test_table_header_attributes_and_role_map() {
        let mut header = TagNode::new("TH").on_page(1);
        header.scope = Some("Column".to_string());
        let mut custom = TagNode::new("Sidebar").on_page(1);
        custom.alt = Some("Aside".to_string());
        let mut tree = TagNode::new("Document");
        tree.children.push(header);
        tree.children.push(custom);

        let parsed = ParsedDocument::new(1);
        let (mut doc, bindings) = rebuild_pages(&parsed, &TagNode::new("Document"), 1200).unwrap();
        inject_structure(&mut doc, &tree, &bindings).unwrap();

        let root = struct_root(&doc);
        let role_map = root.get(b"RoleMap").unwrap().as_dict().unwrap();
        assert_eq!(role_map.get(b"Sidebar").unwrap().as_name().unwrap(), b"Span");
        assert!(role_map.get(b"TH").is_err());

        let th = doc
            .objects
            .values()
            .filter_map(|o| o.as_dict().ok())
            .find(|d| d.get(b"S").and_then(|s| s.as_name()).ok() == Some(b"TH".as_slice()))
            .unwrap();
        let attrs = th.get(b"A").unwrap().as_dict().unwrap();
        assert_eq!(attrs.get(b"Scope").unwrap().as_name().unwrap(), b"Column");
    }
}
