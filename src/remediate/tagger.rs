//! Tag tree synthesis.
//!
//! The tree is built from the heuristic plan plus whatever the source already
//! declared, then nested into sections by heading level.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::heuristics::{group_lists, RemediationPlan};
use crate::model::{heading_level, ImageItem, ParsedDocument, Tag};

/// Roles the synthesis always produces itself.
const REGENERATED_ROLES: &[&str] = &[
    "Document", "Part", "Art", "Sect", "H", "H1", "H2", "H3", "H4", "H5", "H6", "L", "LI", "Lbl",
    "LBody", "P", "Span",
];

/// Roles regenerated only when the plan found a table.
const TABLE_ROLES: &[&str] = &["Table", "TR", "TH", "TD", "THead", "TBody", "TFoot"];

/// One node of the synthesized structure tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagNode {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    /// Table header scope (`Column`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Source text items whose content belongs directly to this node
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TagNode>,
}

impl TagNode {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            page: None,
            text: None,
            alt: None,
            scope: None,
            spans: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn on_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_spans(mut self, spans: Vec<usize>) -> Self {
        self.spans = spans;
        self
    }

    /// Level of an `H1`..`H6` node.
    pub fn heading_level(&self) -> Option<u8> {
        heading_level(&self.role)
    }

    /// All nodes, parents before children.
    pub fn preorder(&self) -> Vec<&TagNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Number of nodes with the given role.
    pub fn count(&self, role: &str) -> usize {
        self.preorder().iter().filter(|n| n.role == role).count()
    }

    /// Number of nodes below the root.
    pub fn descendant_count(&self) -> usize {
        self.preorder().len() - 1
    }

    fn to_tag(&self) -> Tag {
        Tag {
            kind: self.role.clone(),
            page: self.page,
            text: self.text.clone(),
            alt: self.alt.clone(),
            scope: self.scope.clone(),
        }
    }

    /// Flat record of the structurally significant nodes, for the manifest.
    pub fn skeleton(&self, limit: usize) -> Vec<Tag> {
        self.preorder()
            .into_iter()
            .filter(|n| is_skeleton_role(&n.role))
            .take(limit)
            .map(TagNode::to_tag)
            .collect()
    }
}

/// Roles worth recording when a tree is summarized.
pub fn is_skeleton_role(role: &str) -> bool {
    heading_level(role).is_some() || matches!(role, "L" | "Table" | "TR" | "Figure")
}

/// Placement of a top-level node: page, then position within the page.
type OrderKey = (u32, i64, usize);

/// Build the full tag tree for a document.
///
/// `images` are the already-normalized images; each non-decorative one
/// becomes a `Figure` carrying its alternate text.
pub fn build_tag_tree(
    doc: &ParsedDocument,
    plan: &RemediationPlan,
    images: &[ImageItem],
    max_paragraphs: usize,
) -> TagNode {
    let ranks = plan.ranks();
    let rank_of = |idx: usize| ranks.get(&idx).map(|r| *r as i64 * 2).unwrap_or(i64::MAX / 2);
    let mut placed: Vec<(OrderKey, TagNode)> = Vec::new();
    let mut seq = 0usize;
    let mut place = |placed: &mut Vec<(OrderKey, TagNode)>, page: u32, pos: i64, node: TagNode| {
        placed.push(((page, pos, seq), node));
        seq += 1;
    };

    let mut regenerated: HashSet<&str> = REGENERATED_ROLES.iter().copied().collect();
    if !plan.tables.is_empty() {
        regenerated.extend(TABLE_ROLES.iter().copied());
    }
    if !images.is_empty() {
        regenerated.insert("Figure");
    }
    for tag in doc.tags.iter().filter(|t| !regenerated.contains(t.kind.as_str())) {
        let node = TagNode {
            role: tag.kind.clone(),
            page: tag.page,
            text: tag.text.clone(),
            alt: tag.alt.clone(),
            scope: tag.scope.clone(),
            spans: Vec::new(),
            children: Vec::new(),
        };
        place(&mut placed, tag.page.unwrap_or(1), -1, node);
    }

    for heading in &plan.headings {
        let node = TagNode::new(format!("H{}", heading.level.clamp(1, 6)))
            .on_page(heading.page)
            .with_text(heading.text.clone())
            .with_spans(vec![heading.item]);
        place(&mut placed, heading.page, rank_of(heading.item), node);
    }

    for group in group_lists(&plan.list_items) {
        let Some(first) = group.first() else { continue };
        let mut list = TagNode::new("L").on_page(first.page);
        for entry in &group {
            let mut li = TagNode::new("LI").on_page(entry.page);
            li.children.push(TagNode::new("Lbl").on_page(entry.page).with_text(entry.marker.clone()));
            li.children.push(
                TagNode::new("LBody")
                    .on_page(entry.page)
                    .with_text(entry.body.clone())
                    .with_spans(vec![entry.item]),
            );
            list.children.push(li);
        }
        place(&mut placed, first.page, rank_of(first.item), list);
    }

    for detected in &plan.tables {
        let mut table = TagNode::new("Table").on_page(detected.page);
        for row in &detected.rows {
            let mut tr = TagNode::new("TR").on_page(detected.page);
            for cell in &row.cells {
                let mut node = TagNode::new(if cell.header { "TH" } else { "TD" })
                    .on_page(detected.page)
                    .with_text(cell.text.clone())
                    .with_spans(vec![cell.item]);
                if cell.header {
                    node.scope = Some("Column".to_string());
                }
                tr.children.push(node);
            }
            table.children.push(tr);
        }
        let pos = detected.items().map(&rank_of).min().unwrap_or(i64::MAX / 2);
        place(&mut placed, detected.page, pos, table);
    }

    for run in plan.paragraphs.iter().take(max_paragraphs) {
        let pos = run.items.first().map(|&i| rank_of(i)).unwrap_or(i64::MAX / 2);
        let node = TagNode::new("P")
            .on_page(run.page)
            .with_text(run.text.clone())
            .with_spans(run.items.clone());
        place(&mut placed, run.page, pos, node);
    }

    for image in images.iter().filter(|i| !i.is_decorative()) {
        let mut node = TagNode::new("Figure").on_page(image.page);
        node.alt = image.alt_text().map(str::to_string);
        let pos = figure_position(doc, &ranks, image);
        place(&mut placed, image.page, pos, node);
    }

    placed.sort_by_key(|(key, _)| *key);
    nest_sections(placed.into_iter().map(|(_, node)| node))
}

/// Just before the first item that starts below the image's top edge.
fn figure_position(doc: &ParsedDocument, ranks: &HashMap<usize, usize>, image: &ImageItem) -> i64 {
    let top = image.y + image.height;
    doc.text_items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.page == image.page && item.y <= top)
        .filter_map(|(idx, _)| ranks.get(&idx))
        .min()
        .map(|r| *r as i64 * 2 - 1)
        .unwrap_or(i64::MAX / 2)
}

/// Nest nodes into `Sect` elements under a `Document` root.
///
/// A heading closes every open section at its level or deeper, then opens a
/// new one. Anything else lands in the innermost open section.
pub fn nest_sections(nodes: impl IntoIterator<Item = TagNode>) -> TagNode {
    let mut root = TagNode::new("Document");
    let mut open: Vec<(u8, TagNode)> = Vec::new();

    fn close(open: &mut Vec<(u8, TagNode)>, root: &mut TagNode) {
        if let Some((_, section)) = open.pop() {
            match open.last_mut() {
                Some((_, parent)) => parent.children.push(section),
                None => root.children.push(section),
            }
        }
    }

    for node in nodes {
        match node.heading_level() {
            Some(level) => {
                while open.last().map_or(false, |(l, _)| *l >= level) {
                    close(&mut open, &mut root);
                }
                let mut section = TagNode::new("Sect");
                section.page = node.page;
                section.children.push(node);
                open.push((level, section));
            }
            None => match open.last_mut() {
                Some((_, section)) => section.children.push(node),
                None => root.children.push(node),
            },
        }
    }
    while !open.is_empty() {
        close(&mut open, &mut root);
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics;
    use crate::model::TextItem;

    fn heading(level: u8) -> TagNode {
        TagNode::new(format!("H{}", level))
    }

    #[test]
    fn test_nest_sections() {
        let nodes = vec![
            TagNode::new("P"),
            heading(1),
            TagNode::new("P"),
            heading(2),
            TagNode::new("L"),
            heading(2),
            heading(1),
        ];
        let root = nest_sections(nodes);

        let roles: Vec<&str> = root.children.iter().map(|n| n.role.as_str()).collect();
        assert_eq!(roles, vec!["P", "Sect", "Sect"]);

        let first = &root.children[1];
        let roles: Vec<&str> = first.children.iter().map(|n| n.role.as_str()).collect();
        assert_eq!(roles, vec!["H1", "P", "Sect", "Sect"]);
        assert_eq!(first.children[2].children[1].role, "L");
        assert_eq!(root.count("Sect"), 4);
    }

    #[test]
    fn test_empty_tree_has_document_root() {
        let root = nest_sections(Vec::new());
        assert_eq!(root.role, "Document");
        assert!(root.children.is_empty());
        assert_eq!(root.descendant_count(), 0);
    }

    fn sample() -> ParsedDocument {
        let mut doc = ParsedDocument::new(1);
        doc.text_items = vec![
            TextItem::new("Quarterly Summary", 72.0, 740.0, 22.0, 1),
            TextItem::new("Revenue grew in every region this quarter.", 72.0, 700.0, 11.0, 1),
            TextItem::new("• Expand sales", 72.0, 650.0, 11.0, 1),
            TextItem::new("• Hire staff", 72.0, 636.0, 11.0, 1),
            TextItem::new("Region", 72.0, 600.0, 11.0, 1),
            TextItem::new("Sales", 300.0, 600.0, 11.0, 1),
            TextItem::new("North", 72.0, 586.0, 11.0, 1),
            TextItem::new("120", 300.0, 586.0, 11.0, 1),
        ];
        doc
    }

    #[test]
    fn test_build_tag_tree_orders_by_reading_position() {
        let doc = sample();
        let plan = heuristics::plan(&doc);
        let tree = build_tag_tree(&doc, &plan, &[], 400);

        assert_eq!(tree.children.len(), 1);
        let section = &tree.children[0];
        let roles: Vec<&str> = section.children.iter().map(|n| n.role.as_str()).collect();
        assert_eq!(roles, vec!["H1", "P", "L", "Table"]);

        let list = &section.children[2];
        assert_eq!(list.children.len(), 2);
        assert_eq!(list.children[0].children[0].text.as_deref(), Some("•"));
        assert_eq!(list.children[0].children[1].spans, vec![2]);

        let table = &section.children[3];
        assert_eq!(table.children.len(), 2);
        assert_eq!(table.children[0].children[0].role, "TH");
        assert_eq!(table.children[0].children[0].scope.as_deref(), Some("Column"));
        assert_eq!(table.children[1].children[0].role, "TD");
    }

    #[test]
    fn test_source_tags_kept_unless_regenerated() {
        let mut doc = sample();
        doc.tags = vec![
            Tag::new("H1", Some(1)),
            Tag::new("Link", Some(1)),
            Tag::new("LI", Some(1)),
        ];
        let plan = heuristics::plan(&doc);
        let tree = build_tag_tree(&doc, &plan, &[], 400);

        assert_eq!(tree.count("Link"), 1);
        assert_eq!(tree.count("H1"), 1);
        assert_eq!(tree.count("LI"), 2);
        // Source tags lead their page.
        assert_eq!(tree.children[0].role, "Link");
    }

    #[test]
    fn test_figures_placed_before_following_text() {
        let doc = sample();
        let plan = heuristics::plan(&doc);
        let image = ImageItem::new("img-1-1", 1, 72.0, 660.0, 200.0, 30.0).with_alt("Sales chart");
        let tree = build_tag_tree(&doc, &plan, &[image], 400);

        let section = &tree.children[0];
        let roles: Vec<&str> = section.children.iter().map(|n| n.role.as_str()).collect();
        assert_eq!(roles, vec!["H1", "P", "Figure", "L", "Table"]);
        assert_eq!(section.children[2].alt.as_deref(), Some("Sales chart"));
    }

    #[test]
    fn test_paragraph_cap() {
        let mut doc = ParsedDocument::new(3);
        for page in 1..=3 {
            doc.text_items.push(TextItem::new(
                format!("Paragraph text on page {} that is long enough.", page),
                72.0,
                500.0 - page as f32 * 20.0,
                11.0,
                page,
            ));
        }
        let plan = heuristics::plan(&doc);
        let tree = build_tag_tree(&doc, &plan, &[], 2);
        assert_eq!(tree.count("P"), 2);
    }

    #[test]
    fn test_skeleton_lists_structural_nodes() {
        let doc = sample();
        let plan = heuristics::plan(&doc);
        let tree = build_tag_tree(&doc, &plan, &[], 400);
        let kinds: Vec<String> = tree.skeleton(500).into_iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec!["H1", "L", "Table", "TR", "TR"]);
    }
}
