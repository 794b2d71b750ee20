//! Structural inference from positional and typographic signal.
//!
//! Every detector works on indices into [`ParsedDocument::text_items`], so
//! the synthesized structure can point back at the runs it came from.

mod artifacts;
mod columns;
mod headings;
mod lists;
mod paragraphs;
mod tables;

use std::collections::{BTreeMap, HashMap, HashSet};

pub use artifacts::{detect_artifacts, is_page_number, ArtifactItem, ArtifactReason};
pub use columns::{column_split, order_by_split, reading_order};
pub use headings::{
    body_font_size, detect_headings, heading_score, is_plausible_heading, normalize_levels,
    DetectedHeading,
};
pub use lists::{detect_list_items, group_lists, split_marker, DetectedListItem};
pub use paragraphs::{merge_paragraphs, ParagraphRun};
pub use tables::{
    detect_tables, DetectedCell, DetectedRow, DetectedTable, TableDetector, TableDetectorConfig,
};

pub(crate) use lists::LIST_MARKER;

use crate::model::ParsedDocument;

/// Everything the detectors inferred about one document.
#[derive(Debug, Clone, Default)]
pub struct RemediationPlan {
    /// All item indices in reading order
    pub reading_order: Vec<usize>,
    /// Pagination furniture excluded from tagging
    pub artifacts: Vec<ArtifactItem>,
    pub headings: Vec<DetectedHeading>,
    pub list_items: Vec<DetectedListItem>,
    pub tables: Vec<DetectedTable>,
    /// Leftover runs merged into paragraphs
    pub paragraphs: Vec<ParagraphRun>,
}

impl RemediationPlan {
    /// Position of each item index in the reading order.
    pub fn ranks(&self) -> HashMap<usize, usize> {
        self.reading_order
            .iter()
            .enumerate()
            .map(|(rank, &idx)| (idx, rank))
            .collect()
    }

    /// Whether an item was classified as an artifact.
    pub fn is_artifact(&self, idx: usize) -> bool {
        self.artifacts.iter().any(|a| a.item == idx)
    }
}

/// Reading order across all pages. Items in `ignored` (table cells,
/// artifacts) still get a position but do not vote on the column split.
fn document_order(doc: &ParsedDocument, ignored: &HashSet<usize>) -> Vec<usize> {
    let mut by_page: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (idx, item) in doc.text_items.iter().enumerate() {
        by_page.entry(item.page).or_default().push(idx);
    }

    by_page
        .into_iter()
        .flat_map(|(page, indices)| {
            let voters: Vec<usize> = indices
                .iter()
                .copied()
                .filter(|idx| !ignored.contains(idx))
                .collect();
            let split = column_split(&doc.text_items, &voters, doc.page_size(page));
            order_by_split(&doc.text_items, &indices, split)
        })
        .collect()
}

/// Run every detector over the document.
///
/// Artifacts are removed first. Table cells are claimed next, then list
/// items, then headings. Whatever is left becomes paragraphs.
pub fn plan(doc: &ParsedDocument) -> RemediationPlan {
    let items = &doc.text_items;
    let artifacts = detect_artifacts(doc);
    let mut ignored: HashSet<usize> = artifacts.iter().map(|a| a.item).collect();

    let eligible: Vec<usize> = (0..items.len()).filter(|idx| !ignored.contains(idx)).collect();
    let tables = detect_tables(items, &eligible);
    let claimed: HashSet<usize> = tables.iter().flat_map(|t| t.items()).collect();
    ignored.extend(claimed.iter().copied());

    let reading_order = document_order(doc, &ignored);
    let mut remaining: Vec<usize> = reading_order
        .iter()
        .copied()
        .filter(|idx| !ignored.contains(idx))
        .collect();

    let list_items = detect_list_items(items, &remaining);
    let claimed: HashSet<usize> = list_items.iter().map(|l| l.item).collect();
    remaining.retain(|idx| !claimed.contains(idx));

    let headings = detect_headings(items, &remaining);
    let claimed: HashSet<usize> = headings.iter().map(|h| h.item).collect();
    // Duplicate headings dropped by detection are not body text either.
    remaining.retain(|idx| {
        !claimed.contains(idx)
            && !headings.iter().any(|h| {
                h.page == items[*idx].page && h.text == items[*idx].text.trim()
            })
    });

    let paragraphs = merge_paragraphs(items, &remaining);

    log::debug!(
        "Plan: {} artifacts, {} tables, {} list items, {} headings, {} paragraphs",
        artifacts.len(),
        tables.len(),
        list_items.len(),
        headings.len(),
        paragraphs.len()
    );

    RemediationPlan {
        reading_order,
        artifacts,
        headings,
        list_items,
        tables,
        paragraphs,
    }
}
