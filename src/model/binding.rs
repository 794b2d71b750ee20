use serde::{Deserialize, Serialize};

/// Counts describing how well an existing structure tree is bound to content.
///
/// A tree with elements but no binding signal is "unbound": it looks tagged
/// but assistive technology cannot reach the content through it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureBindingSummary {
    pub struct_elem_count: usize,
    pub struct_elem_with_page_ref: usize,
    pub struct_elem_with_mcid: usize,
    pub struct_elem_with_numeric_k: usize,
    pub struct_elem_with_mcr: usize,
    pub has_parent_tree: bool,
    pub has_parent_tree_entries: bool,
    pub table_struct_count: usize,
    pub row_struct_count: usize,
    pub header_cell_struct_count: usize,
    pub data_cell_struct_count: usize,
    pub has_content_binding: bool,
}

impl StructureBindingSummary {
    /// Recompute `has_content_binding` from the counters.
    pub fn finish(mut self) -> Self {
        self.has_content_binding = self.struct_elem_with_mcid > 0
            || self.struct_elem_with_numeric_k > 0
            || self.struct_elem_with_mcr > 0
            || self.has_parent_tree_entries;
        self
    }

    /// Elements exist but none reference content.
    pub fn is_unbound(&self) -> bool {
        self.struct_elem_count > 0 && !self.has_content_binding
    }

    /// Count a structure role toward the table-family counters.
    pub(crate) fn count_role(&mut self, role: &str) {
        match role {
            "Table" => self.table_struct_count += 1,
            "TR" => self.row_struct_count += 1,
            "TH" => self.header_cell_struct_count += 1,
            "TD" => self.data_cell_struct_count += 1,
            _ => {}
        }
    }
}
