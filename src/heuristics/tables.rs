//! Table detection from text alignment.
//!
//! Items sharing a baseline form a row, and x positions that recur across
//! rows form columns. No ruling lines are consulted, so the detector is
//! deliberately strict about needing several aligned rows.

use std::collections::BTreeMap;

use crate::model::TextItem;

/// A table found on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedTable {
    pub page: u32,
    /// Column anchor x positions, left to right
    pub columns: Vec<f32>,
    /// Rows top to bottom
    pub rows: Vec<DetectedRow>,
}

impl DetectedTable {
    /// Every source item index the table claims.
    pub fn items(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows.iter().flat_map(|r| r.cells.iter().map(|c| c.item))
    }

    /// Number of header cells.
    pub fn header_count(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|r| r.cells.iter())
            .filter(|c| c.header)
            .count()
    }
}

/// A row of cells sharing a baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedRow {
    pub y: f32,
    /// Cells sorted by x
    pub cells: Vec<DetectedCell>,
}

/// One cell, backed by one text item.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedCell {
    pub text: String,
    pub item: usize,
    /// Column index into [`DetectedTable::columns`]
    pub column: usize,
    /// Header cell (first row, or bold text)
    pub header: bool,
}

/// Table detector configuration.
#[derive(Debug, Clone)]
pub struct TableDetectorConfig {
    /// Minimum rows with at least `min_columns` items
    pub min_rows: usize,
    /// Minimum distinct columns
    pub min_columns: usize,
    /// Baseline tolerance for grouping items into rows (points)
    pub row_tolerance: f32,
    /// X tolerance for clustering cells into columns (points)
    pub column_tolerance: f32,
}

impl Default for TableDetectorConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_columns: 2,
            row_tolerance: 3.0,
            column_tolerance: 20.0,
        }
    }
}

/// Detects tables among positioned text items.
#[derive(Debug, Clone, Default)]
pub struct TableDetector {
    config: TableDetectorConfig,
}

impl TableDetector {
    /// Create a detector with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detector with custom configuration.
    pub fn with_config(config: TableDetectorConfig) -> Self {
        Self { config }
    }

    /// Detect at most one table per page among `candidates` (indices into `items`).
    pub fn detect(&self, items: &[TextItem], candidates: &[usize]) -> Vec<DetectedTable> {
        let mut by_page: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for &idx in candidates {
            if let Some(item) = items.get(idx) {
                by_page.entry(item.page).or_default().push(idx);
            }
        }

        by_page
            .into_iter()
            .filter_map(|(page, indices)| self.detect_page(items, page, indices))
            .collect()
    }

    fn detect_page(&self, items: &[TextItem], page: u32, indices: Vec<usize>) -> Option<DetectedTable> {
        log::debug!("TableDetector: page {} with {} items", page, indices.len());

        let rows: Vec<(f32, Vec<usize>)> = self
            .group_into_rows(items, indices)
            .into_iter()
            .filter(|(_, row)| row.len() >= self.config.min_columns)
            .collect();
        if rows.len() < self.config.min_rows {
            log::debug!(
                "TableDetector: not enough multi-item rows ({} < {})",
                rows.len(),
                self.config.min_rows
            );
            return None;
        }

        let columns = self.cluster_columns(items, &rows);
        log::debug!(
            "TableDetector: {} rows, columns at {:?}",
            rows.len(),
            columns
        );
        if columns.len() < self.config.min_columns {
            return None;
        }

        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(row_index, (y, row))| DetectedRow {
                y,
                cells: row
                    .into_iter()
                    .map(|idx| {
                        let item = &items[idx];
                        DetectedCell {
                            text: item.text.trim().to_string(),
                            item: idx,
                            column: nearest(&columns, item.x),
                            header: row_index == 0 || item.is_bold(),
                        }
                    })
                    .collect(),
            })
            .collect();

        Some(DetectedTable {
            page,
            columns,
            rows,
        })
    }

    /// Group items into rows by baseline, top to bottom, cells left to right.
    fn group_into_rows(&self, items: &[TextItem], mut indices: Vec<usize>) -> Vec<(f32, Vec<usize>)> {
        indices.sort_by(|&a, &b| items[b].y.total_cmp(&items[a].y));

        let mut rows: Vec<(f32, Vec<usize>)> = Vec::new();
        for idx in indices {
            let y = items[idx].y;
            match rows.last_mut() {
                Some((row_y, row)) if (*row_y - y).abs() <= self.config.row_tolerance => {
                    row.push(idx)
                }
                _ => rows.push((y, vec![idx])),
            }
        }
        for (_, row) in &mut rows {
            row.sort_by(|&a, &b| items[a].x.total_cmp(&items[b].x));
        }
        rows
    }

    /// Cluster the x positions of every cell; each cluster is a column.
    fn cluster_columns(&self, items: &[TextItem], rows: &[(f32, Vec<usize>)]) -> Vec<f32> {
        let mut xs: Vec<f32> = rows
            .iter()
            .flat_map(|(_, row)| row.iter().map(|&idx| items[idx].x))
            .collect();
        xs.sort_by(f32::total_cmp);

        let mut clusters: Vec<(f32, usize)> = Vec::new();
        for x in xs {
            match clusters.last_mut() {
                Some((sum, count)) if x - *sum / *count as f32 <= self.config.column_tolerance => {
                    *sum += x;
                    *count += 1;
                }
                _ => clusters.push((x, 1)),
            }
        }
        clusters
            .into_iter()
            .map(|(sum, count)| sum / count as f32)
            .collect()
    }
}

fn nearest(columns: &[f32], x: f32) -> usize {
    columns
        .iter()
        .enumerate()
        .min_by(|a, b| (a.1 - x).abs().total_cmp(&(b.1 - x).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Detect tables with the default configuration.
pub fn detect_tables(items: &[TextItem], candidates: &[usize]) -> Vec<DetectedTable> {
    TableDetector::new().detect(items, candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(text: &str, x: f32, y: f32) -> TextItem {
        TextItem::new(text, x, y, 10.0, 1)
    }

    fn grid() -> Vec<TextItem> {
        vec![
            cell("Name", 72.0, 700.0),
            cell("Qty", 250.0, 700.5),
            cell("Apples", 72.0, 680.0),
            cell("4", 252.0, 680.0),
            cell("Pears", 73.0, 660.0),
            cell("10", 251.0, 659.0),
            cell("Totals are shown above.", 72.0, 620.0),
        ]
    }

    #[test]
    fn test_detects_grid() {
        let items = grid();
        let all: Vec<usize> = (0..items.len()).collect();
        let tables = detect_tables(&items, &all);

        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.header_count(), 2);
        assert_eq!(table.rows[1].cells[1].text, "4");
        assert_eq!(table.rows[1].cells[1].column, 1);
        // The trailing sentence sits alone on its row.
        assert!(!table.items().any(|i| i == 6));
    }

    #[test]
    fn test_single_row_is_not_table() {
        let items = vec![cell("A", 72.0, 700.0), cell("B", 300.0, 700.0), cell("C", 72.0, 600.0)];
        assert!(detect_tables(&items, &[0, 1, 2]).is_empty());
    }

    #[test]
    fn test_single_column_is_not_table() {
        let items = vec![
            cell("A", 72.0, 700.0),
            cell("B", 80.0, 700.0),
            cell("C", 72.0, 680.0),
            cell("D", 82.0, 680.0),
        ];
        assert!(detect_tables(&items, &[0, 1, 2, 3]).is_empty());
    }

    #[test]
    fn test_bold_cells_are_headers() {
        let mut items = grid();
        items[2] = cell("Apples", 72.0, 680.0).with_font("Helvetica-Bold");
        let tables = detect_tables(&items, &[0, 1, 2, 3, 4, 5]);
        assert_eq!(tables[0].header_count(), 3);
    }

    #[test]
    fn test_respects_candidates() {
        let items = grid();
        assert!(detect_tables(&items, &[0, 1]).is_empty());
    }
}
