//! Paragraph assembly from leftover text runs.

use crate::model::TextItem;

/// Consecutive runs on one page merged into a paragraph.
#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphRun {
    pub text: String,
    pub page: u32,
    /// Source item indices in reading order
    pub items: Vec<usize>,
}

/// Merge `ordered` items (indices into `items`, already in reading order)
/// into paragraphs. A run joins the previous paragraph when it is on the same
/// page and no more than two line heights below it.
pub fn merge_paragraphs(items: &[TextItem], ordered: &[usize]) -> Vec<ParagraphRun> {
    let mut runs: Vec<ParagraphRun> = Vec::new();
    let mut last_y = 0.0f32;

    for &idx in ordered {
        let Some(item) = items.get(idx) else { continue };
        let text = item.text.trim();
        if text.is_empty() {
            continue;
        }
        let limit = item.font_size.max(1.0) * 2.0;

        match runs.last_mut() {
            Some(run) if run.page == item.page && (last_y - item.y).abs() <= limit => {
                run.text.push(' ');
                run.text.push_str(text);
                run.items.push(idx);
            }
            _ => runs.push(ParagraphRun {
                text: text.to_string(),
                page: item.page,
                items: vec![idx],
            }),
        }
        last_y = item.y;
    }
    runs
}
