//! List item detection from leading markers.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::TextItem;

/// Bullet, dash, asterisk, `1.`/`1)` or `a.`/`a)` followed by whitespace.
pub(crate) static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([•\-*]|\d+[.)]|[a-zA-Z][.)])\s+").unwrap());

/// A text item that starts with a list marker.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedListItem {
    /// The marker as written (`•`, `2.`, `b)`)
    pub marker: String,
    /// Text after the marker
    pub body: String,
    pub page: u32,
    pub item: usize,
}

/// Split a line into its list marker and body.
pub fn split_marker(text: &str) -> Option<(String, String)> {
    let text = text.trim_start();
    let caps = LIST_MARKER.captures(text)?;
    let whole = caps.get(0)?;
    let marker = caps.get(1)?.as_str().to_string();
    Some((marker, text[whole.end()..].trim_end().to_string()))
}

/// Detect list items among `candidates` (indices into `items`).
pub fn detect_list_items(items: &[TextItem], candidates: &[usize]) -> Vec<DetectedListItem> {
    candidates
        .iter()
        .filter_map(|&idx| {
            let item = items.get(idx)?;
            let (marker, body) = split_marker(&item.text)?;
            Some(DetectedListItem {
                marker,
                body,
                page: item.page,
                item: idx,
            })
        })
        .collect()
}

/// Group list items into lists. A new list starts when the page jumps by
/// more than one.
pub fn group_lists(list_items: &[DetectedListItem]) -> Vec<Vec<DetectedListItem>> {
    let mut groups: Vec<Vec<DetectedListItem>> = Vec::new();
    for entry in list_items {
        match groups.last_mut() {
            Some(group)
                if group
                    .last()
                    .map(|prev| entry.page.saturating_sub(prev.page) <= 1)
                    .unwrap_or(false) =>
            {
                group.push(entry.clone())
            }
            _ => groups.push(vec![entry.clone()]),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_marker() {
        assert_eq!(
            split_marker("• Apples"),
            Some(("•".to_string(), "Apples".to_string()))
        );
        assert_eq!(
            split_marker("12) Twelfth"),
            Some(("12)".to_string(), "Twelfth".to_string()))
        );
        assert_eq!(
            split_marker("b. Second"),
            Some(("b.".to_string(), "Second".to_string()))
        );
        assert_eq!(split_marker("-not a list"), None);
        assert_eq!(split_marker("Plain sentence."), None);
        assert_eq!(split_marker("3.14 is pi"), None);
    }

    #[test]
    fn test_detect_and_group() {
        let items = vec![
            TextItem::new("- one", 72.0, 700.0, 11.0, 1),
            TextItem::new("Paragraph", 72.0, 680.0, 11.0, 1),
            TextItem::new("- two", 72.0, 660.0, 11.0, 2),
            TextItem::new("1. three", 72.0, 700.0, 11.0, 5),
        ];
        let found = detect_list_items(&items, &[0, 1, 2, 3]);
        assert_eq!(found.len(), 3);
        assert_eq!(found[2].body, "three");

        let groups = group_lists(&found);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1][0].page, 5);
    }
}
