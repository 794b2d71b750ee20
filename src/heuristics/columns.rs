//! Multi-column reading order.

use crate::model::{PageSize, TextItem};

/// X tolerance when clustering left edges.
const CLUSTER_TOLERANCE: f32 = 20.0;
/// A gap wider than this fraction of the page width separates columns.
const GAP_FRACTION: f32 = 0.15;
/// Share of the page's items a cluster needs before it counts as a column.
const MIN_CLUSTER_SHARE: f32 = 0.1;

/// Reorder the items of one page (indices into `items`) for reading.
///
/// When the left edges fall into two bands separated by a wide gap, the left
/// band is read top to bottom before the right band. Otherwise the
/// extraction order is returned unchanged.
pub fn reading_order(items: &[TextItem], page_items: &[usize], page: PageSize) -> Vec<usize> {
    order_by_split(items, page_items, column_split(items, page_items, page))
}

/// Order items around a known column split, or keep extraction order.
pub fn order_by_split(items: &[TextItem], page_items: &[usize], split: Option<f32>) -> Vec<usize> {
    let Some(split) = split else {
        return page_items.to_vec();
    };
    log::debug!("Column split at x={:.1}", split);

    let top_down = |a: &usize, b: &usize| {
        items[*b]
            .y
            .total_cmp(&items[*a].y)
            .then(items[*a].x.total_cmp(&items[*b].x))
    };
    let (mut left, mut right): (Vec<usize>, Vec<usize>) =
        page_items.iter().copied().partition(|&idx| items[idx].x < split);
    left.sort_by(top_down);
    right.sort_by(top_down);
    left.extend(right);
    left
}

/// The x coordinate separating two columns, if the page has them.
pub fn column_split(items: &[TextItem], page_items: &[usize], page: PageSize) -> Option<f32> {
    let mut xs: Vec<f32> = page_items.iter().filter_map(|&i| items.get(i)).map(|t| t.x).collect();
    if xs.len() < 2 {
        return None;
    }
    xs.sort_by(f32::total_cmp);

    let mut clusters: Vec<(f32, usize)> = Vec::new();
    for x in &xs {
        match clusters.last_mut() {
            Some((sum, count)) if x - *sum / *count as f32 <= CLUSTER_TOLERANCE => {
                *sum += x;
                *count += 1;
            }
            _ => clusters.push((*x, 1)),
        }
    }

    // Isolated runs such as a centered title do not make a column.
    let min_support = ((xs.len() as f32 * MIN_CLUSTER_SHARE).ceil() as usize).max(2);
    let centers: Vec<f32> = clusters
        .into_iter()
        .filter(|(_, count)| *count >= min_support)
        .map(|(sum, count)| sum / count as f32)
        .collect();
    if centers.len() < 2 {
        return None;
    }

    let (gap, left) = centers
        .windows(2)
        .map(|w| (w[1] - w[0], w[0]))
        .max_by(|a, b| a.0.total_cmp(&b.0))?;
    (gap > page.width * GAP_FRACTION).then_some(left + gap / 2.0)
}
