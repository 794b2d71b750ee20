//! Per-field normalization of links, form fields, images and outlines.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::audit::GENERIC_LINK;
use crate::heuristics::{RemediationPlan, LIST_MARKER};
use crate::model::{FormField, ImageItem, Link, OutlineEntry, ParsedDocument};

/// Shortest text run considered a usable image description.
const MIN_ALT_SOURCE_CHARS: usize = 12;
const MAX_ALT_CHARS: usize = 160;
const MAX_OUTLINE_ENTRIES: usize = 200;

static INTERNAL_PAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#page-(\d+)$").unwrap());
static ARRAY_INDEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+\]").unwrap());

/// Normalized values the builder writes back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedContent {
    pub links: Vec<Link>,
    pub forms: Vec<FormField>,
    pub images: Vec<ImageItem>,
    pub outlines: Vec<OutlineEntry>,
}

/// Normalize every field the builder touches.
pub fn normalize(doc: &ParsedDocument, plan: &RemediationPlan) -> NormalizedContent {
    NormalizedContent {
        links: doc.links.iter().map(normalize_link).collect(),
        forms: doc.forms.iter().map(normalize_form).collect(),
        images: doc.images.iter().map(|image| normalize_image(doc, image)).collect(),
        outlines: synthesize_outline(doc, plan),
    }
}

/// Whether link text says nothing about its destination.
pub fn is_generic_link_text(link: &Link) -> bool {
    let text = link.text.trim();
    text.is_empty() || GENERIC_LINK.is_match(text) || text == link.url.trim()
}

/// Descriptive text for a link destination.
pub fn describe_destination(url: &str) -> String {
    let url = url.trim();
    if let Some(caps) = INTERNAL_PAGE.captures(url) {
        return format!("Go to page {}", &caps[1]);
    }
    if let Some(address) = url.strip_prefix("mailto:") {
        return format!("Email {}", address.split('?').next().unwrap_or(address));
    }

    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let host = &rest[..end];
    let segment = rest[end..]
        .split(['?', '#'])
        .next()
        .unwrap_or("")
        .split('/')
        .find(|s| !s.is_empty());

    match (host.is_empty(), segment) {
        (true, _) => "Visit link".to_string(),
        (false, Some(segment)) => format!("Visit {}/{}", host, segment),
        (false, None) => format!("Visit {}", host),
    }
}

fn normalize_link(link: &Link) -> Link {
    let mut link = link.clone();
    if is_generic_link_text(&link) {
        link.text = describe_destination(&link.url);
    }
    link
}

/// Readable label from a field name: `contact.first_name` becomes "First name".
pub fn humanize_field_name(name: &str) -> String {
    let stripped = ARRAY_INDEX.replace_all(name, "");
    let last = stripped
        .rsplit('.')
        .find(|s| !s.trim().is_empty())
        .unwrap_or("");

    let mut words = String::new();
    let mut prev_lower = false;
    for c in last.chars() {
        if c == '_' || c == '-' || c.is_whitespace() {
            words.push(' ');
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower {
            words.push(' ');
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        words.extend(c.to_lowercase());
    }

    let words = words.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Form field".to_string(),
    }
}

fn normalize_form(field: &FormField) -> FormField {
    let mut field = field.clone();
    if field.label_text().is_none() {
        field.label = Some(humanize_field_name(&field.name));
    }
    field
}

/// Alternate text from the closest descriptive run on the same page.
///
/// Distance is vertical offset plus half the horizontal offset from the
/// image centre, so text directly above or below wins over text beside it.
pub fn infer_alt_text(doc: &ParsedDocument, image: &ImageItem) -> String {
    let cx = image.x + image.width / 2.0;
    let cy = image.y + image.height / 2.0;

    doc.text_on_page(image.page)
        .filter(|item| {
            let text = item.text.trim();
            text.chars().count() >= MIN_ALT_SOURCE_CHARS && !LIST_MARKER.is_match(text)
        })
        .map(|item| ((item.y - cy).abs() + 0.5 * (item.x - cx).abs(), item))
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, item)| item.text.trim().chars().take(MAX_ALT_CHARS).collect())
        .unwrap_or_else(|| format!("Image on page {}", image.page))
}

fn normalize_image(doc: &ParsedDocument, image: &ImageItem) -> ImageItem {
    let mut image = image.clone();
    if !image.is_decorative() && image.alt_text().is_none() {
        image.alt = Some(infer_alt_text(doc, &image));
    }
    image
}

/// Existing outline, or one entry per detected heading.
pub fn synthesize_outline(doc: &ParsedDocument, plan: &RemediationPlan) -> Vec<OutlineEntry> {
    if !doc.outlines.is_empty() {
        return doc.outlines.clone();
    }
    plan.headings
        .iter()
        .take(MAX_OUTLINE_ENTRIES)
        .map(|h| OutlineEntry::new(h.text.clone(), h.page))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics;
    use crate::model::TextItem;

    #[test]
    fn test_describe_destination() {
        assert_eq!(
            describe_destination("https://example.com/docs/guide?x=1"),
            "Visit example.com/docs"
        );
        assert_eq!(describe_destination("http://example.org"), "Visit example.org");
        assert_eq!(describe_destination("#page-4"), "Go to page 4");
        assert_eq!(describe_destination("mailto:help@example.com"), "Email help@example.com");
    }

    #[test]
    fn test_generic_link_text_rewritten() {
        let links = [
            Link::new("Click here", "https://example.com/a", 1),
            Link::new("https://example.com/a", "https://example.com/a", 1),
            Link::new("", "https://example.com/a", 1),
            Link::new("Pricing details", "https://example.com/a", 1),
        ];
        let texts: Vec<String> = links.iter().map(|l| normalize_link(l).text).collect();
        assert_eq!(
            texts,
            vec![
                "Visit example.com/a",
                "Visit example.com/a",
                "Visit example.com/a",
                "Pricing details"
            ]
        );
    }

    #[test]
    fn test_humanize_field_name() {
        assert_eq!(humanize_field_name("first_name"), "First name");
        assert_eq!(humanize_field_name("contact.emailAddress"), "Email address");
        assert_eq!(humanize_field_name("form1[0].zip-code[0]"), "Zip code");
        assert_eq!(humanize_field_name(""), "Form field");
    }

    #[test]
    fn test_form_label_kept_when_present() {
        let mut field = FormField::new("dob");
        field.label = Some("Date of birth".into());
        assert_eq!(normalize_form(&field).label.as_deref(), Some("Date of birth"));
        assert_eq!(normalize_form(&FormField::new("dob")).label.as_deref(), Some("Dob"));
    }

    #[test]
    fn test_infer_alt_prefers_vertical_neighbour() {
        let mut doc = ParsedDocument::new(1);
        doc.text_items = vec![
            TextItem::new("Figure 1: Revenue by region", 100.0, 380.0, 10.0, 1),
            TextItem::new("Sidebar note far to the right", 500.0, 450.0, 10.0, 1),
            TextItem::new("• A list entry near the image", 100.0, 400.0, 10.0, 1),
            TextItem::new("Short", 100.0, 440.0, 10.0, 1),
        ];
        let image = ImageItem::new("img-1-1", 1, 100.0, 400.0, 200.0, 100.0);
        assert_eq!(infer_alt_text(&doc, &image), "Figure 1: Revenue by region");
    }

    #[test]
    fn test_infer_alt_fallback() {
        let doc = ParsedDocument::new(2);
        let image = ImageItem::new("img-2-1", 2, 0.0, 0.0, 10.0, 10.0);
        assert_eq!(infer_alt_text(&doc, &image), "Image on page 2");
    }

    #[test]
    fn test_outline_from_headings() {
        let mut doc = ParsedDocument::new(1);
        doc.text_items = vec![
            TextItem::new("Introduction", 72.0, 740.0, 20.0, 1),
            TextItem::new("Body text for the introduction section.", 72.0, 700.0, 11.0, 1),
            TextItem::new("More body text follows here.", 72.0, 686.0, 11.0, 1),
        ];
        let plan = heuristics::plan(&doc);
        let outline = synthesize_outline(&doc, &plan);
        assert_eq!(outline, vec![OutlineEntry::new("Introduction", 1)]);

        doc.outlines.push(OutlineEntry::new("Existing", 1));
        assert_eq!(synthesize_outline(&doc, &plan), doc.outlines);
    }
}
