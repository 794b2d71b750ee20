//! Document model types for accessibility analysis.
//!
//! A [`ParsedDocument`] is the immutable snapshot every later stage works
//! from. Remediation never edits one in place: it writes new bytes and
//! parses them again, so "before" and "after" snapshots can be compared.

mod binding;
mod document;
mod items;

pub use binding::StructureBindingSummary;
pub use document::{PageSize, ParsedDocument, RemediationMode};
pub use items::{FormField, ImageItem, Link, OutlineEntry, Tag, TextItem};

pub(crate) use items::heading_level;
