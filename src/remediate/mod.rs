//! Remediation: tag synthesis, content binding, metadata and the
//! iterative loop around them.

mod builder;
mod controller;
mod fonts;
mod layer;
pub mod manifest;
mod metadata;
mod normalize;
mod struct_tree;
mod tagger;

pub use builder::{build, BuildOptions, BuildOutput, BuildStats, DEFAULT_LANGUAGE};
pub use controller::{
    decide, failure_score, fingerprint, select_best, Iteration, IterationSignals, LoopDecision,
    LoopOutcome, RemediationLoop, StopReason, MAX_ITERATIONS,
};
pub use fonts::{encode_win_ansi, map_font, StandardFont};
pub use layer::{overlay_tagged_text, rebuild_pages, ContentBindings};
pub use manifest::{RemediationManifest, MANIFEST_PREFIX, MANIFEST_VERSION};
pub use metadata::{
    merge_keywords, DocumentMetadata, DEFAULT_AUTHOR, DEFAULT_SUBJECT, DEFAULT_TITLE, PRODUCER,
};
pub use normalize::{
    describe_destination, humanize_field_name, infer_alt_text, normalize, synthesize_outline,
    NormalizedContent,
};
pub use struct_tree::{inject_structure, mark_tagged, InjectionStats};
pub use tagger::{build_tag_tree, nest_sections, TagNode};
