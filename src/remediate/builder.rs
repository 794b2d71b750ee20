//! Remediation builder: one pass from a parsed snapshot to new PDF bytes.

use chrono::Utc;
use lopdf::{dictionary, Dictionary, Document as LopdfDocument, Object, ObjectId};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::heuristics;
use crate::model::{OutlineEntry, ParsedDocument, RemediationMode};
use crate::parser::{AnnotationKind, AnnotationTarget, PdfParser};
use crate::service::VerificationResult;

use super::layer::{overlay_tagged_text, rebuild_pages, ContentBindings};
use super::manifest::{self, RemediationManifest, MANIFEST_VERSION};
use super::metadata::{text_string, write_metadata, DocumentMetadata};
use super::normalize::{normalize, NormalizedContent};
use super::struct_tree::{inject_structure, mark_tagged, InjectionStats};
use super::tagger::{build_tag_tree, is_skeleton_role, TagNode};

/// Language used when neither the caller nor the document declares one.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Tags recorded in the manifest.
const MAX_MANIFEST_TAGS: usize = 500;

/// Options for one build pass.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Explicit output language
    pub language: Option<String>,
    /// Overlay every recognized text run, not only the tagged ones
    pub text_layer: bool,
    /// Always ask viewers to display the document title
    pub strict_metadata: bool,
    /// Verifier result from the previous pass
    pub verifier_feedback: Option<VerificationResult>,
    pub max_tagged_items: usize,
    pub max_text_layer_items: usize,
    pub max_paragraphs: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            language: None,
            text_layer: false,
            strict_metadata: false,
            verifier_feedback: None,
            max_tagged_items: 1200,
            max_text_layer_items: 20_000,
            max_paragraphs: 400,
        }
    }
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_text_layer(mut self, enabled: bool) -> Self {
        self.text_layer = enabled;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict_metadata = true;
        self
    }

    pub fn with_verifier_feedback(mut self, feedback: Option<VerificationResult>) -> Self {
        self.verifier_feedback = feedback;
        self
    }

    /// Explicit language, else the document's, else [`DEFAULT_LANGUAGE`].
    pub fn effective_language(&self, parsed: &ParsedDocument) -> String {
        [self.language.as_deref(), parsed.language.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or(DEFAULT_LANGUAGE)
            .to_string()
    }
}

/// Counters describing what a pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    /// Pages were drawn from scratch
    pub rebuilt: bool,
    /// Existing bound structure was kept as is
    pub structure_kept: bool,
    pub tag_nodes: usize,
    pub table_tags: usize,
    pub bound_runs: usize,
    pub marked_content_refs: usize,
    pub substitutions: usize,
    pub links_updated: usize,
    pub fields_labelled: usize,
    pub outline_entries: usize,
}

/// Result of one build pass.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub bytes: Vec<u8>,
    pub manifest: RemediationManifest,
    pub language: String,
    pub tree: TagNode,
    pub stats: BuildStats,
}

/// Remediate `parsed` into new document bytes.
///
/// With `source` the original object graph is kept and edited; without it
/// the pages are rebuilt from the parsed text.
pub fn build(parsed: &ParsedDocument, source: Option<&[u8]>, options: &BuildOptions) -> Result<BuildOutput> {
    let language = options.effective_language(parsed);
    let plan = heuristics::plan(parsed);
    let normalized = normalize(parsed, &plan);
    let tree = build_tag_tree(parsed, &plan, &normalized.images, options.max_paragraphs);
    let cap = if options.text_layer {
        options.max_text_layer_items
    } else {
        options.max_tagged_items
    };

    let previous_pass = parsed.remediation_mode == Some(RemediationMode::ContentBound);
    let source_bound = parsed.has_content_binding() || previous_pass;
    // A text layer over our own output would stack a second invisible copy.
    let keep_structure = source_bound && (!options.text_layer || previous_pass);
    let mut stats = BuildStats {
        tag_nodes: tree.descendant_count(),
        table_tags: tree.count("Table"),
        ..Default::default()
    };

    let (mut doc, bindings) = match source {
        Some(bytes) => {
            let parser = PdfParser::from_bytes(bytes)?;
            let targets = parser.annotation_targets();
            let mut doc = parser.into_document();
            let bindings = if keep_structure {
                log::debug!("Source structure is already bound, keeping it");
                stats.structure_kept = true;
                mark_tagged(&mut doc)?;
                ContentBindings::default()
            } else {
                let bindings = overlay_tagged_text(&mut doc, parsed, &tree, cap)?;
                record_injection(&mut stats, inject_structure(&mut doc, &tree, &bindings)?);
                bindings
            };
            update_annotations(&mut doc, &targets, &normalized, &mut stats);
            (doc, bindings)
        }
        None => {
            let (mut doc, bindings) = rebuild_pages(parsed, &tree, cap)?;
            stats.rebuilt = true;
            record_injection(&mut stats, inject_structure(&mut doc, &tree, &bindings)?);
            (doc, bindings)
        }
    };
    stats.bound_runs = bindings.len();
    stats.substitutions = bindings.substitutions;

    if stats.rebuilt || parsed.outlines.is_empty() {
        stats.outline_entries = write_outlines(&mut doc, &normalized.outlines)?;
    }

    let output_bound = source_bound || !bindings.is_empty();
    let manifest = RemediationManifest {
        version: Some(MANIFEST_VERSION),
        has_struct_tree: Some(true),
        language: Some(language.clone()),
        pdf_ua_part: parsed
            .meta("pdfuaid:part")
            .map(str::to_string)
            .or_else(|| output_bound.then(|| "1".to_string())),
        remediation_mode: Some(if output_bound {
            RemediationMode::ContentBound
        } else {
            RemediationMode::AnalysisOnly
        }),
        tags: if stats.structure_kept {
            parsed
                .tags
                .iter()
                .filter(|t| is_skeleton_role(&t.kind))
                .take(MAX_MANIFEST_TAGS)
                .cloned()
                .collect()
        } else {
            tree.skeleton(MAX_MANIFEST_TAGS)
        },
        outlines: normalized.outlines.clone(),
        forms: normalized.forms.clone(),
        images: normalized.images.clone(),
        links: normalized.links.clone(),
    };
    let entry = manifest::encode(&manifest)?;

    let mut meta = DocumentMetadata::resolve(parsed, &language, &entry);
    meta.pdf_ua_part = manifest.pdf_ua_part.clone();
    meta.display_doc_title = options.strict_metadata
        || options
            .verifier_feedback
            .as_ref()
            .map(VerificationResult::reports_failures)
            .unwrap_or(false);
    write_metadata(&mut doc, &meta, Utc::now())?;

    let orphaned = doc.prune_objects();
    if !orphaned.is_empty() {
        log::debug!("Pruned {} unreferenced objects", orphaned.len());
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    log::info!(
        "Built {} bytes: {} tags, {} bound runs, mode {}",
        bytes.len(),
        stats.tag_nodes,
        stats.bound_runs,
        manifest
            .remediation_mode
            .map(RemediationMode::as_str)
            .unwrap_or("unknown")
    );

    Ok(BuildOutput {
        bytes,
        manifest,
        language,
        tree,
        stats,
    })
}

fn record_injection(stats: &mut BuildStats, injected: InjectionStats) {
    stats.marked_content_refs = injected.marked_content_refs;
}

/// Where an annotation dictionary lives in the object graph.
enum Slot {
    Object(ObjectId),
    /// Inline in the page's own `/Annots` array
    InPage,
    /// Inline in a referenced `/Annots` array
    InArray(ObjectId),
}

fn annotation_slot(doc: &LopdfDocument, page_id: ObjectId, index: usize) -> Option<Slot> {
    let page = doc.get_dictionary(page_id).ok()?;
    let (entry, inline) = match page.get(b"Annots").ok()? {
        Object::Array(annots) => (annots.get(index)?, Slot::InPage),
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Array(annots) => (annots.get(index)?, Slot::InArray(*id)),
            _ => return None,
        },
        _ => return None,
    };
    match entry {
        Object::Reference(id) => Some(Slot::Object(*id)),
        Object::Dictionary(_) => Some(inline),
        _ => None,
    }
}

fn annotation_mut(doc: &mut LopdfDocument, page_id: ObjectId, index: usize) -> Option<&mut Dictionary> {
    let slot = annotation_slot(doc, page_id, index)?;
    let array = match slot {
        Slot::Object(id) => return doc.get_object_mut(id).ok()?.as_dict_mut().ok(),
        Slot::InPage => doc
            .get_object_mut(page_id)
            .ok()?
            .as_dict_mut()
            .ok()?
            .get_mut(b"Annots")
            .ok()?,
        Slot::InArray(id) => doc.get_object_mut(id).ok()?,
    };
    array.as_array_mut().ok()?.get_mut(index)?.as_dict_mut().ok()
}

/// Write normalized link text and field labels back onto the annotations.
fn update_annotations(
    doc: &mut LopdfDocument,
    targets: &[AnnotationTarget],
    normalized: &NormalizedContent,
    stats: &mut BuildStats,
) {
    for target in targets {
        match &target.kind {
            AnnotationKind::Link { url } => {
                let Some(link) = normalized
                    .links
                    .iter()
                    .find(|l| l.page == target.page && &l.url == url)
                else {
                    continue;
                };
                if let Some(annot) = annotation_mut(doc, target.page_id, target.index) {
                    annot.set("Contents", text_string(&link.text));
                    stats.links_updated += 1;
                }
            }
            AnnotationKind::Field { name, holder } => {
                let Some(label) = normalized
                    .forms
                    .iter()
                    .find(|f| &f.name == name)
                    .and_then(|f| f.label_text())
                else {
                    continue;
                };
                let dict = match holder {
                    Some(id) => doc.get_object_mut(*id).ok().and_then(|o| o.as_dict_mut().ok()),
                    None => annotation_mut(doc, target.page_id, target.index),
                };
                if let Some(dict) = dict {
                    dict.set("TU", text_string(label));
                    stats.fields_labelled += 1;
                }
            }
        }
    }
}

/// Replace the document outline with a flat list of entries.
///
/// Entries pointing past the last page are skipped. Returns the count written.
fn write_outlines(doc: &mut LopdfDocument, entries: &[OutlineEntry]) -> Result<usize> {
    let pages = doc.get_pages();
    let targets: Vec<(&OutlineEntry, ObjectId)> = entries
        .iter()
        .filter_map(|entry| pages.get(&entry.page).map(|&id| (entry, id)))
        .collect();
    if targets.is_empty() {
        return Ok(0);
    }

    let root_id = doc.new_object_id();
    let ids: Vec<ObjectId> = targets.iter().map(|_| doc.new_object_id()).collect();
    for (i, (entry, page_id)) in targets.iter().enumerate() {
        let mut item = dictionary! {
            "Title" => text_string(&entry.title),
            "Parent" => root_id,
            "Dest" => vec![Object::Reference(*page_id), Object::Name(b"Fit".to_vec())],
        };
        if i > 0 {
            item.set("Prev", ids[i - 1]);
        }
        if let Some(next) = ids.get(i + 1) {
            item.set("Next", *next);
        }
        doc.objects.insert(ids[i], Object::Dictionary(item));
    }
    doc.objects.insert(
        root_id,
        Object::Dictionary(dictionary! {
            "Type" => "Outlines",
            "First" => ids[0],
            "Last" => ids[ids.len() - 1],
            "Count" => ids.len() as i64,
        }),
    );

    let root = doc
        .trailer
        .get(b"Root")
        .and_then(|r| r.as_reference())
        .map_err(|_| Error::MissingObject("Root".to_string()))?;
    doc.get_object_mut(root)?
        .as_dict_mut()?
        .set("Outlines", Object::Reference(root_id));
    Ok(ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Link, TextItem};
    use crate::parser::PdfParser;

    fn report() -> ParsedDocument {
        let mut doc = ParsedDocument::new(2);
        doc.text_items = vec![
            TextItem::new("Quarterly Report", 72.0, 740.0, 24.0, 1),
            TextItem::new("Revenue grew in every region this quarter.", 72.0, 700.0, 11.0, 1),
            TextItem::new("Costs were held flat against the prior year.", 72.0, 686.0, 11.0, 1),
            TextItem::new("Outlook", 72.0, 740.0, 18.0, 2),
            TextItem::new("We expect continued growth next quarter.", 72.0, 700.0, 11.0, 2),
        ];
        doc
    }

    #[test]
    fn test_effective_language() {
        let mut parsed = ParsedDocument::new(1);
        assert_eq!(BuildOptions::new().effective_language(&parsed), DEFAULT_LANGUAGE);
        parsed.language = Some("de-DE".into());
        assert_eq!(BuildOptions::new().effective_language(&parsed), "de-DE");
        assert_eq!(
            BuildOptions::new().with_language("fr").effective_language(&parsed),
            "fr"
        );
        assert_eq!(
            BuildOptions::new().with_language("  ").effective_language(&parsed),
            "de-DE"
        );
    }

    #[test]
    fn test_rebuild_without_source() {
        let parsed = report();
        let output = build(&parsed, None, &BuildOptions::new()).unwrap();

        assert!(output.stats.rebuilt);
        assert!(output.stats.bound_runs > 0);
        assert_eq!(output.stats.outline_entries, 2);
        assert_eq!(output.manifest.remediation_mode, Some(RemediationMode::ContentBound));
        assert_eq!(output.manifest.pdf_ua_part.as_deref(), Some("1"));
        assert_eq!(output.language, DEFAULT_LANGUAGE);

        let reparsed = PdfParser::from_bytes(&output.bytes).unwrap().parse().unwrap();
        assert_eq!(reparsed.page_count, 2);
        assert!(reparsed.has_structure_tree);
        assert!(reparsed.has_content_binding());
        assert_eq!(reparsed.language.as_deref(), Some(DEFAULT_LANGUAGE));
        assert_eq!(reparsed.meta("pdfuaid:part"), Some("1"));
        assert_eq!(reparsed.outlines.len(), 2);
        assert_eq!(reparsed.remediation_mode, Some(RemediationMode::ContentBound));
    }

    #[test]
    fn test_second_pass_keeps_bound_structure() {
        let parsed = report();
        let first = build(&parsed, None, &BuildOptions::new()).unwrap();
        let reparsed = PdfParser::from_bytes(&first.bytes).unwrap().parse().unwrap();

        let second = build(&reparsed, Some(&first.bytes), &BuildOptions::new()).unwrap();
        assert!(second.stats.structure_kept);
        assert_eq!(second.stats.outline_entries, 0);
        assert!(second.manifest.tags.len() <= first.manifest.tags.len());

        let again = PdfParser::from_bytes(&second.bytes).unwrap().parse().unwrap();
        assert!(again.has_content_binding());
        assert_eq!(again.outlines.len(), 2);
    }

    fn page_mcids(doc: &LopdfDocument, page: u32) -> Vec<i64> {
        let page_id = doc.get_pages()[&page];
        let bytes = crate::parser::page_content(doc, page_id).unwrap();
        lopdf::content::Content::decode(&bytes)
            .unwrap()
            .operations
            .iter()
            .filter(|op| op.operator == "BDC")
            .filter_map(|op| op.operands.get(1)?.as_dict().ok())
            .filter_map(|props| props.get(b"MCID").ok()?.as_i64().ok())
            .collect()
    }

    fn invisible_runs(doc: &LopdfDocument, page: u32) -> usize {
        let page_id = doc.get_pages()[&page];
        let bytes = crate::parser::page_content(doc, page_id).unwrap();
        lopdf::content::Content::decode(&bytes)
            .unwrap()
            .operations
            .iter()
            .filter(|op| op.operator == "Tr")
            .count()
    }

    #[test]
    fn test_text_layer_passes_do_not_stack() {
        let options = BuildOptions::new().with_text_layer(true);
        let mut bytes = build(&report(), None, &options).unwrap().bytes;
        let mut object_counts = Vec::new();

        for _ in 0..3 {
            let parsed = PdfParser::from_bytes(&bytes).unwrap().parse().unwrap();
            let output = build(&parsed, Some(&bytes), &options).unwrap();
            assert!(output.stats.structure_kept);
            bytes = output.bytes;

            let doc = LopdfDocument::load_mem(&bytes).unwrap();
            for page in 1..=2 {
                let mcids = page_mcids(&doc, page);
                let unique: std::collections::HashSet<i64> = mcids.iter().copied().collect();
                assert!(!mcids.is_empty());
                assert_eq!(unique.len(), mcids.len());
                assert_eq!(invisible_runs(&doc, page), 0);
            }
            object_counts.push(doc.objects.len());
        }
        assert!(object_counts.windows(2).all(|w| w[0] == w[1]), "{:?}", object_counts);
    }

    #[test]
    fn test_keywords_carry_manifest_once() {
        let parsed = report();
        let first = build(&parsed, None, &BuildOptions::new()).unwrap();
        let reparsed = PdfParser::from_bytes(&first.bytes).unwrap().parse().unwrap();
        let second = build(&reparsed, Some(&first.bytes), &BuildOptions::new()).unwrap();
        let doc = PdfParser::from_bytes(&second.bytes).unwrap().parse().unwrap();

        let keywords = doc.meta("Keywords").unwrap();
        assert_eq!(keywords.matches(manifest::MANIFEST_PREFIX).count(), 1);
        assert!(keywords.contains("accessible"));
    }

    #[test]
    fn test_strict_metadata_sets_display_title() {
        let parsed = report();
        let output = build(&parsed, None, &BuildOptions::new().strict()).unwrap();
        let doc = LopdfDocument::load_mem(&output.bytes).unwrap();
        let prefs = doc
            .catalog()
            .unwrap()
            .get(b"ViewerPreferences")
            .unwrap()
            .as_dict()
            .unwrap();
        assert!(prefs.get(b"DisplayDocTitle").unwrap().as_bool().unwrap());
    }

    #[test]
    fn test_manifest_carries_normalized_links() {
        let mut parsed = report();
        parsed.links.push(Link::new("click here", "https://example.com/pricing", 1));
        let output = build(&parsed, None, &BuildOptions::new()).unwrap();
        assert_eq!(output.manifest.links[0].text, "Visit example.com/pricing");
    }

    #[test]
    fn test_write_outlines_skips_missing_pages() {
        let parsed = report();
        let output = build(&parsed, None, &BuildOptions::new()).unwrap();
        let mut doc = LopdfDocument::load_mem(&output.bytes).unwrap();
        let written = write_outlines(
            &mut doc,
            &[OutlineEntry::new("Intro", 1), OutlineEntry::new("Gone", 9)],
        )
        .unwrap();
        assert_eq!(written, 1);
    }
}
