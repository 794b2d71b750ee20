//! Fixture PDFs built in memory.

#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// One text run: text, x, y, font size.
pub type Run<'a> = (&'a str, f32, f32, f32);

fn page_stream(runs: &[Run<'_>]) -> Vec<u8> {
    let mut operations = Vec::new();
    for (text, x, y, size) in runs {
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec!["F1".into(), (*size).into()]));
        operations.push(Operation::new("Td", vec![(*x).into(), (*y).into()]));
        operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
        operations.push(Operation::new("ET", vec![]));
    }
    Content { operations }.encode().unwrap()
}

/// Build an untagged document, one entry of `pages` per page.
pub fn build_document(pages: &[&[Run<'_>]]) -> (Document, Vec<ObjectId>) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut page_ids = Vec::new();
    for runs in pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, page_stream(runs)));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        page_ids.push(page_id);
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => page_ids.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    (doc, page_ids)
}

pub fn save(mut doc: Document) -> Vec<u8> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// A short born-digital report: a title page and a findings page.
pub fn report_pdf() -> Vec<u8> {
    let page_one: &[Run<'_>] = &[
        ("Annual Accessibility Report", 72.0, 740.0, 24.0),
        ("This report summarizes the accessibility review of our public documents.", 72.0, 700.0, 11.0),
        ("Every document was checked against the same set of structural rules.", 72.0, 686.0, 11.0),
        ("Most issues were caused by missing tags and undeclared languages.", 72.0, 672.0, 11.0),
    ];
    let page_two: &[Run<'_>] = &[
        ("Findings", 72.0, 740.0, 18.0),
        ("Tagged documents scored far higher than untagged ones in every category.", 72.0, 700.0, 11.0),
        ("Scanned documents need text recognition before they can be tagged.", 72.0, 686.0, 11.0),
        ("Remediated files keep their visual layout unchanged.", 72.0, 672.0, 11.0),
    ];
    let (doc, _) = build_document(&[page_one, page_two]);
    save(doc)
}

/// Two nearly empty pages, the way an image-only scan parses.
pub fn sparse_pdf() -> Vec<u8> {
    let (doc, _) = build_document(&[&[("x", 72.0, 700.0, 11.0)], &[("y", 72.0, 700.0, 11.0)]]);
    save(doc)
}

/// A report whose structure tree has elements but no content references.
pub fn unbound_tree_pdf() -> Vec<u8> {
    let page_one: &[Run<'_>] = &[
        ("Policy Overview", 72.0, 740.0, 20.0),
        ("This policy applies to every document we publish online.", 72.0, 700.0, 11.0),
        ("Authors are responsible for checking their own files first.", 72.0, 686.0, 11.0),
    ];
    let (mut doc, page_ids) = build_document(&[page_one]);

    let root_id = doc.new_object_id();
    let document_id = doc.new_object_id();
    let heading_id = doc.add_object(dictionary! {
        "Type" => "StructElem",
        "S" => "H1",
        "P" => document_id,
        "Pg" => page_ids[0],
    });
    let paragraph_id = doc.add_object(dictionary! {
        "Type" => "StructElem",
        "S" => "P",
        "P" => document_id,
        "Pg" => page_ids[0],
    });
    doc.objects.insert(
        document_id,
        Object::Dictionary(dictionary! {
            "Type" => "StructElem",
            "S" => "Document",
            "P" => root_id,
            "K" => vec![heading_id.into(), paragraph_id.into()],
        }),
    );
    doc.objects.insert(
        root_id,
        Object::Dictionary(dictionary! {
            "Type" => "StructTreeRoot",
            "K" => document_id,
        }),
    );

    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(|r| r.as_reference())
        .unwrap();
    doc.get_object_mut(catalog_id)
        .and_then(|o| o.as_dict_mut())
        .unwrap()
        .set("StructTreeRoot", root_id);
    save(doc)
}
