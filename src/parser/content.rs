//! Content stream interpretation.
//!
//! Walks page operators to recover positioned text runs and painted images.
//! Text inside `/Artifact` marked content is skipped.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId};

use crate::error::{Error, Result};
use crate::model::{ImageItem, TextItem};

use super::text::{decode_text_simple, number};

/// Form XObjects nest at most this deep.
const MAX_FORM_DEPTH: u8 = 4;

/// TJ adjustments beyond this (thousandths of an em) read as a word gap.
const TJ_SPACE_THRESHOLD: f32 = 200.0;

/// Affine transform `[a b c d e f]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix([f32; 6]);

impl Matrix {
    pub(crate) const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        if operands.len() < 6 {
            return None;
        }
        let mut m = [0.0f32; 6];
        for (slot, obj) in m.iter_mut().zip(operands) {
            *slot = number(obj)?;
        }
        Some(Matrix(m))
    }

    fn from_object(obj: Option<&Object>) -> Matrix {
        obj.and_then(|o| o.as_array().ok())
            .and_then(|arr| Matrix::from_operands(arr))
            .unwrap_or(Matrix::IDENTITY)
    }

    /// `self × other`: apply `self` first, then `other`.
    pub(crate) fn then(&self, other: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }

    pub(crate) fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    fn translate(&self, tx: f32, ty: f32) -> Matrix {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty]).then(self)
    }

    /// Bounding box of the unit square under this transform.
    fn unit_bounds(&self) -> (f32, f32, f32, f32) {
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(1.0, 0.0),
            self.apply(0.0, 1.0),
            self.apply(1.0, 1.0),
        ];
        let min_x = corners.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
        let min_y = corners.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
        let max_y = corners.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);
        (min_x, min_y, (max_x - min_x).max(0.0), (max_y - min_y).max(0.0))
    }

    /// Vertical scale factor.
    fn scale(&self) -> f32 {
        let [a, b, c, d, _, _] = self.0;
        let horizontal = (a * a + b * b).sqrt();
        if horizontal > 0.0 {
            horizontal
        } else {
            (c * c + d * d).sqrt()
        }
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: Option<String>,
}

#[derive(Debug, Clone)]
struct TextState {
    matrix: Matrix,
    line: Matrix,
    leading: f32,
    font_key: Vec<u8>,
    font_name: String,
    font_size: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            matrix: Matrix::IDENTITY,
            line: Matrix::IDENTITY,
            leading: 0.0,
            font_key: Vec::new(),
            font_name: "Helvetica".to_string(),
            font_size: 12.0,
        }
    }
}

/// Result of interpreting one page.
#[derive(Debug, Default)]
pub(crate) struct PageContent {
    pub text_items: Vec<TextItem>,
    pub images: Vec<ImageItem>,
}

/// Operator interpreter for one page.
pub(crate) struct ContentInterpreter<'a> {
    doc: &'a LopdfDocument,
    page: u32,
    max_images: usize,
    out: PageContent,
}

impl<'a> ContentInterpreter<'a> {
    pub(crate) fn new(doc: &'a LopdfDocument, page: u32, max_images: usize) -> Self {
        Self {
            doc,
            page,
            max_images,
            out: PageContent::default(),
        }
    }

    /// Interpret a page's content streams.
    pub(crate) fn run_page(mut self, page_id: ObjectId) -> Result<PageContent> {
        let content = page_content(self.doc, page_id)?;
        let resources = page_resources(self.doc, page_id);
        self.interpret(&content, resources, Matrix::IDENTITY, 0)?;
        Ok(self.out)
    }

    fn interpret(
        &mut self,
        content: &[u8],
        resources: Option<&'a Dictionary>,
        base: Matrix,
        depth: u8,
    ) -> Result<()> {
        let content = lopdf::content::Content::decode(content)
            .map_err(|e| Error::MalformedInput(format!("page {}: {}", self.page, e)))?;

        let fonts = font_map(self.doc, resources);

        let mut gs = GraphicsState {
            ctm: base,
            fill: None,
        };
        let mut gs_stack: Vec<GraphicsState> = Vec::new();
        let mut ts = TextState::default();
        let mut in_text = false;
        // One entry per open marked-content sequence: true when it is an artifact
        let mut marked: Vec<bool> = Vec::new();

        for op in content.operations {
            let operands = &op.operands;
            match op.operator.as_str() {
                "q" => gs_stack.push(gs.clone()),
                "Q" => {
                    if let Some(prev) = gs_stack.pop() {
                        gs = prev;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        gs.ctm = m.then(&gs.ctm);
                    }
                }
                "g" => gs.fill = gray_color(operands),
                "rg" => gs.fill = rgb_color(operands),
                "k" => gs.fill = cmyk_color(operands),
                "sc" | "scn" => {
                    let numeric: Vec<&Object> =
                        operands.iter().filter(|o| number(o).is_some()).collect();
                    gs.fill = match numeric.len() {
                        1 => gray_color(operands),
                        3 => rgb_color(operands),
                        4 => cmyk_color(operands),
                        _ => gs.fill.clone(),
                    };
                }
                "BMC" | "BDC" => {
                    let is_artifact = matches!(
                        operands.first(),
                        Some(Object::Name(name)) if name.as_slice() == b"Artifact"
                    );
                    marked.push(is_artifact);
                }
                "EMC" => {
                    marked.pop();
                }
                "BT" => {
                    in_text = true;
                    ts.matrix = Matrix::IDENTITY;
                    ts.line = Matrix::IDENTITY;
                }
                "ET" => in_text = false,
                "Tf" => {
                    if operands.len() >= 2 {
                        if let Object::Name(key) = &operands[0] {
                            ts.font_key = key.clone();
                            ts.font_name = fonts
                                .get(key)
                                .and_then(|f| f.get(b"BaseFont").ok())
                                .and_then(|o| o.as_name().ok())
                                .map(|n| String::from_utf8_lossy(n).to_string())
                                .unwrap_or_else(|| String::from_utf8_lossy(key).to_string());
                        }
                        ts.font_size = number(&operands[1]).unwrap_or(12.0);
                    }
                }
                "TL" => {
                    if let Some(v) = operands.first().and_then(number) {
                        ts.leading = v;
                    }
                }
                "Td" | "TD" => {
                    if operands.len() >= 2 {
                        let tx = number(&operands[0]).unwrap_or(0.0);
                        let ty = number(&operands[1]).unwrap_or(0.0);
                        if op.operator == "TD" {
                            ts.leading = -ty;
                        }
                        ts.line = ts.line.translate(tx, ty);
                        ts.matrix = ts.line;
                    }
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        ts.line = m;
                        ts.matrix = m;
                    }
                }
                "T*" => {
                    ts.line = ts.line.translate(0.0, -ts.leading);
                    ts.matrix = ts.line;
                }
                "Tj" | "TJ" | "'" | "\"" => {
                    if op.operator == "'" || op.operator == "\"" {
                        ts.line = ts.line.translate(0.0, -ts.leading);
                        ts.matrix = ts.line;
                    }
                    if !in_text {
                        continue;
                    }
                    let text = match op.operator.as_str() {
                        "TJ" => self.decode_array(&fonts, &ts.font_key, operands.first()),
                        "\"" => self.decode_string(&fonts, &ts.font_key, operands.get(2)),
                        _ => self.decode_string(&fonts, &ts.font_key, operands.first()),
                    };
                    let advance = text.chars().count() as f32 * ts.font_size * 0.5;
                    if !marked.iter().any(|a| *a) {
                        self.push_text(text, &ts, &gs);
                    }
                    ts.matrix = ts.matrix.translate(advance, 0.0);
                }
                "Do" => {
                    if let Some(Object::Name(name)) = operands.first() {
                        self.paint_xobject(name, resources, &gs, depth)?;
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn push_text(&mut self, text: String, ts: &TextState, gs: &GraphicsState) {
        if text.trim().is_empty() {
            return;
        }
        let rendering = ts.matrix.then(&gs.ctm);
        let (x, y) = rendering.apply(0.0, 0.0);
        let effective = (ts.font_size * rendering.scale()).abs();
        let font_size = if effective > 0.0 { effective } else { 12.0 }.max(8.0);

        let mut item = TextItem::new(text, x, y, font_size, self.page).with_font(&ts.font_name);
        item.color = gs.fill.clone();
        self.out.text_items.push(item);
    }

    fn decode_string(
        &self,
        fonts: &BTreeMap<Vec<u8>, &'a Dictionary>,
        font_key: &[u8],
        operand: Option<&Object>,
    ) -> String {
        match operand {
            Some(Object::String(bytes, _)) => self.decode_bytes(fonts, font_key, bytes),
            _ => String::new(),
        }
    }

    fn decode_array(
        &self,
        fonts: &BTreeMap<Vec<u8>, &'a Dictionary>,
        font_key: &[u8],
        operand: Option<&Object>,
    ) -> String {
        let Some(Object::Array(arr)) = operand else {
            return String::new();
        };

        let mut combined = String::new();
        for item in arr {
            match item {
                Object::String(bytes, _) => {
                    combined.push_str(&self.decode_bytes(fonts, font_key, bytes));
                }
                other => {
                    let adjustment = -number(other).unwrap_or(0.0);
                    if adjustment > TJ_SPACE_THRESHOLD
                        && !combined.is_empty()
                        && !combined.ends_with(' ')
                    {
                        combined.push(' ');
                    }
                }
            }
        }
        combined
    }

    fn decode_bytes(
        &self,
        fonts: &BTreeMap<Vec<u8>, &'a Dictionary>,
        font_key: &[u8],
        bytes: &[u8],
    ) -> String {
        let encoding = fonts
            .get(font_key)
            .and_then(|f| f.get_font_encoding(self.doc).ok());
        match encoding {
            Some(enc) => LopdfDocument::decode_text(&enc, bytes)
                .unwrap_or_else(|_| decode_text_simple(bytes)),
            None => decode_text_simple(bytes),
        }
    }

    fn paint_xobject(
        &mut self,
        name: &[u8],
        resources: Option<&'a Dictionary>,
        gs: &GraphicsState,
        depth: u8,
    ) -> Result<()> {
        let Some(stream) = resources
            .and_then(|r| resolve_dict(self.doc, r.get(b"XObject").ok()))
            .and_then(|xobjects| xobjects.get(name).ok())
            .and_then(|obj| self.doc.dereference(obj).ok())
            .and_then(|(_, obj)| obj.as_stream().ok())
        else {
            return Ok(());
        };

        let subtype = stream
            .dict
            .get(b"Subtype")
            .and_then(|s| s.as_name())
            .unwrap_or(&[]);

        match subtype {
            b"Image" => {
                if self.out.images.len() >= self.max_images {
                    return Ok(());
                }
                let (x, y, width, height) = gs.ctm.unit_bounds();
                if width < 1.0 || height < 1.0 {
                    return Ok(());
                }
                let id = format!("img-{}-{}", self.page, self.out.images.len() + 1);
                self.out
                    .images
                    .push(ImageItem::new(id, self.page, x, y, width, height));
            }
            b"Form" if depth < MAX_FORM_DEPTH => {
                let content = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                let form_matrix = Matrix::from_object(stream.dict.get(b"Matrix").ok());
                let form_resources =
                    resolve_dict(self.doc, stream.dict.get(b"Resources").ok()).or(resources);
                let base = form_matrix.then(&gs.ctm);
                if let Err(e) = self.interpret(&content, form_resources, base, depth + 1) {
                    log::warn!("Skipping form XObject on page {}: {}", self.page, e);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Resolve a dictionary that may be stored inline or by reference.
pub(crate) fn resolve_dict<'a>(
    doc: &'a LopdfDocument,
    obj: Option<&'a Object>,
) -> Option<&'a Dictionary> {
    match obj? {
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&s.dict),
            _ => None,
        },
        Object::Dictionary(d) => Some(d),
        _ => None,
    }
}

/// Resolve an array that may be stored inline or by reference.
pub(crate) fn resolve_array<'a>(
    doc: &'a LopdfDocument,
    obj: Option<&'a Object>,
) -> Option<&'a Vec<Object>> {
    match obj? {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok(),
        Object::Array(arr) => Some(arr),
        _ => None,
    }
}

/// A page's `/Resources`, following `/Parent` inheritance.
pub(crate) fn page_resources(doc: &LopdfDocument, page_id: ObjectId) -> Option<&Dictionary> {
    inherited(doc, page_id, b"Resources").and_then(|obj| resolve_dict(doc, Some(obj)))
}

/// Look up a page attribute, walking up the page tree.
pub(crate) fn inherited<'a>(
    doc: &'a LopdfDocument,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok();
    // Page trees are shallow; the cap guards against cyclic /Parent links.
    for _ in 0..32 {
        let dict = current?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        current = dict
            .get(b"Parent")
            .and_then(|p| p.as_reference())
            .ok()
            .and_then(|id| doc.get_dictionary(id).ok());
    }
    None
}

fn font_map<'a>(
    doc: &'a LopdfDocument,
    resources: Option<&'a Dictionary>,
) -> BTreeMap<Vec<u8>, &'a Dictionary> {
    let mut fonts = BTreeMap::new();
    if let Some(font_dict) = resources.and_then(|r| resolve_dict(doc, r.get(b"Font").ok())) {
        for (name, obj) in font_dict.iter() {
            if let Some(font) = resolve_dict(doc, Some(obj)) {
                fonts.insert(name.clone(), font);
            }
        }
    }
    fonts
}

/// Concatenated, decompressed content of a page.
pub(crate) fn page_content(doc: &LopdfDocument, page_id: ObjectId) -> Result<Vec<u8>> {
    let page_dict = doc.get_dictionary(page_id)?;
    let contents = match page_dict.get(b"Contents") {
        Ok(c) => c,
        Err(_) => return Ok(Vec::new()),
    };

    let stream_bytes = |id: ObjectId| -> Option<Vec<u8>> {
        match doc.get_object(id).ok()? {
            Object::Stream(s) => Some(s.decompressed_content().unwrap_or_else(|_| s.content.clone())),
            _ => None,
        }
    };

    match contents {
        Object::Reference(r) => match doc.get_object(*r)? {
            Object::Array(arr) => Ok(join_streams(arr, stream_bytes)),
            _ => stream_bytes(*r)
                .ok_or_else(|| Error::MalformedInput("invalid content stream".to_string())),
        },
        Object::Array(arr) => Ok(join_streams(arr, stream_bytes)),
        _ => Err(Error::MalformedInput("invalid content stream".to_string())),
    }
}

fn join_streams(arr: &[Object], stream_bytes: impl Fn(ObjectId) -> Option<Vec<u8>>) -> Vec<u8> {
    let mut content = Vec::new();
    for obj in arr {
        if let Ok(id) = obj.as_reference() {
            if let Some(data) = stream_bytes(id) {
                content.extend_from_slice(&data);
                content.push(b'\n');
            }
        }
    }
    content
}

fn channel(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn hex(r: f32, g: f32, b: f32) -> String {
    format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
}

fn gray_color(operands: &[Object]) -> Option<String> {
    let g = operands.iter().find_map(number)?;
    Some(hex(g, g, g))
}

fn rgb_color(operands: &[Object]) -> Option<String> {
    let v: Vec<f32> = operands.iter().filter_map(number).collect();
    (v.len() >= 3).then(|| hex(v[0], v[1], v[2]))
}

fn cmyk_color(operands: &[Object]) -> Option<String> {
    let v: Vec<f32> = operands.iter().filter_map(number).collect();
    if v.len() < 4 {
        return None;
    }
    let k = 1.0 - v[3];
    Some(hex((1.0 - v[0]) * k, (1.0 - v[1]) * k, (1.0 - v[2]) * k))
}
