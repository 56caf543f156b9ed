use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::rc::Rc;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::cmap::utf16_be;
use crate::error::Error;
use crate::fonts::Font;

const PDF_SIGNATURE: &[u8] = b"%PDF";
const LETTER: (f32, f32) = (612.0, 792.0);
const MAX_REFERENCE_DEPTH: usize = 32;
const MAX_FORM_DEPTH: usize = 16;

pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    let mut current = obj;
    for _ in 0..MAX_REFERENCE_DEPTH {
        let Object::Reference(id) = current else {
            return current;
        };
        match doc.get_object(*id) {
            Ok(target) => current = target,
            Err(_) => return current,
        }
    }
    current
}

pub(crate) fn dict_get<'a>(dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok()
}

pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Rejects files that do not start with the `%PDF` header before handing them to lopdf.
pub(crate) fn check_signature(path: &Path) -> Result<(), Error> {
    let mut header = Vec::with_capacity(PDF_SIGNATURE.len());
    std::fs::File::open(path)?
        .take(PDF_SIGNATURE.len() as u64)
        .read_to_end(&mut header)?;
    if header != PDF_SIGNATURE {
        return Err(Error::InvalidPdf("missing %PDF header".into()));
    }
    Ok(())
}

pub(crate) fn load(path: &Path) -> Result<Document, Error> {
    check_signature(path)?;
    let mut doc = Document::load(path)?;
    // Owner-password-only files open with the empty user password.
    if doc.is_encrypted() {
        if let Err(e) = doc.decrypt("") {
            log::debug!("empty user password rejected: {e}");
            return Err(Error::Encrypted);
        }
        log::info!("{}: decrypted with the empty user password", path.display());
    }
    if doc.get_pages().is_empty() {
        return Err(Error::InvalidPdf("document has no pages".into()));
    }
    Ok(doc)
}

/// Decodes a PDF text string (PDFDocEncoding or UTF-16BE with BOM).
fn text_string(obj: &Object) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };
    let text = match bytes.strip_prefix(&[0xfe, 0xff]) {
        Some(rest) => utf16_be(rest),
        None => bytes.iter().map(|&b| b as char).collect(),
    };
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// `/Title` and `/Author` from the trailer's `/Info` dictionary.
pub(crate) fn document_info(doc: &Document) -> (Option<String>, Option<String>) {
    let Some(Object::Dictionary(info)) = dict_get(&doc.trailer, b"Info").map(|o| resolve(doc, o))
    else {
        return (None, None);
    };
    let field = |key: &[u8]| dict_get(info, key).and_then(|o| text_string(resolve(doc, o)));
    (field(b"Title"), field(b"Author"))
}

/// Looks up a page attribute, following `/Parent` for inheritable keys.
fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut node = page;
    for _ in 0..MAX_REFERENCE_DEPTH {
        if let Some(value) = dict_get(node, key) {
            return Some(resolve(doc, value));
        }
        let Some(Object::Dictionary(parent)) = dict_get(node, b"Parent").map(|o| resolve(doc, o))
        else {
            return None;
        };
        node = parent;
    }
    None
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SpanStyle {
    pub(crate) font_name: String,
    pub(crate) bold: bool,
    pub(crate) italic: bool,
    pub(crate) color: Option<[u8; 3]>,
}

/// One shown string, positioned in page space with the origin at the bottom-left.
#[derive(Clone, Debug)]
pub(crate) struct TextSpan {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) width: f32,
    pub(crate) font_size: f32,
    pub(crate) text: String,
    pub(crate) style: Rc<SpanStyle>,
}

pub(crate) struct PageText {
    pub(crate) width: f32,
    pub(crate) height: f32,
    pub(crate) spans: Vec<TextSpan>,
}

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `a` applied first, then `b`.
fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

fn translate(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

#[derive(Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: Option<[u8; 3]>,
}

#[derive(Clone)]
struct TextState {
    tm: Matrix,
    tlm: Matrix,
    font: Option<Rc<Font>>,
    font_size: f32,
    leading: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    rise: f32,
}

impl Default for TextState {
    fn default() -> Self {
        TextState {
            tm: IDENTITY,
            tlm: IDENTITY,
            font: None,
            font_size: 0.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            rise: 0.0,
        }
    }
}

fn to_color_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn rgb(r: f32, g: f32, b: f32) -> Option<[u8; 3]> {
    let color = [to_color_byte(r), to_color_byte(g), to_color_byte(b)];
    (color != [0, 0, 0]).then_some(color)
}

struct Interpreter<'a> {
    doc: &'a Document,
    /// Fonts of the current resource dictionary, by resource name.
    fonts: HashMap<Vec<u8>, Rc<Font>>,
    resources: Option<&'a Dictionary>,
    /// Form XObjects currently being interpreted, outermost first.
    forms: Vec<Option<ObjectId>>,
    origin: (f32, f32),
    gs: GraphicsState,
    gs_stack: Vec<GraphicsState>,
    ts: TextState,
    styles: Vec<Rc<SpanStyle>>,
    spans: Vec<TextSpan>,
}

impl<'a> Interpreter<'a> {
    fn new(doc: &'a Document, resources: Option<&'a Dictionary>, origin: (f32, f32)) -> Self {
        Interpreter {
            doc,
            fonts: HashMap::new(),
            resources,
            forms: Vec::new(),
            origin,
            gs: GraphicsState { ctm: IDENTITY, fill: None },
            gs_stack: Vec::new(),
            ts: TextState::default(),
            styles: Vec::new(),
            spans: Vec::new(),
        }
    }

    /// Entry `name` of the resource category `category` (`/Font`, `/XObject`).
    fn resource(&self, category: &[u8], name: &[u8]) -> Option<&'a Object> {
        let doc = self.doc;
        let entries = dict_get(self.resources?, category)
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok())?;
        dict_get(entries, name)
    }

    fn font(&mut self, name: &[u8]) -> Rc<Font> {
        if let Some(font) = self.fonts.get(name) {
            return font.clone();
        }
        let font = match self.resource(b"Font", name).map(|o| resolve(self.doc, o)) {
            Some(Object::Dictionary(dict)) => Font::from_dict(self.doc, dict),
            _ => {
                log::warn!(
                    "font resource /{} not found, using fallback metrics",
                    String::from_utf8_lossy(name)
                );
                Font::fallback()
            }
        };
        let font = Rc::new(font);
        self.fonts.insert(name.to_vec(), font.clone());
        font
    }

    fn style(&mut self, font: &Font) -> Rc<SpanStyle> {
        let style = SpanStyle {
            font_name: font.family.clone(),
            bold: font.bold,
            italic: font.italic,
            color: self.gs.fill,
        };
        if let Some(existing) = self.styles.iter().find(|s| ***s == style) {
            return existing.clone();
        }
        let style = Rc::new(style);
        self.styles.push(style.clone());
        style
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.ts.tlm = multiply(&translate(tx, ty), &self.ts.tlm);
        self.ts.tm = self.ts.tlm;
    }

    fn advance(&mut self, tx: f32) {
        self.ts.tm = multiply(&translate(tx, 0.0), &self.ts.tm);
    }

    fn user_point(&self) -> (f32, f32) {
        let m = multiply(&multiply(&translate(0.0, self.ts.rise), &self.ts.tm), &self.gs.ctm);
        (m[4] - self.origin.0, m[5] - self.origin.1)
    }

    fn effective_font_size(&self) -> f32 {
        let m = multiply(&self.ts.tm, &self.gs.ctm);
        let scale = (m[2] * m[2] + m[3] * m[3]).sqrt();
        (self.ts.font_size * scale).abs()
    }

    fn show(&mut self, bytes: &[u8]) {
        let font = self.ts.font.clone().unwrap_or_else(|| Rc::new(Font::fallback()));
        let (x, y) = self.user_point();
        let font_size = self.effective_font_size();

        let mut text = String::new();
        for glyph in font.decode(bytes) {
            if let Some(t) = &glyph.text {
                text.push_str(t);
            }
            let mut tx = glyph.width / 1000.0 * self.ts.font_size + self.ts.char_spacing;
            if glyph.is_space {
                tx += self.ts.word_spacing;
            }
            self.advance(tx * self.ts.horizontal_scale);
        }

        let (end_x, _) = self.user_point();
        if text.is_empty() || font_size < 0.5 {
            return;
        }
        let style = self.style(&font);
        self.spans.push(TextSpan {
            x,
            y,
            width: (end_x - x).max(0.0),
            font_size,
            text,
            style,
        });
    }

    /// Applies a `TJ` kerning adjustment, inserting a space for large gaps.
    ///
    /// Only spans from index `first_span` on belong to the current `TJ` array.
    fn adjust(&mut self, thousandths: f32, first_span: usize) {
        let tx = -thousandths / 1000.0 * self.ts.font_size * self.ts.horizontal_scale;
        self.advance(tx);
        if thousandths < -250.0
            && self.spans.len() > first_span
            && let Some(last) = self.spans.last_mut()
            && !last.text.ends_with(' ')
        {
            last.text.push(' ');
        }
    }

    /// Interprets a Form XObject in place, as if its content were inlined between `q` and `Q`.
    fn draw_form(&mut self, name: &[u8]) {
        let doc = self.doc;
        let Some(entry) = self.resource(b"XObject", name) else {
            log::debug!("XObject /{} not found", String::from_utf8_lossy(name));
            return;
        };
        let id = match entry {
            Object::Reference(id) => Some(*id),
            _ => None,
        };
        let Object::Stream(form) = resolve(doc, entry) else {
            return;
        };
        if dict_get(&form.dict, b"Subtype").and_then(|o| o.as_name().ok()) != Some(b"Form".as_slice()) {
            return;
        }
        if self.forms.len() >= MAX_FORM_DEPTH || (id.is_some() && self.forms.contains(&id)) {
            log::warn!(
                "skipping form /{}: nested {} deep or drawn from itself",
                String::from_utf8_lossy(name),
                self.forms.len()
            );
            return;
        }

        let content = match form.get_plain_content().and_then(|data| Content::decode(&data)) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("form /{}: unreadable content stream: {e}", String::from_utf8_lossy(name));
                return;
            }
        };

        let matrix = match dict_get(&form.dict, b"Matrix").map(|o| resolve(doc, o)) {
            Some(Object::Array(values)) => {
                let v: Vec<f32> = values.iter().filter_map(|o| number(resolve(doc, o))).collect();
                <[f32; 6]>::try_from(v).unwrap_or(IDENTITY)
            }
            _ => IDENTITY,
        };
        let resources = dict_get(&form.dict, b"Resources")
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok())
            .or(self.resources);

        let saved_gs = self.gs.clone();
        let saved_ts = self.ts.clone();
        let stack_depth = self.gs_stack.len();
        let shared = match (resources, self.resources) {
            (Some(a), Some(b)) => std::ptr::eq(a, b),
            (None, None) => true,
            _ => false,
        };
        let saved_resources = std::mem::replace(&mut self.resources, resources);
        let saved_fonts = (!shared).then(|| std::mem::take(&mut self.fonts));

        self.gs.ctm = multiply(&matrix, &self.gs.ctm);
        self.forms.push(id);
        self.run(&content);
        self.forms.pop();

        if let Some(fonts) = saved_fonts {
            self.fonts = fonts;
        }
        self.resources = saved_resources;
        self.gs_stack.truncate(stack_depth);
        self.gs = saved_gs;
        self.ts = saved_ts;
    }

    fn run(&mut self, content: &Content) {
        for op in &content.operations {
            let nums: Vec<f32> = op.operands.iter().filter_map(number).collect();
            let n = |i: usize| nums.get(i).copied().unwrap_or(0.0);
            match op.operator.as_str() {
                "q" => self.gs_stack.push(self.gs.clone()),
                "Q" => {
                    if let Some(gs) = self.gs_stack.pop() {
                        self.gs = gs;
                    }
                }
                "cm" if nums.len() == 6 => {
                    let m = [n(0), n(1), n(2), n(3), n(4), n(5)];
                    self.gs.ctm = multiply(&m, &self.gs.ctm);
                }
                "BT" => {
                    self.ts.tm = IDENTITY;
                    self.ts.tlm = IDENTITY;
                }
                "ET" => {}
                "Tf" => {
                    if let Some(Object::Name(name)) = op.operands.first() {
                        self.ts.font = Some(self.font(name));
                    }
                    self.ts.font_size = n(0);
                }
                "Td" => self.next_line(n(0), n(1)),
                "TD" => {
                    self.ts.leading = -n(1);
                    self.next_line(n(0), n(1));
                }
                "Tm" if nums.len() == 6 => {
                    self.ts.tlm = [n(0), n(1), n(2), n(3), n(4), n(5)];
                    self.ts.tm = self.ts.tlm;
                }
                "T*" => self.next_line(0.0, -self.ts.leading),
                "TL" => self.ts.leading = n(0),
                "Tc" => self.ts.char_spacing = n(0),
                "Tw" => self.ts.word_spacing = n(0),
                "Tz" => self.ts.horizontal_scale = n(0) / 100.0,
                "Ts" => self.ts.rise = n(0),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        self.show(bytes);
                    }
                }
                "'" => {
                    self.next_line(0.0, -self.ts.leading);
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        self.show(bytes);
                    }
                }
                "\"" => {
                    self.ts.word_spacing = n(0);
                    self.ts.char_spacing = n(1);
                    self.next_line(0.0, -self.ts.leading);
                    if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                        self.show(bytes);
                    }
                }
                "TJ" => {
                    let Some(Object::Array(items)) = op.operands.first() else {
                        continue;
                    };
                    let first_span = self.spans.len();
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(bytes),
                            other => {
                                if let Some(v) = number(other) {
                                    self.adjust(v, first_span);
                                }
                            }
                        }
                    }
                }
                "Do" => {
                    if let Some(Object::Name(name)) = op.operands.first() {
                        self.draw_form(name);
                    }
                }
                "g" => self.gs.fill = rgb(n(0), n(0), n(0)),
                "rg" => self.gs.fill = rgb(n(0), n(1), n(2)),
                "k" => {
                    let k = n(3);
                    self.gs.fill = rgb(
                        (1.0 - n(0)) * (1.0 - k),
                        (1.0 - n(1)) * (1.0 - k),
                        (1.0 - n(2)) * (1.0 - k),
                    );
                }
                _ => {}
            }
        }
    }
}

fn media_box(doc: &Document, page: &Dictionary) -> (f32, f32, f32, f32) {
    let Some(Object::Array(values)) = inherited(doc, page, b"MediaBox") else {
        return (0.0, 0.0, LETTER.0, LETTER.1);
    };
    let v: Vec<f32> = values
        .iter()
        .filter_map(|o| number(resolve(doc, o)))
        .collect();
    if v.len() != 4 {
        return (0.0, 0.0, LETTER.0, LETTER.1);
    }
    (v[0].min(v[2]), v[1].min(v[3]), v[0].max(v[2]), v[1].max(v[3]))
}

/// Interprets one page's content stream into text spans.
pub(crate) fn extract_page(doc: &Document, page_number: u32, page_id: ObjectId) -> Result<PageText, Error> {
    let page = doc.get_object(page_id)?.as_dict()?;
    let (x0, y0, x1, y1) = media_box(doc, page);

    if let Some(rotate) = inherited(doc, page, b"Rotate").and_then(number)
        && rotate as i64 % 360 != 0
    {
        log::warn!("page {page_number}: /Rotate {rotate} is ignored");
    }

    let mut text = PageText {
        width: x1 - x0,
        height: y1 - y0,
        spans: Vec::new(),
    };

    let content = match doc
        .get_page_content(page_id)
        .and_then(|data| Content::decode(&data))
    {
        Ok(content) => content,
        Err(e) => {
            log::warn!("page {page_number}: unreadable content stream, skipping text: {e}");
            return Ok(text);
        }
    };

    let resources = inherited(doc, page, b"Resources").and_then(|o| o.as_dict().ok());
    let mut interpreter = Interpreter::new(doc, resources, (x0, y0));
    interpreter.run(&content);
    text.spans = interpreter.spans;

    log::debug!(
        "page {page_number}: {} operations, {} text spans",
        content.operations.len(),
        text.spans.len()
    );
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_multiply_composes_translation_and_scale() {
        let scale = [2.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        let m = multiply(&translate(10.0, 5.0), &scale);
        assert_eq!(m, [2.0, 0.0, 0.0, 2.0, 20.0, 10.0]);
    }

    #[test]
    fn black_fill_is_automatic_colour() {
        assert_eq!(rgb(0.0, 0.0, 0.0), None);
        assert_eq!(rgb(1.0, 0.0, 0.5), Some([255, 0, 128]));
    }

    fn spans_of(ops: &[u8]) -> Vec<TextSpan> {
        let doc = Document::new();
        let content = Content::decode(ops).unwrap();
        let mut interpreter = Interpreter::new(&doc, None, (0.0, 0.0));
        interpreter.run(&content);
        interpreter.spans
    }

    #[test]
    fn tj_gaps_only_pad_spans_of_the_same_array() {
        let spans = spans_of(
            b"BT /F1 12 Tf 72 700 Td (Title) Tj ET \
              BT /F1 12 Tf 72 650 Td [-400 (Body) -400 (text)] TJ ET",
        );
        let texts: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, ["Title", "Body ", "text"]);
    }

    #[test]
    fn unknown_xobjects_are_ignored() {
        let spans = spans_of(b"q /Im0 Do Q BT /F1 10 Tf 0 0 Td (after) Tj ET");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "after");
    }

    #[test]
    fn text_strings_decode_utf16_and_trim() {
        let utf16 = Object::String(vec![0xfe, 0xff, 0x00, 0x48, 0x00, 0x69], lopdf::StringFormat::Literal);
        assert_eq!(text_string(&utf16).as_deref(), Some("Hi"));
        let blank = Object::String(b"  ".to_vec(), lopdf::StringFormat::Literal);
        assert_eq!(text_string(&blank), None);
    }
}
