#![allow(dead_code)]

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Object, ObjectId, Stream, dictionary};
use pdf_writer::{Content, Name, Pdf, Rect, Ref, Str, TextStr};

pub const LETTER: (f32, f32) = (612.0, 792.0);
pub const A4_LANDSCAPE: (f32, f32) = (842.0, 595.0);

pub struct TextLine {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub bold: bool,
    pub fill: Option<[f32; 3]>,
    pub pieces: Vec<Piece>,
}

/// One element of a positioned `TJ` array.
pub enum Piece {
    Text(Vec<u8>),
    Adjust(f32),
}

pub fn line(x: f32, y: f32, size: f32, text: &str) -> TextLine {
    raw_line(x, y, size, text.as_bytes())
}

pub fn raw_line(x: f32, y: f32, size: f32, bytes: &[u8]) -> TextLine {
    TextLine {
        x,
        y,
        size,
        bold: false,
        fill: None,
        pieces: vec![Piece::Text(bytes.to_vec())],
    }
}

impl TextLine {
    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn fill(mut self, r: f32, g: f32, b: f32) -> Self {
        self.fill = Some([r, g, b]);
        self
    }

    pub fn positioned(mut self, pieces: Vec<Piece>) -> Self {
        self.pieces = pieces;
        self
    }
}

pub struct PageSpec {
    pub size: (f32, f32),
    pub lines: Vec<TextLine>,
}

pub fn page(lines: Vec<TextLine>) -> PageSpec {
    PageSpec {
        size: LETTER,
        lines,
    }
}

#[derive(Default)]
pub struct Info<'a> {
    pub title: Option<&'a str>,
    pub author: Option<&'a str>,
}

pub fn write_pdf(path: &Path, pages: &[PageSpec], info: Info) {
    let mut pdf = Pdf::new();

    let catalog_id = Ref::new(1);
    let pages_id = Ref::new(2);
    let regular_id = Ref::new(3);
    let bold_id = Ref::new(4);
    let info_id = Ref::new(5);
    let page_ids: Vec<Ref> = (0..pages.len())
        .map(|i| Ref::new(10 + 2 * i as i32))
        .collect();

    pdf.catalog(catalog_id).pages(pages_id);
    pdf.pages(pages_id)
        .kids(page_ids.iter().copied())
        .count(pages.len() as i32);

    for (i, spec) in pages.iter().enumerate() {
        let content_id = Ref::new(11 + 2 * i as i32);
        let mut content = Content::new();
        for l in &spec.lines {
            if let Some([r, g, b]) = l.fill {
                content.set_fill_rgb(r, g, b);
            }
            let font = if l.bold { Name(b"F2") } else { Name(b"F1") };
            content.begin_text().set_font(font, l.size).next_line(l.x, l.y);
            {
                let mut shown = content.show_positioned();
                let mut items = shown.items();
                for piece in &l.pieces {
                    match piece {
                        Piece::Text(bytes) => {
                            items.show(Str(bytes));
                        }
                        Piece::Adjust(amount) => {
                            items.adjust(*amount);
                        }
                    }
                }
            }
            content.end_text();
            if l.fill.is_some() {
                content.set_fill_gray(0.0);
            }
        }
        pdf.stream(content_id, &content.finish());

        let (width, height) = spec.size;
        pdf.page(page_ids[i])
            .media_box(Rect::new(0.0, 0.0, width, height))
            .parent(pages_id)
            .contents(content_id)
            .resources()
            .fonts()
            .pair(Name(b"F1"), regular_id)
            .pair(Name(b"F2"), bold_id);
    }

    pdf.type1_font(regular_id).base_font(Name(b"Helvetica"));
    pdf.type1_font(bold_id).base_font(Name(b"Helvetica-Bold"));

    if info.title.is_some() || info.author.is_some() {
        let mut doc_info = pdf.document_info(info_id);
        if let Some(title) = info.title {
            doc_info.title(TextStr(title));
        }
        if let Some(author) = info.author {
            doc_info.author(TextStr(author));
        }
    }

    fs::write(path, pdf.finish()).expect("failed to write fixture PDF");
}

/// A page whose text is drawn by Form XObjects.
///
/// The page shows "Cover letter" at y=720 with F1, then draws `/Fm1` under a
/// `cm` translation of (72, 500). `/Fm1` has its own resources (bold `/F7`),
/// a `/Matrix` moving it up 100pt, and draws itself again through `/Again`.
/// `/Fm2` has no resources and uses the page's F1 at y=200.
pub fn write_form_pdf(path: &Path) {
    let mut pdf = Pdf::new();
    let catalog_id = Ref::new(1);
    let pages_id = Ref::new(2);
    let regular_id = Ref::new(3);
    let bold_id = Ref::new(4);
    let page_id = Ref::new(10);
    let content_id = Ref::new(11);
    let form_id = Ref::new(12);
    let footer_id = Ref::new(13);

    pdf.catalog(catalog_id).pages(pages_id);
    pdf.pages(pages_id).kids([page_id]).count(1);

    let mut content = Content::new();
    content
        .begin_text()
        .set_font(Name(b"F1"), 12.0)
        .next_line(72.0, 720.0)
        .show(Str(b"Cover letter"))
        .end_text();
    content
        .save_state()
        .transform([1.0, 0.0, 0.0, 1.0, 72.0, 500.0])
        .x_object(Name(b"Fm1"))
        .restore_state();
    content.x_object(Name(b"Fm2"));
    pdf.stream(content_id, &content.finish());

    {
        let mut page = pdf.page(page_id);
        page.media_box(Rect::new(0.0, 0.0, LETTER.0, LETTER.1))
            .parent(pages_id)
            .contents(content_id);
        let mut resources = page.resources();
        resources.fonts().pair(Name(b"F1"), regular_id);
        resources
            .x_objects()
            .pair(Name(b"Fm1"), form_id)
            .pair(Name(b"Fm2"), footer_id);
    }

    let mut stamp = Content::new();
    stamp
        .begin_text()
        .set_font(Name(b"F7"), 12.0)
        .next_line(0.0, 0.0)
        .show(Str(b"Stamped inside a form"))
        .end_text();
    stamp.x_object(Name(b"Again"));
    let stamp = stamp.finish();
    {
        let mut form = pdf.form_xobject(form_id, &stamp);
        form.bbox(Rect::new(0.0, 0.0, 400.0, 200.0))
            .matrix([1.0, 0.0, 0.0, 1.0, 0.0, 100.0]);
        let mut resources = form.resources();
        resources.fonts().pair(Name(b"F7"), bold_id);
        resources.x_objects().pair(Name(b"Again"), form_id);
    }

    let mut footer = Content::new();
    footer
        .begin_text()
        .set_font(Name(b"F1"), 12.0)
        .next_line(72.0, 200.0)
        .show(Str(b"Footer form"))
        .end_text();
    let footer = footer.finish();
    pdf.form_xobject(footer_id, &footer)
        .bbox(Rect::new(0.0, 0.0, LETTER.0, LETTER.1));

    pdf.type1_font(regular_id).base_font(Name(b"Helvetica"));
    pdf.type1_font(bold_id).base_font(Name(b"Helvetica-Bold"));

    fs::write(path, pdf.finish()).expect("failed to write fixture PDF");
}

/// A document assembled object by object with lopdf, for structures pdf-writer
/// does not emit: encryption dictionaries, empty page trees, broken streams.
pub struct RawPdf {
    pub doc: lopdf::Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl RawPdf {
    pub fn new() -> Self {
        let mut doc = lopdf::Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        RawPdf {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// Adds a Letter page with the given content stream and `/Font` resources.
    /// Returns the content stream's id.
    pub fn page(&mut self, content: Stream, fonts: Dictionary) -> ObjectId {
        let content_id = self.doc.add_object(content);
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => fonts },
        });
        self.kids.push(page_id.into());
        content_id
    }

    /// Helvetica as `/F1`.
    pub fn helvetica(&mut self) -> Dictionary {
        let font_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        dictionary! { "F1" => font_id }
    }

    /// Writes the page tree and catalog. The document can still be edited before saving.
    pub fn finish(mut self) -> lopdf::Document {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc
    }
}

pub fn save_raw(doc: &mut lopdf::Document, path: &Path) {
    doc.save(path).expect("failed to write fixture PDF");
}

pub fn output_dir(test: &str) -> PathBuf {
    let dir = PathBuf::from("tests/output").join(test);
    fs::create_dir_all(&dir).expect("failed to create tests/output");
    dir
}

pub fn read_part(docx: &Path, name: &str) -> String {
    let file = fs::File::open(docx).expect("DOCX not written");
    let mut archive = zip::ZipArchive::new(file).expect("output is not a ZIP package");
    let mut xml = String::new();
    archive
        .by_name(name)
        .unwrap_or_else(|_| panic!("{name} missing from package"))
        .read_to_string(&mut xml)
        .unwrap();
    xml
}

const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Text of each body paragraph, in document order.
pub fn paragraph_texts(document_xml: &str) -> Vec<String> {
    let xml = roxmltree::Document::parse(document_xml).expect("document.xml is not well-formed");
    xml.descendants()
        .filter(|n| n.tag_name().name() == "p" && n.tag_name().namespace() == Some(WML_NS))
        .map(|p| {
            p.descendants()
                .filter(|n| n.tag_name().name() == "t" && n.tag_name().namespace() == Some(WML_NS))
                .filter_map(|n| n.text())
                .collect::<String>()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

/// `(w, h)` of each section's page size, in twips.
pub fn section_sizes(document_xml: &str) -> Vec<(String, String)> {
    let xml = roxmltree::Document::parse(document_xml).expect("document.xml is not well-formed");
    xml.descendants()
        .filter(|n| n.tag_name().name() == "pgSz" && n.tag_name().namespace() == Some(WML_NS))
        .map(|n| {
            (
                n.attribute((WML_NS, "w")).unwrap_or_default().to_string(),
                n.attribute((WML_NS, "h")).unwrap_or_default().to_string(),
            )
        })
        .collect()
}
