use std::fmt::Write as _;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Error;
use crate::model::{Alignment, Document, Margins, Page, Paragraph, Run};

const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

const CONTENT_TYPES: &str = r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/><Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/></Types>"#;

const DEFAULT_FONT: &str = "Arial";
const DEFAULT_HALF_POINTS: u32 = 22;

fn pts_to_twips(pts: f32) -> i64 {
    (pts * 20.0).round() as i64
}

fn half_points(pts: f32) -> u32 {
    (pts * 2.0).round().max(2.0) as u32
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{d7ff}' | '\u{e000}'..='\u{fffd}' | '\u{10000}'..='\u{10ffff}')
}

/// Escapes text for element content and attribute values, dropping characters XML 1.0 forbids.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars().filter(|&c| is_xml_char(c)) {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' | '\n' | '\r' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

fn write_run(xml: &mut String, run: &Run) {
    let font = escape(&run.font_name);
    let size = half_points(run.font_size);
    xml.push_str("<w:r><w:rPr>");
    let _ = write!(
        xml,
        r#"<w:rFonts w:ascii="{font}" w:hAnsi="{font}" w:cs="{font}"/>"#
    );
    if run.bold {
        xml.push_str("<w:b/>");
    }
    if run.italic {
        xml.push_str("<w:i/>");
    }
    if let Some([r, g, b]) = run.color {
        let _ = write!(xml, r#"<w:color w:val="{r:02X}{g:02X}{b:02X}"/>"#);
    }
    let _ = write!(xml, r#"<w:sz w:val="{size}"/><w:szCs w:val="{size}"/>"#);
    let _ = write!(
        xml,
        r#"</w:rPr><w:t xml:space="preserve">{}</w:t></w:r>"#,
        escape(&run.text)
    );
}

fn write_section(xml: &mut String, page: &Page) {
    let Margins {
        top,
        right,
        bottom,
        left,
    } = page.margins;
    let orient = if page.width > page.height {
        r#" w:orient="landscape""#
    } else {
        ""
    };
    let _ = write!(
        xml,
        r#"<w:sectPr><w:pgSz w:w="{}" w:h="{}"{orient}/><w:pgMar w:top="{}" w:right="{}" w:bottom="{}" w:left="{}" w:header="0" w:footer="0" w:gutter="0"/></w:sectPr>"#,
        pts_to_twips(page.width),
        pts_to_twips(page.height),
        pts_to_twips(top),
        pts_to_twips(right),
        pts_to_twips(bottom),
        pts_to_twips(left),
    );
}

/// Writes a paragraph; `section` closes a section with that page's properties.
fn write_paragraph(xml: &mut String, para: Option<&Paragraph>, section: Option<&Page>) {
    xml.push_str("<w:p><w:pPr>");
    let space_before = para.map_or(0, |p| pts_to_twips(p.space_before));
    let _ = write!(
        xml,
        r#"<w:spacing w:before="{space_before}" w:after="0"/>"#
    );
    if let Some(p) = para {
        let left = pts_to_twips(p.indent_left);
        let first_line = pts_to_twips(p.indent_first_line);
        if left != 0 || first_line != 0 {
            let _ = write!(xml, r#"<w:ind w:left="{left}""#);
            if first_line > 0 {
                let _ = write!(xml, r#" w:firstLine="{first_line}""#);
            } else if first_line < 0 {
                let _ = write!(xml, r#" w:hanging="{}""#, -first_line);
            }
            xml.push_str("/>");
        }
        match p.alignment {
            Alignment::Left => {}
            Alignment::Center => xml.push_str(r#"<w:jc w:val="center"/>"#),
            Alignment::Right => xml.push_str(r#"<w:jc w:val="right"/>"#),
        }
    }
    if let Some(page) = section {
        write_section(xml, page);
    }
    xml.push_str("</w:pPr>");
    for run in para.map(|p| p.runs.as_slice()).unwrap_or_default() {
        write_run(xml, run);
    }
    xml.push_str("</w:p>");
}

fn document_xml(doc: &Document) -> String {
    let mut xml = String::from(XML_DECL);
    let _ = write!(
        xml,
        r#"<w:document xmlns:w="{WML_NS}" xmlns:r="{REL_NS}"><w:body>"#
    );

    let page_count = doc.pages.len();
    for (index, page) in doc.pages.iter().enumerate() {
        let is_last_page = index + 1 == page_count;
        let para_count = page.paragraphs.len();
        for (i, para) in page.paragraphs.iter().enumerate() {
            let closes_section = !is_last_page && i + 1 == para_count;
            write_paragraph(&mut xml, Some(para), closes_section.then_some(page));
        }
        if para_count == 0 {
            write_paragraph(&mut xml, None, (!is_last_page).then_some(page));
        }
        if is_last_page {
            write_section(&mut xml, page);
        }
    }

    xml.push_str("</w:body></w:document>");
    xml
}

fn styles_xml() -> String {
    format!(
        r#"{XML_DECL}<w:styles xmlns:w="{WML_NS}"><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="{DEFAULT_FONT}" w:hAnsi="{DEFAULT_FONT}" w:cs="{DEFAULT_FONT}"/><w:sz w:val="{DEFAULT_HALF_POINTS}"/><w:szCs w:val="{DEFAULT_HALF_POINTS}"/></w:rPr></w:rPrDefault><w:pPrDefault><w:pPr><w:spacing w:after="0" w:line="240" w:lineRule="auto"/></w:pPr></w:pPrDefault></w:docDefaults><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style></w:styles>"#
    )
}

fn package_rels() -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="{PKG_REL_NS}"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/><Relationship Id="rId3" Type="{REL_NS}/extended-properties" Target="docProps/app.xml"/></Relationships>"#
    )
}

fn document_rels() -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="{PKG_REL_NS}"><Relationship Id="rId1" Type="{REL_NS}/styles" Target="styles.xml"/></Relationships>"#
    )
}

fn core_xml(doc: &Document) -> String {
    let mut xml = format!(
        r#"{XML_DECL}<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/">"#
    );
    if let Some(title) = &doc.title {
        let _ = write!(xml, "<dc:title>{}</dc:title>", escape(title));
    }
    if let Some(author) = &doc.author {
        let _ = write!(xml, "<dc:creator>{}</dc:creator>", escape(author));
    }
    xml.push_str("</cp:coreProperties>");
    xml
}

fn app_xml(doc: &Document) -> String {
    format!(
        r#"{XML_DECL}<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties"><Application>{} {}</Application><Pages>{}</Pages></Properties>"#,
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        doc.pages.len()
    )
}

pub fn render(doc: &Document) -> Result<Vec<u8>, Error> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts: [(&str, String); 7] = [
        ("[Content_Types].xml", format!("{XML_DECL}{CONTENT_TYPES}")),
        ("_rels/.rels", package_rels()),
        ("word/document.xml", document_xml(doc)),
        ("word/styles.xml", styles_xml()),
        ("word/_rels/document.xml.rels", document_rels()),
        ("docProps/core.xml", core_xml(doc)),
        ("docProps/app.xml", app_xml(doc)),
    ];
    for (name, content) in parts {
        zip.start_file(name, options)?;
        zip.write_all(content.as_bytes())?;
    }

    Ok(zip.finish()?.into_inner())
}
