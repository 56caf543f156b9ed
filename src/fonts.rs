use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object};

use crate::cmap::{ToUnicode, utf16_be};
use crate::pdf::{dict_get, number, resolve};

/// Width used for glyphs the font dictionary gives no metrics for, in 1/1000 em.
const FALLBACK_WIDTH: f32 = 500.0;
const FALLBACK_SPACE_WIDTH: f32 = 250.0;
/// CIDs are 16-bit; `/W` entries beyond this are ignored.
const MAX_CID: u32 = 0xFFFF;

/// A font resource as far as text extraction needs it.
pub(crate) struct Font {
    pub(crate) family: String,
    pub(crate) bold: bool,
    pub(crate) italic: bool,
    composite: bool,
    first_char: u32,
    widths: Vec<f32>,
    cid_widths: HashMap<u32, f32>,
    default_width: Option<f32>,
    to_unicode: Option<ToUnicode>,
}

/// One decoded character code.
pub(crate) struct Glyph {
    pub(crate) text: Option<String>,
    /// Advance in 1/1000 em.
    pub(crate) width: f32,
    /// Single-byte code 32, which receives word spacing.
    pub(crate) is_space: bool,
}

/// Standard 14 families mapped to the fonts Word ships with.
const STANDARD_FAMILIES: &[(&str, &str)] = &[
    ("helvetica", "Arial"),
    ("arial", "Arial"),
    ("times", "Times New Roman"),
    ("times roman", "Times New Roman"),
    ("courier", "Courier New"),
];

fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.bytes().all(|b| b.is_ascii_uppercase()) => rest,
        _ => name,
    }
}

/// "TimesNewRomanPSMT" -> "Times New Roman"
fn humanize_family(raw: &str) -> String {
    let mut base = raw;
    for suffix in ["PSMT", "PS", "MT"] {
        if let Some(stripped) = base.strip_suffix(suffix)
            && !stripped.is_empty()
        {
            base = stripped;
            break;
        }
    }

    let mut out = String::with_capacity(base.len() + 4);
    let mut prev: Option<char> = None;
    for c in base.chars() {
        if c.is_ascii_uppercase() && prev.is_some_and(|p| p.is_ascii_lowercase()) {
            out.push(' ');
        }
        out.push(c);
        prev = Some(c);
    }

    let lower = out.to_lowercase();
    STANDARD_FAMILIES
        .iter()
        .find(|(k, _)| *k == lower)
        .map(|(_, v)| v.to_string())
        .unwrap_or(out)
}

/// Family, bold and italic from a `/BaseFont` name.
pub(crate) fn parse_base_font(name: &str) -> (String, bool, bool) {
    let name = strip_subset_prefix(name);
    let raw_family = name.split(['-', ',']).next().unwrap_or(name);
    let family = humanize_family(raw_family);

    let lower = name.to_lowercase();
    let bold = ["bold", "black", "heavy", "demi"]
        .iter()
        .any(|w| lower.contains(w));
    let italic = lower.contains("italic") || lower.contains("oblique");
    (family, bold, italic)
}

fn name_of(obj: &Object) -> Option<String> {
    match obj {
        Object::Name(n) => Some(String::from_utf8_lossy(n).into_owned()),
        _ => None,
    }
}

fn parse_cid_widths(doc: &Document, w: &Object) -> HashMap<u32, f32> {
    let mut widths = HashMap::new();
    let Object::Array(items) = resolve(doc, w) else {
        return widths;
    };
    let mut i = 0;
    while i < items.len() {
        let Some(first) = number(resolve(doc, &items[i])) else {
            break;
        };
        let first = first as u32;
        match items.get(i + 1).map(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (cid, obj) in (first..=MAX_CID).zip(list) {
                    if let Some(width) = number(resolve(doc, obj)) {
                        widths.insert(cid, width);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(width)) = (
                    number(last),
                    items.get(i + 2).and_then(|o| number(resolve(doc, o))),
                ) else {
                    break;
                };
                let last = (last as u32).min(first.saturating_add(MAX_CID)).min(MAX_CID);
                if last >= first {
                    for cid in first..=last {
                        widths.insert(cid, width);
                    }
                } else {
                    log::debug!("skipping /W range {first}-{last}");
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

fn read_to_unicode(doc: &Document, font: &Dictionary) -> Option<ToUnicode> {
    let Object::Stream(stream) = resolve(doc, dict_get(font, b"ToUnicode")?) else {
        return None;
    };
    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    let cmap = ToUnicode::parse(&data);
    (!cmap.is_empty()).then_some(cmap)
}

fn win_ansi(code: u8) -> Option<char> {
    let c = match code {
        0x80 => '\u{20ac}',
        0x82 => '\u{201a}',
        0x83 => '\u{0192}',
        0x84 => '\u{201e}',
        0x85 => '\u{2026}',
        0x86 => '\u{2020}',
        0x87 => '\u{2021}',
        0x88 => '\u{02c6}',
        0x89 => '\u{2030}',
        0x8a => '\u{0160}',
        0x8b => '\u{2039}',
        0x8c => '\u{0152}',
        0x8e => '\u{017d}',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201c}',
        0x94 => '\u{201d}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0x98 => '\u{02dc}',
        0x99 => '\u{2122}',
        0x9a => '\u{0161}',
        0x9b => '\u{203a}',
        0x9c => '\u{0153}',
        0x9e => '\u{017e}',
        0x9f => '\u{0178}',
        0x00..=0x1f | 0x7f | 0x81 | 0x8d | 0x8f | 0x90 | 0x9d => return None,
        _ => code as char,
    };
    Some(c)
}

impl Font {
    /// Used when a `Tf` names a resource the page does not define.
    pub(crate) fn fallback() -> Self {
        Font {
            family: "Arial".to_string(),
            bold: false,
            italic: false,
            composite: false,
            first_char: 0,
            widths: Vec::new(),
            cid_widths: HashMap::new(),
            default_width: None,
            to_unicode: None,
        }
    }

    pub(crate) fn from_dict(doc: &Document, dict: &Dictionary) -> Self {
        let base_font = dict_get(dict, b"BaseFont")
            .and_then(|o| name_of(resolve(doc, o)))
            .unwrap_or_default();
        let (family, mut bold, mut italic) = if base_font.is_empty() {
            ("Arial".to_string(), false, false)
        } else {
            parse_base_font(&base_font)
        };

        let composite =
            dict_get(dict, b"Subtype").and_then(|o| name_of(resolve(doc, o))).as_deref() == Some("Type0");

        let descendant = composite
            .then(|| match dict_get(dict, b"DescendantFonts").map(|o| resolve(doc, o)) {
                Some(Object::Array(list)) => list.first().map(|o| resolve(doc, o)),
                _ => None,
            })
            .flatten()
            .and_then(|o| o.as_dict().ok());

        let metrics = descendant.unwrap_or(dict);
        if let Some(Object::Dictionary(descriptor)) =
            dict_get(metrics, b"FontDescriptor").map(|o| resolve(doc, o))
        {
            let flags = dict_get(descriptor, b"Flags")
                .and_then(|o| number(resolve(doc, o)))
                .unwrap_or(0.0) as u32;
            italic |= flags & (1 << 6) != 0;
            bold |= flags & (1 << 18) != 0;
            bold |= dict_get(descriptor, b"FontWeight")
                .and_then(|o| number(resolve(doc, o)))
                .is_some_and(|w| w >= 600.0);
        }

        let mut font = Font {
            family,
            bold,
            italic,
            composite,
            to_unicode: read_to_unicode(doc, dict),
            ..Font::fallback()
        };

        if composite {
            font.default_width = Some(
                dict_get(metrics, b"DW")
                    .and_then(|o| number(resolve(doc, o)))
                    .unwrap_or(1000.0),
            );
            if let Some(w) = dict_get(metrics, b"W") {
                font.cid_widths = parse_cid_widths(doc, w);
            }
        } else {
            font.first_char = dict_get(dict, b"FirstChar")
                .and_then(|o| number(resolve(doc, o)))
                .unwrap_or(0.0) as u32;
            if let Some(Object::Array(list)) = dict_get(dict, b"Widths").map(|o| resolve(doc, o)) {
                font.widths = list
                    .iter()
                    .map(|o| number(resolve(doc, o)).unwrap_or(0.0))
                    .collect();
            }
        }

        font
    }

    fn code_len(&self) -> usize {
        match (&self.to_unicode, self.composite) {
            (Some(cmap), true) => cmap.code_len.clamp(1, 4),
            (_, true) => 2,
            (_, false) => 1,
        }
    }

    fn width_of(&self, code: u32) -> f32 {
        if self.composite {
            return self
                .cid_widths
                .get(&code)
                .copied()
                .or(self.default_width)
                .unwrap_or(1000.0);
        }
        let width = code
            .checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .filter(|w| *w > 0.0);
        match width {
            Some(w) => w,
            None if code == 32 => FALLBACK_SPACE_WIDTH,
            None => FALLBACK_WIDTH,
        }
    }

    pub(crate) fn decode(&self, bytes: &[u8]) -> Vec<Glyph> {
        if !self.composite && self.to_unicode.is_none() && bytes.starts_with(&[0xfe, 0xff]) {
            return utf16_be(&bytes[2..])
                .chars()
                .map(|c| Glyph {
                    text: Some(c.to_string()),
                    width: if c == ' ' { FALLBACK_SPACE_WIDTH } else { FALLBACK_WIDTH },
                    is_space: c == ' ',
                })
                .collect();
        }

        let code_len = self.code_len();
        bytes
            .chunks(code_len)
            .map(|chunk| {
                let code = chunk.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
                let mapped = self.to_unicode.as_ref().and_then(|cmap| cmap.lookup(code));
                let text = match mapped {
                    Some(s) => Some(s.to_string()),
                    None if !self.composite => win_ansi(code as u8).map(String::from),
                    None => None,
                };
                Glyph {
                    text,
                    width: self.width_of(code),
                    is_space: code_len == 1 && code == 32,
                }
            })
            .collect()
    }
}
