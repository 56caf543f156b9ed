use std::collections::HashMap;

/// A parsed `/ToUnicode` CMap: character codes to Unicode strings.
#[derive(Debug, Default)]
pub(crate) struct ToUnicode {
    map: HashMap<u32, String>,
    /// Byte length of a character code, taken from the codespace ranges.
    pub(crate) code_len: usize,
}

#[derive(Debug, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    Word(String),
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        match b {
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b'<' if data.get(i + 1) == Some(&b'<') => i += 2,
            b'>' if data.get(i + 1) == Some(&b'>') => i += 2,
            b'<' => {
                let start = i + 1;
                let end = data[start..]
                    .iter()
                    .position(|&c| c == b'>')
                    .map_or(data.len(), |p| start + p);
                tokens.push(Token::Hex(decode_hex(&data[start..end])));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(Token::ArrayEnd);
                i += 1;
            }
            b'(' => {
                // Literal strings only appear in CMap headers; skip them.
                let mut depth = 0;
                while i < data.len() {
                    match data[i] {
                        b'\\' => i += 1,
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                i += 1;
            }
            _ if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                i += 1;
                while i < data.len() && !is_delimiter(data[i]) {
                    i += 1;
                }
                tokens.push(Token::Word(
                    String::from_utf8_lossy(&data[start..i]).into_owned(),
                ));
            }
        }
    }
    tokens
}

fn is_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'<' | b'>' | b'[' | b']' | b'(' | b')' | b'%' | b'/')
}

fn decode_hex(digits: &[u8]) -> Vec<u8> {
    let nibbles: Vec<u8> = digits
        .iter()
        .filter_map(|&c| (c as char).to_digit(16).map(|d| d as u8))
        .collect();
    nibbles
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

pub(crate) fn utf16_be(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Destination of a bfrange entry offset by `delta`: the final UTF-16 unit is incremented.
fn offset_destination(dst: &[u8], delta: u32) -> String {
    if dst.len() < 2 {
        return utf16_be(dst);
    }
    let mut units: Vec<u16> = dst
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect();
    if let Some(last) = units.last_mut() {
        *last = last.wrapping_add(delta as u16);
    }
    String::from_utf16_lossy(&units)
}

impl ToUnicode {
    pub(crate) fn parse(data: &[u8]) -> Self {
        let tokens = tokenize(data);
        let mut cmap = ToUnicode::default();
        let mut i = 0;

        while i < tokens.len() {
            let Token::Word(word) = &tokens[i] else {
                i += 1;
                continue;
            };
            match word.as_str() {
                "begincodespacerange" => {
                    i += 1;
                    while let (Some(Token::Hex(lo)), Some(Token::Hex(_))) =
                        (tokens.get(i), tokens.get(i + 1))
                    {
                        cmap.code_len = cmap.code_len.max(lo.len());
                        i += 2;
                    }
                }
                "beginbfchar" => {
                    i += 1;
                    while let (Some(Token::Hex(src)), Some(Token::Hex(dst))) =
                        (tokens.get(i), tokens.get(i + 1))
                    {
                        cmap.note_code_len(src.len());
                        cmap.map.insert(code_value(src), utf16_be(dst));
                        i += 2;
                    }
                }
                "beginbfrange" => {
                    i += 1;
                    loop {
                        let (Some(Token::Hex(lo)), Some(Token::Hex(hi))) =
                            (tokens.get(i), tokens.get(i + 1))
                        else {
                            break;
                        };
                        cmap.note_code_len(lo.len());
                        let (lo_val, hi_val) = (code_value(lo), code_value(hi));
                        match tokens.get(i + 2) {
                            Some(Token::Hex(dst)) => {
                                for code in lo_val..=hi_val.min(lo_val.saturating_add(0xFFFF)) {
                                    cmap.map.insert(code, offset_destination(dst, code - lo_val));
                                }
                                i += 3;
                            }
                            Some(Token::ArrayStart) => {
                                i += 3;
                                let mut code = lo_val;
                                let mut in_range = true;
                                while let Some(Token::Hex(dst)) = tokens.get(i) {
                                    if in_range && code <= hi_val {
                                        cmap.map.insert(code, utf16_be(dst));
                                    }
                                    match code.checked_add(1) {
                                        Some(next) => code = next,
                                        None => in_range = false,
                                    }
                                    i += 1;
                                }
                                if tokens.get(i) == Some(&Token::ArrayEnd) {
                                    i += 1;
                                }
                            }
                            _ => break,
                        }
                    }
                }
                _ => i += 1,
            }
        }

        if cmap.code_len == 0 {
            cmap.code_len = 1;
        }
        cmap
    }

    fn note_code_len(&mut self, len: usize) {
        if self.code_len == 0 {
            self.code_len = len;
        }
    }

    pub(crate) fn lookup(&self, code: u32) -> Option<&str> {
        self.map.get(&code).map(String::as_str)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
