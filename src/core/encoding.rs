//! Input encoding
//!
//! The text source parses UTF-8 only. UTF-16 input, recognized by its byte
//! order mark or by a `<` next to a zero byte, is transcoded up front; a
//! UTF-8 BOM is dropped. Line breaks are folded to LF on the raw input, so
//! a `&#13;` decoded later stays a CR.

use memchr::memchr;

use crate::error::XmlError;

/// Encoding detected from the first bytes of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

impl XmlEncoding {
    pub fn detect(input: &[u8]) -> Self {
        match input {
            [0xFF, 0xFE, ..] | [b'<', 0x00, ..] => XmlEncoding::Utf16Le,
            [0xFE, 0xFF, ..] | [0x00, b'<', ..] => XmlEncoding::Utf16Be,
            _ => XmlEncoding::Utf8,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            XmlEncoding::Utf8 => "UTF-8",
            XmlEncoding::Utf16Le => "UTF-16LE",
            XmlEncoding::Utf16Be => "UTF-16BE",
        }
    }

    fn unit(self, pair: [u8; 2]) -> u16 {
        match self {
            XmlEncoding::Utf16Be => u16::from_be_bytes(pair),
            _ => u16::from_le_bytes(pair),
        }
    }
}

/// Transcode a document to UTF-8, returning the detected encoding
pub fn convert_to_utf8(mut input: Vec<u8>) -> Result<(Vec<u8>, XmlEncoding), XmlError> {
    let encoding = XmlEncoding::detect(&input);
    if encoding == XmlEncoding::Utf8 {
        if input.starts_with(UTF8_BOM) {
            input.drain(..UTF8_BOM.len());
        }
        return Ok((input, encoding));
    }

    let body = match input.as_slice() {
        [0xFF, 0xFE, rest @ ..] | [0xFE, 0xFF, rest @ ..] => rest,
        all => all,
    };
    if body.len() % 2 != 0 {
        return Err(XmlError::Encoding(format!(
            "{} input has an odd number of bytes",
            encoding.label()
        )));
    }

    let units = body.chunks_exact(2).map(|pair| encoding.unit([pair[0], pair[1]]));
    let text: String = char::decode_utf16(units)
        .collect::<Result<_, _>>()
        .map_err(|e| XmlError::Encoding(format!("invalid {}: {e}", encoding.label())))?;
    Ok((text.into_bytes(), encoding))
}

/// Fold CRLF and lone CR into LF
pub fn normalize_line_endings(mut input: Vec<u8>) -> Vec<u8> {
    let Some(first) = memchr(b'\r', &input) else {
        return input;
    };
    let mut write = first;
    let mut read = first;
    while read < input.len() {
        let b = input[read];
        read += 1;
        if b == b'\r' {
            input[write] = b'\n';
            if input.get(read) == Some(&b'\n') {
                read += 1;
            }
        } else {
            input[write] = b;
        }
        write += 1;
    }
    input.truncate(write);
    input
}
