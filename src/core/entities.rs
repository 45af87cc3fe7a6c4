//! References in text
//!
//! Text is split into [`Segment`]s at `&...;` boundaries. The five built-in
//! entities and character references decode in place; general entity
//! references are handed back by name, since only the DTD knows their
//! replacement text. Text without `&` is returned borrowed.

use memchr::memchr;
use std::borrow::Cow;

use super::scanner::{is_name_char, is_name_start_char};

/// A piece of text content split at reference boundaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Literal bytes with no references
    Literal(&'a [u8]),
    /// A character reference or built-in entity, already decoded
    Char(char),
    /// A general entity reference by name (without `&` and `;`)
    Entity(&'a [u8]),
    /// A malformed reference, kept literally
    Malformed(&'a [u8]),
}

/// Iterator splitting text into [`Segment`]s
pub struct Segments<'a> {
    input: &'a [u8],
    pos: usize,
}

/// Split text content at `&...;` boundaries
pub fn segments(input: &[u8]) -> Segments<'_> {
    Segments { input, pos: 0 }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.input[self.pos..];
        if rest.is_empty() {
            return None;
        }

        match memchr(b'&', rest) {
            Some(0) => {
                let Some(semi) = memchr(b';', rest) else {
                    // No semicolon found, keep the rest literally
                    self.pos = self.input.len();
                    return Some(Segment::Malformed(rest));
                };
                let reference = &rest[1..semi];
                if reference.first() != Some(&b'#') && !is_name(reference) {
                    // Not a reference at all: a bare '&' in lenient input
                    self.pos += 1;
                    return Some(Segment::Malformed(&rest[..1]));
                }
                self.pos += semi + 1;
                Some(match decode_reference(reference) {
                    Some(c) => Segment::Char(c),
                    None if reference.first() == Some(&b'#') => {
                        Segment::Malformed(&rest[..semi + 1])
                    }
                    None => Segment::Entity(reference),
                })
            }
            Some(amp) => {
                self.pos += amp;
                Some(Segment::Literal(&rest[..amp]))
            }
            None => {
                self.pos = self.input.len();
                Some(Segment::Literal(rest))
            }
        }
    }
}

fn is_name(bytes: &[u8]) -> bool {
    match bytes.split_first() {
        Some((&first, rest)) => is_name_start_char(first) && rest.iter().all(|&b| is_name_char(b)),
        None => false,
    }
}

/// Decode built-in and character references; general entity references stay as written
#[inline]
pub fn decode_text(input: &[u8]) -> Cow<'_, [u8]> {
    match memchr(b'&', input) {
        None => Cow::Borrowed(input),
        Some(_) => Cow::Owned(decode_entities(input)),
    }
}

/// Decode all built-in and character references in the input
pub fn decode_entities(input: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let mut utf8 = [0u8; 4];

    for segment in segments(input) {
        match segment {
            Segment::Literal(bytes) | Segment::Malformed(bytes) => result.extend_from_slice(bytes),
            Segment::Char(c) => result.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes()),
            Segment::Entity(name) => {
                result.push(b'&');
                result.extend_from_slice(name);
                result.push(b';');
            }
        }
    }

    result
}

/// Decode a single reference body (between `&` and `;`)
pub fn decode_reference(reference: &[u8]) -> Option<char> {
    match reference {
        b"lt" => Some('<'),
        b"gt" => Some('>'),
        b"amp" => Some('&'),
        b"quot" => Some('"'),
        b"apos" => Some('\''),
        [b'#', digits @ ..] => decode_numeric_entity(digits),
        _ => None,
    }
}

/// `#65` / `#x41` body of a character reference; `None` unless it names a Char
fn decode_numeric_entity(body: &[u8]) -> Option<char> {
    let (digits, radix) = match body {
        [b'x' | b'X', hex @ ..] => (hex, 16),
        decimal => (decimal, 10),
    };
    if !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let codepoint = u32::from_str_radix(std::str::from_utf8(digits).ok()?, radix).ok()?;
    if is_valid_xml_char(codepoint) {
        char::from_u32(codepoint)
    } else {
        None
    }
}

/// XML 1.0 `Char`: tab, LF, CR and the non-surrogate ranges above U+0020
#[inline]
pub fn is_valid_xml_char(codepoint: u32) -> bool {
    matches!(
        codepoint,
        0x9 | 0xA | 0xD | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF
    )
}

/// Extract the general entity names referenced by an entity value
pub fn entity_references(value: &[u8]) -> Vec<Vec<u8>> {
    segments(value)
        .filter_map(|segment| match segment {
            Segment::Entity(name) => Some(name.to_vec()),
            _ => None,
        })
        .collect()
}
