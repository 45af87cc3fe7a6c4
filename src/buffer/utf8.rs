//! UTF-8 byte chunk chain
//!
//! Stores raw UTF-8 bytes and decodes them to UTF-16 code units on read.
//! Decoding emits surrogate pairs for supplementary code points and, unless
//! the chain is set to [`LineEndings::Preserve`], folds CRLF and lone CR into
//! LF, also when the pair straddles a chunk boundary. Every released chunk
//! buffer is kept for reuse.

use std::iter::Peekable;

use super::arena::{ChunkArena, ChunkWriter, FreePolicy, DEFAULT_CHUNK_SHIFT};
use super::{ProducedRange, Producer};
use crate::pool::hasher;

const REPLACEMENT: u32 = 0xFFFD;

/// Line break handling while decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEndings {
    /// CRLF and lone CR become LF
    #[default]
    Normalize,
    /// Bytes decode as written; for text whose line breaks were already handled
    Preserve,
}

#[derive(Debug)]
pub struct Utf8Chunks {
    arena: ChunkArena<u8>,
    writer: ChunkWriter,
    line_endings: LineEndings,
}

impl Utf8Chunks {
    pub fn new() -> Self {
        Self::with_shift(DEFAULT_CHUNK_SHIFT)
    }

    pub fn with_shift(shift: u32) -> Self {
        Self {
            arena: ChunkArena::with_shift(FreePolicy::All, shift),
            writer: ChunkWriter::default(),
            line_endings: LineEndings::Normalize,
        }
    }

    /// Change line break handling; ranges already appended keep their hash
    pub fn set_line_endings(&mut self, line_endings: LineEndings) {
        self.line_endings = line_endings;
    }

    pub fn line_endings(&self) -> LineEndings {
        self.line_endings
    }

    /// Append bytes, returning the range and the symbol hash of the decoded text
    pub fn append(&mut self, bytes: &[u8]) -> (ProducedRange, u32) {
        let units = Utf16Units::with_line_endings(bytes.iter().copied(), self.line_endings);
        let hash = hasher::finish(units.fold(hasher::SEED, hasher::fold_char));
        let (start, offset) = self.arena.append(&mut self.writer, bytes);
        (ProducedRange::new(Producer::Utf8, start, offset, bytes.len()), hash)
    }

    /// Decoded code units of a range
    pub fn units<'a>(&'a self, range: &ProducedRange) -> Utf16Units<impl Iterator<Item = u8> + 'a> {
        Utf16Units::with_line_endings(
            self.arena
                .slices(range.start(), range.offset(), range.len())
                .flat_map(|slice| slice.iter().copied()),
            self.line_endings,
        )
    }

    /// Materialize a range, `None` if its chunks are gone
    pub fn to_string(&self, range: &ProducedRange) -> Option<String> {
        let bytes = self.arena.read_range(range.start(), range.offset(), range.len())?;
        let units: Vec<u16> = Utf16Units::with_line_endings(bytes.into_iter(), self.line_endings).collect();
        Some(String::from_utf16_lossy(&units))
    }

    /// Compare the decoded text of two ranges without materializing either
    pub fn equals(&self, a: &ProducedRange, b: &ProducedRange) -> bool {
        self.units(a).eq(self.units(b))
    }

    /// Compare the decoded text of a range with code units
    pub fn equals_units(&self, range: &ProducedRange, units: &[u16]) -> bool {
        self.units(range).eq(units.iter().copied())
    }

    /// Give back a range's claims
    pub fn release(&mut self, range: ProducedRange) {
        self.arena
            .release_range(range.start(), range.offset(), range.len());
    }

    /// Stop keeping chunks before the one being written alive
    pub fn clear_previous(&mut self) {
        if let Some(current) = self.writer.current() {
            self.arena.clear_previous_chunk(current);
        }
    }

    pub fn reset(&mut self) {
        self.arena.reset(&mut self.writer);
    }

    pub fn arena(&self) -> &ChunkArena<u8> {
        &self.arena
    }
}

impl Default for Utf8Chunks {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes a UTF-8 byte stream into UTF-16 code units
///
/// Malformed sequences decode to U+FFFD.
pub struct Utf16Units<I: Iterator<Item = u8>> {
    bytes: Peekable<I>,
    low_surrogate: Option<u16>,
    line_endings: LineEndings,
}

impl<I: Iterator<Item = u8>> Utf16Units<I> {
    /// Decoder folding line breaks into LF
    pub fn new(bytes: I) -> Self {
        Self::with_line_endings(bytes, LineEndings::Normalize)
    }

    pub fn with_line_endings(bytes: I, line_endings: LineEndings) -> Self {
        Self {
            bytes: bytes.peekable(),
            low_surrogate: None,
            line_endings,
        }
    }

    fn continuation(&mut self, mut code_point: u32, count: usize) -> u32 {
        for _ in 0..count {
            match self.bytes.peek() {
                Some(&b) if b & 0xC0 == 0x80 => {
                    self.bytes.next();
                    code_point = (code_point << 6) | (b & 0x3F) as u32;
                }
                _ => return REPLACEMENT,
            }
        }
        code_point
    }
}

impl<I: Iterator<Item = u8>> Iterator for Utf16Units<I> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        if let Some(low) = self.low_surrogate.take() {
            return Some(low);
        }

        let lead = self.bytes.next()?;
        let code_point = match lead {
            b'\r' if self.line_endings == LineEndings::Normalize => {
                if self.bytes.peek() == Some(&b'\n') {
                    self.bytes.next();
                }
                b'\n' as u32
            }
            0x00..=0x7F => lead as u32,
            0xC2..=0xDF => self.continuation((lead & 0x1F) as u32, 1),
            0xE0..=0xEF => self.continuation((lead & 0x0F) as u32, 2),
            0xF0..=0xF4 => self.continuation((lead & 0x07) as u32, 3),
            _ => REPLACEMENT,
        };

        let code_point = match char::from_u32(code_point) {
            Some(c) => c as u32,
            None => REPLACEMENT,
        };

        if code_point >= 0x10000 {
            let v = code_point - 0x10000;
            self.low_surrogate = Some(0xDC00 | (v & 0x3FF) as u16);
            Some(0xD800 | (v >> 10) as u16)
        } else {
            Some(code_point as u16)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_sequence_lengths_round_trip() {
        let text = "a\u{e9}\u{20ac}\u{1F600}z";
        let mut chunks = Utf8Chunks::with_shift(2);
        let (range, hash) = chunks.append(text.as_bytes());
        let expected: Vec<u16> = text.encode_utf16().collect();
        let decoded: Vec<u16> = chunks.units(&range).collect();
        assert_eq!(decoded, expected);
        assert_eq!(chunks.to_string(&range).as_deref(), Some(text));
        assert_eq!(hash, hasher::hash_str(text));
        chunks.release(range);
    }

    #[test]
    fn test_line_endings_normalized() {
        let mut chunks = Utf8Chunks::with_shift(3);
        let (range, hash) = chunks.append(b"a\r\nb\rc\nd");
        assert_eq!(chunks.to_string(&range).as_deref(), Some("a\nb\nc\nd"));
        assert_eq!(hash, hasher::hash_str("a\nb\nc\nd"));
        chunks.release(range);
    }

    #[test]
    fn test_preserved_line_endings() {
        let mut chunks = Utf8Chunks::with_shift(2);
        chunks.set_line_endings(LineEndings::Preserve);
        let (range, hash) = chunks.append(b"a\r\nb\rc");
        assert_eq!(chunks.to_string(&range).as_deref(), Some("a\r\nb\rc"));
        assert_eq!(hash, hasher::hash_str("a\r\nb\rc"));
        assert!(chunks.equals_units(&range, &"a\r\nb\rc".encode_utf16().collect::<Vec<_>>()));
        chunks.release(range);
    }

    #[test]
    fn test_crlf_across_chunk_boundary() {
        let mut chunks = Utf8Chunks::with_shift(2);
        // '\r' is the last byte of chunk 0, '\n' the first of chunk 1
        let (range, _) = chunks.append(b"abc\r\nd");
        assert_eq!(chunks.to_string(&range).as_deref(), Some("abc\nd"));
        chunks.release(range);
    }

    #[test]
    fn test_multibyte_across_chunk_boundary() {
        let mut chunks = Utf8Chunks::with_shift(2);
        let (range, _) = chunks.append("ab\u{1F600}".as_bytes());
        assert_eq!(chunks.to_string(&range).as_deref(), Some("ab\u{1F600}"));
        chunks.release(range);
    }

    #[test]
    fn test_equality_on_decoded_text() {
        let mut chunks = Utf8Chunks::with_shift(2);
        let (a, _) = chunks.append(b"line\r\nnext");
        let (b, _) = chunks.append(b"line\nnext");
        let (c, _) = chunks.append(b"line\nnexu");
        assert!(chunks.equals(&a, &b));
        assert!(!chunks.equals(&a, &c));
        let units: Vec<u16> = "line\nnext".encode_utf16().collect();
        assert!(chunks.equals_units(&a, &units));
        assert!(!chunks.equals_units(&a, &units[..8]));
    }

    #[test]
    fn test_malformed_bytes_replaced() {
        let units: Vec<u16> = Utf16Units::new([b'a', 0xFF, 0xE2, 0x82, b'b'].into_iter()).collect();
        assert_eq!(units, vec![b'a' as u16, 0xFFFD, 0xFFFD, b'b' as u16]);
    }

    #[test]
    fn test_freed_buffers_all_kept() {
        let mut chunks = Utf8Chunks::with_shift(2);
        let mut ranges = Vec::new();
        for _ in 0..4 {
            ranges.push(chunks.append(b"wxyz").0);
        }
        for range in ranges {
            chunks.release(range);
        }
        chunks.clear_previous();
        assert_eq!(chunks.arena().live_chunks(), 1);
        assert_eq!(chunks.arena().spare_buffers(), 3);
    }
}
