//! UTF-16 code-unit chunk chain
//!
//! Backs produced strings from sources that already deliver decoded text
//! (tree walks). Only the most recently freed chunk buffer is kept for reuse.

use super::arena::{ChunkArena, ChunkWriter, FreePolicy, DEFAULT_CHUNK_SHIFT};
use super::{ProducedRange, Producer};
use crate::pool::hasher;

#[derive(Debug)]
pub struct CharChunks {
    arena: ChunkArena<u16>,
    writer: ChunkWriter,
    scratch: Vec<u16>,
}

impl CharChunks {
    pub fn new() -> Self {
        Self::with_shift(DEFAULT_CHUNK_SHIFT)
    }

    pub fn with_shift(shift: u32) -> Self {
        Self {
            arena: ChunkArena::with_shift(FreePolicy::MostRecent, shift),
            writer: ChunkWriter::default(),
            scratch: Vec::new(),
        }
    }

    /// Append code units
    pub fn append(&mut self, units: &[u16]) -> ProducedRange {
        let (start, offset) = self.arena.append(&mut self.writer, units);
        ProducedRange::new(Producer::Chars, start, offset, units.len())
    }

    /// Append a string's code units, returning the range and its symbol hash
    pub fn append_str(&mut self, text: &str) -> (ProducedRange, u32) {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        scratch.extend(text.encode_utf16());
        let hash = hasher::hash_units(&scratch);
        let range = self.append(&scratch);
        self.scratch = scratch;
        (range, hash)
    }

    /// Code units of a range
    pub fn units<'a>(&'a self, range: &ProducedRange) -> impl Iterator<Item = u16> + 'a {
        self.arena
            .slices(range.start(), range.offset(), range.len())
            .flat_map(|slice| slice.iter().copied())
    }

    /// Materialize a range, `None` if its chunks are gone
    pub fn to_string(&self, range: &ProducedRange) -> Option<String> {
        let units = self.arena.read_range(range.start(), range.offset(), range.len())?;
        Some(String::from_utf16_lossy(&units))
    }

    /// Compare two ranges without materializing either
    pub fn equals(&self, a: &ProducedRange, b: &ProducedRange) -> bool {
        self.arena.equals_range(
            (a.start(), a.offset(), a.len()),
            (b.start(), b.offset(), b.len()),
        )
    }

    /// Compare a range with code units
    pub fn equals_units(&self, range: &ProducedRange, units: &[u16]) -> bool {
        self.arena
            .equals_slice(range.start(), range.offset(), range.len(), units)
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

    pub fn arena(&self) -> &ChunkArena<u16> {
        &self.arena
    }
}

impl Default for CharChunks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_read_across_chunks() {
        let mut chunks = CharChunks::with_shift(2);
        let (first, _) = chunks.append_str("abc");
        let (second, hash) = chunks.append_str("defghij");
        assert_eq!(chunks.to_string(&first).as_deref(), Some("abc"));
        assert_eq!(chunks.to_string(&second).as_deref(), Some("defghij"));
        assert_eq!(hash, hasher::hash_str("defghij"));
        assert_eq!(chunks.arena().live_chunks(), 3);
        chunks.release(first);
        chunks.release(second);
    }

    #[test]
    fn test_equality_first_difference_at_boundary() {
        let mut chunks = CharChunks::with_shift(2);
        // "wxyz" fills chunk 0; the second copy starts at chunk 1
        let (a, _) = chunks.append_str("wxyz1234");
        let (b, _) = chunks.append_str("wxyz1234");
        let (c, _) = chunks.append_str("wxyz5234");
        let (d, _) = chunks.append_str("wxyz123");
        assert!(chunks.equals(&a, &b));
        assert!(!chunks.equals(&a, &c));
        assert!(!chunks.equals(&a, &d));
        let expected: Vec<u16> = "wxyz5234".encode_utf16().collect();
        assert!(chunks.equals_units(&c, &expected));
        assert!(!chunks.equals_units(&a, &expected));
    }

    #[test]
    fn test_old_chunks_reclaimed_after_clear() {
        let mut chunks = CharChunks::with_shift(2);
        for _ in 0..10 {
            let (range, _) = chunks.append_str("abcd");
            chunks.release(range);
            chunks.clear_previous();
        }
        assert_eq!(chunks.arena().live_chunks(), 1);
        assert!(chunks.arena().spare_buffers() <= 1);
    }

    #[test]
    fn test_surrogates_stored_as_units() {
        let mut chunks = CharChunks::with_shift(2);
        let (range, _) = chunks.append_str("a😀b");
        assert_eq!(range.len(), 4);
        assert_eq!(chunks.to_string(&range).as_deref(), Some("a😀b"));
        chunks.release(range);
    }
}
