//! Chunked text storage
//!
//! - `arena`: generation-checked, reference-counted chunk chains
//! - `chars`: UTF-16 code-unit chunks
//! - `utf8`: UTF-8 byte chunks decoded to code units on read
//! - `chunky`: array-of-arrays buffers for input bytes and accumulated text
//!
//! Text appended to a chunk chain comes back as a [`ProducedRange`], which
//! owns one claim on every chunk it covers until it is released.

pub mod arena;
pub mod chars;
pub mod chunky;
pub mod utf8;

pub use arena::{ChunkArena, ChunkId, ChunkWriter, FreePolicy, DEFAULT_CHUNK_SHIFT};
pub use chars::CharChunks;
pub use chunky::{ChunkyByteArray, ChunkyCharArray};
pub use utf8::{LineEndings, Utf8Chunks};

/// Which chunk chain a range lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Producer {
    Chars,
    Utf8,
}

/// A claimed range of produced text
///
/// Not `Clone`: the range owns its chunk claims and gives them back exactly
/// once, either by being released or by being adopted into a pool entry.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a produced range holds chunk claims until released"]
pub struct ProducedRange {
    producer: Producer,
    start: ChunkId,
    offset: usize,
    len: usize,
}

impl ProducedRange {
    pub(crate) fn new(producer: Producer, start: ChunkId, offset: usize, len: usize) -> Self {
        Self {
            producer,
            start,
            offset,
            len,
        }
    }

    pub fn producer(&self) -> Producer {
        self.producer
    }

    pub fn start(&self) -> ChunkId {
        self.start
    }

    /// Absolute offset of the first unit (or byte)
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length in stored units (code units or bytes)
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
