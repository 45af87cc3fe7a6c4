//! Byte scanner for the text source
//!
//! Delimiter searches go through memchr, which picks SSE2/AVX2/NEON at
//! runtime. Positions are byte offsets into the UTF-8 input and never run
//! past its end.

use memchr::{memchr, memchr3, memchr_iter, memrchr};

use crate::error::Location;

/// Cursor over the document bytes
pub struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    #[inline]
    pub fn new(input: &'a [u8]) -> Self {
        Scanner { input, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move to `pos`, clamped to the input length
    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.input.len());
    }

    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.set_position(self.pos + n);
    }

    #[inline]
    pub fn slice(&self, start: usize, end: usize) -> &'a [u8] {
        &self.input[start..end]
    }

    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.peek_at(0)
    }

    #[inline]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    #[inline]
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.rest().starts_with(prefix)
    }

    /// Skip S (space, tab, CR, LF)
    #[inline]
    pub fn skip_whitespace(&mut self) {
        let skipped = self.rest().iter().take_while(|&&b| is_whitespace(b)).count();
        self.pos += skipped;
    }

    /// Offset of the `>` closing a tag, ignoring any inside quoted values
    pub fn find_tag_end_quoted(&self) -> Option<usize> {
        let mut at = self.pos;
        loop {
            let hit = at + memchr3(b'>', b'"', b'\'', &self.input[at..])?;
            match self.input[hit] {
                b'>' => return Some(hit),
                quote => {
                    // Jump over the quoted value
                    at = hit + 1 + memchr(quote, &self.input[hit + 1..])? + 1;
                }
            }
        }
    }

    #[inline]
    pub fn find_byte(&self, byte: u8) -> Option<usize> {
        memchr(byte, self.rest()).map(|i| self.pos + i)
    }

    /// Offset of the next occurrence of a delimiter such as `-->` or `?>`
    pub fn find_sequence(&self, needle: &[u8]) -> Option<usize> {
        let (&first, tail) = needle.split_first()?;
        memchr_iter(first, self.rest())
            .map(|i| self.pos + i)
            .find(|&at| self.input[at + 1..].starts_with(tail))
    }

    /// Consume a Name; `None` (and no movement) if none starts here
    pub fn read_name(&mut self) -> Option<&'a [u8]> {
        let rest = self.rest();
        if !is_name_start_char(*rest.first()?) {
            return None;
        }
        let len = 1 + rest[1..].iter().take_while(|&&b| is_name_char(b)).count();
        let start = self.pos;
        self.pos += len;
        Some(&self.input[start..self.pos])
    }

    #[inline]
    fn rest(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }
}

#[inline]
pub fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

/// NameStartChar, approximated per byte: any non-ASCII byte is accepted
#[inline]
pub fn is_name_start_char(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b':' || b >= 0x80
}

#[inline]
pub fn is_name_char(b: u8) -> bool {
    is_name_start_char(b) || b.is_ascii_digit() || b == b'-' || b == b'.'
}

/// Incremental line/column tracker
///
/// Positions only move forward while scanning, so each call counts the
/// newlines between the previous position and the new one.
#[derive(Debug, Clone)]
pub struct LineTracker {
    pos: usize,
    line: u32,
    line_start: usize,
}

impl LineTracker {
    pub fn new() -> Self {
        Self {
            pos: 0,
            line: 1,
            line_start: 0,
        }
    }

    /// Location of byte `offset` in `input`
    pub fn locate(&mut self, input: &[u8], offset: usize) -> Location {
        let offset = offset.min(input.len());
        if offset < self.pos {
            // Out-of-order lookup: recount from the start
            *self = Self::new();
        }
        let window = &input[self.pos..offset];
        let newlines = memchr_iter(b'\n', window).count();
        if newlines > 0 {
            self.line += newlines as u32;
            if let Some(last) = memrchr(b'\n', window) {
                self.line_start = self.pos + last + 1;
            }
        }
        self.pos = offset;
        Location::new(self.line, (offset - self.line_start) as u32 + 1, offset)
    }
}

impl Default for LineTracker {
    fn default() -> Self {
        Self::new()
    }
}
