//! Array-of-arrays buffers
//!
//! `ChunkyByteArray` pulls an input stream into fixed-size chunks on demand
//! and serves both sequential reads and random byte access (used to sniff
//! the encoding before the bytes are consumed). `ChunkyCharArray` grows a
//! list of code-unit chunks without ever moving existing data.

use std::io::{self, Read};

const BYTE_CHUNK_SHIFT: u32 = 13;
const CHAR_CHUNK_SHIFT: u32 = 10;

/// Chunked view over a byte stream
pub struct ChunkyByteArray<R> {
    source: Option<R>,
    table: Vec<Option<Box<[u8]>>>,
    shift: u32,
    /// Bytes pulled from the source so far
    filled: usize,
    /// Position of the next sequential read
    read_pos: usize,
}

impl<R: Read> ChunkyByteArray<R> {
    pub fn new(source: R) -> Self {
        Self::with_shift(source, BYTE_CHUNK_SHIFT)
    }

    pub fn with_shift(source: R, shift: u32) -> Self {
        Self {
            source: Some(source),
            table: vec![None; 4],
            shift,
            filled: 0,
            read_pos: 0,
        }
    }

    /// Byte at an absolute offset, `None` past the end of the stream
    pub fn byte_at(&mut self, offset: usize) -> io::Result<Option<u8>> {
        self.fill_to(offset + 1)?;
        if offset >= self.filled {
            return Ok(None);
        }
        let chunk = offset >> self.shift;
        let local = offset & (self.chunk_size() - 1);
        Ok(self.table[chunk].as_ref().map(|data| data[local]))
    }

    /// True once the source has been drained
    pub fn is_exhausted(&self) -> bool {
        self.source.is_none()
    }

    /// Bytes buffered so far
    pub fn buffered(&self) -> usize {
        self.filled
    }

    fn chunk_size(&self) -> usize {
        1 << self.shift
    }

    /// Pull from the source until `target` bytes are buffered or it runs dry
    fn fill_to(&mut self, target: usize) -> io::Result<()> {
        let size = self.chunk_size();
        while self.filled < target {
            let Some(source) = self.source.as_mut() else {
                return Ok(());
            };

            let chunk = self.filled >> self.shift;
            if chunk >= self.table.len() {
                let doubled = self.table.len() * 2;
                self.table.resize(doubled.max(chunk + 1), None);
            }
            let data = self.table[chunk].get_or_insert_with(|| vec![0u8; size].into_boxed_slice());

            let local = self.filled & (size - 1);
            match source.read(&mut data[local..]) {
                Ok(0) => {
                    // Exhausted: the source is dropped, not closed by us
                    self.source = None;
                }
                Ok(n) => self.filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for ChunkyByteArray<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.fill_to(self.read_pos + 1)?;
        if self.read_pos >= self.filled {
            return Ok(0);
        }

        let size = self.chunk_size();
        let chunk = self.read_pos >> self.shift;
        let local = self.read_pos & (size - 1);
        let available = (self.filled - self.read_pos).min(size - local);
        let n = available.min(buf.len());
        if let Some(data) = &self.table[chunk] {
            buf[..n].copy_from_slice(&data[local..local + n]);
        }
        self.read_pos += n;
        Ok(n)
    }
}

/// Growable code-unit buffer made of fixed-size chunks
#[derive(Debug, Default)]
pub struct ChunkyCharArray {
    chunks: Vec<Box<[u16]>>,
    len: usize,
}

impl ChunkyCharArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, unit: u16) {
        let size = 1 << CHAR_CHUNK_SHIFT;
        let local = self.len & (size - 1);
        if local == 0 && self.len >> CHAR_CHUNK_SHIFT == self.chunks.len() {
            self.chunks.push(vec![0u16; size].into_boxed_slice());
        }
        self.chunks[self.len >> CHAR_CHUNK_SHIFT][local] = unit;
        self.len += 1;
    }

    pub fn push_str(&mut self, text: &str) {
        self.extend(text.encode_utf16());
    }

    pub fn unit_at(&self, index: usize) -> Option<u16> {
        if index >= self.len {
            return None;
        }
        let size = 1 << CHAR_CHUNK_SHIFT;
        Some(self.chunks[index >> CHAR_CHUNK_SHIFT][index & (size - 1)])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Forget the contents, keeping the chunks
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Decode the contents, replacing unpaired surrogates
    pub fn to_string_lossy(&self) -> String {
        let size = 1 << CHAR_CHUNK_SHIFT;
        let units = self
            .chunks
            .iter()
            .enumerate()
            .flat_map(|(i, chunk)| {
                let used = self.len.saturating_sub(i * size).min(size);
                chunk[..used].iter().copied()
            });
        char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

impl Extend<u16> for ChunkyCharArray {
    fn extend<T: IntoIterator<Item = u16>>(&mut self, iter: T) {
        for unit in iter {
            self.push(unit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that hands out at most `step` bytes per call
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn test_random_access_then_sequential_read() {
        let data: Vec<u8> = (0..100u8).collect();
        let mut array = ChunkyByteArray::with_shift(Cursor::new(data.clone()), 3);
        assert_eq!(array.byte_at(0).unwrap(), Some(0));
        assert_eq!(array.byte_at(1).unwrap(), Some(1));
        assert_eq!(array.byte_at(57).unwrap(), Some(57));
        assert_eq!(array.byte_at(100).unwrap(), None);
        assert!(array.is_exhausted());

        let mut out = Vec::new();
        array.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_table_grows_past_initial_size() {
        let data = vec![7u8; 1000];
        let mut array = ChunkyByteArray::with_shift(Cursor::new(data), 4);
        assert_eq!(array.byte_at(999).unwrap(), Some(7));
        assert_eq!(array.buffered(), 1000);
        assert!(array.table.len() >= 63);
    }

    #[test]
    fn test_short_reads_fill_chunks() {
        let source = Trickle {
            data: b"<root>text</root>".to_vec(),
            pos: 0,
            step: 3,
        };
        let mut array = ChunkyByteArray::with_shift(source, 2);
        assert_eq!(array.byte_at(10).unwrap(), Some(b'<'));
        let mut out = String::new();
        array.read_to_string(&mut out).unwrap();
        assert_eq!(out, "<root>text</root>");
    }

    #[test]
    fn test_char_array_spans_chunks() {
        let mut array = ChunkyCharArray::new();
        let text = "ab😀".repeat(500);
        array.push_str(&text);
        assert_eq!(array.len(), 2000);
        assert_eq!(array.unit_at(0), Some(b'a' as u16));
        assert_eq!(array.unit_at(2000), None);
        assert_eq!(array.to_string_lossy(), text);

        array.clear();
        assert!(array.is_empty());
        array.push_str("x");
        assert_eq!(array.to_string_lossy(), "x");
    }
}
