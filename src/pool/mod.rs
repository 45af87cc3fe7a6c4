//! String Interning Pool
//!
//! Maps small integer handles to text. An entry is one of:
//! - an owned string (`add_string`)
//! - a produced range in one of the chunk chains, materialized on first read
//! - a symbol whose text lives in the [`SymbolCache`] arena
//!
//! Symbols are deduplicated through a fixed table of hash buckets: adding
//! equal text twice through the symbol path yields the same handle. Plain
//! strings always get a fresh handle. Released handles go on a free list
//! and are reused.
//!
//! Bad or released handles produce `None`/no-ops rather than errors; the
//! cursor layer turns those into real errors where they matter.

pub mod hasher;
pub mod symbols;

use std::cell::OnceCell;

use crate::buffer::{CharChunks, ChunkyCharArray, ProducedRange, Producer, Utf8Chunks};
use symbols::SymbolCache;

/// Number of symbol hash buckets (power of two)
const BUCKET_COUNT: usize = 1024;

/// Terminates each string list
const LIST_END: u32 = u32::MAX;

/// Handle of a pool entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Handle(u32);

impl Handle {
    /// The reserved empty string
    pub const EMPTY: Handle = Handle(0);

    pub fn index(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }
}

/// Handle of a finished string list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListHandle(u32);

#[derive(Debug)]
enum Entry {
    Free {
        next: Option<u32>,
    },
    Owned(Box<str>),
    Produced(ProducedRange),
    Symbol {
        offset: u32,
        len: u32,
        hash: u32,
        text: OnceCell<Box<str>>,
    },
}

/// Interning table for one parse session
#[derive(Debug)]
pub struct StringPool {
    entries: Vec<Entry>,
    free_head: Option<u32>,
    buckets: Vec<Vec<u32>>,
    symbols: SymbolCache,
    chars: CharChunks,
    utf8: Utf8Chunks,
    lists: Vec<u32>,
    active_list: Option<usize>,
    scratch: Vec<u16>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::with_parts(CharChunks::new(), Utf8Chunks::new())
    }

    /// Pool whose chunk chains use `1 << shift` units per chunk
    pub fn with_chunk_shift(shift: u32) -> Self {
        Self::with_parts(CharChunks::with_shift(shift), Utf8Chunks::with_shift(shift))
    }

    fn with_parts(chars: CharChunks, utf8: Utf8Chunks) -> Self {
        let mut entries = Vec::with_capacity(256);
        entries.push(Entry::Owned(Box::from("")));
        StringPool {
            entries,
            free_head: None,
            buckets: vec![Vec::new(); BUCKET_COUNT],
            symbols: SymbolCache::new(),
            chars,
            utf8,
            lists: Vec::new(),
            active_list: None,
            scratch: Vec::new(),
        }
    }

    /// Store a string under a fresh handle; never deduplicates
    pub fn add_string(&mut self, text: &str) -> Handle {
        self.alloc(Entry::Owned(Box::from(text)))
    }

    /// Store a produced range under a fresh handle, adopting its claims
    pub fn add_string_produced(&mut self, range: ProducedRange) -> Handle {
        self.alloc(Entry::Produced(range))
    }

    /// Intern `text`, returning the existing handle for equal text
    pub fn add_symbol(&mut self, text: &str) -> Handle {
        if text.is_empty() {
            return Handle::EMPTY;
        }
        let mut units = std::mem::take(&mut self.scratch);
        units.clear();
        units.extend(text.encode_utf16());
        let hash = hasher::hash_units(&units);

        let handle = match self.find_symbol(hash, |stored| stored == units.as_slice()) {
            Some(handle) => handle,
            None => self.new_symbol(&units, hash),
        };
        self.scratch = units;
        handle
    }

    /// Intern a produced range with a precomputed hash
    ///
    /// The range is always released: its text is either copied into the
    /// symbol cache or found to be there already.
    pub fn add_symbol_from_producer(&mut self, range: ProducedRange, hash: u32) -> Handle {
        if range.is_empty() {
            self.release_range(range);
            return Handle::EMPTY;
        }

        if let Some(handle) = self.find_symbol(hash, |stored| self.range_equals(&range, stored)) {
            self.release_range(range);
            return handle;
        }

        let units = self.range_units(&range);
        self.release_range(range);
        self.new_symbol(&units, hash)
    }

    /// Handle of an interned symbol equal to the range, without allocating
    pub fn lookup_symbol(&self, range: &ProducedRange, hash: u32) -> Option<Handle> {
        if range.is_empty() {
            return Some(Handle::EMPTY);
        }
        self.find_symbol(hash, |stored| self.range_equals(range, stored))
    }

    /// Handle of an interned symbol equal to `text`, without allocating
    pub fn lookup_symbol_str(&self, text: &str) -> Option<Handle> {
        if text.is_empty() {
            return Some(Handle::EMPTY);
        }
        let hash = hasher::hash_str(text);
        self.find_symbol(hash, |stored| stored.iter().copied().eq(text.encode_utf16()))
    }

    /// Text of a handle, materializing a produced string on first read
    ///
    /// Materializing gives the range's chunk claims back.
    pub fn to_str(&mut self, handle: Handle) -> Option<&str> {
        let index = handle.0 as usize;
        if let Some(Entry::Produced(_)) = self.entries.get(index) {
            let entry = std::mem::replace(&mut self.entries[index], Entry::Free { next: None });
            if let Entry::Produced(range) = entry {
                let text = self.range_to_string(&range).unwrap_or_default();
                self.release_range(range);
                self.entries[index] = Entry::Owned(text.into_boxed_str());
            }
        }
        self.symbol_str(handle)
    }

    /// Text of a symbol or owned string; `None` for unread produced strings
    pub fn symbol_str(&self, handle: Handle) -> Option<&str> {
        match self.entries.get(handle.0 as usize)? {
            Entry::Owned(text) => Some(&**text),
            Entry::Symbol {
                offset, len, text, ..
            } => {
                let text = text.get_or_init(|| {
                    String::from_utf16_lossy(self.symbols.units(*offset, *len)).into_boxed_str()
                });
                Some(&**text)
            }
            Entry::Produced(_) | Entry::Free { .. } => None,
        }
    }

    /// Whether the handle names a symbol-path entry
    pub fn is_symbol(&self, handle: Handle) -> bool {
        handle.is_empty() || matches!(self.entries.get(handle.0 as usize), Some(Entry::Symbol { .. }))
    }

    /// Release a handle; releasing the empty string or a free handle does nothing
    pub fn release_string(&mut self, handle: Handle) {
        let index = handle.0 as usize;
        if handle.is_empty() || index >= self.entries.len() {
            return;
        }
        if let Entry::Free { .. } = self.entries[index] {
            return;
        }

        let entry = std::mem::replace(
            &mut self.entries[index],
            Entry::Free {
                next: self.free_head,
            },
        );
        self.free_head = Some(handle.0);

        match entry {
            Entry::Produced(range) => self.release_range(range),
            Entry::Symbol {
                offset, len, hash, ..
            } => {
                self.buckets[bucket(hash)].retain(|&i| i != handle.0);
                let units = self.symbols.units(offset, len).to_vec();
                self.symbols.clear_handle(&units, handle.0);
            }
            Entry::Owned(_) | Entry::Free { .. } => {}
        }
    }

    /// Copy a string's code units into `out` without materializing it
    pub fn append_units(&self, handle: Handle, out: &mut ChunkyCharArray) -> bool {
        match self.entries.get(handle.0 as usize) {
            Some(Entry::Owned(text)) => out.push_str(text),
            Some(Entry::Symbol { offset, len, .. }) => {
                out.extend(self.symbols.units(*offset, *len).iter().copied())
            }
            Some(Entry::Produced(range)) => match range.producer() {
                Producer::Chars => out.extend(self.chars.units(range)),
                Producer::Utf8 => out.extend(self.utf8.units(range)),
            },
            Some(Entry::Free { .. }) | None => return false,
        }
        true
    }

    /// Begin a string list; fails while another list is being built
    pub fn start_string_list(&mut self) -> bool {
        if self.active_list.is_some() {
            return false;
        }
        self.active_list = Some(self.lists.len());
        true
    }

    /// Append to the list being built
    pub fn add_string_to_list(&mut self, handle: Handle) -> bool {
        if self.active_list.is_none() {
            return false;
        }
        self.lists.push(handle.0);
        true
    }

    /// Seal the list being built
    pub fn finish_string_list(&mut self) -> Option<ListHandle> {
        let start = self.active_list.take()?;
        self.lists.push(LIST_END);
        Some(ListHandle(start as u32))
    }

    /// Members of a finished list, in insertion order
    pub fn string_list(&self, list: ListHandle) -> impl Iterator<Item = Handle> + '_ {
        self.lists
            .get(list.0 as usize..)
            .unwrap_or(&[])
            .iter()
            .take_while(|&&h| h != LIST_END)
            .map(|&h| Handle(h))
    }

    /// Drop every entry and list, keeping allocations for the next session
    pub fn reset(&mut self) {
        let mut entries = std::mem::take(&mut self.entries);
        for entry in entries.drain(..) {
            if let Entry::Produced(range) = entry {
                self.release_range(range);
            }
        }
        entries.push(Entry::Owned(Box::from("")));
        self.entries = entries;
        self.free_head = None;
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.symbols.reset();
        self.lists.clear();
        self.active_list = None;
        self.chars.clear_previous();
        self.utf8.clear_previous();
    }

    /// Entries ever allocated, free ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live_count() == 0
    }

    /// Entries currently holding text, the reserved empty string excluded
    pub fn live_count(&self) -> usize {
        self.entries
            .iter()
            .skip(1)
            .filter(|entry| !matches!(entry, Entry::Free { .. }))
            .count()
    }

    pub fn chars(&self) -> &CharChunks {
        &self.chars
    }

    pub fn chars_mut(&mut self) -> &mut CharChunks {
        &mut self.chars
    }

    pub fn utf8(&self) -> &Utf8Chunks {
        &self.utf8
    }

    pub fn utf8_mut(&mut self) -> &mut Utf8Chunks {
        &mut self.utf8
    }

    /// Give a range's claims back to its chunk chain
    pub fn release_range(&mut self, range: ProducedRange) {
        match range.producer() {
            Producer::Chars => self.chars.release(range),
            Producer::Utf8 => self.utf8.release(range),
        }
    }

    fn alloc(&mut self, entry: Entry) -> Handle {
        match self.free_head {
            Some(index) => {
                self.free_head = match self.entries[index as usize] {
                    Entry::Free { next } => next,
                    _ => None,
                };
                self.entries[index as usize] = entry;
                Handle(index)
            }
            None => {
                self.entries.push(entry);
                Handle((self.entries.len() - 1) as u32)
            }
        }
    }

    fn new_symbol(&mut self, units: &[u16], hash: u32) -> Handle {
        let handle = self.alloc(Entry::Free { next: None });
        let offset = self.symbols.add(units, handle.0);
        self.entries[handle.0 as usize] = Entry::Symbol {
            offset,
            len: units.len() as u32,
            hash,
            text: OnceCell::new(),
        };
        self.buckets[bucket(hash)].push(handle.0);
        handle
    }

    fn find_symbol(&self, hash: u32, matches: impl Fn(&[u16]) -> bool) -> Option<Handle> {
        self.buckets[bucket(hash)].iter().find_map(|&index| match &self.entries[index as usize] {
            Entry::Symbol {
                offset,
                len,
                hash: stored_hash,
                ..
            } if *stored_hash == hash && matches(self.symbols.units(*offset, *len)) => Some(Handle(index)),
            _ => None,
        })
    }

    fn range_equals(&self, range: &ProducedRange, units: &[u16]) -> bool {
        match range.producer() {
            Producer::Chars => self.chars.equals_units(range, units),
            Producer::Utf8 => self.utf8.equals_units(range, units),
        }
    }

    fn range_units(&self, range: &ProducedRange) -> Vec<u16> {
        match range.producer() {
            Producer::Chars => self.chars.units(range).collect(),
            Producer::Utf8 => self.utf8.units(range).collect(),
        }
    }

    fn range_to_string(&self, range: &ProducedRange) -> Option<String> {
        match range.producer() {
            Producer::Chars => self.chars.to_string(range),
            Producer::Utf8 => self.utf8.to_string(range),
        }
    }
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn bucket(hash: u32) -> usize {
    hash as usize & (BUCKET_COUNT - 1)
}
