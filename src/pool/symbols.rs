//! Symbol Cache
//!
//! Character-level deduplication of symbol text. Symbols are stored in one
//! append-only code-unit arena; a trie of fixed-capacity cache lines maps
//! each prefix to an arena offset where that prefix is already stored, so a
//! symbol that is a prefix of an earlier one costs no arena space at all.
//!
//! Each trie edge remembers the handle of the symbol ending on it, if any.

/// Edges per cache line before an overflow line is chained
const LINE_CAPACITY: usize = 8;

/// Lifetime cap on cache line reorganizations
const MAX_REORGANIZATIONS: u32 = 200;

/// Entries found at or beyond this slot are moved one step toward the front
const REORGANIZE_FROM: usize = 2;

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    unit: u16,
    /// Handle of the symbol ending at this edge
    handle: Option<u32>,
    /// Cache line holding the edges that follow this one
    next: Option<u32>,
    /// Arena offset of a stored string starting with the path to this edge
    offset: u32,
}

#[derive(Debug, Clone, Default)]
struct CacheLine {
    entries: [Entry; LINE_CAPACITY],
    len: u8,
    overflow: Option<u32>,
}

/// Trie-backed symbol arena
#[derive(Debug)]
pub struct SymbolCache {
    arena: Vec<u16>,
    lines: Vec<CacheLine>,
    reorganizations: u32,
}

impl SymbolCache {
    pub fn new() -> Self {
        Self {
            arena: Vec::with_capacity(1024),
            lines: vec![CacheLine::default()],
            reorganizations: 0,
        }
    }

    /// Record `units` as the text of `handle`, returning its arena offset
    ///
    /// Walks the trie one unit at a time, adding edges where none exist yet.
    /// A path that was walked before without a terminal handle (a prefix of
    /// an earlier symbol) is completed in place.
    pub fn add(&mut self, units: &[u16], handle: u32) -> u32 {
        let mut line = 0u32;
        let mut stored = None;

        for (depth, &unit) in units.iter().enumerate() {
            let (at_line, slot) = match self.locate(line, unit) {
                Some((at_line, slot)) => (at_line, self.update_cache_line(at_line, slot)),
                None => {
                    let offset = match stored {
                        Some(offset) => offset,
                        None => {
                            let offset = self.store(units);
                            stored = Some(offset);
                            offset
                        }
                    };
                    self.insert(line, Entry { unit, handle: None, next: None, offset })
                }
            };

            if depth + 1 == units.len() {
                let entry = &mut self.lines[at_line as usize].entries[slot];
                entry.handle = Some(handle);
                return entry.offset;
            }

            line = match self.lines[at_line as usize].entries[slot].next {
                Some(next) => next,
                None => {
                    let next = self.new_line();
                    self.lines[at_line as usize].entries[slot].next = Some(next);
                    next
                }
            };
        }

        // Empty symbol: nothing stored
        0
    }

    /// Handle of the symbol with exactly this text, if cached
    pub fn find(&self, units: &[u16]) -> Option<u32> {
        let (line, slot) = self.walk(units)?;
        self.lines[line as usize].entries[slot].handle
    }

    /// Forget `handle` as the terminal of `units`
    ///
    /// The path and its arena text stay; a later `add` reuses them.
    pub fn clear_handle(&mut self, units: &[u16], handle: u32) {
        if let Some((line, slot)) = self.walk(units) {
            let entry = &mut self.lines[line as usize].entries[slot];
            if entry.handle == Some(handle) {
                entry.handle = None;
            }
        }
    }

    /// Stored code units
    pub fn units(&self, offset: u32, len: u32) -> &[u16] {
        let start = offset as usize;
        self.arena.get(start..start + len as usize).unwrap_or(&[])
    }

    /// Code units in the arena
    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }

    pub fn reset(&mut self) {
        self.arena.clear();
        self.lines.truncate(1);
        self.lines[0] = CacheLine::default();
        self.reorganizations = 0;
    }

    fn walk(&self, units: &[u16]) -> Option<(u32, usize)> {
        let mut line = 0u32;
        let mut found = None;
        for (depth, &unit) in units.iter().enumerate() {
            let (at_line, slot) = self.locate(line, unit)?;
            found = Some((at_line, slot));
            if depth + 1 < units.len() {
                line = self.lines[at_line as usize].entries[slot].next?;
            }
        }
        found
    }

    /// Find the edge for `unit` in a line or its overflow chain
    fn locate(&self, mut line: u32, unit: u16) -> Option<(u32, usize)> {
        loop {
            let cache_line = &self.lines[line as usize];
            let used = &cache_line.entries[..cache_line.len as usize];
            if let Some(slot) = used.iter().position(|e| e.unit == unit) {
                return Some((line, slot));
            }
            line = cache_line.overflow?;
        }
    }

    /// Move a hit found after several misses one slot toward the front
    fn update_cache_line(&mut self, line: u32, slot: usize) -> usize {
        if slot < REORGANIZE_FROM || self.reorganizations >= MAX_REORGANIZATIONS {
            return slot;
        }
        self.reorganizations += 1;
        self.lines[line as usize].entries.swap(slot, slot - 1);
        slot - 1
    }

    fn insert(&mut self, mut line: u32, entry: Entry) -> (u32, usize) {
        loop {
            let cache_line = &self.lines[line as usize];
            if (cache_line.len as usize) < LINE_CAPACITY {
                let slot = cache_line.len as usize;
                let cache_line = &mut self.lines[line as usize];
                cache_line.entries[slot] = entry;
                cache_line.len += 1;
                return (line, slot);
            }
            line = match cache_line.overflow {
                Some(next) => next,
                None => {
                    let next = self.new_line();
                    self.lines[line as usize].overflow = Some(next);
                    next
                }
            };
        }
    }

    fn new_line(&mut self) -> u32 {
        if self.lines.len() == self.lines.capacity() {
            self.lines.reserve(self.lines.len());
        }
        self.lines.push(CacheLine::default());
        (self.lines.len() - 1) as u32
    }

    fn store(&mut self, units: &[u16]) -> u32 {
        let offset = self.arena.len() as u32;
        if self.arena.len() + units.len() > self.arena.capacity() {
            self.arena.reserve(self.arena.capacity().max(units.len()));
        }
        self.arena.extend_from_slice(units);
        offset
    }
}

impl Default for SymbolCache {
    fn default() -> Self {
        Self::new()
    }
}
