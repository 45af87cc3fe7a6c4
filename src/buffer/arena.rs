//! Chunk Arena
//!
//! Fixed-size chunks addressed by generation-checked ids. Each chunk is one
//! link in a chain: it knows its predecessor (and holds a claim on it) and
//! its successor. Claims are counted per slot; when the last claim goes the
//! chunk's buffer is recycled according to the arena's [`FreePolicy`] and
//! the slot's generation is bumped so stale ids resolve to nothing.
//!
//! Offsets handed out by writers are absolute: a chunk with index `n` serves
//! offsets `n << shift .. (n + 1) << shift`.

/// 16 Ki units per chunk
pub const DEFAULT_CHUNK_SHIFT: u32 = 14;

/// Id of a chunk slot, valid only while the slot's generation matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId {
    index: u32,
    generation: u32,
}

/// What happens to the buffer of a released chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreePolicy {
    /// Keep only the most recently freed buffer for reuse
    MostRecent,
    /// Keep every freed buffer for reuse
    All,
}

#[derive(Debug)]
struct Chunk<T> {
    data: Box<[T]>,
    len: usize,
    chunk_index: usize,
    prev: Option<ChunkId>,
    next: Option<ChunkId>,
    claims: u32,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    chunk: Option<Chunk<T>>,
}

/// Append position of a chunk chain writer
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkWriter {
    current: Option<ChunkId>,
    next_offset: usize,
}

impl ChunkWriter {
    /// Chunk currently being filled
    pub fn current(&self) -> Option<ChunkId> {
        self.current
    }

    /// Absolute offset of the next appended unit
    pub fn next_offset(&self) -> usize {
        self.next_offset
    }
}

/// Arena of reference-counted, chained chunks
#[derive(Debug)]
pub struct ChunkArena<T> {
    slots: Vec<Slot<T>>,
    vacant: Vec<u32>,
    spare: Vec<Box<[T]>>,
    policy: FreePolicy,
    shift: u32,
}

impl<T: Copy + Default + PartialEq> ChunkArena<T> {
    pub fn new(policy: FreePolicy) -> Self {
        Self::with_shift(policy, DEFAULT_CHUNK_SHIFT)
    }

    /// Arena with `1 << shift` units per chunk
    pub fn with_shift(policy: FreePolicy, shift: u32) -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            spare: Vec::new(),
            policy,
            shift,
        }
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        1 << self.shift
    }

    #[inline]
    pub fn shift(&self) -> u32 {
        self.shift
    }

    /// Create a chunk following `previous`, with one claim for the caller
    ///
    /// The new chunk adopts the caller's claim on `previous` as its back
    /// reference; the caller must not release `previous` separately.
    pub fn create_chunk(&mut self, previous: Option<ChunkId>) -> ChunkId {
        let chunk_index = previous
            .and_then(|id| self.chunk(id))
            .map_or(0, |prev| prev.chunk_index + 1);

        let data = self
            .spare
            .pop()
            .unwrap_or_else(|| vec![T::default(); self.chunk_size()].into_boxed_slice());

        let chunk = Chunk {
            data,
            len: 0,
            chunk_index,
            prev: previous,
            next: None,
            claims: 1,
        };

        let id = match self.vacant.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.chunk = Some(chunk);
                ChunkId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    chunk: Some(chunk),
                });
                ChunkId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };

        if let Some(prev) = previous.and_then(|p| self.chunk_mut(p)) {
            prev.next = Some(id);
        }
        id
    }

    /// Take another claim on a live chunk
    pub fn add_ref(&mut self, id: ChunkId) -> bool {
        match self.chunk_mut(id) {
            Some(chunk) => {
                chunk.claims += 1;
                true
            }
            None => false,
        }
    }

    /// Drop one claim; the last claim frees the chunk and then its back reference
    ///
    /// Releasing a chunk that holds no claims is a bookkeeping bug and panics.
    pub fn release_chunk(&mut self, id: ChunkId) {
        let mut next_release = Some(id);
        while let Some(id) = next_release.take() {
            let chunk = self.chunk_mut(id);
            assert!(chunk.is_some(), "release of a freed chunk {id:?}");
            let Some(chunk) = chunk else { return };
            assert!(chunk.claims > 0, "chunk {id:?} released more often than claimed");

            chunk.claims -= 1;
            if chunk.claims == 0 {
                next_release = self.free(id);
            }
        }
    }

    /// Drop the back reference of `id`
    ///
    /// The predecessor stays alive while ranges still claim it, and keeps its
    /// forward link so those ranges remain readable into `id`.
    pub fn clear_previous_chunk(&mut self, id: ChunkId) {
        let prev = self.chunk_mut(id).and_then(|chunk| chunk.prev.take());
        if let Some(prev) = prev {
            self.release_chunk(prev);
        }
    }

    /// Append `data` at the writer's position, rolling over to new chunks as needed
    ///
    /// Returns the chunk holding the first unit and its absolute offset. Every
    /// chunk the data lands in gets one claim for the returned range.
    pub fn append(&mut self, writer: &mut ChunkWriter, data: &[T]) -> (ChunkId, usize) {
        let size = self.chunk_size();
        let mut current = self.writable(writer);
        let start = (current, writer.next_offset);
        self.add_ref(current);

        let mut remaining = data;
        loop {
            let local = writer.next_offset & (size - 1);
            let take = remaining.len().min(size - local);
            if let Some(chunk) = self.chunk_mut(current) {
                chunk.data[local..local + take].copy_from_slice(&remaining[..take]);
                chunk.len = local + take;
            }
            writer.next_offset += take;
            remaining = &remaining[take..];

            if remaining.is_empty() {
                return start;
            }
            current = self.writable(writer);
            self.add_ref(current);
        }
    }

    /// Release the claims a range took in [`append`](Self::append)
    pub fn release_range(&mut self, start: ChunkId, offset: usize, len: usize) {
        for id in self.span(start, offset, len) {
            self.release_chunk(id);
        }
    }

    /// Take one more claim on every chunk of a range
    pub fn claim_range(&mut self, start: ChunkId, offset: usize, len: usize) -> bool {
        let chunks = self.span(start, offset, len);
        chunks.iter().all(|&id| self.add_ref(id))
    }

    /// Slices covering `len` units from absolute `offset`, walking `next` links
    ///
    /// Stops early if a link is gone or a chunk does not serve the offset.
    pub fn slices(&self, start: ChunkId, offset: usize, len: usize) -> Slices<'_, T> {
        Slices {
            arena: self,
            current: Some(start),
            offset,
            remaining: len,
        }
    }

    /// Copy a range into a vector, `None` if any part of it is gone
    pub fn read_range(&self, start: ChunkId, offset: usize, len: usize) -> Option<Vec<T>> {
        let mut out = Vec::with_capacity(len);
        for slice in self.slices(start, offset, len) {
            out.extend_from_slice(slice);
        }
        (out.len() == len).then_some(out)
    }

    /// Compare two ranges unit by unit without copying either
    pub fn equals_range(&self, a: (ChunkId, usize, usize), b: (ChunkId, usize, usize)) -> bool {
        if a.2 != b.2 {
            return false;
        }
        let left = self.slices(a.0, a.1, a.2).flat_map(|s| s.iter());
        let right = self.slices(b.0, b.1, b.2).flat_map(|s| s.iter());
        let mut compared = 0;
        for (x, y) in left.zip(right) {
            if x != y {
                return false;
            }
            compared += 1;
        }
        compared == a.2
    }

    /// Compare a range with a slice
    pub fn equals_slice(&self, start: ChunkId, offset: usize, len: usize, other: &[T]) -> bool {
        if len != other.len() {
            return false;
        }
        let mut rest = other;
        for slice in self.slices(start, offset, len) {
            if !rest.starts_with(slice) {
                return false;
            }
            rest = &rest[slice.len()..];
        }
        rest.is_empty()
    }

    /// Whether `id` still names a live chunk
    pub fn is_live(&self, id: ChunkId) -> bool {
        self.chunk(id).is_some()
    }

    /// Claims currently held on a chunk
    pub fn claims(&self, id: ChunkId) -> u32 {
        self.chunk(id).map_or(0, |chunk| chunk.claims)
    }

    /// Number of live chunks
    pub fn live_chunks(&self) -> usize {
        self.slots.iter().filter(|slot| slot.chunk.is_some()).count()
    }

    /// Number of buffers kept for reuse
    pub fn spare_buffers(&self) -> usize {
        self.spare.len()
    }

    /// Drop every chunk, keeping buffers for reuse per the free policy
    pub fn reset(&mut self, writer: &mut ChunkWriter) {
        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            if let Some(chunk) = slot.chunk.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.vacant.push(index as u32);
                self.recycle(chunk.data);
            }
        }
        *writer = ChunkWriter::default();
    }

    /// Chunk to write into, creating or rolling over as needed
    fn writable(&mut self, writer: &mut ChunkWriter) -> ChunkId {
        let size = self.chunk_size();
        let shift = self.shift;
        match writer.current.filter(|&id| self.is_live(id)) {
            Some(id) if self.chunk(id).is_some_and(|chunk| chunk.len < size) => id,
            Some(id) => {
                // Full: the new chunk adopts the writer's claim on this one
                let next = self.create_chunk(Some(id));
                writer.current = Some(next);
                next
            }
            None => {
                let id = self.create_chunk(None);
                // Align the writer with the new chain
                if let Some(chunk) = self.chunk_mut(id) {
                    chunk.chunk_index = writer.next_offset >> shift;
                }
                writer.current = Some(id);
                id
            }
        }
    }

    /// Chunks touched by a range, in order
    fn span(&self, start: ChunkId, offset: usize, len: usize) -> Vec<ChunkId> {
        let size = self.chunk_size();
        let mut ids = vec![start];
        let mut covered = size - (offset & (size - 1));
        let mut current = start;
        while covered < len {
            match self.chunk(current).and_then(|chunk| chunk.next) {
                Some(next) => {
                    ids.push(next);
                    current = next;
                    covered += size;
                }
                None => break,
            }
        }
        ids
    }

    fn free(&mut self, id: ChunkId) -> Option<ChunkId> {
        let slot = &mut self.slots[id.index as usize];
        let chunk = slot.chunk.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant.push(id.index);

        if let Some(next) = chunk.next.and_then(|n| self.chunk_mut(n)) {
            if next.prev == Some(id) {
                next.prev = None;
            }
        }
        if let Some(prev) = chunk.prev.and_then(|p| self.chunk_mut(p)) {
            prev.next = None;
        }
        self.recycle(chunk.data);
        chunk.prev
    }

    fn recycle(&mut self, data: Box<[T]>) {
        match self.policy {
            FreePolicy::MostRecent => {
                self.spare.clear();
                self.spare.push(data);
            }
            FreePolicy::All => self.spare.push(data),
        }
    }

    fn chunk(&self, id: ChunkId) -> Option<&Chunk<T>> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.chunk.as_ref()
    }

    fn chunk_mut(&mut self, id: ChunkId) -> Option<&mut Chunk<T>> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.chunk.as_mut()
    }
}

/// Iterator over the per-chunk pieces of a range
pub struct Slices<'a, T> {
    arena: &'a ChunkArena<T>,
    current: Option<ChunkId>,
    offset: usize,
    remaining: usize,
}

impl<'a, T: Copy + Default + PartialEq> Iterator for Slices<'a, T> {
    type Item = &'a [T];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let chunk = self.arena.chunk(self.current?)?;
        if self.offset >> self.arena.shift != chunk.chunk_index {
            self.current = None;
            return None;
        }

        let local = self.offset & (self.arena.chunk_size() - 1);
        let take = self.remaining.min(chunk.len.saturating_sub(local));
        if take == 0 {
            self.current = None;
            return None;
        }
        self.offset += take;
        self.remaining -= take;
        self.current = chunk.next;
        Some(&chunk.data[local..local + take])
    }
}
