//! # Heap Allocator
//!
//! First-fit allocator over a single contiguous region, with the block
//! headers embedded in the region itself.
//!
//! ## Block Layout
//!
//! ```text
//!  offset ─►┌──────────┬──────────┬───────┬───────┬─────┐
//!           │ size u32 │ next u32 │ owner │ alloc │ pad │  12-byte header
//!           ├──────────┴──────────┴───────┴───────┴─────┤
//!           │ payload (size bytes, multiple of 4)        │  ◄─ returned
//!           └────────────────────────────────────────────┘
//! ```
//!
//! Blocks are addressed by byte offset into the region. `next` holds the
//! offset of the next free block or `NIL`. Free blocks form a singly
//! linked list sorted by ascending offset, and no two neighbours on the
//! list are ever adjacent in memory: every free merges with the blocks
//! on either side.
//!
//! ## Limitations
//!
//! `deallocate` validates the pointer's range and alignment, the
//! `allocated` flag, the owner and the recorded size. These are sanity
//! checks on headers that live in task-writable memory; they catch double
//! frees and wrong-owner frees, not every stray pointer.

use core::ops::Range;

use crate::config::WORD_SIZE;
use crate::error::HeapError;
use crate::task::TaskId;

/// Bytes of metadata in front of every payload.
pub const HEADER_SIZE: usize = 12;

/// Smallest leftover worth splitting off: a header plus one word.
const MIN_SPLIT: usize = HEADER_SIZE + WORD_SIZE;

const NIL: u32 = u32::MAX;

#[inline]
const fn align_up(size: usize) -> Option<usize> {
    match size.checked_add(WORD_SIZE - 1) {
        Some(s) => Some(s & !(WORD_SIZE - 1)),
        None => None,
    }
}

// ---------------------------------------------------------------------------
// Region bounds
// ---------------------------------------------------------------------------

/// Link-time bounds of the allocatable RAM.
///
/// The heap spans from the end of the program image up to the stack
/// region, minus the bytes reserved for stacks at the top of RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionBounds {
    /// First byte after `.data`/`.bss`.
    pub image_end: usize,
    /// Top of RAM; stacks grow down from here.
    pub stack_end: usize,
    /// Bytes below `stack_end` that must stay out of the heap.
    pub min_stack_size: usize,
}

impl RegionBounds {
    /// Address range the heap may manage.
    pub fn span(&self) -> Result<Range<usize>, HeapError> {
        let end = self
            .stack_end
            .checked_sub(self.min_stack_size)
            .ok_or(HeapError::InvalidRegion)?;
        if end < self.image_end {
            return Err(HeapError::InvalidRegion);
        }
        Ok(self.image_end..end)
    }
}

// ---------------------------------------------------------------------------
// Block header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockHeader {
    size: usize,
    next: Option<usize>,
    owner: TaskId,
    allocated: bool,
}

impl BlockHeader {
    const fn free(size: usize, next: Option<usize>) -> Self {
        Self {
            size,
            next,
            owner: TaskId::NULL,
            allocated: false,
        }
    }

    fn decode(bytes: &[u8]) -> Self {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let next = word(4);
        Self {
            size: word(0) as usize,
            next: (next != NIL).then_some(next as usize),
            owner: TaskId::from_raw(u32::from(bytes[8])),
            allocated: bytes[9] != 0,
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        let next = self.next.map_or(NIL, |n| n as u32);
        bytes[0..4].copy_from_slice(&(self.size as u32).to_le_bytes());
        bytes[4..8].copy_from_slice(&next.to_le_bytes());
        bytes[8] = self.owner.as_raw() as u8;
        bytes[9] = u8::from(self.allocated);
        bytes[10..12].fill(0);
    }
}

/// A block currently on the freelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    /// Offset of the block header within the region.
    pub offset: usize,
    /// Payload bytes.
    pub size: usize,
}

impl FreeBlock {
    /// Header plus payload.
    pub const fn footprint(&self) -> usize {
        self.size + HEADER_SIZE
    }
}

// ---------------------------------------------------------------------------
// Heap
// ---------------------------------------------------------------------------

/// The heap. Empty until `init` hands it a region; the region is then
/// owned for the rest of the program.
pub struct Heap<'h> {
    region: Option<&'h mut [u8]>,
    head: Option<usize>,
    /// Payload size of the initial block; no valid block is larger.
    capacity: usize,
}

impl<'h> Heap<'h> {
    pub const fn new() -> Self {
        Self {
            region: None,
            head: None,
            capacity: 0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.region.is_some()
    }

    /// Claim `region` and lay a single free block across it.
    ///
    /// Leading bytes are skipped so that the first header, and therefore
    /// every payload, is word-aligned.
    pub fn init(&mut self, region: &'h mut [u8]) -> Result<(), HeapError> {
        if self.region.is_some() {
            return Err(HeapError::AlreadyInitialized);
        }

        let len = region.len();
        let start = region.as_ptr().align_offset(WORD_SIZE);
        let usable = len.saturating_sub(start) & !(WORD_SIZE - 1);
        if usable < MIN_SPLIT {
            return Err(HeapError::RegionTooSmall { len });
        }
        // Headers store offsets and sizes as u32.
        if start + usable >= NIL as usize {
            return Err(HeapError::InvalidRegion);
        }

        let capacity = usable - HEADER_SIZE;
        BlockHeader::free(capacity, None).encode(&mut region[start..start + HEADER_SIZE]);

        self.region = Some(region);
        self.head = Some(start);
        self.capacity = capacity;
        log::debug!("heap: {} bytes at offset {:#x}", capacity, start);
        Ok(())
    }

    /// Payload bytes of the initial free block. Zero before `init`.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Allocate `size` bytes (rounded up to the word size) on behalf of
    /// `owner`. Returns the payload offset.
    pub fn allocate(&mut self, size: usize, owner: TaskId) -> Result<usize, HeapError> {
        if !self.is_initialized() {
            return Err(HeapError::NotInitialized);
        }
        if size == 0 {
            return Err(HeapError::InvalidSize);
        }
        let size = align_up(size).ok_or(HeapError::OutOfMemory { requested: size })?;

        let mut prev = None;
        let mut cursor = self.head;
        while let Some(at) = cursor {
            let mut block = self.header(at);
            if block.size < size {
                prev = Some(at);
                cursor = block.next;
                continue;
            }

            let remaining = block.size - size;
            let successor = if remaining >= MIN_SPLIT {
                let split = at + HEADER_SIZE + size;
                self.write_header(split, BlockHeader::free(remaining - HEADER_SIZE, block.next));
                block.size = size;
                Some(split)
            } else {
                block.next
            };
            self.link(prev, successor);

            block.next = None;
            block.owner = owner;
            block.allocated = true;
            self.write_header(at, block);
            return Ok(at + HEADER_SIZE);
        }

        Err(HeapError::OutOfMemory { requested: size })
    }

    /// Return the block whose payload starts at `payload` to the
    /// freelist, merging it with free neighbours.
    pub fn deallocate(&mut self, payload: usize, caller: TaskId) -> Result<(), HeapError> {
        let Some(region) = self.region.as_deref() else {
            return Err(HeapError::NotInitialized);
        };
        let base = region.as_ptr() as usize;
        let end = region.len();
        let start = region.as_ptr().align_offset(WORD_SIZE);

        let invalid = HeapError::InvalidPointer { addr: base + payload };
        if payload < start + HEADER_SIZE || payload > end || (payload - start) % WORD_SIZE != 0 {
            return Err(invalid);
        }
        let at = payload - HEADER_SIZE;

        let mut block = self.header(at);
        if !block.allocated {
            return Err(HeapError::NotAllocated { offset: at });
        }
        if block.owner != caller {
            return Err(HeapError::WrongOwner {
                offset: at,
                owner: block.owner,
                caller,
            });
        }
        if block.size > self.capacity || payload + block.size > end {
            return Err(HeapError::CorruptBlock {
                offset: at,
                size: block.size,
            });
        }

        // First free block above this one.
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(node) = cursor {
            if node > at {
                break;
            }
            prev = Some(node);
            cursor = self.header(node).next;
        }

        block.allocated = false;
        block.owner = TaskId::NULL;
        block.next = cursor;

        if let Some(next) = cursor {
            if at + HEADER_SIZE + block.size == next {
                let absorbed = self.header(next);
                block.size += absorbed.size + HEADER_SIZE;
                block.next = absorbed.next;
            }
        }

        match prev {
            Some(p) => {
                let mut before = self.header(p);
                if p + HEADER_SIZE + before.size == at {
                    before.size += block.size + HEADER_SIZE;
                    before.next = block.next;
                    self.write_header(p, before);
                    // Leave no stale "allocated" header behind.
                    self.write_header(at, block);
                } else {
                    self.write_header(at, block);
                    before.next = Some(at);
                    self.write_header(p, before);
                }
            }
            None => {
                self.write_header(at, block);
                self.head = Some(at);
            }
        }
        Ok(())
    }

    /// Free blocks whose footprint (header + payload) is below
    /// `threshold`.
    pub fn count_small_free_blocks(&self, threshold: usize) -> usize {
        self.free_blocks()
            .filter(|block| block.footprint() < threshold)
            .count()
    }

    /// Walk the freelist in address order.
    pub fn free_blocks(&self) -> FreeBlocks<'_, 'h> {
        FreeBlocks {
            heap: self,
            cursor: self.head,
        }
    }

    /// Total free payload bytes.
    pub fn free_bytes(&self) -> usize {
        self.free_blocks().map(|block| block.size).sum()
    }

    /// Absolute address of a region offset.
    pub fn address_of(&self, offset: usize) -> usize {
        self.region.as_deref().map_or(0, |r| r.as_ptr() as usize) + offset
    }

    /// Region offset of an absolute address, if it falls inside the
    /// region.
    pub fn offset_of(&self, addr: usize) -> Option<usize> {
        let region = self.region.as_deref()?;
        let base = region.as_ptr() as usize;
        addr.checked_sub(base).filter(|&off| off <= region.len())
    }

    /// The `len` payload bytes starting at `payload`.
    pub(crate) fn payload_mut(&mut self, payload: usize, len: usize) -> &mut [u8] {
        match self.region.as_deref_mut() {
            Some(region) => &mut region[payload..payload + len],
            None => &mut [],
        }
    }

    fn header(&self, at: usize) -> BlockHeader {
        let region = self.region.as_deref().unwrap_or_default();
        BlockHeader::decode(&region[at..at + HEADER_SIZE])
    }

    fn write_header(&mut self, at: usize, header: BlockHeader) {
        if let Some(region) = self.region.as_deref_mut() {
            header.encode(&mut region[at..at + HEADER_SIZE]);
        }
    }

    /// Point `prev` (or the list head) at `next`.
    fn link(&mut self, prev: Option<usize>, next: Option<usize>) {
        match prev {
            Some(p) => {
                let mut before = self.header(p);
                before.next = next;
                self.write_header(p, before);
            }
            None => self.head = next,
        }
    }
}

impl Default for Heap<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the freelist.
pub struct FreeBlocks<'a, 'h> {
    heap: &'a Heap<'h>,
    cursor: Option<usize>,
}

impl Iterator for FreeBlocks<'_, '_> {
    type Item = FreeBlock;

    fn next(&mut self) -> Option<FreeBlock> {
        let offset = self.cursor?;
        let header = self.heap.header(offset);
        self.cursor = header.next;
        Some(FreeBlock {
            offset,
            size: header.size,
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
