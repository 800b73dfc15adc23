//! Stack extents of runtime threads.
//!
//! Stacks grow downward on every supported target, so an extent is described
//! by its high address (`start`) and the number of bytes below it.

pub mod os;
pub mod probe;

use std::fmt;
use std::mem::size_of;

/// Size of one machine word, the probe and scan granularity.
pub const WORD: usize = size_of::<usize>();

/// The contiguous address range a thread's call stack occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackExtent {
    start: usize,
    size: usize,
}

impl StackExtent {
    pub fn new(start: usize, size: usize) -> Self {
        debug_assert!(size <= start, "stack extent wraps below address zero");
        Self { start, size }
    }

    /// High (exclusive) address of the stack.
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Low (inclusive) address of the stack.
    pub fn end(&self) -> usize {
        self.start - self.size
    }

    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.end() && addr < self.start
    }

    /// Word-aligned addresses inside the extent, lowest first.
    pub fn words(&self) -> impl Iterator<Item = usize> {
        let first = (self.end() + WORD - 1) & !(WORD - 1);
        let last = self.start;
        (first..last).step_by(WORD).take_while(move |addr| addr + WORD <= last)
    }
}

impl fmt::Display for StackExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}..{:#x} ({} bytes)", self.end(), self.start, self.size)
    }
}

/// Returns an address inside the caller's stack, just below its frame.
#[inline(never)]
pub fn approximate_stack_pointer() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}
