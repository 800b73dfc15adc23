use std::fmt;

/// An opaque managed value.
///
/// The object model lives outside this crate. Threads only move values from the
/// OS thread that produced them to whoever joins, and the collector sees them as
/// machine words that may or may not point into the managed heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct Value(usize);

impl Value {
    pub const NIL: Value = Value(0);

    pub const fn from_bits(bits: usize) -> Self {
        Value(bits)
    }

    pub const fn to_bits(self) -> usize {
        self.0
    }

    pub const fn is_nil(self) -> bool {
        self.0 == 0
    }
}

impl From<usize> for Value {
    fn from(bits: usize) -> Self {
        Value(bits)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "nil")
        } else {
            write!(f, "Value({:#x})", self.0)
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
