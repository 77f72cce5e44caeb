use std::fmt;

/// Width of one machine word in bytes. Frame pointers of adjacent frames
/// differ by at least this much, which is what the at-or-below clear
/// boundary relies on.
pub const WORD_SIZE: usize = std::mem::size_of::<usize>();

/// An opaque machine address: a frame pointer or a code location.
///
/// This crate never dereferences one, it only compares and stores them.
#[repr(transparent)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Addr(pub usize);

impl Addr {
    /// The address one machine word above `self`.
    #[must_use]
    pub fn word_above(self) -> Addr {
        Addr(self.0 + WORD_SIZE)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
