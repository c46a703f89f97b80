//! Hands out monotonically increasing physical sectors on the base device.

use crate::sector::Sector;

/// A trivial monotonic counter — but the discipline of *when* it advances
/// lives entirely in the caller (see `crate::index::Index::write`).
pub struct Allocator {
    next_free: Sector,
}

impl Allocator {
    pub fn new() -> Self {
        Self { next_free: 0 }
    }

    /// The next candidate physical sector a fresh write would land at.
    pub fn next_free(&self) -> Sector {
        self.next_free
    }

    /// Advances the cursor by `size` sectors. Only called on a first write.
    pub fn advance(&mut self, size: Sector) {
        self.next_free += size;
    }

    /// Resets the cursor to 0, as happens on device close.
    pub fn reset(&mut self) {
        self.next_free = 0;
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}
