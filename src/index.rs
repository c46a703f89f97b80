//! Combines the skiplist and allocator behind the single critical section
//! that §5 of the design requires: a write to the index and the allocator
//! bump it may trigger commit together, never interleaved with another
//! index operation.

use std::io;

use crate::allocator::Allocator;
use crate::error::{Error, Result};
use crate::sector::Sector;
use crate::skiplist::{RandCoin, Skiplist};

pub struct Index {
    skiplist: Skiplist<RandCoin>,
    allocator: Allocator,
    max_lvl: usize,
}

impl Index {
    pub fn new(max_lvl: usize) -> Result<Self> {
        Ok(Self {
            skiplist: Skiplist::with_coin_and_max_lvl(RandCoin::default(), max_lvl)?,
            allocator: Allocator::new(),
            max_lvl,
        })
    }

    /// Read-path lookup. Callers take the index's reader-writer lock in
    /// read mode for this.
    pub fn find(&self, key: Sector) -> Option<Sector> {
        self.skiplist.find(key)
    }

    /// Write-path insertion. Callers take the index's reader-writer lock in
    /// write mode for this — the critical section below covers both the
    /// skiplist insertion and, on a first write, the allocator's advance.
    pub fn write(&mut self, key: Sector, size: Sector, capacity: Sector) -> Result<(Sector, bool)> {
        let candidate = self.allocator.next_free();
        if candidate.checked_add(size).is_none_or(|end| end > capacity) {
            return Err(Error::IoError(io::Error::other(
                "allocator has no room left on the base device",
            )));
        }

        let (phys, inserted) = self.skiplist.add(key, candidate)?;
        if inserted {
            self.allocator.advance(size);
        }
        Ok((phys, inserted))
    }

    pub fn next_free(&self) -> Sector {
        self.allocator.next_free()
    }

    /// Tears down the skiplist and resets the allocator, as happens on
    /// device close.
    pub fn reset(&mut self) -> Result<()> {
        self.skiplist.free();
        self.skiplist = Skiplist::with_coin_and_max_lvl(RandCoin::default(), self.max_lvl)?;
        self.allocator.reset();
        Ok(())
    }
}
