//! Tunables that the distilled core leaves as constants but a complete
//! implementation exposes as configuration.

use crate::sector::SECTOR_SIZE;
use crate::skiplist::MAX_LVL;

/// Maximum accepted length of a base device path, mirroring the control
/// surface's `NameTooLong` boundary.
pub const MAX_PATH_LEN: usize = 20;

/// Policy for a READ against a virtual sector with no mapping yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFallback {
    /// Pass through to the identical physical sector on the base device.
    /// This is the policy the source driver's behaviour reflects.
    PassThrough,
    /// Fail the request with `Error::Invalid` instead of passing through.
    FailUnmapped,
}

/// Bundles every tunable the device lifecycle, skiplist, and remapper need.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub max_path_len: usize,
    pub clone_pool_capacity: usize,
    pub read_fallback: ReadFallback,
    /// Maximum skiplist tower height above level 0.
    pub max_lvl: usize,
    /// Bytes per sector, used to size requests and base-device buffers.
    pub sector_size: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_path_len: MAX_PATH_LEN,
            clone_pool_capacity: 64,
            read_fallback: ReadFallback::PassThrough,
            max_lvl: MAX_LVL,
            sector_size: SECTOR_SIZE,
        }
    }
}
