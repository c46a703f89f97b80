//! # blkremap
//!
//! A log-structured block-device remapper: a virtual block device that
//! sits in front of a physical "base" block device, intercepts block I/O
//! requests, and remaps their target sectors through an in-memory index so
//! that writes never overwrite prior physical locations on the base
//! device, while reads observe the latest write at each virtual address.
//!
//! ## Core idea
//! Every write allocates a fresh, monotonically increasing physical sector
//! on the base device instead of overwriting in place — the same
//! append-only discipline an LSM-tree's memtable/WAL path uses, applied
//! one level down, at the sector rather than the key-value layer. The
//! mapping from virtual to physical sector lives in a skiplist, the same
//! probabilistic ordered structure LevelDB-style engines use for their
//! memtable, here indexing sectors instead of keys.
//!
//! This crate implements the core only: the sector-remapping I/O path and
//! the mapping index. Kernel-module lifecycle, bio plumbing, and the
//! physical device handle are modeled as the `BlockDevice` trait (see
//! `blockdevice`) so the core is runnable and testable in a host process.

pub mod allocator;
pub mod blockdevice;
pub mod config;
pub mod device;
pub mod error;
pub mod index;
pub mod remapper;
pub mod sector;
pub mod skiplist;

pub use config::{Options, ReadFallback};
pub use device::DeviceManager;
pub use error::{Error, Result};
pub use remapper::{Op, Request};
pub use sector::Sector;
