//! Per-request state machine: rewrite the destination sector according to
//! the current mapping, forward the request to the base device, and
//! guarantee the original request's completion fires exactly once.
//!
//! The Remapper itself holds no state — every piece of context it needs
//! (the index, the allocator, the clone pool, the base device) is passed
//! in by the caller (`Device::submit`, in `crate::device`).

use std::io;
use std::sync::RwLock;

use crate::blockdevice::{BlockDevice, ClonePool};
use crate::config::ReadFallback;
use crate::error::{Error, Result};
use crate::index::Index;
use crate::sector::{sectors_for_bytes, Sector};

/// The operation a request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
    /// Anything else (discard, flush, write-zeroes, ...) — rejected.
    Other,
}

/// Signals completion of a request exactly once. Carries the outcome the
/// base device's forwarded I/O produced (or an error from a path that
/// never reached the base device at all).
pub type Completion = Box<dyn FnOnce(Result<()>) + Send>;

/// An I/O request delivered by the host I/O layer.
pub struct Request {
    pub op: Op,
    pub virt_sector: Sector,
    pub byte_length: u64,
    /// Write: data to write. Read: buffer to fill, `len() == byte_length`.
    pub payload: Vec<u8>,
    completion: Option<Completion>,
}

impl Request {
    pub fn write(virt_sector: Sector, payload: Vec<u8>, completion: Completion) -> Self {
        let byte_length = payload.len() as u64;
        Self {
            op: Op::Write,
            virt_sector,
            byte_length,
            payload,
            completion: Some(completion),
        }
    }

    pub fn read(virt_sector: Sector, byte_length: u64, completion: Completion) -> Self {
        Self {
            op: Op::Read,
            virt_sector,
            byte_length,
            payload: vec![0u8; byte_length as usize],
            completion: Some(completion),
        }
    }

    pub fn other(virt_sector: Sector, completion: Completion) -> Self {
        Self {
            op: Op::Other,
            virt_sector,
            byte_length: 0,
            payload: Vec::new(),
            completion: Some(completion),
        }
    }
}

/// Everything the Remapper needs to service one request. Borrowed from the
/// owning `Device` for the duration of `submit`.
pub struct RemapContext<'a> {
    pub base: &'a dyn BlockDevice,
    pub index: &'a RwLock<Index>,
    pub clones: &'a ClonePool,
    pub capacity: Sector,
    pub read_fallback: ReadFallback,
    pub sector_size: u64,
}

/// Services one request to completion, per §4.3 of the design. Always
/// invokes `req`'s completion exactly once, whether the path succeeds,
/// fails before forwarding, or fails after forwarding.
pub fn submit(ctx: &RemapContext<'_>, mut req: Request) {
    let completion = req.completion.take().expect("request submitted without a completion");

    let clone_guard = match ctx.clones.acquire() {
        Some(guard) => guard,
        None => {
            log::error!("clone pool exhausted, failing request for virt sector {}", req.virt_sector);
            completion(Err(Error::IoError(io::Error::other("clone pool exhausted"))));
            return;
        }
    };

    let new_sector = match req.op {
        Op::Read => {
            let index = ctx.index.read().unwrap_or_else(|e| e.into_inner());
            match index.find(req.virt_sector) {
                Some(phys) => {
                    log::debug!("read: virt {} mapped to phys {}", req.virt_sector, phys);
                    phys
                }
                None => match ctx.read_fallback {
                    ReadFallback::PassThrough => {
                        log::debug!("read: virt {} unmapped, passing through", req.virt_sector);
                        req.virt_sector
                    }
                    ReadFallback::FailUnmapped => {
                        drop(clone_guard);
                        log::warn!("read: virt {} is not mapped", req.virt_sector);
                        completion(Err(Error::Invalid));
                        return;
                    }
                },
            }
        }
        Op::Write => {
            let size = sectors_for_bytes(req.byte_length, ctx.sector_size);
            let mut index = ctx.index.write().unwrap_or_else(|e| e.into_inner());
            match index.write(req.virt_sector, size, ctx.capacity) {
                Ok((phys, true)) => {
                    log::debug!("write: virt {} is now mapped to phys {}", req.virt_sector, phys);
                    phys
                }
                Ok((phys, false)) => {
                    log::debug!("write: virt {} already mapped to phys {}", req.virt_sector, phys);
                    phys
                }
                Err(e) => {
                    drop(clone_guard);
                    log::error!("write: failed to map virt {}: {e}", req.virt_sector);
                    completion(Err(e));
                    return;
                }
            }
        }
        Op::Other => {
            drop(clone_guard);
            log::error!("unsupported request operation for virt sector {}", req.virt_sector);
            completion(Err(Error::Unsupported));
            return;
        }
    };

    let result = ctx.base.submit(req.op, new_sector, &mut req.payload);
    drop(clone_guard);
    completion(result.map_err(Error::IoError));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockdevice::MemBlockDevice;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ctx<'a>(base: &'a MemBlockDevice, index: &'a RwLock<Index>, clones: &'a ClonePool) -> RemapContext<'a> {
        RemapContext {
            base,
            index,
            clones,
            capacity: base.capacity(),
            read_fallback: ReadFallback::PassThrough,
            sector_size: crate::sector::SECTOR_SIZE,
        }
    }

    #[test]
    fn fresh_write_lands_at_phys_zero() {
        let base = MemBlockDevice::new(64, crate::sector::SECTOR_SIZE);
        let index = RwLock::new(Index::new(crate::skiplist::MAX_LVL).unwrap());
        let clones = ClonePool::new(4);
        let completed: Arc<std::sync::Mutex<Option<Result<()>>>> = Arc::new(std::sync::Mutex::new(None));
        let completed2 = completed.clone();

        let req = Request::write(100, vec![0xAAu8; 512], Box::new(move |r| *completed2.lock().unwrap() = Some(r)));
        submit(&ctx(&base, &index, &clones), req);

        assert!(completed.lock().unwrap().take().unwrap().is_ok());
        assert_eq!(index.read().unwrap().next_free(), 1);
        assert_eq!(index.read().unwrap().find(100), Some(0));
    }

    #[test]
    fn completion_fires_exactly_once() {
        let base = MemBlockDevice::new(64, crate::sector::SECTOR_SIZE);
        let index = RwLock::new(Index::new(crate::skiplist::MAX_LVL).unwrap());
        let clones = ClonePool::new(4);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();

        let req = Request::read(7, 512, Box::new(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        }));
        submit(&ctx(&base, &index, &clones), req);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsupported_op_completes_with_error() {
        let base = MemBlockDevice::new(64, crate::sector::SECTOR_SIZE);
        let index = RwLock::new(Index::new(crate::skiplist::MAX_LVL).unwrap());
        let clones = ClonePool::new(4);
        let result: Arc<std::sync::Mutex<Option<Result<()>>>> = Arc::new(std::sync::Mutex::new(None));
        let result2 = result.clone();

        let req = Request::other(1, Box::new(move |r| *result2.lock().unwrap() = Some(r)));
        submit(&ctx(&base, &index, &clones), req);

        assert!(matches!(result.lock().unwrap().take(), Some(Err(Error::Unsupported))));
    }
}
