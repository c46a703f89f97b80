//! Binds/unbinds the virtual device to a base device: owns the index, the
//! clone pool, and the base-device handle, and drives the
//! `Unbound → Configured → Open → Unbound` lifecycle from §4.4.

use std::io;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::blockdevice::{BlockDevice, ClonePool, FileBlockDevice};
use crate::config::{Options, ReadFallback};
use crate::error::{Error, Result};
use crate::index::Index;
use crate::remapper::{self, RemapContext, Request};
use crate::sector::Sector;

const DISK_NAME: &str = "sdblk";

/// Opens a base device path into a handle, at the given sector size.
/// Production code plugs in `open_file_block_device`; tests plug in a
/// closure over `MemBlockDevice`.
pub type Opener = dyn Fn(&str, u64) -> io::Result<Arc<dyn BlockDevice>> + Send + Sync;

/// Opens `path` as a real file-backed block device. The default opener for
/// `DeviceManager::new_with_file_backend`.
pub fn open_file_block_device(path: &str, sector_size: u64) -> io::Result<Arc<dyn BlockDevice>> {
    let device = FileBlockDevice::open(Path::new(path), sector_size)?;
    Ok(Arc::new(device))
}

/// The open virtual device: one base-device handle, one index, one clone
/// pool, and the capacity inherited from the base device.
pub struct Device {
    base: Arc<dyn BlockDevice>,
    index: RwLock<Index>,
    clones: ClonePool,
    capacity: Sector,
    read_fallback: ReadFallback,
    sector_size: u64,
    disk_name: String,
}

impl Device {
    fn open(base: Arc<dyn BlockDevice>, options: &Options) -> Result<Self> {
        let capacity = base.capacity();
        Ok(Self {
            base,
            index: RwLock::new(Index::new(options.max_lvl)?),
            clones: ClonePool::new(options.clone_pool_capacity),
            capacity,
            read_fallback: options.read_fallback,
            sector_size: options.sector_size,
            disk_name: DISK_NAME.to_string(),
        })
    }

    pub fn capacity(&self) -> Sector {
        self.capacity
    }

    pub fn disk_name(&self) -> &str {
        &self.disk_name
    }

    /// Services one request. See `crate::remapper::submit`.
    pub fn submit(&self, req: Request) {
        let ctx = RemapContext {
            base: self.base.as_ref(),
            index: &self.index,
            clones: &self.clones,
            capacity: self.capacity,
            read_fallback: self.read_fallback,
            sector_size: self.sector_size,
        };
        remapper::submit(&ctx, req);
    }

    fn teardown(&self) -> Result<()> {
        self.index.write().unwrap_or_else(|e| e.into_inner()).reset()
    }
}

#[derive(Default)]
struct ManagerState {
    base_path: Option<String>,
    device: Option<Arc<Device>>,
}

/// Drives the control surface: `base` (get/set), `open`, `close`. At most
/// one of these, and no `submit`, may run at a time — a submit only takes
/// a brief read lock to clone the current `Device` handle, so data-plane
/// requests stay concurrent with each other.
pub struct DeviceManager {
    state: RwLock<ManagerState>,
    opener: Arc<Opener>,
    options: Options,
}

impl DeviceManager {
    pub fn new(opener: Arc<Opener>, options: Options) -> Self {
        Self {
            state: RwLock::new(ManagerState::default()),
            opener,
            options,
        }
    }

    /// A manager that opens base devices as real files.
    pub fn new_with_file_backend(options: Options) -> Self {
        Self::new(Arc::new(open_file_block_device), options)
    }

    /// `Unbound|Configured → Configured`: stores the base device path,
    /// trimmed at the first newline. Rejects if the device is open.
    pub fn set_base_path(&self, arg: &str) -> Result<()> {
        let trimmed = arg.split('\n').next().unwrap_or("");
        if trimmed.len() >= self.options.max_path_len {
            return Err(Error::NameTooLong);
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.device.is_some() {
            return Err(Error::Busy);
        }
        state.base_path = Some(trimmed.to_string());
        log::info!("base device path set to {trimmed:?}");
        Ok(())
    }

    /// Reads back the stored base device path.
    pub fn base_path(&self) -> Result<String> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.base_path.clone().ok_or(Error::Invalid)
    }

    /// `Configured → Open`: opens the base device, reads its capacity,
    /// constructs the virtual disk with a fresh index, and publishes it.
    /// On any failure the state reverts to `Configured`.
    pub fn open_and_create(&self) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.device.is_some() {
            return Err(Error::Busy);
        }
        let path = state.base_path.clone().ok_or(Error::Invalid)?;

        let base = (self.opener)(&path, self.options.sector_size).map_err(|e| {
            log::error!("cannot open block device '{path}': {e}");
            Error::Io(e)
        })?;

        let device = Device::open(base, &self.options)?;
        log::warn!(
            "opened device '{path}' and created disk '{}' based on it (capacity {} sectors)",
            device.disk_name(),
            device.capacity(),
        );
        state.device = Some(Arc::new(device));
        Ok(())
    }

    /// `Open → Unbound`: removes and releases the virtual disk, releases
    /// the base-device handle, frees the index, resets `next_free`.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let device = state.device.take().ok_or(Error::Invalid)?;
        device.teardown()?;
        log::warn!("closed device and destroyed disk '{}'", device.disk_name());
        Ok(())
    }

    /// Dispatches a request to the currently open device. The host
    /// guarantees this is never called after a successful `close`.
    pub fn submit(&self, req: Request) {
        let device = {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            state.device.clone()
        };
        match device {
            Some(device) => device.submit(req),
            None => {
                log::error!("submit observed a closed device");
            }
        }
    }
}
