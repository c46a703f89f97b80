//! Out-of-band control client for the remapper's control surface: `base`
//! (get/set), `open`, `close`. Mirrors the three `module_param_cb` knobs
//! the kernel driver this core is modeled on exposes as sysfs parameters,
//! as an ordinary CLI instead.

use std::process::ExitCode;
use std::sync::OnceLock;

use blkremap::device::DeviceManager;
use blkremap::{Error, Options};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "blkm-ctl", about = "Control surface for the block-device remapper")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Get or set the base device path.
    Base {
        /// Path to the base block device. Omit to read back the stored path.
        path: Option<String>,
    },
    /// Open the base device and create the virtual disk.
    Open,
    /// Close the virtual disk and release the base device.
    Close,
}

static MANAGER: OnceLock<DeviceManager> = OnceLock::new();

fn manager() -> &'static DeviceManager {
    MANAGER.get_or_init(|| DeviceManager::new_with_file_backend(Options::default()))
}

fn status_code(result: blkremap::Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(Error::OutOfMemory) => -12,
        Err(Error::Busy) => -16,
        Err(Error::Invalid) => -22,
        Err(Error::NameTooLong) => -36,
        Err(Error::Unsupported) => -95,
        Err(Error::IoError(_)) | Err(Error::Io(_)) => -5,
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let mgr = manager();

    let code = match cli.command {
        Command::Base { path: Some(path) } => status_code(mgr.set_base_path(&path)),
        Command::Base { path: None } => match mgr.base_path() {
            Ok(path) => {
                println!("{path}");
                0
            }
            Err(e) => status_code(Err(e)),
        },
        Command::Open => status_code(mgr.open_and_create()),
        Command::Close => status_code(mgr.close()),
    };

    if code != 0 {
        eprintln!("blkm-ctl: command failed with status {code}");
    }
    ExitCode::from(code.unsigned_abs().min(255) as u8)
}
