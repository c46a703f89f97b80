use std::fmt;
use std::io;

/// Unified error taxonomy for the remapper core and its control surface.
#[derive(Debug)]
pub enum Error {
    /// Allocation failure in the index (node arena) or in sentinel growth.
    /// The failing operation leaves no partial state.
    OutOfMemory,
    /// A control-plane operation was attempted while the device is open.
    Busy,
    /// A control-plane precondition was violated (no base set, nothing to close).
    Invalid,
    /// The base device path exceeds `MAX_PATH_LEN`.
    NameTooLong,
    /// A request carried an operation other than read or write.
    Unsupported,
    /// Clone allocation failure or base-device submission error, surfaced
    /// on the original request's completion.
    IoError(io::Error),
    /// Underlying open error from the host, propagated verbatim.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "out of memory"),
            Error::Busy => write!(f, "device is busy"),
            Error::Invalid => write!(f, "invalid operation for current state"),
            Error::NameTooLong => write!(f, "base device path too long"),
            Error::Unsupported => write!(f, "unsupported request operation"),
            Error::IoError(e) => write!(f, "I/O error: {e}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
