//! Sector addressing. A sector is a 64-bit unsigned integer identifying a
//! fixed-size block; the size itself is an opaque system constant.

/// A sector number on either the virtual device or the base device.
pub type Sector = u64;

/// Bytes per sector. Typical for a block device; treated opaquely elsewhere
/// in the crate.
pub const SECTOR_SIZE: u64 = 512;

/// The right-sentinel key: no real sector can equal this.
pub const SECTOR_MAX: Sector = u64::MAX;

/// Number of sectors of size `sector_size` spanned by `byte_length` bytes.
pub fn sectors_for_bytes(byte_length: u64, sector_size: u64) -> u64 {
    byte_length.div_ceil(sector_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sectors_for_bytes_rounds_up() {
        assert_eq!(sectors_for_bytes(0, SECTOR_SIZE), 0);
        assert_eq!(sectors_for_bytes(1, SECTOR_SIZE), 1);
        assert_eq!(sectors_for_bytes(512, SECTOR_SIZE), 1);
        assert_eq!(sectors_for_bytes(513, SECTOR_SIZE), 2);
        assert_eq!(sectors_for_bytes(4096, SECTOR_SIZE), 8);
    }

    #[test]
    fn sectors_for_bytes_honors_custom_sector_size() {
        assert_eq!(sectors_for_bytes(4096, 4096), 1);
        assert_eq!(sectors_for_bytes(4097, 4096), 2);
    }
}
