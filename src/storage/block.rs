//! On-disk header for columnar data blocks.
//!
//! A data block file is a [`BlockHeader`] followed by the block's `len` bytes.

use crate::common::{Error, Result};
use crate::storage_error;

/// Metadata stored at the beginning of every data block file.
///
/// # Layout (16 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     magic ("VPBK")
/// 4       8     len (payload bytes, little-endian)
/// 12      4     checksum (CRC32 of the payload bytes, little-endian)
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Number of payload bytes following the header.
    pub len: u64,
    /// CRC32 checksum of the payload bytes.
    pub checksum: u32,
}

impl BlockHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 16;

    pub const MAGIC: [u8; 4] = *b"VPBK";

    const OFFSET_LEN: usize = 4;
    const OFFSET_CHECKSUM: usize = 12;

    /// Build the header describing `data`.
    pub fn for_data(data: &[u8]) -> Self {
        Self {
            len: data.len() as u64,
            checksum: Self::compute_checksum(data),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[..Self::OFFSET_LEN].copy_from_slice(&Self::MAGIC);
        buf[Self::OFFSET_LEN..Self::OFFSET_CHECKSUM].copy_from_slice(&self.len.to_le_bytes());
        buf[Self::OFFSET_CHECKSUM..].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Parse a header.
    ///
    /// # Errors
    /// Returns `Error::Storage` if the magic bytes don't match.
    pub fn from_bytes(buf: &[u8; Self::SIZE]) -> Result<Self> {
        if buf[..Self::OFFSET_LEN] != Self::MAGIC {
            return Err(storage_error!(
                "bad data block magic {:?}",
                &buf[..Self::OFFSET_LEN]
            ));
        }

        let mut len = [0u8; 8];
        len.copy_from_slice(&buf[Self::OFFSET_LEN..Self::OFFSET_CHECKSUM]);
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&buf[Self::OFFSET_CHECKSUM..]);

        Ok(Self {
            len: u64::from_le_bytes(len),
            checksum: u32::from_le_bytes(checksum),
        })
    }

    pub fn compute_checksum(data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Check `data` against the stored checksum.
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        let actual = Self::compute_checksum(data);
        if actual != self.checksum {
            return Err(Error::Storage {
                message: format!(
                    "data block checksum mismatch: stored {:#010x}, computed {:#010x}",
                    self.checksum, actual
                ),
                file: file!(),
                line: line!(),
            });
        }
        Ok(())
    }
}
