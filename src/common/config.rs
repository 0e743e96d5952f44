//! Configuration for vectorpool.

use std::path::{Path, PathBuf};

/// Default memory budget for resident payloads (256MB).
pub const DEFAULT_BUFFER_BUDGET: usize = 256 * 1024 * 1024;

/// Default capacity of a columnar data block (64KB).
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Fixed per-object charge for a vector index, on top of its vector storage.
///
/// Covers the index header, the payload handles and allocator slack.
pub const VECTOR_INDEX_OVERHEAD: usize = 4096;

/// Suffix of the scratch file a write goes to before it is renamed into place.
pub const TMP_FILE_SUFFIX: &str = "tmp";

/// Settings accepted by [`BufferManager`](crate::buffer::BufferManager) at
/// construction.
///
/// # Example
/// ```
/// use vectorpool::common::BufferManagerConfig;
///
/// let config = BufferManagerConfig::new(1 << 20, "/tmp/vp").sync_on_write(false);
/// assert_eq!(config.budget_bytes, 1 << 20);
/// assert!(!config.sync_on_write);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferManagerConfig {
    /// Upper bound on the summed estimated size of all resident payloads.
    pub budget_bytes: usize,

    /// Directory holding one file per object identity.
    pub data_dir: PathBuf,

    /// fsync every written file before publishing it.
    pub sync_on_write: bool,
}

impl BufferManagerConfig {
    /// Create a config with the given budget and data directory.
    ///
    /// Writes are synced by default.
    pub fn new<P: AsRef<Path>>(budget_bytes: usize, data_dir: P) -> Self {
        Self {
            budget_bytes,
            data_dir: data_dir.as_ref().to_path_buf(),
            sync_on_write: true,
        }
    }

    /// Enable or disable fsync on write-back.
    pub fn sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }
}
