//! File Handler - positioned byte I/O on a single object file.
//!
//! A [`FileHandler`] moves exact byte counts to and from one file. It has no
//! caching and no retry; callers that need either layer it on top.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::common::config::TMP_FILE_SUFFIX;
use crate::common::Result;

/// Reads or writes one object file.
///
/// # Write Protocol
/// A handler opened with [`FileHandler::create`] writes into a scratch file
/// next to the target (`<path>.tmp`). [`FileHandler::finish`] syncs it (when
/// configured) and renames it over the target, so a failed write-back leaves
/// the previously persisted bytes untouched. Dropping an unfinished writer
/// removes the scratch file.
///
/// # Thread Safety
/// `FileHandler` is **single-threaded**. Callers serialize access to one
/// handler; the buffer pool does this by letting only the thread driving an
/// object's transition touch its file.
#[derive(Debug)]
pub struct FileHandler {
    file: File,
    path: PathBuf,
    /// Scratch path while writing; `None` for readers and finished writers.
    tmp_path: Option<PathBuf>,
    sync: bool,
    bytes_read: u64,
    bytes_written: u64,
}

impl FileHandler {
    /// Open an existing object file for reading.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;

        Ok(Self {
            file,
            path,
            tmp_path: None,
            sync: false,
            bytes_read: 0,
            bytes_written: 0,
        })
    }

    /// Start writing a new version of an object file.
    ///
    /// Nothing is visible at `path` until [`finish`](Self::finish) succeeds.
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tmp_path = tmp_path_for(&path);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        Ok(Self {
            file,
            path,
            tmp_path: Some(tmp_path),
            sync,
            bytes_read: 0,
            bytes_written: 0,
        })
    }

    /// Fill `buf` with exactly `buf.len()` bytes from the current position.
    ///
    /// # Errors
    /// A short read surfaces as `Error::Io` with kind `UnexpectedEof`.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        self.file.read_exact(buf)?;
        self.bytes_read += buf.len() as u64;
        Ok(())
    }

    /// Write exactly `buf.len()` bytes at the current position.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.file.write_all(buf)?;
        self.bytes_written += buf.len() as u64;
        Ok(())
    }

    /// Publish a written file: flush, optionally fsync, then rename into place.
    ///
    /// For a reader this is a no-op.
    pub fn finish(mut self) -> Result<()> {
        let Some(tmp_path) = self.tmp_path.take() else {
            return Ok(());
        };

        let published = self.publish(&tmp_path);
        if published.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        published?;

        debug!(
            path = %self.path.display(),
            bytes = self.bytes_written,
            "object file published"
        );
        Ok(())
    }

    fn publish(&mut self, tmp_path: &Path) -> Result<()> {
        self.file.flush()?;
        if self.sync {
            self.file.sync_all()?;
        }
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }

    /// Length of the underlying file in bytes.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Target path of this handler.
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl Drop for FileHandler {
    fn drop(&mut self) {
        if let Some(tmp_path) = self.tmp_path.take() {
            let _ = fs::remove_file(tmp_path);
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(TMP_FILE_SUFFIX);
    path.with_file_name(name)
}
