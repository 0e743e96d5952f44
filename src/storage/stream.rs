//! Byte-stream adapters between a [`FileHandler`] and the item-stream I/O
//! the vector-index encoding expects.
//!
//! The adapters do no buffering: every call moves `unit_size * unit_count`
//! bytes straight through the handler. Handler failures come back as the
//! underlying `std::io::Error`, so their kind survives the trip through the
//! index library.

use std::io;

use crate::common::Error;
use crate::index::vector::{IoReader, IoWriter};
use crate::storage::FileHandler;

/// Reads items from a [`FileHandler`].
pub struct StreamReader<'a> {
    file: &'a mut FileHandler,
}

impl<'a> StreamReader<'a> {
    pub fn new(file: &'a mut FileHandler) -> Self {
        Self { file }
    }
}

impl IoReader for StreamReader<'_> {
    fn read_items(&mut self, buf: &mut [u8], unit_size: usize, unit_count: usize) -> io::Result<usize> {
        let len = item_bytes(buf.len(), unit_size, unit_count)?;
        self.file.read(&mut buf[..len]).map_err(into_io)?;
        Ok(unit_count)
    }
}

/// Writes items to a [`FileHandler`].
pub struct StreamWriter<'a> {
    file: &'a mut FileHandler,
}

impl<'a> StreamWriter<'a> {
    pub fn new(file: &'a mut FileHandler) -> Self {
        Self { file }
    }
}

impl IoWriter for StreamWriter<'_> {
    fn write_items(&mut self, buf: &[u8], unit_size: usize, unit_count: usize) -> io::Result<usize> {
        let len = item_bytes(buf.len(), unit_size, unit_count)?;
        self.file.write(&buf[..len]).map_err(into_io)?;
        Ok(unit_count)
    }
}

/// Byte length of `unit_count` items, which must fit in a buffer of
/// `available` bytes.
fn item_bytes(available: usize, unit_size: usize, unit_count: usize) -> io::Result<usize> {
    match unit_size.checked_mul(unit_count) {
        Some(len) if len <= available => Ok(len),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "{} items of {} bytes do not fit a {} byte buffer",
                unit_count, unit_size, available
            ),
        )),
    }
}

fn into_io(err: Error) -> io::Error {
    match err {
        Error::Io(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}
