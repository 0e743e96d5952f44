//! Stream I/O for the native index encoding.
//!
//! Serialization talks to [`IoReader`] / [`IoWriter`], which move whole
//! items (`unit_size` bytes each) and report how many items they moved.
//! Any byte source can back them: the buffer pool plugs in adapters over its
//! file handler, tests use [`VecWriter`] / [`SliceReader`].

use std::io;

/// Errors raised by the vector-index library.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The underlying reader or writer failed.
    #[error("index I/O failed: {0}")]
    Io(#[from] io::Error),

    /// A stream moved fewer items than requested.
    #[error("short transfer: expected {expected} items, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },

    /// The stream does not start with a known index tag.
    #[error("unknown index fourcc {0:?}")]
    UnknownFourcc([u8; 4]),

    /// The stream decoded but its contents are inconsistent.
    #[error("corrupt index stream: {0}")]
    Corrupt(String),

    /// An API call was made with arguments the index cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Source of item-sized reads.
pub trait IoReader {
    /// Fill `buf` (`unit_size * unit_count` bytes) and return the number of
    /// whole items read.
    fn read_items(&mut self, buf: &mut [u8], unit_size: usize, unit_count: usize)
        -> io::Result<usize>;
}

/// Sink of item-sized writes.
pub trait IoWriter {
    /// Write `buf` (`unit_size * unit_count` bytes) and return the number of
    /// whole items written.
    fn write_items(&mut self, buf: &[u8], unit_size: usize, unit_count: usize)
        -> io::Result<usize>;
}

/// In-memory writer.
#[derive(Debug, Default)]
pub struct VecWriter {
    pub data: Vec<u8>,
}

impl VecWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IoWriter for VecWriter {
    fn write_items(&mut self, buf: &[u8], unit_size: usize, unit_count: usize) -> io::Result<usize> {
        debug_assert_eq!(buf.len(), unit_size * unit_count);
        self.data.extend_from_slice(buf);
        Ok(unit_count)
    }
}

/// In-memory reader over a byte slice.
///
/// Reports a short count (not an error) when the slice runs out, like a
/// C `fread`.
#[derive(Debug)]
pub struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl IoReader for SliceReader<'_> {
    fn read_items(&mut self, buf: &mut [u8], unit_size: usize, unit_count: usize) -> io::Result<usize> {
        debug_assert_eq!(buf.len(), unit_size * unit_count);
        if unit_size == 0 {
            return Ok(unit_count);
        }
        let available = (self.data.len() - self.pos) / unit_size;
        let n = available.min(unit_count);
        let bytes = n * unit_size;
        buf[..bytes].copy_from_slice(&self.data[self.pos..self.pos + bytes]);
        self.pos += bytes;
        Ok(n)
    }
}

/// Largest vector payload a stream may declare (64GB).
const MAX_VECTOR_BYTES: u64 = 1 << 36;

// ============================================================================
// Write helpers
// ============================================================================

fn write_checked(w: &mut dyn IoWriter, buf: &[u8], unit_size: usize, unit_count: usize) -> IndexResult<()> {
    let written = w.write_items(buf, unit_size, unit_count)?;
    if written != unit_count {
        return Err(IndexError::ShortTransfer {
            expected: unit_count,
            actual: written,
        });
    }
    Ok(())
}

pub(crate) fn write_fourcc(w: &mut dyn IoWriter, tag: &[u8; 4]) -> IndexResult<()> {
    write_checked(w, tag, 4, 1)
}

pub(crate) fn write_u8(w: &mut dyn IoWriter, v: u8) -> IndexResult<()> {
    write_checked(w, &[v], 1, 1)
}

pub(crate) fn write_i32(w: &mut dyn IoWriter, v: i32) -> IndexResult<()> {
    write_checked(w, &v.to_le_bytes(), 4, 1)
}

pub(crate) fn write_i64(w: &mut dyn IoWriter, v: i64) -> IndexResult<()> {
    write_checked(w, &v.to_le_bytes(), 8, 1)
}

pub(crate) fn write_u64(w: &mut dyn IoWriter, v: u64) -> IndexResult<()> {
    write_checked(w, &v.to_le_bytes(), 8, 1)
}

/// Write raw `f32` items without a length prefix.
pub(crate) fn write_f32s(w: &mut dyn IoWriter, v: &[f32]) -> IndexResult<()> {
    let bytes: Vec<u8> = v.iter().flat_map(|x| x.to_le_bytes()).collect();
    write_checked(w, &bytes, 4, v.len())
}

/// Write raw `i64` items without a length prefix.
pub(crate) fn write_i64s(w: &mut dyn IoWriter, v: &[i64]) -> IndexResult<()> {
    let bytes: Vec<u8> = v.iter().flat_map(|x| x.to_le_bytes()).collect();
    write_checked(w, &bytes, 8, v.len())
}

/// Write a length-prefixed `f32` vector.
pub(crate) fn write_f32_vec(w: &mut dyn IoWriter, v: &[f32]) -> IndexResult<()> {
    write_u64(w, v.len() as u64)?;
    write_f32s(w, v)
}

/// Write a length-prefixed `u64` vector.
pub(crate) fn write_u64_vec(w: &mut dyn IoWriter, v: &[u64]) -> IndexResult<()> {
    write_u64(w, v.len() as u64)?;
    let bytes: Vec<u8> = v.iter().flat_map(|x| x.to_le_bytes()).collect();
    write_checked(w, &bytes, 8, v.len())
}

// ============================================================================
// Read helpers
// ============================================================================

fn read_checked(r: &mut dyn IoReader, buf: &mut [u8], unit_size: usize, unit_count: usize) -> IndexResult<()> {
    let read = r.read_items(buf, unit_size, unit_count)?;
    if read != unit_count {
        return Err(IndexError::ShortTransfer {
            expected: unit_count,
            actual: read,
        });
    }
    Ok(())
}

pub(crate) fn read_fourcc(r: &mut dyn IoReader) -> IndexResult<[u8; 4]> {
    let mut tag = [0u8; 4];
    read_checked(r, &mut tag, 4, 1)?;
    Ok(tag)
}

pub(crate) fn read_u8(r: &mut dyn IoReader) -> IndexResult<u8> {
    let mut b = [0u8; 1];
    read_checked(r, &mut b, 1, 1)?;
    Ok(b[0])
}

pub(crate) fn read_i32(r: &mut dyn IoReader) -> IndexResult<i32> {
    let mut b = [0u8; 4];
    read_checked(r, &mut b, 4, 1)?;
    Ok(i32::from_le_bytes(b))
}

pub(crate) fn read_i64(r: &mut dyn IoReader) -> IndexResult<i64> {
    let mut b = [0u8; 8];
    read_checked(r, &mut b, 8, 1)?;
    Ok(i64::from_le_bytes(b))
}

pub(crate) fn read_u64(r: &mut dyn IoReader) -> IndexResult<u64> {
    let mut b = [0u8; 8];
    read_checked(r, &mut b, 8, 1)?;
    Ok(u64::from_le_bytes(b))
}

fn checked_len(count: u64, unit_size: u64) -> IndexResult<usize> {
    match count.checked_mul(unit_size) {
        Some(bytes) if bytes <= MAX_VECTOR_BYTES => Ok(count as usize),
        _ => Err(IndexError::Corrupt(format!(
            "vector of {} items exceeds the size limit",
            count
        ))),
    }
}

/// Read `count` raw `f32` items.
pub(crate) fn read_f32s(r: &mut dyn IoReader, count: u64) -> IndexResult<Vec<f32>> {
    let n = checked_len(count, 4)?;
    let mut bytes = vec![0u8; n * 4];
    read_checked(r, &mut bytes, 4, n)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Read `count` raw `i64` items.
pub(crate) fn read_i64s(r: &mut dyn IoReader, count: u64) -> IndexResult<Vec<i64>> {
    let n = checked_len(count, 8)?;
    let mut bytes = vec![0u8; n * 8];
    read_checked(r, &mut bytes, 8, n)?;
    Ok(bytes
        .chunks_exact(8)
        .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect())
}

pub(crate) fn read_f32_vec(r: &mut dyn IoReader) -> IndexResult<Vec<f32>> {
    let count = read_u64(r)?;
    read_f32s(r, count)
}

pub(crate) fn read_u64_vec(r: &mut dyn IoReader) -> IndexResult<Vec<u64>> {
    let count = read_u64(r)?;
    let n = checked_len(count, 8)?;
    let mut bytes = vec![0u8; n * 8];
    read_checked(r, &mut bytes, 8, n)?;
    Ok(bytes
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect())
}
