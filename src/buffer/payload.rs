//! In-memory payloads owned by buffer objects.
//!
//! A [`Payload`] is created by a persistence worker's `allocate_in_memory`
//! and released by its `free_in_memory`. The enum is closed over the object
//! kinds the pool knows how to persist.

use std::fmt;

use crate::index::vector::{FlatIndex, VectorIndex};

/// Which persistence worker variant an object is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    DataBlock,
    VectorIndex,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerKind::DataBlock => f.write_str("data-block"),
            WorkerKind::VectorIndex => f.write_str("vector-index"),
        }
    }
}

/// The resident representation of one persisted object.
#[derive(Debug)]
pub enum Payload {
    DataBlock(DataBlock),
    VectorIndex(VectorIndexPayload),
}

impl Payload {
    pub fn kind(&self) -> WorkerKind {
        match self {
            Payload::DataBlock(_) => WorkerKind::DataBlock,
            Payload::VectorIndex(_) => WorkerKind::VectorIndex,
        }
    }

    pub fn as_data_block(&self) -> Option<&DataBlock> {
        match self {
            Payload::DataBlock(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_data_block_mut(&mut self) -> Option<&mut DataBlock> {
        match self {
            Payload::DataBlock(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_vector_index(&self) -> Option<&VectorIndexPayload> {
        match self {
            Payload::VectorIndex(index) => Some(index),
            _ => None,
        }
    }

    pub fn as_vector_index_mut(&mut self) -> Option<&mut VectorIndexPayload> {
        match self {
            Payload::VectorIndex(index) => Some(index),
            _ => None,
        }
    }
}

/// A columnar data block: a byte buffer with fixed capacity.
///
/// # Example
/// ```
/// use vectorpool::buffer::DataBlock;
///
/// let mut block = DataBlock::new(8);
/// assert!(block.append(b"abcd"));
/// assert!(!block.append(b"too long"));
/// assert_eq!(block.as_slice(), b"abcd");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    data: Vec<u8>,
    capacity: usize,
}

impl DataBlock {
    /// Create an empty block that can hold `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Mutable view of the filled bytes.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Append `bytes`; returns `false` and writes nothing if they don't fit.
    pub fn append(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.remaining() {
            return false;
        }
        self.data.extend_from_slice(bytes);
        true
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Replace the contents with bytes read from disk.
    pub(crate) fn load(&mut self, data: Vec<u8>) {
        debug_assert!(data.len() <= self.capacity);
        self.data = data;
    }
}

/// Resident form of a vector index: the index plus an optional auxiliary
/// coarse quantizer.
///
/// Both handles are owned exclusively; freeing the payload destroys both.
/// Only `index` is persisted. An IVF index serializes its own quantizer, so
/// the auxiliary one is scratch state for building an index (for example a
/// quantizer trained before the index that will own a copy of it).
#[derive(Debug, Default)]
pub struct VectorIndexPayload {
    pub index: Option<VectorIndex>,
    pub quantizer: Option<FlatIndex>,
}

impl VectorIndexPayload {
    /// True if neither handle is set.
    pub fn is_empty(&self) -> bool {
        self.index.is_none() && self.quantizer.is_none()
    }
}
