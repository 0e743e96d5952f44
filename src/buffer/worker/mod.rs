//! Persistence workers: per-kind conversion between a [`Payload`] and bytes.
//!
//! Every buffer object holds one worker, fixed at construction. The buffer
//! object drives the residency state machine and calls into the worker for
//! the four capabilities below; the worker never tracks residency itself.
//!
//! | Capability            | Contract                                         |
//! |-----------------------|--------------------------------------------------|
//! | `allocate_in_memory`  | empty payload; `AlreadyAllocated` if one is live |
//! | `free_in_memory`      | release payload; `NotAllocated` if none is live  |
//! | `read_from_file_impl` | fill an allocated payload from a file            |
//! | `write_to_file_impl`  | serialize the payload into a file                |
//!
//! Failures from serialization code are translated at this boundary into
//! [`Error::Storage`](crate::common::Error::Storage) (or `Error::Io` for file
//! faults); nothing else crosses into the buffer manager.

mod data_block;
mod vector_index;

use std::fmt;

use crate::buffer::{Payload, WorkerKind};
use crate::common::Result;
use crate::storage::FileHandler;

pub use data_block::DataBlockWorker;
pub use vector_index::VectorIndexWorker;

/// The capability set shared by every object kind.
///
/// Implementations are stateless with respect to any single object beyond
/// their configuration, so one worker may be shared by many objects.
pub trait PersistenceWorker: Send + Sync + fmt::Debug {
    /// Kind tag, checked when an identity is looked up again.
    fn kind(&self) -> WorkerKind;

    /// Bytes charged against the pool budget while an object is resident.
    ///
    /// Must be a pure function of the worker's configuration.
    fn estimated_size(&self) -> usize;

    /// Construct an empty payload in `slot`.
    ///
    /// # Errors
    /// `Error::AlreadyAllocated` if `slot` already holds a payload.
    fn allocate_in_memory(&self, slot: &mut Option<Payload>) -> Result<()>;

    /// Release the payload in `slot`.
    ///
    /// Safe to call while the owning object is being destroyed.
    ///
    /// # Errors
    /// `Error::NotAllocated` if `slot` is empty.
    fn free_in_memory(&self, slot: &mut Option<Payload>) -> Result<()>;

    /// Rebuild `payload` from a previously written file.
    ///
    /// On error the caller frees the payload; partial contents are never kept.
    fn read_from_file_impl(&self, payload: &mut Payload, file: &mut FileHandler) -> Result<()>;

    /// Serialize `payload` into `file`.
    ///
    /// The caller publishes the file only if this returns `Ok`.
    fn write_to_file_impl(&self, payload: &Payload, file: &mut FileHandler) -> Result<()>;
}
