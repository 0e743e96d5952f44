//! Buffer pool management.
//!
//! The buffer pool keeps persisted objects (data blocks, vector indexes)
//! resident in memory within a byte budget. Each identity has one
//! [`BufferObject`] whose residency state machine is driven by pins, and
//! whose bytes are produced and consumed by a [`PersistenceWorker`].
//!
//! # Components
//! - [`BufferManager`] - Registry, pin protocol and budget admission
//! - [`BufferObject`] - Per-identity residency state machine
//! - [`PinnedObject`] - RAII pin with payload access
//! - [`Payload`] - The in-memory form of an object
//! - [`worker`] - Per-kind persistence workers
//! - [`BufferStats`] - Performance statistics
//! - [`replacer`] - LRU victim selection

mod buffer_manager;
mod buffer_object;
mod guard;
mod payload;
pub mod replacer;
mod stats;
pub mod worker;

pub use buffer_manager::BufferManager;
pub use buffer_object::{BufferObject, FlushOutcome, ObjectState};
pub use guard::PinnedObject;
pub use payload::{DataBlock, Payload, VectorIndexPayload, WorkerKind};
pub use stats::{BufferStats, StatsSnapshot};
pub use worker::{DataBlockWorker, PersistenceWorker, VectorIndexWorker};
