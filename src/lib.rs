//! vectorpool - a buffer pool for persisted data blocks and vector indexes.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           vectorpool                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Buffer Pool (buffer/)                     │   │
//! │  │   BufferManager: registry + pins + budget admission      │   │
//! │  │   BufferObject:  Unloaded → Loading → Resident ⇄ Flushing│   │
//! │  │   LruReplacer:   least recently unpinned first           │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │          Persistence Workers (buffer/worker/)            │   │
//! │  │      DataBlockWorker  |  VectorIndexWorker               │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                  ↓                              ↓               │
//! │  ┌───────────────────────────┐  ┌──────────────────────────┐   │
//! │  │    Storage (storage/)     │  │  Vector Index (index/)   │   │
//! │  │ FileHandler, BlockHeader, │◀─│ Flat, IVF-Flat, native   │   │
//! │  │ StreamReader/StreamWriter │  │ read_index / write_index │   │
//! │  └───────────────────────────┘  └──────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (ObjectId, Error, config, usage counters)
//! - [`buffer`] - Buffer manager, residency state machine, workers
//! - [`storage`] - File I/O and the data block format
//! - [`index`] - Vector-similarity indexes and their serialization
//!
//! # Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use vectorpool::{BufferManager, DataBlockWorker, ObjectId, ResourceUsage};
//!
//! let manager = BufferManager::new(1 << 20, "data").unwrap();
//! let usage = Arc::new(ResourceUsage::new());
//!
//! let id = ObjectId::new("block-0");
//! manager
//!     .get_or_create(&id, Arc::new(DataBlockWorker::new(4096, usage)))
//!     .unwrap();
//!
//! let pinned = manager.fetch(&id).unwrap();
//! pinned.write().as_data_block_mut().unwrap().append(b"hello");
//! drop(pinned);
//!
//! manager.flush_now(&id).unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::{BufferManagerConfig, Error, ObjectId, ResourceUsage, Result, UsageSnapshot};

pub use buffer::{
    BufferManager, BufferObject, BufferStats, DataBlock, DataBlockWorker, FlushOutcome,
    ObjectState, Payload, PersistenceWorker, PinnedObject, StatsSnapshot, VectorIndexPayload,
    VectorIndexWorker, WorkerKind,
};
pub use index::vector::{FlatIndex, IvfFlatIndex, MetricType, SearchResult, VectorIndex};
