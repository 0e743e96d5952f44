//! Persistence worker for vector indexes.
//!
//! Delegates serialization to the index library's own `write_index` /
//! `read_index`, plugging the object's [`FileHandler`] in through the
//! stream adapters. The file holds exactly the library's native encoding.

use std::sync::Arc;

use tracing::warn;

use crate::buffer::{Payload, PersistenceWorker, VectorIndexPayload, WorkerKind};
use crate::common::config::VECTOR_INDEX_OVERHEAD;
use crate::common::{Error, ResourceUsage, Result};
use crate::index::vector::{read_index, write_index, IndexError, MetricType};
use crate::storage::{FileHandler, StreamReader, StreamWriter};
use crate::storage_error;

/// Persists [`VectorIndexPayload`]s.
///
/// # Sizing
/// The budget charge is fixed by configuration:
/// ```text
/// VECTOR_INDEX_OVERHEAD
///   + max_vectors * (dimension * 4 + 8)   vectors + labels
///   + nlist * dimension * 4               coarse centroids
/// ```
/// It does not track the index's actual allocation; `max_vectors` is the
/// capacity the caller promises not to exceed.
#[derive(Debug, Clone)]
pub struct VectorIndexWorker {
    dimension: usize,
    metric: MetricType,
    max_vectors: usize,
    nlist: usize,
    usage: Arc<ResourceUsage>,
}

impl VectorIndexWorker {
    /// Create a worker for flat indexes of `dimension`-dim vectors holding up
    /// to `max_vectors` vectors.
    pub fn new(dimension: usize, max_vectors: usize, usage: Arc<ResourceUsage>) -> Self {
        Self {
            dimension,
            metric: MetricType::L2,
            max_vectors,
            nlist: 0,
            usage,
        }
    }

    /// Charge for `nlist` coarse centroids (IVF indexes).
    pub fn with_nlist(mut self, nlist: usize) -> Self {
        self.nlist = nlist;
        self
    }

    pub fn with_metric(mut self, metric: MetricType) -> Self {
        self.metric = metric;
        self
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn metric(&self) -> MetricType {
        self.metric
    }
}

/// Translate a library failure into the engine's error type.
///
/// File faults keep their `std::io::Error` kind; everything else becomes a
/// storage error tagged with this location.
fn translate(err: IndexError) -> Error {
    match err {
        IndexError::Io(e) => Error::Io(e),
        other => storage_error!("vector index: {}", other),
    }
}

impl PersistenceWorker for VectorIndexWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::VectorIndex
    }

    fn estimated_size(&self) -> usize {
        let per_vector = self.dimension * 4 + 8;
        VECTOR_INDEX_OVERHEAD + self.max_vectors * per_vector + self.nlist * self.dimension * 4
    }

    fn allocate_in_memory(&self, slot: &mut Option<Payload>) -> Result<()> {
        if slot.is_some() {
            return Err(Error::AlreadyAllocated);
        }
        *slot = Some(Payload::VectorIndex(VectorIndexPayload::default()));
        self.usage.record_alloc(self.estimated_size());
        Ok(())
    }

    fn free_in_memory(&self, slot: &mut Option<Payload>) -> Result<()> {
        // Dropping the payload destroys the index and the quantizer together.
        if slot.take().is_none() {
            return Err(Error::NotAllocated);
        }
        self.usage.record_free(self.estimated_size());
        Ok(())
    }

    fn read_from_file_impl(&self, payload: &mut Payload, file: &mut FileHandler) -> Result<()> {
        let kind = payload.kind();
        let target = payload
            .as_vector_index_mut()
            .ok_or_else(|| storage_error!("expected a vector index payload, found {}", kind))?;

        let mut reader = StreamReader::new(file);
        let index = read_index(&mut reader).map_err(translate)?;

        if index.dimension() != self.dimension {
            return Err(storage_error!(
                "vector index has dimension {}, worker expects {}",
                index.dimension(),
                self.dimension
            ));
        }
        if index.metric() != self.metric {
            return Err(storage_error!(
                "vector index uses {:?}, worker expects {:?}",
                index.metric(),
                self.metric
            ));
        }
        if index.ntotal() > self.max_vectors {
            warn!(
                ntotal = index.ntotal(),
                max_vectors = self.max_vectors,
                "vector index exceeds its sized capacity"
            );
        }

        target.index = Some(index);
        target.quantizer = None;
        Ok(())
    }

    fn write_to_file_impl(&self, payload: &Payload, file: &mut FileHandler) -> Result<()> {
        let index = payload
            .as_vector_index()
            .ok_or_else(|| storage_error!("expected a vector index payload, found {}", payload.kind()))?
            .index
            .as_ref()
            .ok_or_else(|| storage_error!("vector index payload holds no index"))?;

        let mut writer = StreamWriter::new(file);
        write_index(index, &mut writer).map_err(translate)
    }
}
