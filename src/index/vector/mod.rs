//! Vector-similarity indexes and their native stream encoding.
//!
//! # Components
//! - [`FlatIndex`] - exhaustive search over every stored vector
//! - [`IvfFlatIndex`] - inverted-file partitioning over a flat quantizer
//! - [`VectorIndex`] - either of the above, as stored by the buffer pool
//! - [`write_index`] / [`read_index`] - the native encoding
//! - [`IoReader`] / [`IoWriter`] - the item-stream I/O the encoding speaks
//!
//! The encoding is FAISS-style: fourcc-tagged, little-endian, with the same
//! header layout for every index kind. The buffer pool treats it as opaque and
//! only supplies the byte streams.

mod codec;
mod flat;
mod io;
mod ivf;

use std::cmp::Ordering;

pub use codec::{read_index, write_index};
pub use flat::FlatIndex;
pub use io::{IndexError, IndexResult, IoReader, IoWriter, SliceReader, VecWriter};
pub use ivf::{IvfFlatIndex, KMEANS_ITERATIONS};

/// How vectors are compared.
///
/// Discriminants match the on-disk metric codes.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    /// Larger dot product is closer.
    InnerProduct = 0,
    /// Smaller squared Euclidean distance is closer.
    L2 = 1,
}

impl MetricType {
    /// Convert from the on-disk code.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(MetricType::InnerProduct),
            1 => Some(MetricType::L2),
            _ => None,
        }
    }

    /// Distance (or similarity, for inner product) between two vectors.
    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            MetricType::InnerProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            MetricType::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum(),
        }
    }

    /// True if `a` ranks strictly before `b`.
    #[inline]
    pub fn is_better(self, a: f32, b: f32) -> bool {
        self.compare(a, b) == Ordering::Less
    }

    /// Ranking order: best first.
    fn compare(self, a: f32, b: f32) -> Ordering {
        match self {
            MetricType::InnerProduct => b.total_cmp(&a),
            MetricType::L2 => a.total_cmp(&b),
        }
    }

    /// Distance reported for padded (missing) results.
    fn worst(self) -> f32 {
        match self {
            MetricType::InnerProduct => f32::NEG_INFINITY,
            MetricType::L2 => f32::INFINITY,
        }
    }
}

/// k-NN results for a batch of queries, row-major (`nq * k`).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub nq: usize,
    pub k: usize,
    pub distances: Vec<f32>,
    /// `-1` marks a padded slot.
    pub labels: Vec<i64>,
}

impl SearchResult {
    fn with_capacity(nq: usize, k: usize) -> Self {
        Self {
            nq: 0,
            k,
            distances: Vec::with_capacity(nq * k),
            labels: Vec::with_capacity(nq * k),
        }
    }

    /// Append one query's row: the best `k` candidates, ties broken by label.
    fn push_top_k(&mut self, metric: MetricType, mut candidates: Vec<(f32, i64)>, k: usize) {
        candidates.sort_by(|a, b| metric.compare(a.0, b.0).then(a.1.cmp(&b.1)));
        candidates.truncate(k);
        let found = candidates.len();

        for (distance, label) in candidates {
            self.distances.push(distance);
            self.labels.push(label);
        }
        for _ in found..k {
            self.distances.push(metric.worst());
            self.labels.push(-1);
        }
        self.nq += 1;
    }

    /// Labels for query `i`.
    pub fn labels_for(&self, i: usize) -> &[i64] {
        &self.labels[i * self.k..(i + 1) * self.k]
    }
}

/// An index persisted through the buffer pool.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorIndex {
    Flat(FlatIndex),
    IvfFlat(IvfFlatIndex),
}

impl VectorIndex {
    pub fn dimension(&self) -> usize {
        match self {
            VectorIndex::Flat(index) => index.dimension(),
            VectorIndex::IvfFlat(index) => index.dimension(),
        }
    }

    pub fn metric(&self) -> MetricType {
        match self {
            VectorIndex::Flat(index) => index.metric(),
            VectorIndex::IvfFlat(index) => index.metric(),
        }
    }

    pub fn ntotal(&self) -> usize {
        match self {
            VectorIndex::Flat(index) => index.ntotal(),
            VectorIndex::IvfFlat(index) => index.ntotal(),
        }
    }

    pub fn is_trained(&self) -> bool {
        match self {
            VectorIndex::Flat(_) => true,
            VectorIndex::IvfFlat(index) => index.is_trained(),
        }
    }

    pub fn add(&mut self, x: &[f32]) -> IndexResult<()> {
        match self {
            VectorIndex::Flat(index) => index.add(x),
            VectorIndex::IvfFlat(index) => index.add(x),
        }
    }

    pub fn search(&self, queries: &[f32], k: usize) -> IndexResult<SearchResult> {
        match self {
            VectorIndex::Flat(index) => index.search(queries, k),
            VectorIndex::IvfFlat(index) => index.search(queries, k),
        }
    }
}

impl From<FlatIndex> for VectorIndex {
    fn from(index: FlatIndex) -> Self {
        VectorIndex::Flat(index)
    }
}

impl From<IvfFlatIndex> for VectorIndex {
    fn from(index: IvfFlatIndex) -> Self {
        VectorIndex::IvfFlat(index)
    }
}
