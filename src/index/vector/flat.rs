//! Exhaustive (brute-force) vector index.

use super::io::{IndexError, IndexResult};
use super::{MetricType, SearchResult};

/// Stores every vector and compares queries against all of them.
///
/// Labels are assigned sequentially in insertion order starting at 0.
///
/// # Example
/// ```
/// use vectorpool::index::vector::{FlatIndex, MetricType};
///
/// let mut index = FlatIndex::new(2, MetricType::L2);
/// index.add(&[0.0, 0.0, 10.0, 10.0]).unwrap();
///
/// let result = index.search(&[9.0, 9.0], 1).unwrap();
/// assert_eq!(result.labels, vec![1]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    d: usize,
    metric: MetricType,
    /// Row-major vectors, `ntotal * d` floats.
    xb: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index over `d`-dimensional vectors.
    ///
    /// # Panics
    /// Panics if `d` is 0.
    pub fn new(d: usize, metric: MetricType) -> Self {
        assert!(d > 0, "dimension must be > 0");
        Self {
            d,
            metric,
            xb: Vec::new(),
        }
    }

    /// Rebuild an index from decoded storage.
    pub(crate) fn from_parts(d: usize, metric: MetricType, xb: Vec<f32>) -> IndexResult<Self> {
        if d == 0 || xb.len() % d != 0 {
            return Err(IndexError::Corrupt(format!(
                "{} floats do not form {}-dimensional vectors",
                xb.len(),
                d
            )));
        }
        Ok(Self { d, metric, xb })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.d
    }

    #[inline]
    pub fn metric(&self) -> MetricType {
        self.metric
    }

    /// Number of stored vectors.
    #[inline]
    pub fn ntotal(&self) -> usize {
        self.xb.len() / self.d
    }

    /// Raw row-major vector storage.
    pub fn vectors(&self) -> &[f32] {
        &self.xb
    }

    /// The vector stored under `label`.
    pub fn reconstruct(&self, label: usize) -> Option<&[f32]> {
        let start = label.checked_mul(self.d)?;
        self.xb.get(start..start + self.d)
    }

    /// Append vectors (row-major, a multiple of `d` floats).
    pub fn add(&mut self, x: &[f32]) -> IndexResult<()> {
        check_rows(x, self.d)?;
        self.xb.extend_from_slice(x);
        Ok(())
    }

    /// Remove all vectors.
    pub fn reset(&mut self) {
        self.xb.clear();
    }

    /// Find the `k` nearest stored vectors for each query.
    ///
    /// Missing results are padded with label `-1`.
    pub fn search(&self, queries: &[f32], k: usize) -> IndexResult<SearchResult> {
        check_rows(queries, self.d)?;
        let nq = queries.len() / self.d;
        let mut result = SearchResult::with_capacity(nq, k);

        for q in queries.chunks_exact(self.d) {
            let candidates = self
                .xb
                .chunks_exact(self.d)
                .enumerate()
                .map(|(label, v)| (self.metric.distance(q, v), label as i64))
                .collect();
            result.push_top_k(self.metric, candidates, k);
        }

        Ok(result)
    }

    /// Label of the single nearest stored vector, if any.
    pub(crate) fn nearest(&self, q: &[f32]) -> Option<usize> {
        self.xb
            .chunks_exact(self.d)
            .map(|v| self.metric.distance(q, v))
            .enumerate()
            .reduce(|best, cur| {
                if self.metric.is_better(cur.1, best.1) {
                    cur
                } else {
                    best
                }
            })
            .map(|(label, _)| label)
    }
}

/// Check that `x` holds whole `d`-dimensional rows.
pub(crate) fn check_rows(x: &[f32], d: usize) -> IndexResult<()> {
    if x.len() % d != 0 {
        return Err(IndexError::InvalidArgument(format!(
            "{} floats is not a multiple of dimension {}",
            x.len(),
            d
        )));
    }
    Ok(())
}
