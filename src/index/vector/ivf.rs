//! Inverted-file index with exhaustive storage inside each list.

use tracing::debug;

use super::flat::{check_rows, FlatIndex};
use super::io::{IndexError, IndexResult};
use super::{MetricType, SearchResult};

/// Lloyd iterations run by [`IvfFlatIndex::train`].
pub const KMEANS_ITERATIONS: usize = 10;

/// One inverted list: the vectors assigned to a centroid and their labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct InvertedList {
    pub(crate) ids: Vec<i64>,
    pub(crate) codes: Vec<f32>,
}

/// Partitions vectors by nearest centroid and scans only the `nprobe`
/// closest partitions at query time.
///
/// The coarse quantizer is a [`FlatIndex`] holding the `nlist` centroids.
/// It is either supplied already trained or built by [`train`](Self::train).
#[derive(Debug, Clone, PartialEq)]
pub struct IvfFlatIndex {
    d: usize,
    metric: MetricType,
    nlist: usize,
    nprobe: usize,
    quantizer: FlatIndex,
    lists: Vec<InvertedList>,
    ntotal: usize,
}

impl IvfFlatIndex {
    /// Create an index over `nlist` partitions using `quantizer` for
    /// assignment.
    ///
    /// If the quantizer already holds `nlist` centroids the index is trained.
    pub fn new(quantizer: FlatIndex, nlist: usize, metric: MetricType) -> IndexResult<Self> {
        if nlist == 0 {
            return Err(IndexError::InvalidArgument("nlist must be > 0".into()));
        }
        if quantizer.ntotal() != 0 && quantizer.ntotal() != nlist {
            return Err(IndexError::InvalidArgument(format!(
                "quantizer holds {} centroids, expected {}",
                quantizer.ntotal(),
                nlist
            )));
        }

        Ok(Self {
            d: quantizer.dimension(),
            metric,
            nlist,
            nprobe: 1,
            quantizer,
            lists: vec![InvertedList::default(); nlist],
            ntotal: 0,
        })
    }

    pub(crate) fn from_parts(
        metric: MetricType,
        nprobe: usize,
        quantizer: FlatIndex,
        lists: Vec<InvertedList>,
    ) -> IndexResult<Self> {
        let d = quantizer.dimension();
        let nlist = lists.len();
        if nlist == 0 || quantizer.ntotal() != nlist {
            return Err(IndexError::Corrupt(format!(
                "quantizer holds {} centroids for {} lists",
                quantizer.ntotal(),
                nlist
            )));
        }
        for list in &lists {
            if list.codes.len() != list.ids.len() * d {
                return Err(IndexError::Corrupt("inverted list size mismatch".into()));
            }
        }
        let ntotal = lists.iter().map(|l| l.ids.len()).sum();

        Ok(Self {
            d,
            metric,
            nlist,
            nprobe: nprobe.clamp(1, nlist),
            quantizer,
            lists,
            ntotal,
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.d
    }

    #[inline]
    pub fn metric(&self) -> MetricType {
        self.metric
    }

    #[inline]
    pub fn nlist(&self) -> usize {
        self.nlist
    }

    #[inline]
    pub fn nprobe(&self) -> usize {
        self.nprobe
    }

    /// Set how many partitions a query scans (clamped to `1..=nlist`).
    pub fn set_nprobe(&mut self, nprobe: usize) {
        self.nprobe = nprobe.clamp(1, self.nlist);
    }

    #[inline]
    pub fn ntotal(&self) -> usize {
        self.ntotal
    }

    #[inline]
    pub fn is_trained(&self) -> bool {
        self.quantizer.ntotal() == self.nlist
    }

    pub fn quantizer(&self) -> &FlatIndex {
        &self.quantizer
    }

    pub(crate) fn lists(&self) -> &[InvertedList] {
        &self.lists
    }

    /// Learn `nlist` centroids from the training vectors with k-means.
    ///
    /// Centroids are seeded with the first `nlist` training vectors, so
    /// training is deterministic. A centroid whose cluster empties keeps its
    /// previous position.
    pub fn train(&mut self, x: &[f32]) -> IndexResult<()> {
        check_rows(x, self.d)?;
        let n = x.len() / self.d;
        if n < self.nlist {
            return Err(IndexError::InvalidArgument(format!(
                "need at least {} training vectors, got {}",
                self.nlist, n
            )));
        }

        let d = self.d;
        let mut centroids = x[..self.nlist * d].to_vec();
        let mut assignment = vec![0usize; n];

        for _ in 0..KMEANS_ITERATIONS {
            let mut seeds = FlatIndex::new(d, MetricType::L2);
            seeds.add(&centroids)?;
            for (i, v) in x.chunks_exact(d).enumerate() {
                assignment[i] = seeds.nearest(v).unwrap_or(0);
            }

            let mut sums = vec![0f32; self.nlist * d];
            let mut counts = vec![0usize; self.nlist];
            for (v, &c) in x.chunks_exact(d).zip(&assignment) {
                counts[c] += 1;
                for (s, &xv) in sums[c * d..(c + 1) * d].iter_mut().zip(v) {
                    *s += xv;
                }
            }
            for (c, &count) in counts.iter().enumerate() {
                if count > 0 {
                    for j in 0..d {
                        centroids[c * d + j] = sums[c * d + j] / count as f32;
                    }
                }
            }
        }

        self.quantizer.reset();
        self.quantizer.add(&centroids)?;
        debug!(nlist = self.nlist, n, "ivf quantizer trained");
        Ok(())
    }

    /// Add vectors, assigning each to its nearest centroid.
    ///
    /// Labels continue sequentially from the current `ntotal`.
    pub fn add(&mut self, x: &[f32]) -> IndexResult<()> {
        if !self.is_trained() {
            return Err(IndexError::InvalidArgument("index is not trained".into()));
        }
        check_rows(x, self.d)?;

        for v in x.chunks_exact(self.d) {
            let list = self.quantizer.nearest(v).unwrap_or(0);
            let list = &mut self.lists[list];
            list.ids.push(self.ntotal as i64);
            list.codes.extend_from_slice(v);
            self.ntotal += 1;
        }
        Ok(())
    }

    /// Find the `k` nearest vectors among the `nprobe` closest partitions.
    pub fn search(&self, queries: &[f32], k: usize) -> IndexResult<SearchResult> {
        if !self.is_trained() {
            return Err(IndexError::InvalidArgument("index is not trained".into()));
        }
        check_rows(queries, self.d)?;
        let nq = queries.len() / self.d;
        let mut result = SearchResult::with_capacity(nq, k);

        for q in queries.chunks_exact(self.d) {
            let probes = self.quantizer.search(q, self.nprobe)?;
            let mut candidates = Vec::new();
            for &list in probes.labels.iter().filter(|&&l| l >= 0) {
                let list = &self.lists[list as usize];
                for (v, &id) in list.codes.chunks_exact(self.d).zip(&list.ids) {
                    candidates.push((self.metric.distance(q, v), id));
                }
            }
            result.push_top_k(self.metric, candidates, k);
        }

        Ok(result)
    }
}
