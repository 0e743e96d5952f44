//! Index structures.
//!
//! - [`vector`] - Vector-similarity indexes persisted through the buffer pool

pub mod vector;
