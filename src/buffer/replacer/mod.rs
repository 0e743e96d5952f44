//! Eviction policy implementations (replacers).
//!
//! - [`LruReplacer`] - least-recently-unpinned first, with byte accounting

mod lru;

pub use lru::LruReplacer;
