//! Common types and utilities shared across vectorpool.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and [`BufferManagerConfig`]
//! - Error types
//! - Identifiers ([`ObjectId`])
//! - Injectable resource-usage counters ([`ResourceUsage`])

pub mod config;
pub mod error;
mod object_id;
mod usage;

pub use config::BufferManagerConfig;
pub use error::{Error, Result};
pub use object_id::ObjectId;
pub use usage::{ResourceUsage, UsageSnapshot};
