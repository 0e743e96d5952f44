//! Storage layer - file I/O beneath the buffer pool.
//!
//! - [`FileHandler`] - exact-length reads and atomic writes on one file
//! - [`StreamReader`] / [`StreamWriter`] - item-stream adapters for index codecs
//! - [`BlockHeader`] - header of a data block file

mod block;
mod file_handler;
mod stream;

pub use block::BlockHeader;
pub use file_handler::FileHandler;
pub use stream::{StreamReader, StreamWriter};
