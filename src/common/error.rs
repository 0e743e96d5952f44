//! Error types for vectorpool.

use crate::buffer::WorkerKind;
use crate::common::ObjectId;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in vectorpool.
///
/// `AlreadyAllocated`, `NotAllocated` and `NotPinned` are lifecycle
/// violations: they mean the caller broke a contract and should not be
/// caught-and-continued.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O fault from a [`FileHandler`](crate::storage::FileHandler),
    /// including short reads.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization failure translated at a persistence worker boundary.
    ///
    /// Built with [`storage_error!`](crate::storage_error) so the source
    /// location of the translation is recorded.
    #[error("storage error: {message} ({file}:{line})")]
    Storage {
        message: String,
        file: &'static str,
        line: u32,
    },

    /// `allocate_in_memory` was called while a payload was live.
    #[error("payload is already allocated")]
    AlreadyAllocated,

    /// `free_in_memory` was called without a live payload.
    #[error("payload is not allocated")]
    NotAllocated,

    /// An identity was reused with a worker of a different kind.
    #[error("object {id} is bound to a {expected} worker, not {found}")]
    KindMismatch {
        id: ObjectId,
        expected: WorkerKind,
        found: WorkerKind,
    },

    /// No admission is possible even after evicting every unpinned object.
    #[error("budget exceeded: requested {requested} bytes, budget {budget}, pinned {pinned}")]
    BudgetExceeded {
        requested: usize,
        budget: usize,
        pinned: usize,
    },

    /// The identity is not registered with the buffer manager.
    #[error("object {0} not found")]
    ObjectNotFound(ObjectId),

    /// Unpin (or mark-dirty) on an object that is not pinned.
    #[error("object {0} is not pinned")]
    NotPinned(ObjectId),

    /// Attempted to drop an object that is still pinned.
    #[error("object {0} is pinned")]
    ObjectPinned(ObjectId),

    /// The identity cannot be mapped to a file name.
    #[error("invalid object id: {0:?}")]
    InvalidObjectId(String),
}

impl Error {
    /// True for errors that indicate a caller bug rather than a runtime fault.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::AlreadyAllocated | Error::NotAllocated | Error::NotPinned(_)
        )
    }
}

/// Build an [`Error::Storage`] carrying a formatted message and the caller's
/// source location.
#[macro_export]
macro_rules! storage_error {
    ($($arg:tt)*) => {
        $crate::common::Error::Storage {
            message: format!($($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}
