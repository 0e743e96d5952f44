//! RAII pin over a buffer object.
//!
//! [`PinnedObject`] keeps its object resident for as long as it lives and
//! unpins on drop. Payload access goes through [`PinnedObject::read`] and
//! [`PinnedObject::write`]; the write path marks the object dirty.

use std::fmt;
use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};
use tracing::warn;

use super::buffer_manager::BufferManager;
use crate::buffer::{BufferObject, Payload};
use crate::common::ObjectId;

/// A pinned, resident object.
///
/// # Example
/// ```ignore
/// let pinned = manager.fetch(&id)?;
/// pinned.write().as_data_block_mut().unwrap().append(b"row");
/// // pinned drops here: object unpinned, dirty
/// ```
pub struct PinnedObject<'a> {
    /// Reference back to the manager for unpin on drop.
    manager: &'a BufferManager,
    object: Arc<BufferObject>,
}

impl<'a> PinnedObject<'a> {
    /// Wrap an object the caller has already pinned.
    ///
    /// Called by `BufferManager::fetch()`.
    pub(crate) fn new(manager: &'a BufferManager, object: Arc<BufferObject>) -> Self {
        Self { manager, object }
    }

    #[inline]
    pub fn id(&self) -> &ObjectId {
        self.object.id()
    }

    #[inline]
    pub fn object(&self) -> &BufferObject {
        &self.object
    }

    /// Shared access to the payload.
    ///
    /// # Panics
    /// Never in practice: a pinned object is resident, so its payload exists.
    pub fn read(&self) -> MappedRwLockReadGuard<'_, Payload> {
        self.object
            .payload()
            .expect("pinned object has a payload")
    }

    /// Exclusive access to the payload; marks the object dirty.
    ///
    /// The dirty flag is set while the write lock is held, so a concurrent
    /// flush either finishes before this mutation or observes the flag.
    pub fn write(&self) -> MappedRwLockWriteGuard<'_, Payload> {
        let guard = self
            .object
            .payload_mut()
            .expect("pinned object has a payload");
        self.object.mark_dirty();
        guard
    }
}

impl fmt::Debug for PinnedObject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PinnedObject").field(&self.object).finish()
    }
}

impl Drop for PinnedObject<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.manager.unpin_object(&self.object) {
            warn!(id = %self.object.id(), error = %e, "unpin on guard drop failed");
        }
    }
}
