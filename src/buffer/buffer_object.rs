//! Buffer Object - the residency state machine for one persisted object.
//!
//! ```text
//!              pin (admitted)                 load ok
//!   Unloaded ──────────────────▶ Loading ─────────────▶ Resident
//!      ▲                            │                     │  ▲
//!      │          load failed       │                     │  │ write failed,
//!      ├────────────────────────────┘          evict/flush│  │ or pinned again
//!      │                                        (dirty)   ▼  │
//!      └───────────────────────────────────────────────── Flushing
//!                       written, unpinned: free
//! ```
//!
//! A clean unpinned object skips Flushing and goes straight from Resident to
//! Unloaded when evicted.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{
    Condvar, MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};
use tracing::{debug, warn};

use crate::buffer::{Payload, PersistenceWorker, WorkerKind};
use crate::common::{Error, ObjectId, Result};
use crate::storage::FileHandler;

/// Residency state of a [`BufferObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectState {
    /// No payload in memory.
    Unloaded,
    /// One thread is allocating and reading the payload.
    Loading,
    /// Payload is valid and usable by pinners.
    Resident,
    /// One thread is writing the payload back.
    Flushing,
}

impl ObjectState {
    /// States in which the payload is present.
    #[inline]
    pub fn has_payload(self) -> bool {
        matches!(self, ObjectState::Resident | ObjectState::Flushing)
    }
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of an explicit write-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The payload was written and the dirty flag cleared.
    Written,
    /// The object was resident but clean; nothing was written.
    Clean,
    /// The object was not resident; nothing to write.
    NotResident,
}

/// Result of an eviction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvictOutcome {
    /// Payload freed; the object is Unloaded.
    Evicted,
    /// Not attempted: the object was pinned or not resident.
    Skipped,
    /// Written back, then found pinned again; the object stays Resident.
    Aborted,
}

/// What a pinning thread must do after [`BufferObject::begin_pin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PinStart {
    /// Already resident; the pin is complete.
    Resident,
    /// This thread moved the object to Loading and must finish the load.
    Load,
}

/// One persisted object and its in-memory payload, if resident.
///
/// # Invariants
/// - The payload slot is `Some` exactly when the state is Resident or
///   Flushing (checked at every transition boundary).
/// - A pin count above zero keeps the object from being freed.
/// - At most one thread drives a transition: Loading and Flushing are claimed
///   under the state mutex and every other thread waits on `state_changed`.
///
/// # Thread Safety
/// - `state` (`Mutex` + `Condvar`): transition ownership and waiting
/// - `payload` (`RwLock`): shared readers or one mutator; held during I/O
/// - `pin_count`, `dirty`, `persisted`: atomics
/// - `dropped`: atomic, but only written under `state`
pub struct BufferObject {
    id: ObjectId,
    path: PathBuf,
    worker: Arc<dyn PersistenceWorker>,
    /// Budget charge while resident; fixed by the worker's configuration.
    charge: usize,
    sync_on_write: bool,

    state: Mutex<ObjectState>,
    state_changed: Condvar,
    payload: RwLock<Option<Payload>>,

    pin_count: AtomicU32,
    dirty: AtomicBool,
    /// A file for this object exists on disk.
    persisted: AtomicBool,
    /// Removed from the catalog; refuses new pins.
    dropped: AtomicBool,
}

impl BufferObject {
    /// Create an Unloaded object bound to `worker`.
    ///
    /// The object starts out with no persisted form; see
    /// [`with_persisted`](Self::with_persisted).
    pub fn new(
        id: ObjectId,
        path: PathBuf,
        worker: Arc<dyn PersistenceWorker>,
        sync_on_write: bool,
    ) -> Self {
        Self {
            charge: worker.estimated_size(),
            id,
            path,
            worker,
            sync_on_write,
            state: Mutex::new(ObjectState::Unloaded),
            state_changed: Condvar::new(),
            payload: RwLock::new(None),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            persisted: AtomicBool::new(false),
            dropped: AtomicBool::new(false),
        }
    }

    /// Record whether a file for this object already exists, so the first
    /// load reads it instead of starting empty.
    pub fn with_persisted(mut self, persisted: bool) -> Self {
        *self.persisted.get_mut() = persisted;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn kind(&self) -> WorkerKind {
        self.worker.kind()
    }

    /// Bytes charged against the budget while resident.
    #[inline]
    pub fn estimated_size(&self) -> usize {
        self.charge
    }

    #[inline]
    pub fn state(&self) -> ObjectState {
        *self.state.lock()
    }

    #[inline]
    pub fn is_resident(&self) -> bool {
        self.state() == ObjectState::Resident
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Whether a file for this object exists on disk.
    #[inline]
    pub fn is_persisted(&self) -> bool {
        self.persisted.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }

    // ========================================================================
    // Payload access
    // ========================================================================

    /// Shared access to the payload, or `None` if not resident.
    ///
    /// Only meaningful while the caller holds a pin.
    pub fn payload(&self) -> Option<MappedRwLockReadGuard<'_, Payload>> {
        RwLockReadGuard::try_map(self.payload.read(), |slot| slot.as_ref()).ok()
    }

    /// Exclusive access to the payload, or `None` if not resident.
    ///
    /// Does not mark the object dirty; callers that mutate must also call
    /// `mark_dirty` before unpinning.
    pub fn payload_mut(&self) -> Option<MappedRwLockWriteGuard<'_, Payload>> {
        RwLockWriteGuard::try_map(self.payload.write(), |slot| slot.as_mut()).ok()
    }

    #[inline]
    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    // ========================================================================
    // Pin count (atomic)
    // ========================================================================

    /// Increment the pin count. Returns the new pin count.
    #[inline]
    pub(crate) fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the pin count. Returns the new pin count.
    ///
    /// # Errors
    /// `Error::NotPinned` if the count is already zero; the count is left
    /// unchanged.
    pub(crate) fn unpin(&self) -> Result<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .map(|old| old - 1)
            .map_err(|_| Error::NotPinned(self.id.clone()))
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Wait out any in-flight transition and either report the object
    /// resident or claim the Loading transition for the caller.
    ///
    /// The caller must already hold a pin.
    ///
    /// # Errors
    /// `Error::ObjectNotFound` once the object has been retired; the caller
    /// must roll back its pin.
    pub(crate) fn begin_pin(&self) -> Result<PinStart> {
        let mut state = self.state.lock();
        loop {
            if self.is_dropped() {
                return Err(Error::ObjectNotFound(self.id.clone()));
            }
            match *state {
                ObjectState::Resident => return Ok(PinStart::Resident),
                ObjectState::Unloaded => {
                    *state = ObjectState::Loading;
                    return Ok(PinStart::Load);
                }
                ObjectState::Loading | ObjectState::Flushing => {
                    self.state_changed.wait(&mut state);
                }
            }
        }
    }

    /// Perform the Loading work: allocate, then read if a persisted form
    /// exists. On failure the payload is torn down before returning.
    ///
    /// Must only be called by the thread that got [`PinStart::Load`].
    pub(crate) fn load(&self) -> Result<()> {
        let mut slot = self.payload.write();
        self.worker.allocate_in_memory(&mut slot)?;

        if self.is_persisted() {
            if let Err(e) = self.read_into(&mut slot) {
                if let Err(free_err) = self.worker.free_in_memory(&mut slot) {
                    warn!(id = %self.id, error = %free_err, "failed to free payload after load error");
                }
                return Err(e);
            }
        }

        self.dirty.store(false, Ordering::Release);
        Ok(())
    }

    fn read_into(&self, slot: &mut Option<Payload>) -> Result<()> {
        let payload = slot.as_mut().ok_or(Error::NotAllocated)?;
        let mut file = FileHandler::open(&self.path)?;
        self.worker.read_from_file_impl(payload, &mut file)
    }

    /// Publish a completed load claimed with [`PinStart::Load`].
    pub(crate) fn finish_load(&self) {
        let mut state = self.state.lock();
        debug_assert_eq!(*state, ObjectState::Loading);
        debug_assert!(self.payload.read().is_some());
        *state = ObjectState::Resident;
        self.state_changed.notify_all();
    }

    /// Revert a load claimed with [`PinStart::Load`] that did not complete.
    ///
    /// Frees whatever the worker left in the slot, which is only possible
    /// when the load unwound before its own cleanup ran.
    pub(crate) fn abort_load(&self) {
        let mut state = self.state.lock();
        debug_assert_eq!(*state, ObjectState::Loading);
        {
            let mut slot = self.payload.write();
            if slot.is_some() {
                if let Err(e) = self.worker.free_in_memory(&mut slot) {
                    warn!(id = %self.id, error = %e, "failed to free partial payload");
                }
            }
        }
        *state = ObjectState::Unloaded;
        self.state_changed.notify_all();
    }

    /// Write the payload to disk and clear the dirty flag.
    ///
    /// The payload read lock is held for the whole write, so no pinned
    /// mutator can change it mid-stream. On failure the dirty flag is
    /// restored.
    fn write_back(&self) -> Result<()> {
        let slot = self.payload.read();
        let payload = slot.as_ref().ok_or(Error::NotAllocated)?;

        self.dirty.store(false, Ordering::Release);
        let result = FileHandler::create(&self.path, self.sync_on_write).and_then(|mut file| {
            self.worker.write_to_file_impl(payload, &mut file)?;
            file.finish()
        });

        match result {
            Ok(()) => {
                self.persisted.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                self.dirty.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Explicit write-back: Resident → Flushing → Resident.
    ///
    /// Pinned objects may be flushed; the payload stays in memory.
    pub(crate) fn flush(&self) -> Result<FlushOutcome> {
        {
            let mut state = self.state.lock();
            while matches!(*state, ObjectState::Loading | ObjectState::Flushing) {
                self.state_changed.wait(&mut state);
            }
            if *state != ObjectState::Resident {
                return Ok(FlushOutcome::NotResident);
            }
            if !self.is_dirty() {
                return Ok(FlushOutcome::Clean);
            }
            *state = ObjectState::Flushing;
        }

        let result = self.write_back();

        let mut state = self.state.lock();
        *state = ObjectState::Resident;
        self.state_changed.notify_all();
        drop(state);

        result.map(|()| FlushOutcome::Written)
    }

    /// Try to move an unpinned object from Resident to Unloaded, writing it
    /// back first if dirty.
    ///
    /// A failed write leaves the object Resident and dirty. A pin that
    /// arrives while the write is in progress aborts the eviction.
    pub(crate) fn evict(&self) -> Result<EvictOutcome> {
        let mut state = self.state.lock();
        // A Loading object is pinned by its loader; only wait out a flush.
        while *state == ObjectState::Flushing {
            self.state_changed.wait(&mut state);
        }
        if *state != ObjectState::Resident || self.is_pinned() {
            return Ok(EvictOutcome::Skipped);
        }

        if self.is_dirty() {
            *state = ObjectState::Flushing;
            drop(state);

            let result = self.write_back();

            state = self.state.lock();
            if let Err(e) = result {
                *state = ObjectState::Resident;
                self.state_changed.notify_all();
                return Err(e);
            }
            if self.is_pinned() {
                *state = ObjectState::Resident;
                self.state_changed.notify_all();
                debug!(id = %self.id, "eviction aborted: pinned during flush");
                return Ok(EvictOutcome::Aborted);
            }
        }

        let freed = self.worker.free_in_memory(&mut self.payload.write());
        // Unloaded either way: a failed free means the slot was already empty.
        *state = ObjectState::Unloaded;
        self.state_changed.notify_all();
        freed?;

        Ok(EvictOutcome::Evicted)
    }

    /// Mark the object as removed from the catalog. Every later
    /// [`begin_pin`](Self::begin_pin), including ones already waiting, fails.
    ///
    /// # Errors
    /// `Error::ObjectPinned` if the object is pinned; nothing changes.
    pub(crate) fn retire(&self) -> Result<()> {
        let _state = self.state.lock();
        if self.is_pinned() {
            return Err(Error::ObjectPinned(self.id.clone()));
        }
        self.dropped.store(true, Ordering::Release);
        self.state_changed.notify_all();
        Ok(())
    }

    /// Drop the payload of a retired object without writing it back.
    ///
    /// Returns whether a payload was resident, in which case the caller owns
    /// releasing its charge. An eviction racing with this call frees the
    /// payload first and leaves nothing here.
    pub(crate) fn discard(&self) -> Result<bool> {
        let mut state = self.state.lock();
        debug_assert!(self.is_dropped());
        while matches!(*state, ObjectState::Loading | ObjectState::Flushing) {
            self.state_changed.wait(&mut state);
        }

        let was_resident = *state == ObjectState::Resident;
        if was_resident {
            self.worker.free_in_memory(&mut self.payload.write())?;
            *state = ObjectState::Unloaded;
            self.state_changed.notify_all();
        }
        self.dirty.store(false, Ordering::Release);
        Ok(was_resident)
    }
}

impl Drop for BufferObject {
    fn drop(&mut self) {
        let slot = self.payload.get_mut();
        if slot.is_some() {
            if let Err(e) = self.worker.free_in_memory(slot) {
                warn!(id = %self.id, error = %e, "failed to free payload on drop");
            }
        }
    }
}

impl fmt::Debug for BufferObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferObject")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("state", &self.state())
            .field("pin_count", &self.pin_count())
            .field("dirty", &self.is_dirty())
            .field("dropped", &self.is_dropped())
            .field("charge", &self.charge)
            .finish()
    }
}
