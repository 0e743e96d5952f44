//! Buffer Manager - budgeted residency for persisted objects.
//!
//! The [`BufferManager`] provides:
//! - One [`BufferObject`] per identity, created on first reference
//! - Pin-based reference counting with exactly-once loading
//! - Budget admission with LRU eviction over unpinned objects
//! - Write-back of dirty objects on eviction or on request

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::buffer::buffer_object::{EvictOutcome, PinStart};
use crate::buffer::replacer::LruReplacer;
use crate::buffer::{
    BufferObject, BufferStats, FlushOutcome, ObjectState, PersistenceWorker, PinnedObject,
};
use crate::common::{BufferManagerConfig, Error, ObjectId, Result};

/// Budget bookkeeping, guarded by one manager-wide mutex.
#[derive(Debug, Default)]
struct Accounting {
    /// Charges of every object that is Loading, Resident or Flushing.
    resident_bytes: usize,
    /// Charges of victims popped from the replacer whose eviction is in
    /// progress. Still included in `resident_bytes`.
    evicting_bytes: usize,
    /// Unpinned resident objects, least recently unpinned first.
    replacer: LruReplacer<Arc<BufferObject>>,
}

impl Accounting {
    /// Bytes that evicting every eligible object would return.
    fn reclaimable(&self) -> usize {
        self.replacer.evictable_bytes() + self.evicting_bytes
    }

    fn release(&mut self, bytes: usize) {
        debug_assert!(self.resident_bytes >= bytes);
        self.resident_bytes = self.resident_bytes.saturating_sub(bytes);
    }
}

/// Keeps the summed estimated size of resident payloads within a budget.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │                        BufferManager                         │
/// │  ┌──────────────────────────┐   ┌──────────────────────────┐ │
/// │  │ objects                  │   │ accounting               │ │
/// │  │ ObjectId → BufferObject  │   │ resident_bytes           │ │
/// │  │ (state, payload, pins)   │   │ evicting_bytes           │ │
/// │  └──────────────────────────┘   │ replacer (LRU)           │ │
/// │                                 └──────────────────────────┘ │
/// │   pin ──▶ admit (evict LRU until it fits) ──▶ load           │
/// │   unpin ──▶ pin count 0 ──▶ replacer                         │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - `objects` (`RwLock`): lookups are reads, creation and drop are writes
/// - `accounting` (`Mutex`): bookkeeping only, never held across I/O
/// - `eviction_done` (`Condvar`): admissions waiting on in-flight evictions
/// - `stats`: no lock, all atomic counters
///
/// Lock order is `objects`, then `accounting`, then an object's state lock.
/// Worker I/O runs with none of them held.
///
/// # Usage
/// ```ignore
/// let manager = BufferManager::new(1 << 20, dir)?;
/// let id = ObjectId::new("block-0");
/// manager.get_or_create(&id, Arc::new(DataBlockWorker::new(4096, usage)))?;
///
/// let pinned = manager.fetch(&id)?;
/// pinned.write().as_data_block_mut().unwrap().append(b"row");
/// drop(pinned);
///
/// manager.flush_now(&id)?;
/// ```
pub struct BufferManager {
    config: BufferManagerConfig,

    /// Every known identity, resident or not.
    objects: RwLock<HashMap<ObjectId, Arc<BufferObject>>>,

    accounting: Mutex<Accounting>,

    /// Signalled whenever an eviction finishes or a charge is released.
    eviction_done: Condvar,

    stats: BufferStats,
}

impl BufferManager {
    /// Create a manager with the given budget, storing objects under
    /// `data_dir` (created if missing).
    pub fn new<P: AsRef<std::path::Path>>(budget_bytes: usize, data_dir: P) -> Result<Self> {
        Self::with_config(BufferManagerConfig::new(budget_bytes, data_dir))
    }

    /// Create a manager from a full configuration.
    pub fn with_config(config: BufferManagerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        info!(
            budget = config.budget_bytes,
            dir = %config.data_dir.display(),
            "buffer manager started"
        );

        Ok(Self {
            config,
            objects: RwLock::new(HashMap::new()),
            accounting: Mutex::new(Accounting::default()),
            eviction_done: Condvar::new(),
            stats: BufferStats::new(),
        })
    }

    // ========================================================================
    // Public API: Registry
    // ========================================================================

    /// Return the object for `id`, creating an Unloaded one bound to `worker`
    /// on first reference.
    ///
    /// # Errors
    /// - `Error::InvalidObjectId` if `id` cannot name a file
    /// - `Error::KindMismatch` if `id` is already bound to another worker kind
    pub fn get_or_create(
        &self,
        id: &ObjectId,
        worker: Arc<dyn PersistenceWorker>,
    ) -> Result<Arc<BufferObject>> {
        // Fast path: existing object (read lock only)
        if let Some(object) = self.objects.read().get(id) {
            return Self::check_kind(object, worker.as_ref()).map(|()| Arc::clone(object));
        }

        id.validate()?;
        let path = id.file_path(&self.config.data_dir);
        // Stat before taking the registry write lock.
        let persisted = path.exists();

        let mut objects = self.objects.write();
        if let Some(object) = objects.get(id) {
            return Self::check_kind(object, worker.as_ref()).map(|()| Arc::clone(object));
        }

        let object = Arc::new(
            BufferObject::new(id.clone(), path, worker, self.config.sync_on_write)
                .with_persisted(persisted),
        );
        debug!(%id, kind = %object.kind(), persisted = object.is_persisted(), "object registered");
        objects.insert(id.clone(), Arc::clone(&object));
        Ok(object)
    }

    fn check_kind(object: &BufferObject, worker: &dyn PersistenceWorker) -> Result<()> {
        if object.kind() == worker.kind() {
            Ok(())
        } else {
            Err(Error::KindMismatch {
                id: object.id().clone(),
                expected: object.kind(),
                found: worker.kind(),
            })
        }
    }

    /// Remove `id` from the registry, discarding its payload without a
    /// write-back. The file on disk is left alone.
    ///
    /// Handles to the object obtained earlier stay valid but can no longer
    /// pin it; pinning through them fails with `Error::ObjectNotFound`.
    ///
    /// # Errors
    /// - `Error::ObjectNotFound` if `id` is unknown
    /// - `Error::ObjectPinned` if the object is pinned
    pub fn drop_object(&self, id: &ObjectId) -> Result<()> {
        let object = {
            let mut objects = self.objects.write();
            let object = objects
                .get(id)
                .cloned()
                .ok_or_else(|| Error::ObjectNotFound(id.clone()))?;
            object.retire()?;
            // No unpin lists a retired object, so this entry is the last one.
            self.accounting.lock().replacer.remove(id);
            objects.remove(id);
            object
        };

        // Waits out an in-flight write-back, outside the registry lock.
        let was_resident = object.discard()?;
        if was_resident {
            self.accounting.lock().release(object.estimated_size());
            self.eviction_done.notify_all();
        }
        debug!(%id, was_resident, "object dropped");
        Ok(())
    }

    // ========================================================================
    // Public API: Pin / Unpin
    // ========================================================================

    /// Pin `id`, loading it first if it is not resident.
    ///
    /// Returns once the object is Resident. Concurrent pins of an Unloaded
    /// object load it exactly once; the others wait for that load.
    ///
    /// # Errors
    /// - `Error::ObjectNotFound` if `id` was never registered
    /// - `Error::BudgetExceeded` if the object cannot fit even after evicting
    ///   every unpinned object
    /// - `Error::Io` / `Error::Storage` from loading it or from writing back
    ///   an eviction victim
    pub fn pin(&self, id: &ObjectId) -> Result<Arc<BufferObject>> {
        let object = self.lookup(id)?;
        self.pin_object(&object)?;
        Ok(object)
    }

    /// Pin `id` and wrap it in a guard that unpins on drop.
    pub fn fetch(&self, id: &ObjectId) -> Result<PinnedObject<'_>> {
        let object = self.pin(id)?;
        Ok(PinnedObject::new(self, object))
    }

    /// Release one pin on `id`. At zero the object becomes an eviction
    /// candidate.
    ///
    /// # Errors
    /// - `Error::ObjectNotFound` if `id` is unknown
    /// - `Error::NotPinned` if the object has no pins to release
    pub fn unpin(&self, id: &ObjectId) -> Result<()> {
        let object = self.lookup(id)?;
        self.unpin_object(&object)
    }

    /// Record that the payload of a pinned object was mutated.
    ///
    /// # Errors
    /// `Error::NotPinned` if the object is not pinned.
    pub fn mark_dirty(&self, id: &ObjectId) -> Result<()> {
        let object = self.lookup(id)?;
        if !object.is_pinned() {
            return Err(Error::NotPinned(id.clone()));
        }
        object.mark_dirty();
        Ok(())
    }

    // ========================================================================
    // Public API: Flush
    // ========================================================================

    /// Write `id` back now if it is resident and dirty. The payload stays
    /// resident.
    pub fn flush_now(&self, id: &ObjectId) -> Result<FlushOutcome> {
        let object = self.lookup(id)?;
        self.flush_object(&object)
    }

    /// Write back every resident dirty object.
    ///
    /// Every object is attempted; the first failure is returned. Returns the
    /// number of objects written.
    pub fn flush_all(&self) -> Result<usize> {
        let objects: Vec<Arc<BufferObject>> = self.objects.read().values().cloned().collect();

        let mut written = 0;
        let mut first_error = None;
        for object in &objects {
            match self.flush_object(object) {
                Ok(FlushOutcome::Written) => written += 1,
                Ok(_) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    fn flush_object(&self, object: &BufferObject) -> Result<FlushOutcome> {
        match object.flush() {
            Ok(outcome) => {
                if outcome == FlushOutcome::Written {
                    BufferStats::bump(&self.stats.flushes);
                    debug!(id = %object.id(), "object flushed");
                }
                Ok(outcome)
            }
            Err(e) => {
                BufferStats::bump(&self.stats.flush_failures);
                warn!(id = %object.id(), error = %e, "flush failed; object stays dirty");
                Err(e)
            }
        }
    }

    // ========================================================================
    // Public API: Introspection
    // ========================================================================

    #[inline]
    pub fn config(&self) -> &BufferManagerConfig {
        &self.config
    }

    #[inline]
    pub fn budget(&self) -> usize {
        self.config.budget_bytes
    }

    /// Summed charge of all Loading, Resident and Flushing objects.
    pub fn resident_bytes(&self) -> usize {
        self.accounting.lock().resident_bytes
    }

    /// Number of registered identities.
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.read().contains_key(id)
    }

    pub fn state(&self, id: &ObjectId) -> Result<ObjectState> {
        Ok(self.lookup(id)?.state())
    }

    pub fn pin_count(&self, id: &ObjectId) -> Result<u32> {
        Ok(self.lookup(id)?.pin_count())
    }

    pub fn is_dirty(&self, id: &ObjectId) -> Result<bool> {
        Ok(self.lookup(id)?.is_dirty())
    }

    #[inline]
    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }

    // ========================================================================
    // Internal: Pin protocol
    // ========================================================================

    fn lookup(&self, id: &ObjectId) -> Result<Arc<BufferObject>> {
        self.objects
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ObjectNotFound(id.clone()))
    }

    fn pin_object(&self, object: &Arc<BufferObject>) -> Result<()> {
        object.pin();
        let start = match object.begin_pin() {
            Ok(start) => start,
            Err(e) => {
                self.rollback_pin(object);
                return Err(e);
            }
        };
        // Pinned and not retired, so the entry under this id is this object.
        self.accounting.lock().replacer.remove(object.id());

        match start {
            PinStart::Resident => {
                BufferStats::bump(&self.stats.cache_hits);
                Ok(())
            }
            PinStart::Load => {
                BufferStats::bump(&self.stats.cache_misses);
                self.load_object(object)?;
                BufferStats::bump(&self.stats.loads);
                debug!(id = %object.id(), bytes = object.estimated_size(), "object loaded");
                Ok(())
            }
        }
    }

    /// Admit and load an object this thread moved to Loading.
    fn load_object(&self, object: &Arc<BufferObject>) -> Result<()> {
        let mut claim = LoadClaim {
            manager: self,
            object,
            charged: false,
            done: false,
        };

        self.admit(object)?;
        claim.charged = true;

        object.load().map_err(|e| {
            warn!(id = %object.id(), error = %e, "load failed");
            e
        })?;

        claim.done = true;
        object.finish_load();
        Ok(())
    }

    fn rollback_pin(&self, object: &Arc<BufferObject>) {
        if let Err(e) = self.unpin_object(object) {
            warn!(id = %object.id(), error = %e, "pin rollback failed");
        }
    }

    pub(crate) fn unpin_object(&self, object: &Arc<BufferObject>) -> Result<()> {
        if object.unpin()? > 0 {
            return Ok(());
        }

        // Re-check under the accounting lock: a pin may have raced in, the
        // object may not be resident (failed load) or it may be retired.
        let mut acc = self.accounting.lock();
        if object.pin_count() == 0 && !object.is_dropped() && object.state().has_payload() {
            acc.replacer.set_evictable(
                object.id().clone(),
                object.estimated_size(),
                Arc::clone(object),
            );
        }
        Ok(())
    }

    // ========================================================================
    // Internal: Admission and eviction
    // ========================================================================

    /// Reserve the object's charge, evicting least recently unpinned objects
    /// until it fits.
    ///
    /// Fails without evicting anything when even evicting every candidate
    /// would not make room.
    fn admit(&self, object: &BufferObject) -> Result<()> {
        let size = object.estimated_size();
        let budget = self.config.budget_bytes;

        loop {
            let (victim, victim_bytes) = {
                let mut acc = self.accounting.lock();
                loop {
                    if acc.resident_bytes + size <= budget {
                        acc.resident_bytes += size;
                        return Ok(());
                    }

                    let pinned = acc.resident_bytes.saturating_sub(acc.reclaimable());
                    if pinned + size > budget {
                        drop(acc);
                        BufferStats::bump(&self.stats.admission_failures);
                        info!(id = %object.id(), requested = size, budget, pinned, "admission rejected");
                        return Err(Error::BudgetExceeded {
                            requested: size,
                            budget,
                            pinned,
                        });
                    }

                    match acc.replacer.evict() {
                        Some((_, bytes, victim)) => {
                            acc.evicting_bytes += bytes;
                            break (victim, bytes);
                        }
                        // Room is coming from evictions other threads run.
                        None => self.eviction_done.wait(&mut acc),
                    }
                }
            };

            self.evict(&victim, victim_bytes)?;
        }
    }

    /// Evict one victim popped from the replacer. Its `bytes` were moved to
    /// `evicting_bytes` by the caller.
    ///
    /// The victim is the exact object that was listed, even if it has since
    /// been dropped and its id registered again. A dropped victim is skipped
    /// or evicted here, and whichever of this and `drop_object` frees the
    /// payload releases the charge.
    fn evict(&self, victim: &Arc<BufferObject>, bytes: usize) -> Result<()> {
        let id = victim.id();
        let outcome = victim.evict();

        let mut acc = self.accounting.lock();
        acc.evicting_bytes -= bytes;

        let result = match outcome {
            Ok(EvictOutcome::Evicted) => {
                acc.release(bytes);
                // An unpin during the write-back may have re-listed it.
                if victim.state() == ObjectState::Unloaded {
                    acc.replacer.remove_if(id, |listed| Arc::ptr_eq(listed, victim));
                }
                BufferStats::bump(&self.stats.evictions);
                debug!(%id, bytes, "object evicted");
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => {
                let relist = victim.pin_count() == 0
                    && !victim.is_dropped()
                    && victim.state().has_payload();
                if relist {
                    acc.replacer.set_evictable(id.clone(), bytes, Arc::clone(victim));
                }
                BufferStats::bump(&self.stats.flush_failures);
                warn!(%id, error = %e, "eviction write-back failed; victim stays resident");
                Err(e)
            }
        };

        drop(acc);
        self.eviction_done.notify_all();
        result
    }
}

/// Reverts a Loading claim unless the load completes, even when the worker
/// panics mid-load.
struct LoadClaim<'a> {
    manager: &'a BufferManager,
    object: &'a Arc<BufferObject>,
    charged: bool,
    done: bool,
}

impl Drop for LoadClaim<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        // Waiters blocked in begin_pin retry the load themselves.
        self.object.abort_load();
        if self.charged {
            self.manager
                .accounting
                .lock()
                .release(self.object.estimated_size());
            self.manager.eviction_done.notify_all();
        }
        self.manager.rollback_pin(self.object);
    }
}

impl std::fmt::Debug for BufferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let objects = self.objects.read().len();
        let acc = self.accounting.lock();
        f.debug_struct("BufferManager")
            .field("budget", &self.config.budget_bytes)
            .field("resident_bytes", &acc.resident_bytes)
            .field("evictable", &acc.replacer.size())
            .field("objects", &objects)
            .finish()
    }
}
