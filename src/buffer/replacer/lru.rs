//! LRU replacement policy over unpinned resident objects.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::common::ObjectId;

struct Entry<H> {
    tick: u64,
    bytes: usize,
    handle: H,
}

/// Tracks evictable objects in the order they became evictable.
///
/// An object enters when its pin count drops to zero and leaves when it is
/// pinned again or chosen as a victim. Re-entering moves it to the
/// most-recent end. The summed charge of all entries is kept so the manager
/// can tell up front whether an admission can ever succeed.
///
/// Each entry carries a handle `H` to the exact object that was listed, so a
/// victim is never confused with a later object registered under the same
/// id.
pub struct LruReplacer<H> {
    /// Monotonic stamp handed to the next entry.
    next_tick: u64,
    /// Stamp → object, oldest first.
    order: BTreeMap<u64, ObjectId>,
    entries: HashMap<ObjectId, Entry<H>>,
    evictable_bytes: usize,
}

impl<H> LruReplacer<H> {
    /// Create an empty replacer.
    pub fn new() -> Self {
        Self {
            next_tick: 0,
            order: BTreeMap::new(),
            entries: HashMap::new(),
            evictable_bytes: 0,
        }
    }

    /// Mark `id` evictable (or refresh it) as the most recently unpinned.
    pub fn set_evictable(&mut self, id: ObjectId, bytes: usize, handle: H) {
        self.remove(&id);

        let tick = self.next_tick;
        self.next_tick += 1;
        self.order.insert(tick, id.clone());
        self.entries.insert(id, Entry { tick, bytes, handle });
        self.evictable_bytes += bytes;
    }

    /// Remove `id`; returns whether it was present.
    pub fn remove(&mut self, id: &ObjectId) -> bool {
        self.remove_if(id, |_| true)
    }

    /// Remove `id` only if `pred` accepts its handle.
    pub fn remove_if(&mut self, id: &ObjectId, pred: impl FnOnce(&H) -> bool) -> bool {
        match self.entries.get(id) {
            Some(entry) if pred(&entry.handle) => {}
            _ => return false,
        }
        match self.entries.remove(id) {
            Some(entry) => {
                self.order.remove(&entry.tick);
                self.evictable_bytes -= entry.bytes;
                true
            }
            None => false,
        }
    }

    /// Take the least recently unpinned object, its charge and its handle.
    pub fn evict(&mut self) -> Option<(ObjectId, usize, H)> {
        let (_, id) = self.order.pop_first()?;
        let entry = self.entries.remove(&id)?;
        self.evictable_bytes -= entry.bytes;
        Some((id, entry.bytes, entry.handle))
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of evictable objects.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Summed charge of all evictable objects.
    pub fn evictable_bytes(&self) -> usize {
        self.evictable_bytes
    }
}

impl<H> Default for LruReplacer<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for LruReplacer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruReplacer")
            .field("size", &self.entries.len())
            .field("evictable_bytes", &self.evictable_bytes)
            .finish()
    }
}
