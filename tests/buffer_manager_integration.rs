//! Integration tests for the buffer manager.
//!
//! These tests verify cross-component behavior that unit tests don't cover:
//! persistence through eviction, reload across manager instances, vector
//! index round trips and concurrent pinning.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use tempfile::{tempdir, TempDir};
use vectorpool::buffer::PersistenceWorker;
use vectorpool::storage::FileHandler;
use vectorpool::{
    BufferManager, BufferManagerConfig, DataBlockWorker, FlatIndex, FlushOutcome, IvfFlatIndex,
    MetricType, ObjectId, ObjectState, Payload, ResourceUsage, Result, VectorIndex,
    VectorIndexWorker, WorkerKind,
};

const BLOCK: usize = 128;

fn create_manager(budget: usize) -> (BufferManager, Arc<ResourceUsage>, TempDir) {
    let dir = tempdir().unwrap();
    let config = BufferManagerConfig::new(budget, dir.path()).sync_on_write(false);
    (
        BufferManager::with_config(config).unwrap(),
        Arc::new(ResourceUsage::new()),
        dir,
    )
}

fn block_worker(usage: &Arc<ResourceUsage>) -> Arc<DataBlockWorker> {
    Arc::new(DataBlockWorker::new(BLOCK, Arc::clone(usage)))
}

fn grid(n: usize, d: usize) -> Vec<f32> {
    (0..n * d).map(|i| ((i * 37) % 101) as f32 / 10.0).collect()
}

/// Data written through evicted blocks comes back on the next pin.
#[test]
fn test_data_persistence_across_evictions() {
    let (manager, usage, _dir) = create_manager(2 * BLOCK);

    let ids: Vec<ObjectId> = (0..5).map(|i| ObjectId::new(format!("block-{i}"))).collect();
    for (i, id) in ids.iter().enumerate() {
        manager.get_or_create(id, block_worker(&usage)).unwrap();
        let pinned = manager.fetch(id).unwrap();
        let mut payload = pinned.write();
        let block = payload.as_data_block_mut().unwrap();
        assert!(block.append(&[i as u8, (i as u8).wrapping_mul(3)]));
    }

    assert!(manager.stats().snapshot().evictions >= 3);
    assert!(manager.resident_bytes() <= manager.budget());

    for (i, id) in ids.iter().enumerate() {
        let pinned = manager.fetch(id).unwrap();
        let payload = pinned.read();
        assert_eq!(
            payload.as_data_block().unwrap().as_slice(),
            &[i as u8, (i as u8).wrapping_mul(3)]
        );
    }
}

/// Flush, drop the manager, and reload in a fresh one.
#[test]
fn test_flush_and_reload() {
    let dir = tempdir().unwrap();
    let usage = Arc::new(ResourceUsage::new());
    let id = ObjectId::new("persistent");

    {
        let manager = BufferManager::new(4 * BLOCK, dir.path()).unwrap();
        manager.get_or_create(&id, block_worker(&usage)).unwrap();
        manager
            .fetch(&id)
            .unwrap()
            .write()
            .as_data_block_mut()
            .unwrap()
            .append(b"persistent!");
        assert_eq!(manager.flush_all().unwrap(), 1);
    }
    assert!(usage.is_balanced());

    {
        let manager = BufferManager::new(4 * BLOCK, dir.path()).unwrap();
        let object = manager.get_or_create(&id, block_worker(&usage)).unwrap();
        assert!(object.is_persisted());

        let pinned = manager.fetch(&id).unwrap();
        assert_eq!(pinned.read().as_data_block().unwrap().as_slice(), b"persistent!");
    }
    assert!(usage.is_balanced());
}

/// A mutation made before unpin is what the eviction writes back.
#[test]
fn test_dirty_flush_correctness() {
    let (manager, usage, _dir) = create_manager(BLOCK);
    let a = ObjectId::new("a");
    let b = ObjectId::new("b");
    manager.get_or_create(&a, block_worker(&usage)).unwrap();
    manager.get_or_create(&b, block_worker(&usage)).unwrap();

    let object = manager.pin(&a).unwrap();
    object
        .payload_mut()
        .unwrap()
        .as_data_block_mut()
        .unwrap()
        .append(b"mutated");
    manager.mark_dirty(&a).unwrap();
    manager.unpin(&a).unwrap();

    // Pinning b forces a out.
    manager.pin(&b).unwrap();
    assert_eq!(manager.state(&a).unwrap(), ObjectState::Unloaded);
    assert!(!manager.is_dirty(&a).unwrap());
    manager.unpin(&b).unwrap();

    let pinned = manager.fetch(&a).unwrap();
    assert_eq!(pinned.read().as_data_block().unwrap().as_slice(), b"mutated");
}

/// A vector index survives eviction and answers queries identically.
#[test]
fn test_vector_index_round_trip_through_eviction() {
    let d = 8;
    let usage = Arc::new(ResourceUsage::new());
    let worker = Arc::new(VectorIndexWorker::new(d, 64, Arc::clone(&usage)));
    let (manager, _, _dir) = create_manager(worker.estimated_size());

    let id = ObjectId::new("vectors");
    let other = ObjectId::new("other");
    manager.get_or_create(&id, worker.clone()).unwrap();
    manager.get_or_create(&other, worker).unwrap();

    let data = grid(50, d);
    let queries = grid(3, d);

    let before = {
        let pinned = manager.fetch(&id).unwrap();
        let mut payload = pinned.write();
        let slot = payload.as_vector_index_mut().unwrap();
        let mut index = FlatIndex::new(d, MetricType::L2);
        index.add(&data).unwrap();
        let result = index.search(&queries, 5).unwrap();
        slot.index = Some(VectorIndex::from(index));
        result
    };

    manager.fetch(&other).unwrap();
    assert_eq!(manager.state(&id).unwrap(), ObjectState::Unloaded);

    let pinned = manager.fetch(&id).unwrap();
    let payload = pinned.read();
    let index = payload.as_vector_index().unwrap().index.as_ref().unwrap();
    assert_eq!(index.ntotal(), 50);
    assert_eq!(index.search(&queries, 5).unwrap(), before);
}

/// IVF indexes keep their trained quantizer and lists across a reload.
#[test]
fn test_ivf_index_reload_across_managers() {
    let d = 4;
    let nlist = 4;
    let dir = tempdir().unwrap();
    let usage = Arc::new(ResourceUsage::new());
    let worker = Arc::new(VectorIndexWorker::new(d, 200, Arc::clone(&usage)).with_nlist(nlist));
    let id = ObjectId::new("ivf");

    let data = grid(120, d);
    let queries = grid(4, d);

    let before = {
        let manager = BufferManager::new(worker.estimated_size(), dir.path()).unwrap();
        manager.get_or_create(&id, worker.clone()).unwrap();

        let mut index = IvfFlatIndex::new(FlatIndex::new(d, MetricType::L2), nlist, MetricType::L2)
            .unwrap();
        index.train(&data).unwrap();
        index.add(&data).unwrap();
        index.set_nprobe(2);
        let result = index.search(&queries, 3).unwrap();

        let pinned = manager.fetch(&id).unwrap();
        pinned.write().as_vector_index_mut().unwrap().index = Some(index.into());
        drop(pinned);

        assert_eq!(manager.flush_now(&id).unwrap(), FlushOutcome::Written);
        result
    };
    assert!(usage.is_balanced());

    let manager = BufferManager::new(worker.estimated_size(), dir.path()).unwrap();
    manager.get_or_create(&id, worker).unwrap();
    let pinned = manager.fetch(&id).unwrap();
    let payload = pinned.read();
    let index = payload.as_vector_index().unwrap().index.as_ref().unwrap();
    assert!(index.is_trained());
    assert_eq!(index.search(&queries, 3).unwrap(), before);
}

/// Reloading with a worker of the wrong dimension is a storage error and
/// leaves the object unloaded.
#[test]
fn test_vector_index_dimension_mismatch_on_load() {
    let dir = tempdir().unwrap();
    let usage = Arc::new(ResourceUsage::new());
    let id = ObjectId::new("dims");

    {
        let manager = BufferManager::new(1 << 20, dir.path()).unwrap();
        let worker = Arc::new(VectorIndexWorker::new(4, 16, Arc::clone(&usage)));
        manager.get_or_create(&id, worker).unwrap();

        let mut index = FlatIndex::new(4, MetricType::L2);
        index.add(&grid(2, 4)).unwrap();
        manager.fetch(&id).unwrap().write().as_vector_index_mut().unwrap().index =
            Some(index.into());
        manager.flush_all().unwrap();
    }

    let manager = BufferManager::new(1 << 20, dir.path()).unwrap();
    let worker = Arc::new(VectorIndexWorker::new(8, 16, Arc::clone(&usage)));
    manager.get_or_create(&id, worker).unwrap();

    let err = manager.pin(&id).unwrap_err();
    assert!(matches!(err, vectorpool::Error::Storage { .. }));
    assert_eq!(manager.state(&id).unwrap(), ObjectState::Unloaded);
    assert_eq!(manager.resident_bytes(), 0);
    assert!(usage.is_balanced());
}

/// Reusing an identity with another worker kind is rejected.
#[test]
fn test_kind_mismatch() {
    let (manager, usage, _dir) = create_manager(1 << 20);
    let id = ObjectId::new("shared");

    manager.get_or_create(&id, block_worker(&usage)).unwrap();
    let err = manager
        .get_or_create(&id, Arc::new(VectorIndexWorker::new(4, 4, usage)))
        .unwrap_err();

    match err {
        vectorpool::Error::KindMismatch {
            expected, found, ..
        } => {
            assert_eq!(expected, WorkerKind::DataBlock);
            assert_eq!(found, WorkerKind::VectorIndex);
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// A write-back failure keeps the object resident and dirty, and the
/// admission that needed the room reports it.
#[test]
fn test_flush_failure_keeps_object_resident() {
    let usage = Arc::new(ResourceUsage::new());
    let worker = Arc::new(VectorIndexWorker::new(4, 8, Arc::clone(&usage)));
    let (manager, _, _dir) = create_manager(worker.estimated_size());

    let empty = ObjectId::new("empty");
    let next = ObjectId::new("next");
    manager.get_or_create(&empty, worker.clone()).unwrap();
    manager.get_or_create(&next, worker).unwrap();

    // Dirty, but no index to write.
    drop(manager.fetch(&empty).unwrap().write());
    assert!(manager.is_dirty(&empty).unwrap());

    assert!(matches!(
        manager.flush_now(&empty),
        Err(vectorpool::Error::Storage { .. })
    ));
    assert_eq!(manager.state(&empty).unwrap(), ObjectState::Resident);
    assert!(manager.is_dirty(&empty).unwrap());

    let err = manager.pin(&next).unwrap_err();
    assert!(matches!(err, vectorpool::Error::Storage { .. }));
    assert_eq!(manager.state(&empty).unwrap(), ObjectState::Resident);
    assert!(manager.is_dirty(&empty).unwrap());
    assert_eq!(manager.state(&next).unwrap(), ObjectState::Unloaded);
    assert_eq!(manager.pin_count(&next).unwrap(), 0);
    assert!(manager.resident_bytes() <= manager.budget());
    assert_eq!(manager.stats().snapshot().flush_failures, 2);

    // Once there is something to write, eviction goes through.
    {
        let pinned = manager.fetch(&empty).unwrap();
        let mut index = FlatIndex::new(4, MetricType::L2);
        index.add(&grid(1, 4)).unwrap();
        pinned.write().as_vector_index_mut().unwrap().index = Some(index.into());
    }
    manager.pin(&next).unwrap();
    assert_eq!(manager.state(&empty).unwrap(), ObjectState::Unloaded);
}

/// Many threads pinning one unloaded object allocate it exactly once.
#[test]
fn test_concurrent_pin_loads_once() {
    let (manager, usage, _dir) = create_manager(4 * BLOCK);
    let manager = Arc::new(manager);
    let id = ObjectId::new("hot");
    manager.get_or_create(&id, block_worker(&usage)).unwrap();

    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let id = id.clone();
            thread::spawn(move || {
                barrier.wait();
                manager.pin(&id).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(usage.total_allocations(), 1);
    assert_eq!(manager.pin_count(&id).unwrap(), threads as u32);
    let stats = manager.stats().snapshot();
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.cache_hits, threads as u64 - 1);

    for _ in 0..threads {
        manager.unpin(&id).unwrap();
    }
    assert!(manager.unpin(&id).is_err());
}

/// An object pinned by N threads is not evicted until all N unpin.
#[test]
fn test_pin_safety_with_many_pinners() {
    let (manager, usage, _dir) = create_manager(BLOCK);
    let manager = Arc::new(manager);
    let held = ObjectId::new("held");
    let other = ObjectId::new("other");
    manager.get_or_create(&held, block_worker(&usage)).unwrap();
    manager.get_or_create(&other, block_worker(&usage)).unwrap();

    let pinners = 8;
    let barrier = Arc::new(Barrier::new(pinners + 1));
    let released = Arc::new(Barrier::new(pinners + 1));
    let handles: Vec<_> = (0..pinners)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let released = Arc::clone(&released);
            let held = held.clone();
            thread::spawn(move || {
                let pinned = manager.fetch(&held).unwrap();
                barrier.wait();
                released.wait();
                drop(pinned);
            })
        })
        .collect();

    barrier.wait();
    assert_eq!(manager.pin_count(&held).unwrap(), pinners as u32);
    assert!(matches!(
        manager.pin(&other),
        Err(vectorpool::Error::BudgetExceeded { .. })
    ));
    assert_eq!(manager.state(&held).unwrap(), ObjectState::Resident);

    released.wait();
    for handle in handles {
        handle.join().unwrap();
    }

    manager.pin(&other).unwrap();
    assert_eq!(manager.state(&held).unwrap(), ObjectState::Unloaded);
}

/// Threads churning through more objects than fit never break the budget
/// and never lose a write.
#[test]
fn test_concurrent_churn_respects_budget() {
    let (manager, usage, _dir) = create_manager(3 * BLOCK);
    let manager = Arc::new(manager);
    let ids: Vec<ObjectId> = (0..8).map(|i| ObjectId::new(format!("churn-{i}"))).collect();
    for id in &ids {
        manager.get_or_create(id, block_worker(&usage)).unwrap();
    }

    let rejected = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let manager = Arc::clone(&manager);
            let ids = ids.clone();
            let rejected = Arc::clone(&rejected);
            thread::spawn(move || {
                for round in 0..50 {
                    // Each thread writes to its own pair of objects.
                    let id = &ids[t * 2 + round % 2];
                    match manager.fetch(id) {
                        Ok(pinned) => {
                            let mut payload = pinned.write();
                            let block = payload.as_data_block_mut().unwrap();
                            block.clear();
                            block.append(&[t as u8, round as u8]);
                        }
                        Err(vectorpool::Error::BudgetExceeded { .. }) => {
                            rejected.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                    assert!(manager.resident_bytes() <= manager.budget());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(manager.resident_bytes() <= manager.budget());
    for (i, id) in ids.iter().enumerate() {
        let pinned = manager.fetch(id).unwrap();
        let payload = pinned.read();
        let bytes = payload.as_data_block().unwrap().as_slice().to_vec();
        if !bytes.is_empty() {
            assert_eq!(bytes[0] as usize, i / 2);
        }
    }
}

/// Every payload allocated through a manager is freed by the time it drops.
#[test]
fn test_resource_usage_balanced_after_drop() {
    let usage = Arc::new(ResourceUsage::new());
    {
        let (manager, _, _dir) = create_manager(2 * BLOCK);
        for i in 0..6 {
            let id = ObjectId::new(format!("obj-{i}"));
            manager.get_or_create(&id, block_worker(&usage)).unwrap();
            let _pinned = manager.fetch(&id).unwrap();
        }
        assert_eq!(usage.live_payloads(), 2);
    }
    assert!(usage.is_balanced());
    assert_eq!(usage.live_bytes(), 0);
}

/// Workers obey the allocate/free pairing outside the manager too.
#[test]
fn test_worker_allocation_pairing() -> Result<()> {
    let usage = Arc::new(ResourceUsage::new());
    let worker = DataBlockWorker::new(BLOCK, Arc::clone(&usage));

    let mut slot: Option<Payload> = None;
    assert!(worker.free_in_memory(&mut slot).is_err());
    worker.allocate_in_memory(&mut slot)?;
    assert!(matches!(
        worker.allocate_in_memory(&mut slot),
        Err(vectorpool::Error::AlreadyAllocated)
    ));

    let dir = tempdir()?;
    let path = dir.path().join("pairing");
    let mut file = FileHandler::create(&path, false)?;
    worker.write_to_file_impl(slot.as_ref().unwrap(), &mut file)?;
    file.finish()?;

    worker.free_in_memory(&mut slot)?;
    assert!(matches!(
        worker.free_in_memory(&mut slot),
        Err(vectorpool::Error::NotAllocated)
    ));
    assert!(usage.is_balanced());
    Ok(())
}
