//! End-to-end residency scenarios and the budget invariant.

use std::sync::Arc;

use proptest::prelude::*;
use tempfile::tempdir;
use vectorpool::buffer::PersistenceWorker;
use vectorpool::{
    BufferManager, BufferManagerConfig, DataBlockWorker, Error, ObjectId, ObjectState,
    ResourceUsage, VectorIndexWorker,
};

/// Budget of exactly one object: the second pin waits for the first unpin.
#[test]
fn test_budget_of_one_object() {
    let dir = tempdir().unwrap();
    let usage = Arc::new(ResourceUsage::new());
    let worker = Arc::new(DataBlockWorker::new(1024, Arc::clone(&usage)));
    let manager = BufferManager::new(worker.estimated_size(), dir.path()).unwrap();

    let a = ObjectId::new("A");
    let b = ObjectId::new("B");
    manager.get_or_create(&a, worker.clone()).unwrap();
    manager.get_or_create(&b, worker).unwrap();

    manager.pin(&a).unwrap();
    assert_eq!(manager.resident_bytes(), manager.budget());

    let err = manager.pin(&b).unwrap_err();
    assert!(matches!(
        err,
        Error::BudgetExceeded { requested: 1024, budget: 1024, pinned: 1024 }
    ));
    assert_eq!(manager.state(&a).unwrap(), ObjectState::Resident);
    assert_eq!(manager.state(&b).unwrap(), ObjectState::Unloaded);

    manager.unpin(&a).unwrap();
    manager.pin(&b).unwrap();
    assert_eq!(manager.state(&a).unwrap(), ObjectState::Unloaded);
    assert_eq!(manager.state(&b).unwrap(), ObjectState::Resident);
    assert_eq!(manager.resident_bytes(), manager.budget());
}

/// An index that was never written reloads as an empty payload.
#[test]
fn test_unwritten_vector_index_reloads_empty() {
    let dir = tempdir().unwrap();
    let usage = Arc::new(ResourceUsage::new());
    let worker = Arc::new(VectorIndexWorker::new(16, 32, Arc::clone(&usage)));
    let manager = BufferManager::new(worker.estimated_size(), dir.path()).unwrap();

    let idx1 = ObjectId::new("idx1");
    let filler = ObjectId::new("filler");
    manager.get_or_create(&idx1, worker.clone()).unwrap();
    manager.get_or_create(&filler, worker).unwrap();

    {
        let pinned = manager.fetch(&idx1).unwrap();
        assert!(pinned.read().as_vector_index().unwrap().is_empty());
    }

    // Evict idx1: it is clean, so nothing is written.
    manager.fetch(&filler).unwrap();
    assert_eq!(manager.state(&idx1).unwrap(), ObjectState::Unloaded);
    assert!(!dir.path().join("idx1").exists());

    let pinned = manager.fetch(&idx1).unwrap();
    let payload = pinned.read();
    let slot = payload.as_vector_index().unwrap();
    assert!(slot.index.is_none());
    assert!(slot.quantizer.is_none());
    assert_eq!(usage.live_payloads(), 1);
}

#[derive(Debug, Clone)]
enum Op {
    Pin(usize),
    Unpin(usize),
    Dirty(usize),
    Flush(usize),
}

fn op_strategy(objects: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..objects).prop_map(Op::Pin),
        3 => (0..objects).prop_map(Op::Unpin),
        1 => (0..objects).prop_map(Op::Dirty),
        1 => (0..objects).prop_map(Op::Flush),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// After any pin/unpin sequence the resident charge stays within budget,
    /// and every rejected pin was a genuine lack of unpinned room.
    #[test]
    fn budget_invariant_holds(
        sizes in prop::collection::vec(1usize..=4, 2..6),
        budget_units in 2usize..8,
        ops in prop::collection::vec(op_strategy(6), 1..80),
    ) {
        const UNIT: usize = 32;
        let dir = tempdir().unwrap();
        let usage = Arc::new(ResourceUsage::new());
        let config = BufferManagerConfig::new(budget_units * UNIT, dir.path()).sync_on_write(false);
        let manager = BufferManager::with_config(config).unwrap();

        let ids: Vec<ObjectId> = sizes
            .iter()
            .enumerate()
            .map(|(i, &units)| {
                let id = ObjectId::new(format!("obj-{i}"));
                let worker = Arc::new(DataBlockWorker::new(units * UNIT, Arc::clone(&usage)));
                manager.get_or_create(&id, worker).unwrap();
                id
            })
            .collect();
        let mut pins = vec![0u32; ids.len()];

        for op in ops {
            match op {
                Op::Pin(i) if i < ids.len() => {
                    let pinned_bytes: usize = (0..ids.len())
                        .filter(|&j| pins[j] > 0)
                        .map(|j| sizes[j] * UNIT)
                        .sum();
                    match manager.pin(&ids[i]) {
                        Ok(_) => pins[i] += 1,
                        Err(Error::BudgetExceeded { .. }) => {
                            prop_assert_eq!(pins[i], 0);
                            prop_assert!(pinned_bytes + sizes[i] * UNIT > manager.budget());
                        }
                        Err(e) => prop_assert!(false, "unexpected error: {}", e),
                    }
                }
                Op::Unpin(i) if i < ids.len() => {
                    let result = manager.unpin(&ids[i]);
                    if pins[i] == 0 {
                        prop_assert!(matches!(result, Err(Error::NotPinned(_))));
                    } else {
                        prop_assert!(result.is_ok());
                        pins[i] -= 1;
                    }
                }
                Op::Dirty(i) if i < ids.len() => {
                    let result = manager.mark_dirty(&ids[i]);
                    prop_assert_eq!(result.is_ok(), pins[i] > 0);
                }
                Op::Flush(i) if i < ids.len() => {
                    manager.flush_now(&ids[i]).unwrap();
                }
                _ => {}
            }

            prop_assert!(manager.resident_bytes() <= manager.budget());
            let resident: usize = (0..ids.len())
                .filter(|&j| manager.state(&ids[j]).unwrap().has_payload())
                .map(|j| sizes[j] * UNIT)
                .sum();
            prop_assert_eq!(resident, manager.resident_bytes());
            for (j, id) in ids.iter().enumerate() {
                prop_assert_eq!(manager.pin_count(id).unwrap(), pins[j]);
                if pins[j] > 0 {
                    prop_assert_eq!(manager.state(id).unwrap(), ObjectState::Resident);
                }
            }
        }

        drop(manager);
        prop_assert!(usage.is_balanced());
    }
}
