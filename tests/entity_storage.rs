use std::num::NonZeroU32;

use strata_ecs::{
    ArchetypeEntityIndex, ArchetypeIndex, ECSError, EntityId, EntityIndex, EntityLocation,
    EntityStorage, Generation, MAX_ENTITY_CAPACITY,
};

fn location(archetype: u32, slot: u32) -> EntityLocation {
    EntityLocation {
        archetype: ArchetypeIndex(archetype),
        entity: ArchetypeEntityIndex(NonZeroU32::new(slot).unwrap()),
    }
}

#[test]
fn rejects_invalid_capacity() {
    for capacity in [0, u32::MAX - 1, u32::MAX] {
        match EntityStorage::new(capacity) {
            Err(ECSError::InvalidCapacity(e)) => {
                assert_eq!(e.requested, capacity as u64);
                assert_eq!(e.max, MAX_ENTITY_CAPACITY as u64);
            }
            other => panic!("capacity {capacity} should be rejected, got {:?}", other.map(|s| s.len())),
        }
    }
}

#[test]
fn create_then_lookup() {
    let mut storage = EntityStorage::new(16).unwrap();
    let a = storage.create(location(1, 1));
    let b = storage.create(location(1, 2));

    assert_ne!(a, b);
    assert!(a.generation.is_alive());
    assert_eq!(storage.len(), 2);
    assert_eq!(storage.lookup(a), Some(location(1, 1)));
    assert_eq!(storage.lookup(b), Some(location(1, 2)));
}

#[test]
fn destroy_is_idempotent() {
    let mut storage = EntityStorage::new(16).unwrap();
    let a = storage.create(location(2, 1));

    assert_eq!(storage.destroy(a), Some(location(2, 1)));
    assert_eq!(storage.destroy(a), None);
    assert_eq!(storage.lookup(a), None);
    assert_eq!(storage.len(), 0);
}

#[test]
fn reused_slot_gets_new_generation() {
    let mut storage = EntityStorage::new(16).unwrap();
    let old = storage.create(location(1, 1));
    storage.destroy(old);

    let new = storage.create(location(3, 4));
    assert_eq!(new.index, old.index);
    assert_ne!(new.generation, old.generation);
    assert!(new.generation.is_alive());
    assert_eq!(new.generation.as_raw(), old.generation.as_raw() + 2);

    assert_eq!(storage.lookup(old), None);
    assert_eq!(storage.lookup(new), Some(location(3, 4)));
}

#[test]
fn free_list_reuses_most_recent_slot_first() {
    let mut storage = EntityStorage::new(16).unwrap();
    let ids: Vec<EntityId> = (1..=4).map(|i| storage.create(location(1, i))).collect();

    storage.destroy(ids[1]);
    storage.destroy(ids[3]);

    let first = storage.create(location(1, 1));
    let second = storage.create(location(1, 1));
    let third = storage.create(location(1, 1));

    assert_eq!(first.index, ids[3].index);
    assert_eq!(second.index, ids[1].index);
    assert_eq!(third.index, EntityIndex::new(5));
}

#[test]
fn null_and_foreign_ids_do_not_resolve() {
    let mut storage = EntityStorage::new(4).unwrap();
    storage.create(location(1, 1));

    assert_eq!(storage.lookup(EntityId::null()), None);

    let out_of_range = EntityId {
        generation: Generation::from_raw(1),
        index: EntityIndex::new(1000),
    };
    assert_eq!(storage.lookup(out_of_range), None);
    assert_eq!(storage.destroy(out_of_range), None);

    let dead_generation = EntityId {
        generation: Generation::from_raw(2),
        index: EntityIndex::new(1),
    };
    assert_eq!(storage.lookup(dead_generation), None);
}

#[test]
fn location_updates_are_visible() {
    let mut storage = EntityStorage::new(4).unwrap();
    let id = storage.create(location(1, 1));

    *storage.location_mut(id).unwrap() = location(5, 3);
    assert_eq!(storage.lookup(id), Some(location(5, 3)));
}

#[test]
#[should_panic(expected = "capacity exceeded")]
fn creating_past_capacity_panics() {
    let mut storage = EntityStorage::new(2).unwrap();
    for _ in 0..3 {
        storage.create(location(1, 1));
    }
}
