use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use strata_ecs::{
    ArchetypeIndex, ComponentBatch, ComponentTypeDescription, ComponentTypeId, ECSError, EntityId,
    World, WorldOptions, MAX_ENTITY_CAPACITY,
};

mod common;
use common::{assert_compact, init, live, small_world, Dropper, Mesh, Position, Scale, Tag};

#[test]
fn world_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<World>();
}

#[test]
fn new_world_has_only_the_empty_archetype() {
    let world = small_world();
    assert!(world.is_empty());
    assert_eq!(world.archetype_count(), 1);
    assert!(world.archetype(ArchetypeIndex::EMPTY).unwrap().entity_layout().is_empty());
}

#[test]
fn invalid_options_are_rejected() {
    init();
    let zero_entities = World::new(WorldOptions::default().with_entity_capacity(0));
    assert!(matches!(zero_entities, Err(ECSError::InvalidCapacity(e)) if e.what == "entity"));

    let zero_archetype = World::new(WorldOptions::default().with_archetype_capacity(0));
    assert!(matches!(zero_archetype, Err(ECSError::InvalidCapacity(e)) if e.what == "archetype"));

    let huge = World::new(WorldOptions::default().with_archetype_capacity(MAX_ENTITY_CAPACITY + 1));
    assert!(matches!(huge, Err(ECSError::InvalidCapacity(e)) if e.requested == MAX_ENTITY_CAPACITY as u64 + 1));
}

#[test]
fn extend_then_query_one() {
    let mut world = small_world();
    let ids = world.extend((
        vec![Position(1.0, 2.0), Position(3.0, 4.0)],
        vec![Scale(1.0, 1.0), Scale(2.0, 2.0)],
    ));

    assert_eq!(ids.len(), 2);
    assert_eq!(world.len(), 2);
    assert_eq!(world.query_one::<&Position>(ids[0]), Some(&Position(1.0, 2.0)));
    assert_eq!(
        world.query_one::<(&Position, &Scale)>(ids[1]),
        Some((&Position(3.0, 4.0), &Scale(2.0, 2.0)))
    );
    assert!(world.has_component::<Scale>(ids[0]));
    assert!(!world.has_component::<Mesh>(ids[0]));
    assert!(world.query_one::<&Mesh>(ids[0]).is_none());
    assert_compact(&world);
}

#[test]
fn extend_with_arrays_and_batches() {
    let mut world = small_world();
    let from_arrays = world.extend(([Position(0.0, 0.0), Position(1.0, 1.0), Position(2.0, 2.0)],));
    let from_batch = world.extend(
        ComponentBatch::new()
            .with(vec![Mesh::named("a"), Mesh::named("b")])
            .with(vec![Position(9.0, 9.0), Position(8.0, 8.0)]),
    );

    assert_eq!(from_arrays.len(), 3);
    assert_eq!(from_batch.len(), 2);
    assert_eq!(world.len(), 5);
    assert_eq!(world.query_one::<&Mesh>(from_batch[1]).map(|m| m.name.as_str()), Some("b"));
    assert_eq!(world.query_one::<&Position>(from_arrays[2]), Some(&Position(2.0, 2.0)));
    assert_compact(&world);
}

#[test]
fn extend_with_no_rows_is_a_no_op() {
    let mut world = small_world();
    let ids = world.extend((Vec::<Position>::new(),));
    assert!(ids.is_empty());
    assert!(world.is_empty());
}

#[test]
#[should_panic(expected = "without components")]
fn extend_with_empty_layout_panics() {
    let mut world = small_world();
    world.extend(ComponentBatch::new());
}

#[test]
#[should_panic(expected = "appears twice")]
fn extend_with_duplicate_types_panics() {
    let mut world = small_world();
    world.extend((vec![Position(0.0, 0.0)], vec![Position(1.0, 1.0)]));
}

#[test]
#[should_panic(expected = "values but the batch has")]
fn extend_with_ragged_columns_panics() {
    let mut world = small_world();
    world.extend((vec![Position(0.0, 0.0)], vec![Scale(1.0, 1.0), Scale(2.0, 2.0)]));
}

#[test]
#[should_panic(expected = "entity capacity exceeded")]
fn extend_past_entity_capacity_panics() {
    init();
    let mut world = World::new(WorldOptions::default().with_entity_capacity(2).with_archetype_capacity(8)).unwrap();
    world.extend((vec![Position(0.0, 0.0); 3],));
}

#[test]
fn remove_entity_is_idempotent() {
    let mut world = small_world();
    let ids = world.extend((vec![Position(1.0, 2.0), Position(3.0, 4.0)], vec![Scale(1.0, 1.0), Scale(2.0, 2.0)]));

    assert!(world.remove_entity(ids[0]));
    assert!(!world.remove_entity(ids[0]));
    assert!(!world.contains(ids[0]));
    assert!(world.query_one::<&Position>(ids[0]).is_none());
    assert!(!world.has_component::<Position>(ids[0]));

    assert_eq!(world.len(), 1);
    assert_eq!(world.query_one::<&Position>(ids[1]), Some(&Position(3.0, 4.0)));
    assert_compact(&world);
}

#[test]
fn stale_id_does_not_see_reused_slot() {
    let mut world = small_world();
    let old = world.extend((vec![Position(1.0, 1.0)],))[0];
    world.remove_entity(old);

    let new = world.extend((vec![Position(2.0, 2.0)],))[0];
    assert_eq!(new.index, old.index);
    assert_ne!(new, old);
    assert!(world.query_one::<&Position>(old).is_none());
    assert_eq!(world.query_one::<&Position>(new), Some(&Position(2.0, 2.0)));
}

#[test]
fn null_id_is_never_found() {
    let mut world = small_world();
    world.extend((vec![Position(1.0, 1.0)],));
    assert!(!world.contains(EntityId::null()));
    assert!(!world.remove_entity(EntityId::null()));
    assert!(!world.add_component(EntityId::null(), Scale(0.0, 0.0)));
}

#[test]
fn add_and_remove_components_migrate() {
    let mut world = small_world();
    let ids = world.extend((vec![Position(1.0, 1.0), Position(2.0, 2.0), Position(3.0, 3.0)],));

    assert!(world.add_component(ids[0], Scale(5.0, 5.0)));
    assert!(world.has_component::<Scale>(ids[0]));
    assert_eq!(
        world.query_one::<(&Position, &Scale)>(ids[0]),
        Some((&Position(1.0, 1.0), &Scale(5.0, 5.0)))
    );
    // The last entity filled the hole left behind.
    assert_eq!(world.query_one::<&Position>(ids[2]), Some(&Position(3.0, 3.0)));
    assert_compact(&world);

    assert!(!world.add_component(ids[0], Scale(6.0, 6.0)));
    assert_eq!(world.query_one::<&Scale>(ids[0]), Some(&Scale(5.0, 5.0)));

    assert!(world.remove_component::<Scale>(ids[0]));
    assert!(!world.remove_component::<Scale>(ids[0]));
    assert!(!world.has_component::<Scale>(ids[0]));
    assert_eq!(world.query_one::<&Position>(ids[0]), Some(&Position(1.0, 1.0)));
    assert_compact(&world);
}

#[test]
fn removing_last_component_keeps_entity_alive() {
    let mut world = small_world();
    let id = world.extend((vec![Position(1.0, 1.0)],))[0];

    assert!(world.remove_component::<Position>(id));
    assert!(world.contains(id));
    assert_eq!(world.lookup(id).unwrap().archetype, ArchetypeIndex::EMPTY);

    assert!(world.add_component(id, Tag));
    assert!(world.has_component::<Tag>(id));
    assert!(world.remove_entity(id));
    assert_compact(&world);
}

#[test]
fn transitions_reuse_archetypes() {
    let mut world = small_world();
    let ids = world.extend((vec![Position(0.0, 0.0); 4],));
    let before = world.archetype_count();

    for &id in &ids {
        assert!(world.add_component(id, Scale(1.0, 1.0)));
    }
    assert_eq!(world.archetype_count(), before + 1);

    for &id in &ids {
        assert!(world.remove_component::<Scale>(id));
    }
    assert_eq!(world.archetype_count(), before + 1);
    assert_eq!(world.query::<&Position>().count(), 4);
    assert_compact(&world);
}

#[test]
fn component_values_are_dropped_exactly_once() {
    let counter = Arc::new(AtomicU32::new(0));
    {
        let mut world = small_world();
        let ids = world.extend((
            vec![Dropper::new(&counter), Dropper::new(&counter), Dropper::new(&counter)],
            vec![Position(0.0, 0.0); 3],
        ));
        assert_eq!(live(&counter), 3);

        world.remove_entity(ids[0]);
        assert_eq!(live(&counter), 2);

        world.remove_component::<Dropper>(ids[1]);
        assert_eq!(live(&counter), 1);

        // Migration moves the value without dropping it.
        world.add_component(ids[2], Scale(0.0, 0.0));
        assert_eq!(live(&counter), 1);

        // Rejected additions drop the argument.
        assert!(!world.add_component(ids[2], Dropper::new(&counter)));
        assert_eq!(live(&counter), 1);

        assert!(world.add_component(ids[1], Dropper::new(&counter)));
        assert_eq!(live(&counter), 2);
    }
    assert_eq!(live(&counter), 0);
}

#[test]
fn full_destination_keeps_the_removed_component() {
    init();
    let counter = Arc::new(AtomicU32::new(0));
    {
        let mut world = World::new(WorldOptions::default().with_entity_capacity(8).with_archetype_capacity(1)).unwrap();
        let plain = world.extend((vec![Position(1.0, 1.0)],))[0];
        let tracked = world.extend((vec![Position(2.0, 2.0)], vec![Dropper::new(&counter)]))[0];

        // {Position} is already full.
        let result = panic::catch_unwind(AssertUnwindSafe(|| world.remove_component::<Dropper>(tracked)));
        assert!(result.is_err());

        assert_eq!(live(&counter), 1);
        assert!(world.has_component::<Dropper>(tracked));
        assert_eq!(world.query_one::<&Position>(tracked), Some(&Position(2.0, 2.0)));
        assert_eq!(world.query_one::<&Position>(plain), Some(&Position(1.0, 1.0)));
        assert_compact(&world);

        assert!(world.remove_entity(plain));
        assert!(world.remove_component::<Dropper>(tracked));
        assert_eq!(live(&counter), 0);
        assert_compact(&world);

        assert!(world.add_component(tracked, Dropper::new(&counter)));
    }
    assert_eq!(live(&counter), 0);
}

#[test]
fn heap_components_survive_migration() {
    let mut world = small_world();
    let ids = world.extend((vec![Mesh::named("first"), Mesh::named("second")],));

    world.add_component(ids[0], Position(1.0, 1.0));
    world.remove_entity(ids[1]);
    world.remove_component::<Position>(ids[0]);

    let mesh = world.query_one::<&Mesh>(ids[0]).unwrap();
    assert_eq!(mesh.name, "first");
    assert_eq!(mesh.indices, vec![0, 1, 2]);
}

#[test]
fn has_component_for_unregistered_type_is_false() {
    struct NeverRegistered;
    let mut world = small_world();
    let id = world.extend((vec![Position(0.0, 0.0)],))[0];
    assert!(!world.has_component::<NeverRegistered>(id));
}

#[test]
#[should_panic(expected = "never registered")]
fn unregistered_component_panics_on_use() {
    struct NeverRegistered;
    let mut world = small_world();
    world.extend((vec![NeverRegistered],));
}

#[test]
fn dynamic_components_round_trip_bytes() {
    let mut world = small_world();
    let description = ComponentTypeDescription {
        type_name: "raw_u64",
        type_id: ComponentTypeId::from_raw(0x5eed_0000_0000_0001),
        type_size: 8,
        type_align: 8,
        fn_drop: None,
    };
    unsafe { world.register_dynamic(&description) };

    let id = world.extend((vec![Position(0.0, 0.0)],))[0];
    let value = 0xdead_beef_u64.to_ne_bytes();
    assert!(unsafe { world.add_component_dynamic(id, description.type_id, &value) });
    assert!(world.has_component_dynamic(id, description.type_id));

    {
        let location = world.lookup(id).unwrap();
        let archetype = world.archetype(location.archetype).unwrap();
        let raw = archetype.component_storage_raw(description.type_id).unwrap();
        assert_eq!(&*raw, &value);
    }

    assert!(world.remove_component_dynamic(id, description.type_id));
    assert!(!world.has_component_dynamic(id, description.type_id));
}

#[test]
fn query_one_mut_writes_through() {
    let mut world = small_world();
    let id = world.extend((vec![Position(0.0, 0.0)], vec![Scale(2.0, 3.0)]))[0];

    if let Some((position, scale)) = world.query_one_mut::<(&mut Position, &Scale)>(id) {
        position.0 += scale.0;
        position.1 += scale.1;
    }
    assert_eq!(world.query_one::<&Position>(id), Some(&Position(2.0, 3.0)));
}

#[test]
#[should_panic(expected = "read-only")]
fn query_one_rejects_mutable_access() {
    let mut world = small_world();
    let id = world.extend((vec![Position(0.0, 0.0)],))[0];
    let _ = world.query_one::<&mut Position>(id);
}
