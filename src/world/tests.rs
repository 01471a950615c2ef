use super::*;
use crate::tick::{Tick, TickWindow};

struct Pos {
    x: f32,
}
impl Component for Pos {}

struct Vel;
impl Component for Vel {}

struct Tagged;
impl Component for Tagged {}

#[test]
fn spawn_and_destroy() {
    let mut world = World::new();

    world.create_entity().build();
    let b = world
        .create_entity()
        .with(Pos { x: 1.0 })
        .with(Vel)
        .build();
    world.create_entity().with(Pos { x: 2.0 }).build();

    assert_eq!(world.entity_count(), 3);
    assert!(world.has::<Pos>(b));

    assert!(world.destroy(b));

    assert_eq!(world.entity_count(), 2);
    assert!(!world.is_alive(b));
    assert!(world.get::<Pos>(b).is_none());
}

#[test]
fn destroy_twice_is_noop() {
    let mut world = World::new();
    let e = world.create_entity().build();

    assert!(world.destroy(e));
    assert!(!world.destroy(e));
}

#[test]
fn slot_reuse_bumps_generation() {
    let mut world = World::new();

    let first = world.spawn();
    world.destroy(first);
    let second = world.spawn();

    assert_eq!(first.slot(), second.slot());
    assert_ne!(first.generation(), second.generation());
    assert_ne!(first, second);
    assert!(!world.is_alive(first));
    assert!(world.is_alive(second));
}

#[test]
fn mutation_on_dead_id_is_noop() {
    let mut world = World::new();
    let e = world.create_entity().with(Pos { x: 0.0 }).build();
    world.destroy(e);

    let version = world.version();
    assert!(world.add(e, Vel).is_none());
    assert!(world.remove::<Pos>(e).is_none());
    assert!(world.get_mut::<Pos>(e).is_none());
    // No-ops must not bump the world version.
    assert_eq!(world.version(), version);
}

#[test]
fn signature_mirrors_components() {
    let mut world = World::new();
    let e = world.create_entity().with(Pos { x: 0.0 }).build();

    let pos = ComponentTag::of::<Pos>();
    let vel = ComponentTag::of::<Vel>();

    let sig = world.signature(e).unwrap();
    assert!(sig.contains(pos.index()));
    assert!(!sig.contains(vel.index()));

    world.add(e, Vel);
    let sig = world.signature(e).unwrap();
    assert!(sig.contains(pos.index()) && sig.contains(vel.index()));

    world.remove::<Pos>(e);
    let sig = world.signature(e).unwrap();
    assert!(!sig.contains(pos.index()) && sig.contains(vel.index()));

    world.destroy(e);
    // Post-destroy the slot's signature is empty.
    assert!(world
        .pool()
        .signature(e.slot())
        .map_or(true, |sig| sig.is_empty()));
}

#[test]
fn add_overwrites_in_place() {
    let mut world = World::new();
    let e = world.create_entity().with(Pos { x: 1.0 }).build();

    let old = world.add(e, Pos { x: 9.0 });

    assert_eq!(old.map(|pos| pos.x as i32), Some(1));
    assert_eq!(world.get::<Pos>(e).unwrap().x as i32, 9);
    // Still a single component.
    assert_eq!(world.pool().len_of(ComponentTag::of::<Pos>()), 1);
}

#[test]
fn every_mutation_bumps_version_once() {
    let mut world = World::new();

    let v0 = world.version();
    let e = world.spawn();
    assert_eq!(world.version(), v0 + 1);

    world.add(e, Pos { x: 0.0 });
    assert_eq!(world.version(), v0 + 2);

    world.remove::<Pos>(e);
    assert_eq!(world.version(), v0 + 3);

    // Removing an absent component is a no-op and must not bump.
    world.remove::<Pos>(e);
    assert_eq!(world.version(), v0 + 3);

    world.destroy(e);
    assert_eq!(world.version(), v0 + 4);
}

#[test]
fn live_entities_in_slot_order() {
    let mut world = World::new();
    let a = world.spawn();
    let b = world.spawn();
    let c = world.spawn();
    world.destroy(b);

    assert_eq!(world.live_entities(), vec![a, c]);
}

#[test]
fn change_tracking_windows() {
    let mut world = World::new();
    let e = world.spawn();

    let before = world.current_change_tick();
    world.add(e, Pos { x: 0.0 });
    let after_add = world.current_change_tick();

    // Window spanning the insertion sees "added" and "changed".
    let window = TickWindow::new(before, after_add);
    assert!(world.is_added::<Pos>(e, window));
    assert!(world.is_changed::<Pos>(e, window));

    // Mutate through `get_mut`; only "changed" advances.
    {
        let mut pos = world.get_mut::<Pos>(e).unwrap();
        pos.x = 3.0;
    }
    let after_write = world.current_change_tick();
    let window = TickWindow::new(after_add, after_write);
    assert!(!world.is_added::<Pos>(e, window));
    assert!(world.is_changed::<Pos>(e, window));

    // A later window sees neither.
    let quiet = TickWindow::new(after_write, after_write);
    assert!(!world.is_added::<Pos>(e, quiet));
    assert!(!world.is_changed::<Pos>(e, quiet));
}

#[test]
fn get_mut_without_write_does_not_mark_changed() {
    let mut world = World::new();
    let e = world.create_entity().with(Pos { x: 1.0 }).build();
    let after_add = world.current_change_tick();

    {
        let pos = world.get_mut::<Pos>(e).unwrap();
        // Read-only use of the writable view.
        assert_eq!(pos.x as i32, 1);
    }

    let now = world.current_change_tick();
    assert!(!world.is_changed::<Pos>(e, TickWindow::new(after_add, now)));
}

#[test]
fn removal_tracking() {
    let mut world = World::new();
    let e = world.create_entity().with(Tagged).build();

    let before = world.current_change_tick();
    world.remove::<Tagged>(e);
    let after = world.current_change_tick();

    assert!(world.is_removed::<Tagged>(e, TickWindow::new(before, after)));
    // Earlier window does not cover the removal.
    assert!(!world.is_removed::<Tagged>(e, TickWindow::new(Tick::NEVER, before)));

    // Re-adding clears the pending removal.
    world.add(e, Tagged);
    let later = world.current_change_tick();
    assert!(!world.is_removed::<Tagged>(e, TickWindow::new(before, later)));
}

#[test]
fn destroy_stamps_removals() {
    let mut world = World::new();
    let e = world.create_entity().with(Pos { x: 0.0 }).with(Vel).build();

    let before = world.current_change_tick();
    world.destroy(e);
    let after = world.current_change_tick();

    let window = TickWindow::new(before, after);
    assert!(world.is_removed::<Pos>(e, window));
    assert!(world.is_removed::<Vel>(e, window));
}

#[test]
fn clear_entities_empties_the_world() {
    let mut world = World::new();
    world.create_entity().with(Pos { x: 0.0 }).build();
    world.create_entity().with(Vel).build();
    world.create_entity().build();

    world.clear_entities();

    assert_eq!(world.entity_count(), 0);
    assert_eq!(world.pool().len_of(ComponentTag::of::<Pos>()), 0);
    assert_eq!(world.pool().len_of(ComponentTag::of::<Vel>()), 0);
}

#[test]
fn maybe_with_builder() {
    let mut world = World::new();
    let e = world
        .create_entity()
        .maybe_with(Some(Pos { x: 1.0 }))
        .maybe_with::<Vel>(None)
        .build();

    assert!(world.has::<Pos>(e));
    assert!(!world.has::<Vel>(e));
}
