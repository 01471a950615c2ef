use super::*;
use crate::world::{ComponentTag, Entity, World};

#[derive(Debug, PartialEq)]
struct Transform {
    x: f32,
    y: f32,
    z: f32,
}
impl crate::world::Component for Transform {}

#[derive(Debug, PartialEq)]
struct Gravity {
    x: f32,
    y: f32,
    z: f32,
}
impl crate::world::Component for Gravity {}

struct Frozen;
impl crate::world::Component for Frozen {}

struct Label(&'static str);
impl crate::world::Component for Label {}

fn transform(x: f32) -> Transform {
    Transform { x, y: 0.0, z: 0.0 }
}

fn gravity(x: f32) -> Gravity {
    Gravity { x, y: 0.0, z: 0.0 }
}

#[test]
fn perform_visits_only_full_matches() {
    let mut world = World::new();
    let falling = world
        .create_entity()
        .with(transform(0.0))
        .with(gravity(1.0))
        .build();
    world.create_entity().with(gravity(1.0)).build();
    world.create_entity().with(transform(5.0)).build();

    let query = Query::<(Write<Transform>, Read<Gravity>)>::new();
    let ctx = world.context();

    let mut visits = 0;
    query.perform(&ctx, |(mut t, g)| {
        t.x += g.x;
        t.y += g.y;
        t.z += g.z;
        visits += 1;
    });
    drop(ctx);

    assert_eq!(visits, 1);
    let t = world.get::<Transform>(falling).unwrap();
    assert_eq!((t.x, t.y, t.z), (1.0, 0.0, 0.0));
}

#[test]
fn query_over_empty_world_yields_nothing() {
    let world = World::new();
    let query = Query::<(Read<Transform>,)>::new();

    let mut visits = 0;
    query.perform(&world.context(), |_| visits += 1);
    assert_eq!(visits, 0);
}

#[test]
fn empty_driver_returns_early() {
    let mut world = World::new();
    world.create_entity().with(gravity(1.0)).build();

    // `Transform` is required but its array is empty.
    let query = Query::<(Read<Transform>, Read<Gravity>)>::new();
    let mut visits = 0;
    query.perform(&world.context(), |_| visits += 1);
    assert_eq!(visits, 0);
}

#[test]
fn exclusion_filter() {
    let mut world = World::new();
    let plain = world
        .create_entity()
        .with(transform(0.0))
        .with(gravity(0.0))
        .build();
    world
        .create_entity()
        .with(transform(0.0))
        .with(gravity(0.0))
        .with(Frozen)
        .build();

    let query = Query::<(EntityId, Read<Transform>), (Without<Frozen>,)>::new();
    let mut seen = Vec::new();
    query.perform(&world.context(), |(entity, _)| seen.push(entity));

    assert_eq!(seen, vec![plain]);
}

#[test]
fn optional_resolves_absent_and_present() {
    let mut world = World::new();
    let bare = world.create_entity().with(transform(0.0)).build();
    let paired = world
        .create_entity()
        .with(transform(0.0))
        .with(gravity(9.8))
        .build();

    let query = Query::<(EntityId, Read<Transform>, Opt<Read<Gravity>>)>::new();
    let mut seen = Vec::new();
    query.perform(&world.context(), |(entity, _, g)| {
        seen.push((entity, g.map(|g| g.x as i32)));
    });
    seen.sort_by_key(|&(entity, _)| entity);

    assert_eq!(seen, vec![(bare, None), (paired, Some(9))]);
}

#[test]
fn optional_write_marks_only_present() {
    let mut world = World::new();
    let bare = world.create_entity().with(transform(0.0)).build();
    let paired = world
        .create_entity()
        .with(transform(0.0))
        .with(gravity(1.0))
        .build();

    let before = world.current_change_tick();
    let query = Query::<(Read<Transform>, Opt<Write<Gravity>>)>::new();
    query.perform(&world.context(), |(_, g)| {
        if let Some(mut g) = g {
            g.x *= 2.0;
        }
    });
    let after = world.current_change_tick();

    let window = crate::tick::TickWindow::new(before, after);
    assert!(world.is_changed::<Gravity>(paired, window));
    assert!(!world.is_changed::<Transform>(bare, window));
    assert_eq!(world.get::<Gravity>(paired).unwrap().x as i32, 2);
}

#[test]
fn backstage_filters_without_yielding() {
    let mut world = World::new();
    let labeled = world
        .create_entity()
        .with(transform(0.0))
        .with(Label("a"))
        .build();
    world.create_entity().with(transform(0.0)).build();

    let query = Query::<(EntityId,), (With<Label>, With<Transform>)>::new();
    let mut seen = Vec::new();
    query.perform(&world.context(), |(entity,)| seen.push(entity));

    assert_eq!(seen, vec![labeled]);
    // Backstage components participate in the required signature.
    assert!(query
        .meta()
        .required_signature()
        .contains(ComponentTag::of::<Label>().index()));
}

#[test]
fn signature_and_preloaded_match_perform() {
    let mut world = World::new();
    for i in 0..20 {
        let builder = world.create_entity().with(transform(i as f32));
        let builder = if i % 2 == 0 {
            builder.with(gravity(1.0))
        } else {
            builder
        };
        let builder = if i % 3 == 0 { builder.with(Frozen) } else { builder };
        builder.build();
    }

    let query = Query::<(EntityId, Read<Transform>, Read<Gravity>), (Without<Frozen>,)>::new();
    let ctx = world.context();

    let mut by_perform = Vec::new();
    query.perform(&ctx, |(entity, ..)| by_perform.push(entity));

    let mut by_signature = Vec::new();
    query.perform_with_signature(&ctx, |(entity, ..)| by_signature.push(entity));

    let mut by_preloaded = Vec::new();
    query.preloaded(&ctx, |(entity, ..)| by_preloaded.push(entity));

    by_perform.sort();
    by_signature.sort();
    by_preloaded.sort();
    assert!(!by_perform.is_empty());
    assert_eq!(by_perform, by_signature);
    assert_eq!(by_perform, by_preloaded);
}

#[test]
fn combinations_visits_unordered_pairs() {
    let mut world = World::new();
    for i in 0..4 {
        world.create_entity().with(transform(i as f32)).build();
    }

    let query = Query::<(EntityId, Read<Transform>)>::new();
    let mut pairs = Vec::new();
    query.combinations(&world.context(), |(a, _), (b, _)| {
        assert_ne!(a, b);
        pairs.push((a.slot().min(b.slot()), a.slot().max(b.slot())));
    });

    pairs.sort_unstable();
    pairs.dedup();
    // C(4, 2) distinct unordered pairs.
    assert_eq!(pairs.len(), 6);
}

#[test]
fn fetch_one_and_views() {
    let mut world = World::new();
    world.create_entity().with(transform(1.0)).build();
    world.create_entity().with(transform(2.0)).build();

    let query = Query::<(Read<Transform>,)>::new();
    let ctx = world.context();

    let first = query.fetch_one(&ctx, |(t,)| t.x);
    assert!(first.is_some());

    let view = query.fetch_all(&ctx);
    assert_eq!(view.len(), 2);
    let mut xs: Vec<i32> = view.iter().map(|(t,)| t.x as i32).collect();
    xs.sort_unstable();
    assert_eq!(xs, vec![1, 2]);

    // Restartable: a second pass yields the same elements.
    assert_eq!(view.iter().count(), 2);
}

#[test]
fn fetch_one_on_empty_query_is_none() {
    let world = World::new();
    let query = Query::<(Read<Transform>,)>::new();
    assert!(query.fetch_one(&world.context(), |(t,)| t.x).is_none());
}

#[test]
fn iter_all_writes_through() {
    let mut world = World::new();
    let e = world.create_entity().with(transform(1.0)).build();

    let query = Query::<(Write<Transform>,)>::new();
    {
        let ctx = world.context();
        let mut view = query.iter_all(&ctx);
        for (mut t,) in view.iter_mut() {
            t.x += 10.0;
        }
    }

    assert_eq!(world.get::<Transform>(e).unwrap().x as i32, 11);
}

#[test]
fn entity_id_only_query_falls_back_to_live_entities() {
    let mut world = World::new();
    let a = world.spawn();
    let b = world.create_entity().with(Frozen).build();
    let c = world.spawn();
    world.destroy(c);

    let query = Query::<(EntityId,), (Without<Frozen>,)>::new();
    let mut seen: Vec<Entity> = Vec::new();
    query.perform(&world.context(), |(entity,)| seen.push(entity));

    assert_eq!(seen, vec![a]);
    let _ = b;
}

#[test]
fn write_marks_changed_within_context_window() {
    let mut world = World::new();
    let e = world
        .create_entity()
        .with(transform(0.0))
        .with(gravity(1.0))
        .build();

    let before = world.current_change_tick();
    let query = Query::<(Write<Transform>, Read<Gravity>)>::new();
    query.perform(&world.context(), |(mut t, g)| t.x += g.x);
    let after = world.current_change_tick();

    assert!(world.is_changed::<Transform>(e, crate::tick::TickWindow::new(before, after)));
    // Read-only resolution must not mark.
    let before_reads = world.current_change_tick();
    let _ = query.fetch_one(&world.context(), |(t, _)| t.x);
    let after_reads = world.current_change_tick();
    assert!(!world.is_changed::<Transform>(
        e,
        crate::tick::TickWindow::new(before_reads, after_reads)
    ));
}

#[test]
fn scheduler_metadata_signatures() {
    let query = Query::<
        (Write<Transform>, Read<Gravity>, Opt<Write<Label>>),
        (With<Frozen>, Without<Label>),
    >::new();
    let meta = query.meta();

    let transform = ComponentTag::of::<Transform>().index();
    let gravity = ComponentTag::of::<Gravity>().index();
    let frozen = ComponentTag::of::<Frozen>().index();
    let label = ComponentTag::of::<Label>().index();

    assert!(meta.required_signature().contains(transform));
    assert!(meta.required_signature().contains(gravity));
    assert!(meta.required_signature().contains(frozen));
    // Optional roles never participate in matching.
    assert!(!meta.required_signature().contains(label));

    assert!(meta.write_signature().contains(transform));
    assert!(meta.write_signature().contains(label));
    assert!(!meta.write_signature().contains(gravity));
    assert!(meta.read_signature().contains(gravity));
    assert!(meta.excluded_signature().contains(label));
    assert!(meta.backstage_signature().contains(frozen));
}

#[test]
fn compatibility_for_scheduler_admission() {
    let writes_transform = Query::<(Write<Transform>,)>::new();
    let reads_transform = Query::<(Read<Transform>,)>::new();
    let reads_gravity = Query::<(Read<Gravity>,)>::new();
    let writes_gravity_reads_transform = Query::<(Write<Gravity>, Read<Transform>)>::new();

    // Two readers always coexist.
    assert!(reads_transform.meta().is_compatible(reads_gravity.meta()));
    // A writer excludes readers and writers of the same component.
    assert!(!writes_transform.meta().is_compatible(reads_transform.meta()));
    assert!(!writes_transform.meta().is_compatible(writes_transform.meta()));
    // Disjoint write sets coexist only if neither reads the other's writes.
    assert!(writes_gravity_reads_transform
        .meta()
        .is_compatible(reads_transform.meta()));
    assert!(!writes_gravity_reads_transform
        .meta()
        .is_compatible(writes_transform.meta()));
}

#[test]
fn contradictory_query_matches_nothing() {
    let mut world = World::new();
    world.create_entity().with(Frozen).build();

    // Requires and excludes `Frozen` at once.
    let query = Query::<(Read<Frozen>,), (Without<Frozen>,)>::new();
    let mut visits = 0;
    query.perform(&world.context(), |_| visits += 1);
    assert_eq!(visits, 0);
}

#[test]
fn plans_are_reused_within_a_version_and_rebuilt_after_mutation() {
    let mut world = World::new();
    world.create_entity().with(transform(0.0)).build();

    let query = Query::<(Read<Transform>,)>::new();
    let first = query.slots_plan(&world);
    let again = query.slots_plan(&world);
    // Same version: the cached plan is handed out as-is.
    assert!(std::sync::Arc::ptr_eq(&first, &again));
    assert_eq!(first.version, world.version());

    world.create_entity().with(transform(1.0)).build();
    let rebuilt = query.slots_plan(&world);
    assert!(!std::sync::Arc::ptr_eq(&first, &rebuilt));
    assert_eq!(rebuilt.slots.len(), 2);
}

#[test]
fn queries_with_equal_shapes_share_a_hash() {
    let a = Query::<(Read<Transform>, Read<Gravity>)>::new();
    let b = Query::<(Write<Transform>, Read<Gravity>)>::new();
    let c = Query::<(Read<Transform>,), (Without<Gravity>,)>::new();

    // Hashes derive from (required, excluded) only; access mode does not
    // split the plan cache.
    assert_eq!(a.hash(), b.hash());
    assert_ne!(a.hash(), c.hash());
}

#[cfg(feature = "parallel")]
mod parallel {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn parallel_visits_same_set_as_sequential() {
        let mut world = World::new();
        for i in 0..256 {
            let builder = world.create_entity().with(transform(i as f32));
            let builder = if i % 3 == 0 {
                builder.with(gravity(1.0))
            } else {
                builder
            };
            builder.build();
        }

        let query = Query::<(EntityId, Write<Transform>, Read<Gravity>)>::new();
        let ctx = world.context();

        let mut sequential = Vec::new();
        query.preloaded(&ctx, |(entity, ..)| sequential.push(entity));

        let parallel = Mutex::new(Vec::new());
        query.parallel(&ctx, |(entity, mut t, g)| {
            t.x += g.x;
            parallel.lock().unwrap().push(entity);
        });

        let mut parallel = parallel.into_inner().unwrap();
        sequential.sort();
        parallel.sort();
        assert_eq!(sequential, parallel);
    }
}
