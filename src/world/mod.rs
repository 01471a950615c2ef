//! Entities, components, and general world management.

pub use self::allocator::{Entity, Generation, Index};
pub use self::comp::{Component, ComponentTag};

pub(crate) use self::allocator::Allocator;

mod allocator;
mod comp;
#[cfg(test)]
mod tests;

use std::ops::Deref;

use crate::bitset::Signature;
use crate::cell::Ref;
use crate::error::GroupAcquireError;
use crate::group::{GroupHandle, GroupRegistry, GroupSpec};
use crate::query::cache::QueryCaches;
use crate::query::{Mut, QueryContext};
use crate::storage::{ComponentPool, SparseSet};
use crate::tick::{ChangeClock, Tick, TickWindow};

/// The coordinator tying together entity allocation, component storage,
/// the change clock, query caches and groups.
///
/// Structural mutation (spawn / add / remove / destroy) requires `&mut
/// World`; queries run against `&World`, so mutating from inside an
/// iteration is impossible by construction. Collaborators that need it
/// defer their mutations and apply them between systems.
///
/// ## Examples
///
/// ```
/// use cohort::prelude::*;
///
/// struct Health(f32);
/// impl Component for Health {}
///
/// struct Pos {
///     x: f32,
///     y: f32,
/// }
/// impl Component for Pos {}
///
/// let mut world = World::new();
///
/// let entity = world
///     .create_entity() // This call returns `EntityBuilder`
///     .with(Health(4.0))
///     .with(Pos { x: 1.0, y: 3.0 })
///     .build(); // Returns the `Entity`
///
/// assert!(world.is_alive(entity));
/// assert_eq!(world.get::<Health>(entity).unwrap().0, 4.0);
/// ```
#[derive(Default)]
pub struct World {
    entities: Allocator,
    pool: ComponentPool,
    clock: ChangeClock,
    version: u64,
    caches: QueryCaches,
    groups: GroupRegistry,
}

impl World {
    /// Constructs an empty world.
    pub fn new() -> Self {
        World::default()
    }

    /// Registers a component type, creating its (empty) array.
    ///
    /// Registration also happens implicitly on first insertion; explicit
    /// registration only matters when an empty array should exist up front.
    pub fn register<T: Component>(&mut self) {
        self.pool.register::<T>();
    }

    /// The world version: bumped exactly once by every structural
    /// mutation. Query plans are valid for exactly one version.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn bump_version(&mut self) {
        self.version += 1;
    }

    /// The most recently issued change tick.
    pub fn current_change_tick(&self) -> Tick {
        self.clock.current()
    }

    /// A query context whose tick window spans everything up to now.
    pub fn context(&self) -> QueryContext<'_> {
        QueryContext::new(self)
    }

    /// Creates a new entity and returns a builder for attaching
    /// components.
    pub fn create_entity(&mut self) -> EntityBuilder<'_> {
        let entity = self.spawn();
        EntityBuilder {
            entity,
            world: self,
        }
    }

    /// Creates a new, component-less entity.
    pub fn spawn(&mut self) -> Entity {
        let entity = self.entities.allocate();
        self.pool.ensure_slot(entity.slot());
        self.bump_version();
        entity
    }

    /// Attaches `value` to `entity`, overwriting (and returning) a previous
    /// component of the same type. Silently does nothing on a dead id.
    pub fn add<T: Component>(&mut self, entity: Entity, value: T) -> Option<T> {
        if !self.entities.is_alive(entity) {
            log::debug!("add on dead entity {:?} ignored", entity);
            return None;
        }
        let tag = ComponentTag::of::<T>();
        let slot = entity.slot();
        let tick = self.clock.next();
        let replaced = self.pool.insert::<T>(slot, value, tick);
        if replaced.is_none() {
            self.pool.insert_tag(slot, tag);
            // Group hooks run to completion before the mutation becomes
            // visible to queries through the version bump.
            self.groups.on_component_added(tag, slot, &mut self.pool);
        }
        self.bump_version();
        replaced
    }

    /// Detaches `T` from `entity` and returns it. Silently does nothing on
    /// a dead id or an absent component.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> Option<T> {
        if !self.entities.is_alive(entity) {
            log::debug!("remove on dead entity {:?} ignored", entity);
            return None;
        }
        let tag = ComponentTag::of::<T>();
        let slot = entity.slot();
        if !self.pool.contains(tag, slot) {
            return None;
        }
        self.groups
            .on_will_remove_component(tag, slot, &mut self.pool);
        let tick = self.clock.next();
        let value = self.pool.remove::<T>(slot, tick);
        self.pool.remove_tag(slot, tag);
        self.bump_version();
        value
    }

    /// Destroys `entity`, detaching all of its components. Returns `false`
    /// (and does nothing) on a dead id.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        if !self.entities.is_alive(entity) {
            log::debug!("destroy on dead entity {:?} ignored", entity);
            return false;
        }
        let slot = entity.slot();
        let signature = self
            .pool
            .signature(slot)
            .cloned()
            .unwrap_or_else(Signature::new);
        let tick = self.clock.next();
        for bit in signature.ones() {
            let tag = ComponentTag::from_index(bit);
            self.groups
                .on_will_remove_component(tag, slot, &mut self.pool);
            self.pool.remove_erased(tag, slot, tick);
            self.pool.remove_tag(slot, tag);
        }
        self.pool.clear_signature(slot);
        self.entities.free(entity);
        self.bump_version();
        true
    }

    /// Destroys every live entity.
    pub fn clear_entities(&mut self) {
        for entity in self.live_entities() {
            self.destroy(entity);
        }
    }

    /// Returns `true` if the entity is alive.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// All live entities, in slot order.
    pub fn live_entities(&self) -> Vec<Entity> {
        self.entities.live().collect()
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.count()
    }

    /// Reads `entity`'s `T` component.
    pub fn get<T: Component>(&self, entity: Entity) -> Option<CompRef<'_, T>> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        let guard = self.pool.borrow_typed::<T>()?;
        let value = guard.get(entity.slot())? as *const T;
        Some(CompRef {
            value,
            _guard: guard,
        })
    }

    /// Writable access to `entity`'s `T` component; the changed tick is
    /// stamped on first write through the returned view.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<Mut<'_, T>> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        let tick = self.clock.next();
        let slot = entity.slot();
        let set = self.pool.typed_mut::<T>()?;
        let (value, ticks) = set.get_mut_with_ticks(slot)?;
        Some(Mut::new(value, ticks, tick))
    }

    /// Whether `entity` has a `T` component.
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
            && self.pool.contains(ComponentTag::of::<T>(), entity.slot())
    }

    /// The signature of `entity`: one bit per attached component tag.
    pub fn signature(&self, entity: Entity) -> Option<&Signature> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        self.pool.signature(entity.slot())
    }

    /// Whether `T` was added to `entity` within `window`.
    pub fn is_added<T: Component>(&self, entity: Entity, window: TickWindow) -> bool {
        if !self.entities.is_alive(entity) {
            return false;
        }
        self.pool
            .borrow_typed::<T>()
            .and_then(|set| set.added_tick(entity.slot()))
            .map_or(false, |tick| window.contains(tick))
    }

    /// Whether `entity`'s `T` was mutated (or added) within `window`.
    pub fn is_changed<T: Component>(&self, entity: Entity, window: TickWindow) -> bool {
        if !self.entities.is_alive(entity) {
            return false;
        }
        self.pool
            .borrow_typed::<T>()
            .and_then(|set| set.changed_tick(entity.slot()))
            .map_or(false, |tick| window.contains(tick))
    }

    /// Whether `T` was removed from `entity` within `window` and not
    /// re-attached since. Answers for dead entities as well.
    pub fn is_removed<T: Component>(&self, entity: Entity, window: TickWindow) -> bool {
        self.pool
            .borrow_typed::<T>()
            .and_then(|set| set.removed_tick(entity.slot()))
            .map_or(false, |tick| window.contains(tick))
    }

    /// Acquires a group. Owning groups reserve their owned components
    /// world-wide; a conflict fails with [`GroupAcquireError`].
    pub fn add_group(&mut self, spec: GroupSpec) -> Result<GroupHandle, GroupAcquireError> {
        self.groups.acquire(spec, &mut self.pool)
    }

    /// Releases a group. Returns `false` if the handle was already
    /// released.
    pub fn remove_group(&mut self, handle: GroupHandle) -> bool {
        self.groups.release(handle)
    }

    /// Packed size of the group matching `(include, exclude)` exactly.
    pub fn group_size(&self, include: &Signature, exclude: &Signature) -> Option<usize> {
        self.groups.size_of(include, exclude)
    }

    /// Packed slots of the group matching `(include, exclude)` exactly.
    pub fn group_slots(&self, include: &Signature, exclude: &Signature) -> Option<Vec<Index>> {
        self.groups.slots_of(include, exclude, &self.pool)
    }

    /// The best group candidate for a query signature pair: its packed
    /// slots and whether the match is exact (no residual filtering needed).
    pub fn best_group(
        &self,
        required: &Signature,
        excluded: &Signature,
    ) -> Option<(Vec<Index>, bool)> {
        self.groups.best_group(required, excluded, &self.pool)
    }

    pub(crate) fn pool(&self) -> &ComponentPool {
        &self.pool
    }

    pub(crate) fn caches(&self) -> &QueryCaches {
        &self.caches
    }

    pub(crate) fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    pub(crate) fn entity_for_slot(&self, slot: Index) -> Entity {
        self.entities.entity(slot)
    }

    pub(crate) fn live_slots(&self) -> Vec<Index> {
        self.entities.live().map(|entity| entity.slot()).collect()
    }
}

/// A shared borrow of one component value, handed out by [`World::get`].
pub struct CompRef<'w, T: Component> {
    value: *const T,
    _guard: Ref<'w, SparseSet<T>>,
}

impl<'w, T: Component> Deref for CompRef<'w, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: `_guard` keeps the array borrowed (shared) for `'w`, so
        // the pointee is alive and not mutated.
        unsafe { &*self.value }
    }
}

/// The entity builder, allowing to build an entity together with its
/// components.
///
/// Components are attached immediately; `build` merely hands back the id.
#[must_use = "call `.build()` to obtain the entity id"]
pub struct EntityBuilder<'a> {
    /// The (already created) entity for which components will be inserted.
    pub entity: Entity,
    world: &'a mut World,
}

impl<'a> EntityBuilder<'a> {
    /// Appends a component and associates it with the entity.
    ///
    /// If a component of the same type was already associated with the
    /// entity, it is overwritten.
    pub fn with<T: Component>(self, value: T) -> Self {
        let entity = self.entity;
        self.world.add(entity, value);
        self
    }

    /// Convenience method that calls `self.with(component)` if
    /// `Some(component)` is provided.
    pub fn maybe_with<T: Component>(self, value: Option<T>) -> Self {
        match value {
            Some(value) => self.with(value),
            None => self,
        }
    }

    /// Finishes the building and returns the entity.
    pub fn build(self) -> Entity {
        self.entity
    }
}
