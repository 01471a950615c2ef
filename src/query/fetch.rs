//! Per-role component accessors and their tuple bundles.
//!
//! Each type parameter of a [`Query`](super::Query) is a *role*: read,
//! write, optional, or entity id. A role knows how to contribute to the
//! query's signatures and how to resolve itself for one entity slot. The
//! typed view of a component array is obtained once per iteration (a borrow
//! guard plus a raw pointer) and reused for every entity; this is the one
//! unsafe-but-sound seam of the engine, see [`Fetch::try_fetch`].

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::cell::{Ref, RefMut};
use crate::storage::{SparseSet, NOT_FOUND};
use crate::tick::{ComponentTicks, Tick, TickWindow};
use crate::world::{Component, ComponentTag, Entity, Index, World};

use super::QueryMeta;

/// Role: shared access to a required component (the "bare `T`" of a query).
pub struct Read<T>(PhantomData<T>);

/// Role: exclusive access to a required component. Resolves to [`Mut`],
/// which stamps the component's changed tick on first write.
pub struct Write<T>(PhantomData<T>);

/// Role: optional access. `Opt<Read<T>>` and `Opt<Write<T>>` resolve to
/// `None` instead of filtering the entity out when the component is absent.
pub struct Opt<R>(PhantomData<R>);

/// Role: yields the entity id itself.
pub struct EntityId;

/// A writable view of one component value.
///
/// Dereferencing mutably stamps the component's `changed` tick with the
/// context's `this_run` tick; read-only access leaves the ticks alone.
pub struct Mut<'a, T> {
    value: &'a mut T,
    ticks: &'a ComponentTicks,
    this_run: Tick,
}

impl<'a, T> Mut<'a, T> {
    pub(crate) fn new(value: &'a mut T, ticks: &'a ComponentTicks, this_run: Tick) -> Self {
        Mut {
            value,
            ticks,
            this_run,
        }
    }
}

impl<'a, T> Deref for Mut<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<'a, T> DerefMut for Mut<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.ticks.set_changed(self.this_run);
        self.value
    }
}

impl<'a, T: fmt::Debug> fmt::Debug for Mut<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Mut").field(&self.value).finish()
    }
}

/// Opened shared view of `T`'s array: the borrow guard plus a raw pointer
/// kept for the duration of the iteration.
pub struct ReadState<'w, T: Component> {
    set: *const SparseSet<T>,
    _guard: Ref<'w, SparseSet<T>>,
}

impl<'w, T: Component> ReadState<'w, T> {
    pub(crate) fn open(world: &'w World) -> Option<Self> {
        let guard = world.pool().borrow_typed::<T>()?;
        let set: *const SparseSet<T> = &*guard;
        Some(ReadState { set, _guard: guard })
    }

    /// The borrowed array. Sound because the guard lives as long as `self`.
    pub(crate) fn set(&self) -> &SparseSet<T> {
        // SAFETY: `_guard` holds the shared borrow for `'w`, which outlives the lifetime
        // of `self`, so the pointee is alive and not exclusively borrowed.
        unsafe { &*self.set }
    }
}

/// Opened exclusive view of `T`'s array.
///
/// The guard proves this query is the only writer; actual writes go through
/// [`SparseSet::shared_get_mut_at`] so that parallel workers can resolve
/// distinct entities concurrently.
pub struct WriteState<'w, T: Component> {
    set: *const SparseSet<T>,
    this_run: Tick,
    _guard: RefMut<'w, SparseSet<T>>,
}

impl<'w, T: Component> WriteState<'w, T> {
    fn open(world: &'w World, window: TickWindow) -> Option<Self> {
        let guard = world.pool().borrow_typed_mut::<T>()?;
        let set: *const SparseSet<T> = &*guard;
        Some(WriteState {
            set,
            this_run: window.this_run,
            _guard: guard,
        })
    }

    pub(crate) fn set(&self) -> &SparseSet<T> {
        // SAFETY: `_guard` holds the exclusive borrow for the lifetime of
        // `self`; shared access through it is sound, mutation goes through
        // `shared_get_mut_at` under the distinct-slot rule.
        unsafe { &*self.set }
    }
}

/// One query role: signature contribution plus per-entity resolution.
///
/// # Safety
///
/// Implementations hand out references derived from the opened state's raw
/// pointer. Callers of the `try_fetch` family must keep the state alive for
/// as long as any returned item and must never resolve the same slot twice
/// while a previously returned mutable item is still alive.
pub unsafe trait Fetch {
    /// What the role yields for one entity.
    type Item<'a>;
    /// The read-only rendition of [`Self::Item`].
    type ReadOnlyItem<'a>;
    /// Borrow guards and pointers held for one iteration.
    type State<'w>;
    /// Like [`Self::State`], but never taking an exclusive borrow.
    type ReadOnlyState<'w>;

    /// Adds this role's tags to the query's signatures.
    fn describe(meta: &mut QueryMeta);

    /// Borrows the role's array from the world.
    fn open<'w>(world: &'w World, window: TickWindow) -> Self::State<'w>;

    /// Borrows the role's array for read-only resolution.
    fn open_read_only<'w>(world: &'w World) -> Self::ReadOnlyState<'w>;

    /// Resolves the role for `slot`, or `None` if a required component is
    /// absent.
    ///
    /// # Safety
    ///
    /// See the trait-level contract: `state` must outlive the item, and
    /// mutable items for one slot must not coexist.
    unsafe fn try_fetch<'w, 'a>(state: &'a Self::State<'w>, slot: Index)
        -> Option<Self::Item<'a>>;

    /// Read-only variant of [`Self::try_fetch`].
    ///
    /// # Safety
    ///
    /// `state` must outlive the item.
    unsafe fn try_fetch_read_only<'w, 'a>(
        state: &'a Self::ReadOnlyState<'w>,
        slot: Index,
    ) -> Option<Self::ReadOnlyItem<'a>>;
}

// SAFETY: Items are plain shared references into the guarded array.
unsafe impl<T: Component> Fetch for Read<T> {
    type Item<'a> = &'a T;
    type ReadOnlyItem<'a> = &'a T;
    type State<'w> = Option<ReadState<'w, T>>;
    type ReadOnlyState<'w> = Option<ReadState<'w, T>>;

    fn describe(meta: &mut QueryMeta) {
        let tag = ComponentTag::of::<T>();
        meta.add_required(tag);
        meta.add_read(tag);
    }

    fn open<'w>(world: &'w World, _window: TickWindow) -> Self::State<'w> {
        ReadState::open(world)
    }

    fn open_read_only<'w>(world: &'w World) -> Self::ReadOnlyState<'w> {
        ReadState::open(world)
    }

    unsafe fn try_fetch<'w, 'a>(
        state: &'a Self::State<'w>,
        slot: Index,
    ) -> Option<Self::Item<'a>> {
        state.as_ref()?.set().get(slot)
    }

    unsafe fn try_fetch_read_only<'w, 'a>(
        state: &'a Self::ReadOnlyState<'w>,
        slot: Index,
    ) -> Option<Self::ReadOnlyItem<'a>> {
        state.as_ref()?.set().get(slot)
    }
}

// SAFETY: Mutable items are created through `shared_get_mut_at` under the
// exclusive array borrow held by the state; the caller upholds the
// distinct-slot rule.
unsafe impl<T: Component> Fetch for Write<T> {
    type Item<'a> = Mut<'a, T>;
    type ReadOnlyItem<'a> = &'a T;
    type State<'w> = Option<WriteState<'w, T>>;
    type ReadOnlyState<'w> = Option<ReadState<'w, T>>;

    fn describe(meta: &mut QueryMeta) {
        let tag = ComponentTag::of::<T>();
        meta.add_required(tag);
        meta.add_write(tag);
    }

    fn open<'w>(world: &'w World, window: TickWindow) -> Self::State<'w> {
        WriteState::open(world, window)
    }

    fn open_read_only<'w>(world: &'w World) -> Self::ReadOnlyState<'w> {
        ReadState::open(world)
    }

    unsafe fn try_fetch<'w, 'a>(
        state: &'a Self::State<'w>,
        slot: Index,
    ) -> Option<Self::Item<'a>> {
        let state = state.as_ref()?;
        let set = state.set();
        let idx = set.sparse_index(slot);
        if idx == NOT_FOUND {
            return None;
        }
        // SAFETY: The state holds the exclusive borrow of this array and the
        // caller guarantees no two live items for the same slot, so this
        // dense element is not aliased.
        let value = unsafe { set.shared_get_mut_at(idx as usize) };
        let ticks = set.ticks_at(idx as usize);
        Some(Mut::new(value, ticks, state.this_run))
    }

    unsafe fn try_fetch_read_only<'w, 'a>(
        state: &'a Self::ReadOnlyState<'w>,
        slot: Index,
    ) -> Option<Self::ReadOnlyItem<'a>> {
        state.as_ref()?.set().get(slot)
    }
}

// SAFETY: Same as `Read`; absence resolves to `None` instead of filtering.
unsafe impl<T: Component> Fetch for Opt<Read<T>> {
    type Item<'a> = Option<&'a T>;
    type ReadOnlyItem<'a> = Option<&'a T>;
    type State<'w> = Option<ReadState<'w, T>>;
    type ReadOnlyState<'w> = Option<ReadState<'w, T>>;

    fn describe(meta: &mut QueryMeta) {
        // Optional components never participate in matching.
        meta.add_read(ComponentTag::of::<T>());
    }

    fn open<'w>(world: &'w World, _window: TickWindow) -> Self::State<'w> {
        ReadState::open(world)
    }

    fn open_read_only<'w>(world: &'w World) -> Self::ReadOnlyState<'w> {
        ReadState::open(world)
    }

    unsafe fn try_fetch<'w, 'a>(
        state: &'a Self::State<'w>,
        slot: Index,
    ) -> Option<Self::Item<'a>> {
        Some(state.as_ref().and_then(|s| s.set().get(slot)))
    }

    unsafe fn try_fetch_read_only<'w, 'a>(
        state: &'a Self::ReadOnlyState<'w>,
        slot: Index,
    ) -> Option<Self::ReadOnlyItem<'a>> {
        Some(state.as_ref().and_then(|s| s.set().get(slot)))
    }
}

// SAFETY: Same as `Write`; absence resolves to `None` instead of filtering.
unsafe impl<T: Component> Fetch for Opt<Write<T>> {
    type Item<'a> = Option<Mut<'a, T>>;
    type ReadOnlyItem<'a> = Option<&'a T>;
    type State<'w> = Option<WriteState<'w, T>>;
    type ReadOnlyState<'w> = Option<ReadState<'w, T>>;

    fn describe(meta: &mut QueryMeta) {
        meta.add_write(ComponentTag::of::<T>());
    }

    fn open<'w>(world: &'w World, window: TickWindow) -> Self::State<'w> {
        WriteState::open(world, window)
    }

    fn open_read_only<'w>(world: &'w World) -> Self::ReadOnlyState<'w> {
        ReadState::open(world)
    }

    unsafe fn try_fetch<'w, 'a>(
        state: &'a Self::State<'w>,
        slot: Index,
    ) -> Option<Self::Item<'a>> {
        let Some(state) = state.as_ref() else {
            return Some(None);
        };
        // SAFETY: Forwarded from `Write::try_fetch`, same argument.
        let set = state.set();
        let idx = set.sparse_index(slot);
        if idx == NOT_FOUND {
            return Some(None);
        }
        // SAFETY: Exclusive borrow held by the state; distinct-slot rule
        // upheld by the caller.
        let value = unsafe { set.shared_get_mut_at(idx as usize) };
        let ticks = set.ticks_at(idx as usize);
        Some(Some(Mut::new(value, ticks, state.this_run)))
    }

    unsafe fn try_fetch_read_only<'w, 'a>(
        state: &'a Self::ReadOnlyState<'w>,
        slot: Index,
    ) -> Option<Self::ReadOnlyItem<'a>> {
        Some(state.as_ref().and_then(|s| s.set().get(slot)))
    }
}

// SAFETY: Items are plain `Entity` values; no storage is touched.
unsafe impl Fetch for EntityId {
    type Item<'a> = Entity;
    type ReadOnlyItem<'a> = Entity;
    type State<'w> = &'w World;
    type ReadOnlyState<'w> = &'w World;

    fn describe(meta: &mut QueryMeta) {
        meta.wants_entity = true;
    }

    fn open<'w>(world: &'w World, _window: TickWindow) -> Self::State<'w> {
        world
    }

    fn open_read_only<'w>(world: &'w World) -> Self::ReadOnlyState<'w> {
        world
    }

    unsafe fn try_fetch<'w, 'a>(
        state: &'a Self::State<'w>,
        slot: Index,
    ) -> Option<Self::Item<'a>> {
        Some(state.entity_for_slot(slot))
    }

    unsafe fn try_fetch_read_only<'w, 'a>(
        state: &'a Self::ReadOnlyState<'w>,
        slot: Index,
    ) -> Option<Self::ReadOnlyItem<'a>> {
        Some(state.entity_for_slot(slot))
    }
}

/// A tuple of [`Fetch`] roles, or a single role.
///
/// # Safety
///
/// Same contract as [`Fetch`], lifted over tuples.
pub unsafe trait FetchBundle {
    /// Tuple of the roles' items.
    type Items<'a>;
    /// Tuple of the roles' read-only items.
    type ReadOnlyItems<'a>;
    /// Tuple of the roles' opened states.
    type State<'w>;
    /// Tuple of the roles' read-only states.
    type ReadOnlyState<'w>;

    /// Adds every role's tags to the query's signatures.
    fn describe(meta: &mut QueryMeta);

    /// Opens every role's state.
    fn open<'w>(world: &'w World, window: TickWindow) -> Self::State<'w>;

    /// Opens every role's read-only state.
    fn open_read_only<'w>(world: &'w World) -> Self::ReadOnlyState<'w>;

    /// Resolves every role for `slot`; `None` if any required component is
    /// absent.
    ///
    /// # Safety
    ///
    /// See [`Fetch::try_fetch`].
    unsafe fn try_fetch<'w, 'a>(state: &'a Self::State<'w>, slot: Index)
        -> Option<Self::Items<'a>>;

    /// Read-only variant of [`Self::try_fetch`].
    ///
    /// # Safety
    ///
    /// See [`Fetch::try_fetch_read_only`].
    unsafe fn try_fetch_read_only<'w, 'a>(
        state: &'a Self::ReadOnlyState<'w>,
        slot: Index,
    ) -> Option<Self::ReadOnlyItems<'a>>;
}

macro_rules! fetch_bundle {
    ($(($role:ident, $state:ident)),*) => {
        // SAFETY: Element impls uphold the contract; the tuple only
        // forwards.
        unsafe impl<$($role: Fetch),*> FetchBundle for ($($role,)*) {
            type Items<'a> = ($($role::Item<'a>,)*);
            type ReadOnlyItems<'a> = ($($role::ReadOnlyItem<'a>,)*);
            type State<'w> = ($($role::State<'w>,)*);
            type ReadOnlyState<'w> = ($($role::ReadOnlyState<'w>,)*);

            fn describe(meta: &mut QueryMeta) {
                $($role::describe(meta);)*
            }

            fn open<'w>(world: &'w World, window: TickWindow) -> Self::State<'w> {
                ($($role::open(world, window),)*)
            }

            fn open_read_only<'w>(world: &'w World) -> Self::ReadOnlyState<'w> {
                ($($role::open_read_only(world),)*)
            }

            unsafe fn try_fetch<'w, 'a>(
                state: &'a Self::State<'w>,
                slot: Index,
            ) -> Option<Self::Items<'a>> {
                let ($($state,)*) = state;
                Some(($(
                    // SAFETY: Forwarded to the caller.
                    match unsafe { $role::try_fetch($state, slot) } {
                        Some(item) => item,
                        None => return None,
                    },
                )*))
            }

            unsafe fn try_fetch_read_only<'w, 'a>(
                state: &'a Self::ReadOnlyState<'w>,
                slot: Index,
            ) -> Option<Self::ReadOnlyItems<'a>> {
                let ($($state,)*) = state;
                Some(($(
                    // SAFETY: Forwarded to the caller.
                    match unsafe { $role::try_fetch_read_only($state, slot) } {
                        Some(item) => item,
                        None => return None,
                    },
                )*))
            }
        }
    };
}

fetch_bundle! {(A, a)}
fetch_bundle! {(A, a), (B, b)}
fetch_bundle! {(A, a), (B, b), (C, c)}
fetch_bundle! {(A, a), (B, b), (C, c), (D, d)}
fetch_bundle! {(A, a), (B, b), (C, c), (D, d), (E, e)}
fetch_bundle! {(A, a), (B, b), (C, c), (D, d), (E, e), (F, f)}
fetch_bundle! {(A, a), (B, b), (C, c), (D, d), (E, e), (F, f), (G, g)}
fetch_bundle! {(A, a), (B, b), (C, c), (D, d), (E, e), (F, f), (G, g), (H, h)}
