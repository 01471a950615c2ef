//! Query filters: components that gate matching without being yielded.

use std::marker::PhantomData;

use crate::world::{Component, ComponentTag, Index, World};

use super::fetch::ReadState;
use super::QueryMeta;

/// Filter: the entity must have `T`, but `T` is not yielded ("backstage").
pub struct With<T>(PhantomData<T>);

/// Filter: the entity must *not* have `T`.
pub struct Without<T>(PhantomData<T>);

/// One query filter: signature contribution plus a per-slot membership test.
pub trait Filter {
    /// Borrow guard held for one iteration.
    type State<'w>;

    /// Adds this filter's tag to the query's signatures.
    fn describe(meta: &mut QueryMeta);

    /// Borrows the filter's array from the world.
    fn open<'w>(world: &'w World) -> Self::State<'w>;

    /// Whether `slot` passes the filter.
    fn matches(state: &Self::State<'_>, slot: Index) -> bool;
}

impl<T: Component> Filter for With<T> {
    type State<'w> = Option<ReadState<'w, T>>;

    fn describe(meta: &mut QueryMeta) {
        let tag = ComponentTag::of::<T>();
        meta.add_required(tag);
        meta.add_backstage(tag);
    }

    fn open<'w>(world: &'w World) -> Self::State<'w> {
        ReadState::open(world)
    }

    fn matches(state: &Self::State<'_>, slot: Index) -> bool {
        // A missing array means the required component exists nowhere.
        state.as_ref().map_or(false, |s| s.set().contains(slot))
    }
}

impl<T: Component> Filter for Without<T> {
    type State<'w> = Option<ReadState<'w, T>>;

    fn describe(meta: &mut QueryMeta) {
        meta.add_excluded(ComponentTag::of::<T>());
    }

    fn open<'w>(world: &'w World) -> Self::State<'w> {
        ReadState::open(world)
    }

    fn matches(state: &Self::State<'_>, slot: Index) -> bool {
        // An excluded array that does not exist is ignored.
        state.as_ref().map_or(true, |s| !s.set().contains(slot))
    }
}

/// A tuple of [`Filter`]s; the empty tuple passes everything.
pub trait FilterBundle {
    /// Tuple of the filters' opened states.
    type State<'w>;

    /// Adds every filter's tags to the query's signatures.
    fn describe(meta: &mut QueryMeta);

    /// Opens every filter's state.
    fn open<'w>(world: &'w World) -> Self::State<'w>;

    /// Whether `slot` passes every filter.
    fn matches(state: &Self::State<'_>, slot: Index) -> bool;
}

impl FilterBundle for () {
    type State<'w> = ();

    fn describe(_meta: &mut QueryMeta) {}

    fn open<'w>(_world: &'w World) -> Self::State<'w> {}

    fn matches(_state: &Self::State<'_>, _slot: Index) -> bool {
        true
    }
}

macro_rules! filter_bundle {
    ($(($filter:ident, $state:ident)),*) => {
        impl<$($filter: Filter),*> FilterBundle for ($($filter,)*) {
            type State<'w> = ($($filter::State<'w>,)*);

            fn describe(meta: &mut QueryMeta) {
                $($filter::describe(meta);)*
            }

            fn open<'w>(world: &'w World) -> Self::State<'w> {
                ($($filter::open(world),)*)
            }

            fn matches(state: &Self::State<'_>, slot: Index) -> bool {
                let ($($state,)*) = state;
                $($filter::matches($state, slot))&&*
            }
        }
    };
}

filter_bundle! {(A, a)}
filter_bundle! {(A, a), (B, b)}
filter_bundle! {(A, a), (B, b), (C, c)}
filter_bundle! {(A, a), (B, b), (C, c), (D, d)}
filter_bundle! {(A, a), (B, b), (C, c), (D, d), (E, e)}
filter_bundle! {(A, a), (B, b), (C, c), (D, d), (E, e), (F, f)}
filter_bundle! {(A, a), (B, b), (C, c), (D, d), (E, e), (F, f), (G, g)}
filter_bundle! {(A, a), (B, b), (C, c), (D, d), (E, e), (F, f), (G, g), (H, h)}
