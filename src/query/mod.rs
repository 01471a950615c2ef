//! Declarative, cached queries over the component pool.
//!
//! A query lists per-component *roles*: [`Read`], [`Write`], [`Opt`] and
//! [`EntityId`] are yielded to the caller; [`With`] and [`Without`] filter
//! without being yielded. Constructing a query computes four signatures
//! (required, read, write, excluded) and a hash; invoking it looks up or
//! rebuilds a plan for the current world version and walks the plan's
//! driver, resolving each role per matching entity.
//!
//! ```
//! use cohort::prelude::*;
//!
//! struct Position { x: f32 }
//! impl Component for Position {}
//! struct Velocity { x: f32 }
//! impl Component for Velocity {}
//!
//! let mut world = World::new();
//! world
//!     .create_entity()
//!     .with(Position { x: 0.0 })
//!     .with(Velocity { x: 1.0 })
//!     .build();
//!
//! let query = Query::<(Write<Position>, Read<Velocity>)>::new();
//! let ctx = world.context();
//! query.perform(&ctx, |(mut pos, vel)| {
//!     pos.x += vel.x;
//! });
//! ```

pub use self::fetch::{EntityId, Fetch, FetchBundle, Mut, Opt, Read, Write};
pub use self::filter::{Filter, FilterBundle, With, Without};
pub use self::iter::{ReadView, ReadViewIter, View, ViewIterMut};

pub(crate) mod cache;
mod fetch;
mod filter;
mod iter;
#[cfg(feature = "parallel")]
mod par;
#[cfg(test)]
mod tests;

use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use ahash::AHasher;

use crate::bitset::Signature;
use crate::tick::TickWindow;
use crate::world::{ComponentTag, World};

/// The signatures and flags a query is made of.
///
/// `required` drives matching; `read`/`write` additionally cover optional
/// roles and are the admission metadata a scheduler consults; `excluded`
/// components must be absent; `backstage` components are required but not
/// yielded.
#[derive(Clone, Debug, Default)]
pub struct QueryMeta {
    pub(crate) required: Signature,
    pub(crate) read: Signature,
    pub(crate) write: Signature,
    pub(crate) excluded: Signature,
    pub(crate) backstage: Signature,
    pub(crate) wants_entity: bool,
}

impl QueryMeta {
    pub(crate) fn add_required(&mut self, tag: ComponentTag) {
        self.required.insert(tag.index());
    }

    pub(crate) fn add_read(&mut self, tag: ComponentTag) {
        self.read.insert(tag.index());
    }

    pub(crate) fn add_write(&mut self, tag: ComponentTag) {
        self.write.insert(tag.index());
    }

    pub(crate) fn add_excluded(&mut self, tag: ComponentTag) {
        self.excluded.insert(tag.index());
    }

    pub(crate) fn add_backstage(&mut self, tag: ComponentTag) {
        self.backstage.insert(tag.index());
    }

    /// The signature an entity must be a superset of to match.
    pub fn required_signature(&self) -> &Signature {
        &self.required
    }

    /// Every component this query may read, including optional ones.
    pub fn read_signature(&self) -> &Signature {
        &self.read
    }

    /// Every component this query may write, including optional ones.
    pub fn write_signature(&self) -> &Signature {
        &self.write
    }

    /// Components that must be absent from matching entities.
    pub fn excluded_signature(&self) -> &Signature {
        &self.excluded
    }

    /// Required components that are not yielded to the callback.
    pub fn backstage_signature(&self) -> &Signature {
        &self.backstage
    }

    /// Whether the query yields entity ids.
    pub fn wants_entity(&self) -> bool {
        self.wants_entity
    }

    /// A query whose required and excluded signatures overlap can never
    /// match anything.
    pub(crate) fn is_contradictory(&self) -> bool {
        !self.required.is_disjoint(&self.excluded)
    }

    /// Whether two queries may run concurrently: neither writes a
    /// component the other reads or writes. This is the admission check a
    /// scheduler performs before dispatching systems in parallel.
    pub fn is_compatible(&self, other: &QueryMeta) -> bool {
        let touched = self.read.union(&self.write);
        let other_touched = other.read.union(&other.write);
        self.write.is_disjoint(&other_touched) && other.write.is_disjoint(&touched)
    }
}

/// Cache key derived from a query's `(required, excluded)` signature pair.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct QueryHash(u64);

impl QueryHash {
    fn of(meta: &QueryMeta) -> Self {
        let mut hasher = AHasher::default();
        meta.required.hash(&mut hasher);
        meta.excluded.hash(&mut hasher);
        QueryHash(hasher.finish())
    }
}

/// A declarative description of required, written, optional, backstage and
/// excluded components, with a cached iteration plan per world version.
///
/// `D` is a tuple of yielded roles, `F` an optional tuple of filters:
///
/// ```
/// # use cohort::prelude::*;
/// # struct A; impl Component for A {}
/// # struct B; impl Component for B {}
/// # struct C; impl Component for C {}
/// let query = Query::<(Read<A>, Opt<Read<B>>), (Without<C>,)>::new();
/// assert!(query.meta().excluded_signature().len() == 1);
/// ```
///
/// Queries are cheap to construct and carry no world reference; every
/// invocation takes a [`QueryContext`].
pub struct Query<D: FetchBundle, F: FilterBundle = ()> {
    meta: QueryMeta,
    hash: QueryHash,
    marker: PhantomData<fn() -> (D, F)>,
}

impl<D: FetchBundle, F: FilterBundle> Query<D, F> {
    /// Builds the query, computing its signatures and hash.
    pub fn new() -> Self {
        let mut meta = QueryMeta::default();
        D::describe(&mut meta);
        F::describe(&mut meta);
        let hash = QueryHash::of(&meta);
        Query {
            meta,
            hash,
            marker: PhantomData,
        }
    }

    /// The query's signatures and flags.
    pub fn meta(&self) -> &QueryMeta {
        &self.meta
    }

    /// The cache key of this query.
    pub fn hash(&self) -> QueryHash {
        self.hash
    }
}

impl<D: FetchBundle, F: FilterBundle> Default for Query<D, F> {
    fn default() -> Self {
        Query::new()
    }
}

/// Bundles the world handle and the tick snapshot for query invocations.
pub struct QueryContext<'w> {
    pub(crate) world: &'w World,
    /// The `(last_run, this_run)` window change detection compares against.
    pub window: TickWindow,
}

impl<'w> QueryContext<'w> {
    /// A context whose window spans everything up to the current tick.
    pub fn new(world: &'w World) -> Self {
        QueryContext {
            world,
            window: TickWindow::since_start(world.current_change_tick()),
        }
    }

    /// A context with an explicit per-system tick window.
    pub fn with_window(world: &'w World, window: TickWindow) -> Self {
        QueryContext { world, window }
    }

    /// The world this context reads from.
    pub fn world(&self) -> &'w World {
        self.world
    }
}
