//! The query iteration engine: plan lookup, per-entity filtering and role
//! resolution for every invocation mode.

use std::sync::Arc;

use crate::storage::pool::BasePlanParts;
use crate::world::{Index, World};

use super::cache::{SignaturePlan, SlotsPlan, SparsePlan};
use super::{FetchBundle, FilterBundle, Query, QueryContext};

impl<D: FetchBundle, F: FilterBundle> Query<D, F> {
    pub(crate) fn sparse_plan(&self, world: &World) -> Arc<SparsePlan> {
        world.caches().sparse_plan(self.hash, world.version(), || {
            if self.meta.is_contradictory() {
                return BasePlanParts::default();
            }
            if self.meta.required.is_empty() {
                if !self.meta.wants_entity {
                    return BasePlanParts::default();
                }
                log::warn!(
                    "query requires no concrete component; iterating every live entity"
                );
                // No concrete required component: fall back to every live
                // slot, with the excluded arrays checked per entity.
                return BasePlanParts {
                    base: world.live_slots(),
                    others: Vec::new(),
                    excluded: world.pool().excluded_existing(&self.meta.excluded),
                };
            }
            world
                .pool()
                .base_and_others(&self.meta.required, &self.meta.excluded)
        })
    }

    pub(crate) fn signature_plan(&self, world: &World) -> Arc<SignaturePlan> {
        world.caches().signature_plan(self.hash, world.version(), || {
            if self.meta.is_contradictory() {
                return Vec::new();
            }
            if self.meta.required.is_empty() {
                return if self.meta.wants_entity {
                    world.live_slots()
                } else {
                    Vec::new()
                };
            }
            world.pool().base(&self.meta.required)
        })
    }

    pub(crate) fn slots_plan(&self, world: &World) -> Arc<SlotsPlan> {
        world.caches().slots_plan(self.hash, world.version(), || {
            if self.meta.is_contradictory() {
                return Vec::new();
            }
            if self.meta.required.is_empty() {
                if !self.meta.wants_entity {
                    return Vec::new();
                }
                return world
                    .live_slots()
                    .into_iter()
                    .filter(|&slot| {
                        world
                            .pool()
                            .matches(slot, &self.meta.required, &self.meta.excluded)
                    })
                    .collect();
            }
            // An exactly matching group already keeps the answer packed.
            if let Some((slots, true)) = world
                .groups()
                .best_group(&self.meta.required, &self.meta.excluded, world.pool())
            {
                return slots;
            }
            world.pool().slots(&self.meta.required, &self.meta.excluded)
        })
    }

    /// Invokes `f` for every matching entity.
    ///
    /// The driver is the smallest required component array; for every slot
    /// it yields, the remaining required arrays are checked through the
    /// opened role states and the excluded arrays through the filter
    /// states. Iteration order is the driver's dense order at call start,
    /// and each matching entity is visited at most once.
    pub fn perform<CB>(&self, ctx: &QueryContext<'_>, mut f: CB)
    where
        CB: for<'a> FnMut(D::Items<'a>),
    {
        let world = ctx.world;
        let plan = self.sparse_plan(world);
        if plan.parts.base.is_empty() {
            return;
        }
        let state = D::open(world, ctx.window);
        // When the driver is the only required array and nothing is
        // excluded, membership in the driver already decides the match and
        // the filter states need not even be opened.
        let unfiltered = plan.parts.others.is_empty() && plan.parts.excluded.is_empty();
        let filters = if unfiltered {
            None
        } else {
            Some(F::open(world))
        };
        for &slot in &plan.parts.base {
            if let Some(filters) = &filters {
                if !F::matches(filters, slot) {
                    continue;
                }
            }
            // SAFETY: `state` outlives the item (the callback returns before
            // the next fetch), and each slot of the driver is resolved at
            // most once per pass.
            if let Some(items) = unsafe { D::try_fetch(&state, slot) } {
                f(items);
            }
        }
    }

    /// Like [`perform`](Self::perform), but the per-entity filter is a
    /// single fused superset-and-disjoint check of the entity's signature.
    pub fn perform_with_signature<CB>(&self, ctx: &QueryContext<'_>, mut f: CB)
    where
        CB: for<'a> FnMut(D::Items<'a>),
    {
        let world = ctx.world;
        let plan = self.signature_plan(world);
        if plan.base.is_empty() {
            return;
        }
        let state = D::open(world, ctx.window);
        for &slot in &plan.base {
            if !world
                .pool()
                .matches(slot, &self.meta.required, &self.meta.excluded)
            {
                continue;
            }
            // SAFETY: As in `perform`.
            if let Some(items) = unsafe { D::try_fetch(&state, slot) } {
                f(items);
            }
        }
    }

    /// Invokes `f` for every matching entity of the fully materialised
    /// (pre-filtered) slot list; no per-entity filtering remains.
    pub fn preloaded<CB>(&self, ctx: &QueryContext<'_>, mut f: CB)
    where
        CB: for<'a> FnMut(D::Items<'a>),
    {
        let world = ctx.world;
        let plan = self.slots_plan(world);
        if plan.slots.is_empty() {
            return;
        }
        let state = D::open(world, ctx.window);
        for &slot in &plan.slots {
            // SAFETY: As in `perform`.
            if let Some(items) = unsafe { D::try_fetch(&state, slot) } {
                f(items);
            }
        }
    }

    /// Invokes `f` for every unordered pair of distinct matching entities.
    pub fn combinations<CB>(&self, ctx: &QueryContext<'_>, mut f: CB)
    where
        CB: for<'a> FnMut(D::Items<'a>, D::Items<'a>),
    {
        let world = ctx.world;
        let plan = self.slots_plan(world);
        if plan.slots.len() < 2 {
            return;
        }
        let state = D::open(world, ctx.window);
        for i in 0..plan.slots.len() {
            for j in (i + 1)..plan.slots.len() {
                // SAFETY: The slot list contains each slot once, so the two
                // resolutions touch distinct dense elements even for
                // writable roles.
                let pair = unsafe {
                    match (
                        D::try_fetch(&state, plan.slots[i]),
                        D::try_fetch(&state, plan.slots[j]),
                    ) {
                        (Some(a), Some(b)) => Some((a, b)),
                        _ => None,
                    }
                };
                if let Some((a, b)) = pair {
                    f(a, b);
                }
            }
        }
    }

    /// Resolves the first matching entity read-only and passes it to `f`.
    /// Returns `None` if nothing matches.
    pub fn fetch_one<R, CB>(&self, ctx: &QueryContext<'_>, f: CB) -> Option<R>
    where
        CB: for<'a> FnOnce(D::ReadOnlyItems<'a>) -> R,
    {
        let world = ctx.world;
        let plan = self.slots_plan(world);
        let &slot = plan.slots.first()?;
        let state = D::open_read_only(world);
        // SAFETY: Single resolution; `state` lives past the call to `f`.
        let items = unsafe { D::try_fetch_read_only(&state, slot) }?;
        Some(f(items))
    }

    /// Materialises the matching entities into a restartable read-only
    /// sequence. Roles declared `Write` resolve to plain references and do
    /// not mark change ticks.
    pub fn fetch_all<'w>(&self, ctx: &QueryContext<'w>) -> ReadView<'w, D> {
        let world = ctx.world;
        let plan = self.slots_plan(world);
        ReadView {
            state: D::open_read_only(world),
            plan,
        }
    }

    /// Materialises the matching entities into a restartable writable
    /// sequence.
    pub fn iter_all<'w>(&self, ctx: &QueryContext<'w>) -> View<'w, D> {
        let world = ctx.world;
        let plan = self.slots_plan(world);
        View {
            state: D::open(world, ctx.window),
            plan,
        }
    }
}

/// A materialised, read-only sequence of query results.
///
/// Restartable: [`iter`](ReadView::iter) may be called any number of times.
pub struct ReadView<'w, D: FetchBundle> {
    state: D::ReadOnlyState<'w>,
    plan: Arc<SlotsPlan>,
}

impl<'w, D: FetchBundle> ReadView<'w, D> {
    /// Number of matching entities.
    pub fn len(&self) -> usize {
        self.plan.slots.len()
    }

    /// Whether nothing matched.
    pub fn is_empty(&self) -> bool {
        self.plan.slots.is_empty()
    }

    /// Iterates the sequence from the start.
    pub fn iter(&self) -> ReadViewIter<'_, 'w, D> {
        ReadViewIter {
            state: &self.state,
            slots: &self.plan.slots,
            pos: 0,
        }
    }
}

/// Iterator over a [`ReadView`].
pub struct ReadViewIter<'v, 'w, D: FetchBundle> {
    state: &'v D::ReadOnlyState<'w>,
    slots: &'v [Index],
    pos: usize,
}

impl<'v, 'w, D: FetchBundle> Iterator for ReadViewIter<'v, 'w, D> {
    type Item = D::ReadOnlyItems<'v>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.slots.len() {
            let slot = self.slots[self.pos];
            self.pos += 1;
            // SAFETY: The state is borrowed from the view for `'v`, which
            // outlives every yielded item.
            if let Some(items) = unsafe { D::try_fetch_read_only(self.state, slot) } {
                return Some(items);
            }
        }
        None
    }
}

/// A materialised, writable sequence of query results.
pub struct View<'w, D: FetchBundle> {
    state: D::State<'w>,
    plan: Arc<SlotsPlan>,
}

impl<'w, D: FetchBundle> View<'w, D> {
    /// Number of matching entities.
    pub fn len(&self) -> usize {
        self.plan.slots.len()
    }

    /// Whether nothing matched.
    pub fn is_empty(&self) -> bool {
        self.plan.slots.is_empty()
    }

    /// Iterates the sequence from the start with writable items.
    pub fn iter_mut(&mut self) -> ViewIterMut<'_, 'w, D> {
        ViewIterMut {
            state: &self.state,
            slots: &self.plan.slots,
            pos: 0,
        }
    }
}

/// Iterator over a [`View`].
pub struct ViewIterMut<'v, 'w, D: FetchBundle> {
    state: &'v D::State<'w>,
    slots: &'v [Index],
    pos: usize,
}

impl<'v, 'w, D: FetchBundle> Iterator for ViewIterMut<'v, 'w, D> {
    type Item = D::Items<'v>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.slots.len() {
            let slot = self.slots[self.pos];
            self.pos += 1;
            // SAFETY: Slots in the plan are unique, so writable items
            // yielded across calls never alias; the state outlives `'v`.
            if let Some(items) = unsafe { D::try_fetch(self.state, slot) } {
                return Some(items);
            }
        }
        None
    }
}
