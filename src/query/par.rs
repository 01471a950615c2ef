//! Parallel query iteration, sharding the materialised slot list across
//! rayon workers.

use rayon::prelude::*;

use super::{FetchBundle, FilterBundle, Query, QueryContext};

/// Shares an opened fetch state between worker threads.
///
/// The state itself is only read; mutation flows through the dense values'
/// alias cells and the atomic tick cells.
struct SharedState<'a, S>(&'a S);

impl<'a, S> Clone for SharedState<'a, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, S> Copy for SharedState<'a, S> {}

// SAFETY: Workers receive disjoint slot chunks, so any two resolutions of
// writable roles touch distinct dense elements; change-tick stamping is
// atomic. The borrow guards inside the state are created and dropped on the
// calling thread only.
unsafe impl<'a, S> Send for SharedState<'a, S> {}
unsafe impl<'a, S> Sync for SharedState<'a, S> {}

impl<D: FetchBundle, F: FilterBundle> Query<D, F> {
    /// Invokes `f` for every matching entity, sharded into approximately
    /// one chunk per worker thread.
    ///
    /// The set of visited entities equals the sequential
    /// [`preloaded`](Self::preloaded) pass; the visit order across chunks
    /// is unspecified. With a single worker the pass degenerates to the
    /// sequential path.
    pub fn parallel<CB>(&self, ctx: &QueryContext<'_>, f: CB)
    where
        CB: for<'a> Fn(D::Items<'a>) + Send + Sync,
    {
        let world = ctx.world;
        let plan = self.slots_plan(world);
        if plan.slots.is_empty() {
            return;
        }

        let chunk_count = rayon::current_num_threads().max(1);
        let chunk_size = (plan.slots.len() + chunk_count - 1) / chunk_count;

        let state = D::open(world, ctx.window);
        let shared = SharedState(&state);
        plan.slots.par_chunks(chunk_size).for_each(move |chunk| {
            let shared = shared;
            let SharedState(state) = shared;
            for &slot in chunk {
                // SAFETY: Chunks are disjoint and each slot appears once in
                // the plan, so no two live items alias; the state outlives
                // the parallel scope.
                if let Some(items) = unsafe { D::try_fetch(state, slot) } {
                    f(items);
                }
            }
        });
    }
}
