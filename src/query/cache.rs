//! Memoized query plans, keyed by query hash and world version.
//!
//! A plan is a materialisation of a query's iteration driver, valid for
//! exactly one world version: any structural mutation bumps the version and
//! thereby invalidates every plan. Stale plans are not evicted eagerly;
//! they are overwritten on the next lookup. Published plan data is
//! immutable, so lookups hand out cheap `Arc` clones and iteration runs
//! without holding the cache lock.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::storage::pool::BasePlanParts;
use crate::world::Index;

use super::QueryHash;

/// Cached driver slots for `perform_with_signature`.
pub(crate) struct SignaturePlan {
    pub version: u64,
    /// Dense slots of the smallest required array, unfiltered.
    pub base: Vec<Index>,
}

/// Cached driver plus per-entity check lists for `perform`.
pub(crate) struct SparsePlan {
    pub version: u64,
    pub parts: BasePlanParts,
}

/// Cached fully filtered slot list for preloaded/parallel/view iteration.
pub(crate) struct SlotsPlan {
    pub version: u64,
    pub slots: Vec<Index>,
}

/// The three plan caches of a world.
#[derive(Default)]
pub(crate) struct QueryCaches {
    signature: Mutex<AHashMap<QueryHash, Arc<SignaturePlan>>>,
    sparse: Mutex<AHashMap<QueryHash, Arc<SparsePlan>>>,
    slots: Mutex<AHashMap<QueryHash, Arc<SlotsPlan>>>,
}

impl QueryCaches {
    pub fn signature_plan<F>(&self, hash: QueryHash, version: u64, compute: F) -> Arc<SignaturePlan>
    where
        F: FnOnce() -> Vec<Index>,
    {
        let mut cache = self.signature.lock();
        if let Some(plan) = cache.get(&hash) {
            if plan.version == version {
                return Arc::clone(plan);
            }
        }
        log::trace!("recomputing signature plan for {:?} at version {}", hash, version);
        let plan = Arc::new(SignaturePlan {
            version,
            base: compute(),
        });
        cache.insert(hash, Arc::clone(&plan));
        plan
    }

    pub fn sparse_plan<F>(&self, hash: QueryHash, version: u64, compute: F) -> Arc<SparsePlan>
    where
        F: FnOnce() -> BasePlanParts,
    {
        let mut cache = self.sparse.lock();
        if let Some(plan) = cache.get(&hash) {
            if plan.version == version {
                return Arc::clone(plan);
            }
        }
        log::trace!("recomputing sparse plan for {:?} at version {}", hash, version);
        let plan = Arc::new(SparsePlan {
            version,
            parts: compute(),
        });
        cache.insert(hash, Arc::clone(&plan));
        plan
    }

    pub fn slots_plan<F>(&self, hash: QueryHash, version: u64, compute: F) -> Arc<SlotsPlan>
    where
        F: FnOnce() -> Vec<Index>,
    {
        let mut cache = self.slots.lock();
        if let Some(plan) = cache.get(&hash) {
            if plan.version == version {
                return Arc::clone(plan);
            }
        }
        log::trace!("recomputing slots plan for {:?} at version {}", hash, version);
        let plan = Arc::new(SlotsPlan {
            version,
            slots: compute(),
        });
        cache.insert(hash, Arc::clone(&plan));
        plan
    }
}
