//! Groups: live registrations that keep matching entities packed in a
//! contiguous prefix of their components' dense arrays.
//!
//! An *owning* group controls the dense ordering of its owned components:
//! after a [`rebuild`](Group::rebuild) the first `size` positions of every
//! owned array hold exactly the matching entities, in the same permutation,
//! so iteration over the group is a straight walk of a dense prefix with no
//! per-entity checks at all. A *non-owning* group keeps a private packed
//! slot list instead and never reorders component storage.
//!
//! A component's dense order can have at most one owner; the registry
//! tracks reserved tags in a world-wide signature and acquisition fails
//! with [`GroupAcquireError`] on conflict.


use crate::bitset::Signature;
use crate::error::GroupAcquireError;
use crate::storage::{ComponentPool, NOT_FOUND};
use crate::world::{Component, ComponentTag, Index};

/// Declarative description of a group: owned, backstage and excluded
/// components.
///
/// ```
/// # use cohort::prelude::*;
/// # struct T; impl Component for T {}
/// # struct G; impl Component for G {}
/// # struct F; impl Component for F {}
/// let spec = GroupSpec::new().own::<T>().own::<G>().without::<F>();
/// ```
#[must_use]
pub struct GroupSpec {
    owned: Vec<ComponentTag>,
    backstage: Vec<ComponentTag>,
    excluded: Vec<ComponentTag>,
    registrars: Vec<fn(&mut ComponentPool)>,
    owning: bool,
}

impl GroupSpec {
    /// Starts an (owning) group description.
    pub fn new() -> Self {
        GroupSpec {
            owned: Vec::new(),
            backstage: Vec::new(),
            excluded: Vec::new(),
            registrars: Vec::new(),
            owning: true,
        }
    }

    /// Adds `T` to the owned components, whose dense order the group will
    /// control.
    pub fn own<T: Component>(mut self) -> Self {
        self.owned.push(ComponentTag::of::<T>());
        self.registrars.push(ComponentPool::register::<T>);
        self
    }

    /// Requires `T` for membership without owning its order.
    pub fn with<T: Component>(mut self) -> Self {
        self.backstage.push(ComponentTag::of::<T>());
        self.registrars.push(ComponentPool::register::<T>);
        self
    }

    /// Excludes entities that have `T`.
    pub fn without<T: Component>(mut self) -> Self {
        self.excluded.push(ComponentTag::of::<T>());
        self
    }

    /// Makes the group non-owning: it keeps a private packed list and does
    /// not reorder any component storage.
    pub fn non_owning(mut self) -> Self {
        self.owning = false;
        self
    }
}

impl Default for GroupSpec {
    fn default() -> Self {
        GroupSpec::new()
    }
}

/// Identifies an acquired group for later removal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GroupHandle(usize);

enum GroupKind {
    Owning {
        /// The owned array whose dense order drives the pack; re-chosen at
        /// every rebuild as the smallest owned array.
        primary: ComponentTag,
    },
    NonOwning {
        packed: Vec<Index>,
        sparse: Vec<i32>,
    },
}

struct Group {
    include: Signature,
    exclude: Signature,
    /// The union of include and exclude: the tags whose mutations concern this group.
    full: Signature,
    owned: Vec<ComponentTag>,
    kind: GroupKind,
    size: usize,
}

fn packed_index(sparse: &[i32], slot: Index) -> i32 {
    sparse.get(slot as usize).copied().unwrap_or(NOT_FOUND)
}

fn packed_insert(packed: &mut Vec<Index>, sparse: &mut Vec<i32>, slot: Index) {
    if packed_index(sparse, slot) != NOT_FOUND {
        return;
    }
    if sparse.len() <= slot as usize {
        sparse.resize(slot as usize + 1, NOT_FOUND);
    }
    sparse[slot as usize] = packed.len() as i32;
    packed.push(slot);
}

fn packed_remove(packed: &mut Vec<Index>, sparse: &mut Vec<i32>, slot: Index) {
    let idx = packed_index(sparse, slot);
    if idx == NOT_FOUND {
        return;
    }
    let idx = idx as usize;
    let last = packed.len() - 1;
    if idx != last {
        packed.swap(idx, last);
        sparse[packed[idx] as usize] = idx as i32;
    }
    packed.pop();
    sparse[slot as usize] = NOT_FOUND;
}

impl Group {
    /// The currently packed slots, in pack order.
    fn slots(&self, pool: &ComponentPool) -> Vec<Index> {
        match &self.kind {
            GroupKind::Owning { primary } => pool
                .cell(*primary)
                .map_or_else(Vec::new, |cell| {
                    cell.borrow().dense_slots()[..self.size].to_vec()
                }),
            GroupKind::NonOwning { packed, .. } => packed.clone(),
        }
    }

    /// Recomputes the pack from scratch.
    ///
    /// For owning groups: the smallest owned array becomes the primary and
    /// is partitioned in one pass; every other owned array is then permuted
    /// to mirror the primary's prefix, so all owned arrays share one
    /// permutation over `[0, size)`.
    fn rebuild(&mut self, pool: &mut ComponentPool) {
        match &mut self.kind {
            GroupKind::Owning { primary } => {
                let (arrays, signatures) = pool.arrays_split();
                let smallest = self
                    .owned
                    .iter()
                    .copied()
                    .min_by_key(|tag| arrays.get(tag).map_or(0, |cell| cell.borrow().len()))
                    .expect("an owning group owns at least one component");
                *primary = smallest;

                let size = match arrays.get_mut(&smallest) {
                    Some(cell) => {
                        cell.get_mut()
                            .partition_by_signature(signatures, &self.include, &self.exclude)
                    }
                    None => 0,
                };
                self.size = size;
                if size == 0 {
                    return;
                }

                let prefix: Vec<Index> = arrays
                    .get(&smallest)
                    .expect("primary array exists")
                    .borrow()
                    .dense_slots()[..size]
                    .to_vec();
                for &tag in self.owned.iter().filter(|&&tag| tag != smallest) {
                    let arr = arrays
                        .get_mut(&tag)
                        .expect("owned array registered at acquisition")
                        .get_mut();
                    for (target, &slot) in prefix.iter().enumerate() {
                        let cur = arr.sparse_index(slot);
                        debug_assert!(
                            cur != NOT_FOUND,
                            "matching entity missing from owned array"
                        );
                        arr.swap_dense(cur as usize, target);
                    }
                }
                log::trace!("rebuilt owning group {:?}: {} packed", self.include, size);
            }
            GroupKind::NonOwning { packed, sparse } => {
                packed.clear();
                for entry in sparse.iter_mut() {
                    *entry = NOT_FOUND;
                }
                let driver = self
                    .include
                    .ones()
                    .map(ComponentTag::from_index)
                    .min_by_key(|&tag| pool.len_of(tag));
                let driver_slots = match driver {
                    Some(tag) => pool
                        .cell(tag)
                        .map_or_else(Vec::new, |cell| cell.borrow().dense_slots().to_vec()),
                    None => Vec::new(),
                };
                for slot in driver_slots {
                    if pool.matches(slot, &self.include, &self.exclude) {
                        packed_insert(packed, sparse, slot);
                    }
                }
                self.size = packed.len();
            }
        }
    }

    /// Swaps `slot`'s element to `target` in every owned array.
    fn swap_across(owned: &[ComponentTag], slot: Index, target: usize, pool: &mut ComponentPool) {
        for &tag in owned {
            if let Some(arr) = pool.array_mut(tag) {
                let cur = arr.sparse_index(slot);
                debug_assert!(
                    cur != NOT_FOUND,
                    "entity missing from owned array during group maintenance"
                );
                if cur != NOT_FOUND {
                    arr.swap_dense(cur as usize, target);
                }
            }
        }
    }

    /// Reacts to `tag` having been added to `slot` (signature already
    /// updated).
    fn component_added(&mut self, tag: ComponentTag, slot: Index, pool: &mut ComponentPool) {
        if !self.full.contains(tag.index()) {
            return;
        }
        let now_matches = pool.matches(slot, &self.include, &self.exclude);
        match &mut self.kind {
            GroupKind::Owning { primary } => {
                let primary = *primary;
                let pos = pool
                    .cell(primary)
                    .map_or(NOT_FOUND, |cell| cell.borrow().sparse_index(slot));
                let inside = pos != NOT_FOUND && (pos as usize) < self.size;
                if self.exclude.contains(tag.index()) {
                    // A newly excluded member leaves through the prefix edge.
                    if inside {
                        Self::swap_across(&self.owned, slot, self.size - 1, pool);
                        self.size -= 1;
                    }
                } else if now_matches && !inside {
                    Self::swap_across(&self.owned, slot, self.size, pool);
                    self.size += 1;
                }
            }
            GroupKind::NonOwning { packed, sparse } => {
                if self.exclude.contains(tag.index()) {
                    packed_remove(packed, sparse, slot);
                } else if now_matches {
                    packed_insert(packed, sparse, slot);
                }
                self.size = packed.len();
            }
        }
    }

    /// Reacts to `tag` being removed from `slot`; runs before the removal
    /// touches storage or the signature.
    fn component_will_be_removed(
        &mut self,
        tag: ComponentTag,
        slot: Index,
        pool: &mut ComponentPool,
    ) {
        if !self.full.contains(tag.index()) {
            return;
        }
        let mut after = pool.signature(slot).cloned().unwrap_or_default();
        after.remove(tag.index());
        let matches_after = after.is_superset_disjoint(&self.include, &self.exclude);

        match &mut self.kind {
            GroupKind::Owning { primary } => {
                let primary = *primary;
                let pos = pool
                    .cell(primary)
                    .map_or(NOT_FOUND, |cell| cell.borrow().sparse_index(slot));
                let inside = pos != NOT_FOUND && (pos as usize) < self.size;
                if self.include.contains(tag.index()) {
                    if inside {
                        Self::swap_across(&self.owned, slot, self.size - 1, pool);
                        self.size -= 1;
                    }
                } else if self.exclude.contains(tag.index()) && matches_after && !inside {
                    // Losing the excluded tag makes the entity eligible.
                    Self::swap_across(&self.owned, slot, self.size, pool);
                    self.size += 1;
                }
            }
            GroupKind::NonOwning { packed, sparse } => {
                if self.include.contains(tag.index()) {
                    packed_remove(packed, sparse, slot);
                } else if self.exclude.contains(tag.index()) && matches_after {
                    packed_insert(packed, sparse, slot);
                }
                self.size = packed.len();
            }
        }
    }
}

/// All acquired groups plus the world-wide reservation of owned tags.
#[derive(Default)]
pub(crate) struct GroupRegistry {
    groups: Vec<Option<Group>>,
    owned_tags: Signature,
}

impl GroupRegistry {
    /// Acquires a group: reserves owned tags, registers arrays, performs
    /// the initial rebuild.
    pub fn acquire(
        &mut self,
        spec: GroupSpec,
        pool: &mut ComponentPool,
    ) -> Result<GroupHandle, GroupAcquireError> {
        assert!(
            !spec.owned.is_empty() || !spec.backstage.is_empty(),
            "a group must track at least one component"
        );
        if spec.owning {
            assert!(
                !spec.owned.is_empty(),
                "an owning group must own at least one component"
            );
            for &tag in &spec.owned {
                if self.owned_tags.contains(tag.index()) {
                    return Err(GroupAcquireError { tag });
                }
            }
        }

        let mut include = Signature::new();
        for &tag in spec.owned.iter().chain(&spec.backstage) {
            include.insert(tag.index());
        }
        let mut exclude = Signature::new();
        for &tag in &spec.excluded {
            exclude.insert(tag.index());
        }
        let full = include.union(&exclude);

        if spec.owning {
            for &tag in &spec.owned {
                self.owned_tags.insert(tag.index());
            }
        }
        for registrar in &spec.registrars {
            registrar(pool);
        }

        let kind = if spec.owning {
            GroupKind::Owning {
                primary: spec.owned[0],
            }
        } else {
            GroupKind::NonOwning {
                packed: Vec::new(),
                sparse: Vec::new(),
            }
        };
        let mut group = Group {
            include,
            exclude,
            full,
            owned: spec.owned,
            kind,
            size: 0,
        };
        group.rebuild(pool);
        log::debug!(
            "acquired {} group {:?} / without {:?} ({} packed)",
            if spec.owning { "owning" } else { "non-owning" },
            group.include,
            group.exclude,
            group.size
        );

        let handle = match self.groups.iter().position(Option::is_none) {
            Some(index) => {
                self.groups[index] = Some(group);
                GroupHandle(index)
            }
            None => {
                self.groups.push(Some(group));
                GroupHandle(self.groups.len() - 1)
            }
        };
        Ok(handle)
    }

    /// Releases a group, freeing its owned tags. Returns `false` if the
    /// handle was already released.
    pub fn release(&mut self, handle: GroupHandle) -> bool {
        let group = match self.groups.get_mut(handle.0).and_then(|slot| slot.take()) {
            Some(group) => group,
            None => return false,
        };
        if matches!(group.kind, GroupKind::Owning { .. }) {
            for &tag in &group.owned {
                self.owned_tags.remove(tag.index());
            }
        }
        log::debug!("released group {:?}", group.include);
        true
    }

    pub fn on_component_added(&mut self, tag: ComponentTag, slot: Index, pool: &mut ComponentPool) {
        for group in self.groups.iter_mut().flatten() {
            group.component_added(tag, slot, pool);
        }
    }

    pub fn on_will_remove_component(
        &mut self,
        tag: ComponentTag,
        slot: Index,
        pool: &mut ComponentPool,
    ) {
        for group in self.groups.iter_mut().flatten() {
            group.component_will_be_removed(tag, slot, pool);
        }
    }

    fn find(&self, include: &Signature, exclude: &Signature) -> Option<&Group> {
        self.groups
            .iter()
            .flatten()
            .find(|group| group.include == *include && group.exclude == *exclude)
    }

    /// Packed size of the group matching `(include, exclude)` exactly.
    pub fn size_of(&self, include: &Signature, exclude: &Signature) -> Option<usize> {
        self.find(include, exclude).map(|group| group.size)
    }

    /// Packed slots of the group matching `(include, exclude)` exactly.
    pub fn slots_of(
        &self,
        include: &Signature,
        exclude: &Signature,
        pool: &ComponentPool,
    ) -> Option<Vec<Index>> {
        self.find(include, exclude).map(|group| group.slots(pool))
    }

    /// The best candidate group for a query: an exact match if one exists,
    /// otherwise the smallest group whose packed set is a superset of the
    /// query's matches. The flag reports exactness.
    pub fn best_group(
        &self,
        required: &Signature,
        excluded: &Signature,
        pool: &ComponentPool,
    ) -> Option<(Vec<Index>, bool)> {
        let mut candidate: Option<&Group> = None;
        for group in self.groups.iter().flatten() {
            if group.include == *required && group.exclude == *excluded {
                return Some((group.slots(pool), true));
            }
            if group.include.is_subset(required) && group.exclude.is_subset(excluded) {
                let better = candidate.map_or(true, |best| group.size < best.size);
                if better {
                    candidate = Some(group);
                }
            }
        }
        candidate.map(|group| (group.slots(pool), false))
    }
}
