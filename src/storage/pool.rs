//! The collection of all component arrays plus per-entity signatures.

use ahash::AHashMap;

use crate::bitset::Signature;
use crate::cell::{Ref, RefMut, TrustCell};
use crate::storage::{downcast_array, downcast_array_mut, AnyArray, SparseSet};
use crate::tick::Tick;
use crate::world::{Component, ComponentTag, Index};

/// All component arrays, keyed by tag, plus the signature of every slot.
///
/// Arrays are type-erased behind [`AnyArray`] and wrapped in a `TrustCell`
/// so queries can borrow individual arrays (shared for reads, exclusive for
/// writes) while the pool itself is only shared. Structural mutation always
/// goes through `&mut self` and bypasses the cells entirely.
#[derive(Default)]
pub struct ComponentPool {
    arrays: AHashMap<ComponentTag, TrustCell<Box<dyn AnyArray>>>,
    signatures: Vec<Signature>,
}

/// The pieces of a sparse iteration plan: the driver's slots plus the tags
/// whose arrays must be consulted per entity.
#[derive(Debug, Default)]
pub(crate) struct BasePlanParts {
    /// Dense slots of the smallest required array, unfiltered.
    pub base: Vec<Index>,
    /// Remaining required components, checked per slot.
    pub others: Vec<ComponentTag>,
    /// Excluded components that exist with non-zero size.
    pub excluded: Vec<ComponentTag>,
}

impl ComponentPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the array for `T` if it does not exist yet.
    pub fn register<T: Component>(&mut self) {
        self.arrays
            .entry(ComponentTag::of::<T>())
            .or_insert_with(|| TrustCell::new(Box::new(SparseSet::<T>::new()) as Box<dyn AnyArray>));
    }

    /// Grows the signature table to cover `slot`.
    pub(crate) fn ensure_slot(&mut self, slot: Index) {
        if self.signatures.len() <= slot as usize {
            self.signatures
                .resize_with(slot as usize + 1, Signature::new);
        }
    }

    /// The signature of `slot`, if the slot has ever been seen.
    pub fn signature(&self, slot: Index) -> Option<&Signature> {
        self.signatures.get(slot as usize)
    }

    pub(crate) fn insert_tag(&mut self, slot: Index, tag: ComponentTag) {
        self.ensure_slot(slot);
        self.signatures[slot as usize].insert(tag.index());
    }

    pub(crate) fn remove_tag(&mut self, slot: Index, tag: ComponentTag) {
        if let Some(sig) = self.signatures.get_mut(slot as usize) {
            sig.remove(tag.index());
        }
    }

    pub(crate) fn clear_signature(&mut self, slot: Index) {
        if let Some(sig) = self.signatures.get_mut(slot as usize) {
            sig.clear();
        }
    }

    /// Inserts or overwrites `slot`'s component, registering the array on
    /// first use. Returns the replaced value on overwrite.
    pub fn insert<T: Component>(&mut self, slot: Index, value: T, tick: Tick) -> Option<T> {
        self.register::<T>();
        self.typed_mut::<T>()
            .expect("array registered above")
            .insert(slot, value, tick)
    }

    /// Removes `slot`'s component. No-op on absence.
    pub fn remove<T: Component>(&mut self, slot: Index, tick: Tick) -> Option<T> {
        self.typed_mut::<T>()?.remove(slot, tick)
    }

    /// Removes and drops `slot`'s component by tag.
    pub(crate) fn remove_erased(&mut self, tag: ComponentTag, slot: Index, tick: Tick) -> bool {
        match self.arrays.get_mut(&tag) {
            Some(cell) => cell.get_mut().remove_erased(slot, tick),
            None => false,
        }
    }

    /// Whether `slot` currently has a `tag` component.
    pub fn contains(&self, tag: ComponentTag, slot: Index) -> bool {
        self.signatures
            .get(slot as usize)
            .map_or(false, |sig| sig.contains(tag.index()))
    }

    /// The cell of `tag`'s array, if registered.
    pub(crate) fn cell(&self, tag: ComponentTag) -> Option<&TrustCell<Box<dyn AnyArray>>> {
        self.arrays.get(&tag)
    }

    /// Takes a shared borrow of `T`'s array.
    pub(crate) fn borrow_typed<T: Component>(&self) -> Option<Ref<'_, SparseSet<T>>> {
        let cell = self.cell(ComponentTag::of::<T>())?;
        Some(cell.borrow().map(|array| downcast_array::<T>(&**array)))
    }

    /// Takes an exclusive borrow of `T`'s array.
    pub(crate) fn borrow_typed_mut<T: Component>(&self) -> Option<RefMut<'_, SparseSet<T>>> {
        let cell = self.cell(ComponentTag::of::<T>())?;
        Some(
            cell.borrow_mut()
                .map(|array| downcast_array_mut::<T>(&mut **array)),
        )
    }

    /// Statically exclusive access to `T`'s array.
    pub(crate) fn typed_mut<T: Component>(&mut self) -> Option<&mut SparseSet<T>> {
        let cell = self.arrays.get_mut(&ComponentTag::of::<T>())?;
        Some(downcast_array_mut::<T>(&mut **cell.get_mut()))
    }

    /// Statically exclusive access to an erased array.
    pub(crate) fn array_mut(&mut self, tag: ComponentTag) -> Option<&mut (dyn AnyArray + 'static)> {
        self.arrays.get_mut(&tag).map(move |cell| &mut **cell.get_mut())
    }

    /// Splits the pool into its array map and the signature table, so group
    /// maintenance can permute arrays while reading signatures.
    pub(crate) fn arrays_split(
        &mut self,
    ) -> (
        &mut AHashMap<ComponentTag, TrustCell<Box<dyn AnyArray>>>,
        &[Signature],
    ) {
        (&mut self.arrays, &self.signatures)
    }

    /// Dense size of `tag`'s array, zero if unregistered.
    pub fn len_of(&self, tag: ComponentTag) -> usize {
        self.cell(tag).map_or(0, |cell| cell.borrow().len())
    }

    /// Signature-based per-slot predicate: does `slot` carry every `include`
    /// component and none of `exclude`?
    pub fn matches(&self, slot: Index, include: &Signature, exclude: &Signature) -> bool {
        match self.signatures.get(slot as usize) {
            Some(sig) => sig.is_superset_disjoint(include, exclude),
            None => include.is_empty(),
        }
    }

    /// Collects the required arrays sorted by ascending dense size.
    ///
    /// Returns `None` if a required array is missing or empty, in which case
    /// nothing can match.
    fn required_sorted(&self, include: &Signature) -> Option<Vec<(ComponentTag, usize)>> {
        let mut required = Vec::new();
        for bit in include.ones() {
            let tag = ComponentTag::from_index(bit);
            let len = self.len_of(tag);
            if len == 0 {
                return None;
            }
            required.push((tag, len));
        }
        required.sort_by_key(|&(_, len)| len);
        Some(required)
    }

    /// The driver slots for `include`: the dense slots of the smallest
    /// required array, without any filtering. Empty if nothing can match or
    /// no component is required.
    pub(crate) fn base(&self, include: &Signature) -> Vec<Index> {
        match self.required_sorted(include) {
            Some(required) => match required.first() {
                Some(&(driver, _)) => self
                    .cell(driver)
                    .expect("driver array exists")
                    .borrow()
                    .dense_slots()
                    .to_vec(),
                None => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    /// The driver slots plus the tags to check per entity during `perform`.
    pub(crate) fn base_and_others(
        &self,
        include: &Signature,
        exclude: &Signature,
    ) -> BasePlanParts {
        let required = match self.required_sorted(include) {
            Some(required) if !required.is_empty() => required,
            _ => return BasePlanParts::default(),
        };

        let (driver, _) = required[0];
        let base = self
            .cell(driver)
            .expect("driver array exists")
            .borrow()
            .dense_slots()
            .to_vec();
        let others = required[1..].iter().map(|&(tag, _)| tag).collect();
        let excluded = self.excluded_existing(exclude);

        BasePlanParts {
            base,
            others,
            excluded,
        }
    }

    /// The excluded tags whose arrays exist with non-zero size; the others
    /// cannot exclude anything and are ignored.
    pub(crate) fn excluded_existing(&self, exclude: &Signature) -> Vec<ComponentTag> {
        exclude
            .ones()
            .map(ComponentTag::from_index)
            .filter(|&tag| self.len_of(tag) > 0)
            .collect()
    }

    /// The fully materialised, filtered slot list for `(include, exclude)`.
    pub(crate) fn slots(&self, include: &Signature, exclude: &Signature) -> Vec<Index> {
        if include.is_empty() {
            return Vec::new();
        }
        self.base(include)
            .into_iter()
            .filter(|&slot| self.matches(slot, include, exclude))
            .collect()
    }
}
