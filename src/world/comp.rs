use std::any::TypeId;
use std::sync::atomic::{AtomicU32, Ordering};

use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

/// Abstract component type. Doesn't have to be `Copy` or even `Clone`.
///
/// Components are plain values stored in separate dense collections for
/// maximum cache efficiency; attaching one to an entity associates the value
/// with that entity's slot.
///
/// ## Examples
///
/// ```
/// use cohort::Component;
///
/// pub struct Position {
///     pub x: f32,
///     pub y: f32,
/// }
///
/// impl Component for Position {}
/// ```
pub trait Component: Send + Sync + 'static {}

/// Identifies a component type for the lifetime of the process.
///
/// Tags are handed out by a global atomic counter, one per type, in the
/// order types are first used. The raw value doubles as the component's bit
/// index in [`Signature`](crate::Signature)s.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ComponentTag(u32);

static NEXT_TAG: AtomicU32 = AtomicU32::new(0);

static TAG_TABLE: Lazy<RwLock<AHashMap<TypeId, ComponentTag>>> =
    Lazy::new(|| RwLock::new(AHashMap::new()));

impl ComponentTag {
    /// Returns the tag of `T`, assigning one on first use.
    pub fn of<T: Component>() -> Self {
        let key = TypeId::of::<T>();
        if let Some(&tag) = TAG_TABLE.read().get(&key) {
            return tag;
        }
        let mut table = TAG_TABLE.write();
        *table
            .entry(key)
            .or_insert_with(|| ComponentTag(NEXT_TAG.fetch_add(1, Ordering::Relaxed)))
    }

    /// Creates a tag from its raw value.
    pub(crate) fn from_index(index: usize) -> Self {
        ComponentTag(index as u32)
    }

    /// The tag's bit index in signatures.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    impl Component for A {}

    struct B;
    impl Component for B {}

    #[test]
    fn tags_are_stable_and_distinct() {
        let a1 = ComponentTag::of::<A>();
        let a2 = ComponentTag::of::<A>();
        let b = ComponentTag::of::<B>();

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_eq!(ComponentTag::from_index(a1.index()), a1);
    }
}
