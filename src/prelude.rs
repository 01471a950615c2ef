//! Prelude module
//!
//! Contains all of the most common traits and structures.

pub use crate::bitset::{BitSet, Signature};
pub use crate::group::GroupSpec;
pub use crate::query::{
    EntityId, Mut, Opt, Query, QueryContext, Read, With, Without, Write,
};
pub use crate::tick::{Tick, TickWindow};
pub use crate::world::{Component, Entity, World};
