#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

//! # Cohort, a sparse-set ECS core
//!
//! This library provides the data core of an Entity-Component-System:
//! entities are `(slot, generation)` ids, components live in per-type
//! sparse sets (packed value arrays with a slot-to-dense redirection), and
//! queries iterate over entities matching a component signature.
//!
//! The three pillars:
//!
//! * **Storage**: [`SparseSet`] arrays collected in a pool, with a
//!   [`Signature`] bitmap per entity mirroring exactly which components it
//!   carries.
//! * **Queries**: [`Query`] values describe required, written, optional,
//!   backstage and excluded components; invocations reuse plans cached per
//!   world version and resolve typed accessors per matching entity.
//! * **Change tracking and groups**: every insertion and write is stamped
//!   with a [`Tick`] so consumers can ask "added/changed/removed since I
//!   last ran?", and owning groups keep matching entities packed in a
//!   contiguous prefix of their components' dense arrays.
//!
//! Scheduling, deferred command queues, resources and events are outer
//! layers: the world exposes per-query access signatures for a scheduler
//! to consult, and structural mutation is only possible through `&mut
//! World`, never from inside an iteration.
//!
//! ```
//! use cohort::prelude::*;
//!
//! struct Transform { x: f32 }
//! impl Component for Transform {}
//!
//! struct Gravity { pull: f32 }
//! impl Component for Gravity {}
//!
//! let mut world = World::new();
//! world
//!     .create_entity()
//!     .with(Transform { x: 0.0 })
//!     .with(Gravity { pull: 1.0 })
//!     .build();
//! world.create_entity().with(Transform { x: 5.0 }).build();
//!
//! let falling = Query::<(Write<Transform>, Read<Gravity>)>::new();
//! falling.perform(&world.context(), |(mut transform, gravity)| {
//!     transform.x += gravity.pull;
//! });
//! ```

pub mod bitset;
pub mod error;
pub mod group;
pub mod prelude;
pub mod query;
pub mod storage;
pub mod tick;
pub mod world;

mod cell;

pub use crate::bitset::{BitSet, Signature};
pub use crate::error::{Error, GroupAcquireError};
pub use crate::group::{GroupHandle, GroupSpec};
pub use crate::query::{
    EntityId, Mut, Opt, Query, QueryContext, QueryHash, QueryMeta, Read, With, Without, Write,
};
pub use crate::storage::{ComponentPool, SparseSet};
pub use crate::tick::{ChangeClock, ComponentTicks, Tick, TickWindow};
pub use crate::world::{
    Component, ComponentTag, CompRef, Entity, EntityBuilder, Generation, Index, World,
};
