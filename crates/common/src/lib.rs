//! Shared types used by every iconstage crate.
//!
//! # Invariants
//! - Types here carry no behavior beyond value arithmetic.
//! - Everything is `Copy` and serializable.

mod bounds;
mod types;

pub use bounds::Aabb;
pub use types::{
    Channel, ChannelError, ChannelMask, Color, EntityId, MeshHandle, SpriteHandle, Transform,
};
