//! Scene Kernel: the authoritative node hierarchy renders are composed into.
//!
//! # Invariants
//! - All state mutations flow through explicit operations and are logged.
//! - A node's parent, when set, always exists and lists the node as a child.
//! - Iteration order is deterministic (insertion order of roots/children).

pub mod scene;

pub use scene::{Drawable, Node, Scene, SceneError, SceneEvent, Shape};
