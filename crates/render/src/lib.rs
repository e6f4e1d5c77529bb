//! Offscreen icon rendering.
//!
//! A render instances the subject into a transient group in front of a fixed
//! orthographic camera, isolates the group on a free visibility channel, draws
//! it once into a multisampled wgpu offscreen target and reads the pixels back. Everything the
//! render created is removed again before it returns.
//!
//! # Invariants
//! - The scene's node set and state hash are the same before and after every
//!   operation, successful or not.
//! - The original subject is never mutated; only its instanced copy is.
//! - The previously active target is bound again after drawing.

pub mod bounds;
pub mod camera;
pub mod compose;
pub mod config;
pub mod device;
pub mod draw;
pub mod error;
pub mod executor;
pub mod gpu;
pub mod host;
pub mod persist;
pub mod prefs;
pub mod service;
pub mod settings;
mod shaders;
pub mod teardown;

pub use bounds::subject_bounds;
pub use camera::{configure_camera, Camera, CameraPose};
pub use compose::{compose, IsolationToken, RenderGroup, VisibilityAssignment};
pub use config::{ConfigError, DecorationProfile, IconProfile};
pub use device::{Device, OffscreenTarget, TargetId};
pub use draw::DrawStats;
pub use error::{RenderError, RenderResult};
pub use executor::execute;
pub use gpu::GpuContext;
pub use host::RenderHost;
pub use persist::{AssetIndex, NoIndex, SidecarImporter, SpriteImportSettings, TextureImporter};
pub use prefs::Preferences;
pub use service::{render_and_persist, render_to_memory, IconRenderer};
pub use settings::{Decoration, RenderSettings};
pub use teardown::{RenderScope, TeardownReport};

pub fn crate_info() -> &'static str {
    "iconstage-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}
