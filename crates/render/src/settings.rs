use glam::{EulerRot, Quat, Vec2, Vec3};
use std::path::PathBuf;
use iconstage_common::{Color, EntityId, SpriteHandle};

use crate::error::RenderError;

pub const MIN_RESOLUTION: u32 = 128;
pub const MAX_RESOLUTION: u32 = 1024;
pub const DEFAULT_FILE_NAME: &str = "NewIcon";
pub const DEFAULT_FOLDER: &str = "Assets/GeneratedSprites";
pub const DEFAULT_MSAA_SAMPLES: u32 = 4;

/// A sprite layered behind or in front of the subject.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decoration {
    pub sprite: SpriteHandle,
    /// Uniform scale of the sprite quad.
    pub zoom: f32,
    /// Offset along camera right/up, in world units.
    pub offset: Vec2,
    pub tint_enabled: bool,
    pub tint_color: Color,
}

impl Decoration {
    pub fn new(sprite: SpriteHandle) -> Self {
        Self {
            sprite,
            zoom: 1.0,
            offset: Vec2::ZERO,
            tint_enabled: false,
            tint_color: Color::WHITE,
        }
    }

    /// Color the sprite is multiplied by.
    pub fn effective_tint(&self) -> Color {
        if self.tint_enabled {
            self.tint_color
        } else {
            Color::WHITE
        }
    }
}

/// Everything one render needs, as a plain value.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub subject: Option<EntityId>,
    /// Requested square output size; see [`RenderSettings::effective_resolution`].
    pub resolution: u32,
    pub transparent_background: bool,
    pub background_color: Color,
    /// Euler angles in degrees, applied Z, then X, then Y.
    pub rotation: Vec3,
    /// Orthographic half-height in world units.
    pub camera_zoom: f32,
    pub subject_scale: f32,
    /// Offset along camera right/up, in world units.
    pub subject_offset: Vec2,
    pub background: Option<Decoration>,
    pub frame: Option<Decoration>,
    pub file_name: String,
    pub folder: PathBuf,
    /// Multisample count per pixel. The device uses the highest count it
    /// supports up to this; 1 turns antialiasing off.
    pub msaa_samples: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            subject: None,
            resolution: 512,
            transparent_background: true,
            background_color: Color::WHITE,
            rotation: Vec3::ZERO,
            camera_zoom: 2.0,
            subject_scale: 1.0,
            subject_offset: Vec2::ZERO,
            background: None,
            frame: None,
            file_name: DEFAULT_FILE_NAME.into(),
            folder: PathBuf::from(DEFAULT_FOLDER),
            msaa_samples: DEFAULT_MSAA_SAMPLES,
        }
    }
}

impl RenderSettings {
    pub fn with_subject(mut self, subject: EntityId) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Resolution clamped to the supported range.
    pub fn effective_resolution(&self) -> u32 {
        self.resolution.clamp(MIN_RESOLUTION, MAX_RESOLUTION)
    }

    pub fn rotation_quat(&self) -> Quat {
        Quat::from_euler(
            EulerRot::YXZ,
            self.rotation.y.to_radians(),
            self.rotation.x.to_radians(),
            self.rotation.z.to_radians(),
        )
    }

    /// Reject values the pipeline cannot use.
    pub fn validate(&self) -> Result<(), RenderError> {
        positive("camera zoom", self.camera_zoom)?;
        positive("subject scale", self.subject_scale)?;
        if let Some(bg) = &self.background {
            positive("background zoom", bg.zoom)?;
        }
        if let Some(frame) = &self.frame {
            positive("frame zoom", frame.zoom)?;
        }
        if !self.rotation.is_finite() || !self.subject_offset.is_finite() {
            return Err(RenderError::invalid("rotation and offset must be finite"));
        }
        Ok(())
    }
}

fn positive(what: &str, value: f32) -> Result<(), RenderError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(RenderError::invalid(format!("{what} must be positive, got {value}")))
    }
}
