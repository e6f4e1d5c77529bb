use glam::{Mat4, Quat, Vec3};
use iconstage_common::{ChannelMask, Color, EntityId, Transform};
use iconstage_kernel::{Scene, SceneError};

use crate::compose::IsolationToken;
use crate::device::TargetId;
use crate::settings::RenderSettings;

/// Where the icon camera always sits. It looks down +Z and never orbits.
pub const CAMERA_POSITION: Vec3 = Vec3::new(0.0, 0.0, -10.0);
pub const NEAR_PLANE: f32 = 0.01;
pub const FAR_PLANE: f32 = 1000.0;

/// World-space position and orientation basis of a camera node.
///
/// Left-handed: forward is +Z, right is +X, up is +Y for an unrotated camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

impl CameraPose {
    pub fn from_world(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            forward: rotation * Vec3::Z,
            right: rotation * Vec3::X,
            up: rotation * Vec3::Y,
        }
    }

    /// The icon camera's pose: [`CAMERA_POSITION`], unrotated.
    pub fn fixed() -> Self {
        Self::from_world(CAMERA_POSITION, Quat::IDENTITY)
    }

    /// Pose of a camera node as currently placed in the scene.
    pub fn of_node(scene: &Scene, node: EntityId) -> Result<Self, SceneError> {
        let (_, rotation, position) = scene.world_matrix(node)?.to_scale_rotation_translation();
        Ok(Self::from_world(position, rotation))
    }
}

/// Orthographic camera drawing one channel mask into one target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Orthographic half-height in world units.
    pub half_height: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// Solid fill applied before drawing.
    pub clear_color: Color,
    pub culling_mask: ChannelMask,
    pub target: Option<TargetId>,
}

impl Camera {
    pub fn projection_matrix(&self) -> Mat4 {
        let hh = self.half_height;
        let hw = hh * self.aspect;
        Mat4::orthographic_lh(-hw, hw, -hh, hh, self.near, self.far)
    }

    /// World → clip transform for a camera node with world matrix `camera_world`.
    pub fn view_projection(&self, camera_world: &Mat4) -> Mat4 {
        self.projection_matrix() * camera_world.inverse()
    }
}

/// Configure the icon camera: fixed pose on `node`, orthographic projection
/// sized by the camera zoom, clear policy from the settings, visibility
/// restricted to the isolation channel, output into `target`.
pub fn configure_camera(
    scene: &mut Scene,
    node: EntityId,
    settings: &RenderSettings,
    token: &IsolationToken,
    target: TargetId,
) -> Result<Camera, SceneError> {
    let pose = CameraPose::fixed();
    scene.set_transform(node, Transform::from_position(pose.position))?;
    let clear_color = if settings.transparent_background {
        Color::CLEAR
    } else {
        settings.background_color
    };
    let camera = Camera {
        half_height: settings.camera_zoom,
        aspect: 1.0,
        near: NEAR_PLANE,
        far: FAR_PLANE,
        clear_color,
        culling_mask: token.mask(),
        target: Some(target),
    };
    tracing::debug!(half_height = camera.half_height, ?clear_color, "configured icon camera");
    Ok(camera)
}

#[cfg(test)]
mod tests {
    use super::*;
    use iconstage_common::Channel;

    fn setup(settings: &RenderSettings) -> (Scene, EntityId, Camera, IsolationToken) {
        let mut scene = Scene::new();
        let node = scene.spawn("IconCamera", Transform::default());
        let token = IsolationToken::new(Channel::new(31).unwrap());
        let cam = configure_camera(&mut scene, node, settings, &token, TargetId(1)).unwrap();
        (scene, node, cam, token)
    }

    #[test]
    fn transparent_background_clears_to_zero_alpha() {
        let (_, _, cam, _) = setup(&RenderSettings::default());
        assert_eq!(cam.clear_color, Color::CLEAR);
    }

    #[test]
    fn solid_background_uses_configured_color() {
        let settings = RenderSettings {
            transparent_background: false,
            background_color: Color::rgb(0.2, 0.2, 0.2),
            ..RenderSettings::default()
        };
        let (_, _, cam, _) = setup(&settings);
        assert_eq!(cam.clear_color, Color::rgb(0.2, 0.2, 0.2));
    }

    #[test]
    fn culls_everything_but_isolation_channel() {
        let (_, _, cam, token) = setup(&RenderSettings::default());
        assert_eq!(cam.culling_mask, ChannelMask::only(token.channel()));
        assert!(!cam.culling_mask.contains(Channel::DEFAULT));
        assert_eq!(cam.target, Some(TargetId(1)));
    }

    #[test]
    fn pose_is_fixed() {
        let (scene, node, cam, _) = setup(&RenderSettings::default());
        let pose = CameraPose::of_node(&scene, node).unwrap();
        assert!(pose.position.abs_diff_eq(CAMERA_POSITION, 1e-6));
        assert!(pose.forward.abs_diff_eq(Vec3::Z, 1e-6));
        assert!(pose.right.abs_diff_eq(Vec3::X, 1e-6));
        assert!(pose.up.abs_diff_eq(Vec3::Y, 1e-6));
        assert_eq!(cam.half_height, 2.0);
        assert_eq!(CameraPose::fixed().forward, Vec3::Z);
    }

    #[test]
    fn zoom_maps_half_height_to_ndc_edge() {
        let (scene, node, cam, _) = setup(&RenderSettings::default());
        let vp = cam.view_projection(&scene.world_matrix(node).unwrap());
        let top = vp.project_point3(Vec3::new(0.0, 2.0, -5.0));
        let right = vp.project_point3(Vec3::new(2.0, 0.0, -5.0));
        assert!((top.y - 1.0).abs() < 1e-5);
        assert!((right.x - 1.0).abs() < 1e-5);
        assert!(top.z > 0.0 && top.z < 1.0);
    }
}
