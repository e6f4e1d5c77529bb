use image::RgbaImage;
use iconstage_assets::AssetStore;
use iconstage_common::EntityId;
use iconstage_kernel::Scene;

use crate::camera::Camera;
use crate::device::Device;
use crate::draw;
use crate::error::RenderError;

/// Draw `camera` once into its target and read the target back.
///
/// The previously active target is bound again before returning, on success
/// and on failure alike.
pub fn execute(
    device: &mut Device,
    scene: &Scene,
    assets: &AssetStore,
    camera: &Camera,
    camera_node: EntityId,
) -> Result<RgbaImage, RenderError> {
    let target = camera
        .target
        .ok_or_else(|| RenderError::render("camera has no target"))?;
    let previous = device.bind(Some(target));
    let result = draw_and_read(device, scene, assets, camera, camera_node);
    device.bind(previous);
    result
}

fn draw_and_read(
    device: &mut Device,
    scene: &Scene,
    assets: &AssetStore,
    camera: &Camera,
    camera_node: EntityId,
) -> Result<RgbaImage, RenderError> {
    let camera_world = scene.world_matrix(camera_node)?;
    let stats = draw::draw(device, scene, assets, camera, &camera_world)?;
    let target = device
        .active()
        .ok_or_else(|| RenderError::render("offscreen target was unbound during draw"))?;
    let bitmap = device.read_target(target)?;
    tracing::debug!(
        width = bitmap.width(),
        height = bitmap.height(),
        triangles = stats.triangles,
        sprites = stats.sprites,
        "read back offscreen target"
    );
    Ok(bitmap)
}
