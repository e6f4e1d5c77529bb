use glam::Vec3;
use iconstage_assets::AssetStore;
use iconstage_common::{Aabb, EntityId};
use iconstage_kernel::{Scene, SceneError, Shape};

/// Full size of the box reported for a node with no geometry.
pub const EMPTY_BOUNDS_SIZE: f32 = 0.5;

/// World-space bounds of every geometry-bearing node under `root` (inclusive).
///
/// Meshes and sprites count whether or not they are enabled. With no geometry
/// the result is a small box centered on `root`'s world position.
pub fn subject_bounds(scene: &Scene, assets: &AssetStore, root: EntityId) -> Result<Aabb, SceneError> {
    let mut merged: Option<Aabb> = None;
    for id in scene.descendants(root)? {
        let Some(local) = geometry_bounds(scene, assets, id) else {
            continue;
        };
        let world = local.transformed(&scene.world_matrix(id)?);
        match merged.as_mut() {
            Some(b) => b.encapsulate(&world),
            None => merged = Some(world),
        }
    }
    match merged {
        Some(b) => Ok(b),
        None => Ok(Aabb::from_center_size(
            scene.world_position(root)?,
            Vec3::splat(EMPTY_BOUNDS_SIZE),
        )),
    }
}

/// Local-space bounds of a node's drawable, if it has geometry.
fn geometry_bounds(scene: &Scene, assets: &AssetStore, id: EntityId) -> Option<Aabb> {
    let drawable = scene.get(id)?.drawable?;
    match drawable.shape {
        Shape::Mesh(handle) => assets.mesh(handle)?.local_bounds(),
        Shape::Sprite(handle) => Some(assets.sprite(handle)?.local_bounds()),
        Shape::Empty => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iconstage_assets::{Mesh, Sprite};
    use iconstage_common::{Color, Transform};
    use iconstage_kernel::Drawable;
    use image::RgbaImage;

    #[test]
    fn empty_subject_gets_fallback_box() {
        let mut scene = Scene::new();
        let id = scene.spawn("empty", Transform::from_position(Vec3::new(1.0, 2.0, 3.0)));
        let b = subject_bounds(&scene, &AssetStore::new(), id).unwrap();
        assert_eq!(b.center, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(b.size(), Vec3::splat(EMPTY_BOUNDS_SIZE));
    }

    #[test]
    fn single_mesh_bounds_follow_transform() {
        let mut scene = Scene::new();
        let mut assets = AssetStore::new();
        let cube = assets.register_mesh(Mesh::cube());
        let id = scene.spawn(
            "cube",
            Transform {
                position: Vec3::new(0.0, 1.0, 0.0),
                scale: Vec3::splat(2.0),
                ..Transform::default()
            },
        );
        scene.set_drawable(id, Some(Drawable::mesh(cube, Color::WHITE))).unwrap();
        let b = subject_bounds(&scene, &assets, id).unwrap();
        assert_eq!(b.center, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(b.extents, Vec3::splat(1.0));
    }

    #[test]
    fn children_are_merged() {
        let mut scene = Scene::new();
        let mut assets = AssetStore::new();
        let cube = assets.register_mesh(Mesh::cube());
        let root = scene.spawn("root", Transform::default());
        for x in [-2.0, 3.0] {
            let c = scene
                .spawn_child(root, "part", Transform::from_position(Vec3::new(x, 0.0, 0.0)))
                .unwrap();
            scene.set_drawable(c, Some(Drawable::mesh(cube, Color::WHITE))).unwrap();
        }
        let b = subject_bounds(&scene, &assets, root).unwrap();
        assert_eq!(b.min(), Vec3::new(-2.5, -0.5, -0.5));
        assert_eq!(b.max(), Vec3::new(3.5, 0.5, 0.5));
    }

    #[test]
    fn sprites_count_and_placeholders_do_not() {
        let mut scene = Scene::new();
        let mut assets = AssetStore::new();
        let sprite = assets.register_sprite(Sprite::new("s", RgbaImage::new(100, 100)));
        let root = scene.spawn("root", Transform::default());
        scene.set_drawable(root, Some(Drawable::placeholder(0))).unwrap();
        let s = scene
            .spawn_child(root, "sprite", Transform::from_position(Vec3::new(4.0, 0.0, 0.0)))
            .unwrap();
        scene.set_drawable(s, Some(Drawable::sprite(sprite, Color::WHITE, 0))).unwrap();
        let b = subject_bounds(&scene, &assets, root).unwrap();
        assert_eq!(b.center, Vec3::new(4.0, 0.0, 0.0));
        assert_eq!(b.extents, Vec3::new(0.5, 0.5, 0.0));
    }
}
