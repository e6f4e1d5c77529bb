//! Asset registry: content-addressed meshes and sprites.
//!
//! Assets are identified by content hashes. Scene nodes and the renderer
//! reference assets by handle, never by raw file paths.

use glam::{Vec2, Vec3};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use iconstage_common::{Aabb, MeshHandle, SpriteHandle};

/// Default sprite density, matching the import settings written for icons.
pub const DEFAULT_PIXELS_PER_UNIT: f32 = 100.0;

/// An indexed triangle mesh in local space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    /// Three indices per triangle.
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Unit cube centered on the origin.
    pub fn cube() -> Self {
        let p = 0.5_f32;
        let positions = vec![
            Vec3::new(-p, -p, -p),
            Vec3::new(p, -p, -p),
            Vec3::new(p, p, -p),
            Vec3::new(-p, p, -p),
            Vec3::new(-p, -p, p),
            Vec3::new(p, -p, p),
            Vec3::new(p, p, p),
            Vec3::new(-p, p, p),
        ];
        #[rustfmt::skip]
        let indices = vec![
            0,2,1, 0,3,2,   // -Z
            4,5,6, 4,6,7,   // +Z
            0,1,5, 0,5,4,   // -Y
            3,6,2, 3,7,6,   // +Y
            0,4,7, 0,7,3,   // -X
            1,2,6, 1,6,5,   // +X
        ];
        Self {
            name: "cube".into(),
            positions,
            indices,
        }
    }

    /// Square pyramid: unit base at y = -0.5, apex at y = 0.5.
    pub fn pyramid() -> Self {
        let p = 0.5_f32;
        let positions = vec![
            Vec3::new(-p, -p, -p),
            Vec3::new(p, -p, -p),
            Vec3::new(p, -p, p),
            Vec3::new(-p, -p, p),
            Vec3::new(0.0, p, 0.0),
        ];
        #[rustfmt::skip]
        let indices = vec![
            0,1,2, 0,2,3,   // base
            0,4,1, 1,4,2, 2,4,3, 3,4,0,
        ];
        Self {
            name: "pyramid".into(),
            positions,
            indices,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Triangles as vertex position triples. Out-of-range indices are skipped.
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices.chunks_exact(3).filter_map(|tri| {
            let get = |i: u32| self.positions.get(i as usize).copied();
            Some([get(tri[0])?, get(tri[1])?, get(tri[2])?])
        })
    }

    /// Local-space bounds; `None` for a mesh without vertices.
    pub fn local_bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.positions.iter().copied())
    }
}

/// A bitmap drawn as a camera-facing quad centered on its node.
#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    pub name: String,
    pub image: RgbaImage,
    pub pixels_per_unit: f32,
}

impl Sprite {
    pub fn new(name: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            name: name.into(),
            image,
            pixels_per_unit: DEFAULT_PIXELS_PER_UNIT,
        }
    }

    /// Quad size in local units.
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.image.width() as f32, self.image.height() as f32) / self.pixels_per_unit
    }

    /// Flat local-space bounds of the quad.
    pub fn local_bounds(&self) -> Aabb {
        let half = self.size() * 0.5;
        Aabb::new(Vec3::ZERO, Vec3::new(half.x, half.y, 0.0))
    }
}

/// Errors from asset operations.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid pixels-per-unit {0}; must be positive")]
    InvalidPixelsPerUnit(f32),
}

/// Content-addressed asset registry.
#[derive(Debug, Clone, Default)]
pub struct AssetStore {
    meshes: BTreeMap<MeshHandle, Mesh>,
    sprites: BTreeMap<SpriteHandle, Sprite>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mesh and return its handle. Identical meshes share a handle.
    pub fn register_mesh(&mut self, mesh: Mesh) -> MeshHandle {
        let mut hasher = Sha256::new();
        hasher.update(b"mesh");
        hasher.update(mesh.name.as_bytes());
        for p in &mesh.positions {
            for c in p.to_array() {
                hasher.update(c.to_le_bytes());
            }
        }
        for i in &mesh.indices {
            hasher.update(i.to_le_bytes());
        }
        let handle = MeshHandle(digest_to_u64(hasher));
        self.meshes.insert(handle, mesh);
        handle
    }

    /// Register a sprite and return its handle. Identical sprites share a handle.
    pub fn register_sprite(&mut self, sprite: Sprite) -> SpriteHandle {
        let mut hasher = Sha256::new();
        hasher.update(b"sprite");
        hasher.update(sprite.name.as_bytes());
        hasher.update(sprite.image.width().to_le_bytes());
        hasher.update(sprite.image.height().to_le_bytes());
        hasher.update(sprite.pixels_per_unit.to_le_bytes());
        hasher.update(sprite.image.as_raw());
        let handle = SpriteHandle(digest_to_u64(hasher));
        self.sprites.insert(handle, sprite);
        handle
    }

    /// Decode a PNG (or any format `image` was built with) into a sprite.
    pub fn import_sprite(
        &mut self,
        path: impl AsRef<Path>,
        pixels_per_unit: f32,
    ) -> Result<SpriteHandle, AssetError> {
        if !(pixels_per_unit > 0.0) {
            return Err(AssetError::InvalidPixelsPerUnit(pixels_per_unit));
        }
        let path = path.as_ref();
        let image = image::open(path)?.to_rgba8();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sprite".into());
        tracing::debug!(path = %path.display(), width = image.width(), height = image.height(), "imported sprite");
        Ok(self.register_sprite(Sprite {
            name,
            image,
            pixels_per_unit,
        }))
    }

    pub fn mesh(&self, handle: MeshHandle) -> Option<&Mesh> {
        self.meshes.get(&handle)
    }

    pub fn sprite(&self, handle: SpriteHandle) -> Option<&Sprite> {
        self.sprites.get(&handle)
    }

    /// Number of registered assets of all kinds.
    pub fn len(&self) -> usize {
        self.meshes.len() + self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty() && self.sprites.is_empty()
    }
}

fn digest_to_u64(hasher: Sha256) -> u64 {
    let result = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&result[..8]);
    u64::from_le_bytes(bytes)
}

pub fn crate_info() -> &'static str {
    "iconstage-assets v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_bounds_are_unit() {
        let b = Mesh::cube().local_bounds().unwrap();
        assert_eq!(b.center, Vec3::ZERO);
        assert_eq!(b.extents, Vec3::splat(0.5));
        assert_eq!(Mesh::cube().triangle_count(), 12);
    }

    #[test]
    fn empty_mesh_has_no_bounds() {
        let mesh = Mesh {
            name: "empty".into(),
            positions: Vec::new(),
            indices: Vec::new(),
        };
        assert!(mesh.local_bounds().is_none());
        assert_eq!(mesh.triangles().count(), 0);
    }

    #[test]
    fn triangles_skip_bad_indices() {
        let mut mesh = Mesh::pyramid();
        mesh.indices.extend([0, 1, 99]);
        assert_eq!(mesh.triangles().count(), 6);
    }

    #[test]
    fn content_addressed_dedup() {
        let mut store = AssetStore::new();
        let a = store.register_mesh(Mesh::cube());
        let b = store.register_mesh(Mesh::cube());
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        let c = store.register_mesh(Mesh::pyramid());
        assert_ne!(a, c);
    }

    #[test]
    fn sprite_size_uses_pixels_per_unit() {
        let sprite = Sprite::new("bg", RgbaImage::new(200, 100));
        assert_eq!(sprite.size(), Vec2::new(2.0, 1.0));
        assert_eq!(sprite.local_bounds().extents, Vec3::new(1.0, 0.5, 0.0));
    }

    #[test]
    fn import_sprite_from_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let mut img = RgbaImage::new(4, 2);
        img.put_pixel(1, 1, image::Rgba([255, 0, 0, 255]));
        img.save(&path).unwrap();

        let mut store = AssetStore::new();
        let handle = store.import_sprite(&path, 100.0).unwrap();
        let sprite = store.sprite(handle).unwrap();
        assert_eq!(sprite.name, "frame");
        assert_eq!(sprite.image.dimensions(), (4, 2));
        assert_eq!(sprite.image.get_pixel(1, 1).0, [255, 0, 0, 255]);
    }

    #[test]
    fn import_sprite_rejects_bad_density() {
        let mut store = AssetStore::new();
        assert!(matches!(
            store.import_sprite("missing.png", 0.0),
            Err(AssetError::InvalidPixelsPerUnit(_))
        ));
    }

    #[test]
    fn import_missing_file_is_error() {
        let mut store = AssetStore::new();
        assert!(store.import_sprite("/definitely/not/here.png", 100.0).is_err());
    }
}
