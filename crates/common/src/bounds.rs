use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box stored as center + half-extents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub center: Vec3,
    pub extents: Vec3,
}

impl Aabb {
    pub fn new(center: Vec3, extents: Vec3) -> Self {
        Self { center, extents }
    }

    /// Box of the given full `size` around `center`.
    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        Self::new(center, size * 0.5)
    }

    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self::new((min + max) * 0.5, (max - min) * 0.5)
    }

    /// Smallest box containing every point. `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
        Some(Self::from_min_max(min, max))
    }

    pub fn min(&self) -> Vec3 {
        self.center - self.extents
    }

    pub fn max(&self) -> Vec3 {
        self.center + self.extents
    }

    pub fn size(&self) -> Vec3 {
        self.extents * 2.0
    }

    /// Grow to also contain `other`.
    pub fn encapsulate(&mut self, other: &Aabb) {
        *self = Self::from_min_max(self.min().min(other.min()), self.max().max(other.max()));
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min(), self.max());
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Axis-aligned box enclosing this box after an affine transform.
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let corners = self.corners().map(|c| matrix.transform_point3(c));
        let mut min = corners[0];
        let mut max = corners[0];
        for c in &corners[1..] {
            min = min.min(*c);
            max = max.max(*c);
        }
        Self::from_min_max(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_round_trip() {
        let b = Aabb::from_min_max(Vec3::new(-1.0, 0.0, 2.0), Vec3::new(3.0, 2.0, 4.0));
        assert_eq!(b.center, Vec3::new(1.0, 1.0, 3.0));
        assert_eq!(b.extents, Vec3::new(2.0, 1.0, 1.0));
        assert_eq!(b.size(), Vec3::new(4.0, 2.0, 2.0));
    }

    #[test]
    fn encapsulate_grows_both_ways() {
        let mut b = Aabb::new(Vec3::ZERO, Vec3::splat(0.5));
        b.encapsulate(&Aabb::new(Vec3::new(2.0, 0.0, 0.0), Vec3::splat(0.5)));
        assert_eq!(b.min(), Vec3::new(-0.5, -0.5, -0.5));
        assert_eq!(b.max(), Vec3::new(2.5, 0.5, 0.5));
    }

    #[test]
    fn from_points_empty_is_none() {
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn transformed_by_translation_and_scale() {
        let b = Aabb::new(Vec3::ZERO, Vec3::splat(0.5));
        let m = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            glam::Quat::IDENTITY,
            Vec3::new(1.0, 0.0, 0.0),
        );
        let t = b.transformed(&m);
        assert_eq!(t.center, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(t.extents, Vec3::splat(1.0));
    }

    #[test]
    fn transformed_by_rotation_encloses_corners() {
        let b = Aabb::new(Vec3::ZERO, Vec3::splat(0.5));
        let m = Mat4::from_rotation_z(std::f32::consts::FRAC_PI_4);
        let t = b.transformed(&m);
        let diag = 0.5 * std::f32::consts::SQRT_2;
        assert!((t.extents.x - diag).abs() < 1e-5);
        assert!((t.extents.y - diag).abs() < 1e-5);
        assert!((t.extents.z - 0.5).abs() < 1e-5);
    }
}
