//! Small shared geometry types used by culling and the asset catalogue.

use glam::Vec3;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    pub min: Vec3,
    pub max: Vec3,
}

impl AABB {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Bounding sphere radius, i.e. the distance from center to a corner.
    pub fn bounding_radius(&self) -> f32 {
        self.extents().length()
    }

    /// Transform the eight corners by `transform` and return the new
    /// axis-aligned box enclosing them. Used when a renderable's local-space
    /// bounds are baked into world space for culling.
    pub fn transformed(&self, transform: &glam::Mat4) -> Self {
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];

        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for c in corners {
            let p = transform.transform_point3(c);
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }

    pub fn union(&self, other: &AABB) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_and_extents_of_unit_box() {
        let b = AABB::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        assert_eq!(b.center(), Vec3::ZERO);
        assert_eq!(b.extents(), Vec3::splat(1.0));
    }

    #[test]
    fn union_grows_to_cover_both_boxes() {
        let a = AABB::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        let b = AABB::new(Vec3::new(-1.0, 2.0, 0.0), Vec3::new(0.5, 3.0, 1.0));
        let u = a.union(&b);
        assert_eq!(u.min, Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(u.max, Vec3::new(1.0, 3.0, 1.0));
    }

    #[test]
    fn transformed_translation_shifts_bounds() {
        let b = AABB::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let t = glam::Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        let moved = b.transformed(&t);
        assert_eq!(moved.min, Vec3::new(4.0, -1.0, -1.0));
        assert_eq!(moved.max, Vec3::new(6.0, 1.0, 1.0));
    }
}
