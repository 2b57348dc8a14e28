use glam::{Mat4, Vec3};
use crate::ids::AssetId;

/// Point light with `{position, color, range, enabled, shadow_caster}`.
#[derive(Debug, Clone)]
pub struct Light {
    pub id: AssetId,
    pub name: String,
    pub pos: Vec3,
    pub color: Vec3,
    pub range: f32,
    pub enabled: bool,
    pub shadow_caster: bool,
    /// Recomputed lazily whenever `pos`/`range`/`shadow_caster` change;
    /// `None` for lights that are not shadow casters.
    pub shadow: Option<LightShadow>,
}

/// Six cube-face view matrices plus the shared 90°-FOV projection, in the
/// `Front, Back, Up, Down, Right, Left` order used by the shadow-cube
/// buffer and the GPU point-light shadow UBO.
#[derive(Debug, Clone, Copy)]
pub struct LightShadow {
    pub proj: Mat4,
    pub views: [Mat4; 6],
}

/// Cube face order matching `GPUPointLightShadowCube::_shadowMatrices`.
const FACE_DIRECTIONS: [Vec3; 6] = [
    Vec3::new(1.0, 0.0, 0.0),  // Front (+X)
    Vec3::new(-1.0, 0.0, 0.0), // Back  (-X)
    Vec3::new(0.0, 1.0, 0.0),  // Up    (+Y)
    Vec3::new(0.0, -1.0, 0.0), // Down  (-Y)
    Vec3::new(0.0, 0.0, 1.0),  // Right (+Z)
    Vec3::new(0.0, 0.0, -1.0), // Left  (-Z)
];

const FACE_UPS: [Vec3; 6] = [
    Vec3::new(0.0, -1.0, 0.0),
    Vec3::new(0.0, -1.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
    Vec3::new(0.0, 0.0, -1.0),
    Vec3::new(0.0, -1.0, 0.0),
    Vec3::new(0.0, -1.0, 0.0),
];

impl Light {
    pub fn new(id: AssetId, name: impl Into<String>, pos: Vec3, color: Vec3, range: f32) -> Self {
        Self {
            id,
            name: name.into(),
            pos,
            color,
            range,
            enabled: true,
            shadow_caster: false,
            shadow: None,
        }
    }

    /// Recompute the six cube-face view matrices and shared projection for
    /// a shadow-casting light. The X-axis-handedness flip (`scale(-1,1,1)`)
    /// matches the original engine's cube-map sampling convention so
    /// imported scenes and baked shadow data agree with new content.
    pub fn recompute_shadow(&mut self) {
        if !self.shadow_caster {
            self.shadow = None;
            return;
        }

        let near = 0.05;
        let far = self.range.max(near + 0.01);
        let proj = Mat4::perspective_rh(90f32.to_radians(), 1.0, near, far);
        let flip = Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0));

        let mut views = [Mat4::IDENTITY; 6];
        for i in 0..6 {
            let look = Mat4::look_at_rh(self.pos, self.pos + FACE_DIRECTIONS[i], FACE_UPS[i]);
            views[i] = look * flip;
        }

        self.shadow = Some(LightShadow { proj, views });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::AssetId;

    #[test]
    fn non_shadow_caster_has_no_shadow_state() {
        let mut l = Light::new(AssetId::generate(), "l", Vec3::ZERO, Vec3::ONE, 10.0);
        l.recompute_shadow();
        assert!(l.shadow.is_none());
    }

    #[test]
    fn shadow_caster_gets_six_distinct_view_matrices() {
        let mut l = Light::new(AssetId::generate(), "l", Vec3::ZERO, Vec3::ONE, 10.0);
        l.shadow_caster = true;
        l.recompute_shadow();
        let shadow = l.shadow.expect("shadow state computed");
        for i in 0..6 {
            for j in (i + 1)..6 {
                assert_ne!(shadow.views[i], shadow.views[j]);
            }
        }
    }
}
