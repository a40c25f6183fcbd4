//! Math types and listener-frame helpers

pub use glam::Vec3;

/// Facing used when a listener has no direction set.
pub const DEFAULT_FORWARD: Vec3 = Vec3::Y;

/// Orthonormal listener frame on the horizontal plane, +Z up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerFrame {
    pub forward: Vec3,
    pub right: Vec3,
}

impl ListenerFrame {
    /// Builds a frame from a facing direction. Only the XY part of the
    /// direction matters; a vertical or zero direction falls back to +Y.
    pub fn from_direction(direction: Vec3) -> Self {
        let flat = Vec3::new(direction.x, direction.y, 0.0);
        let forward = if flat.length_squared() > f32::EPSILON {
            flat.normalize()
        } else {
            DEFAULT_FORWARD
        };
        Self {
            forward,
            right: forward.cross(Vec3::Z),
        }
    }

    /// Expresses a world-space offset as (right, forward, up).
    pub fn to_local(&self, offset: Vec3) -> Vec3 {
        Vec3::new(offset.dot(self.right), offset.dot(self.forward), offset.z)
    }
}

impl Default for ListenerFrame {
    fn default() -> Self {
        Self::from_direction(DEFAULT_FORWARD)
    }
}

/// Azimuth in radians, clockwise from straight ahead (right is positive).
pub fn azimuth(local: Vec3) -> f32 {
    local.x.atan2(local.y)
}

/// Elevation in degrees above the horizontal plane.
pub fn elevation_degrees(local: Vec3) -> f32 {
    local.z.atan2(local.x.hypot(local.y)).to_degrees()
}
