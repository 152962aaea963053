use super::Vec3;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle_rad` around `axis` (normalized here).
    pub fn from_axis_angle(axis: Vec3, angle_rad: f64) -> Self {
        let axis = axis.normalize();
        let (s, c) = (angle_rad / 2.0).sin_cos();
        Self::new(axis.x * s, axis.y * s, axis.z * s, c)
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    pub fn conjugate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Hamilton product; `a.mul(b)` rotates by `b` first, then `a`.
    pub fn mul(self, b: Self) -> Self {
        let a = self;
        Self::new(
            a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
            a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
            a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
            a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
        )
    }

    pub fn rotate(self, v: Vec3) -> Vec3 {
        let q = Vec3::new(self.x, self.y, self.z);
        let t = q.cross(v) * 2.0;
        v + t * self.w + q.cross(t)
    }
}

#[cfg(test)]
mod tests {
    use super::Quaternion;
    use crate::math::Vec3;
    use crate::projection::lng_lat_to_world;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn quarter_turn_about_y_maps_z_to_x() {
        let q = Quaternion::from_axis_angle(Vec3::Y, FRAC_PI_2);
        assert!(q.rotate(Vec3::Z).approx_eq(Vec3::X));
        assert!(q.conjugate().rotate(Vec3::X).approx_eq(Vec3::Z));
    }

    #[test]
    fn composition_applies_right_operand_first() {
        let about_x = Quaternion::from_axis_angle(Vec3::X, FRAC_PI_2);
        let about_y = Quaternion::from_axis_angle(Vec3::Y, FRAC_PI_2);
        let v = Vec3::Z;
        let composed = about_y.mul(about_x).rotate(v);
        let stepwise = about_y.rotate(about_x.rotate(v));
        assert!(composed.approx_eq(stepwise));
    }

    #[test]
    fn lng_lat_rotation_matches_world_projection() {
        for (lng, lat) in [(0.0, 0.0), (45.0, 30.0), (-120.0, -60.0), (179.0, 84.0)] {
            let q = Quaternion::from_axis_angle(Vec3::Y, f64::to_radians(lng))
                .mul(Quaternion::from_axis_angle(Vec3::X, -f64::to_radians(lat)))
                .normalize();
            let rotated = Vec3::new(0.0, 0.0, 2.0).apply_quaternion(q);
            assert!(rotated.approx_eq(lng_lat_to_world(lng, lat, 2.0)));
        }
    }
}
