use super::{Mat4, Quaternion};

/// Tolerance for component-wise equality after repeated normalize/cross chains.
pub const EQ_EPSILON: f64 = 1e-6;

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Z component of the 2D cross product.
    pub fn perp_dot(self, other: Self) -> f64 {
        self.x * other.y - self.y * other.x
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const X: Self = Self::new(1.0, 0.0, 0.0);
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn from_array(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn to_f32_array(self) -> [f32; 3] {
        [self.x as f32, self.y as f32, self.z as f32]
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Self) -> f64 {
        (self - other).length()
    }

    /// Unit vector in the same direction. The zero vector stays zero.
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            return self;
        }
        self / len
    }

    pub fn approx_eq(self, other: Self) -> bool {
        (self.x - other.x).abs() < EQ_EPSILON
            && (self.y - other.y).abs() < EQ_EPSILON
            && (self.z - other.z).abs() < EQ_EPSILON
    }

    /// Treat `self` as a point (w = 1) and apply `m`, dividing by the resulting w.
    pub fn apply_mat4(self, m: &Mat4) -> Self {
        let r = &m.rows;
        let w = r[3][0] * self.x + r[3][1] * self.y + r[3][2] * self.z + r[3][3];
        let inv_w = if w == 0.0 { 1.0 } else { 1.0 / w };
        Self::new(
            (r[0][0] * self.x + r[0][1] * self.y + r[0][2] * self.z + r[0][3]) * inv_w,
            (r[1][0] * self.x + r[1][1] * self.y + r[1][2] * self.z + r[1][3]) * inv_w,
            (r[2][0] * self.x + r[2][1] * self.y + r[2][2] * self.z + r[2][3]) * inv_w,
        )
    }

    pub fn apply_quaternion(self, q: Quaternion) -> Self {
        q.rotate(self)
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl std::ops::Neg for Vec3 {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl std::ops::Mul<f64> for Vec3 {
    type Output = Self;

    fn mul(self, s: f64) -> Self::Output {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl std::ops::Div<f64> for Vec3 {
    type Output = Self;

    fn div(self, s: f64) -> Self::Output {
        Self::new(self.x / s, self.y / s, self.z / s)
    }
}
