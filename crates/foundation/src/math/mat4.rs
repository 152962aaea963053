use super::Vec3;
use crate::projection::deg_to_rad;

/// 4x4 matrix stored row-major (`rows[r][c]`).
///
/// Products compose right-to-left: in `a.mul(b)` the transform `b` is applied
/// first. GPU upload goes through [`Mat4::to_column_major_f32`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Mat4 {
    pub rows: [[f64; 4]; 4],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    pub const IDENTITY: Self = Self {
        rows: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn from_rows(rows: [[f64; 4]; 4]) -> Self {
        Self { rows }
    }

    pub fn mul(&self, other: &Mat4) -> Mat4 {
        let mut out = [[0.0; 4]; 4];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.rows[r][k] * other.rows[k][c]).sum();
            }
        }
        Mat4 { rows: out }
    }

    /// Product of all matrices in order, `multiply(&[a, b, c]) == a·b·c`.
    pub fn multiply(matrices: &[Mat4]) -> Mat4 {
        matrices
            .iter()
            .fold(Mat4::IDENTITY, |acc, m| acc.mul(m))
    }

    pub fn transpose(&self) -> Mat4 {
        let mut out = [[0.0; 4]; 4];
        for (r, row) in self.rows.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                out[c][r] = *v;
            }
        }
        Mat4 { rows: out }
    }

    /// View matrix for an eye at `eye` looking at `target`.
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let z = (eye - target).normalize();
        let x = up.cross(z).normalize();
        let y = z.cross(x);

        Mat4::from_rows([
            [x.x, x.y, x.z, -x.dot(eye)],
            [y.x, y.y, y.z, -y.dot(eye)],
            [z.x, z.y, z.z, -z.dot(eye)],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// Perspective projection from a horizontal field of view in degrees.
    ///
    /// Depth is reversed: `-near` maps to 1 and `-far` maps to 0, so the
    /// depth test is "greater" and the depth buffer clears to 0.
    pub fn perspective(fov_x_deg: f64, aspect: f64, near: f64, far: f64) -> Mat4 {
        let f = 1.0 / (deg_to_rad(fov_x_deg) / 2.0).tan();
        let range_inv = 1.0 / (far - near);

        Mat4::from_rows([
            [f, 0.0, 0.0, 0.0],
            [0.0, f * aspect, 0.0, 0.0],
            [0.0, 0.0, near * range_inv, near * far * range_inv],
            [0.0, 0.0, -1.0, 0.0],
        ])
    }

    pub fn row(&self, r: usize) -> [f64; 4] {
        self.rows[r]
    }

    pub fn to_column_major_f32(&self) -> [f32; 16] {
        let mut out = [0.0f32; 16];
        for c in 0..4 {
            for r in 0..4 {
                out[c * 4 + r] = self.rows[r][c] as f32;
            }
        }
        out
    }
}
