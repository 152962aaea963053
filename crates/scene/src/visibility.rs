use foundation::math::{Mat4, Vec2, Vec3};
use foundation::{TileId, tile_local_to_world};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Plane {
    pub n: Vec3,
    pub d: f64,
}

impl Plane {
    pub fn new(n: Vec3, d: f64) -> Self {
        Self { n, d }
    }

    fn from_row(r: [f64; 4]) -> Self {
        Self::new(Vec3::new(r[0], r[1], r[2]), r[3])
    }

    pub fn normalize(self) -> Self {
        let len = self.n.length();
        if len <= 0.0 {
            return self;
        }
        Self {
            n: self.n / len,
            d: self.d / len,
        }
    }

    pub fn distance(&self, p: Vec3) -> f64 {
        self.n.dot(p) + self.d
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Conservative sphere around a tile's patch of the unit globe.
    ///
    /// The root tile covers the whole globe. Any other tile is centered on the
    /// world position of its middle and reaches its farthest corner.
    pub fn for_tile(tile: TileId) -> Self {
        if tile.zoom == 0 {
            return Self::new(Vec3::ZERO, 1.0);
        }

        let center = tile_local_to_world(Vec2::new(0.5, 0.5), tile, 1.0);
        let radius = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]
            .into_iter()
            .map(|(x, y)| tile_local_to_world(Vec2::new(x, y), tile, 1.0).distance(center))
            .fold(0.0, f64::max);
        Self::new(center, radius)
    }
}

/// View frustum as 6 planes.
///
/// Convention:
/// - A point `p` is inside iff `plane.distance(p) >= 0` for all planes.
/// - Planes are in world space, normalized so distances are metric.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frustum {
    pub left: Plane,
    pub right: Plane,
    pub bottom: Plane,
    pub top: Plane,
    pub near: Plane,
    pub far: Plane,
}

impl Frustum {
    pub fn new(
        left: Plane,
        right: Plane,
        bottom: Plane,
        top: Plane,
        near: Plane,
        far: Plane,
    ) -> Self {
        Self {
            left,
            right,
            bottom,
            top,
            near,
            far,
        }
    }

    pub fn normalize(self) -> Self {
        Self {
            left: self.left.normalize(),
            right: self.right.normalize(),
            bottom: self.bottom.normalize(),
            top: self.top.normalize(),
            near: self.near.normalize(),
            far: self.far.normalize(),
        }
    }

    pub fn planes(&self) -> [Plane; 6] {
        [
            self.left,
            self.right,
            self.bottom,
            self.top,
            self.near,
            self.far,
        ]
    }

    /// Build a frustum from `projection * view`.
    ///
    /// Expects reversed depth clip space, where visible points satisfy
    /// `-w <= x <= w`, `-w <= y <= w` and `0 <= z <= w` with the near plane at
    /// `z = w`.
    pub fn from_view_projection(m: &Mat4) -> Self {
        let [r0, r1, r2, r3] = m.rows;
        let add = |a: [f64; 4], b: [f64; 4]| [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]];
        let sub = |a: [f64; 4], b: [f64; 4]| [a[0] - b[0], a[1] - b[1], a[2] - b[2], a[3] - b[3]];

        Self::new(
            Plane::from_row(add(r3, r0)),
            Plane::from_row(sub(r3, r0)),
            Plane::from_row(add(r3, r1)),
            Plane::from_row(sub(r3, r1)),
            Plane::from_row(sub(r3, r2)),
            Plane::from_row(r2),
        )
        .normalize()
    }

    /// A sphere is out only when it lies entirely behind some plane; touching counts as in.
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes()
            .iter()
            .all(|plane| plane.distance(sphere.center) >= -sphere.radius)
    }
}
