use foundation::math::{Mat4, Vec3};
use foundation::{altitude_to_zoom, lng_lat_to_world, zoom_to_altitude};

pub const DEFAULT_FOV_X_DEG: f64 = 80.0;
pub const DEFAULT_NEAR: f64 = 0.000_001;
pub const DEFAULT_FAR: f64 = 10.0;

pub const MIN_ZOOM: f64 = 0.0;
pub const MAX_ZOOM: f64 = 18.0;
pub const MAX_LATITUDE: f64 = 85.0;

/// Which camera uniform a write is meant for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UniformTarget {
    Projection,
    View,
}

/// Matrix bytes that must reach GPU uniform storage after a camera change.
#[must_use = "camera changes only reach the GPU once the write is applied"]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct UniformWrite {
    pub target: UniformTarget,
    /// Column-major.
    pub matrix: [f32; 16],
}

impl UniformWrite {
    fn projection(m: &Mat4) -> Self {
        Self {
            target: UniformTarget::Projection,
            matrix: m.to_column_major_f32(),
        }
    }

    fn view(m: &Mat4) -> Self {
        Self {
            target: UniformTarget::View,
            matrix: m.to_column_major_f32(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Projection {
    pub fov_x_deg: f64,
    pub near: f64,
    pub far: f64,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_x_deg: DEFAULT_FOV_X_DEG,
            near: DEFAULT_NEAR,
            far: DEFAULT_FAR,
        }
    }
}

/// Camera and projection state for the globe.
///
/// The camera orbits the unit sphere at `altitude` Earth radii above
/// `(lng, lat)` and always looks at the globe center with +Y up.
/// Setters return the uniform writes their change requires.
#[derive(Debug, Clone)]
pub struct CameraStore {
    map_dims: [u32; 2],
    projection_params: Projection,
    lng: f64,
    lat: f64,
    altitude: f64,
    zoom: f64,
    position_world: Vec3,
    projection: Mat4,
    view: Mat4,
}

impl CameraStore {
    pub fn new(map_dims: [u32; 2]) -> Self {
        Self::with_projection(map_dims, Projection::default())
    }

    pub fn with_projection(map_dims: [u32; 2], projection_params: Projection) -> Self {
        let altitude = zoom_to_altitude(MIN_ZOOM, projection_params.fov_x_deg);
        let mut camera = Self {
            map_dims: sanitize_dims(map_dims),
            projection_params,
            lng: 0.0,
            lat: 0.0,
            altitude,
            zoom: MIN_ZOOM,
            position_world: Vec3::ZERO,
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        };
        let _ = camera.rebuild_projection();
        let _ = camera.update_view_matrix();
        camera
    }

    /// Writes for every camera uniform, for the initial upload.
    pub fn uniform_writes(&self) -> [UniformWrite; 2] {
        [
            UniformWrite::projection(&self.projection),
            UniformWrite::view(&self.view),
        ]
    }

    pub fn map_dims(&self) -> [u32; 2] {
        self.map_dims
    }

    pub fn aspect(&self) -> f64 {
        f64::from(self.map_dims[0]) / f64::from(self.map_dims[1])
    }

    pub fn projection_params(&self) -> Projection {
        self.projection_params
    }

    pub fn fov_x_deg(&self) -> f64 {
        self.projection_params.fov_x_deg
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Altitude above ground in Earth radii.
    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn position_world(&self) -> Vec3 {
        self.position_world
    }

    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    pub fn view_projection(&self) -> Mat4 {
        Mat4::multiply(&[self.projection, self.view])
    }

    pub fn set_lng_lat(&mut self, lng: f64, lat: f64) -> UniformWrite {
        self.lng = wrap_longitude(lng);
        self.lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        self.update_view_matrix()
    }

    pub fn set_zoom(&mut self, zoom: f64) -> UniformWrite {
        let zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        self.altitude = zoom_to_altitude(zoom, self.fov_x_deg());
        self.update_view_matrix()
    }

    /// Altitudes outside the zoom range are clamped to it.
    pub fn set_altitude(&mut self, altitude: f64) -> UniformWrite {
        let zoom = altitude_to_zoom(altitude, self.fov_x_deg());
        if zoom.is_nan() || !(MIN_ZOOM..=MAX_ZOOM).contains(&zoom) {
            return self.set_zoom(if zoom.is_nan() { MIN_ZOOM } else { zoom });
        }
        self.altitude = altitude;
        self.update_view_matrix()
    }

    /// Changing the field of view keeps the altitude, so the derived zoom moves.
    pub fn set_fov_x(&mut self, fov_x_deg: f64) -> UniformWrite {
        self.projection_params.fov_x_deg = fov_x_deg;
        self.zoom = altitude_to_zoom(self.altitude, fov_x_deg);
        self.rebuild_projection()
    }

    pub fn set_map_dims(&mut self, map_dims: [u32; 2]) -> UniformWrite {
        self.map_dims = sanitize_dims(map_dims);
        self.rebuild_projection()
    }

    /// Recompute world position, view matrix and zoom from `lng/lat/altitude`.
    pub fn update_view_matrix(&mut self) -> UniformWrite {
        // Altitude is measured from the unit-sphere ground, not the center.
        self.position_world = lng_lat_to_world(self.lng, self.lat, self.altitude + 1.0);
        self.view = Mat4::look_at(self.position_world, Vec3::ZERO, Vec3::Y);
        self.zoom = altitude_to_zoom(self.altitude, self.fov_x_deg());
        UniformWrite::view(&self.view)
    }

    fn rebuild_projection(&mut self) -> UniformWrite {
        let p = self.projection_params;
        self.projection = Mat4::perspective(p.fov_x_deg, self.aspect(), p.near, p.far);
        UniformWrite::projection(&self.projection)
    }
}

/// Wrap into `[-180, 180)`.
pub fn wrap_longitude(lng: f64) -> f64 {
    (lng + 180.0).rem_euclid(360.0) - 180.0
}

fn sanitize_dims(dims: [u32; 2]) -> [u32; 2] {
    [dims[0].max(1), dims[1].max(1)]
}

#[cfg(test)]
mod tests {
    use super::{CameraStore, MAX_LATITUDE, MAX_ZOOM, UniformTarget, wrap_longitude};
    use foundation::math::Vec3;
    use foundation::zoom_to_altitude;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn starts_at_zoom_zero_over_null_island() {
        let camera = CameraStore::new([800, 600]);
        assert_close(camera.zoom(), 0.0, 1e-9);
        assert_close(camera.altitude(), zoom_to_altitude(0.0, 80.0), 1e-12);
        let expected = Vec3::new(0.0, 0.0, camera.altitude() + 1.0);
        assert!(camera.position_world().approx_eq(expected));
    }

    #[test]
    fn longitude_wraps_and_latitude_clamps() {
        let mut camera = CameraStore::new([800, 600]);
        let _ = camera.set_lng_lat(190.0, 89.0);
        assert_close(camera.lng(), -170.0, 1e-12);
        assert_eq!(camera.lat(), MAX_LATITUDE);

        let _ = camera.set_lng_lat(-540.0, -100.0);
        assert_close(camera.lng(), -180.0, 1e-12);
        assert_eq!(camera.lat(), -MAX_LATITUDE);

        assert_close(wrap_longitude(180.0), -180.0, 1e-12);
        assert_close(wrap_longitude(179.5), 179.5, 1e-12);
    }

    #[test]
    fn zoom_clamps_and_drives_altitude() {
        let mut camera = CameraStore::new([800, 600]);
        let write = camera.set_zoom(25.0);
        assert_eq!(write.target, UniformTarget::View);
        assert_close(camera.zoom(), MAX_ZOOM, 1e-9);

        let _ = camera.set_zoom(-3.0);
        assert_close(camera.zoom(), 0.0, 1e-9);

        let _ = camera.set_zoom(4.0);
        assert_close(camera.altitude(), zoom_to_altitude(4.0, 80.0), 1e-12);
    }

    #[test]
    fn setters_emit_matching_uniform_bytes() {
        let mut camera = CameraStore::new([800, 600]);
        let view = camera.set_lng_lat(30.0, 10.0);
        assert_eq!(view.matrix, camera.view().to_column_major_f32());

        let proj = camera.set_map_dims([400, 400]);
        assert_eq!(proj.target, UniformTarget::Projection);
        assert_eq!(proj.matrix, camera.projection().to_column_major_f32());
        assert_close(camera.aspect(), 1.0, 1e-12);

        let [p, v] = camera.uniform_writes();
        assert_eq!(p, proj);
        assert_eq!(v, view);
    }

    #[test]
    fn view_looks_at_globe_center() {
        let mut camera = CameraStore::new([800, 600]);
        let _ = camera.set_lng_lat(45.0, 20.0);
        let center = Vec3::ZERO.apply_mat4(camera.view());
        assert!(center.approx_eq(Vec3::new(0.0, 0.0, -(camera.altitude() + 1.0))));
    }

    #[test]
    fn zero_sized_map_is_clamped() {
        let camera = CameraStore::new([0, 0]);
        assert_eq!(camera.map_dims(), [1, 1]);
    }
}
