use crate::camera::{CameraStore, UniformWrite};

/// Wheel delta that moves the camera by one zoom level.
pub const WHEEL_ZOOM_DIVISOR: f64 = 70.0;

/// Primary pointer button.
pub const PRIMARY_BUTTON: u16 = 0;

/// Pointer drag pans, wheel zooms.
///
/// Drag speed scales with the map width and inverse zoom so a drag across the
/// full map spans a constant fraction of the visible globe.
#[derive(Debug, Default, Clone)]
pub struct GlobeControls {
    dragging: bool,
}

impl GlobeControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn on_pointer_down(&mut self, button: u16) {
        if button == PRIMARY_BUTTON {
            self.dragging = true;
        }
    }

    pub fn on_pointer_up(&mut self) {
        self.dragging = false;
    }

    /// `movement` is the pointer delta in device pixels since the last event.
    pub fn on_pointer_move(
        &mut self,
        camera: &mut CameraStore,
        movement: [f64; 2],
    ) -> Option<UniformWrite> {
        if !self.dragging {
            return None;
        }

        let width = f64::from(camera.map_dims()[0]);
        let factor = (1.0 / width) * 360.0 * 2f64.powf(-camera.zoom());
        let lng = camera.lng() - movement[0] * factor;
        let lat = camera.lat() + movement[1] * factor;
        Some(camera.set_lng_lat(lng, lat))
    }

    pub fn on_wheel(&mut self, camera: &mut CameraStore, delta_y: f64) -> UniformWrite {
        camera.set_zoom(camera.zoom() - delta_y / WHEEL_ZOOM_DIVISOR)
    }
}
