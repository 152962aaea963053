use foundation::TileId;
use foundation::altitude_to_zoom;
use foundation::math::Vec3;
use tracing::trace;

use crate::camera::{CameraStore, MAX_ZOOM};
use crate::visibility::{BoundingSphere, Frustum};

/// Zooms where the back-face test is applied. Coarser tiles wrap too much of
/// the globe for a center test; finer tiles are already flat enough.
const BACKFACE_ZOOMS: std::ops::RangeInclusive<u8> = 2..=5;

/// Per-frame visibility inputs derived from one camera state.
#[derive(Debug, Copy, Clone)]
pub struct TileVisibility {
    frustum: Frustum,
    camera_world: Vec3,
    target_zoom: f64,
}

impl TileVisibility {
    pub fn from_camera(camera: &CameraStore) -> Self {
        Self {
            frustum: Frustum::from_view_projection(&camera.view_projection()),
            camera_world: camera.position_world(),
            target_zoom: altitude_to_zoom(camera.altitude(), camera.fov_x_deg())
                .floor()
                .min(MAX_ZOOM),
        }
    }

    pub fn target_zoom(&self) -> f64 {
        self.target_zoom
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    pub fn contains(&self, tile: TileId) -> bool {
        if tile.zoom <= 1 {
            return true;
        }

        let sphere = BoundingSphere::for_tile(tile);
        if !self.frustum.intersects_sphere(&sphere) {
            return false;
        }

        if BACKFACE_ZOOMS.contains(&tile.zoom) && sphere.center.dot(self.camera_world) <= 0.0 {
            return false;
        }
        true
    }

    /// Iterative quadtree descent from the root.
    ///
    /// Tiles at or past the target zoom are emitted; coarser visible tiles are
    /// replaced by their children. Order is unspecified.
    pub fn select(&self) -> Vec<TileId> {
        let mut out = Vec::new();
        let mut stack = vec![TileId::ROOT];

        while let Some(tile) = stack.pop() {
            if !self.contains(tile) {
                continue;
            }
            if f64::from(tile.zoom) >= self.target_zoom {
                out.push(tile);
                continue;
            }
            match tile.children() {
                Some(children) => stack.extend(children),
                None => out.push(tile),
            }
        }

        trace!(target_zoom = self.target_zoom, tiles = out.len(), "tiles selected");
        out
    }
}

pub fn is_tile_in_view(tile: TileId, camera: &CameraStore) -> bool {
    TileVisibility::from_camera(camera).contains(tile)
}

pub fn tiles_in_view(camera: &CameraStore) -> Vec<TileId> {
    TileVisibility::from_camera(camera).select()
}

#[cfg(test)]
mod tests {
    use super::{is_tile_in_view, tiles_in_view};
    use crate::camera::CameraStore;
    use foundation::TileId;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    #[test]
    fn zoom_zero_camera_selects_only_the_root() {
        let camera = CameraStore::new([1280, 720]);
        assert_eq!(tiles_in_view(&camera), vec![TileId::ROOT]);
    }

    #[test]
    fn coarse_tiles_always_pass() {
        let mut camera = CameraStore::new([1280, 720]);
        let _ = camera.set_lng_lat(90.0, -40.0);
        let _ = camera.set_zoom(12.0);

        assert!(is_tile_in_view(TileId::ROOT, &camera));
        for tile in TileId::ROOT.children().unwrap() {
            assert!(is_tile_in_view(tile, &camera), "{tile} was culled");
        }
    }

    #[test]
    fn zoom_two_keeps_facing_tiles_and_drops_far_side() {
        let mut camera = CameraStore::new([1000, 1000]);
        let _ = camera.set_zoom(2.5);

        let selected: BTreeSet<TileId> = tiles_in_view(&camera).into_iter().collect();
        assert!(selected.iter().all(|t| t.zoom == 2));
        for tile in [
            TileId::new(2, 1, 1),
            TileId::new(2, 2, 1),
            TileId::new(2, 1, 2),
            TileId::new(2, 2, 2),
        ] {
            assert!(selected.contains(&tile), "missing {tile}");
        }
        // Centered near lng -135, on the far side of the globe.
        assert!(!selected.contains(&TileId::new(2, 0, 1)));
    }

    #[test]
    fn selection_has_no_duplicates() {
        let mut camera = CameraStore::new([1000, 800]);
        let _ = camera.set_lng_lat(12.0, 41.0);
        let _ = camera.set_zoom(6.5);

        let tiles = tiles_in_view(&camera);
        let unique: BTreeSet<TileId> = tiles.iter().copied().collect();
        assert_eq!(unique.len(), tiles.len());
        assert!(tiles.iter().all(|t| t.zoom == 6));
    }

    #[test]
    fn frustum_culls_fine_tiles_off_screen() {
        let mut camera = CameraStore::new([1000, 1000]);
        let _ = camera.set_zoom(8.0);

        // Touches the point under the camera.
        assert!(is_tile_in_view(TileId::new(6, 32, 31), &camera));
        // Around lng 59, far outside an 80 degree view from low altitude.
        assert!(!is_tile_in_view(TileId::new(6, 42, 32), &camera));
    }
}
