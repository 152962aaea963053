//! Conversions between zoom, altitude and the coordinate spaces of a tile.
//!
//! Coordinate spaces, from raw to rendered:
//! - tile-local: integer coordinates in `[0, extent]` inside one tile
//! - Mercator: normalized `[0, 1] x [0, 1]`, y growing southwards
//! - lng/lat: degrees
//! - world: unit sphere (radius 1 is the ground), y up, lng 0 / lat 0 on +z
//!
//! Altitudes are measured in Earth radii above the ground.

use std::f64::consts::PI;

use crate::math::{EQ_EPSILON, Vec2, Vec3};
use crate::tile::TileId;

pub fn deg_to_rad(deg: f64) -> f64 {
    deg * (PI / 180.0)
}

pub fn rad_to_deg(rad: f64) -> f64 {
    rad * (180.0 / PI)
}

pub fn tan_deg(deg: f64) -> f64 {
    deg_to_rad(deg).tan()
}

pub fn rough_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EQ_EPSILON
}

/// Zoom level at which one tile spans the horizontal field of view.
pub fn altitude_to_zoom(altitude: f64, fov_x_deg: f64) -> f64 {
    -(altitude / PI * tan_deg(fov_x_deg / 2.0)).log2()
}

pub fn zoom_to_altitude(zoom: f64, fov_x_deg: f64) -> f64 {
    (PI / tan_deg(fov_x_deg / 2.0)) * 2f64.powf(-zoom)
}

pub fn tile_local_to_mercator(point: Vec2, tile: TileId, extent: f64) -> Vec2 {
    let count = tile.tiles_per_axis() as f64;
    Vec2::new(
        (point.x / extent + tile.x as f64) / count,
        (point.y / extent + tile.y as f64) / count,
    )
}

/// Mercator to `(lng, lat)` in degrees.
pub fn mercator_to_lng_lat(m: Vec2) -> Vec2 {
    let lng = 2.0 * PI * m.x - PI;
    let lat = 2.0 * (PI - 2.0 * PI * m.y).exp().atan() - PI / 2.0;
    Vec2::new(rad_to_deg(lng), rad_to_deg(lat))
}

pub fn lng_lat_to_world(lng_deg: f64, lat_deg: f64, radius: f64) -> Vec3 {
    let (sin_lng, cos_lng) = deg_to_rad(lng_deg).sin_cos();
    let (sin_lat, cos_lat) = deg_to_rad(lat_deg).sin_cos();
    Vec3::new(cos_lat * sin_lng * radius, sin_lat * radius, cos_lat * cos_lng * radius)
}

pub fn mercator_to_world(m: Vec2) -> Vec3 {
    let ll = mercator_to_lng_lat(m);
    lng_lat_to_world(ll.x, ll.y, 1.0)
}

pub fn tile_local_to_world(point: Vec2, tile: TileId, extent: f64) -> Vec3 {
    mercator_to_world(tile_local_to_mercator(point, tile, extent))
}
