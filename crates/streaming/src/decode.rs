//! Raw tile-local geometry to world-space tiles.

use std::sync::Arc;

use earcutr::earcut;
use foundation::math::Vec2;
use foundation::{TileId, rough_eq, tile_local_to_world};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::model::{FeatureKind, FeatureMeta, LineString, MapLayer, MapTile, PolygonMesh};
use crate::source::{RawFeature, RawLayer, RawTile, TileSource};

/// Fetch and decode one tile.
///
/// Failures never propagate: an aborted or failed fetch yields a tile with no
/// layers, which the cache then holds as resolved.
pub fn fetch_tile(source: &dyn TileSource, id: TileId, signal: &CancellationToken) -> MapTile {
    match source.fetch(id, signal) {
        Ok(raw) => decode_tile(id, &raw),
        Err(err) => {
            warn!(tile = %id, error = %err, "tile fetch failed; using empty tile");
            MapTile::empty(id)
        }
    }
}

pub fn decode_tile(id: TileId, raw: &RawTile) -> MapTile {
    let mut tile = MapTile::empty(id);
    for raw_layer in &raw.layers {
        let layer = decode_layer(id, raw_layer);
        debug!(
            tile = %id,
            layer = %layer.name,
            linestrings = layer.linestrings.len(),
            polygon_indices = layer.polygons.num_indices(),
            "layer decoded"
        );
        tile.layers.insert(layer.name.clone(), layer);
    }
    tile
}

fn decode_layer(id: TileId, raw: &RawLayer) -> MapLayer {
    let extent = f64::from(raw.extent.max(1));
    let mut layer = MapLayer::new(raw.name.clone());
    let mut linestrings: Vec<LineString> = Vec::new();

    for feature in &raw.features {
        match feature.kind {
            FeatureKind::LineString => {
                linestrings.extend(feature.geometry.iter().map(|line| {
                    line.iter()
                        .map(|&p| tile_local_to_world(to_vec2(p), id, extent))
                        .collect::<LineString>()
                }));
            }
            FeatureKind::Polygon => triangulate_feature(id, extent, feature, &mut layer.polygons),
            FeatureKind::Point => {}
        }
        layer.features.push(FeatureMeta {
            id: feature.id,
            kind: feature.kind,
            extent: raw.extent,
        });
    }

    layer.linestrings = Arc::new(linestrings);
    layer
}

fn triangulate_feature(id: TileId, extent: f64, feature: &RawFeature, mesh: &mut PolygonMesh) {
    for polygon in classify_rings(&feature.geometry) {
        let mut coords: Vec<f64> = Vec::new();
        let mut holes: Vec<usize> = Vec::new();
        for (i, ring) in polygon.iter().enumerate() {
            if i > 0 {
                holes.push(coords.len() / 2);
            }
            coords.extend(ring.iter().flat_map(|&[x, y]| [f64::from(x), f64::from(y)]));
        }

        let indices = match earcut(&coords, &holes, 2) {
            Ok(indices) => indices,
            Err(err) => {
                warn!(tile = %id, error = ?err, "polygon triangulation failed");
                continue;
            }
        };

        let base = mesh.vertex_count() as u32;
        // Tile-local y points south but world y points north, so each
        // triangle's winding has to be reversed.
        for tri in indices.chunks_exact(3) {
            mesh.indices
                .extend([tri[2], tri[1], tri[0]].map(|i| base + i as u32));
        }
        for xy in coords.chunks_exact(2) {
            let world = tile_local_to_world(Vec2::new(xy[0], xy[1]), id, extent);
            mesh.vertices.extend(world.to_f32_array());
        }
    }
}

/// Group a feature's rings into polygons.
///
/// A positive ring opens a new polygon, a negative ring is a hole of the
/// polygon currently open, and degenerate rings are skipped. A lone ring is
/// returned as is.
pub fn classify_rings(rings: &[Vec<[i32; 2]>]) -> Vec<Vec<&[[i32; 2]]>> {
    if rings.len() <= 1 {
        return vec![rings.iter().map(Vec::as_slice).collect()];
    }

    let mut polygons: Vec<Vec<&[[i32; 2]]>> = Vec::new();
    let mut current: Vec<&[[i32; 2]]> = Vec::new();
    for ring in rings {
        let area = signed_area(ring);
        if rough_eq(area, 0.0) {
            continue;
        }
        if area > 0.0 && !current.is_empty() {
            polygons.push(std::mem::take(&mut current));
        }
        current.push(ring);
    }
    if !current.is_empty() {
        polygons.push(current);
    }
    polygons
}

/// Shoelace area; positive for clockwise rings in y-down tile space.
pub fn signed_area(ring: &[[i32; 2]]) -> f64 {
    let n = ring.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let a = to_vec2(ring[i]);
            let b = to_vec2(ring[(i + 1) % n]);
            a.perp_dot(b)
        })
        .sum();
    twice / 2.0
}

fn to_vec2([x, y]: [i32; 2]) -> Vec2 {
    Vec2::new(f64::from(x), f64::from(y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FetchError;
    use pretty_assertions::assert_eq;

    fn square(min: i32, max: i32) -> Vec<[i32; 2]> {
        vec![[min, min], [max, min], [max, max], [min, max]]
    }

    fn reversed(mut ring: Vec<[i32; 2]>) -> Vec<[i32; 2]> {
        ring.reverse();
        ring
    }

    fn feature(kind: FeatureKind, geometry: Vec<Vec<[i32; 2]>>) -> RawFeature {
        RawFeature {
            id: Some(7),
            kind,
            geometry,
        }
    }

    fn layer(name: &str, features: Vec<RawFeature>) -> RawLayer {
        RawLayer {
            name: name.to_string(),
            extent: 4096,
            features,
        }
    }

    #[test]
    fn signed_area_sign_follows_winding() {
        assert_eq!(signed_area(&square(0, 10)), 100.0);
        assert_eq!(signed_area(&reversed(square(0, 10))), -100.0);
        assert_eq!(signed_area(&[[0, 0], [5, 5], [10, 10]]), 0.0);
    }

    #[test]
    fn rings_group_into_polygons_with_holes() {
        let rings = vec![
            square(0, 100),
            reversed(square(10, 20)),
            vec![[0, 0], [1, 1], [2, 2]],
            square(200, 300),
            reversed(square(210, 220)),
            reversed(square(230, 240)),
        ];
        let polygons = classify_rings(&rings);
        assert_eq!(polygons.len(), 2);
        assert_eq!(polygons[0].len(), 2);
        assert_eq!(polygons[1].len(), 3);
        assert_eq!(polygons[1][0], rings[3].as_slice());
    }

    #[test]
    fn single_ring_passes_through() {
        let rings = vec![reversed(square(0, 10))];
        assert_eq!(classify_rings(&rings), vec![vec![rings[0].as_slice()]]);
    }

    #[test]
    fn polygon_with_hole_triangulates_with_flipped_winding() {
        let raw = RawTile {
            layers: vec![layer(
                "water",
                vec![feature(
                    FeatureKind::Polygon,
                    vec![square(0, 4096), reversed(square(1024, 3072))],
                )],
            )],
        };
        let tile = decode_tile(TileId::ROOT, &raw);
        let water = tile.layer("water").unwrap();

        // A square with a square hole triangulates into 8 triangles.
        assert_eq!(water.polygons.num_indices(), 24);
        assert_eq!(water.polygons.vertex_count(), 8);
        assert!(water.polygons.indices.iter().all(|&i| i < 8));

        for tri in water.polygons.indices.chunks_exact(3) {
            let v = |i: u32| {
                let i = i as usize * 3;
                foundation::math::Vec3::new(
                    water.polygons.vertices[i] as f64,
                    water.polygons.vertices[i + 1] as f64,
                    water.polygons.vertices[i + 2] as f64,
                )
            };
            let (a, b, c) = (v(tri[0]), v(tri[1]), v(tri[2]));
            let normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            // Counter-clockwise seen from outside the globe.
            assert!(normal.dot(centroid) > 0.0, "triangle {tri:?} faces inwards");
        }
    }

    #[test]
    fn indices_are_offset_per_polygon() {
        let raw = RawTile {
            layers: vec![layer(
                "building",
                vec![
                    feature(FeatureKind::Polygon, vec![square(0, 100)]),
                    feature(FeatureKind::Polygon, vec![square(200, 300)]),
                ],
            )],
        };
        let tile = decode_tile(TileId::new(3, 4, 2), &raw);
        let mesh = &tile.layer("building").unwrap().polygons;
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.num_indices(), 12);
        assert!(mesh.indices[..6].iter().all(|&i| i < 4));
        assert!(mesh.indices[6..].iter().all(|&i| (4..8).contains(&i)));
    }

    #[test]
    fn lines_convert_to_world_and_points_keep_metadata() {
        let id = TileId::new(1, 1, 0);
        let raw = RawTile {
            layers: vec![layer(
                "road",
                vec![
                    feature(
                        FeatureKind::LineString,
                        vec![vec![[0, 0], [4096, 4096]], vec![[10, 10]]],
                    ),
                    feature(FeatureKind::Point, vec![vec![[5, 5]]]),
                ],
            )],
        };
        let tile = decode_tile(id, &raw);
        let road = tile.layer("road").unwrap();

        assert_eq!(road.linestrings.len(), 2);
        assert_eq!(road.line_point_count(), 3);
        let expected = tile_local_to_world(Vec2::new(4096.0, 4096.0), id, 4096.0);
        assert!(road.linestrings[0][1].approx_eq(expected));
        assert!((road.linestrings[0][0].length() - 1.0).abs() < 1e-9);

        assert_eq!(road.features.len(), 2);
        assert_eq!(road.features[1].kind, FeatureKind::Point);
        assert_eq!(road.features[1].extent, 4096);
        assert!(road.polygons.is_empty());
    }

    struct Failing;

    impl TileSource for Failing {
        fn fetch(&self, id: TileId, _signal: &CancellationToken) -> Result<RawTile, FetchError> {
            Err(FetchError::NotFound(id))
        }
    }

    #[test]
    fn failed_fetch_yields_empty_tile() {
        let id = TileId::new(4, 3, 2);
        let tile = fetch_tile(&Failing, id, &CancellationToken::new());
        assert_eq!(tile, MapTile::empty(id));
    }
}
