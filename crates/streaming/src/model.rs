use std::collections::BTreeMap;
use std::sync::Arc;

use foundation::TileId;
use foundation::math::Vec3;
use serde::{Deserialize, Serialize};

/// A chain of world-space points.
pub type LineString = Vec<Vec3>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Point,
    LineString,
    Polygon,
}

/// What is kept of a source feature besides its geometry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FeatureMeta {
    pub id: Option<u64>,
    pub kind: FeatureKind,
    pub extent: u32,
}

/// Triangulated polygons, ready for upload.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PolygonMesh {
    pub indices: Vec<u32>,
    /// World-space xyz triples.
    pub vertices: Vec<f32>,
}

impl PolygonMesh {
    pub fn num_indices(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapLayer {
    pub name: String,
    /// Shared so mesh jobs can borrow the geometry without copying it.
    pub linestrings: Arc<Vec<LineString>>,
    pub polygons: PolygonMesh,
    pub features: Vec<FeatureMeta>,
}

impl MapLayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            linestrings: Arc::new(Vec::new()),
            polygons: PolygonMesh::default(),
            features: Vec::new(),
        }
    }

    pub fn line_point_count(&self) -> usize {
        self.linestrings.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.linestrings.is_empty() && self.polygons.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapTile {
    pub id: TileId,
    pub layers: BTreeMap<String, MapLayer>,
}

impl MapTile {
    pub fn empty(id: TileId) -> Self {
        Self {
            id,
            layers: BTreeMap::new(),
        }
    }

    pub fn layer(&self, name: &str) -> Option<&MapLayer> {
        self.layers.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
