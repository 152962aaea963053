//! The tile fetch boundary.
//!
//! A [`TileSource`] hands back raw, tile-local geometry for a tile id; the
//! wire format behind it is the source's business. [`DirectorySource`] reads
//! pre-decoded tiles stored as JSON under `<root>/<z>/<x>/<y>.json`.

use std::io;
use std::path::{Path, PathBuf};

use foundation::TileId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::FeatureKind;

/// Tile-local coordinate range used when a layer does not state one.
pub const DEFAULT_EXTENT: u32 = 4096;

fn default_extent() -> u32 {
    DEFAULT_EXTENT
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTile {
    pub layers: Vec<RawLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLayer {
    pub name: String,
    #[serde(default = "default_extent")]
    pub extent: u32,
    #[serde(default)]
    pub features: Vec<RawFeature>,
}

/// One feature in tile-local integer coordinates.
///
/// `geometry` holds one point list per part: the points of a point feature,
/// each line of a line feature, or each ring of a polygon feature (exterior
/// rings wind positive, holes negative, in y-down tile space).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFeature {
    #[serde(default)]
    pub id: Option<u64>,
    pub kind: FeatureKind,
    pub geometry: Vec<Vec<[i32; 2]>>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch of tile {0} was aborted")]
    Aborted(TileId),
    #[error("tile {0} does not exist in the source")]
    NotFound(TileId),
    #[error("failed to read tile {tile} from {path}")]
    Io {
        tile: TileId,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse tile {tile}")]
    Parse {
        tile: TileId,
        #[source]
        source: serde_json::Error,
    },
}

pub trait TileSource: Send + Sync {
    /// Fetch one tile. Implementations should give up with
    /// [`FetchError::Aborted`] once `signal` is cancelled.
    fn fetch(&self, id: TileId, signal: &CancellationToken) -> Result<RawTile, FetchError>;
}

#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tile_path(&self, id: TileId) -> PathBuf {
        self.root
            .join(id.zoom.to_string())
            .join(id.x.to_string())
            .join(format!("{}.json", id.y))
    }
}

impl TileSource for DirectorySource {
    fn fetch(&self, id: TileId, signal: &CancellationToken) -> Result<RawTile, FetchError> {
        if signal.is_cancelled() {
            return Err(FetchError::Aborted(id));
        }

        let path = self.tile_path(id);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(FetchError::NotFound(id));
            }
            Err(source) => {
                return Err(FetchError::Io {
                    tile: id,
                    path,
                    source,
                });
            }
        };
        debug!(tile = %id, bytes = bytes.len(), "tile read");

        if signal.is_cancelled() {
            return Err(FetchError::Aborted(id));
        }
        serde_json::from_slice(&bytes).map_err(|source| FetchError::Parse { tile: id, source })
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_EXTENT, DirectorySource, FetchError, RawTile, TileSource};
    use crate::model::FeatureKind;
    use foundation::TileId;
    use std::path::PathBuf;
    use tokio_util::sync::CancellationToken;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("streaming-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn parses_defaults() {
        let raw: RawTile = serde_json::from_str(
            r#"{"layers":[{"name":"road","features":[{"kind":"line_string","geometry":[[[0,0],[10,10]]]}]}]}"#,
        )
        .unwrap();
        let layer = &raw.layers[0];
        assert_eq!(layer.extent, DEFAULT_EXTENT);
        assert_eq!(layer.features[0].kind, FeatureKind::LineString);
        assert_eq!(layer.features[0].id, None);
    }

    #[test]
    fn reads_tiles_by_path() {
        let root = scratch_dir("read");
        let id = TileId::new(2, 1, 3);
        let source = DirectorySource::new(&root);
        std::fs::create_dir_all(source.tile_path(id).parent().unwrap()).unwrap();
        std::fs::write(source.tile_path(id), r#"{"layers":[]}"#).unwrap();

        let signal = CancellationToken::new();
        assert_eq!(source.fetch(id, &signal).unwrap(), RawTile::default());
        assert!(matches!(
            source.fetch(TileId::new(2, 0, 0), &signal),
            Err(FetchError::NotFound(_))
        ));

        signal.cancel();
        assert!(matches!(source.fetch(id, &signal), Err(FetchError::Aborted(_))));
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let root = scratch_dir("parse");
        let id = TileId::ROOT;
        let source = DirectorySource::new(&root);
        std::fs::create_dir_all(source.tile_path(id).parent().unwrap()).unwrap();
        std::fs::write(source.tile_path(id), "not json").unwrap();

        assert!(matches!(
            source.fetch(id, &CancellationToken::new()),
            Err(FetchError::Parse { .. })
        ));
        let _ = std::fs::remove_dir_all(root);
    }
}
