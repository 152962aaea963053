//! Tile sources the viewer can run against.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use foundation::TileId;
use streaming::{
    DEFAULT_EXTENT, DirectorySource, FeatureKind, FetchError, RawFeature, RawLayer, RawTile,
    TileSource,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::SourceConfig;

const LATENCY_POLL: Duration = Duration::from_millis(2);

pub fn build_source(config: &SourceConfig) -> Arc<dyn TileSource> {
    match config {
        SourceConfig::Synthetic { latency_ms } => {
            info!(latency_ms, "using synthetic tiles");
            Arc::new(SyntheticSource::new().with_latency(Duration::from_millis(*latency_ms)))
        }
        SourceConfig::Directory { root } => {
            info!(root = %root.display(), "reading tiles from disk");
            Arc::new(DirectorySource::new(root))
        }
    }
}

/// Generates the same small scene for every tile: a graticule in `admin`, a
/// zigzag `road`, a `water` body with an island and a `building` point.
///
/// Latency is simulated by sleeping on the worker thread, giving up early
/// once the fetch is aborted.
#[derive(Debug, Default)]
pub struct SyntheticSource {
    latency: Duration,
    fetches: AtomicUsize,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fetches started so far, aborted ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn wait(&self, id: TileId, signal: &CancellationToken) -> Result<(), FetchError> {
        let deadline = Instant::now() + self.latency;
        loop {
            if signal.is_cancelled() {
                return Err(FetchError::Aborted(id));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(LATENCY_POLL.min(deadline - now));
        }
    }
}

impl TileSource for SyntheticSource {
    fn fetch(&self, id: TileId, signal: &CancellationToken) -> Result<RawTile, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.wait(id, signal)?;
        Ok(synthetic_tile())
    }
}

fn layer(name: &str, features: Vec<RawFeature>) -> RawLayer {
    RawLayer {
        name: name.to_string(),
        extent: DEFAULT_EXTENT,
        features,
    }
}

fn feature(id: u64, kind: FeatureKind, geometry: Vec<Vec<[i32; 2]>>) -> RawFeature {
    RawFeature {
        id: Some(id),
        kind,
        geometry,
    }
}

/// Clockwise in y-down tile space, i.e. an exterior ring.
fn square(min: i32, max: i32) -> Vec<[i32; 2]> {
    vec![[min, min], [max, min], [max, max], [min, max]]
}

fn synthetic_tile() -> RawTile {
    let e = DEFAULT_EXTENT as i32;
    let steps: Vec<i32> = (0..=4).map(|i| i * e / 4).collect();

    let graticule = (1..4)
        .flat_map(|k| {
            let at = k * e / 4;
            [
                steps.iter().map(|&s| [at, s]).collect::<Vec<_>>(),
                steps.iter().map(|&s| [s, at]).collect::<Vec<_>>(),
            ]
        })
        .collect();

    let road = (0..=6)
        .map(|i| [i * e / 6, if i % 2 == 0 { e / 5 } else { e / 3 }])
        .collect();

    let mut island = square(e * 3 / 8, e * 5 / 8);
    island.reverse();

    RawTile {
        layers: vec![
            layer("admin", vec![feature(1, FeatureKind::LineString, graticule)]),
            layer("road", vec![feature(2, FeatureKind::LineString, vec![road])]),
            layer(
                "water",
                vec![feature(
                    3,
                    FeatureKind::Polygon,
                    vec![square(e / 8, e * 7 / 8), island],
                )],
            ),
            layer(
                "building",
                vec![feature(4, FeatureKind::Point, vec![vec![[e / 2, e * 3 / 4]]])],
            ),
        ],
    }
}
