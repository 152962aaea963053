use std::path::{Path, PathBuf};

use clap::Parser;
use layers::BASE_LINE_THICKNESS;
use runtime::DEFAULT_POOL_SIZE;
use scene::{DEFAULT_FAR, DEFAULT_FOV_X_DEG, DEFAULT_NEAR, Projection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Headless globe vector map viewer")]
pub struct Cli {
    /// JSON config file; flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of background workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Read tiles from `<DIR>/<z>/<x>/<y>.json` instead of generating them
    #[arg(long, value_name = "DIR")]
    pub tiles: Option<PathBuf>,

    /// Simulated fetch latency of the synthetic source, in milliseconds
    #[arg(long)]
    pub latency_ms: Option<u64>,

    /// Initial camera longitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub lng: Option<f64>,

    /// Initial camera latitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Initial zoom level
    #[arg(long)]
    pub zoom: Option<f64>,

    /// Map width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Map height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Number of frames to render before exiting
    #[arg(long)]
    pub frames: Option<u64>,

    /// Milliseconds between frames
    #[arg(long)]
    pub frame_interval_ms: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Synthetic {
        #[serde(default)]
        latency_ms: u64,
    },
    Directory {
        root: PathBuf,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Synthetic { latency_ms: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub lng: f64,
    pub lat: f64,
    pub zoom: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            lng: 0.0,
            lat: 0.0,
            zoom: 0.0,
        }
    }
}

/// Scripted input applied before every frame, as if the user kept dragging
/// and scrolling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Pointer delta in pixels.
    pub drag: [f64; 2],
    /// Wheel delta; negative zooms in.
    pub wheel: f64,
}

impl AnimationConfig {
    pub fn is_idle(&self) -> bool {
        self.drag == [0.0, 0.0] && self.wheel == 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub workers: usize,
    pub fov_x_deg: f64,
    pub near: f64,
    pub far: f64,
    pub line_thickness: f64,
    pub map_size: [u32; 2],
    pub max_texture_dimension: u32,
    pub camera: CameraConfig,
    pub frames: u64,
    pub frame_interval_ms: u64,
    pub animation: AnimationConfig,
    pub source: SourceConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_POOL_SIZE,
            fov_x_deg: DEFAULT_FOV_X_DEG,
            near: DEFAULT_NEAR,
            far: DEFAULT_FAR,
            line_thickness: BASE_LINE_THICKNESS,
            map_size: [1280, 720],
            max_texture_dimension: gpu::DEFAULT_MAX_TEXTURE_DIMENSION_2D,
            camera: CameraConfig::default(),
            frames: 120,
            frame_interval_ms: 16,
            animation: AnimationConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

impl ViewerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Config file (if any) with command-line overrides applied on top.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(workers) = cli.workers {
            self.workers = workers;
        }
        if let Some(root) = &cli.tiles {
            self.source = SourceConfig::Directory { root: root.clone() };
        } else if let Some(latency_ms) = cli.latency_ms {
            self.source = SourceConfig::Synthetic { latency_ms };
        }
        if let Some(lng) = cli.lng {
            self.camera.lng = lng;
        }
        if let Some(lat) = cli.lat {
            self.camera.lat = lat;
        }
        if let Some(zoom) = cli.zoom {
            self.camera.zoom = zoom;
        }
        if let Some(width) = cli.width {
            self.map_size[0] = width;
        }
        if let Some(height) = cli.height {
            self.map_size[1] = height;
        }
        if let Some(frames) = cli.frames {
            self.frames = frames;
        }
        if let Some(ms) = cli.frame_interval_ms {
            self.frame_interval_ms = ms;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if !(self.fov_x_deg > 0.0 && self.fov_x_deg < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "fov_x_deg must be in (0, 180), got {}",
                self.fov_x_deg
            )));
        }
        if !(self.near > 0.0 && self.near < self.far) {
            return Err(ConfigError::Invalid(format!(
                "need 0 < near < far, got near={} far={}",
                self.near, self.far
            )));
        }
        if !(self.line_thickness > 0.0) {
            return Err(ConfigError::Invalid("line_thickness must be positive".into()));
        }
        if self.max_texture_dimension == 0 {
            return Err(ConfigError::Invalid("max_texture_dimension must be at least 1".into()));
        }
        if self.map_size.contains(&0) {
            return Err(ConfigError::Invalid(format!(
                "map_size must be non-zero, got {:?}",
                self.map_size
            )));
        }
        Ok(())
    }

    pub fn projection(&self) -> Projection {
        Projection {
            fov_x_deg: self.fov_x_deg,
            near: self.near,
            far: self.far,
        }
    }
}
