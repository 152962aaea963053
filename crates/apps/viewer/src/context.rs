use std::collections::BTreeMap;
use std::sync::Arc;

use foundation::TileId;
use gpu::{CameraUniforms, RenderDevice, TextureId};
use layers::TileRenderState;
use runtime::WorkerPool;
use scene::{CameraStore, GlobeControls, UniformWrite};
use streaming::{TileCache, TileSource};
use tracing::info;

use crate::config::ViewerConfig;
use crate::frame_loop::ViewerError;
use crate::worker::MapWorker;

/// Everything one map instance owns. Only the frame loop's thread touches it;
/// workers see nothing but the actions sent to them.
pub struct AppContext<D: RenderDevice> {
    pub camera: CameraStore,
    pub controls: GlobeControls,
    pub cache: TileCache,
    pub pool: WorkerPool<MapWorker>,
    pub device: D,
    pub uniforms: CameraUniforms,
    pub depth_texture: TextureId,
    /// GPU state of resolved tiles, kept alongside the cache.
    pub render: BTreeMap<TileId, TileRenderState>,
    pub line_thickness: f64,
}

impl<D: RenderDevice> AppContext<D> {
    pub fn new(config: &ViewerConfig, mut device: D, source: Arc<dyn TileSource>) -> Result<Self, ViewerError> {
        let dims = gpu::clamp_texture_dims(config.map_size, device.max_texture_dimension_2d());

        let mut camera = CameraStore::with_projection(dims, config.projection());
        let _ = camera.set_lng_lat(config.camera.lng, config.camera.lat);
        let _ = camera.set_zoom(config.camera.zoom);
        let _ = camera.update_view_matrix();

        let uniforms = CameraUniforms::new(&mut device, &camera)?;
        let depth_texture = device.create_depth_texture(camera.map_dims());
        let pool = WorkerPool::new(MapWorker::new(source), config.workers)?;

        info!(
            workers = pool.size(),
            width = dims[0],
            height = dims[1],
            lng = camera.lng(),
            lat = camera.lat(),
            zoom = camera.zoom(),
            "map context ready"
        );

        Ok(Self {
            camera,
            controls: GlobeControls::new(),
            cache: TileCache::new(),
            pool,
            device,
            uniforms,
            depth_texture,
            render: BTreeMap::new(),
            line_thickness: config.line_thickness,
        })
    }

    pub fn apply(&mut self, write: UniformWrite) -> Result<(), ViewerError> {
        self.uniforms.apply(&mut self.device, write)?;
        Ok(())
    }
}
