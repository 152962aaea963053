//! The per-frame orchestration: visibility, fetch-or-reuse, meshing, draw.
//!
//! One [`FrameLoop::run_frame`] call:
//!
//! 1. folds finished fetches into the cache without waiting for any;
//! 2. refreshes the view matrix;
//! 3. selects the visible tiles and dispatches fetches for absent ones;
//! 4. re-tessellates the lines of every visible resolved tile on the pool
//!    (line width follows the zoom) and waits for the whole batch;
//! 5. uploads the meshes and submits one frame drawing those tiles.
//!
//! Fetches are fire-and-forget: a frame never waits for one.

use std::sync::Arc;

use foundation::TileId;
use foundation::math::Vec3;
use futures::future::{BoxFuture, join_all};
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use gpu::{DeviceError, RenderDevice, RenderFrame};
use layers::{TileRenderState, line_thickness};
use runtime::{DispatchOptions, PoolError};
use scene::tiles_in_view;
use streaming::{CacheError, MapTile, TileSource, TileState};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ViewerConfig};
use crate::context::AppContext;
use crate::worker::{WorkerAction, WorkerReply};

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to start the worker pool")]
    Pool(#[from] PoolError),
    #[error("mesh job for layer {layer} of tile {tile} failed")]
    Task {
        tile: TileId,
        layer: &'static str,
        #[source]
        source: PoolError,
    },
    #[error("worker answered a request for tile {tile} with the wrong reply")]
    UnexpectedReply { tile: TileId },
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// What one frame did.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    pub visible: usize,
    pub rendered: usize,
    pub pending: usize,
    pub fetches_completed: usize,
    pub fetches_dispatched: usize,
    pub mesh_jobs: usize,
    pub draw_commands: usize,
    pub triangles: u64,
}

type FetchFuture = BoxFuture<'static, (TileId, Result<WorkerReply, PoolError>)>;

pub struct FrameLoop<D: RenderDevice> {
    ctx: AppContext<D>,
    fetches: FuturesUnordered<FetchFuture>,
    frame_index: u64,
}

impl<D: RenderDevice> FrameLoop<D> {
    pub fn new(config: &ViewerConfig, device: D, source: Arc<dyn TileSource>) -> Result<Self, ViewerError> {
        Ok(Self {
            ctx: AppContext::new(config, device, source)?,
            fetches: FuturesUnordered::new(),
            frame_index: 0,
        })
    }

    pub fn context(&self) -> &AppContext<D> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut AppContext<D> {
        &mut self.ctx
    }

    pub fn frames_run(&self) -> u64 {
        self.frame_index
    }

    pub fn pointer_down(&mut self, button: u16) {
        self.ctx.controls.on_pointer_down(button);
    }

    pub fn pointer_up(&mut self) {
        self.ctx.controls.on_pointer_up();
    }

    pub fn pointer_move(&mut self, movement: [f64; 2]) -> Result<(), ViewerError> {
        if let Some(write) = self.ctx.controls.on_pointer_move(&mut self.ctx.camera, movement) {
            self.ctx.apply(write)?;
        }
        Ok(())
    }

    pub fn wheel(&mut self, delta_y: f64) -> Result<(), ViewerError> {
        let write = self.ctx.controls.on_wheel(&mut self.ctx.camera, delta_y);
        self.ctx.apply(write)
    }

    /// Clamp the new size to what the device supports, replace the depth
    /// texture and re-derive the projection.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), ViewerError> {
        let dims = gpu::clamp_texture_dims([width, height], self.ctx.device.max_texture_dimension_2d());

        let write = self.ctx.camera.set_map_dims(dims);
        self.ctx.apply(write)?;
        let old = std::mem::replace(&mut self.ctx.depth_texture, self.ctx.device.create_depth_texture(dims));
        self.ctx.device.destroy_texture(old)?;

        info!(width = dims[0], height = dims[1], "map resized");
        Ok(())
    }

    pub async fn run_frame(&mut self) -> Result<FrameReport, ViewerError> {
        let frame = self.frame_index;
        self.frame_index += 1;

        let fetches_completed = self.drain_fetches()?;

        let write = self.ctx.camera.update_view_matrix();
        self.ctx.apply(write)?;

        let visible = tiles_in_view(&self.ctx.camera);
        let mut ready = Vec::new();
        let mut fetches_dispatched = 0;
        for &id in &visible {
            match self.ctx.cache.state(id) {
                TileState::Absent => {
                    self.dispatch_fetch(id)?;
                    fetches_dispatched += 1;
                }
                TileState::Pending => {}
                TileState::Resolved => ready.push(id),
            }
        }

        let mesh_jobs = self.remesh(&ready).await?;
        self.upload(&ready)?;

        let render_frame = self.build_frame(&ready);
        let draw_commands = render_frame.commands.len();
        let triangles = render_frame.triangle_count();
        self.ctx.device.submit(render_frame);

        let report = FrameReport {
            frame,
            visible: visible.len(),
            rendered: ready.len(),
            pending: self.ctx.cache.pending_count(),
            fetches_completed,
            fetches_dispatched,
            mesh_jobs,
            draw_commands,
            triangles,
        };
        debug!(
            frame,
            zoom = self.ctx.camera.zoom(),
            visible = report.visible,
            rendered = report.rendered,
            pending = report.pending,
            dispatched = report.fetches_dispatched,
            draws = report.draw_commands,
            "frame done"
        );
        Ok(report)
    }

    /// Wait for every fetch in flight and fold it into the cache.
    pub async fn wait_for_fetches(&mut self) -> Result<usize, ViewerError> {
        let mut completed = 0;
        while let Some((id, result)) = self.fetches.next().await {
            self.complete_fetch(id, result)?;
            completed += 1;
        }
        Ok(completed)
    }

    /// Abort in-flight fetches, free GPU buffers and stop the workers.
    /// Hands the device back.
    pub fn shutdown(self) -> Result<D, ViewerError> {
        let Self { mut ctx, fetches, .. } = self;

        let aborted = ctx.cache.abort_pending();
        drop(fetches);
        for state in ctx.render.values_mut() {
            state.release(&mut ctx.device)?;
        }
        ctx.device.destroy_texture(ctx.depth_texture)?;

        let AppContext { pool, device, .. } = ctx;
        drop(pool);
        info!(aborted, "map shut down");
        Ok(device)
    }

    fn dispatch_fetch(&mut self, id: TileId) -> Result<(), ViewerError> {
        let abort = self.ctx.cache.mark_pending(id)?;
        let handle = self
            .ctx
            .pool
            .dispatch(WorkerAction::FetchTile { id }, DispatchOptions::with_signal(abort));
        debug!(tile = %id, task = %handle.id(), "fetch dispatched");
        self.fetches.push(handle.map(move |result| (id, result)).boxed());
        Ok(())
    }

    fn drain_fetches(&mut self) -> Result<usize, ViewerError> {
        let mut completed = 0;
        while let Some(Some((id, result))) = self.fetches.next().now_or_never() {
            self.complete_fetch(id, result)?;
            completed += 1;
        }
        Ok(completed)
    }

    fn complete_fetch(&mut self, id: TileId, result: Result<WorkerReply, PoolError>) -> Result<(), ViewerError> {
        let tile = match result {
            Ok(WorkerReply::Tile(tile)) => tile,
            Ok(WorkerReply::Mesh { .. }) => return Err(ViewerError::UnexpectedReply { tile: id }),
            Err(err) => {
                warn!(tile = %id, error = %err, "fetch task failed; using empty tile");
                MapTile::empty(id)
            }
        };
        let state = TileRenderState::for_tile(&tile);
        self.ctx.cache.resolve(tile)?;
        self.ctx.render.insert(id, state);
        Ok(())
    }

    async fn remesh(&mut self, ready: &[TileId]) -> Result<usize, ViewerError> {
        let ctx = &mut self.ctx;
        let thickness = line_thickness(ctx.line_thickness, ctx.camera.zoom());

        let mut jobs = Vec::new();
        let mut handles = Vec::new();
        for &id in ready {
            let (Some(tile), Some(state)) = (ctx.cache.get(id), ctx.render.get_mut(&id)) else {
                continue;
            };
            for (name, layer_state) in state.layers_mut() {
                let Some(layer) = tile.layer(name) else {
                    continue;
                };
                let Some(buffers) = layer_state.take_mesh() else {
                    continue;
                };
                let action = WorkerAction::LinestringsToMesh {
                    linestrings: Arc::clone(&layer.linestrings),
                    view_point: Vec3::ZERO,
                    thickness,
                    buffers,
                };
                handles.push(ctx.pool.dispatch(action, DispatchOptions::default()));
                jobs.push((id, name));
            }
        }

        // Every reply is folded back before an error is reported, so no
        // layer is left without its buffers.
        let count = jobs.len();
        let replies = join_all(handles).await;
        let mut first_error = None;
        for ((id, name), reply) in jobs.into_iter().zip(replies) {
            let (Some(tile), Some(layer_state)) = (
                ctx.cache.get(id),
                ctx.render.get_mut(&id).and_then(|s| s.layer_mut(name)),
            ) else {
                continue;
            };
            match reply {
                Ok(WorkerReply::Mesh { buffers, output }) => layer_state.finish_mesh(buffers, output),
                Ok(WorkerReply::Tile(_)) => {
                    if let Some(layer) = tile.layer(name) {
                        layer_state.reset_mesh(layer);
                    }
                    first_error.get_or_insert(ViewerError::UnexpectedReply { tile: id });
                }
                Err(source) => {
                    warn!(tile = %id, layer = name, error = %source, "mesh job failed");
                    if let Some(layer) = tile.layer(name) {
                        layer_state.reset_mesh(layer);
                    }
                    first_error.get_or_insert(ViewerError::Task {
                        tile: id,
                        layer: name,
                        source,
                    });
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(count),
        }
    }

    fn upload(&mut self, ready: &[TileId]) -> Result<(), ViewerError> {
        let ctx = &mut self.ctx;
        for id in ready {
            if let (Some(tile), Some(state)) = (ctx.cache.get(*id), ctx.render.get_mut(id)) {
                state.upload(&mut ctx.device, tile)?;
            }
        }
        Ok(())
    }

    fn build_frame(&self, ready: &[TileId]) -> RenderFrame {
        let mut frame = RenderFrame::new(
            self.ctx.depth_texture,
            self.ctx.uniforms.projection_buffer(),
            self.ctx.uniforms.view_buffer(),
        );
        for id in ready {
            if let Some(state) = self.ctx.render.get(id) {
                state.draw(&mut frame);
            }
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameLoop, ViewerError};
    use crate::config::ViewerConfig;
    use crate::sources::SyntheticSource;
    use foundation::TileId;
    use gpu::{DrawCommand, HeadlessDevice, RenderDevice};
    use layers::{MeshBuffers, MeshOutput};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn frame_loop(source: Arc<SyntheticSource>) -> FrameLoop<HeadlessDevice> {
        FrameLoop::new(&ViewerConfig::default(), HeadlessDevice::new(), source).unwrap()
    }

    fn labels(device: &HeadlessDevice) -> Vec<(String, &'static str)> {
        device
            .last_frame()
            .unwrap()
            .commands
            .iter()
            .map(|c| match c {
                DrawCommand::Lines { label, .. } => (label.clone(), "lines"),
                DrawCommand::Polygons { label, .. } => (label.clone(), "polygons"),
            })
            .collect()
    }

    #[tokio::test]
    async fn zoom_zero_streams_only_the_root_tile() {
        let mut map = frame_loop(Arc::new(SyntheticSource::new()));

        let first = map.run_frame().await.unwrap();
        assert_eq!(first.visible, 1);
        assert_eq!(first.fetches_dispatched, 1);
        assert_eq!(first.rendered, 0);
        assert_eq!(first.draw_commands, 0);
        assert_eq!(map.context().device.stats().frames_submitted, 1);

        assert_eq!(map.wait_for_fetches().await.unwrap(), 1);
        assert!(map.context().cache.get(TileId::ROOT).is_some());
    }

    #[tokio::test]
    async fn resolved_tiles_are_meshed_and_drawn() {
        let mut map = frame_loop(Arc::new(SyntheticSource::new()));
        map.run_frame().await.unwrap();
        map.wait_for_fetches().await.unwrap();

        let report = map.run_frame().await.unwrap();
        assert_eq!(report.rendered, 1);
        assert_eq!(report.fetches_dispatched, 0);
        assert_eq!(report.mesh_jobs, 2);
        assert_eq!(report.draw_commands, 3);
        assert!(report.triangles > 0);
        assert_eq!(
            labels(&map.context().device),
            vec![
                ("water".to_string(), "polygons"),
                ("admin".to_string(), "lines"),
                ("road".to_string(), "lines"),
            ]
        );
    }

    #[tokio::test]
    async fn pending_tiles_are_not_fetched_again() {
        let source = Arc::new(SyntheticSource::new().with_latency(Duration::from_millis(200)));
        let mut map = frame_loop(Arc::clone(&source));

        assert_eq!(map.run_frame().await.unwrap().fetches_dispatched, 1);
        for _ in 0..3 {
            let report = map.run_frame().await.unwrap();
            assert_eq!(report.fetches_dispatched, 0);
            assert_eq!(report.pending, 1);
            assert_eq!(report.rendered, 0);
        }

        map.wait_for_fetches().await.unwrap();
        let report = map.run_frame().await.unwrap();
        assert_eq!(report.rendered, 1);
        assert_eq!(report.pending, 0);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn gpu_buffers_survive_across_frames() {
        let mut map = frame_loop(Arc::new(SyntheticSource::new()));
        map.run_frame().await.unwrap();
        map.wait_for_fetches().await.unwrap();

        map.run_frame().await.unwrap();
        let created = map.context().device.stats().buffers_created;
        for _ in 0..3 {
            map.run_frame().await.unwrap();
        }
        let stats = map.context().device.stats();
        assert_eq!(stats.buffers_created, created);
        assert_eq!(stats.buffers_destroyed, 0);
    }

    #[tokio::test]
    async fn zooming_in_requests_finer_tiles() {
        let mut map = frame_loop(Arc::new(SyntheticSource::new()));
        map.wheel(-70.0 * 3.5).unwrap();
        assert!((map.context().camera.zoom() - 3.5).abs() < 1e-9);

        let report = map.run_frame().await.unwrap();
        assert!(report.visible > 1);
        assert_eq!(report.fetches_dispatched, report.visible);
        map.wait_for_fetches().await.unwrap();
        assert_eq!(map.context().cache.resolved_count(), report.visible);
    }

    #[tokio::test]
    async fn dragging_moves_the_camera() {
        let mut map = frame_loop(Arc::new(SyntheticSource::new()));
        map.pointer_move([100.0, 0.0]).unwrap();
        assert_eq!(map.context().camera.lng(), 0.0);

        map.pointer_down(0);
        map.pointer_move([128.0, 0.0]).unwrap();
        map.pointer_up();
        // 1280 px wide map at zoom 0: 128 px is 36 degrees.
        assert!((map.context().camera.lng() + 36.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn resize_replaces_the_depth_texture() {
        let mut map = frame_loop(Arc::new(SyntheticSource::new()));
        let before = map.context().depth_texture;

        map.resize(640, 480).unwrap();
        let ctx = map.context();
        assert_ne!(ctx.depth_texture, before);
        assert_eq!(ctx.device.live_textures(), 1);
        assert_eq!(ctx.device.texture_size(ctx.depth_texture), Some([640, 480]));
        assert_eq!(ctx.camera.map_dims(), [640, 480]);

        map.resize(100_000, 0).unwrap();
        let ctx = map.context();
        assert_eq!(ctx.device.texture_size(ctx.depth_texture), Some([8192, 1]));

        map.run_frame().await.unwrap();
        assert_eq!(
            map.context().device.last_frame().unwrap().depth.texture,
            map.context().depth_texture
        );
    }

    #[tokio::test]
    async fn failed_resize_keeps_the_old_surface() {
        let mut map = frame_loop(Arc::new(SyntheticSource::new()));
        let before = map.context().depth_texture;
        let projection = map.context().uniforms.projection_buffer();
        map.context_mut().device.destroy_buffer(projection).unwrap();

        assert!(matches!(map.resize(640, 480), Err(ViewerError::Device(_))));
        let ctx = map.context();
        assert_eq!(ctx.depth_texture, before);
        assert_eq!(ctx.device.live_textures(), 1);
        assert_eq!(ctx.device.texture_size(before), Some([1280, 720]));
    }

    #[tokio::test]
    async fn zero_texture_limit_still_gets_a_surface() {
        let device = HeadlessDevice::with_max_texture_dimension(0);
        let source = Arc::new(SyntheticSource::new());
        let mut map = FrameLoop::new(&ViewerConfig::default(), device, source).unwrap();
        assert_eq!(map.context().camera.map_dims(), [1, 1]);

        map.resize(640, 480).unwrap();
        let ctx = map.context();
        assert_eq!(ctx.device.texture_size(ctx.depth_texture), Some([1, 1]));
    }

    #[tokio::test]
    async fn failed_mesh_job_keeps_the_other_layers() {
        let mut map = frame_loop(Arc::new(SyntheticSource::new()));
        map.run_frame().await.unwrap();
        map.wait_for_fetches().await.unwrap();

        // Undersized buffers make the road job fail inside the worker.
        let road = map.context_mut().render.get_mut(&TileId::ROOT).unwrap().layer_mut("road").unwrap();
        let _ = road.take_mesh();
        road.finish_mesh(MeshBuffers::default(), MeshOutput::default());

        match map.run_frame().await {
            Err(ViewerError::Task { tile, layer, .. }) => {
                assert_eq!(tile, TileId::ROOT);
                assert_eq!(layer, "road");
            }
            other => panic!("expected a task error, got {other:?}"),
        }

        let state = map.context_mut().render.get_mut(&TileId::ROOT).unwrap();
        for name in ["admin", "road"] {
            let layer = state.layer_mut(name).unwrap();
            let buffers = layer.take_mesh().unwrap_or_else(|| panic!("{name} lost its buffers"));
            assert!(buffers.point_capacity() > 0);
            layer.finish_mesh(buffers, MeshOutput::default());
        }

        let report = map.run_frame().await.unwrap();
        assert_eq!(report.mesh_jobs, 2);
        assert!(report.triangles > 0);
    }

    #[tokio::test]
    async fn shutdown_aborts_in_flight_fetches() {
        let source = Arc::new(SyntheticSource::new().with_latency(Duration::from_secs(30)));
        let mut map = frame_loop(Arc::clone(&source));
        map.run_frame().await.unwrap();

        // Only a fetch that has reached its worker can be aborted.
        while source.fetch_count() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let started = Instant::now();
        let device = map.shutdown().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(device.live_textures(), 0);
    }
}
