//! GPU-side state of a resolved tile.
//!
//! Each render layer a tile carries gets a [`LayerRenderState`]: the CPU mesh
//! buffers its lines are re-tessellated into every frame, plus the GPU
//! buffers they are uploaded to. Polygon meshes do not depend on the camera
//! and are uploaded once.

use std::collections::BTreeMap;

use foundation::TileId;
use gpu::{BufferSlot, BufferUsage, DeviceError, DrawCommand, RenderDevice, RenderFrame};
use streaming::{MapLayer, MapTile, PolygonMesh};
use tracing::trace;

use crate::line_mesh::{MeshBuffers, MeshOutput};
use crate::symbology::{RENDER_LAYERS, RenderLayer};

fn byte_len<T>(items: &[T]) -> u64 {
    std::mem::size_of_val(items) as u64
}

#[derive(Debug, Default)]
pub struct LayerRenderState {
    /// `None` while a mesh job holds the buffers.
    mesh: Option<MeshBuffers>,
    has_lines: bool,
    output: Option<MeshOutput>,
    line_index: BufferSlot,
    line_vertex: BufferSlot,
    line_uv: BufferSlot,
    polygon_index: BufferSlot,
    polygon_vertex: BufferSlot,
    polygon_indices: u32,
    polygons_uploaded: bool,
}

impl LayerRenderState {
    pub fn new(layer: &MapLayer) -> Self {
        let has_lines = !layer.linestrings.is_empty();
        Self {
            mesh: has_lines.then(|| MeshBuffers::for_linestrings(layer.linestrings.as_slice())),
            has_lines,
            ..Self::default()
        }
    }

    pub fn has_lines(&self) -> bool {
        self.has_lines
    }

    /// Lend the mesh buffers to a tessellation job.
    pub fn take_mesh(&mut self) -> Option<MeshBuffers> {
        self.mesh.take()
    }

    /// Get the buffers back from a finished job.
    pub fn finish_mesh(&mut self, buffers: MeshBuffers, output: MeshOutput) {
        self.mesh = Some(buffers);
        self.output = Some(output);
    }

    /// Replace buffers lost with a failed job. The lines draw nothing until
    /// the next tessellation succeeds.
    pub fn reset_mesh(&mut self, layer: &MapLayer) {
        if self.has_lines && self.mesh.is_none() {
            self.mesh = Some(MeshBuffers::for_linestrings(layer.linestrings.as_slice()));
            self.output = None;
        }
    }

    pub fn line_indices(&self) -> u32 {
        self.output.map(|o| o.num_indices).unwrap_or(0)
    }

    /// Write the filled part of the line mesh. GPU buffers are sized for the
    /// worst case the first time and only replaced if that ever grows.
    pub fn upload_lines(&mut self, device: &mut dyn RenderDevice, name: &str) -> Result<(), DeviceError> {
        let (Some(mesh), Some(output)) = (&self.mesh, self.output) else {
            return Ok(());
        };
        let cursor = output.cursor;

        self.line_index.upload(
            device,
            &format!("layer {name} linestrings index buffer"),
            BufferUsage::Index,
            byte_len(&mesh.indices),
            bytemuck::cast_slice(&mesh.indices[..cursor.indices]),
        )?;
        self.line_vertex.upload(
            device,
            &format!("layer {name} linestrings vertex buffer"),
            BufferUsage::Vertex,
            byte_len(&mesh.vertices),
            bytemuck::cast_slice(&mesh.vertices[..cursor.vertices]),
        )?;
        self.line_uv.upload(
            device,
            &format!("layer {name} linestrings UV buffer"),
            BufferUsage::Vertex,
            byte_len(&mesh.uvs),
            bytemuck::cast_slice(&mesh.uvs[..cursor.uvs]),
        )?;
        Ok(())
    }

    pub fn upload_polygons(
        &mut self,
        device: &mut dyn RenderDevice,
        name: &str,
        polygons: &PolygonMesh,
    ) -> Result<(), DeviceError> {
        if self.polygons_uploaded || polygons.is_empty() {
            return Ok(());
        }
        self.polygon_index.upload(
            device,
            &format!("layer {name} polygons index buffer"),
            BufferUsage::Index,
            0,
            bytemuck::cast_slice(&polygons.indices),
        )?;
        self.polygon_vertex.upload(
            device,
            &format!("layer {name} polygons vertex buffer"),
            BufferUsage::Vertex,
            0,
            bytemuck::cast_slice(&polygons.vertices),
        )?;
        self.polygon_indices = polygons.num_indices();
        self.polygons_uploaded = true;
        Ok(())
    }

    pub fn draw(&self, frame: &mut RenderFrame, style: &RenderLayer) {
        if let (Some(index), Some(vertex), Some(uv)) =
            (self.line_index.id(), self.line_vertex.id(), self.line_uv.id())
        {
            frame.push(DrawCommand::Lines {
                label: style.name.to_string(),
                color: style.color,
                index,
                vertex,
                uv,
                num_indices: self.line_indices(),
            });
        }
        if let (Some(index), Some(vertex)) = (self.polygon_index.id(), self.polygon_vertex.id()) {
            frame.push(DrawCommand::Polygons {
                label: style.name.to_string(),
                color: style.color,
                index,
                vertex,
                num_indices: self.polygon_indices,
            });
        }
    }

    pub fn release(&mut self, device: &mut dyn RenderDevice) -> Result<(), DeviceError> {
        for slot in [
            &mut self.line_index,
            &mut self.line_vertex,
            &mut self.line_uv,
            &mut self.polygon_index,
            &mut self.polygon_vertex,
        ] {
            slot.release(device)?;
        }
        self.polygons_uploaded = false;
        Ok(())
    }
}

/// Render state for the render layers a tile actually has.
#[derive(Debug)]
pub struct TileRenderState {
    id: TileId,
    layers: BTreeMap<&'static str, LayerRenderState>,
}

impl TileRenderState {
    pub fn for_tile(tile: &MapTile) -> Self {
        let layers = RENDER_LAYERS
            .iter()
            .filter_map(|style| {
                tile.layer(style.name)
                    .map(|layer| (style.name, LayerRenderState::new(layer)))
            })
            .collect();
        Self { id: tile.id, layers }
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut LayerRenderState> {
        self.layers.get_mut(name)
    }

    pub fn layers_mut(&mut self) -> impl Iterator<Item = (&'static str, &mut LayerRenderState)> + '_ {
        self.layers.iter_mut().map(|(name, state)| (*name, state))
    }

    /// Upload every layer's current meshes.
    pub fn upload(&mut self, device: &mut dyn RenderDevice, tile: &MapTile) -> Result<(), DeviceError> {
        for (name, state) in &mut self.layers {
            state.upload_lines(device, name)?;
            if let Some(layer) = tile.layer(name) {
                state.upload_polygons(device, name, &layer.polygons)?;
            }
        }
        Ok(())
    }

    /// Push this tile's draws in palette order.
    pub fn draw(&self, frame: &mut RenderFrame) -> usize {
        let before = frame.commands.len();
        for style in &RENDER_LAYERS {
            if let Some(state) = self.layers.get(style.name) {
                state.draw(frame, style);
            }
        }
        let pushed = frame.commands.len() - before;
        trace!(tile = %self.id, draws = pushed, "tile drawn");
        pushed
    }

    pub fn release(&mut self, device: &mut dyn RenderDevice) -> Result<(), DeviceError> {
        for state in self.layers.values_mut() {
            state.release(device)?;
        }
        Ok(())
    }
}
