//! The seam between the frame loop and a GPU.
//!
//! [`RenderDevice`] covers the handful of calls the map renderer makes:
//! buffer create/write/destroy, the depth texture, and frame submission.
//! [`HeadlessDevice`] keeps everything in memory and is what the viewer
//! binary and the tests run against.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::trace;

use crate::renderer::RenderFrame;

/// Largest 2D texture edge the headless device reports, matching the
/// WebGPU default limit.
pub const DEFAULT_MAX_TEXTURE_DIMENSION_2D: u32 = 8192;

/// Clamps a requested surface size into `1..=max` per axis. A device that
/// reports a zero limit still gets a 1x1 surface.
pub fn clamp_texture_dims(dims: [u32; 2], max: u32) -> [u32; 2] {
    let max = max.max(1);
    dims.map(|d| d.clamp(1, max))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BufferUsage {
    Index,
    Vertex,
    Uniform,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    pub fn new(label: impl Into<String>, size: u64, usage: BufferUsage) -> Self {
        Self {
            label: label.into(),
            size,
            usage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("unknown or destroyed buffer {0:?}")]
    UnknownBuffer(BufferId),
    #[error("write of {len} bytes at offset {offset} overflows buffer {buffer:?} of {size} bytes")]
    WriteOutOfBounds {
        buffer: BufferId,
        offset: u64,
        len: usize,
        size: u64,
    },
    #[error("unknown or destroyed texture {0:?}")]
    UnknownTexture(TextureId),
}

pub trait RenderDevice {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BufferId;

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8])
    -> Result<(), DeviceError>;

    fn destroy_buffer(&mut self, buffer: BufferId) -> Result<(), DeviceError>;

    fn create_depth_texture(&mut self, size: [u32; 2]) -> TextureId;

    fn destroy_texture(&mut self, texture: TextureId) -> Result<(), DeviceError>;

    fn max_texture_dimension_2d(&self) -> u32;

    fn submit(&mut self, frame: RenderFrame);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessBuffer {
    pub label: String,
    pub usage: BufferUsage,
    pub data: Vec<u8>,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DeviceStats {
    pub buffers_created: u64,
    pub buffers_destroyed: u64,
    pub bytes_written: u64,
    pub textures_created: u64,
    pub frames_submitted: u64,
}

/// In-memory device. Buffers are plain byte vectors; submitted frames are
/// retained so callers can inspect what would have been drawn.
#[derive(Debug)]
pub struct HeadlessDevice {
    next_id: u64,
    max_texture_dimension_2d: u32,
    buffers: BTreeMap<BufferId, HeadlessBuffer>,
    textures: BTreeMap<TextureId, [u32; 2]>,
    last_frame: Option<RenderFrame>,
    stats: DeviceStats,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::with_max_texture_dimension(DEFAULT_MAX_TEXTURE_DIMENSION_2D)
    }

    pub fn with_max_texture_dimension(max_texture_dimension_2d: u32) -> Self {
        Self {
            next_id: 1,
            max_texture_dimension_2d,
            buffers: BTreeMap::new(),
            textures: BTreeMap::new(),
            last_frame: None,
            stats: DeviceStats::default(),
        }
    }

    pub fn buffer(&self, id: BufferId) -> Option<&HeadlessBuffer> {
        self.buffers.get(&id)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn texture_size(&self, id: TextureId) -> Option<[u32; 2]> {
        self.textures.get(&id).copied()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn last_frame(&self) -> Option<&RenderFrame> {
        self.last_frame.as_ref()
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl RenderDevice for HeadlessDevice {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BufferId {
        let id = BufferId(self.next());
        let size = usize::try_from(desc.size).unwrap_or(usize::MAX);
        self.buffers.insert(
            id,
            HeadlessBuffer {
                label: desc.label.clone(),
                usage: desc.usage,
                data: vec![0; size],
            },
        );
        self.stats.buffers_created += 1;
        trace!(label = %desc.label, size = desc.size, "buffer created");
        id
    }

    fn write_buffer(
        &mut self,
        buffer: BufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let target = self
            .buffers
            .get_mut(&buffer)
            .ok_or(DeviceError::UnknownBuffer(buffer))?;

        let size = target.data.len() as u64;
        let end = offset.checked_add(data.len() as u64);
        let Some(end) = end.filter(|end| *end <= size) else {
            return Err(DeviceError::WriteOutOfBounds {
                buffer,
                offset,
                len: data.len(),
                size,
            });
        };

        target.data[offset as usize..end as usize].copy_from_slice(data);
        self.stats.bytes_written += data.len() as u64;
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) -> Result<(), DeviceError> {
        self.buffers
            .remove(&buffer)
            .ok_or(DeviceError::UnknownBuffer(buffer))?;
        self.stats.buffers_destroyed += 1;
        Ok(())
    }

    fn create_depth_texture(&mut self, size: [u32; 2]) -> TextureId {
        let id = TextureId(self.next());
        self.textures.insert(id, size);
        self.stats.textures_created += 1;
        id
    }

    fn destroy_texture(&mut self, texture: TextureId) -> Result<(), DeviceError> {
        self.textures
            .remove(&texture)
            .map(|_| ())
            .ok_or(DeviceError::UnknownTexture(texture))
    }

    fn max_texture_dimension_2d(&self) -> u32 {
        self.max_texture_dimension_2d
    }

    fn submit(&mut self, frame: RenderFrame) {
        self.stats.frames_submitted += 1;
        self.last_frame = Some(frame);
    }
}
