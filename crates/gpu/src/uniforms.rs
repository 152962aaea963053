use scene::{CameraStore, UniformTarget, UniformWrite};

use crate::device::{BufferDescriptor, BufferId, BufferUsage, DeviceError, RenderDevice};

const MATRIX_BYTES: u64 = 16 * std::mem::size_of::<f32>() as u64;

/// Projection and view matrix uniform buffers shared by every draw.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CameraUniforms {
    projection: BufferId,
    view: BufferId,
}

impl CameraUniforms {
    pub fn new(device: &mut dyn RenderDevice, camera: &CameraStore) -> Result<Self, DeviceError> {
        let uniforms = Self {
            projection: device.create_buffer(&BufferDescriptor::new(
                "projection matrix uniform buffer",
                MATRIX_BYTES,
                BufferUsage::Uniform,
            )),
            view: device.create_buffer(&BufferDescriptor::new(
                "view matrix uniform buffer",
                MATRIX_BYTES,
                BufferUsage::Uniform,
            )),
        };
        for write in camera.uniform_writes() {
            uniforms.apply(device, write)?;
        }
        Ok(uniforms)
    }

    pub fn apply(&self, device: &mut dyn RenderDevice, write: UniformWrite) -> Result<(), DeviceError> {
        let buffer = match write.target {
            UniformTarget::Projection => self.projection,
            UniformTarget::View => self.view,
        };
        device.write_buffer(buffer, 0, bytemuck::cast_slice(&write.matrix))
    }

    pub fn projection_buffer(&self) -> BufferId {
        self.projection
    }

    pub fn view_buffer(&self) -> BufferId {
        self.view
    }
}
