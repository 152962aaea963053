use tracing::debug;

use crate::device::{BufferDescriptor, BufferId, BufferUsage, DeviceError, RenderDevice};

/// A GPU buffer that is created on first upload and reused afterwards.
///
/// The buffer is only replaced when an upload needs more room than it has;
/// the old buffer is destroyed at that point.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BufferSlot {
    current: Option<(BufferId, u64)>,
}

impl BufferSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<BufferId> {
        self.current.map(|(id, _)| id)
    }

    pub fn capacity(&self) -> u64 {
        self.current.map(|(_, size)| size).unwrap_or(0)
    }

    /// Write `data` at offset 0, allocating at least `min_capacity` bytes.
    pub fn upload(
        &mut self,
        device: &mut dyn RenderDevice,
        label: &str,
        usage: BufferUsage,
        min_capacity: u64,
        data: &[u8],
    ) -> Result<BufferId, DeviceError> {
        let needed = min_capacity.max(data.len() as u64);
        let id = match self.current {
            Some((id, size)) if size >= needed => id,
            stale => {
                if let Some((old, old_size)) = stale {
                    debug!(label, old_size, needed, "growing buffer");
                    device.destroy_buffer(old)?;
                }
                let id = device.create_buffer(&BufferDescriptor::new(label, needed, usage));
                self.current = Some((id, needed));
                id
            }
        };

        if !data.is_empty() {
            device.write_buffer(id, 0, data)?;
        }
        Ok(id)
    }

    pub fn release(&mut self, device: &mut dyn RenderDevice) -> Result<(), DeviceError> {
        match self.current.take() {
            Some((id, _)) => device.destroy_buffer(id),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BufferSlot;
    use crate::device::{BufferUsage, HeadlessDevice};

    #[test]
    fn reuses_until_it_must_grow() {
        let mut device = HeadlessDevice::new();
        let mut slot = BufferSlot::new();

        let first = slot
            .upload(&mut device, "lines", BufferUsage::Vertex, 16, &[1; 8])
            .unwrap();
        let again = slot
            .upload(&mut device, "lines", BufferUsage::Vertex, 16, &[2; 16])
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(device.stats().buffers_created, 1);

        let grown = slot
            .upload(&mut device, "lines", BufferUsage::Vertex, 0, &[3; 32])
            .unwrap();
        assert_ne!(grown, first);
        assert_eq!(slot.capacity(), 32);
        assert!(device.buffer(first).is_none());
        assert_eq!(device.live_buffers(), 1);

        slot.release(&mut device).unwrap();
        assert_eq!(slot.id(), None);
        assert_eq!(device.live_buffers(), 0);
    }
}
