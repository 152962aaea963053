use crate::device::{BufferId, TextureId};

/// Background the color attachment clears to.
pub const CLEAR_COLOR: [f64; 4] = [0.0, 0.0, 0.0, 1.0];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DepthCompare {
    Greater,
    Less,
}

/// Reversed depth: clear to 0, keep fragments with greater depth.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DepthAttachment {
    pub texture: TextureId,
    pub clear_value: f32,
    pub compare: DepthCompare,
}

impl DepthAttachment {
    pub fn reversed(texture: TextureId) -> Self {
        Self {
            texture,
            clear_value: 0.0,
            compare: DepthCompare::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Lines {
        label: String,
        color: [f32; 3],
        index: BufferId,
        vertex: BufferId,
        uv: BufferId,
        num_indices: u32,
    },
    Polygons {
        label: String,
        color: [f32; 3],
        index: BufferId,
        vertex: BufferId,
        num_indices: u32,
    },
}

impl DrawCommand {
    pub fn num_indices(&self) -> u32 {
        match self {
            DrawCommand::Lines { num_indices, .. } | DrawCommand::Polygons { num_indices, .. } => {
                *num_indices
            }
        }
    }
}

/// One command buffer worth of draws.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFrame {
    pub clear_color: [f64; 4],
    pub depth: DepthAttachment,
    pub projection: BufferId,
    pub view: BufferId,
    pub commands: Vec<DrawCommand>,
}

impl RenderFrame {
    pub fn new(depth_texture: TextureId, projection: BufferId, view: BufferId) -> Self {
        Self {
            clear_color: CLEAR_COLOR,
            depth: DepthAttachment::reversed(depth_texture),
            projection,
            view,
            commands: Vec::new(),
        }
    }

    /// Empty draws are dropped here rather than issued.
    pub fn push(&mut self, command: DrawCommand) {
        if command.num_indices() > 0 {
            self.commands.push(command);
        }
    }

    pub fn triangle_count(&self) -> u64 {
        self.commands
            .iter()
            .map(|c| u64::from(c.num_indices() / 3))
            .sum()
    }
}
