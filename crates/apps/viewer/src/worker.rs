//! What the viewer runs on its worker pool.

use std::convert::Infallible;
use std::sync::Arc;

use foundation::TileId;
use foundation::math::Vec3;
use layers::{MeshBuffers, MeshOutput, linestrings_to_mesh};
use runtime::{Reducer, TaskContext};
use streaming::{LineString, MapTile, TileSource, fetch_tile};
use tracing::trace;

#[derive(Debug)]
pub enum WorkerAction {
    FetchTile {
        id: TileId,
    },
    /// `buffers` travel to the worker and come back in the reply.
    LinestringsToMesh {
        linestrings: Arc<Vec<LineString>>,
        view_point: Vec3,
        thickness: f64,
        buffers: MeshBuffers,
    },
}

#[derive(Debug)]
pub enum WorkerReply {
    Tile(MapTile),
    Mesh {
        buffers: MeshBuffers,
        output: MeshOutput,
    },
}

pub struct MapWorker {
    source: Arc<dyn TileSource>,
}

impl MapWorker {
    pub fn new(source: Arc<dyn TileSource>) -> Self {
        Self { source }
    }
}

impl Reducer for MapWorker {
    type Action = WorkerAction;
    type Reply = WorkerReply;
    // Fetch failures become empty tiles and meshing cannot fail; anything
    // else surfaces as a panic.
    type Error = Infallible;

    fn handle(&self, action: WorkerAction, ctx: &TaskContext) -> Result<WorkerReply, Infallible> {
        match action {
            WorkerAction::FetchTile { id } => {
                let tile = fetch_tile(self.source.as_ref(), id, ctx.signal());
                Ok(WorkerReply::Tile(tile))
            }
            WorkerAction::LinestringsToMesh {
                linestrings,
                view_point,
                thickness,
                mut buffers,
            } => {
                let output = linestrings_to_mesh(linestrings.as_slice(), view_point, thickness, &mut buffers);
                trace!(
                    worker = %ctx.worker(),
                    lines = linestrings.len(),
                    indices = output.num_indices,
                    "mesh built"
                );
                Ok(WorkerReply::Mesh { buffers, output })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MapWorker, WorkerAction, WorkerReply};
    use crate::sources::SyntheticSource;
    use foundation::TileId;
    use foundation::math::Vec3;
    use layers::MeshBuffers;
    use runtime::{DispatchOptions, WorkerPool};
    use std::sync::Arc;

    #[test]
    fn fetch_then_mesh_round_trip() {
        let pool = WorkerPool::new(MapWorker::new(Arc::new(SyntheticSource::new())), 2).unwrap();

        let reply = pool
            .dispatch(WorkerAction::FetchTile { id: TileId::ROOT }, DispatchOptions::default())
            .wait()
            .unwrap();
        let WorkerReply::Tile(tile) = reply else {
            panic!("expected a tile");
        };
        let road = tile.layer("road").unwrap();

        let buffers = MeshBuffers::for_linestrings(road.linestrings.as_slice());
        let reply = pool
            .dispatch(
                WorkerAction::LinestringsToMesh {
                    linestrings: Arc::clone(&road.linestrings),
                    view_point: Vec3::ZERO,
                    thickness: 0.008,
                    buffers,
                },
                DispatchOptions::default(),
            )
            .wait()
            .unwrap();
        let WorkerReply::Mesh { buffers, output } = reply else {
            panic!("expected a mesh");
        };
        assert!(output.num_indices > 0);
        assert_eq!(buffers.point_capacity(), road.line_point_count());
    }
}
