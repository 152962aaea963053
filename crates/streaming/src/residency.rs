/// Lifecycle of a tile in the cache.
///
/// Absent → Pending → Resolved. A resolved tile never goes back; a failed or
/// aborted fetch resolves to an empty tile.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TileState {
    Absent,
    Pending,
    Resolved,
}

impl TileState {
    pub fn is_resolved(self) -> bool {
        self == TileState::Resolved
    }
}
