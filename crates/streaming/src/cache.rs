use std::collections::BTreeMap;

use foundation::TileId;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::MapTile;
use crate::residency::TileState;

#[derive(Debug, Clone)]
pub enum TileEntry {
    /// A fetch is in flight; cancelling `abort` gives up on it.
    Pending { abort: CancellationToken },
    Resolved(MapTile),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("tile {0} is already pending or resolved")]
    AlreadyPresent(TileId),
    #[error("tile {0} has no fetch in flight")]
    NotPending(TileId),
}

/// Every tile the map has asked for, keyed by id.
///
/// Entries only move forward (absent, pending, resolved) and are never
/// evicted. Keyed in a `BTreeMap` for stable traversal order.
#[derive(Debug, Default)]
pub struct TileCache {
    entries: BTreeMap<TileId, TileEntry>,
}

impl TileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: TileId) -> TileState {
        match self.entries.get(&id) {
            None => TileState::Absent,
            Some(TileEntry::Pending { .. }) => TileState::Pending,
            Some(TileEntry::Resolved(_)) => TileState::Resolved,
        }
    }

    pub fn get(&self, id: TileId) -> Option<&MapTile> {
        match self.entries.get(&id) {
            Some(TileEntry::Resolved(tile)) => Some(tile),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: TileId) -> Option<&mut MapTile> {
        match self.entries.get_mut(&id) {
            Some(TileEntry::Resolved(tile)) => Some(tile),
            _ => None,
        }
    }

    /// Record that a fetch for `id` is about to start and hand back the token
    /// that aborts it.
    pub fn mark_pending(&mut self, id: TileId) -> Result<CancellationToken, CacheError> {
        if self.entries.contains_key(&id) {
            return Err(CacheError::AlreadyPresent(id));
        }
        let abort = CancellationToken::new();
        self.entries.insert(
            id,
            TileEntry::Pending {
                abort: abort.clone(),
            },
        );
        debug!(tile = %id, "tile pending");
        Ok(abort)
    }

    pub fn resolve(&mut self, tile: MapTile) -> Result<(), CacheError> {
        let id = tile.id;
        match self.entries.get_mut(&id) {
            Some(entry @ TileEntry::Pending { .. }) => {
                debug!(tile = %id, layers = tile.layers.len(), "tile resolved");
                *entry = TileEntry::Resolved(tile);
                Ok(())
            }
            _ => Err(CacheError::NotPending(id)),
        }
    }

    /// Cancel every in-flight fetch. The entries stay pending; their fetches
    /// resolve to empty tiles.
    pub fn abort_pending(&self) -> usize {
        let mut aborted = 0;
        for entry in self.entries.values() {
            if let TileEntry::Pending { abort } = entry {
                abort.cancel();
                aborted += 1;
            }
        }
        aborted
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, TileEntry::Pending { .. }))
            .count()
    }

    pub fn resolved_count(&self) -> usize {
        self.entries.len() - self.pending_count()
    }

    pub fn resolved(&self) -> impl Iterator<Item = &MapTile> + '_ {
        self.entries.values().filter_map(|e| match e {
            TileEntry::Resolved(tile) => Some(tile),
            TileEntry::Pending { .. } => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheError, TileCache};
    use crate::model::MapTile;
    use crate::residency::TileState;
    use foundation::TileId;
    use pretty_assertions::assert_eq;

    #[test]
    fn lifecycle_moves_forward_only() {
        let mut cache = TileCache::new();
        let id = TileId::new(2, 1, 1);
        assert_eq!(cache.state(id), TileState::Absent);

        cache.mark_pending(id).unwrap();
        assert_eq!(cache.state(id), TileState::Pending);
        assert!(cache.get(id).is_none());
        assert_eq!(cache.mark_pending(id).unwrap_err(), CacheError::AlreadyPresent(id));

        cache.resolve(MapTile::empty(id)).unwrap();
        assert_eq!(cache.state(id), TileState::Resolved);
        assert_eq!(cache.get(id), Some(&MapTile::empty(id)));
        assert_eq!(cache.mark_pending(id).unwrap_err(), CacheError::AlreadyPresent(id));
        assert_eq!(
            cache.resolve(MapTile::empty(id)),
            Err(CacheError::NotPending(id))
        );
    }

    #[test]
    fn resolve_requires_pending() {
        let mut cache = TileCache::new();
        let id = TileId::ROOT;
        assert_eq!(
            cache.resolve(MapTile::empty(id)),
            Err(CacheError::NotPending(id))
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn abort_pending_cancels_only_in_flight_fetches() {
        let mut cache = TileCache::new();
        let a = cache.mark_pending(TileId::new(1, 0, 0)).unwrap();
        let b = cache.mark_pending(TileId::new(1, 1, 0)).unwrap();
        cache.resolve(MapTile::empty(TileId::new(1, 1, 0))).unwrap();

        assert_eq!(cache.pending_count(), 1);
        assert_eq!(cache.resolved_count(), 1);
        assert_eq!(cache.abort_pending(), 1);
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        assert_eq!(cache.state(TileId::new(1, 0, 0)), TileState::Pending);
    }

    #[test]
    fn resolved_iterates_in_key_order() {
        let mut cache = TileCache::new();
        for id in [TileId::new(1, 1, 1), TileId::ROOT, TileId::new(1, 0, 1)] {
            cache.mark_pending(id).unwrap();
            cache.resolve(MapTile::empty(id)).unwrap();
        }
        cache.mark_pending(TileId::new(1, 0, 0)).unwrap();

        let ids: Vec<TileId> = cache.resolved().map(|t| t.id).collect();
        assert_eq!(
            ids,
            vec![TileId::ROOT, TileId::new(1, 0, 1), TileId::new(1, 1, 1)]
        );
    }
}
