use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Deepest zoom a tile id may address; keeps `2^zoom` inside `u32`.
pub const MAX_TILE_ZOOM: u8 = 30;

/// A quadtree cell: `x, y` in `[0, 2^zoom)`.
///
/// The canonical string key is `"zoom/x/y"`; see [`fmt::Display`] and [`FromStr`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileId {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileIdParseError {
    #[error("expected \"zoom/x/y\", got {0:?}")]
    Shape(String),
    #[error("invalid {part} component {value:?}")]
    Component { part: &'static str, value: String },
    #[error("zoom {0} exceeds maximum {max}", max = MAX_TILE_ZOOM)]
    ZoomTooDeep(u8),
    #[error("tile {x}/{y} is outside the {count}x{count} grid at zoom {zoom}")]
    OutOfRange { zoom: u8, x: u32, y: u32, count: u64 },
}

impl TileId {
    pub const ROOT: Self = Self { zoom: 0, x: 0, y: 0 };

    pub const fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Saturates at `u64::MAX` for zoom levels past 63.
    pub fn tiles_per_axis(self) -> u64 {
        1u64.checked_shl(u32::from(self.zoom)).unwrap_or(u64::MAX)
    }

    pub fn is_valid(self) -> bool {
        if self.zoom > MAX_TILE_ZOOM {
            return false;
        }
        let count = self.tiles_per_axis();
        u64::from(self.x) < count && u64::from(self.y) < count
    }

    /// Children in quadtree push order: NW, NE, SW, SE. `None` at
    /// [`MAX_TILE_ZOOM`] or when the child coordinates would overflow.
    pub fn children(self) -> Option<[TileId; 4]> {
        if self.zoom >= MAX_TILE_ZOOM {
            return None;
        }
        let x = self.x.checked_mul(2)?;
        let y = self.y.checked_mul(2)?;
        let (x1, y1) = (x.checked_add(1)?, y.checked_add(1)?);
        let z = self.zoom + 1;
        Some([
            TileId::new(z, x, y),
            TileId::new(z, x1, y),
            TileId::new(z, x, y1),
            TileId::new(z, x1, y1),
        ])
    }

    pub fn parent(self) -> Option<TileId> {
        (self.zoom > 0).then(|| TileId::new(self.zoom - 1, self.x / 2, self.y / 2))
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

impl FromStr for TileId {
    type Err = TileIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let [zoom, x, y] = parts.as_slice() else {
            return Err(TileIdParseError::Shape(s.to_string()));
        };

        let zoom: u8 = parse_component("zoom", zoom)?;
        let x: u32 = parse_component("x", x)?;
        let y: u32 = parse_component("y", y)?;

        if zoom > MAX_TILE_ZOOM {
            return Err(TileIdParseError::ZoomTooDeep(zoom));
        }
        let id = TileId::new(zoom, x, y);
        if !id.is_valid() {
            return Err(TileIdParseError::OutOfRange {
                zoom,
                x,
                y,
                count: id.tiles_per_axis(),
            });
        }
        Ok(id)
    }
}

fn parse_component<T: FromStr>(part: &'static str, value: &str) -> Result<T, TileIdParseError> {
    // Reject forms like "+1" or "01" so that formatting round-trips exactly.
    let canonical = !value.is_empty()
        && value.bytes().all(|b| b.is_ascii_digit())
        && (value == "0" || !value.starts_with('0'));
    if !canonical {
        return Err(TileIdParseError::Component {
            part,
            value: value.to_string(),
        });
    }
    value.parse().map_err(|_| TileIdParseError::Component {
        part,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{MAX_TILE_ZOOM, TileId, TileIdParseError};
    use proptest::prelude::*;

    #[test]
    fn display_uses_canonical_key() {
        assert_eq!(TileId::new(3, 5, 2).to_string(), "3/5/2");
        assert_eq!(TileId::ROOT.to_string(), "0/0/0");
    }

    #[test]
    fn children_follow_push_order() {
        let kids = TileId::new(1, 1, 0).children().unwrap();
        assert_eq!(
            kids,
            [
                TileId::new(2, 2, 0),
                TileId::new(2, 3, 0),
                TileId::new(2, 2, 1),
                TileId::new(2, 3, 1),
            ]
        );
        assert!(kids.iter().all(|k| k.parent() == Some(TileId::new(1, 1, 0))));
        assert_eq!(TileId::ROOT.parent(), None);
    }

    #[test]
    fn deep_zoom_neither_overflows_nor_descends() {
        let deep = TileId::new(200, 0, 0);
        assert!(!deep.is_valid());
        assert_eq!(deep.tiles_per_axis(), u64::MAX);
        assert_eq!(deep.children(), None);
        assert_eq!(TileId::new(MAX_TILE_ZOOM, 0, 0).children(), None);
        assert_eq!(TileId::new(5, u32::MAX, 0).children(), None);
        assert!(TileId::new(MAX_TILE_ZOOM - 1, 0, 0).children().is_some());
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(matches!("1/2".parse::<TileId>(), Err(TileIdParseError::Shape(_))));
        assert!(matches!(
            "1/a/0".parse::<TileId>(),
            Err(TileIdParseError::Component { part: "x", .. })
        ));
        assert!(matches!(
            "1/01/0".parse::<TileId>(),
            Err(TileIdParseError::Component { .. })
        ));
        assert!(matches!(
            "1/2/0".parse::<TileId>(),
            Err(TileIdParseError::OutOfRange { .. })
        ));
        assert!(matches!(
            "31/0/0".parse::<TileId>(),
            Err(TileIdParseError::ZoomTooDeep(31))
        ));
    }

    proptest! {
        #[test]
        fn key_round_trip(zoom in 0u8..=30, fx in 0.0f64..1.0, fy in 0.0f64..1.0) {
            let count = 1u64 << zoom;
            let x = ((fx * count as f64) as u64).min(count - 1) as u32;
            let y = ((fy * count as f64) as u64).min(count - 1) as u32;
            let key = format!("{zoom}/{x}/{y}");
            let id: TileId = key.parse().unwrap();
            prop_assert_eq!(id.to_string(), key);
        }
    }
}
