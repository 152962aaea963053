pub mod math;
pub mod projection;
pub mod tile;

// Globe math and tile addressing shared by the scene, streaming and viewer crates.
pub use projection::*;
pub use tile::*;
