pub mod camera;
pub mod controls;
pub mod selector;
pub mod visibility;

pub use camera::*;
pub use controls::*;
pub use selector::*;
pub use visibility::*;
