pub mod cache;
pub mod decode;
pub mod model;
pub mod residency;
pub mod source;

pub use cache::*;
pub use decode::*;
pub use model::*;
pub use residency::*;
pub use source::*;
