pub mod buffers;
pub mod device;
pub mod renderer;
pub mod uniforms;

pub use buffers::*;
pub use device::*;
pub use renderer::*;
pub use uniforms::*;
