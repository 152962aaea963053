pub mod line_mesh;
pub mod render_state;
pub mod symbology;

pub use line_mesh::*;
pub use render_state::*;
pub use symbology::*;
