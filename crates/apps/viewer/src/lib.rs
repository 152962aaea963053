pub mod config;
pub mod context;
pub mod frame_loop;
pub mod sources;
pub mod worker;

pub use config::*;
pub use context::*;
pub use frame_loop::*;
pub use sources::*;
pub use worker::*;
