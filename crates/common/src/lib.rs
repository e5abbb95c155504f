pub mod cameras;
pub mod validation;

pub use cameras::{CameraSpec, StreamParams};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
