//! Umbrella crate for the camera bridge workspace.
//!
//! The integration tests under `tests/` exercise the workspace through this
//! crate.

pub use bridge;
pub use common;
