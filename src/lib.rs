pub mod classifier;
pub mod config;
pub mod error;
pub mod location;
pub mod metadata;
pub mod orchestrator;

pub use error::{CaptureError, EdgeError, Result};
