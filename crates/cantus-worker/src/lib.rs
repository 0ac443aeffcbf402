//! Worker pipeline for cantus.
//!
//! Pulls tasks from the broker, resolves profiles and references, drives
//! the synthesis facade, persists artifacts and voice profiles, and
//! settles every delivery exactly once.

pub mod clone;
pub mod error;
pub mod pool;
pub mod presets;
pub mod runner;
pub mod synthesis;

pub use error::JobFailure;
pub use pool::WorkerPool;
pub use presets::{install_presets, preset_reference_path};
pub use runner::WorkerDeps;
