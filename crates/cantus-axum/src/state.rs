//! Shared application state type.

use std::sync::Arc;

use crate::bootstrap::AxumContext;

/// Application state shared across all handlers.
///
/// An Arc-wrapped [`AxumContext`] holding every injected port the
/// handlers need (repositories, queue, engine, transcoder).
pub type AppState = Arc<AxumContext>;
