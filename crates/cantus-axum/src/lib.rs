//! Axum HTTP adapter for cantus.
//!
//! Owns the route table, inbound validation, request identity, error
//! mapping, and the composition root that wires the whole service
//! together.

pub mod bootstrap;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod request_id;
pub mod routes;
pub mod state;

pub use bootstrap::{bootstrap, bootstrap_with_backend, AxumContext};
pub use error::HttpError;
pub use request_id::RequestId;
pub use routes::create_router;
pub use state::AppState;
