//! `SQLite` persistence for cantus.
//!
//! Implements the repository ports from `cantus-core` over a single
//! `sqlx` pool. The schema lives in [`setup`]; entry points call
//! [`setup_database`] once and hand the pool to [`Repositories::new`].

pub mod factory;
pub mod repositories;
pub mod setup;

pub use factory::Repositories;
pub use repositories::{
    SqliteJobRepository, SqliteQualityProfileRepository, SqliteVoiceProfileRepository,
};
pub use setup::setup_database;

#[cfg(any(test, feature = "test-utils"))]
pub use setup::setup_test_database;
