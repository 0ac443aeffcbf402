//! Repository factory: one place that turns a pool into trait objects.

use std::sync::Arc;

use sqlx::SqlitePool;

use cantus_core::ports::{JobRepository, QualityProfileRepository, VoiceProfileRepository};

use crate::repositories::{
    SqliteJobRepository, SqliteQualityProfileRepository, SqliteVoiceProfileRepository,
};

/// The three repositories, ready for injection at the composition root.
#[derive(Clone)]
pub struct Repositories {
    pub jobs: Arc<dyn JobRepository>,
    pub voices: Arc<dyn VoiceProfileRepository>,
    pub quality: Arc<dyn QualityProfileRepository>,
}

impl Repositories {
    /// Build all repositories over a shared pool.
    #[must_use]
    pub fn new(pool: &SqlitePool) -> Self {
        Self {
            jobs: Arc::new(SqliteJobRepository::new(pool.clone())),
            voices: Arc::new(SqliteVoiceProfileRepository::new(pool.clone())),
            quality: Arc::new(SqliteQualityProfileRepository::new(pool.clone())),
        }
    }
}
