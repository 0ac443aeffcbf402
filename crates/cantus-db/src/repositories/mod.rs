//! Repository implementations backed by `SQLite`.

mod row_mappers;
mod sqlite_job_repository;
mod sqlite_quality_profile_repository;
mod sqlite_voice_profile_repository;

pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_quality_profile_repository::SqliteQualityProfileRepository;
pub use sqlite_voice_profile_repository::SqliteVoiceProfileRepository;
