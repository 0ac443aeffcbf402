//! Database setup and initialization.
//!
//! Entry points call [`setup_database`] with the resolved database path;
//! it opens the pool, creates the schema and returns the pool for the
//! repository factory.

use anyhow::Result;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::path::Path;

/// Open (creating if missing) the `SQLite` database and ensure the schema.
///
/// Safe to call on every start; all DDL uses `IF NOT EXISTS`.
pub async fn setup_database(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pool = SqlitePool::connect_with(
        SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true),
    )
    .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Fresh in-memory database with the full production schema, for tests.
///
/// Capped at one connection: `sqlite::memory:` databases are
/// per-connection, so a wider pool would hand out empty schemas.
#[cfg(any(test, feature = "test-utils"))]
pub async fn setup_test_database() -> Result<SqlitePool> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            mode TEXT,
            text TEXT,
            source_language TEXT,
            target_language TEXT,
            voice_preset TEXT,
            voice_profile_id TEXT,
            quality_profile_id TEXT,
            clone_request TEXT,
            status TEXT NOT NULL,
            progress REAL NOT NULL DEFAULT 0,
            artifact_path TEXT,
            voice_id TEXT,
            error_kind TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            request_id TEXT NOT NULL,
            cancel_requested INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Secondary indices backing the paginated listing and the
    // voice-in-use referential check.
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_voice_profile ON jobs(voice_profile_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS voice_profiles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            language TEXT NOT NULL,
            reference_audio_path TEXT NOT NULL,
            ref_text TEXT,
            duration_seconds REAL NOT NULL,
            sample_rate INTEGER NOT NULL,
            usage_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_voice_profiles_language ON voice_profiles(language)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quality_profiles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            engine TEXT NOT NULL,
            parameters TEXT NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 0,
            is_builtin INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_quality_profiles_engine ON quality_profiles(engine)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
