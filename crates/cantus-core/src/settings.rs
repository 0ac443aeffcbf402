//! Service configuration, sourced from the environment.
//!
//! The CLI loads `.env`, then `Settings::from_env()` reads the `CANTUS_*`
//! variables and validates ranges. Everything downstream receives a
//! `Settings` value; nothing else reads the environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Compute device the engine should load on.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Device {
    Cuda,
    Cpu,
}

/// A configuration value failed to parse or is out of range.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid value for {var}: {message}")]
    Invalid { var: String, message: String },
}

impl SettingsError {
    fn invalid(var: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            var: var.to_string(),
            message: message.into(),
        }
    }
}

/// Resolved service configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// HTTP listen port.
    pub port: u16,
    /// Device to load the model on; CPU is used without fallback when
    /// selected explicitly.
    pub device: Device,
    /// Opt-in: fall through to CPU when the GPU load fails.
    pub allow_cpu_fallback: bool,
    /// Worker pool size; also bounds concurrently dequeued broker tasks.
    pub max_concurrent_jobs: usize,
    /// Per-job synthesis deadline.
    pub synthesis_timeout: Duration,
    /// HTTP upload read timeout.
    pub upload_timeout: Duration,
    /// Drain window for in-flight jobs on graceful shutdown.
    pub shutdown_grace: Duration,
    /// Root data directory; artifact/voice/staging dirs live under it
    /// unless overridden individually.
    pub data_dir: PathBuf,
    /// Rendered artifacts (`{job_id}.pcm24k`).
    pub artifact_dir: PathBuf,
    /// Canonical voice references (`{voice_id}.pcm24k`) and baked presets.
    pub voice_dir: PathBuf,
    /// Staged uploads awaiting a clone worker.
    pub upload_dir: PathBuf,
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Broker connection URL. The in-process broker ignores it; kept so
    /// deployments can set it ahead of an external broker.
    pub broker_url: Option<String>,
    /// Base URL of the resident inference sidecar.
    pub engine_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = PathBuf::from("./data");
        Self {
            port: 8200,
            device: Device::Cuda,
            allow_cpu_fallback: false,
            max_concurrent_jobs: 2,
            synthesis_timeout: Duration::from_secs(300),
            upload_timeout: Duration::from_secs(120),
            shutdown_grace: Duration::from_secs(30),
            artifact_dir: data_dir.join("artifacts"),
            voice_dir: data_dir.join("voice_profiles"),
            upload_dir: data_dir.join("uploads"),
            database_path: data_dir.join("cantus.db"),
            data_dir,
            broker_url: None,
            engine_url: "http://127.0.0.1:8201".to_string(),
        }
    }
}

fn read_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, SettingsError> {
    match read_var(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| SettingsError::invalid(name, format!("could not parse '{raw}'"))),
    }
}

fn parse_bool(name: &str) -> Result<Option<bool>, SettingsError> {
    match read_var(name) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(SettingsError::invalid(
                name,
                format!("expected a boolean, got '{other}'"),
            )),
        },
    }
}

impl Settings {
    /// Read settings from `CANTUS_*` environment variables, falling back
    /// to defaults, then validate.
    pub fn from_env() -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        if let Some(port) = parse_var::<u16>("CANTUS_PORT")? {
            settings.port = port;
        }
        if let Some(device) = read_var("CANTUS_DEVICE") {
            settings.device = device.parse::<Device>().map_err(|_| {
                SettingsError::invalid("CANTUS_DEVICE", format!("expected cuda or cpu, got '{device}'"))
            })?;
        }
        if let Some(fallback) = parse_bool("CANTUS_CPU_FALLBACK")? {
            settings.allow_cpu_fallback = fallback;
        }
        if let Some(jobs) = parse_var::<usize>("CANTUS_MAX_CONCURRENT_JOBS")? {
            settings.max_concurrent_jobs = jobs;
        }
        if let Some(secs) = parse_var::<u64>("CANTUS_SYNTHESIS_TIMEOUT_SECS")? {
            settings.synthesis_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>("CANTUS_UPLOAD_TIMEOUT_SECS")? {
            settings.upload_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>("CANTUS_SHUTDOWN_GRACE_SECS")? {
            settings.shutdown_grace = Duration::from_secs(secs);
        }
        if let Some(dir) = read_var("CANTUS_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
            settings.artifact_dir = settings.data_dir.join("artifacts");
            settings.voice_dir = settings.data_dir.join("voice_profiles");
            settings.upload_dir = settings.data_dir.join("uploads");
            settings.database_path = settings.data_dir.join("cantus.db");
        }
        if let Some(dir) = read_var("CANTUS_ARTIFACT_DIR") {
            settings.artifact_dir = PathBuf::from(dir);
        }
        if let Some(dir) = read_var("CANTUS_VOICE_DIR") {
            settings.voice_dir = PathBuf::from(dir);
        }
        if let Some(path) = read_var("CANTUS_DATABASE_PATH") {
            settings.database_path = PathBuf::from(path);
        }
        settings.broker_url = read_var("CANTUS_BROKER_URL");
        if let Some(url) = read_var("CANTUS_ENGINE_URL") {
            settings.engine_url = url;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Range checks over the assembled configuration.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_concurrent_jobs == 0 {
            return Err(SettingsError::invalid(
                "CANTUS_MAX_CONCURRENT_JOBS",
                "must be at least 1",
            ));
        }
        if self.max_concurrent_jobs > 64 {
            return Err(SettingsError::invalid(
                "CANTUS_MAX_CONCURRENT_JOBS",
                "single-host pool caps at 64",
            ));
        }
        if self.synthesis_timeout < Duration::from_secs(1) {
            return Err(SettingsError::invalid(
                "CANTUS_SYNTHESIS_TIMEOUT_SECS",
                "must be at least 1 second",
            ));
        }
        if self.engine_url.trim().is_empty() {
            return Err(SettingsError::invalid("CANTUS_ENGINE_URL", "must not be empty"));
        }
        Ok(())
    }
}
