//! Quality profiles: named bundles of synthesis knobs.
//!
//! Built-in profiles ship with reserved ids and are immutable; custom
//! profiles share the same id namespace but may not use the reserved
//! prefix. Exactly one profile per engine is the default at any time,
//! enforced by the catalog repository.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Reserved id prefix for built-in profiles of the XTTS engine.
pub const RESERVED_PROFILE_PREFIX: &str = "xtts_";

/// The supported synthesis engine.
///
/// A tagged sum over engines: each variant selects the shape of the
/// parameter struct. Only XTTS is wired in this service; the enum keeps
/// the wire format and store schema honest about that.
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
pub enum Engine {
    Xtts,
}

/// Synthesis knobs with bounded ranges.
///
/// Bounds are validated at the API boundary and again on profile writes;
/// the facade receives these verbatim (no per-job overrides).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityParameters {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub repetition_penalty: f64,
    pub length_penalty: f64,
    pub speed: f64,
    pub enable_text_splitting: bool,
    pub denoise: bool,
}

impl Default for QualityParameters {
    fn default() -> Self {
        BALANCED_PARAMETERS
    }
}

const fn range_ok(value: f64, min: f64, max: f64) -> bool {
    value >= min && value <= max
}

impl QualityParameters {
    /// Check every knob against its documented range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let checks: [(&str, bool, &str); 6] = [
            (
                "temperature",
                range_ok(self.temperature, 0.1, 1.5),
                "0.1..=1.5",
            ),
            ("top_p", range_ok(self.top_p, 0.0, 1.0), "0.0..=1.0"),
            ("top_k", self.top_k >= 1 && self.top_k <= 200, "1..=200"),
            (
                "repetition_penalty",
                range_ok(self.repetition_penalty, 1.0, 5.0),
                "1.0..=5.0",
            ),
            (
                "length_penalty",
                range_ok(self.length_penalty, 0.5, 2.0),
                "0.5..=2.0",
            ),
            ("speed", range_ok(self.speed, 0.5, 2.0), "0.5..=2.0"),
        ];
        for (field, ok, range) in checks {
            if !ok {
                return Err(ValidationError::out_of_range(field, range));
            }
        }
        Ok(())
    }
}

/// Parameters of the `xtts_fast` built-in.
pub const FAST_PARAMETERS: QualityParameters = QualityParameters {
    temperature: 0.65,
    top_p: 0.85,
    top_k: 50,
    repetition_penalty: 2.0,
    length_penalty: 1.0,
    speed: 1.0,
    enable_text_splitting: false,
    denoise: false,
};

/// Parameters of the `xtts_balanced` built-in (the shipping default).
pub const BALANCED_PARAMETERS: QualityParameters = QualityParameters {
    temperature: 0.75,
    top_p: 0.85,
    top_k: 50,
    repetition_penalty: 2.5,
    length_penalty: 1.0,
    speed: 1.0,
    enable_text_splitting: true,
    denoise: false,
};

/// Parameters of the `xtts_high_quality` built-in.
pub const HIGH_QUALITY_PARAMETERS: QualityParameters = QualityParameters {
    temperature: 0.85,
    top_p: 0.9,
    top_k: 80,
    repetition_penalty: 3.0,
    length_penalty: 1.2,
    speed: 1.0,
    enable_text_splitting: true,
    denoise: true,
};

/// A named, persisted bundle of synthesis knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityProfile {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub engine: Engine,
    pub parameters: QualityParameters,
    pub is_default: bool,
    pub is_builtin: bool,
}

impl QualityProfile {
    /// The three built-ins, loaded into the catalog at startup.
    ///
    /// `xtts_balanced` ships as the default; the flag may later move to
    /// another profile via `set_default`.
    #[must_use]
    pub fn builtins() -> Vec<Self> {
        vec![
            Self {
                id: "xtts_fast".to_string(),
                name: "Fast".to_string(),
                description: Some("Lower latency, plainer prosody".to_string()),
                engine: Engine::Xtts,
                parameters: FAST_PARAMETERS,
                is_default: false,
                is_builtin: true,
            },
            Self {
                id: "xtts_balanced".to_string(),
                name: "Balanced".to_string(),
                description: Some("Default trade-off between speed and quality".to_string()),
                engine: Engine::Xtts,
                parameters: BALANCED_PARAMETERS,
                is_default: true,
                is_builtin: true,
            },
            Self {
                id: "xtts_high_quality".to_string(),
                name: "High quality".to_string(),
                description: Some("Slowest, richest output; denoised".to_string()),
                engine: Engine::Xtts,
                parameters: HIGH_QUALITY_PARAMETERS,
                is_default: false,
                is_builtin: true,
            },
        ]
    }

    /// Whether an id collides with the reserved built-in namespace.
    #[must_use]
    pub fn is_reserved_id(id: &str) -> bool {
        id.to_ascii_lowercase().starts_with(RESERVED_PROFILE_PREFIX)
    }
}
