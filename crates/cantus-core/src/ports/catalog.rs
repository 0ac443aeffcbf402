//! Voice and quality profile catalog ports.

use async_trait::async_trait;

use crate::domain::{Engine, QualityParameters, QualityProfile, VoiceProfile, VoiceProfileId};
use crate::error::CatalogError;

/// Partial update applied to a custom quality profile.
///
/// `parameters`, when present, is the complete merged knob set; the HTTP
/// layer resolves partial parameter patches against the stored profile
/// before calling the catalog.
#[derive(Debug, Clone, Default)]
pub struct QualityProfilePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parameters: Option<QualityParameters>,
}

/// Catalog of quality profiles: three immutable built-ins plus custom rows.
#[async_trait]
pub trait QualityProfileRepository: Send + Sync {
    /// Install the built-ins if absent. Idempotent; runs at startup before
    /// the catalog serves reads. Never demotes an existing default.
    async fn seed_builtins(&self, builtins: &[QualityProfile]) -> Result<(), CatalogError>;

    /// Insert a custom profile. Rejects reserved ids and id collisions.
    async fn insert(&self, profile: &QualityProfile) -> Result<(), CatalogError>;

    async fn get(&self, id: &str) -> Result<QualityProfile, CatalogError>;

    async fn list(&self, engine: Option<Engine>) -> Result<Vec<QualityProfile>, CatalogError>;

    /// Update a custom profile. `forbidden` for built-ins.
    async fn update(
        &self,
        id: &str,
        patch: QualityProfilePatch,
    ) -> Result<QualityProfile, CatalogError>;

    /// Delete a custom profile. `forbidden` for built-ins, `conflict` for
    /// the current default.
    async fn delete(&self, id: &str) -> Result<(), CatalogError>;

    /// Create a mutable custom copy of any profile, built-in or not.
    async fn duplicate(
        &self,
        id: &str,
        new_name: Option<String>,
    ) -> Result<QualityProfile, CatalogError>;

    /// Atomically make `id` the only default of its engine. Idempotent.
    async fn set_default(&self, id: &str) -> Result<QualityProfile, CatalogError>;

    async fn get_default(&self, engine: Engine) -> Result<QualityProfile, CatalogError>;
}

/// Catalog of cloned voices.
#[async_trait]
pub trait VoiceProfileRepository: Send + Sync {
    async fn insert(&self, profile: &VoiceProfile) -> Result<(), CatalogError>;

    async fn get(&self, id: &VoiceProfileId) -> Result<VoiceProfile, CatalogError>;

    /// List profiles, optionally restricted to a language, newest first.
    async fn list(&self, language: Option<&str>) -> Result<Vec<VoiceProfile>, CatalogError>;

    /// Remove a profile. `conflict` while any queued or processing job
    /// references it. Returns the removed record so the caller can delete
    /// the reference audio file.
    async fn delete(&self, id: &VoiceProfileId) -> Result<VoiceProfile, CatalogError>;

    /// Bump `usage_count` after a successful voice-clone synthesis.
    async fn increment_usage(&self, id: &VoiceProfileId) -> Result<(), CatalogError>;
}
