//! HTTP handlers, grouped by resource.

pub mod health;
pub mod jobs;
pub mod quality_profiles;
pub mod voices;
