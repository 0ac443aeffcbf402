//! Inbound parameter validation.
//!
//! All of this runs at the API boundary; the worker receives validated
//! commands and never re-checks form data. Checks are byte-wise where the
//! shape allows it, so no regex engine is pulled into core.

use strum::IntoEnumIterator;

use crate::error::ValidationError;

/// Post-sanitization text length bounds for synthesis jobs.
pub const MIN_TEXT_LEN: usize = 1;
pub const MAX_TEXT_LEN: usize = 10_000;

/// Accepted MIME types for reference-audio uploads.
pub const ACCEPTED_AUDIO_MIME: [&str; 5] = [
    "audio/wav",
    "audio/mpeg",
    "audio/ogg",
    "audio/flac",
    "audio/mp4",
];

/// Maximum reference-audio upload size.
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Reference-audio acceptance floor in seconds; shorter uploads reject.
pub const MIN_REFERENCE_SECONDS: f64 = 3.0;
/// Reference-audio ceiling in seconds. Not an acceptance bound: longer
/// audio is truncated to this during normalization.
pub const MAX_REFERENCE_SECONDS: f64 = 300.0;

/// Coerce a form-encoded string onto an enum, case-insensitively.
///
/// Unknown values are rejected with the full accepted set attached.
pub fn coerce_enum<T>(field: &str, value: &str) -> Result<T, ValidationError>
where
    T: std::str::FromStr + IntoEnumIterator + std::fmt::Display,
{
    value.parse::<T>().map_err(|_| {
        ValidationError::unknown_value(
            field,
            value,
            T::iter().map(|v| v.to_string()).collect(),
        )
    })
}

/// Sanitize synthesis text and enforce length bounds.
///
/// Strips control characters except `\n` and `\t`, collapses runs of
/// whitespace to a single space (newlines survive as spaces inside a run),
/// then checks `1..=10_000` on the result.
pub fn sanitize_text(raw: &str) -> Result<String, ValidationError> {
    let mut out = String::with_capacity(raw.len());
    let mut in_whitespace = false;
    for ch in raw.chars() {
        if ch.is_control() && ch != '\n' && ch != '\t' {
            continue;
        }
        if ch.is_whitespace() {
            if !in_whitespace && !out.is_empty() {
                out.push(' ');
            }
            in_whitespace = true;
        } else {
            out.push(ch);
            in_whitespace = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }

    let len = out.chars().count();
    if len < MIN_TEXT_LEN {
        return Err(ValidationError::new("text", "must not be empty"));
    }
    if len > MAX_TEXT_LEN {
        return Err(ValidationError::new(
            "text",
            format!("exceeds {MAX_TEXT_LEN} characters after sanitization ({len})"),
        ));
    }
    Ok(out)
}

/// Normalize and validate a BCP-47-style language code.
///
/// Accepted shape after normalization: `^[a-z]{2}(-[A-Z]{2})?$`.
pub fn normalize_language(field: &str, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    let err = || {
        ValidationError::new(
            field,
            format!("'{trimmed}' is not a two-letter code with optional region (e.g. 'en' or 'pt-BR')"),
        )
    };

    let (lang, region) = match trimmed.split_once(['-', '_']) {
        Some((l, r)) => (l, Some(r)),
        None => (trimmed, None),
    };
    if lang.len() != 2 || !lang.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(err());
    }
    let mut normalized = lang.to_ascii_lowercase();
    if let Some(region) = region {
        if region.len() != 2 || !region.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(err());
        }
        normalized.push('-');
        normalized.push_str(&region.to_ascii_uppercase());
    }
    Ok(normalized)
}

/// Validate a voice profile name: 1 to 100 printable characters.
///
/// Collisions are permitted; the id is the identity, not the name.
pub fn validate_profile_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::new("name", "must not be empty"));
    }
    if name.chars().count() > 100 {
        return Err(ValidationError::new("name", "exceeds 100 characters"));
    }
    if name.chars().any(char::is_control) {
        return Err(ValidationError::new(
            "name",
            "must contain only printable characters",
        ));
    }
    Ok(name.to_string())
}

/// Gate an upload on declared content type and size.
///
/// Duration is probed separately, after the bytes are staged, since it
/// requires decoding the container.
pub fn validate_upload(content_type: &str, size_bytes: u64) -> Result<(), ValidationError> {
    // Content types may carry parameters ("audio/wav; charset=...").
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if !ACCEPTED_AUDIO_MIME.contains(&mime.as_str()) {
        return Err(ValidationError::unknown_value(
            "file",
            &mime,
            ACCEPTED_AUDIO_MIME.iter().map(ToString::to_string).collect(),
        ));
    }
    if size_bytes > MAX_UPLOAD_BYTES {
        return Err(ValidationError::new(
            "file",
            format!("exceeds {} MiB", MAX_UPLOAD_BYTES / (1024 * 1024)),
        ));
    }
    if size_bytes == 0 {
        return Err(ValidationError::new("file", "is empty"));
    }
    Ok(())
}

/// Check a probed reference duration against the acceptance floor.
///
/// Only the floor rejects. Audio longer than [`MAX_REFERENCE_SECONDS`]
/// is accepted and truncated to the ceiling during normalization, so
/// the worker owns that bound.
pub fn validate_reference_duration(seconds: f64) -> Result<(), ValidationError> {
    if !seconds.is_finite() || seconds < MIN_REFERENCE_SECONDS {
        return Err(ValidationError::new(
            "file",
            format!("audio must be at least {MIN_REFERENCE_SECONDS} seconds"),
        ));
    }
    Ok(())
}
