//! Environment-backed configuration
//!
//! Generator credentials are validated once at construction and fail fast
//! when missing; that is the only caller-visible failure mode in this crate.
//! The feature toggle and per-content TTLs, in contrast, are read from the
//! environment on every call so that flipping them takes effect on the next
//! invocation without a restart.

use std::env;
use thiserror::Error;

/// Environment variable holding the generator API key
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
/// Environment variable holding the generator model id
pub const MODEL_VAR: &str = "GEMINI_MODEL";
/// Environment variable toggling AI content generation
pub const FEATURES_ENABLED_VAR: &str = "AI_FEATURES_ENABLED";

/// Error types for missing required configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The generator API key is absent or empty
    #[error("GEMINI_API_KEY is not configured")]
    MissingApiKey,

    /// The generator model id is absent or empty
    #[error("GEMINI_MODEL is not configured")]
    MissingModel,
}

/// Validated generator credentials
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key for the Generative Language API
    pub api_key: String,
    /// Model id to generate with (e.g., "gemini-2.0-flash")
    pub model: String,
}

impl GeminiConfig {
    /// Reads and validates credentials from the environment
    ///
    /// # Returns
    /// * `Ok(GeminiConfig)` when both key and model are present and non-empty
    /// * `Err(ConfigError)` naming the first missing variable
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = non_empty_var(API_KEY_VAR).ok_or(ConfigError::MissingApiKey)?;
        let model = non_empty_var(MODEL_VAR).ok_or(ConfigError::MissingModel)?;
        Ok(Self { api_key, model })
    }
}

/// Whether AI content generation is currently enabled
///
/// Read from `AI_FEATURES_ENABLED` on every call; absent or unparseable
/// values count as disabled, which degrades every orchestrated content type
/// to its cached-or-fallback path.
pub fn features_enabled() -> bool {
    non_empty_var(FEATURES_ENABLED_VAR)
        .map(|value| matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes"))
        .unwrap_or(false)
}

/// Resolves a per-content TTL in seconds
///
/// Reads `var` as minutes, falling back to `default_minutes` when absent or
/// unparseable, mirroring how each content type's TTL was configured in the
/// original deployment (e.g., `AI_NEWS_TTL_MIN`).
pub fn content_ttl_secs(var: &str, default_minutes: i64) -> i64 {
    let minutes = env::var(var)
        .ok()
        .and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(default_minutes);
    minutes * 60
}

fn non_empty_var(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}
