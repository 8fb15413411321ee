//! Generic content orchestration
//!
//! Every AI content type (news, driver bios, race previews, constructor
//! info, standings analysis, fun facts) resolves through the same control
//! flow: check the cache, check quota, fetch input data, generate, and at
//! every failure degrade to stale cache or a static fallback. This module
//! implements that state machine once, parameterized by a cache key, a TTL,
//! a feature toggle, and three caller-supplied steps, instead of one copy
//! per content type.
//!
//! Resolution precedence:
//! 1. Feature disabled → stale cache if present, else fallback.
//! 2. Fresh cache hit → returned as-is.
//! 3. No quota → stale cache if present, else fallback.
//! 4. Input fetch failed or empty → stale cache if present, else fallback.
//! 5. Generation or decoding failed → stale cache if present, else fallback.
//! 6. Success → cache the output, optionally archive it, return it.
//!
//! Quota claimed at step 3 is never rolled back, even when steps 4 and 5
//! bail out before the generator is called. `resolve` never returns an
//! error: every failure inside the flow lands on a degraded-but-usable
//! payload.

use crate::cache::CacheStore;
use crate::decode::DecodeError;
use crate::generate::GenerateError;
use crate::quota::QuotaLimiter;
use async_trait::async_trait;
use log::{debug, error, warn};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Errors the orchestration steps can produce
///
/// All of these are absorbed by [`ContentEngine::resolve`]; they exist so
/// fetch and generate closures have a typed way to report failure, and so
/// logs can distinguish the causes.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Upstream input data could not be fetched
    #[error("input fetch failed: {0}")]
    InputFetch(String),

    /// The external generation call failed or timed out
    #[error("generation failed: {0}")]
    Generation(String),

    /// The generator replied, but its output could not be parsed
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl From<GenerateError> for EngineError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::Decode(decode) => EngineError::Decode(decode),
            other => EngineError::Generation(other.to_string()),
        }
    }
}

/// Where a resolved payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentOrigin {
    /// Newly generated on this call
    Fresh,
    /// Served from a cache entry that is still within its TTL
    Cached,
    /// Served from a cache entry whose TTL has elapsed
    Stale,
    /// Synthesized from the caller's static fallback
    Fallback,
}

/// A resolved payload plus the freshness tier it came from
#[derive(Debug, Clone)]
pub struct GeneratedContent<T> {
    /// The content payload
    pub value: T,
    /// Which tier of the precedence produced it
    pub origin: ContentOrigin,
}

impl<T> GeneratedContent<T> {
    /// Whether the payload is degraded (stale or synthesized) content
    ///
    /// Only a fresh cache hit and a new generation count as non-fallback.
    pub fn is_fallback(&self) -> bool {
        matches!(self.origin, ContentOrigin::Stale | ContentOrigin::Fallback)
    }
}

/// Per-call parameters for one content resolution
///
/// The TTL and toggle are deliberately plain values rather than anything
/// captured at engine construction: callers read them from configuration on
/// every invocation, so flipping a toggle applies to the next call.
#[derive(Debug, Clone)]
pub struct ContentSpec {
    /// Cache key, constructed by the caller from content type and entity ids
    pub cache_key: String,
    /// How long a generated payload stays fresh
    pub ttl_seconds: i64,
    /// Whether generation is enabled for this content type right now
    pub enabled: bool,
}

/// External store of historical generated responses
///
/// The relational table the backend keeps of past responses, reduced to the
/// key-lookup interface this layer needs. Archive failures never affect
/// resolution; they are logged and dropped.
#[async_trait]
pub trait ResponseArchive: Send + Sync {
    /// Records a freshly generated response under its cache key
    async fn record(&self, key: &str, value: &Value) -> Result<(), ArchiveError>;

    /// Returns the most recent recorded response for a key, if any
    async fn latest(&self, key: &str) -> Result<Option<Value>, ArchiveError>;
}

/// Error reported by a [`ResponseArchive`] implementation
#[derive(Debug, Error)]
#[error("response archive error: {0}")]
pub struct ArchiveError(pub String);

/// Builds a cache key from a content type, entity, and optional qualifiers
///
/// Produces keys like `news:f1`, `bio:44:2024`, or `preview:monza:2024:17`,
/// matching the keys the content services construct.
pub fn cache_key(kind: &str, entity: &str, season: Option<u16>, event: Option<u32>) -> String {
    let mut key = format!("{kind}:{entity}");
    if let Some(season) = season {
        key.push_str(&format!(":{season}"));
    }
    if let Some(event) = event {
        key.push_str(&format!(":{event}"));
    }
    key
}

/// Orchestrates resilient content resolution over shared cache and quota
///
/// One engine instance (with one cache and one limiter) serves every content
/// type; the per-type differences live entirely in the closures passed to
/// [`resolve`](Self::resolve).
pub struct ContentEngine {
    cache: Arc<CacheStore>,
    quota: Arc<QuotaLimiter>,
    archive: Option<Arc<dyn ResponseArchive>>,
}

impl ContentEngine {
    /// Creates an engine over a shared cache and quota limiter
    pub fn new(cache: Arc<CacheStore>, quota: Arc<QuotaLimiter>) -> Self {
        Self {
            cache,
            quota,
            archive: None,
        }
    }

    /// Attaches a historical response archive
    ///
    /// Successful generations are recorded there in addition to the cache.
    pub fn with_archive(mut self, archive: Arc<dyn ResponseArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// The cache this engine resolves against
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// The quota limiter this engine consumes from
    pub fn quota(&self) -> &Arc<QuotaLimiter> {
        &self.quota
    }

    /// Resolves one piece of content through the freshness-tier precedence
    ///
    /// # Arguments
    /// * `spec` - Cache key, TTL, and feature toggle for this call
    /// * `fetch_input` - Gathers the input data for generation; `Ok(None)`
    ///   means the upstream had nothing usable
    /// * `generate` - Calls the external generator with the fetched input
    /// * `build_fallback` - Produces the static placeholder payload; must not
    ///   fail
    ///
    /// Never returns an error: fetch, generation, and decode failures all
    /// degrade to stale cache or the fallback.
    pub async fn resolve<T, In, Fetch, FetchFut, Gen, GenFut, Fall>(
        &self,
        spec: &ContentSpec,
        fetch_input: Fetch,
        generate: Gen,
        build_fallback: Fall,
    ) -> GeneratedContent<T>
    where
        T: Serialize + DeserializeOwned,
        Fetch: FnOnce() -> FetchFut,
        FetchFut: Future<Output = Result<Option<In>, EngineError>>,
        Gen: FnOnce(In) -> GenFut,
        GenFut: Future<Output = Result<T, EngineError>>,
        Fall: FnOnce() -> T,
    {
        let key = spec.cache_key.as_str();

        if !spec.enabled {
            warn!("AI features disabled, degrading {key}");
            return self.stale_or_fallback(key, build_fallback);
        }

        // One read serves both tiers: a fresh entry returns immediately, an
        // expired one is reaped from the cache but kept in hand as the last
        // known good value for the degraded branches below.
        let stale = match self.cache.lookup::<T>(key) {
            Some(found) if !found.is_expired => {
                debug!("returning fresh cached content for {key}");
                return GeneratedContent {
                    value: found.data,
                    origin: ContentOrigin::Cached,
                };
            }
            Some(found) => Some(found.data),
            None => None,
        };

        // Quota claimed here stays claimed even if a later step bails out
        // before the generator runs.
        if !self.quota.try_consume() {
            warn!("generation quota exhausted, degrading {key}");
            return degrade(key, stale, build_fallback);
        }

        let input = match fetch_input().await {
            Ok(Some(input)) => input,
            Ok(None) => {
                warn!("no usable input data for {key}, degrading");
                return degrade(key, stale, build_fallback);
            }
            Err(err) => {
                error!("input fetch for {key} failed: {err}");
                return degrade(key, stale, build_fallback);
            }
        };

        let output = match generate(input).await {
            Ok(output) => output,
            Err(err) => {
                error!("generation for {key} failed: {err}");
                return degrade(key, stale, build_fallback);
            }
        };

        self.cache.set(key, &output, spec.ttl_seconds);
        debug!("generated and cached content for {key} (TTL: {}s)", spec.ttl_seconds);

        if let Some(archive) = &self.archive {
            match serde_json::to_value(&output) {
                Ok(value) => {
                    if let Err(err) = archive.record(key, &value).await {
                        warn!("failed to archive response for {key}: {err}");
                    }
                }
                Err(err) => warn!("failed to serialize response for archiving {key}: {err}"),
            }
        }

        GeneratedContent {
            value: output,
            origin: ContentOrigin::Fresh,
        }
    }

    /// Degraded tail used before the cache is consulted for freshness: stale
    /// cache if present, otherwise the synthesized fallback
    fn stale_or_fallback<T, Fall>(&self, key: &str, build_fallback: Fall) -> GeneratedContent<T>
    where
        T: DeserializeOwned,
        Fall: FnOnce() -> T,
    {
        degrade(key, self.cache.get::<T>(key, true), build_fallback)
    }
}

/// Wraps an already-read stale value, or the fallback, as degraded content
fn degrade<T, Fall>(key: &str, stale: Option<T>, build_fallback: Fall) -> GeneratedContent<T>
where
    Fall: FnOnce() -> T,
{
    match stale {
        Some(value) => {
            debug!("serving stale cached content for {key}");
            GeneratedContent {
                value,
                origin: ContentOrigin::Stale,
            }
        }
        None => {
            debug!("no cached content for {key}, serving static fallback");
            GeneratedContent {
                value: build_fallback(),
                origin: ContentOrigin::Fallback,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_minimal() {
        assert_eq!(cache_key("news", "f1", None, None), "news:f1");
    }

    #[test]
    fn test_cache_key_with_season() {
        assert_eq!(cache_key("bio", "44", Some(2024), None), "bio:44:2024");
    }

    #[test]
    fn test_cache_key_with_season_and_event() {
        assert_eq!(
            cache_key("preview", "monza", Some(2024), Some(17)),
            "preview:monza:2024:17"
        );
    }

    #[test]
    fn test_is_fallback_per_origin() {
        let fresh = GeneratedContent {
            value: 1,
            origin: ContentOrigin::Fresh,
        };
        let cached = GeneratedContent {
            value: 1,
            origin: ContentOrigin::Cached,
        };
        let stale = GeneratedContent {
            value: 1,
            origin: ContentOrigin::Stale,
        };
        let fallback = GeneratedContent {
            value: 1,
            origin: ContentOrigin::Fallback,
        };

        assert!(!fresh.is_fallback());
        assert!(!cached.is_fallback());
        assert!(stale.is_fallback());
        assert!(fallback.is_fallback());
    }

    #[test]
    fn test_generate_error_maps_to_decode_variant() {
        let decode_err = crate::decode::decode::<serde_json::Value>("not json")
            .expect_err("prose should not decode");

        let engine_err: EngineError = GenerateError::Decode(decode_err).into();
        assert!(matches!(engine_err, EngineError::Decode(_)));
    }

    #[test]
    fn test_generate_error_maps_to_generation_variant() {
        let engine_err: EngineError = GenerateError::EmptyReply.into();
        assert!(matches!(engine_err, EngineError::Generation(_)));
    }
}
