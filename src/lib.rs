//! Pitwall - resilient AI-generated content engine
//!
//! The building blocks a sports-statistics backend needs to serve
//! AI-generated content without ever failing a request: a dual-window rate
//! limiter bounding generator calls, a TTL cache with background disk
//! snapshots, a tolerant decoder that repairs the JSON-ish text generative
//! models actually return, and a single orchestrator that resolves any
//! content type through a strict precedence of freshness tiers (fresh cache,
//! new generation, stale cache, static fallback).

pub mod cache;
pub mod config;
pub mod decode;
pub mod engine;
pub mod generate;
pub mod quota;

pub use cache::{CacheStats, CacheStore, CachedData};
pub use config::{ConfigError, GeminiConfig};
pub use decode::{decode, DecodeError};
pub use engine::{
    cache_key, ArchiveError, ContentEngine, ContentOrigin, ContentSpec, EngineError,
    GeneratedContent, ResponseArchive,
};
pub use generate::{generate_json, GeminiClient, GenerateError, TextGenerator};
pub use quota::{QuotaConfig, QuotaLimiter, QuotaStats, QuotaWindow};
