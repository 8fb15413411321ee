//! Text generation clients
//!
//! This module defines the seam between the resilience layer and the external
//! generator: a [`TextGenerator`] trait returning raw reply text, a
//! [`GeminiClient`] implementation for the Generative Language API, and a
//! [`generate_json`] helper that runs a reply through the tolerant decoder.

mod gemini;

pub use gemini::GeminiClient;

use crate::decode::{self, DecodeError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

/// Errors from a generation call or its decoding
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The HTTP request could not be sent or read
    #[error("generator request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The request exceeded the configured time bound
    #[error("generator request timed out after {0:?}")]
    Timeout(Duration),

    /// The backend rejected the call for exceeding its own rate limits
    #[error("generator backend rate limited the call")]
    RateLimited,

    /// The backend returned a non-success status
    #[error("generator API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the response body, when available
        message: String,
    },

    /// The reply contained no text part to decode
    #[error("generator reply contained no text")]
    EmptyReply,

    /// The reply text could not be parsed even after repair
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A source of generated text
///
/// Implementations combine a system instruction and a user prompt into one
/// request to an external model and return the raw reply text. Callers that
/// need structured output should go through [`generate_json`].
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Requests a generation and returns the raw reply text
    ///
    /// # Arguments
    /// * `system_prompt` - Instructions framing the task for the model
    /// * `user_prompt` - The content-specific request
    async fn generate(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, GenerateError>;
}

/// Requests a generation and decodes the reply into a typed value
///
/// The reply goes through the tolerant decoder, so code fences, smart quotes,
/// and stray inner quotes in the model output are repaired before parsing.
pub async fn generate_json<T, G>(
    generator: &G,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<T, GenerateError>
where
    T: DeserializeOwned,
    G: TextGenerator + ?Sized,
{
    let raw = generator.generate(system_prompt, user_prompt).await?;
    Ok(decode::decode(&raw)?)
}
