//! Generative Language API client
//!
//! This module provides a [`TextGenerator`] backed by Google's Generative
//! Language API in JSON response mode. The system instruction and user prompt
//! are concatenated into a single instruction payload, the model is asked for
//! an `application/json` reply, and the raw text of the first candidate is
//! returned for the tolerant decoder to handle.

use super::{GenerateError, TextGenerator};
use crate::config::GeminiConfig;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Base URL for the Generative Language API
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Time bound on a single generation request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sampling temperature used for all content generation
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for the Generative Language API
///
/// Construction requires a validated [`GeminiConfig`]; a missing API key or
/// model id is rejected when the config is built, so a constructed client is
/// always usable. Requests are bounded by a 10-second timeout.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// Creates a client from a validated configuration
    ///
    /// # Panics
    /// Panics if the underlying HTTP client cannot be constructed (no TLS
    /// backend available). That is a construction-time environment fault, and
    /// running without the request time bound is not an acceptable fallback.
    pub fn new(config: GeminiConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to construct HTTP client for the generator");
        Self {
            client,
            api_key: config.api_key,
            model: config.model,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    /// Overrides the API base URL
    ///
    /// Useful for pointing the client at a local stub server in tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The model id this client generates with
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    fn build_request(system_prompt: &str, user_prompt: &str) -> GenerateContentRequest {
        // The API's JSON mode takes one combined instruction payload rather
        // than separate system/user roles.
        let combined = format!("{system_prompt}\n\n{user_prompt}");
        GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: combined }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: TEMPERATURE,
            },
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GenerateError> {
        let body = Self::build_request(system_prompt, user_prompt);
        debug!(
            "requesting generation from {} (prompt length: {} chars)",
            self.model,
            body.contents[0].parts[0].text.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    GenerateError::Timeout(REQUEST_TIMEOUT)
                } else {
                    GenerateError::Request(err)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            warn!("generator API returned {status}: {message}");
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => GenerateError::RateLimited,
                _ => GenerateError::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let reply: GenerateContentResponse = response.json().await?;
        let text = reply
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .filter(|text| !text.is_empty())
            .ok_or(GenerateError::EmptyReply)?;

        debug!("received generator reply ({} chars)", text.len());
        Ok(text)
    }
}
