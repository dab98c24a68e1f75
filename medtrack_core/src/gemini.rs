//! HTTP backend for the Google Generative Language API.
//!
//! Sends the rendered prompt to `models/{model}:generateContent` with JSON
//! output constrained to the suggestion schema and returns the first
//! candidate's text. Shape validation happens in the suggestion client.

use crate::config::SuggestionConfig;
use crate::suggestion::{response_schema, SuggestionBackend};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on establishing a connection; the full round trip is
/// bounded by the suggestion client's timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Gemini `generateContent` backend
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

impl GeminiBackend {
    /// Create a backend for the configured endpoint and model
    pub fn new(config: &SuggestionConfig, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| Error::Config(format!("invalid API key header value: {}", e)))?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    /// Build from config, resolving the API key from file or environment
    pub fn from_config(config: &SuggestionConfig) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            Error::Config(format!(
                "no API key for the suggestion service; set suggestion.api_key or {}",
                crate::config::API_KEY_ENV_VARS.join(" / ")
            ))
        })?;
        Self::new(config, &api_key)
    }

    fn url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl SuggestionBackend for GeminiBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        };

        let response = self
            .client
            .post(self.url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Suggestion service unreachable: {}", e);
                Error::SuggestionFailure(format!("HTTP request failed: {}", e))
            })?;

        let status = response.status();
        debug!(status = %status, model = %self.model, "generateContent response received");

        let text = response
            .text()
            .await
            .map_err(|e| Error::SuggestionFailure(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ApiErrorResponse>(&text) {
                Ok(api_err) => format!(
                    "service error ({}): {}",
                    api_err.error.status, api_err.error.message
                ),
                Err(_) => format!("service returned {}: {}", status, text),
            };
            warn!("{}", message);
            return Err(Error::SuggestionFailure(message));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| Error::SuggestionFailure(format!("failed to parse service response: {}", e)))?;

        parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or_else(|| Error::SuggestionFailure("service returned no candidates".into()))
    }
}
