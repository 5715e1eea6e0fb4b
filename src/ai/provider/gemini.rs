//! Gemini Transport
//!
//! `models/{model}:generateContent` endpoint of the Generative Language API.
//! Rate-limit replies carry the retry hint either in a `Retry-After` header
//! or in a `google.rpc.RetryInfo` detail (`"retryDelay": "30s"`).

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::openai::classify_transport_error;
use super::{ProviderKind, TokenUsage, Transport, TransportReply, TransportRequest};
use crate::types::{ErrorCategory, ErrorClassifier, LlmError, QuizloomError, Result};

/// HTTP transport for the Gemini generateContent API
#[derive(Debug, Clone)]
pub struct GeminiTransport {
    api_base: String,
    client: reqwest::Client,
}

impl GeminiTransport {
    pub fn new(api_base: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QuizloomError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base
                .unwrap_or_else(|| ProviderKind::Gemini.default_api_base().to_string())
                .trim_end_matches('/')
                .to_string(),
            client,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.api_base, model)
    }

    fn build_request(request: &TransportRequest<'_>) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(request.prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        }
    }
}

#[async_trait]
impl Transport for GeminiTransport {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn send(
        &self,
        request: TransportRequest<'_>,
    ) -> std::result::Result<TransportReply, LlmError> {
        let body = Self::build_request(&request);

        debug!(model = request.model, "Sending request to Gemini API");

        let response = self
            .client
            .post(self.endpoint(request.model))
            .header("x-goog-api-key", request.credential.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, "gemini"))?;

        let status = response.status();
        if !status.is_success() {
            let header_delay = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(ErrorClassifier::parse_retry_after);
            let text = response.text().await.unwrap_or_default();
            let (message, body_delay) = parse_error_body(&text);

            let mut error =
                ErrorClassifier::classify_http_status(status.as_u16(), &message, "gemini");
            if let Some(delay) = header_delay.or(body_delay) {
                error = error.retry_after(delay);
            }
            return Err(error);
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            LlmError::with_provider(
                ErrorCategory::ParseError,
                format!("Failed to parse Gemini response: {}", e),
                "gemini",
            )
        })?;

        reply_from_response(parsed, request.model)
    }
}

fn reply_from_response(
    response: GenerateContentResponse,
    model: &str,
) -> std::result::Result<TransportReply, LlmError> {
    let candidate = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| {
            LlmError::with_provider(ErrorCategory::ParseError, "No candidates in Gemini response", "gemini")
        })?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "UNKNOWN".to_string());
        return Err(LlmError::with_provider(
            ErrorCategory::ParseError,
            format!("Empty Gemini response (finish reason: {})", reason),
            "gemini",
        ));
    }

    Ok(TransportReply {
        content: text,
        model_id: response.model_version.unwrap_or_else(|| model.to_string()),
        usage: response
            .usage_metadata
            .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count)),
    })
}

/// Message and `RetryInfo` delay from a Google API error body
fn parse_error_body(body: &str) -> (String, Option<Duration>) {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return (body.to_string(), None);
    };

    let delay = envelope
        .error
        .details
        .iter()
        .filter(|d| {
            d.get("@type")
                .and_then(Value::as_str)
                .is_some_and(|t| t.ends_with("RetryInfo"))
        })
        .filter_map(|d| d.get("retryDelay").and_then(Value::as_str))
        .find_map(|s| ErrorClassifier::parse_retry_after(s.trim_end_matches('s')));

    let message = match envelope.error.status {
        Some(status) => format!("{}: {}", status, envelope.error.message),
        None => envelope.error.message,
    };
    (message, delay)
}

// Request/Response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    status: Option<String>,
    #[serde(default)]
    details: Vec<Value>,
}
