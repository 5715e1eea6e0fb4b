//! OpenAI Transport
//!
//! Chat Completions API. Failures are classified by HTTP status, with the
//! `Retry-After` header attached to rate-limit errors.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ProviderKind, TokenUsage, Transport, TransportReply, TransportRequest};
use crate::types::{ErrorCategory, ErrorClassifier, LlmError, QuizloomError, Result};

const SYSTEM_PROMPT: &str =
    "You are an educational content assistant. Follow the output format requested in the prompt exactly.";

/// HTTP transport for the OpenAI Chat Completions API
#[derive(Debug, Clone)]
pub struct OpenAiTransport {
    api_base: String,
    client: reqwest::Client,
}

impl OpenAiTransport {
    pub fn new(api_base: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QuizloomError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base
                .unwrap_or_else(|| ProviderKind::OpenAi.default_api_base().to_string())
                .trim_end_matches('/')
                .to_string(),
            client,
        })
    }

    fn build_request(request: &TransportRequest<'_>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: request.model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.prompt.to_string(),
                },
            ],
            temperature: request.temperature,
            max_tokens: Some(request.max_tokens),
        }
    }
}

#[async_trait]
impl Transport for OpenAiTransport {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn send(
        &self,
        request: TransportRequest<'_>,
    ) -> std::result::Result<TransportReply, LlmError> {
        let body = Self::build_request(&request);
        let url = format!("{}/chat/completions", self.api_base);

        debug!(model = request.model, "Sending request to OpenAI API");

        let response = self
            .client
            .post(&url)
            .bearer_auth(request.credential.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, "openai"))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(ErrorClassifier::parse_retry_after);
            let text = response.text().await.unwrap_or_default();
            let mut error = ErrorClassifier::classify_http_status(
                status.as_u16(),
                &error_message(&text),
                "openai",
            );
            if let Some(delay) = retry_after {
                error = error.retry_after(delay);
            }
            return Err(error);
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            LlmError::with_provider(
                ErrorCategory::ParseError,
                format!("Failed to parse OpenAI response: {}", e),
                "openai",
            )
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                LlmError::with_provider(
                    ErrorCategory::ParseError,
                    "No content in OpenAI response",
                    "openai",
                )
            })?;

        Ok(TransportReply {
            content,
            model_id: parsed.model.unwrap_or_default(),
            usage: parsed
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
        })
    }
}

/// Classify a reqwest failure that produced no HTTP response
pub(super) fn classify_transport_error(error: &reqwest::Error, provider: &str) -> LlmError {
    let category = if error.is_timeout() || error.is_connect() {
        ErrorCategory::Network
    } else if error.is_decode() {
        ErrorCategory::ParseError
    } else {
        return ErrorClassifier::classify(&error.to_string(), provider);
    };
    LlmError::with_provider(category, error.to_string(), provider)
}

/// Message field of an OpenAI-style error body, or the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn test_build_request() {
        let key = SecretString::from("sk-test");
        let request = TransportRequest {
            prompt: "Write three questions",
            model: "gpt-4o-mini",
            temperature: 0.4,
            max_tokens: 800,
            credential: &key,
        };
        let body = serde_json::to_value(OpenAiTransport::build_request(&request)).unwrap();

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 800);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "Write three questions");
        assert!(body.to_string().find("sk-test").is_none());
    }

    #[test]
    fn test_parse_response() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.model.as_deref(), Some("gpt-4o-mini-2024-07-18"));
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hello"));
        assert_eq!(parsed.usage.unwrap().completion_tokens, 3);
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error": {"message": "Rate limit reached for gpt-4o", "type": "requests"}}"#;
        assert_eq!(error_message(body), "Rate limit reached for gpt-4o");
        assert_eq!(error_message("plain text"), "plain text");
    }

    #[test]
    fn test_api_base_trailing_slash() {
        let transport = OpenAiTransport::new(
            Some("http://localhost:8080/v1/".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(transport.api_base, "http://localhost:8080/v1");
    }
}
