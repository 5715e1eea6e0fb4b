//! Test doubles for the provider boundary and delays

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;

use crate::ai::provider::{
    Delay, ProviderKind, TokenUsage, Transport, TransportReply, TransportRequest,
};
use crate::types::{ErrorCategory, LlmError, QuizloomError, Result};

/// Request as seen by the transport, with the credential exposed for assertions
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub credential: String,
}

type Responder =
    Box<dyn Fn(u32, &CapturedRequest) -> std::result::Result<TransportReply, LlmError> + Send + Sync>;

/// Scripted transport that counts calls and captures requests
pub struct MockTransport {
    kind: ProviderKind,
    calls: AtomicU32,
    requests: Mutex<Vec<CapturedRequest>>,
    script: Mutex<VecDeque<std::result::Result<TransportReply, LlmError>>>,
    responder: Option<Responder>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("kind", &self.kind)
            .field("calls", &self.calls)
            .finish()
    }
}

impl MockTransport {
    fn empty(kind: ProviderKind) -> Self {
        Self {
            kind,
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            responder: None,
        }
    }

    /// Always replies with `content`
    pub fn replying(kind: ProviderKind, content: &str) -> Self {
        Self::scripted(kind, vec![Ok(reply(content))])
    }

    /// Replays `script` in order; the last entry repeats once the rest are used
    pub fn scripted(
        kind: ProviderKind,
        script: Vec<std::result::Result<TransportReply, LlmError>>,
    ) -> Self {
        let mock = Self::empty(kind);
        *mock.script.lock().unwrap() = script.into();
        mock
    }

    /// Computes each reply from the 1-based call number and the request
    pub fn responding<F>(kind: ProviderKind, responder: F) -> Self
    where
        F: Fn(u32, &CapturedRequest) -> std::result::Result<TransportReply, LlmError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::empty(kind)
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn send(
        &self,
        request: TransportRequest<'_>,
    ) -> std::result::Result<TransportReply, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let captured = CapturedRequest {
            prompt: request.prompt.to_string(),
            model: request.model.to_string(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            credential: request.credential.expose_secret().to_string(),
        };
        self.requests.lock().unwrap().push(captured.clone());

        if let Some(responder) = &self.responder {
            return responder(call, &captured);
        }

        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script
                .front()
                .cloned()
                .unwrap_or_else(|| Err(LlmError::new(ErrorCategory::Unknown, "empty script")))
        }
    }
}

pub fn reply(content: &str) -> TransportReply {
    TransportReply {
        content: content.to_string(),
        model_id: String::new(),
        usage: Some(TokenUsage::new(10, 5)),
    }
}

pub fn rate_limited() -> LlmError {
    LlmError::with_provider(ErrorCategory::RateLimit, "429 Too Many Requests", "mock").status(429)
}

pub fn overloaded() -> LlmError {
    LlmError::with_provider(ErrorCategory::Overloaded, "model overloaded", "mock").status(503)
}

/// Delay that records requested durations and returns immediately
#[derive(Debug, Default)]
pub struct RecordingDelay {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn recorded(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Delay for RecordingDelay {
    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(QuizloomError::cancelled("backoff"));
        }
        self.sleeps.lock().unwrap().push(duration);
        Ok(())
    }
}
