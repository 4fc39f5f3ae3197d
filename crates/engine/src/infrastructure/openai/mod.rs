//! OpenAI-compatible LLM client speaking both wire protocols.
//!
//! The protocol is picked per model identifier; the rest of the engine only
//! sees normalized [`TurnEvent`]s.

pub mod chat_completions;
pub mod protocol;
pub mod responses;
pub mod sse;

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use crate::infrastructure::config::{LlmConfig, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::infrastructure::ports::{LlmError, LlmPort, LlmRequest, TurnEvent, TurnEventStream};
use protocol::{FrameNormalizer, WireProtocol};

/// Client for OpenAI's Chat Completions and Responses APIs, or any gateway
/// that mimics them.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    stream: bool,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: Option<SecretString>, model: &str) -> Self {
        Self::with_timeout(base_url, api_key, model, DEFAULT_REQUEST_TIMEOUT_SECS)
    }

    pub fn with_timeout(
        base_url: &str,
        api_key: Option<SecretString>,
        model: &str,
        timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            stream: true,
        }
    }

    /// Request streamed (SSE) or bulk JSON replies.
    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::with_timeout(
            &config.base_url,
            config.api_key.clone(),
            &config.model,
            config.timeout_secs,
        )
        .with_streaming(config.stream)
    }

    /// Create client from environment variables.
    ///
    /// Uses `OPENAI_BASE_URL`, `OPENAI_API_KEY`, `GM_MODEL`, `GM_STREAM` and
    /// `GM_REQUEST_TIMEOUT_SECS`, falling back to defaults if not set.
    pub fn from_env() -> Self {
        Self::from_config(&LlmConfig::from_env())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn protocol(&self) -> WireProtocol {
        WireProtocol::for_model(&self.model)
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("stream", &self.stream)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

#[async_trait]
impl LlmPort for OpenAiClient {
    async fn start_turn(&self, request: LlmRequest) -> Result<TurnEventStream, LlmError> {
        let protocol = self.protocol();
        let body = protocol.encode_request(&self.model, &request, self.stream);

        tracing::debug!(
            protocol = %protocol,
            model = %self.model,
            stream = self.stream,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Starting LLM turn"
        );

        let mut builder = self
            .client
            .post(format!("{}{}", self.base_url, protocol.endpoint()))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
            return Err(LlmError::RequestFailed(format!(
                "{} {}",
                status.as_u16(),
                error_text
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let is_event_stream = content_type.starts_with("text/event-stream");

        match (self.stream, is_event_stream) {
            (true, true) => Ok(sse::sse_turn_stream(
                Box::pin(response.bytes_stream()),
                FrameNormalizer::for_protocol(protocol),
            )),
            (false, false) => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
                let events = protocol.normalize_body(&text)?;
                Ok(bulk_turn_stream(events))
            }
            (true, false) => Err(LlmError::invalid(format!(
                "Requested a stream but backend replied with '{}'",
                content_type
            ))),
            (false, true) => Err(LlmError::invalid(
                "Requested a single response but backend replied with an event stream",
            )),
        }
    }
}

/// A bulk reply replayed as a finite event stream.
pub fn bulk_turn_stream(events: Vec<TurnEvent>) -> TurnEventStream {
    Box::pin(stream::iter(events.into_iter().map(Ok)))
}
