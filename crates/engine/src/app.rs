//! Application state and composition.

use std::sync::Arc;

use crate::infrastructure::{
    config::{GmConfig, LlmConfig},
    openai::OpenAiClient,
    ports::{LlmPort, RandomPort},
    random::SystemRandom,
    resilient_llm::{ResilientLlmClient, RetryConfig},
};
use crate::use_cases::gm::RunGmTurn;

/// Main application state.
///
/// Holds the backend port and the GM use case built on top of it.
pub struct App {
    pub llm: Arc<dyn LlmPort>,
    pub gm: Arc<RunGmTurn>,
}

impl App {
    pub fn new(llm: Arc<dyn LlmPort>, random: Arc<dyn RandomPort>, config: GmConfig) -> Self {
        let gm = Arc::new(RunGmTurn::new(llm.clone(), random, config));
        Self { llm, gm }
    }

    /// Wire the OpenAI-compatible client, retry wrapper and system RNG from
    /// environment variables.
    pub fn from_env() -> Self {
        let llm_config = LlmConfig::from_env();
        let client = OpenAiClient::from_config(&llm_config);
        tracing::info!(
            model = %client.model(),
            protocol = %client.protocol(),
            stream = llm_config.stream,
            "LLM client configured"
        );

        let retry_config = RetryConfig::default();
        tracing::info!(
            "LLM client configured with retry: max_retries={}, base_delay_ms={}",
            retry_config.max_retries,
            retry_config.base_delay_ms
        );
        let llm: Arc<dyn LlmPort> =
            Arc::new(ResilientLlmClient::new(Arc::new(client), retry_config));

        Self::new(llm, Arc::new(SystemRandom::new()), GmConfig::from_env())
    }
}
