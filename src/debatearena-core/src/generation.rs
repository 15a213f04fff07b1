//! The generation-service seam and its OpenAI-compatible implementation.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::error::DebateError;
use crate::scheduler::ContextMessage;

/// Everything the generation service needs for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Instruction text from the prompt builder.
    pub prompt: String,
    /// Prior statements, oldest first.
    pub context: Vec<ContextMessage>,
    /// Completion token cap for this call.
    pub max_tokens: u32,
}

/// A text-generation backend.
///
/// `Ok(None)` means the service answered without any text.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>, DebateError>;
}

/// Generation over an OpenAI-compatible chat completions API.
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
    max_retries: u32,
}

impl OpenAiGenerator {
    pub fn new(
        api_base: &str,
        api_key: &str,
        settings: &GenerationConfig,
    ) -> Result<Self, DebateError> {
        let http_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()
            .map_err(|e| {
                DebateError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        Ok(Self {
            client: Client::with_config(config).with_http_client(http_client),
            model: settings.model.clone(),
            max_retries: settings.max_retries.max(1),
        })
    }

    /// System prompt followed by every prior statement as an assistant turn.
    fn messages(request: &GenerationRequest) -> Vec<ChatCompletionRequestMessage> {
        let mut messages = Vec::with_capacity(request.context.len() + 1);
        messages.push(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessage {
                content: request.prompt.clone().into(),
                name: None,
            },
        ));
        messages.extend(request.context.iter().map(|message| {
            ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                content: Some(message.content().to_string().into()),
                name: None,
                tool_calls: None,
                refusal: None,
                audio: None,
                function_call: None,
            })
        }));
        messages
    }
}

#[async_trait]
impl GenerationService for OpenAiGenerator {
    /// Retries with exponential backoff (1s, 2s, 4s, ...) before failing.
    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>, DebateError> {
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_completion_tokens(request.max_tokens)
            .messages(Self::messages(request))
            .build()?;

        debug!(
            model = %self.model,
            prompt_chars = request.prompt.len(),
            context = request.context.len(),
            max_tokens = request.max_tokens,
            "Requesting completion"
        );

        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(6));
                tokio::time::sleep(delay).await;
            }

            match self.client.chat().create(chat_request.clone()).await {
                Ok(response) => {
                    return Ok(response
                        .choices
                        .first()
                        .and_then(|c| c.message.content.clone()));
                }
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Completion request failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.map(DebateError::from).unwrap_or_else(|| {
            DebateError::GenerationError("Unknown API error after retries".to_string())
        }))
    }
}
