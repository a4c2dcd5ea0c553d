use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::OpenAiConfig;

/// Request/response contract for the text extraction engine: one
/// instruction string in, one completion string out. Implementations must
/// be swappable for a stub; callers treat the returned text as untrusted.
pub trait CompletionService: Send + Sync {
    fn complete<'a>(&'a self, instruction: &'a str) ->
        std::pin::Pin<Box<dyn std::future::Future<Output = Result<String>> + Send + 'a>>;
}

/// OpenAI chat-completions client
pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Self {
        info!("Initializing OpenAI client (model: {})", config.model);

        OpenAiClient {
            http: reqwest::Client::new(),
            config: config.clone(),
        }
    }

    async fn chat_completion(&self, instruction: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a helpful assistant.",
                },
                ChatMessage {
                    role: "user",
                    content: instruction,
                },
            ],
            temperature: self.config.temperature,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        debug!("Sending completion request ({} chars) to {}", instruction.len(), url);

        let response = self.http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("Unable to reach the OpenAI API")?
            .error_for_status()
            .context("OpenAI API returned an error status")?
            .json::<ChatCompletionResponse>()
            .await
            .context("Unable to decode the OpenAI API response")?;

        let content = response.choices
            .into_iter()
            .next()
            .context("No completion choices in the OpenAI API response")?
            .message
            .content;

        debug!("Received completion ({} chars)", content.len());

        Ok(content)
    }
}

impl CompletionService for OpenAiClient {
    fn complete<'a>(&'a self, instruction: &'a str) ->
        std::pin::Pin<Box<dyn std::future::Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.chat_completion(instruction))
    }
}
