use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{Provider, RequestPacer, error_from_response, error_from_transport, http_client};

/// Ollama client for interacting with the local Ollama chat API
#[derive(Debug)]
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// Model name to use for generation
    model: String,
    /// Sampling temperature
    temperature: f32,
    /// HTTP client for making requests
    client: Client,
    /// Spacing between requests when a rate limit is configured
    pacer: RequestPacer,
}

/// Chat message object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Chat request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    /// Format to return a response in
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// Chat response from the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,
    pub message: ChatMessage,
    #[serde(default)]
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            options: None,
            format: None,
            stream: Some(false),
        }
    }

    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.get_or_insert_with(GenerationOptions::default).temperature = Some(temperature);
        self
    }

    /// Constrain the output to a JSON value
    pub fn json_format(mut self) -> Self {
        self.format = Some("json".to_string());
        self
    }
}

impl Ollama {
    /// Create a new Ollama client for `base_url` (e.g. `http://localhost:11434`)
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: 0.1,
            client: http_client(timeout),
            pacer: RequestPacer::unlimited(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: Option<u32>) -> Self {
        self.pacer = RequestPacer::per_minute(rate_limit);
        self
    }

    /// Chat with the Ollama API
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        self.pacer.wait().await;

        let response = self.client.post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| error_from_transport("Ollama", e))?;

        if !response.status().is_success() {
            return Err(error_from_response("Ollama", response).await);
        }

        let response_text = response.text().await
            .map_err(|e| error_from_transport("Ollama", e))?;

        parse_chat_response(&response_text)
    }
}

/// Parse a chat body, accepting a streamed JSONL body as well as a single object
pub fn parse_chat_response(response_text: &str) -> Result<ChatResponse, ProviderError> {
    match serde_json::from_str::<ChatResponse>(response_text) {
        Ok(chat_response) => Ok(chat_response),
        Err(e) => {
            debug!("Ollama chat response is not a single object ({}), trying JSONL", e);

            let mut content = String::new();
            let mut last: Option<serde_json::Value> = None;
            for line in response_text.lines().filter(|l| !l.trim().is_empty()) {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
                    if let Some(part) = value.pointer("/message/content").and_then(|v| v.as_str()) {
                        content.push_str(part);
                    }
                    last = Some(value);
                }
            }

            match last {
                Some(value) => Ok(ChatResponse {
                    model: value.get("model").and_then(|v| v.as_str()).unwrap_or("unknown").to_string(),
                    message: ChatMessage {
                        role: "assistant".to_string(),
                        content,
                    },
                    done: true,
                    prompt_eval_count: value.get("prompt_eval_count").and_then(|v| v.as_u64()),
                    eval_count: value.get("eval_count").and_then(|v| v.as_u64()),
                }),
                None => {
                    error!(
                        "Failed to parse Ollama API chat response. Raw response (first 500 chars): {}",
                        response_text.chars().take(500).collect::<String>()
                    );
                    Err(ProviderError::MalformedOutput(format!(
                        "Failed to parse Ollama API chat response: {}",
                        e
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl Provider for Ollama {
    type Request = ChatRequest;
    type Response = ChatResponse;

    fn name(&self) -> &str {
        "ollama"
    }

    fn build_request(&self, prompt: &str) -> ChatRequest {
        ChatRequest::new(&self.model)
            .add_message("user", prompt)
            .temperature(self.temperature)
            .json_format()
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.chat(request).await
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let url = format!("{}/api/version", self.base_url);
        let response = self.client.get(&url)
            .send()
            .await
            .map_err(|e| error_from_transport("Ollama", e))?;
        if !response.status().is_success() {
            return Err(error_from_response("Ollama", response).await);
        }
        Ok(())
    }

    fn extract_text(response: &ChatResponse) -> String {
        response.message.content.clone()
    }
}
