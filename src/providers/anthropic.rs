use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{
    AsyncBatchProvider, BatchRequest, BatchResultItem, ItemOutcome, Provider, RequestPacer,
    error_from_response, error_from_transport, http_client,
};
use crate::translation::jobs::{JobHandle, JobState};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic client for the Messages and Message Batches APIs
#[derive(Debug)]
pub struct Anthropic {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API base URL without the version prefix
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    pacer: RequestPacer,
}

/// Anthropic message request
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest {
    /// The model to use
    model: String,

    /// The messages for the conversation
    messages: Vec<AnthropicMessage>,

    /// System prompt to guide the AI
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,

    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    /// Maximum number of tokens to generate
    max_tokens: u32,
}

/// Anthropic message format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// Role of the message sender (user, assistant)
    pub role: String,

    /// Content of the message
    pub content: String,
}

/// Token usage information
#[derive(Debug, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    /// The content of the response
    pub content: Vec<AnthropicContent>,
    /// Token usage information
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

/// Individual content block in an Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicContent {
    /// The type of content
    #[serde(rename = "type")]
    pub content_type: String,

    /// The actual text content
    #[serde(default)]
    pub text: String,
}

impl AnthropicRequest {
    /// Create a new Anthropic request
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            system: None,
            temperature: None,
            max_tokens,
        }
    }

    /// Add a message to the request
    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(AnthropicMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    /// Set the system prompt
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// One entry of a Message Batches submission
#[derive(Debug, Serialize)]
struct BatchEntry {
    custom_id: String,
    params: AnthropicRequest,
}

#[derive(Debug, Serialize)]
struct CreateBatchRequest {
    requests: Vec<BatchEntry>,
}

/// Per-request tallies reported with a batch
#[derive(Debug, Default, Deserialize)]
pub struct RequestCounts {
    #[serde(default)]
    pub processing: u32,
    #[serde(default)]
    pub succeeded: u32,
    #[serde(default)]
    pub errored: u32,
    #[serde(default)]
    pub canceled: u32,
    #[serde(default)]
    pub expired: u32,
}

/// Message batch object as returned by create and retrieve
#[derive(Debug, Deserialize)]
pub struct MessageBatch {
    pub id: String,
    pub processing_status: String,
    #[serde(default)]
    pub request_counts: RequestCounts,
    #[serde(default)]
    pub results_url: Option<String>,
}

impl MessageBatch {
    /// Job state for this batch.
    ///
    /// An `ended` batch in which no request produced an answer is reported
    /// as `expired` or `cancelled`, whichever accounts for its requests.
    pub fn job_state(&self) -> Option<JobState> {
        let state = JobState::from_provider_status(&self.processing_status)?;
        if state != JobState::Ended {
            return Some(state);
        }
        let counts = &self.request_counts;
        if counts.succeeded + counts.errored > 0 {
            return Some(JobState::Ended);
        }
        if counts.expired > 0 && counts.expired >= counts.canceled {
            Some(JobState::Expired)
        } else if counts.canceled > 0 {
            Some(JobState::Cancelled)
        } else {
            Some(JobState::Ended)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BatchResultBody {
    Succeeded { message: AnthropicResponse },
    Errored {
        #[serde(default)]
        error: serde_json::Value,
    },
    Expired,
    Canceled,
}

#[derive(Debug, Deserialize)]
struct BatchResultLine {
    custom_id: String,
    result: BatchResultBody,
}

/// Map an error object from a batch result line to a provider error
fn batch_error(error: &serde_json::Value) -> ProviderError {
    // The object is either `{type, message}` or wrapped as `{type: "error", error: {...}}`
    let inner = error.get("error").unwrap_or(error);
    let kind = inner.get("type").and_then(|v| v.as_str()).unwrap_or("unknown");
    let message = inner
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("batch request errored")
        .to_string();
    match kind {
        "authentication_error" | "permission_error" => ProviderError::AuthenticationError(message),
        "rate_limit_error" => ProviderError::RateLimitExceeded {
            message,
            retry_after: None,
        },
        "overloaded_error" | "api_error" => ProviderError::ServerError {
            status_code: 529,
            message,
        },
        _ => ProviderError::ApiError {
            status_code: 400,
            message: format!("{}: {}", kind, message),
        },
    }
}

/// Parse the JSONL body served at a batch's `results_url`
pub fn parse_batch_results(body: &str) -> Result<Vec<BatchResultItem>, ProviderError> {
    let mut items = Vec::new();
    for (line_no, line) in body.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: BatchResultLine = serde_json::from_str(line).map_err(|e| {
            ProviderError::MalformedOutput(format!(
                "Invalid batch result on line {}: {}",
                line_no + 1,
                e
            ))
        })?;
        let outcome = match parsed.result {
            BatchResultBody::Succeeded { message } => {
                ItemOutcome::Succeeded(Anthropic::extract_text(&message))
            }
            BatchResultBody::Errored { error } => ItemOutcome::Errored(batch_error(&error)),
            BatchResultBody::Expired => ItemOutcome::Expired,
            BatchResultBody::Canceled => ItemOutcome::Cancelled,
        };
        items.push(BatchResultItem {
            custom_id: parsed.custom_id,
            outcome,
        });
    }
    Ok(items)
}

impl Anthropic {
    /// Create a new Anthropic client
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let endpoint = if endpoint.is_empty() {
            "https://api.anthropic.com".to_string()
        } else {
            endpoint.trim_end_matches('/').to_string()
        };
        Self {
            client: http_client(Duration::from_secs(120)),
            api_key: api_key.into(),
            endpoint,
            model: "claude-3-5-sonnet-20241022".to_string(),
            temperature: 0.1,
            max_tokens: 4096,
            pacer: RequestPacer::unlimited(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: Option<u32>) -> Self {
        self.pacer = RequestPacer::per_minute(rate_limit);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.endpoint, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        self.pacer.wait().await;
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| error_from_transport("Anthropic", e))?;
        if !response.status().is_success() {
            return Err(error_from_response("Anthropic", response).await);
        }
        Ok(response)
    }

    /// Complete a messages request
    pub async fn messages(&self, request: AnthropicRequest) -> Result<AnthropicResponse, ProviderError> {
        let builder = self
            .client
            .post(self.url("messages"))
            .header("Content-Type", "application/json")
            .json(&request);
        let response = self.send(builder).await?;
        let parsed = response
            .json::<AnthropicResponse>()
            .await
            .map_err(|e| error_from_transport("Anthropic", e))?;
        if let Some(usage) = &parsed.usage {
            debug!(
                "Anthropic usage: {} input / {} output tokens",
                usage.input_tokens, usage.output_tokens
            );
        }
        Ok(parsed)
    }

    async fn retrieve_batch(&self, job_id: &str) -> Result<MessageBatch, ProviderError> {
        let builder = self.client.get(self.url(&format!("messages/batches/{}", job_id)));
        let response = self.send(builder).await?;
        response
            .json::<MessageBatch>()
            .await
            .map_err(|e| error_from_transport("Anthropic", e))
    }
}

#[async_trait]
impl Provider for Anthropic {
    type Request = AnthropicRequest;
    type Response = AnthropicResponse;

    fn name(&self) -> &str {
        "anthropic"
    }

    fn build_request(&self, prompt: &str) -> AnthropicRequest {
        AnthropicRequest::new(&self.model, self.max_tokens)
            .add_message("user", prompt)
            .temperature(self.temperature)
    }

    async fn complete(&self, request: AnthropicRequest) -> Result<AnthropicResponse, ProviderError> {
        self.messages(request).await
    }

    /// Test the connection to the Anthropic API
    async fn test_connection(&self) -> Result<(), ProviderError> {
        let request = AnthropicRequest::new(&self.model, 10).add_message("user", "Hello");
        self.messages(request).await.map(|_| ())
    }

    /// Extract text from Anthropic response
    fn extract_text(response: &AnthropicResponse) -> String {
        response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect()
    }
}

#[async_trait]
impl AsyncBatchProvider for Anthropic {
    fn provider_id(&self) -> String {
        "anthropic".to_string()
    }

    async fn submit_batch(&self, requests: Vec<BatchRequest>) -> Result<JobHandle, ProviderError> {
        let body = CreateBatchRequest {
            requests: requests
                .into_iter()
                .map(|r| BatchEntry {
                    params: self.build_request(&r.prompt),
                    custom_id: r.custom_id,
                })
                .collect(),
        };
        let count = body.requests.len();
        let builder = self
            .client
            .post(self.url("messages/batches"))
            .header("Content-Type", "application/json")
            .json(&body);
        let response = self.send(builder).await?;
        let batch = response
            .json::<MessageBatch>()
            .await
            .map_err(|e| error_from_transport("Anthropic", e))?;
        log::info!("Submitted Anthropic message batch {} ({} requests)", batch.id, count);
        Ok(JobHandle {
            job_id: batch.id,
            results_url: batch.results_url,
        })
    }

    async fn poll_status(&self, handle: &JobHandle) -> Result<JobState, ProviderError> {
        let batch = self.retrieve_batch(&handle.job_id).await?;
        debug!(
            "Batch {}: {} (processing {}, succeeded {}, errored {}, expired {}, canceled {})",
            batch.id,
            batch.processing_status,
            batch.request_counts.processing,
            batch.request_counts.succeeded,
            batch.request_counts.errored,
            batch.request_counts.expired,
            batch.request_counts.canceled,
        );
        batch.job_state().ok_or_else(|| {
            ProviderError::MalformedOutput(format!(
                "Unknown processing_status '{}' for batch {}",
                batch.processing_status, batch.id
            ))
        })
    }

    async fn fetch_results(&self, handle: &JobHandle) -> Result<Vec<BatchResultItem>, ProviderError> {
        let results_url = match &handle.results_url {
            Some(url) => url.clone(),
            None => match self.retrieve_batch(&handle.job_id).await?.results_url {
                Some(url) => url,
                None => {
                    warn!("Batch {} has no results_url, using the default path", handle.job_id);
                    self.url(&format!("messages/batches/{}/results", handle.job_id))
                }
            },
        };
        let response = self.send(self.client.get(&results_url)).await?;
        let body = response
            .text()
            .await
            .map_err(|e| error_from_transport("Anthropic", e))?;
        parse_batch_results(&body)
    }
}
