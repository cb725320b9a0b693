/*!
 * Provider implementations for different translation services.
 *
 * This module contains client implementations for various LLM providers:
 * - Ollama: Local LLM server
 * - OpenAI: OpenAI API integration, also used for OpenRouter and LM Studio
 * - Anthropic: Anthropic Messages API and Message Batches API
 * - Mock: scripted providers for tests
 *
 * The orchestration layer sees providers through `TranslationBackend`,
 * which is either a synchronous prompt completion or an async batch job API.
 */

use async_trait::async_trait;
use log::warn;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Client;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::errors::{ConfigError, ProviderError};
use crate::translation::jobs::{JobHandle, JobState};

/// Common trait for all LLM providers
///
/// This trait defines the interface that all provider implementations must follow,
/// allowing them to be used interchangeably in the translation service.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// The request type for this provider
    type Request: Send + Sync;

    /// The response type for this provider
    type Response: Send + Sync;

    /// Identifier used in ledgers and batch jobs
    fn name(&self) -> &str;

    /// Wrap a translation prompt into a provider request
    fn build_request(&self, prompt: &str) -> Self::Request;

    /// Complete a request using this provider
    ///
    /// # Arguments
    /// * `request` - The request to complete
    ///
    /// # Returns
    /// * `Result<Self::Response, ProviderError>` - The response from the provider or an error
    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError>;

    /// Extract text from the provider response
    fn extract_text(response: &Self::Response) -> String;
}

/// Prompt-in, text-out view of a synchronous provider
#[async_trait]
pub trait PromptCompletion: Send + Sync + Debug {
    fn provider_id(&self) -> String;

    async fn complete_prompt(&self, prompt: &str) -> Result<String, ProviderError>;
}

#[async_trait]
impl<P> PromptCompletion for P
where
    P: Provider,
{
    fn provider_id(&self) -> String {
        self.name().to_string()
    }

    async fn complete_prompt(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = self.build_request(prompt);
        let response = self.complete(request).await?;
        let text = P::extract_text(&response);
        if text.trim().is_empty() {
            return Err(ProviderError::MalformedOutput(
                "response contained no text".to_string(),
            ));
        }
        Ok(text)
    }
}

/// One request of an async batch job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// Caller-assigned correlation id (`item-0`, `item-1`, ...)
    pub custom_id: String,
    pub prompt: String,
}

/// Per-request outcome reported by an async batch job
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Succeeded(String),
    Errored(ProviderError),
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResultItem {
    pub custom_id: String,
    pub outcome: ItemOutcome,
}

/// Provider that runs whole batches as server-side jobs
#[async_trait]
pub trait AsyncBatchProvider: Send + Sync + Debug {
    fn provider_id(&self) -> String;

    async fn submit_batch(&self, requests: Vec<BatchRequest>) -> Result<JobHandle, ProviderError>;

    async fn poll_status(&self, handle: &JobHandle) -> Result<JobState, ProviderError>;

    /// Only valid once the job has `ended`
    async fn fetch_results(&self, handle: &JobHandle) -> Result<Vec<BatchResultItem>, ProviderError>;
}

/// The two provider variants, dispatched by the translation service
#[derive(Debug, Clone)]
pub enum TranslationBackend {
    Sync(Arc<dyn PromptCompletion>),
    AsyncBatch(Arc<dyn AsyncBatchProvider>),
}

impl TranslationBackend {
    pub fn provider_id(&self) -> String {
        match self {
            Self::Sync(provider) => provider.provider_id(),
            Self::AsyncBatch(provider) => provider.provider_id(),
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Self::AsyncBatch(_))
    }
}

/// Build the backend selected in the configuration
pub fn create_backend(config: &TranslationConfig) -> Result<TranslationBackend, ConfigError> {
    let provider = &config.provider;
    let provider_config = config.get_provider_config(provider);
    let timeout = Duration::from_secs(provider_config.map_or(60, |p| p.timeout_secs));
    let model = config.get_model();
    let endpoint = config.get_endpoint();
    let temperature = config.common.temperature;
    let rate_limit = config.get_rate_limit();

    let backend = match provider {
        TranslationProvider::Ollama => TranslationBackend::Sync(Arc::new(
            ollama::Ollama::new(&endpoint, &model, timeout)
                .with_temperature(temperature)
                .with_rate_limit(rate_limit),
        )),
        TranslationProvider::OpenAI | TranslationProvider::LMStudio | TranslationProvider::OpenRouter => {
            let api_key = config.get_api_key();
            if provider.requires_api_key() && api_key.is_empty() {
                return Err(ConfigError::MissingCredential {
                    provider: provider.display_name().to_string(),
                    env_var: provider.api_key_env_var().unwrap_or_default().to_string(),
                });
            }
            let mut client = openai::OpenAI::new(provider.to_lowercase_string(), api_key, &endpoint, &model, timeout)
                .with_temperature(temperature)
                .with_rate_limit(rate_limit);
            if let Some(p) = provider_config {
                if let Some(referer) = &p.http_referer {
                    client = client.with_header("HTTP-Referer", referer);
                }
                if let Some(site_name) = &p.site_name {
                    client = client.with_header("X-Title", site_name);
                }
            }
            TranslationBackend::Sync(Arc::new(client))
        }
        TranslationProvider::Anthropic => {
            let api_key = config.get_api_key();
            if api_key.is_empty() {
                return Err(ConfigError::MissingCredential {
                    provider: provider.display_name().to_string(),
                    env_var: provider.api_key_env_var().unwrap_or_default().to_string(),
                });
            }
            let client = anthropic::Anthropic::new(api_key, &endpoint)
                .with_model(&model)
                .with_timeout(timeout)
                .with_temperature(temperature)
                .with_rate_limit(rate_limit);
            if provider_config.is_some_and(|p| p.use_batch_api) {
                TranslationBackend::AsyncBatch(Arc::new(client))
            } else {
                TranslationBackend::Sync(Arc::new(client))
            }
        }
    };

    Ok(backend)
}

/// Spaces consecutive requests `60_000 / rate_limit` milliseconds apart
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Option<Duration>,
    last: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn unlimited() -> Self {
        Self {
            min_interval: None,
            last: Mutex::new(None),
        }
    }

    /// `rate_limit` in requests per minute; `None` or 0 disables pacing
    pub fn per_minute(rate_limit: Option<u32>) -> Self {
        let min_interval = rate_limit
            .filter(|rpm| *rpm > 0)
            .map(|rpm| Duration::from_millis(60_000 / rpm as u64));
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval
    }

    /// Wait until the next request may be sent
    pub async fn wait(&self) {
        let Some(interval) = self.min_interval else {
            return;
        };
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// HTTP client with a request timeout
///
/// Falls back to a default client (no timeout) when the TLS backend cannot be
/// initialised, and says so in the log.
pub(crate) fn http_client(timeout: Duration) -> Client {
    match Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("Failed to build HTTP client with a {:?} timeout, using defaults without a timeout: {}", timeout, e);
            Client::new()
        }
    }
}

/// `Retry-After` in seconds; HTTP-date values are ignored
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Map an unsuccessful HTTP status to the provider failure taxonomy
pub fn classify_status(status: u16, message: String, retry_after: Option<Duration>) -> ProviderError {
    match status {
        401 | 403 => ProviderError::AuthenticationError(message),
        429 => ProviderError::RateLimitExceeded { message, retry_after },
        408 => ProviderError::Timeout(message),
        500..=599 => ProviderError::ServerError { status_code: status, message },
        _ => ProviderError::ApiError { status_code: status, message },
    }
}

/// Turn a non-success response into a `ProviderError`
pub(crate) async fn error_from_response(provider: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let retry_after = parse_retry_after(response.headers());
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to get error response text".to_string());
    log::debug!("{} API error ({}): {}", provider, status, body);
    classify_status(status, format!("{} API error: {}", provider, body), retry_after)
}

pub(crate) fn error_from_transport(provider: &str, error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(format!("{} request timed out: {}", provider, error))
    } else if error.is_decode() {
        ProviderError::MalformedOutput(format!("Failed to parse {} response: {}", provider, error))
    } else {
        ProviderError::ConnectionError(format!("Failed to reach {}: {}", provider, error))
    }
}

pub mod anthropic;
pub mod mock;
pub mod ollama;
pub mod openai;
