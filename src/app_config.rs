use anyhow::{Context, Result, anyhow};
use log::warn;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::Path;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::file_utils::FileManager;
use crate::translation::jobs::PollSettings;
use crate::translation::placeholders::PlaceholderExtractor;
use crate::translation::retry::RetryPolicy;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code of the authoritative catalog
    pub source_language: String,

    /// Target language codes to translate into
    #[serde(default)]
    pub target_languages: Vec<String>,

    /// Translation config
    pub translation: TranslationConfig,

    /// Where catalogs, the memory artifact and run ledgers live
    #[serde(default)]
    pub paths: PathsConfig,

    /// Extra protected-token patterns
    #[serde(default)]
    pub placeholders: PlaceholderConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: Ollama
    #[default]
    Ollama,
    // @provider: OpenAI
    OpenAI,
    // @provider: Anthropic
    Anthropic,
    // @provider: LM Studio (OpenAI-compatible local server)
    LMStudio,
    // @provider: OpenRouter (OpenAI-compatible gateway)
    OpenRouter,
}

impl TranslationProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Ollama => "Ollama",
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::LMStudio => "LM Studio",
            Self::OpenRouter => "OpenRouter",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Ollama => "ollama".to_string(),
            Self::OpenAI => "openai".to_string(),
            Self::Anthropic => "anthropic".to_string(),
            Self::LMStudio => "lmstudio".to_string(),
            Self::OpenRouter => "openrouter".to_string(),
        }
    }

    // @returns: Whether a hosted API key is mandatory
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAI | Self::Anthropic | Self::OpenRouter)
    }

    // @returns: Environment variable consulted when the config has no key
    pub fn api_key_env_var(&self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::OpenRouter => Some("OPENROUTER_API_KEY"),
            Self::Ollama | Self::LMStudio => None,
        }
    }
}

// Implement Display trait for TranslationProvider
impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

// Implement FromStr trait for TranslationProvider
impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "lmstudio" => Ok(Self::LMStudio),
            "openrouter" => Ok(Self::OpenRouter),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Rate limit (requests per minute)
    #[serde(default)]
    pub rate_limit: Option<u32>,

    // @field: Submit batches as async jobs (Anthropic Message Batches)
    #[serde(default)]
    pub use_batch_api: bool,

    // @field: OpenRouter attribution header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_referer: Option<String>,

    // @field: OpenRouter X-Title header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        let base = Self {
            provider_type: provider_type.to_lowercase_string(),
            model: default_model(&provider_type),
            api_key: String::new(),
            endpoint: default_endpoint(&provider_type),
            timeout_secs: default_timeout_secs(),
            rate_limit: default_rate_limit(&provider_type),
            use_batch_api: false,
            http_referer: None,
            site_name: None,
        };

        match provider_type {
            TranslationProvider::Anthropic => Self {
                timeout_secs: default_anthropic_timeout_secs(),
                ..base
            },
            TranslationProvider::Ollama | TranslationProvider::LMStudio => Self {
                timeout_secs: default_local_timeout_secs(),
                ..base
            },
            _ => base,
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// Maximum entries per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Retry count for transient provider failures
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base backoff for retries (in milliseconds), doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Repair attempts per batch after an invalid response
    #[serde(default = "default_max_repairs")]
    pub max_repairs: u32,

    /// Temperature parameter for text generation (0.0 to 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Seconds between status polls of async batch jobs
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Give up waiting for an async batch job after this many seconds
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Batches in flight at once
    #[serde(default = "default_concurrent_batches")]
    pub concurrent_batches: usize,

    /// Product or tone description included in every prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_context: Option<String>,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_repairs: default_max_repairs(),
            temperature: default_temperature(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_timeout_secs: default_poll_timeout_secs(),
            concurrent_batches: default_concurrent_batches(),
            global_context: None,
        }
    }
}

/// File locations
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PathsConfig {
    /// Directory holding `<lang>.json` catalogs
    #[serde(default = "default_i18n_dir")]
    pub i18n_dir: String,

    /// Translation memory artifact (JSONL)
    #[serde(default = "default_memory_file")]
    pub memory_file: String,

    /// Parent directory of per-run ledgers
    #[serde(default = "default_runs_dir")]
    pub runs_dir: String,

    /// Optional JSON map of key -> context for prompts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_file: Option<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            i18n_dir: default_i18n_dir(),
            memory_file: default_memory_file(),
            runs_dir: default_runs_dir(),
            meta_file: None,
        }
    }
}

/// A named project-specific placeholder pattern
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CustomPattern {
    pub name: String,
    pub regex: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PlaceholderConfig {
    #[serde(default)]
    pub custom_patterns: Vec<CustomPattern>,
}

impl PlaceholderConfig {
    /// Extractor with the built-in and the configured patterns
    pub fn extractor(&self) -> Result<PlaceholderExtractor, ConfigError> {
        PlaceholderExtractor::with_custom_patterns(
            self.custom_patterns
                .iter()
                .map(|p| (p.name.as_str(), p.regex.as_str())),
        )
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_anthropic_timeout_secs() -> u64 {
    120
}

fn default_local_timeout_secs() -> u64 {
    300
}

fn default_retry_count() -> u32 {
    3 // Default to 3 retries
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_max_repairs() -> u32 {
    2
}

fn default_temperature() -> f32 {
    0.1
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_poll_timeout_secs() -> u64 {
    24 * 60 * 60
}

fn default_concurrent_batches() -> usize {
    1
}

fn default_i18n_dir() -> String {
    "i18n".to_string()
}

fn default_memory_file() -> String {
    "work/memory.jsonl".to_string()
}

fn default_runs_dir() -> String {
    "runs".to_string()
}

fn default_endpoint(provider: &TranslationProvider) -> String {
    match provider {
        TranslationProvider::Ollama => "http://localhost:11434",
        TranslationProvider::OpenAI => "https://api.openai.com/v1",
        TranslationProvider::Anthropic => "https://api.anthropic.com",
        // LM Studio default server (OpenAI compatible) runs on port 1234 under /v1
        TranslationProvider::LMStudio => "http://localhost:1234/v1",
        TranslationProvider::OpenRouter => "https://openrouter.ai/api/v1",
    }
    .to_string()
}

fn default_model(provider: &TranslationProvider) -> String {
    match provider {
        TranslationProvider::Ollama => "llama3.1:latest",
        TranslationProvider::OpenAI => "gpt-4o-mini",
        TranslationProvider::Anthropic => "claude-3-5-sonnet-20241022",
        // Placeholder; users should set to the loaded model name in LM Studio
        TranslationProvider::LMStudio => "local-model",
        TranslationProvider::OpenRouter => "openai/gpt-4o-mini",
    }
    .to_string()
}

fn default_rate_limit(provider: &TranslationProvider) -> Option<u32> {
    match provider {
        // Local servers are not rate limited
        TranslationProvider::Ollama | TranslationProvider::LMStudio => None,
        TranslationProvider::OpenAI | TranslationProvider::OpenRouter => Some(60),
        // Slightly below Anthropic's standard 50 requests per minute
        TranslationProvider::Anthropic => Some(45),
    }
}

impl Config {
    /// Load `path`, or write a default configuration there when it does not exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if FileManager::file_exists(path) {
            let content = FileManager::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            return Ok(config);
        }

        warn!("Config file not found at {:?}, creating default config.", path);
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config_json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        FileManager::write_to_file(path, &config_json)
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::language_utils::validate_language_code(&self.source_language)
            .map_err(|_| ConfigError::InvalidLanguage(self.source_language.clone()))?;

        for target in &self.target_languages {
            crate::language_utils::check_target_language(&self.source_language, target)?;
        }

        let common = &self.translation.common;
        if common.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if common.concurrent_batches == 0 {
            return Err(ConfigError::Invalid("concurrent_batches must be at least 1".to_string()));
        }
        if !(0.0..=2.0).contains(&common.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature {} is outside 0.0..=2.0",
                common.temperature
            )));
        }

        let provider = &self.translation.provider;
        if provider.requires_api_key() && self.translation.get_api_key().is_empty() {
            return Err(ConfigError::MissingCredential {
                provider: provider.display_name().to_string(),
                env_var: provider.api_key_env_var().unwrap_or_default().to_string(),
            });
        }

        let endpoint = self.translation.get_endpoint();
        match url::Url::parse(&endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "endpoint '{}' is not an http(s) URL",
                    endpoint
                )));
            }
        }

        self.placeholders.extractor()?;

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.translation.common.retry_count,
            Duration::from_millis(self.translation.common.retry_backoff_ms),
        )
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.translation.common.poll_interval_secs),
            ceiling: Duration::from_secs(self.translation.common.poll_timeout_secs),
        }
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: "en".to_string(),
            target_languages: vec!["fr".to_string()],
            translation: TranslationConfig::default(),
            paths: PathsConfig::default(),
            placeholders: PlaceholderConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &TranslationProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers.iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Mutable configuration of the active provider, created with defaults if absent
    pub fn active_provider_config_mut(&mut self) -> &mut ProviderConfig {
        let provider_str = self.provider.to_lowercase_string();
        let index = match self.available_providers.iter().position(|p| p.provider_type == provider_str) {
            Some(index) => index,
            None => {
                self.available_providers.push(ProviderConfig::new(self.provider.clone()));
                self.available_providers.len() - 1
            }
        };
        &mut self.available_providers[index]
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.model.is_empty() {
                return provider_config.model.clone();
            }
        }

        default_model(&self.provider)
    }

    /// Get the API key for the active provider, falling back to its environment variable
    pub fn get_api_key(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.api_key.is_empty() {
                return provider_config.api_key.clone();
            }
        }

        self.provider
            .api_key_env_var()
            .and_then(|var| std::env::var(var).ok())
            .map(|key| key.trim().to_string())
            .unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.endpoint.is_empty() {
                return provider_config.endpoint.clone();
            }
        }

        default_endpoint(&self.provider)
    }

    /// Get the rate limit for the active provider
    pub fn get_rate_limit(&self) -> Option<u32> {
        if let Some(provider_config) = self.get_active_provider_config() {
            return provider_config.rate_limit;
        }

        default_rate_limit(&self.provider)
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: vec![
                ProviderConfig::new(TranslationProvider::Ollama),
                ProviderConfig::new(TranslationProvider::OpenAI),
                ProviderConfig::new(TranslationProvider::Anthropic),
                ProviderConfig::new(TranslationProvider::LMStudio),
                ProviderConfig::new(TranslationProvider::OpenRouter),
            ],
            common: TranslationCommonConfig::default(),
        }
    }
}
