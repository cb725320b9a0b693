/*!
 * Error types for the i18n-translator application.
 *
 * Typed failures for every layer of a translation run: provider calls,
 * response validation, async batch jobs, configuration and the run itself.
 * Per-batch failures (`BatchFailure`) stay local to their batch, while
 * `RunError` aborts the whole run.
 */

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Credentials were rejected (401/403); fatal for the run
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The provider asked us to slow down (429)
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded {
        /// Message from the API
        message: String,
        /// Delay requested through the `Retry-After` header
        retry_after: Option<Duration>,
    },

    /// 5xx / 529 responses
    #[error("Server error: {status_code} - {message}")]
    ServerError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The provider answered but the envelope carried no usable text
    #[error("Malformed provider output: {0}")]
    MalformedOutput(String),

    /// Any other client error (4xx); the request will not succeed on retry
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// The wait was abandoned by the caller
    #[error("Request cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Transient failures go through the retry/backoff policy
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. }
                | Self::ServerError { .. }
                | Self::ConnectionError(_)
                | Self::Timeout(_)
        )
    }

    /// Failures that must abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthenticationError(_))
    }

    /// Delay requested by the provider, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// A single violation of the response contract
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// No JSON object could be extracted or it has the wrong shape
    #[error("invalid JSON: {0}")]
    MalformedJson(String),

    /// Returned keys differ from the requested keys
    #[error("key set mismatch (missing: [{}], extra: [{}])", .missing.join(", "), .extra.join(", "))]
    KeySetMismatch {
        /// Requested keys absent from the response
        missing: Vec<String>,
        /// Keys in the response that were not requested, duplicates included
        extra: Vec<String>,
    },

    /// A translation does not reproduce the source placeholders exactly
    #[error("placeholder mismatch for '{key}': expected [{expected}], got [{actual}]")]
    PlaceholderMismatch {
        key: String,
        expected: String,
        actual: String,
        /// Tokens the translation dropped
        missing: Vec<String>,
        /// Tokens the translation introduced
        extra: Vec<String>,
    },

    /// Empty or whitespace-only translation
    #[error("empty translation for '{key}'")]
    EmptyTranslation { key: String },
}

impl ValidationError {
    /// Constraint text fed back to the provider in a repair prompt
    pub fn repair_instruction(&self) -> String {
        match self {
            Self::MalformedJson(detail) => format!(
                "The response was not a valid JSON object of the form {{\"targetLanguage\": ..., \"translations\": [{{\"key\": ..., \"text\": ...}}]}} ({detail})."
            ),
            Self::KeySetMismatch { missing, extra } => {
                let mut parts = Vec::new();
                if !missing.is_empty() {
                    parts.push(format!("Missing keys that must be translated: {}.", missing.join(", ")));
                }
                if !extra.is_empty() {
                    parts.push(format!(
                        "Keys that must not appear (unknown or duplicated): {}.",
                        extra.join(", ")
                    ));
                }
                parts.join(" ")
            }
            Self::PlaceholderMismatch { key, expected, actual, missing, extra } => {
                let mut line = format!(
                    "Key '{key}' must contain exactly these placeholders in this order: [{expected}] (found [{actual}])."
                );
                if !missing.is_empty() {
                    line.push_str(&format!(" Dropped: {}.", missing.join(" ")));
                }
                if !extra.is_empty() {
                    line.push_str(&format!(" Unexpected: {}.", extra.join(" ")));
                }
                line
            }
            Self::EmptyTranslation { key } => {
                format!("Key '{key}' has an empty translation; provide a non-empty text.")
            }
        }
    }
}

/// All violations found in one provider response
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", .errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
pub struct ValidationFailure {
    pub errors: Vec<ValidationError>,
}

impl ValidationFailure {
    pub fn new(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }

    pub fn single(error: ValidationError) -> Self {
        Self { errors: vec![error] }
    }

    /// Merge violations reported for separate parts of the same batch
    pub fn extend(&mut self, other: ValidationFailure) {
        self.errors.extend(other.errors);
    }
}

/// Terminal outcomes of an async batch job other than `ended`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobFailure {
    #[error("batch job {job_id} expired before completion")]
    Expired { job_id: String },

    #[error("batch job {job_id} was cancelled")]
    Cancelled { job_id: String },

    /// Our own wall-clock ceiling was exceeded, distinct from provider-side expiry
    #[error("gave up polling batch job {job_id} after {waited_secs}s")]
    PollTimeout { job_id: String, waited_secs: u64 },
}

/// Errors detected before any batch is dispatched
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("missing API key for provider {provider} (set it in the config or via {env_var})")]
    MissingCredential { provider: String, env_var: String },

    #[error("invalid language code: {0}")]
    InvalidLanguage(String),

    #[error("batch size must be greater than zero")]
    ZeroBatchSize,

    #[error("source catalog for language '{0}' not found")]
    MissingSourceCatalog(String),

    #[error("invalid placeholder pattern '{name}': {reason}")]
    InvalidPattern { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Why a single batch did not produce a merge
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchFailure {
    /// Provider error after the retry policy gave up, or a non-retryable one
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Output still invalid after the allowed repair attempts
    #[error("validation failed after {repairs} repair attempt(s): {failure}")]
    Validation { failure: ValidationFailure, repairs: u32 },

    /// Async job ended without results
    #[error("job failure: {0}")]
    Job(#[from] JobFailure),
}

impl BatchFailure {
    /// Short classification used in ledgers and summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Provider(ProviderError::AuthenticationError(_)) => "auth",
            Self::Provider(ProviderError::Cancelled) => "cancelled",
            Self::Provider(e) if e.is_retryable() => "transient",
            Self::Provider(_) => "provider",
            Self::Validation { .. } => "validation",
            Self::Job(JobFailure::Expired { .. }) => "expired",
            Self::Job(JobFailure::Cancelled { .. }) => "job_cancelled",
            Self::Job(JobFailure::PollTimeout { .. }) => "poll_timeout",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_fatal())
    }
}

/// Errors that abort a run
#[derive(Error, Debug)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("provider authentication failed: {0}")]
    ProviderAuth(String),

    #[error("I/O error: {0}")]
    Io(#[from] anyhow::Error),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
