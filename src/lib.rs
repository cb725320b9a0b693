/*!
 * # i18n-translator
 *
 * A Rust library that fills missing entries of i18n JSON catalogs using LLM
 * providers, without ever overwriting existing work.
 *
 * ## Features
 *
 * - Translation memory built from a source catalog and its target catalogs
 * - Batched translation through pluggable providers:
 *   - Ollama (local LLM)
 *   - OpenAI-compatible APIs (OpenAI, LM Studio, OpenRouter)
 *   - Anthropic API, including the asynchronous Message Batches API
 * - Placeholder-preserving validation with bounded repair prompts
 * - Idempotent, non-destructive merging
 * - Append-only run ledger with a deterministic summary
 *
 * ## Architecture
 *
 * - `app_config`: Configuration management
 * - `catalog`: Catalog model and stores
 * - `translation`: memory, batching, validation, merge and orchestration
 * - `providers`: Client implementations for LLM providers
 * - `ledger`: Run ledger sinks and summaries
 * - `file_utils`: File system operations
 * - `app_controller`: Command workflows behind the CLI
 * - `language_utils`: Language code utilities
 * - `errors`: Error types for the application
 */

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

pub mod app_config;
pub mod app_controller;
pub mod catalog;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod ledger;
pub mod providers;
pub mod translation;

pub use app_config::Config;
pub use catalog::{Catalog, CatalogReader, CatalogWriter};
pub use errors::{AppError, BatchFailure, ConfigError, ProviderError, RunError, ValidationError};
pub use language_utils::{language_codes_match, normalize_to_part2t};
pub use ledger::{LedgerSink, RunSummary};
pub use translation::{MemoryArtifact, Orchestrator, TranslationService};
