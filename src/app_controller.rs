use anyhow::{Context, Result, anyhow};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::app_config::Config;
use crate::catalog::json_dir::JsonDirCatalog;
use crate::catalog::{CatalogReader, CatalogWriter};
use crate::errors::{ConfigError, RunError};
use crate::file_utils::FileManager;
use crate::language_utils::check_target_language;
use crate::ledger::jsonl::JsonlLedger;
use crate::ledger::{LedgerSink, RunSummary};
use crate::providers;
use crate::translation::batch::BatchItem;
use crate::translation::memory::{EntryMeta, MemoryArtifact};
use crate::translation::merge::{MergeStats, merge};
use crate::translation::orchestrator::{Orchestrator, RunOptions};
use crate::translation::placeholders::PlaceholderExtractor;
use crate::translation::validator::{ResponseValidator, TranslationResponse, parse_response};
use crate::translation::TranslationService;

// @module: Command workflows behind the CLI

/// Context entry of a meta file: a bare description or a full object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MetaValue {
    Description(String),
    Full(EntryMeta),
}

/// Outcome of checking a saved provider response
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub translations: usize,
    /// Empty when the response is valid
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Options of an end-to-end run
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Empty means the configured target languages
    pub target_languages: Vec<String>,
    pub force: bool,
    /// Only rebuild the memory artifact
    pub skip_translate: bool,
}

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn check_target(&self, target_language: &str) -> Result<(), ConfigError> {
        check_target_language(&self.config.source_language, target_language)
    }

    fn extractor(&self) -> Result<Arc<PlaceholderExtractor>> {
        Ok(Arc::new(self.config.placeholders.extractor()?))
    }

    fn catalog_store(&self) -> Arc<JsonDirCatalog> {
        Arc::new(JsonDirCatalog::new(&self.config.paths.i18n_dir))
    }

    /// Read a meta file mapping keys to prompt context
    pub fn load_meta<P: AsRef<Path>>(path: P) -> Result<HashMap<String, EntryMeta>> {
        let path = path.as_ref();
        let content = FileManager::read_to_string(path)?;
        let raw: HashMap<String, MetaValue> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid meta file: {:?}", path))?;

        let meta = raw
            .into_iter()
            .map(|(key, value)| {
                let meta = match value {
                    MetaValue::Description(description) => EntryMeta {
                        description: Some(description),
                        ..EntryMeta::default()
                    },
                    MetaValue::Full(meta) => meta,
                };
                (key, meta)
            })
            .collect();
        Ok(meta)
    }

    /// Build the memory artifact from the catalog directory and write it to the memory file
    pub fn build_memory(&self) -> Result<MemoryArtifact> {
        let store = self.catalog_store();
        let mut targets = self.config.target_languages.clone();
        for lang in store.languages()? {
            if lang != self.config.source_language && !targets.contains(&lang) {
                targets.push(lang);
            }
        }
        targets.sort();

        let mut artifact = MemoryArtifact::build_from_reader(
            store.as_ref(),
            &self.config.source_language,
            &targets,
            &*self.extractor()?,
        )?;
        if let Some(meta_file) = &self.config.paths.meta_file {
            artifact = artifact.with_meta(&Self::load_meta(meta_file)?);
        }

        artifact.write_jsonl(&self.config.paths.memory_file)?;
        for lang in &artifact.target_languages {
            let counts = artifact.status_counts(lang);
            info!("{}: {} present, {} missing", lang, counts.present, counts.missing);
        }
        Ok(artifact)
    }

    fn load_memory(&self) -> Result<MemoryArtifact> {
        let path = &self.config.paths.memory_file;
        if !FileManager::file_exists(path) {
            return Err(anyhow!("Memory file {:?} not found, run build-memory first", path));
        }
        MemoryArtifact::read_jsonl(path)
    }

    /// Check a saved provider response.
    ///
    /// Without a target language only the shape is checked; with one, the
    /// response is held against the memory artifact for `keys` (all keys of
    /// the response when `keys` is empty).
    pub fn validate_file<P: AsRef<Path>>(
        &self,
        response_file: P,
        target_language: Option<&str>,
        keys: &[String],
    ) -> Result<ValidationReport> {
        let raw = FileManager::read_to_string(response_file.as_ref())?;
        let response = match parse_response(&raw) {
            Ok(response) => response,
            Err(failure) => {
                return Ok(ValidationReport {
                    translations: 0,
                    errors: failure.errors.iter().map(|e| e.to_string()).collect(),
                });
            }
        };
        let translations = response.translations.len();

        let Some(target_language) = target_language else {
            return Ok(ValidationReport { translations, errors: Vec::new() });
        };
        self.check_target(target_language)?;

        let artifact = self.load_memory()?;
        let wanted: Vec<String> = if keys.is_empty() {
            response.translations.iter().map(|t| t.key.clone()).collect()
        } else {
            keys.to_vec()
        };
        let items = Self::items_for(&artifact, &wanted);
        let validator = ResponseValidator::new(self.extractor()?);
        let errors = match validator.validate_response(response, target_language, &items) {
            Ok(_) => Vec::new(),
            Err(failure) => failure.errors.iter().map(|e| e.to_string()).collect(),
        };
        Ok(ValidationReport { translations, errors })
    }

    fn items_for(artifact: &MemoryArtifact, keys: &[String]) -> Vec<BatchItem> {
        keys.iter()
            .filter_map(|key| artifact.get(key))
            .map(BatchItem::from_entry)
            .collect()
    }

    /// Merge a saved results file into the target catalog after validating it
    pub fn write_back<P: AsRef<Path>>(&self, target_language: &str, results_file: P, force: bool) -> Result<MergeStats> {
        self.check_target(target_language)?;
        let results_file = results_file.as_ref();
        let content = FileManager::read_to_string(results_file)?;
        let response: TranslationResponse = serde_json::from_str(&content)
            .with_context(|| format!("Invalid results file: {:?}", results_file))?;

        let mut artifact = self.load_memory()?;
        let keys: Vec<String> = response.translations.iter().map(|t| t.key.clone()).collect();
        let items = Self::items_for(&artifact, &keys);
        let validator = ResponseValidator::new(self.extractor()?);
        let result = validator
            .validate_response(response, target_language, &items)
            .map_err(|failure| anyhow!("Results in {:?} are invalid: {}", results_file, failure))?;

        let store = self.catalog_store();
        let existing = store.read(target_language)?.unwrap_or_default();
        let outcome = merge(&artifact, target_language, &existing, &result.translations, force);
        if outcome.has_changes() {
            store.write(target_language, &outcome.catalog)?;
            artifact.mark_present(target_language, outcome.updated_keys.iter().map(String::as_str));
            artifact.write_jsonl(&self.config.paths.memory_file)?;
        }
        info!(
            "Write-back {}: {} updated, {} skipped",
            target_language, outcome.stats.updated, outcome.stats.skipped
        );
        Ok(outcome.stats)
    }

    fn progress_bar(multi_progress: &MultiProgress, target_language: &str) -> ProgressBar {
        let progress_bar = multi_progress.add(ProgressBar::new(0));
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches ({percent}%) {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style.progress_chars("█▓▒░"));
        progress_bar.set_message(target_language.to_string());
        progress_bar
    }

    /// Translate the missing entries of one language and update the memory file
    pub async fn translate_missing(
        &self,
        artifact: &mut MemoryArtifact,
        target_language: &str,
        force: bool,
        cancel: &CancellationToken,
        multi_progress: &MultiProgress,
    ) -> Result<RunSummary, RunError> {
        self.check_target(target_language)?;
        let translation = &self.config.translation;
        let backend = providers::create_backend(translation)?;
        let ledger: Arc<dyn LedgerSink> = Arc::new(JsonlLedger::create_new(&self.config.paths.runs_dir)?);

        let service = TranslationService::new(backend, &self.config.source_language)
            .with_validator(ResponseValidator::new(self.extractor()?))
            .with_retry_policy(self.config.retry_policy())
            .with_poll_settings(self.config.poll_settings())
            .with_max_repairs(translation.common.max_repairs)
            .with_global_context(translation.common.global_context.clone())
            .with_ledger(ledger.clone());

        let store = self.catalog_store();
        let orchestrator = Orchestrator::new(Arc::new(service), store.clone(), store, ledger).with_options(RunOptions {
            batch_size: translation.common.batch_size,
            concurrent_batches: translation.common.concurrent_batches,
            force,
        });

        let progress_bar = Self::progress_bar(multi_progress, target_language);
        let progress = |done: usize, total: usize| {
            progress_bar.set_length(total as u64);
            progress_bar.set_position(done as u64);
        };
        let result = orchestrator
            .translate_missing(artifact, target_language, cancel, Some(&progress))
            .await;
        progress_bar.finish_and_clear();

        // Statuses are worth keeping even when the run aborted
        artifact.write_jsonl(&self.config.paths.memory_file)?;
        result
    }

    /// Build the memory, then translate every requested language
    pub async fn run(&self, request: &RunRequest, cancel: &CancellationToken) -> Result<Vec<RunSummary>> {
        let targets = if request.target_languages.is_empty() {
            self.config.target_languages.clone()
        } else {
            request.target_languages.clone()
        };
        for target in &targets {
            self.check_target(target)?;
        }

        let mut artifact = self.build_memory()?;
        if request.skip_translate {
            info!("Skipping translation, memory written to {:?}", self.config.paths.memory_file);
            return Ok(Vec::new());
        }

        let multi_progress = MultiProgress::new();
        let mut summaries = Vec::new();
        for target in &targets {
            if cancel.is_cancelled() {
                warn!("Cancelled, skipping remaining languages");
                break;
            }
            let summary = self
                .translate_missing(&mut artifact, target, request.force, cancel, &multi_progress)
                .await?;
            summaries.push(summary);
        }
        Ok(summaries)
    }

    /// Load the memory file and translate one language
    pub async fn translate_from_memory(
        &self,
        target_language: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        self.check_target(target_language)?;
        let mut artifact = self.load_memory()?;
        let multi_progress = MultiProgress::new();
        let summary = self
            .translate_missing(&mut artifact, target_language, force, cancel, &multi_progress)
            .await?;
        Ok(summary)
    }
}
