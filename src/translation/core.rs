/*!
 * Core translation service implementation.
 *
 * `TranslationService` turns one `BatchJob` into validated translations.
 * Synchronous providers get one prompt per attempt and a repair prompt after
 * each invalid answer. Async batch providers get one request per entry,
 * correlated by `item-N` ids, and a follow-up job for the invalid entries only.
 * Every prompt, answer and validation outcome is mirrored into the ledger.
 */

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::errors::{BatchFailure, JobFailure, ProviderError, ValidationError, ValidationFailure};
use crate::ledger::{LedgerRecord, LedgerSink, NullLedger, timestamp};
use crate::providers::{AsyncBatchProvider, BatchRequest, ItemOutcome, PromptCompletion, TranslationBackend};
use crate::translation::batch::{BatchItem, BatchJob};
use crate::translation::jobs::{JobState, PollSettings, wait_for_completion};
use crate::translation::prompts::{TranslationPromptBuilder, build_repair_prompt};
use crate::translation::retry::RetryPolicy;
use crate::translation::validator::{ResponseValidator, Translation, TranslationResponse, TranslationResult};

/// Default number of repair prompts per batch
pub const DEFAULT_MAX_REPAIRS: u32 = 2;

/// What happened to one batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// Repair attempts spent, whether or not the batch succeeded
    pub repairs: u32,
    pub result: Result<TranslationResult, BatchFailure>,
}

impl BatchOutcome {
    fn new(repairs: u32, result: Result<TranslationResult, BatchFailure>) -> Self {
        Self { repairs, result }
    }
}

/// Drives batches through a provider, the validator and the repair loop
pub struct TranslationService {
    backend: TranslationBackend,
    validator: ResponseValidator,
    retry: RetryPolicy,
    poll: PollSettings,
    max_repairs: u32,
    source_language: String,
    global_context: Option<String>,
    ledger: Arc<dyn LedgerSink>,
}

impl TranslationService {
    pub fn new(backend: TranslationBackend, source_language: impl Into<String>) -> Self {
        Self {
            backend,
            validator: ResponseValidator::default(),
            retry: RetryPolicy::default(),
            poll: PollSettings::default(),
            max_repairs: DEFAULT_MAX_REPAIRS,
            source_language: source_language.into(),
            global_context: None,
            ledger: Arc::new(NullLedger),
        }
    }

    pub fn with_validator(mut self, validator: ResponseValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_max_repairs(mut self, max_repairs: u32) -> Self {
        self.max_repairs = max_repairs;
        self
    }

    pub fn with_global_context(mut self, context: Option<String>) -> Self {
        self.global_context = context;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerSink>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn backend(&self) -> &TranslationBackend {
        &self.backend
    }

    pub fn provider_id(&self) -> String {
        self.backend.provider_id()
    }

    /// Translation prompt for `items`
    pub fn build_prompt(&self, target_language: &str, items: &[BatchItem]) -> String {
        TranslationPromptBuilder::new(&self.source_language, target_language)
            .with_global_context(self.global_context.as_deref())
            .with_items(items)
            .build()
    }

    /// Translate one batch; never panics and never touches catalogs
    pub async fn translate_batch(&self, job: &BatchJob, cancel: &CancellationToken) -> BatchOutcome {
        if job.is_empty() {
            return BatchOutcome::new(
                0,
                Ok(TranslationResult {
                    target_language: job.target_language.clone(),
                    translations: Vec::new(),
                }),
            );
        }

        info!(
            "Translating {} ({} entries) into {} via {}",
            job.id,
            job.len(),
            job.target_language,
            self.provider_id()
        );

        let outcome = match &self.backend {
            TranslationBackend::Sync(provider) => self.translate_sync(provider.as_ref(), job, cancel).await,
            TranslationBackend::AsyncBatch(provider) => self.translate_async(provider.as_ref(), job, cancel).await,
        };

        match &outcome.result {
            Ok(result) => info!(
                "{} succeeded: {} translation(s), {} repair(s)",
                job.id,
                result.translations.len(),
                outcome.repairs
            ),
            Err(failure) => error!("{} failed ({}): {}", job.id, failure.kind(), failure),
        }
        outcome
    }

    fn record(&self, record: LedgerRecord) {
        if let Err(e) = self.ledger.append(record) {
            error!("Failed to write ledger record: {:#}", e);
        }
    }

    fn record_request(&self, job: &BatchJob, attempt: u32, keys: Vec<String>, prompt: &str) {
        debug!("{} attempt {}: prompt of {} chars", job.id, attempt, prompt.len());
        self.record(LedgerRecord::Request {
            timestamp: timestamp(),
            batch_id: job.id.clone(),
            target_language: job.target_language.clone(),
            provider: self.provider_id(),
            attempt,
            keys,
            prompt: prompt.to_string(),
        });
    }

    fn record_response(&self, job: &BatchJob, attempt: u32, raw: &str) {
        debug!("{} attempt {}: response of {} chars", job.id, attempt, raw.len());
        self.record(LedgerRecord::Response {
            timestamp: timestamp(),
            batch_id: job.id.clone(),
            attempt,
            raw: raw.to_string(),
        });
    }

    fn record_validation(&self, job: &BatchJob, attempt: u32, failure: Option<&ValidationFailure>) {
        self.record(LedgerRecord::Validation {
            timestamp: timestamp(),
            batch_id: job.id.clone(),
            attempt,
            valid: failure.is_none(),
            errors: failure
                .map(|f| f.errors.iter().map(|e| e.to_string()).collect())
                .unwrap_or_default(),
        });
    }

    async fn translate_sync(
        &self,
        provider: &dyn PromptCompletion,
        job: &BatchJob,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let original_prompt = self.build_prompt(&job.target_language, &job.items);
        let mut prompt = original_prompt.clone();
        let mut repairs = 0u32;
        let label = format!("{} via {}", job.id, provider.provider_id());

        loop {
            self.record_request(job, repairs, job.keys(), &prompt);

            let completed = self
                .retry
                .run(&label, cancel, || provider.complete_prompt(&prompt))
                .await;

            let (raw, validation) = match completed {
                Ok(raw) => {
                    self.record_response(job, repairs, &raw);
                    let validation = self.validator.validate(&raw, &job.target_language, &job.items);
                    (raw, validation)
                }
                // Unusable output goes through repair rather than a raw retry
                Err(ProviderError::MalformedOutput(message)) => {
                    self.record_response(job, repairs, "");
                    (
                        String::new(),
                        Err(ValidationFailure::single(ValidationError::MalformedJson(message))),
                    )
                }
                Err(e) => return BatchOutcome::new(repairs, Err(BatchFailure::Provider(e))),
            };

            match validation {
                Ok(result) => {
                    self.record_validation(job, repairs, None);
                    return BatchOutcome::new(repairs, Ok(result));
                }
                Err(failure) => {
                    self.record_validation(job, repairs, Some(&failure));
                    if repairs >= self.max_repairs {
                        return BatchOutcome::new(repairs, Err(BatchFailure::Validation { failure, repairs }));
                    }
                    repairs += 1;
                    warn!(
                        "{}: invalid response ({}), repair attempt {}/{}",
                        job.id, failure, repairs, self.max_repairs
                    );
                    prompt = build_repair_prompt(&original_prompt, &raw, &failure);
                }
            }
        }
    }

    async fn translate_async(
        &self,
        provider: &dyn AsyncBatchProvider,
        job: &BatchJob,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let original_prompts: Vec<String> = job
            .items
            .iter()
            .map(|item| self.build_prompt(&job.target_language, std::slice::from_ref(item)))
            .collect();
        let mut prompts = original_prompts.clone();
        let mut pending: Vec<usize> = (0..job.items.len()).collect();
        let mut accepted: HashMap<usize, Translation> = HashMap::new();
        let mut repairs = 0u32;
        let label = format!("{} via {}", job.id, provider.provider_id());

        loop {
            let requests: Vec<BatchRequest> = pending
                .iter()
                .map(|&i| BatchRequest {
                    custom_id: format!("item-{}", i),
                    prompt: prompts[i].clone(),
                })
                .collect();
            for (&i, request) in pending.iter().zip(&requests) {
                self.record_request(job, repairs, vec![job.items[i].key.clone()], &request.prompt);
            }

            let handle = match self
                .retry
                .run(&label, cancel, || provider.submit_batch(requests.clone()))
                .await
            {
                Ok(handle) => handle,
                Err(e) => return BatchOutcome::new(repairs, Err(BatchFailure::Provider(e))),
            };
            info!("{}: submitted job {} with {} request(s)", job.id, handle.job_id, requests.len());

            let on_change = |state: JobState| {
                self.record(LedgerRecord::JobStatus {
                    timestamp: timestamp(),
                    batch_id: job.id.clone(),
                    job_id: handle.job_id.clone(),
                    state: state.to_string(),
                });
            };
            if let Err(failure) = wait_for_completion(provider, &handle, self.poll, cancel, on_change).await {
                // Expired or cancelled jobs fail the batch without spending a repair
                return BatchOutcome::new(repairs, Err(failure));
            }

            let results = match self
                .retry
                .run(&label, cancel, || provider.fetch_results(&handle))
                .await
            {
                Ok(results) => results,
                Err(e) => return BatchOutcome::new(repairs, Err(BatchFailure::Provider(e))),
            };

            let mut by_id: HashMap<String, ItemOutcome> = results
                .into_iter()
                .map(|r| (r.custom_id, r.outcome))
                .collect();

            let mut failure = ValidationFailure::new(Vec::new());
            let mut still_invalid = Vec::new();
            for &i in &pending {
                let item = &job.items[i];
                match by_id.remove(&format!("item-{}", i)) {
                    Some(ItemOutcome::Succeeded(raw)) => {
                        self.record_response(job, repairs, &raw);
                        match self
                            .validator
                            .validate(&raw, &job.target_language, std::slice::from_ref(item))
                        {
                            Ok(mut result) => {
                                if let Some(translation) = result.translations.pop() {
                                    accepted.insert(i, translation);
                                }
                            }
                            Err(item_failure) => {
                                prompts[i] = build_repair_prompt(&original_prompts[i], &raw, &item_failure);
                                failure.extend(item_failure);
                                still_invalid.push(i);
                            }
                        }
                    }
                    Some(ItemOutcome::Errored(e)) => {
                        return BatchOutcome::new(repairs, Err(BatchFailure::Provider(e)));
                    }
                    Some(ItemOutcome::Expired) => {
                        return BatchOutcome::new(
                            repairs,
                            Err(BatchFailure::Job(JobFailure::Expired {
                                job_id: handle.job_id.clone(),
                            })),
                        );
                    }
                    Some(ItemOutcome::Cancelled) => {
                        return BatchOutcome::new(
                            repairs,
                            Err(BatchFailure::Job(JobFailure::Cancelled {
                                job_id: handle.job_id.clone(),
                            })),
                        );
                    }
                    None => {
                        warn!("{}: job {} returned no result for {}", job.id, handle.job_id, item.key);
                        prompts[i] = original_prompts[i].clone();
                        failure.extend(ValidationFailure::single(ValidationError::KeySetMismatch {
                            missing: vec![item.key.clone()],
                            extra: Vec::new(),
                        }));
                        still_invalid.push(i);
                    }
                }
            }
            for unknown in by_id.keys() {
                warn!("{}: ignoring result with unknown id {}", job.id, unknown);
            }

            if still_invalid.is_empty() {
                self.record_validation(job, repairs, None);
                let translations = (0..job.items.len())
                    .filter_map(|i| accepted.get(&i).cloned())
                    .collect();
                let assembled = TranslationResponse {
                    target_language: Some(job.target_language.clone()),
                    translations,
                };
                let result = self
                    .validator
                    .validate_response(assembled, &job.target_language, &job.items)
                    .map_err(|failure| BatchFailure::Validation { failure, repairs });
                return BatchOutcome::new(repairs, result);
            }

            self.record_validation(job, repairs, Some(&failure));
            if repairs >= self.max_repairs {
                return BatchOutcome::new(repairs, Err(BatchFailure::Validation { failure, repairs }));
            }
            repairs += 1;
            warn!(
                "{}: {} invalid item(s) ({}), resubmitting, repair attempt {}/{}",
                job.id,
                still_invalid.len(),
                failure,
                repairs,
                self.max_repairs
            );
            pending = still_invalid;
        }
    }
}
