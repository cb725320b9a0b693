/*!
 * Run orchestration.
 *
 * One run translates the missing entries of one target language: select
 * batches, drive them through the translation service (optionally several at
 * once), merge every validated batch into the output catalog and checkpoint
 * it, and fold all outcomes into a `RunContext` that becomes the summary.
 */

use std::sync::Arc;

use anyhow::Context;
use futures::stream::{self, StreamExt};
use log::{error, info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::catalog::{Catalog, CatalogReader, CatalogWriter};
use crate::errors::{BatchFailure, RunError};
use crate::language_utils::check_target_language;
use crate::ledger::{FailedBatch, LedgerRecord, LedgerSink, RunSummary, timestamp};
use crate::translation::batch::{BatchJob, BatchState, select_batches};
use crate::translation::core::{BatchOutcome, TranslationService};
use crate::translation::memory::MemoryArtifact;
use crate::translation::merge::{MergeStats, merge};

/// Per-run knobs
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub batch_size: usize,
    pub concurrent_batches: usize,
    /// Overwrite existing translations
    pub force: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            concurrent_batches: 1,
            force: false,
        }
    }
}

/// Counters of one run, folded after every batch
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub run_id: String,
    pub target_language: String,
    pub provider: String,
    pub started_at: String,
    pub missing_before: usize,
    pub translated: usize,
    pub failed: usize,
    pub repaired: usize,
    pub batches: usize,
    pub repair_attempts: u32,
    pub merge_stats: MergeStats,
    pub failed_batches: Vec<FailedBatch>,
}

impl RunContext {
    pub fn new(run_id: &str, target_language: &str, provider: &str, missing_before: usize) -> Self {
        Self {
            run_id: run_id.to_string(),
            target_language: target_language.to_string(),
            provider: provider.to_string(),
            started_at: timestamp(),
            missing_before,
            ..Self::default()
        }
    }

    fn record_success(&mut self, repairs: u32, stats: MergeStats) {
        self.batches += 1;
        self.repair_attempts += repairs;
        self.translated += stats.updated;
        if repairs > 0 {
            self.repaired += stats.updated;
        }
        self.merge_stats.add(stats);
    }

    fn record_failure(&mut self, job: &BatchJob, repairs: u32, failure: &BatchFailure) {
        self.batches += 1;
        self.repair_attempts += repairs;
        self.failed += job.len();
        self.failed_batches.push(FailedBatch {
            batch_id: job.id.clone(),
            keys: job.keys(),
            kind: failure.kind().to_string(),
            reason: failure.to_string(),
        });
    }

    pub fn into_summary(mut self, missing_after: usize, aborted: Option<String>) -> RunSummary {
        // Workers finish in any order
        self.failed_batches.sort_by(|a, b| a.batch_id.cmp(&b.batch_id));
        RunSummary {
            run_id: self.run_id,
            target_language: self.target_language,
            provider: self.provider,
            started_at: self.started_at,
            finished_at: Some(timestamp()),
            missing_before: self.missing_before,
            missing_after,
            translated: self.translated,
            failed: self.failed,
            repaired: self.repaired,
            batches: self.batches,
            repair_attempts: self.repair_attempts,
            failed_batches: self.failed_batches,
            aborted,
        }
    }
}

/// What one worker hands back to the run loop
struct BatchReport {
    job: BatchJob,
    outcome: BatchOutcome,
    merged: Option<(MergeStats, Vec<String>)>,
}

/// Progress callback: (batches done, batches total)
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// Owns the collaborators of a run
pub struct Orchestrator {
    service: Arc<TranslationService>,
    reader: Arc<dyn CatalogReader>,
    writer: Arc<dyn CatalogWriter>,
    ledger: Arc<dyn LedgerSink>,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(
        service: Arc<TranslationService>,
        reader: Arc<dyn CatalogReader>,
        writer: Arc<dyn CatalogWriter>,
        ledger: Arc<dyn LedgerSink>,
    ) -> Self {
        Self {
            service,
            reader,
            writer,
            ledger,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerSink> {
        &self.ledger
    }

    /// Translate every entry of `artifact` missing in `target_language`.
    ///
    /// Per-batch failures are reported in the summary; only configuration
    /// errors, authentication failures and I/O errors abort the run. An
    /// invalid target fails before any batch or ledger record; once batches
    /// start, the ledger summary is written in every case.
    pub async fn translate_missing(
        &self,
        artifact: &mut MemoryArtifact,
        target_language: &str,
        cancel: &CancellationToken,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<RunSummary, RunError> {
        check_target_language(&artifact.source_language, target_language)?;

        let provider = self.service.provider_id();
        let missing_before = artifact.missing_count(target_language);
        let mut ctx = RunContext::new(self.ledger.run_id(), target_language, &provider, missing_before);

        let jobs = select_batches(artifact, target_language, self.options.batch_size, &provider)?;
        let total = jobs.len();
        info!(
            "Run {}: {} missing {} entr{} in {} batch(es) via {}",
            ctx.run_id,
            missing_before,
            target_language,
            if missing_before == 1 { "y" } else { "ies" },
            total,
            provider
        );

        let existing = self
            .reader
            .read(target_language)
            .with_context(|| format!("Failed to read {} catalog", target_language))?
            .unwrap_or_default();
        let output = Mutex::new(existing);
        let run_cancel = cancel.child_token();
        let mut abort: Option<RunError> = None;
        let mut updated_keys: Vec<String> = Vec::new();

        {
            let artifact_ref: &MemoryArtifact = artifact;
            let output = &output;
            let run_cancel = &run_cancel;
            let service = self.service.as_ref();
            let writer = self.writer.as_ref();
            let force = self.options.force;

            let mut reports = stream::iter(jobs)
                .map(|mut job| async move {
                    job.transition(BatchState::InFlight);
                    let outcome = service.translate_batch(&job, run_cancel).await;

                    let Ok(result) = &outcome.result else {
                        job.transition(BatchState::Failed);
                        return Ok::<_, anyhow::Error>(BatchReport { job, outcome, merged: None });
                    };
                    job.transition(BatchState::Succeeded);

                    let mut catalog = output.lock().await;
                    let merged = merge(artifact_ref, target_language, &catalog, &result.translations, force);
                    if merged.has_changes() {
                        writer
                            .write(target_language, &merged.catalog)
                            .with_context(|| format!("Failed to write {} catalog", target_language))?;
                    }
                    *catalog = merged.catalog;
                    job.transition(BatchState::Merged);

                    Ok(BatchReport {
                        job,
                        outcome,
                        merged: Some((merged.stats, merged.updated_keys)),
                    })
                })
                .buffer_unordered(self.options.concurrent_batches.max(1));

            let mut done = 0;
            while let Some(report) = reports.next().await {
                done += 1;
                let report = match report {
                    Ok(report) => report,
                    Err(e) => {
                        error!("Aborting run: {:#}", e);
                        run_cancel.cancel();
                        if abort.is_none() {
                            abort = Some(RunError::Io(e));
                        }
                        continue;
                    }
                };

                match (&report.outcome.result, report.merged) {
                    (Ok(_), Some((stats, keys))) => {
                        ctx.record_success(report.outcome.repairs, stats);
                        updated_keys.extend(keys);
                    }
                    (Err(failure), _) => {
                        ctx.record_failure(&report.job, report.outcome.repairs, failure);
                        self.record_failure(&report.job, failure);
                        if failure.is_fatal() && abort.is_none() {
                            error!("Authentication failed, cancelling remaining batches");
                            run_cancel.cancel();
                            abort = Some(RunError::ProviderAuth(failure.to_string()));
                        }
                    }
                    (Ok(_), None) => {}
                }

                if let Some(progress) = progress {
                    progress(done, total);
                }
            }
        }

        let catalog = output.into_inner();
        let missing_after = count_missing(artifact, &catalog);
        artifact.mark_present(target_language, updated_keys.iter().map(String::as_str));

        let aborted = match &abort {
            Some(e) => Some(e.to_string()),
            None if cancel.is_cancelled() => Some("cancelled".to_string()),
            None => None,
        };
        let summary = ctx.into_summary(missing_after, aborted);
        self.ledger.finalize(&summary)?;

        match abort {
            Some(e) => Err(e),
            None => {
                if !summary.failed_batches.is_empty() {
                    warn!(
                        "{} batch(es) failed for {}; their entries stay missing",
                        summary.failed_batches.len(),
                        target_language
                    );
                }
                Ok(summary)
            }
        }
    }

    fn record_failure(&self, job: &BatchJob, failure: &BatchFailure) {
        let record = LedgerRecord::Failure {
            timestamp: timestamp(),
            batch_id: job.id.clone(),
            target_language: job.target_language.clone(),
            keys: job.keys(),
            kind: failure.kind().to_string(),
            reason: failure.to_string(),
        };
        if let Err(e) = self.ledger.append(record) {
            error!("Failed to write ledger record: {:#}", e);
        }
    }
}

/// Artifact entries still missing in `catalog`
pub fn count_missing(artifact: &MemoryArtifact, catalog: &Catalog) -> usize {
    artifact
        .entries()
        .iter()
        .filter(|e| catalog.is_missing(&e.key))
        .count()
}
