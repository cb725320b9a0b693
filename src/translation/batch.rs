/*!
 * Batch selection.
 *
 * Turns the missing entries of one target language into an ordered list of
 * batch jobs. Grouping only depends on the artifact order and the batch
 * size, so the same missing set always yields the same batches and ids.
 */

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::translation::memory::{EntryMeta, MemoryArtifact, TranslationEntry};
use crate::translation::placeholders::PlaceholderSignature;

/// Snapshot of one entry inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub key: String,
    pub source_text: String,
    pub signature: PlaceholderSignature,
    #[serde(default, skip_serializing_if = "EntryMeta::is_empty")]
    pub meta: EntryMeta,
}

impl BatchItem {
    pub fn from_entry(entry: &TranslationEntry) -> Self {
        Self {
            key: entry.key.clone(),
            source_text: entry.source_text.clone(),
            signature: entry.placeholder_signature.clone(),
            meta: entry.meta.clone(),
        }
    }
}

/// Lifecycle of a batch within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Pending,
    InFlight,
    Succeeded,
    Failed,
    Merged,
}

/// Unit of work dispatched to a provider
#[derive(Debug, Clone, PartialEq)]
pub struct BatchJob {
    /// `batch-0001`, `batch-0002`, ...
    pub id: String,
    pub target_language: String,
    pub provider: String,
    pub items: Vec<BatchItem>,
    pub state: BatchState,
}

impl BatchJob {
    pub fn keys(&self) -> Vec<String> {
        self.items.iter().map(|i| i.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Move to `next`; returns false and leaves the state alone for an illegal step
    pub fn transition(&mut self, next: BatchState) -> bool {
        let allowed = matches!(
            (self.state, next),
            (BatchState::Pending, BatchState::InFlight)
                | (BatchState::InFlight, BatchState::Succeeded)
                | (BatchState::InFlight, BatchState::Failed)
                | (BatchState::Succeeded, BatchState::Merged)
        );
        if allowed {
            self.state = next;
        }
        allowed
    }
}

pub fn batch_id(index: usize) -> String {
    format!("batch-{:04}", index + 1)
}

/// Partition the missing entries of `target_language` into batches of at most `batch_size`
pub fn select_batches(
    artifact: &MemoryArtifact,
    target_language: &str,
    batch_size: usize,
    provider: &str,
) -> Result<Vec<BatchJob>, ConfigError> {
    if batch_size == 0 {
        return Err(ConfigError::ZeroBatchSize);
    }

    let missing: Vec<BatchItem> = artifact
        .entries()
        .iter()
        .filter(|e| e.is_missing(target_language))
        .map(BatchItem::from_entry)
        .collect();

    let jobs = missing
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| BatchJob {
            id: batch_id(index),
            target_language: target_language.to_string(),
            provider: provider.to_string(),
            items: chunk.to_vec(),
            state: BatchState::Pending,
        })
        .collect();

    Ok(jobs)
}
