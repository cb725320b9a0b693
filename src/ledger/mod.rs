/*!
 * Run ledger.
 *
 * Every request sent, response received, validation outcome and batch
 * failure of a run is appended as one structured record; the run ends with
 * a summary. `JsonlLedger` keeps them on disk for audit and replay,
 * `MemoryLedger` keeps them in memory for tests.
 */

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub mod jsonl;
pub mod summary;

pub use self::jsonl::JsonlLedger;
pub use self::summary::{FailedBatch, RunSummary};

/// Current UTC time as an RFC 3339 string with milliseconds
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One ledger line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerRecord {
    /// A prompt sent to the provider (attempt 0 is the initial request, then repairs)
    Request {
        timestamp: String,
        batch_id: String,
        target_language: String,
        provider: String,
        attempt: u32,
        keys: Vec<String>,
        prompt: String,
    },
    /// Raw provider text for a request
    Response {
        timestamp: String,
        batch_id: String,
        attempt: u32,
        raw: String,
    },
    /// State change of an async batch job
    JobStatus {
        timestamp: String,
        batch_id: String,
        job_id: String,
        state: String,
    },
    /// Outcome of validating one response
    Validation {
        timestamp: String,
        batch_id: String,
        attempt: u32,
        valid: bool,
        errors: Vec<String>,
    },
    /// A batch that produced no merge
    Failure {
        timestamp: String,
        batch_id: String,
        target_language: String,
        keys: Vec<String>,
        kind: String,
        reason: String,
    },
}

impl LedgerRecord {
    pub fn batch_id(&self) -> &str {
        match self {
            Self::Request { batch_id, .. }
            | Self::Response { batch_id, .. }
            | Self::JobStatus { batch_id, .. }
            | Self::Validation { batch_id, .. }
            | Self::Failure { batch_id, .. } => batch_id,
        }
    }

    /// File stem the JSONL ledger writes this record to
    pub fn stream(&self) -> &'static str {
        match self {
            Self::Request { .. } => "requests",
            Self::Response { .. } | Self::JobStatus { .. } => "responses",
            Self::Validation { .. } => "validations",
            Self::Failure { .. } => "failures",
        }
    }
}

/// Destination of a run's records
pub trait LedgerSink: Send + Sync {
    fn run_id(&self) -> &str;

    fn append(&self, record: LedgerRecord) -> Result<()>;

    /// Write the final summary; called exactly once, also for aborted runs
    fn finalize(&self, summary: &RunSummary) -> Result<()>;
}

/// Ledger kept in memory
#[derive(Debug, Default)]
pub struct MemoryLedger {
    run_id: String,
    records: Mutex<Vec<LedgerRecord>>,
    summary: Mutex<Option<RunSummary>>,
}

impl MemoryLedger {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<LedgerRecord> {
        self.records.lock().clone()
    }

    pub fn records_of(&self, stream: &str) -> Vec<LedgerRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.stream() == stream)
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> Option<RunSummary> {
        self.summary.lock().clone()
    }
}

impl LedgerSink for MemoryLedger {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn append(&self, record: LedgerRecord) -> Result<()> {
        self.records.lock().push(record);
        Ok(())
    }

    fn finalize(&self, summary: &RunSummary) -> Result<()> {
        *self.summary.lock() = Some(summary.clone());
        Ok(())
    }
}

/// Ledger that drops everything, for one-off commands
#[derive(Debug, Default)]
pub struct NullLedger;

impl LedgerSink for NullLedger {
    fn run_id(&self) -> &str {
        "none"
    }

    fn append(&self, _record: LedgerRecord) -> Result<()> {
        Ok(())
    }

    fn finalize(&self, _summary: &RunSummary) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_with_type_tag() {
        let record = LedgerRecord::Validation {
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            batch_id: "batch-0001".into(),
            attempt: 1,
            valid: false,
            errors: vec!["empty".into()],
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "validation");
        assert_eq!(value["batch_id"], "batch-0001");
        assert_eq!(record.stream(), "validations");
    }

    #[test]
    fn test_memory_ledger_keeps_records_in_order() {
        let ledger = MemoryLedger::new("run-1");
        for attempt in 0..3 {
            ledger
                .append(LedgerRecord::Response {
                    timestamp: timestamp(),
                    batch_id: "batch-0001".into(),
                    attempt,
                    raw: "{}".into(),
                })
                .unwrap();
        }
        let attempts: Vec<u32> = ledger
            .records_of("responses")
            .iter()
            .map(|r| match r {
                LedgerRecord::Response { attempt, .. } => *attempt,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(attempts, vec![0, 1, 2]);
        assert!(ledger.summary().is_none());
    }
}
