use anyhow::{Context, Result};
use log::{debug, info};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

use crate::file_utils::FileManager;
use crate::ledger::{LedgerRecord, LedgerSink, RunSummary};

/// Ledger directory `<runs_dir>/<run_id>/` with one JSONL file per record stream
#[derive(Debug)]
pub struct JsonlLedger {
    run_id: String,
    dir: PathBuf,
    // One lock per file so concurrent batches never interleave partial lines
    requests: Mutex<()>,
    responses: Mutex<()>,
    validations: Mutex<()>,
    failures: Mutex<()>,
}

impl JsonlLedger {
    /// Create the run directory under `runs_dir`
    pub fn create<P: AsRef<Path>>(runs_dir: P, run_id: impl Into<String>) -> Result<Self> {
        let run_id = run_id.into();
        let dir = runs_dir.as_ref().join(&run_id);
        FileManager::ensure_dir(&dir)
            .with_context(|| format!("Failed to create run directory {:?}", dir))?;
        info!("Run ledger: {:?}", dir);
        Ok(Self {
            run_id,
            dir,
            requests: Mutex::new(()),
            responses: Mutex::new(()),
            validations: Mutex::new(()),
            failures: Mutex::new(()),
        })
    }

    /// New run with a random v4 id
    pub fn create_new<P: AsRef<Path>>(runs_dir: P) -> Result<Self> {
        Self::create(runs_dir, uuid::Uuid::new_v4().to_string())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_for(&self, stream: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", stream))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join("summary.json")
    }

    fn lock_for(&self, stream: &str) -> &Mutex<()> {
        match stream {
            "requests" => &self.requests,
            "responses" => &self.responses,
            "validations" => &self.validations,
            _ => &self.failures,
        }
    }
}

impl LedgerSink for JsonlLedger {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn append(&self, record: LedgerRecord) -> Result<()> {
        let stream = record.stream();
        let line = serde_json::to_string(&record).context("Failed to serialize ledger record")?;
        let _guard = self.lock_for(stream).lock();
        FileManager::append_line(self.file_for(stream), &line)
    }

    fn finalize(&self, summary: &RunSummary) -> Result<()> {
        let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
        FileManager::write_atomic(self.summary_path(), &format!("{}\n", json))?;
        debug!("Wrote run summary to {:?}", self.summary_path());
        Ok(())
    }
}
