/*!
 * Common test utilities for the i18n-translator test suite
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tempfile::TempDir;

use i18n_translator::app_config::Config;
use i18n_translator::catalog::{Catalog, InMemoryCatalog};
use i18n_translator::ledger::MemoryLedger;
use i18n_translator::providers::TranslationBackend;
use i18n_translator::translation::TranslationService;
use i18n_translator::translation::jobs::PollSettings;
use i18n_translator::translation::retry::RetryPolicy;

/// Route `log` output through the test harness; set RUST_LOG to see it
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Writes `<dir>/<lang>.json`
pub fn write_catalog(dir: &Path, language: &str, content: &Value) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", language));
    std::fs::write(&path, serde_json::to_string_pretty(content)?)?;
    Ok(path)
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

/// Config with every path inside `dir`
pub fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.paths.i18n_dir = dir.join("i18n").to_string_lossy().to_string();
    config.paths.memory_file = dir.join("work").join("memory.jsonl").to_string_lossy().to_string();
    config.paths.runs_dir = dir.join("runs").to_string_lossy().to_string();
    config
}

/// Store holding an English source and a French target
pub fn store_with(source: Value, target: Value) -> Arc<InMemoryCatalog> {
    Arc::new(
        InMemoryCatalog::new()
            .with_catalog("en", Catalog::from_flat_json(source))
            .with_catalog("fr", Catalog::from_flat_json(target)),
    )
}

/// Service with fast retries and a short poll interval
pub fn service_for(backend: TranslationBackend, ledger: Arc<MemoryLedger>) -> TranslationService {
    init_logging();
    TranslationService::new(backend, "en")
        .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(10)))
        .with_poll_settings(PollSettings {
            interval: Duration::from_secs(1),
            ceiling: Duration::from_secs(60),
        })
        .with_ledger(ledger)
}
