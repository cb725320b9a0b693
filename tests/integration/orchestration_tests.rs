/*!
 * End-to-end runs of the orchestrator against scripted providers
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use tokio_util::sync::CancellationToken;

use i18n_translator::catalog::{InMemoryCatalog, JsonDirCatalog};
use i18n_translator::errors::{ConfigError, ProviderError, RunError};
use i18n_translator::ledger::{JsonlLedger, LedgerRecord, MemoryLedger};
use i18n_translator::providers::TranslationBackend;
use i18n_translator::providers::mock::{MockBatchProvider, MockProvider};
use i18n_translator::translation::jobs::JobState;
use i18n_translator::translation::memory::MemoryArtifact;
use i18n_translator::translation::placeholders::PlaceholderExtractor;
use i18n_translator::translation::{Orchestrator, RunOptions};

use crate::common;

fn build(store: &InMemoryCatalog) -> MemoryArtifact {
    MemoryArtifact::build_from_reader(store, "en", &["fr".to_string()], &PlaceholderExtractor::default()).unwrap()
}

fn orchestrator(backend: TranslationBackend, store: Arc<InMemoryCatalog>, ledger: Arc<MemoryLedger>) -> Orchestrator {
    let service = common::service_for(backend, ledger.clone());
    Orchestrator::new(Arc::new(service), store.clone(), store, ledger)
}

#[tokio::test]
async fn test_run_withPlaceholderText_shouldMergeValidatedTranslation() {
    let store = common::store_with(json!({"welcome": "Welcome, {{name}}!"}), json!({"welcome": null}));
    let provider = MockProvider::answering([
        r#"{"translations":[{"key":"welcome","text":"Bienvenue, {{name}} !"}]}"#,
    ]);
    let ledger = Arc::new(MemoryLedger::new("scenario-1"));
    let mut artifact = build(&store);

    let summary = orchestrator(TranslationBackend::Sync(Arc::new(provider)), store.clone(), ledger.clone())
        .translate_missing(&mut artifact, "fr", &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(store.snapshot("fr").unwrap().to_flat_json(), json!({"welcome": "Bienvenue, {{name}} !"}));
    assert_eq!(summary.missing_before, 1);
    assert_eq!(summary.missing_after, 0);
    assert_eq!(summary.translated, 1);
    assert_eq!(summary.repaired, 0);
    assert!(summary.is_clean());
    assert_eq!(ledger.records_of("requests").len(), 1);
    assert_eq!(ledger.records_of("validations").len(), 1);
}

#[tokio::test]
async fn test_run_withDroppedPlaceholder_shouldFailAfterTwoRepairs() {
    let store = common::store_with(json!({"welcome": "Welcome, {{name}}!"}), json!({"welcome": null}));
    let provider = MockProvider::answering([r#"{"translations":[{"key":"welcome","text":"Bienvenue !"}]}"#]);
    let ledger = Arc::new(MemoryLedger::new("scenario-2"));
    let mut artifact = build(&store);

    let summary = orchestrator(TranslationBackend::Sync(Arc::new(provider.clone())), store.clone(), ledger.clone())
        .translate_missing(&mut artifact, "fr", &CancellationToken::new(), None)
        .await
        .unwrap();

    // First attempt plus two repairs
    assert_eq!(provider.request_count(), 3);
    assert_eq!(summary.repair_attempts, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.missing_after, 1);
    assert_eq!(summary.failed_batches.len(), 1);
    assert_eq!(summary.failed_batches[0].kind, "validation");
    assert_eq!(summary.failed_batches[0].keys, vec!["welcome"]);
    assert_eq!(store.write_count(), 0);
    assert!(store.snapshot("fr").unwrap().is_missing("welcome"));

    let failures = ledger.records_of("failures");
    assert_eq!(failures.len(), 1);
    assert!(matches!(&failures[0], LedgerRecord::Failure { kind, .. } if kind == "validation"));
}

#[tokio::test]
async fn test_run_withExistingTranslation_shouldNotOverwrite() {
    let store = common::store_with(json!({"welcome": "Welcome"}), json!({"welcome": "Bonjour"}));
    let provider = MockProvider::echo();
    let mut artifact = build(&store);

    let summary = orchestrator(
        TranslationBackend::Sync(Arc::new(provider.clone())),
        store.clone(),
        Arc::new(MemoryLedger::new("scenario-3")),
    )
    .translate_missing(&mut artifact, "fr", &CancellationToken::new(), None)
    .await
    .unwrap();

    assert_eq!(store.snapshot("fr").unwrap().text("welcome"), Some("Bonjour"));
    assert_eq!(summary.batches, 0);
    assert_eq!(provider.request_count(), 0);
    assert_eq!(store.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_async_run_withExpiredJob_shouldFailWithoutRepair() {
    let store = common::store_with(json!({"welcome": "Welcome, {{name}}!"}), json!({"welcome": null}));
    let provider = Arc::new(MockBatchProvider::new([JobState::InProgress, JobState::Expired]));
    let ledger = Arc::new(MemoryLedger::new("scenario-4"));
    let mut artifact = build(&store);

    let summary = orchestrator(TranslationBackend::AsyncBatch(provider.clone()), store.clone(), ledger.clone())
        .translate_missing(&mut artifact, "fr", &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(summary.repair_attempts, 0);
    assert_eq!(summary.failed_batches[0].kind, "expired");
    assert_eq!(provider.submissions().len(), 1);
    assert_eq!(summary.missing_after, 1);

    let states: Vec<String> = ledger
        .records()
        .into_iter()
        .filter_map(|r| match r {
            LedgerRecord::JobStatus { state, .. } => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(states.last().map(String::as_str), Some("expired"));
}

#[tokio::test(start_paused = true)]
async fn test_async_run_withCompletingJob_shouldMergeEveryItem() {
    let store = common::store_with(
        json!({"a": "One {0}", "b": "Two", "c": "Three %s"}),
        json!({}),
    );
    let provider = Arc::new(MockBatchProvider::completing());
    let mut artifact = build(&store);

    let summary = orchestrator(
        TranslationBackend::AsyncBatch(provider.clone()),
        store.clone(),
        Arc::new(MemoryLedger::new("async-ok")),
    )
    .with_options(RunOptions { batch_size: 2, ..RunOptions::default() })
    .translate_missing(&mut artifact, "fr", &CancellationToken::new(), None)
    .await
    .unwrap();

    assert_eq!(summary.translated, 3);
    assert_eq!(summary.batches, 2);
    let fr = store.snapshot("fr").unwrap();
    assert_eq!(fr.text("a"), Some("[fr] One {0}"));
    assert_eq!(fr.text("c"), Some("[fr] Three %s"));
}

#[tokio::test]
async fn test_rerun_withoutSourceChanges_shouldWriteNothing() {
    let dir = common::create_temp_dir().unwrap();
    let i18n = dir.path().join("i18n");
    common::write_catalog(&i18n, "en", &json!({"home": {"title": "Home", "cta": "Start {{n}}"}})).unwrap();
    common::write_catalog(&i18n, "fr", &json!({"home": {"title": "Accueil"}})).unwrap();
    let store = Arc::new(JsonDirCatalog::new(&i18n));

    let run = |provider: MockProvider| {
        let store = store.clone();
        let runs = dir.path().join("runs");
        async move {
            let extractor = PlaceholderExtractor::default();
            let mut artifact =
                MemoryArtifact::build_from_reader(store.as_ref(), "en", &["fr".to_string()], &extractor).unwrap();
            let ledger = Arc::new(JsonlLedger::create_new(&runs).unwrap());
            let service = i18n_translator::translation::TranslationService::new(
                TranslationBackend::Sync(Arc::new(provider)),
                "en",
            )
            .with_ledger(ledger.clone());
            Orchestrator::new(Arc::new(service), store.clone(), store.clone(), ledger)
                .translate_missing(&mut artifact, "fr", &CancellationToken::new(), None)
                .await
                .unwrap()
        }
    };

    let first = run(MockProvider::echo()).await;
    assert_eq!(first.translated, 1);
    let after_first = std::fs::read_to_string(store.path_for("fr")).unwrap();
    assert_eq!(
        common::read_json(&store.path_for("fr")),
        json!({"home": {"title": "Accueil", "cta": "[fr] Start {{n}}"}})
    );

    let idle = MockProvider::echo();
    let second = run(idle.clone()).await;
    assert_eq!(second.batches, 0);
    assert_eq!(second.missing_before, 0);
    assert_eq!(idle.request_count(), 0);
    assert_eq!(std::fs::read_to_string(store.path_for("fr")).unwrap(), after_first);
}

#[tokio::test]
async fn test_run_withAuthFailure_shouldAbortAndKeepSummary() {
    let store = common::store_with(json!({"a": "A", "b": "B", "c": "C"}), json!({}));
    let provider = MockProvider::failing(ProviderError::AuthenticationError("invalid x-api-key".into()));
    let ledger = Arc::new(MemoryLedger::new("auth"));
    let mut artifact = build(&store);

    let result = orchestrator(TranslationBackend::Sync(Arc::new(provider.clone())), store.clone(), ledger.clone())
        .with_options(RunOptions { batch_size: 1, ..RunOptions::default() })
        .translate_missing(&mut artifact, "fr", &CancellationToken::new(), None)
        .await;

    assert!(matches!(result, Err(RunError::ProviderAuth(_))));
    // Remaining batches see the cancelled run and never reach the provider
    assert_eq!(provider.request_count(), 1);
    let summary = ledger.summary().unwrap();
    assert!(summary.aborted.unwrap().contains("authentication"));
    assert_eq!(summary.missing_after, 3);
}

#[tokio::test]
async fn test_concurrent_batches_withProgress_shouldReportEveryBatch() {
    let source: serde_json::Map<String, serde_json::Value> =
        (0..12).map(|i| (format!("k{:02}", i), json!(format!("Text {}", i)))).collect();
    let store = common::store_with(serde_json::Value::Object(source), json!({}));
    let mut artifact = build(&store);
    let calls = AtomicUsize::new(0);
    let progress = |done: usize, total: usize| {
        calls.fetch_add(1, Ordering::SeqCst);
        assert!(done <= total);
    };

    let summary = orchestrator(
        TranslationBackend::Sync(Arc::new(MockProvider::echo())),
        store.clone(),
        Arc::new(MemoryLedger::new("concurrent")),
    )
    .with_options(RunOptions {
        batch_size: 3,
        concurrent_batches: 3,
        force: false,
    })
    .translate_missing(&mut artifact, "fr", &CancellationToken::new(), Some(&progress))
    .await
    .unwrap();

    assert_eq!(summary.batches, 4);
    assert_eq!(summary.translated, 12);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let fr = store.snapshot("fr").unwrap();
    let keys: Vec<&String> = fr.keys().collect();
    assert_eq!(keys.first().map(|k| k.as_str()), Some("k00"));
    assert_eq!(keys.len(), 12);
    assert_eq!(artifact.missing_count("fr"), 0);
}

#[tokio::test]
async fn test_run_withInvalidTarget_shouldFailBeforeAnyBatch() {
    let store = common::store_with(json!({"a": "One", "b": "Two", "c": "Three"}), json!({}));
    let provider = MockProvider::echo();
    let ledger = Arc::new(MemoryLedger::new("bad-target"));
    let mut artifact = build(&store);
    let orchestrator = orchestrator(TranslationBackend::Sync(Arc::new(provider.clone())), store.clone(), ledger.clone());

    for target in ["zz-not-a-lang", "en", "eng"] {
        let result = orchestrator
            .translate_missing(&mut artifact, target, &CancellationToken::new(), None)
            .await;
        assert!(matches!(result, Err(RunError::Config(ConfigError::InvalidLanguage(_)))), "{}", target);
    }

    assert_eq!(provider.request_count(), 0);
    assert_eq!(store.write_count(), 0);
    assert!(store.snapshot("zz-not-a-lang").is_none());
    assert!(ledger.records().is_empty());
    assert!(ledger.summary().is_none());
}
