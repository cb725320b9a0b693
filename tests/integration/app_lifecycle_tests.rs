/*!
 * Controller workflows on a catalog directory
 */

use serde_json::json;
use tokio_util::sync::CancellationToken;

use i18n_translator::app_controller::{Controller, RunRequest};
use i18n_translator::errors::ConfigError;
use i18n_translator::translation::memory::{EntryStatus, MemoryArtifact};

use crate::common;

fn seeded_controller(dir: &std::path::Path) -> Controller {
    let i18n = dir.join("i18n");
    common::write_catalog(&i18n, "en", &json!({"home": {"title": "Home", "cta": "Start {{n}}"}})).unwrap();
    common::write_catalog(&i18n, "fr", &json!({"home": {"title": "Accueil"}})).unwrap();
    Controller::with_config(common::config_in(dir)).unwrap()
}

#[test]
fn test_build_memory_withExtraLanguageFile_shouldTrackIt() {
    let dir = common::create_temp_dir().unwrap();
    let controller = seeded_controller(dir.path());
    common::write_catalog(&dir.path().join("i18n"), "de", &json!({})).unwrap();

    let artifact = controller.build_memory().unwrap();

    assert_eq!(artifact.target_languages, vec!["de", "fr"]);
    assert_eq!(artifact.len(), 2);
    assert_eq!(artifact.missing_count("fr"), 1);
    assert_eq!(artifact.missing_count("de"), 2);

    let reloaded = MemoryArtifact::read_jsonl(&controller.config().paths.memory_file).unwrap();
    assert_eq!(reloaded.len(), 2);
    assert_eq!(reloaded.get("home.title").unwrap().status_for("fr"), EntryStatus::Present);
    assert_eq!(reloaded.get("home.cta").unwrap().namespace, "home");
}

#[test]
fn test_write_back_withValidResults_shouldMergeAndMarkPresent() {
    let dir = common::create_temp_dir().unwrap();
    let controller = seeded_controller(dir.path());
    controller.build_memory().unwrap();

    let results = dir.path().join("results.json");
    std::fs::write(
        &results,
        r#"{"targetLanguage": "fr", "translations": [{"key": "home.cta", "text": "Commencer {{n}}"}]}"#,
    )
    .unwrap();

    let stats = controller.write_back("fr", &results, false).unwrap();

    assert_eq!(stats.updated, 1);
    assert_eq!(
        common::read_json(&dir.path().join("i18n").join("fr.json")),
        json!({"home": {"title": "Accueil", "cta": "Commencer {{n}}"}})
    );
    let memory = MemoryArtifact::read_jsonl(&controller.config().paths.memory_file).unwrap();
    assert_eq!(memory.missing_count("fr"), 0);
}

#[test]
fn test_write_back_withDroppedPlaceholder_shouldLeaveCatalogUntouched() {
    let dir = common::create_temp_dir().unwrap();
    let controller = seeded_controller(dir.path());
    controller.build_memory().unwrap();
    let fr_path = dir.path().join("i18n").join("fr.json");
    let before = std::fs::read_to_string(&fr_path).unwrap();

    let results = dir.path().join("results.json");
    std::fs::write(&results, r#"{"translations": [{"key": "home.cta", "text": "Commencer"}]}"#).unwrap();

    assert!(controller.write_back("fr", &results, false).is_err());
    assert_eq!(std::fs::read_to_string(&fr_path).unwrap(), before);
}

#[test]
fn test_validate_file_withTarget_shouldCheckPlaceholders() {
    let dir = common::create_temp_dir().unwrap();
    let controller = seeded_controller(dir.path());
    controller.build_memory().unwrap();

    let good = dir.path().join("good.json");
    std::fs::write(&good, r#"{"translations": [{"key": "home.cta", "text": "Commencer {{n}}"}]}"#).unwrap();
    let report = controller.validate_file(&good, Some("fr"), &[]).unwrap();
    assert!(report.is_valid());
    assert_eq!(report.translations, 1);

    let wrong_language = dir.path().join("wrong.json");
    std::fs::write(
        &wrong_language,
        r#"{"targetLanguage": "de", "translations": [{"key": "home.cta", "text": "Los {{n}}"}]}"#,
    )
    .unwrap();
    assert!(!controller.validate_file(&wrong_language, Some("fr"), &[]).unwrap().is_valid());

    // Asking for a key the response lacks
    let keys = vec!["home.cta".to_string(), "home.title".to_string()];
    assert!(!controller.validate_file(&good, Some("fr"), &keys).unwrap().is_valid());
}

#[test]
fn test_run_withSkipTranslate_shouldOnlyWriteMemory() {
    let dir = common::create_temp_dir().unwrap();
    let controller = seeded_controller(dir.path());

    let request = RunRequest {
        skip_translate: true,
        ..RunRequest::default()
    };
    let summaries = tokio_test::block_on(controller.run(&request, &CancellationToken::new())).unwrap();

    assert!(summaries.is_empty());
    assert!(std::path::Path::new(&controller.config().paths.memory_file).exists());
    assert!(!dir.path().join("runs").exists());
}

#[tokio::test]
async fn test_translate_from_memory_withoutMemoryFile_shouldFail() {
    let dir = common::create_temp_dir().unwrap();
    let controller = seeded_controller(dir.path());

    let result = controller
        .translate_from_memory("fr", false, &CancellationToken::new())
        .await;

    let message = result.unwrap_err().to_string();
    assert!(message.contains("build-memory"));
}

#[tokio::test]
async fn test_translate_withInvalidCliTarget_shouldRejectBeforeOpeningLedger() {
    let dir = common::create_temp_dir().unwrap();
    let controller = seeded_controller(dir.path());
    controller.build_memory().unwrap();
    let en_path = dir.path().join("i18n").join("en.json");
    let en_before = std::fs::read_to_string(&en_path).unwrap();

    for target in ["zz", "en"] {
        let err = controller
            .translate_from_memory(target, false, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::InvalidLanguage(_))), "{}", target);
    }

    let request = RunRequest {
        target_languages: vec!["fr".into(), "zz".into()],
        ..RunRequest::default()
    };
    assert!(controller.run(&request, &CancellationToken::new()).await.is_err());

    assert!(!dir.path().join("runs").exists());
    assert!(!dir.path().join("i18n").join("zz.json").exists());
    assert_eq!(std::fs::read_to_string(&en_path).unwrap(), en_before);
}
