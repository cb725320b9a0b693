/*!
 * Tests for placeholder signatures and response validation
 */

use std::sync::Arc;

use serde_json::json;

use i18n_translator::app_config::{CustomPattern, PlaceholderConfig};
use i18n_translator::catalog::Catalog;
use i18n_translator::errors::ValidationError;
use i18n_translator::translation::batch::{BatchItem, select_batches};
use i18n_translator::translation::memory::MemoryArtifact;
use i18n_translator::translation::placeholders::{PlaceholderExtractor, placeholder_signature};
use i18n_translator::translation::validator::ResponseValidator;

fn artifact(source: serde_json::Value, extractor: &PlaceholderExtractor) -> MemoryArtifact {
    let targets = [("fr".to_string(), Catalog::new())].into_iter().collect();
    MemoryArtifact::build("en", &Catalog::from_flat_json(source), &targets, extractor)
}

fn items(artifact: &MemoryArtifact) -> Vec<BatchItem> {
    select_batches(artifact, "fr", 100, "mock")
        .unwrap()
        .into_iter()
        .flat_map(|job| job.items)
        .collect()
}

#[test]
fn test_signature_withSameInput_shouldBeDeterministic() {
    let text = "Hi {{name}}, {count, plural, one {# file} other {# files}} at %1$s and {0}";
    let first = placeholder_signature(text);
    let second = placeholder_signature(text);
    assert_eq!(first, second);
    assert_eq!(first.render(), "{{name}}|{count, plural}|%1$s|{0}");
}

#[test]
fn test_validator_withDroppedPlaceholder_shouldExplainRepair() {
    let extractor = PlaceholderExtractor::default();
    let art = artifact(json!({"welcome": "Welcome, {{name}}!"}), &extractor);
    let validator = ResponseValidator::new(Arc::new(extractor));

    let failure = validator
        .validate(
            r#"{"translations":[{"key":"welcome","text":"Bienvenue !"}]}"#,
            "fr",
            &items(&art),
        )
        .unwrap_err();

    assert_eq!(failure.errors.len(), 1);
    let instruction = failure.errors[0].repair_instruction();
    assert!(instruction.contains("[{{name}}]"));
    assert!(instruction.contains("Dropped: {{name}}."));
}

#[test]
fn test_validator_withCustomPattern_shouldProtectProjectTokens() {
    let config = PlaceholderConfig {
        custom_patterns: vec![CustomPattern {
            name: "colon_var".into(),
            regex: r":[a-z_]+".into(),
        }],
    };
    let extractor = config.extractor().unwrap();
    let art = artifact(json!({"greet": "Hello :user_name"}), &extractor);
    let validator = ResponseValidator::new(Arc::new(extractor));

    let ok = validator.validate(
        r#"{"targetLanguage":"fr","translations":[{"key":"greet","text":"Bonjour :user_name"}]}"#,
        "fr",
        &items(&art),
    );
    assert!(ok.is_ok());

    let failure = validator
        .validate(
            r#"{"targetLanguage":"fr","translations":[{"key":"greet","text":"Bonjour :utilisateur"}]}"#,
            "fr",
            &items(&art),
        )
        .unwrap_err();
    assert!(matches!(failure.errors[0], ValidationError::PlaceholderMismatch { .. }));
}

#[test]
fn test_validator_withChattyFencedAnswer_shouldStillAccept() {
    let extractor = PlaceholderExtractor::default();
    let art = artifact(json!({"a": "Saved {0} items", "b": "Done"}), &extractor);
    let validator = ResponseValidator::new(Arc::new(extractor));

    let raw = "Sure! Here you go:\n```json\n{\"targetLanguage\": \"fr\", \"translations\": [\n  {\"key\": \"b\", \"text\": \"Terminé\"},\n  {\"key\": \"a\", \"text\": \"{0} éléments enregistrés\"}\n]}\n```\nLet me know if you need more.";
    let result = validator.validate(raw, "fr", &items(&art)).unwrap();

    // Request order, not response order
    assert_eq!(result.keys(), vec!["a", "b"]);
    assert_eq!(result.translations[1].text, "Terminé");
}
