/*!
 * Tests for application configuration functionality
 */

use i18n_translator::app_config::{Config, CustomPattern, LogLevel, TranslationProvider};
use i18n_translator::errors::ConfigError;

use crate::common;

#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.source_language, "en");
    assert_eq!(config.target_languages, vec!["fr"]);
    assert_eq!(config.translation.provider, TranslationProvider::Ollama);
    assert_eq!(config.translation.common.batch_size, 10);
    assert_eq!(config.translation.common.retry_count, 3);
    assert_eq!(config.translation.common.max_repairs, 2);
    assert_eq!(config.translation.common.concurrent_batches, 1);
    assert_eq!(config.translation.common.poll_timeout_secs, 86_400);
    assert_eq!(config.paths.memory_file, "work/memory.jsonl");
    assert_eq!(config.log_level, LogLevel::Info);

    let ollama = config
        .translation
        .get_provider_config(&TranslationProvider::Ollama)
        .expect("Ollama provider config should exist");
    assert_eq!(ollama.endpoint, "http://localhost:11434");
    assert_eq!(config.translation.get_rate_limit(), None);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation_withInvalidValues_shouldReturnConfigErrors() {
    let mut config = Config::default();

    config.target_languages = vec!["fr".into(), "zz".into()];
    assert!(matches!(config.validate(), Err(ConfigError::InvalidLanguage(_))));
    config.target_languages = vec!["pt-BR".into()];
    assert!(config.validate().is_ok());

    config.translation.common.batch_size = 0;
    assert!(matches!(config.validate(), Err(ConfigError::ZeroBatchSize)));
    config.translation.common.batch_size = 5;

    config.translation.common.temperature = 3.5;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    config.translation.common.temperature = 0.2;

    config.translation.active_provider_config_mut().endpoint = "ftp://example.com".into();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    config.translation.active_provider_config_mut().endpoint = "http://localhost:11434".into();

    config.placeholders.custom_patterns.push(CustomPattern {
        name: "broken".into(),
        regex: "[unclosed".into(),
    });
    assert!(matches!(config.validate(), Err(ConfigError::InvalidPattern { .. })));
}

#[test]
fn test_hosted_provider_withoutKey_shouldRequireCredential() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Anthropic;

    if std::env::var("ANTHROPIC_API_KEY").is_err() {
        assert!(matches!(config.validate(), Err(ConfigError::MissingCredential { .. })));
    }

    config.translation.active_provider_config_mut().api_key = "sk-test".into();
    assert!(config.validate().is_ok());
    assert_eq!(config.translation.get_api_key(), "sk-test");
    assert_eq!(config.translation.get_rate_limit(), Some(45));
}

#[test]
fn test_provider_parsing_withAliases_shouldResolve() {
    assert_eq!("claude".parse::<TranslationProvider>().unwrap(), TranslationProvider::Anthropic);
    assert_eq!("OpenRouter".parse::<TranslationProvider>().unwrap(), TranslationProvider::OpenRouter);
    assert!("gemini".parse::<TranslationProvider>().is_err());
}

#[test]
fn test_load_or_create_withMissingFile_shouldWriteDefaults() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("i18n-translator.json");

    let created = Config::load_or_create(&path).unwrap();
    assert!(path.exists());

    let loaded = Config::load_or_create(&path).unwrap();
    assert_eq!(loaded.source_language, created.source_language);
    assert_eq!(loaded.target_languages, created.target_languages);
}

#[test]
fn test_partial_config_withMissingFields_shouldUseDefaults() {
    let json = r#"{
        "source_language": "en",
        "target_languages": ["de", "fr"],
        "translation": {
            "provider": "openrouter",
            "available_providers": [
                {"type": "openrouter", "model": "anthropic/claude-3.5-sonnet", "api_key": "k", "endpoint": ""}
            ],
            "common": {"batch_size": 25}
        }
    }"#;
    let config: Config = serde_json::from_str(json).unwrap();

    assert_eq!(config.translation.common.batch_size, 25);
    assert_eq!(config.translation.common.max_repairs, 2);
    assert_eq!(config.translation.get_model(), "anthropic/claude-3.5-sonnet");
    assert_eq!(config.translation.get_endpoint(), "https://openrouter.ai/api/v1");
    assert_eq!(config.paths.i18n_dir, "i18n");
    assert!(config.validate().is_ok());
}
