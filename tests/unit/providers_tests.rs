/*!
 * Tests for the provider factory and the mock providers
 */

use i18n_translator::app_config::{TranslationConfig, TranslationProvider};
use i18n_translator::errors::{ConfigError, ProviderError};
use i18n_translator::providers::mock::{MockBatchProvider, MockProvider, echo_response, requested_items};
use i18n_translator::providers::{AsyncBatchProvider, BatchRequest, PromptCompletion, create_backend};
use i18n_translator::translation::jobs::JobState;

#[test]
fn test_create_backend_withLocalProviders_shouldBuildSyncBackends() {
    let mut config = TranslationConfig::default();
    let backend = create_backend(&config).unwrap();
    assert!(!backend.is_async());
    assert_eq!(backend.provider_id(), "ollama");

    config.provider = TranslationProvider::LMStudio;
    let backend = create_backend(&config).unwrap();
    assert_eq!(backend.provider_id(), "lmstudio");
}

#[test]
fn test_create_backend_withBatchApi_shouldBuildAsyncBackend() {
    let mut config = TranslationConfig::default();
    config.provider = TranslationProvider::Anthropic;
    let anthropic = config.active_provider_config_mut();
    anthropic.api_key = "sk-ant-test".into();
    anthropic.use_batch_api = true;

    let backend = create_backend(&config).unwrap();
    assert!(backend.is_async());
    assert_eq!(backend.provider_id(), "anthropic");
}

#[test]
fn test_create_backend_withoutKey_shouldFailBeforeAnyRequest() {
    if std::env::var("OPENROUTER_API_KEY").is_ok() {
        return;
    }
    let mut config = TranslationConfig::default();
    config.provider = TranslationProvider::OpenRouter;

    match create_backend(&config) {
        Err(ConfigError::MissingCredential { env_var, .. }) => assert_eq!(env_var, "OPENROUTER_API_KEY"),
        other => panic!("expected a missing credential, got {:?}", other.map(|b| b.provider_id())),
    }
}

#[test]
fn test_echo_response_withPromptItems_shouldAnswerEveryKey() {
    let prompt = "Answer as {\"targetLanguage\": \"fr\", \"translations\": [...]}\n- welcome: \"Welcome, {{name}}!\"\n- bye: \"Bye\"\n";
    assert_eq!(requested_items(prompt).len(), 2);

    let answer: serde_json::Value = serde_json::from_str(&echo_response(prompt)).unwrap();
    assert_eq!(answer["translations"][0]["key"], "welcome");
    assert_eq!(answer["translations"][0]["text"], "[fr] Welcome, {{name}}!");
    assert_eq!(answer["translations"][1]["text"], "[fr] Bye");
}

#[tokio::test]
async fn test_scripted_mock_withExhaustedScript_shouldRepeatLastAnswer() {
    let provider = MockProvider::scripted([
        Err(ProviderError::RateLimitExceeded { message: "slow down".into(), retry_after: None }),
        Ok("first".to_string()),
    ]);

    assert!(provider.complete_prompt("p1").await.is_err());
    assert_eq!(provider.complete_prompt("p2").await.unwrap(), "first");
    assert_eq!(provider.complete_prompt("p3").await.unwrap(), "first");
    assert_eq!(provider.request_count(), 3);
    assert_eq!(provider.prompts(), vec!["p1", "p2", "p3"]);
}

#[tokio::test]
async fn test_mock_batch_withStatusScript_shouldReportStatesInOrder() {
    let provider = MockBatchProvider::new([JobState::Validating, JobState::InProgress, JobState::Ended]);
    let handle = provider
        .submit_batch(vec![BatchRequest { custom_id: "item-0".into(), prompt: "p".into() }])
        .await
        .unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(provider.poll_status(&handle).await.unwrap());
    }
    assert_eq!(seen, vec![JobState::Validating, JobState::InProgress, JobState::Ended, JobState::Ended]);
    assert_eq!(provider.poll_count(), 4);
}
