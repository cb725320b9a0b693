/*!
 * Mock provider implementations for testing.
 *
 * This module provides scripted providers that simulate different behaviors:
 * - `MockProvider::echo()` - answers every prompt with a valid translation
 * - `MockProvider::scripted(..)` - replays canned responses in order
 * - `MockProvider::failing(..)` - always fails with the given error
 * - `MockBatchProvider` - an async batch job API with a scripted status sequence
 */

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{AsyncBatchProvider, BatchRequest, BatchResultItem, ItemOutcome, Provider};
use crate::translation::jobs::{JobHandle, JobState};

static TARGET_LANGUAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""targetLanguage":\s*"([^"]+)""#).expect("static mock regex"));

/// Mock request for testing
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// The full prompt
    pub prompt: String,
}

/// Mock response for testing
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// The answer text
    pub text: String,
    /// Simulated prompt tokens
    pub prompt_tokens: Option<u64>,
}

/// Behavior mode for the mock provider
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Always answers with a valid translation of the requested items
    Echo,
    /// Replays the scripted answers; the last one repeats once exhausted
    Scripted,
    /// Always fails with the given error
    Failing(ProviderError),
    /// Returns an empty response
    Empty,
    /// Echo after a delay (for cancellation testing)
    Slow { delay_ms: u64 },
}

/// Keys and source texts requested by a translation or repair prompt
pub fn requested_items(prompt: &str) -> Vec<(String, String)> {
    // Repair prompts quote the original request last
    let request = prompt
        .rsplit_once("ORIGINAL REQUEST:")
        .map_or(prompt, |(_, original)| original);

    request
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("- ")?;
            let (key, value) = rest.split_once(": ")?;
            if !value.starts_with('"') {
                return None;
            }
            let text = serde_json::Deserializer::from_str(value)
                .into_iter::<String>()
                .next()?
                .ok()?;
            Some((key.to_string(), text))
        })
        .collect()
}

/// Target language a prompt asks for
pub fn requested_language(prompt: &str) -> Option<String> {
    TARGET_LANGUAGE
        .captures_iter(prompt)
        .last()
        .map(|c| c[1].to_string())
}

/// A valid answer to `prompt`: each source text tagged with the target language
pub fn echo_response(prompt: &str) -> String {
    let language = requested_language(prompt).unwrap_or_else(|| "xx".to_string());
    let translations: Vec<_> = requested_items(prompt)
        .into_iter()
        .map(|(key, text)| json!({"key": key, "text": format!("[{}] {}", language, text)}))
        .collect();
    json!({"targetLanguage": language, "translations": translations}).to_string()
}

/// Mock provider for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter shared between clones
    request_count: Arc<AtomicUsize>,
    /// Canned answers for `MockBehavior::Scripted`
    script: Arc<Mutex<VecDeque<Result<String, ProviderError>>>>,
    last_scripted: Arc<Mutex<Option<Result<String, ProviderError>>>>,
    /// Every prompt received, in order
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            script: Arc::new(Mutex::new(VecDeque::new())),
            last_scripted: Arc::new(Mutex::new(None)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn echo() -> Self {
        Self::new(MockBehavior::Echo)
    }

    /// Replay `responses` in order
    pub fn scripted<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Result<String, ProviderError>>,
    {
        let provider = Self::new(MockBehavior::Scripted);
        provider.script.lock().extend(responses);
        provider
    }

    /// Replay successful answers in order
    pub fn answering<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::scripted(answers.into_iter().map(|a| Ok(a.into())))
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::new(MockBehavior::Failing(error))
    }

    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn next_scripted(&self) -> Result<String, ProviderError> {
        let next = self.script.lock().pop_front();
        match next {
            Some(answer) => {
                *self.last_scripted.lock() = Some(answer.clone());
                answer
            }
            None => self
                .last_scripted
                .lock()
                .clone()
                .unwrap_or_else(|| Err(ProviderError::ConnectionError("mock script is empty".to_string()))),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    type Request = MockRequest;
    type Response = MockResponse;

    fn name(&self) -> &str {
        "mock"
    }

    fn build_request(&self, prompt: &str) -> MockRequest {
        MockRequest {
            prompt: prompt.to_string(),
        }
    }

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(request.prompt.clone());
        let prompt_tokens = Some(request.prompt.split_whitespace().count() as u64);

        let text = match &self.behavior {
            MockBehavior::Echo => echo_response(&request.prompt),
            MockBehavior::Scripted => self.next_scripted()?,
            MockBehavior::Failing(error) => return Err(error.clone()),
            MockBehavior::Empty => String::new(),
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                echo_response(&request.prompt)
            }
        };

        Ok(MockResponse { text, prompt_tokens })
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match &self.behavior {
            MockBehavior::Failing(error) => Err(error.clone()),
            _ => Ok(()),
        }
    }

    fn extract_text(response: &Self::Response) -> String {
        response.text.clone()
    }
}

/// Scripted async batch job API
#[derive(Debug, Clone)]
pub struct MockBatchProvider {
    /// States reported by successive polls; the last one repeats
    statuses: Arc<Mutex<VecDeque<JobState>>>,
    last_status: Arc<Mutex<JobState>>,
    /// Fixed per-item outcomes; when absent every request is echoed
    outcomes: Arc<Mutex<Option<Vec<BatchResultItem>>>>,
    /// Overrides for individual correlation ids
    overrides: Arc<Mutex<Vec<(String, ItemOutcome)>>>,
    submissions: Arc<Mutex<Vec<Vec<BatchRequest>>>>,
    polls: Arc<AtomicUsize>,
    /// How long each status poll takes to answer
    poll_delay: Duration,
}

impl MockBatchProvider {
    /// A job that reports `statuses` in order
    pub fn new<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = JobState>,
    {
        Self {
            statuses: Arc::new(Mutex::new(statuses.into_iter().collect())),
            last_status: Arc::new(Mutex::new(JobState::Submitted)),
            outcomes: Arc::new(Mutex::new(None)),
            overrides: Arc::new(Mutex::new(Vec::new())),
            submissions: Arc::new(Mutex::new(Vec::new())),
            polls: Arc::new(AtomicUsize::new(0)),
            poll_delay: Duration::ZERO,
        }
    }

    /// A job that runs to `ended` and echoes every request
    pub fn completing() -> Self {
        Self::new([JobState::InProgress, JobState::Ended])
    }

    /// Return exactly these outcomes from every fetch
    pub fn with_results(self, results: Vec<BatchResultItem>) -> Self {
        *self.outcomes.lock() = Some(results);
        self
    }

    /// Answer one correlation id with `outcome` instead of echoing it
    pub fn with_outcome(self, custom_id: impl Into<String>, outcome: ItemOutcome) -> Self {
        self.overrides.lock().push((custom_id.into(), outcome));
        self
    }

    /// Make every status poll take `delay` before answering
    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    pub fn submissions(&self) -> Vec<Vec<BatchRequest>> {
        self.submissions.lock().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AsyncBatchProvider for MockBatchProvider {
    fn provider_id(&self) -> String {
        "mock-batch".to_string()
    }

    async fn submit_batch(&self, requests: Vec<BatchRequest>) -> Result<JobHandle, ProviderError> {
        let mut submissions = self.submissions.lock();
        submissions.push(requests);
        Ok(JobHandle::new(format!("mockbatch_{}", submissions.len())))
    }

    async fn poll_status(&self, _handle: &JobHandle) -> Result<JobState, ProviderError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if !self.poll_delay.is_zero() {
            tokio::time::sleep(self.poll_delay).await;
        }
        let next = self.statuses.lock().pop_front();
        let mut last = self.last_status.lock();
        if let Some(state) = next {
            *last = state;
        }
        Ok(*last)
    }

    async fn fetch_results(&self, handle: &JobHandle) -> Result<Vec<BatchResultItem>, ProviderError> {
        if let Some(results) = self.outcomes.lock().clone() {
            return Ok(results);
        }

        let index = handle
            .job_id
            .trim_start_matches("mockbatch_")
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 404,
                message: format!("unknown batch {}", handle.job_id),
            })?;
        let requests = self
            .submissions
            .lock()
            .get(index)
            .cloned()
            .unwrap_or_default();
        let overrides = self.overrides.lock().clone();

        // Reverse order so callers cannot rely on positions
        Ok(requests
            .iter()
            .rev()
            .map(|request| {
                let outcome = overrides
                    .iter()
                    .find(|(id, _)| *id == request.custom_id)
                    .map(|(_, outcome)| outcome.clone())
                    .unwrap_or_else(|| ItemOutcome::Succeeded(echo_response(&request.prompt)));
                BatchResultItem {
                    custom_id: request.custom_id.clone(),
                    outcome,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::PromptCompletion;

    const PROMPT: &str = "Translate these English strings to French:\n- greeting: \"Hello, {{name}}!\"\n- bye: \"Bye \\\"now\\\"\" (Tone: casual)\n\nRULES:\n- Preserve protected tokens EXACTLY and in the same order: {{name}}\n{\n  \"targetLanguage\": \"fr\",\n}";

    #[test]
    fn test_requestedItems_shouldParseKeysAndTexts() {
        let items = requested_items(PROMPT);
        assert_eq!(
            items,
            vec![
                ("greeting".to_string(), "Hello, {{name}}!".to_string()),
                ("bye".to_string(), "Bye \"now\"".to_string()),
            ]
        );
        assert_eq!(requested_language(PROMPT).as_deref(), Some("fr"));
    }

    #[test]
    fn test_requestedItems_withRepairPrompt_shouldUseOriginalRequest() {
        let repair = format!("ERRORS:\n- Key 'x': \"bogus\"\n\nORIGINAL REQUEST:\n{}", PROMPT);
        assert_eq!(requested_items(&repair).len(), 2);
    }

    #[tokio::test]
    async fn test_echoProvider_shouldAnswerEveryKey() {
        let provider = MockProvider::echo();
        let text = provider.complete_prompt(PROMPT).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["targetLanguage"], "fr");
        assert_eq!(value["translations"][0]["text"], "[fr] Hello, {{name}}!");
        assert_eq!(provider.request_count(), 1);
        assert_eq!(provider.prompts(), vec![PROMPT.to_string()]);
    }

    #[tokio::test]
    async fn test_scriptedProvider_shouldReplayThenRepeatLast() {
        let provider = MockProvider::scripted([
            Err(ProviderError::Timeout("slow".into())),
            Ok("{}".to_string()),
        ]);
        assert!(matches!(provider.complete_prompt("a").await, Err(ProviderError::Timeout(_))));
        assert_eq!(provider.complete_prompt("b").await.unwrap(), "{}");
        assert_eq!(provider.complete_prompt("c").await.unwrap(), "{}");
        assert_eq!(provider.request_count(), 3);
    }

    #[tokio::test]
    async fn test_emptyProvider_shouldBeMalformedOutput() {
        let result = MockProvider::empty().complete_prompt(PROMPT).await;
        assert!(matches!(result, Err(ProviderError::MalformedOutput(_))));
    }

    #[tokio::test]
    async fn test_batchProvider_shouldReportScriptedStates() {
        let provider = MockBatchProvider::new([JobState::Validating, JobState::Expired]);
        let handle = provider
            .submit_batch(vec![BatchRequest { custom_id: "item-0".into(), prompt: PROMPT.into() }])
            .await
            .unwrap();
        assert_eq!(provider.poll_status(&handle).await.unwrap(), JobState::Validating);
        assert_eq!(provider.poll_status(&handle).await.unwrap(), JobState::Expired);
        assert_eq!(provider.poll_status(&handle).await.unwrap(), JobState::Expired);
        assert_eq!(provider.poll_count(), 3);
    }

    #[tokio::test]
    async fn test_batchProvider_shouldEchoWithOverrides() {
        let provider = MockBatchProvider::completing().with_outcome("item-1", ItemOutcome::Expired);
        let handle = provider
            .submit_batch(vec![
                BatchRequest { custom_id: "item-0".into(), prompt: PROMPT.into() },
                BatchRequest { custom_id: "item-1".into(), prompt: PROMPT.into() },
            ])
            .await
            .unwrap();
        let results = provider.fetch_results(&handle).await.unwrap();
        assert_eq!(results[0].custom_id, "item-1");
        assert_eq!(results[0].outcome, ItemOutcome::Expired);
        assert!(matches!(&results[1].outcome, ItemOutcome::Succeeded(text) if text.contains("[fr] Hello")));
    }
}
