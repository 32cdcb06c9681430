//! Classifier Bridge: obtains a verdict on one image's alt text.
//!
//! Order of checks for each call: cache, circuit breaker, token budget, then
//! the provider with retry on transient errors. The budget is reserved from
//! the token estimate before the call and settled against real usage after. The reply must pass the
//! verdict schema; anything else is a parse failure and is never cached.

use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use lumen_core::{parse_verdict, ClassificationVerdict, FailureKind, ItemFailure, VerdictParseError};

use crate::cache::{VerdictCache, VerdictKey};
use crate::config::ClassifierConfig;
use crate::prompts::alt_text_messages;
use crate::providers::{CompletionConfig, LlmProvider, ProviderError, ProviderRegistry};
use crate::resilience::{CircuitBreaker, UsageMeter};

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("classifier reply rejected: {0}")]
    Parse(#[from] VerdictParseError),

    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

impl ClassifyError {
    /// Per-item failure recorded on the finding.
    pub fn item_failure(&self) -> ItemFailure {
        let kind = match self {
            ClassifyError::Parse(_) => FailureKind::ClassificationParseFailure,
            ClassifyError::Unavailable(_) => FailureKind::ClassifierUnavailable,
        };
        ItemFailure::new(kind, self.to_string())
    }
}

pub struct ClassifierBridge {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    cache: VerdictCache,
    breaker: CircuitBreaker,
    retry_attempts: usize,
    retry_min_delay: Duration,
}

impl ClassifierBridge {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &ClassifierConfig) -> Self {
        Self {
            provider,
            completion: CompletionConfig {
                model: config.model.clone(),
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                timeout: config.timeout,
                json_response: true,
            },
            cache: VerdictCache::new(config.cache_entries, config.cache_ttl),
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            retry_attempts: config.retry_attempts,
            retry_min_delay: Duration::from_millis(500),
        }
    }

    /// Build the configured provider through `registry`.
    pub fn from_config(
        config: &ClassifierConfig,
        registry: &ProviderRegistry,
    ) -> Result<Self, ProviderError> {
        registry.validate(&config.provider, &config.provider_config)?;
        let provider = registry.create(&config.provider, &config.provider_config)?;
        Ok(Self::new(provider, config))
    }

    /// First retry delay; later ones back off exponentially.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_min_delay = delay;
        self
    }

    /// Classify `alt` for the image at `src`, charging `meter`.
    #[tracing::instrument(skip(self, meter), fields(provider = self.provider.name()))]
    pub async fn classify(
        &self,
        alt: &str,
        src: &str,
        meter: &UsageMeter,
    ) -> Result<ClassificationVerdict, ClassifyError> {
        let key = VerdictKey::new(alt, src);
        if let Some(verdict) = self.cache.get(&key).await {
            meter.record_cache_hit();
            return Ok(verdict);
        }

        let provider = self.provider.name().to_string();
        if self.breaker.is_open(&provider) {
            meter.record_failure();
            return Err(ClassifyError::Unavailable(format!(
                "circuit open for provider '{}'",
                provider
            )));
        }

        let messages = alt_text_messages(alt, src);
        let estimate = self
            .provider
            .estimate_tokens(&messages, self.completion.max_tokens);
        if !meter.reserve(estimate) {
            meter.record_failure();
            return Err(ClassifyError::Unavailable(format!(
                "token budget exhausted ({} remaining, ~{} needed)",
                meter.remaining_tokens(),
                estimate
            )));
        }

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry_min_delay)
            .with_max_times(self.retry_attempts)
            .with_jitter();

        let response = (|| async {
            self.provider
                .complete(messages.clone(), &self.completion)
                .await
        })
        .retry(backoff)
        .when(ProviderError::is_retryable)
        .notify(|err: &ProviderError, delay: Duration| {
            tracing::warn!(error = %err, retry_in = ?delay, "Classifier call failed, retrying");
        })
        .await;

        let response = match response {
            Ok(response) => {
                self.breaker.record_success(&provider);
                response
            }
            Err(e) => {
                self.breaker.record_failure(&provider);
                meter.release(estimate);
                meter.record_failure();
                tracing::warn!(error = %e, "Classifier call failed");
                return Err(ClassifyError::Unavailable(e.to_string()));
            }
        };

        meter.record_call(estimate, &response.usage);

        match parse_verdict(&response.content) {
            Ok(verdict) => {
                self.cache.insert(key, verdict.clone()).await;
                Ok(verdict)
            }
            Err(e) => {
                meter.record_failure();
                tracing::warn!(error = %e, "Classifier reply is not a valid verdict");
                Err(ClassifyError::Parse(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatMessage, CompletionResponse, TokenUsage};
    use async_trait::async_trait;
    use lumen_core::Verdict;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted replies in order.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<&str, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self
                .replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::HttpError("no scripted reply".into())));
            reply.map(|content| CompletionResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 20,
                },
                model: "scripted".to_string(),
                stop_reason: Some("stop".to_string()),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    const GOOD: &str = r#"{"verdict": "appropriate", "suggestedText": "A red bicycle"}"#;

    fn bridge(provider: Arc<ScriptedProvider>) -> ClassifierBridge {
        ClassifierBridge::new(provider, &ClassifierConfig::default())
            .with_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_verdict_is_cached() {
        let provider = ScriptedProvider::new(vec![Ok(GOOD)]);
        let bridge = bridge(provider.clone());
        let meter = UsageMeter::default();

        let first = bridge.classify("A red bicycle", "https://e.com/b.png", &meter).await.unwrap();
        let second = bridge.classify("A red bicycle", "https://e.com/b.png", &meter).await.unwrap();

        assert_eq!(first.verdict, Verdict::Appropriate);
        assert_eq!(first, second);
        assert_eq!(provider.calls(), 1);

        let usage = meter.snapshot();
        assert_eq!(usage.calls, 1);
        assert_eq!(usage.cache_hits, 1);
        assert_eq!(usage.input_tokens, 100);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::RateLimited { retry_after: None }),
            Ok(GOOD),
        ]);
        let bridge = bridge(provider.clone());

        let verdict = bridge.classify("bike", "https://e.com/b.png", &UsageMeter::default()).await;
        assert!(verdict.is_ok());
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::AuthError), Ok(GOOD)]);
        let bridge = bridge(provider.clone());
        let meter = UsageMeter::default();

        let err = bridge.classify("bike", "https://e.com/b.png", &meter).await.unwrap_err();
        assert_eq!(err.item_failure().kind, FailureKind::ClassifierUnavailable);
        assert_eq!(provider.calls(), 1);
        assert_eq!(meter.snapshot().failures, 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_parse_failure_and_not_cached() {
        let provider = ScriptedProvider::new(vec![Ok("Looks fine to me!"), Ok(GOOD)]);
        let bridge = bridge(provider.clone());
        let meter = UsageMeter::default();

        let err = bridge.classify("bike", "https://e.com/b.png", &meter).await.unwrap_err();
        assert_eq!(err.item_failure().kind, FailureKind::ClassificationParseFailure);

        // A later call reaches the provider again
        assert!(bridge.classify("bike", "https://e.com/b.png", &meter).await.is_ok());
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_budget_exhausted_skips_provider() {
        let provider = ScriptedProvider::new(vec![Ok(GOOD)]);
        let bridge = bridge(provider.clone());
        let meter = UsageMeter::new(Some(10));

        let err = bridge.classify("bike", "https://e.com/b.png", &meter).await.unwrap_err();
        assert!(matches!(err, ClassifyError::Unavailable(ref msg) if msg.contains("budget")));
        assert_eq!(provider.calls(), 0);
    }

    /// Answers after a delay so concurrent calls overlap in flight.
    struct SlowProvider {
        tokens: u32,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for SlowProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(CompletionResponse {
                content: GOOD.to_string(),
                usage: TokenUsage {
                    prompt_tokens: self.tokens,
                    completion_tokens: 0,
                },
                model: "slow".to_string(),
                stop_reason: None,
            })
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_budget() {
        let config = ClassifierConfig::default();
        let srcs: Vec<String> = (0..4).map(|i| format!("https://e.com/{}.png", i)).collect();
        let estimate = ScriptedProvider::new(vec![])
            .estimate_tokens(&alt_text_messages("bike", &srcs[0]), config.max_tokens);

        let provider = Arc::new(SlowProvider {
            tokens: estimate,
            calls: AtomicUsize::new(0),
        });
        let bridge = ClassifierBridge::new(provider.clone(), &config);
        let meter = UsageMeter::new(Some(estimate + estimate / 2));

        let results =
            futures::future::join_all(srcs.iter().map(|src| bridge.classify("bike", src, &meter)))
                .await;

        let granted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(granted, 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.to_string().contains("budget")));
        assert_eq!(meter.remaining_tokens(), estimate / 2);
    }

    #[tokio::test]
    async fn test_failed_call_returns_reservation() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::AuthError)]);
        let bridge = bridge(provider);
        let meter = UsageMeter::new(Some(5_000));

        assert!(bridge.classify("bike", "https://e.com/b.png", &meter).await.is_err());
        assert_eq!(meter.remaining_tokens(), 5_000);
    }

    #[tokio::test]
    async fn test_open_circuit_short_circuits() {
        let provider = ScriptedProvider::new(vec![]);
        let config = ClassifierConfig {
            retry_attempts: 0,
            ..Default::default()
        };
        let bridge = ClassifierBridge::new(provider.clone(), &config);
        let meter = UsageMeter::default();

        for i in 0..3 {
            let src = format!("https://e.com/{}.png", i);
            assert!(bridge.classify("x", &src, &meter).await.is_err());
        }
        assert_eq!(provider.calls(), 3);

        let err = bridge.classify("x", "https://e.com/9.png", &meter).await.unwrap_err();
        assert!(err.to_string().contains("circuit open"));
        assert_eq!(provider.calls(), 3);
    }
}
