//! Runtime configuration.
//!
//! Every field has a default, so an empty YAML document is a valid config.
//! Durations are written in human form (`"3s"`, `"500ms"`, `"1h"`).
//!
//! ```yaml
//! browser:
//!   webdriver_url: http://localhost:9515
//! session:
//!   pool_size: 2
//!   settle_delay: 3s
//! evaluators:
//!   enabled: [contrast, keyboard, alt_text]
//!   timeout: 60s
//! classifier:
//!   provider: openai
//!   model: gpt-4o-2024-08-06
//!   token_budget: 20000
//! ruleset:
//!   axe_script: vendor/axe.min.js
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use lumen_core::EvaluatorId;

use crate::resilience::CircuitBreakerConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Serde adapter for `humantime` durations.
pub(crate) mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub browser: BrowserConfig,
    pub session: SessionConfig,
    pub evaluators: EvaluatorsConfig,
    pub classifier: ClassifierConfig,
    pub ruleset: RulesetConfig,
}

impl RuntimeConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Reject values that would make an audit impossible to run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.pool_size == 0 {
            return Err(ConfigError::Invalid("session.pool_size must be at least 1".into()));
        }
        if self.classifier.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "classifier.concurrency must be at least 1".into(),
            ));
        }
        let url = &self.browser.webdriver_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "browser.webdriver_url must start with http:// or https://, got '{}'",
                url
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// W3C WebDriver endpoint (chromedriver, geckodriver, Selenium grid)
    pub webdriver_url: String,

    /// Browser command-line arguments
    pub args: Vec<String>,

    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            args: vec![
                "--headless=new".to_string(),
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
            window_width: 1920,
            window_height: 1080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum concurrent browser sessions
    pub pool_size: usize,

    /// Wait after navigation before evaluators start
    #[serde(with = "duration_human")]
    pub settle_delay: Duration,

    #[serde(with = "duration_human")]
    pub navigation_timeout: Duration,

    /// Bound on each DOM command and injected script
    #[serde(with = "duration_human")]
    pub script_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            settle_delay: Duration::from_secs(3),
            navigation_timeout: Duration::from_secs(3),
            script_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorsConfig {
    /// Evaluators run by a full audit
    pub enabled: Vec<EvaluatorId>,

    /// Per-evaluator run limit
    #[serde(with = "duration_human")]
    pub timeout: Duration,
}

impl Default for EvaluatorsConfig {
    fn default() -> Self {
        Self {
            enabled: EvaluatorId::ALL.to_vec(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// When false, every non-empty alt text is recorded as unavailable
    pub enabled: bool,

    /// Registered provider type (`openai`, `anthropic`)
    pub provider: String,

    /// Provider-specific settings (`api_key`, `base_url`)
    pub provider_config: JsonValue,

    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,

    #[serde(with = "duration_human")]
    pub timeout: Duration,

    /// Concurrent classifier calls per alt-text run
    pub concurrency: usize,

    /// Retries after the first attempt
    pub retry_attempts: usize,

    /// Tokens one audit may spend; `None` means unbounded
    pub token_budget: Option<u32>,

    pub cache_entries: u64,

    #[serde(with = "duration_human")]
    pub cache_ttl: Duration,

    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "openai".to_string(),
            provider_config: JsonValue::Object(Default::default()),
            model: "gpt-4o-2024-08-06".to_string(),
            max_tokens: 256,
            temperature: 1.0,
            timeout: Duration::from_secs(30),
            concurrency: 4,
            retry_attempts: 2,
            token_budget: None,
            cache_entries: 10_000,
            cache_ttl: Duration::from_secs(3600),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesetConfig {
    /// axe-core bundle injected before each run. Without it the page must
    /// already load axe itself.
    pub axe_script: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let config = RuntimeConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.session.settle_delay, Duration::from_secs(3));
        assert_eq!(config.session.script_timeout, Duration::from_secs(3));
        assert_eq!(config.evaluators.timeout, Duration::from_secs(60));
        assert_eq!(config.evaluators.enabled.len(), 8);
        assert_eq!(config.classifier.concurrency, 4);
        assert_eq!(config.classifier.retry_attempts, 2);
        assert!(config.ruleset.axe_script.is_none());
    }

    #[test]
    fn test_human_durations_and_partial_sections() {
        let yaml = r#"
session:
  pool_size: 4
  settle_delay: 500ms
evaluators:
  enabled: [contrast, alt_text]
  timeout: 2m
classifier:
  provider: anthropic
  provider_config:
    base_url: https://proxy.internal/v1
  token_budget: 5000
  circuit_breaker:
    failure_threshold: 5
    recovery_timeout: 10s
"#;
        let config = RuntimeConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.session.pool_size, 4);
        assert_eq!(config.session.settle_delay, Duration::from_millis(500));
        assert_eq!(config.session.navigation_timeout, Duration::from_secs(3));
        assert_eq!(
            config.evaluators.enabled,
            vec![EvaluatorId::Contrast, EvaluatorId::AltText]
        );
        assert_eq!(config.evaluators.timeout, Duration::from_secs(120));
        assert_eq!(config.classifier.provider, "anthropic");
        assert_eq!(
            config.classifier.provider_config["base_url"],
            "https://proxy.internal/v1"
        );
        assert_eq!(config.classifier.token_budget, Some(5000));
        assert_eq!(config.classifier.circuit_breaker.failure_threshold, 5);
        assert_eq!(
            config.classifier.circuit_breaker.recovery_timeout,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_unknown_evaluator_rejected() {
        let result = RuntimeConfig::from_yaml_str("evaluators:\n  enabled: [colour]\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let result = RuntimeConfig::from_yaml_str("session:\n  settle_delay: soon\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validation() {
        let result = RuntimeConfig::from_yaml_str("session:\n  pool_size: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = RuntimeConfig::from_yaml_str("browser:\n  webdriver_url: localhost:9515\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_round_trip_keeps_human_durations() {
        let yaml = serde_yaml::to_string(&RuntimeConfig::default()).unwrap();
        assert!(yaml.contains("settle_delay: 3s"));
        let back = RuntimeConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(back.classifier.cache_ttl, Duration::from_secs(3600));
    }
}
