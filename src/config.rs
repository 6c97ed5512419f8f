use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::concurrency::limiter::DEFAULT_CAPACITY;
use crate::concurrency::retry::{RetryPolicy, MAX_RETRY_DELAY};
use crate::pipeline::engine::{EngineSettings, DEFAULT_DEDUP_CAPACITY, DEFAULT_MODEL_TIMEOUT};
use crate::policy::rules::{FlaggingRules, RulesHandle};
use crate::queue::DEFAULT_WATCH_CAPACITY;

/// Central configuration loaded from environment variables.
///
/// Secrets come from env vars (never hardcoded). The .env file is loaded
/// automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON file with the flagging rules; built-in defaults when unset
    pub rules_path: Option<PathBuf>,
    /// Max items moderated at the same time
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
    /// Upper bound on a single moderation model call
    pub model_timeout: Duration,
    /// Base URL of the moderation model service (`check` command only)
    pub model_url: String,
    pub model_api_key: Option<String>,
    /// Content ids remembered to skip re-executing the same verdict
    pub dedup_capacity: usize,
    /// Flagged items watched for reports before the oldest is dropped
    pub watch_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Everything has a default except the model URL, which only the
    /// `check` command needs.
    pub fn load() -> Result<Self> {
        let defaults = RetryPolicy::default();

        let retry = RetryPolicy {
            max_attempts: parse_var("AUTOMOD_RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            initial_delay: Duration::from_millis(parse_var(
                "AUTOMOD_RETRY_INITIAL_DELAY_MS",
                defaults.initial_delay.as_millis() as u64,
            )?),
            multiplier: parse_var("AUTOMOD_RETRY_MULTIPLIER", defaults.multiplier)?,
            jitter_fraction: parse_var("AUTOMOD_RETRY_JITTER", defaults.jitter_fraction)?,
        };
        validate_retry(&retry)?;

        let max_concurrent = parse_var("AUTOMOD_MAX_CONCURRENT", DEFAULT_CAPACITY)?;
        if max_concurrent == 0 {
            anyhow::bail!("AUTOMOD_MAX_CONCURRENT must be at least 1");
        }

        let dedup_capacity = parse_var("AUTOMOD_DEDUP_CAPACITY", DEFAULT_DEDUP_CAPACITY)?;
        let watch_capacity = parse_var("AUTOMOD_WATCH_CAPACITY", DEFAULT_WATCH_CAPACITY)?;
        if dedup_capacity == 0 || watch_capacity == 0 {
            anyhow::bail!("AUTOMOD_DEDUP_CAPACITY and AUTOMOD_WATCH_CAPACITY must be at least 1");
        }

        Ok(Self {
            rules_path: env::var("AUTOMOD_RULES_PATH")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            max_concurrent,
            retry,
            model_timeout: Duration::from_secs(parse_var(
                "AUTOMOD_MODEL_TIMEOUT_SECS",
                DEFAULT_MODEL_TIMEOUT.as_secs(),
            )?),
            model_url: env::var("AUTOMOD_MODEL_URL").unwrap_or_default(),
            model_api_key: env::var("AUTOMOD_MODEL_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            dedup_capacity,
            watch_capacity,
        })
    }

    /// Check that the moderation model service is configured.
    /// Call this before any operation that talks to the live model.
    pub fn require_model(&self) -> Result<()> {
        if self.model_url.is_empty() {
            anyhow::bail!(
                "AUTOMOD_MODEL_URL not set. Add it to your .env file\n\
                 (the base URL of the moderation model service)."
            );
        }
        Ok(())
    }

    /// The rules to start with: the configured file, or the defaults.
    pub fn load_rules(&self) -> Result<RulesHandle> {
        let rules = match &self.rules_path {
            Some(path) => FlaggingRules::load(path)?,
            None => FlaggingRules::default(),
        };
        RulesHandle::new(rules)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_concurrent: self.max_concurrent,
            retry: self.retry.clone(),
            model_timeout: self.model_timeout,
            dedup_capacity: self.dedup_capacity,
            watch_capacity: self.watch_capacity,
        }
    }
}

/// Reject backoff settings that can't produce a sane delay series.
fn validate_retry(retry: &RetryPolicy) -> Result<()> {
    if retry.max_attempts == 0 {
        anyhow::bail!("AUTOMOD_RETRY_MAX_ATTEMPTS must be at least 1");
    }
    // NaN fails the range check too
    if !(0.0..=1.0).contains(&retry.jitter_fraction) {
        anyhow::bail!(
            "AUTOMOD_RETRY_JITTER must be between 0.0 and 1.0, got {}",
            retry.jitter_fraction
        );
    }
    if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
        anyhow::bail!(
            "AUTOMOD_RETRY_MULTIPLIER must be a finite number of at least 1.0, got {}",
            retry.multiplier
        );
    }
    if retry.initial_delay > MAX_RETRY_DELAY {
        anyhow::bail!(
            "AUTOMOD_RETRY_INITIAL_DELAY_MS must be at most {}ms",
            MAX_RETRY_DELAY.as_millis()
        );
    }
    Ok(())
}

/// Read and parse an env var, falling back to `default` when it's unset.
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value: {raw:?}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env vars are process-global, so each test uses names nothing else reads.

    #[test]
    fn test_parse_var_default_when_unset() {
        let value: u32 = parse_var("AUTOMOD_TEST_UNSET_VAR", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_parse_var_reads_value() {
        env::set_var("AUTOMOD_TEST_PARSE_OK", " 12 ");
        let value: usize = parse_var("AUTOMOD_TEST_PARSE_OK", 1).unwrap();
        assert_eq!(value, 12);
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        env::set_var("AUTOMOD_TEST_PARSE_BAD", "lots");
        let err = parse_var::<f64>("AUTOMOD_TEST_PARSE_BAD", 1.0).unwrap_err();
        assert!(err.to_string().contains("AUTOMOD_TEST_PARSE_BAD"));
    }

    #[test]
    fn test_validate_retry_accepts_defaults() {
        assert!(validate_retry(&RetryPolicy::default()).is_ok());
    }

    #[test]
    fn test_validate_retry_rejects_unbounded_multiplier() {
        for multiplier in [f64::INFINITY, f64::NAN, 0.5] {
            let retry = RetryPolicy {
                multiplier,
                ..RetryPolicy::default()
            };
            let err = validate_retry(&retry).unwrap_err();
            assert!(err.to_string().contains("AUTOMOD_RETRY_MULTIPLIER"));
        }
    }

    #[test]
    fn test_validate_retry_rejects_bad_jitter() {
        for jitter_fraction in [f64::NAN, 1.5, -0.1] {
            let retry = RetryPolicy {
                jitter_fraction,
                ..RetryPolicy::default()
            };
            assert!(validate_retry(&retry).is_err());
        }
    }

    #[test]
    fn test_require_model() {
        let mut config = Config {
            rules_path: None,
            max_concurrent: 5,
            retry: RetryPolicy::default(),
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            model_url: String::new(),
            model_api_key: None,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            watch_capacity: DEFAULT_WATCH_CAPACITY,
        };
        assert!(config.require_model().is_err());

        config.model_url = "http://localhost:8080".to_string();
        assert!(config.require_model().is_ok());
    }

    #[test]
    fn test_default_rules_when_no_path() {
        let config = Config {
            rules_path: None,
            max_concurrent: 5,
            retry: RetryPolicy::default(),
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            model_url: String::new(),
            model_api_key: None,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            watch_capacity: DEFAULT_WATCH_CAPACITY,
        };
        let handle = config.load_rules().unwrap();
        assert_eq!(*handle.snapshot(), FlaggingRules::default());
    }
}
