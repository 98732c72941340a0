//! Retry utilities with exponential backoff, cap, and jitter.
//!
//! Two policies use this: the per-message enqueue retry (bounded, driven
//! through `backon`) and the per-batch redelivery retry in the runner
//! (possibly unbounded, driven by `delay_for_attempt`).

use std::time::Duration;

use backon::ExponentialBuilder;
use serde::Deserialize;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Base delay for first retry (before jitter).
    pub base_delay: Duration,
    /// Maximum delay cap (before jitter).
    pub max_delay: Duration,
    /// Maximum number of retry attempts (0 = no retries, just initial attempt).
    /// `None` retries until success.
    pub max_retries: Option<u32>,
    /// Jitter factor: delay is multiplied by random value in [1-jitter, 1+jitter].
    /// Set to 0.0 for no jitter.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            max_retries: Some(5),
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    /// Retry policy for enqueueing a single dispatch message.
    ///
    /// - Base delay: 50ms
    /// - Max delay: 2s
    /// - Max retries: 5
    /// - Jitter: ±25%
    pub fn for_dispatch() -> Self {
        Self::default()
    }

    /// Retry policy for redelivering a hard-failed batch.
    ///
    /// - Base delay: 200ms
    /// - Max delay: 30s
    /// - Max retries: unbounded
    /// - Jitter: ±25%
    pub fn for_batches() -> Self {
        Self {
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            max_retries: None,
            jitter: 0.25,
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// Uses exponential backoff: delay = base * 2^attempt, capped at max_delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exponential_ms = base_ms.saturating_mul(1u64 << attempt.min(20));
        let capped_ms = exponential_ms.min(self.max_delay.as_millis() as u64);

        let jittered_ms = if self.jitter > 0.0 {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0) as u64;
            let hash = now.wrapping_mul(31).wrapping_add(attempt as u64 * 17);
            // -1.0 to 1.0
            let jitter_pct = ((hash % 1000) as f64 / 1000.0) * 2.0 - 1.0;
            (capped_ms as f64 * (1.0 + jitter_pct * self.jitter)) as u64
        } else {
            capped_ms
        };

        Duration::from_millis(jittered_ms)
    }

    /// Check if another retry attempt should be made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        match self.max_retries {
            Some(max) => attempt < max,
            None => true,
        }
    }

    /// Equivalent `backon` builder.
    pub fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay);
        let builder = match self.max_retries {
            Some(max) => builder.with_max_times(max as usize),
            None => builder.without_max_times(),
        };
        if self.jitter > 0.0 {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

/// Retry settings as written in configuration files.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: Option<u32>,
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetrySettings {
    fn from(config: &RetryConfig) -> Self {
        Self {
            base_delay_ms: config.base_delay.as_millis() as u64,
            max_delay_ms: config.max_delay.as_millis() as u64,
            max_retries: config.max_retries,
            jitter: config.jitter,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            max_retries: settings.max_retries,
            jitter: settings.jitter.clamp(0.0, 1.0),
        }
    }
}

/// Batch redelivery settings as written in configuration files.
///
/// Fields left out of a partial section fall back to
/// `RetryConfig::for_batches`, so an omitted `max_retries` means unbounded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchRetrySettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: Option<u32>,
    pub jitter: f64,
}

impl Default for BatchRetrySettings {
    fn default() -> Self {
        Self::from(&RetryConfig::for_batches())
    }
}

impl From<&RetryConfig> for BatchRetrySettings {
    fn from(config: &RetryConfig) -> Self {
        let settings = RetrySettings::from(config);
        Self {
            base_delay_ms: settings.base_delay_ms,
            max_delay_ms: settings.max_delay_ms,
            max_retries: settings.max_retries,
            jitter: settings.jitter,
        }
    }
}

impl From<&BatchRetrySettings> for RetryConfig {
    fn from(settings: &BatchRetrySettings) -> Self {
        Self::from(&RetrySettings {
            base_delay_ms: settings.base_delay_ms,
            max_delay_ms: settings.max_delay_ms,
            max_retries: settings.max_retries,
            jitter: settings.jitter,
        })
    }
}
