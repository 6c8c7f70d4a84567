//! Reconnect scheduling: exponential backoff with a ceiling.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Upper bound of the uniform random jitter added to each delay
    pub jitter_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay_ms: 3000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter_ms: 0,
        }
    }
}

/// Why a [`ReconnectConfig`] was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconnectConfigError {
    #[error("backoff multiplier must be finite and at least 1.0, got {0}")]
    Multiplier(f64),
    #[error("initial delay must be at least 1ms")]
    ZeroInitialDelay,
    #[error("initial delay {initial_ms}ms exceeds max delay {max_ms}ms")]
    InitialAboveMax { initial_ms: u64, max_ms: u64 },
}

impl ReconnectConfig {
    /// Check that delays are positive and never shrink between attempts.
    pub fn validate(&self) -> Result<(), ReconnectConfigError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ReconnectConfigError::Multiplier(self.backoff_multiplier));
        }
        if self.initial_delay_ms == 0 {
            return Err(ReconnectConfigError::ZeroInitialDelay);
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ReconnectConfigError::InitialAboveMax {
                initial_ms: self.initial_delay_ms,
                max_ms: self.max_delay_ms,
            });
        }
        Ok(())
    }

    /// Calculate delay for a given attempt number, without jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        // Past 2^64 the product saturates anyway.
        let exponent = attempt.min(64) as i32;
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        (delay as u64).min(self.max_delay_ms)
    }

    /// Whether `attempt` failures exhaust the configured budget.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Attempt counter driving [`ReconnectConfig::delay_for_attempt`].
///
/// Cloning shares the counter, so the owning connection loop and readers
/// observe the same value.
#[derive(Debug, Clone)]
pub struct RetryState {
    config: ReconnectConfig,
    attempt: Arc<AtomicU32>,
}

impl RetryState {
    /// An invalid `config` is replaced by the defaults.
    pub fn new(config: ReconnectConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                tracing::warn!("invalid reconnect config ({}), using defaults", e);
                ReconnectConfig::default()
            }
        };
        Self {
            config,
            attempt: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Failed attempts since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }

    /// Delay for the current attempt, then count the attempt.
    pub fn next_delay(&self) -> Duration {
        let attempt = self.attempt.load(Ordering::SeqCst);
        let mut delay_ms = self.config.delay_for_attempt(attempt);
        if self.config.jitter_ms > 0 {
            delay_ms += rand::thread_rng().gen_range(0..=self.config.jitter_ms);
        }
        self.attempt
            .store(attempt.saturating_add(1), Ordering::SeqCst);
        Duration::from_millis(delay_ms)
    }

    pub fn reset(&self) {
        self.attempt.store(0, Ordering::SeqCst);
    }
}
