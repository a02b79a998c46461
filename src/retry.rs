//! Exponential backoff with jitter for calls that fail transiently.
//!
//! One [`RetryPolicy`] type is used for every outbound call that can hit a
//! rate limit or a flaky network: LLM text calls, image generation and image
//! uploads. Call sites differ only in the policy values they pass.
//!
//! # Backoff Strategy
//!
//! The delay before retry number `n` (zero-based) is:
//! ```text
//! delay = min(base_delay * backoff_factor^n, max_delay)
//! delay = delay + uniform(10%..30%) * delay     (when jitter is on)
//! ```
//!
//! Only errors whose [`Transient::is_transient`] returns `true` are retried.
//! When retries run out, the last error goes back to the caller, which
//! applies its own fallback.

use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Classifies an error as worth retrying.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Retry parameters for one class of call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Multiplier applied per retry.
    pub backoff_factor: f64,
    /// Upper bound on the computed delay (before jitter), in milliseconds.
    pub max_delay_ms: u64,
    /// Add 10-30% random jitter on top of each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }
}

/// Partial [`RetryPolicy`] read from a config file. Unset fields keep the
/// value of the preset it is laid over.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryOverrides {
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub max_delay_ms: Option<u64>,
    pub jitter: Option<bool>,
}

impl RetryOverrides {
    pub fn over(self, preset: RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(preset.max_retries),
            base_delay_ms: self.base_delay_ms.unwrap_or(preset.base_delay_ms),
            backoff_factor: self.backoff_factor.unwrap_or(preset.backoff_factor),
            max_delay_ms: self.max_delay_ms.unwrap_or(preset.max_delay_ms),
            jitter: self.jitter.unwrap_or(preset.jitter),
        }
    }
}

impl RetryPolicy {
    /// Policy used for LLM text and image calls.
    pub fn llm() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 2_000,
            backoff_factor: 2.0,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }

    /// Policy used for image uploads.
    pub fn upload() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry `attempt` (zero-based), without jitter.
    ///
    /// Non-decreasing in `attempt` and never above `max_delay_ms`.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let factor = if self.backoff_factor.is_finite() && self.backoff_factor >= 1.0 {
            self.backoff_factor
        } else {
            1.0
        };
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let ms = (self.base_delay_ms as f64) * factor.powi(exp);
        let capped = ms.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Delay before retry `attempt`, including jitter when enabled.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for(attempt);
        if !self.jitter {
            return delay;
        }
        let fraction: f64 = rng().random_range(0.1..=0.3);
        delay + delay.mul_f64(fraction)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// `op` receives the zero-based attempt number. `label` names the call
    /// site in log lines.
    pub async fn run<T, E, Op, Fut>(&self, label: &str, mut op: Op) -> Result<T, E>
    where
        E: Transient + Display,
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            let attempt_t0 = Instant::now();
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(label, attempt, "Retry succeeded");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !e.is_transient() {
                        warn!(label, attempt, error = %e, "Permanent error; not retrying");
                        return Err(e);
                    }
                    if attempt >= self.max_retries {
                        error!(
                            label,
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "Retries exhausted"
                        );
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        label,
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "Attempt failed; backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
