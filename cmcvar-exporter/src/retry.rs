// CMCVAR Exporter - Prometheus exporter for CMC III sockets
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Retry logic for backend requests

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Retry strategy for operations
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RetryStrategy {
    /// No retries
    #[default]
    None,
    /// Fixed number of retries with constant delay
    #[allow(dead_code)]
    Fixed {
        /// Maximum number of retry attempts
        max_retries: u32,
        /// Delay between retries
        delay: Duration,
    },
    /// Exponential backoff
    ExponentialBackoff {
        /// Maximum number of retry attempts
        max_retries: u32,
        /// Initial delay
        initial_delay: Duration,
        /// Maximum delay
        max_delay: Duration,
        /// Multiplier for each attempt
        multiplier: f64,
    },
}

impl RetryStrategy {
    /// Calculate delay for a given attempt number (0-indexed)
    ///
    /// Returns None if no more retries should be attempted
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed { max_retries, delay } => (attempt < *max_retries).then_some(*delay),
            Self::ExponentialBackoff {
                max_retries,
                initial_delay,
                max_delay,
                multiplier,
            } => {
                if attempt >= *max_retries {
                    return None;
                }
                let delay_ms = initial_delay.as_millis() as f64 * multiplier.powi(attempt as i32);
                Some(Duration::from_millis(delay_ms as u64).min(*max_delay))
            }
        }
    }

    /// Get maximum number of retries
    pub fn max_retries(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Fixed { max_retries, .. } | Self::ExponentialBackoff { max_retries, .. } => {
                *max_retries
            }
        }
    }

    /// Create a fixed retry strategy
    #[allow(dead_code)]
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self::Fixed { max_retries, delay }
    }

    /// Create an exponential backoff strategy
    pub fn exponential(max_retries: u32, initial_delay: Duration) -> Self {
        Self::ExponentialBackoff {
            max_retries,
            initial_delay,
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Run `operation` until it succeeds, the strategy gives up, or it fails
/// with an error `retryable` rejects.
pub async fn with_retry<T, E, F, Fut, P>(
    strategy: &RetryStrategy,
    retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !retryable(&e) {
                    return Err(e);
                }
                match strategy.delay_for_attempt(attempt) {
                    Some(delay) => {
                        warn!(
                            "Attempt {}/{} failed: {}; retrying in {:?}",
                            attempt + 1,
                            strategy.max_retries() + 1,
                            e,
                            delay
                        );
                        sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                }
            }
        }
    }
}
