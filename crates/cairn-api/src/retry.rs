//! Retry with exponential backoff for model requests.

use cairn_types::ApiError;
use rand::Rng;

/// Configuration for retry behavior on transient API errors.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Initial delay in milliseconds before the first retry.
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds between retries.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Returns `true` if the error is transient and the request should be retried.
pub fn is_retryable(error: &ApiError) -> bool {
    matches!(
        error,
        ApiError::RateLimited { .. }
            | ApiError::Overloaded
            | ApiError::Server { .. }
            | ApiError::Network(_)
            | ApiError::Timeout
    )
}

/// Delay in milliseconds before retrying after `attempt` (0-based).
///
/// A server-provided `retry_after_ms` wins, clamped to `max_delay_ms`.
/// Otherwise `initial_delay_ms * backoff_factor^attempt` with ±25% jitter.
pub fn calculate_delay(config: &RetryConfig, attempt: u32, retry_after_ms: Option<u64>) -> u64 {
    if let Some(server_delay) = retry_after_ms {
        return server_delay.min(config.max_delay_ms);
    }

    let base = config.initial_delay_ms as f64 * config.backoff_factor.powi(attempt as i32);
    let clamped = base.min(config.max_delay_ms as f64);

    let jitter_factor = rand::rng().random_range(0.75..=1.25);
    ((clamped * jitter_factor) as u64).min(config.max_delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.initial_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 60_000);
        assert_eq!(RetryConfig::none().max_retries, 0);
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(is_retryable(&ApiError::RateLimited {
            retry_after_ms: None
        }));
        assert!(is_retryable(&ApiError::Overloaded));
        assert!(is_retryable(&ApiError::Server {
            status: 502,
            message: "bad gateway".into(),
        }));
        assert!(is_retryable(&ApiError::Network("reset".into())));
        assert!(is_retryable(&ApiError::Timeout));
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(!is_retryable(&ApiError::Auth {
            message: "invalid key".into(),
        }));
        assert!(!is_retryable(&ApiError::BadRequest {
            message: "bad input".into(),
        }));
        assert!(!is_retryable(&ApiError::InvalidResponse("junk".into())));
    }

    #[test]
    fn delay_grows_exponentially_with_jitter() {
        let config = RetryConfig {
            max_retries: 5,
            ..RetryConfig::default()
        };
        let d0 = calculate_delay(&config, 0, None);
        assert!((750..=1250).contains(&d0), "d0={d0}");
        let d2 = calculate_delay(&config, 2, None);
        assert!((3000..=5000).contains(&d2), "d2={d2}");
    }

    #[test]
    fn retry_after_wins_but_is_capped() {
        let config = RetryConfig {
            max_delay_ms: 10_000,
            ..RetryConfig::default()
        };
        assert_eq!(calculate_delay(&config, 0, Some(5000)), 5000);
        assert_eq!(calculate_delay(&config, 0, Some(30_000)), 10_000);
    }

    #[test]
    fn delay_never_exceeds_cap() {
        let config = RetryConfig {
            max_retries: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_factor: 10.0,
        };
        assert!(calculate_delay(&config, 5, None) <= 5000);
    }
}
