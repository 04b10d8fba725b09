use std::time::Duration;

use super::error::{PostgrestError, PostgrestResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry schedule applied to transient network failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound of the doubling delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Runtime configuration describing how to reach the PostgREST endpoint.
#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    pub base_url: String,
    pub service_key: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl PostgrestConfig {
    /// Construct a configuration from the project URL and service key.
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            service_key: service_key.into(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a configuration by reading the expected environment variables.
    ///
    /// `SUPABASE_REQUEST_TIMEOUT_MS` optionally overrides the request timeout.
    pub fn from_env() -> PostgrestResult<Self> {
        let base_url = std::env::var("SUPABASE_URL").map_err(|_| {
            PostgrestError::MissingEnvVar {
                var: "SUPABASE_URL",
            }
        })?;
        let service_key = std::env::var("SUPABASE_SERVICE_KEY").map_err(|_| {
            PostgrestError::MissingEnvVar {
                var: "SUPABASE_SERVICE_KEY",
            }
        })?;

        let mut config = Self::new(base_url, service_key);
        if let Some(ms) = std::env::var("SUPABASE_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
        {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        Ok(config)
    }

    /// Root of the REST API, e.g. `https://xyz.supabase.co/rest/v1`.
    pub fn rest_root(&self) -> String {
        let trimmed = self.base_url.trim_end_matches('/');
        if trimmed.ends_with("/rest/v1") {
            trimmed.to_string()
        } else {
            format!("{trimmed}/rest/v1")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(2), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(1600));
        assert_eq!(policy.delay_after(5), Duration::from_secs(2));
        assert_eq!(policy.delay_after(40), Duration::from_secs(2));
    }

    #[test]
    fn rest_root_is_appended_once() {
        let config = PostgrestConfig::new("https://abc.supabase.co/", "key");
        assert_eq!(config.rest_root(), "https://abc.supabase.co/rest/v1");
        let config = PostgrestConfig::new("http://localhost:3000/rest/v1", "key");
        assert_eq!(config.rest_root(), "http://localhost:3000/rest/v1");
    }
}
