//! Timing configuration for session token management.
//!
//! Centralizes the proactive refresh policy: how close to expiry a token
//! must be before it is renewed, how often the refresh timer wakes up, and how
//! many consecutive refresh failures are tolerated before a forced logout.

use std::time::Duration;

/// Token lifecycle timings for [`SessionManager`](crate::SessionManager).
///
/// # Examples
///
/// ```rust
/// use civic_link::SessionTimings;
/// use std::time::Duration;
///
/// // Use defaults (10 min threshold, 15 min timer, 3 retries)
/// let timings = SessionTimings::default();
///
/// // Tighter policy for short-lived tokens
/// let timings = SessionTimings::builder()
///     .refresh_threshold(Duration::from_secs(60))
///     .refresh_interval(Duration::from_secs(30))
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTimings {
    /// Remaining access-token lifetime below which a refresh is due.
    /// Default: 10 minutes
    pub refresh_threshold: Duration,

    /// Period of the proactive refresh timer.
    /// Default: 15 minutes
    pub refresh_interval: Duration,

    /// Consecutive refresh failures tolerated before a forced logout.
    /// Default: 3
    pub max_refresh_retries: u32,

    /// Timeout for individual auth HTTP requests.
    /// Default: 30 seconds
    pub request_timeout: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            refresh_threshold: Duration::from_secs(10 * 60),
            refresh_interval: Duration::from_secs(15 * 60),
            max_refresh_retries: 3,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionTimings {
    /// Create a new builder for custom timings.
    pub fn builder() -> SessionTimingsBuilder {
        SessionTimingsBuilder::new()
    }
}

/// Builder for [`SessionTimings`].
#[derive(Debug, Clone)]
pub struct SessionTimingsBuilder {
    timings: SessionTimings,
}

impl SessionTimingsBuilder {
    fn new() -> Self {
        Self {
            timings: SessionTimings::default(),
        }
    }

    /// Set the remaining-lifetime threshold for proactive refresh.
    pub fn refresh_threshold(mut self, threshold: Duration) -> Self {
        self.timings.refresh_threshold = threshold;
        self
    }

    /// Set the refresh timer period. Zero disables the timer.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.timings.refresh_interval = interval;
        self
    }

    /// Set how many consecutive refresh failures force a logout.
    pub fn max_refresh_retries(mut self, retries: u32) -> Self {
        self.timings.max_refresh_retries = retries.max(1);
        self
    }

    /// Set the per-request timeout for the auth endpoints.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timings.request_timeout = timeout;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> SessionTimings {
        self.timings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let timings = SessionTimings::default();
        assert_eq!(timings.refresh_threshold, Duration::from_secs(600));
        assert_eq!(timings.refresh_interval, Duration::from_secs(900));
        assert_eq!(timings.max_refresh_retries, 3);
    }

    #[test]
    fn test_builder() {
        let timings = SessionTimings::builder()
            .refresh_threshold(Duration::from_secs(5))
            .max_refresh_retries(0)
            .build();
        assert_eq!(timings.refresh_threshold, Duration::from_secs(5));
        assert_eq!(timings.max_refresh_retries, 1, "retries are clamped to at least one");
        assert_eq!(timings.refresh_interval, Duration::from_secs(900));
    }
}
