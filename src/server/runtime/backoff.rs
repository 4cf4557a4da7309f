//! Retry timing for the listener when `accept()` fails.

use std::time::Duration;

const FLOOR: Duration = Duration::from_millis(1);

/// Exponential retry delays used by the accept loop.
///
/// A failed `accept()` (typically `EMFILE` when the process runs out of
/// descriptors) pauses the loop for `initial_delay`; each consecutive
/// failure doubles the pause up to `max_delay`. A successful accept resets
/// it. Defaults are 10 ms and 1 s.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Pause after the first failure in a row.
    pub initial_delay: Duration,
    /// Upper bound on the pause.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Raise both delays to at least 1 ms and order them.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use wshub::server::BackoffConfig;
    ///
    /// let backoff = BackoffConfig {
    ///     initial_delay: Duration::from_millis(200),
    ///     max_delay: Duration::ZERO,
    /// }
    /// .normalized();
    /// assert_eq!(backoff.initial_delay, Duration::from_millis(1));
    /// assert_eq!(backoff.max_delay, Duration::from_millis(200));
    /// ```
    #[must_use]
    pub fn normalized(self) -> Self {
        let a = self.initial_delay.max(FLOOR);
        let b = self.max_delay.max(FLOOR);
        Self {
            initial_delay: a.min(b),
            max_delay: a.max(b),
        }
    }

    /// Pause to use after `current` if the next accept fails too.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(5, 10)]
    #[case(600, 1000)]
    #[case(1000, 1000)]
    fn delay_doubles_up_to_cap(#[case] current_ms: u64, #[case] expected_ms: u64) {
        let backoff = BackoffConfig::default();
        assert_eq!(
            backoff.next_delay(Duration::from_millis(current_ms)),
            Duration::from_millis(expected_ms)
        );
    }

    #[test]
    fn ordered_config_is_unchanged() {
        let backoff = BackoffConfig::default();
        assert_eq!(backoff.normalized(), backoff);
    }
}
