use std::time::Duration;

/// Backoff applied between transport reconnect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (1-based), or `None` once attempts are exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        if let Some(max_attempts) = self.max_attempts {
            if attempt > max_attempts {
                return None;
            }
        }

        let factor = self.multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
        let delay_ms = (self.initial_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        Some(Duration::from_millis(delay_ms as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backoff_doubles_until_cap() {
        let policy = ReconnectPolicy::default();

        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for(5), Some(Duration::from_millis(1600)));
        assert_eq!(policy.delay_for(6), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for(60), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_attempts_exhausted() {
        let policy = ReconnectPolicy {
            max_attempts: Some(3),
            ..Default::default()
        };

        assert!(policy.delay_for(3).is_some());
        assert_eq!(policy.delay_for(4), None);
    }

    #[test]
    fn test_multiplier_below_one_does_not_shrink() {
        let policy = ReconnectPolicy {
            multiplier: 0.5,
            ..Default::default()
        };

        assert_eq!(policy.delay_for(4), Some(Duration::from_millis(100)));
    }
}
