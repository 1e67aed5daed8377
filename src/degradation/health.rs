//! Rolling health classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Coarse classification of the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Online,
    Degraded,
    Offline,
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Online => "online",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
        };
        f.write_str(label)
    }
}

/// Derived health snapshot, recomputed after every outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHealth {
    pub status: ServiceStatus,
    pub error_rate: f64,
    pub consecutive_failures: u32,
    pub last_checked: DateTime<Utc>,
}

impl ServiceHealth {
    pub fn online() -> Self {
        Self {
            status: ServiceStatus::Online,
            error_rate: 0.0,
            consecutive_failures: 0,
            last_checked: Utc::now(),
        }
    }
}

/// Outcomes observed within the trailing `span`
#[derive(Debug)]
pub(crate) struct HealthWindow {
    span: Duration,
    outcomes: VecDeque<(Instant, bool)>,
    consecutive_failures: u32,
}

impl HealthWindow {
    pub(crate) fn new(span: Duration) -> Self {
        Self {
            span,
            outcomes: VecDeque::new(),
            consecutive_failures: 0,
        }
    }

    pub(crate) fn record(&mut self, success: bool) {
        let now = Instant::now();
        self.outcomes.push_back((now, success));
        if success {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
        self.prune(now);
    }

    fn prune(&mut self, now: Instant) {
        while let Some((at, _)) = self.outcomes.front() {
            if now.duration_since(*at) > self.span {
                self.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    /// `errors / (errors + successes)` over the window; zero when empty
    pub(crate) fn error_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let errors = self.outcomes.iter().filter(|(_, ok)| !ok).count();
        errors as f64 / self.outcomes.len() as f64
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub(crate) fn clear(&mut self) {
        self.outcomes.clear();
        self.consecutive_failures = 0;
    }
}

/// Map an error rate onto a status
pub fn classify(error_rate: f64, degradation_threshold: f64, offline_threshold: f64) -> ServiceStatus {
    if error_rate >= offline_threshold {
        ServiceStatus::Offline
    } else if error_rate >= degradation_threshold {
        ServiceStatus::Degraded
    } else {
        ServiceStatus::Online
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[test]
    fn test_classification_boundaries_are_inclusive() {
        assert_eq!(classify(0.0, 0.3, 0.8), ServiceStatus::Online);
        assert_eq!(classify(0.29, 0.3, 0.8), ServiceStatus::Online);
        assert_eq!(classify(0.3, 0.3, 0.8), ServiceStatus::Degraded);
        assert_eq!(classify(0.8, 0.3, 0.8), ServiceStatus::Offline);
        assert_eq!(classify(1.0, 0.3, 0.8), ServiceStatus::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_forgets_old_outcomes() {
        let mut window = HealthWindow::new(Duration::from_secs(10));
        window.record(false);
        window.record(false);
        assert_eq!(window.error_rate(), 1.0);
        assert_eq!(window.consecutive_failures(), 2);

        advance(Duration::from_secs(11)).await;
        window.record(true);

        assert_eq!(window.error_rate(), 0.0);
        assert_eq!(window.consecutive_failures(), 0);
    }

    #[test]
    fn test_error_rate_mixes_outcomes() {
        let mut window = HealthWindow::new(Duration::from_secs(60));
        for success in [true, true, false, true] {
            window.record(success);
        }
        assert!((window.error_rate() - 0.25).abs() < f64::EPSILON);
    }
}
