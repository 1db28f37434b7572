//! Post-deploy smoke load
//!
//! A handful of health-check calls against the freshly restarted target.
//! Only warms up observability; the report never fails a rollout.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::infrastructure::HealthProbe;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeSettings {
    pub url: String,
    pub requests: u32,
    pub interval: Duration,
}

impl SmokeSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            requests: 5,
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmokeReport {
    pub attempts: u32,
    pub successes: u32,
    pub errors: Vec<String>,
    pub cut_short: bool,
}

impl SmokeReport {
    pub fn is_healthy(&self) -> bool {
        self.attempts > 0 && self.successes == self.attempts && !self.cut_short
    }

    pub fn describe(&self) -> String {
        let mut text = format!("{}/{} health checks passed", self.successes, self.attempts);
        if let Some(first) = self.errors.first() {
            text.push_str(&format!(" (first error: {})", first));
        }
        if self.cut_short {
            text.push_str(", cancelled");
        }
        text
    }
}

pub struct SmokeTester {
    probe: Arc<dyn HealthProbe>,
    settings: SmokeSettings,
}

impl SmokeTester {
    pub fn new(probe: Arc<dyn HealthProbe>, settings: SmokeSettings) -> Self {
        Self { probe, settings }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> SmokeReport {
        let mut report = SmokeReport::default();

        for i in 0..self.settings.requests {
            if cancel.is_cancelled() {
                report.cut_short = true;
                break;
            }
            if i > 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        report.cut_short = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.settings.interval) => {}
                }
            }

            report.attempts += 1;
            match self.probe.check(&self.settings.url).await {
                Ok(response) => {
                    report.successes += 1;
                    info!(
                        "  GET {} -> {} in {}ms",
                        self.settings.url,
                        response.status,
                        response.latency.as_millis()
                    );
                }
                Err(e) => {
                    warn!("  GET {} failed: {}", self.settings.url, e);
                    report.errors.push(e);
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::StubProbe;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_five_requests_one_second_apart() {
        let probe = Arc::new(StubProbe::healthy());
        let tester = SmokeTester::new(probe.clone(), SmokeSettings::new("http://shop.local/"));
        let start = Instant::now();

        let report = tester.run(&CancellationToken::new()).await;

        assert_eq!(probe.calls(), 5);
        assert!(report.is_healthy());
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_reported_not_raised() {
        let tester = SmokeTester::new(
            Arc::new(StubProbe::unhealthy()),
            SmokeSettings::new("http://shop.local/"),
        );

        let report = tester.run(&CancellationToken::new()).await;

        assert_eq!(report.attempts, 5);
        assert_eq!(report.successes, 0);
        assert!(!report.is_healthy());
        assert!(report.describe().contains("503"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_between_requests() {
        let probe = Arc::new(StubProbe::healthy());
        let tester = SmokeTester::new(probe.clone(), SmokeSettings::new("http://shop.local/"));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let report = tester.run(&cancel).await;

        assert_eq!(probe.calls(), 2);
        assert_eq!(report.attempts, 2);
        assert!(report.cut_short);
        assert!(!report.is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_sends_nothing() {
        let probe = Arc::new(StubProbe::healthy());
        let tester = SmokeTester::new(probe.clone(), SmokeSettings::new("http://shop.local/"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = tester.run(&cancel).await;

        assert_eq!(probe.calls(), 0);
        assert_eq!(report.attempts, 0);
        assert!(report.cut_short);
        assert_eq!(report.describe(), "0/0 health checks passed, cancelled");
    }
}
