//! Readiness gate - polls cluster status until a condition holds
//!
//! The wait is bounded three ways: the condition's own timeout, an optional
//! caller deadline (the overall rollout budget), and a cancellation token.
//! A failed wait is returned as a typed error carrying the last observed
//! state; the gate itself never decides whether the rollout aborts.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::ReadinessCondition;
use crate::error::ReadinessError;
use crate::infrastructure::StatusSource;

const NOT_OBSERVED: &str = "not yet observed";

/// How long a successful wait took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    pub duration: Duration,
    pub polls: u32,
}

pub struct ReadinessGate {
    status: Arc<dyn StatusSource>,
    /// Upper bound on the delay after repeated status errors
    max_backoff: Duration,
}

impl ReadinessGate {
    pub fn new(status: Arc<dyn StatusSource>) -> Self {
        Self {
            status,
            max_backoff: Duration::from_secs(30),
        }
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Poll until `condition` holds.
    ///
    /// Polls immediately, then every `poll_interval`. Gives up at
    /// `min(timeout, deadline)`; the final sleep is shortened so the last poll
    /// lands on that limit, never past it by more than one interval. A status
    /// call that hangs is abandoned on the same bound.
    pub async fn wait_until_ready(
        &self,
        condition: &ReadinessCondition,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Elapsed, ReadinessError> {
        let selector = condition.selector.to_string();
        let start = Instant::now();
        let timeout_at = start + condition.timeout;
        let (limit, by_deadline) = match deadline {
            Some(d) if d < timeout_at => (d, true),
            _ => (timeout_at, false),
        };

        let mut polls: u32 = 0;
        let mut status_errors: u32 = 0;
        let mut last_state = NOT_OBSERVED.to_string();

        debug!(
            "Waiting for {} (timeout {}s, every {}s)",
            selector,
            condition.timeout.as_secs(),
            condition.poll_interval.as_secs_f64()
        );

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled(&selector, start, &last_state));
            }

            polls += 1;
            let call_limit = status_call_limit(limit, condition.poll_interval, by_deadline);
            let observed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(&selector, start, &last_state)),
                observed = self.status.get_status(&condition.selector) => observed,
                _ = tokio::time::sleep_until(call_limit) => {
                    warn!("Status check for {} still pending at the wait limit", selector);
                    return Err(expired(condition, selector, start, polls, last_state, by_deadline));
                }
            };

            let delay = match observed {
                Ok(state) => {
                    status_errors = 0;
                    if condition.expected.is_satisfied(&state) {
                        let duration = start.elapsed();
                        info!(
                            "✅ {} ready after {:.1}s ({} polls)",
                            selector,
                            duration.as_secs_f64(),
                            polls
                        );
                        return Ok(Elapsed { duration, polls });
                    }
                    debug!("{}: {}", selector, state);
                    last_state = state.to_string();
                    condition.poll_interval
                }
                Err(e) => {
                    status_errors += 1;
                    warn!("Status check for {} failed: {}", selector, e);
                    last_state = format!("status unavailable: {}", e);
                    backoff(condition.poll_interval, status_errors, self.max_backoff)
                }
            };

            let now = Instant::now();
            if now >= limit {
                return Err(expired(condition, selector, start, polls, last_state, by_deadline));
            }

            let sleep_for = delay.min(limit - now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(&selector, start, &last_state)),
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }
}

/// Latest instant a single status call may still be running.
///
/// A call started at the timeout limit gets one more poll interval; a caller
/// deadline is a hard cutoff.
fn status_call_limit(limit: Instant, interval: Duration, by_deadline: bool) -> Instant {
    if by_deadline {
        return limit;
    }
    limit.max(Instant::now() + interval).min(limit + interval)
}

/// The wait ran out of budget, either its own timeout or the caller's deadline
fn expired(
    condition: &ReadinessCondition,
    selector: String,
    start: Instant,
    polls: u32,
    last_state: String,
    by_deadline: bool,
) -> ReadinessError {
    if by_deadline {
        ReadinessError::DeadlineExceeded {
            selector,
            elapsed: start.elapsed(),
            last_state,
        }
    } else {
        ReadinessError::Timeout {
            selector,
            timeout: condition.timeout,
            polls,
            last_state,
        }
    }
}

fn cancelled(selector: &str, start: Instant, last_state: &str) -> ReadinessError {
    ReadinessError::Cancelled {
        selector: selector.to_string(),
        elapsed: start.elapsed(),
        last_state: last_state.to_string(),
    }
}

/// Delay after `errors` consecutive status failures: doubles from the poll interval.
fn backoff(interval: Duration, errors: u32, max: Duration) -> Duration {
    let factor = 1u32 << errors.min(16);
    interval.saturating_mul(factor).min(max.max(interval))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ObservedState, Selector};
    use crate::error::ClusterError;
    use crate::services::testing::ScriptedStatus;

    fn condition(timeout: u64, interval: u64) -> ReadinessCondition {
        ReadinessCondition::all_ready(
            Selector::new("shop").with_label("app", "mongo"),
            Duration::from_secs(timeout),
            Duration::from_secs(interval),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_n_polls() {
        let status = Arc::new(ScriptedStatus::ready_after(4));
        let gate = ReadinessGate::new(status.clone());

        let elapsed = gate
            .wait_until_ready(&condition(120, 3), &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(elapsed.polls, 5);
        assert_eq!(status.polls(), 5);
        assert!(elapsed.duration >= Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_poll_takes_no_time() {
        let gate = ReadinessGate::new(Arc::new(ScriptedStatus::always_ready()));
        let elapsed = gate
            .wait_until_ready(&condition(120, 3), &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(elapsed.polls, 1);
        assert_eq!(elapsed.duration, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_within_one_interval() {
        let gate = ReadinessGate::new(Arc::new(ScriptedStatus::never_ready()));
        let start = Instant::now();

        let err = gate
            .wait_until_ready(&condition(10, 3), &CancellationToken::new(), None)
            .await
            .unwrap_err();

        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(10));
        assert!(waited <= Duration::from_secs(13));
        match err {
            ReadinessError::Timeout {
                timeout,
                last_state,
                ..
            } => {
                assert_eq!(timeout, Duration::from_secs(10));
                assert!(last_state.contains("CrashLoopBackOff"));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_cuts_wait_short() {
        let gate = ReadinessGate::new(Arc::new(ScriptedStatus::never_ready()));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = gate
            .wait_until_ready(&condition(300, 5), &cancel, None)
            .await
            .unwrap_err();

        assert!(matches!(err, ReadinessError::Cancelled { .. }));
        assert!(start.elapsed() < Duration::from_secs(8));
        assert_eq!(err.last_state(), "0/1 ready (db-0: CrashLoopBackOff)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_deadline_beats_timeout() {
        let gate = ReadinessGate::new(Arc::new(ScriptedStatus::never_ready()));
        let deadline = Instant::now() + Duration::from_secs(4);

        let err = gate
            .wait_until_ready(&condition(300, 3), &CancellationToken::new(), Some(deadline))
            .await
            .unwrap_err();

        assert!(matches!(err, ReadinessError::DeadlineExceeded { .. }));
        assert!(Instant::now() >= deadline);
        assert!(Instant::now() < deadline + Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_errors_back_off_then_recover() {
        let status = Arc::new(ScriptedStatus::always_ready());
        for _ in 0..3 {
            status.push(Err(ClusterError::Api("connection refused".to_string())));
        }
        let gate = ReadinessGate::new(status.clone()).with_max_backoff(Duration::from_secs(5));
        let start = Instant::now();

        let elapsed = gate
            .wait_until_ready(&condition(120, 1), &CancellationToken::new(), None)
            .await
            .unwrap();

        // 2s + 4s + 5s (capped)
        assert_eq!(elapsed.polls, 4);
        assert_eq!(start.elapsed(), Duration::from_secs(11));
    }

    /// Status source whose calls take a minute to answer
    struct HangingStatus;

    #[async_trait::async_trait]
    impl StatusSource for HangingStatus {
        async fn get_status(&self, _selector: &Selector) -> Result<ObservedState, ClusterError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ObservedState::new(1, 0))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_status_call_still_times_out() {
        let gate = ReadinessGate::new(Arc::new(HangingStatus));
        let start = Instant::now();

        let err = gate
            .wait_until_ready(&condition(10, 3), &CancellationToken::new(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ReadinessError::Timeout { .. }));
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(err.last_state(), NOT_OBSERVED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_status_call_respects_deadline() {
        let gate = ReadinessGate::new(Arc::new(HangingStatus));
        let start = Instant::now();
        let deadline = start + Duration::from_secs(5);

        let err = gate
            .wait_until_ready(&condition(10, 3), &CancellationToken::new(), Some(deadline))
            .await
            .unwrap_err();

        assert!(matches!(err, ReadinessError::DeadlineExceeded { .. }));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_call_started_at_limit_gets_one_interval() {
        let now = Instant::now();
        let interval = Duration::from_secs(3);
        let limit = now + Duration::from_secs(10);
        assert_eq!(status_call_limit(limit, interval, false), limit);
        assert_eq!(status_call_limit(now, interval, false), now + interval);
        assert_eq!(status_call_limit(now, interval, true), now);
    }

    #[test]
    fn test_backoff_is_capped() {
        let interval = Duration::from_secs(2);
        assert_eq!(backoff(interval, 1, Duration::from_secs(30)), Duration::from_secs(4));
        assert_eq!(backoff(interval, 10, Duration::from_secs(30)), Duration::from_secs(30));
        assert_eq!(backoff(interval, 1, Duration::from_secs(1)), interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expected_state_minimum() {
        let status = Arc::new(ScriptedStatus::new(ObservedState::new(2, 2)));
        status.push(Ok(ObservedState::new(1, 1)));
        let gate = ReadinessGate::new(status);
        let mut cond = condition(60, 2);
        cond.expected = crate::domain::ExpectedState::AllReady { min_ready: 2 };

        let elapsed = gate
            .wait_until_ready(&cond, &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(elapsed.polls, 2);
    }
}
