//! Readiness domain types
//!
//! A `ReadinessCondition` is created per wait-point and discarded once the
//! wait resolves.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Namespaced label selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
}

impl Selector {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Builder: add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Kubernetes label selector string (`k=v,k2=v2`)
    pub fn label_selector(&self) -> String {
        self.labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.label_selector())
    }
}

/// Pod state observed through the status collaborator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedState {
    /// Pods matching the selector (terminating pods excluded)
    pub total: u32,
    /// Pods reporting ready
    pub ready: u32,
    /// Human-readable problems, e.g. `mongo-0: CrashLoopBackOff`
    pub problems: Vec<String>,
}

impl ObservedState {
    pub fn new(total: u32, ready: u32) -> Self {
        Self {
            total,
            ready,
            problems: Vec::new(),
        }
    }

    /// Builder: add a problem description
    pub fn with_problem(mut self, problem: impl Into<String>) -> Self {
        self.problems.push(problem.into());
        self
    }
}

impl fmt::Display for ObservedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total == 0 {
            write!(f, "no pods")?;
        } else {
            write!(f, "{}/{} ready", self.ready, self.total)?;
        }
        if !self.problems.is_empty() {
            write!(f, " ({})", self.problems.join("; "))?;
        }
        Ok(())
    }
}

/// State a selector must reach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedState {
    /// Every matching pod is ready and there are at least `min_ready` of them
    AllReady { min_ready: u32 },
    /// At least this many matching pods are ready, regardless of the rest
    ReadyAtLeast(u32),
}

impl ExpectedState {
    pub fn is_satisfied(&self, state: &ObservedState) -> bool {
        match *self {
            Self::AllReady { min_ready } => {
                state.total > 0 && state.ready == state.total && state.ready >= min_ready
            }
            Self::ReadyAtLeast(n) => state.ready >= n.max(1),
        }
    }
}

/// (selector, expected-state, timeout, poll-interval)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessCondition {
    pub selector: Selector,
    pub expected: ExpectedState,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl ReadinessCondition {
    pub fn new(
        selector: Selector,
        expected: ExpectedState,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            selector,
            expected,
            timeout,
            poll_interval,
        }
    }

    /// All matching pods ready, at least one
    pub fn all_ready(selector: Selector, timeout: Duration, poll_interval: Duration) -> Self {
        Self::new(
            selector,
            ExpectedState::AllReady { min_ready: 1 },
            timeout,
            poll_interval,
        )
    }
}
