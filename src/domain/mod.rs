//! Domain layer - pure rollout logic
//!
//! This module contains business logic with no external I/O.
//! Types and functions here can be unit tested without mocking.

pub mod forward;
pub mod graph;
pub mod readiness;
pub mod resource;
pub mod rollout;
pub mod target;

// Re-export commonly used types
pub use forward::{ForwardExit, ForwardSession, ForwardSpec, ForwardStatus, SessionId};
pub use graph::ResourceGraph;
pub use readiness::{ExpectedState, ObservedState, ReadinessCondition, Selector};
pub use resource::{ResourceKind, ResourceSpec};
pub use rollout::{FailureReport, PhaseOutcome, RolloutPhase, RolloutRun, RolloutSummary};
pub use target::{DeploymentTarget, ReadinessProbe};
