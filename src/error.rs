//! Centralized error types for shipyard
//!
//! Uses thiserror for typed errors that the rollout controller can match on,
//! while still being compatible with anyhow for propagation at the CLI layer.

use std::time::Duration;
use thiserror::Error;

use crate::domain::resource::ResourceKind;
use crate::domain::rollout::RolloutPhase;

/// Top-level error for a rollout run. Only the controller produces these.
#[derive(Error, Debug, Clone)]
pub enum RolloutError {
    #[error("Invalid resource graph: {0}")]
    InvalidGraph(#[from] GraphError),

    #[error("Apply failed in tier {tier}: {}", summarize_failures(.failures))]
    ApplyFailed {
        tier: usize,
        failures: Vec<ApplyError>,
    },

    #[error("Dependency '{resource}' (tier {tier}) not ready: {source}")]
    DependencyNotReady {
        tier: usize,
        resource: String,
        #[source]
        source: ReadinessError,
    },

    #[error("Image build failed: {0}")]
    BuildFailed(#[from] BuildError),

    #[error("Restart of deployment '{target}' failed: {source}")]
    RestartFailed {
        target: String,
        #[source]
        source: ClusterError,
    },

    #[error("Deployment '{target}' not ready: {source}")]
    TargetNotReady {
        target: String,
        #[source]
        source: ReadinessError,
    },

    #[error("Rollout cancelled during {phase}")]
    Cancelled { phase: RolloutPhase },
}

fn format_duration(duration: &Duration) -> String {
    humantime::format_duration(*duration).to_string()
}

fn summarize_failures(failures: &[ApplyError]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl RolloutError {
    /// Phase in which the rollout stopped.
    pub fn phase(&self) -> RolloutPhase {
        match self {
            Self::InvalidGraph(_) => RolloutPhase::Idle,
            Self::ApplyFailed { .. } => RolloutPhase::Applying,
            Self::DependencyNotReady { .. } => RolloutPhase::AwaitingDependencies,
            Self::BuildFailed(_) => RolloutPhase::Building,
            Self::RestartFailed { .. } => RolloutPhase::Restarting,
            Self::TargetNotReady { .. } => RolloutPhase::AwaitingTarget,
            Self::Cancelled { phase } => *phase,
        }
    }

    /// Resource or deployment the failure is about.
    pub fn subject(&self) -> Option<String> {
        match self {
            Self::InvalidGraph(_) | Self::Cancelled { .. } => None,
            Self::ApplyFailed { failures, .. } => Some(
                failures
                    .iter()
                    .map(|f| f.resource.clone())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            Self::DependencyNotReady { resource, .. } => Some(resource.clone()),
            Self::BuildFailed(BuildError::Failed { tag, .. })
            | Self::BuildFailed(BuildError::Spawn { tag, .. }) => Some(tag.clone()),
            Self::BuildFailed(BuildError::Environment { .. }) => None,
            Self::RestartFailed { target, .. } | Self::TargetNotReady { target, .. } => {
                Some(target.clone())
            }
        }
    }

    /// Last state observed before giving up, when the failure came from a wait.
    pub fn last_state(&self) -> Option<String> {
        match self {
            Self::DependencyNotReady { source, .. } | Self::TargetNotReady { source, .. } => {
                Some(source.last_state().to_string())
            }
            _ => None,
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidGraph(_) => 2,
            Self::ApplyFailed { .. } => 10,
            Self::DependencyNotReady { source, .. } => match source {
                ReadinessError::Timeout { .. } => 11,
                _ => 15,
            },
            Self::BuildFailed(_) => 12,
            Self::RestartFailed { .. } => 13,
            Self::TargetNotReady { source, .. } => match source {
                ReadinessError::Timeout { .. } => 14,
                _ => 15,
            },
            Self::Cancelled { .. } => 15,
        }
    }
}

/// Resource graph construction errors. These are caller bugs and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Resource '{name}' is declared more than once")]
    DuplicateResource { name: String },

    #[error("Cyclic dependency between: {}", .members.join(", "))]
    CyclicDependency { members: Vec<String> },

    #[error("Resource '{resource}' depends on unknown resource '{dependency}'")]
    UnknownDependency {
        resource: String,
        dependency: String,
    },

    #[error("Namespace '{name}' cannot declare dependencies")]
    NamespaceWithDependencies { name: String },
}

/// Failure reported by the cluster control plane
#[derive(Error, Debug, Clone)]
pub enum ClusterError {
    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to run {command}: {message}")]
    Spawn { command: String, message: String },

    #[error("{command} did not accept its input: {message}")]
    Stdin { command: String, message: String },

    #[error("Kubernetes API error: {0}")]
    Api(String),

    #[error("{kind} '{name}' has no manifest to apply")]
    MissingManifest { kind: ResourceKind, name: String },
}

/// A single resource the cluster rejected
#[derive(Error, Debug, Clone)]
#[error("{kind} '{resource}' in namespace '{namespace}': {cause}")]
pub struct ApplyError {
    pub resource: String,
    pub kind: ResourceKind,
    pub namespace: String,
    pub cause: ClusterError,
}

/// Readiness wait failures. Never fatal on their own; the caller decides.
#[derive(Error, Debug, Clone)]
pub enum ReadinessError {
    #[error(
        "{selector} not ready after {} ({polls} polls); last observed: {last_state}",
        format_duration(.timeout)
    )]
    Timeout {
        selector: String,
        timeout: Duration,
        polls: u32,
        last_state: String,
    },

    #[error(
        "wait for {selector} cancelled after {}; last observed: {last_state}",
        format_duration(.elapsed)
    )]
    Cancelled {
        selector: String,
        elapsed: Duration,
        last_state: String,
    },

    #[error(
        "overall deadline reached while waiting for {selector} ({} elapsed); last observed: {last_state}",
        format_duration(.elapsed)
    )]
    DeadlineExceeded {
        selector: String,
        elapsed: Duration,
        last_state: String,
    },
}

impl ReadinessError {
    pub fn last_state(&self) -> &str {
        match self {
            Self::Timeout { last_state, .. }
            | Self::Cancelled { last_state, .. }
            | Self::DeadlineExceeded { last_state, .. } => last_state,
        }
    }
}

/// Container image build errors
#[derive(Error, Debug, Clone)]
pub enum BuildError {
    #[error("Build of {tag} failed: {message}")]
    Failed { tag: String, message: String },

    #[error("Failed to start build of {tag}: {message}")]
    Spawn { tag: String, message: String },

    #[error("Could not prepare build environment: {message}")]
    Environment { message: String },
}

/// Port-forward session errors. Isolated to the session they belong to.
#[derive(Error, Debug, Clone)]
pub enum ForwardError {
    #[error("Forward {local_port} -> {service}:{remote_port} failed to start: {message}")]
    StartFailed {
        local_port: u16,
        service: String,
        remote_port: u16,
        message: String,
    },

    #[error("Failed to terminate forward session {session}: {message}")]
    Terminate { session: u64, message: String },

    #[error("Unknown forward session {session}")]
    UnknownSession { session: u64 },

    #[error("Forward session {session} was stopped while starting")]
    StoppedWhileStarting { session: u64 },
}

/// Local development cluster errors
#[derive(Error, Debug, Clone)]
pub enum LocalClusterError {
    #[error("{command} failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Addon {addon} not ready: {source}")]
    AddonNotReady {
        addon: String,
        #[source]
        source: ReadinessError,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to parse config {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("Invalid configuration:\n  {}", .problems.join("\n  "))]
    Invalid { problems: Vec<String> },
}
