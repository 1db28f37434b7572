//! Kubernetes API helpers: pod snapshots for readiness and diagnostics

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{ContainerStatus, Event, Pod};
use kube::{
    api::{Api, ListParams, LogParams},
    Client, Config,
};
use std::fmt;

use crate::domain::ObservedState;

/// Waiting/terminated reasons that will not fix themselves
const STUCK_REASONS: &[&str] = &[
    "CrashLoopBackOff",
    "ImagePullBackOff",
    "ErrImagePull",
    "CreateContainerConfigError",
    "CreateContainerError",
    "InvalidImageName",
    "RunContainerError",
];

/// Restarts at which a running container is reported as flapping
const RESTART_WARNING: i32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Waiting { reason: Option<String>, message: Option<String> },
    Terminated { reason: Option<String>, message: Option<String> },
    Unknown,
}

impl ContainerState {
    fn from_status(status: &ContainerStatus) -> Self {
        let Some(state) = status.state.as_ref() else {
            return Self::Unknown;
        };
        if state.running.is_some() {
            Self::Running
        } else if let Some(w) = &state.waiting {
            Self::Waiting {
                reason: w.reason.clone(),
                message: w.message.clone(),
            }
        } else if let Some(t) = &state.terminated {
            Self::Terminated {
                reason: t.reason.clone(),
                message: t.message.clone(),
            }
        } else {
            Self::Unknown
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Waiting { reason, .. } | Self::Terminated { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Waiting { message, .. } | Self::Terminated { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Running => "running",
            Self::Waiting { .. } => "waiting",
            Self::Terminated { .. } => "terminated",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// One pod as seen by the readiness gate. Only the first container counts.
#[derive(Debug, Clone)]
pub struct PodSnapshot {
    pub name: String,
    pub ready: bool,
    /// Deletion requested; the pod is on its way out
    pub terminating: bool,
    pub container: ContainerState,
    pub restarts: i32,
}

impl PodSnapshot {
    fn from_pod(pod: Pod) -> Self {
        let first = pod
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_ref())
            .and_then(|cs| cs.first());

        Self {
            name: pod.metadata.name.clone().unwrap_or_else(|| "unknown".to_string()),
            ready: first.map(|c| c.ready).unwrap_or(false),
            terminating: pod.metadata.deletion_timestamp.is_some(),
            container: first.map(ContainerState::from_status).unwrap_or(ContainerState::Unknown),
            restarts: first.map(|c| c.restart_count).unwrap_or(0),
        }
    }

    /// Short description of what is wrong with this pod, if anything
    pub fn problem(&self) -> Option<String> {
        if let Some(reason) = self.container.reason().filter(|r| STUCK_REASONS.contains(r)) {
            return Some(format!("{}: {}", self.name, reason));
        }
        (self.restarts >= RESTART_WARNING)
            .then(|| format!("{}: {} restarts", self.name, self.restarts))
    }
}

pub async fn create_client() -> Result<Client> {
    let config = Config::infer()
        .await
        .context("Failed to infer kubeconfig")?;

    Client::try_from(config).context("Failed to create Kubernetes client")
}

/// Pods matching `label_selector`, sorted by name
pub async fn list_pods(
    client: &Client,
    namespace: &str,
    label_selector: &str,
) -> Result<Vec<PodSnapshot>, kube::Error> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let list = pods.list(&ListParams::default().labels(label_selector)).await?;

    let mut snapshots: Vec<PodSnapshot> = list.into_iter().map(PodSnapshot::from_pod).collect();
    snapshots.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(snapshots)
}

/// Reduce pod snapshots to the readiness view. Terminating pods are ignored.
pub fn observed_state(pods: &[PodSnapshot]) -> ObservedState {
    let live = pods.iter().filter(|p| !p.terminating);
    let (total, ready) = live
        .clone()
        .fold((0u32, 0u32), |(t, r), p| (t + 1, r + u32::from(p.ready)));

    let mut state = ObservedState::new(total, ready);
    state.problems = live.filter_map(PodSnapshot::problem).collect();
    state
}

pub async fn pod_logs(client: &Client, namespace: &str, pod: &str, lines: i64) -> Result<String> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let params = LogParams {
        tail_lines: Some(lines),
        ..Default::default()
    };

    pods.logs(pod, &params)
        .await
        .with_context(|| format!("Failed to get logs for pod {}", pod))
}

/// Events involving `pod`, oldest first, formatted as `[HH:MM:SS] Reason: message`
pub async fn pod_events(client: &Client, namespace: &str, pod: &str) -> Result<Vec<String>> {
    let events: Api<Event> = Api::namespaced(client.clone(), namespace);
    let params = ListParams::default().fields(&format!("involvedObject.name={}", pod));

    let list = events
        .list(&params)
        .await
        .with_context(|| format!("Failed to get events for pod {}", pod))?;

    let mut timed: Vec<_> = list
        .into_iter()
        .filter_map(|e| {
            let at = e.last_timestamp.or(e.first_timestamp)?.0;
            Some((at, format!("{}: {}", e.reason?, e.message?)))
        })
        .collect();
    timed.sort_by_key(|(at, _)| *at);

    Ok(timed
        .into_iter()
        .map(|(at, line)| format!("[{}] {}", at.format("%H:%M:%S"), line))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting(name: &str, reason: &str, restarts: i32) -> PodSnapshot {
        PodSnapshot {
            name: name.to_string(),
            ready: false,
            terminating: false,
            container: ContainerState::Waiting {
                reason: Some(reason.to_string()),
                message: None,
            },
            restarts,
        }
    }

    fn running(name: &str, restarts: i32) -> PodSnapshot {
        PodSnapshot {
            name: name.to_string(),
            ready: true,
            terminating: false,
            container: ContainerState::Running,
            restarts,
        }
    }

    #[test]
    fn test_stuck_reasons_are_problems() {
        assert_eq!(
            waiting("db-0", "CrashLoopBackOff", 4).problem().as_deref(),
            Some("db-0: CrashLoopBackOff")
        );
        assert_eq!(waiting("db-0", "ContainerCreating", 0).problem(), None);
        assert_eq!(running("db-0", 0).problem(), None);
    }

    #[test]
    fn test_observed_state_ignores_terminating_pods() {
        let mut old = running("api-old", 0);
        old.terminating = true;
        let pods = vec![old, waiting("api-new", "ContainerCreating", 0)];

        let state = observed_state(&pods);
        assert_eq!(state.total, 1);
        assert_eq!(state.ready, 0);
        assert!(state.problems.is_empty());
    }

    #[test]
    fn test_observed_state_reports_problems() {
        let pods = vec![waiting("mongo-0", "ImagePullBackOff", 0), running("mongo-1", 5)];
        let state = observed_state(&pods);
        assert_eq!(
            state.to_string(),
            "1/2 ready (mongo-0: ImagePullBackOff; mongo-1: 5 restarts)"
        );
    }

    #[test]
    fn test_container_state_display() {
        assert_eq!(ContainerState::Running.to_string(), "running");
        assert_eq!(waiting("a", "ErrImagePull", 0).container.to_string(), "waiting");
        assert_eq!(ContainerState::Unknown.reason(), None);
    }
}
