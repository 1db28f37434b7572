//! Runtime behaviour: readiness polling, smoke test, forwards, local cluster
//! and rollout bookkeeping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// The `readiness:` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Wait for infrastructure workloads (databases etc.)
    #[serde(default = "default_dependency_timeout", with = "super::duration")]
    pub dependency_timeout: Duration,

    #[serde(default = "default_poll_interval", with = "super::duration")]
    pub poll_interval: Duration,

    /// Cap on the delay between polls after repeated status errors
    #[serde(default = "default_max_backoff", with = "super::duration")]
    pub max_backoff: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            dependency_timeout: default_dependency_timeout(),
            poll_interval: default_poll_interval(),
            max_backoff: default_max_backoff(),
        }
    }
}

/// The `smoke:` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmokeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// URL hit after the target is ready (ingress host or forwarded port)
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_smoke_requests")]
    pub requests: u32,

    #[serde(default = "default_smoke_interval", with = "super::duration")]
    pub interval: Duration,

    /// Per-request timeout
    #[serde(default = "default_smoke_timeout", with = "super::duration")]
    pub timeout: Duration,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            requests: default_smoke_requests(),
            interval: default_smoke_interval(),
            timeout: default_smoke_timeout(),
        }
    }
}

/// One entry of `forwards:`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardConfig {
    pub local_port: u16,
    pub service: String,
    pub remote_port: u16,
    /// Defaults to the target's namespace
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Pods to wait on after enabling an addon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonReadiness {
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
}

/// The `local_cluster:` section (dev-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalClusterConfig {
    /// Build images inside the local cluster's docker daemon
    #[serde(default = "default_true")]
    pub docker_env: bool,

    /// Minikube profile (`-p`)
    #[serde(default)]
    pub profile: Option<String>,

    #[serde(default = "default_addons")]
    pub addons: Vec<String>,

    #[serde(default = "default_addon_timeout", with = "super::duration")]
    pub addon_timeout: Duration,

    /// Readiness selector per addon; addons without one are not waited on
    #[serde(default = "default_addon_readiness")]
    pub addon_readiness: BTreeMap<String, AddonReadiness>,
}

impl Default for LocalClusterConfig {
    fn default() -> Self {
        Self {
            docker_env: true,
            profile: None,
            addons: default_addons(),
            addon_timeout: default_addon_timeout(),
            addon_readiness: default_addon_readiness(),
        }
    }
}

/// The `rollout:` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutConfig {
    /// Budget for the whole rollout
    #[serde(default, with = "super::duration::option")]
    pub deadline: Option<Duration>,

    /// Append one JSON summary per run here
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Written by `deploy --forward`, read by `stop`
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    #[serde(default = "default_forward_startup_timeout", with = "super::duration")]
    pub forward_startup_timeout: Duration,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            deadline: None,
            log_path: None,
            pid_file: default_pid_file(),
            forward_startup_timeout: default_forward_startup_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_dependency_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_smoke_requests() -> u32 {
    5
}

fn default_smoke_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_smoke_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_addons() -> Vec<String> {
    vec!["ingress".to_string()]
}

fn default_addon_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_addon_readiness() -> BTreeMap<String, AddonReadiness> {
    let mut readiness = BTreeMap::new();
    readiness.insert(
        "ingress".to_string(),
        AddonReadiness {
            namespace: "ingress-nginx".to_string(),
            labels: BTreeMap::from([(
                "app.kubernetes.io/component".to_string(),
                "controller".to_string(),
            )]),
        },
    );
    readiness
}

fn default_pid_file() -> PathBuf {
    PathBuf::from(".shipyard/forward.pid")
}

fn default_forward_startup_timeout() -> Duration {
    Duration::from_secs(10)
}
