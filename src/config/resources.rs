//! Declared resources and the deployment target.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// One entry of `resources:`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,

    /// namespace | config | secret | stateful | stateless | ingress
    pub kind: String,

    /// Target namespace. Ignored for namespace resources.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Manifest file, relative to the config file. Optional for namespaces.
    #[serde(default)]
    pub manifest: Option<PathBuf>,

    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Pod labels used to gate readiness. Defaults to `app=<name>`.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Overrides `readiness.dependency_timeout` for this resource
    #[serde(default, with = "super::duration::option")]
    pub readiness_timeout: Option<Duration>,
}

/// The `target:` section - the stateless service being rolled out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Deployment name
    pub name: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Image tag to build and roll out (e.g. "shop-app:dev")
    pub image: String,

    /// Build context, relative to the config file
    #[serde(default = "default_build_context")]
    pub build_context: PathBuf,

    #[serde(default)]
    pub replicas: Option<u32>,

    /// Selector labels. Defaults to `app=<name>`.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_path")]
    pub path: String,

    #[serde(default = "default_probe_port")]
    pub port: u16,

    #[serde(default = "default_probe_interval", with = "super::duration")]
    pub interval: Duration,

    #[serde(default = "default_probe_timeout", with = "super::duration")]
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            path: default_probe_path(),
            port: default_probe_port(),
            interval: default_probe_interval(),
            timeout: default_probe_timeout(),
        }
    }
}

pub(super) fn default_namespace() -> String {
    "default".to_string()
}

fn default_build_context() -> PathBuf {
    PathBuf::from(".")
}

fn default_probe_path() -> String {
    "/".to_string()
}

fn default_probe_port() -> u16 {
    80
}

fn default_probe_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(300)
}
