//! Infrastructure layer - external I/O adapters
//!
//! The rollout core only talks to the outside world through the traits
//! defined here. Concrete adapters:
//! - Kubernetes (kubectl apply + kube API status/restart/scale)
//! - Docker image builds (optionally inside minikube's daemon)
//! - Minikube local cluster lifecycle
//! - kubectl port-forward sessions
//! - HTTP health probes, direct or through the API server's service proxy
//! - Rollout audit log

pub mod cluster;
pub mod docker;
pub mod http_probe;
pub mod k8s;
pub mod minikube;
pub mod port_forward;
pub mod rollout_log;
pub mod service_proxy;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::domain::{ForwardExit, ForwardSpec, ObservedState, ResourceSpec, Selector};
use crate::error::{BuildError, ClusterError, ForwardError, LocalClusterError};

// Re-export commonly used types
pub use cluster::KubeCluster;
pub use docker::DockerBuilder;
pub use http_probe::HttpProbe;
pub use minikube::Minikube;
pub use port_forward::KubectlForwarder;
pub use rollout_log::RolloutLog;
pub use service_proxy::ServiceProxyProbe;

/// What an apply did to the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyChange {
    Created,
    Configured,
    Unchanged,
}

impl ApplyChange {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Cluster control plane mutations
#[async_trait]
pub trait ClusterControlPlane: Send + Sync {
    /// Idempotent apply; re-applying an unchanged resource reports `Unchanged`
    async fn apply_resource(&self, spec: &ResourceSpec) -> Result<ApplyChange, ClusterError>;

    async fn restart_deployment(&self, name: &str, namespace: &str) -> Result<(), ClusterError>;

    async fn scale_deployment(
        &self,
        name: &str,
        namespace: &str,
        replicas: u32,
    ) -> Result<(), ClusterError>;
}

/// Read-only cluster status, polled by the readiness gate
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn get_status(&self, selector: &Selector) -> Result<ObservedState, ClusterError>;
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub tag: String,
    pub duration: Duration,
}

/// Container build system
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn build_image(&self, tag: &str, context: &Path) -> Result<BuildOutput, BuildError>;
}

/// Local development cluster lifecycle
#[async_trait]
pub trait LocalCluster: Send + Sync {
    /// Start the cluster if needed and enable the given addons
    async fn ensure_running(&self, addons: &[String]) -> Result<(), LocalClusterError>;

    async fn enable_addon(&self, name: &str) -> Result<(), LocalClusterError>;

    async fn stop(&self) -> Result<(), LocalClusterError>;
}

/// A running forwarding process. Owned by exactly one manager session.
#[async_trait]
pub trait ForwardProcess: Send {
    /// Resolves when the process exits on its own
    async fn wait(&mut self) -> ForwardExit;

    /// Stop the process and reap it
    async fn terminate(&mut self) -> Result<(), String>;
}

/// Network forwarding primitive
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, spec: &ForwardSpec) -> Result<Box<dyn ForwardProcess>, ForwardError>;
}

#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: u16,
    pub latency: Duration,
}

/// Lightweight HTTP health check
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, url: &str) -> Result<ProbeResponse, String>;
}
