//! Deployment target types
//!
//! The stateless service being rolled out. Immutable for the duration of a run.

use std::path::PathBuf;
use std::time::Duration;

use super::readiness::{ExpectedState, ReadinessCondition, Selector};

/// Readiness probe descriptor (path + port + interval + timeout)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessProbe {
    pub path: String,
    pub port: u16,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            port: 80,
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentTarget {
    /// Deployment name
    pub name: String,
    pub namespace: String,
    /// Image reference produced by the build step, e.g. `shop-api:dev`
    pub image: String,
    /// Directory handed to the image builder
    pub build_context: PathBuf,
    pub selector: Selector,
    /// Desired replicas. When set, the deployment is scaled before restart.
    pub replicas: Option<u32>,
    pub probe: ReadinessProbe,
}

impl DeploymentTarget {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let namespace = namespace.into();
        Self {
            selector: Selector::new(&namespace).with_label("app", &name),
            name,
            namespace,
            image: image.into(),
            build_context: PathBuf::from("."),
            replicas: None,
            probe: ReadinessProbe::default(),
        }
    }

    /// Builder: set build context
    pub fn with_build_context(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_context = dir.into();
        self
    }

    /// Builder: set replicas
    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = Some(replicas);
        self
    }

    /// Builder: set probe
    pub fn with_probe(mut self, probe: ReadinessProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Builder: set selector
    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    /// API server path reaching the probe endpoint through the service proxy.
    /// Assumes the service is named after the deployment.
    pub fn service_proxy_path(&self) -> String {
        let path = self.probe.path.trim_start_matches('/');
        format!(
            "/api/v1/namespaces/{}/services/{}:{}/proxy/{}",
            self.namespace, self.name, self.probe.port, path
        )
    }

    /// Condition gating the target after restart
    pub fn readiness_condition(&self) -> ReadinessCondition {
        ReadinessCondition::new(
            self.selector.clone(),
            ExpectedState::AllReady {
                min_ready: self.replicas.unwrap_or(1),
            },
            self.probe.timeout,
            self.probe.interval,
        )
    }
}
