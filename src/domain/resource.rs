//! Resource domain types
//!
//! A `ResourceSpec` names one deployable unit and the units it depends on.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::readiness::Selector;

/// Kinds of deployable units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Namespace,
    ConfigData,
    SecretData,
    /// Database-like service whose pods must be ready before dependents start
    StatefulService,
    /// Stateless application service
    StatelessService,
    IngressRule,
}

impl ResourceKind {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "namespace" | "ns" => Some(Self::Namespace),
            "config" | "config_data" | "configmap" => Some(Self::ConfigData),
            "secret" | "secret_data" => Some(Self::SecretData),
            "stateful_service" | "stateful" | "statefulset" => Some(Self::StatefulService),
            "stateless_service" | "stateless" | "deployment" => Some(Self::StatelessService),
            "ingress" | "ingress_rule" => Some(Self::IngressRule),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Namespace => "Namespace",
            Self::ConfigData => "ConfigData",
            Self::SecretData => "SecretData",
            Self::StatefulService => "StatefulService",
            Self::StatelessService => "StatelessService",
            Self::IngressRule => "IngressRule",
        }
    }

    /// Workloads run pods, so they have a readiness condition worth waiting on.
    pub fn is_workload(&self) -> bool {
        matches!(self, Self::StatefulService | Self::StatelessService)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One deployable unit
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    pub name: String,
    pub kind: ResourceKind,
    pub namespace: String,
    /// Names of resources that must be applied (and ready) first
    pub depends_on: Vec<String>,
    /// Manifest file handed to the cluster
    pub manifest: Option<PathBuf>,
    /// Pod labels for workloads; defaults to `app=<name>`
    pub labels: BTreeMap<String, String>,
    /// Overrides the dependency readiness timeout for this resource
    pub readiness_timeout: Option<Duration>,
}

impl ResourceSpec {
    pub fn new(kind: ResourceKind, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            namespace: namespace.into(),
            depends_on: Vec::new(),
            manifest: None,
            labels: BTreeMap::new(),
            readiness_timeout: None,
        }
    }

    /// A namespace resource. Its own namespace is itself.
    pub fn namespace(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ResourceKind::Namespace, name.clone(), name)
    }

    /// Builder: add dependencies
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Builder: set manifest path
    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest = Some(path.into());
        self
    }

    /// Builder: add a pod label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Builder: set readiness timeout
    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = Some(timeout);
        self
    }

    /// Selector matching this resource's pods
    pub fn selector(&self) -> Selector {
        if self.labels.is_empty() {
            Selector::new(&self.namespace).with_label("app", &self.name)
        } else {
            Selector {
                namespace: self.namespace.clone(),
                labels: self.labels.clone(),
            }
        }
    }
}
