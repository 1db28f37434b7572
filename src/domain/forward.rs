//! Port-forward session types

use chrono::{DateTime, Utc};
use std::fmt;

/// Opaque handle returned by the port-forward manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// local-port -> service:remote-port in a namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSpec {
    pub local_port: u16,
    pub service: String,
    pub remote_port: u16,
    pub namespace: String,
}

impl ForwardSpec {
    pub fn new(
        local_port: u16,
        service: impl Into<String>,
        remote_port: u16,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            local_port,
            service: service.into(),
            remote_port,
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for ForwardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "localhost:{} -> {}/svc/{}:{}",
            self.local_port, self.namespace, self.service, self.remote_port
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardStatus {
    Starting,
    Active,
    Stopped,
    Failed,
}

impl ForwardStatus {
    /// Starting and active sessions hold a local port
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Starting | Self::Active)
    }
}

/// How a forwarding process ended on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardExit {
    Clean,
    Failed(String),
}

/// Snapshot of a session tracked by the manager
#[derive(Debug, Clone)]
pub struct ForwardSession {
    pub id: SessionId,
    pub spec: ForwardSpec,
    pub status: ForwardStatus,
    pub started_at: DateTime<Utc>,
    pub error: Option<String>,
}
