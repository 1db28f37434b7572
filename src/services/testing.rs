//! In-memory collaborators for service tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::domain::{ForwardExit, ForwardSpec, ObservedState, ResourceSpec, Selector};
use crate::error::{BuildError, ClusterError, ForwardError};
use crate::infrastructure::{
    ApplyChange, BuildOutput, ClusterControlPlane, ForwardProcess, Forwarder, HealthProbe,
    ImageBuilder, ProbeResponse, StatusSource,
};

/// Remembers what was applied; a second apply of the same name is a no-op.
#[derive(Default)]
pub struct StubCluster {
    state: Mutex<HashSet<String>>,
    applied: Mutex<Vec<String>>,
    rejected: HashSet<String>,
    restarts: Mutex<Vec<String>>,
    scales: Mutex<Vec<(String, u32)>>,
    fail_restart: bool,
}

impl StubCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(mut self, name: &str) -> Self {
        self.rejected.insert(name.to_string());
        self
    }

    pub fn failing_restart(mut self) -> Self {
        self.fail_restart = true;
        self
    }

    /// Names passed to a successful apply, in call order
    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().clone()
    }

    pub fn restarts(&self) -> Vec<String> {
        self.restarts.lock().clone()
    }

    pub fn scales(&self) -> Vec<(String, u32)> {
        self.scales.lock().clone()
    }
}

#[async_trait]
impl ClusterControlPlane for StubCluster {
    async fn apply_resource(&self, spec: &ResourceSpec) -> Result<ApplyChange, ClusterError> {
        if self.rejected.contains(&spec.name) {
            return Err(ClusterError::CommandFailed {
                command: "kubectl apply".to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("admission webhook denied {}", spec.name),
            });
        }
        self.applied.lock().push(spec.name.clone());
        if self.state.lock().insert(spec.name.clone()) {
            Ok(ApplyChange::Created)
        } else {
            Ok(ApplyChange::Unchanged)
        }
    }

    async fn restart_deployment(&self, name: &str, _namespace: &str) -> Result<(), ClusterError> {
        if self.fail_restart {
            return Err(ClusterError::Api(format!("deployments.apps \"{}\" not found", name)));
        }
        self.restarts.lock().push(name.to_string());
        Ok(())
    }

    async fn scale_deployment(
        &self,
        name: &str,
        _namespace: &str,
        replicas: u32,
    ) -> Result<(), ClusterError> {
        self.scales.lock().push((name.to_string(), replicas));
        Ok(())
    }
}

/// Replays scripted responses, then repeats the fallback forever
pub struct ScriptedStatus {
    script: Mutex<VecDeque<Result<ObservedState, ClusterError>>>,
    fallback: ObservedState,
    polls: AtomicU32,
}

impl ScriptedStatus {
    pub fn new(fallback: ObservedState) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            polls: AtomicU32::new(0),
        }
    }

    pub fn always_ready() -> Self {
        Self::new(ObservedState::new(1, 1))
    }

    pub fn never_ready() -> Self {
        Self::new(ObservedState::new(1, 0).with_problem("db-0: CrashLoopBackOff"))
    }

    /// `n` not-ready answers, then ready
    pub fn ready_after(n: usize) -> Self {
        let status = Self::always_ready();
        for _ in 0..n {
            status.push(Ok(ObservedState::new(1, 0)));
        }
        status
    }

    pub fn push(&self, response: Result<ObservedState, ClusterError>) {
        self.script.lock().push_back(response);
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusSource for ScriptedStatus {
    async fn get_status(&self, _selector: &Selector) -> Result<ObservedState, ClusterError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

#[derive(Default)]
pub struct StubBuilder {
    fail: bool,
    builds: Mutex<Vec<String>>,
}

impl StubBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn builds(&self) -> Vec<String> {
        self.builds.lock().clone()
    }
}

#[async_trait]
impl ImageBuilder for StubBuilder {
    async fn build_image(&self, tag: &str, _context: &Path) -> Result<BuildOutput, BuildError> {
        self.builds.lock().push(tag.to_string());
        if self.fail {
            return Err(BuildError::Failed {
                tag: tag.to_string(),
                message: "COPY failed: file not found".to_string(),
            });
        }
        Ok(BuildOutput {
            tag: tag.to_string(),
            duration: Duration::from_secs(1),
        })
    }
}

/// Health probe answering with a fixed result
pub struct StubProbe {
    healthy: bool,
    calls: AtomicU32,
}

impl StubProbe {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            calls: AtomicU32::new(0),
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for StubProbe {
    async fn check(&self, _url: &str) -> Result<ProbeResponse, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy {
            Ok(ProbeResponse {
                status: 200,
                latency: Duration::from_millis(4),
            })
        } else {
            Err("status 503 Service Unavailable".to_string())
        }
    }
}

/// Forwarder whose processes run until told to crash or terminated
#[derive(Default)]
pub struct StubForwarder {
    unreachable: HashSet<String>,
    crash_switches: Mutex<HashMap<String, oneshot::Sender<String>>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    terminations: Arc<Mutex<HashMap<String, u32>>>,
}

impl StubForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable(mut self, service: &str) -> Self {
        self.unreachable.insert(service.to_string());
        self
    }

    /// Make the process forwarding `service` exit abnormally
    pub fn crash(&self, service: &str, message: &str) {
        if let Some(tx) = self.crash_switches.lock().remove(service) {
            let _ = tx.send(message.to_string());
        }
    }

    /// Hold the next forward of `service` until the returned sender fires
    pub fn gate(&self, service: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(service.to_string(), rx);
        tx
    }

    pub fn terminations(&self, service: &str) -> u32 {
        self.terminations.lock().get(service).copied().unwrap_or(0)
    }
}

struct StubProcess {
    service: String,
    crash: Option<oneshot::Receiver<String>>,
    terminations: Arc<Mutex<HashMap<String, u32>>>,
}

#[async_trait]
impl Forwarder for StubForwarder {
    async fn forward(&self, spec: &ForwardSpec) -> Result<Box<dyn ForwardProcess>, ForwardError> {
        let gate = self.gates.lock().remove(&spec.service);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.unreachable.contains(&spec.service) {
            return Err(ForwardError::StartFailed {
                local_port: spec.local_port,
                service: spec.service.clone(),
                remote_port: spec.remote_port,
                message: format!("services \"{}\" not found", spec.service),
            });
        }
        let (tx, rx) = oneshot::channel();
        self.crash_switches.lock().insert(spec.service.clone(), tx);
        Ok(Box::new(StubProcess {
            service: spec.service.clone(),
            crash: Some(rx),
            terminations: self.terminations.clone(),
        }))
    }
}

#[async_trait]
impl ForwardProcess for StubProcess {
    async fn wait(&mut self) -> ForwardExit {
        if let Some(rx) = self.crash.take() {
            if let Ok(message) = rx.await {
                return ForwardExit::Failed(message);
            }
        }
        std::future::pending().await
    }

    async fn terminate(&mut self) -> Result<(), String> {
        *self
            .terminations
            .lock()
            .entry(self.service.clone())
            .or_insert(0) += 1;
        Ok(())
    }
}
