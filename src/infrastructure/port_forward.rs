//! `kubectl port-forward` sessions
//!
//! A session is considered started once kubectl prints its first
//! `Forwarding from` line. Both output pipes are drained for the lifetime of
//! the process so kubectl never blocks on a full pipe.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::{ForwardProcess, Forwarder};
use crate::domain::{ForwardExit, ForwardSpec};
use crate::error::ForwardError;
use crate::tools::{get_tool_path, tools};

pub struct KubectlForwarder {
    kubectl: String,
    startup_timeout: Duration,
}

impl KubectlForwarder {
    pub fn new(startup_timeout: Duration) -> Self {
        Self {
            kubectl: get_tool_path(tools::KUBECTL),
            startup_timeout,
        }
    }
}

struct KubectlForward {
    child: Child,
    label: String,
}

fn drain<R>(reader: R, label: String)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("[{}] {}", label, line);
        }
    });
}

#[async_trait]
impl Forwarder for KubectlForwarder {
    async fn forward(&self, spec: &ForwardSpec) -> Result<Box<dyn ForwardProcess>, ForwardError> {
        let start_failed = |message: String| ForwardError::StartFailed {
            local_port: spec.local_port,
            service: spec.service.clone(),
            remote_port: spec.remote_port,
            message,
        };

        let mut child = Command::new(&self.kubectl)
            .arg("port-forward")
            .arg("-n")
            .arg(&spec.namespace)
            .arg(format!("svc/{}", spec.service))
            .arg(format!("{}:{}", spec.local_port, spec.remote_port))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| start_failed(e.to_string()))?;

        let (Some(stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(start_failed("output pipes unavailable".to_string()));
        };
        let mut stdout = BufReader::new(stdout);

        let mut first_line = String::new();
        let started =
            tokio::time::timeout(self.startup_timeout, stdout.read_line(&mut first_line)).await;

        match started {
            Ok(Ok(n)) if n > 0 && first_line.contains("Forwarding from") => {
                let label = format!("{}:{}", spec.service, spec.local_port);
                debug!("[{}] {}", label, first_line.trim_end());
                drain(stdout, label.clone());
                drain(stderr, label.clone());
                Ok(Box::new(KubectlForward { child, label }))
            }
            outcome => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                let mut message = String::new();
                let _ = stderr.read_to_string(&mut message).await;
                let message = match outcome {
                    Err(_) => format!(
                        "no response within {}s {}",
                        self.startup_timeout.as_secs(),
                        message.trim()
                    ),
                    _ if message.trim().is_empty() => first_line.trim().to_string(),
                    _ => message.trim().to_string(),
                };
                Err(start_failed(message))
            }
        }
    }
}

#[async_trait]
impl ForwardProcess for KubectlForward {
    async fn wait(&mut self) -> ForwardExit {
        match self.child.wait().await {
            Ok(status) if status.success() => ForwardExit::Clean,
            Ok(status) => ForwardExit::Failed(format!("kubectl exited with {}", status)),
            Err(e) => ForwardExit::Failed(e.to_string()),
        }
    }

    async fn terminate(&mut self) -> Result<(), String> {
        if let Err(e) = self.child.start_kill() {
            // Already exited and reaped
            warn!("[{}] kill failed: {}", self.label, e);
        }
        self.child
            .wait()
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
