//! Kubernetes cluster adapter
//!
//! Applies manifests with `kubectl apply` (so server-side defaulting and
//! three-way merge stay kubectl's job) and reads status, restarts and scales
//! through the kube API.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use regex::Regex;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{k8s, ApplyChange, ClusterControlPlane, StatusSource};
use crate::domain::{ObservedState, ResourceKind, ResourceSpec, Selector};
use crate::error::ClusterError;
use crate::tools::{get_tool_path, tools};

pub struct KubeCluster {
    client: Client,
    kubectl: String,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            kubectl: get_tool_path(tools::KUBECTL),
        }
    }

    /// Connect using the inferred kubeconfig
    pub async fn connect() -> anyhow::Result<Self> {
        Ok(Self::new(k8s::create_client().await?))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn kubectl_apply(
        &self,
        args: &[&str],
        stdin: Option<Vec<u8>>,
    ) -> Result<String, ClusterError> {
        run_kubectl(&self.kubectl, args, stdin).await
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Run kubectl, optionally feeding `stdin`, and return its stdout
pub(crate) async fn run_kubectl(
    kubectl: &str,
    args: &[&str],
    stdin: Option<Vec<u8>>,
) -> Result<String, ClusterError> {
    let command = format!("kubectl {}", args.join(" "));
    debug!("Running {}", command);

    let mut child = Command::new(kubectl)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ClusterError::Spawn {
            command: command.clone(),
            message: e.to_string(),
        })?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(&input)
            .await
            .map_err(|e| ClusterError::Stdin {
                command: command.clone(),
                message: e.to_string(),
            })?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| ClusterError::Spawn {
            command: command.clone(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ClusterError::CommandFailed {
            command,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Manifest for a namespace declared without one
fn namespace_manifest(name: &str) -> Result<Vec<u8>, ClusterError> {
    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    serde_json::to_vec(&namespace).map_err(|e| ClusterError::Api(e.to_string()))
}

fn apply_line_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^(?P<object>\S+)\s+(?P<verb>created|configured|unchanged|serverside-applied)")
                .ok()
        })
        .as_ref()
}

/// Fold `kubectl apply` output lines into the strongest change reported
pub fn parse_apply_output(stdout: &str) -> ApplyChange {
    let mut change = ApplyChange::Unchanged;
    let Some(pattern) = apply_line_pattern() else {
        return change;
    };
    for line in stdout.lines() {
        let Some(caps) = pattern.captures(line.trim()) else {
            continue;
        };
        match &caps["verb"] {
            "created" => return ApplyChange::Created,
            "configured" | "serverside-applied" => change = ApplyChange::Configured,
            _ => {}
        }
    }
    change
}

#[async_trait]
impl ClusterControlPlane for KubeCluster {
    async fn apply_resource(&self, spec: &ResourceSpec) -> Result<ApplyChange, ClusterError> {
        let stdout = match (&spec.manifest, spec.kind) {
            (Some(path), ResourceKind::Namespace) => {
                let path = path.to_string_lossy();
                self.kubectl_apply(&["apply", "-f", &path], None).await?
            }
            (Some(path), _) => {
                let path = path.to_string_lossy();
                self.kubectl_apply(&["apply", "-n", &spec.namespace, "-f", &path], None)
                    .await?
            }
            (None, ResourceKind::Namespace) => {
                let manifest = namespace_manifest(&spec.name)?;
                self.kubectl_apply(&["apply", "-f", "-"], Some(manifest))
                    .await?
            }
            (None, kind) => {
                return Err(ClusterError::MissingManifest {
                    kind,
                    name: spec.name.clone(),
                })
            }
        };

        let change = parse_apply_output(&stdout);
        debug!("{} {} -> {:?}", spec.kind, spec.name, change);
        Ok(change)
    }

    async fn restart_deployment(&self, name: &str, namespace: &str) -> Result<(), ClusterError> {
        // Same annotation `kubectl rollout restart` sets
        let patch = serde_json::json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": {
                            "kubectl.kubernetes.io/restartedAt": chrono::Utc::now().to_rfc3339()
                        }
                    }
                }
            }
        });

        self.deployments(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ClusterError::Api(e.to_string()))?;

        info!("🔄 Restart triggered for deployment/{} in {}", name, namespace);
        Ok(())
    }

    async fn scale_deployment(
        &self,
        name: &str,
        namespace: &str,
        replicas: u32,
    ) -> Result<(), ClusterError> {
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });

        self.deployments(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ClusterError::Api(e.to_string()))?;

        info!("📏 Scaled deployment/{} to {} replicas", name, replicas);
        Ok(())
    }
}

#[async_trait]
impl StatusSource for KubeCluster {
    async fn get_status(&self, selector: &Selector) -> Result<ObservedState, ClusterError> {
        let pods = k8s::list_pods(&self.client, &selector.namespace, &selector.label_selector())
            .await
            .map_err(|e| ClusterError::Api(e.to_string()))?;
        Ok(k8s::observed_state(&pods))
    }
}

/// Print recent events and logs for pods that are not ready
pub async fn print_diagnostics(cluster: &KubeCluster, selector: &Selector) {
    let pods = match k8s::list_pods(cluster.client(), &selector.namespace, &selector.label_selector())
        .await
    {
        Ok(pods) => pods,
        Err(e) => {
            warn!("Failed to list pods for diagnostics: {}", e);
            return;
        }
    };

    for pod in pods.iter().filter(|p| !p.ready && !p.terminating) {
        warn!("━━━ Diagnostics for {} ━━━", pod.name);
        warn!("Container State: {}", pod.container);
        if let Some(reason) = pod.container.reason() {
            warn!("Reason: {}", reason);
        }
        if let Some(message) = pod.container.message() {
            warn!("Message: {}", message);
        }
        warn!("Restart Count: {}", pod.restarts);

        match k8s::pod_events(cluster.client(), &selector.namespace, &pod.name).await {
            Ok(events) if !events.is_empty() => {
                warn!("Recent Events:");
                for event in events.iter().rev().take(10) {
                    warn!("  {}", event);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to get events: {:#}", e),
        }

        match k8s::pod_logs(cluster.client(), &selector.namespace, &pod.name, 30).await {
            Ok(logs) if !logs.is_empty() => {
                warn!("Recent Logs (last 30 lines):");
                for line in logs.lines() {
                    warn!("  {}", line);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to get logs: {:#}", e),
        }
    }
}
