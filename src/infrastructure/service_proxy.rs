//! Health probe through the API server's service proxy
//!
//! `kubectl get --raw /api/v1/namespaces/<ns>/services/<svc>:<port>/proxy/<path>`
//! reaches the target's probe endpoint with the kubeconfig's credentials, so
//! the smoke test needs neither an ingress nor a port-forward.

use async_trait::async_trait;
use std::time::{Duration, Instant};

use super::cluster::run_kubectl;
use super::{HealthProbe, ProbeResponse};
use crate::tools::{get_tool_path, tools};

pub struct ServiceProxyProbe {
    kubectl: String,
    timeout: Duration,
}

impl ServiceProxyProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            kubectl: get_tool_path(tools::KUBECTL),
            timeout,
        }
    }
}

#[async_trait]
impl HealthProbe for ServiceProxyProbe {
    /// `path` is an API server path, as built by `DeploymentTarget::service_proxy_path`
    async fn check(&self, path: &str) -> Result<ProbeResponse, String> {
        let start = Instant::now();
        let request_timeout = format!("--request-timeout={}s", self.timeout.as_secs().max(1));
        let args = ["get", "--raw", path, request_timeout.as_str()];

        match tokio::time::timeout(self.timeout, run_kubectl(&self.kubectl, &args, None)).await {
            // kubectl exits non-zero on any non-2xx answer
            Ok(Ok(_)) => Ok(ProbeResponse {
                status: 200,
                latency: start.elapsed(),
            }),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("no answer within {}s", self.timeout.as_secs())),
        }
    }
}
