//! Command implementations
//!
//! Each command loads `shipyard.yaml` once, wires the concrete adapters into
//! the services and maps the outcome onto the process exit code.

pub mod deploy;
pub mod plan;
pub mod setup;
pub mod stop;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ShipyardConfig, SmokeEndpoint};
use crate::error::RolloutError;
use crate::infrastructure::{
    cluster, DockerBuilder, HealthProbe, HttpProbe, KubeCluster, RolloutLog, ServiceProxyProbe,
};
use crate::services::{Collaborators, RolloutController, RolloutReport, RolloutSettings, SmokeSettings};
use crate::ui;

pub use deploy::DeployOptions;

pub(crate) fn load_config(path: &Path) -> Result<ShipyardConfig> {
    let config = ShipyardConfig::load_validated(path)?;
    info!("📄 Loaded {}", path.display());
    Ok(config)
}

pub(crate) async fn connect_cluster() -> Result<Arc<KubeCluster>> {
    crate::tools::ensure_available(crate::tools::tools::KUBECTL)?;
    let cluster = KubeCluster::connect()
        .await
        .context("Failed to connect to the cluster. Is your kubeconfig pointing at a running cluster?")?;
    Ok(Arc::new(cluster))
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("SIGINT received, shutting down"),
                    _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
                }
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Cancel `token` when the process is asked to stop
pub(crate) fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    })
}

pub(crate) fn spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub(crate) fn rollout_settings(config: &ShipyardConfig, options: &DeployOptions) -> RolloutSettings {
    let smoke = if options.no_smoke {
        None
    } else {
        config.smoke_endpoint().map(|endpoint| SmokeSettings {
            url: endpoint.location().to_string(),
            requests: config.smoke.requests,
            interval: config.smoke.interval,
        })
    };

    RolloutSettings {
        dependency_timeout: config.readiness.dependency_timeout,
        poll_interval: config.readiness.poll_interval,
        max_backoff: config.readiness.max_backoff,
        deadline: options.deadline.or(config.deadline()),
        skip_build: options.skip_build,
        smoke,
    }
}

/// Run one rollout against the real cluster and report it.
///
/// Prints the summary, appends the audit log and prints pod diagnostics for
/// readiness failures. A failed rollout comes back as a `RolloutError`.
pub(crate) async fn run_rollout(
    config: &ShipyardConfig,
    cluster: Arc<KubeCluster>,
    options: &DeployOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    let builder = if config.local_cluster.docker_env {
        DockerBuilder::new().with_minikube_env()
    } else {
        DockerBuilder::new()
    };
    let probe: Option<Arc<dyn HealthProbe>> = match config.smoke_endpoint() {
        _ if options.no_smoke => None,
        Some(SmokeEndpoint::Url(_)) => Some(Arc::new(HttpProbe::new(config.smoke.timeout)?)),
        Some(SmokeEndpoint::ServiceProxy(_)) => {
            Some(Arc::new(ServiceProxyProbe::new(config.smoke.timeout)))
        }
        None => None,
    };

    let collaborators = Collaborators {
        cluster: cluster.clone(),
        status: cluster.clone(),
        builder: Arc::new(builder),
        probe,
    };
    let controller = RolloutController::new(collaborators, rollout_settings(config, options));

    let resources = config.resource_specs()?;
    let target = config.deployment_target(options.image.as_deref());

    let RolloutReport { run, result } = controller.run(resources, &target, cancel).await;
    ui::print_rollout_summary(&run);

    if let Some(path) = config.log_path() {
        let log = RolloutLog::new(path);
        if let Err(e) = log.append(&run.summary()).await {
            warn!("Failed to write rollout log {}: {:#}", log.path().display(), e);
        }
    }

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            match &e {
                RolloutError::DependencyNotReady { resource, .. } => {
                    let selector = config
                        .resource_specs()?
                        .into_iter()
                        .find(|r| &r.name == resource)
                        .map(|r| r.selector());
                    if let Some(selector) = selector {
                        cluster::print_diagnostics(&cluster, &selector).await;
                    }
                }
                RolloutError::TargetNotReady { .. } => {
                    cluster::print_diagnostics(&cluster, &target.selector).await;
                }
                _ => {}
            }
            Err(e.into())
        }
    }
}
