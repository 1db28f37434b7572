use anyhow::Result;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::LocalClusterError;
use crate::infrastructure::{LocalCluster, Minikube};
use crate::services::ReadinessGate;
use crate::tools::{ensure_available, tools};
use crate::ui;

use super::DeployOptions;

/// Bootstrap a local cluster: start it, enable addons, wait for them, then deploy.
pub async fn execute(config_path: &Path, skip_deploy: bool) -> Result<()> {
    let config = super::load_config(config_path)?;
    ui::print_header("Setup: local cluster");

    ensure_available(tools::MINIKUBE)?;
    let local = &config.local_cluster;
    let minikube = Minikube::new(local.profile.clone());
    minikube.ensure_running(&local.addons).await?;

    let cluster = super::connect_cluster().await?;
    let gate = ReadinessGate::new(cluster.clone()).with_max_backoff(config.readiness.max_backoff);
    let cancel = CancellationToken::new();
    let signals = super::cancel_on_signal(cancel.clone());

    for (addon, condition) in config.addon_conditions() {
        info!("⏳ Waiting for addon {} ({})", addon, condition.selector);
        if let Err(source) = gate.wait_until_ready(&condition, &cancel, None).await {
            signals.abort();
            return Err(LocalClusterError::AddonNotReady { addon, source }.into());
        }
    }
    signals.abort();
    ui::print_success("Local cluster ready");

    if skip_deploy {
        return Ok(());
    }

    super::deploy::deploy(&config, &DeployOptions::default()).await
}
