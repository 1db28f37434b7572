use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ShipyardConfig;
use crate::domain::{ForwardSpec, SessionId};
use crate::infrastructure::KubectlForwarder;
use crate::services::PortForwardManager;
use crate::ui;

/// Flags of `shipyard deploy`
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub skip_build: bool,
    pub forward: bool,
    pub no_smoke: bool,
    pub image: Option<String>,
    pub deadline: Option<Duration>,
}

pub async fn execute(config_path: &Path, options: DeployOptions) -> Result<()> {
    let config = super::load_config(config_path)?;
    deploy(&config, &options).await
}

pub(crate) async fn deploy(config: &ShipyardConfig, options: &DeployOptions) -> Result<()> {
    ui::print_header(&format!(
        "Deploy: {}/{}",
        config.target.namespace, config.target.name
    ));
    info!("🎯 Image: {}", options.image.as_deref().unwrap_or(&config.target.image));
    info!("📦 Resources: {}", config.resources.len());
    if let Some(deadline) = options.deadline.or(config.deadline()) {
        info!("⏱️  Deadline: {}", humantime::format_duration(deadline));
    }
    println!();

    let cluster = super::connect_cluster().await?;

    // One listener for the whole command: a signal during the rollout or
    // while forwards are starting must not be lost.
    let cancel = CancellationToken::new();
    let signals = super::cancel_on_signal(cancel.clone());
    let result = async {
        super::run_rollout(config, cluster, options, &cancel).await?;
        if options.forward {
            forward_until_signal(config, &cancel).await?;
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;
    signals.abort();
    result
}

/// Hold the configured forwards open until `cancel` fires or until all of
/// them have exited. The PID file lets `shipyard stop` find this process.
async fn forward_until_signal(config: &ShipyardConfig, cancel: &CancellationToken) -> Result<()> {
    let specs = config.forward_specs();
    if specs.is_empty() {
        ui::print_warning("--forward given but no forwards are configured");
        return Ok(());
    }

    let forwarder = Arc::new(KubectlForwarder::new(config.rollout.forward_startup_timeout));
    let manager = PortForwardManager::new(forwarder);

    start_forwards(&manager, specs, cancel).await;
    if cancel.is_cancelled() {
        let stopped = manager.stop_all().await;
        ui::print_warning(&format!(
            "Interrupted while starting forwards; stopped {} session(s)",
            stopped
        ));
        return Ok(());
    }
    if manager.active_count() == 0 {
        anyhow::bail!("No port-forward could be started");
    }

    let pid_file = config.pid_file();
    write_pid_file(&pid_file)?;
    let _pid_guard = scopeguard::guard(pid_file, |path| {
        let _ = std::fs::remove_file(path);
    });

    let pb = super::spinner(format!(
        "Forwarding {} session(s). Ctrl+C or `shipyard stop` to end.",
        manager.active_count()
    ));

    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = manager.wait_all_exited() => warn!("All port-forwards exited"),
    }
    pb.finish_and_clear();

    let stopped = manager.stop_all().await;
    ui::print_success(&format!("Stopped {} port-forward session(s)", stopped));
    Ok(())
}

/// Start each forward in turn, stopping early once `cancel` fires. Returns
/// the sessions that came up.
async fn start_forwards(
    manager: &PortForwardManager,
    specs: Vec<ForwardSpec>,
    cancel: &CancellationToken,
) -> Vec<SessionId> {
    let mut started = Vec::new();
    for spec in specs {
        if cancel.is_cancelled() {
            break;
        }
        let label = spec.to_string();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = manager.start(spec) => match result {
                Ok(id) => {
                    ui::print_info(&format!("{} {}", id, label));
                    started.push(id);
                }
                // One unreachable service never blocks the others
                Err(e) => ui::print_warning(&e.to_string()),
            },
        }
    }
    started
}

fn write_pid_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, std::process::id().to_string())
        .with_context(|| format!("Failed to write {}", path.display()))
}
