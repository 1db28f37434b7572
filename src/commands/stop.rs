use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::infrastructure::{LocalCluster, Minikube};
use crate::tools::{get_tool_path, tools};
use crate::ui;

/// How long to wait for the forwarding process to clean up after SIGTERM
const STOP_TIMEOUT: Duration = Duration::from_secs(15);

pub async fn execute(config_path: &Path, stop_cluster: bool) -> Result<()> {
    let config = super::load_config(config_path)?;
    ui::print_header("Stop");

    let pid_file = config.pid_file();
    match read_pid(&pid_file)? {
        Some(pid) => stop_forwarder(pid, &pid_file).await?,
        None => ui::print_info("No port-forwards running"),
    }

    if stop_cluster {
        Minikube::new(config.local_cluster.profile.clone())
            .stop()
            .await
            .context("Failed to stop local cluster")?;
        ui::print_success("Local cluster stopped");
    }
    Ok(())
}

fn read_pid(path: &Path) -> Result<Option<u32>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match content.trim().parse::<u32>() {
        Ok(pid) => Ok(Some(pid)),
        Err(_) => {
            warn!("Ignoring malformed PID file {}", path.display());
            let _ = std::fs::remove_file(path);
            Ok(None)
        }
    }
}

/// Signal the `deploy --forward` process; it tears its sessions down and
/// removes the PID file on the way out.
async fn stop_forwarder(pid: u32, pid_file: &Path) -> Result<()> {
    info!("🛑 Stopping port-forward process {}", pid);
    let status = Command::new(get_tool_path(tools::KILL))
        .arg("-TERM")
        .arg(pid.to_string())
        .status()
        .await
        .context("Failed to run kill")?;

    if !status.success() {
        warn!("Process {} is not running; removing stale PID file", pid);
        let _ = std::fs::remove_file(pid_file);
        return Ok(());
    }

    let pb = super::spinner("Waiting for port-forwards to close...");
    let closed = tokio::time::timeout(STOP_TIMEOUT, async {
        while pid_file.exists() {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    })
    .await;
    pb.finish_and_clear();

    match closed {
        Ok(()) => ui::print_success("Port-forwards stopped"),
        Err(_) => ui::print_warning(&format!(
            "Process {} did not exit within {}s",
            pid,
            STOP_TIMEOUT.as_secs()
        )),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_pid(&dir.path().join("forward.pid")).unwrap(), None);
    }

    #[test]
    fn test_malformed_pid_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forward.pid");
        std::fs::write(&path, "not-a-pid").unwrap();

        assert_eq!(read_pid(&path).unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_reads_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forward.pid");
        std::fs::write(&path, "4242\n").unwrap();
        assert_eq!(read_pid(&path).unwrap(), Some(4242));
    }
}
