//! Minikube local cluster lifecycle (dev-only)

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::LocalCluster;
use crate::error::LocalClusterError;
use crate::tools::{get_tool_path, tools};

pub struct Minikube {
    minikube: String,
    profile: Option<String>,
}

impl Minikube {
    pub fn new(profile: Option<String>) -> Self {
        Self {
            minikube: get_tool_path(tools::MINIKUBE),
            profile,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, LocalClusterError> {
        let mut full: Vec<&str> = args.to_vec();
        if let Some(profile) = &self.profile {
            full.extend(["-p", profile.as_str()]);
        }
        let command = format!("minikube {}", full.join(" "));
        debug!("Running {}", command);

        let output = Command::new(&self.minikube)
            .args(&full)
            .output()
            .await
            .map_err(|e| LocalClusterError::CommandFailed {
                command: command.clone(),
                message: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            // `minikube status` exits non-zero when stopped but still prints the state
            if args.first() == Some(&"status") {
                return Ok(stdout);
            }
            return Err(LocalClusterError::CommandFailed {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(stdout)
    }

    pub async fn is_running(&self) -> Result<bool, LocalClusterError> {
        let host = self.run(&["status", "--format", "{{.Host}}"]).await?;
        Ok(host.trim() == "Running")
    }
}

#[async_trait]
impl LocalCluster for Minikube {
    async fn ensure_running(&self, addons: &[String]) -> Result<(), LocalClusterError> {
        if self.is_running().await? {
            info!("✅ minikube already running");
        } else {
            info!("🚀 Starting minikube...");
            self.run(&["start"]).await?;
        }

        for addon in addons {
            self.enable_addon(addon).await?;
        }
        Ok(())
    }

    async fn enable_addon(&self, name: &str) -> Result<(), LocalClusterError> {
        info!("🧩 Enabling addon {}", name);
        self.run(&["addons", "enable", name]).await?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), LocalClusterError> {
        if !self.is_running().await? {
            info!("minikube is not running");
            return Ok(());
        }
        info!("🛑 Stopping minikube...");
        self.run(&["stop"]).await?;
        Ok(())
    }
}
