//! Docker image builder
//!
//! Builds with the host daemon, or with minikube's daemon when configured so
//! the cluster can use the image without a registry push.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info};

use super::{BuildOutput, ImageBuilder};
use crate::error::BuildError;
use crate::tools::{get_tool_path, tools};

pub struct DockerBuilder {
    docker: String,
    /// minikube binary whose `docker-env` should be used
    minikube: Option<String>,
}

impl DockerBuilder {
    /// Build against the host Docker daemon
    pub fn new() -> Self {
        Self {
            docker: get_tool_path(tools::DOCKER),
            minikube: None,
        }
    }

    /// Build inside minikube's Docker daemon
    pub fn with_minikube_env(mut self) -> Self {
        self.minikube = Some(get_tool_path(tools::MINIKUBE));
        self
    }

    async fn docker_env(&self) -> Result<Vec<(String, String)>, BuildError> {
        let Some(minikube) = &self.minikube else {
            return Ok(Vec::new());
        };

        let output = Command::new(minikube)
            .args(["docker-env", "--shell", "none"])
            .output()
            .await
            .map_err(|e| BuildError::Environment {
                message: format!("failed to run minikube docker-env: {}", e),
            })?;

        if !output.status.success() {
            return Err(BuildError::Environment {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_env_lines(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl Default for DockerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `KEY=VALUE` lines, skipping comments and blanks
fn parse_env_lines(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| {
            let (key, value) = l.split_once('=')?;
            Some((
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            ))
        })
        .collect()
}

/// Last few lines of build output, enough to see the failing step
fn tail(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[async_trait]
impl ImageBuilder for DockerBuilder {
    async fn build_image(&self, tag: &str, context: &Path) -> Result<BuildOutput, BuildError> {
        let env = self.docker_env().await?;
        let start = Instant::now();

        info!("🔨 Building {} from {}", tag, context.display());
        if !env.is_empty() {
            debug!("Using minikube docker-env ({} vars)", env.len());
        }

        let output = Command::new(&self.docker)
            .arg("build")
            .arg("-t")
            .arg(tag)
            .arg(context)
            .envs(env)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BuildError::Spawn {
                tag: tag.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(BuildError::Failed {
                tag: tag.to_string(),
                message: tail(&String::from_utf8_lossy(&output.stderr), 15),
            });
        }

        Ok(BuildOutput {
            tag: tag.to_string(),
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minikube_docker_env() {
        let out = "DOCKER_TLS_VERIFY=\"1\"\nDOCKER_HOST=\"tcp://192.168.49.2:2376\"\n\
                   # To point your shell to minikube's docker-daemon, run:\n\
                   MINIKUBE_ACTIVE_DOCKERD=\"minikube\"\n";
        let env = parse_env_lines(out);
        assert_eq!(env.len(), 3);
        assert_eq!(
            env[1],
            ("DOCKER_HOST".to_string(), "tcp://192.168.49.2:2376".to_string())
        );
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail("only", 5), "only");
    }
}
