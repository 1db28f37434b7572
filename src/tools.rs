//! Runtime tool path resolution
//!
//! For each external tool (e.g. `kubectl`) we:
//! 1. Check for an environment variable `{TOOL}_BIN` (e.g. `KUBECTL_BIN`)
//! 2. Fall back to PATH-based invocation if the envvar is not set
//!
//! Pinned tool paths can therefore be injected by the environment, and tests
//! can point a tool at a stub script.

use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;

/// Get the path to an external tool
///
/// Checks for `{TOOL}_BIN` (uppercase, `-` replaced by `_`) and falls back to
/// the tool name itself, which relies on PATH.
///
/// ```rust,ignore
/// // With KUBECTL_BIN="/opt/k8s/bin/kubectl"
/// assert_eq!(get_tool_path("kubectl"), "/opt/k8s/bin/kubectl");
///
/// // Without KUBECTL_BIN set
/// assert_eq!(get_tool_path("kubectl"), "kubectl");
/// ```
pub fn get_tool_path(tool: &str) -> String {
    let env_var = format!("{}_BIN", tool.to_uppercase().replace('-', "_"));
    env::var(&env_var).unwrap_or_else(|_| tool.to_string())
}

/// Resolve a tool to an executable path, failing early if it is missing
pub fn ensure_available(tool: &str) -> Result<PathBuf> {
    let path = get_tool_path(tool);
    which::which(&path).map_err(|_| {
        anyhow!(
            "{} not found (looked for '{}'). Install it or set {}_BIN",
            tool,
            path,
            tool.to_uppercase().replace('-', "_")
        )
    })
}

/// Common tool names
pub mod tools {
    pub const KUBECTL: &str = "kubectl";
    pub const DOCKER: &str = "docker";
    pub const MINIKUBE: &str = "minikube";
    pub const KILL: &str = "kill";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_get_tool_path_from_env() {
        env::set_var("TEST_TOOL_BIN", "/custom/path/to/test-tool");
        assert_eq!(get_tool_path("test-tool"), "/custom/path/to/test-tool");
        env::remove_var("TEST_TOOL_BIN");
    }

    #[test]
    fn test_get_tool_path_fallback() {
        env::remove_var("MISSING_TOOL_BIN");
        assert_eq!(get_tool_path("missing-tool"), "missing-tool");
    }

    #[test]
    fn test_uppercase_conversion() {
        env::set_var("SHIPYARD_FAKE_KUBECTL_BIN", "/opt/bin/kubectl");
        assert_eq!(get_tool_path("shipyard_fake_kubectl"), "/opt/bin/kubectl");
        env::remove_var("SHIPYARD_FAKE_KUBECTL_BIN");
    }

    #[test]
    fn test_ensure_available_missing_tool() {
        env::remove_var("DEFINITELY_NOT_INSTALLED_TOOL_BIN");
        let err = ensure_available("definitely-not-installed-tool").unwrap_err();
        assert!(err.to_string().contains("DEFINITELY_NOT_INSTALLED_TOOL_BIN"));
    }
}
