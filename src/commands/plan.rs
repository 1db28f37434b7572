use anyhow::Result;
use std::path::Path;

use crate::config::SmokeEndpoint;
use crate::domain::ResourceGraph;
use crate::error::RolloutError;
use crate::ui;

/// Show what `deploy` would apply, tier by tier. Never touches the cluster.
pub async fn execute(config_path: &Path) -> Result<()> {
    let config = super::load_config(config_path)?;
    let target = config.deployment_target(None);

    ui::print_header(&format!("Plan: {}/{}", target.namespace, target.name));

    let graph = ResourceGraph::from_specs(config.resource_specs()?).map_err(RolloutError::from)?;
    let tiers = graph.topological_order().map_err(RolloutError::from)?;
    ui::print_tiers(&tiers);

    ui::print_info(&format!(
        "Then: build {} from {}, restart {}, wait for {} (timeout {})",
        target.image,
        target.build_context.display(),
        target.name,
        target.selector,
        humantime::format_duration(target.probe.timeout)
    ));
    match config.smoke_endpoint() {
        Some(SmokeEndpoint::Url(url)) => ui::print_info(&format!(
            "Smoke: {} requests to {}",
            config.smoke.requests, url
        )),
        Some(SmokeEndpoint::ServiceProxy(path)) => ui::print_info(&format!(
            "Smoke: {} requests through the service proxy ({})",
            config.smoke.requests, path
        )),
        None => ui::print_info("Smoke: disabled"),
    }
    Ok(())
}
