//! Apply engine - pushes one dependency tier to the cluster
//!
//! Every resource in the tier is attempted even after a failure so the
//! operator sees all rejected resources at once. Idempotence is whatever the
//! control plane's apply guarantees; nothing is cached here.

use colored::Colorize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{ResourceKind, ResourceSpec};
use crate::error::ApplyError;
use crate::infrastructure::{ApplyChange, ClusterControlPlane};

/// Result of applying a single resource
#[derive(Debug, Clone)]
pub struct ResourceOutcome {
    pub resource: String,
    pub kind: ResourceKind,
    pub result: Result<ApplyChange, ApplyError>,
}

/// Per-resource results for one tier, in application order
#[derive(Debug, Clone, Default)]
pub struct ApplyResult {
    pub outcomes: Vec<ResourceOutcome>,
}

impl ApplyResult {
    pub fn changed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(&o.result, Ok(change) if change.is_change()))
            .count()
    }

    pub fn unchanged_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, Ok(ApplyChange::Unchanged)))
            .count()
    }

    pub fn failures(&self) -> Vec<ApplyError> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().cloned())
            .collect()
    }

    /// A tier succeeds only if every resource in it was accepted
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

pub struct ApplyEngine {
    cluster: Arc<dyn ClusterControlPlane>,
}

impl ApplyEngine {
    pub fn new(cluster: Arc<dyn ClusterControlPlane>) -> Self {
        Self { cluster }
    }

    /// Apply every resource of a tier, continuing past failures
    pub async fn apply(&self, tier: &[ResourceSpec]) -> ApplyResult {
        let mut result = ApplyResult::default();

        for spec in tier {
            let outcome = match self.cluster.apply_resource(spec).await {
                Ok(change) => {
                    let label = match change {
                        ApplyChange::Created => "created".green(),
                        ApplyChange::Configured => "configured".yellow(),
                        ApplyChange::Unchanged => "unchanged".dimmed(),
                    };
                    info!("  {} {}/{} {}", spec.kind, spec.namespace, spec.name, label);
                    Ok(change)
                }
                Err(cause) => {
                    warn!(
                        "  {} {}/{} {}: {}",
                        spec.kind,
                        spec.namespace,
                        spec.name,
                        "rejected".red(),
                        cause
                    );
                    Err(ApplyError {
                        resource: spec.name.clone(),
                        kind: spec.kind,
                        namespace: spec.namespace.clone(),
                        cause,
                    })
                }
            };

            result.outcomes.push(ResourceOutcome {
                resource: spec.name.clone(),
                kind: spec.kind,
                result: outcome,
            });
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::StubCluster;

    fn tier() -> Vec<ResourceSpec> {
        vec![
            ResourceSpec::new(ResourceKind::ConfigData, "cfg", "shop"),
            ResourceSpec::new(ResourceKind::SecretData, "creds", "shop"),
            ResourceSpec::new(ResourceKind::StatefulService, "db", "shop"),
        ]
    }

    #[tokio::test]
    async fn test_second_apply_changes_nothing() {
        let cluster = Arc::new(StubCluster::new());
        let engine = ApplyEngine::new(cluster.clone());

        let first = engine.apply(&tier()).await;
        assert!(first.is_success());
        assert_eq!(first.changed_count(), 3);

        let second = engine.apply(&tier()).await;
        assert!(second.is_success());
        assert_eq!(second.changed_count(), 0);
        assert_eq!(second.unchanged_count(), 3);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_remaining_resources() {
        let cluster = Arc::new(StubCluster::new().rejecting("creds"));
        let engine = ApplyEngine::new(cluster.clone());

        let result = engine.apply(&tier()).await;

        assert!(!result.is_success());
        assert_eq!(result.outcomes.len(), 3);
        assert_eq!(cluster.applied(), vec!["cfg".to_string(), "db".to_string()]);

        let failures = result.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].resource, "creds");
        assert_eq!(failures[0].kind, ResourceKind::SecretData);
    }

    #[test]
    fn test_empty_tier_succeeds() {
        let engine = ApplyEngine::new(Arc::new(StubCluster::new()));
        let result = tokio_test::block_on(engine.apply(&[]));
        assert!(result.is_success());
        assert_eq!(result.changed_count(), 0);
    }
}
