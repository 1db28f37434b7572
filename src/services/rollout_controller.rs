//! Rollout controller - drives one rollout through its phases
//!
//! Idle → GraphBuilt → (Applying → AwaitingDependencies)* → Building →
//! Restarting → AwaitingTarget → SmokeTesting → Done, with Failed reachable
//! from every non-terminal phase.
//!
//! Phases run strictly in sequence. A tier is gated on the readiness of its
//! workloads before the next tier is applied, and the image is only built
//! once every dependency is up. Nothing is rolled back on failure: apply is
//! idempotent, so re-running the rollout is the recovery path.

use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::apply_engine::ApplyEngine;
use super::readiness_gate::ReadinessGate;
use super::smoke::{SmokeSettings, SmokeTester};
use crate::domain::{
    DeploymentTarget, FailureReport, PhaseOutcome, ReadinessCondition, ResourceGraph,
    ResourceSpec, RolloutPhase, RolloutRun,
};
use crate::error::{ReadinessError, RolloutError};
use crate::infrastructure::{ClusterControlPlane, HealthProbe, ImageBuilder, StatusSource};

/// External systems a rollout talks to
#[derive(Clone)]
pub struct Collaborators {
    pub cluster: Arc<dyn ClusterControlPlane>,
    pub status: Arc<dyn StatusSource>,
    pub builder: Arc<dyn ImageBuilder>,
    pub probe: Option<Arc<dyn HealthProbe>>,
}

#[derive(Debug, Clone)]
pub struct RolloutSettings {
    /// Default wait for dependency workloads (resources may override)
    pub dependency_timeout: Duration,
    /// Poll interval while waiting on dependencies
    pub poll_interval: Duration,
    pub max_backoff: Duration,
    /// Overall budget for the whole run
    pub deadline: Option<Duration>,
    pub skip_build: bool,
    pub smoke: Option<SmokeSettings>,
}

impl Default for RolloutSettings {
    fn default() -> Self {
        Self {
            dependency_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(3),
            max_backoff: Duration::from_secs(30),
            deadline: None,
            skip_build: false,
            smoke: None,
        }
    }
}

/// Finished run plus the error that ended it, if any
#[derive(Debug)]
pub struct RolloutReport {
    pub run: RolloutRun,
    pub result: Result<(), RolloutError>,
}

impl RolloutReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn exit_code(&self) -> u8 {
        match &self.result {
            Ok(()) => 0,
            Err(e) => e.exit_code(),
        }
    }
}

pub struct RolloutController {
    collaborators: Collaborators,
    settings: RolloutSettings,
    engine: ApplyEngine,
    gate: ReadinessGate,
}

impl RolloutController {
    pub fn new(collaborators: Collaborators, settings: RolloutSettings) -> Self {
        let engine = ApplyEngine::new(collaborators.cluster.clone());
        let gate = ReadinessGate::new(collaborators.status.clone())
            .with_max_backoff(settings.max_backoff);
        Self {
            collaborators,
            settings,
            engine,
            gate,
        }
    }

    /// Run a rollout of `target` with the declared `resources`.
    ///
    /// Always returns the finished run; the caller maps the result to an exit
    /// code and decides whether to persist the summary.
    pub async fn run(
        &self,
        resources: Vec<ResourceSpec>,
        target: &DeploymentTarget,
        cancel: &CancellationToken,
    ) -> RolloutReport {
        let mut run = RolloutRun::new(&target.name);
        run.note(format!("rollout {} of {} started", run.id, target.name));

        let result = self.execute(&mut run, resources, target, cancel).await;

        match &result {
            Ok(()) => {
                info!(
                    "{} Rollout of {} completed in {:.1}s",
                    RolloutPhase::Done.emoji(),
                    target.name.bright_white(),
                    run.total_duration().as_secs_f64()
                );
            }
            Err(e) => {
                warn!(
                    "{} Rollout of {} failed in {}: {}",
                    RolloutPhase::Failed.emoji(),
                    target.name,
                    e.phase(),
                    e
                );
                run.fail(FailureReport {
                    phase: e.phase(),
                    subject: e.subject(),
                    cause: e.to_string(),
                    last_state: e.last_state(),
                });
            }
        }

        RolloutReport { run, result }
    }

    async fn execute(
        &self,
        run: &mut RolloutRun,
        resources: Vec<ResourceSpec>,
        target: &DeploymentTarget,
        cancel: &CancellationToken,
    ) -> Result<(), RolloutError> {
        let deadline = self.settings.deadline.map(|d| Instant::now() + d);

        // Idle → GraphBuilt
        let started = Instant::now();
        let tiers = match ResourceGraph::from_specs(resources).and_then(|g| g.topological_order())
        {
            Ok(tiers) => tiers,
            Err(e) => {
                run.record(PhaseOutcome::Failure, started.elapsed(), Some(e.to_string()));
                return Err(e.into());
            }
        };
        run.transition(RolloutPhase::GraphBuilt);
        let total: usize = tiers.iter().map(Vec::len).sum();
        run.record(
            PhaseOutcome::Success,
            started.elapsed(),
            Some(format!("{} resources in {} tiers", total, tiers.len())),
        );

        for (index, tier) in tiers.iter().enumerate() {
            self.apply_tier(run, index, tier, cancel).await?;
            self.await_dependencies(run, index, tier, target, cancel, deadline)
                .await?;
        }

        self.build(run, target, cancel).await?;
        self.restart(run, target, cancel).await?;
        self.await_target(run, target, cancel, deadline).await?;
        self.smoke_test(run, cancel).await;

        run.complete();
        Ok(())
    }

    async fn apply_tier(
        &self,
        run: &mut RolloutRun,
        index: usize,
        tier: &[ResourceSpec],
        cancel: &CancellationToken,
    ) -> Result<(), RolloutError> {
        ensure_not_cancelled(run, cancel)?;
        run.transition(RolloutPhase::Applying);
        info!(
            "{} Applying tier {}: {}",
            RolloutPhase::Applying.emoji(),
            index,
            tier.iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let started = Instant::now();
        let result = self.engine.apply(tier).await;
        let failures = result.failures();
        run.count_applied(
            result.changed_count(),
            result.unchanged_count(),
            failures.len(),
        );

        if !failures.is_empty() {
            run.record(
                PhaseOutcome::Failure,
                started.elapsed(),
                Some(format!("tier {}: {} rejected", index, failures.len())),
            );
            return Err(RolloutError::ApplyFailed {
                tier: index,
                failures,
            });
        }

        run.record(
            PhaseOutcome::Success,
            started.elapsed(),
            Some(format!(
                "tier {}: {} changed, {} unchanged",
                index,
                result.changed_count(),
                result.unchanged_count()
            )),
        );
        Ok(())
    }

    /// Gate on every workload in the tier except the target itself, which is
    /// gated after its restart.
    async fn await_dependencies(
        &self,
        run: &mut RolloutRun,
        index: usize,
        tier: &[ResourceSpec],
        target: &DeploymentTarget,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<(), RolloutError> {
        let gated: Vec<&ResourceSpec> = tier
            .iter()
            .filter(|r| r.kind.is_workload() && r.name != target.name)
            .collect();
        if gated.is_empty() {
            return Ok(());
        }

        run.transition(RolloutPhase::AwaitingDependencies);
        let started = Instant::now();

        for resource in gated {
            info!(
                "{} Waiting for {} {}",
                RolloutPhase::AwaitingDependencies.emoji(),
                resource.kind,
                resource.name
            );
            let condition = ReadinessCondition::all_ready(
                resource.selector(),
                resource
                    .readiness_timeout
                    .unwrap_or(self.settings.dependency_timeout),
                self.settings.poll_interval,
            );

            match self.gate.wait_until_ready(&condition, cancel, deadline).await {
                Ok(elapsed) => run.note(format!(
                    "{} ready after {:.1}s",
                    resource.name,
                    elapsed.duration.as_secs_f64()
                )),
                Err(source) => {
                    run.record(
                        wait_outcome(&source),
                        started.elapsed(),
                        Some(format!("{}: {}", resource.name, source.last_state())),
                    );
                    return Err(RolloutError::DependencyNotReady {
                        tier: index,
                        resource: resource.name.clone(),
                        source,
                    });
                }
            }
        }

        run.record(PhaseOutcome::Success, started.elapsed(), None);
        Ok(())
    }

    async fn build(
        &self,
        run: &mut RolloutRun,
        target: &DeploymentTarget,
        cancel: &CancellationToken,
    ) -> Result<(), RolloutError> {
        ensure_not_cancelled(run, cancel)?;
        run.transition(RolloutPhase::Building);

        if self.settings.skip_build {
            info!("⏭️  Skipping image build (--skip-build)");
            run.record(PhaseOutcome::Skipped, Duration::ZERO, None);
            return Ok(());
        }

        info!(
            "{} Building {} from {}",
            RolloutPhase::Building.emoji(),
            target.image,
            target.build_context.display()
        );
        let started = Instant::now();
        let built = tokio::select! {
            _ = cancel.cancelled() => {
                run.record(PhaseOutcome::Cancelled, started.elapsed(), None);
                return Err(RolloutError::Cancelled { phase: RolloutPhase::Building });
            }
            built = self.collaborators.builder.build_image(&target.image, &target.build_context) => built,
        };

        match built {
            Ok(output) => {
                run.record(PhaseOutcome::Success, started.elapsed(), Some(output.tag));
                Ok(())
            }
            Err(e) => {
                run.record(PhaseOutcome::Failure, started.elapsed(), Some(e.to_string()));
                Err(e.into())
            }
        }
    }

    async fn restart(
        &self,
        run: &mut RolloutRun,
        target: &DeploymentTarget,
        cancel: &CancellationToken,
    ) -> Result<(), RolloutError> {
        ensure_not_cancelled(run, cancel)?;
        run.transition(RolloutPhase::Restarting);
        let started = Instant::now();
        let cluster = &self.collaborators.cluster;

        let restarted = async {
            if let Some(replicas) = target.replicas {
                info!("📏 Scaling {} to {} replicas", target.name, replicas);
                cluster
                    .scale_deployment(&target.name, &target.namespace, replicas)
                    .await?;
            }
            info!(
                "{} Restarting deployment {}",
                RolloutPhase::Restarting.emoji(),
                target.name
            );
            cluster
                .restart_deployment(&target.name, &target.namespace)
                .await
        }
        .await;

        match restarted {
            Ok(()) => {
                run.record(PhaseOutcome::Success, started.elapsed(), None);
                Ok(())
            }
            Err(source) => {
                run.record(
                    PhaseOutcome::Failure,
                    started.elapsed(),
                    Some(source.to_string()),
                );
                Err(RolloutError::RestartFailed {
                    target: target.name.clone(),
                    source,
                })
            }
        }
    }

    async fn await_target(
        &self,
        run: &mut RolloutRun,
        target: &DeploymentTarget,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<(), RolloutError> {
        run.transition(RolloutPhase::AwaitingTarget);
        info!(
            "{} Waiting for {} to become ready (timeout {}s)",
            RolloutPhase::AwaitingTarget.emoji(),
            target.selector,
            target.probe.timeout.as_secs()
        );
        let started = Instant::now();

        match self
            .gate
            .wait_until_ready(&target.readiness_condition(), cancel, deadline)
            .await
        {
            Ok(elapsed) => {
                run.record(
                    PhaseOutcome::Success,
                    started.elapsed(),
                    Some(format!("{} polls", elapsed.polls)),
                );
                Ok(())
            }
            Err(source) => {
                run.record(
                    wait_outcome(&source),
                    started.elapsed(),
                    Some(source.last_state().to_string()),
                );
                Err(RolloutError::TargetNotReady {
                    target: target.name.clone(),
                    source,
                })
            }
        }
    }

    /// Never fails the rollout; problems are recorded as `Degraded`.
    async fn smoke_test(&self, run: &mut RolloutRun, cancel: &CancellationToken) {
        run.transition(RolloutPhase::SmokeTesting);

        let (Some(settings), Some(probe)) = (&self.settings.smoke, &self.collaborators.probe)
        else {
            run.record(PhaseOutcome::Skipped, Duration::ZERO, None);
            return;
        };

        info!(
            "{} Smoke testing {} ({} requests)",
            RolloutPhase::SmokeTesting.emoji(),
            settings.url,
            settings.requests
        );
        let started = Instant::now();
        let report = SmokeTester::new(probe.clone(), settings.clone())
            .run(cancel)
            .await;

        let outcome = if report.is_healthy() {
            PhaseOutcome::Success
        } else {
            warn!("Smoke test degraded: {}", report.describe());
            PhaseOutcome::Degraded
        };
        run.record(outcome, started.elapsed(), Some(report.describe()));
    }
}

fn ensure_not_cancelled(run: &RolloutRun, cancel: &CancellationToken) -> Result<(), RolloutError> {
    if cancel.is_cancelled() {
        return Err(RolloutError::Cancelled { phase: run.phase() });
    }
    Ok(())
}

fn wait_outcome(err: &ReadinessError) -> PhaseOutcome {
    match err {
        ReadinessError::Cancelled { .. } => PhaseOutcome::Cancelled,
        ReadinessError::Timeout { .. } | ReadinessError::DeadlineExceeded { .. } => {
            PhaseOutcome::Timeout
        }
    }
}
