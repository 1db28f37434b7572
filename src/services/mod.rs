//! Services layer - orchestration logic
//!
//! This module coordinates between domain logic and infrastructure.
//! Services only see infrastructure through its traits, so every service
//! can be driven by in-memory stubs in tests.

pub mod apply_engine;
pub mod port_forward_manager;
pub mod readiness_gate;
pub mod rollout_controller;
pub mod smoke;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use apply_engine::{ApplyEngine, ApplyResult};
pub use port_forward_manager::PortForwardManager;
pub use readiness_gate::{Elapsed, ReadinessGate};
pub use rollout_controller::{Collaborators, RolloutController, RolloutReport, RolloutSettings};
pub use smoke::{SmokeReport, SmokeSettings, SmokeTester};
