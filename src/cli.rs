//! CLI definitions for shipyard
//!
//! This module contains all CLI argument parsing structures using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "shipyard",
    version,
    about = "Dependency-ordered rollout orchestrator for containerized services",
    long_about = "Applies resources tier by tier, waits for dependencies, builds and restarts the target\nand verifies it is ready. Re-running a rollout is always safe."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to shipyard.yaml
    #[arg(
        short,
        long,
        global = true,
        env = "SHIPYARD_CONFIG",
        default_value = "shipyard.yaml"
    )]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply resources, build, restart and verify the target
    Deploy {
        /// Roll out the image already present instead of building it
        #[arg(long)]
        skip_build: bool,

        /// Keep configured port-forwards open until interrupted
        #[arg(long)]
        forward: bool,

        /// Skip the post-deploy smoke requests
        #[arg(long)]
        no_smoke: bool,

        /// Image tag to roll out instead of target.image
        #[arg(long)]
        image: Option<String>,

        /// Overall rollout budget (e.g. "10m"), overrides rollout.deadline
        #[arg(long, value_parser = humantime::parse_duration)]
        deadline: Option<std::time::Duration>,
    },

    /// Tear down port-forwards started by `deploy --forward`
    Stop {
        /// Also stop the local cluster
        #[arg(long)]
        cluster: bool,
    },

    /// Start the local cluster, enable addons and run the first deploy
    Setup {
        /// Only prepare the cluster
        #[arg(long)]
        skip_deploy: bool,
    },

    /// Print the apply tiers without touching the cluster
    Plan,
}
