// Terminal UI utilities

use colored::Colorize;

use crate::domain::{PhaseOutcome, ResourceSpec, RolloutPhase, RolloutRun};

pub fn print_header(title: &str) {
    println!();
    println!(
        "{}",
        "╔════════════════════════════════════════════════════════════╗".bright_blue()
    );
    println!("{}", format!("║  {:<58}║", title).bright_blue());
    println!(
        "{}",
        "╚════════════════════════════════════════════════════════════╝".bright_blue()
    );
    println!();
}

pub fn print_success(message: &str) {
    println!("{}", format!("✅ {}", message).bright_green().bold());
}

pub fn print_error(message: &str) {
    eprintln!("{}", format!("❌ {}", message).bright_red().bold());
}

pub fn print_info(message: &str) {
    println!("{}", format!("ℹ️  {}", message).bright_cyan());
}

pub fn print_warning(message: &str) {
    println!("{}", format!("⚠️  {}", message).bright_yellow());
}

/// Apply tiers as a numbered list
pub fn print_tiers(tiers: &[Vec<ResourceSpec>]) {
    for (i, tier) in tiers.iter().enumerate() {
        println!("{}", format!("Tier {}", i).bold());
        for resource in tier {
            let deps = if resource.depends_on.is_empty() {
                String::new()
            } else {
                format!(" ← {}", resource.depends_on.join(", "))
            };
            println!(
                "  {} {}/{}{}",
                resource.kind.to_string().dimmed(),
                resource.namespace,
                resource.name.bright_white(),
                deps.dimmed()
            );
        }
    }
    println!();
}

fn outcome_label(outcome: PhaseOutcome) -> colored::ColoredString {
    match outcome {
        PhaseOutcome::Success => "success".green(),
        PhaseOutcome::Failure => "failure".red(),
        PhaseOutcome::Timeout => "timeout".red(),
        PhaseOutcome::Cancelled => "cancelled".yellow(),
        PhaseOutcome::Skipped => "skipped".dimmed(),
        PhaseOutcome::Degraded => "degraded".yellow(),
    }
}

/// Per-phase table plus the failure report, if any
pub fn print_rollout_summary(run: &RolloutRun) {
    println!();
    println!(
        "{}",
        "════════════════════════════════════════════════════════════".bright_blue()
    );
    for record in run.records() {
        println!(
            "  {} {:<22} {:<10} {:>7.1}s  {}",
            record.phase.emoji(),
            record.phase.name(),
            outcome_label(record.outcome),
            record.duration.as_secs_f64(),
            record.detail.as_deref().unwrap_or("").dimmed()
        );
    }
    let applied = run.applied();
    println!(
        "  Resources: {} changed, {} unchanged, {} failed",
        applied.changed, applied.unchanged, applied.failed
    );
    println!(
        "{}",
        "════════════════════════════════════════════════════════════".bright_blue()
    );

    match (run.phase(), run.failure()) {
        (RolloutPhase::Done, _) => print_success(&format!(
            "Rollout of {} complete ({:.1}s)",
            run.target,
            run.total_duration().as_secs_f64()
        )),
        (_, Some(failure)) => {
            print_error(&format!("Rollout of {} failed in {}", run.target, failure.phase));
            if let Some(subject) = &failure.subject {
                eprintln!("   Resource:   {}", subject);
            }
            eprintln!("   Cause:      {}", failure.cause);
            if let Some(state) = &failure.last_state {
                eprintln!("   Last state: {}", state);
            }
            eprintln!("   Re-running the deploy is safe; apply is idempotent.");
        }
        (phase, None) => print_warning(&format!("Rollout stopped in {}", phase)),
    }
    println!();
}
