//! Display formatting for CLI output

use console::style;
use fluxpreview_kube::{ReadinessResult, ReadyStatus, TeardownOutcome};

/// One line per resource: marker, `Kind/name`, then the condition message
pub fn print_readiness(results: &[ReadinessResult]) {
    let width = results
        .iter()
        .map(|r| r.kind.len() + r.name.len() + 1)
        .max()
        .unwrap_or(0);

    for result in results {
        let key = format!("{}/{}", result.kind, result.name);
        match result.ready {
            ReadyStatus::True => println!(
                "{} {:<width$}  {}",
                style("✓").green().bold(),
                style(key).cyan(),
                result.message,
                width = width
            ),
            ReadyStatus::False => println!(
                "{} {:<width$}  {}",
                style("✗").red().bold(),
                style(key).cyan(),
                style(&result.message).dim(),
                width = width
            ),
        }
    }
}

pub fn print_outcome(outcome: &TeardownOutcome) {
    let verb = if outcome.dry_run { "Would delete" } else { "Deleted" };

    for deleted in &outcome.deleted_resources {
        println!(
            "{} {} {}/{} (age {})",
            style("✓").green().bold(),
            verb,
            deleted.kind,
            style(&deleted.name).cyan(),
            deleted.age
        );
    }
    for skipped in &outcome.skipped_resources {
        println!(
            "{} Skipped {}: {}",
            style("→").blue().bold(),
            style(&skipped.name).cyan(),
            skipped.reason
        );
    }
    for warning in &outcome.warnings {
        println!("{} {}", style("⚠").yellow(), warning);
    }

    println!(
        "\n{} deleted, {} skipped",
        outcome.deleted_count, outcome.skipped_count
    );
}
