//! `schema-impact sync` command implementation.

use anyhow::Result;
use colored::Colorize;
use schema_impact::SyncFailure;

use super::Context;
use super::display::MAX_DISPLAY_ITEMS;

/// Run the sync command.
pub fn run(ctx: &Context) -> Result<()> {
    println!(
        "{} project {}...",
        "Syncing".cyan().bold(),
        ctx.project
    );

    let engine = ctx.open()?;
    let report = engine.sync_project(ctx.project)?;

    println!();
    println!(
        "{} {} definitions, found {} references, stored {} edges",
        "Analysed".green().bold(),
        report.sources_analyzed,
        report.raw_dependencies,
        report.resolved_dependencies
    );
    println!("{}: {:.2?}", "Duration".dimmed(), report.duration);

    if report.unresolved_dependencies > 0 {
        println!(
            "{}: {} (system objects or objects outside the catalog)",
            "Unresolved references".dimmed(),
            report.unresolved_dependencies
        );
    }

    if report.diagnostics > 0 {
        println!(
            "{}: {} (rerun with -vv for details)",
            "Parser diagnostics".yellow(),
            report.diagnostics
        );
    }

    if !report.join_conditions.is_empty() {
        println!(
            "{}: {}",
            "Join conditions".dimmed(),
            report.join_conditions.len()
        );
    }

    if !report.failures.is_empty() {
        print_failures(&report.failures);
    }

    Ok(())
}

fn print_failures(failures: &[SyncFailure]) {
    let internal = failures.iter().filter(|f| f.kind.is_internal_error()).count();

    println!();
    println!("{} ({}):", "Failures".red().bold(), failures.len());
    for failure in failures.iter().take(MAX_DISPLAY_ITEMS) {
        println!(
            "  {} {}: {}",
            "•".red(),
            failure.source,
            failure.message
        );
    }
    if failures.len() > MAX_DISPLAY_ITEMS {
        println!("  ... and {} more", failures.len() - MAX_DISPLAY_ITEMS);
    }

    if internal > 0 {
        println!(
            "  {}",
            format!("{internal} of these are extractor crashes; please report them.").dimmed()
        );
    }
}
