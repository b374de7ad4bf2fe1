//! `schema-impact import` command implementation.

use std::path::Path;

use anyhow::{Context as _, Result};
use colored::Colorize;

use super::Context;

/// Run the import command.
pub fn run(ctx: &Context, file: &Path) -> Result<()> {
    let engine = ctx.open()?;
    let stats = engine
        .import_catalog_file(ctx.project, file)
        .with_context(|| format!("failed to import {}", file.display()))?;

    println!(
        "{} {} objects into project {} ({} with definitions)",
        "Imported".green().bold(),
        stats.objects_upserted,
        ctx.project,
        stats.definitions
    );
    println!(
        "{}",
        "Run `schema-impact sync` to refresh dependency edges.".dimmed()
    );
    Ok(())
}
