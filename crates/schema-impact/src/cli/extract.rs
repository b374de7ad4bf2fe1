//! `schema-impact extract` command implementation.

use std::path::Path;

use anyhow::{Context as _, Result};
use colored::Colorize;
use schema_impact::{DependencyExtractor, EntityRef, EntityType};

use super::display::{plural, print_items, print_json};

/// Run the extract command.
pub fn run(file: &Path, kind: EntityType, json: bool) -> Result<()> {
    let sql = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let name = file
        .file_stem()
        .map_or_else(|| "definition".to_string(), |s| s.to_string_lossy().into_owned());
    let owner = EntityRef::named(kind, 0, name);

    let extraction = DependencyExtractor::new().extract(&sql, &owner)?;

    if json {
        return print_json(&extraction);
    }

    println!("Dependencies of {}:", owner.label().cyan().bold());
    println!();

    let dependencies: Vec<String> = extraction
        .dependencies
        .iter()
        .map(|d| {
            format!(
                "{} {} ({})",
                d.target_name,
                d.dependency_type.as_str().yellow(),
                d.target_type
            )
        })
        .collect();
    println!(
        "  {} ({}):",
        "References".white().bold(),
        dependencies.len().to_string().green()
    );
    print_items(&dependencies, "(none)");

    println!();
    let joins: Vec<String> = extraction
        .join_conditions
        .iter()
        .map(ToString::to_string)
        .collect();
    println!(
        "  {} ({}):",
        "Join conditions".white().bold(),
        joins.len().to_string().green()
    );
    print_items(&joins, "(none)");

    if extraction.dynamic_sql > 0 {
        println!();
        println!(
            "  {}: {} not analysed",
            "Dynamic SQL".yellow(),
            plural(extraction.dynamic_sql, "site", "sites")
        );
    }

    if !extraction.diagnostics.is_empty() {
        println!();
        let diagnostics: Vec<String> = extraction
            .diagnostics
            .iter()
            .map(ToString::to_string)
            .collect();
        println!(
            "  {} ({}):",
            "Diagnostics".yellow(),
            diagnostics.len()
        );
        print_items(&diagnostics, "(none)");
    }

    Ok(())
}
