//! `schema-impact deps` command implementation.

use std::collections::HashMap;

use anyhow::Result;
use colored::Colorize;
use schema_impact::EntityRef;

use super::Context;
use super::display::print_json;

/// Run the deps command.
pub fn run(ctx: &Context, json: bool) -> Result<()> {
    let engine = ctx.open()?;
    let edges = engine.dependencies(ctx.project)?;

    if json {
        return print_json(&edges);
    }

    if edges.is_empty() {
        println!(
            "{}",
            "No dependencies stored. Run `schema-impact sync` first.".dimmed()
        );
        return Ok(());
    }

    let names: HashMap<EntityRef, String> = engine
        .store()
        .objects(ctx.project)?
        .into_iter()
        .map(|o| (o.entity_ref(), o.qualified_name()))
        .collect();
    let name_of = |entity: EntityRef| {
        names
            .get(&entity)
            .cloned()
            .unwrap_or_else(|| entity.label())
    };

    println!(
        "{} ({}):",
        "Dependencies".white().bold(),
        edges.len().to_string().green()
    );
    for edge in &edges {
        println!(
            "  {} {} {} {}",
            name_of(EntityRef::new(edge.source_type, edge.source_id)),
            "→".dimmed(),
            name_of(EntityRef::new(edge.target_type, edge.target_id)),
            edge.dependency_type.as_str().yellow()
        );
    }

    Ok(())
}
