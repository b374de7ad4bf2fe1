//! `schema-impact impact` command implementation.

use anyhow::{Context as _, Result};
use colored::Colorize;
use schema_impact::{ChangeType, EntityType, ImpactResult, ImpactVerdict};
use serde::Serialize;

use super::Context;
use super::display::{MAX_DISPLAY_ITEMS, level, plural, print_items, print_json, print_wrapped};

/// Arguments of the impact command.
pub struct ImpactArgs {
    /// Entity name
    pub target: String,
    /// Entity kind, when ambiguous
    pub kind: Option<EntityType>,
    /// Proposed change
    pub change: ChangeType,
    /// Depth override
    pub depth: Option<usize>,
    /// List every path
    pub show_paths: bool,
    /// JSON output
    pub json: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    result: &'a ImpactResult,
    verdict: &'a ImpactVerdict,
}

/// Run the impact command.
pub fn run(ctx: &Context, args: &ImpactArgs) -> Result<()> {
    let config = ctx.config(|config| {
        if let Some(depth) = args.depth {
            config.max_depth = depth;
        }
    })?;
    let engine = ctx.open_with(config)?;

    let root = engine
        .find_entity(ctx.project, args.kind, &args.target)
        .with_context(|| format!("cannot analyse '{}'", args.target))?;
    let result = engine.analyze_impact(ctx.project, &root, args.change)?;
    let verdict = engine.impact_verdict(&result);

    if args.json {
        return print_json(&Report {
            result: &result,
            verdict: &verdict,
        });
    }

    print_verdict(&result, &verdict);
    if args.show_paths {
        print_paths(&result);
    }
    Ok(())
}

fn print_verdict(result: &ImpactResult, verdict: &ImpactVerdict) {
    println!(
        "Impact of {} {}:",
        result.change_type.as_str().cyan(),
        result.root.to_string().cyan().bold()
    );
    println!();

    let approval = if verdict.requires_approval {
        "approval required".red().bold()
    } else {
        "no approval required".green()
    };
    println!(
        "  {}: {} (score {}, {})",
        "Risk".white().bold(),
        level(verdict.risk_tier),
        result.summary.worst_risk_score,
        approval
    );
    print_wrapped(2, " ", &verdict.summary);

    if !verdict.reasons.is_empty() {
        println!();
        println!("  {}:", "Why".white().bold());
        for reason in &verdict.reasons {
            print_wrapped(4, "•", &format!("{}.", capitalize(&reason.statement)));
            print_wrapped(6, "→", &reason.implication);
            if !reason.evidence.is_empty() {
                print_items(&reason.evidence, "");
            }
        }
    }

    println!();
    println!(
        "  {} ({}, {}):",
        "Affected".white().bold(),
        plural(result.entity_count, "entity", "entities"),
        plural(result.path_count, "path", "paths")
    );
    let affected: Vec<String> = result
        .entities
        .iter()
        .map(|e| {
            format!(
                "{} {} (criticality {}, {} away, score {})",
                level(e.worst_impact_level),
                e.entity,
                e.criticality_level,
                plural(e.distance, "hop", "hops"),
                e.worst_risk_score
            )
        })
        .collect();
    print_items(&affected, "(none)");

    println!();
    println!("  {}:", "Limitations".dimmed());
    for limitation in &verdict.limitations {
        print_wrapped(4, "-", limitation);
    }
}

fn print_paths(result: &ImpactResult) {
    println!();
    println!("  {}:", "Paths".white().bold());
    for path in result.paths.iter().take(MAX_DISPLAY_ITEMS * 5) {
        let chain: String = std::iter::once(path.root().label())
            .chain(
                path.nodes
                    .iter()
                    .skip(1)
                    .zip(&path.edges)
                    .map(|(node, edge)| format!(" ={}=> {}", edge.as_str(), node.label())),
            )
            .collect();
        println!(
            "    {} {} {}",
            level(path.impact_level()),
            path.path_id.dimmed(),
            chain
        );
    }
    if result.paths.len() > MAX_DISPLAY_ITEMS * 5 {
        println!(
            "    ... and {} more (use --json for all)",
            result.paths.len() - MAX_DISPLAY_ITEMS * 5
        );
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
