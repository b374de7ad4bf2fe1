//! Schema Impact CLI - SQL dependency mining and change-impact analysis.
//!
//! Imports a schema catalog, mines dependency edges out of its SQL
//! definitions, and reports what a proposed change would break.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use schema_impact::{ChangeType, EntityType, ProjectId};
use tracing_subscriber::EnvFilter;

mod cli;

/// Schema Impact: what breaks if this table, view or procedure changes?
#[derive(Parser)]
#[command(name = "schema-impact")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Workspace root directory (defaults to current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Database file (defaults to .schema-impact/impact.db under the workspace)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Configuration file (defaults to .schema-impact/config.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project id the command operates on
    #[arg(short, long, global = true, default_value = "1")]
    project: i64,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a catalog document (JSON or YAML) into the project
    Import {
        /// Path to the catalog file
        file: PathBuf,
    },

    /// Extract, resolve and store the dependencies of every definition
    Sync,

    /// Extract raw dependencies from one SQL file (no database needed)
    Extract {
        /// Path to the SQL file
        file: PathBuf,

        /// Kind of object the file defines (table, view, procedure, function)
        #[arg(short, long, default_value = "procedure")]
        kind: EntityType,

        /// Print the extraction as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the stored dependency edges of the project
    Deps {
        /// Print the edges as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyse the impact of changing an entity
    Impact {
        /// Entity name, optionally schema-qualified (e.g. "dbo.Orders")
        target: String,

        /// Kind of the entity, when the name is ambiguous
        #[arg(short, long)]
        kind: Option<EntityType>,

        /// Proposed change (create, modify, delete)
        #[arg(short, long, default_value = "modify")]
        change: ChangeType,

        /// Override the configured maximum traversal depth
        #[arg(short, long)]
        depth: Option<usize>,

        /// Also list every scored dependency path
        #[arg(long)]
        paths: bool,

        /// Print the result and verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the JSON Schema of the catalog document
    CatalogSchema,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let workspace = match cli.workspace {
        Some(w) => w,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!(
                    "{}: failed to get current directory: {e}",
                    "error".red().bold()
                );
                return ExitCode::FAILURE;
            }
        },
    };

    let ctx = cli::Context {
        workspace,
        db: cli.db,
        config: cli.config,
        project: ProjectId(cli.project),
    };

    let result = match cli.command {
        Commands::Import { file } => cli::import::run(&ctx, &file),
        Commands::Sync => cli::sync::run(&ctx),
        Commands::Extract { file, kind, json } => cli::extract::run(&file, kind, json),
        Commands::Deps { json } => cli::deps::run(&ctx, json),
        Commands::Impact {
            target,
            kind,
            change,
            depth,
            paths,
            json,
        } => cli::impact::run(
            &ctx,
            &cli::impact::ImpactArgs {
                target,
                kind,
                change,
                depth,
                show_paths: paths,
                json,
            },
        ),
        Commands::CatalogSchema => cli::catalog_schema::run(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            for cause in e.chain().skip(1) {
                eprintln!("  {}: {cause}", "caused by".dimmed());
            }
            ExitCode::FAILURE
        }
    }
}
