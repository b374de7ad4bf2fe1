//! Common display utilities for CLI commands.

use colored::{ColoredString, Colorize};
use schema_impact::ImpactLevel;
use serde::Serialize;

pub const MAX_DISPLAY_ITEMS: usize = 10;

const DEFAULT_TERMINAL_WIDTH: usize = 80;
const MAX_CONTENT_WIDTH: usize = 100;

/// Width available for wrapped text.
pub fn content_width() -> usize {
    terminal_size::terminal_size()
        .map_or(DEFAULT_TERMINAL_WIDTH, |(w, _)| usize::from(w.0))
        .min(MAX_CONTENT_WIDTH)
}

/// Print `text` wrapped to the terminal, every line prefixed by `indent`.
///
/// The first line starts with `bullet` instead of spaces.
pub fn print_wrapped(indent: usize, bullet: &str, text: &str) {
    let width = content_width().saturating_sub(indent + 2).max(20);
    for (i, line) in textwrap::wrap(text, width).iter().enumerate() {
        if i == 0 {
            println!("{:indent$}{} {line}", "", bullet.dimmed());
        } else {
            println!("{:indent$}  {line}", "");
        }
    }
}

/// Print a list of items, showing at most `MAX_DISPLAY_ITEMS`.
///
/// Shows "... and N more" past the limit and `empty_message` when empty.
pub fn print_items<S: AsRef<str>>(items: &[S], empty_message: &str) {
    if items.is_empty() {
        println!("    {}", empty_message.dimmed());
        return;
    }

    for item in items.iter().take(MAX_DISPLAY_ITEMS) {
        println!("    {} {}", "•".dimmed(), item.as_ref());
    }

    if items.len() > MAX_DISPLAY_ITEMS {
        println!(
            "    {} ... and {} more",
            "•".dimmed(),
            items.len() - MAX_DISPLAY_ITEMS
        );
    }
}

/// Impact level coloured by severity.
pub fn level(level: ImpactLevel) -> ColoredString {
    let text = level.as_str().to_uppercase();
    match level {
        ImpactLevel::None => text.dimmed(),
        ImpactLevel::Low => text.green(),
        ImpactLevel::Medium => text.yellow(),
        ImpactLevel::High => text.red(),
        ImpactLevel::Critical => text.red().bold(),
    }
}

/// Pretty-print `value` as JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// `1 path` / `3 paths`.
pub fn plural(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {plural}")
    }
}

