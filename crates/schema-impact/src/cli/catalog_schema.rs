//! `schema-impact catalog-schema` command implementation.

use anyhow::Result;
use schema_impact::CatalogDocument;

use super::display::print_json;

/// Print the JSON Schema of the catalog document.
pub fn run() -> Result<()> {
    print_json(&schemars::schema_for!(CatalogDocument))
}
