//! Row conversion and parsing utilities.

use crate::types::{
    DependencyType, EntityType, ProjectId, ResolvedDependency, SchemaObject, clamp_criticality,
};

/// SQL column list for the `schema_objects` table.
///
/// Use with `row_to_object` for consistent column ordering.
pub(crate) const OBJECT_COLUMNS: &str =
    "id, project_id, object_type, schema_name, name, criticality_level, definition";

/// SQL column list for the `dependencies` table.
///
/// Use with `row_to_dependency` for consistent column ordering.
pub(crate) const DEPENDENCY_COLUMNS: &str =
    "project_id, source_type, source_id, target_type, target_id, dependency_type, confidence";

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

/// Parse an entity type string from the database.
///
/// Returns an error for unrecognized values, indicating possible database corruption.
pub(crate) fn parse_entity_type(column: usize, s: &str) -> rusqlite::Result<EntityType> {
    s.parse().map_err(|_| {
        conversion_error(
            column,
            format!("Unknown entity type '{s}' in database. Database may be corrupted or from a newer version."),
        )
    })
}

/// Parse a dependency type string from the database.
///
/// Returns an error for unrecognized values, indicating possible database corruption.
pub(crate) fn parse_dependency_type(column: usize, s: &str) -> rusqlite::Result<DependencyType> {
    s.parse().map_err(|_| {
        conversion_error(
            column,
            format!("Unknown dependency type '{s}' in database. Database may be corrupted or from a newer version."),
        )
    })
}

/// `''` is stored for an unknown schema.
pub(crate) fn schema_from_db(schema: String) -> Option<String> {
    if schema.is_empty() { None } else { Some(schema) }
}

/// `schema.name`, or `name` when the schema is blank.
pub(crate) fn qualify(schema: Option<&str>, name: &str) -> String {
    match schema {
        Some(schema) if !schema.is_empty() => format!("{schema}.{name}"),
        _ => name.to_string(),
    }
}

/// Convert a database row to a [`SchemaObject`].
///
/// Expected columns: see [`OBJECT_COLUMNS`].
pub(crate) fn row_to_object(row: &rusqlite::Row) -> rusqlite::Result<SchemaObject> {
    Ok(SchemaObject {
        id: row.get(0)?,
        project_id: ProjectId(row.get(1)?),
        object_type: parse_entity_type(2, &row.get::<_, String>(2)?)?,
        schema_name: schema_from_db(row.get(3)?),
        name: row.get(4)?,
        criticality_level: row.get::<_, Option<i64>>(5)?.map(clamp_criticality),
        definition: row.get(6)?,
    })
}

/// Convert a database row to a [`ResolvedDependency`].
///
/// Expected columns: see [`DEPENDENCY_COLUMNS`].
pub(crate) fn row_to_dependency(row: &rusqlite::Row) -> rusqlite::Result<ResolvedDependency> {
    Ok(ResolvedDependency {
        project_id: ProjectId(row.get(0)?),
        source_type: parse_entity_type(1, &row.get::<_, String>(1)?)?,
        source_id: row.get(2)?,
        target_type: parse_entity_type(3, &row.get::<_, String>(3)?)?,
        target_id: row.get(4)?,
        dependency_type: parse_dependency_type(5, &row.get::<_, String>(5)?)?,
        confidence: row.get(6)?,
    })
}
