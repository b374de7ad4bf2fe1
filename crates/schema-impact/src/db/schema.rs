//! Database schema definition for the impact store.

/// Database schema definition.
pub(crate) const SCHEMA: &str = r"
-- Schema objects supplied by the catalog collaborator.
-- schema_name is '' when unknown so the unique key treats it as a value.
CREATE TABLE IF NOT EXISTS schema_objects (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL,
    object_type TEXT NOT NULL,
    schema_name TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL,
    criticality_level INTEGER,
    definition TEXT,
    UNIQUE (project_id, object_type, schema_name, name)
);

CREATE INDEX IF NOT EXISTS idx_objects_project ON schema_objects(project_id, object_type);
CREATE INDEX IF NOT EXISTS idx_objects_name ON schema_objects(project_id, name COLLATE NOCASE);

-- Resolved dependency edges: source depends on target.
-- Replaced wholesale per analysed source on every sync.
CREATE TABLE IF NOT EXISTS dependencies (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL,
    source_type TEXT NOT NULL,
    source_id INTEGER NOT NULL,
    target_type TEXT NOT NULL,
    target_id INTEGER NOT NULL,
    dependency_type TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 1.0,
    resolved_at TEXT NOT NULL,
    UNIQUE (project_id, source_type, source_id, target_type, target_id, dependency_type)
);

CREATE INDEX IF NOT EXISTS idx_deps_source ON dependencies(project_id, source_type, source_id);
CREATE INDEX IF NOT EXISTS idx_deps_target ON dependencies(project_id, target_type, target_id);
";
