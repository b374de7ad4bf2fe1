//! Catalog operations: importing schema objects and reading them back.

use rusqlite::{OptionalExtension, Transaction, params};

use super::helpers::{OBJECT_COLUMNS, row_to_object, schema_from_db};
use super::{SchemaCatalog, Store};
use crate::error::{Error, Result};
use crate::resolver::lookup_family;
use crate::types::{
    CatalogDocument, CatalogEntry, CatalogObject, EntityRef, EntityType, ImportStats, ProjectId,
    SchemaObject, clamp_criticality,
};

fn upsert_in(tx: &Transaction<'_>, project: ProjectId, object: &CatalogObject) -> Result<i64> {
    let name = object.name.trim();
    if name.is_empty() {
        return Err(Error::Config(format!(
            "catalog {} entry has an empty name",
            object.object_type
        )));
    }
    let schema = object.schema.as_deref().map_or("", str::trim);
    let criticality = object.criticality.map(|c| clamp_criticality(i64::from(c)));

    let id = tx.query_row(
        "INSERT INTO schema_objects
             (project_id, object_type, schema_name, name, criticality_level, definition)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (project_id, object_type, schema_name, name) DO UPDATE SET
             criticality_level = excluded.criticality_level,
             definition = excluded.definition
         RETURNING id",
        params![
            project.as_i64(),
            object.object_type.as_str(),
            schema,
            name,
            criticality,
            object.definition
        ],
        |row| row.get(0),
    )?;
    Ok(id)
}

impl Store {
    /// Insert or update one catalog object, returning its id.
    ///
    /// Objects are keyed by project, type, schema and name; re-importing an
    /// object replaces its criticality and definition and keeps its id.
    pub fn upsert_object(&self, project: ProjectId, object: &CatalogObject) -> Result<i64> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let id = upsert_in(&tx, project, object)?;
        tx.commit()?;
        Ok(id)
    }

    /// Upsert every object of a catalog document in one transaction.
    pub fn import_catalog(&self, project: ProjectId, document: &CatalogDocument) -> Result<ImportStats> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;

        let mut stats = ImportStats::default();
        for object in &document.objects {
            upsert_in(&tx, project, object)?;
            stats.objects_upserted += 1;
            if object.definition.is_some() {
                stats.definitions += 1;
            }
        }

        tx.commit()?;
        tracing::debug!(
            project = %project,
            objects = stats.objects_upserted,
            definitions = stats.definitions,
            "Imported catalog"
        );
        Ok(stats)
    }

    /// Every object of the project, ordered by id.
    pub fn objects(&self, project: ProjectId) -> Result<Vec<SchemaObject>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {OBJECT_COLUMNS} FROM schema_objects WHERE project_id = ?1 ORDER BY id"
        ))?;
        let objects = stmt
            .query_map([project.as_i64()], row_to_object)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(objects)
    }

    fn entries_of(&self, project: ProjectId, kinds: &[EntityType]) -> Result<Vec<CatalogEntry>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, schema_name, name FROM schema_objects
             WHERE project_id = ?1 AND object_type = ?2 ORDER BY id",
        )?;

        let mut entries = Vec::new();
        for &kind in kinds {
            let rows = stmt.query_map(params![project.as_i64(), kind.as_str()], |row| {
                Ok(CatalogEntry {
                    id: row.get(0)?,
                    entity_type: kind,
                    schema_name: schema_from_db(row.get(1)?),
                    name: row.get(2)?,
                })
            })?;
            for row in rows {
                entries.push(row?);
            }
        }
        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }
}

impl SchemaCatalog for Store {
    fn table_entries(&self, project: ProjectId) -> Result<Vec<CatalogEntry>> {
        self.entries_of(project, lookup_family(EntityType::Table))
    }

    fn procedure_entries(&self, project: ProjectId) -> Result<Vec<CatalogEntry>> {
        self.entries_of(project, lookup_family(EntityType::StoredProcedure))
    }

    fn definitions(&self, project: ProjectId) -> Result<Vec<SchemaObject>> {
        Ok(self
            .objects(project)?
            .into_iter()
            .filter(|o| o.object_type.has_definition())
            .collect())
    }

    fn find_object(
        &self,
        project: ProjectId,
        entity_type: Option<EntityType>,
        name: &str,
    ) -> Result<Option<SchemaObject>> {
        let cleaned: String = name.chars().filter(|c| *c != '[' && *c != ']').collect();
        let (schema, base) = match cleaned.trim().rsplit_once('.') {
            Some((schema, base)) => (Some(schema.to_string()), base.to_string()),
            None => (None, cleaned.trim().to_string()),
        };

        let conn = self.connection()?;
        conn.query_row(
            &format!(
                "SELECT {OBJECT_COLUMNS} FROM schema_objects
                 WHERE project_id = ?1
                   AND name = ?2 COLLATE NOCASE
                   AND (?3 IS NULL
                        OR schema_name = ?3 COLLATE NOCASE
                        OR (schema_name = '' AND ?3 = 'dbo' COLLATE NOCASE))
                   AND (?4 IS NULL OR object_type = ?4)
                 ORDER BY CASE WHEN schema_name = 'dbo' COLLATE NOCASE THEN 0 ELSE 1 END, id
                 LIMIT 1"
            ),
            params![
                project.as_i64(),
                base,
                schema,
                entity_type.map(|t| t.as_str())
            ],
            row_to_object,
        )
        .optional()
        .map_err(Into::into)
    }

    fn object(&self, project: ProjectId, entity: &EntityRef) -> Result<Option<SchemaObject>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!(
                "SELECT {OBJECT_COLUMNS} FROM schema_objects
                 WHERE project_id = ?1 AND id = ?2 AND object_type = ?3"
            ),
            params![
                project.as_i64(),
                entity.entity_id,
                entity.entity_type.as_str()
            ],
            row_to_object,
        )
        .optional()
        .map_err(Into::into)
    }
}
