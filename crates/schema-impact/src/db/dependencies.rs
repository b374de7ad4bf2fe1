//! Edge persistence and the bounded downstream-dependents query.

use std::collections::BTreeSet;

use rusqlite::params;

use super::helpers::{
    DEPENDENCY_COLUMNS, parse_dependency_type, parse_entity_type, qualify, row_to_dependency,
    schema_from_db,
};
use super::{DependencyStore, Store};
use crate::error::Result;
use crate::types::{DependentRow, EntityRef, ProjectId, ResolvedDependency};

/// Transitive dependents of a root, one row per edge with its minimum depth.
///
/// Each chain carries a `|type:id|` path string; an edge whose source is
/// already on the chain is not followed, which stops the recursion on cycles.
const DOWNSTREAM_SQL: &str = "
WITH RECURSIVE chain(source_type, source_id, target_type, target_id, dependency_type, depth, path) AS (
    SELECT d.source_type, d.source_id, d.target_type, d.target_id, d.dependency_type, 1,
           '|' || ?2 || ':' || ?3 || '|' || d.source_type || ':' || d.source_id || '|'
    FROM dependencies d
    WHERE d.project_id = ?1
      AND d.target_type = ?2
      AND d.target_id = ?3
      AND NOT (d.source_type = ?2 AND d.source_id = ?3)

    UNION ALL

    SELECT d.source_type, d.source_id, d.target_type, d.target_id, d.dependency_type, c.depth + 1,
           c.path || d.source_type || ':' || d.source_id || '|'
    FROM dependencies d
    JOIN chain c ON d.target_type = c.source_type AND d.target_id = c.source_id
    WHERE d.project_id = ?1
      AND c.depth < ?4
      AND instr(c.path, '|' || d.source_type || ':' || d.source_id || '|') = 0
)
SELECT c.source_type, c.source_id, c.target_type, c.target_id, c.dependency_type,
       MIN(c.depth) AS min_depth,
       src.schema_name, src.name, src.criticality_level,
       tgt.schema_name, tgt.name
FROM chain c
LEFT JOIN schema_objects src ON src.id = c.source_id AND src.project_id = ?1
LEFT JOIN schema_objects tgt ON tgt.id = c.target_id AND tgt.project_id = ?1
GROUP BY c.source_type, c.source_id, c.target_type, c.target_id, c.dependency_type
ORDER BY min_depth, c.source_type, c.source_id, c.target_type, c.target_id, c.dependency_type";

fn name_from(schema: Option<String>, name: Option<String>) -> Option<String> {
    name.map(|name| qualify(schema.and_then(schema_from_db).as_deref(), &name))
}

fn row_to_dependent(row: &rusqlite::Row) -> rusqlite::Result<DependentRow> {
    // Depth is bounded by max_depth, which is at most a few dozen.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let depth = row.get::<_, i64>(5)? as usize;

    Ok(DependentRow {
        source_type: parse_entity_type(0, &row.get::<_, String>(0)?)?,
        source_id: row.get(1)?,
        target_type: parse_entity_type(2, &row.get::<_, String>(2)?)?,
        target_id: row.get(3)?,
        dependency_type: parse_dependency_type(4, &row.get::<_, String>(4)?)?,
        depth,
        source_name: name_from(row.get(6)?, row.get(7)?),
        source_criticality: row.get(8)?,
        target_name: name_from(row.get(9)?, row.get(10)?),
    })
}

impl DependencyStore for Store {
    fn replace_dependencies(
        &self,
        project: ProjectId,
        sources: &[EntityRef],
        rows: &[ResolvedDependency],
    ) -> Result<usize> {
        let resolved_at = chrono::Utc::now().to_rfc3339();

        let cleared: BTreeSet<_> = sources
            .iter()
            .map(|s| (s.entity_type, s.entity_id))
            .chain(rows.iter().map(|r| (r.source_type, r.source_id)))
            .collect();

        let mut conn = self.connection()?;
        let tx = conn.transaction()?;

        {
            let mut delete = tx.prepare_cached(
                "DELETE FROM dependencies
                 WHERE project_id = ?1 AND source_type = ?2 AND source_id = ?3",
            )?;
            for (source_type, source_id) in &cleared {
                delete.execute(params![project.as_i64(), source_type.as_str(), source_id])?;
            }
        }

        let mut inserted = 0;
        {
            let mut insert = tx.prepare_cached(
                "INSERT OR IGNORE INTO dependencies
                     (project_id, source_type, source_id, target_type, target_id,
                      dependency_type, confidence, resolved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for row in rows {
                inserted += insert.execute(params![
                    project.as_i64(),
                    row.source_type.as_str(),
                    row.source_id,
                    row.target_type.as_str(),
                    row.target_id,
                    row.dependency_type.as_str(),
                    row.confidence,
                    resolved_at
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!(
            project = %project,
            sources = cleared.len(),
            inserted,
            "Replaced dependency edges"
        );
        Ok(inserted)
    }

    fn dependencies(&self, project: ProjectId) -> Result<Vec<ResolvedDependency>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DEPENDENCY_COLUMNS} FROM dependencies
             WHERE project_id = ?1
             ORDER BY source_type, source_id, target_type, target_id, dependency_type"
        ))?;
        let rows = stmt
            .query_map([project.as_i64()], row_to_dependency)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn downstream_dependents(
        &self,
        project: ProjectId,
        root: &EntityRef,
        max_depth: usize,
    ) -> Result<Vec<DependentRow>> {
        if max_depth == 0 {
            return Ok(Vec::new());
        }

        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(DOWNSTREAM_SQL)?;
        // max_depth is validated against a small upper bound by the config layer.
        #[allow(clippy::cast_possible_wrap)]
        let depth_bound = max_depth as i64;
        let rows = stmt
            .query_map(
                params![
                    project.as_i64(),
                    root.entity_type.as_str(),
                    root.entity_id,
                    depth_bound
                ],
                row_to_dependent,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        tracing::debug!(
            project = %project,
            root = %root,
            rows = rows.len(),
            "Loaded downstream dependents"
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CatalogObject, DependencyType, EntityType};

    fn edge(source: (EntityType, i64), target: (EntityType, i64), dep: DependencyType) -> ResolvedDependency {
        ResolvedDependency {
            project_id: ProjectId(1),
            source_type: source.0,
            source_id: source.1,
            target_type: target.0,
            target_id: target.1,
            dependency_type: dep,
            confidence: 1.0,
        }
    }

    const T: EntityType = EntityType::Table;
    const P: EntityType = EntityType::StoredProcedure;

    #[test]
    fn replace_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let sources = [EntityRef::new(P, 10)];
        let rows = [
            edge((P, 10), (T, 1), DependencyType::Select),
            edge((P, 10), (T, 2), DependencyType::Update),
        ];

        store.replace_dependencies(ProjectId(1), &sources, &rows).unwrap();
        let first = store.dependencies(ProjectId(1)).unwrap();
        store.replace_dependencies(ProjectId(1), &sources, &rows).unwrap();
        let second = store.dependencies(ProjectId(1)).unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn replace_clears_sources_without_rows() {
        let store = Store::open_in_memory().unwrap();
        store
            .replace_dependencies(
                ProjectId(1),
                &[EntityRef::new(P, 10), EntityRef::new(P, 11)],
                &[
                    edge((P, 10), (T, 1), DependencyType::Select),
                    edge((P, 11), (T, 1), DependencyType::Delete),
                ],
            )
            .unwrap();

        // P11 failed extraction this cycle: its edges become unknown, not stale.
        store
            .replace_dependencies(
                ProjectId(1),
                &[EntityRef::new(P, 10), EntityRef::new(P, 11)],
                &[edge((P, 10), (T, 1), DependencyType::Select)],
            )
            .unwrap();

        let rows = store.dependencies(ProjectId(1)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_id, 10);
    }

    #[test]
    fn replace_leaves_other_sources_alone() {
        let store = Store::open_in_memory().unwrap();
        store
            .replace_dependencies(
                ProjectId(1),
                &[EntityRef::new(P, 10)],
                &[edge((P, 10), (T, 1), DependencyType::Select)],
            )
            .unwrap();
        store
            .replace_dependencies(
                ProjectId(1),
                &[EntityRef::new(P, 11)],
                &[edge((P, 11), (T, 1), DependencyType::Insert)],
            )
            .unwrap();
        assert_eq!(store.dependencies(ProjectId(1)).unwrap().len(), 2);
    }

    #[test]
    fn duplicate_rows_are_ignored() {
        let store = Store::open_in_memory().unwrap();
        let row = edge((P, 10), (T, 1), DependencyType::Select);
        let inserted = store
            .replace_dependencies(ProjectId(1), &[], &[row.clone(), row])
            .unwrap();
        assert_eq!(inserted, 1);
    }

    fn chain_store() -> (Store, i64, i64, i64) {
        let store = Store::open_in_memory().unwrap();
        let object = |object_type, name: &str, criticality| CatalogObject {
            object_type,
            schema: Some("dbo".to_string()),
            name: name.to_string(),
            criticality,
            definition: None,
        };
        let orders = store.upsert_object(ProjectId(1), &object(T, "Orders", Some(4))).unwrap();
        let load = store.upsert_object(ProjectId(1), &object(P, "LoadOrders", Some(5))).unwrap();
        let nightly = store.upsert_object(ProjectId(1), &object(P, "Nightly", None)).unwrap();

        store
            .replace_dependencies(
                ProjectId(1),
                &[],
                &[
                    edge((P, load), (T, orders), DependencyType::Insert),
                    edge((P, nightly), (P, load), DependencyType::Exec),
                    // Cycle back to the first dependent
                    edge((P, load), (P, nightly), DependencyType::Exec),
                ],
            )
            .unwrap();
        (store, orders, load, nightly)
    }

    #[test]
    fn dependents_are_enriched_and_ordered_by_depth() {
        let (store, orders, load, nightly) = chain_store();
        let rows = store
            .downstream_dependents(ProjectId(1), &EntityRef::new(T, orders), 10)
            .unwrap();

        assert_eq!(rows.len(), 2, "cycle edge back to LoadOrders is not followed: {rows:?}");
        assert_eq!(rows[0].source_id, load);
        assert_eq!(rows[0].depth, 1);
        assert_eq!(rows[0].source_name.as_deref(), Some("dbo.LoadOrders"));
        assert_eq!(rows[0].target_name.as_deref(), Some("dbo.Orders"));
        assert_eq!(rows[0].source_criticality, Some(5));
        assert_eq!(rows[1].source_id, nightly);
        assert_eq!(rows[1].depth, 2);
        assert_eq!(rows[1].source_criticality, None);
    }

    #[test]
    fn dependents_respect_depth_bound() {
        let (store, orders, load, _) = chain_store();
        let rows = store
            .downstream_dependents(ProjectId(1), &EntityRef::new(T, orders), 1)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_id, load);

        let none = store
            .downstream_dependents(ProjectId(1), &EntityRef::new(T, orders), 0)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn root_without_dependents_yields_no_rows() {
        let (store, _, _, nightly) = chain_store();
        let rows = store
            .downstream_dependents(ProjectId(2), &EntityRef::new(P, nightly), 10)
            .unwrap();
        assert!(rows.is_empty());
    }
}
