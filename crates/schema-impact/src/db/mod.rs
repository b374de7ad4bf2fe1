//! `SQLite` storage layer.
//!
//! The store plays the collaborator role around the analysis core: it holds the
//! schema catalog (objects, criticality annotations, SQL definitions) and the
//! resolved dependency edges, and answers the bounded downstream-dependents
//! query the impact engine starts from.
//!
//! ## Module Structure
//!
//! - `schema` - Database schema (DDL)
//! - `helpers` - Row conversion and parsing utilities
//! - `objects` - Catalog operations (`SchemaCatalog`, import)
//! - `dependencies` - Edge persistence and traversal (`DependencyStore`)

mod dependencies;
mod helpers;
mod objects;
mod schema;

pub(crate) use schema::SCHEMA;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::types::{
    CatalogEntry, DependentRow, EntityRef, EntityType, ProjectId, ResolvedDependency, SchemaObject,
};

/// Read access to a project's schema catalog.
///
/// The resolver builds its lookup maps from these rows and the sync cycle
/// reads definitions through it.
pub trait SchemaCatalog: Send + Sync {
    /// Tables and views of the project, ordered by id.
    fn table_entries(&self, project: ProjectId) -> Result<Vec<CatalogEntry>>;

    /// Stored procedures and functions of the project, ordered by id.
    fn procedure_entries(&self, project: ProjectId) -> Result<Vec<CatalogEntry>>;

    /// Objects that carry (or should carry) a SQL definition: views,
    /// procedures and functions, ordered by id.
    fn definitions(&self, project: ProjectId) -> Result<Vec<SchemaObject>>;

    /// Find an object by (optionally schema-qualified, optionally bracketed)
    /// name. An unqualified name prefers the `dbo` schema.
    fn find_object(
        &self,
        project: ProjectId,
        entity_type: Option<EntityType>,
        name: &str,
    ) -> Result<Option<SchemaObject>>;

    /// Look up an object by its catalog id.
    fn object(&self, project: ProjectId, entity: &EntityRef) -> Result<Option<SchemaObject>>;
}

/// Persistence and traversal of resolved dependency edges.
pub trait DependencyStore: Send + Sync {
    /// Replace the edges of every entity in `sources` with `rows`.
    ///
    /// Runs as one transaction: existing edges whose source appears in
    /// `sources` (or in `rows`) are deleted, then `rows` are inserted. Returns
    /// the number of rows inserted.
    fn replace_dependencies(
        &self,
        project: ProjectId,
        sources: &[EntityRef],
        rows: &[ResolvedDependency],
    ) -> Result<usize>;

    /// All persisted edges of the project.
    fn dependencies(&self, project: ProjectId) -> Result<Vec<ResolvedDependency>>;

    /// Every edge on a dependency chain ending at `root`, at most `max_depth`
    /// edges away, with names and criticality of the dependents.
    ///
    /// A chain is never extended to an entity it already contains.
    fn downstream_dependents(
        &self,
        project: ProjectId,
        root: &EntityRef,
        max_depth: usize,
    ) -> Result<Vec<DependentRow>>;
}

/// `SQLite` database wrapper for the impact store.
///
/// The connection is wrapped in a `Mutex` so the store can be shared across
/// threads behind `&self`.
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open or create the store database.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode and foreign keys
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = %path.display(), "Opened impact store");

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database file location; `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Acquire the connection lock.
    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            Error::Internal(format!(
                "database connection mutex poisoned (a thread panicked while holding the lock): {e}"
            ))
        })
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish_non_exhaustive()
    }
}
