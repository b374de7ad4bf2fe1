//! Domain types for schema dependency and impact analysis.
//!
//! These types represent the core domain model:
//! - **Catalog**: `SchemaObject`, `CatalogDocument` (supplied by the schema sync collaborator)
//! - **Extraction**: `RawDependency`, `JoinConditionInfo`, `ColumnReference` (transient)
//! - **Persisted**: `ResolvedDependency` (replaced wholesale per sync cycle)
//! - **Keys**: `EntityRef`, `ProjectId` (graph-node and map keys)
//!
//! ## Design Decisions
//!
//! | Decision | Choice | Rationale |
//! |----------|--------|-----------|
//! | Entity identity | type + id | Display names are informational and may be absent |
//! | `DependencyType` order | Severity order | `max()` over a path yields the dominant access mode |
//! | Criticality | `u8` clamped to 1..=5 | Business annotations arrive unvalidated |

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::SyncFailure;

/// Criticality assumed for entities without a business annotation.
pub const DEFAULT_CRITICALITY: u8 = 3;

/// Lowest valid criticality level.
pub const MIN_CRITICALITY: u8 = 1;

/// Highest valid criticality level.
pub const MAX_CRITICALITY: u8 = 5;

/// Clamp an arbitrary stored criticality value into `1..=5`.
#[must_use]
pub fn clamp_criticality(level: i64) -> u8 {
    // Clamped into 1..=5 first, so the narrowing cast is lossless.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let level = level.clamp(i64::from(MIN_CRITICALITY), i64::from(MAX_CRITICALITY)) as u8;
    level
}

// ============================================================================
// Strongly-typed ID wrappers
// ============================================================================

/// A strongly-typed project ID to prevent mixing with entity IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub i64);

impl ProjectId {
    /// Extract the raw i64 value.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for ProjectId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Kinds of schema objects that participate in the dependency graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Base table
    Table,
    /// View (table-like when referenced)
    View,
    /// Stored procedure
    #[serde(alias = "procedure")]
    StoredProcedure,
    /// Scalar or table-valued function
    Function,
}

impl EntityType {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
            Self::StoredProcedure => "stored_procedure",
            Self::Function => "function",
        }
    }

    /// Whether references to this kind appear in `FROM` clauses.
    #[must_use]
    pub fn is_table_like(&self) -> bool {
        matches!(self, Self::Table | Self::View)
    }

    /// Whether this kind carries a SQL definition worth analysing.
    #[must_use]
    pub fn has_definition(&self) -> bool {
        matches!(self, Self::View | Self::StoredProcedure | Self::Function)
    }

    /// Human-readable name, pluralised for counts other than one.
    #[must_use]
    pub fn label(&self, count: usize) -> &'static str {
        match (self, count == 1) {
            (Self::Table, true) => "table",
            (Self::Table, false) => "tables",
            (Self::View, true) => "view",
            (Self::View, false) => "views",
            (Self::StoredProcedure, true) => "stored procedure",
            (Self::StoredProcedure, false) => "stored procedures",
            (Self::Function, true) => "function",
            (Self::Function, false) => "functions",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" | "u" => Ok(Self::Table),
            "view" | "v" => Ok(Self::View),
            "stored_procedure" | "procedure" | "proc" | "p" => Ok(Self::StoredProcedure),
            "function" | "fn" | "f" => Ok(Self::Function),
            other => Err(format!(
                "unknown entity type '{other}' (expected table, view, procedure or function)"
            )),
        }
    }
}

/// Access mode of a reference from one entity to another.
///
/// Variants are declared in ascending severity order (read < write < schema
/// dependency), so `Ord` compares severity and `max()` picks the dominant mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// Read access (`SELECT`, `FROM`, `JOIN`)
    Select,
    /// Procedure invocation (`EXEC`)
    Exec,
    /// Row insertion
    Insert,
    /// Row modification
    Update,
    /// Row removal (`DELETE`, `TRUNCATE`)
    Delete,
    /// Schema-bound reference that blocks structural changes
    SchemaDependency,
}

impl DependencyType {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Exec => "EXEC",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::SchemaDependency => "SCHEMA_DEPENDENCY",
        }
    }

    /// Whether this access mode modifies data.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }

    /// Whether this access mode only reads data.
    #[must_use]
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Select)
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SELECT" => Ok(Self::Select),
            "EXEC" | "EXECUTE" => Ok(Self::Exec),
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            "SCHEMA_DEPENDENCY" | "SCHEMADEPENDENCY" => Ok(Self::SchemaDependency),
            other => Err(format!("unknown dependency type '{other}'")),
        }
    }
}

/// The kind of change proposed for the root entity of an impact analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// A new entity is introduced
    Create,
    /// An existing entity's structure or behaviour changes
    Modify,
    /// The entity is removed
    Delete,
}

impl ChangeType {
    /// Lowercase name for display.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" | "add" => Ok(Self::Create),
            "modify" | "alter" | "change" => Ok(Self::Modify),
            "delete" | "drop" | "remove" => Ok(Self::Delete),
            other => Err(format!(
                "unknown change type '{other}' (expected create, modify or delete)"
            )),
        }
    }
}

/// Discrete severity tier derived from a risk score.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    /// Nothing is affected
    #[default]
    None,
    /// Cosmetic or read-only exposure
    Low,
    /// Noticeable exposure, review recommended
    Medium,
    /// Breaking exposure, approval required by default
    High,
    /// Breaking exposure on critical entities
    Critical,
}

impl ImpactLevel {
    /// Lowercase name for display.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImpactLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown impact level '{other}'")),
        }
    }
}

// ============================================================================
// Entity references
// ============================================================================

/// Reference to a schema entity: the key of graph nodes and impact maps.
///
/// Equality, ordering and hashing use `(entity_type, entity_id)` only; the
/// display name is carried along for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRef {
    /// Kind of the entity
    pub entity_type: EntityType,
    /// Catalog id of the entity
    pub entity_id: i64,
    /// Qualified name, when known
    pub display_name: Option<String>,
}

impl EntityRef {
    /// Create a reference without a display name.
    #[must_use]
    pub fn new(entity_type: EntityType, entity_id: i64) -> Self {
        Self {
            entity_type,
            entity_id,
            display_name: None,
        }
    }

    /// Create a reference carrying a display name.
    #[must_use]
    pub fn named(entity_type: EntityType, entity_id: i64, name: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id,
            display_name: Some(name.into()),
        }
    }

    /// Display name, or `type#id` when the name is unknown.
    #[must_use]
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("{}#{}", self.entity_type, self.entity_id))
    }

    /// Stable textual key used for path hashing and cycle guards.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.entity_type.as_str(), self.entity_id)
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.entity_type == other.entity_type && self.entity_id == other.entity_id
    }
}

impl Eq for EntityRef {}

impl Hash for EntityRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity_type.hash(state);
        self.entity_id.hash(state);
    }
}

impl PartialOrd for EntityRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntityRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entity_type
            .cmp(&other.entity_type)
            .then(self.entity_id.cmp(&other.entity_id))
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "{} {name}", self.entity_type),
            None => write!(f, "{}#{}", self.entity_type, self.entity_id),
        }
    }
}

// ============================================================================
// Extraction and resolution records
// ============================================================================

/// A textual, unresolved reference found by static analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawDependency {
    /// Kind of the entity whose definition contains the reference
    pub source_type: EntityType,
    /// Catalog id of the owning entity
    pub source_id: i64,
    /// Expected kind of the referenced entity (refined during resolution)
    pub target_type: EntityType,
    /// Name as written (possibly bracketed, schema-qualified or bare)
    pub target_name: String,
    /// How the reference is used
    pub dependency_type: DependencyType,
}

/// A raw dependency mapped to a canonical entity id within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedDependency {
    /// Project the edge belongs to
    pub project_id: ProjectId,
    /// Kind of the dependent entity
    pub source_type: EntityType,
    /// Catalog id of the dependent entity
    pub source_id: i64,
    /// Kind of the entity depended upon
    pub target_type: EntityType,
    /// Catalog id of the entity depended upon
    pub target_id: i64,
    /// How the dependency is used
    pub dependency_type: DependencyType,
    /// 1.0 for statically parsed edges
    pub confidence: f64,
}

impl ResolvedDependency {
    /// Key identifying the edge regardless of confidence.
    #[must_use]
    pub fn edge_key(&self) -> (EntityType, i64, EntityType, i64, DependencyType) {
        (
            self.source_type,
            self.source_id,
            self.target_type,
            self.target_id,
            self.dependency_type,
        )
    }
}

/// Column-equality pair found inside a `JOIN` predicate.
///
/// Table names are real table names: aliases are resolved before recording.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinConditionInfo {
    /// Table on the left of `=`
    pub left_table: String,
    /// Column on the left of `=`
    pub left_column: String,
    /// Table on the right of `=`
    pub right_table: String,
    /// Column on the right of `=`
    pub right_column: String,
}

impl fmt::Display for JoinConditionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} = {}.{}",
            self.left_table, self.left_column, self.right_table, self.right_column
        )
    }
}

/// A column reference seen during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnReference {
    /// Real table name, or the unresolved prefix token; `None` for bare columns
    pub table: Option<String>,
    /// Column name
    pub column: String,
    /// The dotted path as written (e.g. `o.CustomerId`)
    pub full_path: String,
}

// ============================================================================
// Catalog
// ============================================================================

/// A schema object known to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaObject {
    /// Catalog id
    pub id: i64,
    /// Owning project
    pub project_id: ProjectId,
    /// Object kind
    pub object_type: EntityType,
    /// Schema name; `None` when the collaborator did not supply one
    pub schema_name: Option<String>,
    /// Object name
    pub name: String,
    /// Business criticality (1..=5), if annotated
    pub criticality_level: Option<u8>,
    /// SQL body for views, procedures and functions
    pub definition: Option<String>,
}

impl SchemaObject {
    /// `schema.name`, or just `name` when the schema is unknown.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match self.schema_name.as_deref() {
            Some(schema) if !schema.is_empty() => format!("{schema}.{}", self.name),
            _ => self.name.clone(),
        }
    }

    /// Reference to this object, named by its qualified name.
    #[must_use]
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::named(self.object_type, self.id, self.qualified_name())
    }
}

/// One object entry of an importable catalog document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct CatalogObject {
    /// Object kind
    #[serde(rename = "type")]
    pub object_type: EntityType,
    /// Schema name (defaults to none; procedures are treated as `dbo`)
    #[serde(default)]
    pub schema: Option<String>,
    /// Object name
    pub name: String,
    /// Business criticality (1..=5)
    #[serde(default)]
    pub criticality: Option<u8>,
    /// SQL definition for views, procedures and functions
    #[serde(default)]
    pub definition: Option<String>,
}

/// An importable catalog document (JSON or YAML).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CatalogDocument {
    /// Objects to upsert into the project
    #[serde(default)]
    pub objects: Vec<CatalogObject>,
}

/// Name/id row the resolver builds its lookup maps from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Catalog id
    pub id: i64,
    /// Object kind
    pub entity_type: EntityType,
    /// Schema name as stored, possibly absent
    pub schema_name: Option<String>,
    /// Object name
    pub name: String,
}

/// One row of the bounded downstream-dependents query.
///
/// `source` depends on `target`; `depth` is the number of edges between the
/// queried root and `source`.
#[derive(Debug, Clone, PartialEq)]
pub struct DependentRow {
    /// Kind of the dependent entity
    pub source_type: EntityType,
    /// Catalog id of the dependent entity
    pub source_id: i64,
    /// Kind of the entity depended upon
    pub target_type: EntityType,
    /// Catalog id of the entity depended upon
    pub target_id: i64,
    /// How the dependent uses the target
    pub dependency_type: DependencyType,
    /// Shortest distance from the root to `source` (1 = direct dependent)
    pub depth: usize,
    /// Qualified name of the dependent, if it is still in the catalog
    pub source_name: Option<String>,
    /// Qualified name of the target, if it is still in the catalog
    pub target_name: Option<String>,
    /// Business criticality of the dependent, if annotated
    pub source_criticality: Option<i64>,
}

impl DependentRow {
    /// The dependent entity.
    #[must_use]
    pub fn source(&self) -> EntityRef {
        EntityRef {
            entity_type: self.source_type,
            entity_id: self.source_id,
            display_name: self.source_name.clone(),
        }
    }

    /// The entity depended upon.
    #[must_use]
    pub fn target(&self) -> EntityRef {
        EntityRef {
            entity_type: self.target_type,
            entity_id: self.target_id,
            display_name: self.target_name.clone(),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of importing a catalog document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Objects inserted or updated
    pub objects_upserted: usize,
    /// Objects carrying a definition
    pub definitions: usize,
}

/// Outcome of one schema-sync cycle for a project.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Definitions whose extraction was attempted
    pub sources_analyzed: usize,
    /// Per-source failures (counted, never fatal)
    pub failures: Vec<SyncFailure>,
    /// Raw references extracted across all sources
    pub raw_dependencies: usize,
    /// Edges persisted after resolution
    pub resolved_dependencies: usize,
    /// Raw references that matched no catalog object
    pub unresolved_dependencies: usize,
    /// Parser diagnostics across all sources
    pub diagnostics: usize,
    /// Join predicates found, for foreign-key inference
    pub join_conditions: Vec<JoinConditionInfo>,
    /// Wall-clock duration of the cycle
    pub duration: Duration,
}

impl SyncReport {
    /// Number of sources that failed extraction.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}
