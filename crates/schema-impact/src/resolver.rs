//! Name resolution of raw dependencies against a project's catalog.
//!
//! Lookup maps are built fresh for every resolution call from the catalog's
//! current contents; nothing is cached between syncs.
//!
//! ## Lookup order
//!
//! Target names are normalized (brackets stripped, a leading `dbo.` dropped,
//! lowercased) and then looked up:
//!
//! 1. exact match on `schema.name`
//! 2. for unqualified names, any entry whose qualified name ends in `.name`
//!    (collisions prefer `dbo`, otherwise the first-seen entry, with a warning)
//! 3. `dbo.name`
//!
//! Names matching nothing are dropped: SQL routinely references system objects
//! and other databases that are not part of the synced schema.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace, warn};

use crate::db::{DependencyStore, SchemaCatalog};
use crate::error::Result;
use crate::types::{
    CatalogEntry, EntityRef, EntityType, ProjectId, RawDependency, ResolvedDependency,
};

/// Confidence recorded for edges found by static parsing.
pub const STATIC_CONFIDENCE: f64 = 1.0;

const DEFAULT_SCHEMA: &str = "dbo";

/// Strip brackets and a leading `dbo.` qualifier, and lowercase.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let stripped: String = name
        .chars()
        .filter(|c| *c != '[' && *c != ']')
        .collect::<String>()
        .trim()
        .to_lowercase();
    match stripped.strip_prefix("dbo.") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => stripped,
    }
}

/// Outcome of resolving one batch.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Resolved edges, deduplicated, in first-seen order
    pub resolved: Vec<ResolvedDependency>,
    /// References that matched no catalog entry
    pub unresolved: Vec<RawDependency>,
    /// Unqualified names found in several schemas, once per name
    pub ambiguous: Vec<AmbiguousName>,
}

/// An unqualified name defined in more than one schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousName {
    /// Normalized name as referenced
    pub name: String,
    /// Every schema defining the name, in catalog order
    pub schemas: Vec<String>,
    /// Schema of the entry the name resolved to
    pub chosen: String,
}

/// Candidate for an unqualified name.
#[derive(Debug)]
struct BareMatch {
    /// Index into `NameIndex::entries`
    chosen: usize,
    /// Every schema defining the name, in first-seen order, when more than one does
    colliding_schemas: Vec<String>,
}

/// Case-insensitive `schema.name` lookup for one family of objects.
#[derive(Debug, Default)]
struct NameIndex {
    entries: Vec<CatalogEntry>,
    qualified: HashMap<String, usize>,
    bare: HashMap<String, BareMatch>,
}

impl NameIndex {
    /// Build from catalog rows, assumed sorted by id (first-seen order).
    ///
    /// With `default_schema` set, entries without a schema are filed under `dbo`.
    fn build(mut entries: Vec<CatalogEntry>, default_schema: bool) -> Self {
        entries.sort_by_key(|e| e.id);

        let mut qualified = HashMap::new();
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();

        for (idx, entry) in entries.iter().enumerate() {
            let schema = match entry.schema_name.as_deref().map(str::trim) {
                Some(s) if !s.is_empty() => Some(s.to_lowercase()),
                _ if default_schema => Some(DEFAULT_SCHEMA.to_string()),
                _ => None,
            };
            let name = entry.name.to_lowercase();
            let key = match &schema {
                Some(schema) => format!("{schema}.{name}"),
                None => name.clone(),
            };
            qualified.entry(key).or_insert(idx);
            if schema.is_some() {
                by_name.entry(name).or_default().push(idx);
            }
        }

        let bare = by_name
            .into_iter()
            .map(|(name, candidates)| {
                let schema_of = |idx: usize| {
                    entries[idx]
                        .schema_name
                        .as_deref()
                        .filter(|s| !s.trim().is_empty())
                        .unwrap_or(DEFAULT_SCHEMA)
                        .to_string()
                };
                let chosen = candidates
                    .iter()
                    .copied()
                    .find(|&idx| schema_of(idx).eq_ignore_ascii_case(DEFAULT_SCHEMA))
                    .unwrap_or(candidates[0]);
                let colliding_schemas = if candidates.len() > 1 {
                    candidates.iter().map(|&idx| schema_of(idx)).collect()
                } else {
                    Vec::new()
                };
                (
                    name,
                    BareMatch {
                        chosen,
                        colliding_schemas,
                    },
                )
            })
            .collect();

        Self {
            entries,
            qualified,
            bare,
        }
    }

    /// Look up a normalized name. Returns the entry and, for an ambiguous
    /// unqualified name, the schemas it collided across.
    fn lookup(&self, normalized: &str) -> Option<(&CatalogEntry, &[String])> {
        if let Some(&idx) = self.qualified.get(normalized) {
            return Some((&self.entries[idx], &[]));
        }

        if !normalized.contains('.') {
            if let Some(found) = self.bare.get(normalized) {
                return Some((&self.entries[found.chosen], &found.colliding_schemas));
            }
        }

        self.qualified
            .get(&format!("{DEFAULT_SCHEMA}.{normalized}"))
            .map(|&idx| (&self.entries[idx], &[][..]))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Maps raw references to catalog ids for one project.
#[derive(Debug)]
pub struct DependencyResolver {
    project: ProjectId,
    tables: NameIndex,
    procedures: NameIndex,
}

impl DependencyResolver {
    /// Build a resolver from catalog rows.
    ///
    /// `tables` holds tables and views; `procedures` holds procedures and
    /// functions. Procedures without a schema are treated as `dbo`.
    #[must_use]
    pub fn new(
        project: ProjectId,
        tables: Vec<CatalogEntry>,
        procedures: Vec<CatalogEntry>,
    ) -> Self {
        Self {
            project,
            tables: NameIndex::build(tables, false),
            procedures: NameIndex::build(procedures, true),
        }
    }

    /// Build a resolver from the catalog's current contents.
    pub fn from_catalog<C: SchemaCatalog + ?Sized>(catalog: &C, project: ProjectId) -> Result<Self> {
        let resolver = Self::new(
            project,
            catalog.table_entries(project)?,
            catalog.procedure_entries(project)?,
        );
        debug!(
            project = %project,
            tables = resolver.tables.len(),
            procedures = resolver.procedures.len(),
            "Built resolution maps"
        );
        Ok(resolver)
    }

    /// Resolve a batch of raw dependencies.
    #[must_use]
    pub fn resolve(&self, raw: &[RawDependency]) -> Resolution {
        let mut resolution = Resolution::default();
        let mut seen = HashSet::new();
        let mut warned = HashSet::new();

        for dep in raw {
            let index = if dep.target_type.is_table_like() {
                &self.tables
            } else {
                &self.procedures
            };
            let normalized = normalize_name(&dep.target_name);

            let Some((entry, collisions)) = index.lookup(&normalized) else {
                trace!(
                    target_name = %dep.target_name,
                    target_type = %dep.target_type,
                    "Unresolved reference dropped"
                );
                resolution.unresolved.push(dep.clone());
                continue;
            };

            if !collisions.is_empty()
                && warned.insert((dep.target_type.is_table_like(), normalized.clone()))
            {
                let chosen = entry
                    .schema_name
                    .as_deref()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(DEFAULT_SCHEMA);
                warn!(
                    name = %normalized,
                    schemas = %collisions.join(", "),
                    chosen,
                    "Unqualified name exists in several schemas"
                );
                resolution.ambiguous.push(AmbiguousName {
                    name: normalized.clone(),
                    schemas: collisions.to_vec(),
                    chosen: chosen.to_string(),
                });
            }

            let resolved = ResolvedDependency {
                project_id: self.project,
                source_type: dep.source_type,
                source_id: dep.source_id,
                target_type: entry.entity_type,
                target_id: entry.id,
                dependency_type: dep.dependency_type,
                confidence: STATIC_CONFIDENCE,
            };
            if seen.insert(resolved.edge_key()) {
                resolution.resolved.push(resolved);
            }
        }

        resolution
    }
}

/// Resolve a batch and replace the persisted edges of `sources` in one transaction.
///
/// Every source in `sources` loses its previous edges, including sources that
/// contributed no raw dependencies (for example because extraction failed).
pub fn resolve_and_store<S>(
    store: &S,
    project: ProjectId,
    sources: &[EntityRef],
    raw: &[RawDependency],
) -> Result<Resolution>
where
    S: SchemaCatalog + DependencyStore + ?Sized,
{
    let resolver = DependencyResolver::from_catalog(store, project)?;
    let resolution = resolver.resolve(raw);
    store.replace_dependencies(project, sources, &resolution.resolved)?;
    debug!(
        project = %project,
        sources = sources.len(),
        resolved = resolution.resolved.len(),
        unresolved = resolution.unresolved.len(),
        "Persisted resolved dependencies"
    );
    Ok(resolution)
}

/// Which family of catalog objects a reference of `target_type` resolves against.
#[must_use]
pub fn lookup_family(target_type: EntityType) -> &'static [EntityType] {
    if target_type.is_table_like() {
        &[EntityType::Table, EntityType::View]
    } else {
        &[EntityType::StoredProcedure, EntityType::Function]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DependencyType;
    use rstest::rstest;

    fn entry(id: i64, entity_type: EntityType, schema: Option<&str>, name: &str) -> CatalogEntry {
        CatalogEntry {
            id,
            entity_type,
            schema_name: schema.map(ToString::to_string),
            name: name.to_string(),
        }
    }

    fn raw(target_type: EntityType, name: &str, dependency_type: DependencyType) -> RawDependency {
        RawDependency {
            source_type: EntityType::StoredProcedure,
            source_id: 100,
            target_type,
            target_name: name.to_string(),
            dependency_type,
        }
    }

    fn resolver() -> DependencyResolver {
        DependencyResolver::new(
            ProjectId(1),
            vec![
                entry(1, EntityType::Table, Some("dbo"), "Orders"),
                entry(2, EntityType::Table, Some("sales"), "Users"),
                entry(3, EntityType::Table, Some("dbo"), "Users"),
                entry(4, EntityType::View, Some("report"), "OrderTotals"),
                entry(5, EntityType::Table, Some("hr"), "Staff"),
                entry(6, EntityType::Table, Some("ops"), "Staff"),
            ],
            vec![
                entry(10, EntityType::StoredProcedure, None, "GetOrders"),
                entry(11, EntityType::Function, Some("dbo"), "fnTotals"),
            ],
        )
    }

    #[rstest]
    #[case::brackets("[dbo].[Orders]", "orders")]
    #[case::plain("Orders", "orders")]
    #[case::other_schema("[sales].Users", "sales.users")]
    #[case::dbo_only("dbo.", "dbo.")]
    fn normalize_strips_brackets_and_dbo(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_name(input), expected);
    }

    #[rstest]
    #[case::qualified("dbo.Orders", 1)]
    #[case::bracketed("[dbo].[Orders]", 1)]
    #[case::bare("orders", 1)]
    #[case::other_schema("sales.Users", 2)]
    #[case::suffix_match("OrderTotals", 4)]
    fn tables_resolve(#[case] name: &str, #[case] expected: i64) {
        let resolution = resolver().resolve(&[raw(EntityType::Table, name, DependencyType::Select)]);
        assert_eq!(resolution.resolved.len(), 1, "{name} should resolve");
        assert_eq!(resolution.resolved[0].target_id, expected);
    }

    #[test]
    fn collision_prefers_dbo() {
        let resolution =
            resolver().resolve(&[raw(EntityType::Table, "Users", DependencyType::Select)]);
        assert_eq!(resolution.resolved[0].target_id, 3);
    }

    #[test]
    fn collision_without_dbo_picks_first_seen() {
        let resolution =
            resolver().resolve(&[raw(EntityType::Table, "Staff", DependencyType::Select)]);
        assert_eq!(resolution.resolved[0].target_id, 5);
        assert_eq!(resolution.ambiguous[0].chosen, "hr");
    }

    #[test]
    fn lookup_reports_every_colliding_schema() {
        let index = NameIndex::build(
            vec![
                entry(3, EntityType::Table, Some("dbo"), "Users"),
                entry(2, EntityType::Table, Some("sales"), "Users"),
            ],
            false,
        );
        let (found, schemas) = index.lookup("users").expect("users resolves");
        assert_eq!(found.id, 3);
        assert_eq!(schemas, ["sales".to_string(), "dbo".to_string()]);

        let (_, schemas) = index.lookup("sales.users").expect("qualified resolves");
        assert!(schemas.is_empty());
    }

    #[test]
    fn ambiguity_is_reported_once_per_name() {
        let resolution = resolver().resolve(&[
            raw(EntityType::Table, "Users", DependencyType::Select),
            raw(EntityType::Table, "[Users]", DependencyType::Update),
            raw(EntityType::Table, "Staff", DependencyType::Select),
            raw(EntityType::Table, "Users", DependencyType::Delete),
        ]);

        assert_eq!(resolution.resolved.len(), 4);
        assert_eq!(
            resolution.ambiguous,
            vec![
                AmbiguousName {
                    name: "users".to_string(),
                    schemas: vec!["sales".to_string(), "dbo".to_string()],
                    chosen: "dbo".to_string(),
                },
                AmbiguousName {
                    name: "staff".to_string(),
                    schemas: vec!["hr".to_string(), "ops".to_string()],
                    chosen: "hr".to_string(),
                },
            ]
        );
    }

    #[test]
    fn qualified_names_are_never_ambiguous() {
        let resolution =
            resolver().resolve(&[raw(EntityType::Table, "sales.Users", DependencyType::Select)]);
        assert!(resolution.ambiguous.is_empty());
    }

    #[test]
    fn view_refines_target_type() {
        let resolution =
            resolver().resolve(&[raw(EntityType::Table, "report.OrderTotals", DependencyType::Select)]);
        assert_eq!(resolution.resolved[0].target_type, EntityType::View);
    }

    #[test]
    fn procedure_without_schema_is_treated_as_dbo() {
        let resolution = resolver().resolve(&[raw(
            EntityType::StoredProcedure,
            "dbo.GetOrders",
            DependencyType::Exec,
        )]);
        assert_eq!(resolution.resolved[0].target_id, 10);
        assert_eq!(resolution.resolved[0].target_type, EntityType::StoredProcedure);
    }

    #[test]
    fn function_references_use_procedure_family() {
        let resolution =
            resolver().resolve(&[raw(EntityType::Function, "dbo.fnTotals", DependencyType::Select)]);
        assert_eq!(resolution.resolved[0].target_type, EntityType::Function);
    }

    #[rstest]
    #[case::system_table("sys.objects")]
    #[case::cross_database("Archive.dbo.Orders")]
    #[case::unknown("Nowhere")]
    fn unknown_names_are_dropped(#[case] name: &str) {
        let resolution = resolver().resolve(&[raw(EntityType::Table, name, DependencyType::Select)]);
        assert!(resolution.resolved.is_empty());
        assert_eq!(resolution.unresolved.len(), 1);
    }

    #[test]
    fn names_resolving_to_the_same_edge_are_deduplicated() {
        let resolution = resolver().resolve(&[
            raw(EntityType::Table, "Orders", DependencyType::Select),
            raw(EntityType::Table, "[dbo].[Orders]", DependencyType::Select),
            raw(EntityType::Table, "dbo.Orders", DependencyType::Update),
        ]);
        assert_eq!(resolution.resolved.len(), 2);
    }

    #[test]
    fn resolved_edges_have_full_confidence() {
        let resolution =
            resolver().resolve(&[raw(EntityType::Table, "Orders", DependencyType::Select)]);
        assert!((resolution.resolved[0].confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(resolution.resolved[0].project_id, ProjectId(1));
    }

    #[test]
    fn lookup_family_groups_table_like_kinds() {
        assert_eq!(
            lookup_family(EntityType::View),
            &[EntityType::Table, EntityType::View]
        );
        assert!(lookup_family(EntityType::StoredProcedure).contains(&EntityType::Function));
    }
}
