//! SQL dependency extraction.
//!
//! Turns one procedural SQL definition (procedure, view or function body) into
//! raw, unresolved references tagged with how they are used, plus the
//! column-equality pairs found in join predicates.
//!
//! ## Pipeline
//!
//! 1. **Tokenize** with sqlparser's T-SQL tokenizer ([`lexer`])
//! 2. **Parse** into a small statement tree, recovering at statement boundaries ([`parser`])
//! 3. **Visit** the tree with scoped alias resolution ([`visitor`])
//!
//! Extraction is best-effort. Syntax the parser does not understand is skipped
//! and reported as a [`Diagnostic`]; only pathological nesting is an error.

mod ast;
mod lexer;
mod parser;
mod visitor;

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::types::{ColumnReference, EntityRef, JoinConditionInfo, RawDependency};

pub use parser::MAX_NESTING;

/// A problem the parser recovered from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// 1-indexed source line
    pub line: u64,
    /// What went wrong
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Everything extracted from one definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    /// References to tables, views, procedures and functions, deduplicated by
    /// content in first-seen order
    pub dependencies: Vec<RawDependency>,
    /// Column equalities from `JOIN ... ON` and `MERGE ... ON` predicates
    pub join_conditions: Vec<JoinConditionInfo>,
    /// Column references with their owning table resolved where possible
    pub columns: Vec<ColumnReference>,
    /// Problems the parser skipped over
    pub diagnostics: Vec<Diagnostic>,
    /// Dynamic SQL sites, whose targets are invisible to static analysis
    pub dynamic_sql: usize,
}

impl Extraction {
    /// Whether nothing at all was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty() && self.join_conditions.is_empty() && self.columns.is_empty()
    }
}

/// Extracts raw dependencies from SQL definitions.
///
/// The extractor holds no state between calls: alias scopes and access-mode
/// context live on the stack of each [`extract`](Self::extract) call, so one
/// instance can serve any number of definitions, from any number of threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyExtractor;

impl DependencyExtractor {
    /// Create an extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Extract the dependencies of `owner` from its SQL definition.
    ///
    /// Empty or whitespace-only input yields an empty result. Text that
    /// cannot be tokenized, or from which no statement can be recovered,
    /// yields an empty result and a warning naming `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::NestingTooDeep`] when the definition nests
    /// deeper than [`MAX_NESTING`] levels.
    pub fn extract(&self, sql: &str, owner: &EntityRef) -> Result<Extraction, ExtractError> {
        if sql.trim().is_empty() {
            return Ok(Extraction::default());
        }

        let tokens = match lexer::tokenize(sql) {
            Ok(tokens) => tokens,
            Err(error) => {
                warn!(
                    owner = %owner,
                    error = %error,
                    "SQL definition could not be tokenized, no dependencies extracted"
                );
                return Ok(Extraction::default());
            }
        };

        let parsed = parser::parse(&tokens)?;

        if parsed.script.statements.is_empty() && !parsed.diagnostics.is_empty() {
            warn!(
                owner = %owner,
                diagnostics = parsed.diagnostics.len(),
                "No statements recovered from SQL definition, no dependencies extracted"
            );
            return Ok(Extraction {
                diagnostics: parsed.diagnostics,
                dynamic_sql: parsed.dynamic_sql,
                ..Extraction::default()
            });
        }

        if !parsed.diagnostics.is_empty() {
            warn!(
                owner = %owner,
                diagnostics = parsed.diagnostics.len(),
                "Parser reported diagnostics, continuing best-effort"
            );
            for diagnostic in &parsed.diagnostics {
                debug!(owner = %owner, line = diagnostic.line, "{}", diagnostic.message);
            }
        }

        let collected = visitor::collect(&parsed.script, owner);
        debug!(
            owner = %owner,
            dependencies = collected.dependencies.len(),
            join_conditions = collected.join_conditions.len(),
            "Extracted dependencies"
        );

        Ok(Extraction {
            dependencies: collected.dependencies,
            join_conditions: collected.join_conditions,
            columns: collected.columns,
            diagnostics: parsed.diagnostics,
            dynamic_sql: parsed.dynamic_sql,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DependencyType, EntityType};
    use rstest::rstest;

    fn owner() -> EntityRef {
        EntityRef::named(EntityType::StoredProcedure, 42, "dbo.Owner")
    }

    #[rstest]
    #[case::empty("")]
    #[case::spaces("   ")]
    #[case::newlines("\n\t\r\n")]
    fn blank_definitions_yield_nothing(#[case] sql: &str) {
        let extraction = DependencyExtractor::new().extract(sql, &owner()).unwrap();
        assert_eq!(extraction, Extraction::default());
    }

    #[test]
    fn untokenizable_definition_yields_nothing() {
        let extraction = DependencyExtractor::new()
            .extract("SELECT 'unterminated FROM dbo.Orders", &owner())
            .unwrap();
        assert!(extraction.is_empty());
    }

    #[test]
    fn dependencies_carry_owner() {
        let extraction = DependencyExtractor::new()
            .extract("SELECT * FROM dbo.Orders", &owner())
            .unwrap();
        let dep = &extraction.dependencies[0];
        assert_eq!(dep.source_type, EntityType::StoredProcedure);
        assert_eq!(dep.source_id, 42);
        assert_eq!(dep.target_type, EntityType::Table);
        assert_eq!(dep.dependency_type, DependencyType::Select);
    }

    #[test]
    fn diagnostics_do_not_prevent_extraction() {
        let extraction = DependencyExtractor::new()
            .extract(
                "SELECT FROM WHERE;\nINSERT INTO dbo.Audit (Id) VALUES (1)",
                &owner(),
            )
            .unwrap();
        assert!(!extraction.diagnostics.is_empty());
        assert_eq!(extraction.dependencies.len(), 1);
        assert_eq!(extraction.dependencies[0].dependency_type, DependencyType::Insert);
    }

    #[test]
    fn nesting_limit_is_reported() {
        let sql = format!("SELECT {}1{}", "(".repeat(300), ")".repeat(300));
        let err = DependencyExtractor::new().extract(&sql, &owner()).unwrap_err();
        assert!(matches!(err, ExtractError::NestingTooDeep { .. }));
    }
}
