//! Dependency collection over the statement tree.
//!
//! Traversal threads an immutable [`VisitContext`] through every call: the
//! ambient access mode, the alias scope chain, and whether we are inside a
//! join predicate. Scopes are stack-allocated and linked to their parent by
//! reference, so an inner query sees outer aliases (correlated subqueries) but
//! its own aliases disappear when the call returns. The only mutable state is
//! the per-call [`Collector`] the results are written into.

use std::collections::{HashMap, HashSet};

use super::ast::{
    BinaryOp, Cte, Delete, Exec, Expr, Insert, InsertSource, Merge, MergeAction, ObjectName,
    Query, Script, Select, SetExpr, Statement, TableFactor, TableWithJoins, Update,
};
use crate::types::{
    ColumnReference, DependencyType, EntityRef, EntityType, JoinConditionInfo, RawDependency,
};

/// What a name in scope stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Binding {
    /// A schema table (name as written, qualifiers included)
    Table(String),
    /// Derived table, table-valued function, VALUES list or temp table
    Derived,
    /// Common table expression
    Cte,
}

/// One level of alias bindings, keyed by lowercase name.
#[derive(Debug, Default)]
struct Scope<'p> {
    bindings: HashMap<String, Binding>,
    parent: Option<&'p Scope<'p>>,
}

impl Scope<'_> {
    fn child(&self, bindings: HashMap<String, Binding>) -> Scope<'_> {
        Scope {
            bindings,
            parent: Some(self),
        }
    }

    /// Innermost binding for `name`.
    fn lookup(&self, name: &str) -> Option<&Binding> {
        let key = name.to_ascii_lowercase();
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(binding) = current.bindings.get(&key) {
                return Some(binding);
            }
            scope = current.parent;
        }
        None
    }
}

#[derive(Debug, Clone, Copy)]
struct VisitContext<'s> {
    mode: DependencyType,
    scope: &'s Scope<'s>,
    in_join_condition: bool,
    schema_bound: bool,
}

impl<'s> VisitContext<'s> {
    fn with_mode(self, mode: DependencyType) -> Self {
        Self { mode, ..self }
    }

    fn join_condition(self, in_join_condition: bool) -> Self {
        Self {
            in_join_condition,
            ..self
        }
    }

    fn in_scope<'t>(self, scope: &'t Scope<'t>) -> VisitContext<'t>
    where
        's: 't,
    {
        VisitContext {
            mode: self.mode,
            scope,
            in_join_condition: self.in_join_condition,
            schema_bound: self.schema_bound,
        }
    }

    /// Access mode of a `FROM`/`JOIN` source: always a read, and a schema
    /// dependency inside a schema-bound definition.
    fn read_mode(self) -> DependencyType {
        if self.schema_bound {
            DependencyType::SchemaDependency
        } else {
            DependencyType::Select
        }
    }
}

/// Results of one traversal.
#[derive(Debug, Default)]
pub(crate) struct Collected {
    pub dependencies: Vec<RawDependency>,
    pub join_conditions: Vec<JoinConditionInfo>,
    pub columns: Vec<ColumnReference>,
}

struct Collector<'o> {
    owner: &'o EntityRef,
    collected: Collected,
    seen_dependencies: HashSet<(EntityType, String, DependencyType)>,
    seen_joins: HashSet<JoinConditionInfo>,
    seen_columns: HashSet<ColumnReference>,
}

impl<'o> Collector<'o> {
    fn new(owner: &'o EntityRef) -> Self {
        Self {
            owner,
            collected: Collected::default(),
            seen_dependencies: HashSet::new(),
            seen_joins: HashSet::new(),
            seen_columns: HashSet::new(),
        }
    }

    /// Record a reference, deduplicated by content (names case-insensitively).
    fn dependency(&mut self, target_type: EntityType, name: String, dependency_type: DependencyType) {
        let key = (target_type, name.to_ascii_lowercase(), dependency_type);
        if self.seen_dependencies.insert(key) {
            self.collected.dependencies.push(RawDependency {
                source_type: self.owner.entity_type,
                source_id: self.owner.entity_id,
                target_type,
                target_name: name,
                dependency_type,
            });
        }
    }

    fn join_condition(&mut self, info: JoinConditionInfo) {
        if self.seen_joins.insert(info.clone()) {
            self.collected.join_conditions.push(info);
        }
    }

    fn column(&mut self, column: ColumnReference) {
        if self.seen_columns.insert(column.clone()) {
            self.collected.columns.push(column);
        }
    }
}

/// Walk a parsed definition owned by `owner`.
pub(crate) fn collect(script: &Script, owner: &EntityRef) -> Collected {
    let root = Scope::default();
    let ctx = VisitContext {
        mode: DependencyType::Select,
        scope: &root,
        in_join_condition: false,
        schema_bound: false,
    };
    let mut out = Collector::new(owner);
    for statement in &script.statements {
        visit_statement(statement, ctx, &mut out);
    }
    out.collected
}

// ============================================================================
// Scope construction
// ============================================================================

fn bind(bindings: &mut HashMap<String, Binding>, name: &str, binding: Binding) {
    bindings.insert(name.to_ascii_lowercase(), binding);
}

fn bind_default(bindings: &mut HashMap<String, Binding>, name: &str, binding: Binding) {
    bindings.entry(name.to_ascii_lowercase()).or_insert(binding);
}

fn cte_bindings(ctes: &[Cte]) -> HashMap<String, Binding> {
    ctes.iter()
        .map(|cte| (cte.name.to_ascii_lowercase(), Binding::Cte))
        .collect()
}

/// Bindings introduced by a `FROM` clause, resolved against `parent` for CTEs.
fn collect_aliases(from: &[TableWithJoins], parent: &Scope<'_>) -> HashMap<String, Binding> {
    let mut bindings = HashMap::new();
    for table in from {
        collect_join_aliases(table, parent, &mut bindings);
    }
    bindings
}

fn collect_join_aliases(
    table: &TableWithJoins,
    parent: &Scope<'_>,
    bindings: &mut HashMap<String, Binding>,
) {
    collect_factor_aliases(&table.relation, parent, bindings);
    for join in &table.joins {
        collect_factor_aliases(&join.relation, parent, bindings);
    }
}

fn collect_factor_aliases(
    factor: &TableFactor,
    parent: &Scope<'_>,
    bindings: &mut HashMap<String, Binding>,
) {
    match factor {
        TableFactor::Table { name, alias } => {
            let binding = if name.is_temporary() {
                Binding::Derived
            } else if name.is_bare() && parent.lookup(name.base()) == Some(&Binding::Cte) {
                Binding::Cte
            } else {
                Binding::Table(name.qualified())
            };
            if let Some(alias) = alias {
                bind(bindings, alias, binding.clone());
            }
            if !name.is_bare() {
                bind_default(bindings, &name.qualified(), binding.clone());
            }
            bind_default(bindings, name.base(), binding);
        }
        TableFactor::Function { alias, .. }
        | TableFactor::Derived { alias, .. }
        | TableFactor::Values { alias, .. } => {
            if let Some(alias) = alias {
                bind(bindings, alias, Binding::Derived);
            }
        }
        TableFactor::NestedJoin(inner) => collect_join_aliases(inner, parent, bindings),
    }
}

/// How a column qualifier resolved.
enum Qualifier {
    Table(String),
    Derived,
    /// No binding in any active scope: the prefix token as written
    Unbound(String),
}

fn resolve_qualifier(prefix: &[String], scope: &Scope<'_>) -> Qualifier {
    let last = prefix.last().cloned().unwrap_or_default();
    let joined = prefix
        .iter()
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(".");

    for candidate in [joined.as_str(), last.as_str()] {
        match scope.lookup(candidate) {
            Some(Binding::Table(real)) => return Qualifier::Table(real.clone()),
            Some(Binding::Derived | Binding::Cte) => return Qualifier::Derived,
            None => {}
        }
    }
    Qualifier::Unbound(last)
}

/// Name of a table read in `FROM`/`JOIN`, or `None` for temp tables and CTEs.
fn referenced_table(name: &ObjectName, scope: &Scope<'_>) -> Option<String> {
    if name.is_temporary() {
        return None;
    }
    if name.is_bare() && scope.lookup(name.base()) == Some(&Binding::Cte) {
        return None;
    }
    let qualified = name.qualified();
    (!qualified.is_empty()).then_some(qualified)
}

/// Name of a DML target, following an alias (`UPDATE o ... FROM Orders o`).
fn written_table(name: &ObjectName, scope: &Scope<'_>) -> Option<String> {
    if name.is_temporary() {
        return None;
    }
    if name.is_bare() {
        match scope.lookup(name.base()) {
            Some(Binding::Table(real)) => return Some(real.clone()),
            Some(Binding::Derived | Binding::Cte) => return None,
            None => {}
        }
    }
    let qualified = name.qualified();
    (!qualified.is_empty()).then_some(qualified)
}

// ============================================================================
// Statements
// ============================================================================

fn visit_statement(statement: &Statement, ctx: VisitContext<'_>, out: &mut Collector<'_>) {
    let reads = ctx.with_mode(DependencyType::Select);
    match statement {
        Statement::Query(query) => visit_query(query, reads, out),
        Statement::Insert(insert) => visit_insert(insert, ctx, out),
        Statement::Update(update) => visit_update(update, ctx, out),
        Statement::Delete(delete) => visit_delete(delete, ctx, out),
        Statement::Merge(merge) => visit_merge(merge, ctx, out),
        Statement::Truncate(name) => record_write(name, ctx.with_mode(DependencyType::Delete), out),
        Statement::Exec(exec) => visit_exec(exec, ctx, out),
        Statement::With { ctes, statement } => {
            let scope = ctx.scope.child(cte_bindings(ctes));
            let inner = ctx.in_scope(&scope);
            for cte in ctes {
                visit_query(&cte.query, inner.with_mode(DependencyType::Select), out);
            }
            visit_statement(statement, inner, out);
        }
        Statement::Block(statements) => {
            for statement in statements {
                visit_statement(statement, ctx, out);
            }
        }
        Statement::If {
            condition,
            then_branch,
            else_branch,
        } => {
            visit_expr(condition, reads, out);
            visit_statement(then_branch, ctx, out);
            if let Some(else_branch) = else_branch {
                visit_statement(else_branch, ctx, out);
            }
        }
        Statement::While { condition, body } => {
            visit_expr(condition, reads, out);
            visit_statement(body, ctx, out);
        }
        Statement::Routine(routine) => {
            let ctx = VisitContext {
                schema_bound: routine.schema_bound,
                ..ctx
            };
            for statement in &routine.body {
                visit_statement(statement, ctx, out);
            }
        }
        Statement::Expressions(exprs) => {
            for expr in exprs {
                visit_expr(expr, reads, out);
            }
        }
        Statement::DynamicSql => {}
    }
}

fn record_write(name: &ObjectName, ctx: VisitContext<'_>, out: &mut Collector<'_>) {
    if let Some(table) = written_table(name, ctx.scope) {
        out.dependency(EntityType::Table, table, ctx.mode);
    }
}

fn visit_insert(insert: &Insert, ctx: VisitContext<'_>, out: &mut Collector<'_>) {
    record_write(&insert.target, ctx.with_mode(DependencyType::Insert), out);

    let reads = ctx.with_mode(DependencyType::Select);
    match &insert.source {
        InsertSource::Values(rows) => {
            for expr in rows.iter().flatten() {
                visit_expr(expr, reads, out);
            }
        }
        InsertSource::Query(query) => visit_query(query, reads, out),
        InsertSource::Exec(exec) => visit_exec(exec, reads, out),
        InsertSource::DynamicSql | InsertSource::DefaultValues => {}
    }
}

fn visit_update(update: &Update, ctx: VisitContext<'_>, out: &mut Collector<'_>) {
    let scope = ctx.scope.child(collect_aliases(&update.from, ctx.scope));
    let ctx = ctx.in_scope(&scope);

    record_write(&update.target, ctx.with_mode(DependencyType::Update), out);

    let reads = ctx.with_mode(DependencyType::Select);
    visit_from(&update.from, reads, out);
    for assignment in &update.assignments {
        visit_expr(&assignment.target, reads, out);
        visit_expr(&assignment.value, reads, out);
    }
    if let Some(selection) = &update.selection {
        visit_expr(selection, reads, out);
    }
}

fn visit_delete(delete: &Delete, ctx: VisitContext<'_>, out: &mut Collector<'_>) {
    let scope = ctx.scope.child(collect_aliases(&delete.from, ctx.scope));
    let ctx = ctx.in_scope(&scope);

    record_write(&delete.target, ctx.with_mode(DependencyType::Delete), out);

    let reads = ctx.with_mode(DependencyType::Select);
    visit_from(&delete.from, reads, out);
    if let Some(selection) = &delete.selection {
        visit_expr(selection, reads, out);
    }
}

fn visit_merge(merge: &Merge, ctx: VisitContext<'_>, out: &mut Collector<'_>) {
    let mut bindings = HashMap::new();
    collect_factor_aliases(
        &TableFactor::Table {
            name: merge.target.clone(),
            alias: merge.alias.clone(),
        },
        ctx.scope,
        &mut bindings,
    );
    collect_factor_aliases(&merge.source, ctx.scope, &mut bindings);
    let scope = ctx.scope.child(bindings);
    let ctx = ctx.in_scope(&scope);

    // The target is tagged with the strongest action any WHEN clause takes
    let mode = merge
        .clauses
        .iter()
        .map(|clause| match clause.action {
            MergeAction::Insert(_) => DependencyType::Insert,
            MergeAction::Update(_) => DependencyType::Update,
            MergeAction::Delete => DependencyType::Delete,
        })
        .max()
        .unwrap_or(DependencyType::Update);
    record_write(&merge.target, ctx.with_mode(mode), out);

    let reads = ctx.with_mode(DependencyType::Select);
    visit_table_factor(&merge.source, reads, out);
    visit_expr(&merge.on, reads.join_condition(true), out);
    for clause in &merge.clauses {
        if let Some(condition) = &clause.condition {
            visit_expr(condition, reads, out);
        }
        match &clause.action {
            MergeAction::Update(assignments) => {
                for assignment in assignments {
                    visit_expr(&assignment.target, reads, out);
                    visit_expr(&assignment.value, reads, out);
                }
            }
            MergeAction::Insert(values) => {
                for value in values {
                    visit_expr(value, reads, out);
                }
            }
            MergeAction::Delete => {}
        }
    }
}

fn visit_exec(exec: &Exec, ctx: VisitContext<'_>, out: &mut Collector<'_>) {
    if !exec.procedure.is_temporary() {
        let name = exec.procedure.qualified();
        if !name.is_empty() {
            out.dependency(EntityType::StoredProcedure, name, DependencyType::Exec);
        }
    }
    let reads = ctx.with_mode(DependencyType::Select);
    for arg in &exec.args {
        visit_expr(arg, reads, out);
    }
}

// ============================================================================
// Queries
// ============================================================================

fn visit_query(query: &Query, ctx: VisitContext<'_>, out: &mut Collector<'_>) {
    let scope = ctx.scope.child(cte_bindings(&query.ctes));
    let ctx = ctx.in_scope(&scope).join_condition(false);

    for cte in &query.ctes {
        visit_query(&cte.query, ctx, out);
    }
    visit_set_expr(&query.body, ctx, out);
    for expr in &query.order_by {
        visit_expr(expr, ctx, out);
    }
}

fn visit_set_expr(body: &SetExpr, ctx: VisitContext<'_>, out: &mut Collector<'_>) {
    match body {
        SetExpr::Select(select) => visit_select(select, ctx, out),
        SetExpr::Query(query) => visit_query(query, ctx, out),
        SetExpr::SetOperation { left, right } => {
            visit_set_expr(left, ctx, out);
            visit_set_expr(right, ctx, out);
        }
    }
}

fn visit_select(select: &Select, ctx: VisitContext<'_>, out: &mut Collector<'_>) {
    let scope = ctx.scope.child(collect_aliases(&select.from, ctx.scope));
    let ctx = ctx
        .in_scope(&scope)
        .with_mode(DependencyType::Select)
        .join_condition(false);

    if let Some(into) = &select.into {
        record_write(into, ctx.with_mode(DependencyType::Insert), out);
    }
    visit_from(&select.from, ctx, out);
    for expr in &select.projection {
        visit_expr(expr, ctx, out);
    }
    if let Some(selection) = &select.selection {
        visit_expr(selection, ctx, out);
    }
    for expr in &select.group_by {
        visit_expr(expr, ctx, out);
    }
    if let Some(having) = &select.having {
        visit_expr(having, ctx, out);
    }
}

fn visit_from(from: &[TableWithJoins], ctx: VisitContext<'_>, out: &mut Collector<'_>) {
    for table in from {
        visit_table_with_joins(table, ctx, out);
    }
}

fn visit_table_with_joins(table: &TableWithJoins, ctx: VisitContext<'_>, out: &mut Collector<'_>) {
    visit_table_factor(&table.relation, ctx, out);
    for join in &table.joins {
        visit_table_factor(&join.relation, ctx, out);
        if let Some(constraint) = &join.constraint {
            visit_expr(constraint, ctx.join_condition(true), out);
        }
    }
}

fn visit_table_factor(factor: &TableFactor, ctx: VisitContext<'_>, out: &mut Collector<'_>) {
    let ctx = ctx.join_condition(false);
    match factor {
        TableFactor::Table { name, .. } => {
            if let Some(table) = referenced_table(name, ctx.scope) {
                out.dependency(EntityType::Table, table, ctx.read_mode());
            }
        }
        TableFactor::Function { name, args, .. } => {
            if !name.is_temporary() {
                out.dependency(EntityType::Function, name.qualified(), ctx.read_mode());
            }
            for arg in args {
                visit_expr(arg, ctx, out);
            }
        }
        TableFactor::Derived { subquery, .. } => visit_query(subquery, ctx, out),
        TableFactor::Values { rows, .. } => {
            for expr in rows.iter().flatten() {
                visit_expr(expr, ctx, out);
            }
        }
        TableFactor::NestedJoin(inner) => visit_table_with_joins(inner, ctx, out),
    }
}

// ============================================================================
// Expressions
// ============================================================================

fn visit_expr(expr: &Expr, ctx: VisitContext<'_>, out: &mut Collector<'_>) {
    match expr {
        Expr::Column(name) => record_column(name, ctx, out),
        Expr::Variable | Expr::Literal => {}
        Expr::Binary { left, op, right } => {
            if ctx.in_join_condition && *op == BinaryOp::Eq {
                if let (Expr::Column(l), Expr::Column(r)) = (left.as_ref(), right.as_ref()) {
                    record_join_condition(l, r, ctx, out);
                }
            }
            visit_expr(left, ctx, out);
            visit_expr(right, ctx, out);
        }
        Expr::Function { name, args } => {
            // Only schema-qualified calls can name a user-defined function
            if name.parts.len() >= 2 && !name.is_temporary() {
                out.dependency(EntityType::Function, name.qualified(), ctx.read_mode());
            }
            let ctx = ctx.join_condition(false);
            for arg in args {
                visit_expr(arg, ctx, out);
            }
        }
        Expr::Subquery(query) => visit_query(
            query,
            ctx.with_mode(DependencyType::Select).join_condition(false),
            out,
        ),
        Expr::Nested(exprs) => {
            for expr in exprs {
                visit_expr(expr, ctx, out);
            }
        }
    }
}

fn record_column(name: &ObjectName, ctx: VisitContext<'_>, out: &mut Collector<'_>) {
    let Some((column, prefix)) = name.parts.split_last() else {
        return;
    };
    let table = if prefix.is_empty() {
        None
    } else {
        match resolve_qualifier(prefix, ctx.scope) {
            Qualifier::Table(real) => Some(real),
            Qualifier::Derived | Qualifier::Unbound(_) => {
                prefix.last().filter(|p| !p.is_empty()).cloned()
            }
        }
    };
    out.column(ColumnReference {
        table,
        column: column.clone(),
        full_path: name.dotted(),
    });
}

fn record_join_condition(
    left: &ObjectName,
    right: &ObjectName,
    ctx: VisitContext<'_>,
    out: &mut Collector<'_>,
) {
    let (Some(left_side), Some(right_side)) =
        (join_side(left, ctx.scope), join_side(right, ctx.scope))
    else {
        return;
    };
    out.join_condition(JoinConditionInfo {
        left_table: left_side.0,
        left_column: left_side.1,
        right_table: right_side.0,
        right_column: right_side.1,
    });
}

/// `(table, column)` for one side of a join equality, if it names a table.
fn join_side(name: &ObjectName, scope: &Scope<'_>) -> Option<(String, String)> {
    let (column, prefix) = name.parts.split_last()?;
    if prefix.is_empty() {
        return None;
    }
    match resolve_qualifier(prefix, scope) {
        Qualifier::Table(real) => Some((real, column.clone())),
        Qualifier::Unbound(token) if !token.is_empty() => Some((token, column.clone())),
        Qualifier::Unbound(_) | Qualifier::Derived => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{lexer, parser};

    fn run(sql: &str) -> Collected {
        let tokens = lexer::tokenize(sql).expect("should tokenize");
        let parsed = parser::parse(&tokens).expect("should parse");
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        collect(&parsed.script, &EntityRef::new(EntityType::StoredProcedure, 1))
    }

    fn deps(collected: &Collected) -> Vec<(String, DependencyType)> {
        collected
            .dependencies
            .iter()
            .map(|d| (d.target_name.clone(), d.dependency_type))
            .collect()
    }

    #[test]
    fn inner_alias_shadows_outer_and_does_not_leak() {
        let collected = run(
            "SELECT o.Id FROM Orders o
             WHERE EXISTS (SELECT 1 FROM OrderLines o JOIN Products p ON o.ProductId = p.Id)
             AND o.Status = 1",
        );
        let joins = &collected.join_conditions;
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].left_table, "OrderLines");
        assert_eq!(joins[0].right_table, "Products");

        let status = collected
            .columns
            .iter()
            .find(|c| c.column == "Status")
            .expect("status column");
        assert_eq!(status.table.as_deref(), Some("Orders"));
    }

    #[test]
    fn correlated_subquery_sees_outer_alias() {
        let collected = run(
            "SELECT c.Name FROM Customers c
             WHERE EXISTS (SELECT 1 FROM Orders o WHERE o.CustomerId = c.Id)",
        );
        let id = collected
            .columns
            .iter()
            .find(|col| col.full_path == "c.Id")
            .expect("c.Id column");
        assert_eq!(id.table.as_deref(), Some("Customers"));
    }

    #[test]
    fn unbound_prefix_falls_back_to_token() {
        let collected = run("SELECT x.Id FROM Orders");
        assert_eq!(collected.columns[0].table.as_deref(), Some("x"));
    }

    #[test]
    fn cte_names_are_not_dependencies() {
        let collected = run(
            "WITH recent AS (SELECT Id, CustomerId FROM dbo.Orders)
             SELECT r.Id FROM recent r JOIN dbo.Customers c ON r.CustomerId = c.Id",
        );
        assert_eq!(
            deps(&collected),
            vec![
                ("dbo.Orders".to_string(), DependencyType::Select),
                ("dbo.Customers".to_string(), DependencyType::Select),
            ]
        );
        assert!(collected.join_conditions.is_empty(), "CTE side must be skipped");
    }

    #[test]
    fn update_through_alias_records_real_table() {
        let collected = run(
            "UPDATE o SET o.Status = 2
             FROM dbo.Orders o JOIN dbo.Customers c ON o.CustomerId = c.Id
             WHERE c.IsBlocked = 1",
        );
        assert_eq!(
            deps(&collected),
            vec![
                ("dbo.Orders".to_string(), DependencyType::Update),
                ("dbo.Orders".to_string(), DependencyType::Select),
                ("dbo.Customers".to_string(), DependencyType::Select),
            ]
        );
        assert_eq!(collected.join_conditions.len(), 1);
    }

    #[test]
    fn merge_target_takes_strongest_action() {
        let collected = run(
            "MERGE dbo.Stock AS t USING dbo.Incoming AS s ON t.Sku = s.Sku
             WHEN MATCHED THEN UPDATE SET t.Qty = s.Qty
             WHEN NOT MATCHED BY SOURCE THEN DELETE
             WHEN NOT MATCHED THEN INSERT (Sku, Qty) VALUES (s.Sku, s.Qty);",
        );
        assert_eq!(
            deps(&collected),
            vec![
                ("dbo.Stock".to_string(), DependencyType::Delete),
                ("dbo.Incoming".to_string(), DependencyType::Select),
            ]
        );
        assert_eq!(collected.join_conditions[0].to_string(), "dbo.Stock.Sku = dbo.Incoming.Sku");
    }

    #[test]
    fn schema_bound_reads_are_schema_dependencies() {
        let collected = run(
            "CREATE VIEW dbo.OrderTotals WITH SCHEMABINDING AS
             SELECT o.Id, dbo.fnTotal(o.Id) AS Total FROM dbo.Orders o",
        );
        assert_eq!(
            deps(&collected),
            vec![
                ("dbo.Orders".to_string(), DependencyType::SchemaDependency),
                ("dbo.fnTotal".to_string(), DependencyType::SchemaDependency),
            ]
        );
    }

    #[test]
    fn temp_tables_and_table_variables_are_ignored() {
        let collected = run(
            "SELECT * INTO #work FROM dbo.Orders;
             INSERT INTO @ids SELECT Id FROM #work;
             DELETE FROM #work;",
        );
        assert_eq!(deps(&collected), vec![("dbo.Orders".to_string(), DependencyType::Select)]);
    }

    #[test]
    fn select_into_and_truncate_are_writes() {
        let collected = run("SELECT * INTO dbo.Archive FROM dbo.Orders; TRUNCATE TABLE dbo.Staging");
        assert_eq!(
            deps(&collected),
            vec![
                ("dbo.Archive".to_string(), DependencyType::Insert),
                ("dbo.Orders".to_string(), DependencyType::Select),
                ("dbo.Staging".to_string(), DependencyType::Delete),
            ]
        );
    }

    #[test]
    fn table_valued_functions_are_function_reads() {
        let collected = run("SELECT * FROM dbo.fnActiveOrders(@since) f CROSS APPLY dbo.fnLines(f.Id) l");
        assert_eq!(
            collected
                .dependencies
                .iter()
                .map(|d| (d.target_type, d.target_name.as_str()))
                .collect::<Vec<_>>(),
            vec![
                (EntityType::Function, "dbo.fnActiveOrders"),
                (EntityType::Function, "dbo.fnLines"),
            ]
        );
    }

    #[test]
    fn duplicates_are_collapsed_case_insensitively() {
        let collected = run("SELECT * FROM dbo.Orders; SELECT * FROM DBO.ORDERS;");
        assert_eq!(collected.dependencies.len(), 1);
        assert_eq!(collected.dependencies[0].target_name, "dbo.Orders");
    }
}
