//! Statement tree produced by the T-SQL parser.
//!
//! The tree keeps only what dependency extraction needs: object names, the
//! clause each name appears in, aliases, and expressions deep enough to find
//! column references, subqueries and join predicates. Everything else is
//! skipped during parsing.

/// A possibly qualified object name such as `db.dbo.Orders`.
///
/// Omitted qualifiers (`db..Orders`) are kept as empty parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ObjectName {
    pub parts: Vec<String>,
}

impl ObjectName {
    pub fn new(parts: Vec<String>) -> Self {
        Self { parts }
    }

    /// The last part (object or column name).
    pub fn base(&self) -> &str {
        self.parts.last().map_or("", String::as_str)
    }

    /// Join the database, schema and base parts that are present with `.`.
    ///
    /// A leading server part of a four-part name is dropped, and missing
    /// qualifiers are omitted rather than producing empty segments.
    pub fn qualified(&self) -> String {
        let start = self.parts.len().saturating_sub(3);
        self.parts[start..]
            .iter()
            .filter(|p| !p.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Whether this is a single unqualified part.
    pub fn is_bare(&self) -> bool {
        self.parts.len() == 1
    }

    /// Temp tables (`#t`, `##t`) and table variables (`@t`) never name schema objects.
    pub fn is_temporary(&self) -> bool {
        let base = self.base();
        base.starts_with('#') || base.starts_with('@')
    }

    /// The dotted text as written, with omitted parts left empty.
    pub fn dotted(&self) -> String {
        self.parts.join(".")
    }
}

/// A parsed SQL definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Script {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Statement {
    Query(Query),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Merge(Merge),
    Truncate(ObjectName),
    Exec(Exec),
    /// Common table expressions in front of a DML statement
    With {
        ctes: Vec<Cte>,
        statement: Box<Statement>,
    },
    Block(Vec<Statement>),
    If {
        condition: Expr,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
    },
    While {
        condition: Expr,
        body: Box<Statement>,
    },
    Routine(Routine),
    /// Payload expressions of `DECLARE`, `SET`, `RETURN` and friends
    Expressions(Vec<Expr>),
    /// `EXEC (@sql)`, `EXEC @proc`, `sp_executesql`: invisible to static analysis
    DynamicSql,
}

/// `CREATE`/`ALTER` of a procedure, view, function or trigger.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Routine {
    pub name: ObjectName,
    pub schema_bound: bool,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Cte {
    pub name: String,
    pub query: Query,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Query {
    pub ctes: Vec<Cte>,
    pub body: SetExpr,
    pub order_by: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SetExpr {
    Select(Box<Select>),
    Query(Box<Query>),
    SetOperation {
        left: Box<SetExpr>,
        right: Box<SetExpr>,
    },
}

/// One `SELECT` query block: the unit of alias scoping.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Select {
    pub projection: Vec<Expr>,
    pub into: Option<ObjectName>,
    pub from: Vec<TableWithJoins>,
    pub selection: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TableWithJoins {
    pub relation: TableFactor,
    pub joins: Vec<Join>,
}

/// A join; `constraint` is `None` for `CROSS JOIN` and `APPLY`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Join {
    pub relation: TableFactor,
    pub constraint: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TableFactor {
    Table {
        name: ObjectName,
        alias: Option<String>,
    },
    /// Table-valued function call
    Function {
        name: ObjectName,
        args: Vec<Expr>,
        alias: Option<String>,
    },
    Derived {
        subquery: Box<Query>,
        alias: Option<String>,
    },
    /// Table value constructor: `(VALUES (...), (...)) AS v(a, b)`
    Values {
        rows: Vec<Vec<Expr>>,
        alias: Option<String>,
    },
    NestedJoin(Box<TableWithJoins>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Insert {
    pub target: ObjectName,
    pub source: InsertSource,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Query(Box<Query>),
    Exec(Exec),
    /// `INSERT ... EXEC (@sql)`
    DynamicSql,
    DefaultValues,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Assignment {
    pub target: Expr,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Update {
    pub target: ObjectName,
    pub assignments: Vec<Assignment>,
    pub from: Vec<TableWithJoins>,
    pub selection: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Delete {
    pub target: ObjectName,
    pub from: Vec<TableWithJoins>,
    pub selection: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Merge {
    pub target: ObjectName,
    pub alias: Option<String>,
    pub source: TableFactor,
    pub on: Expr,
    pub clauses: Vec<MergeClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MergeClause {
    pub condition: Option<Expr>,
    pub action: MergeAction,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MergeAction {
    Update(Vec<Assignment>),
    Delete,
    Insert(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Exec {
    pub procedure: ObjectName,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Eq,
    And,
    Or,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    /// Possibly qualified column reference: `o.CustomerId`, `Status`
    Column(ObjectName),
    Variable,
    Literal,
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Function {
        name: ObjectName,
        args: Vec<Expr>,
    },
    Subquery(Box<Query>),
    /// Operand groups with no structure of their own (CASE arms, IN lists, unary operands)
    Nested(Vec<Expr>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(parts: &[&str]) -> ObjectName {
        ObjectName::new(parts.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn qualified_joins_present_parts() {
        assert_eq!(name(&["Orders"]).qualified(), "Orders");
        assert_eq!(name(&["dbo", "Orders"]).qualified(), "dbo.Orders");
        assert_eq!(name(&["Sales", "dbo", "Orders"]).qualified(), "Sales.dbo.Orders");
    }

    #[test]
    fn qualified_omits_missing_schema() {
        assert_eq!(name(&["Sales", "", "Orders"]).qualified(), "Sales.Orders");
    }

    #[test]
    fn qualified_drops_server_part() {
        assert_eq!(
            name(&["LinkedSrv", "Sales", "dbo", "Orders"]).qualified(),
            "Sales.dbo.Orders"
        );
    }

    #[test]
    fn temporary_names_are_detected() {
        assert!(name(&["#staging"]).is_temporary());
        assert!(name(&["##global"]).is_temporary());
        assert!(name(&["@rows"]).is_temporary());
        assert!(!name(&["dbo", "Orders"]).is_temporary());
    }
}
