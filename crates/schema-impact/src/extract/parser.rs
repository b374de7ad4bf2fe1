//! Recursive-descent parser for T-SQL definitions.
//!
//! The grammar covered is the subset that matters for dependency extraction:
//! query blocks, DML, `EXEC`, control flow and routine headers. Anything else
//! is skipped up to the next statement boundary. Syntax errors are recorded as
//! diagnostics and parsing resumes at the next statement, so a definition with
//! one unsupported construct still yields everything around it.

use super::Diagnostic;
use super::ast::{
    Assignment, BinaryOp, Cte, Delete, Exec, Expr, Insert, InsertSource, Join, Merge,
    MergeAction, MergeClause, ObjectName, Query, Routine, Script, Select, SetExpr, Statement,
    TableFactor, TableWithJoins, Update,
};
use super::lexer::{Lexed, Lexeme};
use crate::error::ExtractError;

/// Maximum nesting of statements, queries and expressions.
pub const MAX_NESTING: usize = 128;

/// Keywords that start a statement (and therefore end the previous one when
/// semicolons are omitted, as T-SQL allows).
const STATEMENT_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "MERGE", "EXEC", "EXECUTE", "WITH", "IF", "ELSE",
    "WHILE", "BEGIN", "END", "DECLARE", "SET", "RETURN", "PRINT", "TRUNCATE", "CREATE", "ALTER",
    "DROP", "OPEN", "FETCH", "CLOSE", "DEALLOCATE", "RAISERROR", "THROW", "GOTO", "BREAK",
    "CONTINUE", "COMMIT", "ROLLBACK", "SAVE", "GO", "USE", "WAITFOR", "GRANT", "DENY", "REVOKE",
];

/// Statements that never reference schema objects in a way we track.
const IGNORED_STATEMENTS: &[&str] = &[
    "PRINT", "RAISERROR", "THROW", "DROP", "OPEN", "FETCH", "CLOSE", "DEALLOCATE", "GOTO",
    "BREAK", "CONTINUE", "COMMIT", "ROLLBACK", "SAVE", "USE", "WAITFOR", "GRANT", "DENY", "REVOKE",
];

/// Clause keywords that can never be an implicit alias or a bare expression.
const CLAUSE_KEYWORDS: &[&str] = &[
    "FROM", "WHERE", "GROUP", "HAVING", "ORDER", "UNION", "EXCEPT", "INTERSECT", "INTO", "ON",
    "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "OUTER", "APPLY", "OPTION", "FOR", "AND",
    "OR", "NOT", "WHEN", "THEN", "AS", "OUTPUT", "USING", "VALUES", "PIVOT", "UNPIVOT",
    "TABLESAMPLE", "OFFSET", "ASC", "DESC", "BY", "IS", "IN", "LIKE", "BETWEEN", "ESCAPE",
    "COLLATE", "OVER",
];

const ROUTINE_KINDS: &[&str] = &["PROCEDURE", "PROC", "VIEW", "FUNCTION", "TRIGGER"];

const JOIN_HINTS: &[&str] = &["LOOP", "HASH", "MERGE", "REMOTE"];

const TABLE_HINTS: &[&str] = &[
    "NOLOCK", "READUNCOMMITTED", "READCOMMITTED", "REPEATABLEREAD", "SERIALIZABLE", "UPDLOCK",
    "HOLDLOCK", "ROWLOCK", "PAGLOCK", "TABLOCK", "TABLOCKX", "XLOCK", "READPAST", "NOWAIT",
];

const COMPARISON_OPS: &[&str] = &["<>", "!=", "<", ">", "<=", ">=", "!<", "!>"];

const ARITHMETIC_OPS: &[&str] = &["+", "-", "/", "%", "&", "|", "^", "||"];

fn is_reserved(word: &str) -> bool {
    STATEMENT_KEYWORDS
        .iter()
        .chain(CLAUSE_KEYWORDS)
        .any(|k| k.eq_ignore_ascii_case(word))
}

/// Parser result: the statements recovered plus what went wrong on the way.
#[derive(Debug, Default)]
pub(crate) struct ParseOutput {
    pub script: Script,
    pub diagnostics: Vec<Diagnostic>,
    /// Dynamic SQL sites (`EXEC (@sql)`, `sp_executesql`)
    pub dynamic_sql: usize,
}

#[derive(Debug)]
enum Failure {
    Syntax(Diagnostic),
    TooDeep { line: u64 },
}

type PResult<T> = std::result::Result<T, Failure>;

/// Parse a token stream into statements.
///
/// Only exceeding [`MAX_NESTING`] is an error; syntax problems become
/// diagnostics.
pub(crate) fn parse(tokens: &[Lexed]) -> Result<ParseOutput, ExtractError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        diagnostics: Vec::new(),
        dynamic_sql: 0,
    };

    let statements = match parser.parse_statements(&[]) {
        Ok(statements) => statements,
        Err(Failure::TooDeep { line }) => {
            return Err(ExtractError::NestingTooDeep {
                limit: MAX_NESTING,
                line,
            });
        }
        Err(Failure::Syntax(diagnostic)) => {
            parser.diagnostics.push(diagnostic);
            Vec::new()
        }
    };

    Ok(ParseOutput {
        script: Script { statements },
        diagnostics: parser.diagnostics,
        dynamic_sql: parser.dynamic_sql,
    })
}

struct Parser<'a> {
    tokens: &'a [Lexed],
    pos: usize,
    depth: usize,
    diagnostics: Vec<Diagnostic>,
    dynamic_sql: usize,
}

impl<'a> Parser<'a> {
    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<&'a Lexeme> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<&'a Lexeme> {
        self.tokens.get(self.pos + n).map(|t| &t.kind)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn line(&self) -> u64 {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn keyword_at(&self, n: usize) -> Option<&'a str> {
        match self.peek_at(n) {
            Some(Lexeme::Word {
                text,
                quoted: false,
            }) => Some(text.as_str()),
            _ => None,
        }
    }

    fn is_kw_at(&self, n: usize, keyword: &str) -> bool {
        self.keyword_at(n)
            .is_some_and(|w| w.eq_ignore_ascii_case(keyword))
    }

    fn is_kw(&self, keyword: &str) -> bool {
        self.is_kw_at(0, keyword)
    }

    fn is_any_kw_at(&self, n: usize, keywords: &[&str]) -> bool {
        self.keyword_at(n)
            .is_some_and(|w| keywords.iter().any(|k| k.eq_ignore_ascii_case(w)))
    }

    fn eat_kw(&mut self, keyword: &str) -> bool {
        if self.is_kw(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, keyword: &str) -> PResult<()> {
        if self.eat_kw(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn is(&self, lexeme: &Lexeme) -> bool {
        self.peek() == Some(lexeme)
    }

    fn eat(&mut self, lexeme: &Lexeme) -> bool {
        if self.is(lexeme) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, lexeme: &Lexeme, what: &str) -> PResult<()> {
        if self.eat(lexeme) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn is_variable_at(&self, n: usize) -> bool {
        self.keyword_at(n).is_some_and(|w| w.starts_with('@'))
    }

    /// `WITH name AS (` or `WITH name (cols) AS (`, as opposed to table hints
    /// and `WITH RECOMPILE`-style options.
    fn at_cte_start(&self) -> bool {
        self.is_kw("WITH")
            && matches!(self.peek_at(1), Some(Lexeme::Word { .. }))
            && (self.is_kw_at(2, "AS") || self.peek_at(2) == Some(&Lexeme::LParen))
    }

    fn at_statement_keyword(&self) -> bool {
        if self.is_kw("WITH") {
            return self.at_cte_start();
        }
        self.is_any_kw_at(0, STATEMENT_KEYWORDS)
    }

    fn at_statement_boundary(&self) -> bool {
        self.at_end() || self.is(&Lexeme::Semicolon) || self.at_statement_keyword()
    }

    fn describe_current(&self) -> String {
        match self.peek() {
            None => "end of input".to_string(),
            Some(Lexeme::Word { text, .. }) => format!("'{text}'"),
            Some(Lexeme::Literal) => "literal".to_string(),
            Some(Lexeme::Period) => "'.'".to_string(),
            Some(Lexeme::Comma) => "','".to_string(),
            Some(Lexeme::LParen) => "'('".to_string(),
            Some(Lexeme::RParen) => "')'".to_string(),
            Some(Lexeme::Eq) => "'='".to_string(),
            Some(Lexeme::Semicolon) => "';'".to_string(),
            Some(Lexeme::Star) => "'*'".to_string(),
            Some(Lexeme::Symbol(s)) => format!("'{s}'"),
        }
    }

    fn unexpected(&self, expected: &str) -> Failure {
        Failure::Syntax(Diagnostic {
            line: self.line(),
            message: format!("expected {expected}, found {}", self.describe_current()),
        })
    }

    fn note(&mut self, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            line: self.line(),
            message: message.into(),
        });
    }

    fn note_dynamic_sql(&mut self) {
        self.dynamic_sql += 1;
        self.note("dynamic SQL cannot be analysed statically");
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(Failure::TooDeep { line: self.line() });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // ------------------------------------------------------------------
    // Skipping
    // ------------------------------------------------------------------

    /// Skip the current statement keyword and everything up to the next boundary.
    fn skip_statement(&mut self) {
        self.pos += 1;
        self.skip_to_boundary();
    }

    fn skip_to_boundary(&mut self) {
        let mut depth = 0usize;
        let mut case_depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Lexeme::LParen => depth += 1,
                Lexeme::RParen => depth = depth.saturating_sub(1),
                Lexeme::Semicolon if depth == 0 => {
                    self.pos += 1;
                    return;
                }
                Lexeme::Word { quoted: false, .. } if depth == 0 => {
                    if self.is_kw("CASE") {
                        case_depth += 1;
                    } else if case_depth > 0 && self.is_kw("END") {
                        case_depth -= 1;
                    } else if self.at_statement_keyword() {
                        return;
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
    }

    /// Skip a balanced parenthesised group starting at the current `(`.
    fn skip_parens(&mut self) -> PResult<()> {
        self.expect(&Lexeme::LParen, "'('")?;
        let mut depth = 1usize;
        while let Some(token) = self.peek() {
            self.pos += 1;
            match token {
                Lexeme::LParen => depth += 1,
                Lexeme::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(self.unexpected("')'"))
    }

    fn looks_like_legacy_hint(&self) -> bool {
        self.is(&Lexeme::LParen)
            && self.is_any_kw_at(1, TABLE_HINTS)
            && matches!(self.peek_at(2), Some(Lexeme::RParen | Lexeme::Comma))
    }

    /// `WITH (NOLOCK)` and the legacy `(NOLOCK)` form.
    fn skip_table_hints(&mut self) -> PResult<()> {
        if self.is_kw("WITH") && self.peek_at(1) == Some(&Lexeme::LParen) {
            self.pos += 1;
            self.skip_parens()?;
        } else if self.looks_like_legacy_hint() {
            self.skip_parens()?;
        }
        Ok(())
    }

    fn skip_column_aliases(&mut self) -> PResult<()> {
        if self.is(&Lexeme::LParen) {
            self.skip_parens()?;
        }
        Ok(())
    }

    fn skip_option_clause(&mut self) -> PResult<()> {
        if self.is_kw("OPTION") && self.peek_at(1) == Some(&Lexeme::LParen) {
            self.pos += 1;
            self.skip_parens()?;
        }
        Ok(())
    }

    /// `OUTPUT inserted.Id, deleted.Name INTO @audit (cols)`
    fn skip_output_clause(&mut self) -> PResult<()> {
        if !self.eat_kw("OUTPUT") {
            return Ok(());
        }
        loop {
            self.parse_expr()?;
            self.parse_alias()?;
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        if self.eat_kw("INTO") {
            self.parse_object_name()?;
            self.skip_column_aliases()?;
        }
        Ok(())
    }

    fn skip_window(&mut self) -> PResult<()> {
        if self.is_kw("WITHIN") && self.is_kw_at(1, "GROUP") {
            self.pos += 2;
            self.skip_parens()?;
        }
        if self.eat_kw("OVER") {
            if self.is(&Lexeme::LParen) {
                self.skip_parens()?;
            } else {
                self.parse_identifier()?;
            }
        }
        Ok(())
    }

    fn skip_type_name(&mut self) -> PResult<()> {
        self.parse_object_name()?;
        if self.is(&Lexeme::LParen) {
            self.skip_parens()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Parse statements until end of input or one of `until` (not consumed).
    fn parse_statements(&mut self, until: &[&str]) -> PResult<Vec<Statement>> {
        let mut statements = Vec::new();
        while !self.at_end() && !self.is_any_kw_at(0, until) {
            let start = self.pos;
            match self.nested(Self::parse_statement) {
                Ok(Some(statement)) => statements.push(statement),
                Ok(None) => {}
                Err(Failure::Syntax(diagnostic)) => {
                    self.diagnostics.push(diagnostic);
                    if self.pos == start {
                        self.pos += 1;
                    }
                    self.skip_to_boundary();
                }
                Err(too_deep @ Failure::TooDeep { .. }) => return Err(too_deep),
            }
            if self.pos == start {
                self.pos += 1;
            }
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> PResult<Option<Statement>> {
        let keyword = match self.peek() {
            None => return Ok(None),
            Some(Lexeme::Semicolon) => {
                self.pos += 1;
                return Ok(None);
            }
            Some(Lexeme::LParen) if self.is_kw_at(1, "SELECT") || self.is_kw_at(1, "WITH") => {
                return Ok(Some(Statement::Query(self.parse_query()?)));
            }
            Some(Lexeme::Word {
                text,
                quoted: false,
            }) => text.to_ascii_uppercase(),
            Some(_) => return Err(self.unexpected("statement")),
        };

        let statement = match keyword.as_str() {
            "SELECT" => Statement::Query(self.parse_query()?),
            "WITH" => self.parse_with()?,
            "INSERT" => Statement::Insert(self.parse_insert()?),
            "UPDATE" if self.is_kw_at(1, "STATISTICS") => {
                self.skip_statement();
                return Ok(None);
            }
            "UPDATE" => Statement::Update(self.parse_update()?),
            "DELETE" => Statement::Delete(self.parse_delete()?),
            "MERGE" => Statement::Merge(self.parse_merge()?),
            "TRUNCATE" => {
                self.pos += 1;
                self.expect_kw("TABLE")?;
                Statement::Truncate(self.parse_object_name()?)
            }
            "EXEC" | "EXECUTE" => return self.parse_exec_statement(),
            "BEGIN" => return self.parse_begin(),
            "IF" => self.parse_if()?,
            "WHILE" => self.parse_while()?,
            "DECLARE" => self.parse_declare()?,
            "SET" => return self.parse_set(),
            "RETURN" => self.parse_return()?,
            "CREATE" | "ALTER" => return self.parse_create_or_alter(),
            "GO" => {
                self.pos += 1;
                return Ok(None);
            }
            "END" | "ELSE" => {
                self.note(format!("unexpected {keyword} outside a block"));
                self.pos += 1;
                return Ok(None);
            }
            kw if IGNORED_STATEMENTS.contains(&kw) => {
                self.skip_statement();
                return Ok(None);
            }
            _ if matches!(self.peek_at(1), Some(Lexeme::Symbol(s)) if s == ":") => {
                // label
                self.pos += 2;
                return Ok(None);
            }
            _ => return Err(self.unexpected("statement")),
        };
        Ok(Some(statement))
    }

    fn parse_with(&mut self) -> PResult<Statement> {
        let ctes = self.parse_ctes()?;
        if self.is_kw("SELECT") || self.is(&Lexeme::LParen) {
            let mut query = self.parse_query()?;
            query.ctes = ctes;
            return Ok(Statement::Query(query));
        }

        let statement = if self.is_kw("INSERT") {
            Statement::Insert(self.parse_insert()?)
        } else if self.is_kw("UPDATE") {
            Statement::Update(self.parse_update()?)
        } else if self.is_kw("DELETE") {
            Statement::Delete(self.parse_delete()?)
        } else if self.is_kw("MERGE") {
            Statement::Merge(self.parse_merge()?)
        } else {
            return Err(self.unexpected("SELECT, INSERT, UPDATE, DELETE or MERGE"));
        };
        Ok(Statement::With {
            ctes,
            statement: Box::new(statement),
        })
    }

    fn parse_ctes(&mut self) -> PResult<Vec<Cte>> {
        self.expect_kw("WITH")?;
        let mut ctes = Vec::new();
        loop {
            let name = self.parse_identifier()?;
            self.skip_column_aliases()?;
            self.expect_kw("AS")?;
            self.expect(&Lexeme::LParen, "'('")?;
            let query = self.parse_query()?;
            self.expect(&Lexeme::RParen, "')'")?;
            ctes.push(Cte { name, query });
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        Ok(ctes)
    }

    fn parse_insert(&mut self) -> PResult<Insert> {
        self.expect_kw("INSERT")?;
        self.parse_top()?;
        self.eat_kw("INTO");
        let target = self.parse_object_name()?;
        self.skip_table_hints()?;
        if self.is(&Lexeme::LParen) && !self.is_kw_at(1, "SELECT") && !self.is_kw_at(1, "WITH") {
            self.skip_parens()?;
        }
        self.skip_output_clause()?;

        let source = if self.eat_kw("VALUES") {
            InsertSource::Values(self.parse_value_rows()?)
        } else if self.is_kw("DEFAULT") && self.is_kw_at(1, "VALUES") {
            self.pos += 2;
            InsertSource::DefaultValues
        } else if self.is_kw("EXEC") || self.is_kw("EXECUTE") {
            match self.parse_exec()? {
                Some(exec) => InsertSource::Exec(exec),
                None => InsertSource::DynamicSql,
            }
        } else {
            InsertSource::Query(Box::new(self.parse_query()?))
        };
        Ok(Insert { target, source })
    }

    fn parse_update(&mut self) -> PResult<Update> {
        self.expect_kw("UPDATE")?;
        self.parse_top()?;
        let target = self.parse_object_name()?;
        self.skip_table_hints()?;
        self.expect_kw("SET")?;
        let assignments = self.parse_assignments()?;
        self.skip_output_clause()?;
        let from = if self.eat_kw("FROM") {
            self.parse_from_list()?
        } else {
            Vec::new()
        };
        let selection = self.parse_where()?;
        self.skip_option_clause()?;
        Ok(Update {
            target,
            assignments,
            from,
            selection,
        })
    }

    fn parse_delete(&mut self) -> PResult<Delete> {
        self.expect_kw("DELETE")?;
        self.parse_top()?;
        self.eat_kw("FROM");
        let target = self.parse_object_name()?;
        self.skip_table_hints()?;
        self.skip_output_clause()?;
        let from = if self.eat_kw("FROM") {
            self.parse_from_list()?
        } else {
            Vec::new()
        };
        let selection = self.parse_where()?;
        self.skip_option_clause()?;
        Ok(Delete {
            target,
            from,
            selection,
        })
    }

    fn parse_merge(&mut self) -> PResult<Merge> {
        self.expect_kw("MERGE")?;
        self.parse_top()?;
        self.eat_kw("INTO");
        let target = self.parse_object_name()?;
        self.skip_table_hints()?;
        let alias = self.parse_alias()?;
        self.expect_kw("USING")?;
        let source = self.parse_table_factor()?;
        self.expect_kw("ON")?;
        let on = self.parse_expr()?;

        let mut clauses = Vec::new();
        while self.eat_kw("WHEN") {
            self.eat_kw("NOT");
            self.expect_kw("MATCHED")?;
            if self.eat_kw("BY") && !self.eat_kw("TARGET") {
                self.expect_kw("SOURCE")?;
            }
            let condition = if self.eat_kw("AND") {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect_kw("THEN")?;

            let action = if self.eat_kw("UPDATE") {
                self.expect_kw("SET")?;
                MergeAction::Update(self.parse_assignments()?)
            } else if self.eat_kw("DELETE") {
                MergeAction::Delete
            } else if self.eat_kw("INSERT") {
                self.skip_column_aliases()?;
                if self.eat_kw("VALUES") {
                    self.expect(&Lexeme::LParen, "'('")?;
                    let values = self.parse_expr_list()?;
                    self.expect(&Lexeme::RParen, "')'")?;
                    MergeAction::Insert(values)
                } else {
                    self.expect_kw("DEFAULT")?;
                    self.expect_kw("VALUES")?;
                    MergeAction::Insert(Vec::new())
                }
            } else {
                return Err(self.unexpected("UPDATE, DELETE or INSERT"));
            };
            clauses.push(MergeClause { condition, action });
        }

        self.skip_output_clause()?;
        self.skip_option_clause()?;
        Ok(Merge {
            target,
            alias,
            source,
            on,
            clauses,
        })
    }

    fn parse_assignments(&mut self) -> PResult<Vec<Assignment>> {
        let mut assignments = Vec::new();
        loop {
            let target = if self.is_variable_at(0) {
                self.pos += 1;
                Expr::Variable
            } else {
                Expr::Column(self.parse_object_name()?)
            };
            if !self.eat_assignment_operator() {
                return Err(self.unexpected("'='"));
            }
            let value = self.parse_expr()?;
            assignments.push(Assignment { target, value });
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        Ok(assignments)
    }

    /// `=` or a compound operator such as `+=`.
    fn eat_assignment_operator(&mut self) -> bool {
        match self.peek() {
            Some(Lexeme::Eq) => {
                self.pos += 1;
                true
            }
            Some(Lexeme::Symbol(s))
                if ARITHMETIC_OPS.contains(&s.as_str()) && self.peek_at(1) == Some(&Lexeme::Eq) =>
            {
                self.pos += 2;
                true
            }
            Some(Lexeme::Symbol(s))
                if s.len() == 2 && s.ends_with('=') && !COMPARISON_OPS.contains(&s.as_str()) =>
            {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn parse_where(&mut self) -> PResult<Option<Expr>> {
        if !self.eat_kw("WHERE") {
            return Ok(None);
        }
        if self.is_kw("CURRENT") && self.is_kw_at(1, "OF") {
            self.pos += 2;
            self.eat_kw("GLOBAL");
            self.parse_identifier()?;
            return Ok(None);
        }
        Ok(Some(self.parse_expr()?))
    }

    fn parse_exec_statement(&mut self) -> PResult<Option<Statement>> {
        // EXECUTE AS USER = '...' changes security context, it calls nothing
        if self.is_kw_at(1, "AS") {
            self.skip_statement();
            return Ok(None);
        }
        Ok(Some(match self.parse_exec()? {
            Some(exec) => Statement::Exec(exec),
            None => Statement::DynamicSql,
        }))
    }

    /// Parse an `EXEC` call; `None` means the target is dynamic.
    fn parse_exec(&mut self) -> PResult<Option<Exec>> {
        self.pos += 1;

        if self.is(&Lexeme::LParen) {
            self.skip_parens()?;
            self.skip_to_boundary_keeping_separator();
            self.note_dynamic_sql();
            return Ok(None);
        }

        // EXEC @rc = dbo.Proc
        if self.is_variable_at(0) && self.peek_at(1) == Some(&Lexeme::Eq) {
            self.pos += 2;
        }
        // EXEC @procName
        if self.is_variable_at(0) {
            self.pos += 1;
            self.parse_exec_args()?;
            self.note_dynamic_sql();
            return Ok(None);
        }

        let procedure = self.parse_object_name()?;
        let args = self.parse_exec_args()?;
        if procedure.base().eq_ignore_ascii_case("sp_executesql") {
            self.note_dynamic_sql();
            return Ok(None);
        }
        Ok(Some(Exec { procedure, args }))
    }

    fn parse_exec_args(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.at_statement_boundary() && !self.is_kw("WITH") {
            args.push(self.parse_expr()?);
            while self.eat_kw("OUTPUT") || self.eat_kw("OUT") || self.eat_kw("READONLY") {}
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        // WITH RECOMPILE / WITH RESULT SETS (...)
        if self.is_kw("WITH") && !self.at_cte_start() {
            self.pos += 1;
            self.skip_to_boundary_keeping_separator();
        }
        Ok(args)
    }

    /// Like [`Self::skip_to_boundary`], but leaves a terminating `;` in place.
    fn skip_to_boundary_keeping_separator(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Lexeme::LParen => depth += 1,
                Lexeme::RParen if depth > 0 => depth -= 1,
                Lexeme::Semicolon | Lexeme::RParen if depth == 0 => return,
                Lexeme::Word { quoted: false, .. } if depth == 0 && self.at_statement_keyword() => {
                    return;
                }
                _ => {}
            }
            self.pos += 1;
        }
    }

    fn parse_begin(&mut self) -> PResult<Option<Statement>> {
        if self.is_any_kw_at(1, &["TRAN", "TRANSACTION", "DISTRIBUTED"]) {
            self.skip_statement();
            return Ok(None);
        }
        self.pos += 1;
        let tail = if self.eat_kw("TRY") {
            Some("TRY")
        } else if self.eat_kw("CATCH") {
            Some("CATCH")
        } else {
            None
        };

        let body = self.parse_statements(&["END"])?;
        if self.eat_kw("END") {
            if let Some(kw) = tail {
                self.eat_kw(kw);
            }
        } else {
            self.note("block is missing END");
        }
        Ok(Some(Statement::Block(body)))
    }

    fn parse_branch(&mut self) -> PResult<Statement> {
        while self.eat(&Lexeme::Semicolon) {}
        Ok(self
            .nested(Self::parse_statement)?
            .unwrap_or(Statement::Block(Vec::new())))
    }

    fn parse_if(&mut self) -> PResult<Statement> {
        self.pos += 1;
        let condition = self.parse_expr()?;
        let then_branch = Box::new(self.parse_branch()?);
        while self.eat(&Lexeme::Semicolon) {}
        let else_branch = if self.eat_kw("ELSE") {
            Some(Box::new(self.parse_branch()?))
        } else {
            None
        };
        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_while(&mut self) -> PResult<Statement> {
        self.pos += 1;
        let condition = self.parse_expr()?;
        let body = Box::new(self.parse_branch()?);
        Ok(Statement::While { condition, body })
    }

    fn parse_declare(&mut self) -> PResult<Statement> {
        self.pos += 1;

        // DECLARE name CURSOR [options] FOR <query> [FOR UPDATE [OF cols]]
        if !self.is_variable_at(0) {
            while !self.is_kw("FOR") {
                if self.at_end() {
                    return Err(self.unexpected("FOR"));
                }
                self.pos += 1;
            }
            self.pos += 1;
            let query = self.parse_query()?;
            if self.is_kw("FOR") && self.is_kw_at(1, "UPDATE") {
                self.pos += 2;
                if self.eat_kw("OF") {
                    loop {
                        self.parse_identifier()?;
                        if !self.eat(&Lexeme::Comma) {
                            break;
                        }
                    }
                }
            }
            return Ok(Statement::Query(query));
        }

        let mut exprs = Vec::new();
        loop {
            if !self.is_variable_at(0) {
                return Err(self.unexpected("variable"));
            }
            self.pos += 1;
            self.eat_kw("AS");
            if self.eat_kw("TABLE") {
                self.skip_parens()?;
            } else if !self.eat_kw("CURSOR") {
                self.skip_type_name()?;
            }
            if self.eat(&Lexeme::Eq) {
                exprs.push(self.parse_expr()?);
            }
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        Ok(Statement::Expressions(exprs))
    }

    fn parse_set(&mut self) -> PResult<Option<Statement>> {
        if !self.is_variable_at(1) {
            // SET NOCOUNT ON, SET TRANSACTION ISOLATION LEVEL ...
            self.skip_statement();
            return Ok(None);
        }
        self.pos += 2;
        if !self.eat_assignment_operator() {
            return Err(self.unexpected("'='"));
        }
        let value = self.parse_expr()?;
        Ok(Some(Statement::Expressions(vec![value])))
    }

    fn parse_return(&mut self) -> PResult<Statement> {
        self.pos += 1;
        if self.at_statement_boundary() {
            return Ok(Statement::Expressions(Vec::new()));
        }
        Ok(Statement::Expressions(vec![self.parse_expr()?]))
    }

    fn parse_create_or_alter(&mut self) -> PResult<Option<Statement>> {
        let kind_at = if self.is_kw_at(1, "OR") && self.is_kw_at(2, "ALTER") {
            3
        } else {
            1
        };
        if !self.is_any_kw_at(kind_at, ROUTINE_KINDS) {
            // tables, indexes and other DDL
            self.skip_statement();
            return Ok(None);
        }
        self.pos += kind_at + 1;
        let name = self.parse_object_name()?;

        let Some(schema_bound) = self.skip_routine_header() else {
            self.note(format!("definition of {} has no AS", name.qualified()));
            return Ok(Some(Statement::Routine(Routine {
                name,
                schema_bound: false,
                body: Vec::new(),
            })));
        };

        let body = self.parse_statements(&["GO"])?;
        Ok(Some(Statement::Routine(Routine {
            name,
            schema_bound,
            body,
        })))
    }

    /// Skip parameters and options up to the `AS` that opens the body.
    ///
    /// Returns whether `SCHEMABINDING` was seen, or `None` if no body was found.
    fn skip_routine_header(&mut self) -> Option<bool> {
        let mut depth = 0usize;
        let mut schema_bound = false;
        let mut after_variable = false;
        while let Some(token) = self.peek() {
            match token {
                Lexeme::LParen => depth += 1,
                Lexeme::RParen => depth = depth.saturating_sub(1),
                Lexeme::Word {
                    text,
                    quoted: false,
                } => {
                    if text.eq_ignore_ascii_case("SCHEMABINDING") {
                        schema_bound = true;
                    } else if depth == 0 && !after_variable && text.eq_ignore_ascii_case("AS") {
                        self.pos += 1;
                        return Some(schema_bound);
                    }
                }
                _ => {}
            }
            // `@param AS int` is a parameter declaration, not the body
            after_variable = self.is_variable_at(0);
            self.pos += 1;
        }
        None
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    fn parse_query(&mut self) -> PResult<Query> {
        self.nested(|p| {
            let ctes = if p.is_kw("WITH") {
                p.parse_ctes()?
            } else {
                Vec::new()
            };
            let body = p.parse_set_expr()?;
            let order_by = if p.is_kw("ORDER") && p.is_kw_at(1, "BY") {
                p.pos += 2;
                p.parse_order_items()?
            } else {
                Vec::new()
            };
            p.skip_query_tail()?;
            Ok(Query {
                ctes,
                body,
                order_by,
            })
        })
    }

    fn parse_order_items(&mut self) -> PResult<Vec<Expr>> {
        let mut items = Vec::new();
        loop {
            items.push(self.parse_expr()?);
            if !self.eat_kw("ASC") {
                self.eat_kw("DESC");
            }
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        Ok(items)
    }

    /// `OFFSET ... FETCH ...`, `FOR XML/JSON ...` and `OPTION (...)`.
    fn skip_query_tail(&mut self) -> PResult<()> {
        if self.eat_kw("OFFSET") {
            self.parse_expr()?;
            if !self.eat_kw("ROWS") {
                self.eat_kw("ROW");
            }
            if self.eat_kw("FETCH") {
                if !self.eat_kw("NEXT") {
                    self.eat_kw("FIRST");
                }
                self.parse_expr()?;
                if !self.eat_kw("ROWS") {
                    self.eat_kw("ROW");
                }
                self.expect_kw("ONLY")?;
            }
        }
        if self.is_kw("FOR") && self.is_any_kw_at(1, &["XML", "JSON", "BROWSE"]) {
            self.pos += 2;
            loop {
                match self.peek() {
                    Some(Lexeme::LParen) => self.skip_parens()?,
                    Some(Lexeme::Comma) => self.pos += 1,
                    Some(Lexeme::Word { .. }) if !self.at_statement_keyword() => {
                        if self.is_any_kw_at(0, CLAUSE_KEYWORDS) {
                            break;
                        }
                        self.pos += 1;
                    }
                    _ => break,
                }
            }
        }
        self.skip_option_clause()
    }

    fn parse_set_expr(&mut self) -> PResult<SetExpr> {
        let mut left = self.parse_set_operand()?;
        loop {
            if self.eat_kw("UNION") {
                self.eat_kw("ALL");
            } else if !(self.eat_kw("EXCEPT") || self.eat_kw("INTERSECT")) {
                break;
            }
            let right = self.parse_set_operand()?;
            left = SetExpr::SetOperation {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_set_operand(&mut self) -> PResult<SetExpr> {
        if self.eat(&Lexeme::LParen) {
            let query = self.parse_query()?;
            self.expect(&Lexeme::RParen, "')'")?;
            return Ok(SetExpr::Query(Box::new(query)));
        }
        if self.is_kw("SELECT") {
            return Ok(SetExpr::Select(Box::new(self.parse_select()?)));
        }
        Err(self.unexpected("SELECT"))
    }

    fn parse_top(&mut self) -> PResult<()> {
        if !self.eat_kw("TOP") {
            return Ok(());
        }
        if self.is(&Lexeme::LParen) {
            self.pos += 1;
            self.parse_expr()?;
            self.expect(&Lexeme::RParen, "')'")?;
        } else {
            self.pos += 1;
        }
        self.eat_kw("PERCENT");
        if self.is_kw("WITH") && self.is_kw_at(1, "TIES") {
            self.pos += 2;
        }
        Ok(())
    }

    fn parse_select(&mut self) -> PResult<Select> {
        self.expect_kw("SELECT")?;
        if !self.eat_kw("ALL") {
            self.eat_kw("DISTINCT");
        }
        self.parse_top()?;

        let mut select = Select::default();
        loop {
            select.projection.push(self.parse_expr()?);
            self.parse_alias()?;
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        if self.eat_kw("INTO") {
            select.into = Some(self.parse_object_name()?);
        }
        if self.eat_kw("FROM") {
            select.from = self.parse_from_list()?;
        }
        select.selection = self.parse_where()?;
        if self.is_kw("GROUP") && self.is_kw_at(1, "BY") {
            self.pos += 2;
            self.eat_kw("ALL");
            select.group_by = self.parse_expr_list()?;
            if self.is_kw("WITH") && self.is_any_kw_at(1, &["ROLLUP", "CUBE"]) {
                self.pos += 2;
            }
        }
        if self.eat_kw("HAVING") {
            select.having = Some(self.parse_expr()?);
        }
        Ok(select)
    }

    fn parse_alias(&mut self) -> PResult<Option<String>> {
        if self.eat_kw("AS") {
            return match self.peek() {
                Some(Lexeme::Word { text, .. }) => {
                    self.pos += 1;
                    Ok(Some(text.clone()))
                }
                Some(Lexeme::Literal) => {
                    self.pos += 1;
                    Ok(None)
                }
                _ => Err(self.unexpected("alias")),
            };
        }
        match self.peek() {
            Some(Lexeme::Word { text, quoted: true }) => {
                self.pos += 1;
                Ok(Some(text.clone()))
            }
            Some(Lexeme::Word {
                text,
                quoted: false,
            }) if !text.starts_with('@') && !is_reserved(text) => {
                self.pos += 1;
                Ok(Some(text.clone()))
            }
            _ => Ok(None),
        }
    }

    fn parse_from_list(&mut self) -> PResult<Vec<TableWithJoins>> {
        let mut from = Vec::new();
        loop {
            from.push(self.parse_table_with_joins()?);
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        Ok(from)
    }

    fn parse_table_with_joins(&mut self) -> PResult<TableWithJoins> {
        let relation = self.parse_table_factor()?;
        let mut joins = Vec::new();
        while let Some(has_predicate) = self.parse_join_operator() {
            let relation = self.parse_table_factor()?;
            let constraint = if has_predicate {
                self.expect_kw("ON")?;
                Some(self.parse_expr()?)
            } else {
                None
            };
            joins.push(Join {
                relation,
                constraint,
            });
        }
        Ok(TableWithJoins { relation, joins })
    }

    /// Consume a join operator; `Some(true)` when an `ON` predicate follows.
    fn parse_join_operator(&mut self) -> Option<bool> {
        if self.is_kw("CROSS") && self.is_kw_at(1, "JOIN") {
            self.pos += 2;
            return Some(false);
        }
        if (self.is_kw("CROSS") || self.is_kw("OUTER")) && self.is_kw_at(1, "APPLY") {
            self.pos += 2;
            return Some(false);
        }

        let mut n = 0;
        if self.is_kw("INNER") {
            n = 1;
        } else if self.is_any_kw_at(0, &["LEFT", "RIGHT", "FULL"]) {
            n = if self.is_kw_at(1, "OUTER") { 2 } else { 1 };
        }
        if self.is_any_kw_at(n, JOIN_HINTS) {
            n += 1;
        }
        if self.is_kw_at(n, "JOIN") {
            self.pos += n + 1;
            return Some(true);
        }
        None
    }

    fn parse_table_factor(&mut self) -> PResult<TableFactor> {
        self.nested(|p| {
            if p.eat(&Lexeme::LParen) {
                if p.is_kw("SELECT") || p.is_kw("WITH") {
                    let subquery = p.parse_query()?;
                    p.expect(&Lexeme::RParen, "')'")?;
                    let alias = p.parse_alias()?;
                    p.skip_column_aliases()?;
                    p.skip_pivot()?;
                    return Ok(TableFactor::Derived {
                        subquery: Box::new(subquery),
                        alias,
                    });
                }
                if p.eat_kw("VALUES") {
                    let rows = p.parse_value_rows()?;
                    p.expect(&Lexeme::RParen, "')'")?;
                    let alias = p.parse_alias()?;
                    p.skip_column_aliases()?;
                    return Ok(TableFactor::Values { rows, alias });
                }
                let inner = p.parse_table_with_joins()?;
                p.expect(&Lexeme::RParen, "')'")?;
                return Ok(TableFactor::NestedJoin(Box::new(inner)));
            }

            let name = p.parse_object_name()?;
            if p.is(&Lexeme::LParen) && !p.looks_like_legacy_hint() {
                let args = p.parse_call_args()?;
                let alias = p.parse_alias()?;
                p.skip_column_aliases()?;
                return Ok(TableFactor::Function { name, args, alias });
            }

            p.skip_table_hints()?;
            if p.eat_kw("TABLESAMPLE") {
                p.eat_kw("SYSTEM");
                p.skip_parens()?;
            }
            let alias = p.parse_alias()?;
            p.skip_table_hints()?;
            p.skip_pivot()?;
            Ok(TableFactor::Table { name, alias })
        })
    }

    /// `PIVOT (...) AS p` / `UNPIVOT (...) AS u`
    fn skip_pivot(&mut self) -> PResult<()> {
        if self.is_kw("PIVOT") || self.is_kw("UNPIVOT") {
            self.pos += 1;
            self.skip_parens()?;
            self.parse_alias()?;
        }
        Ok(())
    }

    fn parse_value_rows(&mut self) -> PResult<Vec<Vec<Expr>>> {
        let mut rows = Vec::new();
        loop {
            self.expect(&Lexeme::LParen, "'('")?;
            rows.push(self.parse_expr_list()?);
            self.expect(&Lexeme::RParen, "')'")?;
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        Ok(rows)
    }

    fn parse_object_name(&mut self) -> PResult<ObjectName> {
        let mut parts = vec![self.parse_identifier()?];
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(Lexeme::Period), Some(Lexeme::Word { text, .. })) => {
                    parts.push(text.clone());
                    self.pos += 2;
                }
                (Some(Lexeme::Period), Some(Lexeme::Period)) => {
                    parts.push(String::new());
                    self.pos += 1;
                }
                _ => break,
            }
        }
        Ok(ObjectName::new(parts))
    }

    fn parse_identifier(&mut self) -> PResult<String> {
        match self.peek() {
            Some(Lexeme::Word { text, .. }) => {
                self.pos += 1;
                Ok(text.clone())
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.nested(Self::parse_or)
    }

    fn parse_expr_list(&mut self) -> PResult<Vec<Expr>> {
        let mut exprs = Vec::new();
        loop {
            exprs.push(self.parse_expr()?);
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        Ok(exprs)
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_kw("OR") {
            let right = self.parse_and()?;
            left = binary(left, BinaryOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_kw("AND") {
            let right = self.parse_not()?;
            left = binary(left, BinaryOp::And, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> PResult<Expr> {
        if self.eat_kw("NOT") {
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Nested(vec![inner]));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            if self.eat(&Lexeme::Eq) {
                let right = self.parse_additive()?;
                left = binary(left, BinaryOp::Eq, right);
                continue;
            }
            if matches!(self.peek(), Some(Lexeme::Symbol(s)) if COMPARISON_OPS.contains(&s.as_str()))
            {
                self.pos += 1;
                let right = self.parse_additive()?;
                left = binary(left, BinaryOp::Other, right);
                continue;
            }

            if self.is_kw("NOT") && self.is_any_kw_at(1, &["IN", "LIKE", "BETWEEN"]) {
                self.pos += 1;
            }
            if self.eat_kw("IS") {
                self.eat_kw("NOT");
                let right = self.parse_additive()?;
                left = binary(left, BinaryOp::Other, right);
            } else if self.eat_kw("IN") {
                self.expect(&Lexeme::LParen, "'('")?;
                let right = if self.is_kw("SELECT") || self.is_kw("WITH") {
                    Expr::Subquery(Box::new(self.parse_query()?))
                } else {
                    Expr::Nested(self.parse_expr_list()?)
                };
                self.expect(&Lexeme::RParen, "')'")?;
                left = binary(left, BinaryOp::Other, right);
            } else if self.eat_kw("LIKE") {
                let mut operands = vec![left, self.parse_additive()?];
                if self.eat_kw("ESCAPE") {
                    operands.push(self.parse_additive()?);
                }
                left = Expr::Nested(operands);
            } else if self.eat_kw("BETWEEN") {
                let low = self.parse_additive()?;
                self.expect_kw("AND")?;
                let high = self.parse_additive()?;
                left = Expr::Nested(vec![left, low, high]);
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let is_operator = match self.peek() {
                Some(Lexeme::Star) => true,
                Some(Lexeme::Symbol(s)) => {
                    ARITHMETIC_OPS.contains(&s.as_str()) && self.peek_at(1) != Some(&Lexeme::Eq)
                }
                _ => false,
            };
            if !is_operator {
                break;
            }
            self.pos += 1;
            let right = self.parse_unary()?;
            left = binary(left, BinaryOp::Other, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        if matches!(self.peek(), Some(Lexeme::Symbol(s)) if matches!(s.as_str(), "-" | "+" | "~"))
        {
            self.pos += 1;
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expr::Nested(vec![operand]));
        }

        let expr = self.parse_primary()?;
        if self.eat_kw("COLLATE") {
            self.parse_identifier()?;
        }
        if self.is_kw("AT") && self.is_kw_at(1, "TIME") && self.is_kw_at(2, "ZONE") {
            self.pos += 3;
            let zone = self.parse_primary()?;
            return Ok(Expr::Nested(vec![expr, zone]));
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        match self.peek() {
            Some(Lexeme::Literal | Lexeme::Star) => {
                self.pos += 1;
                Ok(Expr::Literal)
            }
            Some(Lexeme::LParen) => {
                self.pos += 1;
                if self.is_kw("SELECT") || self.is_kw("WITH") {
                    let query = self.parse_query()?;
                    self.expect(&Lexeme::RParen, "')'")?;
                    return Ok(Expr::Subquery(Box::new(query)));
                }
                let mut exprs = self.parse_expr_list()?;
                self.expect(&Lexeme::RParen, "')'")?;
                Ok(if exprs.len() == 1 {
                    exprs.remove(0)
                } else {
                    Expr::Nested(exprs)
                })
            }
            Some(Lexeme::Word { text, quoted }) => {
                if !quoted {
                    if text.starts_with('@') {
                        self.pos += 1;
                        return Ok(Expr::Variable);
                    }
                    match text.to_ascii_uppercase().as_str() {
                        "NULL" | "DEFAULT" => {
                            self.pos += 1;
                            return Ok(Expr::Literal);
                        }
                        "EXISTS" => {
                            self.pos += 1;
                            self.expect(&Lexeme::LParen, "'('")?;
                            let query = self.parse_query()?;
                            self.expect(&Lexeme::RParen, "')'")?;
                            return Ok(Expr::Subquery(Box::new(query)));
                        }
                        "CASE" => return self.parse_case(),
                        "CAST" | "TRY_CAST" => return self.parse_cast(),
                        upper
                            if is_reserved(upper) && self.peek_at(1) != Some(&Lexeme::LParen) =>
                        {
                            return Err(self.unexpected("expression"));
                        }
                        _ => {}
                    }
                }

                let name = self.parse_object_name()?;
                if self.is(&Lexeme::LParen) {
                    let args = self.parse_call_args()?;
                    self.skip_window()?;
                    return Ok(Expr::Function { name, args });
                }
                if self.is(&Lexeme::Period) && self.peek_at(1) == Some(&Lexeme::Star) {
                    self.pos += 2;
                    return Ok(Expr::Literal);
                }
                Ok(Expr::Column(name))
            }
            // `@@ROWCOUNT` may arrive as an operator token followed by the name
            Some(Lexeme::Symbol(s)) if s.starts_with('@') => {
                self.pos += 1;
                if matches!(self.peek(), Some(Lexeme::Word { .. })) {
                    self.pos += 1;
                }
                Ok(Expr::Variable)
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_call_args(&mut self) -> PResult<Vec<Expr>> {
        self.expect(&Lexeme::LParen, "'('")?;
        if self.eat(&Lexeme::RParen) {
            return Ok(Vec::new());
        }
        if !self.eat_kw("DISTINCT") {
            self.eat_kw("ALL");
        }
        let mut args = Vec::new();
        loop {
            args.push(self.parse_expr()?);
            // TRIM(' ' FROM x)
            if self.eat_kw("FROM") {
                args.push(self.parse_expr()?);
            }
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        self.expect(&Lexeme::RParen, "')'")?;
        Ok(args)
    }

    fn parse_case(&mut self) -> PResult<Expr> {
        self.pos += 1;
        let mut parts = Vec::new();
        if !self.is_kw("WHEN") {
            parts.push(self.parse_expr()?);
        }
        while self.eat_kw("WHEN") {
            parts.push(self.parse_expr()?);
            self.expect_kw("THEN")?;
            parts.push(self.parse_expr()?);
        }
        if self.eat_kw("ELSE") {
            parts.push(self.parse_expr()?);
        }
        self.expect_kw("END")?;
        Ok(Expr::Nested(parts))
    }

    fn parse_cast(&mut self) -> PResult<Expr> {
        self.pos += 1;
        self.expect(&Lexeme::LParen, "'('")?;
        let operand = self.parse_expr()?;
        self.expect_kw("AS")?;
        self.skip_type_name()?;
        self.expect(&Lexeme::RParen, "')'")?;
        Ok(Expr::Nested(vec![operand]))
    }
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::lexer::tokenize;

    fn parse_sql(sql: &str) -> ParseOutput {
        let tokens = tokenize(sql).expect("should tokenize");
        parse(&tokens).expect("should parse")
    }

    #[test]
    fn parses_select_with_join() {
        let output = parse_sql("SELECT * FROM Customers c JOIN Orders o ON o.CustomerId = c.Id");
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        let [Statement::Query(query)] = output.script.statements.as_slice() else {
            panic!("expected one query, got {:?}", output.script.statements);
        };
        let SetExpr::Select(select) = &query.body else {
            panic!("expected select body");
        };
        assert_eq!(select.from.len(), 1);
        assert_eq!(select.from[0].joins.len(), 1);
        assert!(select.from[0].joins[0].constraint.is_some());
    }

    #[test]
    fn statements_without_semicolons_are_split() {
        let output = parse_sql(
            "SELECT Id FROM dbo.Orders\nUPDATE dbo.Orders SET Status = 1\nEXEC dbo.Audit",
        );
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        assert_eq!(output.script.statements.len(), 3);
        assert!(matches!(output.script.statements[2], Statement::Exec(_)));
    }

    #[test]
    fn procedure_header_is_skipped_and_body_parsed() {
        let output = parse_sql(
            "CREATE PROCEDURE dbo.GetOrders @CustomerId AS INT, @Top INT = 10 AS
             BEGIN
                 SET NOCOUNT ON;
                 SELECT TOP (@Top) * FROM dbo.Orders WHERE CustomerId = @CustomerId;
             END",
        );
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        let [Statement::Routine(routine)] = output.script.statements.as_slice() else {
            panic!("expected routine, got {:?}", output.script.statements);
        };
        assert_eq!(routine.name.qualified(), "dbo.GetOrders");
        assert!(!routine.schema_bound);
        assert_eq!(routine.body.len(), 1);
    }

    #[test]
    fn schemabinding_is_detected() {
        let output = parse_sql(
            "CREATE VIEW dbo.ActiveOrders WITH SCHEMABINDING AS SELECT Id FROM dbo.Orders",
        );
        let [Statement::Routine(routine)] = output.script.statements.as_slice() else {
            panic!("expected routine");
        };
        assert!(routine.schema_bound);
    }

    #[test]
    fn dynamic_exec_is_counted() {
        let output = parse_sql("DECLARE @sql NVARCHAR(MAX) = N'SELECT 1'; EXEC (@sql); EXEC sp_executesql @sql;");
        assert_eq!(output.dynamic_sql, 2);
        assert!(
            output
                .script
                .statements
                .iter()
                .filter(|s| matches!(s, Statement::DynamicSql))
                .count()
                == 2
        );
    }

    #[test]
    fn syntax_error_recovers_at_next_statement() {
        let output = parse_sql("SELECT FROM WHERE; DELETE FROM dbo.Logs");
        assert!(!output.diagnostics.is_empty());
        assert!(
            output
                .script
                .statements
                .iter()
                .any(|s| matches!(s, Statement::Delete(_)))
        );
    }

    #[test]
    fn try_catch_and_transactions_are_blocks() {
        let output = parse_sql(
            "BEGIN TRY
                BEGIN TRAN
                DELETE FROM dbo.Orders WHERE Id = 1
                COMMIT
             END TRY
             BEGIN CATCH
                ROLLBACK
             END CATCH",
        );
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        assert_eq!(output.script.statements.len(), 2);
        let Statement::Block(body) = &output.script.statements[0] else {
            panic!("expected block");
        };
        assert!(matches!(body.as_slice(), [Statement::Delete(_)]));
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let sql = format!("SELECT {}1{}", "(".repeat(200), ")".repeat(200));
        let tokens = tokenize(&sql).expect("should tokenize");
        let err = parse(&tokens).unwrap_err();
        assert!(matches!(err, ExtractError::NestingTooDeep { limit: MAX_NESTING, .. }));
    }

    #[test]
    fn table_hints_are_not_functions() {
        let output = parse_sql("SELECT * FROM dbo.Orders (NOLOCK) o WITH (INDEX(ix_orders))");
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        let [Statement::Query(query)] = output.script.statements.as_slice() else {
            panic!("expected query");
        };
        let SetExpr::Select(select) = &query.body else {
            panic!("expected select");
        };
        assert!(matches!(
            &select.from[0].relation,
            TableFactor::Table { alias: Some(a), .. } if a == "o"
        ));
    }
}
