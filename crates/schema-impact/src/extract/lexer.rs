//! Token stream for the T-SQL parser.
//!
//! Tokenizing is delegated to sqlparser's `MsSqlDialect` tokenizer, which already
//! understands bracketed identifiers, `@variables`, `#temp` names, `N'...'`
//! literals and both comment styles. The result is flattened into the handful of
//! token shapes the dependency parser cares about, with whitespace and comments
//! dropped.

use sqlparser::dialect::MsSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

/// Token shapes understood by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Lexeme {
    /// Identifier or keyword. `quoted` is set for `[name]` and `"name"`,
    /// which are never treated as keywords.
    Word { text: String, quoted: bool },
    /// Numeric or string literal
    Literal,
    Period,
    Comma,
    LParen,
    RParen,
    Eq,
    Semicolon,
    Star,
    /// Any other operator or punctuation, as written
    Symbol(String),
}

/// A token together with its 1-indexed source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Lexed {
    pub kind: Lexeme,
    pub line: u64,
}

/// Tokenize a SQL definition.
///
/// Returns the tokenizer's message when the text cannot be tokenized at all
/// (for example an unterminated string literal).
pub(crate) fn tokenize(sql: &str) -> Result<Vec<Lexed>, String> {
    let dialect = MsSqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize_with_location()
        .map_err(|e| e.to_string())?;

    Ok(tokens
        .into_iter()
        .filter_map(|t| {
            let line = t.span.start.line;
            let kind = match t.token {
                Token::Whitespace(_) | Token::EOF => return None,
                Token::Word(w) => Lexeme::Word {
                    text: w.value,
                    quoted: w.quote_style.is_some(),
                },
                Token::Placeholder(p) => Lexeme::Word {
                    text: p,
                    quoted: false,
                },
                Token::Number(_, _)
                | Token::SingleQuotedString(_)
                | Token::NationalStringLiteral(_)
                | Token::HexStringLiteral(_) => Lexeme::Literal,
                Token::Period => Lexeme::Period,
                Token::Comma => Lexeme::Comma,
                Token::LParen => Lexeme::LParen,
                Token::RParen => Lexeme::RParen,
                Token::Eq => Lexeme::Eq,
                Token::SemiColon => Lexeme::Semicolon,
                Token::Mul => Lexeme::Star,
                other => Lexeme::Symbol(other.to_string()),
            };
            Some(Lexed { kind, line })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<Lexeme> {
        tokenize(sql)
            .expect("should tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn word(text: &str, quoted: bool) -> Lexeme {
        Lexeme::Word {
            text: text.to_string(),
            quoted,
        }
    }

    #[test]
    fn bracketed_identifiers_are_unwrapped_and_marked_quoted() {
        assert_eq!(
            kinds("[dbo].[Order Details]"),
            vec![
                word("dbo", true),
                Lexeme::Period,
                word("Order Details", true)
            ]
        );
    }

    #[test]
    fn variables_and_temp_tables_are_words() {
        let tokens = kinds("@CustomerId #staging");
        assert_eq!(tokens, vec![word("@CustomerId", false), word("#staging", false)]);
    }

    #[test]
    fn comments_and_whitespace_are_dropped() {
        let tokens = kinds("SELECT -- trailing\n 1 /* block */ ;");
        assert_eq!(
            tokens,
            vec![word("SELECT", false), Lexeme::Literal, Lexeme::Semicolon]
        );
    }

    #[test]
    fn lines_are_tracked() {
        let tokens = tokenize("SELECT\n\nx").expect("should tokenize");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn unterminated_string_fails() {
        assert!(tokenize("SELECT 'oops").is_err());
    }
}
