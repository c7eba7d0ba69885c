//! Tokenizer for Morphyn source text

use crate::error::{source_context, Error, Result};
use logos::Logos;
use std::fmt;
use std::ops::Range;

/// A lexical token
///
/// Keywords only match on word boundaries: `ontick` is one identifier,
/// because the identifier rule produces the longer match.
#[derive(Logos, Debug, PartialEq, Clone)]
pub enum Token {
    #[token("entity")]
    Entity,
    #[token("has")]
    Has,
    #[token("on")]
    On,
    #[token("emit")]
    Emit,
    #[token("when")]
    When,
    #[token("unwhen")]
    Unwhen,
    #[token("check")]
    Check,
    #[token("pool")]
    Pool,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,

    #[token("->")]
    Arrow,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    /// Integer and decimal lexemes, both stored as doubles
    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r#""([^"\\]|\\.)*""#, unescape)]
    Str(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"//[^\n]*", logos::skip, allow_greedy = true)]
    LineComment,
    #[regex(r"#[^\n]*", logos::skip, allow_greedy = true)]
    ShellComment,
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", logos::skip)]
    BlockComment,
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Whitespace,
}

fn unescape(lex: &mut logos::Lexer<Token>) -> Option<String> {
    let raw = lex.slice();
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            _ => return None,
        }
    }
    Some(out)
}

impl Token {
    /// Check if this token is an identifier or a keyword
    pub fn is_word(&self) -> bool {
        matches!(
            self,
            Token::Ident(_)
                | Token::Entity
                | Token::Has
                | Token::On
                | Token::Emit
                | Token::When
                | Token::Unwhen
                | Token::Check
                | Token::Pool
                | Token::And
                | Token::Or
                | Token::Not
                | Token::True
                | Token::False
                | Token::Null
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Entity => "entity",
            Token::Has => "has",
            Token::On => "on",
            Token::Emit => "emit",
            Token::When => "when",
            Token::Unwhen => "unwhen",
            Token::Check => "check",
            Token::Pool => "pool",
            Token::And => "and",
            Token::Or => "or",
            Token::Not => "not",
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Dot => ".",
            Token::Arrow => "->",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::LtEq => "<=",
            Token::GtEq => ">=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Assign => "=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Number(n) => return write!(f, "number {}", n),
            Token::Str(s) => return write!(f, "string {:?}", s),
            Token::Ident(name) => return write!(f, "identifier '{}'", name),
            Token::LineComment | Token::ShellComment | Token::BlockComment | Token::Whitespace => {
                ""
            }
        };
        write!(f, "'{}'", text)
    }
}

/// A token and the byte range it covers
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Range<usize>,
}

/// 1-based (line, column) of a byte offset; columns count characters
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

fn lexical_fault(source: &str, offset: usize) -> Error {
    let (line, column) = line_col(source, offset);
    Error::Lexical {
        line,
        column,
        context: source_context(source, line, column),
    }
}

/// Split source text into positioned tokens
pub fn tokenize(source: &str) -> Result<Vec<Spanned>> {
    let mut tokens: Vec<Spanned> = Vec::new();
    for (result, span) in Token::lexer(source).spanned() {
        let token = result.map_err(|_| lexical_fault(source, span.start))?;

        // `3abc`, `3on`: a number needs a delimiter before a following word
        if let Some(prev) = tokens.last() {
            let glued = prev.span.end == span.start
                && matches!(prev.token, Token::Number(_))
                && token.is_word();
            if glued {
                return Err(lexical_fault(source, prev.span.start));
            }
        }
        tokens.push(Spanned { token, span });
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_keywords_need_boundaries() {
        assert_eq!(
            kinds("on ontick entity"),
            vec![Token::On, Token::Ident("ontick".into()), Token::Entity]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a -> b <= c != d == e - 1"),
            vec![
                Token::Ident("a".into()),
                Token::Arrow,
                Token::Ident("b".into()),
                Token::LtEq,
                Token::Ident("c".into()),
                Token::NotEq,
                Token::Ident("d".into()),
                Token::EqEq,
                Token::Ident("e".into()),
                Token::Minus,
                Token::Number(1.0),
            ]
        );
    }

    #[test]
    fn test_numbers_and_strings() {
        assert_eq!(
            kinds(r#"3 2.5 "hi \"there\"\n""#),
            vec![
                Token::Number(3.0),
                Token::Number(2.5),
                Token::Str("hi \"there\"\n".into()),
            ]
        );
    }

    #[test]
    fn test_comments_are_stripped() {
        let source = "# shell\nhas // line\n/* block\n spanning */ x";
        assert_eq!(kinds(source), vec![Token::Has, Token::Ident("x".into())]);
    }

    #[test]
    fn test_lexical_fault_position() {
        let err = tokenize("entity A {\n  has x: @\n}").unwrap_err();
        match err {
            Error::Lexical { line, column, context } => {
                assert_eq!((line, column), (2, 10));
                assert!(context.ends_with('^'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_number_glued_to_identifier() {
        assert!(matches!(tokenize("3abc"), Err(Error::Lexical { column: 1, .. })));
        assert!(tokenize("3 abc").is_ok());

        for source in ["3on", "x > 3and y", "2true", "1null"] {
            assert!(
                matches!(tokenize(source), Err(Error::Lexical { .. })),
                "{source} should not lex"
            );
        }
        assert!(matches!(tokenize("a -> 3and"), Err(Error::Lexical { column: 6, .. })));
        assert!(tokenize("x > 3 and y").is_ok());
        assert!(tokenize("3+x").is_ok());
    }

    #[test]
    fn test_line_col() {
        let source = "ab\ncd";
        assert_eq!(line_col(source, 0), (1, 1));
        assert_eq!(line_col(source, 4), (2, 2));
        assert_eq!(line_col(source, 99), (2, 3));
    }
}
