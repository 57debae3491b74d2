//! Lexer/tokenizer for the query text syntax.

use winnow::ascii::{multispace0, space0};
use winnow::combinator::alt;
use winnow::prelude::*;
use winnow::token::{any, take_while};

/// Token types for the query syntax.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Identifiers and literals
    Ident(String),  // function, set or kind name
    Str(String),    // quoted string, escapes resolved
    Number(String), // numeric literal, kept verbatim

    // Operators
    AndAnd, // &&
    OrOr,   // ||
    EqEq,   // ==
    Ne,     // !=
    Lt,     // <
    Le,     // <=
    Gt,     // >
    Ge,     // >=
    Plus,   // +
    Minus,  // -
    Star,   // *
    Slash,  // /
    Bang,   // !

    // Punctuation
    ColonColon, // ::
    Colon,      // :
    Arrow,      // ->
    Dot,        // .
    Comma,      // ,
    LParen,     // (
    RParen,     // )
    LBracket,   // [
    RBracket,   // ]

    // End of input
    Eof,
}

/// A token and the line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
}

// Manually define PResult for resilience against winnow version changes
type PResult<T> = Result<T, winnow::error::ErrMode<winnow::error::ContextError>>;

/// Lex an identifier: a letter or underscore, then alphanumerics and underscores.
fn lex_ident(input: &mut &str) -> PResult<Token> {
    let first = take_while(1, |c: char| c.is_alphabetic() || c == '_').parse_next(input)?;
    let rest = take_while(0.., |c: char| c.is_alphanumeric() || c == '_').parse_next(input)?;
    Ok(Token::Ident(format!("{}{}", first, rest)))
}

/// Lex an unsigned number. A leading minus is an operator.
fn lex_number(input: &mut &str) -> PResult<Token> {
    let whole = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    let fraction = winnow::combinator::opt(('.', take_while(1.., |c: char| c.is_ascii_digit())))
        .parse_next(input)?;
    Ok(Token::Number(match fraction {
        Some((_, digits)) => format!("{}.{}", whole, digits),
        None => whole.to_string(),
    }))
}

/// Lex a single- or double-quoted string with backslash escapes.
fn lex_string(input: &mut &str) -> PResult<Token> {
    let quote = alt(('"', '\'')).parse_next(input)?;
    let mut value = String::new();
    loop {
        match any.parse_next(input)? {
            c if c == quote => break,
            '\\' => value.push(match any.parse_next(input)? {
                'n' => '\n',
                't' => '\t',
                other => other,
            }),
            c => value.push(c),
        }
    }
    Ok(Token::Str(value))
}

/// Lex a single token.
fn lex_token(input: &mut &str) -> PResult<Token> {
    space0.parse_next(input)?;

    if input.is_empty() {
        return Ok(Token::Eof);
    }

    alt((
        // Multi-char operators first
        alt((
            "::".value(Token::ColonColon),
            "->".value(Token::Arrow),
            "&&".value(Token::AndAnd),
            "||".value(Token::OrOr),
            "==".value(Token::EqEq),
            "!=".value(Token::Ne),
            "<=".value(Token::Le),
            ">=".value(Token::Ge),
        )),
        // Single-char operators
        alt((
            "<".value(Token::Lt),
            ">".value(Token::Gt),
            "+".value(Token::Plus),
            "-".value(Token::Minus),
            "*".value(Token::Star),
            "/".value(Token::Slash),
            "!".value(Token::Bang),
        )),
        alt((
            ":".value(Token::Colon),
            ".".value(Token::Dot),
            ",".value(Token::Comma),
            "(".value(Token::LParen),
            ")".value(Token::RParen),
            "[".value(Token::LBracket),
            "]".value(Token::RBracket),
        )),
        lex_string,
        lex_number,
        lex_ident,
    ))
    .parse_next(input)
}

/// Tokenize the entire input.
pub fn tokenize(input: &str) -> Result<Vec<Spanned>, String> {
    let mut remaining = input;
    let mut tokens = Vec::new();
    let mut line = 1u32;
    // Input not yet scanned for newlines.
    let mut uncounted = input;

    loop {
        let _: PResult<&str> = multispace0.parse_next(&mut remaining);
        let scanned = &uncounted[..uncounted.len() - remaining.len()];
        line += scanned.matches('\n').count() as u32;
        uncounted = remaining;
        match lex_token(&mut remaining) {
            Ok(Token::Eof) => {
                tokens.push(Spanned {
                    token: Token::Eof,
                    line,
                });
                break;
            }
            Ok(token) => tokens.push(Spanned { token, line }),
            Err(e) => return Err(format!("Lexer error at line {} '{}': {:?}", line, remaining, e)),
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|spanned| spanned.token)
            .collect()
    }

    #[test]
    fn test_tag_comparison() {
        assert_eq!(
            kinds(r#"t["lanes"] >= 2"#),
            vec![
                Token::Ident("t".into()),
                Token::LBracket,
                Token::Str("lanes".into()),
                Token::RBracket,
                Token::Ge,
                Token::Number("2".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_statement_punctuation() {
        assert_eq!(
            kinds(".a(if: !is_number(::))->.b"),
            vec![
                Token::Dot,
                Token::Ident("a".into()),
                Token::LParen,
                Token::Ident("if".into()),
                Token::Colon,
                Token::Bang,
                Token::Ident("is_number".into()),
                Token::LParen,
                Token::ColonColon,
                Token::RParen,
                Token::RParen,
                Token::Arrow,
                Token::Dot,
                Token::Ident("b".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers_and_minus() {
        assert_eq!(
            kinds("-2.5*10"),
            vec![
                Token::Minus,
                Token::Number("2.5".into()),
                Token::Star,
                Token::Number("10".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\"b""#),
            vec![
                Token::Str("it's".into()),
                Token::Str("a\"b".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_lines_are_tracked() {
        let tokens = tokenize("id()\n\n  == 3").unwrap();
        let lines: Vec<u32> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 1, 1, 3, 3, 3]);
    }

    #[test]
    fn test_newlines_inside_strings_advance_the_line() {
        let tokens = tokenize("t[\"a\nb\"]\n== 'x\n\ny' !=\n1").unwrap();
        let lines: Vec<u32> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 1, 1, 2, 3, 3, 5, 6, 6]);
    }

    #[test]
    fn test_unterminated_string_fails() {
        assert!(tokenize(r#"t["name]"#).is_err());
        assert!(tokenize("a # b").is_err());
    }
}
