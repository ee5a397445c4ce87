//! Tokenizer with byte spans
//!
//! The lexical parsers here are generic over the nom error type so the
//! expression parser can reuse them for literals and identifiers.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit1, multispace0, one_of, satisfy},
    combinator::{cut, map, opt, recognize, value},
    error::{Error, ErrorKind, ParseError},
    multi::fold_many0,
    sequence::terminated,
    IResult, Parser,
};

use super::ast::Literal;
use super::errors::{PredicateError, PredicateResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Dot,
    Comma,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Between,
    Is,
    Null,
    True,
    False,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::Int(i) => i.to_string(),
            TokenKind::Float(f) => f.to_string(),
            TokenKind::Str(s) => format!("'{}'", s),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("{:?}", other).to_ascii_uppercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
}

/// Numeric literal; integers that overflow `i64` become floats
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum Number {
    Int(i64),
    Float(f64),
}

impl From<Number> for TokenKind {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(i) => TokenKind::Int(i),
            Number::Float(f) => TokenKind::Float(f),
        }
    }
}

impl From<Number> for Literal {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(i) => Literal::Int(i),
            Number::Float(f) => Literal::Float(f),
        }
    }
}

/// Splits predicate text into tokens, ending with [`TokenKind::Eof`]
pub fn tokenize(text: &str) -> PredicateResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = text;

    loop {
        let (input, _) = multispace0::<&str, Error<&str>>(rest).unwrap_or((rest, ""));
        let start = text.len() - input.len();
        if input.is_empty() {
            break;
        }

        match token::<Error<&str>>(input) {
            Ok((after, kind)) => {
                tokens.push(Token {
                    kind,
                    start,
                    end: text.len() - after.len(),
                });
                rest = after;
            }
            Err(_) if input.starts_with(|c| c == '\'' || c == '"') => {
                return Err(PredicateError::UnterminatedString(start));
            }
            Err(_) => {
                let ch = input.chars().next().unwrap_or('?');
                return Err(PredicateError::UnexpectedChar { ch, offset: start });
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        start: text.len(),
        end: text.len(),
    });
    Ok(tokens)
}

fn token<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, TokenKind, E> {
    alt((
        map(string_literal, TokenKind::Str),
        map(number, TokenKind::from),
        map(word, keyword_or_ident),
        operator,
    ))
    .parse(input)
}

/// Longest operators first so `<=` never lexes as `<` `=`
fn operator<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, TokenKind, E> {
    alt((
        value(TokenKind::Eq, tag("==")),
        value(TokenKind::Ne, tag("!=")),
        value(TokenKind::Ne, tag("<>")),
        value(TokenKind::Le, tag("<=")),
        value(TokenKind::Ge, tag(">=")),
        value(TokenKind::And, tag("&&")),
        value(TokenKind::Or, tag("||")),
        value(TokenKind::Eq, tag("=")),
        value(TokenKind::Not, tag("!")),
        value(TokenKind::Lt, tag("<")),
        value(TokenKind::Gt, tag(">")),
        value(TokenKind::LParen, tag("(")),
        value(TokenKind::RParen, tag(")")),
        value(TokenKind::Comma, tag(",")),
        value(TokenKind::Dot, tag(".")),
        value(TokenKind::Plus, tag("+")),
        value(TokenKind::Minus, tag("-")),
        value(TokenKind::Star, tag("*")),
        value(TokenKind::Slash, tag("/")),
    ))
    .parse(input)
}

pub(super) fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Identifier or keyword, not yet classified
pub(super) fn word<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    recognize((
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_word_char),
    ))
    .parse(input)
}

/// Quoted string; a doubled quote character stands for itself
pub(super) fn string_literal<'a, E: ParseError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, String, E> {
    let (input, quote) = one_of("'\"").parse(input)?;
    cut(terminated(
        fold_many0(
            alt((
                value(quote, (char(quote), char(quote))),
                satisfy(move |c| c != quote),
            )),
            String::new,
            |mut acc, c| {
                acc.push(c);
                acc
            },
        ),
        char(quote),
    ))
    .parse(input)
}

/// `12`, `1.5`, `.5`, `1e3`, `2.5E-2`
pub(super) fn number<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, Number, E> {
    let (rest, literal) = recognize((
        alt((
            recognize((digit1, opt((char('.'), digit1)))),
            recognize((char('.'), digit1)),
        )),
        opt((one_of("eE"), opt(one_of("+-")), digit1)),
    ))
    .parse(input)?;

    let number = match literal.parse::<i64>() {
        Ok(i) => Number::Int(i),
        Err(_) => match literal.parse::<f64>() {
            Ok(f) => Number::Float(f),
            Err(_) => return Err(nom::Err::Failure(E::from_error_kind(input, ErrorKind::Float))),
        },
    };
    Ok((rest, number))
}

pub(super) fn keyword_or_ident(word: &str) -> TokenKind {
    match word.to_ascii_uppercase().as_str() {
        "AND" => TokenKind::And,
        "OR" => TokenKind::Or,
        "NOT" => TokenKind::Not,
        "BETWEEN" => TokenKind::Between,
        "IS" => TokenKind::Is,
        "NULL" => TokenKind::Null,
        "TRUE" => TokenKind::True,
        "FALSE" => TokenKind::False,
        _ => TokenKind::Ident(word.to_string()),
    }
}
