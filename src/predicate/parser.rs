//! Predicate expression parser
//!
//! Works on the text directly with nom combinators, reusing the lexer's
//! literal and identifier parsers. Lexical errors are reported first, so a
//! stray character or an unterminated string keeps its precise error.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{char, multispace0, satisfy},
    combinator::{map, not, opt, value, verify},
    error::{ContextError, ErrorKind, ParseError},
    multi::{many0, separated_list0},
    sequence::{delimited, preceded, terminated},
    IResult, Parser,
};

use super::ast::{BinaryOp, DatePart, Expr, Literal, UnaryOp, GPS_DISTANCE};
use super::errors::{PredicateError, PredicateResult};
use super::lexer::{is_word_char, keyword_or_ident, number, string_literal, tokenize, word, TokenKind};

/// Parses predicate text into an expression tree
pub fn parse(text: &str) -> PredicateResult<Expr> {
    tokenize(text)?;

    match terminated(or_expr, multispace0).parse(text) {
        Ok(("", expr)) => Ok(expr),
        Ok((rest, _)) => Err(PredicateError::Syntax {
            expected: "end of predicate".into(),
            found: found_at(rest),
            offset: text.len() - rest.len(),
        }),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(e.into_predicate_error(text)),
        Err(nom::Err::Incomplete(_)) => Err(PredicateError::Syntax {
            expected: "expression".into(),
            found: "end of input".into(),
            offset: text.len(),
        }),
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Reason<'a> {
    Expected(&'static str),
    UnknownFunction(&'a str),
    Arity {
        function: &'a str,
        expected: usize,
        found: usize,
    },
}

/// Failure position plus the innermost context that names what was expected
#[derive(Debug, Clone, PartialEq)]
struct SyntaxError<'a> {
    input: &'a str,
    reason: Option<Reason<'a>>,
}

impl<'a> SyntaxError<'a> {
    fn new(input: &'a str, reason: Reason<'a>) -> Self {
        Self {
            input,
            reason: Some(reason),
        }
    }

    fn into_predicate_error(self, text: &str) -> PredicateError {
        let offset = text.len() - self.input.len();
        let expected = match self.reason {
            Some(Reason::UnknownFunction(name)) => {
                return PredicateError::UnknownFunction(name.to_string())
            }
            Some(Reason::Arity {
                function,
                expected,
                found,
            }) => {
                return PredicateError::Arity {
                    function: function.to_string(),
                    expected,
                    found,
                }
            }
            Some(Reason::Expected(what)) => what,
            None => "value, column or '('",
        };
        PredicateError::Syntax {
            expected: expected.to_string(),
            found: found_at(self.input),
            offset,
        }
    }
}

impl<'a> ParseError<&'a str> for SyntaxError<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        Self {
            input,
            reason: None,
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }

    /// Keeps whichever branch got further
    fn or(self, other: Self) -> Self {
        if other.input.len() <= self.input.len() {
            other
        } else {
            self
        }
    }
}

impl<'a> ContextError<&'a str> for SyntaxError<'a> {
    fn add_context(_input: &'a str, ctx: &'static str, mut other: Self) -> Self {
        if other.reason.is_none() {
            other.reason = Some(Reason::Expected(ctx));
        }
        other
    }
}

type PResult<'a, O> = IResult<&'a str, O, SyntaxError<'a>>;

fn found_at(rest: &str) -> String {
    tokenize(rest)
        .ok()
        .and_then(|tokens| tokens.into_iter().next())
        .map(|t| t.kind.describe())
        .unwrap_or_else(|| TokenKind::Eof.describe())
}

// ============================================================================
// Lexical helpers
// ============================================================================

fn symbol<'a>(s: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    move |input| preceded(multispace0, tag(s)).parse(input)
}

/// Case-insensitive keyword that is not the prefix of a longer word
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    move |input| {
        preceded(
            multispace0,
            terminated(tag_no_case(kw), not(satisfy(is_word_char))),
        )
        .parse(input)
    }
}

fn expect<'a, O>(
    what: &'static str,
    mut parser: impl FnMut(&'a str) -> PResult<'a, O>,
) -> impl FnMut(&'a str) -> PResult<'a, O> {
    move |input| {
        parser(input).map_err(|e| match e {
            nom::Err::Error(err) | nom::Err::Failure(err) => {
                nom::Err::Failure(SyntaxError::add_context(input, what, err))
            }
            incomplete => incomplete,
        })
    }
}

fn identifier(input: &str) -> PResult<'_, &str> {
    preceded(
        multispace0,
        verify(word, |w: &str| matches!(keyword_or_ident(w), TokenKind::Ident(_))),
    )
    .parse(input)
}

fn or_op(input: &str) -> PResult<'_, &str> {
    alt((keyword("OR"), symbol("||"))).parse(input)
}

fn and_op(input: &str) -> PResult<'_, &str> {
    alt((keyword("AND"), symbol("&&"))).parse(input)
}

fn not_op(input: &str) -> PResult<'_, &str> {
    alt((
        keyword("NOT"),
        preceded(multispace0, terminated(tag("!"), not(char('=')))),
    ))
    .parse(input)
}

fn comparison_op(input: &str) -> PResult<'_, BinaryOp> {
    alt((
        value(BinaryOp::Eq, symbol("==")),
        value(BinaryOp::Ne, symbol("!=")),
        value(BinaryOp::Ne, symbol("<>")),
        value(BinaryOp::Le, symbol("<=")),
        value(BinaryOp::Ge, symbol(">=")),
        value(BinaryOp::Eq, symbol("=")),
        value(BinaryOp::Lt, symbol("<")),
        value(BinaryOp::Gt, symbol(">")),
    ))
    .parse(input)
}

// ============================================================================
// Grammar
// ============================================================================

fn or_expr(input: &str) -> PResult<'_, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(or_op, expect("operand after OR", and_expr))).parse(input)?;
    Ok((input, chain(BinaryOp::Or, first, rest)))
}

fn and_expr(input: &str) -> PResult<'_, Expr> {
    let (input, first) = not_expr(input)?;
    let (input, rest) = many0(preceded(and_op, expect("operand after AND", not_expr))).parse(input)?;
    Ok((input, chain(BinaryOp::And, first, rest)))
}

fn not_expr(input: &str) -> PResult<'_, Expr> {
    alt((
        map(preceded(not_op, expect("operand after NOT", not_expr)), |expr| {
            Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            }
        }),
        comparison,
    ))
    .parse(input)
}

/// What may follow the left operand of a comparison
enum Comparison {
    Binary(BinaryOp, Expr),
    Between { low: Expr, high: Expr, negated: bool },
    IsNull { negated: bool },
}

fn comparison(input: &str) -> PResult<'_, Expr> {
    let (input, left) = sum(input)?;
    let (input, tail) = opt(alt((
        map(
            (comparison_op, expect("value after comparison", sum)),
            |(op, right)| Comparison::Binary(op, right),
        ),
        map(
            (
                opt(keyword("NOT")),
                keyword("BETWEEN"),
                expect("lower bound", sum),
                expect("AND in BETWEEN", keyword("AND")),
                expect("upper bound", sum),
            ),
            |(negated, _, low, _, high)| Comparison::Between {
                low,
                high,
                negated: negated.is_some(),
            },
        ),
        map(
            (keyword("IS"), opt(keyword("NOT")), expect("NULL", keyword("NULL"))),
            |(_, negated, _)| Comparison::IsNull {
                negated: negated.is_some(),
            },
        ),
    )))
    .parse(input)?;

    let expr = match tail {
        None => left,
        Some(Comparison::Binary(op, right)) => binary(op, left, right),
        Some(Comparison::Between { low, high, negated }) => Expr::Between {
            expr: Box::new(left),
            low: Box::new(low),
            high: Box::new(high),
            negated,
        },
        Some(Comparison::IsNull { negated }) => Expr::IsNull {
            expr: Box::new(left),
            negated,
        },
    };
    Ok((input, expr))
}

fn sum(input: &str) -> PResult<'_, Expr> {
    let (input, first) = product(input)?;
    let (input, rest) = many0((
        alt((value(BinaryOp::Add, symbol("+")), value(BinaryOp::Sub, symbol("-")))),
        expect("operand", product),
    ))
    .parse(input)?;
    Ok((input, fold_ops(first, rest)))
}

fn product(input: &str) -> PResult<'_, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0((
        alt((value(BinaryOp::Mul, symbol("*")), value(BinaryOp::Div, symbol("/")))),
        expect("operand", unary),
    ))
    .parse(input)?;
    Ok((input, fold_ops(first, rest)))
}

fn unary(input: &str) -> PResult<'_, Expr> {
    alt((
        map(preceded(symbol("-"), expect("operand after '-'", unary)), |expr| {
            Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
            }
        }),
        primary,
    ))
    .parse(input)
}

fn primary(input: &str) -> PResult<'_, Expr> {
    alt((
        map(literal, Expr::Literal),
        delimited(
            symbol("("),
            expect("expression", or_expr),
            expect("')'", symbol(")")),
        ),
        reference,
    ))
    .parse(input)
}

fn literal(input: &str) -> PResult<'_, Literal> {
    preceded(
        multispace0,
        alt((
            value(Literal::Bool(true), keyword("TRUE")),
            value(Literal::Bool(false), keyword("FALSE")),
            value(Literal::Null, keyword("NULL")),
            map(number, Literal::from),
            map(string_literal, Literal::Text),
        )),
    )
    .parse(input)
}

/// Column, `timestamp`, `stream.channel` or a function call
fn reference(input: &str) -> PResult<'_, Expr> {
    let (input, name) = identifier(input)?;

    let (input, open) = opt(symbol("(")).parse(input)?;
    if open.is_some() {
        let (rest, args) = terminated(
            separated_list0(symbol(","), or_expr),
            expect("')'", symbol(")")),
        )
        .parse(input)?;
        return call(input, name, args)
            .map(|expr| (rest, expr))
            .map_err(nom::Err::Failure);
    }

    let (input, channel) =
        opt(preceded(symbol("."), expect("channel name after '.'", identifier))).parse(input)?;
    let expr = match channel {
        Some(channel) => Expr::Qualified {
            stream: name.to_string(),
            channel: channel.to_string(),
        },
        None if name.eq_ignore_ascii_case("timestamp") => Expr::Timestamp,
        None => Expr::Column(name.to_string()),
    };
    Ok((input, expr))
}

fn call<'a>(at: &'a str, name: &'a str, args: Vec<Expr>) -> Result<Expr, SyntaxError<'a>> {
    if let Some(part) = DatePart::parse(name) {
        let [arg]: [Expr; 1] = arguments(at, name, args)?;
        return Ok(Expr::DatePart {
            part,
            arg: Box::new(arg),
        });
    }
    if name.eq_ignore_ascii_case(GPS_DISTANCE) {
        let args: [Expr; 4] = arguments(at, name, args)?;
        return Ok(Expr::GpsDistance(Box::new(args)));
    }
    Err(SyntaxError::new(at, Reason::UnknownFunction(name)))
}

fn arguments<'a, const N: usize>(
    at: &'a str,
    function: &'a str,
    args: Vec<Expr>,
) -> Result<[Expr; N], SyntaxError<'a>> {
    let found = args.len();
    <[Expr; N]>::try_from(args).map_err(|_| {
        SyntaxError::new(
            at,
            Reason::Arity {
                function,
                expected: N,
                found,
            },
        )
    })
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn chain(op: BinaryOp, first: Expr, rest: Vec<Expr>) -> Expr {
    rest.into_iter().fold(first, |left, right| binary(op, left, right))
}

fn fold_ops(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter()
        .fold(first, |left, (op, right)| binary(op, left, right))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> Box<Expr> {
        Box::new(Expr::Column(name.into()))
    }

    #[test]
    fn test_precedence_and_binds_tighter_than_or() {
        let expr = parse("a = 1 OR b = 2 AND c = 3").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Or, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::And, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_between_and_is_null() {
        let expr = parse("x NOT BETWEEN 1 AND 2 AND y IS NOT NULL").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::And, left, right } => {
                assert!(matches!(*left, Expr::Between { negated: true, .. }));
                assert_eq!(*right, Expr::IsNull { expr: col("y"), negated: true });
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_qualified_and_timestamp() {
        let expr = parse("activity.state = 'still' and HOUR(timestamp) >= 9").unwrap();
        assert_eq!(expr.qualified_refs(), vec![("activity", "state")]);
        assert!(expr.columns().is_empty());
    }

    #[test]
    fn test_arithmetic() {
        let expr = parse("-a * 2 + b > 10").unwrap();
        assert_eq!(expr.columns(), vec!["a", "b"]);
    }

    #[test]
    fn test_left_associative_arithmetic() {
        let expr = parse("10 - 4 - 3").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Sub, left, .. } => {
                assert!(matches!(*left, Expr::Binary { op: BinaryOp::Sub, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_keywords_need_word_boundary() {
        let expr = parse("order = 1 AND android = 2").unwrap();
        assert_eq!(expr.columns(), vec!["order", "android"]);
        assert!(parse("notes IS NOT NULL").is_ok());
    }

    #[test]
    fn test_c_style_operators() {
        let expr = parse("!(a = 1) && b != 2 || c <> 3").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Or, .. }));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("x >").is_err());
        assert!(parse("(x > 1").is_err());
        assert!(parse("x > 1 y").is_err());
        assert!(parse("a.").is_err());
        assert!(matches!(parse("foo(x)"), Err(PredicateError::UnknownFunction(_))));
        assert!(parse("x BETWEEN 1 2").is_err());
        assert!(parse("a = 1 AND").is_err());
    }

    #[test]
    fn test_error_positions() {
        assert_eq!(
            parse("x > 1 y"),
            Err(PredicateError::Syntax {
                expected: "end of predicate".into(),
                found: "identifier 'y'".into(),
                offset: 6,
            })
        );
        match parse("(x > 1") {
            Err(PredicateError::Syntax { expected, found, .. }) => {
                assert_eq!(expected, "')'");
                assert_eq!(found, "end of input");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_lexical_errors_come_first() {
        assert_eq!(parse("x = 'open"), Err(PredicateError::UnterminatedString(4)));
        assert!(matches!(
            parse("x = $(A)"),
            Err(PredicateError::UnexpectedChar { ch: '$', .. })
        ));
    }

    #[test]
    fn test_gps_distance_call() {
        let expr =
            parse("gps_distance(location.latitude, location.longitude, 34.05, -118.30) <= 500.0")
                .unwrap();
        assert_eq!(
            expr.qualified_refs(),
            vec![("location", "latitude"), ("location", "longitude")]
        );
        match expr {
            Expr::Binary { op: BinaryOp::Le, left, .. } => {
                assert!(matches!(*left, Expr::GpsDistance(_)))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_function_arity() {
        assert_eq!(
            parse("gps_distance(1, 2, 3) < 5"),
            Err(PredicateError::Arity {
                function: "gps_distance".into(),
                expected: 4,
                found: 3,
            })
        );
        assert!(matches!(
            parse("HOUR() = 1"),
            Err(PredicateError::Arity { expected: 1, found: 0, .. })
        ));
    }

    #[test]
    fn test_literal_forms() {
        assert_eq!(parse("TRUE").unwrap(), Expr::Literal(Literal::Bool(true)));
        assert_eq!(parse("( NULL )").unwrap(), Expr::Literal(Literal::Null));
        assert_eq!(
            parse("\"a\"\"b\"").unwrap(),
            Expr::Literal(Literal::Text("a\"b".into()))
        );
    }
}
