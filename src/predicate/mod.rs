//! Boolean predicate language for filters and rule conditions
//!
//! Predicates are plain text end to end: callers write them, rules store
//! them, the resolver joins them with `AND`/`OR`/`NOT`, and the correlator
//! rewrites stream-qualified references inside them. Only the store parses
//! and evaluates them, through [`Predicate::compile`].
//!
//! Grammar (keywords case-insensitive):
//!
//! ```text
//! expr     := or
//! or       := and (("OR" | "||") and)*
//! and      := not (("AND" | "&&") not)*
//! not      := ("NOT" | "!") not | cmp
//! cmp      := sum [op sum | [NOT] BETWEEN sum AND sum | IS [NOT] NULL]
//! sum      := term (("+" | "-") term)*
//! term     := unary (("*" | "/") unary)*
//! unary    := "-" unary | primary
//! primary  := literal | ident | ident "." ident | func "(" [expr ("," expr)*] ")" | "(" expr ")"
//! ```
//!
//! `timestamp` names the row timestamp. Functions are the date parts
//! `SECOND MINUTE HOUR DAY MONTH WEEKDAY YEAR` (one argument, weekday
//! 0 = Sunday) and `gps_distance(lat1, lon1, lat2, lon2)`, the great-circle
//! distance in meters.
//!
//! The lexer and parser are nom combinators; [`tokenize`] keeps byte spans
//! for callers that rewrite predicate text in place.
//!
//! Before planning, text goes through [`normalize`]: `$(NAME)` macro
//! expansion, `[ s m h dom mon dow ]` time filters, and `&&`/`||` spelled
//! out as `AND`/`OR`.

mod ast;
mod errors;
mod eval;
mod lexer;
mod parser;
mod rewrite;

pub use ast::{is_function_name, BinaryOp, DatePart, Expr, Literal, UnaryOp, GPS_DISTANCE};
pub use errors::{PredicateError, PredicateResult};
pub use eval::Predicate;
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::parse;
pub use rewrite::{
    and_all, expand_macros, expand_time_filters, normalize, normalize_operators, substitute,
};
