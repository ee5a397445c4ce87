//! Predicate syntax tree

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

/// Datetime component extractors usable on `timestamp`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Weekday,
    Year,
}

impl DatePart {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SECOND" => Some(DatePart::Second),
            "MINUTE" => Some(DatePart::Minute),
            "HOUR" => Some(DatePart::Hour),
            "DAY" => Some(DatePart::Day),
            "MONTH" => Some(DatePart::Month),
            "WEEKDAY" => Some(DatePart::Weekday),
            "YEAR" => Some(DatePart::Year),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatePart::Second => "SECOND",
            DatePart::Minute => "MINUTE",
            DatePart::Hour => "HOUR",
            DatePart::Day => "DAY",
            DatePart::Month => "MONTH",
            DatePart::Weekday => "WEEKDAY",
            DatePart::Year => "YEAR",
        }
    }
}

/// Function names callable in predicates; these cannot name channels
pub fn is_function_name(name: &str) -> bool {
    DatePart::parse(name).is_some() || name.eq_ignore_ascii_case(GPS_DISTANCE)
}

pub const GPS_DISTANCE: &str = "gps_distance";

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// Bare channel name, unresolved
    Column(String),
    /// Channel ordinal after binding to a schema
    Slot(usize),
    /// `stream.channel`
    Qualified { stream: String, channel: String },
    Timestamp,
    DatePart { part: DatePart, arg: Box<Expr> },
    /// `gps_distance(lat1, lon1, lat2, lon2)` in meters
    GpsDistance(Box<[Expr; 4]>),
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Between { expr: Box<Expr>, low: Box<Expr>, high: Box<Expr>, negated: bool },
    IsNull { expr: Box<Expr>, negated: bool },
}

impl Expr {
    /// Visits every node, parents before children
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::DatePart { arg, .. } => arg.walk(visit),
            Expr::GpsDistance(args) => {
                for arg in args.iter() {
                    arg.walk(visit);
                }
            }
            Expr::Unary { expr, .. } | Expr::IsNull { expr, .. } => expr.walk(visit),
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Between { expr, low, high, .. } => {
                expr.walk(visit);
                low.walk(visit);
                high.walk(visit);
            }
            Expr::Literal(_)
            | Expr::Column(_)
            | Expr::Slot(_)
            | Expr::Qualified { .. }
            | Expr::Timestamp => {}
        }
    }

    /// Every bare column name, in order of appearance
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Column(name) = e {
                out.push(name.as_str());
            }
        });
        out
    }

    /// Every `stream.channel` reference, in order of appearance
    pub fn qualified_refs(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Qualified { stream, channel } = e {
                out.push((stream.as_str(), channel.as_str()));
            }
        });
        out
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        };
        write!(f, "{}", s)
    }
}
