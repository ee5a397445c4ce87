//! Binding and evaluation
//!
//! Evaluation uses three-valued logic: any comparison involving NULL, or
//! values that cannot be compared, is unknown, and a row matches only when
//! the whole predicate is definitely true.

use std::cmp::Ordering;

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::model::{parse_timestamp, Tuple, Value, ViewSchema};

use super::ast::{BinaryOp, DatePart, Expr, Literal, UnaryOp};
use super::errors::{PredicateError, PredicateResult};
use super::parser::parse;

/// A predicate bound to a view schema
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    expr: Expr,
}

impl Predicate {
    /// Parses `text` and resolves its columns against `schema`
    ///
    /// Fails on unknown columns and on `stream.channel` references, which
    /// must have been rewritten by correlation before reaching a store.
    pub fn compile(text: &str, schema: &ViewSchema) -> PredicateResult<Self> {
        let expr = bind(parse(text)?, schema)?;
        Ok(Self { expr })
    }

    pub fn matches(&self, tuple: &Tuple) -> bool {
        matches!(eval(&self.expr, tuple), Scalar::Bool(true))
    }
}

fn bind(expr: Expr, schema: &ViewSchema) -> PredicateResult<Expr> {
    let rebind = |e: Box<Expr>| -> PredicateResult<Box<Expr>> { Ok(Box::new(bind(*e, schema)?)) };

    Ok(match expr {
        Expr::Column(name) => {
            let ordinal = schema
                .column_index(&name)
                .ok_or(PredicateError::UnknownColumn(name))?;
            Expr::Slot(ordinal)
        }
        Expr::Qualified { stream, channel } => {
            return Err(PredicateError::UnresolvedReference(format!(
                "{}.{}",
                stream, channel
            )))
        }
        Expr::DatePart { part, arg } => Expr::DatePart {
            part,
            arg: rebind(arg)?,
        },
        Expr::GpsDistance(args) => {
            let [lat1, lon1, lat2, lon2] = *args;
            Expr::GpsDistance(Box::new([
                bind(lat1, schema)?,
                bind(lon1, schema)?,
                bind(lat2, schema)?,
                bind(lon2, schema)?,
            ]))
        }
        Expr::Unary { op, expr } => Expr::Unary {
            op,
            expr: rebind(expr)?,
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op,
            left: rebind(left)?,
            right: rebind(right)?,
        },
        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => Expr::Between {
            expr: rebind(expr)?,
            low: rebind(low)?,
            high: rebind(high)?,
            negated,
        },
        Expr::IsNull { expr, negated } => Expr::IsNull {
            expr: rebind(expr)?,
            negated,
        },
        leaf @ (Expr::Literal(_) | Expr::Slot(_) | Expr::Timestamp) => leaf,
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Time(DateTime<Utc>),
}

impl Scalar {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Int(i) => Scalar::Int(*i),
            Value::Float(f) => Scalar::Float(*f),
            Value::Text(s) => Scalar::Text(s.clone()),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn truth(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

fn from_truth(t: Option<bool>) -> Scalar {
    t.map(Scalar::Bool).unwrap_or(Scalar::Null)
}

fn eval(expr: &Expr, tuple: &Tuple) -> Scalar {
    match expr {
        Expr::Literal(lit) => match lit {
            Literal::Null => Scalar::Null,
            Literal::Bool(b) => Scalar::Bool(*b),
            Literal::Int(i) => Scalar::Int(*i),
            Literal::Float(f) => Scalar::Float(*f),
            Literal::Text(s) => Scalar::Text(s.clone()),
        },
        Expr::Slot(ordinal) => Scalar::from_value(tuple.value(*ordinal)),
        Expr::Timestamp => Scalar::Time(tuple.timestamp),
        // Unbound references never reach evaluation through `compile`
        Expr::Column(_) | Expr::Qualified { .. } => Scalar::Null,
        Expr::DatePart { part, arg } => match eval(arg, tuple) {
            Scalar::Time(ts) => Scalar::Int(date_part(*part, ts)),
            Scalar::Text(s) => parse_timestamp(&s)
                .map(|ts| Scalar::Int(date_part(*part, ts)))
                .unwrap_or(Scalar::Null),
            _ => Scalar::Null,
        },
        Expr::GpsDistance(args) => {
            let coords: Option<Vec<f64>> = args.iter().map(|a| number(&eval(a, tuple))).collect();
            match coords.as_deref() {
                Some(&[lat1, lon1, lat2, lon2]) => Scalar::Float(gps_distance(lat1, lon1, lat2, lon2)),
                _ => Scalar::Null,
            }
        }
        Expr::Unary { op: UnaryOp::Not, expr } => {
            from_truth(eval(expr, tuple).truth().map(|b| !b))
        }
        Expr::Unary { op: UnaryOp::Neg, expr } => match eval(expr, tuple) {
            Scalar::Int(i) => i.checked_neg().map(Scalar::Int).unwrap_or(Scalar::Float(-(i as f64))),
            Scalar::Float(f) => Scalar::Float(-f),
            _ => Scalar::Null,
        },
        Expr::Binary { op: BinaryOp::And, left, right } => {
            let l = eval(left, tuple).truth();
            if l == Some(false) {
                return Scalar::Bool(false);
            }
            match (l, eval(right, tuple).truth()) {
                (_, Some(false)) => Scalar::Bool(false),
                (Some(true), Some(true)) => Scalar::Bool(true),
                _ => Scalar::Null,
            }
        }
        Expr::Binary { op: BinaryOp::Or, left, right } => {
            let l = eval(left, tuple).truth();
            if l == Some(true) {
                return Scalar::Bool(true);
            }
            match (l, eval(right, tuple).truth()) {
                (_, Some(true)) => Scalar::Bool(true),
                (Some(false), Some(false)) => Scalar::Bool(false),
                _ => Scalar::Null,
            }
        }
        Expr::Binary { op, left, right } => {
            let l = eval(left, tuple);
            let r = eval(right, tuple);
            match op {
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                    arithmetic(*op, &l, &r)
                }
                _ => from_truth(compare(&l, &r).map(|ord| comparison_holds(*op, ord))),
            }
        }
        Expr::Between { expr, low, high, negated } => {
            let v = eval(expr, tuple);
            let lo = compare(&v, &eval(low, tuple)).map(|o| o != Ordering::Less);
            let hi = compare(&v, &eval(high, tuple)).map(|o| o != Ordering::Greater);
            let inside = match (lo, hi) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            };
            from_truth(inside.map(|b| b != *negated))
        }
        Expr::IsNull { expr, negated } => {
            Scalar::Bool((eval(expr, tuple) == Scalar::Null) != *negated)
        }
    }
}

fn comparison_holds(op: BinaryOp, ord: Ordering) -> bool {
    match op {
        BinaryOp::Eq => ord == Ordering::Equal,
        BinaryOp::Ne => ord != Ordering::Equal,
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::Le => ord != Ordering::Greater,
        BinaryOp::Gt => ord == Ordering::Greater,
        BinaryOp::Ge => ord != Ordering::Less,
        _ => false,
    }
}

/// Orders two scalars when they are comparable
fn compare(l: &Scalar, r: &Scalar) -> Option<Ordering> {
    match (l, r) {
        (Scalar::Null, _) | (_, Scalar::Null) => None,
        (Scalar::Int(a), Scalar::Int(b)) => Some(a.cmp(b)),
        (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
        (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        (Scalar::Time(a), Scalar::Time(b)) => Some(a.cmp(b)),
        (Scalar::Time(a), Scalar::Text(s)) => parse_timestamp(s).map(|b| a.cmp(&b)),
        (Scalar::Text(s), Scalar::Time(b)) => parse_timestamp(s).map(|a| a.cmp(b)),
        (Scalar::Time(_), _) | (_, Scalar::Time(_)) => None,
        (Scalar::Bool(_), _) | (_, Scalar::Bool(_)) => None,
        (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn arithmetic(op: BinaryOp, l: &Scalar, r: &Scalar) -> Scalar {
    if let (Scalar::Int(a), Scalar::Int(b)) = (l, r) {
        let exact = match op {
            BinaryOp::Add => a.checked_add(*b),
            BinaryOp::Sub => a.checked_sub(*b),
            BinaryOp::Mul => a.checked_mul(*b),
            _ => None,
        };
        if let Some(v) = exact {
            return Scalar::Int(v);
        }
    }

    let (a, b) = match (l, r) {
        (Scalar::Int(_) | Scalar::Float(_), Scalar::Int(_) | Scalar::Float(_)) => {
            match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Scalar::Null,
            }
        }
        _ => return Scalar::Null,
    };

    let v = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b == 0.0 => return Scalar::Null,
        BinaryOp::Div => a / b,
        _ => return Scalar::Null,
    };
    Scalar::Float(v)
}

/// Numeric operand; text does not count
fn number(scalar: &Scalar) -> Option<f64> {
    match scalar {
        Scalar::Int(i) => Some(*i as f64),
        Scalar::Float(f) => Some(*f),
        _ => None,
    }
}

const EARTH_RADIUS_METERS: f64 = 6_367_000.0;

/// Haversine great-circle distance in meters between two points in degrees
fn gps_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = phi2 - phi1;
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    EARTH_RADIUS_METERS * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

fn date_part(part: DatePart, ts: DateTime<Utc>) -> i64 {
    i64::from(match part {
        DatePart::Second => ts.second(),
        DatePart::Minute => ts.minute(),
        DatePart::Hour => ts.hour(),
        DatePart::Day => ts.day(),
        DatePart::Month => ts.month(),
        DatePart::Weekday => ts.weekday().num_days_from_sunday(),
        DatePart::Year => return i64::from(ts.year()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Channel, ChannelType};
    use chrono::TimeZone;

    fn schema() -> ViewSchema {
        ViewSchema::new(vec![
            Channel::new("temp", ChannelType::Float),
            Channel::new("steps", ChannelType::Int),
            Channel::new("place", ChannelType::Text),
        ])
    }

    fn row(temp: Value, steps: Value, place: &str) -> Tuple {
        Tuple::new(
            // Wednesday 2013-03-06 14:30:00
            Utc.with_ymd_and_hms(2013, 3, 6, 14, 30, 0).unwrap(),
            vec![temp, steps, Value::Text(place.into())],
        )
    }

    fn check(text: &str, tuple: &Tuple) -> bool {
        Predicate::compile(text, &schema()).unwrap().matches(tuple)
    }

    #[test]
    fn test_comparisons() {
        let t = row(Value::Float(21.5), Value::Int(100), "home");
        assert!(check("temp > 21", &t));
        assert!(check("steps = 100 AND place = 'home'", &t));
        assert!(check("steps >= 100.0", &t));
        assert!(!check("place != 'home'", &t));
        assert!(check("temp BETWEEN 20 AND 22", &t));
        assert!(check("steps * 2 - 50 = 150", &t));
        assert!(check("-temp < 0", &t));
    }

    #[test]
    fn test_null_is_unknown() {
        let t = row(Value::Null, Value::Int(1), "work");
        assert!(!check("temp > 0", &t));
        assert!(!check("NOT (temp > 0)", &t));
        assert!(check("temp IS NULL", &t));
        assert!(check("temp > 0 OR steps = 1", &t));
        assert!(!check("temp > 0 AND steps = 1", &t));
    }

    #[test]
    fn test_timestamp_functions() {
        let t = row(Value::Float(1.0), Value::Int(1), "x");
        assert!(check("HOUR(timestamp) = 14 AND MINUTE(timestamp) = 30", &t));
        assert!(check("WEEKDAY(timestamp) = 3", &t));
        assert!(check("DAY(timestamp) = 6 AND MONTH(timestamp) = 3 AND YEAR(timestamp) = 2013", &t));
        assert!(check("timestamp >= '2013-03-06 00:00:00'", &t));
        assert!(!check("timestamp < '2013-03-06'", &t));
    }

    #[test]
    fn test_column_names_are_case_insensitive() {
        let t = row(Value::Float(3.0), Value::Int(1), "x");
        assert!(check("TEMP = 3", &t));
    }

    #[test]
    fn test_compile_rejects_unknown_and_qualified() {
        assert_eq!(
            Predicate::compile("humidity > 1", &schema()),
            Err(PredicateError::UnknownColumn("humidity".into()))
        );
        assert_eq!(
            Predicate::compile("gps.lat > 1", &schema()),
            Err(PredicateError::UnresolvedReference("gps.lat".into()))
        );
    }

    #[test]
    fn test_gps_distance() {
        let schema = ViewSchema::new(vec![
            Channel::new("lat", ChannelType::Float),
            Channel::new("lon", ChannelType::Float),
        ]);
        let at = |lat: f64, lon: f64| {
            Tuple::new(
                Utc.with_ymd_and_hms(2013, 3, 6, 14, 30, 0).unwrap(),
                vec![Value::Float(lat), Value::Float(lon)],
            )
        };
        let near = Predicate::compile("gps_distance(lat, lon, 34.05, -118.30) <= 500.0", &schema).unwrap();

        // about 111 m north of the point
        assert!(near.matches(&at(34.051, -118.30)));
        // about 1.1 km north
        assert!(!near.matches(&at(34.06, -118.30)));

        let one_degree = Predicate::compile(
            "gps_distance(lat, lon, lat + 1, lon) BETWEEN 111100 AND 111200",
            &schema,
        )
        .unwrap();
        assert!(one_degree.matches(&at(0.0, 0.0)));

        let missing = Tuple::new(
            Utc.with_ymd_and_hms(2013, 3, 6, 14, 30, 0).unwrap(),
            vec![Value::Null, Value::Float(0.0)],
        );
        assert!(!near.matches(&missing));
        assert!(!Predicate::compile("NOT (gps_distance(lat, lon, 0, 0) > 1)", &schema)
            .unwrap()
            .matches(&missing));
    }

    #[test]
    fn test_division_by_zero_is_unknown() {
        let t = row(Value::Float(3.0), Value::Int(0), "x");
        assert!(!check("temp / steps > 1", &t));
        assert!(!check("NOT (temp / steps > 1)", &t));
    }
}
