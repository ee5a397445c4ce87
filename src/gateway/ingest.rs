//! Tuple upload formats
//!
//! JSON: one tuple `["2013-03-04 05:06:07", 21.5, 3]` or an array of them.
//! The timestamp may also be given as integer Unix seconds.
//!
//! CSV: one tuple per line, timestamp first. The delimiter is whichever of
//! `,` tab `;` `|` occurs most often on the first line. A first line whose
//! leading field is not a timestamp is taken as a header and skipped.
//! Empty fields are NULL.

use chrono::{DateTime, Utc};
use serde_json::Value as Json;

use crate::model::{parse_timestamp, Value};

use super::errors::{IngestError, IngestResult};

/// A tuple before it is checked against a stream's channels
pub type RawTuple = (DateTime<Utc>, Vec<Value>);

const DELIMITERS: [char; 4] = [',', '\t', ';', '|'];

pub fn parse_json_tuples(body: &str) -> IngestResult<Vec<RawTuple>> {
    let json: Json = serde_json::from_str(body).map_err(|e| IngestError::Malformed {
        row: 0,
        reason: e.to_string(),
    })?;

    let rows = match json {
        Json::Array(items) if items.iter().all(Json::is_array) && !items.is_empty() => items,
        single @ Json::Array(_) => vec![single],
        other => {
            return Err(IngestError::Malformed {
                row: 0,
                reason: format!("expected an array, got {}", other),
            })
        }
    };

    rows.into_iter()
        .enumerate()
        .map(|(row, item)| json_tuple(row + 1, item))
        .collect()
}

fn json_tuple(row: usize, item: Json) -> IngestResult<RawTuple> {
    let malformed = |reason: String| IngestError::Malformed { row, reason };
    let Json::Array(fields) = item else {
        return Err(malformed("tuple must be an array".into()));
    };
    let mut fields = fields.into_iter();
    let timestamp = match fields.next() {
        Some(Json::String(s)) => parse_timestamp(&s)
            .ok_or_else(|| malformed(format!("invalid timestamp '{}'", s)))?,
        Some(Json::Number(n)) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| malformed(format!("invalid timestamp {}", n)))?,
        _ => return Err(malformed("tuple must start with a timestamp".into())),
    };

    let values = fields
        .map(|field| match field {
            Json::Null => Ok(Value::Null),
            Json::Number(n) => Ok(match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            Json::String(s) => Ok(Value::Text(s)),
            other => Err(malformed(format!("unsupported value {}", other))),
        })
        .collect::<IngestResult<Vec<_>>>()?;
    Ok((timestamp, values))
}

/// Most frequent candidate delimiter on `line`, `,` when none occurs
pub fn detect_delimiter(line: &str) -> char {
    DELIMITERS
        .iter()
        .map(|d| (*d, line.matches(*d).count()))
        .filter(|(_, count)| *count > 0)
        .max_by_key(|(_, count)| *count)
        .map(|(d, _)| d)
        .unwrap_or(',')
}

pub fn parse_csv(text: &str) -> IngestResult<Vec<RawTuple>> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .peekable();

    let Some((_, first)) = lines.peek() else {
        return Ok(Vec::new());
    };
    let delimiter = detect_delimiter(first);

    let mut tuples = Vec::new();
    let mut at_first = true;
    for (index, line) in lines {
        let row = index + 1;
        let mut fields = line.split(delimiter).map(clean_field);
        let leading = fields.next().unwrap_or_default();
        let timestamp = match parse_timestamp(&leading) {
            Some(ts) => ts,
            None if at_first => {
                at_first = false;
                continue;
            }
            None => {
                return Err(IngestError::Malformed {
                    row,
                    reason: format!("invalid timestamp '{}'", leading),
                })
            }
        };
        at_first = false;
        tuples.push((timestamp, fields.map(|f| csv_value(&f)).collect()));
    }
    Ok(tuples)
}

fn clean_field(field: &str) -> String {
    let t = field.trim();
    let unquoted = t
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(t);
    unquoted.to_string()
}

fn csv_value(field: &str) -> Value {
    if field.is_empty() {
        Value::Null
    } else if let Ok(i) = field.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = field.parse::<f64>() {
        Value::Float(f)
    } else {
        Value::Text(field.to_string())
    }
}
