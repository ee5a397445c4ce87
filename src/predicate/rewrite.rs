//! Text-level predicate rewrites applied before planning

use crate::model::Macro;

use super::ast::DatePart;
use super::errors::{PredicateError, PredicateResult};

/// Replaces every `$(NAME)` for which `lookup` has a value
///
/// Unknown names are left in place; the lexer rejects the `$` later.
pub fn substitute<'a>(text: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(at) = rest.find("$(") {
        out.push_str(&rest[..at]);
        let after = &rest[at + 2..];
        match after.find(')') {
            Some(close) => {
                let name = after[..close].trim();
                match lookup(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[at..at + 2 + close + 1]),
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[at..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Expands the owner's `$(NAME)` macros
pub fn expand_macros(text: &str, macros: &[Macro]) -> String {
    substitute(text, |name| {
        macros
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.value.as_str())
    })
}

/// Calls `f` with each character and whether it sits inside a quoted string
fn scan_unquoted(text: &str, mut f: impl FnMut(usize, char, bool)) {
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => {
                f(i, c, true);
                quote = None;
            }
            Some(_) => f(i, c, true),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                f(i, c, true);
            }
            None => f(i, c, false),
        }
    }
}

/// Spells `&&` and `||` as ` AND ` and ` OR ` outside string literals
pub fn normalize_operators(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut pending: Option<char> = None;

    scan_unquoted(text, |_, c, quoted| {
        if let Some(p) = pending.take() {
            if !quoted && c == p {
                out.push_str(if p == '&' { " AND " } else { " OR " });
                return;
            }
            out.push(p);
        }
        if !quoted && (c == '&' || c == '|') {
            pending = Some(c);
        } else {
            out.push(c);
        }
    });
    if let Some(p) = pending {
        out.push(p);
    }
    out
}

/// Fields of a `[ ... ]` time filter with their inclusive value domains
const TIME_FIELDS: &[(DatePart, i64, i64)] = &[
    (DatePart::Second, 0, 59),
    (DatePart::Minute, 0, 59),
    (DatePart::Hour, 0, 23),
    (DatePart::Day, 1, 31),
    (DatePart::Month, 1, 12),
    (DatePart::Weekday, 0, 6),
    (DatePart::Year, 1, 9999),
];

/// Expands cron-style `[ sec min hour dom month dow [year] ]` filters
///
/// Each field is `*`, a value, a range `a-b`, or a list `a,b,c`, and becomes
/// a comparison on the matching date part of `timestamp`.
pub fn expand_time_filters(text: &str) -> PredicateResult<String> {
    let mut brackets: Vec<(usize, usize)> = Vec::new();
    let mut open: Option<usize> = None;
    let mut stray: Option<usize> = None;

    scan_unquoted(text, |i, c, quoted| {
        if quoted {
            return;
        }
        match (c, open) {
            ('[', None) => open = Some(i),
            (']', Some(start)) => {
                brackets.push((start, i));
                open = None;
            }
            ('[', Some(_)) | (']', None) => {
                stray.get_or_insert(i);
            }
            _ => {}
        }
    });

    if let Some(at) = open.or(stray) {
        return Err(PredicateError::InvalidTimeFilter {
            filter: text[at..].to_string(),
            reason: "unbalanced brackets".into(),
        });
    }

    let mut out = String::with_capacity(text.len() * 2);
    let mut last = 0;
    for (start, end) in brackets {
        out.push_str(&text[last..start]);
        out.push_str(&time_filter(&text[start + 1..end])?);
        last = end + 1;
    }
    out.push_str(&text[last..]);
    Ok(out)
}

fn time_filter(body: &str) -> PredicateResult<String> {
    let invalid = |reason: String| PredicateError::InvalidTimeFilter {
        filter: body.trim().to_string(),
        reason,
    };

    let fields: Vec<&str> = body.split_whitespace().collect();
    if fields.len() != 6 && fields.len() != 7 {
        return Err(invalid(format!("expected 6 or 7 fields, got {}", fields.len())));
    }

    let mut clauses = Vec::new();
    for (field, (part, lo, hi)) in fields.iter().zip(TIME_FIELDS) {
        if *field == "*" {
            continue;
        }
        let target = format!("{}(timestamp)", part.as_str());
        let number = |s: &str| -> PredicateResult<i64> {
            match s.trim().parse::<i64>() {
                Ok(v) if v >= *lo && v <= *hi => Ok(v),
                _ => Err(invalid(format!(
                    "'{}' is not a valid {} value ({}-{})",
                    s,
                    part.as_str().to_ascii_lowercase(),
                    lo,
                    hi
                ))),
            }
        };

        let clause = if let Some((a, b)) = field.split_once('-') {
            let (a, b) = (number(a)?, number(b)?);
            if a > b {
                return Err(invalid(format!("range '{}' is reversed", field)));
            }
            format!("{} BETWEEN {} AND {}", target, a, b)
        } else if field.contains(',') {
            let alternatives = field
                .split(',')
                .map(|v| -> PredicateResult<String> { Ok(format!("{} = {}", target, number(v)?)) })
                .collect::<PredicateResult<Vec<_>>>()?;
            format!("( {} )", alternatives.join(" OR "))
        } else {
            format!("{} = {}", target, number(field)?)
        };
        clauses.push(clause);
    }

    if clauses.is_empty() {
        Ok(" TRUE ".to_string())
    } else {
        Ok(format!(" ( {} ) ", clauses.join(" AND ")))
    }
}

/// Full pre-planning rewrite: macros, time filters, then C-style operators
pub fn normalize(text: &str, macros: &[Macro]) -> PredicateResult<String> {
    let expanded = expand_macros(text, macros);
    let timed = expand_time_filters(&expanded)?;
    Ok(normalize_operators(&timed))
}

/// Joins the present parts as `( a ) AND ( b )`; a single part is returned as is
pub fn and_all<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    let present: Vec<&str> = parts
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    match present.len() {
        0 => None,
        1 => Some(present[0].to_string()),
        _ => Some(
            present
                .iter()
                .map(|p| format!("( {} )", p))
                .collect::<Vec<_>>()
                .join(" AND "),
        ),
    }
}
