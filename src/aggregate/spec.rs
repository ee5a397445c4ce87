//! Aggregate expression parsing

use serde::Serialize;

use super::calendar::Calendar;
use super::errors::{AggregateError, AggregateResult};
use super::terms::AggregateExpr;

/// Shape of the aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AggregateKind {
    /// One output row per calendar bucket
    AggregateBy,
    /// One output row for the whole window
    AggregateRange,
}

impl AggregateKind {
    /// Argument count of the plain (non-noisy) form
    pub fn arity(&self) -> usize {
        match self {
            AggregateKind::AggregateBy => 2,
            AggregateKind::AggregateRange => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::AggregateBy => "AggregateBy",
            AggregateKind::AggregateRange => "AggregateRange",
        }
    }
}

/// Accepted expression heads: (name, kind, noisy)
const HEADS: &[(&str, AggregateKind, bool)] = &[
    ("AggregateBy", AggregateKind::AggregateBy, false),
    ("DownSample", AggregateKind::AggregateBy, false),
    ("AggregateRange", AggregateKind::AggregateRange, false),
    ("Calculate", AggregateKind::AggregateRange, false),
    ("NoisyAggregateBy", AggregateKind::AggregateBy, true),
    ("NoisyDownSample", AggregateKind::AggregateBy, true),
    ("NoisyAggregateRange", AggregateKind::AggregateRange, true),
    ("NoisyCalculate", AggregateKind::AggregateRange, true),
];

/// A parsed aggregate expression
///
/// `arguments` holds the plain-form arguments exactly as written (quotes
/// included); for noisy forms the trailing epsilon has been removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSpec {
    pub kind: AggregateKind,
    pub arguments: Vec<String>,
    pub is_noisy: bool,
    pub epsilon: Option<f64>,
}

/// Parses an aggregate expression
pub fn parse_aggregate_expr(text: &str) -> AggregateResult<AggregateSpec> {
    AggregateSpec::parse(text)
}

/// True when `text` has a recognized aggregate head and a closing parenthesis
///
/// Used to tell aggregate-override actions apart from allow/deny. It does not
/// validate the arguments.
pub fn is_aggregate_expression(text: &str) -> bool {
    let t = text.trim();
    t.ends_with(')') && head(t).is_some()
}

fn head(text: &str) -> Option<(AggregateKind, bool, usize)> {
    let open = text.find('(')?;
    let name = text[..open].trim();
    HEADS
        .iter()
        .find(|(candidate, _, _)| candidate.eq_ignore_ascii_case(name))
        .map(|(_, kind, noisy)| (*kind, *noisy, open))
}

impl AggregateSpec {
    pub fn parse(text: &str) -> AggregateResult<Self> {
        let t = text.trim();
        let (kind, is_noisy, open) = head(t).ok_or_else(|| {
            AggregateError::invalid(format!("'{}' is not an aggregate expression", t))
        })?;

        if !t.ends_with(')') {
            return Err(AggregateError::invalid(format!(
                "'{}' is missing its closing parenthesis",
                t
            )));
        }

        let body = &t[open + 1..t.len() - 1];
        let mut arguments = split_top_level(body)
            .map_err(|reason| AggregateError::invalid(format!("{} in '{}'", reason, t)))?;

        let expected = kind.arity() + usize::from(is_noisy);
        if arguments.len() != expected || arguments.iter().any(|a| a.is_empty()) {
            return Err(AggregateError::invalid(format!(
                "{} takes {} argument(s), got '{}'",
                kind.as_str(),
                expected,
                body.trim()
            )));
        }

        let epsilon = if is_noisy {
            let raw = arguments.pop().unwrap_or_default();
            Some(parse_epsilon(&raw)?)
        } else {
            None
        };

        Ok(Self {
            kind,
            arguments,
            is_noisy,
            epsilon,
        })
    }

    /// The aggregate term list, unquoted
    pub fn expression(&self) -> &str {
        self.arguments.first().map(|a| unquote(a)).unwrap_or("")
    }

    /// Parsed term list
    pub fn terms(&self) -> AggregateResult<AggregateExpr> {
        AggregateExpr::parse(self.expression())
    }

    /// Bucket calendar of an AGGREGATE_BY expression
    pub fn calendar(&self) -> AggregateResult<Option<Calendar>> {
        match self.kind {
            AggregateKind::AggregateRange => Ok(None),
            AggregateKind::AggregateBy => {
                let raw = self.arguments.get(1).map(|a| unquote(a)).unwrap_or("");
                Calendar::parse(raw).map(Some).ok_or_else(|| {
                    AggregateError::invalid(format!("invalid calendar type '{}'", raw))
                })
            }
        }
    }
}

fn parse_epsilon(raw: &str) -> AggregateResult<f64> {
    let text = unquote(raw);
    match text.parse::<f64>() {
        Ok(eps) if eps.is_finite() && eps > 0.0 => Ok(eps),
        _ => Err(AggregateError::invalid(format!(
            "epsilon must be a positive number, got '{}'",
            raw
        ))),
    }
}

/// Splits on commas outside quotes and parentheses, trimming each piece
pub(crate) fn split_top_level(body: &str) -> Result<Vec<String>, &'static str> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for c in body.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '(') => {
                depth += 1;
                current.push(c);
            }
            (None, ')') => {
                depth = depth.checked_sub(1).ok_or("unbalanced parenthesis")?;
                current.push(c);
            }
            (None, ',') if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            (None, c) => current.push(c),
        }
    }

    if quote.is_some() {
        return Err("unterminated quote");
    }
    if depth != 0 {
        return Err("unbalanced parenthesis");
    }
    parts.push(current.trim().to_string());
    Ok(parts)
}

/// Strips one pair of matching surrounding quotes
pub(crate) fn unquote(text: &str) -> &str {
    let t = text.trim();
    for q in ['\'', '"'] {
        if t.len() >= 2 && t.starts_with(q) && t.ends_with(q) {
            return &t[1..t.len() - 1];
        }
    }
    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_by_has_two_arguments() {
        let spec = AggregateSpec::parse("AggregateBy('avg($c1)','1hour')").unwrap();
        assert_eq!(spec.kind, AggregateKind::AggregateBy);
        assert_eq!(spec.arguments, vec!["'avg($c1)'", "'1hour'"]);
        assert!(!spec.is_noisy);
        assert_eq!(spec.expression(), "avg($c1)");
        assert_eq!(spec.calendar().unwrap(), Some(Calendar::Hour));
    }

    #[test]
    fn test_aggregate_range_has_one_argument() {
        let spec = AggregateSpec::parse("AggregateRange('min($c1)')").unwrap();
        assert_eq!(spec.kind, AggregateKind::AggregateRange);
        assert_eq!(spec.arguments.len(), 1);
        assert_eq!(spec.calendar().unwrap(), None);
    }

    #[test]
    fn test_unknown_head_rejected() {
        let err = AggregateSpec::parse("Foo(x)").unwrap_err();
        assert_eq!(err.code().code(), "SG_AGGREGATE_INVALID_EXPRESSION");
        assert!(!is_aggregate_expression("Foo(x)"));
        assert!(!is_aggregate_expression("allow"));
    }

    #[test]
    fn test_aliases_and_case() {
        assert_eq!(
            AggregateSpec::parse("downsample('max($x)', '1day')").unwrap().kind,
            AggregateKind::AggregateBy
        );
        assert_eq!(
            AggregateSpec::parse("CALCULATE('sum($x)')").unwrap().kind,
            AggregateKind::AggregateRange
        );
    }

    #[test]
    fn test_quoted_commas_stay_in_one_argument() {
        let spec = AggregateSpec::parse("AggregateRange(\"avg($a), max($a)\")").unwrap();
        assert_eq!(spec.arguments.len(), 1);
        assert_eq!(spec.expression(), "avg($a), max($a)");
    }

    #[test]
    fn test_wrong_arity() {
        assert!(AggregateSpec::parse("AggregateBy('avg($a)')").is_err());
        assert!(AggregateSpec::parse("AggregateRange('avg($a)', '1hour')").is_err());
        assert!(AggregateSpec::parse("AggregateRange()").is_err());
    }

    #[test]
    fn test_missing_close_paren() {
        assert!(AggregateSpec::parse("AggregateRange('avg($a)'").is_err());
        assert!(!is_aggregate_expression("AggregateRange('avg($a)'"));
    }

    #[test]
    fn test_noisy_forms_carry_epsilon() {
        let by = AggregateSpec::parse("NoisyAggregateBy('avg($t)', '1day', 0.5)").unwrap();
        assert!(by.is_noisy);
        assert_eq!(by.epsilon, Some(0.5));
        assert_eq!(by.arguments.len(), 2);

        let range = AggregateSpec::parse("NoisyAggregateRange('sum($t)', '2')").unwrap();
        assert_eq!(range.epsilon, Some(2.0));
        assert_eq!(range.arguments, vec!["'sum($t)'"]);
    }

    #[test]
    fn test_noisy_epsilon_must_be_positive() {
        assert!(AggregateSpec::parse("NoisyAggregateRange('sum($t)', 0)").is_err());
        assert!(AggregateSpec::parse("NoisyAggregateRange('sum($t)', -1)").is_err());
        assert!(AggregateSpec::parse("NoisyAggregateRange('sum($t)', abc)").is_err());
        assert!(AggregateSpec::parse("NoisyAggregateRange('sum($t)')").is_err());
    }

    #[test]
    fn test_invalid_calendar() {
        let spec = AggregateSpec::parse("AggregateBy('avg($t)', 'fortnight')").unwrap();
        assert!(spec.calendar().is_err());
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(
            split_top_level("nth($a, 2), max($b)").unwrap(),
            vec!["nth($a, 2)", "max($b)"]
        );
        assert!(split_top_level("'open").is_err());
        assert!(split_top_level("a)").is_err());
    }
}
