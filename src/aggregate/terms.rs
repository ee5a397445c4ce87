//! Aggregate term lists: `avg($temp), nth($temp, 3)`

use std::fmt;

use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1, multispace0, satisfy},
    combinator::{opt, recognize},
    sequence::preceded,
    IResult, Parser,
};
use serde::Serialize;

use crate::model::{Channel, ChannelType, Stream, ViewSchema};

use super::errors::{AggregateError, AggregateResult};
use super::spec::split_top_level;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AggregateFunction {
    Min,
    Max,
    Median,
    Sum,
    Avg,
    First,
    Last,
    /// 1-based sample index within the bucket
    Nth(usize),
}

impl AggregateFunction {
    /// Lower-case function name; this is what noise calibration dispatches on
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Median => "median",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::First => "first",
            AggregateFunction::Last => "last",
            AggregateFunction::Nth(_) => "nth",
        }
    }

    /// Evaluates over samples in timestamp order; `None` when there are none
    pub fn evaluate(&self, samples: &[f64]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        match self {
            AggregateFunction::Min => samples.iter().copied().reduce(f64::min),
            AggregateFunction::Max => samples.iter().copied().reduce(f64::max),
            AggregateFunction::Sum => Some(samples.iter().sum()),
            AggregateFunction::Avg => Some(samples.iter().sum::<f64>() / samples.len() as f64),
            AggregateFunction::First => samples.first().copied(),
            AggregateFunction::Last => samples.last().copied(),
            AggregateFunction::Nth(n) => n.checked_sub(1).and_then(|i| samples.get(i)).copied(),
            AggregateFunction::Median => {
                let mut sorted = samples.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    Some((sorted[mid - 1] + sorted[mid]) / 2.0)
                } else {
                    Some(sorted[mid])
                }
            }
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Nth(n) => write!(f, "nth({})", n),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// One `func($channel)` term, not yet checked against a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateTerm {
    pub function: AggregateFunction,
    pub channel: String,
}

/// A parsed term list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateExpr {
    pub terms: Vec<AggregateTerm>,
}

impl AggregateExpr {
    pub fn parse(text: &str) -> AggregateResult<Self> {
        let pieces = split_top_level(text)
            .map_err(|reason| AggregateError::invalid(format!("{} in '{}'", reason, text)))?;

        let terms = pieces
            .iter()
            .map(|p| parse_term(p))
            .collect::<AggregateResult<Vec<_>>>()?;

        Ok(Self { terms })
    }

    /// Resolves channels against the stream being aggregated
    pub fn bind(&self, stream: &Stream) -> AggregateResult<BoundAggregate> {
        let terms = self
            .terms
            .iter()
            .map(|term| {
                let ordinal = stream.channel_index(&term.channel).ok_or_else(|| {
                    AggregateError::invalid(format!(
                        "stream '{}' has no channel '{}'",
                        stream.name, term.channel
                    ))
                })?;
                let channel = &stream.channels[ordinal];
                if !channel.channel_type.is_numeric() {
                    return Err(AggregateError::unsupported_channel(
                        &channel.name,
                        channel.channel_type,
                    ));
                }
                Ok(BoundTerm {
                    function: term.function,
                    channel: channel.name.clone(),
                    ordinal,
                })
            })
            .collect::<AggregateResult<Vec<_>>>()?;

        Ok(BoundAggregate { terms })
    }
}

/// `func($channel)` or `func($channel, n)`, surrounding whitespace allowed
fn term_call(input: &str) -> IResult<&str, (&str, &str, Option<&str>)> {
    let (input, _) = multispace0(input)?;
    let (input, name) = take_while1(|c: char| c.is_ascii_alphabetic()).parse(input)?;
    let (input, _) = (multispace0, char('('), multispace0, char('$')).parse(input)?;
    let (input, channel) = recognize((
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))
    .parse(input)?;
    let (input, index) = opt(preceded((multispace0, char(','), multispace0), digit1)).parse(input)?;
    let (input, _) = (multispace0, char(')'), multispace0).parse(input)?;
    Ok((input, (name, channel, index)))
}

fn parse_term(text: &str) -> AggregateResult<AggregateTerm> {
    let invalid = || AggregateError::invalid(format!("malformed aggregate term '{}'", text));

    let (name, channel, index) = match term_call(text) {
        Ok(("", parts)) => parts,
        _ => return Err(invalid()),
    };

    let function = match (name.to_ascii_lowercase().as_str(), index) {
        ("min", None) => AggregateFunction::Min,
        ("max", None) => AggregateFunction::Max,
        ("median", None) => AggregateFunction::Median,
        ("sum", None) => AggregateFunction::Sum,
        ("avg", None) => AggregateFunction::Avg,
        ("first", None) => AggregateFunction::First,
        ("last", None) => AggregateFunction::Last,
        ("nth", Some(n)) => match n.parse::<usize>() {
            Ok(n) if n >= 1 => AggregateFunction::Nth(n),
            _ => return Err(invalid()),
        },
        ("min" | "max" | "median" | "sum" | "avg" | "first" | "last" | "nth", _) => {
            return Err(invalid())
        }
        (other, _) => return Err(AggregateError::unknown_kind(other)),
    };

    Ok(AggregateTerm {
        function,
        channel: channel.to_string(),
    })
}

/// A term bound to a channel ordinal of the primary stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundTerm {
    pub function: AggregateFunction,
    pub channel: String,
    pub ordinal: usize,
}

impl BoundTerm {
    /// Output column name, e.g. `avg_temp` or `nth3_temp`
    pub fn label(&self) -> String {
        match self.function {
            AggregateFunction::Nth(n) => format!("nth{}_{}", n, self.channel),
            f => format!("{}_{}", f.name(), self.channel),
        }
    }
}

/// Term list ready to hand to the store
///
/// Ordinals index the primary stream's channels, which keep their positions
/// in correlated and filtered views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundAggregate {
    pub terms: Vec<BoundTerm>,
}

impl BoundAggregate {
    /// Aggregated rows have one float column per term
    pub fn output_schema(&self) -> ViewSchema {
        ViewSchema::new(
            self.terms
                .iter()
                .map(|t| Channel::new(t.label(), ChannelType::Float))
                .collect(),
        )
    }
}
