//! Access policy: rule resolution, validation and templates
//!
//! An owner's rules are folded, highest priority first, into a single
//! decision for one (stream, requesting user) pair:
//!
//! - `Deny`: refuse the request outright
//! - `Allow(predicate)`: the user sees only rows matching `predicate`
//! - `Unrestricted`: no rule restricts the user
//!
//! Independently, the highest-priority rule whose action is an aggregate
//! expression forces the result through that aggregation.
//!
//! Resolution is a pure function of its inputs. Stream owners reading their
//! own streams bypass it entirely.

mod errors;
mod resolver;
mod templates;
mod validation;

pub use errors::{PolicyError, PolicyResult};
pub use resolver::{AccessDecision, AggregateOverride, Resolution, RuleResolver};
pub use templates::{instantiate_template, TemplateInstantiation};
pub use validation::validate_rule;
