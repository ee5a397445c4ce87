//! Priority-grouped rule folding

use serde::Serialize;

use crate::aggregate::{is_aggregate_expression, AggregateSpec};
use crate::model::{Rule, RuleAction};
use crate::observability::{log_event_with_fields, Event};

/// Row-level outcome of resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Resolution {
    /// No rule restricts this user
    Unrestricted,
    /// Only rows matching the predicate are visible
    Allow(String),
    /// The request is refused
    Deny,
}

/// Aggregation forced on the requester by an owner rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateOverride {
    pub rule_id: u64,
    pub spec: AggregateSpec,
    /// The override rule's own condition, AND-ed into the row predicate
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessDecision {
    pub resolution: Resolution,
    pub aggregate_override: Option<AggregateOverride>,
}

impl AccessDecision {
    pub fn unrestricted() -> Self {
        Self {
            resolution: Resolution::Unrestricted,
            aggregate_override: None,
        }
    }

    pub fn is_denied(&self) -> bool {
        self.resolution == Resolution::Deny
    }

    /// Row predicate, if the decision restricts rows
    pub fn predicate(&self) -> Option<&str> {
        match &self.resolution {
            Resolution::Allow(p) => Some(p),
            _ => None,
        }
    }
}

/// Predicate accumulated across priority groups
#[derive(Debug, Clone, PartialEq)]
enum Accumulated {
    /// No allow rule has contributed yet
    Nothing,
    /// An unconditional allow admitted every row
    Everything,
    Predicate(String),
}

impl Accumulated {
    fn or(self, allows: GroupCondition) -> Self {
        match (self, allows) {
            (_, GroupCondition::Always) | (Accumulated::Everything, _) => Accumulated::Everything,
            (Accumulated::Nothing, GroupCondition::Any(g)) => Accumulated::Predicate(g),
            (Accumulated::Predicate(p), GroupCondition::Any(g)) => {
                Accumulated::Predicate(format!("( {} ) OR ( {} )", p, g))
            }
        }
    }

    fn and_not(self, denies: String) -> Self {
        match self {
            Accumulated::Nothing => Accumulated::Nothing,
            Accumulated::Everything => Accumulated::Predicate(format!("NOT ( {} )", denies)),
            Accumulated::Predicate(p) => {
                Accumulated::Predicate(format!("( {} ) AND NOT ( {} )", p, denies))
            }
        }
    }
}

/// OR of the conditions of same-action rules in one group
enum GroupCondition {
    /// At least one rule had no condition
    Always,
    Any(String),
}

fn disjunction(rules: &[&Rule]) -> Option<GroupCondition> {
    if rules.is_empty() {
        return None;
    }
    if rules.iter().any(|r| r.is_unconditional()) {
        return Some(GroupCondition::Always);
    }
    let joined = rules
        .iter()
        .filter_map(|r| r.condition_text())
        .map(|c| format!("( {} )", c))
        .collect::<Vec<_>>()
        .join(" OR ");
    Some(GroupCondition::Any(joined))
}

/// Folds an owner's rules into an [`AccessDecision`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleResolver;

impl RuleResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolves access of `user` to `owner`'s stream `stream_name`
    ///
    /// Rules not owned by `owner`, not targeting this stream and user, or
    /// that are templates, are ignored.
    pub fn resolve(
        &self,
        owner: &str,
        stream_name: &str,
        user: &str,
        rules: &[Rule],
    ) -> AccessDecision {
        if user == owner {
            return AccessDecision::unrestricted();
        }

        let applicable: Vec<&Rule> = rules
            .iter()
            .filter(|r| r.owner == owner && r.applies_to(stream_name, user))
            .collect();

        let resolution = self.fold_groups(&applicable);
        let aggregate_override = match resolution {
            Resolution::Deny => None,
            _ => self.select_override(&applicable),
        };

        AccessDecision {
            resolution,
            aggregate_override,
        }
    }

    fn fold_groups(&self, applicable: &[&Rule]) -> Resolution {
        let mut ordinary: Vec<&Rule> = applicable
            .iter()
            .copied()
            .filter(|r| matches!(r.action(), RuleAction::Allow | RuleAction::Deny))
            .collect();

        // Priority descending, unset last, ties by id
        ordinary.sort_by(|a, b| {
            let rank = |r: &Rule| r.priority.map_or(-1i64, i64::from);
            rank(b).cmp(&rank(a)).then(a.id.cmp(&b.id))
        });

        let mut groups: Vec<&[&Rule]> = Vec::new();
        let mut start = 0;
        for i in 1..=ordinary.len() {
            if i == ordinary.len() || ordinary[i].priority != ordinary[start].priority {
                groups.push(&ordinary[start..i]);
                start = i;
            }
        }

        let mut acc = Accumulated::Nothing;
        for (index, group) in groups.iter().enumerate() {
            let is_last = index + 1 == groups.len();

            let (allows, denies): (Vec<&Rule>, Vec<&Rule>) = group
                .iter()
                .copied()
                .partition(|r| r.action() == RuleAction::Allow);
            let deny_all = denies.iter().any(|r| r.is_unconditional());

            if acc == Accumulated::Nothing && allows.is_empty() {
                // Deny-only group with nothing to restrict yet
                if deny_all && !is_last {
                    return Resolution::Deny;
                }
                continue;
            }

            if deny_all {
                return Resolution::Deny;
            }

            if let Some(allowed) = disjunction(&allows) {
                acc = acc.or(allowed);
            }
            if let Some(GroupCondition::Any(denied)) = disjunction(&denies) {
                acc = acc.and_not(denied);
            }
        }

        match acc {
            Accumulated::Nothing | Accumulated::Everything => Resolution::Unrestricted,
            Accumulated::Predicate(p) => Resolution::Allow(p),
        }
    }

    fn select_override(&self, applicable: &[&Rule]) -> Option<AggregateOverride> {
        let mut overrides: Vec<&Rule> = applicable
            .iter()
            .copied()
            .filter(|r| matches!(r.action(), RuleAction::Aggregate(_)))
            .collect();

        // Unset priority outranks every explicit one here
        overrides.sort_by(|a, b| {
            let rank = |r: &Rule| r.priority.unwrap_or(u32::MAX);
            rank(b).cmp(&rank(a)).then(a.id.cmp(&b.id))
        });

        for rule in overrides {
            let action = rule.action.trim();
            let parsed = if is_aggregate_expression(action) {
                AggregateSpec::parse(action).map_err(|e| e.to_string())
            } else {
                Err("not an aggregate expression".to_string())
            };

            match parsed {
                Ok(spec) => {
                    return Some(AggregateOverride {
                        rule_id: rule.id,
                        spec,
                        condition: rule.condition_text().map(str::to_string),
                    })
                }
                Err(reason) => {
                    let id = rule.id.to_string();
                    log_event_with_fields(
                        Event::RuleSkipped,
                        &[("rule_id", &id), ("reason", &reason)],
                    );
                }
            }
        }
        None
    }
}
