//! Rule validation at write time

use crate::aggregate::{is_aggregate_expression, AggregateSpec};
use crate::model::{Rule, RuleAction};
use crate::predicate::{expand_time_filters, normalize_operators, parse};

use super::errors::{PolicyError, PolicyResult};

/// Checks a rule before it is stored
///
/// - the owner is set
/// - the action is `allow`, `deny`, or a parseable aggregate expression
/// - an explicit priority is at least 1
/// - a condition without `$(...)` placeholders parses
///
/// Conditions that still contain placeholders (macros, template
/// parameters) can only be checked once expanded at planning time.
pub fn validate_rule(rule: &Rule) -> PolicyResult<()> {
    if rule.owner.trim().is_empty() {
        return Err(PolicyError::MissingOwner(rule.id));
    }

    if let RuleAction::Aggregate(expr) = rule.action() {
        if !is_aggregate_expression(expr) {
            return Err(PolicyError::InvalidAction {
                rule_id: rule.id,
                reason: format!("'{}' is not recognized", expr),
            });
        }
        AggregateSpec::parse(expr).map_err(|e| PolicyError::InvalidAction {
            rule_id: rule.id,
            reason: e.message().to_string(),
        })?;
    }

    if rule.priority == Some(0) {
        return Err(PolicyError::InvalidPriority { rule_id: rule.id });
    }

    if let Some(condition) = rule.condition_text() {
        if !condition.contains("$(") {
            let invalid = |reason: String| PolicyError::InvalidCondition {
                rule_id: rule.id,
                reason,
            };
            let expanded = expand_time_filters(condition).map_err(|e| invalid(e.to_string()))?;
            parse(&normalize_operators(&expanded)).map_err(|e| invalid(e.to_string()))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(action: &str) -> Rule {
        Rule {
            id: 11,
            owner: "alice".into(),
            priority: Some(1),
            target_users: None,
            target_streams: None,
            condition: None,
            action: action.into(),
            template_name: None,
        }
    }

    #[test]
    fn test_valid_actions() {
        for action in ["allow", "DENY", "AggregateRange('avg($x)')", "NoisyAggregateBy('max($x)', '1day', 0.1)"] {
            assert!(validate_rule(&rule(action)).is_ok(), "{}", action);
        }
    }

    #[test]
    fn test_invalid_actions() {
        assert!(matches!(
            validate_rule(&rule("permit")),
            Err(PolicyError::InvalidAction { .. })
        ));
        assert!(matches!(
            validate_rule(&rule("AggregateBy('avg($x)')")),
            Err(PolicyError::InvalidAction { .. })
        ));
    }

    #[test]
    fn test_priority_zero_rejected() {
        let mut r = rule("allow");
        r.priority = Some(0);
        assert_eq!(validate_rule(&r), Err(PolicyError::InvalidPriority { rule_id: 11 }));
        r.priority = None;
        assert!(validate_rule(&r).is_ok());
    }

    #[test]
    fn test_condition_checked_unless_it_has_placeholders() {
        let mut r = rule("allow");
        r.condition = Some("x > ".into());
        assert!(matches!(validate_rule(&r), Err(PolicyError::InvalidCondition { .. })));

        r.condition = Some("x > 1 && [ * * 9-17 * * * ]".into());
        assert!(validate_rule(&r).is_ok());

        r.condition = Some("$(AT_HOME) AND x > 1".into());
        assert!(validate_rule(&r).is_ok());
    }

    #[test]
    fn test_owner_required() {
        let mut r = rule("allow");
        r.owner = " ".into();
        assert_eq!(validate_rule(&r), Err(PolicyError::MissingOwner(11)));
    }
}
