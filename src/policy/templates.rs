//! Rule templates
//!
//! A template is a stored rule with a `template_name`. Its condition may
//! contain `$(PARAM)` placeholders that are filled in when a concrete rule
//! is created from it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::Rule;
use crate::predicate::substitute;

use super::errors::PolicyResult;
use super::validation::validate_rule;

/// Request to create a concrete rule from a template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateInstantiation {
    pub template_name: String,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Replaces the template's target users when set
    #[serde(default)]
    pub target_users: Option<BTreeSet<String>>,
    /// Replaces the template's target streams when set
    #[serde(default)]
    pub target_streams: Option<BTreeSet<String>>,
}

/// Builds and validates the concrete rule with id `id`
pub fn instantiate_template(
    template: &Rule,
    request: &TemplateInstantiation,
    id: u64,
) -> PolicyResult<Rule> {
    let condition = template.condition.as_deref().map(|c| {
        substitute(c, |name| request.parameters.get(name).map(String::as_str))
    });

    let rule = Rule {
        id,
        owner: template.owner.clone(),
        priority: request.priority,
        target_users: request
            .target_users
            .clone()
            .or_else(|| template.target_users.clone()),
        target_streams: request
            .target_streams
            .clone()
            .or_else(|| template.target_streams.clone()),
        condition,
        action: template.action.clone(),
        template_name: None,
    };

    validate_rule(&rule)?;
    Ok(rule)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Rule {
        Rule {
            id: 1,
            owner: "alice".into(),
            priority: None,
            target_users: Some(["bob".to_string()].into_iter().collect()),
            target_streams: None,
            condition: Some("temp > $(LIMIT) AND $(HOME)".into()),
            action: "allow".into(),
            template_name: Some("warm".into()),
        }
    }

    #[test]
    fn test_parameters_substituted_and_macros_kept() {
        let request = TemplateInstantiation {
            template_name: "warm".into(),
            priority: Some(4),
            parameters: [("LIMIT".to_string(), "25".to_string())].into_iter().collect(),
            ..Default::default()
        };
        let rule = instantiate_template(&template(), &request, 42).unwrap();
        assert_eq!(rule.id, 42);
        assert_eq!(rule.priority, Some(4));
        assert_eq!(rule.condition.as_deref(), Some("temp > 25 AND $(HOME)"));
        assert!(rule.template_name.is_none());
        assert_eq!(rule.target_users, template().target_users);
    }

    #[test]
    fn test_target_overrides() {
        let request = TemplateInstantiation {
            template_name: "warm".into(),
            target_users: Some(["carol".to_string()].into_iter().collect()),
            target_streams: Some(["env".to_string()].into_iter().collect()),
            ..Default::default()
        };
        let rule = instantiate_template(&template(), &request, 2).unwrap();
        assert!(rule.applies_to("env", "carol"));
        assert!(!rule.applies_to("env", "bob"));
    }

    #[test]
    fn test_invalid_priority_rejected() {
        let request = TemplateInstantiation {
            template_name: "warm".into(),
            priority: Some(0),
            ..Default::default()
        };
        assert!(instantiate_template(&template(), &request, 2).is_err());
    }
}
