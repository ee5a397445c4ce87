//! Access rules and owner macros

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// An owner-authored access rule
///
/// `None` targets mean "every user" / "every stream". A rule with a
/// `template_name` is a template: it is stored but never resolved directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Assigned by the catalog on insert
    #[serde(default)]
    pub id: u64,
    pub owner: String,
    /// Higher is stronger; `None` is unset
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub target_users: Option<BTreeSet<String>>,
    #[serde(default)]
    pub target_streams: Option<BTreeSet<String>>,
    #[serde(default)]
    pub condition: Option<String>,
    /// `allow`, `deny`, or an aggregate expression
    pub action: String,
    #[serde(default)]
    pub template_name: Option<String>,
}

/// Classified rule action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction<'a> {
    Allow,
    Deny,
    Aggregate(&'a str),
}

impl Rule {
    pub fn action(&self) -> RuleAction<'_> {
        let action = self.action.trim();
        if action.eq_ignore_ascii_case("allow") {
            RuleAction::Allow
        } else if action.eq_ignore_ascii_case("deny") {
            RuleAction::Deny
        } else {
            RuleAction::Aggregate(action)
        }
    }

    pub fn is_template(&self) -> bool {
        self.template_name.is_some()
    }

    /// True when the rule targets this stream and user and is not a template
    pub fn applies_to(&self, stream_name: &str, user: &str) -> bool {
        !self.is_template()
            && self
                .target_streams
                .as_ref()
                .map_or(true, |s| s.contains(stream_name))
            && self
                .target_users
                .as_ref()
                .map_or(true, |u| u.contains(user))
    }

    /// Trimmed condition text; blank conditions count as absent
    pub fn condition_text(&self) -> Option<&str> {
        self.condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    pub fn is_unconditional(&self) -> bool {
        self.condition_text().is_none()
    }
}

/// Owner-defined `$(NAME)` text substitution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macro {
    pub owner: String,
    pub name: String,
    pub value: String,
}
