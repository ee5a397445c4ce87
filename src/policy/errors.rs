use thiserror::Error;

pub type PolicyResult<T> = Result<T, PolicyError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("rule {rule_id}: action must be allow, deny or an aggregate expression ({reason})")]
    InvalidAction { rule_id: u64, reason: String },

    #[error("rule {rule_id}: priority must be at least 1")]
    InvalidPriority { rule_id: u64 },

    #[error("rule {rule_id}: invalid condition: {reason}")]
    InvalidCondition { rule_id: u64, reason: String },

    #[error("rule {0} has no owner")]
    MissingOwner(u64),

    #[error("template '{0}' already exists")]
    DuplicateTemplate(String),

    #[error("template '{0}' not found")]
    UnknownTemplate(String),
}
