use thiserror::Error;

/// Errors raised while loading or validating a rule document.
///
/// Load errors are accumulated per rule rather than aborting at the first
/// problem, so an operator sees every offending rule in one pass. Any error
/// attached to an enabled rule refuses the whole load.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("document missing top-level 'rules' list")]
    MissingRulesKey,

    #[error("rule {rule}: missing required field '{field}'")]
    MissingField { rule: String, field: &'static str },

    #[error("rule {rule}: invalid severity '{value}'")]
    InvalidSeverity { rule: String, value: String },

    #[error("rule {rule}: invalid count predicate '{value}'")]
    InvalidCount { rule: String, value: String },

    #[error("rule {rule}, condition {index}: {message}")]
    InvalidCondition {
        rule: String,
        index: usize,
        message: String,
    },

    #[error("rule {rule}: must have at least one condition")]
    EmptyConditions { rule: String },

    #[error("rule {rule}: must have at least one action")]
    EmptyActions { rule: String },

    #[error("rule {rule}: unknown action kind '{kind}'")]
    UnknownAction { rule: String, kind: String },

    #[error("rule {rule}: confidence {value} is outside [0, 1]")]
    ConfidenceRange { rule: String, value: f64 },

    #[error("duplicate rule id '{0}'")]
    DuplicateId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;
