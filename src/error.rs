//! Error types for survey navigation
//!
//! Navigation queries never fail: "no match" and "ambiguous match" are expressed as
//! `None`. These errors only surface while loading or validating task definitions.

use thiserror::Error;

/// Errors that can occur while loading task definitions, results or snapshots
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("Failed to parse task definition: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("Task failed validation with {} issue(s)", .0.len())]
    InvalidTask(Vec<ValidationError>),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

/// Authoring problems found by [`crate::task::Task::validate`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Duplicate step identifier '{identifier}' in '{scope}'")]
    DuplicateStep { scope: String, identifier: String },

    #[error("Step '{step}' references unknown skip target '{target}'")]
    UnknownSkipTarget { step: String, target: String },

    #[error("Rule on '{field}' uses operator '{operator}' without a matching answer")]
    MissingMatchingAnswer { field: String, operator: String },

    #[error("Rule on '{field}' uses operator '{operator}' which is unsupported for {answer_type} answers")]
    UnsupportedOperator {
        field: String,
        operator: String,
        answer_type: String,
    },

    #[error("Rule on '{field}' has a matching answer that cannot be read as {answer_type}")]
    MismatchedMatchingAnswer { field: String, answer_type: String },

    #[error("Cohort rule on step '{step}' has no required cohorts and will never fire")]
    EmptyRequiredCohorts { step: String },

    #[error("Step '{step}' skips on missing answer '{identifier}' which no input field produces")]
    UnknownSkipCondition { step: String, identifier: String },
}

impl ValidationError {
    /// Whether this issue leaves navigation well-defined (the offending rule is simply inert)
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            ValidationError::EmptyRequiredCohorts { .. }
                | ValidationError::UnknownSkipCondition { .. }
        )
    }
}
