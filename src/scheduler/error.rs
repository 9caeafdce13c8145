//! Error types for schedule handling

use std::fmt;

/// Errors raised while interpreting a schedule expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The expression is not `manual`, empty, or a valid five-field cron expression
    InvalidExpression { expression: String, reason: String },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::InvalidExpression { expression, reason } => {
                write!(f, "invalid schedule '{}': {}", expression, reason)
            }
        }
    }
}

impl std::error::Error for ScheduleError {}
