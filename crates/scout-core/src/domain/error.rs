//! Domain-level error taxonomy for the Scout engine.

use crate::domain::session::SessionStatus;

/// Scout engine errors.
///
/// Fatal variants terminate a session (`InvalidInput`, `ToolFailed`,
/// `SchemaValidation`); `Scoring` is non-fatal (the offending evidence item
/// is skipped); `BudgetExceeded` is a stop signal, not a crash.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid agent spec: {0}")]
    InvalidSpec(String),

    #[error("tool '{tool}' failed after {attempts} attempt(s): {message}")]
    ToolFailed {
        tool: String,
        attempts: u32,
        message: String,
    },

    #[error("scoring error: {0}")]
    Scoring(String),

    #[error("budget exceeded: charging {amount:.4} would push total past limit {limit:.4}")]
    BudgetExceeded { amount: f64, limit: f64 },

    #[error("output schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("illegal session status transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("planning error: {0}")]
    Planning(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("spec document error: {0}")]
    SpecDocument(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Scout engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::InvalidInput("missing field 'query'".to_string());
        assert!(err.to_string().contains("invalid input"));

        let err = EngineError::ToolFailed {
            tool: "reddit_search".to_string(),
            attempts: 3,
            message: "timed out".to_string(),
        };
        assert!(err.to_string().contains("reddit_search"));
        assert!(err.to_string().contains("3 attempt"));
    }

    #[test]
    fn test_budget_exceeded_display() {
        let err = EngineError::BudgetExceeded {
            amount: 0.25,
            limit: 1.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("budget exceeded"));
        assert!(msg.contains("1.0000"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = EngineError::InvalidTransition {
            from: SessionStatus::Completed,
            to: SessionStatus::Running,
        };
        assert!(err.to_string().contains("completed -> running"));
    }
}
