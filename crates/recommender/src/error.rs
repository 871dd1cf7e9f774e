//! Error types for the recommendation pipeline
//!
//! Every stage returns `RecommenderError`; nothing is retried because all
//! stages are deterministic functions of their input.

/// Pipeline stage names used in state errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Uninitialized,
    MatrixBuilt,
    Trained,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Uninitialized => "uninitialized",
            Stage::MatrixBuilt => "matrix built",
            Stage::Trained => "trained",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecommenderError {
    /// A required key column is missing from a table
    #[error("Schema error: table '{table}' has no column '{column}'")]
    Schema { table: String, column: String },

    /// A key is missing from (or duplicated in) its reference table
    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Dimension error: {0}")]
    Dimension(String),

    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("State error: {operation} requires the pipeline to be {required}, but it is {actual}")]
    State {
        operation: &'static str,
        required: Stage,
        actual: Stage,
    },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        key: Option<String>,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for RecommenderError {
    fn from(err: bincode::Error) -> Self {
        RecommenderError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_error_message() {
        let err = RecommenderError::State {
            operation: "estimate_sales",
            required: Stage::Trained,
            actual: Stage::MatrixBuilt,
        };
        assert_eq!(
            err.to_string(),
            "State error: estimate_sales requires the pipeline to be trained, but it is matrix built"
        );
    }

    #[test]
    fn test_schema_error_message() {
        let err = RecommenderError::Schema {
            table: "transactions".to_string(),
            column: "article_id".to_string(),
        };
        assert!(err.to_string().contains("'article_id'"));
    }
}
