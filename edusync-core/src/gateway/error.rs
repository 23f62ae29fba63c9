//! Remote gateway error types.

/// Errors that can occur talking to the remote SQL endpoint.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// No connection string was configured
    #[error("Database URL is not configured. Set database_url in the config file or EDUSYNC_DATABASE_URL.")]
    NotConfigured,
    /// The connection string could not be parsed
    #[error("Invalid database URL: {0}")]
    InvalidConnectionString(String),
    /// Request never reached the server or the response was cut off
    #[error("Query failed: {0}")]
    Transport(String),
    /// Server rejected the statement
    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// Postgres SQLSTATE, when the server reported one
        code: Option<String>,
    },
    /// Response body was not in the expected shape
    #[error("Unexpected response from database: {0}")]
    Decode(String),
    /// A dynamic identifier failed validation
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl GatewayError {
    /// True for Postgres integrity constraint violations (SQLSTATE class 23).
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, GatewayError::Query { code: Some(code), .. } if code.starts_with("23"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_violation_detection() {
        let unique = GatewayError::Query {
            message: "duplicate key".to_string(),
            code: Some("23505".to_string()),
        };
        assert!(unique.is_constraint_violation());

        let syntax = GatewayError::Query {
            message: "syntax error".to_string(),
            code: Some("42601".to_string()),
        };
        assert!(!syntax.is_constraint_violation());
        assert!(!GatewayError::Transport("reset".to_string()).is_constraint_violation());
    }
}
