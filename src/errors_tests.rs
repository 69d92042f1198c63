//! Unit tests for error handling
//!
//! Tests error types, conversions, and error message formatting.

#[cfg(test)]
mod tests {
    use std::io;

    use crate::errors::GrantScoutError;

    // ====== Display Tests ======

    #[test]
    fn test_custom_error() {
        let error = GrantScoutError::Custom("Test error message".to_string());
        assert_eq!(error.to_string(), "Test error message");
    }

    #[test]
    fn test_config_error() {
        let error = GrantScoutError::Config("ranking.max_shortlist must be at least 1".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: ranking.max_shortlist must be at least 1"
        );
    }

    #[test]
    fn test_upstream_and_timeout_display() {
        let error = GrantScoutError::upstream("vector search", "connection refused");
        assert_eq!(error.to_string(), "vector search unavailable: connection refused");

        let error = GrantScoutError::Timeout {
            service: "language model".to_string(),
            secs: 60,
        };
        assert_eq!(error.to_string(), "language model timed out after 60s");
    }

    // ====== Conversion Tests ======

    #[test]
    fn test_io_conversion() {
        let error: GrantScoutError = io::Error::new(io::ErrorKind::NotFound, "config.toml").into();
        assert!(matches!(error, GrantScoutError::Io(_)));
        assert!(error.to_string().starts_with("IO error"));
    }

    #[test]
    fn test_serde_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{oops");
        let error: GrantScoutError = parse.unwrap_err().into();
        assert!(matches!(error, GrantScoutError::Serialization(_)));
    }

    // ====== Classification Tests ======

    #[test]
    fn test_upstream_classification() {
        assert!(GrantScoutError::Llm("x".to_string()).is_upstream());
        assert!(GrantScoutError::Embedding("x".to_string()).is_upstream());
        assert!(GrantScoutError::Http("x".to_string()).is_upstream());
        assert!(GrantScoutError::upstream("db", "down").is_upstream());
        assert!(!GrantScoutError::Config("x".to_string()).is_upstream());
        assert!(!GrantScoutError::Custom("x".to_string()).is_upstream());
    }
}
