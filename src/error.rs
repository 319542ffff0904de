//! Error types for the policy optimization framework.
//!
//! This module defines the crate-wide error enum. Every variant maps onto a
//! row of the error-handling table in the specification: config errors are
//! hard stops, constraint/parse/transport failures are iteration-level
//! rejections handled by the optimization loop (not propagated as `Error`),
//! and simulator/database/interrupt failures are fatal for the run.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the policy optimization framework.
#[derive(Error, Debug)]
pub enum Error {
    /// Error loading or validating an `ExperimentConfig`.
    #[error("configuration error: {message}")]
    Config {
        /// Detailed error message.
        message: String,
        /// Field that caused the error, if applicable.
        field: Option<String>,
    },

    /// A proposed policy violated the declared `ScenarioConstraints`.
    ///
    /// Produced by the constraint validator and surfaced as an
    /// iteration-level rejection reason, never raised as a hard error up
    /// through the optimization loop.
    #[error("constraint violation: {message}")]
    ConstraintViolation {
        /// Detailed error message.
        message: String,
        /// Parameter or tree name that caused the violation, if applicable.
        parameter: Option<String>,
    },

    /// The LLM's raw structured output could not be parsed into a policy.
    #[error("policy parse error: {message}")]
    PolicyParse {
        /// Detailed error message.
        message: String,
    },

    /// Transport-level failure talking to an LLM provider (network, 5xx, timeout).
    #[error("LLM transport error: {message}")]
    LlmTransport {
        /// Detailed error message.
        message: String,
    },

    /// The simulator raised an internal error evaluating a seed. Fatal for the run.
    #[error("simulator error (seed {seed}): {message}")]
    Simulator {
        /// Detailed error message.
        message: String,
        /// The seed being evaluated when the failure occurred.
        seed: u64,
    },

    /// A database/persistence operation failed. Fatal for the run.
    #[error("database error: {message}")]
    Database {
        /// Detailed error message.
        message: String,
    },

    /// The run was cooperatively cancelled (e.g. SIGINT).
    #[error("run interrupted")]
    Interrupted,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal error (unexpected condition that should not occur).
    #[error("internal error: {message}")]
    Internal {
        /// Detailed error message.
        message: String,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error with field context.
    pub fn config_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a constraint violation error.
    pub fn constraint_violation(message: impl Into<String>) -> Self {
        Error::ConstraintViolation {
            message: message.into(),
            parameter: None,
        }
    }

    /// Create a constraint violation error with the offending parameter name.
    pub fn constraint_violation_param(
        message: impl Into<String>,
        parameter: impl Into<String>,
    ) -> Self {
        Error::ConstraintViolation {
            message: message.into(),
            parameter: Some(parameter.into()),
        }
    }

    /// Create a policy parse error.
    pub fn policy_parse(message: impl Into<String>) -> Self {
        Error::PolicyParse {
            message: message.into(),
        }
    }

    /// Create an LLM transport error.
    pub fn llm_transport(message: impl Into<String>) -> Self {
        Error::LlmTransport {
            message: message.into(),
        }
    }

    /// Create a simulator error for the given seed.
    pub fn simulator(message: impl Into<String>, seed: u64) -> Self {
        Error::Simulator {
            message: message.into(),
            seed,
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Error::Database {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Whether this error is retryable at the LLM client layer.
    ///
    /// Only transport-level failures are retried; parse failures are
    /// deterministic, so retrying would not change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LlmTransport { .. })
    }

    /// Category string for telemetry and CLI error rendering.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config",
            Error::ConstraintViolation { .. } => "constraint",
            Error::PolicyParse { .. } => "parse",
            Error::LlmTransport { .. } => "llm-transport",
            Error::Simulator { .. } => "simulator",
            Error::Database { .. } => "database",
            Error::Interrupted => "interrupted",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Yaml(_) => "yaml",
            Error::Internal { .. } => "internal",
        }
    }

    /// The process exit code this error should produce when surfaced by the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Interrupted => 130,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_category() {
        let err = Error::config("missing field");
        assert_eq!(err.category(), "config");
        assert!(!err.is_retryable());
    }

    #[test]
    fn transport_error_is_retryable() {
        let err = Error::llm_transport("connection reset");
        assert!(err.is_retryable());
        assert_eq!(err.category(), "llm-transport");
    }

    #[test]
    fn parse_error_is_not_retryable() {
        let err = Error::policy_parse("invalid JSON");
        assert!(!err.is_retryable());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(Error::config("x").exit_code(), 1);
        assert_eq!(Error::Interrupted.exit_code(), 130);
    }
}
