//! Unified error types for the Stackline workspace.
//!
//! Every variant maps onto one class of failure: synthesis-time
//! configuration errors, construction-order violations, topology invariant
//! violations, and unresolved references inside the resource graph. All of
//! them surface before any provider interaction takes place.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum StacklineError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A topology was constructed before one of its dependencies completed.
    #[error("construction order violation: {message}")]
    Ordering {
        /// Description of the violated ordering.
        message: String,
    },

    /// A topology invariant does not hold for the declared resources.
    #[error("invariant violated by {resource}: {message}")]
    Invariant {
        /// Logical id (or kind) of the offending resource.
        resource: String,
        /// Description of the violated invariant.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A name that must be unique was declared twice.
    #[error("duplicate {kind}: {id}")]
    Duplicate {
        /// Type of the duplicated item.
        kind: &'static str,
        /// The duplicated identifier.
        id: String,
    },

    /// A hash validation failed.
    #[error("hash mismatch for {resource}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Resource that failed validation.
        resource: String,
        /// Expected hash value.
        expected: String,
        /// Actual computed hash value.
        actual: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// YAML deserialization failed.
    #[error("yaml error: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

impl StacklineError {
    /// Shorthand for a [`StacklineError::Config`] error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Shorthand for a [`StacklineError::Invariant`] error.
    pub fn invariant(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invariant {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`StacklineError::Ordering`] error.
    pub fn ordering(message: impl Into<String>) -> Self {
        Self::Ordering {
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, StacklineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_message_names_resource() {
        let err = StacklineError::invariant("PrivateSubnet1RouteTable", "route bypasses NAT");
        let msg = err.to_string();
        assert!(msg.contains("PrivateSubnet1RouteTable"), "got: {msg}");
        assert!(msg.contains("route bypasses NAT"), "got: {msg}");
    }

    #[test]
    fn ordering_message_is_prefixed() {
        let err = StacklineError::ordering("network stack is not sealed");
        assert!(err.to_string().starts_with("construction order violation"));
    }

    #[test]
    fn serde_json_error_converts() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: StacklineError = source.into();
        assert!(matches!(err, StacklineError::Serialization { .. }));
    }
}
