//! Error types for network reconciliation.
//!
//! Variants follow how a failure should be handled by the caller: configuration
//! and topology errors need an operator, cloud errors are reported with the
//! operation and resource they belong to.

use crate::cloud::CloudError;
use thiserror::Error;

/// Main error type for reconciliation and garbage collection.
#[derive(Debug, Error)]
pub enum Error {
    /// A CIDR string could not be parsed or split as requested.
    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    /// The desired state or its inputs are not usable.
    #[error("configuration error: {0}")]
    Config(String),

    /// The subnet topology does not satisfy the public/private rules.
    #[error("topology error: {0}")]
    Topology(String),

    /// Reading the observed state failed.
    #[error("failed to describe {resource}: {source}")]
    Describe {
        /// What was being described (e.g. "subnets")
        resource: &'static str,
        /// The underlying cloud error
        source: CloudError,
    },

    /// A mutating cloud call failed with a non-retryable error.
    #[error("failed to {operation} {id}: {source}")]
    Cloud {
        /// Name of the operation (e.g. "create subnet")
        operation: &'static str,
        /// Resource identifier the operation targeted
        id: String,
        /// The underlying cloud error
        source: CloudError,
    },

    /// A blocking poll did not see the expected state in time.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// The desired-state record could not be loaded or saved.
    #[error("state error: {0}")]
    State(String),

    /// Reading or writing a state or snapshot file failed.
    #[error("I/O error on {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    /// A state or snapshot file is not valid JSON for its type.
    #[error("invalid JSON in {file} at {path}: {source}")]
    Json {
        file: String,
        /// JSON path of the offending value, `.` for the root
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Wrap a cloud error with the operation and resource id it belongs to.
    pub fn cloud(operation: &'static str, id: impl Into<String>, source: CloudError) -> Self {
        Error::Cloud {
            operation,
            id: id.into(),
            source,
        }
    }

    /// Wrap an I/O error with the file it happened on.
    pub fn io(file: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            file: file.into(),
            source,
        }
    }

    /// Wrap a JSON error, keeping the path to the value that failed.
    pub fn json(file: impl Into<String>, source: serde_path_to_error::Error<serde_json::Error>) -> Self {
        Error::Json {
            file: file.into(),
            path: source.path().to_string(),
            source: source.into_inner(),
        }
    }

    /// Wrap a cloud error raised while reading observed state.
    pub fn describe(resource: &'static str, source: CloudError) -> Self {
        Error::Describe { resource, source }
    }

    /// True for errors caused by invalid configuration rather than the cloud.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_) | Error::InvalidCidr(_))
    }

    /// Short machine readable reason, used for conditions.
    pub fn condition_reason(&self) -> &'static str {
        match self {
            Error::InvalidCidr(_) | Error::Config(_) => "InvalidConfiguration",
            Error::Topology(_) => "InvalidTopology",
            Error::Describe { .. } => "DescribeFailed",
            Error::Cloud { .. } => "CloudOperationFailed",
            Error::Timeout(_) => "Timeout",
            Error::State(_) | Error::Io { .. } | Error::Json { .. } => "StateUnavailable",
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_error_display() {
        let err = Error::cloud(
            "create subnet",
            "10.0.0.0/24",
            CloudError::new("UnauthorizedOperation", "denied"),
        );
        assert_eq!(
            err.to_string(),
            "failed to create subnet 10.0.0.0/24: UnauthorizedOperation: denied"
        );
    }

    #[test]
    fn test_is_config() {
        assert!(Error::InvalidCidr("x".into()).is_config());
        assert!(Error::Config("x".into()).is_config());
        assert!(!Error::Topology("x".into()).is_config());
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = Error::io(
            "state.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "I/O error on state.json: denied");
        assert_eq!(err.condition_reason(), "StateUnavailable");
        let source = std::error::Error::source(&err).expect("io source");
        assert_eq!(source.to_string(), "denied");
    }

    #[test]
    fn test_json_error_keeps_path_and_source() {
        #[derive(Debug, serde::Deserialize)]
        struct Doc {
            #[allow(dead_code)]
            count: u32,
        }
        let mut deserializer = serde_json::Deserializer::from_str(r#"{"count": "many"}"#);
        let parsed: std::result::Result<Doc, _> = serde_path_to_error::deserialize(&mut deserializer);
        let err = Error::json("doc.json", parsed.unwrap_err());

        assert!(matches!(&err, Error::Json { path, .. } if path == "count"), "{err}");
        assert!(err.to_string().starts_with("invalid JSON in doc.json at count: "));
        assert!(std::error::Error::source(&err).is_some());
    }
}
