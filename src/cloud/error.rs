//! Errors returned by cloud API clients.

use thiserror::Error;

/// Error code for a subnet that does not exist (yet).
pub const SUBNET_NOT_FOUND: &str = "InvalidSubnetID.NotFound";
/// Error code for a VPC that does not exist.
pub const VPC_NOT_FOUND: &str = "InvalidVpcID.NotFound";
/// Error code for a security group that does not exist.
pub const GROUP_NOT_FOUND: &str = "InvalidGroup.NotFound";
/// Error code for a load balancer that does not exist.
pub const LOAD_BALANCER_NOT_FOUND: &str = "LoadBalancerNotFound";
/// Error code for a target group that does not exist.
pub const TARGET_GROUP_NOT_FOUND: &str = "TargetGroupNotFound";
/// Error code for a resource that is still in use by another.
pub const DEPENDENCY_VIOLATION: &str = "DependencyViolation";

/// An error reported by the cloud provider, identified by its error code.
///
/// Leaf error: the provider's answer has no underlying cause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct CloudError {
    /// Provider error code, e.g. `InvalidSubnetID.NotFound`.
    pub code: String,
    /// Human readable message.
    pub message: String,
}

impl CloudError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        CloudError {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// True for any "does not exist" code.
    pub fn is_not_found(&self) -> bool {
        self.code.ends_with("NotFound")
    }

    /// True only when a subnet was not found.
    pub fn is_subnet_not_found(&self) -> bool {
        self.code == SUBNET_NOT_FOUND
    }

    /// True when the resource is still referenced by another.
    pub fn is_dependency_violation(&self) -> bool {
        self.code == DEPENDENCY_VIOLATION
    }
}

/// Result alias for cloud calls.
pub type CloudResult<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_codes() {
        assert!(CloudError::new(SUBNET_NOT_FOUND, "").is_not_found());
        assert!(CloudError::new(SUBNET_NOT_FOUND, "").is_subnet_not_found());
        assert!(CloudError::new(LOAD_BALANCER_NOT_FOUND, "").is_not_found());
        assert!(!CloudError::new(VPC_NOT_FOUND, "").is_subnet_not_found());
        assert!(!CloudError::new("UnauthorizedOperation", "").is_not_found());
    }

    #[test]
    fn test_display() {
        let err = CloudError::new(DEPENDENCY_VIOLATION, "sg-1 is in use");
        assert_eq!(err.to_string(), "DependencyViolation: sg-1 is in use");
        assert!(std::error::Error::source(&err).is_none());
    }
}
