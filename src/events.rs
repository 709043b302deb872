//! Event recording for operators.
//!
//! Events are fire-and-forget notifications keyed by a stable reason string.
//! Recording an event never fails and never changes the outcome of a pass.

use colored::Colorize;
use std::cell::RefCell;
use std::fmt;

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Normal => f.write_str("Normal"),
            EventType::Warning => f.write_str("Warning"),
        }
    }
}

/// A recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub type_: EventType,
    pub reason: String,
    pub note: String,
}

/// Sink for events about the cluster being reconciled.
pub trait EventRecorder {
    /// Record an event; implementations must not fail.
    fn publish(&self, type_: EventType, reason: &str, note: String);

    /// Record a normal event.
    fn event(&self, reason: &str, note: String) {
        self.publish(EventType::Normal, reason, note);
    }

    /// Record a warning event.
    fn warn(&self, reason: &str, note: String) {
        self.publish(EventType::Warning, reason, note);
    }
}

/// Writes events to the log.
#[derive(Debug, Default)]
pub struct LogEventRecorder {
    /// Object the events are about, e.g. the cluster name.
    pub object: String,
}

impl LogEventRecorder {
    pub fn new(object: &str) -> Self {
        Self {
            object: object.to_string(),
        }
    }
}

impl EventRecorder for LogEventRecorder {
    fn publish(&self, type_: EventType, reason: &str, note: String) {
        match type_ {
            EventType::Normal => {
                log::info!("[{}] {}: {note}", self.object, reason.green())
            }
            EventType::Warning => {
                log::warn!("[{}] {}: {note}", self.object, reason.on_red())
            }
        }
    }
}

/// Keeps events in memory, in order.
#[derive(Debug, Default)]
pub struct MemoryEventRecorder {
    events: RefCell<Vec<Event>>,
}

impl MemoryEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the recorded events.
    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    /// Reasons of the recorded events, in order.
    pub fn reasons(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .map(|e| e.reason.clone())
            .collect()
    }

    /// True if an event with `reason` was recorded.
    pub fn has_reason(&self, reason: &str) -> bool {
        self.events.borrow().iter().any(|e| e.reason == reason)
    }
}

impl EventRecorder for MemoryEventRecorder {
    fn publish(&self, type_: EventType, reason: &str, note: String) {
        log::debug!("event {type_} {reason}: {note}");
        self.events.borrow_mut().push(Event {
            type_,
            reason: reason.to_string(),
            note,
        });
    }
}

/// Well-known event reason strings.
pub mod reasons {
    // VPC
    pub const SUCCESSFUL_CREATE_VPC: &str = "SuccessfulCreateVPC";
    pub const FAILED_CREATE_VPC: &str = "FailedCreateVPC";
    pub const FAILED_DESCRIBE_VPC: &str = "FailedDescribeVPC";
    pub const FAILED_TAG_VPC: &str = "FailedTagVPC";
    pub const SUCCESSFUL_DELETE_VPC: &str = "SuccessfulDeleteVPC";
    pub const FAILED_DELETE_VPC: &str = "FailedDeleteVPC";

    // Subnets
    pub const FAILED_NO_SUBNETS: &str = "FailedNoSubnets";
    pub const FAILED_DEFAULT_SUBNETS: &str = "FailedDefaultSubnets";
    pub const FAILED_SECONDARY_SUBNETS: &str = "FailedSecondarySubnets";
    pub const FAILED_DESCRIBE_SUBNET: &str = "FailedDescribeSubnet";
    pub const FAILED_DESCRIBE_ZONES: &str = "FailedDescribeAvailabilityZones";
    pub const FAILED_TAG_SUBNET: &str = "FailedTagSubnet";
    pub const FAILED_MATCH_SUBNET: &str = "FailedMatchSubnet";
    pub const FAILED_NO_PRIVATE_SUBNET: &str = "FailedNoPrivateSubnet";
    pub const FAILED_NO_PUBLIC_SUBNET: &str = "FailedNoPublicSubnet";
    pub const FAILED_OVERLAPPING_SUBNETS: &str = "FailedOverlappingSubnets";
    pub const SUCCESSFUL_CREATE_SUBNET: &str = "SuccessfulCreateSubnet";
    pub const FAILED_CREATE_SUBNET: &str = "FailedCreateSubnet";
    pub const FAILED_WAIT_SUBNET_AVAILABLE: &str = "FailedWaitSubnetAvailable";
    pub const SUCCESSFUL_MODIFY_SUBNET_ATTRIBUTES: &str = "SuccessfulModifySubnetAttributes";
    pub const FAILED_MODIFY_SUBNET_ATTRIBUTES: &str = "FailedModifySubnetAttributes";
    pub const SUCCESSFUL_DELETE_SUBNET: &str = "SuccessfulDeleteSubnet";
    pub const FAILED_DELETE_SUBNET: &str = "FailedDeleteSubnet";
    pub const FAILED_PERSIST_STATE: &str = "FailedPersistState";

    // Garbage collection
    pub const FAILED_GC_ANNOTATION: &str = "FailedParseGCAnnotation";
    pub const FAILED_GC_COLLECT: &str = "FailedCollectResources";
    pub const FAILED_GC_CLEANUP: &str = "FailedCleanupResources";
    pub const SUCCESSFUL_GC: &str = "SuccessfulCleanupResources";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_recorder_keeps_order() {
        let recorder = MemoryEventRecorder::new();
        recorder.event(reasons::SUCCESSFUL_CREATE_SUBNET, "subnet-1".to_string());
        recorder.warn(reasons::FAILED_TAG_SUBNET, "subnet-2".to_string());
        assert_eq!(
            recorder.reasons(),
            vec!["SuccessfulCreateSubnet", "FailedTagSubnet"]
        );
        assert_eq!(recorder.events()[1].type_, EventType::Warning);
        assert!(recorder.has_reason("FailedTagSubnet"));
        assert!(!recorder.has_reason("FailedNoSubnets"));
    }

    #[test]
    fn test_log_recorder_does_not_panic() {
        LogEventRecorder::new("test").warn(reasons::FAILED_NO_SUBNETS, "none".to_string());
    }
}
