use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Position of an entity in the approval workflow.
/// Records are created `Pending`; `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    /// Check that moving from `self` to `target` is a legal step.
    /// Only `Pending` has outgoing edges, and it never loops back to itself.
    pub fn transition_to(self, target: ApprovalStatus) -> Result<ApprovalStatus, TransitionError> {
        match (self, target) {
            (ApprovalStatus::Pending, ApprovalStatus::Approved)
            | (ApprovalStatus::Pending, ApprovalStatus::Rejected) => Ok(target),
            (from, to) => Err(TransitionError { from, to }),
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move from {from} to {to}")]
pub struct TransitionError {
    pub from: ApprovalStatus,
    pub to: ApprovalStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ApprovalStatus::Pending,
            ApprovalStatus::Approved,
            ApprovalStatus::Rejected,
        ] {
            assert_eq!(ApprovalStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(ApprovalStatus::from_str(" Approved "), Some(ApprovalStatus::Approved));
        assert_eq!(ApprovalStatus::from_str("suspended"), None);
    }

    #[test]
    fn test_pending_can_be_approved_or_rejected() {
        assert_eq!(
            ApprovalStatus::Pending.transition_to(ApprovalStatus::Approved),
            Ok(ApprovalStatus::Approved)
        );
        assert_eq!(
            ApprovalStatus::Pending.transition_to(ApprovalStatus::Rejected),
            Ok(ApprovalStatus::Rejected)
        );
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [ApprovalStatus::Approved, ApprovalStatus::Rejected] {
            assert!(from.is_terminal());
            for to in [
                ApprovalStatus::Pending,
                ApprovalStatus::Approved,
                ApprovalStatus::Rejected,
            ] {
                assert_eq!(from.transition_to(to), Err(TransitionError { from, to }));
            }
        }
    }

    #[test]
    fn test_pending_does_not_loop() {
        assert!(
            ApprovalStatus::Pending
                .transition_to(ApprovalStatus::Pending)
                .is_err()
        );
    }

    #[test]
    fn test_serde_uses_lowercase() {
        let json = serde_json::to_string(&ApprovalStatus::Rejected).unwrap();
        assert_eq!(json, "\"rejected\"");
    }
}
