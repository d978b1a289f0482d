//! Passport Guard - defense-in-depth immutability enforcement
//!
//! The store already rejects mutations of terminal records; the guard is a
//! presentation-independent policy layer that stops such attempts before
//! they reach the store at all. Any renderer or API layer can consult it
//! without depending on a UI framework, and its rejection is reported
//! distinctly from a validation failure: it says "this record is sealed",
//! not "this input is invalid".
//!
//! The guard decides purely on status, independent of who is asking.

#![deny(unsafe_code)]

use std::collections::HashMap;
use std::sync::RwLock;

use passport_types::{BatchId, PassportStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Rejection returned when a mutation targets a non-open passport.
///
/// Deliberately not a store or validation error: callers key user-facing
/// messaging off this type.
#[derive(Clone, Debug, Error, Serialize, Deserialize)]
#[error("passport {batch_id} is {status} and immutable (violation #{violations})")]
pub struct GuardRejection {
    pub batch_id: BatchId,
    pub status: PassportStatus,
    /// Rejected attempts recorded against this passport so far,
    /// including this one.
    pub violations: u64,
}

/// Status-based mutation policy with per-passport violation telemetry.
///
/// Violation counters are scoped to the guard instance and carry no
/// correctness weight; the state machine is enforced by the store alone.
pub struct ImmutableAccessGuard {
    violations: RwLock<HashMap<BatchId, u64>>,
}

impl ImmutableAccessGuard {
    pub fn new() -> Self {
        Self {
            violations: RwLock::new(HashMap::new()),
        }
    }

    /// Whether any field-level mutation is permitted for this status.
    pub fn can_mutate(&self, status: PassportStatus) -> bool {
        status.is_mutable()
    }

    /// Whether the record may be rendered. Read permission is decided
    /// upstream; the guard only forwards that verdict.
    pub fn can_view(&self, exists_and_accessible: bool) -> bool {
        exists_and_accessible
    }

    /// Permit the mutation or record a violation and reject.
    pub fn check_mutation(
        &self,
        batch_id: BatchId,
        status: PassportStatus,
    ) -> Result<(), GuardRejection> {
        if self.can_mutate(status) {
            return Ok(());
        }

        let violations = self.record_violation(batch_id);
        warn!(batch = %batch_id, %status, violations, "Mutation attempt on immutable passport");

        Err(GuardRejection {
            batch_id,
            status,
            violations,
        })
    }

    /// Increment and return the rejected-attempt counter for a passport.
    pub fn record_violation(&self, batch_id: BatchId) -> u64 {
        let Ok(mut violations) = self.violations.write() else {
            return 0;
        };
        let counter = violations.entry(batch_id).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Rejected attempts recorded for a passport since guard construction.
    pub fn violation_count(&self, batch_id: BatchId) -> u64 {
        self.violations
            .read()
            .map(|v| v.get(&batch_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Default for ImmutableAccessGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_in_progress_is_mutable() {
        let guard = ImmutableAccessGuard::new();
        assert!(guard.can_mutate(PassportStatus::InProgress));
        assert!(!guard.can_mutate(PassportStatus::Sealed));
        assert!(!guard.can_mutate(PassportStatus::Withdrawn));
    }

    #[test]
    fn can_view_forwards_accessibility() {
        let guard = ImmutableAccessGuard::new();
        assert!(guard.can_view(true));
        assert!(!guard.can_view(false));
    }

    #[test]
    fn check_mutation_permits_open_records_without_counting() {
        let guard = ImmutableAccessGuard::new();
        guard
            .check_mutation(BatchId(1), PassportStatus::InProgress)
            .unwrap();
        assert_eq!(guard.violation_count(BatchId(1)), 0);
    }

    #[test]
    fn rejections_count_per_passport() {
        let guard = ImmutableAccessGuard::new();

        let first = guard
            .check_mutation(BatchId(1), PassportStatus::Sealed)
            .unwrap_err();
        assert_eq!(first.violations, 1);
        assert_eq!(first.status, PassportStatus::Sealed);

        let second = guard
            .check_mutation(BatchId(1), PassportStatus::Sealed)
            .unwrap_err();
        assert_eq!(second.violations, 2);

        // Counters are independent across passports.
        let other = guard
            .check_mutation(BatchId(2), PassportStatus::Withdrawn)
            .unwrap_err();
        assert_eq!(other.violations, 1);
        assert_eq!(guard.violation_count(BatchId(1)), 2);
    }

    #[test]
    fn counters_reset_with_a_new_guard() {
        let guard = ImmutableAccessGuard::new();
        guard.record_violation(BatchId(1));
        drop(guard);

        let fresh = ImmutableAccessGuard::new();
        assert_eq!(fresh.violation_count(BatchId(1)), 0);
    }
}
