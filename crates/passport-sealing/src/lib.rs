//! Passport Sealing - the only sanctioned path for the one-shot seal
//!
//! The orchestrator wraps `PassportStore::seal` with the full pre- and
//! post-condition protocol: fetch, validate, estimate, re-validate, submit.
//! Submission happens at most once per run, and no step is ever skipped.
//! The orchestrator never retries on its own — resubmitting the one-shot
//! transition is a double-seal risk only the caller may accept, after
//! re-fetching status.
//!
//! A run abandoned before submission has no effect. Once submission has
//! been issued it cannot be cancelled client-side; the caller can only
//! await the environment's outcome.

#![deny(unsafe_code)]

pub mod mocks;

use std::sync::Arc;

use async_trait::async_trait;
use passport_readiness::{EvidenceChecklist, ReadinessValidator};
use passport_store::{PassportStore, StoreError};
use passport_types::{BatchId, OwnerId, PassportStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Resource cost estimated for (and charged by) the execution environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cost {
    pub units: u64,
}

/// Identifier the execution environment assigns to a committed submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Successful sealing outcome.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealReceipt {
    pub batch_id: BatchId,
    pub transaction_id: TransactionId,
    pub cost: Cost,
}

/// Execution environment seam: estimates the cost of the seal transition
/// and commits it. Both calls can fail for reasons outside this core's
/// control; such failures are surfaced as a distinct retryable category.
#[async_trait]
pub trait SealingEnvironment: Send + Sync {
    /// Estimate the resource cost of sealing `batch_id`.
    async fn estimate(&self, batch_id: BatchId) -> Result<Cost, EnvironmentError>;

    /// Submit the seal transition. Commits through the record authority
    /// and returns the environment's transaction identifier.
    async fn submit_seal(
        &self,
        batch_id: BatchId,
        caller: &OwnerId,
        package_hash: Option<String>,
    ) -> Result<TransactionId, EnvironmentError>;
}

/// In-process environment: commits directly through the store and derives
/// a deterministic gas-like cost from the snapshot size.
pub struct InProcessEnvironment {
    store: Arc<PassportStore>,
}

impl InProcessEnvironment {
    const BASE_COST: u64 = 21_000;
    const COST_PER_STEP: u64 = 5_000;

    pub fn new(store: Arc<PassportStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SealingEnvironment for InProcessEnvironment {
    async fn estimate(&self, batch_id: BatchId) -> Result<Cost, EnvironmentError> {
        let snapshot = self.store.get(batch_id)?;
        Ok(Cost {
            units: Self::BASE_COST
                + Self::COST_PER_STEP * snapshot.processing_step_count() as u64,
        })
    }

    async fn submit_seal(
        &self,
        batch_id: BatchId,
        caller: &OwnerId,
        package_hash: Option<String>,
    ) -> Result<TransactionId, EnvironmentError> {
        self.store.seal(batch_id, caller, package_hash)?;
        Ok(TransactionId::generate())
    }
}

/// Coordinates validate → estimate → submit → report around the
/// irreversible seal transition.
pub struct SealingOrchestrator {
    store: Arc<PassportStore>,
    environment: Arc<dyn SealingEnvironment>,
    validator: ReadinessValidator,
}

impl SealingOrchestrator {
    pub fn new(store: Arc<PassportStore>, environment: Arc<dyn SealingEnvironment>) -> Self {
        Self {
            store,
            environment,
            validator: ReadinessValidator::new(),
        }
    }

    pub fn with_validator(mut self, validator: ReadinessValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Run the full sealing protocol for one passport.
    ///
    /// Strictly sequential: snapshot → readiness verdict → cost estimate →
    /// status re-check → single submission. Aborting at any step leaves the
    /// store untouched; on success exactly one seal commit has happened.
    pub async fn seal_passport(
        &self,
        batch_id: BatchId,
        caller: &OwnerId,
        package_hash: Option<String>,
        evidence: &EvidenceChecklist,
    ) -> Result<SealReceipt, SealingError> {
        // Step 1: current snapshot.
        let snapshot = self.store.get(batch_id)?;
        check_in_progress(batch_id, snapshot.status)?;

        // Step 2: readiness verdict. Not ready means no estimate is
        // requested and no transition is attempted.
        let report = self.validator.assess_now(&snapshot, evidence);
        if !report.overall_ready {
            warn!(batch = %batch_id, warnings = report.warnings.len(), "Passport not ready to seal");
            return Err(SealingError::NotReady {
                warnings: report.warnings,
            });
        }
        debug!(batch = %batch_id, "Readiness verdict: ready");

        // Step 3: cost estimate from the environment that will commit.
        let cost = self
            .environment
            .estimate(batch_id)
            .await
            .map_err(SealingError::classify)?;
        debug!(batch = %batch_id, cost = cost.units, "Seal cost estimated");

        // Step 4: re-validate immediately before submission. Status may
        // have changed between steps 1 and 3.
        let snapshot = self.store.get(batch_id)?;
        check_in_progress(batch_id, snapshot.status)?;

        // Step 5: submit exactly once. No automatic retry on failure.
        let transaction_id = self
            .environment
            .submit_seal(batch_id, caller, package_hash)
            .await
            .map_err(SealingError::classify)?;

        info!(batch = %batch_id, tx = %transaction_id.0, "Passport sealed via orchestrator");

        Ok(SealReceipt {
            batch_id,
            transaction_id,
            cost,
        })
    }
}

fn check_in_progress(batch_id: BatchId, status: PassportStatus) -> Result<(), SealingError> {
    match status {
        PassportStatus::InProgress => Ok(()),
        PassportStatus::Sealed => Err(SealingError::AlreadySealed(batch_id)),
        PassportStatus::Withdrawn => Err(SealingError::AlreadyWithdrawn(batch_id)),
    }
}

/// Failures surfaced by the execution environment. Transient variants are
/// the retryable category; a `Reverted` carries the record authority's own
/// classification and is never retryable. The orchestrator never retries
/// either kind itself; callers own the backoff decision because
/// resubmission risks double-committing the transition.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("cost estimate failed: {0}")]
    EstimateFailed(String),

    #[error("submission rejected before commit: {0}")]
    Rejected(String),

    #[error("reverted by the record authority: {0}")]
    Reverted(#[from] StoreError),

    #[error("execution environment unavailable: {0}")]
    Unavailable(String),
}

/// Errors from a sealing run.
#[derive(Debug, Error)]
pub enum SealingError {
    #[error("passport not ready to seal ({} warnings)", .warnings.len())]
    NotReady { warnings: Vec<String> },

    #[error("passport {0} is already sealed")]
    AlreadySealed(BatchId),

    #[error("passport {0} is already withdrawn")]
    AlreadyWithdrawn(BatchId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("environment error: {0}")]
    Environment(EnvironmentError),
}

impl SealingError {
    /// Classify an environment failure. A revert carries the record
    /// authority's own verdict, so it keeps the store taxonomy (a lost
    /// seal race surfaces as `AlreadySealed`, an ownership refusal as a
    /// store error); only genuinely environmental failures stay in the
    /// retryable `Environment` category.
    fn classify(err: EnvironmentError) -> Self {
        match err {
            EnvironmentError::Reverted(StoreError::AlreadySealed(id)) => {
                SealingError::AlreadySealed(id)
            }
            EnvironmentError::Reverted(StoreError::AlreadyWithdrawn(id)) => {
                SealingError::AlreadyWithdrawn(id)
            }
            EnvironmentError::Reverted(store) => SealingError::Store(store),
            transient => SealingError::Environment(transient),
        }
    }

    /// Whether the caller may reasonably retry after its own backoff.
    /// Only environment failures qualify; everything else is final for
    /// the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SealingError::Environment(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::ScriptedEnvironment;
    use passport_store::mocks::{MockCapabilityProvider, NullSink};
    use passport_types::Capability;

    fn farmer() -> OwnerId {
        OwnerId::new("farmer-f")
    }

    fn store() -> Arc<PassportStore> {
        let capabilities = MockCapabilityProvider::new();
        capabilities.grant(farmer(), Capability::Producer);
        Arc::new(PassportStore::new(
            Arc::new(capabilities),
            Arc::new(NullSink),
        ))
    }

    fn ready_evidence() -> EvidenceChecklist {
        EvidenceChecklist {
            photos_present: true,
            descriptions_valid: true,
            harvested_at: None,
        }
    }

    fn ready_batch(store: &PassportStore) -> BatchId {
        let id = store
            .create(&farmer(), "Ceylon Cinnamon", 2500, "ipfs://h1")
            .unwrap();
        store
            .append_processing_step(id, &farmer(), "ipfs://p1")
            .unwrap();
        id
    }

    #[tokio::test]
    async fn full_protocol_seals_the_passport() {
        let store = store();
        let id = ready_batch(&store);
        let env = Arc::new(ScriptedEnvironment::passthrough(store.clone()));
        let orchestrator = SealingOrchestrator::new(store.clone(), env.clone());

        let receipt = orchestrator
            .seal_passport(id, &farmer(), Some("ipfs://pkg".into()), &ready_evidence())
            .await
            .unwrap();

        assert_eq!(receipt.batch_id, id);
        assert_eq!(receipt.cost.units, 26_000); // base + one step
        assert_eq!(store.get(id).unwrap().status, PassportStatus::Sealed);
        assert_eq!(env.estimate_calls(), 1);
        assert_eq!(env.submit_calls(), 1);
    }

    #[tokio::test]
    async fn not_ready_aborts_before_estimate() {
        let store = store();
        let id = store
            .create(&farmer(), "Ceylon Cinnamon", 2500, "ipfs://h1")
            .unwrap(); // zero processing steps
        let env = Arc::new(ScriptedEnvironment::passthrough(store.clone()));
        let orchestrator = SealingOrchestrator::new(store.clone(), env.clone());

        let err = orchestrator
            .seal_passport(id, &farmer(), None, &ready_evidence())
            .await
            .unwrap_err();

        assert!(matches!(err, SealingError::NotReady { .. }));
        assert!(!err.is_retryable());
        assert_eq!(env.estimate_calls(), 0);
        assert_eq!(env.submit_calls(), 0);
        assert_eq!(store.get(id).unwrap().status, PassportStatus::InProgress);
    }

    #[tokio::test]
    async fn estimate_failure_is_retryable_and_mutates_nothing() {
        let store = store();
        let id = ready_batch(&store);
        let env = Arc::new(
            ScriptedEnvironment::passthrough(store.clone()).failing_estimate("node timeout"),
        );
        let orchestrator = SealingOrchestrator::new(store.clone(), env.clone());

        let err = orchestrator
            .seal_passport(id, &farmer(), None, &ready_evidence())
            .await
            .unwrap_err();

        assert!(matches!(err, SealingError::Environment(_)));
        assert!(err.is_retryable());
        assert_eq!(env.submit_calls(), 0);
        assert_eq!(store.get(id).unwrap().status, PassportStatus::InProgress);
    }

    #[tokio::test]
    async fn submit_failure_is_surfaced_without_retry() {
        let store = store();
        let id = ready_batch(&store);
        let env = Arc::new(
            ScriptedEnvironment::passthrough(store.clone()).failing_submit("rejected by signer"),
        );
        let orchestrator = SealingOrchestrator::new(store.clone(), env.clone());

        let err = orchestrator
            .seal_passport(id, &farmer(), None, &ready_evidence())
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(env.submit_calls(), 1);
        assert_eq!(store.get(id).unwrap().status, PassportStatus::InProgress);
    }

    #[tokio::test]
    async fn concurrent_terminal_transition_caught_by_recheck() {
        let store = store();
        let id = ready_batch(&store);
        // The scripted environment seals the record during estimation,
        // simulating another actor winning the race between steps 1 and 3.
        let env = Arc::new(
            ScriptedEnvironment::passthrough(store.clone()).sealing_during_estimate(farmer()),
        );
        let orchestrator = SealingOrchestrator::new(store.clone(), env.clone());

        let err = orchestrator
            .seal_passport(id, &farmer(), None, &ready_evidence())
            .await
            .unwrap_err();

        assert!(matches!(err, SealingError::AlreadySealed(_)));
        assert_eq!(env.submit_calls(), 0);
    }

    #[tokio::test]
    async fn non_owner_rejection_keeps_store_taxonomy() {
        let store = store();
        let id = ready_batch(&store);
        let env = Arc::new(ScriptedEnvironment::passthrough(store.clone()));
        let orchestrator = SealingOrchestrator::new(store.clone(), env.clone());

        let err = orchestrator
            .seal_passport(id, &OwnerId::new("stranger"), None, &ready_evidence())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SealingError::Store(StoreError::Forbidden { .. })
        ));
        assert!(!err.is_retryable());
        assert_eq!(store.get(id).unwrap().status, PassportStatus::InProgress);
    }

    #[tokio::test]
    async fn race_lost_at_submit_is_already_sealed_not_retryable() {
        let store = store();
        let id = ready_batch(&store);
        // Another actor seals after the status re-check but before the
        // commit lands; the loser must observe AlreadySealed, final for
        // this operation.
        let env = Arc::new(
            ScriptedEnvironment::passthrough(store.clone()).sealing_during_submit(farmer()),
        );
        let orchestrator = SealingOrchestrator::new(store.clone(), env.clone());

        let err = orchestrator
            .seal_passport(id, &farmer(), None, &ready_evidence())
            .await
            .unwrap_err();

        assert!(matches!(err, SealingError::AlreadySealed(_)));
        assert!(!err.is_retryable());
        assert_eq!(env.submit_calls(), 1);
    }

    #[tokio::test]
    async fn already_sealed_snapshot_aborts_immediately() {
        let store = store();
        let id = ready_batch(&store);
        store.seal(id, &farmer(), None).unwrap();
        let env = Arc::new(ScriptedEnvironment::passthrough(store.clone()));
        let orchestrator = SealingOrchestrator::new(store.clone(), env.clone());

        let err = orchestrator
            .seal_passport(id, &farmer(), None, &ready_evidence())
            .await
            .unwrap_err();

        assert!(matches!(err, SealingError::AlreadySealed(_)));
        assert_eq!(env.estimate_calls(), 0);
    }

    #[tokio::test]
    async fn withdrawn_snapshot_aborts_with_distinct_error() {
        let store = store();
        let id = ready_batch(&store);
        store.withdraw(id, &farmer()).unwrap();
        let env = Arc::new(ScriptedEnvironment::passthrough(store.clone()));
        let orchestrator = SealingOrchestrator::new(store, env);

        let err = orchestrator
            .seal_passport(id, &farmer(), None, &ready_evidence())
            .await
            .unwrap_err();

        assert!(matches!(err, SealingError::AlreadyWithdrawn(_)));
    }
}
