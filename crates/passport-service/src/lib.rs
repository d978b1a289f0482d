//! Passport Service - the unified passport lifecycle facade
//!
//! Wires the record authority, the immutability guard, and the sealing
//! orchestrator together behind one surface. Every mutation entry point
//! consults the guard before the store, so edit attempts against sealed
//! records are stopped — and counted — before they reach the authority
//! layer. The store still rejects them on its own if the guard is bypassed.

#![deny(unsafe_code)]

use std::sync::Arc;

use passport_guard::{GuardRejection, ImmutableAccessGuard};
use passport_readiness::{EvidenceChecklist, ReadinessReport, ReadinessValidator};
use passport_sealing::{
    InProcessEnvironment, SealReceipt, SealingEnvironment, SealingError, SealingOrchestrator,
};
use passport_store::{CapabilityProvider, EventSink, PassportStore, StoreError};
use passport_types::{BatchId, OwnerId, Passport, PassportStatus};
use thiserror::Error;

/// The passport lifecycle service.
pub struct PassportService {
    store: Arc<PassportStore>,
    guard: ImmutableAccessGuard,
    orchestrator: SealingOrchestrator,
    validator: ReadinessValidator,
}

impl PassportService {
    /// Create a service committing seals through the in-process environment.
    pub fn new(capabilities: Arc<dyn CapabilityProvider>, events: Arc<dyn EventSink>) -> Self {
        let store = Arc::new(PassportStore::new(capabilities, events));
        let environment = Arc::new(InProcessEnvironment::new(store.clone()));
        Self::with_environment(store, environment)
    }

    /// Create a service over an explicit execution environment.
    pub fn with_environment(
        store: Arc<PassportStore>,
        environment: Arc<dyn SealingEnvironment>,
    ) -> Self {
        Self {
            orchestrator: SealingOrchestrator::new(store.clone(), environment),
            store,
            guard: ImmutableAccessGuard::new(),
            validator: ReadinessValidator::new(),
        }
    }

    // ============ Lifecycle Operations ============

    /// Create a new passport owned by `owner`.
    pub fn create_passport(
        &self,
        owner: &OwnerId,
        spice_type: &str,
        total_weight_grams: u64,
        harvest_hash: &str,
    ) -> Result<BatchId, PassportError> {
        Ok(self
            .store
            .create(owner, spice_type, total_weight_grams, harvest_hash)?)
    }

    /// Append a processing evidence hash to an open passport.
    pub fn append_processing_step(
        &self,
        batch_id: BatchId,
        caller: &OwnerId,
        hash: &str,
    ) -> Result<usize, PassportError> {
        self.check_guard(batch_id)?;
        Ok(self.store.append_processing_step(batch_id, caller, hash)?)
    }

    /// Assess whether a passport is ready to seal, without touching it.
    pub fn assess_readiness(
        &self,
        batch_id: BatchId,
        evidence: &EvidenceChecklist,
    ) -> Result<ReadinessReport, PassportError> {
        let snapshot = self.store.get(batch_id)?;
        Ok(self.validator.assess_now(&snapshot, evidence))
    }

    /// Seal a passport through the full orchestration protocol.
    pub async fn seal_passport(
        &self,
        batch_id: BatchId,
        caller: &OwnerId,
        package_hash: Option<String>,
        evidence: &EvidenceChecklist,
    ) -> Result<SealReceipt, PassportError> {
        self.check_guard(batch_id)?;
        Ok(self
            .orchestrator
            .seal_passport(batch_id, caller, package_hash, evidence)
            .await?)
    }

    /// Withdraw an open passport.
    pub fn withdraw_passport(
        &self,
        batch_id: BatchId,
        caller: &OwnerId,
    ) -> Result<(), PassportError> {
        self.check_guard(batch_id)?;
        Ok(self.store.withdraw(batch_id, caller)?)
    }

    // ============ Query Operations ============

    /// Point-in-time snapshot of a passport.
    pub fn passport(&self, batch_id: BatchId) -> Result<Passport, PassportError> {
        Ok(self.store.get(batch_id)?)
    }

    /// Batch ids owned by `owner`, in creation order.
    pub fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<BatchId>, PassportError> {
        Ok(self.store.list_by_owner(owner)?)
    }

    /// Batch ids currently in `status`.
    pub fn list_by_status(&self, status: PassportStatus) -> Result<Vec<BatchId>, PassportError> {
        Ok(self.store.list_by_status(status)?)
    }

    // ============ Component Access ============

    /// The record authority.
    pub fn store(&self) -> &Arc<PassportStore> {
        &self.store
    }

    /// The immutability guard.
    pub fn guard(&self) -> &ImmutableAccessGuard {
        &self.guard
    }

    /// Consult the guard with the record's current status. Unknown records
    /// fall through to the store, which reports `NotFound`.
    fn check_guard(&self, batch_id: BatchId) -> Result<(), PassportError> {
        if let Ok(snapshot) = self.store.get(batch_id) {
            self.guard.check_mutation(batch_id, snapshot.status)?;
        }
        Ok(())
    }
}

/// Facade errors: every failure is one of the typed outcomes below.
#[derive(Debug, Error)]
pub enum PassportError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("sealing error: {0}")]
    Sealing(#[from] SealingError),

    /// Guard rejection: the record is immutable, the input was fine.
    #[error("{0}")]
    Immutable(#[from] GuardRejection),
}
