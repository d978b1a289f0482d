//! Passport Store - sole authority for passport existence and transitions
//!
//! Every record enters the system through `create`, accumulates processing
//! evidence through `append_processing_step`, and leaves the mutable world
//! through exactly one of `seal` or `withdraw`. Terminal states are final:
//! no operation ever deletes a record or revives a terminal one.
//!
//! The store is append-only in spirit: the only mutations are appending a
//! processing hash while a passport is open and the single terminal
//! transition. Everything else is rejected with a typed error.

#![deny(unsafe_code)]

pub mod mocks;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use passport_types::{
    BatchId, Capability, OwnerId, Passport, PassportEvent, PassportStatus, MAX_SPICE_TYPE_CHARS,
    MAX_TOTAL_WEIGHT_GRAMS,
};
use thiserror::Error;
use tracing::info;

/// Authorization seam: answers whether a caller holds a capability.
///
/// The store never embeds an authorization mechanism; an in-memory set,
/// a database lookup, or an external identity service all fit behind this.
pub trait CapabilityProvider: Send + Sync {
    fn has_capability(&self, caller: &OwnerId, capability: Capability) -> bool;
}

/// Notification seam: receives one structured event per successful
/// state-changing operation. Delivery and ordering are out of scope here.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PassportEvent);
}

/// The authoritative keyed collection of passport records.
///
/// Interior mutability follows the ledger pattern used across the
/// accountability crates: per-structure `RwLock`s with clone-out snapshots.
/// A terminal transition holds the records write lock across the status
/// check and the write, so at most one terminal transition can ever
/// succeed per passport.
pub struct PassportStore {
    records: RwLock<HashMap<BatchId, Passport>>,
    owner_index: RwLock<HashMap<OwnerId, Vec<BatchId>>>,
    sequence: RwLock<u64>,
    capabilities: Arc<dyn CapabilityProvider>,
    events: Arc<dyn EventSink>,
}

impl PassportStore {
    /// Create a store over the given authorization and notification seams.
    pub fn new(capabilities: Arc<dyn CapabilityProvider>, events: Arc<dyn EventSink>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            owner_index: RwLock::new(HashMap::new()),
            sequence: RwLock::new(0),
            capabilities,
            events,
        }
    }

    /// Create a new passport owned by `owner`.
    ///
    /// The batch id sequence starts at 1 and increments by 1 per successful
    /// creation; ids are never reused. Fails without assigning an id if the
    /// caller lacks the producer capability or any field violates its bounds.
    pub fn create(
        &self,
        owner: &OwnerId,
        spice_type: &str,
        total_weight_grams: u64,
        harvest_hash: &str,
    ) -> Result<BatchId, StoreError> {
        if !self.capabilities.has_capability(owner, Capability::Producer) {
            return Err(StoreError::Unauthorized(owner.clone()));
        }

        validate_weight(total_weight_grams)?;
        validate_field("spice_type", spice_type, MAX_SPICE_TYPE_CHARS)?;
        validate_non_empty("harvest_hash", harvest_hash)?;

        // Sequence, records, owner index: always locked in this order.
        let mut sequence = self.sequence.write().map_err(|_| StoreError::LockPoisoned)?;
        let batch_id = BatchId(*sequence + 1);

        let passport = Passport {
            batch_id,
            owner: owner.clone(),
            spice_type: spice_type.to_string(),
            total_weight_grams,
            date_created: chrono::Utc::now(),
            harvest_hash: harvest_hash.to_string(),
            processing_hashes: Vec::new(),
            package_hash: None,
            status: PassportStatus::InProgress,
            is_locked: false,
        };

        {
            let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
            records.insert(batch_id, passport);
        }
        {
            let mut owner_index = self
                .owner_index
                .write()
                .map_err(|_| StoreError::LockPoisoned)?;
            owner_index.entry(owner.clone()).or_default().push(batch_id);
        }
        *sequence += 1;
        drop(sequence);

        info!(batch = %batch_id, owner = %owner, spice_type, "Passport created");

        self.events.emit(PassportEvent::Created {
            batch_id,
            owner: owner.clone(),
            spice_type: spice_type.to_string(),
            harvest_hash: harvest_hash.to_string(),
        });

        Ok(batch_id)
    }

    /// Append a processing evidence hash to an open passport.
    ///
    /// Returns the zero-based index of the appended step.
    pub fn append_processing_step(
        &self,
        batch_id: BatchId,
        caller: &OwnerId,
        hash: &str,
    ) -> Result<usize, StoreError> {
        validate_non_empty("processing_hash", hash)?;

        let step_index = {
            let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
            let passport = records
                .get_mut(&batch_id)
                .ok_or(StoreError::NotFound(batch_id))?;

            check_owner(passport, caller)?;
            check_open(passport)?;

            passport.processing_hashes.push(hash.to_string());
            passport.processing_hashes.len() - 1
        };

        info!(batch = %batch_id, step = step_index, "Processing step appended");

        self.events.emit(PassportEvent::ProcessingStepAdded {
            batch_id,
            step_index,
            hash: hash.to_string(),
        });

        Ok(step_index)
    }

    /// Irreversibly seal a passport, freezing its provenance record.
    ///
    /// An optional package hash is stored verbatim as part of the transition.
    /// A second call on the same id always fails with `AlreadySealed`; it
    /// never silently succeeds.
    pub fn seal(
        &self,
        batch_id: BatchId,
        caller: &OwnerId,
        package_hash: Option<String>,
    ) -> Result<(), StoreError> {
        {
            let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
            let passport = records
                .get_mut(&batch_id)
                .ok_or(StoreError::NotFound(batch_id))?;

            check_owner(passport, caller)?;
            check_open(passport)?;

            passport.status = PassportStatus::Sealed;
            passport.is_locked = true;
            passport.package_hash = package_hash;
        }

        info!(batch = %batch_id, "Passport sealed");

        self.events.emit(PassportEvent::Sealed { batch_id });

        Ok(())
    }

    /// Irreversibly withdraw an open passport.
    ///
    /// Mutually exclusive with `seal`: a record reaches exactly one
    /// terminal state, ever.
    pub fn withdraw(&self, batch_id: BatchId, caller: &OwnerId) -> Result<(), StoreError> {
        {
            let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
            let passport = records
                .get_mut(&batch_id)
                .ok_or(StoreError::NotFound(batch_id))?;

            check_owner(passport, caller)?;
            check_open(passport)?;

            passport.status = PassportStatus::Withdrawn;
        }

        info!(batch = %batch_id, "Passport withdrawn");

        self.events.emit(PassportEvent::Withdrawn { batch_id });

        Ok(())
    }

    /// Fetch a point-in-time snapshot of a passport.
    pub fn get(&self, batch_id: BatchId) -> Result<Passport, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        records
            .get(&batch_id)
            .cloned()
            .ok_or(StoreError::NotFound(batch_id))
    }

    /// All batch ids owned by `owner`, in creation order.
    pub fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<BatchId>, StoreError> {
        let owner_index = self
            .owner_index
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(owner_index.get(owner).cloned().unwrap_or_default())
    }

    /// All batch ids currently in `status`, in id order.
    ///
    /// Together the three status partitions cover every record exactly once.
    pub fn list_by_status(&self, status: PassportStatus) -> Result<Vec<BatchId>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut ids: Vec<_> = records
            .values()
            .filter(|p| p.status == status)
            .map(|p| p.batch_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Number of passports ever created.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether no passport has been created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_weight(grams: u64) -> Result<(), StoreError> {
    if grams == 0 || grams > MAX_TOTAL_WEIGHT_GRAMS {
        return Err(StoreError::InvalidWeight(grams));
    }
    Ok(())
}

fn validate_non_empty(field: &'static str, value: &str) -> Result<(), StoreError> {
    if value.is_empty() {
        return Err(StoreError::EmptyField(field));
    }
    Ok(())
}

fn validate_field(field: &'static str, value: &str, max_chars: usize) -> Result<(), StoreError> {
    validate_non_empty(field, value)?;
    let chars = value.chars().count();
    if chars > max_chars {
        return Err(StoreError::FieldTooLong {
            field,
            max: max_chars,
            actual: chars,
        });
    }
    Ok(())
}

fn check_owner(passport: &Passport, caller: &OwnerId) -> Result<(), StoreError> {
    if passport.owner != *caller {
        return Err(StoreError::Forbidden {
            batch_id: passport.batch_id,
            caller: caller.clone(),
        });
    }
    Ok(())
}

fn check_open(passport: &Passport) -> Result<(), StoreError> {
    match passport.status {
        PassportStatus::InProgress => Ok(()),
        PassportStatus::Sealed => Err(StoreError::AlreadySealed(passport.batch_id)),
        PassportStatus::Withdrawn => Err(StoreError::AlreadyWithdrawn(passport.batch_id)),
    }
}

/// Broad classification of a store failure, for caller handling policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Caller-input error; never retried.
    Validation,
    /// Missing capability or ownership; never retried.
    Authorization,
    /// Operation illegal given current record state; re-fetch, do not retry.
    StateConflict,
    /// Unexpected internal failure.
    Internal,
}

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("caller {0} lacks the producer capability")]
    Unauthorized(OwnerId),

    #[error("caller {caller} does not own {batch_id}")]
    Forbidden { batch_id: BatchId, caller: OwnerId },

    #[error("passport not found: {0}")]
    NotFound(BatchId),

    #[error("passport {0} is already sealed")]
    AlreadySealed(BatchId),

    #[error("passport {0} is already withdrawn")]
    AlreadyWithdrawn(BatchId),

    #[error("total weight must be in 1..={MAX_TOTAL_WEIGHT_GRAMS} grams, got {0}")]
    InvalidWeight(u64),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("{field} exceeds {max} characters (got {actual})")]
    FieldTooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Classify this error into the handling taxonomy.
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::InvalidWeight(_)
            | StoreError::EmptyField(_)
            | StoreError::FieldTooLong { .. } => StoreErrorKind::Validation,
            StoreError::Unauthorized(_) | StoreError::Forbidden { .. } => {
                StoreErrorKind::Authorization
            }
            StoreError::NotFound(_)
            | StoreError::AlreadySealed(_)
            | StoreError::AlreadyWithdrawn(_) => StoreErrorKind::StateConflict,
            StoreError::LockPoisoned => StoreErrorKind::Internal,
        }
    }
}
