//! Passport Types - shared vocabulary for the passport lifecycle
//!
//! A passport is the provenance record for one harvested batch. It
//! accumulates evidence while open, is sealed exactly once, and afterwards
//! behaves as an immutable, tamper-evident artifact.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum length of the spice type field, in characters.
pub const MAX_SPICE_TYPE_CHARS: usize = 50;

/// Maximum batch weight, in grams.
pub const MAX_TOTAL_WEIGHT_GRAMS: u64 = 19_999_999;

/// Unique, sequential identifier for a passport.
///
/// Assigned by the store at creation: the sequence starts at 1, increments
/// by 1 per successful creation, and a value is never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

/// Identity of a passport's owning party.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capabilities a caller may hold, checked by the store on every
/// mutating operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Authorizes creating passports and mutating owned ones.
    Producer,
}

/// Lifecycle status of a passport.
///
/// `InProgress` is the only mutable state. `Sealed` and `Withdrawn` are
/// terminal, mutually exclusive, and final — no transition leaves either.
///
/// Serializes to the interoperability domain `{0, 1, 2}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PassportStatus {
    /// Open: evidence may still be appended by the owner.
    InProgress,
    /// Irreversibly sealed: the provenance record is frozen.
    Sealed,
    /// Irreversibly abandoned by the owner.
    Withdrawn,
}

impl PassportStatus {
    /// Whether this status admits any further mutation.
    pub fn is_mutable(self) -> bool {
        matches!(self, PassportStatus::InProgress)
    }

    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        !self.is_mutable()
    }

    /// Wire code for the status (`0`, `1`, or `2`).
    pub fn code(self) -> u8 {
        u8::from(self)
    }
}

impl From<PassportStatus> for u8 {
    fn from(status: PassportStatus) -> u8 {
        match status {
            PassportStatus::InProgress => 0,
            PassportStatus::Sealed => 1,
            PassportStatus::Withdrawn => 2,
        }
    }
}

impl TryFrom<u8> for PassportStatus {
    type Error = StatusDecodeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(PassportStatus::InProgress),
            1 => Ok(PassportStatus::Sealed),
            2 => Ok(PassportStatus::Withdrawn),
            other => Err(StatusDecodeError(other)),
        }
    }
}

impl fmt::Display for PassportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassportStatus::InProgress => "in-progress",
            PassportStatus::Sealed => "sealed",
            PassportStatus::Withdrawn => "withdrawn",
        };
        write!(f, "{name}")
    }
}

/// Invalid status wire code.
#[derive(Clone, Copy, Debug, Error)]
#[error("invalid passport status code: {0}")]
pub struct StatusDecodeError(pub u8);

/// The provenance record for one harvested batch.
///
/// `owner`, `spice_type`, `total_weight_grams`, `date_created`, and
/// `harvest_hash` are immutable from the moment of creation onward.
/// `processing_hashes` is append-only while the passport is open and frozen
/// once it is not. Evidence hashes are opaque content-addressable references;
/// the passport stores and returns them verbatim, never interprets them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passport {
    pub batch_id: BatchId,
    pub owner: OwnerId,
    pub spice_type: String,
    pub total_weight_grams: u64,
    pub date_created: DateTime<Utc>,
    pub harvest_hash: String,
    pub processing_hashes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_hash: Option<String>,
    pub status: PassportStatus,
    /// Redundant observable flag: true iff `status == Sealed`.
    pub is_locked: bool,
}

impl Passport {
    /// Number of processing steps recorded so far.
    pub fn processing_step_count(&self) -> usize {
        self.processing_hashes.len()
    }
}

/// Structured event emitted exactly once per successful state-changing
/// store operation. Delivery and ordering are the sink's concern.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PassportEvent {
    Created {
        batch_id: BatchId,
        owner: OwnerId,
        spice_type: String,
        harvest_hash: String,
    },
    ProcessingStepAdded {
        batch_id: BatchId,
        step_index: usize,
        hash: String,
    },
    Sealed {
        batch_id: BatchId,
    },
    Withdrawn {
        batch_id: BatchId,
    },
}

impl PassportEvent {
    /// The passport this event concerns.
    pub fn batch_id(&self) -> BatchId {
        match self {
            PassportEvent::Created { batch_id, .. }
            | PassportEvent::ProcessingStepAdded { batch_id, .. }
            | PassportEvent::Sealed { batch_id }
            | PassportEvent::Withdrawn { batch_id } => *batch_id,
        }
    }
}
