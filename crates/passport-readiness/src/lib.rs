//! Passport Readiness - decides whether an open passport is fit to seal
//!
//! The validator is a pure function from a passport snapshot (plus an
//! externally supplied evidence checklist) to a structured verdict. It
//! mutates nothing and produces the same report for the same inputs, so
//! every verdict is reproducible in tests and audits.

#![deny(unsafe_code)]

use chrono::{DateTime, Duration, Utc};
use passport_types::Passport;
use serde::{Deserialize, Serialize};

/// Evidence facts supplied by collaborators outside the record authority:
/// the photo vault and description review live out-of-band, so the
/// validator only combines their answers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EvidenceChecklist {
    /// Required photos are present in the evidence vault.
    pub photos_present: bool,
    /// Attached descriptions passed the length review.
    pub descriptions_valid: bool,
    /// When the batch was harvested, if known. Feeds the advisory
    /// timing check only.
    pub harvested_at: Option<DateTime<Utc>>,
}

/// Structured readiness verdict: named checks plus human-readable warnings.
///
/// `overall_ready` is the conjunction of the blocking checks only;
/// `meets_timing_requirements` is advisory and never blocks sealing.
/// Warnings appear in check evaluation order, one per failing check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub has_harvest_data: bool,
    pub has_minimum_processing_steps: bool,
    pub has_required_photos: bool,
    pub has_valid_descriptions: bool,
    pub meets_timing_requirements: bool,
    pub overall_ready: bool,
    pub warnings: Vec<String>,
}

/// Pre-seal readiness validator.
///
/// The minimum-processing-steps check is blocking: a sealed batch with zero
/// processing evidence would be a hollow provenance record, so the reference
/// behavior gates `overall_ready` on it rather than treating it as advisory.
#[derive(Clone, Debug)]
pub struct ReadinessValidator {
    /// Minimum number of processing steps required to seal.
    pub min_processing_steps: usize,
    /// Minimum elapsed time since harvest before sealing is advisable.
    pub min_elapsed_since_harvest: Duration,
}

impl Default for ReadinessValidator {
    fn default() -> Self {
        Self {
            min_processing_steps: 1,
            min_elapsed_since_harvest: Duration::hours(24),
        }
    }
}

impl ReadinessValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assess a snapshot against the checklist at an explicit point in time.
    ///
    /// Checks are evaluated in a fixed order so the warning list is stable:
    /// harvest data, processing steps, photos, descriptions, timing.
    pub fn assess(
        &self,
        passport: &Passport,
        evidence: &EvidenceChecklist,
        now: DateTime<Utc>,
    ) -> ReadinessReport {
        let has_harvest_data = !passport.harvest_hash.is_empty();
        let has_minimum_processing_steps =
            passport.processing_step_count() >= self.min_processing_steps;
        let has_required_photos = evidence.photos_present;
        let has_valid_descriptions = evidence.descriptions_valid;
        // Vacuously satisfied when the harvest time is unknown.
        let meets_timing_requirements = evidence
            .harvested_at
            .map(|harvested| now - harvested >= self.min_elapsed_since_harvest)
            .unwrap_or(true);

        let mut warnings = Vec::new();
        if !has_harvest_data {
            warnings.push(format!(
                "{} has no harvest evidence attached",
                passport.batch_id
            ));
        }
        if !has_minimum_processing_steps {
            warnings.push(format!(
                "{} has {} processing steps, {} required",
                passport.batch_id,
                passport.processing_step_count(),
                self.min_processing_steps
            ));
        }
        if !has_required_photos {
            warnings.push(format!("{} is missing required photos", passport.batch_id));
        }
        if !has_valid_descriptions {
            warnings.push(format!(
                "{} has descriptions that failed review",
                passport.batch_id
            ));
        }
        if !meets_timing_requirements {
            warnings.push(format!(
                "{} was harvested less than {} hours ago (advisory)",
                passport.batch_id,
                self.min_elapsed_since_harvest.num_hours()
            ));
        }

        let overall_ready = has_harvest_data
            && has_minimum_processing_steps
            && has_required_photos
            && has_valid_descriptions;

        ReadinessReport {
            has_harvest_data,
            has_minimum_processing_steps,
            has_required_photos,
            has_valid_descriptions,
            meets_timing_requirements,
            overall_ready,
            warnings,
        }
    }

    /// Assess against the current wall clock.
    pub fn assess_now(&self, passport: &Passport, evidence: &EvidenceChecklist) -> ReadinessReport {
        self.assess(passport, evidence, Utc::now())
    }
}
