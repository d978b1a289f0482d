//! Scriptable environment for exercising the orchestrator's failure paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use passport_store::PassportStore;
use passport_types::{BatchId, OwnerId};

use crate::{Cost, EnvironmentError, InProcessEnvironment, SealingEnvironment, TransactionId};

/// Wraps the in-process environment with injectable failures and call
/// counters, so tests can assert which protocol steps actually ran.
pub struct ScriptedEnvironment {
    inner: InProcessEnvironment,
    store: Arc<PassportStore>,
    fail_estimate: Option<String>,
    fail_submit: Option<String>,
    /// Seal the record as this owner while estimating, simulating a
    /// concurrent actor winning the race between snapshot and submission.
    seal_during_estimate: Option<OwnerId>,
    /// Seal the record as this owner just before the commit lands,
    /// simulating a concurrent actor slipping in after the status
    /// re-check.
    seal_during_submit: Option<OwnerId>,
    estimate_calls: AtomicUsize,
    submit_calls: AtomicUsize,
}

impl ScriptedEnvironment {
    /// Environment that behaves exactly like the in-process one.
    pub fn passthrough(store: Arc<PassportStore>) -> Self {
        Self {
            inner: InProcessEnvironment::new(store.clone()),
            store,
            fail_estimate: None,
            fail_submit: None,
            seal_during_estimate: None,
            seal_during_submit: None,
            estimate_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
        }
    }

    /// Fail every estimate with the given reason.
    pub fn failing_estimate(mut self, reason: impl Into<String>) -> Self {
        self.fail_estimate = Some(reason.into());
        self
    }

    /// Fail every submission with the given reason.
    pub fn failing_submit(mut self, reason: impl Into<String>) -> Self {
        self.fail_submit = Some(reason.into());
        self
    }

    /// Seal the record mid-estimate as `owner`.
    pub fn sealing_during_estimate(mut self, owner: OwnerId) -> Self {
        self.seal_during_estimate = Some(owner);
        self
    }

    /// Seal the record as `owner` right before the commit.
    pub fn sealing_during_submit(mut self, owner: OwnerId) -> Self {
        self.seal_during_submit = Some(owner);
        self
    }

    pub fn estimate_calls(&self) -> usize {
        self.estimate_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SealingEnvironment for ScriptedEnvironment {
    async fn estimate(&self, batch_id: BatchId) -> Result<Cost, EnvironmentError> {
        self.estimate_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = &self.fail_estimate {
            return Err(EnvironmentError::Unavailable(reason.clone()));
        }

        let cost = self.inner.estimate(batch_id).await?;

        if let Some(owner) = &self.seal_during_estimate {
            self.store
                .seal(batch_id, owner, None)
                .map_err(|err| EnvironmentError::Rejected(err.to_string()))?;
        }

        Ok(cost)
    }

    async fn submit_seal(
        &self,
        batch_id: BatchId,
        caller: &OwnerId,
        package_hash: Option<String>,
    ) -> Result<TransactionId, EnvironmentError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = &self.fail_submit {
            return Err(EnvironmentError::Rejected(reason.clone()));
        }

        if let Some(owner) = &self.seal_during_submit {
            self.store
                .seal(batch_id, owner, None)
                .map_err(|err| EnvironmentError::Rejected(err.to_string()))?;
        }

        self.inner.submit_seal(batch_id, caller, package_hash).await
    }
}
