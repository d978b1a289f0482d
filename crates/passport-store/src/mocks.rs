//! In-memory collaborator implementations for tests and local wiring.

use std::collections::HashSet;
use std::sync::RwLock;

use passport_types::{Capability, OwnerId, PassportEvent};

use crate::{CapabilityProvider, EventSink};

/// Mock capability provider backed by an explicit grant set.
pub struct MockCapabilityProvider {
    grants: RwLock<HashSet<(OwnerId, Capability)>>,
}

impl MockCapabilityProvider {
    pub fn new() -> Self {
        Self {
            grants: RwLock::new(HashSet::new()),
        }
    }

    /// Grant a capability to an identity.
    pub fn grant(&self, owner: OwnerId, capability: Capability) {
        if let Ok(mut grants) = self.grants.write() {
            grants.insert((owner, capability));
        }
    }

    /// Revoke a previously granted capability.
    pub fn revoke(&self, owner: &OwnerId, capability: Capability) {
        if let Ok(mut grants) = self.grants.write() {
            grants.remove(&(owner.clone(), capability));
        }
    }
}

impl Default for MockCapabilityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityProvider for MockCapabilityProvider {
    fn has_capability(&self, caller: &OwnerId, capability: Capability) -> bool {
        self.grants
            .read()
            .map(|grants| grants.contains(&(caller.clone(), capability)))
            .unwrap_or(false)
    }
}

/// Event sink that records every emission, for assertions.
pub struct RecordingSink {
    events: RwLock<Vec<PassportEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of all events emitted so far, in emission order.
    pub fn events(&self) -> Vec<PassportEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: PassportEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event);
        }
    }
}

/// Event sink that drops everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: PassportEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_and_revoke() {
        let provider = MockCapabilityProvider::new();
        let owner = OwnerId::new("farmer-f");

        assert!(!provider.has_capability(&owner, Capability::Producer));
        provider.grant(owner.clone(), Capability::Producer);
        assert!(provider.has_capability(&owner, Capability::Producer));
        provider.revoke(&owner, Capability::Producer);
        assert!(!provider.has_capability(&owner, Capability::Producer));
    }

    #[test]
    fn recording_sink_preserves_order() {
        use passport_types::BatchId;

        let sink = RecordingSink::new();
        sink.emit(PassportEvent::Sealed {
            batch_id: BatchId(1),
        });
        sink.emit(PassportEvent::Withdrawn {
            batch_id: BatchId(2),
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].batch_id(), BatchId(1));
        assert_eq!(events[1].batch_id(), BatchId(2));
    }
}
