//! Auto-assigner rules.

use crate::error::{SyncError, SyncResult};
use mdm_store::MapStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Bucket holding auto-assigner rules, keyed by filter.
pub const AUTO_ASSIGN_BUCKET: &str = "mdm.DEPAutoAssign";

/// The only supported filter: every newly added device.
pub const WILDCARD_FILTER: &str = "*";

/// Assigns an enrollment profile to devices matching a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoAssigner {
    /// Device filter. Only `"*"` is accepted.
    pub filter: String,
    /// Profile to assign.
    pub profile_uuid: String,
}

impl AutoAssigner {
    /// Creates a rule.
    pub fn new(filter: impl Into<String>, profile_uuid: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            profile_uuid: profile_uuid.into(),
        }
    }

    /// Creates a rule matching every added device.
    pub fn wildcard(profile_uuid: impl Into<String>) -> Self {
        Self::new(WILDCARD_FILTER, profile_uuid)
    }

    /// Returns true for the wildcard filter.
    pub fn matches_all(&self) -> bool {
        self.filter == WILDCARD_FILTER
    }
}

/// Persists auto-assigner rules.
#[derive(Debug, Clone)]
pub struct AutoAssignerStore {
    store: MapStore,
}

impl AutoAssignerStore {
    /// Creates a rule store.
    pub fn new(store: MapStore) -> Self {
        Self { store }
    }

    /// Creates or replaces the rule for `assigner.filter`.
    pub fn save(&self, assigner: &AutoAssigner) -> SyncResult<()> {
        if !assigner.matches_all() {
            return Err(SyncError::InvalidFilter(assigner.filter.clone()));
        }
        self.store.transaction(|txn| {
            txn.put_typed(AUTO_ASSIGN_BUCKET, &assigner.filter, assigner)?;
            Ok::<_, SyncError>(())
        })?;
        debug!(filter = %assigner.filter, profile_uuid = %assigner.profile_uuid, "auto-assigner saved");
        Ok(())
    }

    /// Deletes the rule for `filter`. Returns false if there was none.
    pub fn delete(&self, filter: &str) -> SyncResult<bool> {
        self.store.transaction(|txn| {
            if txn.get(AUTO_ASSIGN_BUCKET, filter).is_none() {
                return Ok(false);
            }
            txn.delete(AUTO_ASSIGN_BUCKET, filter)?;
            Ok(true)
        })
    }

    /// Loads every rule, in filter order.
    ///
    /// Records that fail to decode are skipped.
    pub fn load_all(&self) -> SyncResult<Vec<AutoAssigner>> {
        let mut assigners = Vec::new();
        for (filter, bytes) in self.store.list(AUTO_ASSIGN_BUCKET) {
            match mdm_store::decode::<AutoAssigner>(&bytes) {
                Ok(assigner) => assigners.push(assigner),
                Err(e) => warn!(%filter, error = %e, "skipping undecodable auto-assigner"),
            }
        }
        Ok(assigners)
    }
}
