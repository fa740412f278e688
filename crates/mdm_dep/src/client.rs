//! DEP client abstraction.

use crate::error::DepResult;
use async_trait::async_trait;
use mdm_events::{DepTokenEvent, Device};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-device result reported when the profile was assigned.
pub const ASSIGN_SUCCESS: &str = "SUCCESS";

/// Per-device result reported when the device is not in this server's scope.
pub const ASSIGN_NOT_ACCESSIBLE: &str = "NOT_ACCESSIBLE";

/// Per-device result reported when assignment failed.
pub const ASSIGN_FAILED: &str = "FAILED";

/// One page of devices from a fetch or sync call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceResponse {
    /// Devices in this page.
    pub devices: Vec<Device>,
    /// Cursor for the next call.
    pub cursor: String,
    /// Time up to which the roster is covered.
    pub fetched_until: String,
    /// Whether another page is available right now.
    pub more_to_follow: bool,
}

impl DeviceResponse {
    /// Creates a page.
    pub fn page(cursor: impl Into<String>, devices: Vec<Device>, more_to_follow: bool) -> Self {
        Self {
            devices,
            cursor: cursor.into(),
            fetched_until: String::new(),
            more_to_follow,
        }
    }
}

/// Result of assigning a profile to a batch of serials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileAssignment {
    /// Profile that was assigned.
    pub profile_uuid: String,
    /// Result per serial number.
    pub devices: BTreeMap<String, String>,
}

impl ProfileAssignment {
    /// Returns how many devices reported `status`.
    pub fn count(&self, status: &str) -> usize {
        self.devices.values().filter(|s| *s == status).count()
    }
}

/// Client for Apple's DEP API.
///
/// Cursor conditions are reported as the structured
/// [`DepError`](crate::DepError) cursor kinds.
#[async_trait]
pub trait DepClient: Send + Sync {
    /// Fetches the full roster page by page.
    async fn fetch_devices(&self, cursor: &str, limit: u32) -> DepResult<DeviceResponse>;

    /// Fetches roster changes since `cursor`.
    async fn sync_devices(&self, cursor: &str, limit: u32) -> DepResult<DeviceResponse>;

    /// Assigns an enrollment profile to the given serials.
    async fn assign_profile(
        &self,
        profile_uuid: &str,
        serials: &[String],
    ) -> DepResult<ProfileAssignment>;
}

/// Builds a client from DEP server token credentials.
pub trait DepClientFactory: Send + Sync {
    /// Creates a client authenticated with `tokens`.
    fn create(&self, tokens: &DepTokenEvent) -> DepResult<Arc<dyn DepClient>>;
}

impl<F> DepClientFactory for F
where
    F: Fn(&DepTokenEvent) -> DepResult<Arc<dyn DepClient>> + Send + Sync,
{
    fn create(&self, tokens: &DepTokenEvent) -> DepResult<Arc<dyn DepClient>> {
        self(tokens)
    }
}
