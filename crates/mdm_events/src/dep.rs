//! DEP roster and credential events.

use serde::{Deserialize, Serialize};

/// Kind of change a roster entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    /// Device was added to the organization.
    Added,
    /// Device details changed.
    Modified,
    /// Device was removed from the organization.
    Deleted,
    /// Any value this build does not know about.
    #[serde(other)]
    Unknown,
}

/// One device entry from the DEP roster.
///
/// Field names match Apple's JSON so the same type decodes API responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Device {
    /// Device serial number.
    pub serial_number: String,
    /// Model name.
    pub model: String,
    /// Model description.
    pub description: String,
    /// Color.
    pub color: String,
    /// Organization asset tag.
    pub asset_tag: String,
    /// Profile status (`empty`, `assigned`, `pushed`, `removed`).
    pub profile_status: String,
    /// Assigned profile UUID, if any.
    pub profile_uuid: String,
    /// When the profile was assigned.
    pub profile_assign_time: String,
    /// When the profile was pushed to the device.
    pub profile_push_time: String,
    /// When the device was assigned to this server.
    pub device_assigned_date: String,
    /// Who assigned the device.
    pub device_assigned_by: String,
    /// Operating system.
    pub os: String,
    /// Device family.
    pub device_family: String,
    /// Change kind; present on sync responses.
    pub op_type: Option<OpType>,
    /// When the change happened.
    pub op_date: String,
}

impl Device {
    /// Creates a roster entry with just a serial number and change kind.
    pub fn new(serial_number: impl Into<String>, op_type: OpType) -> Self {
        Self {
            serial_number: serial_number.into(),
            op_type: Some(op_type),
            ..Self::default()
        }
    }

    /// Returns true if this entry reports a newly added device.
    pub fn is_added(&self) -> bool {
        self.op_type == Some(OpType::Added)
    }
}

/// A page of roster deltas, published in the order pages were received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepSyncEvent {
    /// Devices in the page.
    pub devices: Vec<Device>,
}

/// DEP server token credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepTokenEvent {
    /// OAuth consumer key.
    pub consumer_key: String,
    /// OAuth consumer secret.
    pub consumer_secret: String,
    /// OAuth access token.
    pub access_token: String,
    /// OAuth access secret.
    pub access_secret: String,
    /// Expiry of the access token, as issued by Apple.
    pub access_token_expiry: String,
}

impl std::fmt::Debug for DepTokenEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepTokenEvent")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("access_token", &self.access_token)
            .field("access_secret", &"<redacted>")
            .field("access_token_expiry", &self.access_token_expiry)
            .finish()
    }
}
