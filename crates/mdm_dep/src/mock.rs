//! Scripted DEP client for tests.

use crate::client::{DepClient, DeviceResponse, ProfileAssignment, ASSIGN_SUCCESS};
use crate::error::{DepError, DepResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A call received by [`MockDepClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `fetch_devices`
    Fetch {
        /// Cursor sent.
        cursor: String,
        /// Page size requested.
        limit: u32,
    },
    /// `sync_devices`
    Sync {
        /// Cursor sent.
        cursor: String,
        /// Page size requested.
        limit: u32,
    },
    /// `assign_profile`
    Assign {
        /// Profile assigned.
        profile_uuid: String,
        /// Serials in the batch.
        serials: Vec<String>,
    },
}

/// A [`DepClient`] that replays scripted results and records every call.
///
/// Once a script runs dry, fetch reports [`DepError::CursorExhausted`], sync
/// returns an empty page, and assignment reports `SUCCESS` for every serial.
#[derive(Debug, Default)]
pub struct MockDepClient {
    fetch: Mutex<VecDeque<DepResult<DeviceResponse>>>,
    sync: Mutex<VecDeque<DepResult<DeviceResponse>>>,
    assign: Mutex<VecDeque<DepResult<ProfileAssignment>>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockDepClient {
    /// Creates a client with empty scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a fetch result.
    pub fn push_fetch(&self, result: DepResult<DeviceResponse>) -> &Self {
        self.fetch.lock().push_back(result);
        self
    }

    /// Queues a sync result.
    pub fn push_sync(&self, result: DepResult<DeviceResponse>) -> &Self {
        self.sync.lock().push_back(result);
        self
    }

    /// Queues an assignment result.
    pub fn push_assign(&self, result: DepResult<ProfileAssignment>) -> &Self {
        self.assign.lock().push_back(result);
        self
    }

    /// Returns every call received so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Returns the assignment calls as `(profile, serials)` pairs.
    pub fn assign_calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                MockCall::Assign {
                    profile_uuid,
                    serials,
                } => Some((profile_uuid.clone(), serials.clone())),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl DepClient for MockDepClient {
    async fn fetch_devices(&self, cursor: &str, limit: u32) -> DepResult<DeviceResponse> {
        self.calls.lock().push(MockCall::Fetch {
            cursor: cursor.to_string(),
            limit,
        });
        self.fetch
            .lock()
            .pop_front()
            .unwrap_or(Err(DepError::CursorExhausted))
    }

    async fn sync_devices(&self, cursor: &str, limit: u32) -> DepResult<DeviceResponse> {
        self.calls.lock().push(MockCall::Sync {
            cursor: cursor.to_string(),
            limit,
        });
        self.sync
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(DeviceResponse::page(cursor, Vec::new(), false)))
    }

    async fn assign_profile(
        &self,
        profile_uuid: &str,
        serials: &[String],
    ) -> DepResult<ProfileAssignment> {
        self.calls.lock().push(MockCall::Assign {
            profile_uuid: profile_uuid.to_string(),
            serials: serials.to_vec(),
        });
        self.assign.lock().pop_front().unwrap_or_else(|| {
            Ok(ProfileAssignment {
                profile_uuid: profile_uuid.to_string(),
                devices: serials
                    .iter()
                    .map(|s| (s.clone(), ASSIGN_SUCCESS.to_string()))
                    .collect(),
            })
        })
    }
}
