//! Queue records and device responses.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::SystemTime;

/// A command addressed to one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Command UUID.
    pub uuid: String,
    /// Serialized command, opaque to the queue.
    pub payload: Bytes,
    /// When the device acknowledged the command. `None` while outstanding.
    pub acknowledged: Option<SystemTime>,
}

impl Command {
    /// Creates an outstanding command.
    pub fn new(uuid: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            uuid: uuid.into(),
            payload: payload.into(),
            acknowledged: None,
        }
    }
}

/// Persisted queue state for one identity.
///
/// A command UUID appears in at most one of the four lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCommand {
    /// Identity key the record is stored under.
    pub device_udid: String,
    /// Pending commands, delivered round robin.
    pub commands: VecDeque<Command>,
    /// Commands the device deferred with `NotNow`.
    pub not_now: VecDeque<Command>,
    /// Acknowledged commands.
    pub completed: Vec<Command>,
    /// Commands the device rejected.
    pub failed: Vec<Command>,
}

impl DeviceCommand {
    /// Creates an empty record.
    pub fn new(device_udid: impl Into<String>) -> Self {
        Self {
            device_udid: device_udid.into(),
            ..Self::default()
        }
    }

    /// Returns true if `uuid` is in any list.
    pub fn contains(&self, uuid: &str) -> bool {
        self.commands
            .iter()
            .chain(&self.not_now)
            .chain(&self.completed)
            .chain(&self.failed)
            .any(|c| c.uuid == uuid)
    }

    /// Pending commands followed by deferred ones.
    pub fn outstanding(&self) -> Vec<Command> {
        self.commands.iter().chain(&self.not_now).cloned().collect()
    }

    /// Appends a pending command.
    pub fn push(&mut self, command: Command) {
        self.commands.push_back(command);
    }

    /// Drops pending and deferred commands. History is kept.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.not_now.clear();
    }

    /// Moves the command named by a device response. Returns true if any list
    /// changed.
    pub(crate) fn record_response(&mut self, status: &Status, uuid: &str, history: bool) -> bool {
        if *status == Status::Idle {
            return false;
        }
        let Some(pos) = self.commands.iter().position(|c| c.uuid == uuid) else {
            return false;
        };
        let Some(mut command) = self.commands.remove(pos) else {
            return false;
        };

        match status {
            Status::NotNow => self.not_now.push_back(command),
            Status::Acknowledged => {
                if history {
                    command.acknowledged = Some(SystemTime::now());
                    self.completed.push(command);
                }
            }
            Status::Error | Status::CommandFormatError => {
                if history {
                    self.failed.push(command);
                }
            }
            Status::Idle | Status::Unknown(_) => {}
        }
        true
    }

    /// Picks the payload to send next.
    ///
    /// The head of `commands` rotates to the back and stays queued until the
    /// device answers. With nothing pending, a deferred command is promoted
    /// unless the device just deferred.
    pub(crate) fn rotate(&mut self, status: &Status) -> Option<Bytes> {
        if let Some(command) = self.commands.pop_front() {
            let payload = command.payload.clone();
            self.commands.push_back(command);
            return Some(payload);
        }
        if *status == Status::NotNow {
            return None;
        }
        let command = self.not_now.pop_front()?;
        let payload = command.payload.clone();
        self.commands.push_back(command);
        Some(payload)
    }
}

/// Status reported by a device in its check-in response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    /// The device is ready for a command.
    Idle,
    /// The command completed.
    Acknowledged,
    /// The device cannot run the command right now.
    NotNow,
    /// The command failed.
    Error,
    /// The command was malformed.
    CommandFormatError,
    /// Anything else. Rejected by the queues.
    Unknown(String),
}

impl Status {
    /// Returns the wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "Idle",
            Self::Acknowledged => "Acknowledged",
            Self::NotNow => "NotNow",
            Self::Error => "Error",
            Self::CommandFormatError => "CommandFormatError",
            Self::Unknown(s) => s,
        }
    }
}

impl From<&str> for Status {
    fn from(s: &str) -> Self {
        match s {
            "Idle" => Self::Idle,
            "Acknowledged" => Self::Acknowledged,
            "NotNow" => Self::NotNow,
            "Error" => Self::Error,
            "CommandFormatError" => Self::CommandFormatError,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device check-in response, reduced to what the queue needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Device UDID.
    pub udid: String,
    /// Managed user ID, set on the user channel.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Enrollment ID, set for user enrollments.
    #[serde(default)]
    pub enrollment_id: Option<String>,
    /// Reported status.
    pub status: Status,
    /// Command the status refers to. Empty on `Idle`.
    #[serde(default)]
    pub command_uuid: String,
}

impl Response {
    /// Creates a device-channel response.
    pub fn new(udid: impl Into<String>, status: Status, command_uuid: impl Into<String>) -> Self {
        Self {
            udid: udid.into(),
            user_id: None,
            enrollment_id: None,
            status,
            command_uuid: command_uuid.into(),
        }
    }

    /// Sets the managed user ID.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the enrollment ID.
    pub fn with_enrollment_id(mut self, enrollment_id: impl Into<String>) -> Self {
        self.enrollment_id = Some(enrollment_id.into());
        self
    }

    /// Returns the queue key: user ID, then enrollment ID, then UDID.
    pub fn identity(&self) -> &str {
        [&self.user_id, &self.enrollment_id]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|id| !id.is_empty())
            .unwrap_or(&self.udid)
    }
}
