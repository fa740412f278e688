//! Durable command queue.

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::model::{Command, DeviceCommand, Response, Status};
use crate::queue::CommandQueue;
use bytes::Bytes;
use mdm_store::{MapStore, Transaction};
use tracing::debug;

/// Bucket holding one [`DeviceCommand`] per identity.
pub const DEVICE_COMMANDS_BUCKET: &str = "mdm.DeviceCommands";

/// A command queue persisted in a [`MapStore`].
///
/// Every operation is a read-modify-write inside one store transaction.
#[derive(Debug, Clone)]
pub struct StoreQueue {
    store: MapStore,
    config: QueueConfig,
}

impl StoreQueue {
    /// Creates a queue with the default configuration.
    pub fn new(store: MapStore) -> Self {
        Self::with_config(store, QueueConfig::default())
    }

    /// Creates a queue with the given configuration.
    pub fn with_config(store: MapStore, config: QueueConfig) -> Self {
        Self { store, config }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &MapStore {
        &self.store
    }

    /// Loads the record for `identity`.
    pub fn device_command(&self, identity: &str) -> QueueResult<Option<DeviceCommand>> {
        Ok(self.store.get_typed(DEVICE_COMMANDS_BUCKET, identity)?)
    }

    /// Lists every identity with a record.
    pub fn identities(&self) -> Vec<String> {
        self.store
            .list(DEVICE_COMMANDS_BUCKET)
            .into_iter()
            .map(|(key, _)| key)
            .collect()
    }

    fn load(txn: &Transaction<'_>, identity: &str) -> QueueResult<Option<DeviceCommand>> {
        Ok(txn.get_typed(DEVICE_COMMANDS_BUCKET, identity)?)
    }

    fn save(txn: &mut Transaction<'_>, record: &DeviceCommand) -> QueueResult<()> {
        txn.put_typed(DEVICE_COMMANDS_BUCKET, &record.device_udid, record)?;
        Ok(())
    }
}

impl CommandQueue for StoreQueue {
    fn next(&self, response: &Response) -> QueueResult<Option<Bytes>> {
        if let Status::Unknown(status) = &response.status {
            return Err(QueueError::UnknownStatus(status.clone()));
        }
        let identity = response.identity();

        self.store.transaction(|txn| {
            let Some(mut record) = Self::load(txn, identity)? else {
                return Ok(None);
            };

            let changed = record.record_response(
                &response.status,
                &response.command_uuid,
                self.config.history,
            );
            let payload = record.rotate(&response.status);

            if changed || payload.is_some() {
                Self::save(txn, &record)?;
            }
            debug!(
                identity,
                status = %response.status,
                command_uuid = %response.command_uuid,
                pending = record.commands.len(),
                deferred = record.not_now.len(),
                "queue advanced"
            );
            Ok(payload)
        })
    }

    fn clear(&self, identity: &str) -> QueueResult<()> {
        self.store.transaction(|txn| {
            let Some(mut record) = Self::load(txn, identity)? else {
                return Ok(());
            };
            if record.commands.is_empty() && record.not_now.is_empty() {
                return Ok(());
            }
            record.clear();
            Self::save(txn, &record)?;
            debug!(identity, "queue cleared");
            Ok(())
        })
    }

    fn view_queue(&self, identity: &str) -> QueueResult<Vec<Command>> {
        Ok(self
            .device_command(identity)?
            .map(|record| record.outstanding())
            .unwrap_or_default())
    }

    fn enqueue(&self, identity: &str, command: Command) -> QueueResult<()> {
        self.store.transaction(|txn| {
            let mut record =
                Self::load(txn, identity)?.unwrap_or_else(|| DeviceCommand::new(identity));
            if record.contains(&command.uuid) {
                return Err(QueueError::duplicate(identity, command.uuid));
            }
            debug!(identity, command_uuid = %command.uuid, "command queued");
            record.push(command);
            Self::save(txn, &record)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_with(uuids: &[&str]) -> StoreQueue {
        let queue = StoreQueue::new(MapStore::open_in_memory());
        for uuid in uuids {
            queue
                .enqueue("ABCD", Command::new(*uuid, uuid.as_bytes().to_vec()))
                .unwrap();
        }
        queue
    }

    #[test]
    fn idle_on_unknown_identity_writes_nothing() {
        let queue = StoreQueue::new(MapStore::open_in_memory());
        let response = Response::new("NOBODY", Status::Idle, "");
        assert_eq!(queue.next(&response).unwrap(), None);
        assert_eq!(queue.next(&response).unwrap(), None);
        assert!(queue.device_command("NOBODY").unwrap().is_none());
        assert_eq!(queue.store().stats().unwrap().commits, 0);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let queue = queue_with(&["A"]);
        let response = Response::new("ABCD", Status::from("Sometimes"), "A");
        assert!(matches!(
            queue.next(&response),
            Err(QueueError::UnknownStatus(s)) if s == "Sometimes"
        ));
        assert_eq!(queue.view_queue("ABCD").unwrap().len(), 1);
    }

    #[test]
    fn duplicate_uuid_is_rejected() {
        let queue = queue_with(&["A"]);
        let err = queue
            .enqueue("ABCD", Command::new("A", b"again".to_vec()))
            .unwrap_err();
        assert!(matches!(err, QueueError::DuplicateCommand { .. }));
        assert_eq!(queue.view_queue("ABCD").unwrap().len(), 1);
    }

    #[test]
    fn clear_keeps_history() {
        let queue = queue_with(&["A", "B"]);
        queue.next(&Response::new("ABCD", Status::Idle, "")).unwrap();
        queue
            .next(&Response::new("ABCD", Status::Acknowledged, "A"))
            .unwrap();
        queue.clear("ABCD").unwrap();

        let record = queue.device_command("ABCD").unwrap().unwrap();
        assert!(record.outstanding().is_empty());
        assert_eq!(record.completed.len(), 1);
    }

    #[test]
    fn clearing_an_empty_queue_writes_nothing() {
        let queue = queue_with(&["A"]);
        queue.clear("ABCD").unwrap();
        let before = queue.store().stats().unwrap();

        queue.clear("ABCD").unwrap();
        let after = queue.store().stats().unwrap();
        assert_eq!(after.commits, before.commits);
        assert_eq!(after.log_bytes, before.log_bytes);
        assert!(queue.device_command("ABCD").unwrap().is_some());
    }

    #[test]
    fn clear_unknown_identity_is_noop() {
        let queue = StoreQueue::new(MapStore::open_in_memory());
        queue.clear("NOBODY").unwrap();
        assert!(queue.identities().is_empty());
    }

    #[test]
    fn user_channel_has_its_own_queue() {
        let queue = StoreQueue::new(MapStore::open_in_memory());
        queue
            .enqueue("USER-1", Command::new("U", b"user".to_vec()))
            .unwrap();

        let device = Response::new("ABCD", Status::Idle, "");
        assert_eq!(queue.next(&device).unwrap(), None);

        let user = Response::new("ABCD", Status::Idle, "").with_user_id("USER-1");
        assert_eq!(queue.next(&user).unwrap(), Some(Bytes::from_static(b"user")));
    }
}
