//! Bus ingestion for command queues.

use crate::error::QueueResult;
use crate::model::Command;
use crate::queue::CommandQueue;
use mdm_events::topics::{COMMAND_QUEUED_TOPIC, COMMAND_TOPIC, RAW_COMMAND_TOPIC};
use mdm_events::{
    Bus, BusExt, BusMessage, CommandEvent, CommandQueuedEvent, Envelope, Subscription,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Consumes command events from the bus and appends them to a queue.
///
/// Subscriptions are taken when the worker is created, so events published
/// after [`QueueWorker::new`] returns are never missed.
pub struct QueueWorker {
    queue: Arc<dyn CommandQueue>,
    bus: Arc<dyn Bus>,
    commands: Subscription,
    raw_commands: Subscription,
}

impl QueueWorker {
    /// Creates a worker and subscribes to both command topics.
    pub fn new(queue: Arc<dyn CommandQueue>, bus: Arc<dyn Bus>) -> Self {
        let commands = bus.subscribe(COMMAND_TOPIC);
        let raw_commands = bus.subscribe(RAW_COMMAND_TOPIC);
        Self {
            queue,
            bus,
            commands,
            raw_commands,
        }
    }

    /// Runs until `shutdown` is cancelled or the bus closes.
    ///
    /// On close, messages already buffered on either topic are still queued.
    pub async fn run(mut self, shutdown: CancellationToken) -> QueueResult<()> {
        info!("queue worker started");
        let mut commands_open = true;
        let mut raw_open = true;
        while commands_open || raw_open {
            let received = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("queue worker stopping");
                    return Ok(());
                }
                received = self.commands.recv(), if commands_open => {
                    commands_open = received.is_some();
                    received
                }
                received = self.raw_commands.recv(), if raw_open => {
                    raw_open = received.is_some();
                    received
                }
            };

            if let Some(message) = received {
                if let Err(e) = self.handle(&message) {
                    error!(topic = %message.topic, error = %e, "dropping command event");
                }
            }
        }
        info!("bus closed, queue worker stopping");
        Ok(())
    }

    /// Queues the command carried by one bus message and announces it.
    ///
    /// Fails only if the message cannot be decoded or the queue rejects the
    /// command. A failed announcement is logged; the command stays queued.
    pub fn handle(&self, message: &BusMessage) -> QueueResult<CommandQueuedEvent> {
        let envelope: Envelope<CommandEvent> = Envelope::decode(&message.payload)?;
        let CommandEvent {
            udid,
            command_uuid,
            payload,
        } = envelope.event;

        self.queue
            .enqueue(&udid, Command::new(command_uuid.clone(), payload))?;

        let queued = CommandQueuedEvent { udid, command_uuid };
        if let Err(e) = self.bus.publish_event(COMMAND_QUEUED_TOPIC, queued.clone()) {
            error!(
                udid = %queued.udid,
                command_uuid = %queued.command_uuid,
                error = %e,
                "command queued but queued notification failed"
            );
        }
        debug!(
            event_id = %envelope.id,
            udid = %queued.udid,
            command_uuid = %queued.command_uuid,
            "command event consumed"
        );
        Ok(queued)
    }
}

impl std::fmt::Debug for QueueWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueWorker").finish_non_exhaustive()
    }
}
