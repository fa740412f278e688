//! Queue commands.

use super::{print_json, Format};
use mdm_queue::{Command, CommandQueue, StoreQueue};
use mdm_store::MapStore;
use serde::Serialize;

/// One outstanding command.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CommandView {
    /// Command UUID.
    pub uuid: String,
    /// Payload size in bytes.
    pub payload_len: usize,
    /// Whether the device deferred the command.
    pub deferred: bool,
}

/// Queue summary for one identity.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct QueueSummary {
    /// Identity key.
    pub identity: String,
    /// Pending commands.
    pub pending: usize,
    /// Deferred commands.
    pub deferred: usize,
    /// Acknowledged commands in history.
    pub completed: usize,
    /// Failed commands in history.
    pub failed: usize,
}

/// Lists every identity with a queue record.
pub fn list(store: MapStore) -> Result<Vec<QueueSummary>, Box<dyn std::error::Error>> {
    let queue = StoreQueue::new(store);
    let mut summaries = Vec::new();
    for identity in queue.identities() {
        if let Some(record) = queue.device_command(&identity)? {
            summaries.push(QueueSummary {
                identity,
                pending: record.commands.len(),
                deferred: record.not_now.len(),
                completed: record.completed.len(),
                failed: record.failed.len(),
            });
        }
    }
    Ok(summaries)
}

/// Returns the outstanding commands for `identity`.
pub fn view(
    store: MapStore,
    identity: &str,
) -> Result<Vec<CommandView>, Box<dyn std::error::Error>> {
    let queue = StoreQueue::new(store);
    let deferred = queue
        .device_command(identity)?
        .map(|record| record.not_now.len())
        .unwrap_or(0);
    let commands = queue.view_queue(identity)?;
    let pending = commands.len().saturating_sub(deferred);

    Ok(commands
        .into_iter()
        .enumerate()
        .map(|(i, Command { uuid, payload, .. })| CommandView {
            uuid,
            payload_len: payload.len(),
            deferred: i >= pending,
        })
        .collect())
}

/// Drops the outstanding commands for `identity`.
pub fn clear(store: MapStore, identity: &str) -> Result<(), Box<dyn std::error::Error>> {
    StoreQueue::new(store).clear(identity)?;
    Ok(())
}

/// Prints a queue listing.
pub fn print_list(
    summaries: &[QueueSummary],
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        Format::Json => print_json(summaries),
        Format::Text => {
            if summaries.is_empty() {
                println!("No queues");
            }
            for s in summaries {
                println!(
                    "{:<40} pending={} deferred={} completed={} failed={}",
                    s.identity, s.pending, s.deferred, s.completed, s.failed
                );
            }
            Ok(())
        }
    }
}

/// Prints the outstanding commands for one identity.
pub fn print_view(
    identity: &str,
    commands: &[CommandView],
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        Format::Json => print_json(commands),
        Format::Text => {
            println!("Queue for {identity}: {} outstanding", commands.len());
            for c in commands {
                let marker = if c.deferred { " (NotNow)" } else { "" };
                println!("  {} {} bytes{}", c.uuid, c.payload_len, marker);
            }
            Ok(())
        }
    }
}
