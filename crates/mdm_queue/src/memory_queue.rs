//! In-memory command queue.

use crate::error::{QueueError, QueueResult};
use crate::model::{Command, Response, Status};
use crate::queue::CommandQueue;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

#[derive(Debug)]
struct Node {
    command: Command,
    not_now: bool,
}

/// A command queue held in process memory.
///
/// Each identity owns one `VecDeque` of nodes in delivery order. Deferred
/// commands stay in the deque with a flag instead of moving to a second
/// list. Nothing is persisted and no history is kept.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<Node>>>,
}

impl MemoryQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of identities with outstanding commands.
    pub fn len(&self) -> usize {
        self.queues.lock().len()
    }

    /// Returns true if no identity has outstanding commands.
    pub fn is_empty(&self) -> bool {
        self.queues.lock().is_empty()
    }
}

/// Only pending nodes answer to a response; a deferred command must be
/// delivered again before its status counts.
fn record_response(nodes: &mut VecDeque<Node>, status: &Status, uuid: &str) {
    let Some(pos) = nodes
        .iter()
        .position(|n| !n.not_now && n.command.uuid == uuid)
    else {
        return;
    };
    match status {
        Status::NotNow => nodes[pos].not_now = true,
        Status::Acknowledged | Status::Error | Status::CommandFormatError => {
            nodes.remove(pos);
        }
        Status::Idle | Status::Unknown(_) => {}
    }
}

fn rotate(nodes: &mut VecDeque<Node>, status: &Status) -> Option<Bytes> {
    let pos = match nodes.iter().position(|n| !n.not_now) {
        Some(pos) => pos,
        None if *status == Status::NotNow => return None,
        None => {
            let pos = nodes.iter().position(|n| n.not_now)?;
            nodes[pos].not_now = false;
            pos
        }
    };
    let node = nodes.remove(pos)?;
    let payload = node.command.payload.clone();
    nodes.push_back(node);
    Some(payload)
}

impl CommandQueue for MemoryQueue {
    fn next(&self, response: &Response) -> QueueResult<Option<Bytes>> {
        if let Status::Unknown(status) = &response.status {
            return Err(QueueError::UnknownStatus(status.clone()));
        }
        let identity = response.identity();

        let mut queues = self.queues.lock();
        let Some(nodes) = queues.get_mut(identity) else {
            return Ok(None);
        };
        record_response(nodes, &response.status, &response.command_uuid);
        let payload = rotate(nodes, &response.status);
        if nodes.is_empty() {
            queues.remove(identity);
        }
        debug!(
            identity,
            status = %response.status,
            command_uuid = %response.command_uuid,
            "queue advanced"
        );
        Ok(payload)
    }

    fn clear(&self, identity: &str) -> QueueResult<()> {
        self.queues.lock().remove(identity);
        Ok(())
    }

    fn view_queue(&self, identity: &str) -> QueueResult<Vec<Command>> {
        let queues = self.queues.lock();
        let Some(nodes) = queues.get(identity) else {
            return Ok(Vec::new());
        };
        let pending = nodes.iter().filter(|n| !n.not_now);
        let deferred = nodes.iter().filter(|n| n.not_now);
        Ok(pending.chain(deferred).map(|n| n.command.clone()).collect())
    }

    fn enqueue(&self, identity: &str, command: Command) -> QueueResult<()> {
        let mut queues = self.queues.lock();
        let nodes = queues.entry(identity.to_string()).or_default();
        if nodes.iter().any(|n| n.command.uuid == command.uuid) {
            return Err(QueueError::duplicate(identity, command.uuid));
        }
        debug!(identity, command_uuid = %command.uuid, "command queued");
        nodes.push_back(Node {
            command,
            not_now: false,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_with(uuids: &[&str]) -> MemoryQueue {
        let queue = MemoryQueue::new();
        for uuid in uuids {
            queue
                .enqueue("ABCD", Command::new(*uuid, uuid.as_bytes().to_vec()))
                .unwrap();
        }
        queue
    }

    fn next(queue: &MemoryQueue, status: Status, uuid: &str) -> Option<Bytes> {
        queue.next(&Response::new("ABCD", status, uuid)).unwrap()
    }

    #[test]
    fn drained_identity_is_removed() {
        let queue = queue_with(&["A"]);
        assert_eq!(next(&queue, Status::Idle, ""), Some(Bytes::from_static(b"A")));
        assert_eq!(queue.len(), 1);
        assert_eq!(next(&queue, Status::Acknowledged, "A"), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn deferred_flag_stays_in_place() {
        let queue = queue_with(&["A", "B"]);
        assert_eq!(next(&queue, Status::Idle, ""), Some(Bytes::from_static(b"A")));
        assert_eq!(next(&queue, Status::NotNow, "A"), Some(Bytes::from_static(b"B")));

        let view: Vec<_> = queue
            .view_queue("ABCD")
            .unwrap()
            .into_iter()
            .map(|c| c.uuid)
            .collect();
        assert_eq!(view, ["B", "A"]);
    }

    #[test]
    fn answers_for_deferred_commands_are_ignored() {
        let queue = queue_with(&["A", "B"]);
        next(&queue, Status::Idle, "");
        next(&queue, Status::NotNow, "A");
        assert_eq!(next(&queue, Status::Acknowledged, "A"), Some(Bytes::from_static(b"B")));
        assert_eq!(queue.view_queue("ABCD").unwrap().len(), 2);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let queue = queue_with(&["A"]);
        let response = Response::new("ABCD", Status::from("Later"), "A");
        assert!(matches!(
            queue.next(&response),
            Err(QueueError::UnknownStatus(_))
        ));
    }

    #[test]
    fn clear_drops_everything() {
        let queue = queue_with(&["A", "B"]);
        queue.clear("ABCD").unwrap();
        assert!(queue.view_queue("ABCD").unwrap().is_empty());
        assert_eq!(next(&queue, Status::Idle, ""), None);
    }

    #[test]
    fn error_removes_without_history() {
        let queue = queue_with(&["A", "B"]);
        next(&queue, Status::Idle, "");
        assert_eq!(next(&queue, Status::Error, "A"), Some(Bytes::from_static(b"B")));
        assert_eq!(queue.view_queue("ABCD").unwrap().len(), 1);

        queue
            .enqueue("ABCD", Command::new("A", b"retry".to_vec()))
            .unwrap();
        assert_eq!(queue.view_queue("ABCD").unwrap().len(), 2);
    }
}
