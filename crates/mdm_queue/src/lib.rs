//! # MDM Queue
//!
//! Per-identity queues of MDM commands.
//!
//! A device checks in with a [`Response`]; the queue applies the reported
//! status to the command it names and hands back the next payload to send.
//! Commands are delivered round robin and stay queued until the device
//! answers, so a command lost in transit is sent again on the next check-in.
//!
//! Two implementations share the [`CommandQueue`] contract:
//!
//! - [`StoreQueue`] persists one [`DeviceCommand`] per identity in a
//!   [`mdm_store::MapStore`] and keeps completed and failed history
//! - [`MemoryQueue`] keeps everything in process memory
//!
//! [`QueueWorker`] feeds a queue from the `mdm.Command` and `mdm.RawCommand`
//! topics and announces every queued command on `mdm.CommandQueued`.
//!
//! ## Example
//!
//! ```rust
//! use mdm_queue::{Command, CommandQueue, MemoryQueue, Response, Status};
//!
//! let queue = MemoryQueue::new();
//! queue.enqueue("ABCD", Command::new("CMD-1", b"<plist/>".to_vec())).unwrap();
//!
//! let payload = queue.next(&Response::new("ABCD", Status::Idle, "")).unwrap();
//! assert_eq!(payload.as_deref(), Some(&b"<plist/>"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod memory_queue;
mod model;
mod queue;
mod store_queue;
mod worker;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use memory_queue::MemoryQueue;
pub use model::{Command, DeviceCommand, Response, Status};
pub use queue::CommandQueue;
pub use store_queue::{StoreQueue, DEVICE_COMMANDS_BUCKET};
pub use worker::QueueWorker;
