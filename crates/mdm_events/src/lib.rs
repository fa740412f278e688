//! # MDM Events
//!
//! Publish/subscribe plumbing shared by the command queue and the DEP watcher.
//!
//! - [`Bus`]: topic-based publish/subscribe of opaque byte messages
//! - [`LocalBus`]: in-process implementation with a buffer per [`Subscription`]
//! - [`Envelope`]: event ID + timestamp wrapper, encoded as CBOR
//! - event bodies for every topic in [`topics`]
//!
//! Delivery is at-least-once to every current subscriber of a topic, with no
//! ordering guarantee across topics.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bus;
mod command;
mod dep;
mod envelope;
mod error;
pub mod topics;

pub use bus::{Bus, BusConfig, BusExt, BusMessage, LocalBus, Subscription};
pub use command::{CommandEvent, CommandQueuedEvent};
pub use dep::{DepSyncEvent, DepTokenEvent, Device, OpType};
pub use envelope::Envelope;
pub use error::{BusError, BusResult};
