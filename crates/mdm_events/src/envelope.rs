//! Event envelope.

use crate::error::{BusError, BusResult};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Wrapper carried by every bus message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Unique event ID.
    pub id: Uuid,
    /// Time the event was created.
    pub time: SystemTime,
    /// Topic-specific body.
    pub event: T,
}

impl<T> Envelope<T> {
    /// Wraps an event with a fresh ID and the current time.
    pub fn new(event: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            time: SystemTime::now(),
            event,
        }
    }
}

impl<T: Serialize> Envelope<T> {
    /// Encodes the envelope as CBOR.
    pub fn encode(&self) -> BusResult<Bytes> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| BusError::Codec(e.to_string()))?;
        Ok(Bytes::from(buf))
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Decodes a CBOR envelope.
    pub fn decode(bytes: &[u8]) -> BusResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| BusError::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandEvent;

    #[test]
    fn envelope_round_trip() {
        let envelope = Envelope::new(CommandEvent::new(
            "ABCD-EFGH",
            "CMD-001",
            Bytes::from_static(b"<plist/>"),
        ));
        let bytes = envelope.encode().unwrap();
        let back: Envelope<CommandEvent> = Envelope::decode(&bytes).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn each_envelope_gets_its_own_id() {
        let a = Envelope::new(());
        let b = Envelope::new(());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn wrong_body_type_is_codec_error() {
        let bytes = Envelope::new(42u32).encode().unwrap();
        let result: BusResult<Envelope<CommandEvent>> = Envelope::decode(&bytes);
        assert!(matches!(result, Err(BusError::Codec(_))));
    }
}
