//! Starts the watcher when DEP credentials arrive.

use crate::client::DepClientFactory;
use crate::error::SyncResult;
use crate::watcher::WatcherHandle;
use mdm_events::topics::DEP_TOKEN_TOPIC;
use mdm_events::{Bus, BusMessage, DepTokenEvent, Envelope, Subscription};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Builds a DEP client from every `mdm.TokenAdded` event and hands it to the
/// watcher.
pub struct TokenListener {
    factory: Arc<dyn DepClientFactory>,
    watcher: WatcherHandle,
    tokens: Subscription,
}

impl TokenListener {
    /// Creates a listener and subscribes to the token topic.
    pub fn new(bus: &dyn Bus, factory: Arc<dyn DepClientFactory>, watcher: WatcherHandle) -> Self {
        Self {
            factory,
            watcher,
            tokens: bus.subscribe(DEP_TOKEN_TOPIC),
        }
    }

    /// Runs until `shutdown` is cancelled or the bus closes.
    pub async fn run(mut self, shutdown: CancellationToken) -> SyncResult<()> {
        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                received = self.tokens.recv() => received,
            };
            match received {
                Some(message) => self.handle(&message),
                None => return Ok(()),
            }
        }
    }

    fn handle(&self, message: &BusMessage) {
        let tokens = match Envelope::<DepTokenEvent>::decode(&message.payload) {
            Ok(envelope) => envelope.event,
            Err(e) => {
                warn!(error = %e, "ignoring undecodable token event");
                return;
            }
        };
        match self.factory.create(&tokens) {
            Ok(client) => {
                info!(consumer_key = %tokens.consumer_key, "DEP credentials received");
                self.watcher.start(client);
            }
            Err(e) => {
                error!(consumer_key = %tokens.consumer_key, error = %e, "failed to build DEP client");
            }
        }
    }
}

impl std::fmt::Debug for TokenListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenListener")
            .field("watcher", &self.watcher)
            .finish_non_exhaustive()
    }
}
