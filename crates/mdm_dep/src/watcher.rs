//! DEP sync watcher.
//!
//! The watcher walks the DEP roster in two phases. **Fetch** pages through the
//! whole roster; once the cursor is exhausted the watcher switches to
//! **Sync**, which tails changes on a fixed interval. Every page received
//! advances the persisted cursor, is published on the `mdm.DepSync` topic,
//! and triggers profile auto-assignment for newly added devices.

use crate::assigner::AutoAssignerStore;
use crate::auto_assign::auto_assign;
use crate::client::{DepClient, DeviceResponse};
use crate::config::WatcherConfig;
use crate::cursor::{Cursor, CursorStore};
use crate::error::{DepError, SyncResult};
use mdm_events::topics::DEP_SYNC_TOPIC;
use mdm_events::{Bus, DepSyncEvent, Envelope};
use mdm_store::MapStore;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{watch, Notify};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type ClientSlot = Option<Arc<dyn DepClient>>;

/// Phase of the watcher loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Paging through the full roster.
    Fetch,
    /// Tailing roster changes.
    Sync,
}

impl SyncPhase {
    /// Returns the phase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Sync => "sync",
        }
    }
}

/// Snapshot of watcher progress.
#[derive(Debug, Clone, Default)]
pub struct WatcherStats {
    /// Current phase. `None` until a client has been supplied.
    pub phase: Option<SyncPhase>,
    /// Pages received.
    pub pages: u64,
    /// Devices received across all pages.
    pub devices: u64,
    /// Most recent transient error.
    pub last_error: Option<String>,
    /// When the last page was received.
    pub last_sync: Option<SystemTime>,
}

/// Controls a running [`Watcher`].
#[derive(Clone)]
pub struct WatcherHandle {
    client: Arc<watch::Sender<ClientSlot>>,
    sync_now: Arc<Notify>,
    stats: Arc<RwLock<WatcherStats>>,
}

impl WatcherHandle {
    /// Supplies a client, starting the watcher or replacing its credentials.
    ///
    /// Never blocks. A client the watcher has not picked up yet is replaced.
    pub fn start(&self, client: Arc<dyn DepClient>) {
        self.client.send_replace(Some(client));
    }

    /// Requests a sync pass without waiting for the interval.
    ///
    /// Never blocks; requests made while one is pending are coalesced.
    pub fn sync_now(&self) {
        self.sync_now.notify_one();
    }

    /// Returns a snapshot of the watcher's progress.
    pub fn stats(&self) -> WatcherStats {
        self.stats.read().clone()
    }
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("stats", &*self.stats.read())
            .finish_non_exhaustive()
    }
}

enum Step {
    Next(SyncPhase),
    Wait,
}

enum Wake {
    Shutdown,
    Resume,
    Client(Arc<dyn DepClient>),
}

/// Keeps the DEP roster in sync. See the module docs.
pub struct Watcher {
    config: WatcherConfig,
    bus: Arc<dyn Bus>,
    cursors: CursorStore,
    assigners: AutoAssignerStore,
    clients: watch::Receiver<ClientSlot>,
    handle_alive: bool,
    sync_now: Arc<Notify>,
    stats: Arc<RwLock<WatcherStats>>,
}

impl Watcher {
    /// Creates a watcher persisting its state in `store`.
    pub fn new(config: WatcherConfig, store: MapStore, bus: Arc<dyn Bus>) -> (Self, WatcherHandle) {
        let (client_tx, clients) = watch::channel(None);
        let sync_now = Arc::new(Notify::new());
        let stats = Arc::new(RwLock::new(WatcherStats::default()));

        let handle = WatcherHandle {
            client: Arc::new(client_tx),
            sync_now: sync_now.clone(),
            stats: stats.clone(),
        };
        let watcher = Self {
            config,
            bus,
            cursors: CursorStore::new(store.clone()),
            assigners: AutoAssignerStore::new(store),
            clients,
            handle_alive: true,
            sync_now,
            stats,
        };
        (watcher, handle)
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// Blocks until a client is supplied through [`WatcherHandle::start`].
    /// Returns an error only if a roster event cannot be encoded or the cursor
    /// cannot be persisted.
    pub async fn run(mut self, shutdown: CancellationToken) -> SyncResult<()> {
        let Some(mut client) = self.wait_for_client(&shutdown).await else {
            info!("DEP watcher stopped before start");
            return Ok(());
        };

        let mut cursor = self.cursors.load()?;
        let mut phase = self.initial_phase(&mut cursor)?;
        let period = self.config.sync_interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(phase = phase.as_str(), "DEP watcher started");
        loop {
            self.stats.write().phase = Some(phase);

            let step = tokio::select! {
                _ = shutdown.cancelled() => break,
                step = self.step(&client, phase, &mut cursor) => step?,
            };
            match step {
                Step::Next(next) => {
                    if next != phase {
                        info!(from = phase.as_str(), to = next.as_str(), "DEP phase change");
                    }
                    phase = next;
                }
                Step::Wait => match self.wait(&shutdown, &mut ticker).await {
                    Wake::Shutdown => break,
                    Wake::Resume => {}
                    Wake::Client(replacement) => {
                        info!("DEP client replaced");
                        client = replacement;
                    }
                },
            }
        }
        info!("DEP watcher stopped");
        Ok(())
    }

    async fn wait_for_client(&mut self, shutdown: &CancellationToken) -> Option<Arc<dyn DepClient>> {
        loop {
            let current = self.clients.borrow_and_update().clone();
            if current.is_some() {
                return current;
            }
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                changed = self.clients.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    fn initial_phase(&self, cursor: &mut Cursor) -> SyncResult<SyncPhase> {
        if cursor.is_fresh(SystemTime::now(), self.config.cursor_validity) {
            return Ok(SyncPhase::Sync);
        }
        if !cursor.is_empty() {
            info!("persisted DEP cursor is stale, refetching roster");
            *cursor = Cursor::default();
            self.cursors.save(cursor)?;
        }
        Ok(SyncPhase::Fetch)
    }

    async fn step(
        &self,
        client: &Arc<dyn DepClient>,
        phase: SyncPhase,
        cursor: &mut Cursor,
    ) -> SyncResult<Step> {
        let limit = self.config.fetch_limit;
        match phase {
            SyncPhase::Fetch => {
                let fetched = client.fetch_devices(&cursor.value, limit).await;
                match fetched {
                    Ok(page) => {
                        let more = page.more_to_follow;
                        self.process_page(client, cursor, page)?;
                        Ok(Step::Next(if more {
                            SyncPhase::Fetch
                        } else {
                            SyncPhase::Sync
                        }))
                    }
                    Err(DepError::CursorExhausted) => {
                        debug!("fetch cursor exhausted");
                        Ok(Step::Next(SyncPhase::Sync))
                    }
                    Err(e @ (DepError::CursorExpired | DepError::CursorInvalid))
                        if !cursor.is_empty() =>
                    {
                        warn!(error = %e, "fetch cursor rejected, restarting roster");
                        self.reset_cursor(cursor)?;
                        Ok(Step::Next(SyncPhase::Fetch))
                    }
                    Err(e) => Ok(self.transient(phase, &e)),
                }
            }
            SyncPhase::Sync => {
                let synced = client.sync_devices(&cursor.value, limit).await;
                match synced {
                    Ok(page) if page.devices.is_empty() => Ok(Step::Wait),
                    Ok(page) => {
                        let more = page.more_to_follow;
                        self.process_page(client, cursor, page)?;
                        Ok(if more {
                            Step::Next(SyncPhase::Sync)
                        } else {
                            Step::Wait
                        })
                    }
                    Err(e @ (DepError::CursorExpired | DepError::CursorInvalid)) => {
                        warn!(error = %e, "sync cursor rejected, refetching roster");
                        self.reset_cursor(cursor)?;
                        Ok(Step::Next(SyncPhase::Fetch))
                    }
                    Err(DepError::CursorExhausted) => Ok(Step::Wait),
                    Err(e) => Ok(self.transient(phase, &e)),
                }
            }
        }
    }

    fn reset_cursor(&self, cursor: &mut Cursor) -> SyncResult<()> {
        *cursor = Cursor::default();
        self.cursors.save(cursor)
    }

    fn transient(&self, phase: SyncPhase, error: &DepError) -> Step {
        warn!(phase = phase.as_str(), error = %error, "DEP request failed, retrying later");
        self.stats.write().last_error = Some(error.to_string());
        Step::Wait
    }

    fn process_page(
        &self,
        client: &Arc<dyn DepClient>,
        cursor: &mut Cursor,
        page: DeviceResponse,
    ) -> SyncResult<()> {
        if !page.cursor.is_empty() {
            *cursor = Cursor::new(page.cursor);
            self.cursors.save(cursor)?;
        }

        let count = page.devices.len();
        let payload = Envelope::new(DepSyncEvent {
            devices: page.devices.clone(),
        })
        .encode()?;
        if let Err(e) = self.bus.publish(DEP_SYNC_TOPIC, payload) {
            error!(error = %e, devices = count, "dropping DEP sync event");
        }

        {
            let mut stats = self.stats.write();
            stats.pages += 1;
            stats.devices += count as u64;
            stats.last_error = None;
            stats.last_sync = Some(SystemTime::now());
        }
        debug!(devices = count, more = page.more_to_follow, "DEP page processed");

        if page.devices.iter().any(|d| d.is_added()) {
            tokio::spawn(auto_assign(
                client.clone(),
                self.assigners.clone(),
                page.devices,
            ));
        }
        Ok(())
    }

    async fn wait(&mut self, shutdown: &CancellationToken, ticker: &mut Interval) -> Wake {
        tokio::select! {
            _ = shutdown.cancelled() => Wake::Shutdown,
            _ = ticker.tick() => Wake::Resume,
            _ = self.sync_now.notified() => {
                debug!("sync requested");
                Wake::Resume
            }
            changed = self.clients.changed(), if self.handle_alive => match changed {
                Ok(()) => match self.clients.borrow_and_update().clone() {
                    Some(client) => Wake::Client(client),
                    None => Wake::Resume,
                },
                Err(_) => {
                    self.handle_alive = false;
                    Wake::Resume
                }
            },
        }
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
