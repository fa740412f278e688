//! End-to-end runs of the DEP watcher against a scripted client.

use mdm_dep::{
    AutoAssigner, AutoAssignerStore, Cursor, CursorStore, DepClient, DepError, DepResult,
    DeviceResponse, MockCall, MockDepClient, SyncPhase, TokenListener, Watcher, WatcherConfig,
    WatcherHandle,
};
use mdm_events::topics::{DEP_SYNC_TOPIC, DEP_TOKEN_TOPIC};
use mdm_events::{
    Bus, BusExt, DepSyncEvent, DepTokenEvent, Device, Envelope, LocalBus, OpType, Subscription,
};
use mdm_store::MapStore;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    store: MapStore,
    bus: Arc<LocalBus>,
    handle: WatcherHandle,
    shutdown: CancellationToken,
    task: JoinHandle<mdm_dep::SyncResult<()>>,
}

impl Harness {
    fn spawn(store: MapStore) -> Self {
        let bus = Arc::new(LocalBus::new());
        let (watcher, handle) = Watcher::new(WatcherConfig::default(), store.clone(), bus.clone());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(watcher.run(shutdown.clone()));
        Self {
            store,
            bus,
            handle,
            shutdown,
            task,
        }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        tokio::time::timeout(TIMEOUT, self.task)
            .await
            .expect("watcher did not stop")
            .unwrap()
            .unwrap();
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

async fn next_page(rx: &mut Subscription) -> Vec<String> {
    let message = tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for DepSync")
        .unwrap();
    Envelope::<DepSyncEvent>::decode(&message.payload)
        .unwrap()
        .event
        .devices
        .into_iter()
        .map(|d| d.serial_number)
        .collect()
}

fn client(mock: &Arc<MockDepClient>) -> Arc<dyn DepClient> {
    mock.clone()
}

#[tokio::test]
async fn fetches_roster_then_tails() {
    let store = MapStore::open_in_memory();
    AutoAssignerStore::new(store.clone())
        .save(&AutoAssigner::wildcard("PROFILE-1"))
        .unwrap();

    let mock = Arc::new(MockDepClient::new());
    mock.push_fetch(Ok(DeviceResponse::page(
        "C1",
        vec![
            Device::new("A", OpType::Added),
            Device::new("B", OpType::Modified),
        ],
        true,
    )))
    .push_fetch(Ok(DeviceResponse::page(
        "C2",
        vec![Device::new("C", OpType::Added)],
        false,
    )));

    let harness = Harness::spawn(store);
    let mut pages = harness.bus.subscribe(DEP_SYNC_TOPIC);
    harness.handle.start(client(&mock));

    assert_eq!(next_page(&mut pages).await, ["A", "B"]);
    assert_eq!(next_page(&mut pages).await, ["C"]);

    wait_until(|| harness.handle.stats().phase == Some(SyncPhase::Sync)).await;
    wait_until(|| mock.assign_calls().len() == 2).await;

    let mut assigned = mock.assign_calls();
    assigned.sort();
    assert_eq!(
        assigned,
        vec![
            ("PROFILE-1".to_string(), vec!["A".to_string()]),
            ("PROFILE-1".to_string(), vec!["C".to_string()]),
        ]
    );
    assert_eq!(
        CursorStore::new(harness.store.clone()).load().unwrap().value,
        "C2"
    );

    let stats = harness.handle.stats();
    assert_eq!(stats.pages, 2);
    assert_eq!(stats.devices, 3);
    assert!(stats.last_sync.is_some());

    harness.stop().await;
}

#[tokio::test]
async fn fresh_cursor_starts_in_sync() {
    let store = MapStore::open_in_memory();
    CursorStore::new(store.clone())
        .save(&Cursor::new("SAVED"))
        .unwrap();

    let mock = Arc::new(MockDepClient::new());
    let harness = Harness::spawn(store);
    harness.handle.start(client(&mock));

    wait_until(|| !mock.calls().is_empty()).await;
    assert_eq!(
        mock.calls()[0],
        MockCall::Sync {
            cursor: "SAVED".into(),
            limit: 100
        }
    );
    harness.stop().await;
}

#[tokio::test]
async fn stale_cursor_restarts_fetch() {
    let store = MapStore::open_in_memory();
    let stale = Cursor {
        value: "STALE".into(),
        created_at: SystemTime::now() - Duration::from_secs(8 * 24 * 60 * 60),
    };
    CursorStore::new(store.clone()).save(&stale).unwrap();

    let mock = Arc::new(MockDepClient::new());
    let harness = Harness::spawn(store);
    harness.handle.start(client(&mock));

    wait_until(|| !mock.calls().is_empty()).await;
    assert_eq!(
        mock.calls()[0],
        MockCall::Fetch {
            cursor: String::new(),
            limit: 100
        }
    );
    harness.stop().await;
}

#[tokio::test]
async fn expired_sync_cursor_refetches() {
    let store = MapStore::open_in_memory();
    CursorStore::new(store.clone())
        .save(&Cursor::new("OLD"))
        .unwrap();

    let mock = Arc::new(MockDepClient::new());
    mock.push_sync(Err(DepError::CursorExpired));
    mock.push_fetch(Ok(DeviceResponse::page(
        "NEW",
        vec![Device::new("A", OpType::Added)],
        false,
    )));

    let harness = Harness::spawn(store);
    harness.handle.start(client(&mock));

    wait_until(|| mock.calls().len() >= 3).await;
    let calls = mock.calls();
    assert_eq!(
        calls[..3],
        [
            MockCall::Sync {
                cursor: "OLD".into(),
                limit: 100
            },
            MockCall::Fetch {
                cursor: String::new(),
                limit: 100
            },
            MockCall::Sync {
                cursor: "NEW".into(),
                limit: 100
            },
        ]
    );
    harness.stop().await;
}

#[tokio::test]
async fn sync_now_runs_another_pass() {
    let store = MapStore::open_in_memory();
    CursorStore::new(store.clone())
        .save(&Cursor::new("C1"))
        .unwrap();

    let mock = Arc::new(MockDepClient::new());
    let harness = Harness::spawn(store);
    let mut pages = harness.bus.subscribe(DEP_SYNC_TOPIC);
    harness.handle.start(client(&mock));
    wait_until(|| mock.calls().len() == 1).await;

    mock.push_sync(Ok(DeviceResponse::page(
        "C2",
        vec![Device::new("Z", OpType::Deleted)],
        false,
    )));
    harness.handle.sync_now();

    assert_eq!(next_page(&mut pages).await, ["Z"]);
    assert!(mock.assign_calls().is_empty());
    harness.stop().await;
}

#[tokio::test]
async fn transient_errors_do_not_stop_the_loop() {
    let store = MapStore::open_in_memory();
    let mock = Arc::new(MockDepClient::new());
    mock.push_fetch(Err(DepError::api(503, "unavailable")));
    mock.push_fetch(Ok(DeviceResponse::page("C1", Vec::new(), false)));

    let harness = Harness::spawn(store);
    harness.handle.start(client(&mock));
    wait_until(|| harness.handle.stats().last_error.is_some()).await;

    harness.handle.sync_now();
    wait_until(|| harness.handle.stats().pages == 1).await;
    assert!(harness.handle.stats().last_error.is_none());
    harness.stop().await;
}

#[tokio::test]
async fn shutdown_before_start() {
    let harness = Harness::spawn(MapStore::open_in_memory());
    harness.stop().await;
}

#[tokio::test]
async fn token_event_starts_watcher() {
    let store = MapStore::open_in_memory();
    let mock = Arc::new(MockDepClient::new());
    let harness = Harness::spawn(store);

    let factory_mock = mock.clone();
    let factory = Arc::new(move |_: &DepTokenEvent| -> DepResult<Arc<dyn DepClient>> {
        Ok(factory_mock.clone())
    });
    let listener = TokenListener::new(harness.bus.as_ref(), factory, harness.handle.clone());
    let listener_task = tokio::spawn(listener.run(harness.shutdown.clone()));

    harness
        .bus
        .publish_event(
            DEP_TOKEN_TOPIC,
            DepTokenEvent {
                consumer_key: "CK_1".into(),
                consumer_secret: "CS_1".into(),
                access_token: "AT_1".into(),
                access_secret: "AS_1".into(),
                access_token_expiry: "2030-01-01T00:00:00Z".into(),
            },
        )
        .unwrap();

    wait_until(|| !mock.calls().is_empty()).await;
    harness.stop().await;
    listener_task.await.unwrap().unwrap();
}
