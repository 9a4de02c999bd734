use super::*;
use crate::application::sync_worker::{shutdown_channel, SyncWorker};
use crate::port::dead_letter_store::mocks::InMemoryDeadLetterStore;
use crate::port::id_provider::mocks::SequentialIdProvider;
use crate::port::key_value_store::mocks::InMemoryKeyValueStore;
use crate::port::operation_handler::mocks::{MockBehavior, MockOperationHandler};
use crate::port::time_provider::mocks::FakeClock;
use crate::port::ConnectivitySignal;
use serde_json::json;
use std::sync::atomic::AtomicUsize;

struct Harness {
    queue: OfflineQueue,
    store: Arc<InMemoryKeyValueStore>,
    connectivity: Arc<ConnectivitySignal>,
    handler: Arc<MockOperationHandler>,
    dead_letters: Arc<InMemoryDeadLetterStore>,
}

fn ports(
    store: Arc<InMemoryKeyValueStore>,
    connectivity: Arc<ConnectivitySignal>,
    registry: HandlerRegistry,
    dead_letters: Arc<InMemoryDeadLetterStore>,
) -> QueuePorts {
    QueuePorts {
        store,
        registry,
        connectivity,
        time_provider: Arc::new(FakeClock::new(1_000, 10)),
        id_provider: Arc::new(SequentialIdProvider::new()),
        dead_letters: Some(dead_letters),
    }
}

async fn harness_with(config: QueueConfig, online: bool, behavior: MockBehavior) -> Harness {
    let store = Arc::new(InMemoryKeyValueStore::new());
    let connectivity = Arc::new(ConnectivitySignal::new(online));
    let handler = Arc::new(MockOperationHandler::new(behavior));
    let dead_letters = Arc::new(InMemoryDeadLetterStore::new());
    let registry = HandlerRegistry::new().with("sync", handler.clone());

    let queue = OfflineQueue::load(
        config,
        ports(store.clone(), connectivity.clone(), registry, dead_letters.clone()),
    )
    .await
    .unwrap();

    Harness {
        queue,
        store,
        connectivity,
        handler,
        dead_letters,
    }
}

async fn harness(behavior: MockBehavior) -> Harness {
    harness_with(QueueConfig::default(), false, behavior).await
}

fn op(n: usize) -> OperationDescriptor {
    OperationDescriptor::new("sync", json!({ "n": n }))
}

fn persisted(store: &InMemoryKeyValueStore) -> Vec<serde_json::Value> {
    let raw = store.raw(DEFAULT_STORAGE_KEY).unwrap_or_else(|| "[]".to_string());
    serde_json::from_str(&raw).unwrap()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_enqueue_persists_and_reports_status() {
    let h = harness(MockBehavior::Success).await;

    let id = h.queue.enqueue(op(1)).await.unwrap();

    let status = h.queue.get_status();
    assert_eq!(status.size, 1);
    assert_eq!(status.oldest_item_timestamp, Some(1_000));
    assert!(!status.is_processing);

    let saved = persisted(&h.store);
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0]["id"], id.as_str());
    assert_eq!(saved[0]["attempts"], 0);
    assert_eq!(saved[0]["maxAttempts"], 3);
    assert_eq!(saved[0]["operation"]["kind"], "sync");
}

#[tokio::test]
async fn test_cap_evicts_oldest_items_in_order() {
    let h = harness(MockBehavior::Success).await;

    for n in 0..55 {
        h.queue.enqueue(op(n)).await.unwrap();
    }

    let items = h.queue.items();
    assert_eq!(h.queue.get_status().size, 50);
    let kept: Vec<u64> = items
        .iter()
        .map(|item| item.operation.payload["n"].as_u64().unwrap())
        .collect();
    assert_eq!(kept, (5..55).collect::<Vec<u64>>());

    let saved = persisted(&h.store);
    assert_eq!(saved.len(), 50);
    assert_eq!(saved[0]["operation"]["payload"]["n"], 5);
}

#[tokio::test]
async fn test_offline_enqueue_does_not_process() {
    let h = harness(MockBehavior::Success).await;

    for n in 0..3 {
        h.queue.enqueue(op(n)).await.unwrap();
    }
    h.queue.process_queue().await;

    assert_eq!(h.queue.get_status().size, 3);
    assert_eq!(h.handler.call_count(), 0);
}

#[tokio::test]
async fn test_always_failing_item_dropped_after_max_attempts() {
    let h = harness(MockBehavior::Fail("network down".into())).await;
    let exhausted = Arc::new(Mutex::new(Vec::new()));
    let sink = exhausted.clone();
    let _ = h.queue.subscribe_exhausted(move |letter| {
        sink.lock().unwrap().push(letter.clone());
    });

    h.queue.enqueue(op(1)).await.unwrap();
    h.connectivity.set_online(true);

    h.queue.process_queue().await;
    assert_eq!(h.queue.items()[0].attempts, 1);
    assert_eq!(persisted(&h.store)[0]["attempts"], 1);

    h.queue.process_queue().await;
    assert_eq!(h.queue.items()[0].attempts, 2);

    h.queue.process_queue().await;
    assert_eq!(h.queue.get_status().size, 0);
    assert!(persisted(&h.store).is_empty());
    assert_eq!(h.handler.call_count(), 3);

    let letters = exhausted.lock().unwrap().clone();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].attempts, 3);
    assert!(letters[0].reason.contains("network down"));
    assert_eq!(h.dead_letters.len(), 1);
}

#[tokio::test]
async fn test_success_on_second_attempt_stops_retrying() {
    let h = harness(MockBehavior::FailTimes(1)).await;
    h.queue.enqueue(op(1)).await.unwrap();
    h.connectivity.set_online(true);

    h.queue.process_queue().await;
    assert_eq!(h.queue.get_status().size, 1);

    h.queue.process_queue().await;
    assert_eq!(h.queue.get_status().size, 0);

    h.queue.process_queue().await;
    assert_eq!(h.handler.call_count(), 2);
    assert!(h.dead_letters.is_empty());
}

#[tokio::test]
async fn test_concurrent_process_calls_run_single_pass() {
    let h = harness(MockBehavior::Delay(Duration::from_millis(30))).await;
    h.queue.enqueue(op(1)).await.unwrap();
    h.queue.enqueue(op(2)).await.unwrap();
    h.connectivity.set_online(true);

    tokio::join!(h.queue.process_queue(), h.queue.process_queue());

    assert_eq!(h.handler.call_count(), 2);
    assert_eq!(h.queue.get_status().size, 0);
}

#[tokio::test]
async fn test_pass_preserves_fifo_order() {
    let h = harness(MockBehavior::Success).await;
    for n in 0..5 {
        h.queue.enqueue(op(n)).await.unwrap();
    }
    h.connectivity.set_online(true);

    h.queue.process_queue().await;

    let order: Vec<u64> = h
        .handler
        .calls()
        .iter()
        .map(|payload| payload["n"].as_u64().unwrap())
        .collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_items_enqueued_mid_pass_follow_remaining_items() {
    let store = Arc::new(InMemoryKeyValueStore::new());
    let connectivity = Arc::new(ConnectivitySignal::new(false));
    let failing = Arc::new(MockOperationHandler::new_fail("boom"));
    let slow = Arc::new(MockOperationHandler::new(MockBehavior::Delay(
        Duration::from_millis(50),
    )));
    let later = Arc::new(MockOperationHandler::new_success());
    let registry = HandlerRegistry::new()
        .with("failing", failing.clone())
        .with("slow", slow.clone())
        .with("later", later.clone());
    let queue = OfflineQueue::load(
        QueueConfig::default(),
        ports(
            store.clone(),
            connectivity.clone(),
            registry,
            Arc::new(InMemoryDeadLetterStore::new()),
        ),
    )
    .await
    .unwrap();

    queue
        .enqueue(OperationDescriptor::new("failing", json!({})))
        .await
        .unwrap();
    queue
        .enqueue(OperationDescriptor::new("slow", json!({})))
        .await
        .unwrap();
    connectivity.set_online(true);

    let pass = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.process_queue().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(queue.get_status().is_processing);

    queue
        .enqueue(OperationDescriptor::new("later", json!({})))
        .await
        .unwrap();
    pass.await.unwrap();

    let kinds: Vec<String> = queue
        .items()
        .iter()
        .map(|item| item.kind().to_string())
        .collect();
    assert_eq!(kinds, vec!["failing".to_string(), "later".to_string()]);
    assert_eq!(later.call_count(), 0);
    assert_eq!(queue.items()[0].attempts, 1);
    assert_eq!(persisted(&store).len(), 2);
}

#[tokio::test]
async fn test_clear_during_pass_keeps_queue_empty() {
    let h = harness(MockBehavior::Fail("slow failure".into())).await;
    h.handler
        .set_behavior(MockBehavior::Delay(Duration::from_millis(40)));
    h.queue.enqueue(op(1)).await.unwrap();
    h.queue.enqueue(op(2)).await.unwrap();
    h.connectivity.set_online(true);

    let pass = {
        let queue = h.queue.clone();
        tokio::spawn(async move { queue.process_queue().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.handler
        .set_behavior(MockBehavior::Fail("offline".into()));
    h.queue.clear().await;
    pass.await.unwrap();

    assert_eq!(h.queue.get_status().size, 0);
    assert!(persisted(&h.store).is_empty());
}

#[tokio::test]
async fn test_clear_empties_queue_and_store() {
    let h = harness(MockBehavior::Success).await;
    for n in 0..4 {
        h.queue.enqueue(op(n)).await.unwrap();
    }

    h.queue.clear().await;

    assert_eq!(h.queue.get_status(), QueueStatus::default());
    assert_eq!(h.store.raw(DEFAULT_STORAGE_KEY).as_deref(), Some("[]"));
}

#[tokio::test]
async fn test_reload_restores_persisted_state() {
    let h = harness(MockBehavior::Fail("down".into())).await;
    for n in 0..3 {
        h.queue.enqueue(op(n)).await.unwrap();
    }
    h.connectivity.set_online(true);
    h.queue.process_queue().await;
    let before = h.queue.items();

    let registry = HandlerRegistry::new().with("sync", h.handler.clone());
    let reloaded = OfflineQueue::load(
        QueueConfig::default(),
        ports(
            h.store.clone(),
            Arc::new(ConnectivitySignal::new(false)),
            registry,
            Arc::new(InMemoryDeadLetterStore::new()),
        ),
    )
    .await
    .unwrap();

    assert_eq!(reloaded.items(), before);
    assert!(reloaded.items().iter().all(|item| item.attempts == 1));
}

#[tokio::test]
async fn test_corrupted_store_starts_empty() {
    let store = Arc::new(InMemoryKeyValueStore::new());
    store.insert_raw(DEFAULT_STORAGE_KEY, "[{\"id\": ");
    let queue = OfflineQueue::load(
        QueueConfig::default(),
        ports(
            store,
            Arc::new(ConnectivitySignal::new(false)),
            HandlerRegistry::new(),
            Arc::new(InMemoryDeadLetterStore::new()),
        ),
    )
    .await
    .unwrap();

    assert_eq!(queue.get_status().size, 0);
}

#[tokio::test]
async fn test_storage_failure_keeps_queue_working_in_memory() {
    let h = harness(MockBehavior::Success).await;
    h.store.set_fail_writes(true);

    h.queue.enqueue(op(1)).await.unwrap();
    assert_eq!(h.queue.get_status().size, 1);
    assert!(h.store.raw(DEFAULT_STORAGE_KEY).is_none());

    h.connectivity.set_online(true);
    h.queue.process_queue().await;
    assert_eq!(h.queue.get_status().size, 0);
    assert_eq!(h.handler.call_count(), 1);
}

#[tokio::test]
async fn test_unregistered_kind_is_dropped_as_permanent_failure() {
    let h = harness(MockBehavior::Success).await;
    h.queue
        .enqueue(OperationDescriptor::new("unknown", json!({})))
        .await
        .unwrap();
    h.connectivity.set_online(true);

    h.queue.process_queue().await;

    assert_eq!(h.queue.get_status().size, 0);
    let letters = h.dead_letters.list(10).await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].attempts, 1);
    assert!(letters[0].reason.contains("no handler registered"));
}

#[tokio::test]
async fn test_permanent_failure_skips_remaining_attempts() {
    let h = harness(MockBehavior::Permanent("422 unprocessable".into())).await;
    h.queue.enqueue(op(1)).await.unwrap();
    h.connectivity.set_online(true);

    h.queue.process_queue().await;

    assert_eq!(h.queue.get_status().size, 0);
    assert_eq!(h.handler.call_count(), 1);
    assert_eq!(h.dead_letters.len(), 1);
}

#[tokio::test]
async fn test_handler_panic_does_not_abort_pass() {
    let store = Arc::new(InMemoryKeyValueStore::new());
    let connectivity = Arc::new(ConnectivitySignal::new(false));
    let panicking = Arc::new(MockOperationHandler::new(MockBehavior::Panic(
        "handler bug".into(),
    )));
    let healthy = Arc::new(MockOperationHandler::new_success());
    let dead_letters = Arc::new(InMemoryDeadLetterStore::new());
    let registry = HandlerRegistry::new()
        .with("panics", panicking)
        .with("healthy", healthy.clone());
    let queue = OfflineQueue::load(
        QueueConfig::default(),
        ports(store, connectivity.clone(), registry, dead_letters.clone()),
    )
    .await
    .unwrap();

    queue
        .enqueue(OperationDescriptor::new("panics", json!({})))
        .await
        .unwrap();
    queue
        .enqueue(OperationDescriptor::new("healthy", json!({})))
        .await
        .unwrap();
    connectivity.set_online(true);

    queue.process_queue().await;

    assert_eq!(queue.get_status().size, 0);
    assert_eq!(healthy.call_count(), 1);
    let letters = dead_letters.list(10).await.unwrap();
    assert_eq!(letters.len(), 1);
    assert!(letters[0].reason.contains("handler bug"));
}

#[tokio::test]
async fn test_operation_timeout_counts_as_failed_attempt() {
    let config = QueueConfig {
        operation_timeout: Some(Duration::from_millis(20)),
        ..QueueConfig::default()
    };
    let h = harness_with(config, false, MockBehavior::Delay(Duration::from_secs(5))).await;
    h.queue.enqueue(op(1)).await.unwrap();
    h.connectivity.set_online(true);

    h.queue.process_queue().await;

    let items = h.queue.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].attempts, 1);
}

#[tokio::test]
async fn test_subscribers_see_every_mutation_until_unsubscribed() {
    let h = harness(MockBehavior::Success).await;
    let seen = Arc::new(Mutex::new(Vec::<QueueStatus>::new()));
    let sink = seen.clone();
    let subscription = h.queue.subscribe(move |status| {
        sink.lock().unwrap().push(status.clone());
    });

    h.queue.enqueue(op(1)).await.unwrap();
    h.queue.enqueue(op(2)).await.unwrap();
    h.connectivity.set_online(true);
    h.queue.process_queue().await;

    {
        let seen = seen.lock().unwrap();
        let sizes: Vec<usize> = seen.iter().map(|s| s.size).collect();
        // enqueue, enqueue, pass start, pass end
        assert_eq!(sizes, vec![1, 2, 2, 0]);
        assert!(seen[2].is_processing);
        assert!(!seen[3].is_processing);
    }

    subscription.unsubscribe();
    h.queue.clear().await;
    assert_eq!(seen.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_panicking_subscriber_does_not_block_others() {
    let h = harness(MockBehavior::Success).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let _ = h.queue.subscribe(|_| panic!("ui crashed"));
    let counter = calls.clone();
    let _ = h.queue.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    h.queue.enqueue(op(1)).await.unwrap();
    h.queue.clear().await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_enqueue_while_online_triggers_background_pass() {
    let h = harness_with(QueueConfig::default(), true, MockBehavior::Success).await;

    h.queue.enqueue(op(1)).await.unwrap();

    let queue = h.queue.clone();
    wait_until(move || queue.get_status().size == 0).await;
    assert_eq!(h.handler.call_count(), 1);
}

#[tokio::test]
async fn test_connectivity_restored_drains_queue() {
    let h = harness(MockBehavior::Success).await;
    for n in 0..3 {
        h.queue.enqueue(op(n)).await.unwrap();
    }
    assert_eq!(h.queue.get_status().size, 3);
    assert_eq!(h.handler.call_count(), 0);

    let worker = SyncWorker::new(h.queue.clone(), h.connectivity.clone(), None);
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    h.connectivity.set_online(true);

    let queue = h.queue.clone();
    wait_until(move || queue.get_status().size == 0).await;
    assert_eq!(h.handler.call_count(), 3);

    shutdown_tx.shutdown();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_validate_rejects_unknown_and_empty_kinds() {
    let h = harness(MockBehavior::Success).await;

    assert!(h.queue.validate(&op(1)).is_ok());
    assert!(h
        .queue
        .validate(&OperationDescriptor::new("fax", json!({})))
        .is_err());
    assert!(h
        .queue
        .validate(&OperationDescriptor::new("", json!({})))
        .is_err());
}

#[tokio::test]
async fn test_enqueue_rejects_zero_max_attempts() {
    let h = harness(MockBehavior::Success).await;
    assert!(h.queue.enqueue_with_max_attempts(op(1), 0).await.is_err());
    assert_eq!(h.queue.get_status().size, 0);
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let config = QueueConfig {
        capacity: 0,
        ..QueueConfig::default()
    };
    let result = OfflineQueue::load(
        config,
        ports(
            Arc::new(InMemoryKeyValueStore::new()),
            Arc::new(ConnectivitySignal::new(false)),
            HandlerRegistry::new(),
            Arc::new(InMemoryDeadLetterStore::new()),
        ),
    )
    .await;
    assert!(result.is_err());
}
