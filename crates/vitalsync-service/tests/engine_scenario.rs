//! End-to-end engine scenarios against mock collaborators.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use vitalsync_core::{MockCredentials, MockHistory, MockSink, RemoteObservation};
use vitalsync_service::{Config, Engine, EngineContext, FlushOutcome};
use vitalsync_store::Store;
use vitalsync_types::{Credentials, HistoryRange, PointSource, Reading, SyncState};

struct Harness {
    engine: Engine,
    sink: Arc<MockSink>,
    history: Arc<MockHistory>,
}

fn harness() -> Harness {
    let sink = Arc::new(MockSink::new());
    let history = Arc::new(MockHistory::new());
    let mut config = Config::default();
    config.sync.optimistic_push = false;

    let context = EngineContext::new(
        Store::open_in_memory().unwrap(),
        sink.clone(),
        history.clone(),
        Arc::new(MockCredentials::new(Credentials::new(
            "wearable-01",
            Some("clinic-7".to_string()),
        ))),
        config,
    );

    Harness {
        engine: Engine::new(context),
        sink,
        history,
    }
}

async fn state_of(engine: &Engine, id: i64) -> SyncState {
    engine
        .context()
        .store
        .lock()
        .await
        .get(id)
        .unwrap()
        .unwrap()
        .sync_state
}

#[tokio::test]
async fn test_record_flush_fail_recover() {
    let h = harness();
    let now = OffsetDateTime::now_utc();

    let first = h
        .engine
        .record(&Reading::new("temperature", 36.6, now))
        .await
        .unwrap();
    assert_eq!(state_of(&h.engine, first.id).await, SyncState::Dirty);

    assert_eq!(h.engine.sync_now().await.synced(), 1);
    assert_eq!(state_of(&h.engine, first.id).await, SyncState::Synced);

    // Nothing left to deliver
    assert_eq!(h.engine.sync_now().await.synced(), 0);
    assert_eq!(h.sink.call_count(), 1);

    h.sink.set_should_fail(true);
    let second = h
        .engine
        .record(&Reading::new("temperature", 36.9, now + Duration::minutes(1)))
        .await
        .unwrap();
    let outcome = h.engine.sync_now().await;
    assert_eq!(
        outcome,
        FlushOutcome::Completed {
            synced: 0,
            halted_at: Some(second.id)
        }
    );
    assert_eq!(state_of(&h.engine, second.id).await, SyncState::Dirty);

    h.sink.set_should_fail(false);
    assert_eq!(h.engine.sync_now().await.synced(), 1);
    assert_eq!(state_of(&h.engine, second.id).await, SyncState::Synced);

    let accepted = h.sink.accepted().await;
    assert_eq!(accepted.len(), 2);
    assert_eq!(accepted[1].data.get("temperature"), Some(&36.9));
    assert_eq!(accepted[1].device_id.as_deref(), Some("wearable-01"));
    assert_eq!(accepted[1].tenant_id.as_deref(), Some("clinic-7"));
}

#[tokio::test]
async fn test_failure_halts_queue_in_order() {
    let h = harness();
    let base = OffsetDateTime::now_utc() - Duration::minutes(10);

    let mut ids = Vec::new();
    for (i, value) in [72.0, 75.0, 78.0].into_iter().enumerate() {
        let reading = Reading::new("heart_rate", value, base + Duration::seconds(i as i64));
        ids.push(h.engine.record(&reading).await.unwrap().id);
    }

    h.sink.fail_on_call(2);
    let outcome = h.engine.sync_now().await;
    assert_eq!(outcome.synced(), 1);
    assert!(outcome.is_halted());
    assert_eq!(h.sink.call_count(), 2);

    assert_eq!(state_of(&h.engine, ids[0]).await, SyncState::Synced);
    assert_eq!(state_of(&h.engine, ids[1]).await, SyncState::Dirty);
    assert_eq!(state_of(&h.engine, ids[2]).await, SyncState::Dirty);

    assert_eq!(h.engine.sync_now().await.synced(), 2);
    let values: Vec<f64> = h
        .sink
        .accepted()
        .await
        .iter()
        .filter_map(|p| p.data.get("heart_rate").copied())
        .collect();
    assert_eq!(values, vec![72.0, 75.0, 78.0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_flush_is_skipped() {
    let h = harness();
    h.engine
        .record(&Reading::new("spo2", 97.0, OffsetDateTime::now_utc()))
        .await
        .unwrap();
    h.sink.set_gated(true);

    let worker = Arc::clone(h.engine.worker());
    let running = tokio::spawn(async move { worker.sync_now().await });
    h.sink.wait_entered().await;

    assert_eq!(h.engine.sync_now().await, FlushOutcome::Skipped);

    h.sink.release();
    assert_eq!(running.await.unwrap().synced(), 1);
    assert_eq!(h.sink.call_count(), 1);
}

#[tokio::test]
async fn test_history_falls_back_to_local_when_remote_fails() {
    let h = harness();
    let now = OffsetDateTime::now_utc();
    h.history.set_should_fail(true);

    h.engine
        .record(&Reading::new("temperature", 36.6, now - Duration::hours(1)))
        .await
        .unwrap();
    h.engine.sync_now().await;
    h.engine
        .record(&Reading::new("temperature", 36.8, now - Duration::minutes(5)))
        .await
        .unwrap();

    let series = h
        .engine
        .history_at("temperature", HistoryRange::Day, now)
        .await;
    assert_eq!(series.len(), 2);
    assert_eq!(series[0].source, PointSource::Local);
    assert_eq!(series[1].source, PointSource::Pending);
}

#[tokio::test]
async fn test_history_deduplicates_delivered_records() {
    let h = harness();
    let now = OffsetDateTime::now_utc();
    let observed = now - Duration::hours(2);

    h.engine
        .record(&Reading::new("temperature", 36.6005, observed + Duration::seconds(1)))
        .await
        .unwrap();
    h.engine.sync_now().await;
    h.history
        .set_observations(vec![
            RemoteObservation::new(observed, 36.6),
            RemoteObservation::new(now - Duration::days(3), 37.1),
        ])
        .await;

    let series = h
        .engine
        .history_at("temperature", HistoryRange::Day, now)
        .await;
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].source, PointSource::Remote);
    assert_eq!(series[0].value, 36.6);

    let week = h
        .engine
        .history_at("temperature", HistoryRange::Week, now)
        .await;
    assert_eq!(week.len(), 2);
    assert!(week[0].timestamp < week[1].timestamp);
}
