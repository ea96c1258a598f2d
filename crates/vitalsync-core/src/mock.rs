//! Mock collaborators for testing.
//!
//! These implement the traits in [`crate::traits`] so the engine can be
//! exercised without a remote system.
//!
//! # Features
//!
//! - **Failure injection**: fail always, fail the next N calls, or fail one specific call
//! - **Latency simulation**: add artificial delays (pairs well with paused Tokio time)
//! - **Gating**: hold a push open until the test releases it

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Notify, RwLock};

use vitalsync_types::{Credentials, TelemetryPayload};

use crate::error::{Error, Result};
use crate::observation::RemoteObservation;
use crate::traits::{CredentialSource, HistorySource, TelemetrySink};

/// A mock push target that records every payload it accepts.
///
/// # Example
///
/// ```
/// use vitalsync_core::{MockSink, TelemetrySink};
/// use vitalsync_types::{Credentials, Reading, TelemetryPayload};
///
/// #[tokio::main]
/// async fn main() {
///     let sink = MockSink::new();
///     let reading = Reading::new("temperature", 36.6, time::OffsetDateTime::UNIX_EPOCH);
///     let payload = TelemetryPayload::from_reading(&reading, &Credentials::new("dev-1", None));
///
///     sink.push(&payload).await.unwrap();
///     assert_eq!(sink.call_count(), 1);
/// }
/// ```
#[derive(Debug, Default)]
pub struct MockSink {
    accepted: RwLock<Vec<TelemetryPayload>>,
    call_count: AtomicU32,
    should_fail: AtomicBool,
    /// 1-based call number that fails (0 = none).
    fail_on_call: AtomicU32,
    remaining_failures: AtomicU32,
    latency_ms: AtomicU64,
    gated: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl MockSink {
    /// Create a sink that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of push attempts, successful or not.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Payloads accepted so far, in order.
    pub async fn accepted(&self) -> Vec<TelemetryPayload> {
        self.accepted.read().await.clone()
    }

    /// Make every push fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Make only the `n`th push attempt (1-based, counted from creation) fail.
    pub fn fail_on_call(&self, n: u32) {
        self.fail_on_call.store(n, Ordering::SeqCst);
    }

    /// Fail the next `count` pushes, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::SeqCst);
    }

    /// Delay every push.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Hold every push until [`MockSink::release`] is called.
    pub fn set_gated(&self, gated: bool) {
        self.gated.store(gated, Ordering::SeqCst);
    }

    /// Wait until a gated push has started.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let one gated push continue.
    pub fn release(&self) {
        self.release.notify_one();
    }

    fn check_failure(&self, call: u32) -> Result<()> {
        if self.remaining_failures.load(Ordering::SeqCst) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Rejected("mock transient failure".to_string()));
        }
        if self.should_fail.load(Ordering::SeqCst) || self.fail_on_call.load(Ordering::SeqCst) == call
        {
            return Err(Error::Rejected("mock failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for MockSink {
    async fn push(&self, payload: &TelemetryPayload) -> Result<()> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;

        if self.gated.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        self.check_failure(call)?;
        self.accepted.write().await.push(payload.clone());
        Ok(())
    }
}

/// A mock history endpoint serving canned observations.
#[derive(Debug, Default)]
pub struct MockHistory {
    observations: RwLock<Vec<RemoteObservation>>,
    call_count: AtomicU32,
    should_fail: AtomicBool,
}

impl MockHistory {
    /// Create an endpoint with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an endpoint serving `observations`.
    pub fn with_observations(observations: Vec<RemoteObservation>) -> Self {
        Self {
            observations: RwLock::new(observations),
            ..Self::default()
        }
    }

    /// Replace the served observations.
    pub async fn set_observations(&self, observations: Vec<RemoteObservation>) {
        *self.observations.write().await = observations;
    }

    /// Make every fetch fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Number of fetches.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistorySource for MockHistory {
    async fn fetch_history(
        &self,
        _vital_type: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<RemoteObservation>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::Api {
                status: 503,
                message: "mock history unavailable".to_string(),
            });
        }
        Ok(self
            .observations
            .read()
            .await
            .iter()
            .filter(|o| o.timestamp >= from && o.timestamp <= to)
            .copied()
            .collect())
    }
}

/// A mock credential source with call counting.
#[derive(Debug, Default)]
pub struct MockCredentials {
    credentials: Option<Credentials>,
    call_count: AtomicU32,
    should_fail: AtomicBool,
    latency_ms: AtomicU64,
}

impl MockCredentials {
    /// Always resolve to `credentials`.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
            ..Self::default()
        }
    }

    /// Resolve to "no identity".
    pub fn none() -> Self {
        Self::default()
    }

    /// Delay every resolution.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
        self
    }

    /// Make every resolution fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Number of resolutions performed.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for MockCredentials {
    async fn resolve(&self) -> Result<Option<Credentials>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::Api {
                status: 401,
                message: "mock profile lookup failed".to_string(),
            });
        }
        Ok(self.credentials.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitalsync_types::Reading;

    fn payload(value: f64) -> TelemetryPayload {
        let reading = Reading::new("temperature", value, OffsetDateTime::UNIX_EPOCH);
        TelemetryPayload::from_reading(&reading, &Credentials::new("dev-1", None))
    }

    #[tokio::test]
    async fn test_sink_records_accepted_payloads() {
        let sink = MockSink::new();
        sink.push(&payload(1.0)).await.unwrap();
        sink.push(&payload(2.0)).await.unwrap();

        let accepted = sink.accepted().await;
        assert_eq!(accepted.len(), 2);
        assert_eq!(accepted[1].data.get("temperature"), Some(&2.0));
    }

    #[tokio::test]
    async fn test_sink_fail_on_call() {
        let sink = MockSink::new();
        sink.fail_on_call(2);

        assert!(sink.push(&payload(1.0)).await.is_ok());
        assert!(sink.push(&payload(2.0)).await.is_err());
        assert!(sink.push(&payload(3.0)).await.is_ok());
        assert_eq!(sink.call_count(), 3);
        assert_eq!(sink.accepted().await.len(), 2);
    }

    #[tokio::test]
    async fn test_sink_transient_failures() {
        let sink = MockSink::new();
        sink.set_transient_failures(2);

        assert!(sink.push(&payload(1.0)).await.is_err());
        assert!(sink.push(&payload(1.0)).await.is_err());
        assert!(sink.push(&payload(1.0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_history_filters_by_window() {
        let t = OffsetDateTime::UNIX_EPOCH;
        let history = MockHistory::with_observations(vec![
            RemoteObservation::new(t, 1.0),
            RemoteObservation::new(t + time::Duration::hours(2), 2.0),
        ]);

        let points = history
            .fetch_history("temperature", t + time::Duration::hours(1), t + time::Duration::hours(3))
            .await
            .unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 2.0);

        history.set_should_fail(true);
        assert!(history.fetch_history("temperature", t, t).await.is_err());
        assert_eq!(history.call_count(), 2);
    }

    #[tokio::test]
    async fn test_credentials_modes() {
        let creds = MockCredentials::new(Credentials::new("dev-1", None));
        assert!(creds.resolve().await.unwrap().is_some());

        let none = MockCredentials::none();
        assert!(none.resolve().await.unwrap().is_none());

        none.set_should_fail(true);
        assert!(none.resolve().await.is_err());
        assert_eq!(none.call_count(), 2);
    }
}
