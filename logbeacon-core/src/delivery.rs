//! Background delivery loop
//!
//! One perpetual task drains the [`DeliveryQueue`] in bounded batches and
//! paces itself with fixed waits:
//!
//! ```text
//!   start ──startup delay──▶ ┌───────────────┐
//!                            │  cycle        │◀─────────────────────────┐
//!                            └──────┬────────┘                          │
//!          queue empty ─────────────┼──▶ IdleWait (idle_wait) ──────────┤
//!          upload in flight ────────┼──▶ BusyWait (short) ──────────────┤
//!          otherwise: take ≤ max    ▼                                   │
//!                             Uploading ──ok──▶ SuccessWait ────────────┤
//!                                  └─────err──▶ BackoffWait ────────────┘
//! ```
//!
//! A batch is removed from the queue before it is sent and is not requeued
//! when the send fails. The in-flight flag is held through the post-send
//! wait, so at most one upload is ever in flight. A panicking adapter `send`
//! counts as a failed batch; it never takes the loop down.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinHandle;

use crate::config::ReporterConfig;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::platform::Platform;
use crate::queue::DeliveryQueue;

/// Wait when a cycle finds another upload in flight
pub const BUSY_WAIT: Duration = Duration::from_millis(100);

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    NotStarted,
    StartupDelay,
    IdleWait,
    BusyWait,
    Uploading,
    SuccessWait,
    BackoffWait,
}

/// What one cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Queue was empty
    Idle,
    /// Another upload was in flight
    Busy,
    /// A batch of this many events was accepted
    Delivered(usize),
    /// A batch of this many events failed and was discarded
    Failed(usize),
}

/// Delivery statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Number of transport calls made
    pub upload_attempts: usize,
    /// Batches accepted by the endpoint
    pub batches_sent: usize,
    /// Events in accepted batches
    pub events_sent: usize,
    /// Batches whose transport call failed
    pub batches_failed: usize,
    /// Events lost with failed batches
    pub events_discarded: usize,
}

/// Clears the in-flight flag when the upload step ends, even on panic
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct DeliveryLoop {
    queue: DeliveryQueue,
    platform: Arc<dyn Platform>,
    endpoint_url: String,
    max_batch_size: usize,
    startup_delay: Duration,
    idle_wait: Duration,
    success_wait: Duration,
    error_wait: Duration,
    started: AtomicBool,
    in_flight: AtomicBool,
    state: Mutex<LoopState>,
    stats: Mutex<DeliveryStats>,
}

impl DeliveryLoop {
    pub fn new(queue: DeliveryQueue, platform: Arc<dyn Platform>, config: &ReporterConfig) -> Self {
        Self {
            queue,
            platform,
            endpoint_url: config.endpoint_url.clone(),
            max_batch_size: config.max_batch_size.max(1),
            startup_delay: config.startup_delay(),
            idle_wait: config.idle_wait(),
            success_wait: config.success_wait(),
            error_wait: config.error_wait(),
            started: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            state: Mutex::new(LoopState::NotStarted),
            stats: Mutex::new(DeliveryStats::default()),
        }
    }

    /// Spawn the loop on the current tokio runtime.
    ///
    /// Only the first successful call spawns; later calls return `None`.
    /// Outside a runtime nothing is spawned and a later call may retry.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot start delivery loop outside a tokio runtime");
                return None;
            }
        };
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::debug!("Delivery loop already started");
            return None;
        }
        let this = Arc::clone(self);
        Some(handle.spawn(async move { this.run().await }))
    }

    /// Run forever: start-up delay, then back-to-back cycles
    pub async fn run(self: Arc<Self>) {
        self.set_state(LoopState::StartupDelay);
        tracing::debug!(
            platform = self.platform.name(),
            delay_ms = self.startup_delay.as_millis() as u64,
            "Delivery loop starting"
        );
        tokio::time::sleep(self.startup_delay).await;

        loop {
            self.cycle().await;
        }
    }

    /// One pass of the loop, including its trailing wait
    pub async fn cycle(&self) -> CycleOutcome {
        if self.queue.is_empty() {
            self.set_state(LoopState::IdleWait);
            tokio::time::sleep(self.idle_wait).await;
            return CycleOutcome::Idle;
        }

        if self.in_flight.swap(true, Ordering::AcqRel) {
            self.set_state(LoopState::BusyWait);
            tokio::time::sleep(BUSY_WAIT).await;
            return CycleOutcome::Busy;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let batch = self.queue.take_batch(self.max_batch_size);
        if batch.is_empty() {
            self.set_state(LoopState::IdleWait);
            tokio::time::sleep(self.idle_wait).await;
            return CycleOutcome::Idle;
        }
        let count = batch.len();

        self.set_state(LoopState::Uploading);
        self.update_stats(|stats| stats.upload_attempts += 1);

        match self.send_batch(&batch).await {
            Ok(()) => {
                self.update_stats(|stats| {
                    stats.batches_sent += 1;
                    stats.events_sent += count;
                });
                tracing::debug!(
                    platform = self.platform.name(),
                    events = count,
                    pending = self.queue.len(),
                    "Uploaded batch"
                );
                self.set_state(LoopState::SuccessWait);
                tokio::time::sleep(self.success_wait).await;
                CycleOutcome::Delivered(count)
            }
            Err(e) => {
                self.update_stats(|stats| {
                    stats.batches_failed += 1;
                    stats.events_discarded += count;
                });
                tracing::warn!(
                    platform = self.platform.name(),
                    error = %e,
                    discarded = count,
                    "Failed to upload batch"
                );
                self.set_state(LoopState::BackoffWait);
                tokio::time::sleep(self.error_wait).await;
                CycleOutcome::Failed(count)
            }
        }
    }

    async fn send_batch(&self, batch: &[Event]) -> Result<()> {
        AssertUnwindSafe(self.platform.send(batch, &self.endpoint_url))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(Error::Platform(format!(
                    "send panicked: {}",
                    panic_message(panic.as_ref())
                )))
            })
    }

    pub fn state(&self) -> LoopState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_uploading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn set_state(&self, state: LoopState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn update_stats(&self, f: impl FnOnce(&mut DeliveryStats)) {
        f(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CustomKeys, Level};
    use crate::platform::EnvironmentFields;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::Instant;

    /// Transport stub with a fixed latency that tracks concurrency
    #[derive(Default)]
    struct SlowPlatform {
        fail: bool,
        panic_on_first: bool,
        current: AtomicUsize,
        max_concurrent: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Platform for SlowPlatform {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn initialize(&self) {}

        fn device_id(&self) -> String {
            String::new()
        }

        fn environment(&self) -> EnvironmentFields {
            EnvironmentFields::default()
        }

        async fn send(&self, _events: &[Event], _endpoint_url: &str) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.panic_on_first && call == 1 {
                panic!("adapter bug");
            }
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::Transport("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    fn event(n: usize) -> Event {
        Event {
            logid: format!("id-{n}"),
            logtime: String::new(),
            msg: n.to_string(),
            desc: String::new(),
            level: Level::Info,
            appid: String::new(),
            version: String::new(),
            device_id: String::new(),
            user: String::new(),
            custom_keys: CustomKeys::default(),
            environment: EnvironmentFields::default(),
        }
    }

    fn config() -> ReporterConfig {
        ReporterConfig {
            max_batch_size: 3,
            ..ReporterConfig::new("http://collector.test/logs", "app", "1.0")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_cycle_waits_idle_interval() {
        let platform = Arc::new(SlowPlatform::default());
        let delivery = DeliveryLoop::new(DeliveryQueue::new(), platform.clone(), &config());

        let started = Instant::now();
        assert_eq!(delivery.cycle().await, CycleOutcome::Idle);
        assert_eq!(started.elapsed().as_millis(), 1000);
        assert_eq!(delivery.state(), LoopState::IdleWait);
        assert_eq!(platform.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_cycle() {
        let queue = DeliveryQueue::new();
        for n in 0..5 {
            queue.push(event(n));
        }
        let platform = Arc::new(SlowPlatform::default());
        let delivery = DeliveryLoop::new(queue.clone(), platform.clone(), &config());

        let started = Instant::now();
        assert_eq!(delivery.cycle().await, CycleOutcome::Delivered(3));
        // 50ms send + 1000ms success wait
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1050) && elapsed < Duration::from_millis(1060));
        assert_eq!(queue.len(), 2);
        assert!(!delivery.is_uploading());

        let stats = delivery.stats();
        assert_eq!(stats.upload_attempts, 1);
        assert_eq!(stats.events_sent, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_discards_batch_and_backs_off() {
        let queue = DeliveryQueue::new();
        for n in 0..5 {
            queue.push(event(n));
        }
        let platform = Arc::new(SlowPlatform {
            fail: true,
            ..Default::default()
        });
        let delivery = DeliveryLoop::new(queue.clone(), platform, &config());

        let started = Instant::now();
        assert_eq!(delivery.cycle().await, CycleOutcome::Failed(3));
        // 50ms send + 3000ms error wait
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3050) && elapsed < Duration::from_millis(3060));
        assert_eq!(delivery.state(), LoopState::BackoffWait);

        // failed batch is gone; the rest is still queued in order
        let rest: Vec<_> = queue.take_batch(10).into_iter().map(|e| e.msg).collect();
        assert_eq!(rest, ["3", "4"]);

        let stats = delivery.stats();
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.events_discarded, 3);
        assert!(!delivery.is_uploading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_cycles_never_overlap_uploads() {
        let queue = DeliveryQueue::new();
        for n in 0..9 {
            queue.push(event(n));
        }
        let platform = Arc::new(SlowPlatform::default());
        let delivery = DeliveryLoop::new(queue.clone(), platform.clone(), &config());

        let (a, b) = tokio::join!(delivery.cycle(), delivery.cycle());
        let mut outcomes = [a, b];
        outcomes.sort_by_key(|o| matches!(o, CycleOutcome::Busy));
        assert_eq!(outcomes, [CycleOutcome::Delivered(3), CycleOutcome::Busy]);

        assert_eq!(platform.max_concurrent.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_only_once() {
        let platform = Arc::new(SlowPlatform::default());
        let delivery = Arc::new(DeliveryLoop::new(DeliveryQueue::new(), platform, &config()));
        assert_eq!(delivery.state(), LoopState::NotStarted);

        let handle = delivery.start();
        assert!(handle.is_some());
        assert!(delivery.start().is_none());
        assert!(delivery.is_started());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(delivery.state(), LoopState::StartupDelay);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(delivery.state(), LoopState::IdleWait);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_send_counts_as_failed_batch() {
        let queue = DeliveryQueue::new();
        for n in 0..2 {
            queue.push(event(n));
        }
        let platform = Arc::new(SlowPlatform {
            panic_on_first: true,
            ..Default::default()
        });
        let delivery = DeliveryLoop::new(queue.clone(), platform, &config());

        let started = Instant::now();
        assert_eq!(delivery.cycle().await, CycleOutcome::Failed(2));
        assert_eq!(started.elapsed().as_millis(), 3000);
        assert_eq!(delivery.state(), LoopState::BackoffWait);
        assert!(!delivery.is_uploading());
        assert_eq!(delivery.stats().events_discarded, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_keeps_running_after_send_panics() {
        let queue = DeliveryQueue::new();
        queue.push(event(0));
        let platform = Arc::new(SlowPlatform {
            panic_on_first: true,
            ..Default::default()
        });
        let delivery = Arc::new(DeliveryLoop::new(queue.clone(), platform.clone(), &config()));
        let handle = delivery.start().unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        queue.push(event(1));
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(!handle.is_finished());
        assert_eq!(platform.calls.load(Ordering::SeqCst), 2);
        assert!(queue.is_empty());
        assert_eq!(delivery.state(), LoopState::IdleWait);

        let stats = delivery.stats();
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.events_sent, 1);
    }

    #[test]
    fn test_start_outside_runtime_is_refused() {
        let platform = Arc::new(SlowPlatform::default());
        let delivery = Arc::new(DeliveryLoop::new(DeliveryQueue::new(), platform, &config()));

        assert!(delivery.start().is_none());
        assert!(!delivery.is_started());
        assert_eq!(delivery.state(), LoopState::NotStarted);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static text");
        assert_eq!(panic_message(boxed.as_ref()), "static text");
        let boxed: Box<dyn Any + Send> = Box::new(format!("formatted {}", 1));
        assert_eq!(panic_message(boxed.as_ref()), "formatted 1");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
