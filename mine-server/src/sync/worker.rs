//! DrainWorker — replays the offline request queue
//!
//! Listens for connectivity notifications and runs a periodic scan,
//! draining the queue opportunistically. Each drain pass considers
//! requests in FIFO order but delivers distinct items concurrently;
//! retries of one item are strictly sequential inside the retry
//! executor.
//!
//! Note: redb operations are synchronous for stability.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::retry::{self, RetryPolicy};
use super::storage::{QueueStorage, QueuedRequest};
use super::transport::{DeliveryError, DeliveryReceipt, ReplayTransport};

/// Hook fired on each confirmed delivery
///
/// The anchoring pipeline uses this to record audit entries for anchors
/// that completed via the queue instead of the synchronous path.
#[async_trait::async_trait]
pub trait DeliveryObserver: Send + Sync {
    async fn delivered(&self, request: &QueuedRequest, receipt: &DeliveryReceipt);
}

/// Observer that does nothing
pub struct NoopObserver;

#[async_trait::async_trait]
impl DeliveryObserver for NoopObserver {
    async fn delivered(&self, _request: &QueuedRequest, _receipt: &DeliveryReceipt) {}
}

/// Reason a drain pass was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainSignal {
    /// Connectivity to the ledger gateway came back
    ConnectivityRestored,
    /// Operator-triggered drain (API)
    Manual,
}

/// Drain configuration
#[derive(Debug, Clone)]
pub struct DrainConfig {
    /// Per-item retry within one drain pass
    pub retry: RetryPolicy,
    /// Lifetime attempt ceiling; past it a request is dead-lettered
    pub lifetime_attempts: u32,
    /// Max concurrently in-flight items
    pub concurrency: usize,
    /// Periodic scan interval
    pub scan_interval: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::new(3, Duration::from_secs(5)),
            lifetime_attempts: 10,
            concurrency: 4,
            scan_interval: Duration::from_secs(60),
        }
    }
}

/// Outcome of a `drain()` call
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DrainOutcome {
    Completed(DrainReport),
    /// Another drain pass holds the lock; this call was a no-op
    AlreadyRunning,
}

/// Per-pass delivery counts
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub delivered: usize,
    pub retained: usize,
    pub dead_lettered: usize,
}

/// What happened to a single item during a pass
enum ItemOutcome {
    Delivered,
    Retained,
    DeadLettered,
    Interrupted,
}

/// Worker replaying queued requests
pub struct DrainWorker {
    storage: QueueStorage,
    transport: Arc<dyn ReplayTransport>,
    observer: Arc<dyn DeliveryObserver>,
    config: DrainConfig,
    /// One drain pass at a time; concurrent calls are no-ops
    drain_lock: tokio::sync::Mutex<()>,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl DrainWorker {
    pub fn new(
        storage: QueueStorage,
        transport: Arc<dyn ReplayTransport>,
        observer: Arc<dyn DeliveryObserver>,
        config: DrainConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let concurrency = config.concurrency.max(1);
        Self {
            storage,
            transport,
            observer,
            config,
            drain_lock: tokio::sync::Mutex::new(()),
            semaphore: Arc::new(Semaphore::new(concurrency)),
            shutdown,
        }
    }

    /// Run the drain loop (blocks until shutdown)
    ///
    /// 1. Drain once on startup (queue may hold requests from a previous run)
    /// 2. Drain on every connectivity/manual signal
    /// 3. Periodic scan as a fallback
    pub async fn run(self: Arc<Self>, mut trigger_rx: mpsc::Receiver<DrainSignal>) {
        tracing::info!(
            concurrency = self.config.concurrency,
            scan_interval_secs = self.config.scan_interval.as_secs(),
            "DrainWorker started"
        );

        self.drain().await;

        let mut scan_interval = tokio::time::interval(self.config.scan_interval);
        scan_interval.tick().await; // skip immediate tick

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("DrainWorker shutting down");
                    break;
                }

                _ = scan_interval.tick() => {
                    self.drain().await;
                }

                signal = trigger_rx.recv() => {
                    match signal {
                        Some(signal) => {
                            tracing::debug!(?signal, "Drain triggered");
                            self.drain().await;
                        }
                        None => {
                            tracing::info!("Drain trigger channel closed, DrainWorker stopping");
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("DrainWorker stopped");
    }

    /// One pass over the queue
    ///
    /// Items are dispatched in FIFO order and delivered concurrently; each
    /// request is removed individually upon its own confirmed success. A
    /// concurrent call returns [`DrainOutcome::AlreadyRunning`] without
    /// touching the network.
    pub async fn drain(self: &Arc<Self>) -> DrainOutcome {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            tracing::debug!("Drain already in progress, skipping");
            return DrainOutcome::AlreadyRunning;
        };

        let pending = match self.storage.pending() {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read pending queue");
                return DrainOutcome::Completed(DrainReport::default());
            }
        };

        if pending.is_empty() {
            return DrainOutcome::Completed(DrainReport::default());
        }

        tracing::info!(count = pending.len(), "Draining offline request queue");

        let mut report = DrainReport {
            attempted: pending.len(),
            ..Default::default()
        };

        let mut tasks = JoinSet::new();
        for request in pending {
            if self.shutdown.is_cancelled() {
                report.attempted -= 1;
                continue;
            }

            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => break, // semaphore closed, shutting down
            };

            let worker = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                worker.process_request(request).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(ItemOutcome::Delivered) => report.delivered += 1,
                Ok(ItemOutcome::Retained) => report.retained += 1,
                Ok(ItemOutcome::DeadLettered) => report.dead_lettered += 1,
                Ok(ItemOutcome::Interrupted) => report.retained += 1,
                Err(e) => tracing::error!(error = %e, "Drain task panicked"),
            }
        }

        tracing::info!(
            delivered = report.delivered,
            retained = report.retained,
            dead_lettered = report.dead_lettered,
            "Drain pass complete"
        );

        DrainOutcome::Completed(report)
    }

    /// Deliver a single request with per-pass retry
    async fn process_request(&self, request: QueuedRequest) -> ItemOutcome {
        let result = tokio::select! {
            // On shutdown the in-flight outcome is unknown — treat as
            // not-yet-delivered and leave the request queued.
            _ = self.shutdown.cancelled() => return ItemOutcome::Interrupted,
            result = retry::execute(&self.config.retry, DeliveryError::is_transient, || {
                self.transport.deliver(&request)
            }) => result,
        };

        match result {
            Ok(receipt) => {
                tracing::debug!(id = request.id, status = receipt.status, "Request delivered");
                if let Err(e) = self.storage.remove(request.id) {
                    // Next pass may redeliver; at-least-once allows it
                    tracing::error!(id = request.id, error = %e, "Failed to remove delivered request");
                }
                self.observer.delivered(&request, &receipt).await;
                ItemOutcome::Delivered
            }
            Err(e) if e.is_transient() => self.record_failure(request.id, &e),
            Err(e) => {
                tracing::error!(id = request.id, error = %e, "Request permanently rejected, dead-lettering");
                if let Err(e2) = self.storage.mark_failed(request.id, &e.to_string()) {
                    tracing::error!(id = request.id, error = %e2, "Failed to record failure");
                }
                self.dead_letter(request.id, &e.to_string())
            }
        }
    }

    /// Transient exhaustion: attempts += 1, dead-letter past the ceiling
    fn record_failure(&self, id: u64, error: &DeliveryError) -> ItemOutcome {
        match self.storage.mark_failed(id, &error.to_string()) {
            Ok(Some(updated)) if updated.attempts >= self.config.lifetime_attempts => {
                tracing::error!(
                    id,
                    attempts = updated.attempts,
                    "Lifetime attempt ceiling exceeded, dead-lettering"
                );
                self.dead_letter(id, &error.to_string())
            }
            Ok(Some(updated)) => {
                tracing::warn!(
                    id,
                    attempts = updated.attempts,
                    "Delivery failed, request stays queued: {error}"
                );
                ItemOutcome::Retained
            }
            Ok(None) => ItemOutcome::Retained,
            Err(e) => {
                tracing::error!(id, error = %e, "Failed to record failure");
                ItemOutcome::Retained
            }
        }
    }

    fn dead_letter(&self, id: u64, error: &str) -> ItemOutcome {
        if let Err(e) = self.storage.move_to_dead_letter(id, error) {
            tracing::error!(id, error = %e, "Failed to move request to dead letter queue");
            return ItemOutcome::Retained;
        }
        ItemOutcome::DeadLettered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;

    use crate::sync::storage::NewQueuedRequest;

    fn request(url: &str) -> NewQueuedRequest {
        NewQueuedRequest {
            url: url.to_string(),
            method: "POST".to_string(),
            headers: HashMap::new(),
            body: b"{}".to_vec(),
        }
    }

    fn worker_with(
        storage: QueueStorage,
        transport: Arc<dyn ReplayTransport>,
        config: DrainConfig,
    ) -> Arc<DrainWorker> {
        Arc::new(DrainWorker::new(
            storage,
            transport,
            Arc::new(NoopObserver),
            config,
            CancellationToken::new(),
        ))
    }

    fn fast_config() -> DrainConfig {
        DrainConfig {
            retry: RetryPolicy::new(2, Duration::from_millis(1)),
            lifetime_attempts: 10,
            concurrency: 4,
            scan_interval: Duration::from_secs(60),
        }
    }

    /// Transport scripted per URL substring
    struct ScriptedTransport {
        fail_matching: &'static str,
        error: fn() -> DeliveryError,
        deliveries: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(fail_matching: &'static str, error: fn() -> DeliveryError) -> Self {
            Self {
                fail_matching,
                error,
                deliveries: AtomicU32::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ReplayTransport for ScriptedTransport {
        async fn deliver(
            &self,
            request: &QueuedRequest,
        ) -> Result<DeliveryReceipt, DeliveryError> {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            if !self.fail_matching.is_empty() && request.url.contains(self.fail_matching) {
                return Err((self.error)());
            }
            Ok(DeliveryReceipt {
                status: 200,
                body: br#"{"transaction_id":"tx-1"}"#.to_vec(),
            })
        }
    }

    #[tokio::test]
    async fn test_drain_delivers_in_fifo_order_and_empties_queue() {
        let storage = QueueStorage::open_in_memory().unwrap();
        for name in ["a", "b", "c"] {
            storage.enqueue(request(&format!("https://ledger/{name}"))).unwrap();
        }

        let transport = Arc::new(ScriptedTransport::new("", || unreachable!()));
        let worker = worker_with(storage.clone(), transport.clone(), fast_config());

        let outcome = worker.drain().await;
        assert_eq!(
            outcome,
            DrainOutcome::Completed(DrainReport {
                attempted: 3,
                delivered: 3,
                retained: 0,
                dead_lettered: 0,
            })
        );
        assert_eq!(storage.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        // A and C succeed, B fails with HTTP 500 on every attempt:
        // after the drain only B remains queued
        let storage = QueueStorage::open_in_memory().unwrap();
        storage.enqueue(request("https://ledger/a")).unwrap();
        storage.enqueue(request("https://ledger/b")).unwrap();
        storage.enqueue(request("https://ledger/c")).unwrap();

        let transport = Arc::new(ScriptedTransport::new("/b", || DeliveryError::Busy {
            status: 500,
        }));
        let worker = worker_with(storage.clone(), transport, fast_config());

        let outcome = worker.drain().await;
        assert_eq!(
            outcome,
            DrainOutcome::Completed(DrainReport {
                attempted: 3,
                delivered: 2,
                retained: 1,
                dead_lettered: 0,
            })
        );

        let pending = storage.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, "https://ledger/b");
        assert_eq!(pending[0].attempts, 1);

        // B is retried on the next drain
        let outcome = worker.drain().await;
        assert_eq!(
            outcome,
            DrainOutcome::Completed(DrainReport {
                attempted: 1,
                delivered: 0,
                retained: 1,
                dead_lettered: 0,
            })
        );
        assert_eq!(storage.pending().unwrap()[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_permanent_rejection_is_dead_lettered() {
        let storage = QueueStorage::open_in_memory().unwrap();
        storage.enqueue(request("https://ledger/bad")).unwrap();

        let transport = Arc::new(ScriptedTransport::new("/bad", || DeliveryError::Rejected {
            status: 400,
            message: "malformed".into(),
        }));
        let worker = worker_with(storage.clone(), transport.clone(), fast_config());

        let outcome = worker.drain().await;
        assert_eq!(
            outcome,
            DrainOutcome::Completed(DrainReport {
                attempted: 1,
                delivered: 0,
                retained: 0,
                dead_lettered: 1,
            })
        );

        // No retry for a permanent rejection
        assert_eq!(transport.deliveries.load(Ordering::SeqCst), 1);
        assert_eq!(storage.pending_count().unwrap(), 0);
        assert_eq!(storage.dead_letters().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lifetime_ceiling_dead_letters() {
        let storage = QueueStorage::open_in_memory().unwrap();
        storage.enqueue(request("https://ledger/flaky")).unwrap();

        let transport = Arc::new(ScriptedTransport::new("/flaky", || DeliveryError::Busy {
            status: 503,
        }));
        let mut config = fast_config();
        config.lifetime_attempts = 3;
        let worker = worker_with(storage.clone(), transport, config);

        // Three failed drains reach the ceiling
        worker.drain().await;
        worker.drain().await;
        assert_eq!(storage.pending_count().unwrap(), 1);

        let outcome = worker.drain().await;
        assert_eq!(
            outcome,
            DrainOutcome::Completed(DrainReport {
                attempted: 1,
                delivered: 0,
                retained: 0,
                dead_lettered: 1,
            })
        );
        assert_eq!(storage.pending_count().unwrap(), 0);

        let dead = storage.dead_letters().unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].request.attempts, 3);
    }

    /// Transport that parks until released (for exclusion tests)
    struct ParkedTransport {
        entered: Notify,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl ReplayTransport for ParkedTransport {
        async fn deliver(
            &self,
            _request: &QueuedRequest,
        ) -> Result<DeliveryReceipt, DeliveryError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(DeliveryReceipt {
                status: 200,
                body: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_concurrent_drain_is_a_noop() {
        let storage = QueueStorage::open_in_memory().unwrap();
        storage.enqueue(request("https://ledger/a")).unwrap();

        let transport = Arc::new(ParkedTransport {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let worker = worker_with(storage.clone(), transport.clone(), fast_config());

        let first = tokio::spawn({
            let worker = worker.clone();
            async move { worker.drain().await }
        });

        // Wait until the first drain is inside the transport
        transport.entered.notified().await;

        // Second call must return immediately without delivering anything
        let second = worker.drain().await;
        assert_eq!(second, DrainOutcome::AlreadyRunning);

        transport.release.notify_one();
        let first = first.await.unwrap();
        assert_eq!(
            first,
            DrainOutcome::Completed(DrainReport {
                attempted: 1,
                delivered: 1,
                retained: 0,
                dead_lettered: 0,
            })
        );
        assert_eq!(storage.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_observer_fires_on_delivery() {
        struct CountingObserver(AtomicU32);

        #[async_trait::async_trait]
        impl DeliveryObserver for CountingObserver {
            async fn delivered(&self, _request: &QueuedRequest, receipt: &DeliveryReceipt) {
                assert_eq!(receipt.status, 200);
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let storage = QueueStorage::open_in_memory().unwrap();
        storage.enqueue(request("https://ledger/a")).unwrap();
        storage.enqueue(request("https://ledger/b")).unwrap();

        let observer = Arc::new(CountingObserver(AtomicU32::new(0)));
        let worker = Arc::new(DrainWorker::new(
            storage,
            Arc::new(ScriptedTransport::new("", || unreachable!())),
            observer.clone(),
            fast_config(),
            CancellationToken::new(),
        ));

        worker.drain().await;
        assert_eq!(observer.0.load(Ordering::SeqCst), 2);
    }
}
