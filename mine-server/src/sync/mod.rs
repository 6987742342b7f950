//! Offline resilience layer — durable request queue, retry, drain
//!
//! # Architecture
//!
//! ```text
//! anchor attempt fails transiently
//!   └─ QueueStorage::enqueue() → redb (pending_requests 表)
//!
//! connectivity restored / timer / operator
//!   └─ DrainWorker::drain() → retry::execute() → ReplayTransport
//!        ├─ confirmed success  → remove + DeliveryObserver
//!        ├─ transient failure  → attempts+1, stays queued
//!        └─ permanent / ceiling → dead_letter 表
//! ```
//!
//! At-least-once: a request leaves the pending queue only on confirmed
//! delivery or an explicit dead-letter decision, never silently.

pub mod retry;
pub mod storage;
pub mod transport;
pub mod worker;

pub use retry::RetryPolicy;
pub use storage::{
    DeadLetterEntry, NewQueuedRequest, QueueStorage, QueueStorageError, QueuedRequest,
};
pub use transport::{DeliveryError, DeliveryReceipt, HttpReplayTransport, ReplayTransport};
pub use worker::{
    DeliveryObserver, DrainConfig, DrainOutcome, DrainReport, DrainSignal, DrainWorker,
    NoopObserver,
};
