//! redb-based storage for the offline request queue
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `pending_requests` | `id` (u64) | `QueuedRequest` | FIFO replay queue |
//! | `dead_letter` | `id` (u64) | `DeadLetterEntry` | Requests past the attempt ceiling |
//! | `sequence_counter` | `()` | `u64` | Monotonic id assignment |
//!
//! # Durability
//!
//! redb commits are persistent as soon as `commit()` returns (copy-on-write
//! with atomic pointer swap), so enqueue and per-item removal are atomic and
//! the queue survives power loss at remote mine sites. A request is removed
//! if and only if its delivery was confirmed; everything else stays queued.

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Table for pending requests: key = id, value = JSON-serialized QueuedRequest
const PENDING_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("pending_requests");

/// Table for dead letters: key = id, value = JSON-serialized DeadLetterEntry
const DEAD_LETTER_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("dead_letter");

/// Table for the id counter: key = "seq", value = u64
const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_counter");

const SEQUENCE_KEY: &str = "seq";

/// A queued network operation awaiting replay
///
/// `id` doubles as the FIFO position: ids are assigned from a monotonic
/// counter and redb iterates u64 keys in ascending order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub id: u64,
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    #[serde(with = "base64_bytes")]
    pub body: Vec<u8>,
    /// Lifetime delivery attempts so far
    pub attempts: u32,
    /// Creation time (Unix millis)
    pub enqueued_at: i64,
    pub last_error: Option<String>,
}

/// Payload for enqueueing (id and bookkeeping assigned by the store)
#[derive(Debug, Clone)]
pub struct NewQueuedRequest {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// A request removed from normal retry flow, held for inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub request: QueuedRequest,
    pub failed_at: i64,
    pub last_error: String,
}

/// Storage errors
#[derive(Debug, Error)]
pub enum QueueStorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queued request not found: {0}")]
    EntryNotFound(u64),
}

pub type QueueStorageResult<T> = Result<T, QueueStorageError>;

impl From<QueueStorageError> for shared::error::AppError {
    fn from(err: QueueStorageError) -> Self {
        match err {
            QueueStorageError::EntryNotFound(id) => {
                shared::error::AppError::new(shared::error::ErrorCode::QueueEntryNotFound)
                    .with_detail("id", id)
            }
            other => shared::error::AppError::with_message(
                shared::error::ErrorCode::QueueStorageFailed,
                other.to_string(),
            ),
        }
    }
}

/// Offline request queue backed by redb
#[derive(Clone)]
pub struct QueueStorage {
    db: Arc<Database>,
}

impl QueueStorage {
    /// Open or create the queue database at the given path
    pub fn open(path: impl AsRef<Path>) -> QueueStorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> QueueStorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> QueueStorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PENDING_TABLE)?;
            let _ = write_txn.open_table(DEAD_LETTER_TABLE)?;
            let mut seq_table = write_txn.open_table(SEQUENCE_TABLE)?;
            if seq_table.get(SEQUENCE_KEY)?.is_none() {
                seq_table.insert(SEQUENCE_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========== Pending Queue ==========

    /// Append a request to the queue (local write only, never blocks on network)
    pub fn enqueue(&self, new: NewQueuedRequest) -> QueueStorageResult<QueuedRequest> {
        let txn = self.db.begin_write()?;
        let request = {
            let mut seq_table = txn.open_table(SEQUENCE_TABLE)?;
            let current = seq_table
                .get(SEQUENCE_KEY)?
                .map(|g| g.value())
                .unwrap_or(0);
            let id = current + 1;
            seq_table.insert(SEQUENCE_KEY, id)?;
            drop(seq_table);

            let request = QueuedRequest {
                id,
                url: new.url,
                method: new.method,
                headers: new.headers,
                body: new.body,
                attempts: 0,
                enqueued_at: shared::util::now_millis(),
                last_error: None,
            };

            let mut table = txn.open_table(PENDING_TABLE)?;
            let value = serde_json::to_vec(&request)?;
            table.insert(id, value.as_slice())?;
            request
        };
        txn.commit()?;

        tracing::debug!(id = request.id, url = %request.url, "Request enqueued for replay");
        Ok(request)
    }

    /// All pending requests in FIFO order
    pub fn pending(&self) -> QueueStorageResult<Vec<QueuedRequest>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PENDING_TABLE)?;

        let mut entries = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let request: QueuedRequest = serde_json::from_slice(value.value())?;
            entries.push(request);
        }
        Ok(entries)
    }

    /// Number of pending requests
    pub fn pending_count(&self) -> QueueStorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PENDING_TABLE)?;
        Ok(table.len()?)
    }

    /// Remove a delivered request (confirmed success only)
    pub fn remove(&self, id: u64) -> QueueStorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(PENDING_TABLE)?;
            table.remove(id)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Mark a delivery attempt as failed: attempts += 1, record the error
    ///
    /// Returns the updated request so the caller can check the attempt
    /// ceiling. `None` if the request is no longer queued.
    pub fn mark_failed(
        &self,
        id: u64,
        error: &str,
    ) -> QueueStorageResult<Option<QueuedRequest>> {
        let txn = self.db.begin_write()?;
        let updated = {
            let mut table = txn.open_table(PENDING_TABLE)?;

            // Read and clone first to avoid borrow conflict
            let request_opt = if let Some(value) = table.get(id)? {
                let request: QueuedRequest = serde_json::from_slice(value.value())?;
                Some(request)
            } else {
                None
            };

            match request_opt {
                Some(mut request) => {
                    request.attempts += 1;
                    request.last_error = Some(error.to_string());
                    let new_value = serde_json::to_vec(&request)?;
                    table.insert(id, new_value.as_slice())?;
                    Some(request)
                }
                None => None,
            }
        };
        txn.commit()?;
        Ok(updated)
    }

    // ========== Dead Letter Queue ==========

    /// Move a request from the pending queue to the dead letter table
    pub fn move_to_dead_letter(&self, id: u64, error: &str) -> QueueStorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut pending_table = txn.open_table(PENDING_TABLE)?;
            let mut dead_letter_table = txn.open_table(DEAD_LETTER_TABLE)?;

            let request_opt = if let Some(value) = pending_table.get(id)? {
                let request: QueuedRequest = serde_json::from_slice(value.value())?;
                Some(request)
            } else {
                None
            };

            if let Some(request) = request_opt {
                let dead_letter = DeadLetterEntry {
                    request,
                    failed_at: shared::util::now_millis(),
                    last_error: error.to_string(),
                };
                let value = serde_json::to_vec(&dead_letter)?;
                dead_letter_table.insert(id, value.as_slice())?;
                pending_table.remove(id)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// All dead letter entries
    pub fn dead_letters(&self) -> QueueStorageResult<Vec<DeadLetterEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEAD_LETTER_TABLE)?;

        let mut entries = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let entry: DeadLetterEntry = serde_json::from_slice(value.value())?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Move all dead letter entries back to the pending queue (attempts reset)
    ///
    /// Operator action after fixing the downstream cause (e.g. gateway
    /// misconfiguration); returns the number of recovered requests.
    pub fn recover_dead_letters(&self) -> QueueStorageResult<usize> {
        let txn = self.db.begin_write()?;
        let count = {
            let mut pending_table = txn.open_table(PENDING_TABLE)?;
            let mut dead_letter_table = txn.open_table(DEAD_LETTER_TABLE)?;

            // Collect first (can't iterate and mutate simultaneously)
            let mut dead: Vec<(u64, DeadLetterEntry)> = Vec::new();
            for result in dead_letter_table.iter()? {
                let (key, value) = result?;
                let entry: DeadLetterEntry = serde_json::from_slice(value.value())?;
                dead.push((key.value(), entry));
            }

            let mut recovered = 0;
            for (id, entry) in dead {
                let mut request = entry.request;
                request.attempts = 0;
                request.last_error = None;
                let value = serde_json::to_vec(&request)?;
                pending_table.insert(id, value.as_slice())?;
                dead_letter_table.remove(id)?;
                recovered += 1;
            }
            recovered
        };
        txn.commit()?;
        Ok(count)
    }
}

/// base64 (de)serialization for request bodies in queue-entry JSON
mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> NewQueuedRequest {
        NewQueuedRequest {
            url: url.to_string(),
            method: "POST".to_string(),
            headers: HashMap::from([("content-type".to_string(), "application/json".to_string())]),
            body: br#"{"data_hash":"abc"}"#.to_vec(),
        }
    }

    #[test]
    fn test_enqueue_assigns_fifo_ids() {
        let storage = QueueStorage::open_in_memory().unwrap();

        let a = storage.enqueue(request("https://ledger/a")).unwrap();
        let b = storage.enqueue(request("https://ledger/b")).unwrap();
        let c = storage.enqueue(request("https://ledger/c")).unwrap();
        assert!(a.id < b.id && b.id < c.id);

        let pending = storage.pending().unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].url, "https://ledger/a");
        assert_eq!(pending[2].url, "https://ledger/c");
        assert_eq!(pending[0].attempts, 0);
    }

    #[test]
    fn test_body_roundtrips_through_base64() {
        let storage = QueueStorage::open_in_memory().unwrap();
        let mut new = request("https://ledger/a");
        new.body = vec![0u8, 159, 146, 150]; // not valid UTF-8

        let queued = storage.enqueue(new).unwrap();
        let pending = storage.pending().unwrap();
        assert_eq!(pending[0].body, queued.body);
    }

    #[test]
    fn test_remove_only_the_delivered_entry() {
        let storage = QueueStorage::open_in_memory().unwrap();
        let a = storage.enqueue(request("https://ledger/a")).unwrap();
        let _b = storage.enqueue(request("https://ledger/b")).unwrap();

        storage.remove(a.id).unwrap();

        let pending = storage.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, "https://ledger/b");
    }

    #[test]
    fn test_mark_failed_increments_attempts() {
        let storage = QueueStorage::open_in_memory().unwrap();
        let a = storage.enqueue(request("https://ledger/a")).unwrap();

        let updated = storage.mark_failed(a.id, "HTTP 500").unwrap().unwrap();
        assert_eq!(updated.attempts, 1);
        assert_eq!(updated.last_error.as_deref(), Some("HTTP 500"));

        let updated = storage.mark_failed(a.id, "HTTP 503").unwrap().unwrap();
        assert_eq!(updated.attempts, 2);

        // Still queued — failure never drops a request
        assert_eq!(storage.pending_count().unwrap(), 1);

        // Unknown id is a no-op
        assert!(storage.mark_failed(9999, "x").unwrap().is_none());
    }

    #[test]
    fn test_dead_letter_flow() {
        let storage = QueueStorage::open_in_memory().unwrap();
        let a = storage.enqueue(request("https://ledger/a")).unwrap();
        storage.mark_failed(a.id, "HTTP 400").unwrap();

        storage.move_to_dead_letter(a.id, "HTTP 400").unwrap();
        assert_eq!(storage.pending_count().unwrap(), 0);

        let dead = storage.dead_letters().unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].last_error, "HTTP 400");
        assert_eq!(dead[0].request.attempts, 1);

        // Recovery resets attempts and requeues
        let recovered = storage.recover_dead_letters().unwrap();
        assert_eq!(recovered, 1);
        assert!(storage.dead_letters().unwrap().is_empty());

        let pending = storage.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 0);
        assert!(pending[0].last_error.is_none());
    }

    #[test]
    fn test_queue_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("queue.redb");

        {
            let storage = QueueStorage::open(&path).unwrap();
            storage.enqueue(request("https://ledger/a")).unwrap();
            storage.enqueue(request("https://ledger/b")).unwrap();
            storage.enqueue(request("https://ledger/c")).unwrap();
        }

        // Simulated restart
        let storage = QueueStorage::open(&path).unwrap();
        let pending = storage.pending().unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].url, "https://ledger/a");

        // Ids keep increasing after reopen
        let d = storage.enqueue(request("https://ledger/d")).unwrap();
        assert!(d.id > pending[2].id);
    }
}
