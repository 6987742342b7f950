//! 审计日志 SurrealDB 存储层
//!
//! Append-only 设计，没有任何删除/更新接口。
//! 唯一性约束：每个 (record_id, data_hash) 至多一条记录 —
//! 重复锚定同一内容不产生重复条目。

use std::sync::Arc;
use surrealdb::Surreal;
use surrealdb::engine::local::Db;
use thiserror::Error;

use super::types::{AnchorVerification, AuditLogEntry, AuditQuery, RecordType};

/// 存储错误
#[derive(Debug, Error)]
pub enum AuditStorageError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Anchor already exists: record_id={record_id}, data_hash={data_hash}")]
    Duplicate { record_id: String, data_hash: String },
}

impl From<surrealdb::Error> for AuditStorageError {
    fn from(err: surrealdb::Error) -> Self {
        AuditStorageError::Database(err.to_string())
    }
}

pub type AuditStorageResult<T> = Result<T, AuditStorageError>;

impl From<AuditStorageError> for shared::error::AppError {
    fn from(err: AuditStorageError) -> Self {
        match err {
            AuditStorageError::Duplicate { record_id, .. } => shared::error::AppError::new(
                shared::error::ErrorCode::AnchorDuplicate,
            )
            .with_detail("record_id", record_id),
            other => shared::error::AppError::database(other.to_string()),
        }
    }
}

/// SurrealDB 反序列化用（包含 SurrealDB record id）
#[derive(Debug, Clone, serde::Deserialize)]
struct AuditRecord {
    #[allow(dead_code)]
    id: surrealdb::RecordId,
    record_type: RecordType,
    record_id: String,
    data_hash: String,
    ledger_transaction_id: String,
    timestamp: i64,
}

impl From<AuditRecord> for AuditLogEntry {
    fn from(r: AuditRecord) -> Self {
        AuditLogEntry {
            record_type: r.record_type,
            record_id: r.record_id,
            data_hash: r.data_hash,
            ledger_transaction_id: r.ledger_transaction_id,
            timestamp: r.timestamp,
        }
    }
}

/// 插入用结构（不含 SurrealDB id）
#[derive(Debug, serde::Serialize)]
struct AuditInsert {
    record_type: RecordType,
    record_id: String,
    data_hash: String,
    ledger_transaction_id: String,
    timestamp: i64,
}

/// COUNT 结果
#[derive(Debug, serde::Deserialize)]
struct CountResult {
    total: u64,
}

/// 审计日志存储 (SurrealDB)
///
/// Append-only 设计：
/// - 仅提供 `insert` 和查询方法
/// - 没有 delete/update 接口
/// - (record_id, data_hash) 唯一性由 insert 前置检查 + append 锁保证
#[derive(Clone)]
pub struct AuditStorage {
    db: Surreal<Db>,
    /// 序列化所有 insert 操作，防止 check-then-create 竞争
    append_lock: Arc<tokio::sync::Mutex<()>>,
}

impl AuditStorage {
    pub fn new(db: Surreal<Db>) -> Self {
        Self {
            db,
            append_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// 插入一条审计日志
    ///
    /// 同一 (record_id, data_hash) 已存在时返回 [`AuditStorageError::Duplicate`]。
    pub async fn insert(
        &self,
        record_type: RecordType,
        record_id: String,
        data_hash: String,
        ledger_transaction_id: String,
    ) -> AuditStorageResult<AuditLogEntry> {
        // 序列化：防止并发 insert 绕过唯一性检查
        let _guard = self.append_lock.lock().await;

        if self.find_entry(&record_id, &data_hash).await?.is_some() {
            return Err(AuditStorageError::Duplicate {
                record_id,
                data_hash,
            });
        }

        let timestamp = shared::util::now_millis();
        let entry = AuditLogEntry {
            record_type,
            record_id: record_id.clone(),
            data_hash: data_hash.clone(),
            ledger_transaction_id: ledger_transaction_id.clone(),
            timestamp,
        };

        let insert = AuditInsert {
            record_type,
            record_id,
            data_hash,
            ledger_transaction_id,
            timestamp,
        };

        // bind 需要 'static，传 owned
        let mut res = self
            .db
            .query("CREATE audit_log CONTENT $data")
            .bind(("data", insert))
            .await?;
        let _: Vec<AuditRecord> = res.take(0)?;

        Ok(entry)
    }

    /// 查找指定 (record_id, data_hash) 的条目（幂等检查用）
    pub async fn find_entry(
        &self,
        record_id: &str,
        data_hash: &str,
    ) -> AuditStorageResult<Option<AuditLogEntry>> {
        let mut res = self
            .db
            .query("SELECT * FROM audit_log WHERE record_id = $record_id AND data_hash = $data_hash LIMIT 1")
            .bind(("record_id", record_id.to_string()))
            .bind(("data_hash", data_hash.to_string()))
            .await?;
        let records: Vec<AuditRecord> = res.take(0)?;
        Ok(records.into_iter().next().map(AuditLogEntry::from))
    }

    /// 查询某记录的完整锚定历史（最旧在前）
    ///
    /// 用于"该记录是否曾经等于内容 X"类验证。
    pub async fn find_by_record(
        &self,
        record_id: &str,
    ) -> AuditStorageResult<Vec<AuditLogEntry>> {
        let mut res = self
            .db
            .query("SELECT * FROM audit_log WHERE record_id = $record_id ORDER BY timestamp ASC")
            .bind(("record_id", record_id.to_string()))
            .await?;
        let records: Vec<AuditRecord> = res.take(0)?;
        Ok(records.into_iter().map(AuditLogEntry::from).collect())
    }

    /// 最近一次锚定的条目
    ///
    /// 嵌入式 SDK 的 ORDER BY + LIMIT 组合在部分版本会丢记录，
    /// 验证路径不能容忍：取完整历史在内存中选最后一条（单记录历史很短）。
    pub async fn latest_for_record(
        &self,
        record_id: &str,
    ) -> AuditStorageResult<Option<AuditLogEntry>> {
        let mut history = self.find_by_record(record_id).await?;
        Ok(history.pop())
    }

    /// 验证当前哈希是否与最近锚定的哈希一致
    ///
    /// 不匹配意味着篡改或修改后未重新锚定；结果始终携带锚定侧数据。
    pub async fn verify(
        &self,
        record_id: &str,
        current_hash: &str,
    ) -> AuditStorageResult<AnchorVerification> {
        let latest = self.latest_for_record(record_id).await?;

        Ok(match latest {
            Some(entry) => AnchorVerification {
                record_id: record_id.to_string(),
                current_hash: current_hash.to_string(),
                verified: entry.data_hash == current_hash,
                anchored_hash: Some(entry.data_hash),
                ledger_transaction_id: Some(entry.ledger_transaction_id),
                anchored_at: Some(entry.timestamp),
            },
            None => AnchorVerification {
                record_id: record_id.to_string(),
                current_hash: current_hash.to_string(),
                verified: false,
                anchored_hash: None,
                ledger_transaction_id: None,
                anchored_at: None,
            },
        })
    }

    /// 查询审计日志（分页 + 过滤）
    pub async fn query(
        &self,
        q: &AuditQuery,
    ) -> AuditStorageResult<(Vec<AuditLogEntry>, u64)> {
        let mut conditions = Vec::new();

        if q.from.is_some() {
            conditions.push("timestamp >= $from");
        }
        if q.to.is_some() {
            conditions.push("timestamp <= $to");
        }
        if q.record_type.is_some() {
            conditions.push("record_type = $record_type");
        }
        if q.record_id.is_some() {
            conditions.push("record_id = $record_id");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!(
            "SELECT count() as total FROM audit_log{} GROUP ALL",
            where_clause
        );
        let select_sql = format!(
            "SELECT * FROM audit_log{} ORDER BY timestamp DESC LIMIT {} START {}",
            where_clause, q.limit, q.offset
        );
        let sql = format!("{}; {}", count_sql, select_sql);

        let mut qb = self.db.query(&sql);

        if let Some(from) = q.from {
            qb = qb.bind(("from", from));
        }
        if let Some(to) = q.to {
            qb = qb.bind(("to", to));
        }
        if let Some(record_type) = q.record_type {
            qb = qb.bind(("record_type", record_type.as_str()));
        }
        if let Some(ref record_id) = q.record_id {
            qb = qb.bind(("record_id", record_id.clone()));
        }

        let mut result = qb.await?;

        let count_result: Vec<CountResult> = result.take(0)?;
        let total = count_result.first().map(|c| c.total).unwrap_or(0);

        let records: Vec<AuditRecord> = result.take(1)?;
        let entries = records.into_iter().map(AuditLogEntry::from).collect();

        Ok((entries, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surrealdb::engine::local::RocksDb;

    async fn test_storage() -> (AuditStorage, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let db: Surreal<Db> = Surreal::new::<RocksDb>(tmp.path()).await.unwrap();
        db.use_ns("test").use_db("test").await.unwrap();
        (AuditStorage::new(db), tmp)
    }

    fn hash(tag: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(tag.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    #[tokio::test]
    async fn test_insert_and_find_entry() {
        let (storage, _tmp) = test_storage().await;

        let entry = storage
            .insert(
                RecordType::Incident,
                "incident:1".into(),
                hash("v1"),
                "tx-001".into(),
            )
            .await
            .unwrap();
        assert_eq!(entry.ledger_transaction_id, "tx-001");

        let found = storage.find_entry("incident:1", &hash("v1")).await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().ledger_transaction_id, "tx-001");

        let missing = storage.find_entry("incident:1", &hash("v2")).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let (storage, _tmp) = test_storage().await;

        storage
            .insert(
                RecordType::Incident,
                "incident:1".into(),
                hash("v1"),
                "tx-001".into(),
            )
            .await
            .unwrap();

        let err = storage
            .insert(
                RecordType::Incident,
                "incident:1".into(),
                hash("v1"),
                "tx-002".into(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuditStorageError::Duplicate { .. }));

        // 同记录不同哈希可以追加（修改后重新锚定）
        storage
            .insert(
                RecordType::Incident,
                "incident:1".into(),
                hash("v2"),
                "tx-003".into(),
            )
            .await
            .unwrap();

        let history = storage.find_by_record("incident:1").await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_history_is_oldest_first() {
        let (storage, _tmp) = test_storage().await;

        for (i, tag) in ["v1", "v2", "v3"].iter().enumerate() {
            storage
                .insert(
                    RecordType::SensorReading,
                    "reading:7".into(),
                    hash(tag),
                    format!("tx-{i}"),
                )
                .await
                .unwrap();
            // timestamp 毫秒粒度，确保顺序可区分
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let history = storage.find_by_record("reading:7").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].ledger_transaction_id, "tx-0");
        assert_eq!(history[2].ledger_transaction_id, "tx-2");
        assert!(history[0].timestamp <= history[2].timestamp);
    }

    #[tokio::test]
    async fn test_verify_matches_latest_only() {
        let (storage, _tmp) = test_storage().await;

        storage
            .insert(
                RecordType::EmissionData,
                "emission:3".into(),
                hash("old"),
                "tx-old".into(),
            )
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        storage
            .insert(
                RecordType::EmissionData,
                "emission:3".into(),
                hash("new"),
                "tx-new".into(),
            )
            .await
            .unwrap();

        let ok = storage.verify("emission:3", &hash("new")).await.unwrap();
        assert!(ok.verified);
        assert_eq!(ok.ledger_transaction_id.as_deref(), Some("tx-new"));

        // 旧哈希不再通过验证 — 只有最近一次锚定有效
        let stale = storage.verify("emission:3", &hash("old")).await.unwrap();
        assert!(!stale.verified);
        assert_eq!(stale.anchored_hash, Some(hash("new")));

        // 从未锚定的记录
        let unknown = storage.verify("emission:99", &hash("x")).await.unwrap();
        assert!(!unknown.verified);
        assert!(unknown.anchored_hash.is_none());
    }

    #[tokio::test]
    async fn test_query_filters_and_pagination() {
        let (storage, _tmp) = test_storage().await;

        for i in 0..5 {
            storage
                .insert(
                    RecordType::Incident,
                    format!("incident:{i}"),
                    hash(&format!("v{i}")),
                    format!("tx-{i}"),
                )
                .await
                .unwrap();
        }
        storage
            .insert(
                RecordType::SensorReading,
                "reading:1".into(),
                hash("r1"),
                "tx-r1".into(),
            )
            .await
            .unwrap();

        let q = AuditQuery {
            from: None,
            to: None,
            record_type: Some(RecordType::Incident),
            record_id: None,
            offset: 0,
            limit: 3,
        };
        let (items, total) = storage.query(&q).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|e| e.record_type == RecordType::Incident));
    }
}
