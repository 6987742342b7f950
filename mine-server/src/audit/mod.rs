//! 审计锚定模块 — 领域记录的防篡改存证
//!
//! # 架构
//!
//! ```text
//! 领域事件（事故 / 传感器读数 / 排放记录）
//!   ├─ AuditService::anchor_record() — 同步锚定
//!   └─ AuditService::submit() → mpsc → AnchorWorker — 异步锚定
//!
//! 锚定流水线: canonical_hash → LedgerAnchorClient（幂等 + 重试）
//!   ├─ 成功 → AuditStorage (audit_log 表, append-only)
//!   └─ 瞬时失败 → 离线队列 → DrainWorker 排空 → DeliveryObserver 补录
//! ```
//!
//! # 存证保证
//!
//! - **规范哈希**: 键排序 + 数值归一化，内容等价 ⇔ 哈希相等
//! - **幂等锚定**: (record_id, data_hash) 唯一，重复提交零账本写入
//! - **Append-only**: 无删除/更新接口，每条锚定不可变
//! - **验证 API**: 重新计算哈希与锚定值比对，争议可凭账本裁决
pub mod hasher;
pub mod service;
pub mod storage;
pub mod types;
pub mod worker;

pub use hasher::{HashError, canonical_hash, is_well_formed_digest};
pub use service::{AnchorOutcome, AnchorRequest, AuditService};
pub use storage::{AuditStorage, AuditStorageError};
pub use types::{
    AnchorVerification, AuditListResponse, AuditLogEntry, AuditQuery, RecordType,
};
pub use worker::AnchorWorker;
