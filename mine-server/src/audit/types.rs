//! 审计日志类型定义
//!
//! 锚定审计追踪的核心数据结构。
//! 所有条目不可变、不可删除：每条记录将领域数据的规范哈希
//! 与外部账本上的交易 ID 绑定。

use serde::{Deserialize, Serialize};

/// 可锚定的记录类型（枚举，非自由文本）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// 安全事故记录
    Incident,
    /// 传感器读数
    SensorReading,
    /// 碳排放记录
    EmissionData,
}

impl RecordType {
    /// 稳定的字符串标识（与 serde snake_case 一致）
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incident => "incident",
            Self::SensorReading => "sensor_reading",
            Self::EmissionData => "emission_data",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 审计日志条目（不可变）
///
/// 每条记录对应一次成功的账本锚定：
/// - `data_hash`: 锚定时记录内容的规范 SHA256 哈希
/// - `ledger_transaction_id`: 账本返回的交易 ID
///
/// 同一 `record_id` 的多条条目构成该记录的锚定历史（append-only）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// 记录类型
    pub record_type: RecordType,
    /// 源记录 ID
    pub record_id: String,
    /// 规范序列化内容的 SHA256 哈希（小写 hex）
    pub data_hash: String,
    /// 账本交易 ID（外部不透明标识）
    pub ledger_transaction_id: String,
    /// 锚定时间（Unix 毫秒）
    pub timestamp: i64,
}

/// 审计日志查询参数
#[derive(Debug, Clone, Deserialize)]
pub struct AuditQuery {
    /// 起始时间（Unix 毫秒，含）
    pub from: Option<i64>,
    /// 截止时间（Unix 毫秒，含）
    pub to: Option<i64>,
    /// 记录类型过滤
    pub record_type: Option<RecordType>,
    /// 记录 ID 过滤
    pub record_id: Option<String>,
    /// 分页偏移
    #[serde(default)]
    pub offset: usize,
    /// 分页大小（默认 50）
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// 审计日志列表响应
#[derive(Debug, Serialize)]
pub struct AuditListResponse {
    pub items: Vec<AuditLogEntry>,
    pub total: u64,
}

/// 锚定验证结果
///
/// `verified == true` 当且仅当提供的哈希等于该记录最近一次锚定的哈希。
/// 不匹配意味着记录被篡改，或修改后尚未重新锚定 — 结果始终携带
/// 锚定侧的哈希与交易 ID，便于上报，绝不静默接受。
#[derive(Debug, Clone, Serialize)]
pub struct AnchorVerification {
    pub record_id: String,
    /// 提供的当前哈希
    pub current_hash: String,
    /// 是否与最近锚定的哈希一致
    pub verified: bool,
    /// 最近锚定的哈希（该记录从未锚定时为 None）
    pub anchored_hash: Option<String>,
    /// 对应的账本交易 ID
    pub ledger_transaction_id: Option<String>,
    /// 锚定时间（Unix 毫秒）
    pub anchored_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_serde_matches_as_str() {
        for rt in [
            RecordType::Incident,
            RecordType::SensorReading,
            RecordType::EmissionData,
        ] {
            let json = serde_json::to_string(&rt).unwrap();
            assert_eq!(json, format!("\"{}\"", rt.as_str()));
        }
    }

    #[test]
    fn test_audit_query_defaults() {
        let q: AuditQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.offset, 0);
        assert_eq!(q.limit, 50);
        assert!(q.record_type.is_none());
    }
}
