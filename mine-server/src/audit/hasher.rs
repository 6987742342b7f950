//! 规范化哈希 — 领域记录的确定性指纹
//!
//! 同一逻辑内容必须得到同一哈希，与字段插入顺序、对象键顺序、
//! 数值表示（`5` vs `5.0`）无关；任何语义变化必须改变哈希。
//!
//! 规范形式：
//! - 对象键递归排序（字节序）
//! - 无小数部分且 |value| ≤ 2^53 的浮点数折叠为整数
//! - 无多余空白，UTF-8，serde_json 字符串转义
//!
//! 哈希算法为 SHA256，输出小写 hex。纯函数，无副作用。

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// 哈希错误
#[derive(Debug, Error)]
pub enum HashError {
    #[error("record payload could not be encoded: {0}")]
    Encoding(String),
}

/// f64 可精确表示的最大整数绝对值 (2^53)
const MAX_SAFE_INT: f64 = (1_i64 << 53) as f64;

/// 计算记录内容的规范 SHA256 哈希（小写 hex）
pub fn canonical_hash<T: Serialize>(record: &T) -> Result<String, HashError> {
    let value = serde_json::to_value(record).map_err(|e| HashError::Encoding(e.to_string()))?;
    let mut canonical = String::new();
    write_canonical(&value, &mut canonical)?;

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// 检查字符串是否为合法的 SHA256 摘要（64 个小写 hex 字符）
pub fn is_well_formed_digest(hash: &str) -> bool {
    hash.len() == 64 && hash.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// 递归写出规范 JSON
///
/// 不依赖 serde_json Map 的迭代顺序（preserve_order feature 会改变它），
/// 始终显式排序对象键。
fn write_canonical(value: &Value, out: &mut String) -> Result<(), HashError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&canonical_number(n)),
        Value::String(s) => {
            let escaped =
                serde_json::to_string(s).map_err(|e| HashError::Encoding(e.to_string()))?;
            out.push_str(&escaped);
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let escaped =
                    serde_json::to_string(key).map_err(|e| HashError::Encoding(e.to_string()))?;
                out.push_str(&escaped);
                out.push(':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

/// 数值规范化 — 无小数部分的浮点数折叠为整数形式
///
/// 消除存储引擎数值精度漂移：`5.0` 与 `5` 哈希一致。
/// 仅 |value| ≤ 2^53 的整数可无损转换（f64 尾数 52 bit）。
fn canonical_number(n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    if let Some(f) = n.as_f64()
        && f.fract() == 0.0
        && f.abs() <= MAX_SAFE_INT
    {
        return (f as i64).to_string();
    }
    n.to_string()
}
