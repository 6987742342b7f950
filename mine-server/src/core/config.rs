use std::time::Duration;

use crate::sync::{DrainConfig, RetryPolicy};

/// 服务器配置 - 矿区节点的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/mine/server | 工作目录（审计库、离线队列） |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | LEDGER_GATEWAY_URL | http://localhost:3100 | 账本网关地址 |
/// | LEDGER_TIMEOUT_MS | 30000 | 账本请求超时(毫秒) |
/// | RETRY_MAX_ATTEMPTS | 3 | 单次锚定的重试预算 |
/// | RETRY_BASE_DELAY_MS | 1000 | 首次重试延迟(毫秒) |
/// | RETRY_MAX_DELAY_MS | 60000 | 单次延迟上限(毫秒) |
/// | RETRY_JITTER | true | 重试延迟抖动 |
/// | QUEUE_LIFETIME_ATTEMPTS | 10 | 离线队列生命周期尝试上限 |
/// | DRAIN_CONCURRENCY | 4 | 排空并发数 |
/// | DRAIN_SCAN_INTERVAL_SECS | 60 | 排空定时扫描间隔(秒) |
/// | ANCHOR_BUFFER_SIZE | 256 | 异步锚定通道容量 |
/// | ENVIRONMENT | development | 运行环境 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/mine HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储审计库、离线队列、日志等文件
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 账本网关 URL
    pub ledger_gateway_url: String,
    /// 账本请求超时 (毫秒)
    pub ledger_timeout_ms: u64,
    /// 单次锚定的重试预算
    pub retry_max_attempts: u32,
    /// 首次重试延迟 (毫秒)
    pub retry_base_delay_ms: u64,
    /// 单次延迟上限 (毫秒)
    pub retry_max_delay_ms: u64,
    /// 重试延迟抖动
    pub retry_jitter: bool,
    /// 离线队列生命周期尝试上限（超出即移入 dead letter）
    pub queue_lifetime_attempts: u32,
    /// 排空并发数
    pub drain_concurrency: usize,
    /// 排空定时扫描间隔 (秒)
    pub drain_scan_interval_secs: u64,
    /// 异步锚定通道容量
    pub anchor_buffer_size: usize,
    /// 运行环境: development | staging | production
    pub environment: String,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/mine/server".into()),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            ledger_gateway_url: std::env::var("LEDGER_GATEWAY_URL")
                .unwrap_or_else(|_| "http://localhost:3100".into()),
            ledger_timeout_ms: std::env::var("LEDGER_TIMEOUT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(30000),
            retry_max_attempts: std::env::var("RETRY_MAX_ATTEMPTS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3),
            retry_base_delay_ms: std::env::var("RETRY_BASE_DELAY_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(1000),
            retry_max_delay_ms: std::env::var("RETRY_MAX_DELAY_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(60000),
            retry_jitter: std::env::var("RETRY_JITTER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            queue_lifetime_attempts: std::env::var("QUEUE_LIFETIME_ATTEMPTS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(10),
            drain_concurrency: std::env::var("DRAIN_CONCURRENCY")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(4),
            drain_scan_interval_secs: std::env::var("DRAIN_SCAN_INTERVAL_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(60),
            anchor_buffer_size: std::env::var("ANCHOR_BUFFER_SIZE")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(256),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    /// 锚定重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
        .with_max_delay(Duration::from_millis(self.retry_max_delay_ms));
        if self.retry_jitter { policy.with_jitter() } else { policy }
    }

    /// 排空配置
    pub fn drain_config(&self) -> DrainConfig {
        DrainConfig {
            retry: self.retry_policy(),
            lifetime_attempts: self.queue_lifetime_attempts,
            concurrency: self.drain_concurrency,
            scan_interval: Duration::from_secs(self.drain_scan_interval_secs),
        }
    }

    /// 账本请求超时
    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
