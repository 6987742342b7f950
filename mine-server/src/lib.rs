//! Mine Server - 矿区运营审计锚定节点
//!
//! # 架构概述
//!
//! 本模块是矿区节点的主入口，提供以下核心功能：
//!
//! - **审计锚定** (`audit`): 规范哈希 + 外部账本存证 + append-only 审计日志
//! - **账本客户端** (`ledger`): 幂等锚定、瞬时/永久错误分类
//! - **离线韧性** (`sync`): 持久化请求队列、指数退避重试、排空 worker
//! - **HTTP API** (`api`): RESTful API 接口
//!
//! # 模块结构
//!
//! ```text
//! mine-server/src/
//! ├── core/          # 配置、状态、服务器
//! ├── audit/         # 锚定流水线与审计日志
//! ├── ledger/        # 账本网关客户端
//! ├── sync/          # 离线队列、重试、排空
//! ├── api/           # HTTP 路由和处理器
//! └── utils/         # 工具函数
//! ```

pub mod api;
pub mod audit;
pub mod core;
pub mod ledger;
pub mod sync;
pub mod utils;

// Re-export 公共类型
pub use audit::{AnchorOutcome, AuditService, RecordType};
pub use core::{Config, Server, ServerState};
pub use sync::{DrainOutcome, QueueStorage, RetryPolicy};
pub use utils::{AppError, AppResult};

// Re-export unified error types from shared
pub use utils::{ApiResponse, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 设置环境 (dotenv + 日志)
pub fn setup_environment() {
    dotenv::dotenv().ok();
    let log_level = std::env::var("LOG_LEVEL").ok();
    let log_dir = std::env::var("LOG_DIR").ok();
    init_logger_with_file(log_level.as_deref(), log_dir.as_deref());
}

pub fn print_banner() {
    println!(
        r#"
    __  ___
   /  |/  (_)___  ___
  / /|_/ / / __ \/ _ \
 / /  / / / / / /  __/
/_/  /_/_/_/ /_/\___/
   _____
  / ___/___  ______   _____  _____
  \__ \/ _ \/ ___/ | / / _ \/ ___/
 ___/ /  __/ /   | |/ /  __/ /
/____/\___/_/    |___/\___/_/
    "#
    );
}
