use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, RocksDb};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::audit::{AnchorRequest, AnchorWorker, AuditService, AuditStorage};
use crate::core::Config;
use crate::ledger::{HttpLedgerApi, LedgerAnchorClient};
use crate::sync::{DrainSignal, DrainWorker, HttpReplayTransport, QueueStorage};
use crate::utils::{AppError, AppResult};

/// 服务器状态 - 持有所有服务的单例引用
///
/// ServerState 是矿区节点的核心数据结构，持有所有服务的共享引用。
/// 使用 Arc 实现浅拷贝，所有权成本极低。
///
/// # 服务组件
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | db | Surreal<Db> | 嵌入式数据库（审计日志） |
/// | audit_service | Arc<AuditService> | 锚定流水线 |
/// | queue | QueueStorage | 离线请求队列 (redb) |
/// | drain_worker | Arc<DrainWorker> | 队列排空 worker |
/// | shutdown | CancellationToken | 关机信号 |
#[derive(Clone)]
pub struct ServerState {
    /// 服务器配置
    pub config: Config,
    /// 嵌入式数据库 (SurrealDB)
    pub db: Surreal<Db>,
    /// 锚定流水线服务
    pub audit_service: Arc<AuditService>,
    /// 离线请求队列
    pub queue: QueueStorage,
    /// 队列排空 worker
    pub drain_worker: Arc<DrainWorker>,
    /// 排空触发通道
    drain_tx: mpsc::Sender<DrainSignal>,
    /// 关机信号
    pub shutdown: CancellationToken,

    // 后台任务接收端，start_background_tasks 取走
    anchor_rx: Arc<StdMutex<Option<mpsc::Receiver<AnchorRequest>>>>,
    drain_rx: Arc<StdMutex<Option<mpsc::Receiver<DrainSignal>>>>,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 打开审计库和离线队列，装配锚定流水线。
    /// 后台任务由 [`start_background_tasks`](Self::start_background_tasks) 启动。
    pub async fn initialize(config: &Config) -> AppResult<Self> {
        let work_dir = Path::new(&config.work_dir);
        std::fs::create_dir_all(work_dir)
            .map_err(|e| AppError::internal(format!("Failed to create work dir: {e}")))?;

        // 审计日志库 (SurrealDB/RocksDB)
        let db: Surreal<Db> = Surreal::new::<RocksDb>(work_dir.join("audit.db"))
            .await
            .map_err(|e| AppError::database(format!("Failed to open audit database: {e}")))?;
        db.use_ns("mine")
            .use_db("audit")
            .await
            .map_err(|e| AppError::database(e.to_string()))?;
        let audit_storage = AuditStorage::new(db.clone());

        // 离线请求队列 (redb)
        let queue = QueueStorage::open(work_dir.join("queue.redb"))
            .map_err(|e| AppError::internal(format!("Failed to open offline queue: {e}")))?;

        // 账本网关客户端
        let ledger_api = Arc::new(
            HttpLedgerApi::new(config.ledger_gateway_url.clone(), config.ledger_timeout())
                .map_err(|e| AppError::internal(format!("Failed to build ledger client: {e}")))?,
        );
        let anchor_client = LedgerAnchorClient::new(
            ledger_api.clone(),
            audit_storage.clone(),
            config.retry_policy(),
        );

        let (audit_service, anchor_rx) = AuditService::new(
            audit_storage,
            anchor_client,
            queue.clone(),
            ledger_api,
            config.anchor_buffer_size,
        );

        // 排空 worker：投递成功后由 AuditService 补写审计日志
        let shutdown = CancellationToken::new();
        let transport = Arc::new(
            HttpReplayTransport::new(config.ledger_timeout())
                .map_err(|e| AppError::internal(format!("Failed to build transport: {e}")))?,
        );
        let drain_worker = Arc::new(DrainWorker::new(
            queue.clone(),
            transport,
            audit_service.clone(),
            config.drain_config(),
            shutdown.clone(),
        ));

        let (drain_tx, drain_rx) = mpsc::channel(8);

        Ok(Self {
            config: config.clone(),
            db,
            audit_service,
            queue,
            drain_worker,
            drain_tx,
            shutdown,
            anchor_rx: Arc::new(StdMutex::new(Some(anchor_rx))),
            drain_rx: Arc::new(StdMutex::new(Some(drain_rx))),
        })
    }

    /// 启动后台任务（锚定 worker + 排空 worker）
    ///
    /// 只能调用一次；重复调用是 no-op。
    pub fn start_background_tasks(&self) {
        if let Some(anchor_rx) = self.anchor_rx.lock().expect("anchor_rx lock poisoned").take() {
            let worker = AnchorWorker::new(self.audit_service.clone());
            tokio::spawn(worker.run(anchor_rx));
        }

        if let Some(drain_rx) = self.drain_rx.lock().expect("drain_rx lock poisoned").take() {
            let worker = self.drain_worker.clone();
            tokio::spawn(worker.run(drain_rx));
        }
    }

    /// 触发一次排空（非阻塞）
    ///
    /// 通道满说明已有排空在等待，丢弃信号是安全的。
    pub fn trigger_drain(&self, signal: DrainSignal) {
        if let Err(e) = self.drain_tx.try_send(signal) {
            tracing::debug!("Drain trigger dropped: {e}");
        }
    }
}
