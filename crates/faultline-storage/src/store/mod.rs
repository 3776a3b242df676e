use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};

use crate::error::Result;

pub mod event;
pub mod process;
pub mod silence;
pub mod target;
pub mod webhook;

// ---- 公开 Row 类型（从各子模块重新导出）----
pub use event::{ActiveEventRow, AlertHistoryFilter, AlertHistoryRow};
pub use process::{ProcessOperationLogRow, ProcessTraceRow, ProcessTraceStats};
pub use silence::{SilenceFilter, SilenceRow, SilenceUpdate};
pub use target::{NotificationTargetFilter, NotificationTargetRow, NotificationTargetUpdate};
pub use webhook::{
    ThirdPartyAlertRow, ThirdPartyWebhookFilter, ThirdPartyWebhookRow, ThirdPartyWebhookUpdate,
};

/// 管理数据库（faultline.db）的统一访问层。
///
/// 所有方法均为 `async fn`，底层使用 SeaORM + SQLite（可通过连接 URL
/// 切换到其他数据库）。内存中的活跃事件缓存与静默集合以此为镜像，
/// 重启后从这里恢复。
pub struct AlertStore {
    pub(crate) db: DatabaseConnection,
}

impl AlertStore {
    /// 连接并初始化数据库。
    ///
    /// - `db_url`：完整的数据库连接 URL，由调用方（服务器配置）提供。
    ///   SQLite 示例：`sqlite:///data/faultline.db?mode=rwc`
    ///
    /// 自动运行 `sea-orm-migration` 迁移，确保 Schema 最新。
    pub async fn new(db_url: &str) -> Result<Self> {
        let db = Database::connect(db_url).await?;

        // WAL 模式仅对 SQLite 有效
        if db_url.starts_with("sqlite://") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        // 运行所有待执行迁移
        Migrator::up(&db, None).await?;

        tracing::info!(db_url = %db_url, "Initialized alert store (SeaORM)");

        Ok(Self { db })
    }

    /// 返回底层数据库连接引用（供子模块使用）。
    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}
