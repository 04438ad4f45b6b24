// ==========================================
// 校园设施新风同步系统 - 同步运行日志仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 运行日志仅供运维追溯,管线自身永不读取
// ==========================================

use crate::domain::command::SyncResult;
use crate::domain::types::SyncRunStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// SyncRunLogRepository - 同步运行日志仓储
// ==========================================

/// 同步运行日志仓储
/// 职责: sync_run_log 表的写入
pub struct SyncRunLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SyncRunLogRepository {
    /// 创建新的运行日志仓储实例
    ///
    /// # 参数
    /// - db_path: 校园库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 记录运行开始
    ///
    /// # 参数
    /// - run_id: 本次运行 UUID
    /// - building_id: 楼栋
    /// - term: 学期代码
    /// - trigger_source: 触发源（调度器/操作人）
    /// - config_snapshot_json: 本次运行生效的配置快照
    pub fn log_start(
        &self,
        run_id: &str,
        building_id: &str,
        term: i32,
        trigger_source: Option<&str>,
        config_snapshot_json: &str,
        started_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO sync_run_log (
                run_id, building_id, term, trigger_source, config_snapshot_json,
                started_at, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                run_id,
                building_id,
                term,
                trigger_source,
                config_snapshot_json,
                started_at.to_rfc3339(),
                SyncRunStatus::Running.to_string(),
            ],
        )?;

        Ok(())
    }

    /// 记录运行完成（含失败收尾）
    pub fn log_complete(
        &self,
        run_id: &str,
        result: &SyncResult,
        status: SyncRunStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
        duration_ms: i64,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            UPDATE sync_run_log
            SET processed = ?2,
                skipped = ?3,
                errors = ?4,
                expanded_dates = ?5,
                commands_written = ?6,
                completed_at = ?7,
                duration_ms = ?8,
                status = ?9,
                error_message = ?10
            WHERE run_id = ?1
            "#,
            params![
                run_id,
                result.processed as i64,
                result.skipped as i64,
                result.errors as i64,
                result.expanded_dates as i64,
                result.commands_written as i64,
                completed_at.to_rfc3339(),
                duration_ms,
                status.to_string(),
                error_message,
            ],
        )?;

        Ok(())
    }
}
