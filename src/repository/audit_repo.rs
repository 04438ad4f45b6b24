// ==========================================
// 校园设施新风同步系统 - 设定值审计仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 审计表只追加/合并,本系统永不读取;
//       写入失败由调用方降级为日志,不回滚指令写入
// ==========================================

use crate::domain::command::SetpointAudit;
use crate::repository::command_queue_repo::EFFECTIVE_TIME_FORMAT;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// AuditRepository - 设定值审计仓储
// ==========================================

/// 设定值审计仓储
/// 职责: setpoint_audit 表的合并写入
pub struct AuditRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AuditRepository {
    /// 创建新的审计仓储实例
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

    /// 合并写入一条审计记录
    ///
    /// 键: (point_name, effective_time),与指令匹配键一致,
    ///     重复同步同一指令时原位覆盖,不累积重复行
    pub fn upsert_audit(&self, audit: &SetpointAudit) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO setpoint_audit (
                point_name, effective_time, zone_code, facility_id,
                course_title, enrollment_total, value, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(point_name, effective_time) DO UPDATE SET
                zone_code = excluded.zone_code,
                facility_id = excluded.facility_id,
                course_title = excluded.course_title,
                enrollment_total = excluded.enrollment_total,
                value = excluded.value,
                recorded_at = excluded.recorded_at
            "#,
            params![
                audit.point_name,
                audit.effective_time.format(EFFECTIVE_TIME_FORMAT).to_string(),
                audit.zone_code,
                audit.facility_id,
                audit.course_title,
                audit.enrollment_total,
                audit.value,
                audit.recorded_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }
}
