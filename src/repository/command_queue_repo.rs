// ==========================================
// 校园设施新风同步系统 - BAS 指令队列仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: dispatched=1 的指令行对本系统不可变,只能跳过
// 说明: 指令队列是独立的外部 SQLite 库,匹配键为
//       (point_name, effective_time),即控制器本地时刻
// ==========================================

use crate::domain::command::{CommandWriteOutcome, SetpointCommand};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

/// 控制器本地时刻在队列库中的存储格式
pub const EFFECTIVE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ==========================================
// CommandWrite - 单条指令写入请求
// ==========================================
#[derive(Debug, Clone)]
pub struct CommandWrite {
    pub known_id: Option<i64>, // 本次运行内已发现的队列主键（优先按 id 匹配）
    pub point_name: String,
    pub effective_time: NaiveDateTime,
    pub value: f64,
}

// ==========================================
// CommandQueueRepository - 指令队列仓储
// ==========================================

/// 指令队列仓储
/// 职责: setpoint_command 表的查询与受控写入
pub struct CommandQueueRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CommandQueueRepository {
    /// 创建新的指令队列仓储实例
    ///
    /// # 参数
    /// - db_path: BAS 队列库文件路径
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

    /// 按队列主键查询单条指令
    pub fn find_by_id(&self, command_id: i64) -> RepositoryResult<Option<SetpointCommand>> {
        let conn = self.get_conn()?;
        Self::find_by_id_on(&conn, command_id)
    }

    /// 按 (点位名, 控制器本地时刻) 查询单条指令
    pub fn find_by_point_and_time(
        &self,
        point_name: &str,
        effective_time: NaiveDateTime,
    ) -> RepositoryResult<Option<SetpointCommand>> {
        let conn = self.get_conn()?;
        Self::find_by_point_and_time_on(&conn, point_name, effective_time)
    }

    /// 同步一个 occurrence-分区对的指令写入（起始值 + 归零值）
    ///
    /// 语义（按条逐一执行,整对一个事务一次提交）:
    /// 1. 先按已知 id、否则按 (point_name, effective_time) 查找
    /// 2. 不存在 → 插入
    /// 3. 存在且未下发 → 取值不同则更新,相同则不动
    /// 4. 存在且已下发 → 跳过（不可变,由调用方记 info 日志）
    ///
    /// # 返回
    /// - Ok(Vec<(outcome, command_id)>): 与入参同序的写入结果
    /// - Err: 事务内任一条失败,整对回滚（由下次运行重试）
    pub fn sync_pair(
        &self,
        writes: &[CommandWrite],
        now: DateTime<Utc>,
    ) -> RepositoryResult<Vec<(CommandWriteOutcome, i64)>> {
        let conn = self.get_conn()?;

        // 开启事务
        conn.execute("BEGIN TRANSACTION", [])?;

        let mut outcomes = Vec::with_capacity(writes.len());
        for write in writes {
            match Self::apply_write(&conn, write, now) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    // 整对回滚,保持“成对生效”语义
                    let _ = conn.execute("ROLLBACK", []);
                    return Err(e);
                }
            }
        }

        // 提交事务
        conn.execute("COMMIT", [])?;

        Ok(outcomes)
    }

    // ==========================================
    // 内部实现
    // ==========================================

    /// 单条写入（事务内调用）
    fn apply_write(
        conn: &Connection,
        write: &CommandWrite,
        now: DateTime<Utc>,
    ) -> RepositoryResult<(CommandWriteOutcome, i64)> {
        // 优先按已知 id 匹配;id 失效时回退到自然键
        let existing = match write.known_id {
            Some(id) => match Self::find_by_id_on(conn, id)? {
                Some(cmd) => Some(cmd),
                None => Self::find_by_point_and_time_on(conn, &write.point_name, write.effective_time)?,
            },
            None => Self::find_by_point_and_time_on(conn, &write.point_name, write.effective_time)?,
        };

        match existing {
            None => {
                conn.execute(
                    r#"
                    INSERT INTO setpoint_command
                        (point_name, effective_time, value, dispatched, created_at, updated_at)
                    VALUES (?1, ?2, ?3, 0, ?4, ?4)
                    "#,
                    params![
                        write.point_name,
                        write.effective_time.format(EFFECTIVE_TIME_FORMAT).to_string(),
                        write.value,
                        now.to_rfc3339(),
                    ],
                )?;
                Ok((CommandWriteOutcome::Inserted, conn.last_insert_rowid()))
            }
            Some(cmd) if cmd.dispatched => {
                // 已下发即不可变,跳过而非报错
                Ok((
                    CommandWriteOutcome::SkippedDispatched,
                    cmd.command_id.unwrap_or_default(),
                ))
            }
            Some(cmd) => {
                let id = cmd.command_id.unwrap_or_default();
                if (cmd.value - write.value).abs() < 1e-9
                    && cmd.effective_time == write.effective_time
                {
                    return Ok((CommandWriteOutcome::Unchanged, id));
                }
                conn.execute(
                    r#"
                    UPDATE setpoint_command
                    SET value = ?2, effective_time = ?3, updated_at = ?4
                    WHERE command_id = ?1
                    "#,
                    params![
                        id,
                        write.value,
                        write.effective_time.format(EFFECTIVE_TIME_FORMAT).to_string(),
                        now.to_rfc3339(),
                    ],
                )?;
                Ok((CommandWriteOutcome::Updated, id))
            }
        }
    }

    fn find_by_id_on(
        conn: &Connection,
        command_id: i64,
    ) -> RepositoryResult<Option<SetpointCommand>> {
        let cmd = conn
            .query_row(
                r#"
                SELECT command_id, point_name, effective_time, value, dispatched
                FROM setpoint_command
                WHERE command_id = ?1
                "#,
                params![command_id],
                Self::map_command_row,
            )
            .optional()?;
        Ok(cmd)
    }

    fn find_by_point_and_time_on(
        conn: &Connection,
        point_name: &str,
        effective_time: NaiveDateTime,
    ) -> RepositoryResult<Option<SetpointCommand>> {
        let cmd = conn
            .query_row(
                r#"
                SELECT command_id, point_name, effective_time, value, dispatched
                FROM setpoint_command
                WHERE point_name = ?1 AND effective_time = ?2
                "#,
                params![
                    point_name,
                    effective_time.format(EFFECTIVE_TIME_FORMAT).to_string()
                ],
                Self::map_command_row,
            )
            .optional()?;
        Ok(cmd)
    }

    // ==========================================
    // 行映射
    // ==========================================

    fn map_command_row(row: &Row<'_>) -> rusqlite::Result<SetpointCommand> {
        Ok(SetpointCommand {
            command_id: row.get(0)?,
            point_name: row.get(1)?,
            effective_time: NaiveDateTime::parse_from_str(
                &row.get::<_, String>(2)?,
                EFFECTIVE_TIME_FORMAT,
            )
            .unwrap_or_default(),
            value: row.get(3)?,
            dispatched: row.get::<_, i64>(4)? != 0,
        })
    }
}
