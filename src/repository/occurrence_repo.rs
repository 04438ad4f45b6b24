// ==========================================
// 校园设施新风同步系统 - 日程仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: occurrence / expansion_progress 只由展开引擎写入
// 不变式: occurrence 自然键 (external_id, term, start_ts, end_ts) 唯一,
//         重复展开走 ON CONFLICT 原位更新
// 不变式: expansion_progress.last_processed_date 单调不减（SQL 侧兜底）
// ==========================================

use crate::domain::schedule::{Occurrence, ProgressMarker};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// OccurrenceRepository - 日程仓储
// ==========================================

/// 日程仓储
/// 职责: occurrence 表与 expansion_progress 表的读写
pub struct OccurrenceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OccurrenceRepository {
    /// 创建新的日程仓储实例
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

    // ==========================================
    // occurrence 读写
    // ==========================================

    /// 按自然键查询单个日程
    pub fn find_by_natural_key(
        &self,
        external_id: &str,
        term: i32,
        start_ts: DateTime<Utc>,
        end_ts: DateTime<Utc>,
    ) -> RepositoryResult<Option<Occurrence>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT
                external_id, term, start_ts, end_ts,
                facility_id, building_code, room_number,
                enrollment_total, course_title, campus_code, last_updated
            FROM occurrence
            WHERE external_id = ?1 AND term = ?2 AND start_ts = ?3 AND end_ts = ?4
            "#,
        )?;

        let occurrence = stmt
            .query_row(
                params![
                    external_id,
                    term,
                    start_ts.to_rfc3339(),
                    end_ts.to_rfc3339()
                ],
                Self::map_occurrence_row,
            )
            .optional()?;

        Ok(occurrence)
    }

    /// 按自然键插入或原位更新单个日程（一次写入一次提交）
    ///
    /// # 返回
    /// - Ok(()): 操作成功
    /// - Err: 数据库错误（调用方按记录隔离处理,不中断整个条目）
    pub fn upsert(&self, occurrence: &Occurrence) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO occurrence (
                external_id, term, start_ts, end_ts,
                facility_id, building_code, room_number,
                enrollment_total, course_title, campus_code, last_updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(external_id, term, start_ts, end_ts) DO UPDATE SET
                facility_id = excluded.facility_id,
                building_code = excluded.building_code,
                room_number = excluded.room_number,
                enrollment_total = excluded.enrollment_total,
                course_title = excluded.course_title,
                campus_code = excluded.campus_code,
                last_updated = excluded.last_updated
            "#,
            params![
                occurrence.external_id,
                occurrence.term,
                occurrence.start_ts.to_rfc3339(),
                occurrence.end_ts.to_rfc3339(),
                occurrence.facility_id,
                occurrence.building_code,
                occurrence.room_number,
                occurrence.enrollment_total,
                occurrence.course_title,
                occurrence.campus_code,
                occurrence.last_updated.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// 人数对账: 原位更新同一 (external_id, term) 下未来日程的选课人数
    ///
    /// 说明: 只修未来（start_ts > after）且人数确实不同的行,
    ///       历史/进行中的日程不改写
    ///
    /// # 返回
    /// - Ok(usize): 实际更新的行数
    pub fn update_future_enrollment(
        &self,
        external_id: &str,
        term: i32,
        after: DateTime<Utc>,
        enrollment_total: i32,
        now: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;

        let affected = conn.execute(
            r#"
            UPDATE occurrence
            SET enrollment_total = ?4, last_updated = ?5
            WHERE external_id = ?1 AND term = ?2
              AND start_ts > ?3
              AND enrollment_total != ?4
            "#,
            params![
                external_id,
                term,
                after.to_rfc3339(),
                enrollment_total,
                now.to_rfc3339(),
            ],
        )?;

        Ok(affected)
    }

    /// 查询滚动窗口内指定楼栋的日程列表
    ///
    /// # 参数
    /// - building_code: 楼栋代码
    /// - from / to: 窗口起止（按 start_ts 过滤）
    pub fn list_in_window(
        &self,
        building_code: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Occurrence>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT
                external_id, term, start_ts, end_ts,
                facility_id, building_code, room_number,
                enrollment_total, course_title, campus_code, last_updated
            FROM occurrence
            WHERE building_code = ?1
              AND start_ts >= ?2 AND start_ts <= ?3
            ORDER BY start_ts, external_id
            "#,
        )?;

        let occurrences = stmt
            .query_map(
                params![building_code, from.to_rfc3339(), to.to_rfc3339()],
                Self::map_occurrence_row,
            )?
            .collect::<SqliteResult<Vec<Occurrence>>>()?;

        Ok(occurrences)
    }

    // ==========================================
    // expansion_progress 读写
    // ==========================================

    /// 查询展开进度标记
    pub fn get_marker(
        &self,
        external_id: &str,
        term: i32,
    ) -> RepositoryResult<Option<ProgressMarker>> {
        let conn = self.get_conn()?;

        let marker = conn
            .query_row(
                r#"
                SELECT external_id, term, last_processed_date, updated_at
                FROM expansion_progress
                WHERE external_id = ?1 AND term = ?2
                "#,
                params![external_id, term],
                |row| {
                    Ok(ProgressMarker {
                        external_id: row.get(0)?,
                        term: row.get(1)?,
                        last_processed_date: row
                            .get::<_, Option<String>>(2)?
                            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
                        updated_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(3)?)
                            .map(|t| t.with_timezone(&Utc))
                            .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap()),
                    })
                },
            )
            .optional()?;

        Ok(marker)
    }

    /// 推进展开进度标记到指定日期（一次推进一次提交）
    ///
    /// 说明: SQL 侧用 CASE 兜底单调性: 传入更早的日期时保持原值,
    ///       只刷新 updated_at（去抖时间戳）
    pub fn advance_marker(
        &self,
        external_id: &str,
        term: i32,
        processed_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO expansion_progress (external_id, term, last_processed_date, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(external_id, term) DO UPDATE SET
                last_processed_date = CASE
                    WHEN last_processed_date IS NULL
                      OR excluded.last_processed_date > last_processed_date
                    THEN excluded.last_processed_date
                    ELSE last_processed_date
                END,
                updated_at = excluded.updated_at
            "#,
            params![
                external_id,
                term,
                processed_date.format("%Y-%m-%d").to_string(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    // ==========================================
    // 行映射
    // ==========================================

    fn map_occurrence_row(row: &Row<'_>) -> SqliteResult<Occurrence> {
        Ok(Occurrence {
            external_id: row.get(0)?,
            term: row.get(1)?,
            start_ts: DateTime::parse_from_rfc3339(&row.get::<_, String>(2)?)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap()),
            end_ts: DateTime::parse_from_rfc3339(&row.get::<_, String>(3)?)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap()),
            facility_id: row.get(4)?,
            building_code: row.get(5)?,
            room_number: row.get(6)?,
            enrollment_total: row.get(7)?,
            course_title: row.get(8)?,
            campus_code: row.get(9)?,
            last_updated: DateTime::parse_from_rfc3339(&row.get::<_, String>(10)?)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap()),
        })
    }
}
