// ==========================================
// 校园设施新风同步系统 - 课表源仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: 课表条目/考试行由教务接入系统写入,本仓储只读
// ==========================================

use crate::domain::schedule::{ExamRow, ScheduleEntry};
use crate::domain::types::DayFlags;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// ScheduleSourceRepository - 课表源仓储
// ==========================================

/// 课表源仓储
/// 职责: schedule_entry / exam_row 表的只读访问
pub struct ScheduleSourceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScheduleSourceRepository {
    /// 创建新的课表源仓储实例
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

    /// 查询指定学期/楼栋下待展开的课表条目
    ///
    /// # 参数
    /// - term: 学期代码
    /// - building_code: 楼栋代码
    ///
    /// # 返回
    /// - Ok(Vec<ScheduleEntry>): 课表条目列表（去抖判断在引擎侧做）
    pub fn list_due_entries(
        &self,
        term: i32,
        building_code: &str,
    ) -> RepositoryResult<Vec<ScheduleEntry>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT
                external_id, term, building_code, room_number,
                start_date, end_date, meeting_start, meeting_end,
                mon, tue, wed, thu, fri, sat, sun,
                enrollment_total, course_title, campus_code
            FROM schedule_entry
            WHERE term = ?1 AND building_code = ?2
            ORDER BY external_id
            "#,
        )?;

        let entries = stmt
            .query_map(params![term, building_code], Self::map_entry_row)?
            .collect::<SqliteResult<Vec<ScheduleEntry>>>()?;

        Ok(entries)
    }

    /// 查询指定学期下设施前缀匹配的考试行
    ///
    /// # 参数
    /// - term: 学期代码
    /// - facility_prefix: 楼栋代码前缀（如 "JXL"）
    pub fn list_exam_rows(
        &self,
        term: i32,
        facility_prefix: &str,
    ) -> RepositoryResult<Vec<ExamRow>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT
                exam_id, term, building_code, room_number,
                exam_date, start_time, end_time,
                enrollment_total, course_title, campus_code
            FROM exam_row
            WHERE term = ?1 AND building_code LIKE ?2 || '%'
            ORDER BY exam_id
            "#,
        )?;

        let rows = stmt
            .query_map(params![term, facility_prefix], Self::map_exam_row)?
            .collect::<SqliteResult<Vec<ExamRow>>>()?;

        Ok(rows)
    }

    // ==========================================
    // 行映射
    // ==========================================

    fn map_entry_row(row: &Row<'_>) -> SqliteResult<ScheduleEntry> {
        Ok(ScheduleEntry {
            external_id: row.get(0)?,
            term: row.get(1)?,
            building_code: row.get(2)?,
            room_number: row.get(3)?,
            start_date: NaiveDate::parse_from_str(&row.get::<_, String>(4)?, "%Y-%m-%d")
                .unwrap_or_else(|_| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
            end_date: NaiveDate::parse_from_str(&row.get::<_, String>(5)?, "%Y-%m-%d")
                .unwrap_or_else(|_| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
            meeting_start: NaiveTime::parse_from_str(&row.get::<_, String>(6)?, "%H:%M:%S")
                .unwrap_or_else(|_| NaiveTime::from_hms_opt(0, 0, 0).unwrap()),
            meeting_end: NaiveTime::parse_from_str(&row.get::<_, String>(7)?, "%H:%M:%S")
                .unwrap_or_else(|_| NaiveTime::from_hms_opt(0, 0, 0).unwrap()),
            day_flags: DayFlags::from_array([
                row.get::<_, i64>(8)? != 0,
                row.get::<_, i64>(9)? != 0,
                row.get::<_, i64>(10)? != 0,
                row.get::<_, i64>(11)? != 0,
                row.get::<_, i64>(12)? != 0,
                row.get::<_, i64>(13)? != 0,
                row.get::<_, i64>(14)? != 0,
            ]),
            enrollment_total: row.get(15)?,
            course_title: row.get(16)?,
            campus_code: row.get(17)?,
        })
    }

    fn map_exam_row(row: &Row<'_>) -> SqliteResult<ExamRow> {
        Ok(ExamRow {
            exam_id: row.get(0)?,
            term: row.get(1)?,
            building_code: row.get(2)?,
            room_number: row.get(3)?,
            exam_date: NaiveDate::parse_from_str(&row.get::<_, String>(4)?, "%Y-%m-%d")
                .unwrap_or_else(|_| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
            start_time: NaiveTime::parse_from_str(&row.get::<_, String>(5)?, "%H:%M:%S")
                .unwrap_or_else(|_| NaiveTime::from_hms_opt(0, 0, 0).unwrap()),
            end_time: NaiveTime::parse_from_str(&row.get::<_, String>(6)?, "%H:%M:%S")
                .unwrap_or_else(|_| NaiveTime::from_hms_opt(0, 0, 0).unwrap()),
            enrollment_total: row.get(7)?,
            course_title: row.get(8)?,
            campus_code: row.get(9)?,
        })
    }
}
