// ==========================================
// 校园设施新风同步系统 - 课表领域模型
// ==========================================
// 红线: 课表条目与考试行由教务接入系统写入,本系统只读
// 红线: occurrence 与 expansion_progress 只由展开引擎写入
// ==========================================

use crate::domain::types::DayFlags;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ScheduleEntry - 学期循环课表条目
// ==========================================
// 对齐: schedule_entry 表
// 用途: 接入层写入,展开引擎只读;除 enrollment_total 可被修正外不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    // ===== 自然键 =====
    pub external_id: String, // 教务系统稳定键（课程节次号）
    pub term: i32,           // 学期代码（如 202510）

    // ===== 地点 =====
    pub building_code: String, // 楼栋代码
    pub room_number: String,   // 房间号

    // ===== 学期区间与上课时段 =====
    pub start_date: NaiveDate,    // 学期起始日期（含）
    pub end_date: NaiveDate,      // 学期结束日期（含）
    pub meeting_start: NaiveTime, // 上课开始（校园本地时刻）
    pub meeting_end: NaiveTime,   // 上课结束（校园本地时刻）
    pub day_flags: DayFlags,      // 周一..周日 七日标志

    // ===== 人数与描述 =====
    pub enrollment_total: i32,        // 选课人数（可被教务修正）
    pub course_title: Option<String>, // 课程名称（仅用于审计展示）
    pub campus_code: Option<String>,  // 校区代码
}

impl ScheduleEntry {
    /// 楼栋+房间的复合设施键
    pub fn facility_id(&self) -> String {
        format!("{}-{}", self.building_code, self.room_number)
    }
}

// ==========================================
// ExamRow - 考试安排行
// ==========================================
// 对齐: exam_row 表
// 说明: 考试无周内重复,一行对应一个 occurrence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamRow {
    pub exam_id: String, // 考试系统稳定键
    pub term: i32,

    pub building_code: String,
    pub room_number: String,

    pub exam_date: NaiveDate,  // 考试日期
    pub start_time: NaiveTime, // 开始（校园本地时刻）
    pub end_time: NaiveTime,   // 结束（校园本地时刻）

    pub enrollment_total: i32,
    pub course_title: Option<String>,
    pub campus_code: Option<String>,
}

impl ExamRow {
    pub fn facility_id(&self) -> String {
        format!("{}-{}", self.building_code, self.room_number)
    }
}

// ==========================================
// ProgressMarker - 展开进度标记
// ==========================================
// 键: (external_id, term)
// 不变式: last_processed_date 单调不减; 小于等于它的日期永不重展
// 对齐: expansion_progress 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressMarker {
    pub external_id: String,
    pub term: i32,
    pub last_processed_date: Option<NaiveDate>, // None = 尚未展开任何日期
    pub updated_at: DateTime<Utc>,              // 最近一次展开写入时间（去抖依据）
}

// ==========================================
// Occurrence - 展开后的具体日程
// ==========================================
// 自然键: (external_id, term, start_ts, end_ts)
// 不变式: start_ts < end_ts; 重复展开必须原位更新,不得重复插入
// 对齐: occurrence 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Occurrence {
    // ===== 自然键 =====
    pub external_id: String,
    pub term: i32,
    pub start_ts: DateTime<Utc>, // 绝对开始时间（UTC）
    pub end_ts: DateTime<Utc>,   // 绝对结束时间（UTC）

    // ===== 可变字段（重展开时原位覆盖）=====
    pub facility_id: String, // 楼栋+房间复合键
    pub building_code: String,
    pub room_number: String,
    pub enrollment_total: i32,
    pub course_title: Option<String>,
    pub campus_code: Option<String>,

    // ===== 审计字段 =====
    pub last_updated: DateTime<Utc>,
}

impl Occurrence {
    /// 考试行“无语义变化”判定：自然键之外再比对设施与校区
    ///
    /// 命中时跳过写入,避免无意义的版本时间戳翻动
    pub fn same_semantics(&self, other: &Occurrence) -> bool {
        self.external_id == other.external_id
            && self.term == other.term
            && self.start_ts == other.start_ts
            && self.end_ts == other.end_ts
            && self.facility_id == other.facility_id
            && self.campus_code == other.campus_code
    }
}
