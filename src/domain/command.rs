// ==========================================
// 校园设施新风同步系统 - 指令队列领域模型
// ==========================================
// 红线: setpoint_command 一旦 dispatched=1 即对本系统不可变
//       （只有外部控制器侧会翻转 dispatched）
// ==========================================

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// SetpointCommand - 新风设定值指令
// ==========================================
// 对齐: BAS 队列库 setpoint_command 表
// 匹配键: (point_name, effective_time)；command_id 为队列自增主键
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetpointCommand {
    pub command_id: Option<i64>, // 队列分配的主键（插入前为 None）
    pub point_name: String,      // 分区代码 + 配置前后缀
    pub effective_time: NaiveDateTime, // 控制器本地时刻（外部系统原生表示）
    pub value: f64,              // 新风量设定值（cfm）
    pub dispatched: bool,        // 已下发到物理控制器
}

// ==========================================
// SetpointAudit - 设定值写入审计
// ==========================================
// 对齐: 校园库 setpoint_audit 表
// 说明: 仅追加/合并,本系统永不读取;供运维排障页面查询
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetpointAudit {
    pub point_name: String,
    pub effective_time: NaiveDateTime, // 与指令同为控制器本地时刻
    pub zone_code: String,
    pub facility_id: String,
    pub course_title: Option<String>,
    pub enrollment_total: i32,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

// ==========================================
// CommandWriteOutcome - 单条指令写入结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandWriteOutcome {
    Inserted,          // 队列中不存在,已插入
    Updated,           // 存在且未下发,已更新
    Unchanged,         // 存在且取值一致,无需写入
    SkippedDispatched, // 存在且已下发,按规则跳过（非错误）
}

impl fmt::Display for CommandWriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandWriteOutcome::Inserted => write!(f, "INSERTED"),
            CommandWriteOutcome::Updated => write!(f, "UPDATED"),
            CommandWriteOutcome::Unchanged => write!(f, "UNCHANGED"),
            CommandWriteOutcome::SkippedDispatched => write!(f, "SKIPPED_DISPATCHED"),
        }
    }
}

// ==========================================
// SyncResult - 同步运行汇总
// ==========================================
// 返回给调度器/运维操作的计数摘要,保证“没有运行会静默成功”
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResult {
    pub run_id: String,        // 本次运行的 UUID
    pub processed: usize,      // 正常处理的 occurrence 数
    pub skipped: usize,        // 跳过的 occurrence 数（去抖/停用房间/无分摊）
    pub errors: usize,         // 单条记录级错误数（已记录日志,下次运行重试）
    pub expanded_dates: usize, // 本次展开写入的日期数
    pub commands_written: usize, // 实际落库的指令写入数（插入+更新）
}
