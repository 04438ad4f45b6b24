// ==========================================
// 校园设施新风同步系统 - 领域层
// ==========================================
// 职责: 定义类型化的领域实体,替代源系统中的动态关联数组
// 红线: 领域实体不持有连接,不做持久化
// ==========================================

pub mod command;
pub mod facility;
pub mod schedule;
pub mod types;

// 重导出核心实体
pub use command::{CommandWriteOutcome, SetpointAudit, SetpointCommand, SyncResult};
pub use facility::{Room, RoomZoneShare, Zone};
pub use schedule::{ExamRow, Occurrence, ProgressMarker, ScheduleEntry};
pub use types::{DayFlags, SyncRunStatus};
