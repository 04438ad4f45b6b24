// ==========================================
// 校园设施新风同步系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约束: 事务边界不跨记录,一次日期展开一次提交,
//       一个 occurrence 的指令对一次提交
// ==========================================

pub mod audit_repo;
pub mod command_queue_repo;
pub mod error;
pub mod occurrence_repo;
pub mod reference_repo;
pub mod schedule_source_repo;
pub mod sync_run_log_repo;

// 重导出核心仓储
pub use audit_repo::AuditRepository;
pub use command_queue_repo::{CommandQueueRepository, CommandWrite, EFFECTIVE_TIME_FORMAT};
pub use error::{RepositoryError, RepositoryResult};
pub use occurrence_repo::OccurrenceRepository;
pub use reference_repo::ReferenceRepository;
pub use schedule_source_repo::ScheduleSourceRepository;
pub use sync_run_log_repo::SyncRunLogRepository;
