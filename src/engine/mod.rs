// ==========================================
// 校园设施新风同步系统 - 引擎层
// ==========================================
// 职责: 实现业务规则引擎,不拼 SQL
// 红线: 记录级失败就地消化,绝不中断整次运行;
//       唯一致命条件是存储不可用
// ==========================================

pub mod demand;
pub mod expander;
pub mod pipeline;
pub mod run_context;
pub mod synchronizer;

// 重导出核心引擎
pub use demand::{DemandAggregator, ZoneDemand};
pub use expander::{ExpansionOutcome, OccurrenceExpander};
pub use pipeline::SyncPipeline;
pub use run_context::{RunCache, SyncSettings};
pub use synchronizer::{CommandSynchronizer, SyncCounters};
