// ==========================================
// 校园设施新风同步系统 - API层
// ==========================================
// 职责: 面向调度作业与控制台的业务接口
// ==========================================

pub mod error;
pub mod sync_api;

// 重导出
pub use error::{ApiError, ApiResult};
pub use sync_api::SyncApi;
