// ==========================================
// 校园设施新风同步系统 - 配置层
// ==========================================
// 职责: 系统配置管理,显式注入,不做运行时服务查找
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod sync_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use sync_config_trait::SyncConfigReader;
