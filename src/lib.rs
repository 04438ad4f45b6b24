// ==========================================
// 校园设施新风同步系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 课表展开与 DCV 新风设定值同步管线
// （设施管理控制台的 CRUD 页面与教务接入由外部系统负责）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{DayFlags, SyncRunStatus};

// 领域实体
pub use domain::{
    CommandWriteOutcome, ExamRow, Occurrence, ProgressMarker, Room, RoomZoneShare, ScheduleEntry,
    SetpointAudit, SetpointCommand, SyncResult, Zone,
};

// 引擎
pub use engine::{
    CommandSynchronizer, DemandAggregator, OccurrenceExpander, RunCache, SyncPipeline,
    SyncSettings, ZoneDemand,
};

// API
pub use api::{ApiError, SyncApi};

// 配置
pub use config::{ConfigManager, SyncConfigReader};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "校园设施新风同步系统";
