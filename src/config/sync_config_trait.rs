// ==========================================
// 校园设施新风同步系统 - 同步配置读取 Trait
// ==========================================
// 职责: 定义管线所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// 红线: 引擎只经构造函数注入本接口,禁止方法内部兜底取服务
// ==========================================

use async_trait::async_trait;
use std::error::Error;

// ==========================================
// SyncConfigReader Trait
// ==========================================
// 用途: 展开/聚合/同步引擎所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait SyncConfigReader: Send + Sync {
    // ===== 学期配置 =====

    /// 获取当前生效学期代码
    ///
    /// # 返回
    /// - Some(term): 学期代码（如 202510）
    /// - None: 未配置（运行在任何写入发生前中止）
    async fn get_active_term(&self) -> Result<Option<i32>, Box<dyn Error>>;

    // ===== 展开配置 =====

    /// 获取单次运行的日期展开上限（背压）
    ///
    /// # 默认值
    /// - 200
    async fn get_expansion_ceiling(&self) -> Result<usize, Box<dyn Error>>;

    /// 获取条目去抖窗口（小时）
    ///
    /// 标记在窗口内刚写过的条目整条跳过,避免快速重试时的重复计算
    ///
    /// # 默认值
    /// - 2
    async fn get_debounce_window_hours(&self) -> Result<i64, Box<dyn Error>>;

    /// 获取默认滚动窗口天数（triggerSync 未显式给出时使用）
    ///
    /// # 默认值
    /// - 7
    async fn get_lookahead_days_default(&self) -> Result<i64, Box<dyn Error>>;

    // ===== 时区配置 =====

    /// 获取校园本地时区相对 UTC 的分钟偏移（课表时刻 → UTC 用）
    ///
    /// # 默认值
    /// - 480（UTC+8）
    async fn get_campus_utc_offset_minutes(&self) -> Result<i32, Box<dyn Error>>;

    /// 获取控制器本地时区相对 UTC 的分钟偏移（UTC → 队列匹配键用）
    ///
    /// # 默认值
    /// - 480（UTC+8）
    async fn get_controller_utc_offset_minutes(&self) -> Result<i32, Box<dyn Error>>;

    // ===== 点位名配置 =====

    /// 获取点位名前缀（前缀 + 分区代码 + 后缀 = point_name）
    ///
    /// # 默认值
    /// - ""（空串）
    async fn get_point_name_prefix(&self) -> Result<String, Box<dyn Error>>;

    /// 获取点位名后缀
    ///
    /// # 默认值
    /// - ""（空串）
    async fn get_point_name_suffix(&self) -> Result<String, Box<dyn Error>>;

    // ===== 快照 =====

    /// 获取所有配置的快照（JSON 格式,写入运行日志）
    async fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>>;
}
