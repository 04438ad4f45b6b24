// ==========================================
// 校园设施新风同步系统 - 同步触发API
// ==========================================
// 职责: 暴露给调度作业/控制台管理操作的同步入口
// 约束: 调用方永远拿到计数摘要或显式错误,
//       没有运行会静默成功,也没有级联异常直达操作者
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::SyncConfigReader;
use crate::domain::command::SyncResult;
use crate::engine::SyncPipeline;
use tracing::error;

/// 滚动窗口天数上限（防止误触发全年窗口的运行）
const MAX_LOOKAHEAD_DAYS: i64 = 60;

// ==========================================
// SyncApi - 同步触发API
// ==========================================

pub struct SyncApi<C>
where
    C: SyncConfigReader,
{
    pipeline: SyncPipeline<C>,
}

impl<C> SyncApi<C>
where
    C: SyncConfigReader,
{
    /// 创建新的 SyncApi 实例
    pub fn new(pipeline: SyncPipeline<C>) -> Self {
        Self { pipeline }
    }

    /// 触发一次同步运行
    ///
    /// # 参数
    /// - building_id: 楼栋
    /// - lookahead_days: 滚动窗口天数（None 时取配置默认值）
    /// - trigger_source: 触发源（调度器/操作人标识）
    ///
    /// # 返回
    /// - Ok(SyncResult): processed/skipped/errors 计数摘要
    /// - Err(ApiError): 入参错误或致命运行错误（存储不可用/配置缺失）
    pub async fn trigger_sync(
        &self,
        building_id: &str,
        lookahead_days: Option<i64>,
        trigger_source: Option<String>,
    ) -> ApiResult<SyncResult> {
        let building_id = building_id.trim();
        if building_id.is_empty() {
            return Err(ApiError::InvalidInput("building_id 不能为空".to_string()));
        }

        if let Some(days) = lookahead_days {
            if !(1..=MAX_LOOKAHEAD_DAYS).contains(&days) {
                return Err(ApiError::InvalidInput(format!(
                    "lookahead_days 必须在 1..={} 之间: {}",
                    MAX_LOOKAHEAD_DAYS, days
                )));
            }
        }

        self.pipeline
            .run_sync(building_id, lookahead_days, trigger_source)
            .await
            .map_err(|e| {
                error!(building_id = building_id, error = %e, "同步运行以致命错误结束");
                let msg = e.to_string();
                if msg.contains("active_term") {
                    ApiError::MissingConfig(msg)
                } else {
                    ApiError::SyncRunFailure(msg)
                }
            })
    }
}
