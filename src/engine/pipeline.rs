// ==========================================
// 校园设施新风同步系统 - 同步管线驱动器
// ==========================================
// 职责: 编排一次同步运行: 先展开到期课表,
//       再同步滚动窗口内的全部日程
// 幂等性: 对同一窗口重复运行产生相同的指令取值
//         （已下发指令除外,它们有意冻结）
// 唯一致命条件: 存储打开/运行日志起笔失败,此时尚无任何写入
// ==========================================

use crate::config::SyncConfigReader;
use crate::domain::command::SyncResult;
use crate::domain::types::SyncRunStatus;
use crate::engine::demand::DemandAggregator;
use crate::engine::expander::{ExpansionOutcome, OccurrenceExpander};
use crate::engine::run_context::{RunCache, SyncSettings};
use crate::engine::synchronizer::CommandSynchronizer;
use crate::repository::{
    AuditRepository, CommandQueueRepository, OccurrenceRepository, ReferenceRepository,
    ScheduleSourceRepository, SyncRunLogRepository,
};
use chrono::{Duration, Utc};
use std::error::Error;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

// ==========================================
// SyncPipeline - 同步管线驱动器
// ==========================================

pub struct SyncPipeline<C>
where
    C: SyncConfigReader,
{
    config: Arc<C>,
    occurrence_repo: Arc<OccurrenceRepository>,
    reference_repo: Arc<ReferenceRepository>,
    run_log_repo: Arc<SyncRunLogRepository>,
    expander: OccurrenceExpander,
    aggregator: DemandAggregator,
    synchronizer: CommandSynchronizer,
}

impl<C> SyncPipeline<C>
where
    C: SyncConfigReader,
{
    /// 创建新的管线实例（构造函数注入全部依赖）
    ///
    /// # 参数
    /// - config: 配置读取器
    /// - schedule_repo: 课表源仓储（只读）
    /// - occurrence_repo: 日程仓储
    /// - reference_repo: 设施参照仓储（只读）
    /// - queue_repo: BAS 指令队列仓储
    /// - audit_repo: 设定值审计仓储
    /// - run_log_repo: 同步运行日志仓储
    pub fn new(
        config: Arc<C>,
        schedule_repo: Arc<ScheduleSourceRepository>,
        occurrence_repo: Arc<OccurrenceRepository>,
        reference_repo: Arc<ReferenceRepository>,
        queue_repo: Arc<CommandQueueRepository>,
        audit_repo: Arc<AuditRepository>,
        run_log_repo: Arc<SyncRunLogRepository>,
    ) -> Self {
        Self {
            expander: OccurrenceExpander::new(schedule_repo, occurrence_repo.clone()),
            aggregator: DemandAggregator::new(),
            synchronizer: CommandSynchronizer::new(queue_repo, audit_repo),
            config,
            occurrence_repo,
            reference_repo,
            run_log_repo,
        }
    }

    /// 执行一次完整同步运行
    ///
    /// # 参数
    /// - building_id: 楼栋
    /// - lookahead_days: 滚动窗口天数（None 时取配置默认值）
    /// - trigger_source: 触发源（调度器/操作人,写入运行日志）
    ///
    /// # 返回
    /// - Ok(SyncResult): 计数摘要（任何运行都不会静默成功）
    /// - Err: 致命错误(配置缺失或存储不可用),发生在任何写入之前
    pub async fn run_sync(
        &self,
        building_id: &str,
        lookahead_days: Option<i64>,
        trigger_source: Option<String>,
    ) -> Result<SyncResult, Box<dyn Error>> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();

        // 配置解析一次,整次运行只读这份快照
        let settings = match SyncSettings::resolve(&*self.config).await? {
            Some(s) => s,
            None => return Err("active_term 未配置,无法确定生效学期".into()),
        };

        let lookahead_days = match lookahead_days {
            Some(d) => d,
            None => self.config.get_lookahead_days_default().await?,
        };

        info!(
            run_id = %run_id,
            building_id = building_id,
            term = settings.term,
            lookahead_days = lookahead_days,
            "开始同步运行"
        );

        // 运行日志起笔;失败视为存储不可用,在任何业务写入前中止
        let snapshot = self.config.get_config_snapshot().await?;
        self.run_log_repo.log_start(
            &run_id,
            building_id,
            settings.term,
            trigger_source.as_deref(),
            &snapshot,
            started_at,
        )?;

        let outcome = self
            .execute_run(&settings, building_id, lookahead_days, &run_id)
            .await;

        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds();

        match outcome {
            Ok(result) => {
                if let Err(e) = self.run_log_repo.log_complete(
                    &run_id,
                    &result,
                    SyncRunStatus::Completed,
                    None,
                    completed_at,
                    duration_ms,
                ) {
                    warn!(run_id = %run_id, error = %e, "运行日志收尾失败");
                }

                info!(
                    run_id = %run_id,
                    processed = result.processed,
                    skipped = result.skipped,
                    errors = result.errors,
                    expanded_dates = result.expanded_dates,
                    commands_written = result.commands_written,
                    duration_ms = duration_ms,
                    "同步运行完成"
                );

                Ok(result)
            }
            Err(e) => {
                let failed = SyncResult {
                    run_id: run_id.clone(),
                    ..SyncResult::default()
                };
                if let Err(log_err) = self.run_log_repo.log_complete(
                    &run_id,
                    &failed,
                    SyncRunStatus::Failed,
                    Some(&e.to_string()),
                    completed_at,
                    duration_ms,
                ) {
                    warn!(run_id = %run_id, error = %log_err, "运行日志收尾失败");
                }
                Err(e)
            }
        }
    }

    /// 运行主体（日志起笔之后的全部步骤）
    async fn execute_run(
        &self,
        settings: &SyncSettings,
        building_id: &str,
        lookahead_days: i64,
        run_id: &str,
    ) -> Result<SyncResult, Box<dyn Error>> {
        // ==========================================
        // 步骤1: 整栋装载参照数据（一次运行只查一遍）
        // ==========================================
        let mut cache = RunCache::load(&self.reference_repo, building_id)?;

        info!(
            rooms = cache.rooms_by_facility.len(),
            zones = cache.zones_by_id.len(),
            "参照数据装载完成"
        );

        let now = Utc::now();

        // ==========================================
        // 步骤2: 展开到期课表条目与考试行
        // ==========================================
        let mut expansion = ExpansionOutcome::default();
        expansion.absorb(
            &self
                .expander
                .expand_due_entries(settings, building_id, now)
                .await?,
        );
        expansion.absorb(
            &self
                .expander
                .expand_exam_rows(settings, building_id, now)
                .await?,
        );

        // ==========================================
        // 步骤3: 同步滚动窗口内的日程
        // ==========================================
        let window_end = now + Duration::days(lookahead_days);
        let occurrences = self
            .occurrence_repo
            .list_in_window(building_id, now, window_end)?;

        info!(
            occurrences = occurrences.len(),
            window_end = %window_end,
            "滚动窗口内日程装载完成"
        );

        let mut result = SyncResult {
            run_id: run_id.to_string(),
            expanded_dates: expansion.dates_expanded + expansion.exam_rows_written,
            errors: expansion.dates_failed,
            ..SyncResult::default()
        };

        for occurrence in &occurrences {
            // 停用/未知房间 → 参照数据可能过期,告警跳过而非报错
            let room = match cache.rooms_by_facility.get(&occurrence.facility_id) {
                Some(r) => r.clone(),
                None => {
                    warn!(
                        facility_id = %occurrence.facility_id,
                        external_id = %occurrence.external_id,
                        "日程引用的房间不存在或已停用,跳过（参照数据可能过期）"
                    );
                    result.skipped += 1;
                    continue;
                }
            };

            let demands = self.aggregator.aggregate(occurrence, &room, &cache);
            if demands.is_empty() {
                // 无分摊/无可用分区 → 不产生指令
                result.skipped += 1;
                continue;
            }

            let counters = self
                .synchronizer
                .synchronize_occurrence(settings, occurrence, &demands, &mut cache, now)
                .await;

            result.processed += 1;
            result.commands_written += counters.commands_written;
            result.errors += counters.zone_errors;
        }

        Ok(result)
    }
}
