// ==========================================
// 校园设施新风同步系统 - 指令同步引擎
// ==========================================
// 职责: 把分区设定值成对写入 BAS 指令队列,并镜像审计记录
// 语义: 每个 (日程, 分区) 对写两条指令: 开始时刻=设定值,
//       结束时刻=0;两条同一事务
// 红线: dispatched=1 的指令不可覆盖,跳过并记 info,不算错误
// 红线: 审计写入尽力而为,失败只记日志,不回滚指令
// ==========================================

use crate::domain::command::{CommandWriteOutcome, SetpointAudit};
use crate::domain::schedule::Occurrence;
use crate::engine::demand::ZoneDemand;
use crate::engine::run_context::{RunCache, SyncSettings};
use crate::repository::{AuditRepository, CommandQueueRepository, CommandWrite};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ==========================================
// SyncCounters - 同步计数
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct SyncCounters {
    pub commands_written: usize,            // 实际落库的写入数（插入+更新）
    pub commands_unchanged: usize,          // 取值一致无需写入
    pub commands_skipped_dispatched: usize, // 已下发跳过（非错误）
    pub zone_errors: usize,                 // 分区级失败数（下次运行重试）
}

// ==========================================
// CommandSynchronizer - 指令同步引擎
// ==========================================

pub struct CommandSynchronizer {
    queue_repo: Arc<CommandQueueRepository>,
    audit_repo: Arc<AuditRepository>,
}

impl CommandSynchronizer {
    /// 创建新的指令同步引擎实例
    ///
    /// # 参数
    /// - queue_repo: BAS 指令队列仓储
    /// - audit_repo: 设定值审计仓储
    pub fn new(queue_repo: Arc<CommandQueueRepository>, audit_repo: Arc<AuditRepository>) -> Self {
        Self {
            queue_repo,
            audit_repo,
        }
    }

    /// 同步单个日程的全部分区需求
    ///
    /// 失败语义: 任一 (日程, 分区) 对的失败只记日志并计数,
    ///           继续处理下一个分区,绝不中断整次运行
    pub async fn synchronize_occurrence(
        &self,
        settings: &SyncSettings,
        occurrence: &Occurrence,
        demands: &[ZoneDemand],
        cache: &mut RunCache,
        now: DateTime<Utc>,
    ) -> SyncCounters {
        let mut counters = SyncCounters::default();

        let start_local = settings.to_controller_local(occurrence.start_ts);
        let end_local = settings.to_controller_local(occurrence.end_ts);

        for demand in demands {
            let point_name = settings.point_name(&demand.zone_code);

            let writes = [
                CommandWrite {
                    known_id: cache.known_command_id(&point_name, start_local),
                    point_name: point_name.clone(),
                    effective_time: start_local,
                    value: demand.setpoint,
                },
                CommandWrite {
                    known_id: cache.known_command_id(&point_name, end_local),
                    point_name: point_name.clone(),
                    effective_time: end_local,
                    value: 0.0,
                },
            ];

            let outcomes = match self.queue_repo.sync_pair(&writes, now) {
                Ok(o) => o,
                Err(e) => {
                    warn!(
                        point_name = %point_name,
                        external_id = %occurrence.external_id,
                        error = %e,
                        "指令对写入失败,该分区留待下次运行重试"
                    );
                    counters.zone_errors += 1;
                    continue;
                }
            };

            for (write, (outcome, command_id)) in writes.iter().zip(outcomes.iter()) {
                cache.remember_command_id(&write.point_name, write.effective_time, *command_id);

                match outcome {
                    CommandWriteOutcome::Inserted | CommandWriteOutcome::Updated => {
                        debug!(
                            point_name = %write.point_name,
                            effective_time = %write.effective_time,
                            value = write.value,
                            outcome = %outcome,
                            "指令写入"
                        );
                        counters.commands_written += 1;
                    }
                    CommandWriteOutcome::Unchanged => {
                        counters.commands_unchanged += 1;
                    }
                    CommandWriteOutcome::SkippedDispatched => {
                        // 在途指令不可覆盖;取值修正被有意丢弃,记日志便于监控
                        info!(
                            point_name = %write.point_name,
                            effective_time = %write.effective_time,
                            requested_value = write.value,
                            "指令已下发到控制器,保持原值不变"
                        );
                        counters.commands_skipped_dispatched += 1;
                    }
                }
            }

            // 指令对成功后镜像审计;失败降级为日志,指令保持有效
            let audit = SetpointAudit {
                point_name: point_name.clone(),
                effective_time: start_local,
                zone_code: demand.zone_code.clone(),
                facility_id: occurrence.facility_id.clone(),
                course_title: occurrence.course_title.clone(),
                enrollment_total: occurrence.enrollment_total,
                value: demand.setpoint,
                recorded_at: now,
            };
            if let Err(e) = self.audit_repo.upsert_audit(&audit) {
                warn!(
                    point_name = %point_name,
                    error = %e,
                    "审计写入失败（不回滚指令）"
                );
            }
        }

        counters
    }
}
