// ==========================================
// 校园设施新风同步系统 - 日程展开引擎
// ==========================================
// 职责: 把学期循环课表条目展开为具体日期的 occurrence
// 不变式: 进度标记单调推进;标记之前的日期永不重展
// 不变式: 标记只在 occurrence 落库成功后推进
//         （崩溃安全: 标记不得越过未写入的日程）
// 失败语义: 单个日期的持久化错误只废弃该日期,
//           同条目的后续日期继续写入,标记停在失败日期之前
// ==========================================

use crate::domain::schedule::{ExamRow, Occurrence, ScheduleEntry};
use crate::engine::run_context::SyncSettings;
use crate::repository::{OccurrenceRepository, ScheduleSourceRepository};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ==========================================
// ExpansionOutcome - 展开结果统计
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ExpansionOutcome {
    pub entries_seen: usize,
    pub entries_skipped_debounce: usize,  // 去抖窗口内整条跳过
    pub entries_skipped_malformed: usize, // 字段不完整整条跳过
    pub dates_expanded: usize,            // 成功写入的日期数
    pub dates_failed: usize,              // 持久化失败的日期数（下次运行重试）
    pub enrollment_reconciled: usize,     // 人数对账修正的未来日程行数
    pub exam_rows_seen: usize,
    pub exam_rows_written: usize,
    pub exam_rows_unchanged: usize, // 无语义变化跳过的考试行
}

impl ExpansionOutcome {
    /// 合并另一份统计（课表与考试两次展开的汇总）
    pub fn absorb(&mut self, other: &ExpansionOutcome) {
        self.entries_seen += other.entries_seen;
        self.entries_skipped_debounce += other.entries_skipped_debounce;
        self.entries_skipped_malformed += other.entries_skipped_malformed;
        self.dates_expanded += other.dates_expanded;
        self.dates_failed += other.dates_failed;
        self.enrollment_reconciled += other.enrollment_reconciled;
        self.exam_rows_seen += other.exam_rows_seen;
        self.exam_rows_written += other.exam_rows_written;
        self.exam_rows_unchanged += other.exam_rows_unchanged;
    }
}

// ==========================================
// OccurrenceExpander - 日程展开引擎
// ==========================================

pub struct OccurrenceExpander {
    schedule_repo: Arc<ScheduleSourceRepository>,
    occurrence_repo: Arc<OccurrenceRepository>,
}

impl OccurrenceExpander {
    /// 创建新的展开引擎实例
    ///
    /// # 参数
    /// - schedule_repo: 课表源仓储（只读）
    /// - occurrence_repo: 日程仓储（occurrence/进度标记的唯一写入方）
    pub fn new(
        schedule_repo: Arc<ScheduleSourceRepository>,
        occurrence_repo: Arc<OccurrenceRepository>,
    ) -> Self {
        Self {
            schedule_repo,
            occurrence_repo,
        }
    }

    // ==========================================
    // 课表条目展开
    // ==========================================

    /// 展开指定学期/楼栋下所有到期的课表条目
    ///
    /// # 参数
    /// - settings: 本次运行的配置快照
    /// - building_code: 楼栋代码
    /// - now: 运行基准时间（去抖与“未来”判定统一用它）
    ///
    /// # 返回
    /// 展开结果统计;列表查询失败之外的错误均按记录隔离,不向上传播
    pub async fn expand_due_entries(
        &self,
        settings: &SyncSettings,
        building_code: &str,
        now: DateTime<Utc>,
    ) -> Result<ExpansionOutcome, Box<dyn Error>> {
        let entries = self
            .schedule_repo
            .list_due_entries(settings.term, building_code)?;

        info!(
            term = settings.term,
            building_code = building_code,
            entries_count = entries.len(),
            "开始课表条目展开"
        );

        let mut outcome = ExpansionOutcome::default();
        // 背压: 整次运行共享一个日期展开预算
        let mut budget = settings.expansion_ceiling;

        for entry in &entries {
            if budget == 0 {
                debug!(
                    ceiling = settings.expansion_ceiling,
                    "日期展开上限已用完,剩余条目留待下次运行"
                );
                break;
            }

            outcome.entries_seen += 1;

            if let Err(reason) = Self::validate_entry(entry) {
                warn!(
                    external_id = %entry.external_id,
                    term = entry.term,
                    reason = %reason,
                    "课表条目字段不完整,本次运行整条跳过"
                );
                outcome.entries_skipped_malformed += 1;
                continue;
            }

            self.expand_entry(settings, entry, now, &mut budget, &mut outcome)
                .await;
        }

        info!(
            dates_expanded = outcome.dates_expanded,
            dates_failed = outcome.dates_failed,
            entries_skipped_debounce = outcome.entries_skipped_debounce,
            entries_skipped_malformed = outcome.entries_skipped_malformed,
            enrollment_reconciled = outcome.enrollment_reconciled,
            "课表条目展开完成"
        );

        Ok(outcome)
    }

    /// 展开单个课表条目（记录级错误在内部消化）
    async fn expand_entry(
        &self,
        settings: &SyncSettings,
        entry: &ScheduleEntry,
        now: DateTime<Utc>,
        budget: &mut usize,
        outcome: &mut ExpansionOutcome,
    ) {
        // 读取进度标记;读取失败按瞬态错误跳过整条,下次运行重试
        let marker = match self
            .occurrence_repo
            .get_marker(&entry.external_id, entry.term)
        {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    external_id = %entry.external_id,
                    error = %e,
                    "进度标记读取失败,本次运行跳过该条目"
                );
                outcome.dates_failed += 1;
                return;
            }
        };

        // 去抖: 刚写过的条目整条跳过,避免快速重试时的重复计算
        if let Some(m) = &marker {
            if now - m.updated_at < Duration::hours(settings.debounce_window_hours) {
                debug!(
                    external_id = %entry.external_id,
                    updated_at = %m.updated_at,
                    "去抖窗口内,跳过该条目"
                );
                outcome.entries_skipped_debounce += 1;
                return;
            }
        }

        // 人数对账: 教务修正过选课人数时,原位更新未来日程（不改写历史）
        match self.occurrence_repo.update_future_enrollment(
            &entry.external_id,
            entry.term,
            now,
            entry.enrollment_total,
            now,
        ) {
            Ok(0) => {}
            Ok(n) => {
                info!(
                    external_id = %entry.external_id,
                    term = entry.term,
                    enrollment_total = entry.enrollment_total,
                    rows = n,
                    "人数对账: 已修正未来日程的选课人数"
                );
                outcome.enrollment_reconciled += n;
            }
            Err(e) => {
                warn!(
                    external_id = %entry.external_id,
                    error = %e,
                    "人数对账失败,留待下次运行"
                );
            }
        }

        // 起点: 标记之后的第一天（标记之前/当天永不重展）
        let mut date = match marker.as_ref().and_then(|m| m.last_processed_date) {
            Some(d) if d >= entry.start_date => match d.succ_opt() {
                Some(next) => next,
                None => return,
            },
            _ => entry.start_date,
        };

        // 一旦某个日期写入失败,后续日期仍然写入（幂等 upsert）,
        // 但标记冻结在失败日期之前,下次运行从那里重试
        let mut marker_frozen = false;

        while date <= entry.end_date {
            if *budget == 0 {
                debug!(
                    external_id = %entry.external_id,
                    resume_from = %date,
                    "条目展开因上限中断,下次运行续展"
                );
                return;
            }

            if entry.day_flags.is_set(date.weekday()) {
                let occurrence = Self::build_class_occurrence(settings, entry, date, now);

                match self.occurrence_repo.upsert(&occurrence) {
                    Ok(()) => {
                        outcome.dates_expanded += 1;
                        *budget -= 1;

                        if !marker_frozen {
                            if let Err(e) = self.occurrence_repo.advance_marker(
                                &entry.external_id,
                                entry.term,
                                date,
                                now,
                            ) {
                                // 标记推进失败不致命: occurrence 已落库,
                                // 下次运行会重新 upsert 同一日期
                                warn!(
                                    external_id = %entry.external_id,
                                    date = %date,
                                    error = %e,
                                    "进度标记推进失败,冻结标记"
                                );
                                marker_frozen = true;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(
                            external_id = %entry.external_id,
                            date = %date,
                            error = %e,
                            "日程写入失败,该日期留待下次运行重试"
                        );
                        outcome.dates_failed += 1;
                        marker_frozen = true;
                    }
                }
            }

            date = match date.succ_opt() {
                Some(next) => next,
                None => return,
            };
        }
    }

    /// 组装单个课表日程（日期 + 上课时段,按校园时区换算为 UTC）
    fn build_class_occurrence(
        settings: &SyncSettings,
        entry: &ScheduleEntry,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Occurrence {
        Occurrence {
            external_id: entry.external_id.clone(),
            term: entry.term,
            start_ts: settings.campus_local_to_utc(date, entry.meeting_start),
            end_ts: settings.campus_local_to_utc(date, entry.meeting_end),
            facility_id: entry.facility_id(),
            building_code: entry.building_code.clone(),
            room_number: entry.room_number.clone(),
            enrollment_total: entry.enrollment_total,
            course_title: entry.course_title.clone(),
            campus_code: entry.campus_code.clone(),
            last_updated: now,
        }
    }

    /// 课表条目字段完整性校验
    ///
    /// 命中即整条跳过,带键记日志,便于上游修数
    fn validate_entry(entry: &ScheduleEntry) -> Result<(), String> {
        if entry.external_id.trim().is_empty() {
            return Err("external_id 为空".to_string());
        }
        if entry.building_code.trim().is_empty() || entry.room_number.trim().is_empty() {
            return Err("楼栋/房间为空".to_string());
        }
        if entry.end_date < entry.start_date {
            return Err(format!(
                "学期区间颠倒: {} > {}",
                entry.start_date, entry.end_date
            ));
        }
        if entry.meeting_end <= entry.meeting_start {
            return Err(format!(
                "上课时段颠倒: {} >= {}",
                entry.meeting_start, entry.meeting_end
            ));
        }
        if entry.day_flags.is_empty() {
            return Err("七日标志全空".to_string());
        }
        Ok(())
    }

    // ==========================================
    // 考试行展开
    // ==========================================

    /// 展开指定学期下设施前缀匹配的考试行
    ///
    /// 考试无周内重复,一行对应一个 occurrence;
    /// “无语义变化”的行跳过写入,避免无意义的版本时间戳翻动
    pub async fn expand_exam_rows(
        &self,
        settings: &SyncSettings,
        facility_prefix: &str,
        now: DateTime<Utc>,
    ) -> Result<ExpansionOutcome, Box<dyn Error>> {
        let rows = self
            .schedule_repo
            .list_exam_rows(settings.term, facility_prefix)?;

        info!(
            term = settings.term,
            facility_prefix = facility_prefix,
            rows_count = rows.len(),
            "开始考试行展开"
        );

        let mut outcome = ExpansionOutcome::default();

        for row in &rows {
            outcome.exam_rows_seen += 1;

            if let Err(reason) = Self::validate_exam_row(row) {
                warn!(
                    exam_id = %row.exam_id,
                    term = row.term,
                    reason = %reason,
                    "考试行字段不完整,本次运行跳过"
                );
                outcome.entries_skipped_malformed += 1;
                continue;
            }

            let candidate = Self::build_exam_occurrence(settings, row, now);

            // 先查后写: 命中“无语义变化”时完全跳过,否则做版本化更新/插入
            let existing = match self.occurrence_repo.find_by_natural_key(
                &candidate.external_id,
                candidate.term,
                candidate.start_ts,
                candidate.end_ts,
            ) {
                Ok(e) => e,
                Err(e) => {
                    warn!(exam_id = %row.exam_id, error = %e, "考试日程查询失败,跳过该行");
                    outcome.dates_failed += 1;
                    continue;
                }
            };

            if let Some(existing) = existing {
                if existing.same_semantics(&candidate) {
                    debug!(exam_id = %row.exam_id, "考试行无语义变化,跳过写入");
                    outcome.exam_rows_unchanged += 1;
                    continue;
                }
            }

            match self.occurrence_repo.upsert(&candidate) {
                Ok(()) => outcome.exam_rows_written += 1,
                Err(e) => {
                    warn!(exam_id = %row.exam_id, error = %e, "考试日程写入失败,留待下次运行");
                    outcome.dates_failed += 1;
                }
            }
        }

        info!(
            exam_rows_written = outcome.exam_rows_written,
            exam_rows_unchanged = outcome.exam_rows_unchanged,
            "考试行展开完成"
        );

        Ok(outcome)
    }

    fn build_exam_occurrence(
        settings: &SyncSettings,
        row: &ExamRow,
        now: DateTime<Utc>,
    ) -> Occurrence {
        Occurrence {
            external_id: row.exam_id.clone(),
            term: row.term,
            start_ts: settings.campus_local_to_utc(row.exam_date, row.start_time),
            end_ts: settings.campus_local_to_utc(row.exam_date, row.end_time),
            facility_id: row.facility_id(),
            building_code: row.building_code.clone(),
            room_number: row.room_number.clone(),
            enrollment_total: row.enrollment_total,
            course_title: row.course_title.clone(),
            campus_code: row.campus_code.clone(),
            last_updated: now,
        }
    }

    fn validate_exam_row(row: &ExamRow) -> Result<(), String> {
        if row.exam_id.trim().is_empty() {
            return Err("exam_id 为空".to_string());
        }
        if row.building_code.trim().is_empty() || row.room_number.trim().is_empty() {
            return Err("楼栋/房间为空".to_string());
        }
        if row.end_time <= row.start_time {
            return Err(format!("考试时段颠倒: {} >= {}", row.start_time, row.end_time));
        }
        Ok(())
    }
}
