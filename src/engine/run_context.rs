// ==========================================
// 校园设施新风同步系统 - 运行上下文
// ==========================================
// 职责: 单次运行的显式配置快照与参照数据缓存
// 红线: 不用模块级全局状态: 配置结构体逐层传入,
//       缓存对象由管线驱动器持有,作用域限于一次运行
// ==========================================

use crate::config::SyncConfigReader;
use crate::domain::facility::{Room, RoomZoneShare, Zone};
use crate::repository::{ReferenceRepository, RepositoryResult};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::collections::HashMap;
use std::error::Error;

// ==========================================
// SyncSettings - 单次运行的配置快照
// ==========================================
// 说明: 运行开始时从 ConfigManager 解析一次,之后各引擎只读本结构,
//       避免运行中途配置变更造成半套新值半套旧值
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub term: i32,                    // 当前生效学期
    pub expansion_ceiling: usize,     // 单次运行日期展开上限
    pub debounce_window_hours: i64,   // 条目去抖窗口（小时）
    pub campus_offset: FixedOffset,   // 校园本地时区
    pub controller_offset: FixedOffset, // 控制器本地时区
    pub point_name_prefix: String,
    pub point_name_suffix: String,
}

impl SyncSettings {
    /// 从配置读取器解析一次运行的全部配置
    ///
    /// # 返回
    /// - Ok(Some(SyncSettings)): 解析成功
    /// - Ok(None): active_term 未配置（调用方在任何写入前中止运行）
    pub async fn resolve<C: SyncConfigReader>(config: &C) -> Result<Option<Self>, Box<dyn Error>> {
        let term = match config.get_active_term().await? {
            Some(t) => t,
            None => return Ok(None),
        };

        let campus_minutes = config.get_campus_utc_offset_minutes().await?;
        let controller_minutes = config.get_controller_utc_offset_minutes().await?;

        let campus_offset = FixedOffset::east_opt(campus_minutes * 60)
            .ok_or_else(|| format!("campus_utc_offset_minutes 超出范围: {}", campus_minutes))?;
        let controller_offset = FixedOffset::east_opt(controller_minutes * 60).ok_or_else(|| {
            format!("controller_utc_offset_minutes 超出范围: {}", controller_minutes)
        })?;

        Ok(Some(Self {
            term,
            expansion_ceiling: config.get_expansion_ceiling().await?,
            debounce_window_hours: config.get_debounce_window_hours().await?,
            campus_offset,
            controller_offset,
            point_name_prefix: config.get_point_name_prefix().await?,
            point_name_suffix: config.get_point_name_suffix().await?,
        }))
    }

    /// 拼接分区的外部点位名（前缀 + 分区代码 + 后缀）
    pub fn point_name(&self, zone_code: &str) -> String {
        format!(
            "{}{}{}",
            self.point_name_prefix, zone_code, self.point_name_suffix
        )
    }

    /// 校园本地 日期+时刻 → UTC 绝对时间
    pub fn campus_local_to_utc(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let local = NaiveDateTime::new(date, time);
        Utc.from_utc_datetime(&(local - self.campus_offset))
    }

    /// UTC 绝对时间 → 控制器本地时刻（指令队列的匹配键）
    pub fn to_controller_local(&self, ts: DateTime<Utc>) -> NaiveDateTime {
        ts.with_timezone(&self.controller_offset).naive_local()
    }
}

// ==========================================
// RunCache - 单次运行的参照数据缓存
// ==========================================
// 说明: 一次运行开始时整栋装载,避免逐 occurrence 反复查库;
//       同时缓存运行内发现的指令主键,供按 id 直接匹配
pub struct RunCache {
    pub rooms_by_facility: HashMap<String, Room>, // facility_id → 活跃房间
    pub rooms_by_id: HashMap<String, Room>,       // room_id → 活跃房间
    pub zones_by_id: HashMap<String, Zone>,       // zone_id → 活跃分区
    pub shares_by_zone: HashMap<String, Vec<RoomZoneShare>>, // zone_id → 喂给它的全部分摊行
    pub zone_ids_by_room: HashMap<String, Vec<String>>, // room_id → 它分摊到的分区
    pub rates_by_category: HashMap<String, f64>,  // 通风类别 → 人均新风率
    pub command_ids: HashMap<(String, NaiveDateTime), i64>, // (点位名, 本地时刻) → 队列主键
}

impl RunCache {
    /// 整栋装载参照数据
    ///
    /// # 参数
    /// - reference_repo: 设施参照仓储
    /// - building_id: 楼栋
    pub fn load(reference_repo: &ReferenceRepository, building_id: &str) -> RepositoryResult<Self> {
        let rooms = reference_repo.list_active_rooms_for_building(building_id)?;
        let zones = reference_repo.list_active_zones_for_building(building_id)?;
        let shares = reference_repo.list_active_zone_shares_for_building(building_id)?;
        let rates = reference_repo.list_outdoor_air_rates()?;

        let mut rooms_by_facility = HashMap::new();
        let mut rooms_by_id = HashMap::new();
        for room in rooms {
            rooms_by_facility.insert(room.facility_id.clone(), room.clone());
            rooms_by_id.insert(room.room_id.clone(), room);
        }

        let zones_by_id: HashMap<String, Zone> =
            zones.into_iter().map(|z| (z.zone_id.clone(), z)).collect();

        let mut shares_by_zone: HashMap<String, Vec<RoomZoneShare>> = HashMap::new();
        let mut zone_ids_by_room: HashMap<String, Vec<String>> = HashMap::new();
        for share in shares {
            let by_room = zone_ids_by_room.entry(share.room_id.clone()).or_default();
            if !by_room.contains(&share.zone_id) {
                by_room.push(share.zone_id.clone());
            }
            shares_by_zone
                .entry(share.zone_id.clone())
                .or_default()
                .push(share);
        }

        Ok(Self {
            rooms_by_facility,
            rooms_by_id,
            zones_by_id,
            shares_by_zone,
            zone_ids_by_room,
            rates_by_category: rates.into_iter().collect(),
            command_ids: HashMap::new(),
        })
    }

    /// 查询运行内已发现的指令主键
    pub fn known_command_id(&self, point_name: &str, effective_time: NaiveDateTime) -> Option<i64> {
        self.command_ids
            .get(&(point_name.to_string(), effective_time))
            .copied()
    }

    /// 记住一条指令的队列主键（后续写入按 id 直接匹配）
    pub fn remember_command_id(
        &mut self,
        point_name: &str,
        effective_time: NaiveDateTime,
        command_id: i64,
    ) {
        if command_id > 0 {
            self.command_ids
                .insert((point_name.to_string(), effective_time), command_id);
        }
    }
}
