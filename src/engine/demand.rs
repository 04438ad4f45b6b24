// ==========================================
// 校园设施新风同步系统 - 新风需求聚合引擎
// ==========================================
// 职责: 按通风率规程把单个日程的占用折算成各分区的新风设定值
// 核心规则: 动态占用请求的新风量,永远不得超过分区建筑学上
//           固定的最大值: setpoint = min(动态需求, 上限需求)
// 红线: 纯计算,不触库;参照数据全部来自运行缓存
// ==========================================

use crate::domain::facility::Room;
use crate::domain::schedule::Occurrence;
use crate::engine::run_context::RunCache;
use tracing::{debug, warn};

// ==========================================
// ZoneDemand - 单分区需求计算结果
// ==========================================
#[derive(Debug, Clone)]
pub struct ZoneDemand {
    pub zone_id: String,
    pub zone_code: String,
    pub dynamic_demand: f64, // Σ (人数 + 不确定加量) × 分摊比例 × 人均新风率
    pub max_demand: f64,     // Σ 额定人数份额 × 人均新风率
    pub setpoint: f64,       // min(dynamic, max),非负
}

// ==========================================
// DemandAggregator - 新风需求聚合引擎
// ==========================================

pub struct DemandAggregator {
    // 无状态引擎,参照数据由调用方传入
}

impl DemandAggregator {
    /// 构造函数
    pub fn new() -> Self {
        Self {}
    }

    /// 计算单个日程对各分区的新风需求
    ///
    /// 范围: 该日程房间分摊到的每个活跃分区;
    ///       每个分区的需求对“喂给它的所有房间”的分摊行求和,
    ///       不只看本日程的房间
    ///
    /// # 参数
    /// - occurrence: 展开后的日程
    /// - room: 日程解析出的房间（调用方已确认 is_active）
    /// - cache: 运行缓存（整栋参照数据）
    ///
    /// # 返回
    /// 需要下发指令的分区需求列表;空分摊集的分区不产生结果
    pub fn aggregate(
        &self,
        occurrence: &Occurrence,
        room: &Room,
        cache: &RunCache,
    ) -> Vec<ZoneDemand> {
        let zone_ids = match cache.zone_ids_by_room.get(&room.room_id) {
            Some(ids) => ids,
            None => {
                warn!(
                    facility_id = %occurrence.facility_id,
                    room_id = %room.room_id,
                    "房间没有任何分区分摊关系,不产生指令"
                );
                return Vec::new();
            }
        };

        let mut demands = Vec::new();

        for zone_id in zone_ids {
            // 缓存只装活跃分区;查不到说明分摊行指向了停用分区
            let zone = match cache.zones_by_id.get(zone_id) {
                Some(z) => z,
                None => {
                    warn!(
                        zone_id = %zone_id,
                        room_id = %room.room_id,
                        "分摊关系指向不存在或停用的分区,跳过"
                    );
                    continue;
                }
            };

            // 人工控制的分区不接收自动设定值
            if !zone.automatic_mode {
                debug!(zone_code = %zone.code, "分区处于人工模式,跳过");
                continue;
            }

            let shares = match cache.shares_by_zone.get(zone_id) {
                Some(s) if !s.is_empty() => s,
                _ => {
                    // 空分摊集 → 需求为 0,且不产生指令
                    debug!(zone_code = %zone.code, "分区无分摊行,不产生指令");
                    continue;
                }
            };

            let mut dynamic_demand = 0.0_f64;
            let mut max_demand = 0.0_f64;
            let mut valid_shares = 0_usize;

            for share in shares {
                let share_room = match cache.rooms_by_id.get(&share.room_id) {
                    Some(r) => r,
                    None => {
                        warn!(
                            zone_code = %zone.code,
                            room_id = %share.room_id,
                            "分摊行指向不存在或停用的房间,跳过该行"
                        );
                        continue;
                    }
                };

                let rate = match cache.rates_by_category.get(&share_room.ventilation_category_id) {
                    Some(r) => *r,
                    None => {
                        warn!(
                            zone_code = %zone.code,
                            room_id = %share_room.room_id,
                            category_id = %share_room.ventilation_category_id,
                            "通风类别缺少人均新风率参照行,跳过该分摊行"
                        );
                        continue;
                    }
                };

                let occupancy =
                    (occurrence.enrollment_total + share_room.uncertainty_amount) as f64;
                dynamic_demand += occupancy * share.share_percentage * rate;
                max_demand += share.max_population_share * rate;
                valid_shares += 1;
            }

            if valid_shares == 0 {
                warn!(
                    zone_code = %zone.code,
                    "分区所有分摊行均不可用,不产生指令"
                );
                continue;
            }

            // 需求永不为负
            let dynamic_demand = dynamic_demand.max(0.0);
            let max_demand = max_demand.max(0.0);
            let setpoint = dynamic_demand.min(max_demand);

            debug!(
                zone_code = %zone.code,
                dynamic_demand = dynamic_demand,
                max_demand = max_demand,
                setpoint = setpoint,
                "分区需求计算完成"
            );

            demands.push(ZoneDemand {
                zone_id: zone.zone_id.clone(),
                zone_code: zone.code.clone(),
                dynamic_demand,
                max_demand,
                setpoint,
            });
        }

        demands
    }
}

impl Default for DemandAggregator {
    fn default() -> Self {
        Self::new()
    }
}
