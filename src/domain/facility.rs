// ==========================================
// 校园设施新风同步系统 - 设施参照领域模型
// ==========================================
// 红线: 房间/分区/分摊关系由控制台 CRUD 维护,本系统只读
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// Room - 房间
// ==========================================
// 对齐: room 表
// 说明: 只有 is_active=1 的房间参与同步
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub room_id: String,
    pub facility_id: String, // 楼栋+房间复合键（与 occurrence.facility_id 对齐）
    pub building_id: String,
    pub max_population: i32,             // 房间额定容纳人数
    pub uncertainty_amount: i32,         // 占用不确定性加量（加到选课人数上）
    pub ventilation_category_id: String, // 通风类别（查人均新风率）
    pub is_active: bool,
}

// ==========================================
// Zone - 空调分区
// ==========================================
// 对齐: zone 表
// 说明: 只有 is_active=1 的分区接收设定值;
//       automatic_mode=0 的分区由人工控制,不下发指令
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub zone_id: String,
    pub code: String, // 分区代码（拼接点位名的主体）
    pub name: String,
    pub building_id: String,
    pub is_active: bool,
    pub automatic_mode: bool,
}

// ==========================================
// RoomZoneShare - 房间-分区分摊关系 (xref)
// ==========================================
// 对齐: room_zone_share 表
// 不变式: 同一房间的 share_percentage 跨分区不保证求和为 1
//         （数据可能不完整,聚合器不得假设完整性）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomZoneShare {
    pub room_id: String,
    pub zone_id: String,
    pub share_percentage: f64,    // 房间占用分摊到该分区的比例（0-1）
    pub max_population_share: f64, // 该分区分得的房间额定人数份额（人数当量）
}
