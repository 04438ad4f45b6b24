// ==========================================
// 校园设施新风同步系统 - 设施参照仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: room / zone / room_zone_share / ventilation_rate 由控制台维护,只读
// ==========================================

use crate::domain::facility::{Room, RoomZoneShare, Zone};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// ReferenceRepository - 设施参照仓储
// ==========================================

/// 设施参照仓储
/// 职责: 房间/分区/分摊关系/通风率表的只读访问
pub struct ReferenceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReferenceRepository {
    /// 创建新的设施参照仓储实例
    ///
    /// # 参数
    /// - db_path: 校园库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按设施键查询单个房间（含停用房间,由调用方判断 is_active）
    pub fn get_room(&self, facility_id: &str) -> RepositoryResult<Option<Room>> {
        let conn = self.get_conn()?;

        let room = conn
            .query_row(
                r#"
                SELECT room_id, facility_id, building_id, max_population,
                       uncertainty_amount, ventilation_category_id, is_active
                FROM room
                WHERE facility_id = ?1
                "#,
                params![facility_id],
                Self::map_room_row,
            )
            .optional()?;

        Ok(room)
    }

    /// 查询楼栋下的全部活跃房间
    pub fn list_active_rooms_for_building(
        &self,
        building_id: &str,
    ) -> RepositoryResult<Vec<Room>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT room_id, facility_id, building_id, max_population,
                   uncertainty_amount, ventilation_category_id, is_active
            FROM room
            WHERE building_id = ?1 AND is_active = 1
            ORDER BY facility_id
            "#,
        )?;

        let rooms = stmt
            .query_map(params![building_id], Self::map_room_row)?
            .collect::<SqliteResult<Vec<Room>>>()?;

        Ok(rooms)
    }

    /// 查询楼栋下的全部活跃分区
    pub fn list_active_zones_for_building(
        &self,
        building_id: &str,
    ) -> RepositoryResult<Vec<Zone>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT zone_id, code, name, building_id, is_active, automatic_mode
            FROM zone
            WHERE building_id = ?1 AND is_active = 1
            ORDER BY code
            "#,
        )?;

        let zones = stmt
            .query_map(params![building_id], |row| {
                Ok(Zone {
                    zone_id: row.get(0)?,
                    code: row.get(1)?,
                    name: row.get(2)?,
                    building_id: row.get(3)?,
                    is_active: row.get::<_, i64>(4)? != 0,
                    automatic_mode: row.get::<_, i64>(5)? != 0,
                })
            })?
            .collect::<SqliteResult<Vec<Zone>>>()?;

        Ok(zones)
    }

    /// 查询楼栋下活跃房间→活跃分区的全部分摊关系
    ///
    /// 说明: 分区需求要对“喂给它的所有房间”求和,
    ///       所以一次取整栋,由运行缓存按 zone_id 分组
    pub fn list_active_zone_shares_for_building(
        &self,
        building_id: &str,
    ) -> RepositoryResult<Vec<RoomZoneShare>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT s.room_id, s.zone_id, s.share_percentage, s.max_population_share
            FROM room_zone_share s
            JOIN room r ON r.room_id = s.room_id
            JOIN zone z ON z.zone_id = s.zone_id
            WHERE z.building_id = ?1
              AND r.is_active = 1
              AND z.is_active = 1
            ORDER BY s.zone_id, s.room_id
            "#,
        )?;

        let shares = stmt
            .query_map(params![building_id], |row| {
                Ok(RoomZoneShare {
                    room_id: row.get(0)?,
                    zone_id: row.get(1)?,
                    share_percentage: row.get(2)?,
                    max_population_share: row.get(3)?,
                })
            })?
            .collect::<SqliteResult<Vec<RoomZoneShare>>>()?;

        Ok(shares)
    }

    /// 按通风类别查询人均新风率（cfm/人）
    pub fn get_outdoor_air_rate(&self, category_id: &str) -> RepositoryResult<Option<f64>> {
        let conn = self.get_conn()?;

        let rate = conn
            .query_row(
                "SELECT people_outdoor_air_rate FROM ventilation_rate WHERE category_id = ?1",
                params![category_id],
                |row| row.get::<_, f64>(0),
            )
            .optional()?;

        Ok(rate)
    }

    /// 查询全部通风率参照行（用于运行缓存一次性装载）
    pub fn list_outdoor_air_rates(&self) -> RepositoryResult<Vec<(String, f64)>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT category_id, people_outdoor_air_rate FROM ventilation_rate ORDER BY category_id",
        )?;

        let rates = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?
            .collect::<SqliteResult<Vec<(String, f64)>>>()?;

        Ok(rates)
    }

    // ==========================================
    // 行映射
    // ==========================================

    fn map_room_row(row: &Row<'_>) -> SqliteResult<Room> {
        Ok(Room {
            room_id: row.get(0)?,
            facility_id: row.get(1)?,
            building_id: row.get(2)?,
            max_population: row.get(3)?,
            uncertainty_amount: row.get(4)?,
            ventilation_category_id: row.get(5)?,
            is_active: row.get::<_, i64>(6)? != 0,
        })
    }
}
