// ==========================================
// 校园设施新风同步系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、快照
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::sync_config_trait::SyncConfigReader;
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    /// 当前生效学期代码
    pub const ACTIVE_TERM: &str = "active_term";
    /// 单次运行日期展开上限
    pub const EXPANSION_CEILING: &str = "expansion_ceiling";
    /// 条目去抖窗口（小时）
    pub const DEBOUNCE_WINDOW_HOURS: &str = "debounce_window_hours";
    /// 默认滚动窗口天数
    pub const LOOKAHEAD_DAYS_DEFAULT: &str = "lookahead_days_default";
    /// 校园本地时区偏移（分钟）
    pub const CAMPUS_UTC_OFFSET_MINUTES: &str = "campus_utc_offset_minutes";
    /// 控制器本地时区偏移（分钟）
    pub const CONTROLLER_UTC_OFFSET_MINUTES: &str = "controller_utc_offset_minutes";
    /// 点位名前缀
    pub const POINT_NAME_PREFIX: &str = "point_name_prefix";
    /// 点位名后缀
    pub const POINT_NAME_SUFFIX: &str = "point_name_suffix";
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 校园库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self
            .get_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 写入 global scope 的配置值（供运维工具使用,管线自身只读）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;

        Ok(())
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 写入 sync_run_log,保证每次运行的配置可追溯
    fn snapshot_internal(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn
            .prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }
}

// ==========================================
// SyncConfigReader 实现
// ==========================================
#[async_trait]
impl SyncConfigReader for ConfigManager {
    async fn get_active_term(&self) -> Result<Option<i32>, Box<dyn Error>> {
        match self.get_config_value(config_keys::ACTIVE_TERM)? {
            Some(v) => {
                let term = v
                    .trim()
                    .parse::<i32>()
                    .map_err(|e| format!("active_term 解析失败: {} ({})", v, e))?;
                Ok(Some(term))
            }
            None => Ok(None),
        }
    }

    async fn get_expansion_ceiling(&self) -> Result<usize, Box<dyn Error>> {
        let v = self.get_config_or_default(config_keys::EXPANSION_CEILING, "200")?;
        Ok(v.trim().parse::<usize>().unwrap_or(200))
    }

    async fn get_debounce_window_hours(&self) -> Result<i64, Box<dyn Error>> {
        let v = self.get_config_or_default(config_keys::DEBOUNCE_WINDOW_HOURS, "2")?;
        Ok(v.trim().parse::<i64>().unwrap_or(2))
    }

    async fn get_lookahead_days_default(&self) -> Result<i64, Box<dyn Error>> {
        let v = self.get_config_or_default(config_keys::LOOKAHEAD_DAYS_DEFAULT, "7")?;
        Ok(v.trim().parse::<i64>().unwrap_or(7))
    }

    async fn get_campus_utc_offset_minutes(&self) -> Result<i32, Box<dyn Error>> {
        let v = self.get_config_or_default(config_keys::CAMPUS_UTC_OFFSET_MINUTES, "480")?;
        Ok(v.trim().parse::<i32>().unwrap_or(480))
    }

    async fn get_controller_utc_offset_minutes(&self) -> Result<i32, Box<dyn Error>> {
        let v = self.get_config_or_default(config_keys::CONTROLLER_UTC_OFFSET_MINUTES, "480")?;
        Ok(v.trim().parse::<i32>().unwrap_or(480))
    }

    async fn get_point_name_prefix(&self) -> Result<String, Box<dyn Error>> {
        self.get_config_or_default(config_keys::POINT_NAME_PREFIX, "")
    }

    async fn get_point_name_suffix(&self) -> Result<String, Box<dyn Error>> {
        self.get_config_or_default(config_keys::POINT_NAME_SUFFIX, "")
    }

    async fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        self.snapshot_internal()
    }
}
