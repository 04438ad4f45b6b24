// ==========================================
// 校园设施新风同步系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免“部分模块外键开启/部分不开启”
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 校园库与 BAS 指令队列库是两个独立文件，均走此入口
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的校园库 schema_version
///
/// 说明：
/// - 建库/迁移由设施管理控制台侧的工具负责，本服务不做自动迁移。
/// - 这里的版本号用于**提示/告警**，避免静默在旧库上运行导致隐性错误。
pub const CURRENT_SCHEMA_VERSION: i64 = 3;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 打开校园库连接，并对 schema_version 做提示性检查
///
/// 说明：版本不匹配只告警不阻断；BAS 指令队列库无版本表，不做检查。
pub fn open_campus_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = open_sqlite_connection(db_path)?;

    match read_schema_version(&conn)? {
        Some(v) if v != CURRENT_SCHEMA_VERSION => {
            tracing::warn!(
                "校园库 schema_version={} 与期望版本 {} 不一致，请检查建库脚本",
                v,
                CURRENT_SCHEMA_VERSION
            );
        }
        None => {
            tracing::warn!("校园库缺少 schema_version 表，可能不是由控制台工具建库");
        }
        _ => {}
    }

    Ok(conn)
}
