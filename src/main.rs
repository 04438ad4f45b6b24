// ==========================================
// 校园设施新风同步系统 - 调度作业入口
// ==========================================
// 用途: 由定时任务/运维手工调用,对一栋楼执行一次同步
// 用法: campus-dcv-sync <校园库路径> <BAS队列库路径> <楼栋> [窗口天数]
// ==========================================

use campus_dcv_sync::api::SyncApi;
use campus_dcv_sync::config::ConfigManager;
use campus_dcv_sync::db::{open_campus_connection, open_sqlite_connection};
use campus_dcv_sync::engine::SyncPipeline;
use campus_dcv_sync::logging;
use campus_dcv_sync::repository::{
    AuditRepository, CommandQueueRepository, OccurrenceRepository, ReferenceRepository,
    ScheduleSourceRepository, SyncRunLogRepository,
};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> ExitCode {
    // 初始化日志系统
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{} v{}", campus_dcv_sync::APP_NAME, campus_dcv_sync::VERSION);
    tracing::info!("==================================================");

    let mut args = std::env::args().skip(1);
    let (campus_db, bas_db, building_id) = match (args.next(), args.next(), args.next()) {
        (Some(a), Some(b), Some(c)) => (a, b, c),
        _ => {
            eprintln!("用法: campus-dcv-sync <校园库路径> <BAS队列库路径> <楼栋> [窗口天数]");
            return ExitCode::from(2);
        }
    };
    let lookahead_days = args.next().and_then(|s| s.trim().parse::<i64>().ok());

    match run(&campus_db, &bas_db, &building_id, lookahead_days).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // 致命错误: 存储不可用或配置缺失,未发生任何写入
            tracing::error!("同步运行失败: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(
    campus_db: &str,
    bas_db: &str,
    building_id: &str,
    lookahead_days: Option<i64>,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("校园库: {}", campus_db);
    tracing::info!("BAS 队列库: {}", bas_db);

    // 校园库各仓储共享一个连接;BAS 队列库独立连接
    let campus_conn = Arc::new(Mutex::new(open_campus_connection(campus_db)?));
    let bas_conn = Arc::new(Mutex::new(open_sqlite_connection(bas_db)?));

    let config = Arc::new(ConfigManager::from_connection(campus_conn.clone())?);
    let pipeline = SyncPipeline::new(
        config,
        Arc::new(ScheduleSourceRepository::from_connection(campus_conn.clone())),
        Arc::new(OccurrenceRepository::from_connection(campus_conn.clone())),
        Arc::new(ReferenceRepository::from_connection(campus_conn.clone())),
        Arc::new(CommandQueueRepository::from_connection(bas_conn)),
        Arc::new(AuditRepository::from_connection(campus_conn.clone())),
        Arc::new(SyncRunLogRepository::from_connection(campus_conn)),
    );
    let api = SyncApi::new(pipeline);

    let result = api
        .trigger_sync(building_id, lookahead_days, Some("campus-dcv-sync bin".to_string()))
        .await?;

    println!(
        "run_id={} processed={} skipped={} errors={} expanded_dates={} commands_written={}",
        result.run_id,
        result.processed,
        result.skipped,
        result.errors,
        result.expanded_dates,
        result.commands_written
    );

    Ok(())
}
