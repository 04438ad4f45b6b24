// ==========================================
// 指令同步引擎集成测试
// ==========================================
// 测试目标: 成对写入、时区换算、幂等重写、
//           已下发不可变、审计镜像尽力而为
// ==========================================


use campus_dcv_sync::config::ConfigManager;
use campus_dcv_sync::domain::schedule::Occurrence;
use campus_dcv_sync::engine::{DemandAggregator, RunCache, SyncSettings};
use campus_dcv_sync::engine::CommandSynchronizer;
use campus_dcv_sync::logging;
use campus_dcv_sync::repository::{AuditRepository, CommandQueueRepository, ReferenceRepository};
use chrono::{TimeZone, Utc};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

struct SyncFixture {
    _campus_temp: tempfile::NamedTempFile,
    _bas_temp: tempfile::NamedTempFile,
    campus_conn: Arc<Mutex<Connection>>,
    bas_conn: Arc<Mutex<Connection>>,
    synchronizer: CommandSynchronizer,
    settings: SyncSettings,
    cache: RunCache,
}

/// 组装同步引擎与两个测试库
async fn build_fixture() -> SyncFixture {
    let (campus_temp, campus_path) =
        test_helpers::create_campus_test_db().expect("Failed to create campus db");
    let (bas_temp, bas_path) = test_helpers::create_bas_test_db().expect("Failed to create bas db");

    let campus_conn = Arc::new(Mutex::new(
        test_helpers::open_test_connection(&campus_path).expect("Failed to open campus db"),
    ));
    let bas_conn = Arc::new(Mutex::new(
        test_helpers::open_test_connection(&bas_path).expect("Failed to open bas db"),
    ));

    {
        let c = campus_conn.lock().unwrap();
        test_helpers::insert_test_config(&c).expect("Failed to insert config");
        test_helpers::insert_reference_fixture(&c).expect("Failed to insert reference fixture");
    }

    let config = ConfigManager::from_connection(campus_conn.clone()).unwrap();
    let settings = SyncSettings::resolve(&config).await.unwrap().unwrap();

    let reference_repo = ReferenceRepository::from_connection(campus_conn.clone());
    let cache = RunCache::load(&reference_repo, "JXL1").expect("Failed to load cache");

    let synchronizer = CommandSynchronizer::new(
        Arc::new(CommandQueueRepository::from_connection(bas_conn.clone())),
        Arc::new(AuditRepository::from_connection(campus_conn.clone())),
    );

    SyncFixture {
        _campus_temp: campus_temp,
        _bas_temp: bas_temp,
        campus_conn,
        bas_conn,
        synchronizer,
        settings,
        cache,
    }
}

/// R101 在 UTC 01:00-02:40 的一次日程（校园 UTC+8 → 本地 09:00-10:40）
fn sample_occurrence(enrollment_total: i32) -> Occurrence {
    Occurrence {
        external_id: "CRN10001".to_string(),
        term: 202510,
        start_ts: Utc.with_ymd_and_hms(2025, 9, 1, 1, 0, 0).unwrap(),
        end_ts: Utc.with_ymd_and_hms(2025, 9, 1, 2, 40, 0).unwrap(),
        facility_id: "JXL1-101".to_string(),
        building_code: "JXL1".to_string(),
        room_number: "101".to_string(),
        enrollment_total,
        course_title: Some("数据结构".to_string()),
        campus_code: Some("MAIN".to_string()),
        last_updated: Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap(),
    }
}

// ==========================================
// 测试用例
// ==========================================

#[tokio::test]
async fn test_pair_write_with_timezone_conversion() {
    logging::init_test();

    let mut fixture = build_fixture().await;
    let occurrence = sample_occurrence(20);

    let room = fixture.cache.rooms_by_facility["JXL1-101"].clone();
    let demands = DemandAggregator::new().aggregate(&occurrence, &room, &fixture.cache);
    assert_eq!(demands.len(), 2);

    let counters = fixture
        .synchronizer
        .synchronize_occurrence(
            &fixture.settings,
            &occurrence,
            &demands,
            &mut fixture.cache,
            Utc::now(),
        )
        .await;

    // 2 个分区 × (开始 + 归零) = 4 条指令
    assert_eq!(counters.commands_written, 4);
    assert_eq!(counters.zone_errors, 0);

    let c = fixture.bas_conn.lock().unwrap();
    // 控制器 UTC+8: UTC 01:00 → 本地 09:00,取值 66 (参见需求聚合规程)
    let value: f64 = c
        .query_row(
            "SELECT value FROM setpoint_command WHERE point_name = 'AHU_Z-A_OASP' AND effective_time = '2025-09-01 09:00:00'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!((value - 66.0).abs() < 1e-9);

    // 结束时刻归零指令
    let zero: f64 = c
        .query_row(
            "SELECT value FROM setpoint_command WHERE point_name = 'AHU_Z-A_OASP' AND effective_time = '2025-09-01 10:40:00'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(zero.abs() < 1e-9);

    assert_eq!(test_helpers::count_rows(&c, "setpoint_command").unwrap(), 4);
}

#[tokio::test]
async fn test_resync_is_idempotent() {
    logging::init_test();

    let mut fixture = build_fixture().await;
    let occurrence = sample_occurrence(20);
    let room = fixture.cache.rooms_by_facility["JXL1-101"].clone();
    let demands = DemandAggregator::new().aggregate(&occurrence, &room, &fixture.cache);

    let first = fixture
        .synchronizer
        .synchronize_occurrence(
            &fixture.settings,
            &occurrence,
            &demands,
            &mut fixture.cache,
            Utc::now(),
        )
        .await;
    assert_eq!(first.commands_written, 4);

    // 同一窗口重跑: 取值一致,零写入零重复
    let second = fixture
        .synchronizer
        .synchronize_occurrence(
            &fixture.settings,
            &occurrence,
            &demands,
            &mut fixture.cache,
            Utc::now(),
        )
        .await;
    assert_eq!(second.commands_written, 0);
    assert_eq!(second.commands_unchanged, 4);

    let c = fixture.bas_conn.lock().unwrap();
    assert_eq!(test_helpers::count_rows(&c, "setpoint_command").unwrap(), 4);
}

#[tokio::test]
async fn test_dispatched_command_is_immutable() {
    logging::init_test();

    let mut fixture = build_fixture().await;
    let occurrence = sample_occurrence(20);
    let room = fixture.cache.rooms_by_facility["JXL1-101"].clone();
    let demands = DemandAggregator::new().aggregate(&occurrence, &room, &fixture.cache);

    fixture
        .synchronizer
        .synchronize_occurrence(
            &fixture.settings,
            &occurrence,
            &demands,
            &mut fixture.cache,
            Utc::now(),
        )
        .await;

    // 控制器侧把开始指令标记为已下发
    {
        let c = fixture.bas_conn.lock().unwrap();
        c.execute(
            "UPDATE setpoint_command SET dispatched = 1 \
             WHERE point_name = 'AHU_Z-A_OASP' AND effective_time = '2025-09-01 09:00:00'",
            [],
        )
        .unwrap();
    }

    // 人数上涨 → 新取值 75;已下发的指令保持 66 不变
    let occurrence = sample_occurrence(40);
    let demands = DemandAggregator::new().aggregate(&occurrence, &room, &fixture.cache);
    let counters = fixture
        .synchronizer
        .synchronize_occurrence(
            &fixture.settings,
            &occurrence,
            &demands,
            &mut fixture.cache,
            Utc::now(),
        )
        .await;

    assert_eq!(counters.commands_skipped_dispatched, 1);
    assert_eq!(counters.zone_errors, 0);

    let c = fixture.bas_conn.lock().unwrap();
    let frozen: f64 = c
        .query_row(
            "SELECT value FROM setpoint_command WHERE point_name = 'AHU_Z-A_OASP' AND effective_time = '2025-09-01 09:00:00'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!((frozen - 66.0).abs() < 1e-9);

    // 未下发的 Z-B 开始指令正常更新为新取值 (40+2)×0.4×5 = 84 → min(84, 60) = 60
    let updated: f64 = c
        .query_row(
            "SELECT value FROM setpoint_command WHERE point_name = 'AHU_Z-B_OASP' AND effective_time = '2025-09-01 09:00:00'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!((updated - 60.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_audit_mirror_and_best_effort() {
    logging::init_test();

    let mut fixture = build_fixture().await;
    let occurrence = sample_occurrence(20);
    let room = fixture.cache.rooms_by_facility["JXL1-101"].clone();
    let demands = DemandAggregator::new().aggregate(&occurrence, &room, &fixture.cache);

    fixture
        .synchronizer
        .synchronize_occurrence(
            &fixture.settings,
            &occurrence,
            &demands,
            &mut fixture.cache,
            Utc::now(),
        )
        .await;

    {
        let c = fixture.campus_conn.lock().unwrap();
        // 每个 (日程, 分区) 对一条审计镜像
        assert_eq!(test_helpers::count_rows(&c, "setpoint_audit").unwrap(), 2);
        let enrollment: i64 = c
            .query_row(
                "SELECT enrollment_total FROM setpoint_audit WHERE zone_code = 'Z-A'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(enrollment, 20);

        // 模拟审计存储故障
        c.execute_batch("DROP TABLE setpoint_audit").unwrap();
    }

    // 审计失败只降级为日志,指令写入照常生效
    let occurrence = sample_occurrence(25);
    let demands = DemandAggregator::new().aggregate(&occurrence, &room, &fixture.cache);
    let counters = fixture
        .synchronizer
        .synchronize_occurrence(
            &fixture.settings,
            &occurrence,
            &demands,
            &mut fixture.cache,
            Utc::now(),
        )
        .await;

    assert_eq!(counters.zone_errors, 0);

    let c = fixture.bas_conn.lock().unwrap();
    // 开始指令已更新为 (25+2)×0.6×5 = 81 → min(81, 75) = 75
    let value: f64 = c
        .query_row(
            "SELECT value FROM setpoint_command WHERE point_name = 'AHU_Z-A_OASP' AND effective_time = '2025-09-01 09:00:00'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!((value - 75.0).abs() < 1e-9);
}
