// ==========================================
// 日程展开引擎集成测试
// ==========================================
// 测试目标: 幂等展开、进度标记单调性、崩溃安全、
//           去抖、背压上限、人数对账、考试行变体
// ==========================================


use campus_dcv_sync::config::ConfigManager;
use campus_dcv_sync::engine::{OccurrenceExpander, SyncSettings};
use campus_dcv_sync::logging;
use campus_dcv_sync::repository::{OccurrenceRepository, ScheduleSourceRepository};
use chrono::{Duration, NaiveDate, Utc};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

/// 组装展开引擎与共享连接
fn build_expander(conn: Arc<Mutex<Connection>>) -> OccurrenceExpander {
    OccurrenceExpander::new(
        Arc::new(ScheduleSourceRepository::from_connection(conn.clone())),
        Arc::new(OccurrenceRepository::from_connection(conn)),
    )
}

/// 从 config_kv 解析一次运行的配置快照
async fn resolve_settings(conn: Arc<Mutex<Connection>>) -> SyncSettings {
    let config = ConfigManager::from_connection(conn).expect("Failed to create config");
    SyncSettings::resolve(&config)
        .await
        .expect("配置解析不应失败")
        .expect("active_term 应已配置")
}

/// 连续五天、七日全标记的测试条目（从明天开始,保证全部落在未来）
fn seed_five_day_entry(conn: &Connection, external_id: &str, enrollment: i32) -> (NaiveDate, NaiveDate) {
    let start = Utc::now().date_naive() + Duration::days(1);
    let end = start + Duration::days(4);
    test_helpers::insert_schedule_entry(
        conn,
        external_id,
        202510,
        "JXL1",
        "101",
        start,
        end,
        "09:00:00",
        "10:40:00",
        [true; 7],
        enrollment,
    )
    .expect("Failed to insert schedule entry");
    (start, end)
}

// ==========================================
// 测试用例
// ==========================================

#[tokio::test]
async fn test_idempotent_expansion() {
    logging::init_test();

    let (_temp, db_path) = test_helpers::create_campus_test_db().expect("Failed to create test db");
    let conn = Arc::new(Mutex::new(
        test_helpers::open_test_connection(&db_path).expect("Failed to open db"),
    ));

    {
        let c = conn.lock().unwrap();
        test_helpers::insert_test_config(&c).expect("Failed to insert config");
        // 去抖归零,允许立即重跑
        test_helpers::set_config(&c, "debounce_window_hours", "0").unwrap();
        seed_five_day_entry(&c, "CRN10001", 40);
    }

    let expander = build_expander(conn.clone());
    let settings = resolve_settings(conn.clone()).await;
    let now = Utc::now();

    // 第一次运行: 5 个日期全部展开
    let first = expander
        .expand_due_entries(&settings, "JXL1", now)
        .await
        .expect("展开不应失败");
    assert_eq!(first.dates_expanded, 5);
    assert_eq!(first.dates_failed, 0);

    // 第二次运行: 标记已到学期末,不再产生写入
    let second = expander
        .expand_due_entries(&settings, "JXL1", Utc::now())
        .await
        .expect("展开不应失败");
    assert_eq!(second.dates_expanded, 0);

    // 自然键唯一: 两次运行后仍然只有 5 行
    let c = conn.lock().unwrap();
    assert_eq!(test_helpers::count_rows(&c, "occurrence").unwrap(), 5);
}

#[tokio::test]
async fn test_marker_monotonic_and_crash_safety() {
    logging::init_test();

    let (_temp, db_path) = test_helpers::create_campus_test_db().expect("Failed to create test db");
    let conn = Arc::new(Mutex::new(
        test_helpers::open_test_connection(&db_path).expect("Failed to open db"),
    ));

    let (start, end) = {
        let c = conn.lock().unwrap();
        test_helpers::insert_test_config(&c).expect("Failed to insert config");
        test_helpers::set_config(&c, "debounce_window_hours", "0").unwrap();
        let range = seed_five_day_entry(&c, "CRN10002", 40);

        // 模拟崩溃: 第 3 天的 occurrence 写入直接失败
        let fail_date = range.0 + Duration::days(2);
        c.execute_batch(&format!(
            "CREATE TRIGGER fail_on_d3 BEFORE INSERT ON occurrence \
             WHEN NEW.start_ts LIKE '{}T%' \
             BEGIN SELECT RAISE(ABORT, '模拟写入失败'); END",
            fail_date.format("%Y-%m-%d")
        ))
        .expect("Failed to create trigger");

        range
    };

    let expander = build_expander(conn.clone());
    let settings = resolve_settings(conn.clone()).await;

    let first = expander
        .expand_due_entries(&settings, "JXL1", Utc::now())
        .await
        .expect("展开不应失败");

    // 第 3 天失败,其余 4 天仍然写入（部分失败隔离）
    assert_eq!(first.dates_expanded, 4);
    assert_eq!(first.dates_failed, 1);

    {
        let c = conn.lock().unwrap();
        assert_eq!(test_helpers::count_rows(&c, "occurrence").unwrap(), 4);
    }

    // 标记停在失败日期的前一天,绝不越过未写入的日程
    let occurrence_repo = OccurrenceRepository::from_connection(conn.clone());
    let marker = occurrence_repo
        .get_marker("CRN10002", 202510)
        .expect("标记查询不应失败")
        .expect("标记应已创建");
    assert_eq!(marker.last_processed_date, Some(start + Duration::days(1)));

    // 故障排除后重跑: 从失败日期续展,补齐剩余 3 天
    {
        let c = conn.lock().unwrap();
        c.execute_batch("DROP TRIGGER fail_on_d3").unwrap();
    }

    let second = expander
        .expand_due_entries(&settings, "JXL1", Utc::now())
        .await
        .expect("展开不应失败");
    assert_eq!(second.dates_expanded, 3);

    let marker = occurrence_repo
        .get_marker("CRN10002", 202510)
        .unwrap()
        .unwrap();
    assert_eq!(marker.last_processed_date, Some(end));

    let c = conn.lock().unwrap();
    assert_eq!(test_helpers::count_rows(&c, "occurrence").unwrap(), 5);
}

#[tokio::test]
async fn test_debounce_window_skips_entry() {
    logging::init_test();

    let (_temp, db_path) = test_helpers::create_campus_test_db().expect("Failed to create test db");
    let conn = Arc::new(Mutex::new(
        test_helpers::open_test_connection(&db_path).expect("Failed to open db"),
    ));

    {
        let c = conn.lock().unwrap();
        test_helpers::insert_test_config(&c).expect("Failed to insert config");
        seed_five_day_entry(&c, "CRN10003", 40);
    }

    let expander = build_expander(conn.clone());
    let settings = resolve_settings(conn.clone()).await;

    let first = expander
        .expand_due_entries(&settings, "JXL1", Utc::now())
        .await
        .unwrap();
    assert_eq!(first.dates_expanded, 5);

    // 默认 2 小时去抖窗口内立即重试: 整条跳过
    let second = expander
        .expand_due_entries(&settings, "JXL1", Utc::now())
        .await
        .unwrap();
    assert_eq!(second.entries_skipped_debounce, 1);
    assert_eq!(second.dates_expanded, 0);
}

#[tokio::test]
async fn test_expansion_ceiling_backpressure() {
    logging::init_test();

    let (_temp, db_path) = test_helpers::create_campus_test_db().expect("Failed to create test db");
    let conn = Arc::new(Mutex::new(
        test_helpers::open_test_connection(&db_path).expect("Failed to open db"),
    ));

    let (start, _end) = {
        let c = conn.lock().unwrap();
        test_helpers::insert_test_config(&c).expect("Failed to insert config");
        test_helpers::set_config(&c, "debounce_window_hours", "0").unwrap();
        test_helpers::set_config(&c, "expansion_ceiling", "3").unwrap();
        seed_five_day_entry(&c, "CRN10004", 40)
    };

    let expander = build_expander(conn.clone());
    let settings = resolve_settings(conn.clone()).await;

    // 上限 3: 本次只展开前 3 天
    let first = expander
        .expand_due_entries(&settings, "JXL1", Utc::now())
        .await
        .unwrap();
    assert_eq!(first.dates_expanded, 3);

    let occurrence_repo = OccurrenceRepository::from_connection(conn.clone());
    let marker = occurrence_repo
        .get_marker("CRN10004", 202510)
        .unwrap()
        .unwrap();
    assert_eq!(marker.last_processed_date, Some(start + Duration::days(2)));

    // 下次运行接着展开剩余 2 天
    let second = expander
        .expand_due_entries(&settings, "JXL1", Utc::now())
        .await
        .unwrap();
    assert_eq!(second.dates_expanded, 2);
}

#[tokio::test]
async fn test_enrollment_reconciliation_spares_history() {
    logging::init_test();

    let (_temp, db_path) = test_helpers::create_campus_test_db().expect("Failed to create test db");
    let conn = Arc::new(Mutex::new(
        test_helpers::open_test_connection(&db_path).expect("Failed to open db"),
    ));

    {
        let c = conn.lock().unwrap();
        test_helpers::insert_test_config(&c).expect("Failed to insert config");
        test_helpers::set_config(&c, "debounce_window_hours", "0").unwrap();
        seed_five_day_entry(&c, "CRN10005", 40);
    }

    let expander = build_expander(conn.clone());
    let settings = resolve_settings(conn.clone()).await;

    expander
        .expand_due_entries(&settings, "JXL1", Utc::now())
        .await
        .unwrap();

    {
        let c = conn.lock().unwrap();

        // 手工插入一条昨天的历史日程（同一条目）
        let yesterday = Utc::now() - Duration::days(1);
        c.execute(
            r#"
            INSERT INTO occurrence (
                external_id, term, start_ts, end_ts, facility_id,
                building_code, room_number, enrollment_total, last_updated
            ) VALUES ('CRN10005', 202510, ?1, ?2, 'JXL1-101', 'JXL1', '101', 40, ?1)
            "#,
            rusqlite::params![
                yesterday.to_rfc3339(),
                (yesterday + Duration::hours(2)).to_rfc3339()
            ],
        )
        .unwrap();

        // 教务修正选课人数
        c.execute(
            "UPDATE schedule_entry SET enrollment_total = 55 WHERE external_id = 'CRN10005'",
            [],
        )
        .unwrap();
    }

    let outcome = expander
        .expand_due_entries(&settings, "JXL1", Utc::now())
        .await
        .unwrap();

    // 5 条未来日程被原位修正;历史日程不改写
    assert_eq!(outcome.enrollment_reconciled, 5);
    assert_eq!(outcome.dates_expanded, 0);

    let c = conn.lock().unwrap();
    let future_fixed: i64 = c
        .query_row(
            "SELECT COUNT(*) FROM occurrence WHERE external_id = 'CRN10005' AND enrollment_total = 55",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(future_fixed, 5);

    let history_kept: i64 = c
        .query_row(
            "SELECT COUNT(*) FROM occurrence WHERE external_id = 'CRN10005' AND enrollment_total = 40",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(history_kept, 1);
}

#[tokio::test]
async fn test_malformed_entry_skipped() {
    logging::init_test();

    let (_temp, db_path) = test_helpers::create_campus_test_db().expect("Failed to create test db");
    let conn = Arc::new(Mutex::new(
        test_helpers::open_test_connection(&db_path).expect("Failed to open db"),
    ));

    {
        let c = conn.lock().unwrap();
        test_helpers::insert_test_config(&c).expect("Failed to insert config");
        // 学期区间颠倒的坏条目
        let today = Utc::now().date_naive();
        test_helpers::insert_schedule_entry(
            &c,
            "CRN-BAD",
            202510,
            "JXL1",
            "101",
            today + Duration::days(10),
            today + Duration::days(1),
            "09:00:00",
            "10:40:00",
            [true; 7],
            40,
        )
        .unwrap();
    }

    let expander = build_expander(conn.clone());
    let settings = resolve_settings(conn.clone()).await;

    let outcome = expander
        .expand_due_entries(&settings, "JXL1", Utc::now())
        .await
        .unwrap();

    assert_eq!(outcome.entries_skipped_malformed, 1);
    assert_eq!(outcome.dates_expanded, 0);

    let c = conn.lock().unwrap();
    assert_eq!(test_helpers::count_rows(&c, "occurrence").unwrap(), 0);
}

#[tokio::test]
async fn test_exam_rows_versioned_update_and_skip() {
    logging::init_test();

    let (_temp, db_path) = test_helpers::create_campus_test_db().expect("Failed to create test db");
    let conn = Arc::new(Mutex::new(
        test_helpers::open_test_connection(&db_path).expect("Failed to open db"),
    ));

    let exam_date = Utc::now().date_naive() + Duration::days(3);
    {
        let c = conn.lock().unwrap();
        test_helpers::insert_test_config(&c).expect("Failed to insert config");
        test_helpers::insert_exam_row(
            &c, "EX-001", 202510, "JXL1", "101", exam_date, "09:00:00", "11:00:00", 80,
        )
        .unwrap();
    }

    let expander = build_expander(conn.clone());
    let settings = resolve_settings(conn.clone()).await;

    // 首次展开: 插入一条考试日程
    let first = expander
        .expand_exam_rows(&settings, "JXL1", Utc::now())
        .await
        .unwrap();
    assert_eq!(first.exam_rows_written, 1);

    let last_updated_before: String = {
        let c = conn.lock().unwrap();
        c.query_row(
            "SELECT last_updated FROM occurrence WHERE external_id = 'EX-001'",
            [],
            |row| row.get(0),
        )
        .unwrap()
    };

    // 无语义变化的重跑: 完全跳过写入,版本时间戳不翻动
    let second = expander
        .expand_exam_rows(&settings, "JXL1", Utc::now())
        .await
        .unwrap();
    assert_eq!(second.exam_rows_unchanged, 1);
    assert_eq!(second.exam_rows_written, 0);

    {
        let c = conn.lock().unwrap();
        let last_updated_after: String = c
            .query_row(
                "SELECT last_updated FROM occurrence WHERE external_id = 'EX-001'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(last_updated_before, last_updated_after);

        // 换考场: 同一时段,设施变化 → 语义变化
        c.execute(
            "UPDATE exam_row SET room_number = '201' WHERE exam_id = 'EX-001'",
            [],
        )
        .unwrap();
    }

    // 版本化更新: 原位覆盖设施,仍然只有一行
    let third = expander
        .expand_exam_rows(&settings, "JXL1", Utc::now())
        .await
        .unwrap();
    assert_eq!(third.exam_rows_written, 1);

    let c = conn.lock().unwrap();
    assert_eq!(test_helpers::count_rows(&c, "occurrence").unwrap(), 1);
    let facility: String = c
        .query_row(
            "SELECT facility_id FROM occurrence WHERE external_id = 'EX-001'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(facility, "JXL1-201");
}
