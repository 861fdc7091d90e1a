//! End-to-end ingestion of synthetic run directories.

mod common;

use std::collections::BTreeMap;

use common::*;
use devtrace::sqlite::Table;
use devtrace::{EngineTag, FileSet, IngestConfig, TaskStatus};

#[test]
fn test_block_log_with_trailing_fragment() {
    let run = TestRun::new("gen1", 1000, 5_000_000_000, 38.4);
    let mut bytes = Vec::new();
    for i in 0..3u16 {
        bytes.extend(block_log(i, 1000 + u64::from(i) * 384, 384));
    }
    bytes.extend_from_slice(&[0xEE; 5]);
    run.write_slice("ts_track", 0, &bytes);

    let summary = run.ingest();
    let report = &summary.tasks[&EngineTag::TaskTrack];
    assert!(report.succeeded());
    assert_eq!(report.records, 3);
    assert_eq!(report.trailing_fragment_bytes, 5);
    assert_eq!(report.rows[&Table::BlockLog], 3);

    let conn = run.store();
    let (start_ns, end_ns): (i64, i64) = conn
        .query_row(
            "SELECT start_ns, end_ns FROM block_log WHERE task_id = 0",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(start_ns, 5_000_000_000);
    assert_eq!(end_ns, 5_000_010_000);
}

#[test]
fn test_slices_are_read_in_order() {
    let run = TestRun::simple("gen2");
    run.write_slice("npu_mem", 10, &npu_mem(300, 3));
    run.write_slice("npu_mem", 2, &npu_mem(200, 2));
    run.write_slice("npu_mem", 0, &npu_mem(100, 1));

    let summary = run.ingest();
    assert_eq!(summary.tasks[&EngineTag::NpuMem].files, 3);

    let conn = run.store();
    let order: Vec<i64> = conn
        .prepare("SELECT hbm_used FROM npu_mem ORDER BY rowid")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();
    assert_eq!(order, vec![1, 2, 3]);
}

#[test]
fn test_decode_failure_is_isolated_to_its_tag() {
    let run = TestRun::simple("gen2");
    let mut bad = hccl_op(64, 10, 20);
    bad.extend(hccl_op(48, 30, 40));
    run.write_slice("hccl", 0, &bad);
    run.write_slice("npu_mem", 0, &[npu_mem(1, 10), npu_mem(2, 20)].concat());

    let summary = run.ingest();
    assert_eq!(summary.tasks.len(), 2);

    match &summary.tasks[&EngineTag::Hccl].status {
        TaskStatus::Failed(reason) => {
            assert!(reason.contains("offset 64"), "reason: {reason}");
            assert!(reason.contains("declares 48 bytes"), "reason: {reason}");
        }
        other => panic!("unexpected status {other:?}"),
    }
    assert!(summary.tasks[&EngineTag::NpuMem].succeeded());
    assert_eq!(summary.failed().count(), 1);

    let conn = run.store();
    assert!(!table_exists(&conn, "hccl"));
    assert_eq!(count_rows(&conn, "npu_mem"), 2);
}

#[test]
fn test_unsupported_engine_is_skipped() {
    let run = TestRun::simple("gen1");
    run.write_slice("qos", 0, &qos(5));
    run.write_slice("stars_soc", 0, &stars_log(TASK_START, 0, 1, 5));
    run.write_slice("npu_mem", 0, &npu_mem(5, 1));

    let summary = run.ingest();
    assert_eq!(summary.skipped().count(), 2);
    assert!(matches!(
        summary.tasks[&EngineTag::Qos].status,
        TaskStatus::Skipped(_)
    ));
    assert!(summary.tasks[&EngineTag::NpuMem].succeeded());
    assert_eq!(summary.failed().count(), 0);

    let conn = run.store();
    assert!(!table_exists(&conn, "qos"));
    assert!(!table_exists(&conn, "stars_log"));
}

#[test]
fn test_gen4_scheduler_log_builds_task_time() {
    let run = TestRun::simple("gen4");
    let bytes = [
        stars_log(TASK_START, 12, 1, 100),
        stars_log(TASK_START, 13, 2, 150),
        stars_log(TASK_END, 12, 1, 300),
        stars_log(TASK_END, 13, 2, 400),
        stars_log(TASK_END, 14, 9, 500),
    ]
    .concat();
    run.write_slice("stars_soc", 0, &bytes);

    let summary = run.ingest();
    let report = &summary.tasks[&EngineTag::StarsLog];
    assert!(report.succeeded());
    assert_eq!(report.rows[&Table::StarsLog], 5);
    assert_eq!(report.rows[&Table::TaskTime], 2);
    assert_eq!(report.unmatched_tasks, 1);

    let conn = run.store();
    let rows: Vec<(i64, i64, i64)> = conn
        .prepare("SELECT task_id, core_id, duration_ns FROM task_time ORDER BY task_id")
        .unwrap()
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();
    assert_eq!(rows, vec![(1, 12, 200_000), (2, 13, 250_000)]);

    let chip: String = conn
        .query_row("SELECT chip FROM metadata WHERE id = 1", [], |row| row.get(0))
        .unwrap();
    assert_eq!(chip, "gen4");
}

#[test]
fn test_rerun_replaces_summary_and_appends_raw() {
    let run = TestRun::simple("gen4");
    let bytes = [
        stars_log(TASK_START, 1, 1, 10),
        stars_log(TASK_END, 1, 1, 20),
    ]
    .concat();
    run.write_slice("stars_soc", 0, &bytes);

    run.ingest();
    run.ingest();

    let conn = run.store();
    assert_eq!(count_rows(&conn, "task_time"), 1);
    assert_eq!(count_rows(&conn, "stars_log"), 4);
    assert_eq!(count_rows(&conn, "metadata"), 1);
}

#[test]
fn test_many_engines_share_one_store() {
    let run = TestRun::simple("gen2");
    let blocks: Vec<u8> = (0..50u16).flat_map(|i| block_log(i, u64::from(i), 1)).collect();
    let mems: Vec<u8> = (0..40u64).flat_map(|i| npu_mem(i, i)).collect();
    let qoss: Vec<u8> = (0..30u64).flat_map(qos).collect();
    let hccls: Vec<u8> = (0..20u64).flat_map(|i| hccl_op(64, i, i + 1)).collect();
    run.write_slice("ts_track", 0, &blocks);
    run.write_slice("npu_mem", 0, &mems);
    run.write_slice("qos", 0, &qoss);
    run.write_slice("hccl", 0, &hccls);

    let summary = run.ingest_with(IngestConfig {
        workers: 4,
        ..IngestConfig::default()
    });
    assert!(summary.tasks.values().all(|r| r.succeeded()));
    assert_eq!(summary.total_rows(), 140);

    let conn = run.store();
    assert_eq!(count_rows(&conn, "block_log"), 50);
    assert_eq!(count_rows(&conn, "npu_mem"), 40);
    assert_eq!(count_rows(&conn, "qos"), 30);
    assert_eq!(count_rows(&conn, "hccl"), 20);
}

#[test]
fn test_devices_are_kept_apart() {
    let run = TestRun::simple("gen4");
    run.write_device_slice("stars_soc", 0, 0, &stars_log(TASK_START, 1, 5, 100));
    run.write_device_slice("stars_soc", 1, 0, &stars_log(TASK_END, 1, 5, 90));
    run.write_device_slice("npu_mem", 0, 0, &npu_mem(10, 1));
    run.write_device_slice("npu_mem", 2, 0, &npu_mem(10, 2));

    let summary = run.ingest();
    let report = &summary.tasks[&EngineTag::StarsLog];
    assert!(report.succeeded());
    assert_eq!(report.rows[&Table::TaskTime], 0);
    assert_eq!(report.unmatched_tasks, 2);

    let conn = run.store();
    assert_eq!(count_rows(&conn, "task_time"), 0);
    let devices: Vec<i64> = conn
        .prepare("SELECT device_id FROM stars_log ORDER BY device_id")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();
    assert_eq!(devices, vec![0, 1]);

    let mems: Vec<(i64, i64)> = conn
        .prepare("SELECT device_id, hbm_used FROM npu_mem ORDER BY device_id")
        .unwrap()
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();
    assert_eq!(mems, vec![(0, 1), (2, 2)]);
}

#[test]
fn test_error_budget_skips_later_tasks() {
    let run = TestRun::simple("gen2");
    let good = run.write_slice("npu_mem", 0, &npu_mem(1, 1));
    let missing = |prefix: &str| run.path().join(format!("{prefix}.data.0.slice_0"));
    let files = BTreeMap::from([
        (EngineTag::TaskTrack, FileSet::from_paths(vec![missing("ts_track")])),
        (EngineTag::AiCpu, FileSet::from_paths(vec![missing("aicpu")])),
        (EngineTag::NpuMem, FileSet::from_paths(vec![good])),
    ]);

    let summary = run.ingest_files(
        IngestConfig {
            workers: 1,
            error_budget: Some(1),
            ..IngestConfig::default()
        },
        files,
    );

    assert!(summary.cancelled);
    assert_eq!(summary.failed().count(), 2);
    assert_eq!(
        summary.tasks[&EngineTag::NpuMem].status,
        TaskStatus::Skipped("run cancelled".to_string())
    );
    assert_eq!(summary.total_rows(), 0);
    assert!(!table_exists(&run.store(), "npu_mem"));
}

#[test]
fn test_failures_within_budget_do_not_cancel() {
    let run = TestRun::simple("gen2");
    let good = run.write_slice("npu_mem", 0, &npu_mem(1, 1));
    let files = BTreeMap::from([
        (
            EngineTag::TaskTrack,
            FileSet::from_paths(vec![run.path().join("ts_track.data.0.slice_0")]),
        ),
        (EngineTag::NpuMem, FileSet::from_paths(vec![good])),
    ]);

    let summary = run.ingest_files(
        IngestConfig {
            workers: 1,
            error_budget: Some(1),
            ..IngestConfig::default()
        },
        files,
    );

    assert!(!summary.cancelled);
    assert_eq!(summary.failed().count(), 1);
    assert!(summary.tasks[&EngineTag::NpuMem].succeeded());
    assert_eq!(count_rows(&run.store(), "npu_mem"), 1);
}

#[test]
fn test_rerun_without_pairs_clears_task_time() {
    let run = TestRun::simple("gen4");
    let paired = [
        stars_log(TASK_START, 1, 1, 10),
        stars_log(TASK_END, 1, 1, 20),
    ]
    .concat();
    run.write_slice("stars_soc", 0, &paired);
    run.ingest();
    assert_eq!(count_rows(&run.store(), "task_time"), 1);

    run.write_slice("stars_soc", 0, &stars_log(TASK_START, 1, 1, 10));
    let summary = run.ingest();
    let report = &summary.tasks[&EngineTag::StarsLog];
    assert_eq!(report.rows[&Table::TaskTime], 0);
    assert_eq!(report.unmatched_tasks, 1);
    assert_eq!(count_rows(&run.store(), "task_time"), 0);
}

#[test]
fn test_out_of_bounds_timestamps_are_counted_and_kept() {
    // One cycle per microsecond: cycle 1 lands on the end bound.
    let run = TestRun::with_bounds("gen2", 0, 1_000);
    let bytes = [npu_mem(0, 1), npu_mem(1, 2), npu_mem(5, 3), npu_mem(9, 4)].concat();
    run.write_slice("npu_mem", 0, &bytes);

    let summary = run.ingest();
    let report = &summary.tasks[&EngineTag::NpuMem];
    assert!(report.succeeded());
    assert_eq!(report.warnings, 2);
    assert_eq!(count_rows(&run.store(), "npu_mem"), 4);
}
