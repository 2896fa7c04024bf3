// ==========================================
// CSV 源文件 → CSV 汇总文件 集成测试
// ==========================================
// 测试目标: 目录扫描、汇总文件命名、真实文件读写
// ==========================================


use chrono::NaiveDate;
use flow_consolidator::config::ConsolidatorConfig;
use flow_consolidator::importer::{
    Consolidator, CsvLedger, FileOutcome, FileWorkbookOpener, ImportError, SkipReason,
};
use flow_consolidator::logging;
use std::fs;
use tempfile::tempdir;
use test_helpers::write_csv;

const PATTERN1_HEADER: &str = "销售日期,单位名称,商品名称,商品规格,,销售数量,,销售批号";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()
}

fn test_config(work_dir: &std::path::Path, output_dir: &std::path::Path) -> ConsolidatorConfig {
    ConsolidatorConfig {
        work_dir: work_dir.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        ..ConsolidatorConfig::default()
    }
}

#[test]
fn test_run_directory_end_to_end() {
    logging::init_test();

    let root = tempdir().unwrap();
    let work_dir = root.path().join("downloads");
    let output_dir = root.path().join("desktop");
    fs::create_dir_all(&work_dir).unwrap();

    write_csv(
        &work_dir,
        "a_pattern1.csv",
        &[
            PATTERN1_HEADER,
            "2025/1/5,ACME Co,Aspirin,100mg,,120,,L001",
            ",,,,,,,",
            "20250106,湖北 某某 医院,阿莫西林,0.25g,,8,,L002",
        ],
    );
    write_csv(&work_dir, "b_unknown.csv", &["编号,名称", "1,甲", "2,乙"]);
    write_csv(&work_dir, "~$a_pattern1.csv", &[PATTERN1_HEADER]);
    fs::write(work_dir.join("notes.txt"), "不是表格").unwrap();

    let config = test_config(&work_dir, &output_dir);
    let mut consolidator = Consolidator::from_config(FileWorkbookOpener, &config).unwrap();
    let report = consolidator.run_directory(&config, today()).unwrap();

    let expected_path = output_dir.join("湖北区域每日网上下载出库汇总2025-01-31.csv");
    assert_eq!(report.ledger_path, expected_path);
    assert_eq!(report.files.len(), 2);

    assert_eq!(report.stats.total_rows_discovered, 3);
    assert_eq!(report.stats.total_rows_captured, 2);
    assert_eq!(report.stats.blank_rows_skipped, 1);
    assert_eq!(report.unmatched_rows(), 2);
    assert_eq!(
        report.files[1].outcome,
        FileOutcome::Skipped(SkipReason::UnknownLayout)
    );

    let rows = CsvLedger::read_all(&expected_path).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], vec!["日期", "品种", "规格", "批号", "流向单位", "数量"]);
    assert_eq!(rows[1], vec!["2025-01-05", "Aspirin", "100mg", "L001", "ACMECo", "120"]);
    assert_eq!(rows[2][0], "2025-01-06");
    assert_eq!(rows[2][4], "湖北某某医院");
}

#[test]
fn test_ledger_in_work_dir_is_not_reimported() {
    let root = tempdir().unwrap();
    let dir = root.path();
    write_csv(dir, "a.csv", &[PATTERN1_HEADER, "2025-01-05,甲,乙,丙,,1,,L1"]);

    let config = test_config(dir, dir);

    // 连续运行两次，第二次不应读取第一次生成的汇总文件
    for _ in 0..2 {
        let mut consolidator = Consolidator::from_config(FileWorkbookOpener, &config).unwrap();
        let report = consolidator.run_directory(&config, today()).unwrap();
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.stats.total_rows_captured, 1);
    }

    let rows = CsvLedger::read_all(&config.ledger_path(today())).unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_missing_work_dir_is_initialization_error() {
    let root = tempdir().unwrap();
    let config = test_config(&root.path().join("missing"), root.path());
    let mut consolidator = Consolidator::from_config(FileWorkbookOpener, &config).unwrap();

    let err = consolidator.run_directory(&config, today()).unwrap_err();
    assert!(matches!(err, ImportError::InitializationError(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_empty_work_dir_produces_header_only_ledger() {
    let root = tempdir().unwrap();
    let work_dir = root.path().join("in");
    fs::create_dir_all(&work_dir).unwrap();
    let config = test_config(&work_dir, root.path());

    let mut consolidator = Consolidator::from_config(FileWorkbookOpener, &config).unwrap();
    let report = consolidator.run_directory(&config, today()).unwrap();

    assert!(report.files.is_empty());
    assert_eq!(report.completeness_ratio(), None);
    assert_eq!(CsvLedger::read_all(&report.ledger_path).unwrap().len(), 1);
}

#[test]
fn test_report_json_written() {
    let root = tempdir().unwrap();
    let dir = root.path();
    write_csv(dir, "a.csv", &[PATTERN1_HEADER, "2025-01-05,甲,乙,丙,,1,,L1"]);
    let config = test_config(dir, dir);

    let mut consolidator = Consolidator::from_config(FileWorkbookOpener, &config).unwrap();
    let report = consolidator.run_directory(&config, today()).unwrap();

    let report_path = dir.join("report.json");
    report.write_json(&report_path).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(json["stats"]["total_rows_captured"], 1);
    assert_eq!(json["files"][0]["layout"], "pattern1");
    assert_eq!(json["files"][0]["outcome"]["status"], "appended");
}
