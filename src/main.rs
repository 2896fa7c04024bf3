// ==========================================
// 流向数据整理 - 命令行入口
// ==========================================
// 流程: 加载配置 → 初始化日志 → 汇总源目录 → 输出结果
// 退出码: 0 = 完成（可能有跳过的文件）, 1 = 初始化或汇总文件创建失败
// ==========================================

use anyhow::Context;
use chrono::Local;
use flow_consolidator::config::ConsolidatorConfig;
use flow_consolidator::importer::{Consolidator, FileWorkbookOpener};
use flow_consolidator::{logging, APP_NAME, VERSION};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let config = ConsolidatorConfig::load().context("加载配置失败")?;
    logging::init(config.log_format);

    tracing::info!("==================================================");
    tracing::info!("{} 版本: {}", APP_NAME, VERSION);
    tracing::info!("源目录: {}", config.work_dir.display());
    tracing::info!("输出目录: {}", config.output_dir.display());
    tracing::info!("==================================================");

    let today = Local::now().date_naive();
    let mut consolidator = Consolidator::from_config(FileWorkbookOpener, &config)
        .context("加载格式定义失败")?;
    let report = consolidator
        .run_directory(&config, today)
        .context("汇总运行失败")?;

    if config.write_report {
        let report_path = report_path_for(&report.ledger_path);
        match report.write_json(&report_path) {
            Ok(()) => tracing::info!(path = %report_path.display(), "运行报告已写出"),
            Err(e) => tracing::warn!(error = %e, "写出运行报告失败"),
        }
    }

    println!("文件已保存到: {}", report.ledger_path.display());
    println!(
        "共 {} 个文件，识别 {} 行，提取 {} 行，写入 {} 行",
        report.files.len(),
        report.stats.total_rows_discovered,
        report.stats.total_rows_captured,
        report.rows_appended()
    );
    if let Some(ratio) = report.completeness_ratio() {
        println!("处理率: {:.2}%", ratio * 100.0);
    }
    Ok(())
}

/// 汇总文件旁的报告路径: <汇总文件名>.report.json
fn report_path_for(ledger_path: &std::path::Path) -> PathBuf {
    let mut name = ledger_path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(".report.json");
    ledger_path.with_file_name(name)
}
