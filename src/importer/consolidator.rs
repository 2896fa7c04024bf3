// ==========================================
// 流向数据整理 - 汇总流程编排
// ==========================================
// 职责: 逐个文件执行 识别 → 提取 → 追加，生成运行报告
// 状态: Uninitialized → LedgerCreated → {Detecting → Extracting → Appending}* → Finalized
// 红线: 单个文件失败只记录并跳过；仅初始化与汇总文件创建失败终止运行
// 红线: 源文件句柄在任何退出路径上都要关闭
// ==========================================

use crate::config::ConsolidatorConfig;
use crate::domain::layout::LEDGER_HEADERS;
use crate::domain::record::RunStats;
use crate::importer::aggregator::{AppendSummary, LedgerAggregator};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::list_spreadsheet_files;
use crate::importer::format_detector::{Detection, FormatDetector, DEFAULT_HEADER_COLS};
use crate::importer::layout_catalog::LayoutCatalog;
use crate::importer::record_extractor::{ExtractOptions, RecordExtractor, SkippedBatch};
use crate::importer::workbook_trait::{LedgerWorkbook, SourceWorkbook, WorkbookOpener};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// RunPhase - 运行状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Uninitialized,
    LedgerCreated,
    Detecting,
    Extracting,
    Appending,
    Finalized,
}

// ==========================================
// 单文件处理结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    UnknownLayout,
    HeaderUnreadable { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Appended { summary: AppendSummary },
    NoData,
    Skipped(SkipReason),
    Failed { stage: RunPhase, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub layout: Option<String>,
    pub rows_discovered: usize, // 文件数据行数（不含表头）
    pub rows_captured: usize,
    pub appended: Option<AppendSummary>, // 已写入汇总表的范围（失败前已写入的部分也计入）
    pub skipped_batches: Vec<SkippedBatch>,
    pub outcome: FileOutcome,
}

impl FileReport {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            layout: None,
            rows_discovered: 0,
            rows_captured: 0,
            appended: None,
            skipped_batches: Vec::new(),
            outcome: FileOutcome::NoData,
        }
    }

    /// 是否有数据写入汇总表
    pub fn is_appended(&self) -> bool {
        matches!(self.outcome, FileOutcome::Appended { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, FileOutcome::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, FileOutcome::Failed { .. })
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

// ==========================================
// RunReport - 运行报告
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub ledger_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub stats: RunStats,
    pub files: Vec<FileReport>,
}

impl RunReport {
    pub fn completeness_ratio(&self) -> Option<f64> {
        self.stats.completeness_ratio()
    }

    /// 已识别文件中未提取的行数
    pub fn shortfall(&self) -> usize {
        self.stats.shortfall()
    }

    /// 跳过 / 失败文件中的数据行（不计入 total_rows_discovered）
    pub fn unmatched_rows(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.is_skipped() || (f.is_failed() && f.layout.is_none()))
            .map(|f| f.rows_discovered)
            .sum()
    }

    /// 实际写入汇总表的行数
    pub fn rows_appended(&self) -> usize {
        self.files
            .iter()
            .filter_map(|f| f.appended.map(|summary| summary.rows_written))
            .sum()
    }

    /// 输出汇总日志；有缺口时输出警告
    pub fn log_summary(&self) {
        let appended = self.files.iter().filter(|f| f.is_appended()).count();
        let skipped = self.files.iter().filter(|f| f.is_skipped()).count();
        let failed = self.files.iter().filter(|f| f.is_failed()).count();

        info!(
            run_id = %self.run_id,
            files = self.files.len(),
            appended,
            skipped,
            failed,
            elapsed_ms = self.elapsed_ms,
            "处理完成"
        );
        info!(
            discovered = self.stats.total_rows_discovered,
            captured = self.stats.total_rows_captured,
            appended_rows = self.rows_appended(),
            "总计处理了 {} 行数据",
            self.stats.total_rows_captured
        );

        if let Some(ratio) = self.completeness_ratio() {
            info!("处理率: {:.2}%", ratio * 100.0);
        }
        if self.shortfall() > 0 {
            warn!(
                shortfall = self.shortfall(),
                blank_rows = self.stats.blank_rows_skipped,
                failed_batch_rows = self.stats.rows_in_failed_batches,
                "警告：有 {} 行数据未被处理",
                self.shortfall()
            );
        }
        if self.rows_appended() < self.stats.total_rows_captured {
            warn!(
                lost = self.stats.total_rows_captured - self.rows_appended(),
                "警告：部分已提取的数据未写入汇总文件"
            );
        }
        if self.unmatched_rows() > 0 {
            warn!(rows = self.unmatched_rows(), "警告：未识别或无法处理的文件中有数据行未汇总");
        }
        for file in self.files.iter().filter(|f| f.is_skipped() || f.is_failed()) {
            warn!(file = %file.file_name(), outcome = ?file.outcome, "文件未汇总");
        }
    }

    /// 写出运行报告 JSON
    pub fn write_json(&self, path: &Path) -> ImportResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

// ==========================================
// Consolidator - 汇总流程
// ==========================================
pub struct Consolidator<O: WorkbookOpener> {
    opener: O,
    catalog: LayoutCatalog,
    extract_options: ExtractOptions,
    aggregator: LedgerAggregator,
    max_header_cols: usize,
    phase: RunPhase,
}

impl<O: WorkbookOpener> Consolidator<O> {
    /// 使用默认参数创建
    pub fn new(opener: O, catalog: LayoutCatalog) -> Self {
        Self {
            opener,
            catalog,
            extract_options: ExtractOptions::default(),
            aggregator: LedgerAggregator::default(),
            max_header_cols: DEFAULT_HEADER_COLS,
            phase: RunPhase::Uninitialized,
        }
    }

    /// 按配置创建（内置格式 + 配置中的自定义格式）
    pub fn from_config(opener: O, config: &ConsolidatorConfig) -> ImportResult<Self> {
        let catalog = LayoutCatalog::builtin().with_extra_layouts(config.extra_layouts.clone())?;
        Ok(Self::new(opener, catalog)
            .with_extract_options(ExtractOptions {
                batch_size: config.batch_size,
                date_style: config.date_style,
                sheet: 0,
            })
            .with_aggregator(LedgerAggregator::new(config.write_batch_size))
            .with_max_header_cols(config.max_header_cols))
    }

    pub fn with_extract_options(mut self, options: ExtractOptions) -> Self {
        self.extract_options = options;
        self
    }

    pub fn with_aggregator(mut self, aggregator: LedgerAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_max_header_cols(mut self, max_header_cols: usize) -> Self {
        self.max_header_cols = max_header_cols;
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// 检查源目录可读、输出目录可用
    ///
    /// # 返回
    /// - Err(InitializationError): 终止运行
    pub fn initialize(config: &ConsolidatorConfig) -> ImportResult<()> {
        if !config.work_dir.is_dir() {
            return Err(ImportError::InitializationError(format!(
                "源文件目录不存在: {}",
                config.work_dir.display()
            )));
        }
        std::fs::create_dir_all(&config.output_dir).map_err(|e| {
            ImportError::InitializationError(format!(
                "输出目录不可用 ({}): {}",
                config.output_dir.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// 扫描源目录并执行一次完整汇总
    ///
    /// # 参数
    /// - config: 运行配置
    /// - today: 当前日期（汇总文件名使用其前一天）
    pub fn run_directory(
        &mut self,
        config: &ConsolidatorConfig,
        today: NaiveDate,
    ) -> ImportResult<RunReport> {
        Self::initialize(config)?;

        let ledger_path = config.ledger_path(today);
        let files = list_spreadsheet_files(&config.work_dir, &config.extensions, Some(&ledger_path))
            .map_err(|e| ImportError::InitializationError(format!("扫描源文件目录失败: {}", e)))?;
        info!(work_dir = %config.work_dir.display(), count = files.len(), "找到 {} 个表格文件", files.len());

        self.run_files(&files, &ledger_path)
    }

    /// 按顺序处理文件列表
    ///
    /// # 返回
    /// - Ok(RunReport): 每个文件的处理结果 + 计数
    /// - Err(LedgerCreationError): 汇总文件无法创建
    #[instrument(skip(self, files, ledger_path), fields(run_id = tracing::field::Empty, ledger = %ledger_path.display()))]
    pub fn run_files(&mut self, files: &[PathBuf], ledger_path: &Path) -> ImportResult<RunReport> {
        let start_time = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());
        enter(&mut self.phase, RunPhase::Uninitialized);

        // === 步骤 1: 创建汇总文件 ===
        let mut ledger = match self.opener.create_ledger(ledger_path, &LEDGER_HEADERS) {
            Ok(ledger) => ledger,
            Err(e) => {
                let err = match e {
                    ImportError::LedgerCreationError { .. } => e,
                    other => ImportError::LedgerCreationError {
                        path: ledger_path.display().to_string(),
                        message: other.to_string(),
                    },
                };
                error!(error = %err, "创建汇总文件失败");
                return Err(err);
            }
        };
        enter(&mut self.phase, RunPhase::LedgerCreated);
        info!(ledger = %ledger_path.display(), "创建汇总文件");

        // === 步骤 2: 逐个文件处理 ===
        let mut stats = RunStats::default();
        let mut reports = Vec::with_capacity(files.len());
        for (idx, path) in files.iter().enumerate() {
            info!(file = %path.display(), "正在处理 ({}/{})", idx + 1, files.len());
            let report = self.process_file(path, ledger.as_mut(), &mut stats);
            reports.push(report);
        }

        // === 步骤 3: 收尾 ===
        if let Err(e) = ledger.close() {
            warn!(error = %e, "关闭汇总文件失败");
        }
        enter(&mut self.phase, RunPhase::Finalized);

        let report = RunReport {
            run_id,
            ledger_path: ledger_path.to_path_buf(),
            started_at,
            finished_at: Utc::now(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stats,
            files: reports,
        };
        report.log_summary();
        Ok(report)
    }

    /// 处理单个文件；打开成功后无论结果如何都关闭句柄
    fn process_file(
        &mut self,
        path: &Path,
        ledger: &mut dyn LedgerWorkbook,
        stats: &mut RunStats,
    ) -> FileReport {
        enter(&mut self.phase, RunPhase::Detecting);

        let mut source = match self.opener.open_workbook(path) {
            Ok(source) => source,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "打开文件失败，跳过");
                let mut report = FileReport::new(path);
                report.outcome = FileOutcome::Failed {
                    stage: RunPhase::Detecting,
                    error: e.to_string(),
                };
                return report;
            }
        };

        let report = self.process_opened(path, source.as_mut(), ledger, stats);

        if let Err(e) = source.close() {
            warn!(file = %path.display(), error = %e, "关闭文件失败");
        }
        report
    }

    fn process_opened(
        &mut self,
        path: &Path,
        source: &mut dyn SourceWorkbook,
        ledger: &mut dyn LedgerWorkbook,
        stats: &mut RunStats,
    ) -> FileReport {
        let mut report = FileReport::new(path);
        let sheet = self.extract_options.sheet;

        // === 识别格式 ===
        let detector = FormatDetector::with_max_cols(&self.catalog, self.max_header_cols);
        let header = match source.header_row(sheet, detector.max_cols()) {
            Ok(header) => header,
            Err(e) => {
                let err = ImportError::DetectionError(e.to_string());
                warn!(file = %path.display(), error = %err, "表头读取失败，按未识别处理");
                report.outcome = FileOutcome::Skipped(SkipReason::HeaderUnreadable {
                    error: err.to_string(),
                });
                return report;
            }
        };

        let layout = match detector.detect(&header) {
            Detection::Layout(layout) => layout,
            Detection::Unknown => {
                report.rows_discovered = source
                    .last_data_row(sheet)
                    .map(|last| last.saturating_sub(1))
                    .unwrap_or(0);
                info!(file = %path.display(), rows = report.rows_discovered, "未识别的文件格式，跳过文件");
                report.outcome = FileOutcome::Skipped(SkipReason::UnknownLayout);
                return report;
            }
        };
        info!(file = %path.display(), layout = %layout.id, "识别为格式: {}", layout.id);
        report.layout = Some(layout.id.clone());

        // === 提取并分批追加 ===
        // 每取满一批记录即追加，内存中最多保留一批
        enter(&mut self.phase, RunPhase::Extracting);
        let chunk_size = self.extract_options.batch_size.max(1);
        let mut extractor = match RecordExtractor::new(source, layout, self.extract_options, stats) {
            Ok(extractor) => extractor,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "读取数据范围失败，跳过文件");
                report.outcome = FileOutcome::Failed {
                    stage: RunPhase::Extracting,
                    error: e.to_string(),
                };
                return report;
            }
        };
        report.rows_discovered = extractor.data_rows();

        let mut append_error = None;
        loop {
            let chunk: Vec<_> = extractor.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            report.rows_captured += chunk.len();

            enter(&mut self.phase, RunPhase::Appending);
            match self.aggregator.append(ledger, chunk) {
                Ok(Some(summary)) => {
                    report.appended = Some(match report.appended {
                        Some(previous) => previous.merge(summary),
                        None => summary,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    error!(file = %path.display(), error = %e, "追加数据失败，该文件剩余数据不再写入");
                    append_error = Some(e);
                    break;
                }
            }
            enter(&mut self.phase, RunPhase::Extracting);
        }
        report.skipped_batches = extractor.into_skipped_batches();
        info!(
            file = %path.display(),
            data_rows = report.rows_discovered,
            captured = report.rows_captured,
            skipped_batches = report.skipped_batches.len(),
            "提取完成"
        );

        report.outcome = match (append_error, report.appended) {
            (Some(e), _) => FileOutcome::Failed {
                stage: RunPhase::Appending,
                error: e.to_string(),
            },
            (None, Some(summary)) => {
                info!(file = %path.display(), rows = summary.rows_written, "成功处理 {} 行数据", summary.rows_written);
                FileOutcome::Appended { summary }
            }
            (None, None) => FileOutcome::NoData,
        };
        report
    }
}

fn enter(phase: &mut RunPhase, next: RunPhase) {
    debug!(from = ?*phase, to = ?next, "状态切换");
    *phase = next;
}
