// ==========================================
// 流向数据整理 - 导入层
// ==========================================
// 职责: 源表格识别、记录提取、追加到汇总表
// 支持: Excel (xls/xlsx/xlsm/xlsb/ods), CSV
// ==========================================

// 模块声明
pub mod aggregator;
pub mod consolidator;
pub mod error;
pub mod file_parser;
pub mod format_detector;
pub mod layout_catalog;
pub mod ledger_writer;
pub mod record_extractor;
pub mod value_normalizer;
pub mod workbook_trait;

// 重导出核心类型
pub use aggregator::{AppendSummary, LedgerAggregator};
pub use consolidator::{Consolidator, FileOutcome, FileReport, RunPhase, RunReport, SkipReason};
pub use error::{ImportError, ImportResult};
pub use file_parser::{list_spreadsheet_files, CsvSourceWorkbook, ExcelSourceWorkbook, FileWorkbookOpener};
pub use format_detector::{Detection, FormatDetector};
pub use layout_catalog::LayoutCatalog;
pub use ledger_writer::CsvLedger;
pub use record_extractor::{ExtractOptions, RecordExtractor, SkippedBatch};

// 重导出 Trait 接口
pub use workbook_trait::{LedgerWorkbook, SourceWorkbook, WorkbookOpener};
