// ==========================================
// 流向数据整理 - 核心库
// ==========================================
// 职责: 把多种格式的销售流向表格整理为统一六列汇总表
// 六列: 日期 / 品种 / 规格 / 批号 / 流向单位 / 数量
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 单元格、格式定义、标准记录
pub mod domain;

// 导入层 - 识别、提取、汇总
pub mod importer;

// 配置层 - 运行配置
pub mod config;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

pub use config::ConsolidatorConfig;
pub use domain::{CellValue, LayoutDefinition, NormalizedRecord, RunStats};
pub use importer::{
    Consolidator, FileOutcome, FileReport, FileWorkbookOpener, ImportError, ImportResult,
    LayoutCatalog, RunPhase, RunReport,
};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "流向数据整理";
