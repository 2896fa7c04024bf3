// ==========================================
// 流向数据整理 - 领域模型层
// ==========================================
// 职责: 单元格、源表格式、标准记录、运行统计
// 红线: 不含文件访问逻辑
// ==========================================

pub mod cell;
pub mod layout;
pub mod record;

// 重导出核心类型
pub use cell::{CellValue, RawRow};
pub use layout::{
    ColumnMapping, DateStyle, LayoutDefinition, NumericDateRule, WhitespaceRule, LEDGER_COLUMNS,
    LEDGER_HEADERS,
};
pub use record::{NormalizedRecord, RunStats};
