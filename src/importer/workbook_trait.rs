// ==========================================
// 流向数据整理 - 工作簿访问 Trait
// ==========================================
// 职责: 定义源表读取 / 汇总表写入接口（不包含实现）
// 约定: 行号、列号均从 1 开始；第 1 行为表头
// ==========================================

use crate::domain::cell::RawRow;
use crate::domain::record::NormalizedRecord;
use crate::importer::error::ImportResult;
use std::ops::RangeInclusive;
use std::path::Path;

// ==========================================
// SourceWorkbook Trait
// ==========================================
// 用途: 读取上游导出文件
// 实现者: ExcelSourceWorkbook, CsvSourceWorkbook
pub trait SourceWorkbook {
    /// 读取表头行
    ///
    /// # 参数
    /// - sheet: 工作表序号（0 起）
    /// - max_cols: 最多读取的列数
    fn header_row(&mut self, sheet: usize, max_cols: usize) -> ImportResult<RawRow>;

    /// 最后一个有数据的行号（空表返回 1）
    fn last_data_row(&mut self, sheet: usize) -> ImportResult<usize>;

    /// 读取矩形区域
    ///
    /// # 返回
    /// - 每行一个 RawRow，长度与 cols 对齐（下标 0 为 cols.start()）
    fn read_range(
        &mut self,
        sheet: usize,
        rows: RangeInclusive<usize>,
        cols: RangeInclusive<usize>,
    ) -> ImportResult<Vec<RawRow>>;

    /// 释放文件句柄
    fn close(&mut self) -> ImportResult<()>;
}

// ==========================================
// LedgerWorkbook Trait
// ==========================================
// 用途: 汇总表（整个运行期间唯一的可变共享状态）
// 实现者: CsvLedger
pub trait LedgerWorkbook {
    /// 最后一个已占用的行号（仅表头时返回 1）
    fn last_data_row(&mut self, sheet: usize) -> ImportResult<usize>;

    /// 从 start_row 开始写入记录
    fn write_range(
        &mut self,
        sheet: usize,
        start_row: usize,
        records: &[NormalizedRecord],
    ) -> ImportResult<()>;

    /// 持久化
    fn save(&mut self) -> ImportResult<()>;

    fn close(&mut self) -> ImportResult<()>;
}

// ==========================================
// WorkbookOpener Trait
// ==========================================
// 用途: 打开源文件 / 创建汇总表
// 实现者: FileWorkbookOpener
pub trait WorkbookOpener {
    /// 打开源文件
    ///
    /// # 返回
    /// - Err(OpenError): 文件损坏 / 被占用 / 格式不支持
    fn open_workbook(&self, path: &Path) -> ImportResult<Box<dyn SourceWorkbook>>;

    /// 创建汇总表并写入表头
    ///
    /// # 返回
    /// - Err(LedgerCreationError): 无法创建
    fn create_ledger(&self, path: &Path, headers: &[&str]) -> ImportResult<Box<dyn LedgerWorkbook>>;
}
