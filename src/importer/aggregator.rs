// ==========================================
// 流向数据整理 - 汇总表追加
// ==========================================
// 职责: 把标准化记录追加到汇总表末尾并保存
// 红线: 每次追加前重新查询最后行号，不信任缓存的行计数
// 说明: 追加不是事务；保存失败时已写入的行保留
// ==========================================

use crate::domain::record::NormalizedRecord;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::workbook_trait::LedgerWorkbook;
use serde::Serialize;
use tracing::{debug, info, warn};

/// 默认每次写入的行数
pub const DEFAULT_WRITE_BATCH_SIZE: usize = 500;

// ==========================================
// AppendSummary - 单次追加结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppendSummary {
    pub start_row: usize,
    pub end_row: usize,
    pub rows_written: usize,
    pub rows_failed: usize,
}

impl AppendSummary {
    /// 合并同一文件的后续追加结果
    pub fn merge(self, next: AppendSummary) -> Self {
        Self {
            start_row: self.start_row,
            end_row: next.end_row,
            rows_written: self.rows_written + next.rows_written,
            rows_failed: self.rows_failed + next.rows_failed,
        }
    }
}

// ==========================================
// LedgerAggregator
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct LedgerAggregator {
    write_batch_size: usize,
    sheet: usize,
}

impl Default for LedgerAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WRITE_BATCH_SIZE)
    }
}

impl LedgerAggregator {
    pub fn new(write_batch_size: usize) -> Self {
        Self {
            write_batch_size: write_batch_size.max(1),
            sheet: 0,
        }
    }

    /// 追加记录
    ///
    /// # 参数
    /// - ledger: 汇总表
    /// - records: 按源顺序排列的记录（所有权移交）
    ///
    /// # 返回
    /// - Ok(None): 记录为空，未写入也未保存
    /// - Ok(Some(summary)): 写入范围与失败行数
    /// - Err(AppendError): 查询行号失败、全部行写入失败或保存失败
    ///
    /// # 流程
    /// 1. 查询下一空行
    /// 2. 分批写入；某批失败则逐行重试
    /// 3. 保存
    pub fn append(
        &self,
        ledger: &mut dyn LedgerWorkbook,
        records: Vec<NormalizedRecord>,
    ) -> ImportResult<Option<AppendSummary>> {
        if records.is_empty() {
            debug!("无记录可追加");
            return Ok(None);
        }

        let start_row = self.next_free_row(ledger)?;
        let mut rows_written = 0;
        let mut rows_failed = 0;

        for chunk in records.chunks(self.write_batch_size) {
            let row = self.next_free_row(ledger)?;
            match ledger.write_range(self.sheet, row, chunk) {
                Ok(()) => rows_written += chunk.len(),
                Err(e) => {
                    warn!(start_row = row, rows = chunk.len(), error = %e, "批量写入失败，改为逐行写入");
                    for record in chunk {
                        let row = self.next_free_row(ledger)?;
                        match ledger.write_range(self.sheet, row, std::slice::from_ref(record)) {
                            Ok(()) => rows_written += 1,
                            Err(e) => {
                                warn!(row, error = %e, "单行写入失败");
                                rows_failed += 1;
                            }
                        }
                    }
                }
            }
        }

        if rows_written == 0 {
            return Err(ImportError::AppendError(format!(
                "{} 行全部写入失败",
                rows_failed
            )));
        }

        ledger
            .save()
            .map_err(|e| ImportError::AppendError(format!("保存汇总文件失败: {}", e)))?;

        let summary = AppendSummary {
            start_row,
            end_row: start_row + rows_written.saturating_sub(1),
            rows_written,
            rows_failed,
        };
        info!(
            start_row = summary.start_row,
            end_row = summary.end_row,
            rows_written,
            rows_failed,
            "已追加数据到汇总文件"
        );
        Ok(Some(summary))
    }

    fn next_free_row(&self, ledger: &mut dyn LedgerWorkbook) -> ImportResult<usize> {
        ledger
            .last_data_row(self.sheet)
            .map(|last| last + 1)
            .map_err(|e| ImportError::AppendError(format!("查询汇总文件末行失败: {}", e)))
    }
}
