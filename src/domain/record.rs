// ==========================================
// 流向数据整理 - 标准记录与运行统计
// ==========================================

use crate::domain::cell::CellValue;
use crate::domain::layout::LEDGER_COLUMNS;
use serde::{Deserialize, Serialize};

// ==========================================
// NormalizedRecord - 标准化六列记录
// ==========================================
// 列顺序: 日期, 品种, 规格, 批号, 流向单位, 数量
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    slots: [CellValue; LEDGER_COLUMNS],
}

impl NormalizedRecord {
    pub fn new(slots: [CellValue; LEDGER_COLUMNS]) -> Self {
        Self { slots }
    }

    /// 按目标列（1 起）写入
    pub fn set(&mut self, dest: usize, value: CellValue) {
        if let Some(slot) = dest.checked_sub(1).and_then(|i| self.slots.get_mut(i)) {
            *slot = value;
        }
    }

    /// 按目标列（1 起）读取
    pub fn get(&self, dest: usize) -> Option<&CellValue> {
        dest.checked_sub(1).and_then(|i| self.slots.get(i))
    }

    pub fn date(&self) -> &CellValue {
        &self.slots[0]
    }

    pub fn slots(&self) -> &[CellValue; LEDGER_COLUMNS] {
        &self.slots
    }

    /// 输出文本（写入汇总表）
    pub fn to_text_row(&self) -> Vec<String> {
        self.slots.iter().map(|v| v.to_string()).collect()
    }
}

// ==========================================
// RunStats - 运行计数
// ==========================================
// 每次运行新建；仅由 RecordExtractor 累加
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_rows_discovered: usize, // 已识别文件的数据行数（不含表头）
    pub total_rows_captured: usize,   // 实际提取的记录数
    pub blank_rows_skipped: usize,    // 跳过的空行
    pub rows_in_failed_batches: usize, // 读取失败批次中的行
}

impl RunStats {
    /// 处理率（0.0 ~ 1.0），无数据时返回 None
    pub fn completeness_ratio(&self) -> Option<f64> {
        if self.total_rows_discovered == 0 {
            None
        } else {
            Some(self.total_rows_captured as f64 / self.total_rows_discovered as f64)
        }
    }

    /// 未提取行数
    pub fn shortfall(&self) -> usize {
        self.total_rows_discovered
            .saturating_sub(self.total_rows_captured)
    }
}
