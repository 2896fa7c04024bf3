// ==========================================
// 流向数据整理 - 源表格式识别
// ==========================================
// 职责: 表头行 → 目录中第一个指纹完全匹配的格式
// 红线: 多个格式同时匹配时，按目录登记顺序取第一个
// ==========================================

use crate::domain::cell::CellValue;
use crate::domain::layout::LayoutDefinition;
use crate::importer::layout_catalog::LayoutCatalog;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// 表头读取列数下限（A..Z）
pub const DEFAULT_HEADER_COLS: usize = 26;

// ==========================================
// Detection - 识别结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Detection<'a> {
    Layout(&'a LayoutDefinition),
    Unknown,
}

impl<'a> Detection<'a> {
    pub fn layout(&self) -> Option<&'a LayoutDefinition> {
        match self {
            Detection::Layout(layout) => Some(layout),
            Detection::Unknown => None,
        }
    }

    pub fn layout_id(&self) -> &'a str {
        match self {
            Detection::Layout(layout) => layout.id.as_str(),
            Detection::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Detection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.layout_id())
    }
}

// ==========================================
// FormatDetector
// ==========================================
pub struct FormatDetector<'a> {
    catalog: &'a LayoutCatalog,
    max_cols: usize,
}

impl<'a> FormatDetector<'a> {
    pub fn new(catalog: &'a LayoutCatalog) -> Self {
        Self::with_max_cols(catalog, DEFAULT_HEADER_COLS)
    }

    /// max_cols 不会小于目录中最大的指纹列号
    pub fn with_max_cols(catalog: &'a LayoutCatalog, max_cols: usize) -> Self {
        Self {
            catalog,
            max_cols: max_cols.max(catalog.max_fingerprint_column()),
        }
    }

    /// 表头需要读取的列数
    pub fn max_cols(&self) -> usize {
        self.max_cols
    }

    /// 识别表头行
    ///
    /// # 参数
    /// - header_row: 第 1 行单元格（下标 0 为第 1 列）
    ///
    /// # 返回
    /// - Detection::Layout: 第一个全部指纹列匹配的格式
    /// - Detection::Unknown: 无匹配
    pub fn detect(&self, header_row: &[CellValue]) -> Detection<'a> {
        let headers: HashMap<usize, String> = header_row
            .iter()
            .take(self.max_cols)
            .enumerate()
            .filter_map(|(idx, cell)| cell.header_text().map(|text| (idx + 1, text)))
            .collect();

        for layout in self.catalog.iter() {
            let matched = layout
                .fingerprint
                .iter()
                .all(|(col, expected)| headers.get(col) == Some(expected));
            if matched {
                debug!(layout = %layout.id, "表头指纹匹配");
                return Detection::Layout(layout);
            }
        }

        debug!(header_cells = headers.len(), "无匹配格式");
        Detection::Unknown
    }
}
