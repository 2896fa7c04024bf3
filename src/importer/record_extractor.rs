// ==========================================
// 流向数据整理 - 记录提取器
// ==========================================
// 职责: 按识别出的格式逐批读取数据行 → 标准化六列记录
// 流程: 分批读取 → 跳过空行 → 列映射 → 空白规则 → 日期标准化
// 红线: 单批读取失败只跳过该批，不放弃整个文件
// ==========================================

use crate::domain::cell::{CellValue, RawRow};
use crate::domain::layout::{DateStyle, LayoutDefinition};
use crate::domain::record::{NormalizedRecord, RunStats};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::value_normalizer;
use crate::importer::workbook_trait::SourceWorkbook;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// 默认每批读取行数
pub const DEFAULT_BATCH_SIZE: usize = 1000;

// ==========================================
// ExtractOptions - 提取参数
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub batch_size: usize,
    pub date_style: DateStyle, // 目标第 1 列的通用日期格式
    pub sheet: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            date_style: DateStyle::Hyphen,
            sheet: 0,
        }
    }
}

// ==========================================
// SkippedBatch - 读取失败的批次
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedBatch {
    pub start_row: usize,
    pub end_row: usize,
    pub error: String,
}

// ==========================================
// RecordExtractor
// ==========================================
// 惰性迭代器；重新提取需新建（从第 2 行重新读取）
pub struct RecordExtractor<'a> {
    source: &'a mut dyn SourceWorkbook,
    layout: &'a LayoutDefinition,
    options: ExtractOptions,
    stats: &'a mut RunStats,
    max_col: usize,
    next_row: usize,
    last_row: usize,
    buffer: VecDeque<NormalizedRecord>,
    skipped_batches: Vec<SkippedBatch>,
}

impl<'a> RecordExtractor<'a> {
    /// 创建提取器
    ///
    /// 读取最后数据行，并把数据行数（不含表头）计入 total_rows_discovered
    ///
    /// # 返回
    /// - Err: 无法读取最后数据行
    pub fn new(
        source: &'a mut dyn SourceWorkbook,
        layout: &'a LayoutDefinition,
        options: ExtractOptions,
        stats: &'a mut RunStats,
    ) -> ImportResult<Self> {
        let last_row = source.last_data_row(options.sheet)?;
        let data_rows = last_row.saturating_sub(1);
        stats.total_rows_discovered += data_rows;

        debug!(layout = %layout.id, data_rows, batch_size = options.batch_size, "开始提取");

        Ok(Self {
            source,
            layout,
            options: ExtractOptions {
                batch_size: options.batch_size.max(1),
                ..options
            },
            stats,
            max_col: layout.max_source_column(),
            next_row: 2,
            last_row,
            buffer: VecDeque::new(),
            skipped_batches: Vec::new(),
        })
    }

    /// 数据行数（不含表头）
    pub fn data_rows(&self) -> usize {
        self.last_row.saturating_sub(1)
    }

    pub fn skipped_batches(&self) -> &[SkippedBatch] {
        &self.skipped_batches
    }

    pub fn into_skipped_batches(self) -> Vec<SkippedBatch> {
        self.skipped_batches
    }

    /// 读取下一批；读取失败记录为跳过批次
    fn load_next_batch(&mut self) {
        let start_row = self.next_row;
        let end_row = (start_row + self.options.batch_size - 1).min(self.last_row);
        self.next_row = end_row + 1;

        let rows = match self
            .source
            .read_range(self.options.sheet, start_row..=end_row, 1..=self.max_col)
        {
            Ok(rows) => rows,
            Err(e) => {
                let err = ImportError::ExtractionBatchError {
                    start_row,
                    end_row,
                    message: e.to_string(),
                };
                warn!(layout = %self.layout.id, error = %err, "批次读取失败，跳过该批次");
                self.stats.rows_in_failed_batches += end_row - start_row + 1;
                self.skipped_batches.push(SkippedBatch {
                    start_row,
                    end_row,
                    error: err.to_string(),
                });
                return;
            }
        };

        for raw in &rows {
            if raw.iter().all(CellValue::is_blank) {
                self.stats.blank_rows_skipped += 1;
                continue;
            }
            self.buffer
                .push_back(normalize_row(raw, self.layout, self.options.date_style));
        }
        debug!(start_row, end_row, buffered = self.buffer.len(), "批次读取完成");
    }
}

impl Iterator for RecordExtractor<'_> {
    type Item = NormalizedRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                self.stats.total_rows_captured += 1;
                return Some(record);
            }
            if self.next_row > self.last_row {
                return None;
            }
            self.load_next_batch();
        }
    }
}

/// 单行标准化
///
/// 第 1 目标列一律按日期处理，与格式是否声明日期列无关
pub fn normalize_row(raw: &RawRow, layout: &LayoutDefinition, date_style: DateStyle) -> NormalizedRecord {
    let mut record = NormalizedRecord::default();
    for mapping in &layout.columns {
        let value = raw
            .get(mapping.source - 1)
            .cloned()
            .unwrap_or(CellValue::Empty);
        let value = value_normalizer::apply_whitespace_rule(value, mapping.rule);
        let value = if mapping.dest == 1 {
            value_normalizer::normalize_date_token(value, layout, mapping.source, date_style)
        } else {
            value
        };
        record.set(mapping.dest, value);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::layout_catalog::LayoutCatalog;
    use std::collections::HashSet;
    use std::ops::RangeInclusive;

    // 内存源表：rows[0] 为表头
    struct MemorySheet {
        rows: Vec<RawRow>,
        failing_rows: HashSet<usize>,
        reads: usize,
    }

    impl MemorySheet {
        fn new(rows: Vec<RawRow>) -> Self {
            Self {
                rows,
                failing_rows: HashSet::new(),
                reads: 0,
            }
        }
    }

    impl SourceWorkbook for MemorySheet {
        fn header_row(&mut self, _sheet: usize, max_cols: usize) -> ImportResult<RawRow> {
            Ok(self.rows.first().cloned().unwrap_or_default().into_iter().take(max_cols).collect())
        }

        fn last_data_row(&mut self, _sheet: usize) -> ImportResult<usize> {
            Ok(self.rows.len().max(1))
        }

        fn read_range(
            &mut self,
            _sheet: usize,
            rows: RangeInclusive<usize>,
            cols: RangeInclusive<usize>,
        ) -> ImportResult<Vec<RawRow>> {
            self.reads += 1;
            if rows.clone().any(|r| self.failing_rows.contains(&r)) {
                return Err(ImportError::FileReadError("模拟读取故障".to_string()));
            }
            Ok(rows
                .map(|r| {
                    let row = self.rows.get(r - 1).cloned().unwrap_or_default();
                    cols.clone()
                        .map(|c| row.get(c - 1).cloned().unwrap_or_default())
                        .collect()
                })
                .collect())
        }

        fn close(&mut self) -> ImportResult<()> {
            Ok(())
        }
    }

    fn row(cells: &[Option<&str>]) -> RawRow {
        cells.iter().map(|c| CellValue::from(*c)).collect()
    }

    fn pattern1_header() -> RawRow {
        row(&[
            Some("销售日期"),
            Some("单位名称"),
            Some("商品名称"),
            Some("商品规格"),
            None,
            Some("销售数量"),
            None,
            Some("销售批号"),
        ])
    }

    fn pattern1_row(i: usize) -> RawRow {
        let spec = format!("SZ-{}", i);
        row(&[
            Some("2025-1-5"),
            Some("ACME Co"),
            Some("Widget"),
            Some(spec.as_str()),
            None,
            Some("120"),
            None,
            Some("B-771"),
        ])
    }

    fn extract_all(sheet: &mut MemorySheet, options: ExtractOptions, stats: &mut RunStats) -> Vec<NormalizedRecord> {
        let catalog = LayoutCatalog::builtin();
        let layout = catalog.lookup("pattern1").unwrap();
        RecordExtractor::new(sheet, layout, options, stats)
            .unwrap()
            .collect()
    }

    #[test]
    fn test_normalize_row_pattern1() {
        let catalog = LayoutCatalog::builtin();
        let layout = catalog.lookup("pattern1").unwrap();
        let raw = row(&[
            Some("2025-01-05"),
            Some("ACME Co"),
            Some("Widget"),
            Some("SZ-10"),
            None,
            Some("120"),
            None,
            Some("B-771"),
        ]);
        let record = normalize_row(&raw, layout, DateStyle::Hyphen);
        assert_eq!(
            record.to_text_row(),
            vec!["2025-01-05", "Widget", "SZ-10", "B-771", "ACMECo", "120"]
        );
    }

    #[test]
    fn test_normalize_row_short_raw_row() {
        let catalog = LayoutCatalog::builtin();
        let layout = catalog.lookup("pattern1").unwrap();
        let raw = row(&[Some("2025-01-05"), Some("ACME")]);
        let record = normalize_row(&raw, layout, DateStyle::Hyphen);
        assert_eq!(record.get(5), Some(&CellValue::text("ACME")));
        assert_eq!(record.get(4), Some(&CellValue::Empty));
    }

    #[test]
    fn test_normalize_row_pattern8_truncates_timestamp() {
        let catalog = LayoutCatalog::builtin();
        let layout = catalog.lookup("pattern8").unwrap();
        let mut raw = vec![CellValue::Empty; 15];
        raw[1] = CellValue::text("2025/1/5 10:22:33");
        raw[4] = CellValue::text("某 医药 公司");
        raw[6] = CellValue::text("阿莫西林");
        raw[7] = CellValue::text("0.25g *24");
        raw[11] = CellValue::Number(30.0);
        raw[14] = CellValue::text("A 001");
        let record = normalize_row(&raw, layout, DateStyle::Hyphen);
        assert_eq!(record.date(), &CellValue::text("2025-01-05"));
        assert_eq!(record.get(3), Some(&CellValue::text("0.25g*24")));
        assert_eq!(record.get(4), Some(&CellValue::text("A001")));
        assert_eq!(record.get(5), Some(&CellValue::text("某医药公司")));
        assert_eq!(record.get(6), Some(&CellValue::Number(30.0)));
    }

    #[test]
    fn test_normalize_row_pattern5_numeric_date() {
        let catalog = LayoutCatalog::builtin();
        let layout = catalog.lookup("pattern5").unwrap();
        let mut raw = vec![CellValue::Empty; 18];
        raw[2] = CellValue::Number(20250631.0);
        raw[9] = CellValue::text("通用名");
        let record = normalize_row(&raw, layout, DateStyle::Hyphen);
        assert_eq!(record.date(), &CellValue::text("2025/06/31"));
    }

    #[test]
    fn test_header_only_sheet_is_empty() {
        let mut sheet = MemorySheet::new(vec![pattern1_header()]);
        let mut stats = RunStats::default();
        let records = extract_all(&mut sheet, ExtractOptions::default(), &mut stats);
        assert!(records.is_empty());
        assert_eq!(stats, RunStats::default());
        assert_eq!(sheet.reads, 0);
    }

    #[test]
    fn test_blank_rows_skipped() {
        let mut rows = vec![pattern1_header(), pattern1_row(1)];
        rows.push(vec![CellValue::Empty; 8]);
        rows.push(row(&[Some(""), None, Some("")]));
        rows.push(pattern1_row(2));
        let mut sheet = MemorySheet::new(rows);
        let mut stats = RunStats::default();

        let records = extract_all(&mut sheet, ExtractOptions::default(), &mut stats);

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.slots().iter().all(CellValue::is_blank)));
        assert_eq!(stats.total_rows_discovered, 4);
        assert_eq!(stats.total_rows_captured, 2);
        assert_eq!(stats.blank_rows_skipped, 2);
    }

    #[test]
    fn test_batch_size_does_not_change_output() {
        let mut rows = vec![pattern1_header()];
        rows.extend((0..23).map(pattern1_row));

        let mut reference = None;
        for batch_size in [1, 4, 7, 23, 1000] {
            let mut sheet = MemorySheet::new(rows.clone());
            let mut stats = RunStats::default();
            let options = ExtractOptions {
                batch_size,
                ..Default::default()
            };
            let records = extract_all(&mut sheet, options, &mut stats);
            assert_eq!(records.len(), 23);
            assert_eq!(sheet.reads, 23usize.div_ceil(batch_size));
            match &reference {
                None => reference = Some(records),
                Some(expected) => assert_eq!(&records, expected, "batch_size = {}", batch_size),
            }
        }
    }

    #[test]
    fn test_failed_batch_is_skipped() {
        let mut rows = vec![pattern1_header()];
        rows.extend((0..10).map(pattern1_row));
        let mut sheet = MemorySheet::new(rows);
        // 第 2 批（行 6-9）读取失败
        sheet.failing_rows.insert(7);

        let catalog = LayoutCatalog::builtin();
        let layout = catalog.lookup("pattern1").unwrap();
        let mut stats = RunStats::default();
        let options = ExtractOptions {
            batch_size: 4,
            ..Default::default()
        };
        let mut extractor = RecordExtractor::new(&mut sheet, layout, options, &mut stats).unwrap();
        let records: Vec<_> = extractor.by_ref().collect();
        let skipped = extractor.into_skipped_batches();

        assert_eq!(records.len(), 6);
        assert_eq!(skipped.len(), 1);
        assert_eq!((skipped[0].start_row, skipped[0].end_row), (6, 9));
        assert_eq!(stats.total_rows_discovered, 10);
        assert_eq!(stats.total_rows_captured, 6);
        assert_eq!(stats.rows_in_failed_batches, 4);
        // 失败批次之后的数据仍被提取（源第 10、11 行 → SZ-8 / SZ-9）
        assert_eq!(records[5].get(3), Some(&CellValue::text("SZ-9")));
    }

    #[test]
    fn test_lazy_extraction_reads_on_demand() {
        let mut rows = vec![pattern1_header()];
        rows.extend((0..10).map(pattern1_row));
        let mut sheet = MemorySheet::new(rows);
        let catalog = LayoutCatalog::builtin();
        let layout = catalog.lookup("pattern1").unwrap();
        let mut stats = RunStats::default();
        let options = ExtractOptions {
            batch_size: 5,
            ..Default::default()
        };
        {
            let mut extractor = RecordExtractor::new(&mut sheet, layout, options, &mut stats).unwrap();
            assert!(extractor.next().is_some());
        }
        assert_eq!(sheet.reads, 1);
        assert_eq!(stats.total_rows_captured, 1);
    }
}
