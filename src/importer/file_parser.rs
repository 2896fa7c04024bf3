// ==========================================
// 流向数据整理 - 源文件读取实现
// ==========================================
// 支持: Excel (.xlsx/.xlsm/.xlsb/.xls) / OpenDocument (.ods) / CSV (.csv)
// 职责: 源文件发现 + SourceWorkbook 实现 + WorkbookOpener
// ==========================================

use crate::domain::cell::{CellValue, RawRow};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::ledger_writer::CsvLedger;
use crate::importer::workbook_trait::{LedgerWorkbook, SourceWorkbook, WorkbookOpener};
use calamine::{open_workbook_auto, Data, Range, Reader as _, Sheets};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use csv::{ByteRecord, Reader, ReaderBuilder};
use glob::{glob_with, MatchOptions, Pattern};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 默认识别的源文件扩展名
pub const DEFAULT_EXTENSIONS: &[&str] = &["xls", "xlsx", "xlsm", "xlsb", "ods", "csv"];

const EXCEL_EXTENSIONS: &[&str] = &["xls", "xlsx", "xlsm", "xlsb", "ods"];

// ==========================================
// 源文件发现
// ==========================================

/// 列出目录下的表格文件（扩展名不区分大小写，按路径排序）
///
/// # 参数
/// - dir: 扫描目录（不递归）
/// - extensions: 扩展名列表（不含点）
/// - exclude: 需要排除的文件（通常为本次的汇总文件）
pub fn list_spreadsheet_files(
    dir: &Path,
    extensions: &[String],
    exclude: Option<&Path>,
) -> ImportResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ImportError::FileNotFound(dir.display().to_string()));
    }

    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };
    let base = Pattern::escape(&dir.to_string_lossy());

    let mut files = Vec::new();
    for ext in extensions {
        let pattern = format!("{}/*.{}", base, ext.trim_start_matches('.'));
        let entries = glob_with(&pattern, options)
            .map_err(|e| ImportError::FileReadError(format!("非法匹配模式 {}: {}", pattern, e)))?;
        for entry in entries {
            match entry {
                Ok(path) => files.push(path),
                Err(e) => warn!(error = %e, "目录项读取失败，已忽略"),
            }
        }
    }

    files.retain(|path| {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        // Excel 打开文件时生成的锁文件
        if name.starts_with("~$") {
            return false;
        }
        match exclude {
            Some(ex) => !same_file(path, ex),
            None => true,
        }
    });
    files.sort();
    files.dedup();
    Ok(files)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

// ==========================================
// Excel 源表实现（calamine）
// ==========================================
// 使用绝对坐标读取，保证第 1 列始终对应 A 列
pub struct ExcelSourceWorkbook {
    path: PathBuf,
    workbook: Option<Sheets<BufReader<File>>>,
    ranges: HashMap<usize, Range<Data>>,
}

impl ExcelSourceWorkbook {
    pub fn open(path: &Path) -> ImportResult<Self> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        let workbook = open_workbook_auto(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            workbook: Some(workbook),
            ranges: HashMap::new(),
        })
    }

    fn range(&mut self, sheet: usize) -> ImportResult<&Range<Data>> {
        let range = match self.ranges.entry(sheet) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let workbook = self.workbook.as_mut().ok_or_else(|| {
                    ImportError::FileReadError(format!("文件已关闭: {}", self.path.display()))
                })?;
                let range = workbook.worksheet_range_at(sheet).ok_or_else(|| {
                    ImportError::ExcelParseError(format!("工作表不存在: 第 {} 个", sheet + 1))
                })??;
                debug!(path = %self.path.display(), sheet, "工作表已加载");
                entry.insert(range)
            }
        };
        Ok(range)
    }
}

impl SourceWorkbook for ExcelSourceWorkbook {
    fn header_row(&mut self, sheet: usize, max_cols: usize) -> ImportResult<RawRow> {
        if max_cols == 0 {
            return Ok(Vec::new());
        }
        let mut rows = self.read_range(sheet, 1..=1, 1..=max_cols)?;
        Ok(rows.pop().unwrap_or_default())
    }

    fn last_data_row(&mut self, sheet: usize) -> ImportResult<usize> {
        let range = self.range(sheet)?;
        Ok(range.end().map(|(row, _)| row as usize + 1).unwrap_or(1).max(1))
    }

    fn read_range(
        &mut self,
        sheet: usize,
        rows: RangeInclusive<usize>,
        cols: RangeInclusive<usize>,
    ) -> ImportResult<Vec<RawRow>> {
        let range = self.range(sheet)?;
        Ok(rows
            .map(|row| {
                cols.clone()
                    .map(|col| {
                        if row == 0 || col == 0 {
                            return CellValue::Empty;
                        }
                        range
                            .get_value(((row - 1) as u32, (col - 1) as u32))
                            .map(cell_from_data)
                            .unwrap_or(CellValue::Empty)
                    })
                    .collect()
            })
            .collect())
    }

    fn close(&mut self) -> ImportResult<()> {
        self.ranges.clear();
        self.workbook = None;
        Ok(())
    }
}

/// calamine 单元格 → CellValue
fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Number(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

/// Excel 序列日期（1900 体系）→ NaiveDateTime
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

// ==========================================
// CSV 源表实现
// ==========================================
// 按需顺序读取，不整体载入；向回读取时重新打开文件
pub struct CsvSourceWorkbook {
    path: PathBuf,
    reader: Option<Reader<File>>,
    next_row: usize, // reader 下一条记录的行号（1 起）
    last_row: Option<usize>,
}

impl CsvSourceWorkbook {
    pub fn open(path: &Path) -> ImportResult<Self> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        Ok(Self {
            path: path.to_path_buf(),
            reader: Some(Self::reader_for(path)?),
            next_row: 1,
            last_row: None,
        })
    }

    fn reader_for(path: &Path) -> ImportResult<Reader<File>> {
        Ok(ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .from_path(path)?)
    }

    fn check_sheet(&self, sheet: usize) -> ImportResult<()> {
        if self.reader.is_none() {
            return Err(ImportError::FileReadError(format!(
                "文件已关闭: {}",
                self.path.display()
            )));
        }
        if sheet != 0 {
            return Err(ImportError::CsvParseError(format!(
                "CSV 只有一个工作表: 请求第 {} 个",
                sheet + 1
            )));
        }
        Ok(())
    }

    /// 读取下一条记录；文件结束返回 None
    fn next_line(&mut self) -> ImportResult<Option<Vec<String>>> {
        let reader = self.reader.as_mut().ok_or_else(|| {
            ImportError::FileReadError(format!("文件已关闭: {}", self.path.display()))
        })?;
        let mut record = ByteRecord::new();
        if !reader.read_byte_record(&mut record)? {
            return Ok(None);
        }
        let mut line: Vec<String> = record
            .iter()
            .map(|field| String::from_utf8_lossy(field).into_owned())
            .collect();

        // "CSV UTF-8" 导出带 BOM
        if self.next_row == 1 {
            if let Some(first) = line.first_mut() {
                if let Some(stripped) = first.strip_prefix('\u{feff}') {
                    *first = stripped.to_string();
                }
            }
        }
        self.next_row += 1;
        Ok(Some(line))
    }

    /// 定位到 row；row 在当前位置之前时重新打开
    fn seek(&mut self, row: usize) -> ImportResult<()> {
        if row < self.next_row {
            debug!(path = %self.path.display(), row, "向回读取，重新打开文件");
            self.reader = Some(Self::reader_for(&self.path)?);
            self.next_row = 1;
        }
        while self.next_row < row {
            if self.next_line()?.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// 单独扫描一遍统计行数，末尾空行不计（与 Excel 已用区域一致）
    fn count_rows(&self) -> ImportResult<usize> {
        let mut reader = Self::reader_for(&self.path)?;
        let mut record = ByteRecord::new();
        let mut row = 0;
        let mut last_non_blank = 0;
        while reader.read_byte_record(&mut record)? {
            row += 1;
            if record.iter().any(|field| !field.is_empty()) {
                last_non_blank = row;
            }
        }
        Ok(last_non_blank)
    }
}

impl SourceWorkbook for CsvSourceWorkbook {
    fn header_row(&mut self, sheet: usize, max_cols: usize) -> ImportResult<RawRow> {
        if max_cols == 0 {
            return Ok(Vec::new());
        }
        let mut rows = self.read_range(sheet, 1..=1, 1..=max_cols)?;
        Ok(rows.pop().unwrap_or_default())
    }

    fn last_data_row(&mut self, sheet: usize) -> ImportResult<usize> {
        self.check_sheet(sheet)?;
        let last_row = match self.last_row {
            Some(last_row) => last_row,
            None => {
                let counted = self.count_rows()?;
                self.last_row = Some(counted);
                counted
            }
        };
        Ok(last_row.max(1))
    }

    fn read_range(
        &mut self,
        sheet: usize,
        rows: RangeInclusive<usize>,
        cols: RangeInclusive<usize>,
    ) -> ImportResult<Vec<RawRow>> {
        self.check_sheet(sheet)?;
        self.seek((*rows.start()).max(1))?;

        let mut result = Vec::new();
        for row in rows {
            let line = if row == 0 { None } else { self.next_line()? };
            result.push(
                cols.clone()
                    .map(|col| {
                        line.as_ref()
                            .and_then(|l| col.checked_sub(1).and_then(|c| l.get(c)))
                            .filter(|v| !v.is_empty())
                            .map(|v| CellValue::Text(v.clone()))
                            .unwrap_or(CellValue::Empty)
                    })
                    .collect(),
            );
        }
        Ok(result)
    }

    fn close(&mut self) -> ImportResult<()> {
        self.reader = None;
        self.last_row = None;
        Ok(())
    }
}

// ==========================================
// 通用打开器（根据扩展名自动选择）
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct FileWorkbookOpener;

impl WorkbookOpener for FileWorkbookOpener {
    fn open_workbook(&self, path: &Path) -> ImportResult<Box<dyn SourceWorkbook>> {
        let ext = extension_of(path);
        let opened: ImportResult<Box<dyn SourceWorkbook>> = if ext == "csv" {
            CsvSourceWorkbook::open(path).map(|wb| Box::new(wb) as Box<dyn SourceWorkbook>)
        } else if EXCEL_EXTENSIONS.contains(&ext.as_str()) {
            ExcelSourceWorkbook::open(path).map(|wb| Box::new(wb) as Box<dyn SourceWorkbook>)
        } else {
            Err(ImportError::UnsupportedFormat(ext))
        };

        opened.map_err(|e| ImportError::OpenError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    fn create_ledger(&self, path: &Path, headers: &[&str]) -> ImportResult<Box<dyn LedgerWorkbook>> {
        CsvLedger::create(path, headers)
            .map(|ledger| Box::new(ledger) as Box<dyn LedgerWorkbook>)
            .map_err(|e| ImportError::LedgerCreationError {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }
}
