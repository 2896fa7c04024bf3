// ==========================================
// Mock 工作簿实现 - 用于集成测试
// ==========================================
// 内存中的源文件 / 汇总表，记录打开与关闭次数
// ==========================================

use flow_consolidator::domain::{CellValue, NormalizedRecord, RawRow};
use flow_consolidator::importer::{
    ImportError, ImportResult, LedgerWorkbook, SourceWorkbook, WorkbookOpener,
};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// 内存工作表（rows[0] 为表头）
#[derive(Debug, Clone, Default)]
pub struct MockSheet {
    pub rows: Vec<RawRow>,
    pub failing_rows: HashSet<usize>, // 读取范围包含这些行号时返回错误
    pub fail_header: bool,
}

impl MockSheet {
    pub fn new(header: RawRow, data: Vec<RawRow>) -> Self {
        let mut rows = vec![header];
        rows.extend(data);
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn with_failing_row(mut self, row: usize) -> Self {
        self.failing_rows.insert(row);
        self
    }
}

/// 共享计数与汇总表内容
#[derive(Debug, Default)]
pub struct MockState {
    pub opened: usize,
    pub closed: usize,
    pub ledger_created: usize,
    pub ledger_saves: usize,
    pub ledger_rows: Vec<Vec<String>>, // 已保存的行（含表头）
}

impl MockState {
    pub fn open_handles(&self) -> usize {
        self.opened - self.closed
    }
}

// ==========================================
// MockOpener
// ==========================================
#[derive(Default)]
pub struct MockOpener {
    files: HashMap<PathBuf, MockSheet>,
    fail_open: HashSet<PathBuf>,
    pub fail_create_ledger: bool,
    pub fail_save: bool,
    pub fail_save_after: Option<usize>, // 成功保存该次数后开始失败
    pub state: Rc<RefCell<MockState>>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: &str, sheet: MockSheet) -> Self {
        self.files.insert(PathBuf::from(name), sheet);
        self
    }

    pub fn with_broken_file(mut self, name: &str) -> Self {
        self.fail_open.insert(PathBuf::from(name));
        self
    }

    pub fn state(&self) -> Rc<RefCell<MockState>> {
        Rc::clone(&self.state)
    }
}

impl WorkbookOpener for MockOpener {
    fn open_workbook(&self, path: &Path) -> ImportResult<Box<dyn SourceWorkbook>> {
        if self.fail_open.contains(path) {
            return Err(ImportError::OpenError {
                path: path.display().to_string(),
                message: "文件已损坏".to_string(),
            });
        }
        let sheet = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| ImportError::FileNotFound(path.display().to_string()))?;
        self.state.borrow_mut().opened += 1;
        Ok(Box::new(MockSource {
            sheet,
            state: Rc::clone(&self.state),
            closed: false,
        }))
    }

    fn create_ledger(&self, path: &Path, headers: &[&str]) -> ImportResult<Box<dyn LedgerWorkbook>> {
        if self.fail_create_ledger {
            return Err(ImportError::LedgerCreationError {
                path: path.display().to_string(),
                message: "只读目录".to_string(),
            });
        }
        let mut state = self.state.borrow_mut();
        state.ledger_created += 1;
        state.ledger_rows = vec![headers.iter().map(|h| h.to_string()).collect()];
        Ok(Box::new(MockLedger {
            state: Rc::clone(&self.state),
            pending: Vec::new(),
            fail_save: self.fail_save,
            fail_save_after: self.fail_save_after,
        }))
    }
}

// ==========================================
// MockSource
// ==========================================
struct MockSource {
    sheet: MockSheet,
    state: Rc<RefCell<MockState>>,
    closed: bool,
}

impl MockSource {
    fn cell(&self, row: usize, col: usize) -> CellValue {
        self.sheet
            .rows
            .get(row - 1)
            .and_then(|r| r.get(col - 1))
            .cloned()
            .unwrap_or_default()
    }
}

impl SourceWorkbook for MockSource {
    fn header_row(&mut self, _sheet: usize, max_cols: usize) -> ImportResult<RawRow> {
        if self.sheet.fail_header {
            return Err(ImportError::ExcelParseError("表头不可读".to_string()));
        }
        Ok((1..=max_cols).map(|c| self.cell(1, c)).collect())
    }

    fn last_data_row(&mut self, _sheet: usize) -> ImportResult<usize> {
        Ok(self.sheet.rows.len().max(1))
    }

    fn read_range(
        &mut self,
        _sheet: usize,
        rows: RangeInclusive<usize>,
        cols: RangeInclusive<usize>,
    ) -> ImportResult<Vec<RawRow>> {
        if rows.clone().any(|r| self.sheet.failing_rows.contains(&r)) {
            return Err(ImportError::ExcelParseError(format!(
                "读取第 {}-{} 行失败",
                rows.start(),
                rows.end()
            )));
        }
        Ok(rows
            .map(|r| cols.clone().map(|c| self.cell(r, c)).collect())
            .collect())
    }

    fn close(&mut self) -> ImportResult<()> {
        if !self.closed {
            self.closed = true;
            self.state.borrow_mut().closed += 1;
        }
        Ok(())
    }
}

// ==========================================
// MockLedger
// ==========================================
struct MockLedger {
    state: Rc<RefCell<MockState>>,
    pending: Vec<Vec<String>>,
    fail_save: bool,
    fail_save_after: Option<usize>,
}

impl LedgerWorkbook for MockLedger {
    fn last_data_row(&mut self, _sheet: usize) -> ImportResult<usize> {
        Ok(self.state.borrow().ledger_rows.len() + self.pending.len())
    }

    fn write_range(
        &mut self,
        sheet: usize,
        start_row: usize,
        records: &[NormalizedRecord],
    ) -> ImportResult<()> {
        let expected = self.last_data_row(sheet)? + 1;
        if start_row != expected {
            return Err(ImportError::AppendError(format!(
                "期望第 {} 行，实际第 {} 行",
                expected, start_row
            )));
        }
        self.pending
            .extend(records.iter().map(NormalizedRecord::to_text_row));
        Ok(())
    }

    fn save(&mut self) -> ImportResult<()> {
        let exhausted = self
            .fail_save_after
            .is_some_and(|limit| self.state.borrow().ledger_saves >= limit);
        if self.fail_save || exhausted {
            self.pending.clear();
            return Err(ImportError::FileReadError("磁盘已满".to_string()));
        }
        let mut state = self.state.borrow_mut();
        state.ledger_rows.append(&mut self.pending);
        state.ledger_saves += 1;
        Ok(())
    }

    fn close(&mut self) -> ImportResult<()> {
        Ok(())
    }
}
