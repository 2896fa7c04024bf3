// ==========================================
// 流向数据整理 - 汇总表写入实现
// ==========================================
// 格式: UTF-8 (BOM) CSV，Excel 可直接打开
// 职责: 末行查询 / 追加写入 / 保存
// 红线: 末行号 = 已保存行数 + 未保存行数；保存失败后从磁盘重新统计
// ==========================================

use crate::domain::record::NormalizedRecord;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::workbook_trait::LedgerWorkbook;
use csv::{ReaderBuilder, WriterBuilder};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// ==========================================
// CsvLedger
// ==========================================
pub struct CsvLedger {
    path: PathBuf,
    pending: Vec<Vec<String>>,
    saved_rows: Option<usize>, // None = 需要从磁盘重新统计
    closed: bool,
}

impl CsvLedger {
    /// 创建汇总文件（已存在则覆盖）并写入表头
    pub fn create(path: &Path, headers: &[&str]) -> ImportResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = File::create(path)?;
        file.write_all(UTF8_BOM)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(headers)?;
        writer.flush()?;

        debug!(path = %path.display(), "汇总文件已创建");
        Ok(Self {
            path: path.to_path_buf(),
            pending: Vec::new(),
            saved_rows: Some(1),
            closed: false,
        })
    }

    /// 读取汇总文件全部行（含表头，已去除 BOM）
    pub fn read_all(path: &Path) -> ImportResult<Vec<Vec<String>>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;
        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(
                record
                    .iter()
                    .map(|v| v.trim_start_matches('\u{feff}').to_string())
                    .collect(),
            );
        }
        Ok(rows)
    }

    fn saved_rows(&mut self) -> ImportResult<usize> {
        match self.saved_rows {
            Some(rows) => Ok(rows),
            None => {
                let rows = self.rows_on_disk()?;
                debug!(path = %self.path.display(), rows, "从磁盘重新统计汇总文件行数");
                self.saved_rows = Some(rows);
                Ok(rows)
            }
        }
    }

    fn append_to_disk(&self, rows: &[Vec<String>]) -> ImportResult<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        for row in rows {
            writer.write_record(row)?;
        }
        let file = writer
            .into_inner()
            .map_err(|e| ImportError::AppendError(e.to_string()))?;
        file.sync_all()?;
        Ok(())
    }

    fn rows_on_disk(&self) -> ImportResult<usize> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;
        let mut count = 0;
        for result in reader.byte_records() {
            result?;
            count += 1;
        }
        Ok(count)
    }

    fn ensure_open(&self) -> ImportResult<()> {
        if self.closed {
            return Err(ImportError::AppendError(format!(
                "汇总文件已关闭: {}",
                self.path.display()
            )));
        }
        Ok(())
    }
}

impl LedgerWorkbook for CsvLedger {
    fn last_data_row(&mut self, sheet: usize) -> ImportResult<usize> {
        self.ensure_open()?;
        if sheet != 0 {
            return Err(ImportError::AppendError(format!("汇总文件只有一个工作表: 请求第 {} 个", sheet + 1)));
        }
        Ok((self.saved_rows()? + self.pending.len()).max(1))
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
                "写入位置不连续: 期望第 {} 行，实际第 {} 行",
                expected, start_row
            )));
        }
        self.pending
            .extend(records.iter().map(NormalizedRecord::to_text_row));
        Ok(())
    }

    /// 将未保存的行追加到文件末尾
    ///
    /// 中途失败时已写入磁盘的行保留，未写入的行丢弃
    fn save(&mut self) -> ImportResult<()> {
        self.ensure_open()?;
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        let saved = self.saved_rows()?;

        if let Err(e) = self.append_to_disk(&pending) {
            // 部分行可能已落盘，下次查询时重新统计
            self.saved_rows = None;
            return Err(e);
        }
        self.saved_rows = Some(saved + pending.len());

        debug!(path = %self.path.display(), rows = pending.len(), "汇总文件已保存");
        Ok(())
    }

    fn close(&mut self) -> ImportResult<()> {
        if !self.pending.is_empty() {
            warn!(rows = self.pending.len(), "关闭汇总文件时仍有未保存的行，已丢弃");
            self.pending.clear();
        }
        self.closed = true;
        Ok(())
    }
}
