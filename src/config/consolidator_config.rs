// ==========================================
// 流向数据整理 - 运行配置
// ==========================================
// 职责: 配置加载（JSON 文件 → 环境变量覆写 → 默认值）与校验
// 默认: 源目录 = 用户下载目录，输出目录 = 用户桌面
// ==========================================

use crate::domain::layout::{DateStyle, LayoutDefinition};
use crate::importer::aggregator::DEFAULT_WRITE_BATCH_SIZE;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::DEFAULT_EXTENSIONS;
use crate::importer::format_detector::DEFAULT_HEADER_COLS;
use crate::importer::record_extractor::DEFAULT_BATCH_SIZE;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

// ==========================================
// 配置键 / 环境变量
// ==========================================
pub mod config_keys {
    pub const CONFIG_PATH_ENV: &str = "FLOW_CONSOLIDATOR_CONFIG";
    pub const WORK_DIR_ENV: &str = "FLOW_CONSOLIDATOR_WORK_DIR";
    pub const OUTPUT_DIR_ENV: &str = "FLOW_CONSOLIDATOR_OUTPUT_DIR";
    pub const BATCH_SIZE_ENV: &str = "FLOW_CONSOLIDATOR_BATCH_SIZE";

    pub const LEDGER_FILE_TEMPLATE: &str = "ledger_file_template";
    pub const BATCH_SIZE: &str = "batch_size";
    pub const WRITE_BATCH_SIZE: &str = "write_batch_size";
    pub const EXTENSIONS: &str = "extensions";
}

/// 汇总文件名中的日期占位符
pub const DATE_PLACEHOLDER: &str = "{date}";

pub const DEFAULT_LEDGER_FILE_TEMPLATE: &str = "湖北区域每日网上下载出库汇总{date}.csv";

// ==========================================
// 日志输出格式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

// ==========================================
// ConsolidatorConfig
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidatorConfig {
    pub work_dir: PathBuf,             // 源文件目录
    pub output_dir: PathBuf,           // 汇总文件目录
    pub ledger_file_template: String,  // 汇总文件名模板，{date} = 昨天
    pub batch_size: usize,             // 每批读取行数
    pub write_batch_size: usize,       // 每批写入行数
    pub max_header_cols: usize,        // 表头读取列数
    pub date_style: DateStyle,         // 日期列通用输出格式
    pub extensions: Vec<String>,       // 源文件扩展名
    pub extra_layouts: Vec<LayoutDefinition>, // 追加在内置格式之后
    pub log_format: LogFormat,
    pub write_report: bool,            // 是否在汇总文件旁输出运行报告 JSON
}

impl Default for ConsolidatorConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            output_dir: default_output_dir(),
            ledger_file_template: DEFAULT_LEDGER_FILE_TEMPLATE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            write_batch_size: DEFAULT_WRITE_BATCH_SIZE,
            max_header_cols: DEFAULT_HEADER_COLS,
            date_style: DateStyle::Hyphen,
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            extra_layouts: Vec::new(),
            log_format: LogFormat::Text,
            write_report: false,
        }
    }
}

fn default_work_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_output_dir() -> PathBuf {
    dirs::desktop_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

impl ConsolidatorConfig {
    /// 完整加载流程
    ///
    /// 1. 环境变量 FLOW_CONSOLIDATOR_CONFIG 指定的 JSON 文件（未设置则用默认值）
    /// 2. 环境变量覆写
    /// 3. 校验
    pub fn load() -> ImportResult<Self> {
        let mut config = match std::env::var(config_keys::CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件读取；未出现的键使用默认值
    pub fn from_file(path: &Path) -> ImportResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ImportError::ConfigReadError {
            key: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> ImportResult<Self> {
        serde_json::from_str(raw).map_err(|e| ImportError::ConfigReadError {
            key: "<json>".to_string(),
            message: e.to_string(),
        })
    }

    /// 环境变量覆写（lookup 便于测试注入）
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ImportResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = non_empty(config_keys::WORK_DIR_ENV) {
            debug!(work_dir = %dir, "环境变量覆写源目录");
            self.work_dir = PathBuf::from(dir.trim());
        }
        if let Some(dir) = non_empty(config_keys::OUTPUT_DIR_ENV) {
            debug!(output_dir = %dir, "环境变量覆写输出目录");
            self.output_dir = PathBuf::from(dir.trim());
        }
        if let Some(value) = non_empty(config_keys::BATCH_SIZE_ENV) {
            self.batch_size = value
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| ImportError::ConfigValueError {
                    key: config_keys::BATCH_SIZE.to_string(),
                    value: value.clone(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// 校验配置值
    pub fn validate(&self) -> ImportResult<()> {
        if self.batch_size == 0 {
            return Err(value_error(config_keys::BATCH_SIZE, "0", "必须大于 0"));
        }
        if self.write_batch_size == 0 {
            return Err(value_error(config_keys::WRITE_BATCH_SIZE, "0", "必须大于 0"));
        }
        if !self.ledger_file_template.contains(DATE_PLACEHOLDER) {
            return Err(value_error(
                config_keys::LEDGER_FILE_TEMPLATE,
                &self.ledger_file_template,
                "缺少 {date} 占位符",
            ));
        }
        if self.extensions.is_empty() {
            return Err(value_error(config_keys::EXTENSIONS, "[]", "至少需要一个扩展名"));
        }
        Ok(())
    }

    /// 汇总文件名：模板中的 {date} 替换为 today 前一天（YYYY-MM-DD）
    pub fn ledger_file_name(&self, today: NaiveDate) -> String {
        let yesterday = today - Duration::days(1);
        self.ledger_file_template
            .replace(DATE_PLACEHOLDER, &yesterday.format("%Y-%m-%d").to_string())
    }

    pub fn ledger_path(&self, today: NaiveDate) -> PathBuf {
        self.output_dir.join(self.ledger_file_name(today))
    }
}

fn value_error(key: &str, value: &str, message: &str) -> ImportError {
    ImportError::ConfigValueError {
        key: key.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    }
}
