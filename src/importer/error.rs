// ==========================================
// 流向数据整理 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分级: 初始化 / 汇总表创建为致命错误，其余按文件或批次跳过
// ==========================================

use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 致命错误 =====
    #[error("运行环境初始化失败: {0}")]
    InitializationError(String),

    #[error("汇总文件创建失败 ({path}): {message}")]
    LedgerCreationError { path: String, message: String },

    // ===== 文件级错误（跳过该文件） =====
    #[error("文件打开失败 ({path}): {message}")]
    OpenError { path: String, message: String },

    #[error("表头读取失败: {0}")]
    DetectionError(String),

    #[error("追加数据失败: {0}")]
    AppendError(String),

    // ===== 批次级错误（跳过该批次） =====
    #[error("批次读取失败 (行 {start_row}-{end_row}): {message}")]
    ExtractionBatchError {
        start_row: usize,
        end_row: usize,
        message: String,
    },

    // ===== 格式目录错误 =====
    #[error("未找到格式定义: {0}")]
    LayoutNotFound(String),

    #[error("格式定义非法 ({layout}): {message}")]
    InvalidLayout { layout: String, message: String },

    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 配置错误 =====
    #[error("配置读取失败 (key: {key}): {message}")]
    ConfigReadError { key: String, message: String },

    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    ConfigValueError {
        key: String,
        value: String,
        message: String,
    },

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 是否终止整个运行
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ImportError::InitializationError(_) | ImportError::LedgerCreationError { .. }
        )
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::ConfigReadError {
            key: "<json>".to_string(),
            message: err.to_string(),
        }
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
