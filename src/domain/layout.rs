// ==========================================
// 流向数据整理 - 源表格式定义
// ==========================================
// 职责: 表头指纹 + 列映射 + 单列例外规则
// 红线: 列映射必须覆盖目标列 1..=6，且一一对应
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 汇总表固定列数
pub const LEDGER_COLUMNS: usize = 6;

/// 汇总表表头（日期, 品种, 规格, 批号, 流向单位, 数量）
pub const LEDGER_HEADERS: [&str; LEDGER_COLUMNS] = ["日期", "品种", "规格", "批号", "流向单位", "数量"];

// ==========================================
// 日期输出格式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateStyle {
    #[default]
    Hyphen, // YYYY-MM-DD
    Slash,  // YYYY/MM/DD
}

impl DateStyle {
    pub fn separator(self) -> char {
        match self {
            DateStyle::Hyphen => '-',
            DateStyle::Slash => '/',
        }
    }
}

impl fmt::Display for DateStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateStyle::Hyphen => write!(f, "YYYY-MM-DD"),
            DateStyle::Slash => write!(f, "YYYY/MM/DD"),
        }
    }
}

// ==========================================
// 空白处理规则（按列）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhitespaceRule {
    #[default]
    RemoveAll,            // 删除全部空白
    TruncateAtFirstSpace, // 截断首个空白及其后内容
}

// ==========================================
// ColumnMapping - 源列 → 目标列
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub source: usize, // 源列（1 起）
    pub dest: usize,   // 目标列（1..=6）
    #[serde(default)]
    pub rule: WhitespaceRule,
}

impl ColumnMapping {
    pub fn new(source: usize, dest: usize) -> Self {
        Self {
            source,
            dest,
            rule: WhitespaceRule::RemoveAll,
        }
    }

    pub fn with_rule(mut self, rule: WhitespaceRule) -> Self {
        self.rule = rule;
        self
    }
}

// ==========================================
// NumericDateRule - 8 位数字日期列
// ==========================================
// 仅作用于指定源列，数值 20250105 → 按 style 输出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericDateRule {
    pub column: usize,
    #[serde(default)]
    pub style: DateStyle,
}

// ==========================================
// LayoutDefinition - 源表格式
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutDefinition {
    pub id: String,
    pub fingerprint: BTreeMap<usize, String>,
    pub columns: Vec<ColumnMapping>,
    #[serde(default)]
    pub numeric_date: Option<NumericDateRule>,
}

impl LayoutDefinition {
    /// 由 (列号, 表头) 与 (源列, 目标列) 构造
    pub fn new(id: &str, fingerprint: &[(usize, &str)], mapping: &[(usize, usize)]) -> Self {
        Self {
            id: id.to_string(),
            fingerprint: fingerprint
                .iter()
                .map(|(col, text)| (*col, text.to_string()))
                .collect(),
            columns: mapping
                .iter()
                .map(|(source, dest)| ColumnMapping::new(*source, *dest))
                .collect(),
            numeric_date: None,
        }
    }

    pub fn with_numeric_date(mut self, column: usize, style: DateStyle) -> Self {
        self.numeric_date = Some(NumericDateRule { column, style });
        self
    }

    /// 为指定源列设置空白处理规则
    pub fn with_column_rule(mut self, source: usize, rule: WhitespaceRule) -> Self {
        for mapping in self.columns.iter_mut().filter(|m| m.source == source) {
            mapping.rule = rule;
        }
        self
    }

    /// 读取数据时需要的最大源列
    pub fn max_source_column(&self) -> usize {
        self.columns.iter().map(|m| m.source).max().unwrap_or(0)
    }

    pub fn max_fingerprint_column(&self) -> usize {
        self.fingerprint.keys().copied().max().unwrap_or(0)
    }

    /// 源列 → 目标列
    pub fn dest_of(&self, source: usize) -> Option<usize> {
        self.columns
            .iter()
            .find(|m| m.source == source)
            .map(|m| m.dest)
    }

    /// 校验列映射与日期规则
    ///
    /// # 返回
    /// - Ok(()): 合法
    /// - Err(String): 违规说明
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("格式标识为空".to_string());
        }
        if self.fingerprint.is_empty() {
            return Err("表头指纹为空".to_string());
        }
        if let Some(col) = self.fingerprint.keys().find(|c| **c == 0) {
            return Err(format!("表头指纹列号必须从 1 开始: {}", col));
        }

        let mut seen_dest = [false; LEDGER_COLUMNS];
        let mut seen_source = Vec::with_capacity(self.columns.len());
        for mapping in &self.columns {
            if mapping.source == 0 {
                return Err("源列号必须从 1 开始".to_string());
            }
            if !(1..=LEDGER_COLUMNS).contains(&mapping.dest) {
                return Err(format!("目标列超出范围 1..={}: {}", LEDGER_COLUMNS, mapping.dest));
            }
            if seen_dest[mapping.dest - 1] {
                return Err(format!("目标列重复: {}", mapping.dest));
            }
            if seen_source.contains(&mapping.source) {
                return Err(format!("源列重复: {}", mapping.source));
            }
            seen_dest[mapping.dest - 1] = true;
            seen_source.push(mapping.source);
        }
        if let Some(missing) = seen_dest.iter().position(|seen| !seen) {
            return Err(format!("目标列未覆盖: {}", missing + 1));
        }

        if let Some(rule) = &self.numeric_date {
            if self.dest_of(rule.column).is_none() {
                return Err(format!("日期列 {} 不在列映射中", rule.column));
            }
        }
        Ok(())
    }
}
