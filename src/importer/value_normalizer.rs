// ==========================================
// 流向数据整理 - 单元格值标准化
// ==========================================
// 职责: 去空白 / 截断 / 日期表示统一
// 红线: 无法识别的值原样返回，不报错
// ==========================================

use crate::domain::cell::CellValue;
use crate::domain::layout::{DateStyle, LayoutDefinition, WhitespaceRule};

/// 删除文本中的全部空白字符；非文本原样返回
pub fn strip_spaces(value: CellValue) -> CellValue {
    match value {
        CellValue::Text(s) if s.chars().any(char::is_whitespace) => {
            CellValue::Text(s.chars().filter(|c| !c.is_whitespace()).collect())
        }
        other => other,
    }
}

/// 保留首个空白之前的内容（"2025-01-05 10:22:33" → "2025-01-05"）
pub fn truncate_at_first_space(value: CellValue) -> CellValue {
    match value {
        CellValue::Text(s) => match s.find(char::is_whitespace) {
            Some(idx) => CellValue::Text(s[..idx].to_string()),
            None => CellValue::Text(s),
        },
        other => other,
    }
}

/// 按列规则处理空白
pub fn apply_whitespace_rule(value: CellValue, rule: WhitespaceRule) -> CellValue {
    match rule {
        WhitespaceRule::RemoveAll => strip_spaces(value),
        WhitespaceRule::TruncateAtFirstSpace => truncate_at_first_space(value),
    }
}

/// 日期标准化入口
///
/// # 参数
/// - value: 已做空白处理的值
/// - layout: 当前格式
/// - source_column: 源列号（1 起）
/// - style: 通用路径输出格式
///
/// # 逻辑
/// 1. 源列为格式声明的数字日期列，且值为 8 位整数 → 按该列规则格式输出（结果不再二次处理）
/// 2. 其余情况走通用路径
pub fn normalize_date_token(
    value: CellValue,
    layout: &LayoutDefinition,
    source_column: usize,
    style: DateStyle,
) -> CellValue {
    if let Some(rule) = layout.numeric_date.filter(|r| r.column == source_column) {
        if let Some(text) = value.as_integer().and_then(|n| format_yyyymmdd(n, rule.style)) {
            return CellValue::Text(text);
        }
    }
    normalize_general_date(value, style)
}

/// 通用日期路径
///
/// - 8 位整数 / 8 位数字文本 → YYYY{sep}MM{sep}DD
/// - 含 "/" 或 "-" 且恰为三段 → 统一分隔符，月日补零
/// - 日期时间单元格 → 取日期部分
pub fn normalize_general_date(value: CellValue, style: DateStyle) -> CellValue {
    match value {
        CellValue::Number(_) => match value.as_integer().and_then(|n| format_yyyymmdd(n, style)) {
            Some(text) => CellValue::Text(text),
            None => value,
        },
        CellValue::Text(ref s) => match normalize_date_text(s, style) {
            Some(text) => CellValue::Text(text),
            None => value,
        },
        CellValue::DateTime(dt) => {
            let sep = style.separator();
            CellValue::Text(dt.format(&format!("%Y{sep}%m{sep}%d")).to_string())
        }
        other => other,
    }
}

/// 20250631 → "2025-06-31"（不校验日历合法性）
fn format_yyyymmdd(value: i64, style: DateStyle) -> Option<String> {
    if !(10_000_000..=99_999_999).contains(&value) {
        return None;
    }
    let digits = value.to_string();
    Some(join_date_parts(&digits[..4], &digits[4..6], &digits[6..8], style))
}

fn normalize_date_text(text: &str, style: DateStyle) -> Option<String> {
    if text.contains('/') || text.contains('-') {
        let parts: Vec<&str> = text.split(['/', '-']).collect();
        if let [year, month, day] = parts.as_slice() {
            return Some(join_date_parts(year, month, day, style));
        }
        return None;
    }

    let trimmed = text.trim();
    if trimmed.len() == 8 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Some(join_date_parts(&trimmed[..4], &trimmed[4..6], &trimmed[6..8], style));
    }
    None
}

fn join_date_parts(year: &str, month: &str, day: &str, style: DateStyle) -> String {
    let sep = style.separator();
    format!("{year}{sep}{month:0>2}{sep}{day:0>2}")
}
