// ==========================================
// 流向数据整理 - 源表格式目录
// ==========================================
// 职责: 登记已知上游导出格式（表头指纹 + 列映射 + 例外规则）
// 红线: 新增上游格式只新增目录条目，不修改提取逻辑
// 顺序: 登记顺序即识别优先级
// ==========================================

use crate::domain::layout::{DateStyle, LayoutDefinition, WhitespaceRule};
use crate::importer::error::{ImportError, ImportResult};
use std::collections::HashSet;

// ==========================================
// LayoutCatalog - 格式目录（构造后只读）
// ==========================================
#[derive(Debug, Clone)]
pub struct LayoutCatalog {
    layouts: Vec<LayoutDefinition>,
}

impl LayoutCatalog {
    /// 由格式列表构造，逐条校验
    ///
    /// # 返回
    /// - Err(InvalidLayout): 列映射非双射 / 格式标识重复等
    pub fn new(layouts: Vec<LayoutDefinition>) -> ImportResult<Self> {
        let mut ids = HashSet::new();
        for layout in &layouts {
            layout
                .validate()
                .map_err(|message| ImportError::InvalidLayout {
                    layout: layout.id.clone(),
                    message,
                })?;
            if !ids.insert(layout.id.as_str()) {
                return Err(ImportError::InvalidLayout {
                    layout: layout.id.clone(),
                    message: "格式标识重复".to_string(),
                });
            }
        }
        Ok(Self { layouts })
    }

    /// 内置格式目录
    pub fn builtin() -> Self {
        Self {
            layouts: builtin_layouts(),
        }
    }

    /// 在内置格式之后追加自定义格式（内置格式优先）
    pub fn with_extra_layouts(self, extra: Vec<LayoutDefinition>) -> ImportResult<Self> {
        let mut layouts = self.layouts;
        layouts.extend(extra);
        Self::new(layouts)
    }

    /// 按标识查找
    pub fn lookup(&self, name: &str) -> ImportResult<&LayoutDefinition> {
        self.layouts
            .iter()
            .find(|l| l.id == name)
            .ok_or_else(|| ImportError::LayoutNotFound(name.to_string()))
    }

    /// 按登记顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &LayoutDefinition> {
        self.layouts.iter()
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// 识别表头需要读取的列数
    pub fn max_fingerprint_column(&self) -> usize {
        self.layouts
            .iter()
            .map(LayoutDefinition::max_fingerprint_column)
            .max()
            .unwrap_or(0)
    }
}

impl Default for LayoutCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

// ==========================================
// 内置格式
// ==========================================
// 目标列: 1 日期 / 2 品种 / 3 规格 / 4 批号 / 5 流向单位 / 6 数量
fn builtin_layouts() -> Vec<LayoutDefinition> {
    vec![
        LayoutDefinition::new(
            "pattern1",
            &[(1, "销售日期"), (2, "单位名称"), (3, "商品名称"), (4, "商品规格"), (6, "销售数量"), (8, "销售批号")],
            &[(1, 1), (3, 2), (4, 3), (8, 4), (2, 5), (6, 6)],
        ),
        LayoutDefinition::new(
            "pattern2",
            &[(1, "日期"), (5, "销往单位"), (9, "药品名称"), (11, "规格"), (12, "数量"), (14, "批号")],
            &[(1, 1), (9, 2), (11, 3), (14, 4), (5, 5), (12, 6)],
        ),
        LayoutDefinition::new(
            "pattern3",
            &[(1, "销售日期"), (4, "销售商"), (6, "商品名称"), (7, "商品规格"), (10, "数量"), (13, "批号")],
            &[(1, 1), (6, 2), (7, 3), (13, 4), (4, 5), (10, 6)],
        ),
        LayoutDefinition::new(
            "pattern4",
            &[(1, "销售日期"), (4, "销售商"), (6, "商品名称"), (7, "商品规格"), (10, "批号"), (11, "数量")],
            &[(1, 1), (6, 2), (7, 3), (10, 4), (4, 5), (11, 6)],
        ),
        // 销售时间为 8 位数字（20250105）
        LayoutDefinition::new(
            "pattern5",
            &[(3, "销售时间"), (5, "客户名称"), (10, "通用名"), (14, "规格"), (16, "供应商批次"), (18, "销售数量")],
            &[(3, 1), (10, 2), (14, 3), (16, 4), (5, 5), (18, 6)],
        )
        .with_numeric_date(3, DateStyle::Slash),
        LayoutDefinition::new(
            "pattern6",
            &[(3, "发票日期"), (5, "客户"), (9, "商品名称"), (10, "商品规格"), (12, "开票数量"), (16, "批号")],
            &[(3, 1), (9, 2), (10, 3), (16, 4), (5, 5), (12, 6)],
        ),
        LayoutDefinition::new(
            "pattern7",
            &[(3, "出库日期"), (12, "客户名称"), (6, "商品名称"), (7, "品种规格"), (9, "数量"), (8, "批号")],
            &[(3, 1), (6, 2), (7, 3), (8, 4), (12, 5), (9, 6)],
        ),
        // 制单时间带时分秒，只保留日期部分
        LayoutDefinition::new(
            "pattern8",
            &[(2, "制单时间"), (5, "客户名称"), (7, "品名"), (8, "品规"), (12, "订单数量"), (15, "批号")],
            &[(2, 1), (7, 2), (8, 3), (15, 4), (5, 5), (12, 6)],
        )
        .with_column_rule(2, WhitespaceRule::TruncateAtFirstSpace),
        LayoutDefinition::new(
            "pattern9",
            &[(7, "出库日期"), (20, "下游收货方名称"), (21, "产品名称"), (22, "产品规格"), (24, "数量"), (25, "原始批号")],
            &[(7, 1), (21, 2), (22, 3), (25, 4), (20, 5), (24, 6)],
        ),
    ]
}
