// ==========================================
// 流向数据整理 - 配置层
// ==========================================
// 职责: 运行配置加载、环境变量覆写、校验
// 存储: JSON 文件（可选）
// ==========================================

pub mod consolidator_config;

// 重导出核心配置
pub use consolidator_config::{config_keys, ConsolidatorConfig, LogFormat};
