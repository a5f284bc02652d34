// ==========================================
// 目录导入引擎 - 配置层
// ==========================================
// 职责: 系统配置读取与运行配置快照
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod feeder_settings;
pub mod import_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use feeder_settings::FeederSettings;
pub use import_config_trait::ImportConfigReader;
