// ==========================================
// 目录导入引擎 - 核心库
// ==========================================
// 职责: CSV 批次校验 + EDT 课表导入，对目录存储做批量往返
// 技术栈: Rust + SQLite + tokio
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "fr");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 目录存储 / 课程文档存储
pub mod repository;

// 导入层 - CSV 校验管道
pub mod importer;

// 课表层 - EDT 导入
pub mod timetable;

// 配置层 - 运行配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/表结构）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{FieldType, ItemKind, Profile, RecordState};

// 领域实体
pub use domain::{ColumnAssociation, Course, ProfileRecord, Structure};

// 导入
pub use importer::{BatchSequencer, ImportError, ImportReport, ImportValidator};

// 课表
pub use timetable::{EdtImporter, TimetableError, TimetableReport};

// 配置
pub use config::{ConfigManager, FeederSettings};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "ENT 目录导入引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
