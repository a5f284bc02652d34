// ==========================================
// 目录导入引擎 - CSV 导入层
// ==========================================
// 职责: 批次目录 → 带类型的档案记录 + 本地化报告
// 流程: 解析 → 列解析 → 标识解析 → 行转换 → 重复检测
// ==========================================

// 模块声明
pub mod batch_sequencer;
pub mod column_resolver;
pub mod conflict_handler;
pub mod error;
pub mod external_id_resolver;
pub mod file_parser;
pub mod importer_trait;
pub mod record_transformer;
pub mod report;
pub mod schema;
pub mod student_link;

// 重导出核心类型
pub use batch_sequencer::BatchSequencer;
pub use column_resolver::{ColumnResolver, ResolvedColumns};
pub use conflict_handler::ConflictHandler as ConflictHandlerImpl;
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvTable, DelimitedFileParser};
pub use report::{ImportReport, ReportEntry};
pub use schema::{ProfileSchema, SchemaRegistry};
pub use student_link::{link_key, DEFAULT_STUDENT_SEED};

// 重导出 Trait 接口
pub use importer_trait::{ConflictHandler, FileParser, ImportValidator};
