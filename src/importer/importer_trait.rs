// ==========================================
// 目录导入引擎 - 导入模块 Trait 定义
// ==========================================
// 职责: 定义文件解析与批次校验接口（不包含实现）
// ==========================================

use crate::domain::user::{ColumnAssociation, ProfileRecord};
use crate::importer::error::ImportResult;
use crate::importer::file_parser::CsvTable;
use crate::importer::report::ImportReport;
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

// ==========================================
// FileParser Trait
// ==========================================
// 实现者: DelimitedFileParser
pub trait FileParser: Send + Sync {
    /// 解析分隔符文件为表格（首个非空行为表头）
    ///
    /// # 参数
    /// - file_path: 文件路径
    ///
    /// # 返回
    /// - Ok(CsvTable): 表头 + 数据行 + 识别出的字符集
    /// - Err: 文件不存在、读取失败、格式错误
    fn parse_table(&self, file_path: &Path) -> ImportResult<CsvTable>;
}

// ==========================================
// ImportValidator Trait
// ==========================================
// 用途: 批次校验主入口
// 实现者: BatchSequencer
#[async_trait]
pub trait ImportValidator: Send + Sync {
    /// 校验一个批次目录
    ///
    /// # 参数
    /// - batch_root: 批次根目录（恰好包含一个导入目录）
    /// - association: 可选列关联（替代表头）
    /// - cancel: 取消令牌
    ///
    /// # 返回
    /// - Ok(ImportReport): 累积的错误 / 警告 / 记录
    /// - Err: 存储往返失败或被取消
    async fn validate(
        &self,
        batch_root: &Path,
        association: Option<&ColumnAssociation>,
        cancel: &CancellationToken,
    ) -> ImportResult<ImportReport>;
}

// ==========================================
// ConflictHandler Trait
// ==========================================
// 用途: 文件内重复 externalId 检测
// 实现者: ConflictHandlerImpl
pub trait ConflictHandler: Send + Sync {
    /// 检测同一文件内重复的 externalId
    ///
    /// # 返回
    /// - Vec<(记录下标, externalId)>: 重复记录（不包括第一次出现）
    fn detect_duplicates(&self, records: &[ProfileRecord]) -> Vec<(usize, String)>;
}
