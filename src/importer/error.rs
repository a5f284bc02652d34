// ==========================================
// 目录导入引擎 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 逐行校验错误进入 ImportReport，不走 Err
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 定义错误 =====
    #[error("Schema 定义无效 ({family}): {message}")]
    SchemaError { family: String, message: String },

    #[error("列关联定义无效: {0}")]
    AssociationError(String),

    // ===== 目录存储错误 =====
    #[error("无法解析标识: {0}")]
    Resolution(RepositoryError),

    #[error("导入已取消")]
    Cancelled,

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
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

// 实现 From<RepositoryError>
impl From<RepositoryError> for ImportError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Cancelled => ImportError::Cancelled,
            other => ImportError::Resolution(other),
        }
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
