// ==========================================
// 目录导入引擎 - 课表导入错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimetableError {
    // ===== 输入错误 =====
    #[error("机构不存在: UAI={0}")]
    InvalidStructure(String),

    #[error("XML 解析失败: {0}")]
    Xml(String),

    #[error("课表文档无效: {0}")]
    InvalidDocument(String),

    #[error("未知课时: {0}")]
    UnknownSlot(u32),

    // ===== 教职工匹配 =====
    #[error("not.found.users.not.empty: 仍有 {remaining} 名教职工未匹配")]
    MatchingExhausted { remaining: usize },

    // ===== 存储错误 =====
    #[error("目录存储往返失败: {0}")]
    Resolution(RepositoryError),

    #[error("事务提交失败: {0}")]
    Transaction(String),

    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("课表导入已取消")]
    Cancelled,
}

impl From<quick_xml::Error> for TimetableError {
    fn from(err: quick_xml::Error) -> Self {
        TimetableError::Xml(err.to_string())
    }
}

impl From<RepositoryError> for TimetableError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Cancelled => TimetableError::Cancelled,
            RepositoryError::DatabaseTransactionError(msg) => TimetableError::Transaction(msg),
            other => TimetableError::Resolution(other),
        }
    }
}

pub type TimetableResult<T> = Result<T, TimetableError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_mapping() {
        assert!(matches!(
            TimetableError::from(RepositoryError::Cancelled),
            TimetableError::Cancelled
        ));
        assert!(matches!(
            TimetableError::from(RepositoryError::DatabaseTransactionError("x".into())),
            TimetableError::Transaction(_)
        ));
        assert!(matches!(
            TimetableError::from(RepositoryError::LockError("x".into())),
            TimetableError::Resolution(_)
        ));
    }

    #[test]
    fn test_matching_exhausted_message() {
        let err = TimetableError::MatchingExhausted { remaining: 2 };
        assert!(err.to_string().starts_with("not.found.users.not.empty"));
    }
}
