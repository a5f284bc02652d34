// ==========================================
// 目录导入引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供目录存储 / 课程文档存储接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod course_repo;
pub mod course_repo_impl;
pub mod directory_repo;
pub mod directory_repo_impl;
pub mod error;
pub mod retry;

// 重导出核心仓储
pub use course_repo::CourseRepository;
pub use course_repo_impl::SqliteCourseRepository;
pub use directory_repo::DirectoryRepository;
pub use directory_repo_impl::{NewDirectoryUser, SqliteDirectoryRepository};
pub use error::{RepositoryError, RepositoryResult};
pub use retry::{round_trip, RoundTripPolicy};
