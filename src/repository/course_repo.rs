// ==========================================
// 目录导入引擎 - 课程文档 Repository Trait
// ==========================================
// 职责: 定义课程文档存储接口（以 _id 为键的幂等 upsert）
// 红线: Repository 不含业务规则，只做数据读写
// ==========================================

use crate::domain::timetable::Course;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// CourseRepository Trait
// ==========================================
// 实现者: SqliteCourseRepository（JSON 文档）
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// 批量保存课程（按 _id upsert，单事务）
    ///
    /// # 返回
    /// - 写入的文档数
    async fn save_courses(&self, courses: &[Course]) -> RepositoryResult<usize>;

    /// 按 _id 查询课程
    async fn find_course(&self, id: &str) -> RepositoryResult<Option<Course>>;

    /// 查询机构的全部课程（按开始时间排序）
    async fn find_by_structure(&self, structure_id: &str) -> RepositoryResult<Vec<Course>>;

    /// 删除课程
    ///
    /// # 返回
    /// - true: 已删除
    /// - false: 不存在
    async fn delete_course(&self, id: &str) -> RepositoryResult<bool>;

    /// 统计机构的课程数
    async fn count_by_structure(&self, structure_id: &str) -> RepositoryResult<usize>;

    /// 删除机构内 modified 早于 before 的课程（本次导入未触及的课程）
    async fn delete_stale(&self, structure_id: &str, before: i64) -> RepositoryResult<usize>;
}
