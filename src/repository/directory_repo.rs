// ==========================================
// 目录导入引擎 - 目录存储 Repository Trait
// ==========================================
// 职责: 定义目录（机构 / 用户 / 功能组）数据访问接口
// 红线: Repository 不含业务规则，只做数据读写
// ==========================================

use crate::domain::timetable::{
    StaffCandidate, StaffMatch, TimetableCommit, TimetableCommitSummary,
};
use crate::domain::types::Profile;
use crate::domain::user::{NameKey, Structure, UserIdentity};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

// ==========================================
// DirectoryRepository Trait
// ==========================================
// 用途: CSV 校验管道与课表导入共用的目录访问
// 实现者: SqliteDirectoryRepository（使用 rusqlite）
// 约束: 只读查询与 upsert 均可安全重试
#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    // ===== 机构 =====

    /// 按外部标识查询机构
    async fn find_structure_by_external_id(
        &self,
        external_id: &str,
    ) -> RepositoryResult<Option<Structure>>;

    /// 按 UAI 查询机构
    async fn find_structure_by_uai(&self, uai: &str) -> RepositoryResult<Option<Structure>>;

    // ===== CSV 管道 =====

    /// 批量存在性查询
    ///
    /// # 参数
    /// - external_ids: 待查询的外部标识
    ///
    /// # 返回
    /// - 目录中已存在的外部标识子集
    async fn find_existing_external_ids(
        &self,
        external_ids: &[String],
    ) -> RepositoryResult<HashSet<String>>;

    /// 姓名发现: 查询机构内同档案、姓名匹配的用户（大小写不敏感）
    ///
    /// # 参数
    /// - structure_external_id: 机构外部标识
    /// - profile: 档案类型
    /// - keys: 待匹配的 (姓, 名)
    async fn find_users_by_name(
        &self,
        structure_external_id: &str,
        profile: Profile,
        keys: &[NameKey],
    ) -> RepositoryResult<Vec<UserIdentity>>;

    // ===== 教职工匹配 =====

    /// 读取机构内已建立的 IDPN → 用户 id 映射
    async fn load_staff_mapping(
        &self,
        structure_external_id: &str,
    ) -> RepositoryResult<HashMap<String, String>>;

    /// 按 UAI + 档案 + 姓名匹配教职工，并回写 IDPN（单事务）
    async fn match_staff(
        &self,
        uai: &str,
        candidates: &[StaffCandidate],
    ) -> RepositoryResult<Vec<StaffMatch>>;

    /// 单事务创建未匹配的教职工（按 externalId upsert）
    ///
    /// # 返回
    /// - 写入的用户数
    async fn create_staff(
        &self,
        structure_external_id: &str,
        candidates: &[StaffCandidate],
    ) -> RepositoryResult<usize>;

    /// 按 IDPN 批量查询教职工
    async fn find_staff_by_idpn(&self, idpns: &[String]) -> RepositoryResult<Vec<StaffMatch>>;

    // ===== 课表提交 =====

    /// 单事务写入功能组 / 未知班级 / 成员关系，并删除过期成员关系
    async fn commit_timetable(
        &self,
        commit: &TimetableCommit,
    ) -> RepositoryResult<TimetableCommitSummary>;
}
