// ==========================================
// 目录导入引擎 - 教职工匹配
// ==========================================
// 职责: 课表中的教师 / 职员 → 目录用户
// 步骤: 批量匹配(回写 IDPN) → 单事务创建剩余 → 按 IDPN 批量回查
// 约束: 往返次数与人数无关；创建按 externalId upsert，重试不会重复创建
// ==========================================

use crate::domain::timetable::{StaffCandidate, StaffMatch};
use crate::repository::directory_repo::DirectoryRepository;
use crate::repository::retry::{round_trip, RoundTripPolicy};
use crate::timetable::error::{TimetableError, TimetableResult};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// 匹配结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaffResolution {
    /// 按姓名匹配到的既有用户
    pub matched: Vec<StaffMatch>,
    /// 新建后回查到的用户
    pub created: Vec<StaffMatch>,
}

impl StaffResolution {
    pub fn all(&self) -> impl Iterator<Item = &StaffMatch> {
        self.matched.iter().chain(self.created.iter())
    }
}

pub struct StaffMatcher<'a, R: DirectoryRepository> {
    repo: &'a R,
    policy: &'a RoundTripPolicy,
    cancel: &'a CancellationToken,
}

impl<'a, R: DirectoryRepository> StaffMatcher<'a, R> {
    pub fn new(repo: &'a R, policy: &'a RoundTripPolicy, cancel: &'a CancellationToken) -> Self {
        Self {
            repo,
            policy,
            cancel,
        }
    }

    /// 解析全部未匹配的教职工
    ///
    /// # 参数
    /// - uai: 机构 UAI（匹配范围）
    /// - structure_external_id: 新建用户的归属机构
    /// - candidates: 未匹配的教职工（idpn 唯一）
    ///
    /// # 返回
    /// - Err(MatchingExhausted): 创建并回查后仍有未匹配者
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub async fn resolve(
        &self,
        uai: &str,
        structure_external_id: &str,
        candidates: Vec<StaffCandidate>,
    ) -> TimetableResult<StaffResolution> {
        let mut pending: HashMap<String, StaffCandidate> = candidates
            .into_iter()
            .map(|c| (c.idpn.clone(), c))
            .collect();
        let mut resolution = StaffResolution::default();
        if pending.is_empty() {
            return Ok(resolution);
        }

        // === 步骤 1: 批量匹配 ===
        let repo = self.repo;
        let batch: Vec<StaffCandidate> = sorted(&pending);
        let batch_ref = batch.as_slice();
        let matched = round_trip(self.policy, self.cancel, "match_staff", move || {
            repo.match_staff(uai, batch_ref)
        })
        .await?;
        for m in matched {
            if pending.remove(&m.idpn).is_some() {
                resolution.matched.push(m);
            }
        }
        info!(matched = resolution.matched.len(), remaining = pending.len(), "教职工匹配完成");

        if pending.is_empty() {
            return Ok(resolution);
        }

        // === 步骤 2: 单事务创建 ===
        let to_create: Vec<StaffCandidate> = sorted(&pending);
        let create_ref = to_create.as_slice();
        let written = round_trip(self.policy, self.cancel, "create_staff", move || {
            repo.create_staff(structure_external_id, create_ref)
        })
        .await?;

        // === 步骤 3: 按 IDPN 回查 ===
        let idpns: Vec<String> = to_create.iter().map(|c| c.idpn.clone()).collect();
        let idpns_ref = idpns.as_slice();
        let fetched = round_trip(self.policy, self.cancel, "find_staff_by_idpn", move || {
            repo.find_staff_by_idpn(idpns_ref)
        })
        .await?;
        for m in fetched {
            if pending.remove(&m.idpn).is_some() {
                resolution.created.push(m);
            }
        }
        info!(written = written, created = resolution.created.len(), "教职工创建完成");

        if !pending.is_empty() {
            warn!(remaining = pending.len(), "教职工仍未匹配");
            return Err(TimetableError::MatchingExhausted {
                remaining: pending.len(),
            });
        }

        Ok(resolution)
    }
}

/// 按 idpn 排序，保证往返内容确定
fn sorted(pending: &HashMap<String, StaffCandidate>) -> Vec<StaffCandidate> {
    let mut list: Vec<StaffCandidate> = pending.values().cloned().collect();
    list.sort_by(|a, b| a.idpn.cmp(&b.idpn));
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::domain::types::Profile;
    use crate::domain::user::Structure;
    use crate::repository::directory_repo_impl::{NewDirectoryUser, SqliteDirectoryRepository};
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    fn setup() -> SqliteDirectoryRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let repo = SqliteDirectoryRepository::from_connection(Arc::new(Mutex::new(conn)));
        repo.insert_structure(&Structure {
            id: None,
            external_id: "S1".to_string(),
            uai: Some("0771234A".to_string()),
            name: "Collège".to_string(),
        })
        .unwrap();
        repo
    }

    fn candidate(idpn: &str, last: &str, first: &str, profile: Profile) -> StaffCandidate {
        StaffCandidate {
            idpn: idpn.to_string(),
            source_ident: idpn.trim_start_matches("S1$").to_string(),
            last_name: last.to_string(),
            first_name: first.to_string(),
            profile,
        }
    }

    #[tokio::test]
    async fn test_match_then_create() {
        let repo = setup();
        repo.insert_user(&NewDirectoryUser {
            external_id: "T-EXISTING".to_string(),
            structure_external_id: "S1".to_string(),
            profile: Profile::Teacher,
            last_name: "Durand".to_string(),
            first_name: "Anne".to_string(),
            birth_date: None,
            attachment_id: None,
        })
        .unwrap();

        let policy = RoundTripPolicy::default();
        let cancel = CancellationToken::new();
        let matcher = StaffMatcher::new(&repo, &policy, &cancel);

        let resolution = matcher
            .resolve(
                "0771234A",
                "S1",
                vec![
                    candidate("S1$100", "DURAND", "anne", Profile::Teacher),
                    candidate("S1$P7", "Leroy", "Marc", Profile::Personnel),
                ],
            )
            .await
            .unwrap();

        assert_eq!(resolution.matched.len(), 1);
        assert_eq!(resolution.matched[0].idpn, "S1$100");
        assert_eq!(resolution.created.len(), 1);
        assert_eq!(resolution.created[0].profile, Profile::Personnel);
        assert_eq!(resolution.all().count(), 2);
    }

    #[tokio::test]
    async fn test_empty_candidates_no_round_trip() {
        let repo = setup();
        let policy = RoundTripPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let matcher = StaffMatcher::new(&repo, &policy, &cancel);

        // 已取消的令牌也不会触发错误：没有任何往返
        let resolution = matcher.resolve("0771234A", "S1", vec![]).await.unwrap();
        assert!(resolution.matched.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_match() {
        let repo = setup();
        let policy = RoundTripPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let matcher = StaffMatcher::new(&repo, &policy, &cancel);

        let result = matcher
            .resolve(
                "0771234A",
                "S1",
                vec![candidate("S1$1", "A", "B", Profile::Teacher)],
            )
            .await;
        assert!(matches!(result, Err(TimetableError::Cancelled)));
    }
}
