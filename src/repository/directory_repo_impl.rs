// ==========================================
// 目录导入引擎 - 目录存储 Repository 实现
// ==========================================
// 职责: 实现目录数据访问（使用 rusqlite）
// 红线: Repository 不含业务规则，只做数据读写
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::timetable::{
    StaffCandidate, StaffMatch, TimetableCommit, TimetableCommitSummary,
};
use crate::domain::types::Profile;
use crate::domain::user::{NameKey, Structure, UserIdentity};
use crate::repository::directory_repo::DirectoryRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// IN 子句单批最大参数个数
const IN_CHUNK_SIZE: usize = 500;

/// 课表导入创建的用户来源标记
const STAFF_SOURCE: &str = "EDT";

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn parse_profile(raw: &str) -> RepositoryResult<Profile> {
    raw.parse().map_err(RepositoryError::ValidationError)
}

// ==========================================
// NewDirectoryUser - 目录用户写入参数
// ==========================================
// 用于初始化目录数据（命令行导入、测试种子）
#[derive(Debug, Clone)]
pub struct NewDirectoryUser {
    pub external_id: String,
    pub structure_external_id: String,
    pub profile: Profile,
    pub last_name: String,
    pub first_name: String,
    pub birth_date: Option<String>,
    pub attachment_id: Option<String>,
}

// ==========================================
// SqliteDirectoryRepository
// ==========================================
pub struct SqliteDirectoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDirectoryRepository {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入机构（按 externalId upsert）
    pub fn insert_structure(&self, structure: &Structure) -> RepositoryResult<String> {
        let conn = self.lock()?;
        let id = structure
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        conn.execute(
            r#"
            INSERT INTO structure (id, external_id, uai, name) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(external_id) DO UPDATE SET uai = excluded.uai, name = excluded.name
            "#,
            params![id, structure.external_id, structure.uai, structure.name],
        )?;

        let stored: String = conn.query_row(
            "SELECT id FROM structure WHERE external_id = ?1",
            params![structure.external_id],
            |row| row.get(0),
        )?;
        Ok(stored)
    }

    /// 写入目录用户（按 externalId upsert）
    ///
    /// # 返回
    /// - 用户 id
    pub fn insert_user(&self, user: &NewDirectoryUser) -> RepositoryResult<String> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO directory_user (
                id, external_id, structure_external_id, profile,
                last_name, first_name, birth_date, attachment_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(external_id) DO UPDATE SET
                structure_external_id = excluded.structure_external_id,
                profile = excluded.profile,
                last_name = excluded.last_name,
                first_name = excluded.first_name,
                birth_date = excluded.birth_date,
                attachment_id = excluded.attachment_id
            "#,
            params![
                Uuid::new_v4().to_string(),
                user.external_id,
                user.structure_external_id,
                user.profile.as_str(),
                user.last_name,
                user.first_name,
                user.birth_date,
                user.attachment_id,
            ],
        )?;

        let id: String = conn.query_row(
            "SELECT id FROM directory_user WHERE external_id = ?1",
            params![user.external_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn find_structure_where(
        &self,
        column: &str,
        value: &str,
    ) -> RepositoryResult<Option<Structure>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT id, external_id, uai, name FROM structure WHERE {} = ?1 LIMIT 1",
            column
        );
        let structure = conn
            .query_row(&sql, params![value], |row| {
                Ok(Structure {
                    id: Some(row.get(0)?),
                    external_id: row.get(1)?,
                    uai: row.get(2)?,
                    name: row.get(3)?,
                })
            })
            .optional()?;
        Ok(structure)
    }
}

#[async_trait]
impl DirectoryRepository for SqliteDirectoryRepository {
    async fn find_structure_by_external_id(
        &self,
        external_id: &str,
    ) -> RepositoryResult<Option<Structure>> {
        self.find_structure_where("external_id", external_id)
    }

    async fn find_structure_by_uai(&self, uai: &str) -> RepositoryResult<Option<Structure>> {
        self.find_structure_where("uai", uai)
    }

    async fn find_existing_external_ids(
        &self,
        external_ids: &[String],
    ) -> RepositoryResult<HashSet<String>> {
        let conn = self.lock()?;
        let mut existing = HashSet::new();

        for chunk in external_ids.chunks(IN_CHUNK_SIZE) {
            let sql = format!(
                "SELECT external_id FROM directory_user WHERE external_id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                row.get::<_, String>(0)
            })?;
            for row in rows {
                existing.insert(row?);
            }
        }

        Ok(existing)
    }

    async fn find_users_by_name(
        &self,
        structure_external_id: &str,
        profile: Profile,
        keys: &[NameKey],
    ) -> RepositoryResult<Vec<UserIdentity>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let wanted: HashSet<(String, String)> = keys
            .iter()
            .map(|k| {
                (
                    k.last_name.trim().to_lowercase(),
                    k.first_name.trim().to_lowercase(),
                )
            })
            .collect();

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT external_id, last_name, first_name, birth_date
            FROM directory_user
            WHERE structure_external_id = ?1 AND profile = ?2
            "#,
        )?;
        let rows = stmt.query_map(params![structure_external_id, profile.as_str()], |row| {
            Ok(UserIdentity {
                external_id: row.get(0)?,
                last_name: row.get(1)?,
                first_name: row.get(2)?,
                birth_date: row.get(3)?,
            })
        })?;

        let mut users = Vec::new();
        for row in rows {
            let user = row?;
            let key = (
                user.last_name.trim().to_lowercase(),
                user.first_name.trim().to_lowercase(),
            );
            if wanted.contains(&key) {
                users.push(user);
            }
        }
        Ok(users)
    }

    async fn load_staff_mapping(
        &self,
        structure_external_id: &str,
    ) -> RepositoryResult<HashMap<String, String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT idpn, id FROM directory_user
            WHERE structure_external_id = ?1 AND idpn IS NOT NULL
            "#,
        )?;
        let rows = stmt.query_map(params![structure_external_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut mapping = HashMap::new();
        for row in rows {
            let (idpn, id) = row?;
            mapping.insert(idpn, id);
        }
        Ok(mapping)
    }

    async fn match_staff(
        &self,
        uai: &str,
        candidates: &[StaffCandidate],
    ) -> RepositoryResult<Vec<StaffMatch>> {
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let mut matches = Vec::new();
        {
            let mut select = tx.prepare(
                r#"
                SELECT u.id FROM directory_user u
                JOIN structure s ON s.external_id = u.structure_external_id
                WHERE s.uai = ?1 AND u.profile = ?2
                  AND lower(u.last_name) = lower(?3) AND lower(u.first_name) = lower(?4)
                  AND (u.idpn IS NULL OR u.idpn = ?5)
                ORDER BY u.id
                LIMIT 1
                "#,
            )?;
            let mut update = tx.prepare("UPDATE directory_user SET idpn = ?1 WHERE id = ?2")?;

            for candidate in candidates {
                let id: Option<String> = select
                    .query_row(
                        params![
                            uai,
                            candidate.profile.as_str(),
                            candidate.last_name.trim(),
                            candidate.first_name.trim(),
                            candidate.idpn,
                        ],
                        |row| row.get(0),
                    )
                    .optional()?;

                if let Some(id) = id {
                    update.execute(params![candidate.idpn, id])?;
                    matches.push(StaffMatch {
                        id,
                        idpn: candidate.idpn.clone(),
                        profile: candidate.profile,
                    });
                }
            }
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(matches)
    }

    async fn create_staff(
        &self,
        structure_external_id: &str,
        candidates: &[StaffCandidate],
    ) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO directory_user (
                    id, external_id, structure_external_id, profile,
                    last_name, first_name, idpn, source
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(external_id) DO UPDATE SET
                    idpn = excluded.idpn,
                    last_name = excluded.last_name,
                    first_name = excluded.first_name
                "#,
            )?;

            for candidate in candidates {
                count += stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    candidate.idpn,
                    structure_external_id,
                    candidate.profile.as_str(),
                    candidate.last_name.trim(),
                    candidate.first_name.trim(),
                    candidate.idpn,
                    STAFF_SOURCE,
                ])?;
            }
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(count)
    }

    async fn find_staff_by_idpn(&self, idpns: &[String]) -> RepositoryResult<Vec<StaffMatch>> {
        let conn = self.lock()?;
        let mut raw = Vec::new();

        for chunk in idpns.chunks(IN_CHUNK_SIZE) {
            let sql = format!(
                "SELECT id, idpn, profile FROM directory_user WHERE idpn IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            for row in rows {
                raw.push(row?);
            }
        }

        raw.into_iter()
            .map(|(id, idpn, profile)| {
                Ok(StaffMatch {
                    id,
                    idpn,
                    profile: parse_profile(&profile)?,
                })
            })
            .collect()
    }

    async fn commit_timetable(
        &self,
        commit: &TimetableCommit,
    ) -> RepositoryResult<TimetableCommitSummary> {
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let mut summary = TimetableCommitSummary::default();
        {
            let mut group_stmt = tx.prepare(
                r#"
                INSERT INTO functional_group (id, external_id, structure_external_id, name)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(external_id) DO NOTHING
                "#,
            )?;
            for group in &commit.groups {
                summary.groups_created += group_stmt.execute(params![
                    group.id,
                    group.external_id,
                    commit.structure_external_id,
                    group.name,
                ])?;
            }

            let mut unknown_stmt = tx.prepare(
                "INSERT OR IGNORE INTO unknown_class (structure_external_id, name) VALUES (?1, ?2)",
            )?;
            for name in &commit.unknown_classes {
                unknown_stmt.execute(params![commit.structure_external_id, name])?;
            }

            // 仅为目录中存在的学生（attachment_id）与已存在的功能组写入关系
            let mut membership_stmt = tx.prepare(
                r#"
                INSERT INTO group_membership (
                    attachment_id, group_external_id, source, in_date, out_date
                )
                SELECT ?1, ?2, ?3, ?4, ?5
                WHERE EXISTS (SELECT 1 FROM directory_user WHERE attachment_id = ?1)
                  AND EXISTS (SELECT 1 FROM functional_group WHERE external_id = ?2)
                ON CONFLICT(attachment_id, group_external_id) DO UPDATE SET
                    source = excluded.source,
                    in_date = excluded.in_date,
                    out_date = excluded.out_date
                "#,
            )?;
            for membership in &commit.memberships {
                summary.memberships_written += membership_stmt.execute(params![
                    membership.attachment_id,
                    membership.group_external_id,
                    membership.source,
                    membership.in_date,
                    membership.out_date,
                ])?;
            }

            summary.memberships_deleted = tx.execute(
                r#"
                DELETE FROM group_membership
                WHERE source = ?1 AND out_date < ?2
                  AND group_external_id IN (
                      SELECT external_id FROM functional_group WHERE structure_external_id = ?3
                  )
                "#,
                params![
                    commit.source,
                    commit.stale_before,
                    commit.structure_external_id
                ],
            )?;
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(summary)
    }
}
