// ==========================================
// 目录导入引擎 - 外部标识解析
// ==========================================
// 职责:
// - 收集文件内全部 externalId，一次批量存在性查询
// - 姓名发现: 按 (姓, 名[, 出生日期]) 为缺失 externalId 的行补全标识
// 约束: 所有存储往返经由 round_trip（重试 / 超时 / 取消）
// ==========================================

use crate::domain::types::Profile;
use crate::domain::user::{normalize_birth_date, NameKey, UserIdentity};
use crate::importer::column_resolver::ResolvedColumns;
use crate::importer::error::ImportResult;
use crate::importer::file_parser::CsvTable;
use crate::repository::directory_repo::DirectoryRepository;
use crate::repository::retry::{round_trip, RoundTripPolicy};
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// 单元格（缺失列或越界时为空串）
pub fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(|v| v.trim()).unwrap_or("")
}

/// 收集非空 externalId（去重，保持首次出现顺序）
pub fn collect_external_ids(table: &CsvTable, index: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    table
        .rows
        .iter()
        .map(|row| cell(row, index))
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

// ==========================================
// DiscoveryOutcome - 姓名发现结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    /// 补全的行数
    pub filled: usize,
    /// 匹配到多个用户的 (姓, 名)
    pub ambiguous: Vec<NameKey>,
}

// ==========================================
// ExternalIdResolver
// ==========================================
pub struct ExternalIdResolver<'a, R: DirectoryRepository> {
    repo: &'a R,
    policy: &'a RoundTripPolicy,
    cancel: &'a CancellationToken,
}

impl<'a, R: DirectoryRepository> ExternalIdResolver<'a, R> {
    pub fn new(repo: &'a R, policy: &'a RoundTripPolicy, cancel: &'a CancellationToken) -> Self {
        Self {
            repo,
            policy,
            cancel,
        }
    }

    /// 批量存在性查询
    ///
    /// # 返回
    /// - 目录中已存在的 externalId 集合
    /// - Err: 存储失败（整个批次失败）
    #[instrument(skip(self, external_ids), fields(count = external_ids.len()))]
    pub async fn existing_ids(&self, external_ids: &[String]) -> ImportResult<HashSet<String>> {
        if external_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let repo = self.repo;
        let existing = round_trip(self.policy, self.cancel, "find_existing_external_ids", move || {
            repo.find_existing_external_ids(external_ids)
        })
        .await?;

        debug!(existing = existing.len(), "存在性查询完成");
        Ok(existing)
    }

    /// 姓名发现
    ///
    /// # 行为
    /// - externalId 列缺失时在表尾追加该列
    /// - 仅处理 externalId 为空的行
    /// - 唯一匹配 → 填入；多个匹配 → 记入 ambiguous；无匹配 → 保持为空
    #[instrument(skip(self, table, columns), fields(rows = table.rows.len()))]
    pub async fn discover(
        &self,
        table: &mut CsvTable,
        columns: &mut ResolvedColumns,
        structure_external_id: &str,
        profile: Profile,
    ) -> ImportResult<DiscoveryOutcome> {
        let (last_index, first_index) =
            match (columns.index_of("lastName"), columns.index_of("firstName")) {
                (Some(last), Some(first)) => (last, first),
                _ => return Ok(DiscoveryOutcome::default()),
            };
        let birth_index = columns.index_of("birthDate");

        let id_index = match columns.index_of("externalId") {
            Some(index) => index,
            None => {
                let index = table.header.len().max(
                    table.rows.iter().map(Vec::len).max().unwrap_or(0),
                );
                table.header.resize(index, String::new());
                table.header.push("externalId".to_string());
                columns.push(index, "externalId");
                index
            }
        };

        let pending: Vec<usize> = table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| cell(row, id_index).is_empty())
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            return Ok(DiscoveryOutcome::default());
        }

        let keys: Vec<NameKey> = pending
            .iter()
            .map(|&i| NameKey {
                last_name: cell(&table.rows[i], last_index).to_string(),
                first_name: cell(&table.rows[i], first_index).to_string(),
            })
            .collect();

        let repo = self.repo;
        let keys_ref = keys.as_slice();
        let users = round_trip(self.policy, self.cancel, "find_users_by_name", move || {
            repo.find_users_by_name(structure_external_id, profile, keys_ref)
        })
        .await?;

        let mut by_name: HashMap<(String, String), Vec<&UserIdentity>> = HashMap::new();
        for user in &users {
            by_name
                .entry(name_key(&user.last_name, &user.first_name))
                .or_default()
                .push(user);
        }

        let mut outcome = DiscoveryOutcome::default();
        for (row_index, key) in pending.into_iter().zip(keys) {
            let row = &table.rows[row_index];
            let mut candidates: Vec<&UserIdentity> = by_name
                .get(&name_key(&key.last_name, &key.first_name))
                .cloned()
                .unwrap_or_default();

            if let Some(birth_index) = birth_index {
                let birth_date = normalize_birth_date(cell(row, birth_index));
                if !birth_date.is_empty() {
                    candidates.retain(|u| u.birth_date.as_deref() == Some(birth_date.as_str()));
                }
            }

            match candidates.as_slice() {
                [] => {}
                [user] => {
                    let external_id = user.external_id.clone();
                    let row = &mut table.rows[row_index];
                    if row.len() <= id_index {
                        row.resize(id_index + 1, String::new());
                    }
                    row[id_index] = external_id;
                    outcome.filled += 1;
                }
                _ => outcome.ambiguous.push(key),
            }
        }

        debug!(
            filled = outcome.filled,
            ambiguous = outcome.ambiguous.len(),
            "姓名发现完成"
        );
        Ok(outcome)
    }
}

fn name_key(last_name: &str, first_name: &str) -> (String, String) {
    (
        last_name.trim().to_lowercase(),
        first_name.trim().to_lowercase(),
    )
}
