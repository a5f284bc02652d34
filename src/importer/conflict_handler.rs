// ==========================================
// 目录导入引擎 - 冲突处理器实现
// ==========================================
// 职责: 检测同一文件内重复的 externalId
// 策略: 保留首次出现，其余记为 duplicate.external.id
// ==========================================

use crate::domain::user::ProfileRecord;
use crate::importer::importer_trait::ConflictHandler as ConflictHandlerTrait;
use std::collections::HashMap;

pub struct ConflictHandler;

impl ConflictHandlerTrait for ConflictHandler {
    fn detect_duplicates(&self, records: &[ProfileRecord]) -> Vec<(usize, String)> {
        let mut first_occurrence: HashMap<&str, usize> = HashMap::new();
        let mut duplicates = Vec::new();

        for (index, record) in records.iter().enumerate() {
            if let Some(external_id) = record.external_id() {
                if first_occurrence.contains_key(external_id) {
                    duplicates.push((index, external_id.to_string()));
                } else {
                    first_occurrence.insert(external_id, index);
                }
            }
        }

        duplicates
    }
}
