// ==========================================
// 目录导入引擎 - 导入报告
// ==========================================
// 职责: 累积错误 / 警告 / 通过校验的记录，并渲染为本地化 JSON
// 约束: 只追加，不删除（一个批次一个实例）
// ==========================================

use crate::domain::types::{Profile, RecordState};
use crate::domain::user::ProfileRecord;
use crate::i18n::{t, t_with_args};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// 未关联文件的错误归入该分组
pub const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ReportEntry - 报告条目
// ==========================================
// key 为 i18n 键，params 依次替换 %{0} %{1} ...
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub file: Option<String>,
    pub profile: Option<Profile>,
    pub key: String,
    pub params: Vec<String>,
}

impl ReportEntry {
    pub fn new(
        file: Option<&str>,
        profile: Option<Profile>,
        key: impl Into<String>,
        params: Vec<String>,
    ) -> Self {
        Self {
            file: file.map(str::to_string),
            profile,
            key: key.into(),
            params,
        }
    }

    /// 按当前语言渲染消息
    pub fn render(&self) -> String {
        let names: Vec<String> = (0..self.params.len()).map(|i| i.to_string()).collect();
        let args: Vec<(&str, &str)> = names
            .iter()
            .zip(self.params.iter())
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        t_with_args(&self.key, &args)
    }

    fn scope(&self) -> &str {
        self.file.as_deref().unwrap_or(GLOBAL_SCOPE)
    }
}

// ==========================================
// ImportReport - 批次报告
// ==========================================
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub errors: Vec<ReportEntry>,
    pub warnings: Vec<ReportEntry>,
    pub records: BTreeMap<Profile, Vec<ProfileRecord>>,
    /// 批次被结构性错误中止（未知档案 / 子女映射错误）
    pub aborted: bool,
}

impl ImportReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(
        &mut self,
        file: Option<&str>,
        profile: Option<Profile>,
        key: &str,
        params: Vec<String>,
    ) {
        self.errors.push(ReportEntry::new(file, profile, key, params));
    }

    pub fn add_warning(
        &mut self,
        file: Option<&str>,
        profile: Option<Profile>,
        key: &str,
        params: Vec<String>,
    ) {
        self.warnings
            .push(ReportEntry::new(file, profile, key, params));
    }

    /// 全局错误（与文件无关）
    pub fn add_global_error(&mut self, key: &str, params: Vec<String>) {
        self.add_error(None, None, key, params);
    }

    pub fn add_record(&mut self, record: ProfileRecord) {
        self.records.entry(record.profile).or_default().push(record);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// 指定文件的错误数
    pub fn error_count_for(&self, file: &str) -> usize {
        self.errors
            .iter()
            .filter(|e| e.file.as_deref() == Some(file))
            .count()
    }

    pub fn records(&self, profile: Profile) -> &[ProfileRecord] {
        self.records
            .get(&profile)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn counts(&self) -> BTreeMap<Profile, usize> {
        self.records
            .iter()
            .map(|(profile, records)| (*profile, records.len()))
            .collect()
    }

    /// 渲染为本地化 JSON
    ///
    /// # 返回
    /// ```json
    /// {
    ///   "errors":   { "global": [..], "Student.csv": [..] },
    ///   "warnings": { ... },
    ///   "result":   { "Student": [ {..., "stateLabel": "..."} ] },
    ///   "counts":   { "Student": { "label": "...", "total": 2, "NEW": 1, "UPDATED": 1 } },
    ///   "aborted":  false
    /// }
    /// ```
    pub fn render(&self) -> Value {
        let mut result = Map::new();
        let mut counts = Map::new();

        for (profile, records) in &self.records {
            let mut rendered = Vec::with_capacity(records.len());
            let mut new_count = 0usize;
            let mut updated_count = 0usize;

            for record in records {
                let mut value = serde_json::to_value(record).unwrap_or(Value::Null);
                if let Value::Object(object) = &mut value {
                    object.insert(
                        "stateLabel".to_string(),
                        Value::String(t(&format!("state.{}", record.state.as_str()))),
                    );
                }
                match record.state {
                    RecordState::New => new_count += 1,
                    RecordState::Updated => updated_count += 1,
                }
                rendered.push(value);
            }

            result.insert(profile.to_string(), Value::Array(rendered));
            counts.insert(
                profile.to_string(),
                json!({
                    "label": t(&format!("profile.{}", profile.as_str())),
                    "total": records.len(),
                    "NEW": new_count,
                    "UPDATED": updated_count,
                }),
            );
        }

        json!({
            "errors": group_by_scope(&self.errors),
            "warnings": group_by_scope(&self.warnings),
            "result": Value::Object(result),
            "counts": Value::Object(counts),
            "aborted": self.aborted,
        })
    }
}

fn group_by_scope(entries: &[ReportEntry]) -> Value {
    let mut grouped: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
    for entry in entries {
        grouped
            .entry(entry.scope())
            .or_default()
            .push(Value::String(entry.render()));
    }
    json!(grouped)
}
