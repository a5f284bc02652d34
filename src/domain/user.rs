// ==========================================
// 目录导入引擎 - 用户档案领域模型
// ==========================================
// 职责: CSV 导入管道的中间产物与输出记录
// 生命周期: 仅在一次导入运行内
// ==========================================

use crate::domain::types::{Profile, RecordState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// ==========================================
// FieldValue - 记录字段值
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Str(String),
    Array(Vec<String>),
    Bool(bool),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// 字符串或数组统一视为值列表（布尔值返回空）
    pub fn values(&self) -> Vec<&str> {
        match self {
            FieldValue::Str(s) => vec![s.as_str()],
            FieldValue::Array(a) => a.iter().map(String::as_str).collect(),
            FieldValue::Bool(_) => Vec::new(),
        }
    }
}

// ==========================================
// ProfileRecord - 档案记录
// ==========================================
// 不变量: 校验通过后 externalId 非空
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub profile: Profile,
    pub state: RecordState,
    #[serde(rename = "classesStr")]
    pub classes_str: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl ProfileRecord {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            state: RecordState::New,
            classes_str: String::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(FieldValue::as_str)
    }

    pub fn external_id(&self) -> Option<&str> {
        self.get_str("externalId").filter(|v| !v.trim().is_empty())
    }

    pub fn set_str(&mut self, field: &str, value: impl Into<String>) {
        self.fields
            .insert(field.to_string(), FieldValue::Str(value.into()));
    }

    pub fn set_bool(&mut self, field: &str, value: bool) {
        self.fields.insert(field.to_string(), FieldValue::Bool(value));
    }

    /// 追加数组值（字段不存在则新建数组）
    pub fn push_array(&mut self, field: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.get_mut(field) {
            Some(FieldValue::Array(a)) => a.push(value),
            Some(other) => {
                let mut values: Vec<String> =
                    other.values().into_iter().map(str::to_string).collect();
                values.push(value);
                *other = FieldValue::Array(values);
            }
            None => {
                self.fields
                    .insert(field.to_string(), FieldValue::Array(vec![value]));
            }
        }
    }

    /// 通用字段: 首值为字符串，重复出现时提升为数组
    pub fn push_generic(&mut self, field: &str, value: impl Into<String>) {
        if self.fields.contains_key(field) {
            self.push_array(field, value);
        } else {
            self.set_str(field, value);
        }
    }

    pub fn array(&self, field: &str) -> Vec<&str> {
        self.fields
            .get(field)
            .map(FieldValue::values)
            .unwrap_or_default()
    }
}

// ==========================================
// Structure - 机构
// ==========================================
// 每个批次只解析一次，之后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    pub id: Option<String>,
    #[serde(rename = "externalId")]
    pub external_id: String,
    #[serde(rename = "UAI")]
    pub uai: Option<String>,
    pub name: String,
}

// ==========================================
// ColumnAssociation - 列关联
// ==========================================
// 原始列序号 → 标准字段名；profile 伪字段不参与位置映射
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnAssociation {
    pub profile: Option<Profile>,
    pub columns: BTreeMap<usize, String>,
}

impl ColumnAssociation {
    /// 从 JSON 对象解析: {"0": "lastName", "2": "externalId", "profile": "Student"}
    pub fn from_json(value: &serde_json::Value) -> Result<Self, String> {
        let object = value
            .as_object()
            .ok_or_else(|| "关联定义必须是 JSON 对象".to_string())?;

        let mut association = ColumnAssociation::default();
        for (key, field) in object {
            let field = field
                .as_str()
                .ok_or_else(|| format!("关联字段必须是字符串: {}", key))?;
            if key == "profile" {
                association.profile = Some(field.parse()?);
                continue;
            }
            let index: usize = key
                .parse()
                .map_err(|_| format!("关联列序号无效: {}", key))?;
            association.columns.insert(index, field.to_string());
        }
        Ok(association)
    }
}

// ==========================================
// ImportBatch - 导入批次
// ==========================================
#[derive(Debug, Clone)]
pub struct ImportBatch {
    pub import_dir: PathBuf,
    pub structure_external_id: Option<String>,
    pub files: Vec<PathBuf>,
}

// ==========================================
// 姓名发现（secondary identity discovery）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameKey {
    pub last_name: String,
    pub first_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub external_id: String,
    pub last_name: String,
    pub first_name: String,
    pub birth_date: Option<String>,
}

/// 出生日期 DD/MM/YYYY → YYYY-MM-DD（不匹配时原样返回）
pub fn normalize_birth_date(value: &str) -> String {
    let parts: Vec<&str> = value.trim().split('/').collect();
    match parts.as_slice() {
        [day, month, year]
            if day.len() == 2
                && month.len() == 2
                && year.len() == 4
                && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit())) =>
        {
            format!("{}-{}-{}", year, month, day)
        }
        _ => value.to_string(),
    }
}
