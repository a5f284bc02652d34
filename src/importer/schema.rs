// ==========================================
// 目录导入引擎 - 档案 Schema 注册表
// ==========================================
// 职责: 加载 schemas/*.json，提供字段类型表 / 标准字段名 / 记录校验
// 格式: {"properties": {字段: {"type", "format"?}}, "required": [...]}
// ==========================================

use crate::domain::types::{FieldType, Profile, SchemaFamily};
use crate::domain::user::{FieldValue, ProfileRecord};
use crate::importer::error::{ImportError, ImportResult};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// 由管道自动填充、不要求出现在表头中的字段
pub const AUTO_FIELDS: [&str; 3] = ["externalId", "structures", "profiles"];

const PERSONNEL_SCHEMA: &str = include_str!("../../schemas/Personnel.json");
const STUDENT_SCHEMA: &str = include_str!("../../schemas/Student.json");
const USER_SCHEMA: &str = include_str!("../../schemas/User.json");

#[derive(Debug, Clone, Deserialize)]
struct SchemaDocument {
    properties: BTreeMap<String, PropertyDefinition>,
    #[serde(default)]
    required: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PropertyDefinition {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    format: Option<String>,
}

// ==========================================
// SchemaViolation - 校验失败
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub key: &'static str,
    pub params: Vec<String>,
}

impl SchemaViolation {
    fn new(key: &'static str, params: Vec<String>) -> Self {
        Self { key, params }
    }
}

// ==========================================
// ProfileSchema - 单个 schema 族
// ==========================================
#[derive(Debug, Clone)]
pub struct ProfileSchema {
    family: SchemaFamily,
    field_types: HashMap<String, FieldType>,
    date_fields: Vec<String>,
    // 小写字段名 → 标准字段名
    canonical: HashMap<String, String>,
    required: Vec<String>,
}

impl ProfileSchema {
    /// 从 JSON 文本解析 schema
    pub fn from_json(family: SchemaFamily, raw: &str) -> ImportResult<Self> {
        let document: SchemaDocument =
            serde_json::from_str(raw).map_err(|e| ImportError::SchemaError {
                family: family.to_string(),
                message: e.to_string(),
            })?;

        let mut field_types = HashMap::new();
        let mut date_fields = Vec::new();
        let mut canonical = HashMap::new();

        for (name, property) in &document.properties {
            field_types.insert(name.clone(), FieldType::from_schema(&property.kind));
            if property.format.as_deref() == Some("date") {
                date_fields.push(name.clone());
            }
            canonical.insert(name.to_lowercase(), name.clone());
        }

        for field in &document.required {
            if !field_types.contains_key(field) {
                return Err(ImportError::SchemaError {
                    family: family.to_string(),
                    message: format!("必填字段未声明: {}", field),
                });
            }
        }

        Ok(Self {
            family,
            field_types,
            date_fields,
            canonical,
            required: document.required,
        })
    }

    pub fn family(&self) -> SchemaFamily {
        self.family
    }

    /// 字段类型（未声明字段为 Generic）
    pub fn field_type(&self, field: &str) -> FieldType {
        self.field_types
            .get(field)
            .copied()
            .unwrap_or(FieldType::Generic)
    }

    /// 大小写不敏感地查找标准字段名
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        self.canonical
            .get(&name.trim().to_lowercase())
            .map(String::as_str)
    }

    /// 必须出现在表头中的字段（排除自动填充字段）
    pub fn required_columns(&self) -> impl Iterator<Item = &str> {
        self.required
            .iter()
            .map(String::as_str)
            .filter(|f| !AUTO_FIELDS.contains(f))
    }

    /// 校验转换后的记录
    ///
    /// # 返回
    /// - None: 通过
    /// - Some(SchemaViolation): 第一个违规项
    pub fn validate(&self, record: &ProfileRecord) -> Option<SchemaViolation> {
        for field in &self.required {
            let present = match record.get(field) {
                Some(FieldValue::Str(s)) => !s.trim().is_empty(),
                Some(FieldValue::Array(a)) => !a.is_empty(),
                Some(FieldValue::Bool(_)) => true,
                None => false,
            };
            if !present {
                return Some(SchemaViolation::new(
                    "missing.attribute",
                    vec![field.clone()],
                ));
            }
        }

        for (field, value) in &record.fields {
            let valid = match (self.field_type(field), value) {
                (FieldType::String, FieldValue::Str(_)) => true,
                (FieldType::String, _) => false,
                (FieldType::ArrayString, FieldValue::Bool(_)) => false,
                (FieldType::Boolean, FieldValue::Bool(_)) => true,
                (FieldType::Boolean, _) => false,
                _ => true,
            };
            if !valid {
                return Some(SchemaViolation::new("invalid.type", vec![field.clone()]));
            }
        }

        for field in &self.date_fields {
            if let Some(value) = record.get_str(field) {
                if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err() {
                    return Some(SchemaViolation::new(
                        "invalid.date",
                        vec![field.clone(), value.to_string()],
                    ));
                }
            }
        }

        None
    }
}

// ==========================================
// SchemaRegistry - 档案 → schema
// ==========================================
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    personnel: ProfileSchema,
    student: ProfileSchema,
    user: ProfileSchema,
}

impl SchemaRegistry {
    /// 加载内置 schema（Personnel / Student / User）
    pub fn builtin() -> ImportResult<Self> {
        Ok(Self {
            personnel: ProfileSchema::from_json(SchemaFamily::Personnel, PERSONNEL_SCHEMA)?,
            student: ProfileSchema::from_json(SchemaFamily::Student, STUDENT_SCHEMA)?,
            user: ProfileSchema::from_json(SchemaFamily::User, USER_SCHEMA)?,
        })
    }

    pub fn schema_for(&self, profile: Profile) -> &ProfileSchema {
        match profile.schema_family() {
            SchemaFamily::Personnel => &self.personnel,
            SchemaFamily::Student => &self.student,
            SchemaFamily::User => &self.user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(fields: &[(&str, &str)]) -> ProfileRecord {
        let mut record = ProfileRecord::new(Profile::Student);
        for (k, v) in fields {
            record.set_str(k, *v);
        }
        record.push_array("structures", "S1");
        record.push_array("profiles", "Student");
        record
    }

    #[test]
    fn test_builtin_schemas_load() {
        let registry = SchemaRegistry::builtin().unwrap();
        let schema = registry.schema_for(Profile::Teacher);
        assert_eq!(schema.family(), SchemaFamily::Personnel);
        assert_eq!(schema.field_type("classes"), FieldType::ArrayString);
        assert_eq!(schema.field_type("teaches"), FieldType::Boolean);
        assert_eq!(schema.field_type("childLastName"), FieldType::Generic);
        assert_eq!(schema.canonical_name("LASTNAME"), Some("lastName"));
    }

    #[test]
    fn test_required_columns_skip_auto_fields() {
        let registry = SchemaRegistry::builtin().unwrap();
        let required: Vec<&str> = registry
            .schema_for(Profile::Student)
            .required_columns()
            .collect();
        assert_eq!(required, vec!["lastName", "firstName", "birthDate"]);
    }

    #[test]
    fn test_validate_missing_and_date() {
        let registry = SchemaRegistry::builtin().unwrap();
        let schema = registry.schema_for(Profile::Student);

        let record = student(&[("externalId", "E1"), ("lastName", "Martin"), ("firstName", "Léa")]);
        let violation = schema.validate(&record).unwrap();
        assert_eq!(violation.key, "missing.attribute");
        assert_eq!(violation.params, vec!["birthDate"]);

        let record = student(&[
            ("externalId", "E1"),
            ("lastName", "Martin"),
            ("firstName", "Léa"),
            ("birthDate", "31/02/2010"),
        ]);
        assert_eq!(schema.validate(&record).unwrap().key, "invalid.date");

        let record = student(&[
            ("externalId", "E1"),
            ("lastName", "Martin"),
            ("firstName", "Léa"),
            ("birthDate", "2010-02-14"),
        ]);
        assert!(schema.validate(&record).is_none());
    }

    #[test]
    fn test_invalid_schema_document() {
        let result = ProfileSchema::from_json(
            SchemaFamily::User,
            r#"{"properties": {}, "required": ["lastName"]}"#,
        );
        assert!(matches!(result, Err(ImportError::SchemaError { .. })));
    }
}
