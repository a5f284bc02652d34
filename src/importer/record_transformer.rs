// ==========================================
// 目录导入引擎 - 记录转换
// ==========================================
// 职责: CSV 行 → 带类型的 ProfileRecord
// 步骤: 字段类型化 → 命名空间 → 外部标识 / 状态 → 家长关联 → schema 校验
// ==========================================

use crate::domain::types::{FieldType, Profile, RecordState};
use crate::domain::user::{normalize_birth_date, FieldValue, ProfileRecord, Structure};
use crate::importer::column_resolver::ResolvedColumns;
use crate::importer::external_id_resolver::cell;
use crate::importer::schema::{ProfileSchema, SchemaViolation};
use crate::importer::student_link::link_key;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// 需要加机构命名空间的数组字段
const NAMESPACED_ARRAY_FIELDS: [&str; 3] = ["classes", "subjectTaught", "functions"];

// ==========================================
// RowOutcome - 单行转换结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// 通过校验；unresolved_links 为批次内未见过的学生关联
    Valid {
        record: ProfileRecord,
        unresolved_links: Vec<String>,
    },
    /// schema 校验失败
    Invalid(SchemaViolation),
    /// 家长记录的子女字段形状不一致（中止批次）
    InvalidChildMapping,
}

// ==========================================
// RecordTransformer
// ==========================================
// 字段类型表每个文件只构建一次
pub struct RecordTransformer<'a> {
    structure: &'a Structure,
    profile: Profile,
    schema: &'a ProfileSchema,
    columns: Vec<(usize, String, FieldType)>,
    student_seed: i64,
}

impl<'a> RecordTransformer<'a> {
    pub fn new(
        structure: &'a Structure,
        profile: Profile,
        schema: &'a ProfileSchema,
        resolved: &ResolvedColumns,
        student_seed: i64,
    ) -> Self {
        let columns = resolved
            .columns
            .iter()
            .map(|(index, field)| (*index, field.clone(), schema.field_type(field)))
            .collect();

        Self {
            structure,
            profile,
            schema,
            columns,
            student_seed,
        }
    }

    fn namespaced(&self, value: &str) -> String {
        let prefix = format!("{}$", self.structure.external_id);
        if value.starts_with(&prefix) {
            value.to_string()
        } else {
            format!("{}{}", prefix, value)
        }
    }

    /// 转换一行
    ///
    /// # 参数
    /// - row: 原始单元格
    /// - existing: 存在性查询返回的 externalId
    /// - classes_names: 批次内已接受记录的 externalId → 班级名串
    pub fn transform_row(
        &self,
        row: &[String],
        existing: &HashSet<String>,
        classes_names: &HashMap<String, String>,
    ) -> RowOutcome {
        let mut record = ProfileRecord::new(self.profile);
        record.push_array("structures", self.structure.external_id.as_str());
        record.push_array("profiles", self.profile.as_str());

        let mut class_names: Vec<String> = Vec::new();

        for (index, field, field_type) in &self.columns {
            let value = cell(row, *index);
            if value.is_empty() {
                continue;
            }

            match field_type {
                FieldType::String => {
                    if field == "birthDate" {
                        record.set_str(field, normalize_birth_date(value));
                    } else {
                        record.set_str(field, value);
                    }
                }
                FieldType::ArrayString => {
                    if NAMESPACED_ARRAY_FIELDS.contains(&field.as_str()) {
                        record.push_array(field, self.namespaced(value));
                    } else {
                        record.push_array(field, value);
                    }
                }
                FieldType::Boolean => {
                    record.set_bool(field, value.eq_ignore_ascii_case("true"));
                }
                FieldType::Generic => {
                    if field == "childClasses" {
                        record.push_generic(field, self.namespaced(value));
                    } else {
                        record.push_generic(field, value);
                    }
                }
            }

            if field == "classes" {
                class_names.push(value.to_string());
            }
        }

        // 外部标识与状态
        let state = match record.external_id() {
            Some(external_id) if existing.contains(external_id) => RecordState::Updated,
            Some(_) => RecordState::New,
            None => {
                let generated = self.generate_external_id(&record);
                record.set_str("externalId", generated);
                RecordState::New
            }
        };

        // 家长 → 学生关联
        let mut unresolved_links = Vec::new();
        if self.profile == Profile::Relative {
            let links = match self.link_students(&record) {
                Some(links) => links,
                None => return RowOutcome::InvalidChildMapping,
            };
            for link in &links {
                match classes_names.get(link) {
                    Some(names) if !names.is_empty() => class_names.push(names.clone()),
                    Some(_) => {}
                    None => unresolved_links.push(link.clone()),
                }
            }
            record
                .fields
                .insert("linkStudents".to_string(), FieldValue::Array(links));
        }

        if let Some(violation) = self.schema.validate(&record) {
            return RowOutcome::Invalid(violation);
        }

        record.state = state;
        record.classes_str = class_names.join(", ");
        RowOutcome::Valid {
            record,
            unresolved_links,
        }
    }

    /// 生成外部标识
    ///
    /// 单班级学生使用确定性关联键（家长可据此关联），其余记录随机生成
    fn generate_external_id(&self, record: &ProfileRecord) -> String {
        let classes = record.array("classes");
        if self.profile == Profile::Student && classes.len() == 1 {
            link_key(
                &self.structure.external_id,
                record.get_str("lastName").unwrap_or(""),
                record.get_str("firstName").unwrap_or(""),
                classes[0],
                self.student_seed,
            )
        } else {
            Uuid::new_v4().to_string()
        }
    }

    /// 计算家长的 linkStudents
    ///
    /// # 返回
    /// - None: childLastName / childFirstName / childClasses 形状不一致
    fn link_students(&self, record: &ProfileRecord) -> Option<Vec<String>> {
        let mut links: Vec<String> = record
            .array("childExternalId")
            .into_iter()
            .map(str::to_string)
            .collect();

        let last_names = match record.get("childLastName") {
            Some(value) => value,
            None => return Some(links),
        };
        let first_names = record.get("childFirstName");
        let classes = record.get("childClasses");

        match (last_names, first_names, classes) {
            (FieldValue::Str(last), Some(FieldValue::Str(first)), Some(FieldValue::Str(class))) => {
                links.push(self.child_key(last, first, class));
            }
            (
                FieldValue::Array(last),
                Some(FieldValue::Array(first)),
                Some(FieldValue::Array(class)),
            ) if last.len() == first.len() && last.len() == class.len() => {
                for j in 0..last.len() {
                    links.push(self.child_key(&last[j], &first[j], &class[j]));
                }
            }
            _ => return None,
        }

        Some(links)
    }

    fn child_key(&self, last_name: &str, first_name: &str, classes: &str) -> String {
        link_key(
            &self.structure.external_id,
            last_name,
            first_name,
            classes,
            self.student_seed,
        )
    }
}
