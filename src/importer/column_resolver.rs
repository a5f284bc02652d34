// ==========================================
// 目录导入引擎 - 列解析
// ==========================================
// 职责: 表头 / 列关联 → (列序号, 标准字段名)
// 规则: 标准字段名 → 内置别名 → 配置别名（均大小写不敏感）
// ==========================================

use crate::domain::user::ColumnAssociation;
use crate::importer::schema::ProfileSchema;
use std::collections::HashMap;

/// 未在 schema 中声明、但管道认识的通用字段
pub const GENERIC_FIELDS: [&str; 4] = [
    "childExternalId",
    "childLastName",
    "childFirstName",
    "childClasses",
];

/// 内置别名（小写）
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("identifiant", "externalId"),
    ("id", "externalId"),
    ("nom", "lastName"),
    ("nom de famille", "lastName"),
    ("prénom", "firstName"),
    ("prenom", "firstName"),
    ("date de naissance", "birthDate"),
    ("classe", "classes"),
    ("civilité", "title"),
    ("courriel", "email"),
    ("e-mail", "email"),
    ("adresse", "address"),
    ("code postal", "zipCode"),
    ("commune", "city"),
    ("ville", "city"),
    ("pays", "country"),
    ("téléphone", "homePhone"),
    ("téléphone travail", "workPhone"),
    ("portable", "mobile"),
    ("matière", "subjectTaught"),
    ("fonction", "functions"),
    ("id enfant", "childExternalId"),
    ("nom enfant", "childLastName"),
    ("prénom enfant", "childFirstName"),
    ("classe enfant", "childClasses"),
];

// ==========================================
// ColumnError - 列解析错误
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnError {
    pub key: &'static str,
    pub param: String,
}

impl ColumnError {
    fn new(key: &'static str, param: impl Into<String>) -> Self {
        Self {
            key,
            param: param.into(),
        }
    }
}

// ==========================================
// ResolvedColumns - 解析结果
// ==========================================
// 按列序号升序
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub columns: Vec<(usize, String)>,
}

impl ResolvedColumns {
    pub fn has_field(&self, field: &str) -> bool {
        self.columns.iter().any(|(_, f)| f == field)
    }

    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.columns
            .iter()
            .find(|(_, f)| f == field)
            .map(|(index, _)| *index)
    }

    /// 追加一列（姓名发现补入 externalId 时使用）
    pub fn push(&mut self, index: usize, field: impl Into<String>) {
        self.columns.push((index, field.into()));
        self.columns.sort_by_key(|(index, _)| *index);
    }
}

// ==========================================
// ColumnResolver
// ==========================================
pub struct ColumnResolver<'a> {
    schema: &'a ProfileSchema,
    extra_aliases: &'a HashMap<String, String>,
}

impl<'a> ColumnResolver<'a> {
    /// # 参数
    /// - schema: 当前档案的 schema
    /// - extra_aliases: 配置中的附加别名（键为小写表头）
    pub fn new(schema: &'a ProfileSchema, extra_aliases: &'a HashMap<String, String>) -> Self {
        Self {
            schema,
            extra_aliases,
        }
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if let Some(canonical) = self.schema.canonical_name(name) {
            return Some(canonical.to_string());
        }

        let lowered = name.trim().to_lowercase();
        if let Some(field) = GENERIC_FIELDS
            .iter()
            .find(|f| f.to_lowercase() == lowered)
        {
            return Some(field.to_string());
        }
        if let Some((_, field)) = BUILTIN_ALIASES.iter().find(|(alias, _)| *alias == lowered) {
            return Some(field.to_string());
        }
        self.extra_aliases.get(&lowered).cloned()
    }

    /// 表头模式
    ///
    /// # 返回
    /// - Ok: 所有表头均可识别，必填字段齐全
    /// - Err: 全部列错误（invalid.column）
    pub fn resolve_header(&self, header: &[String]) -> Result<ResolvedColumns, Vec<ColumnError>> {
        let mut resolved = ResolvedColumns::default();
        let mut errors = Vec::new();

        for (index, cell) in header.iter().enumerate() {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            match self.lookup(cell) {
                Some(field) => resolved.columns.push((index, field)),
                None => errors.push(ColumnError::new("invalid.column", cell)),
            }
        }

        for field in self.schema.required_columns() {
            if !resolved.has_field(field) {
                errors.push(ColumnError::new("invalid.column", field));
            }
        }

        if errors.is_empty() {
            Ok(resolved)
        } else {
            Err(errors)
        }
    }

    /// 列关联模式（跳过表头名称校验）
    pub fn resolve_association(
        &self,
        association: &ColumnAssociation,
    ) -> Result<ResolvedColumns, Vec<ColumnError>> {
        let mut resolved = ResolvedColumns::default();
        let mut errors = Vec::new();

        for (index, field) in &association.columns {
            match self.lookup(field) {
                Some(canonical) => resolved.columns.push((*index, canonical)),
                None => errors.push(ColumnError::new("unknown.association.field", field.clone())),
            }
        }

        if errors.is_empty() {
            Ok(resolved)
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Profile;
    use crate::importer::schema::SchemaRegistry;
    use std::collections::BTreeMap;

    fn header(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_header_with_aliases() {
        let registry = SchemaRegistry::builtin().unwrap();
        let aliases = HashMap::new();
        let resolver = ColumnResolver::new(registry.schema_for(Profile::Student), &aliases);

        let resolved = resolver
            .resolve_header(&header(&["Nom", " Prénom ", "Date de naissance", "CLASSES"]))
            .unwrap();

        assert_eq!(
            resolved.columns,
            vec![
                (0, "lastName".to_string()),
                (1, "firstName".to_string()),
                (2, "birthDate".to_string()),
                (3, "classes".to_string()),
            ]
        );
        assert!(!resolved.has_field("externalId"));
    }

    #[test]
    fn test_header_errors_accumulate() {
        let registry = SchemaRegistry::builtin().unwrap();
        let aliases = HashMap::new();
        let resolver = ColumnResolver::new(registry.schema_for(Profile::Student), &aliases);

        let errors = resolver
            .resolve_header(&header(&["Nom", "Prénom", "Couleur"]))
            .unwrap_err();

        assert_eq!(
            errors,
            vec![
                ColumnError::new("invalid.column", "Couleur"),
                ColumnError::new("invalid.column", "birthDate"),
            ]
        );
    }

    #[test]
    fn test_config_alias() {
        let registry = SchemaRegistry::builtin().unwrap();
        let mut aliases = HashMap::new();
        aliases.insert("discipline".to_string(), "subjectTaught".to_string());
        let resolver = ColumnResolver::new(registry.schema_for(Profile::Teacher), &aliases);

        let resolved = resolver
            .resolve_header(&header(&["Nom", "Prénom", "Discipline"]))
            .unwrap();
        assert_eq!(resolved.index_of("subjectTaught"), Some(2));
    }

    #[test]
    fn test_association_mode() {
        let registry = SchemaRegistry::builtin().unwrap();
        let aliases = HashMap::new();
        let resolver = ColumnResolver::new(registry.schema_for(Profile::Relative), &aliases);

        let mut columns = BTreeMap::new();
        columns.insert(4, "childLastName".to_string());
        columns.insert(0, "lastName".to_string());
        let association = ColumnAssociation {
            profile: Some(Profile::Relative),
            columns,
        };
        let resolved = resolver.resolve_association(&association).unwrap();
        assert_eq!(resolved.columns[0], (0, "lastName".to_string()));
        assert_eq!(resolved.columns[1], (4, "childLastName".to_string()));

        let mut columns = BTreeMap::new();
        columns.insert(1, "favouriteColour".to_string());
        let errors = resolver
            .resolve_association(&ColumnAssociation {
                profile: None,
                columns,
            })
            .unwrap_err();
        assert_eq!(errors[0].key, "unknown.association.field");
    }
}
