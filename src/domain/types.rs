// ==========================================
// 目录导入引擎 - 领域类型定义
// ==========================================
// 职责: 档案类型 / 记录状态 / 字段类型 / 课表条目类型
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 档案类型 (Profile)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Profile {
    Personnel,
    Teacher,
    Student,
    Relative,
    Guest,
}

impl Profile {
    pub const ALL: [Profile; 5] = [
        Profile::Personnel,
        Profile::Teacher,
        Profile::Student,
        Profile::Relative,
        Profile::Guest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Personnel => "Personnel",
            Profile::Teacher => "Teacher",
            Profile::Student => "Student",
            Profile::Relative => "Relative",
            Profile::Guest => "Guest",
        }
    }

    /// 档案对应的 schema 族
    pub fn schema_family(&self) -> SchemaFamily {
        match self {
            Profile::Personnel | Profile::Teacher => SchemaFamily::Personnel,
            Profile::Student => SchemaFamily::Student,
            Profile::Relative | Profile::Guest => SchemaFamily::User,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Profile::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| format!("未知档案类型: {}", s))
    }
}

// ==========================================
// Schema 族
// ==========================================
// Personnel/Teacher 共用 Personnel.json，Relative/Guest 共用 User.json
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaFamily {
    Personnel,
    Student,
    User,
}

impl fmt::Display for SchemaFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaFamily::Personnel => write!(f, "Personnel"),
            SchemaFamily::Student => write!(f, "Student"),
            SchemaFamily::User => write!(f, "User"),
        }
    }
}

// ==========================================
// 记录状态 (Record State)
// ==========================================
// NEW: 目录中不存在该 externalId
// UPDATED: 目录中已存在该 externalId
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordState {
    New,
    Updated,
}

impl RecordState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordState::New => "NEW",
            RecordState::Updated => "UPDATED",
        }
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 字段类型 (Field Type)
// ==========================================
// Generic: schema 未声明的字段，首值为字符串，重复出现时提升为数组
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    ArrayString,
    Boolean,
    Generic,
}

impl FieldType {
    pub fn from_schema(raw: &str) -> Self {
        match raw {
            "string" => FieldType::String,
            "array-string" => FieldType::ArrayString,
            "boolean" => FieldType::Boolean,
            _ => FieldType::Generic,
        }
    }
}

// ==========================================
// 课表条目类型 (Schedule Item Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Teacher,
    Class,
    Group,
    Equipment,
    Room,
    Personnel,
}

impl ItemKind {
    /// 课程子元素名 → 条目类型（Matiere/Etiquette/Periode/PartieDeClasse 不参与）
    pub fn from_element(name: &str) -> Option<Self> {
        match name {
            "Professeur" => Some(ItemKind::Teacher),
            "Classe" => Some(ItemKind::Class),
            "Groupe" => Some(ItemKind::Group),
            "Materiel" => Some(ItemKind::Equipment),
            "Salle" => Some(ItemKind::Room),
            "Personnel" => Some(ItemKind::Personnel),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_str() {
        assert_eq!("Student".parse::<Profile>(), Ok(Profile::Student));
        assert_eq!("Relative".parse::<Profile>(), Ok(Profile::Relative));
        assert!("student".parse::<Profile>().is_err());
        assert!("Admin".parse::<Profile>().is_err());
    }

    #[test]
    fn test_schema_family() {
        assert_eq!(Profile::Teacher.schema_family(), SchemaFamily::Personnel);
        assert_eq!(Profile::Guest.schema_family(), SchemaFamily::User);
        assert_eq!(Profile::Student.schema_family(), SchemaFamily::Student);
    }

    #[test]
    fn test_item_kind_ignores_subject() {
        assert_eq!(ItemKind::from_element("Salle"), Some(ItemKind::Room));
        assert_eq!(ItemKind::from_element("Matiere"), None);
        assert_eq!(ItemKind::from_element("PartieDeClasse"), None);
    }
}
