// ==========================================
// 目录导入引擎 - 课表实体登记表
// ==========================================
// 职责: 解析期间按来源标识（Ident）登记教室 / 设备 / 科目 / 班级 / 组 / 教职工
// 生命周期: 单次课表导入；第二遍解析结束后只读
// ==========================================

use crate::domain::timetable::Slot;
use crate::timetable::document::XmlEntity;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::warn;

/// 班级（含子班级）登记项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassEntry {
    /// 经班级名映射后的名称
    pub class_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    pub week1: Option<NaiveDate>,
    pub slots: HashMap<u32, Slot>,
    rooms: HashMap<String, String>,
    equipments: HashMap<String, String>,
    subjects: HashMap<String, String>,
    /// 组 Ident → 组名
    groups: HashMap<String, String>,
    classes: HashMap<String, ClassEntry>,
    sub_classes: HashMap<String, ClassEntry>,
    /// 班级 / 子班级 Ident → 所属组 Ident
    class_groups: HashMap<String, Vec<String>>,
    sub_class_groups: HashMap<String, Vec<String>>,
    /// 教职工 Ident → 目录用户 id
    teachers: HashMap<String, String>,
    personnels: HashMap<String, String>,
}

fn ident(entity: &XmlEntity) -> Option<String> {
    entity.attr("Ident").map(str::to_string)
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== 日历 =====

    /// SchoolYear{DatePremierJourSemaine1}
    pub fn set_school_year(&mut self, entity: &XmlEntity) {
        let raw = entity.attr("DatePremierJourSemaine1").unwrap_or("");
        let date = raw.get(..10).unwrap_or(raw);
        match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            Ok(week1) => self.week1 = Some(week1),
            Err(e) => warn!(value = raw, error = %e, "首周日期无效"),
        }
    }

    /// Emploi{DureePlace, Place[]{Numero, LibelleHeureDebut, LibelleHeureFin}}
    pub fn set_schedule(&mut self, entity: &XmlEntity) {
        let duration_secs = entity
            .attr("DureePlace")
            .and_then(|v| v.parse::<u32>().ok())
            .and_then(|minutes| minutes.checked_mul(60))
            .unwrap_or(0);

        for place in entity.children("Place") {
            let number = place.attr("Numero").and_then(|v| v.parse::<u32>().ok());
            let slot = place
                .attr("LibelleHeureDebut")
                .and_then(|start| Slot::parse(start, place.attr("LibelleHeureFin"), duration_secs));
            match (number, slot) {
                (Some(number), Some(slot)) => {
                    self.slots.insert(number, slot);
                }
                _ => warn!(place = ?place.attributes, "课时定义无效，已忽略"),
            }
        }
    }

    pub fn slot(&self, number: u32) -> Option<&Slot> {
        self.slots.get(&number)
    }

    // ===== 参考实体 =====

    pub fn add_room(&mut self, entity: &XmlEntity) {
        if let (Some(id), Some(name)) = (ident(entity), entity.attr("Nom")) {
            self.rooms.insert(id, name.to_string());
        }
    }

    pub fn add_equipment(&mut self, entity: &XmlEntity) {
        if let (Some(id), Some(name)) = (ident(entity), entity.attr("Nom")) {
            self.equipments.insert(id, name.to_string());
        }
    }

    /// 科目标识: structureExternalId$Code（无 Code 时取 Ident）
    pub fn add_subject(&mut self, entity: &XmlEntity, structure_external_id: &str) {
        if let Some(id) = ident(entity) {
            let code = entity.attr("Code").unwrap_or(&id).to_string();
            self.subjects
                .insert(id, format!("{}${}", structure_external_id, code));
        }
    }

    /// 登记班级及其子班级
    ///
    /// # 返回
    /// - 映射后的班级名（用于未知班级标记）
    pub fn add_class(
        &mut self,
        entity: &XmlEntity,
        classes_mapping: &HashMap<String, String>,
    ) -> Option<String> {
        let id = ident(entity)?;
        let original = entity.attr("Nom")?;
        let class_name = classes_mapping
            .get(original)
            .filter(|mapped| !mapped.is_empty())
            .cloned()
            .unwrap_or_else(|| original.to_string());

        for part in entity.children("PartieDeClasse") {
            if let Some(part_id) = ident(part) {
                self.sub_classes.insert(
                    part_id,
                    ClassEntry {
                        class_name: class_name.clone(),
                    },
                );
            }
        }
        self.classes.insert(
            id,
            ClassEntry {
                class_name: class_name.clone(),
            },
        );
        Some(class_name)
    }

    /// 登记组，并记录组内班级 / 子班级
    ///
    /// # 返回
    /// - 组名
    pub fn add_group(&mut self, entity: &XmlEntity) -> Option<String> {
        let id = ident(entity)?;
        let name = entity.attr("Nom")?.to_string();

        for class in entity.children("Classe") {
            if let Some(class_id) = ident(class) {
                self.class_groups.entry(class_id).or_default().push(id.clone());
            }
        }
        for part in entity.children("PartieDeClasse") {
            if let Some(part_id) = ident(part) {
                self.sub_class_groups
                    .entry(part_id)
                    .or_default()
                    .push(id.clone());
            }
        }

        self.groups.insert(id, name.clone());
        Some(name)
    }

    /// 班级（或子班级）所属组的组名
    pub fn group_names_of(&self, class_ident: &str, sub_class: bool) -> Vec<&str> {
        let index = if sub_class {
            &self.sub_class_groups
        } else {
            &self.class_groups
        };
        index
            .get(class_ident)
            .map(|groups| {
                groups
                    .iter()
                    .filter_map(|g| self.groups.get(g).map(String::as_str))
                    .collect()
            })
            .unwrap_or_default()
    }

    // ===== 教职工 =====

    pub fn add_teacher(&mut self, ident: impl Into<String>, user_id: impl Into<String>) {
        self.teachers.insert(ident.into(), user_id.into());
    }

    pub fn add_personnel(&mut self, ident: impl Into<String>, user_id: impl Into<String>) {
        self.personnels.insert(ident.into(), user_id.into());
    }

    // ===== 查找 =====

    pub fn teacher(&self, ident: &str) -> Option<&str> {
        self.teachers.get(ident).map(String::as_str)
    }

    pub fn personnel(&self, ident: &str) -> Option<&str> {
        self.personnels.get(ident).map(String::as_str)
    }

    pub fn room(&self, ident: &str) -> Option<&str> {
        self.rooms.get(ident).map(String::as_str)
    }

    pub fn equipment(&self, ident: &str) -> Option<&str> {
        self.equipments.get(ident).map(String::as_str)
    }

    pub fn subject(&self, ident: &str) -> Option<&str> {
        self.subjects.get(ident).map(String::as_str)
    }

    pub fn group_name(&self, ident: &str) -> Option<&str> {
        self.groups.get(ident).map(String::as_str)
    }

    pub fn class_name(&self, ident: &str) -> Option<&str> {
        self.classes.get(ident).map(|c| c.class_name.as_str())
    }
}
