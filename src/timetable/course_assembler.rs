// ==========================================
// 目录导入引擎 - 课程组装
// ==========================================
// 职责: 课程定义 + 压缩区间 → 课程文档
// 日期: 首周 + (周-1) 周 + (星期-1) 天 + 课时起止时间
// 标识: id = hex(SHA-256(内容 JSON))，内容相同则 id 相同（幂等 upsert）
// ==========================================

use crate::domain::timetable::{Course, CourseContent, CourseDefinition, CourseInterval, ScheduleItem};
use crate::domain::types::ItemKind;
use crate::timetable::document::XmlEntity;
use crate::timetable::entity_registry::EntityRegistry;
use crate::timetable::error::{TimetableError, TimetableResult};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use sha2::{Digest, Sha256};
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Cours 实体 → 课程定义
///
/// 条目取自带 Semaines 的子元素（Matiere / Etiquette / Periode / PartieDeClasse 除外）
pub fn course_definition(entity: &XmlEntity) -> TimetableResult<CourseDefinition> {
    let number = |key: &str| -> TimetableResult<u32> {
        entity
            .attr(key)
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(|| TimetableError::InvalidDocument(format!("Cours 缺少 {}", key)))
    };

    let mut items = Vec::new();
    for (element, children) in &entity.children {
        let kind = match ItemKind::from_element(element) {
            Some(kind) => kind,
            None => continue,
        };
        for child in children {
            let weeks = child.attr("Semaines").and_then(|w| w.parse::<u64>().ok());
            if let (Some(ident), Some(weeks)) = (child.attr("Ident"), weeks) {
                items.push(ScheduleItem::new(ident, kind, weeks));
            }
        }
    }

    let day = number("Jour")?;
    if !(1..=7).contains(&day) {
        return Err(TimetableError::InvalidDocument(format!("Cours Jour 越界: {}", day)));
    }

    let definition = CourseDefinition {
        ident: entity.attr("Ident").map(str::to_string),
        subject_ident: entity
            .children("Matiere")
            .first()
            .and_then(|m| m.attr("Ident"))
            .map(str::to_string),
        day,
        start_slot: number("NumeroPlaceDebut")?,
        slot_count: number("NombrePlaces")?,
        items,
        cancelled_weeks: entity
            .attr("SemainesAnnulation")
            .and_then(|w| w.parse::<u64>().ok()),
    };
    if definition.end_slot().is_none() {
        return Err(TimetableError::InvalidDocument(
            "Cours 课时范围溢出".to_string(),
        ));
    }
    Ok(definition)
}

/// 课程内容校验和
pub fn checksum(content: &CourseContent) -> TimetableResult<String> {
    let bytes = serde_json::to_vec(content)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

pub struct CourseAssembler<'a> {
    registry: &'a EntityRegistry,
    structure_id: &'a str,
    week1: NaiveDate,
    /// 导入时间戳（毫秒），不参与校验和
    modified: i64,
}

impl<'a> CourseAssembler<'a> {
    pub fn new(
        registry: &'a EntityRegistry,
        structure_id: &'a str,
        week1: NaiveDate,
        modified: i64,
    ) -> Self {
        Self {
            registry,
            structure_id,
            week1,
            modified,
        }
    }

    fn day_start(&self, week: u32, day: u32) -> NaiveDateTime {
        let date = self.week1
            + Duration::weeks(i64::from(week) - 1)
            + Duration::days(i64::from(day) - 1);
        date.and_time(chrono::NaiveTime::MIN)
    }

    /// 组装一个区间的课程
    ///
    /// # 返回
    /// - Err(UnknownSlot): 起始或结束课时未在 Emploi 中定义
    pub fn assemble(
        &self,
        definition: &CourseDefinition,
        interval: &CourseInterval,
    ) -> TimetableResult<Course> {
        let first_slot = self
            .registry
            .slot(definition.start_slot)
            .ok_or(TimetableError::UnknownSlot(definition.start_slot))?;
        let end_slot = definition.end_slot().ok_or_else(|| {
            TimetableError::InvalidDocument("Cours 课时范围溢出".to_string())
        })?;
        let last_slot = self
            .registry
            .slot(end_slot)
            .ok_or(TimetableError::UnknownSlot(end_slot))?;

        let start = self.day_start(interval.start_week, definition.day)
            + Duration::seconds(i64::from(first_slot.start));
        let end = self.day_start(interval.end_week, definition.day)
            + Duration::seconds(i64::from(last_slot.end));

        let mut content = CourseContent {
            structure_id: self.structure_id.to_string(),
            subject_id: definition
                .subject_ident
                .as_deref()
                .and_then(|ident| self.registry.subject(ident))
                .map(str::to_string),
            start_date: start.format(DATE_FORMAT).to_string(),
            end_date: end.format(DATE_FORMAT).to_string(),
            day_of_week: start.weekday().number_from_monday(),
            teacher_ids: Vec::new(),
            classes: Vec::new(),
            groups: Vec::new(),
            equipment_labels: Vec::new(),
            room_labels: Vec::new(),
            personnel_ids: Vec::new(),
        };

        let mut unresolved = 0usize;
        for &index in &interval.active {
            let item = match definition.items.get(index) {
                Some(item) => item,
                None => continue,
            };
            let (target, value) = match item.kind {
                ItemKind::Teacher => (&mut content.teacher_ids, self.registry.teacher(&item.ident)),
                ItemKind::Class => (&mut content.classes, self.registry.class_name(&item.ident)),
                ItemKind::Group => (&mut content.groups, self.registry.group_name(&item.ident)),
                ItemKind::Equipment => (
                    &mut content.equipment_labels,
                    self.registry.equipment(&item.ident),
                ),
                ItemKind::Room => (&mut content.room_labels, self.registry.room(&item.ident)),
                ItemKind::Personnel => (
                    &mut content.personnel_ids,
                    self.registry.personnel(&item.ident),
                ),
            };
            match value {
                Some(value) => target.push(value.to_string()),
                None => unresolved += 1,
            }
        }
        if unresolved > 0 {
            debug!(
                course = ?definition.ident,
                unresolved = unresolved,
                "部分条目未登记，已从课程中省略"
            );
        }

        Ok(Course {
            id: checksum(&content)?,
            content,
            modified: self.modified,
        })
    }
}
