// ==========================================
// 目录导入引擎 - EDT 课表导入
// ==========================================
// 流程:
// 1. 初始化: 按 UAI 解析机构，读取已建立的 IDPN 映射
// 2. 第一遍: 仅收集教职工 → StaffMatcher
// 3. 第二遍: 登记参考实体，收集学生与课程
// 4. 提交: 目录单事务（功能组 / 未知班级 / 成员关系 / 过期清理）
//          + 课程 upsert + 删除本次未触及的课程
// ==========================================

use crate::config::feeder_settings::FeederSettings;
use crate::domain::timetable::{
    Course, FunctionalGroup, GroupMembership, StaffCandidate, TimetableCommit,
};
use crate::domain::types::Profile;
use crate::domain::user::Structure;
use crate::i18n::t_with_args;
use crate::importer::report::ReportEntry;
use crate::repository::course_repo::CourseRepository;
use crate::repository::directory_repo::DirectoryRepository;
use crate::repository::retry::round_trip;
use crate::timetable::course_assembler::{course_definition, CourseAssembler};
use crate::timetable::course_compressor::compress;
use crate::timetable::document::{parse_document, EntityHandler, XmlEntity};
use crate::timetable::entity_registry::EntityRegistry;
use crate::timetable::error::{TimetableError, TimetableResult};
use crate::timetable::staff_matcher::StaffMatcher;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 成员关系来源
pub const EDT_SOURCE: &str = "EDT";

// ==========================================
// TimetableReport - 课表导入报告
// ==========================================
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimetableReport {
    pub courses: usize,
    pub deleted_courses: usize,
    pub matched_staff: usize,
    pub created_staff: usize,
    pub groups_created: usize,
    pub memberships: usize,
    pub errors: Vec<ReportEntry>,
}

impl TimetableReport {
    fn add_error(&mut self, key: &str, params: Vec<String>) {
        self.errors.push(ReportEntry::new(None, None, key, params));
    }

    /// 渲染为本地化 JSON
    pub fn render(&self) -> Value {
        let errors: Vec<String> = self.errors.iter().map(ReportEntry::render).collect();
        let courses = self.courses.to_string();
        let memberships = self.memberships.to_string();
        json!({
            "courses": self.courses,
            "deletedCourses": self.deleted_courses,
            "matchedStaff": self.matched_staff,
            "createdStaff": self.created_staff,
            "groupsCreated": self.groups_created,
            "memberships": self.memberships,
            "errors": errors,
            "summary": t_with_args(
                "timetable.summary",
                &[("0", courses.as_str()), ("1", memberships.as_str())],
            ),
        })
    }
}

/// 解析日期为 UTC 毫秒（支持日期 / 日期时间 / RFC 3339）
pub fn parse_timestamp_millis(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc().timestamp_millis());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis())
}

// ==========================================
// 第一遍: 教职工收集
// ==========================================
struct StaffCollector<'a> {
    structure_external_id: &'a str,
    /// 已建立的 IDPN → 用户 id
    mapping: &'a HashMap<String, String>,
    registry: &'a mut EntityRegistry,
    report: &'a mut TimetableReport,
    candidates: Vec<StaffCandidate>,
    /// IDPN → 来源 Ident
    idents: HashMap<String, Vec<String>>,
}

impl StaffCollector<'_> {
    fn collect(&mut self, entity: &XmlEntity, profile: Profile, source_key: &str) {
        let ident = match entity.attr("Ident") {
            Some(ident) => ident.to_string(),
            None => return,
        };
        let source_id = match entity.attr(source_key) {
            Some(source_id) => source_id,
            None => {
                self.report
                    .add_error("missing.attribute", vec![source_key.to_string()]);
                return;
            }
        };
        let idpn = format!("{}${}", self.structure_external_id, source_id);

        if let Some(user_id) = self.mapping.get(&idpn) {
            match profile {
                Profile::Teacher => self.registry.add_teacher(ident, user_id.clone()),
                _ => self.registry.add_personnel(ident, user_id.clone()),
            }
            return;
        }

        let (last_name, first_name) = match (entity.attr("Nom"), entity.attr("Prenom")) {
            (Some(last), Some(first)) => (last.to_string(), first.to_string()),
            (None, _) => {
                self.report
                    .add_error("missing.attribute", vec!["lastName".to_string()]);
                return;
            }
            (_, None) => {
                self.report
                    .add_error("missing.attribute", vec!["firstName".to_string()]);
                return;
            }
        };

        let idents = self.idents.entry(idpn.clone()).or_default();
        if idents.is_empty() {
            self.candidates.push(StaffCandidate {
                idpn,
                source_ident: ident.clone(),
                last_name,
                first_name,
                profile,
            });
        }
        idents.push(ident);
    }
}

impl EntityHandler for StaffCollector<'_> {
    fn on_entity(&mut self, entity: XmlEntity) -> TimetableResult<()> {
        match entity.name.as_str() {
            "Professeur" => self.collect(&entity, Profile::Teacher, "IDPN"),
            // 职员无 IDPN，以 Ident 合成
            "Personnel" => self.collect(&entity, Profile::Personnel, "Ident"),
            _ => {}
        }
        Ok(())
    }
}

// ==========================================
// 第二遍: 参考实体登记
// ==========================================
struct ReferenceCollector<'a> {
    structure_external_id: &'a str,
    classes_mapping: &'a HashMap<String, String>,
    registry: &'a mut EntityRegistry,
    commit: &'a mut TimetableCommit,
    /// 依赖组与班级登记，解析结束后处理
    students: Vec<XmlEntity>,
    courses: Vec<XmlEntity>,
}

impl EntityHandler for ReferenceCollector<'_> {
    fn on_entity(&mut self, entity: XmlEntity) -> TimetableResult<()> {
        match entity.name.as_str() {
            "SchoolYear" => self.registry.set_school_year(&entity),
            "Emploi" => self.registry.set_schedule(&entity),
            "Salle" => self.registry.add_room(&entity),
            "Materiel" => self.registry.add_equipment(&entity),
            "Matiere" => self
                .registry
                .add_subject(&entity, self.structure_external_id),
            "Classe" => {
                if let Some(class_name) = self.registry.add_class(&entity, self.classes_mapping) {
                    self.commit.unknown_classes.push(class_name);
                }
            }
            "Groupe" => {
                if let Some(name) = self.registry.add_group(&entity) {
                    self.commit.groups.push(FunctionalGroup {
                        id: Uuid::new_v4().to_string(),
                        external_id: format!("{}${}", self.structure_external_id, name),
                        name,
                    });
                }
            }
            "Eleve" => self.students.push(entity),
            "Cours" => self.courses.push(entity),
            _ => {}
        }
        Ok(())
    }
}

// ==========================================
// EdtImporter
// ==========================================
pub struct EdtImporter<R, C>
where
    R: DirectoryRepository,
    C: CourseRepository,
{
    directory: R,
    courses: C,
    settings: FeederSettings,
}

impl<R, C> EdtImporter<R, C>
where
    R: DirectoryRepository,
    C: CourseRepository,
{
    /// 创建新的 EdtImporter 实例
    ///
    /// # 参数
    /// - directory: 目录存储
    /// - courses: 课程文档存储
    /// - settings: 运行配置（往返策略 / 班级名映射）
    pub fn new(directory: R, courses: C, settings: FeederSettings) -> Self {
        Self {
            directory,
            courses,
            settings,
        }
    }

    /// 导入一份课表文档
    ///
    /// # 参数
    /// - uai: 机构 UAI
    /// - content: 已解码的文档
    /// - cancel: 取消令牌
    ///
    /// # 返回
    /// - Ok(TimetableReport): 导入统计与非致命错误
    /// - Err: 机构无效、文档无效、教职工匹配未完成、存储失败、取消
    #[instrument(skip(self, content, cancel), fields(uai = %uai))]
    pub async fn import(
        &self,
        uai: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> TimetableResult<TimetableReport> {
        let policy = &self.settings.round_trip;
        let directory = &self.directory;
        let import_timestamp = Utc::now().timestamp_millis();
        let mut report = TimetableReport::default();

        // === 步骤 1: 初始化 ===
        let structure: Structure = round_trip(policy, cancel, "find_structure_by_uai", move || {
            directory.find_structure_by_uai(uai)
        })
        .await?
        .ok_or_else(|| TimetableError::InvalidStructure(uai.to_string()))?;
        let structure_id = structure
            .id
            .clone()
            .ok_or_else(|| TimetableError::InvalidStructure(uai.to_string()))?;
        let structure_external_id = structure.external_id.as_str();

        let mapping = round_trip(policy, cancel, "load_staff_mapping", move || {
            directory.load_staff_mapping(structure_external_id)
        })
        .await?;
        info!(
            structure_external_id = %structure_external_id,
            known_staff = mapping.len(),
            "课表导入初始化完成"
        );

        // === 步骤 2: 第一遍（教职工） ===
        let mut registry = EntityRegistry::new();
        let (candidates, idents) = {
            let mut collector = StaffCollector {
                structure_external_id,
                mapping: &mapping,
                registry: &mut registry,
                report: &mut report,
                candidates: Vec::new(),
                idents: HashMap::new(),
            };
            parse_document(content, &mut collector)?;
            (collector.candidates, collector.idents)
        };
        info!(unmatched = candidates.len(), "教职工收集完成");

        if !candidates.is_empty() {
            let matcher = StaffMatcher::new(directory, policy, cancel);
            let uai_scope = structure.uai.as_deref().unwrap_or(uai);
            let resolution = matcher
                .resolve(uai_scope, structure_external_id, candidates)
                .await?;

            for staff in resolution.all() {
                for ident in idents.get(&staff.idpn).into_iter().flatten() {
                    match staff.profile {
                        Profile::Teacher => registry.add_teacher(ident.clone(), staff.id.clone()),
                        _ => registry.add_personnel(ident.clone(), staff.id.clone()),
                    }
                }
            }
            report.matched_staff = resolution.matched.len();
            report.created_staff = resolution.created.len();
        }

        if cancel.is_cancelled() {
            return Err(TimetableError::Cancelled);
        }

        // === 步骤 3: 第二遍（全部实体） ===
        let mut commit = TimetableCommit {
            structure_external_id: structure_external_id.to_string(),
            source: EDT_SOURCE.to_string(),
            stale_before: import_timestamp,
            ..TimetableCommit::default()
        };
        let (students, course_entities) = {
            let mut collector = ReferenceCollector {
                structure_external_id,
                classes_mapping: &self.settings.classes_mapping,
                registry: &mut registry,
                commit: &mut commit,
                students: Vec::new(),
                courses: Vec::new(),
            };
            parse_document(content, &mut collector)?;
            (collector.students, collector.courses)
        };

        commit.memberships = memberships(
            &registry,
            structure_external_id,
            &students,
            import_timestamp,
        );
        let courses = self.assemble_courses(
            &registry,
            &structure_id,
            &course_entities,
            import_timestamp,
            &mut report,
        )?;
        info!(
            groups = commit.groups.len(),
            memberships = commit.memberships.len(),
            courses = courses.len(),
            "课表解析完成"
        );

        // === 步骤 4: 提交 ===
        let commit_ref = &commit;
        let summary = round_trip(policy, cancel, "commit_timetable", move || {
            directory.commit_timetable(commit_ref)
        })
        .await?;
        report.groups_created = summary.groups_created;
        report.memberships = summary.memberships_written;

        let course_repo = &self.courses;
        let courses_ref = courses.as_slice();
        report.courses = round_trip(policy, cancel, "save_courses", move || {
            course_repo.save_courses(courses_ref)
        })
        .await?;

        let structure_id_ref = structure_id.as_str();
        report.deleted_courses = round_trip(policy, cancel, "delete_stale_courses", move || {
            course_repo.delete_stale(structure_id_ref, import_timestamp)
        })
        .await?;

        info!(
            courses = report.courses,
            deleted_courses = report.deleted_courses,
            memberships = report.memberships,
            memberships_deleted = summary.memberships_deleted,
            errors = report.errors.len(),
            "课表导入完成"
        );
        Ok(report)
    }

    /// 压缩并组装全部课程
    fn assemble_courses(
        &self,
        registry: &EntityRegistry,
        structure_id: &str,
        entities: &[XmlEntity],
        import_timestamp: i64,
        report: &mut TimetableReport,
    ) -> TimetableResult<Vec<Course>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let week1 = registry.week1.ok_or_else(|| {
            TimetableError::InvalidDocument("缺少 DatePremierJourSemaine1".to_string())
        })?;
        let assembler = CourseAssembler::new(registry, structure_id, week1, import_timestamp);

        let mut courses = Vec::new();
        let mut seen = HashSet::new();
        for entity in entities {
            let definition = match course_definition(entity) {
                Ok(definition) => definition,
                Err(e) => {
                    warn!(error = %e, "课程定义无效，已跳过");
                    report.add_error(
                        "invalid.course",
                        vec![entity.attr("Ident").unwrap_or("").to_string()],
                    );
                    continue;
                }
            };

            for interval in compress(&definition.items, definition.cancelled_weeks) {
                match assembler.assemble(&definition, &interval) {
                    Ok(course) => {
                        if seen.insert(course.id.clone()) {
                            courses.push(course);
                        }
                    }
                    Err(TimetableError::UnknownSlot(slot)) => {
                        report.add_error("unknown.slot", vec![slot.to_string()]);
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(courses)
    }
}

/// 学生 → 功能组成员关系
///
/// 缺少日期或入组日期在未来的班级跳过
fn memberships(
    registry: &EntityRegistry,
    structure_external_id: &str,
    students: &[XmlEntity],
    now: i64,
) -> Vec<GroupMembership> {
    let mut result = Vec::new();

    for student in students {
        let attachment_id = match student.attr("IDSconet") {
            Some(id) => id,
            None => {
                debug!(student = ?student.attr("Ident"), "学生缺少 IDSconet，无法关联");
                continue;
            }
        };

        for (element, sub_class) in [("Classe", false), ("PartieDeClasse", true)] {
            for class in student.children(element) {
                let (ident, in_date, out_date) = match (
                    class.attr("Ident"),
                    class.attr("DateEntree").and_then(parse_timestamp_millis),
                    class.attr("DateSortie").and_then(parse_timestamp_millis),
                ) {
                    (Some(ident), Some(in_date), Some(out_date)) if in_date <= now => {
                        (ident, in_date, out_date)
                    }
                    _ => continue,
                };

                for group_name in registry.group_names_of(ident, sub_class) {
                    result.push(GroupMembership {
                        attachment_id: attachment_id.to_string(),
                        group_external_id: format!("{}${}", structure_external_id, group_name),
                        source: EDT_SOURCE.to_string(),
                        in_date,
                        out_date,
                    });
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_millis() {
        assert_eq!(parse_timestamp_millis("1970-01-02"), Some(86_400_000));
        assert_eq!(
            parse_timestamp_millis("1970-01-01T00:00:01"),
            Some(1_000)
        );
        assert_eq!(
            parse_timestamp_millis("1970-01-01T01:00:00+01:00"),
            Some(0)
        );
        assert_eq!(parse_timestamp_millis("not a date"), None);
    }

    #[test]
    fn test_memberships_skip_future_and_missing_dates() {
        let mut registry = EntityRegistry::new();
        registry.add_group(
            &XmlEntity::new("Groupe")
                .with_attr("Ident", "G1")
                .with_attr("Nom", "Latin")
                .with_child(XmlEntity::new("Classe").with_attr("Ident", "C1")),
        );

        let now = parse_timestamp_millis("2017-01-01").unwrap();
        let student = |id: &str, entree: &str| {
            XmlEntity::new("Eleve")
                .with_attr("IDSconet", id)
                .with_child(
                    XmlEntity::new("Classe")
                        .with_attr("Ident", "C1")
                        .with_attr("DateEntree", entree)
                        .with_attr("DateSortie", "2017-07-01"),
                )
        };
        let students = vec![
            student("A1", "2016-09-01"),
            student("A2", "2018-09-01"),
            XmlEntity::new("Eleve")
                .with_attr("IDSconet", "A3")
                .with_child(XmlEntity::new("Classe").with_attr("Ident", "C1")),
            XmlEntity::new("Eleve").with_attr("Ident", "no-sconet"),
        ];

        let result = memberships(&registry, "S1", &students, now);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].attachment_id, "A1");
        assert_eq!(result[0].group_external_id, "S1$Latin");
        assert_eq!(result[0].source, EDT_SOURCE);
    }

    #[test]
    fn test_report_render() {
        let mut report = TimetableReport {
            courses: 3,
            ..TimetableReport::default()
        };
        report.add_error("unknown.slot", vec!["9".to_string()]);
        let rendered = report.render();
        assert_eq!(rendered["courses"], 3);
        assert_eq!(rendered["errors"].as_array().unwrap().len(), 1);
    }
}
