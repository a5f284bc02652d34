// ==========================================
// 目录导入引擎 - 课表领域模型
// ==========================================
// 职责: 课表条目 / 课程区间 / 课程文档 / 教职工匹配 / 目录提交
// ==========================================

use crate::domain::types::{ItemKind, Profile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// ScheduleItem - 课程条目
// ==========================================
// weeks: 第 w 周(1..=52)对应 bit (1 << w)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleItem {
    pub ident: String,
    pub kind: ItemKind,
    pub weeks: u64,
}

impl ScheduleItem {
    pub fn new(ident: impl Into<String>, kind: ItemKind, weeks: u64) -> Self {
        Self {
            ident: ident.into(),
            kind,
            weeks,
        }
    }
}

// ==========================================
// CourseDefinition - 课程定义（Cours 实体）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseDefinition {
    pub ident: Option<String>,
    pub subject_ident: Option<String>,
    pub day: u32,
    pub start_slot: u32,
    pub slot_count: u32,
    pub items: Vec<ScheduleItem>,
    pub cancelled_weeks: Option<u64>,
}

impl CourseDefinition {
    /// 最后一个课时序号（溢出时为 None）
    pub fn end_slot(&self) -> Option<u32> {
        self.start_slot.checked_add(self.slot_count.max(1) - 1)
    }
}

// ==========================================
// CourseInterval - 连续出勤区间
// ==========================================
// 不变量: 1 <= start_week <= end_week <= 52，active 非空
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseInterval {
    pub start_week: u32,
    pub end_week: u32,
    pub active: BTreeSet<usize>,
}

// ==========================================
// Slot - 课时
// ==========================================
// 以当日秒数表示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub start: u32,
    pub end: u32,
}

impl Slot {
    /// 解析 "08h30" / "08:30"；缺少结束时间时按课时时长推算
    pub fn parse(start: &str, end: Option<&str>, duration_secs: u32) -> Option<Self> {
        let start = parse_time_label(start)?;
        let end = match end {
            Some(label) if !label.trim().is_empty() => parse_time_label(label)?,
            _ => start.checked_add(duration_secs)?,
        };
        Some(Self { start, end })
    }
}

fn parse_time_label(label: &str) -> Option<u32> {
    let label = label.trim();
    let (hours, minutes) = label
        .split_once(|c: char| c == 'h' || c == 'H' || c == ':')
        .unwrap_or((label, "0"));
    let hours: u32 = hours.trim().parse().ok()?;
    let minutes: u32 = if minutes.trim().is_empty() {
        0
    } else {
        minutes.trim().parse().ok()?
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 3600 + minutes * 60)
}

// ==========================================
// CourseContent / Course - 课程文档
// ==========================================
// id = checksum(CourseContent)，modified 不参与校验和
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseContent {
    pub structure_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub day_of_week: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teacher_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub equipment_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub room_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub personnel_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub content: CourseContent,
    pub modified: i64,
}

// ==========================================
// 教职工匹配
// ==========================================
// idpn: 合成标识 structureExternalId$sourceId，同时作为新建用户的 externalId
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffCandidate {
    pub idpn: String,
    pub source_ident: String,
    pub last_name: String,
    pub first_name: String,
    pub profile: Profile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffMatch {
    pub id: String,
    pub idpn: String,
    pub profile: Profile,
}

// ==========================================
// 目录提交（课表导入）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionalGroup {
    pub id: String,
    pub external_id: String,
    pub name: String,
}

/// 学生 → 功能组 成员关系（带来源与有效期）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMembership {
    pub attachment_id: String,
    pub group_external_id: String,
    pub source: String,
    pub in_date: i64,
    pub out_date: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimetableCommit {
    pub structure_external_id: String,
    pub source: String,
    pub groups: Vec<FunctionalGroup>,
    pub unknown_classes: Vec<String>,
    pub memberships: Vec<GroupMembership>,
    /// 删除来源为 source 且 outDate 早于该时间戳的成员关系
    pub stale_before: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimetableCommitSummary {
    pub groups_created: usize,
    pub memberships_written: usize,
    pub memberships_deleted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_parse_labels() {
        let slot = Slot::parse("08h00", Some("08h55"), 3300).unwrap();
        assert_eq!(slot.start, 8 * 3600);
        assert_eq!(slot.end, 8 * 3600 + 55 * 60);

        let slot = Slot::parse("13:30", None, 3600).unwrap();
        assert_eq!(slot.end, 14 * 3600 + 30 * 60);
    }

    #[test]
    fn test_slot_parse_invalid() {
        assert!(Slot::parse("25h00", None, 60).is_none());
        assert!(Slot::parse("abc", None, 60).is_none());
    }

    #[test]
    fn test_end_slot() {
        let def = CourseDefinition {
            ident: None,
            subject_ident: None,
            day: 1,
            start_slot: 3,
            slot_count: 2,
            items: vec![],
            cancelled_weeks: None,
        };
        assert_eq!(def.end_slot(), Some(4));
    }

    #[test]
    fn test_end_slot_overflow() {
        let def = CourseDefinition {
            ident: None,
            subject_ident: None,
            day: 1,
            start_slot: 2,
            slot_count: u32::MAX,
            items: vec![],
            cancelled_weeks: None,
        };
        assert_eq!(def.end_slot(), None);
    }

    #[test]
    fn test_slot_parse_duration_overflow() {
        assert!(Slot::parse("08h00", None, u32::MAX).is_none());
    }
}
