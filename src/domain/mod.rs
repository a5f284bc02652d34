// ==========================================
// 目录导入引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含导入流程逻辑
// ==========================================

pub mod timetable;
pub mod types;
pub mod user;

// 重导出核心类型
pub use timetable::{
    Course, CourseContent, CourseDefinition, CourseInterval, FunctionalGroup, GroupMembership,
    ScheduleItem, Slot, StaffCandidate, StaffMatch, TimetableCommit, TimetableCommitSummary,
};
pub use types::{FieldType, ItemKind, Profile, RecordState, SchemaFamily};
pub use user::{
    normalize_birth_date, ColumnAssociation, FieldValue, ImportBatch, NameKey, ProfileRecord,
    Structure, UserIdentity,
};
