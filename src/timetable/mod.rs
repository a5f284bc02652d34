// ==========================================
// 目录导入引擎 - 课表导入层
// ==========================================
// 职责: EDT 课表文档 → 教职工匹配 + 功能组成员关系 + 课程文档
// ==========================================

pub mod course_assembler;
pub mod course_compressor;
pub mod document;
pub mod edt_importer;
pub mod entity_registry;
pub mod error;
pub mod staff_matcher;

pub use course_assembler::{checksum, course_definition, CourseAssembler};
pub use course_compressor::{compress, WEEKS_PER_YEAR};
pub use document::{decode_document, parse_document, EntityHandler, XmlEntity};
pub use edt_importer::{EdtImporter, TimetableReport, EDT_SOURCE};
pub use entity_registry::EntityRegistry;
pub use error::{TimetableError, TimetableResult};
pub use staff_matcher::{StaffMatcher, StaffResolution};
