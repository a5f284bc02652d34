// ==========================================
// 目录导入引擎 - 学生关联键
// ==========================================
// 无外部标识的学生与其家长记录通过同一确定性键关联:
// hex(SHA-1(UTF-8(机构外部标识 + 姓 + 名 + 班级 + 种子)))
// 与既有目录系统生成的键逐字节一致
// ==========================================

use sha1::{Digest, Sha1};

/// 默认学生种子（可由 feeder.student_seed 覆盖）
pub const DEFAULT_STUDENT_SEED: i64 = 0;

/// 计算学生关联键
///
/// # 参数
/// - structure_external_id: 机构外部标识
/// - last_name / first_name / classes: 自动去除首尾空白
/// - seed: 学生种子
pub fn link_key(
    structure_external_id: &str,
    last_name: &str,
    first_name: &str,
    classes: &str,
    seed: i64,
) -> String {
    let mapping = format!(
        "{}{}{}{}{}",
        structure_external_id,
        last_name.trim(),
        first_name.trim(),
        classes.trim(),
        seed
    );
    hex::encode(Sha1::digest(mapping.as_bytes()))
}
