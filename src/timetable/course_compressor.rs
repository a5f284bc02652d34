// ==========================================
// 目录导入引擎 - 课程区间压缩
// ==========================================
// 职责: 每个条目的 52 周出勤位图 → 活动集合恒定的最大连续区间
// 规则:
// - 第 w 周有效出勤 = presence & !cancellation（取消优先）
// - 活动集合变化时关闭当前区间；空集合不产生区间
// - 第 52 周后关闭仍打开的区间
// ==========================================

use crate::domain::timetable::{CourseInterval, ScheduleItem};
use std::collections::BTreeSet;

/// 学年周数
pub const WEEKS_PER_YEAR: u32 = 52;

/// 第 week 周的活动条目下标
pub fn active_set(items: &[ScheduleItem], cancelled: Option<u64>, week: u32) -> BTreeSet<usize> {
    let bit = 1u64 << week;
    if cancelled.map(|mask| mask & bit != 0).unwrap_or(false) {
        return BTreeSet::new();
    }
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.weeks & bit != 0)
        .map(|(index, _)| index)
        .collect()
}

/// 压缩一个课程定义的出勤位图
pub fn compress(items: &[ScheduleItem], cancelled: Option<u64>) -> Vec<CourseInterval> {
    compress_sets((1..=WEEKS_PER_YEAR).map(|week| active_set(items, cancelled, week)))
}

/// 对按周排列的活动集合做区间压缩（第一个元素为第 1 周）
pub fn compress_sets<I>(weeks: I) -> Vec<CourseInterval>
where
    I: IntoIterator<Item = BTreeSet<usize>>,
{
    let mut intervals = Vec::new();
    let mut previous: BTreeSet<usize> = BTreeSet::new();
    let mut run_start = 0u32;
    let mut last_week = 0u32;

    for (offset, current) in weeks.into_iter().enumerate() {
        let week = offset as u32 + 1;
        last_week = week;
        if current == previous {
            continue;
        }
        if !previous.is_empty() {
            intervals.push(CourseInterval {
                start_week: run_start,
                end_week: week - 1,
                active: std::mem::take(&mut previous),
            });
        }
        run_start = week;
        previous = current;
    }

    if !previous.is_empty() {
        intervals.push(CourseInterval {
            start_week: run_start,
            end_week: last_week,
            active: previous,
        });
    }

    intervals
}
