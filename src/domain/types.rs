// ==========================================
// 校园设施新风同步系统 - 领域类型定义
// ==========================================
// 七日标志与同步运行状态
// ==========================================

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 七日标志 (Day Flags)
// ==========================================
// 课表条目的周内重复模式,周一为第一位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayFlags {
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
}

impl DayFlags {
    /// 从周一起始的七元布尔数组构造
    pub fn from_array(flags: [bool; 7]) -> Self {
        Self {
            monday: flags[0],
            tuesday: flags[1],
            wednesday: flags[2],
            thursday: flags[3],
            friday: flags[4],
            saturday: flags[5],
            sunday: flags[6],
        }
    }

    /// 判断指定星期几是否有课
    pub fn is_set(&self, weekday: Weekday) -> bool {
        match weekday {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }

    /// 是否没有任何一天被标记（用于坏数据判定）
    pub fn is_empty(&self) -> bool {
        !(self.monday
            || self.tuesday
            || self.wednesday
            || self.thursday
            || self.friday
            || self.saturday
            || self.sunday)
    }
}

impl fmt::Display for DayFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days = [
            (self.monday, 'M'),
            (self.tuesday, 'T'),
            (self.wednesday, 'W'),
            (self.thursday, 'R'),
            (self.friday, 'F'),
            (self.saturday, 'S'),
            (self.sunday, 'U'),
        ];
        for (set, ch) in days {
            write!(f, "{}", if set { ch } else { '-' })?;
        }
        Ok(())
    }
}

// ==========================================
// 同步运行状态 (Sync Run Status)
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncRunStatus {
    Running,   // 运行中
    Completed, // 正常完成
    Failed,    // 运行失败（打开存储失败等致命错误）
}

impl fmt::Display for SyncRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncRunStatus::Running => write!(f, "RUNNING"),
            SyncRunStatus::Completed => write!(f, "COMPLETED"),
            SyncRunStatus::Failed => write!(f, "FAILED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_flags_is_set() {
        let flags = DayFlags::from_array([true, false, true, false, true, false, false]);
        assert!(flags.is_set(Weekday::Mon));
        assert!(!flags.is_set(Weekday::Tue));
        assert!(flags.is_set(Weekday::Wed));
        assert!(flags.is_set(Weekday::Fri));
        assert!(!flags.is_set(Weekday::Sun));
    }

    #[test]
    fn test_day_flags_empty() {
        let flags = DayFlags::from_array([false; 7]);
        assert!(flags.is_empty());

        let flags = DayFlags::from_array([false, false, false, false, false, false, true]);
        assert!(!flags.is_empty());
    }

    #[test]
    fn test_day_flags_display() {
        let flags = DayFlags::from_array([true, false, true, false, true, false, false]);
        assert_eq!(flags.to_string(), "M-W-F--");
    }
}
