//! Daily quiz streak transition. Only the first finished quiz of a
//! calendar day moves the streak; a gap of two or more days resets it.

use chrono::{Duration, NaiveDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakUpdate {
    pub current: i32,
    pub longest: i32,
}

pub fn advance(
    current: i32,
    longest: i32,
    last_quiz_date: Option<NaiveDate>,
    today: NaiveDate,
) -> StreakUpdate {
    let new_current = match last_quiz_date {
        None => 1,
        Some(last) if last == today => current,
        Some(last) if last == today - Duration::days(1) => current + 1,
        Some(_) => 1,
    };
    StreakUpdate {
        current: new_current,
        longest: longest.max(new_current),
    }
}
