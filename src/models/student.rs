use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Student {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub mentor_id: Option<i64>,
    pub current_streak: i32,
    pub longest_streak: i32,
    /// Local calendar date of the last finished quiz; drives the streak.
    pub last_quiz_date: Option<NaiveDate>,
    pub joined_at: DateTime<Utc>,
}

impl Student {
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(u) => format!("@{}", u),
            None if !self.first_name.is_empty() => self.first_name.clone(),
            None => self.telegram_id.to_string(),
        }
    }
}
