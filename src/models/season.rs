use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A mentor-scoped rating period, calendar month by default. At most
/// one season per mentor may be active; activation deactivates the
/// siblings in the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Season {
    pub id: i64,
    pub mentor_id: i64,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Season {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// Denormalized per (season, student) cache of ranked performance.
/// Recomputed from scratch whenever a qualifying attempt finishes,
/// never hand-edited.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SeasonRating {
    pub id: i64,
    pub season_id: i64,
    pub student_id: i64,
    pub total_ranked_quizzes: i32,
    pub total_score: i32,
    pub total_possible: i32,
    pub avg_percentage: f64,
    pub rating_score: f64,
    pub updated_at: DateTime<Utc>,
}
