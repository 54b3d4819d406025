use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single pass through a quiz. `finished_at = NULL` is the
/// "in progress" sentinel; `total` snapshots the question count at
/// creation time and is immune to later question edits.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuizAttempt {
    pub id: i64,
    pub student_id: i64,
    pub quiz_id: i64,
    pub score: i32,
    pub total: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl QuizAttempt {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}
