use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Practice quizzes allow unlimited retakes and full answer review.
/// Ranked quizzes have an availability window, limited attempts, and
/// feed the season leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "quiz_mode", rename_all = "lowercase")]
pub enum QuizMode {
    Practice,
    Ranked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Quiz {
    pub id: i64,
    pub mentor_id: i64,
    pub title: String,
    pub topic: Option<String>,
    pub mode: QuizMode,
    pub is_active: bool,
    pub max_attempts: i32,
    pub available_from: Option<DateTime<Utc>>,
    pub available_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Quiz {
    pub fn is_ranked(&self) -> bool {
        self.mode == QuizMode::Ranked
    }
}
