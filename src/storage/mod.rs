pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::models::answer::{QuizAnswer, Selection};
use crate::models::attempt::QuizAttempt;
use crate::models::question::QuizQuestion;
use crate::models::quiz::Quiz;
use crate::models::season::{Season, SeasonRating};
use crate::models::student::Student;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

pub use memory::MemoryStore;
pub use postgres::PgQuizStore;

/// Scope of a qualifying-attempt scan (see the rating rules): either
/// one student or every student of the mentor, optionally limited to
/// a season window on `started_at`.
#[derive(Debug, Clone, Copy)]
pub struct AttemptScope {
    pub mentor_id: i64,
    pub student_id: Option<i64>,
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Persistence collaborator for the quiz engine. The engine never
/// retries storage failures; they surface as attempt-operation errors.
#[async_trait]
pub trait QuizStore: Send + Sync {
    async fn get_student(&self, id: i64) -> Result<Student>;
    async fn get_student_by_telegram(&self, telegram_id: i64) -> Result<Option<Student>>;

    async fn get_quiz(&self, id: i64) -> Result<Quiz>;
    async fn questions_ordered(&self, quiz_id: i64) -> Result<Vec<QuizQuestion>>;

    async fn create_attempt(
        &self,
        student_id: i64,
        quiz_id: i64,
        total: i32,
        started_at: DateTime<Utc>,
    ) -> Result<QuizAttempt>;
    async fn get_attempt(&self, id: i64) -> Result<QuizAttempt>;
    async fn finalize_attempt(
        &self,
        id: i64,
        score: i32,
        finished_at: DateTime<Utc>,
    ) -> Result<QuizAttempt>;

    /// Records an answer. Returns false without writing when an answer
    /// for (attempt, question) already exists; callers treat that as a
    /// stale duplicate and must not advance or score.
    async fn save_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        selected: Selection,
        is_correct: bool,
    ) -> Result<bool>;
    async fn answers_for_attempt(&self, attempt_id: i64) -> Result<Vec<QuizAnswer>>;

    async fn count_completed_attempts(&self, student_id: i64, quiz_id: i64) -> Result<i64>;
    async fn latest_finished_attempt(
        &self,
        student_id: i64,
        quiz_id: i64,
    ) -> Result<Option<QuizAttempt>>;
    async fn finished_attempts_for_quiz(&self, quiz_id: i64) -> Result<Vec<QuizAttempt>>;

    /// Finished ranked attempts that count toward rating: the quiz has
    /// `available_until` set and the attempt started before it.
    async fn qualifying_attempts(&self, scope: AttemptScope) -> Result<Vec<QuizAttempt>>;

    /// Season covering `date` for the mentor, lazily created with
    /// calendar-month bounds. A newly created season is active only
    /// when it covers `today`; activation deactivates siblings.
    async fn get_or_create_season(
        &self,
        mentor_id: i64,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Season>;
    async fn activate_season(&self, season_id: i64) -> Result<()>;
    async fn active_season(&self, mentor_id: i64) -> Result<Option<Season>>;
    async fn seasons_for_mentor(&self, mentor_id: i64) -> Result<Vec<Season>>;

    async fn get_or_create_season_rating(
        &self,
        season_id: i64,
        student_id: i64,
    ) -> Result<SeasonRating>;
    async fn save_season_rating(&self, rating: &SeasonRating) -> Result<()>;
    async fn season_ratings(&self, season_id: i64) -> Result<Vec<SeasonRating>>;

    async fn update_streak(
        &self,
        student_id: i64,
        current: i32,
        longest: i32,
        date: NaiveDate,
    ) -> Result<()>;
}
