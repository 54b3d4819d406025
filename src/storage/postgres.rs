use crate::error::Result;
use crate::models::answer::{QuizAnswer, Selection};
use crate::models::attempt::QuizAttempt;
use crate::models::question::QuizQuestion;
use crate::models::quiz::Quiz;
use crate::models::season::{Season, SeasonRating};
use crate::models::student::Student;
use crate::storage::{AttemptScope, QuizStore};
use crate::utils::time::{month_bounds, month_season_name};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

#[derive(Clone)]
pub struct PgQuizStore {
    pool: PgPool,
}

impl PgQuizStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuizStore for PgQuizStore {
    async fn get_student(&self, id: i64) -> Result<Student> {
        let student = sqlx::query_as::<_, Student>(r#"SELECT * FROM students WHERE id = $1"#)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(student)
    }

    async fn get_student_by_telegram(&self, telegram_id: i64) -> Result<Option<Student>> {
        let student =
            sqlx::query_as::<_, Student>(r#"SELECT * FROM students WHERE telegram_id = $1"#)
                .bind(telegram_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(student)
    }

    async fn get_quiz(&self, id: i64) -> Result<Quiz> {
        let quiz = sqlx::query_as::<_, Quiz>(r#"SELECT * FROM quizzes WHERE id = $1"#)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(quiz)
    }

    async fn questions_ordered(&self, quiz_id: i64) -> Result<Vec<QuizQuestion>> {
        let questions = sqlx::query_as::<_, QuizQuestion>(
            r#"SELECT * FROM quiz_questions WHERE quiz_id = $1 ORDER BY position ASC"#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    async fn create_attempt(
        &self,
        student_id: i64,
        quiz_id: i64,
        total: i32,
        started_at: DateTime<Utc>,
    ) -> Result<QuizAttempt> {
        let attempt = sqlx::query_as::<_, QuizAttempt>(
            r#"
            INSERT INTO quiz_attempts (student_id, quiz_id, score, total, started_at, finished_at)
            VALUES ($1, $2, 0, $3, $4, NULL)
            RETURNING *
            "#,
        )
        .bind(student_id)
        .bind(quiz_id)
        .bind(total)
        .bind(started_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn get_attempt(&self, id: i64) -> Result<QuizAttempt> {
        let attempt =
            sqlx::query_as::<_, QuizAttempt>(r#"SELECT * FROM quiz_attempts WHERE id = $1"#)
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(attempt)
    }

    async fn finalize_attempt(
        &self,
        id: i64,
        score: i32,
        finished_at: DateTime<Utc>,
    ) -> Result<QuizAttempt> {
        let attempt = sqlx::query_as::<_, QuizAttempt>(
            r#"
            UPDATE quiz_attempts
            SET score = $2, finished_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(score)
        .bind(finished_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn save_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        selected: Selection,
        is_correct: bool,
    ) -> Result<bool> {
        // The unique index on (attempt_id, question_id) is the backstop
        // against a timeout and an answer both committing for the same
        // question after a process restart.
        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO quiz_answers (attempt_id, question_id, selected_answer, is_correct)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (attempt_id, question_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(attempt_id)
        .bind(question_id)
        .bind(selected)
        .bind(is_correct)
        .fetch_optional(&self.pool)
        .await?;
        Ok(inserted.is_some())
    }

    async fn answers_for_attempt(&self, attempt_id: i64) -> Result<Vec<QuizAnswer>> {
        let answers = sqlx::query_as::<_, QuizAnswer>(
            r#"
            SELECT a.* FROM quiz_answers a
            JOIN quiz_questions q ON q.id = a.question_id
            WHERE a.attempt_id = $1
            ORDER BY q.position ASC
            "#,
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }

    async fn count_completed_attempts(&self, student_id: i64, quiz_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM quiz_attempts
            WHERE student_id = $1 AND quiz_id = $2 AND finished_at IS NOT NULL
            "#,
        )
        .bind(student_id)
        .bind(quiz_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn latest_finished_attempt(
        &self,
        student_id: i64,
        quiz_id: i64,
    ) -> Result<Option<QuizAttempt>> {
        let attempt = sqlx::query_as::<_, QuizAttempt>(
            r#"
            SELECT * FROM quiz_attempts
            WHERE student_id = $1 AND quiz_id = $2 AND finished_at IS NOT NULL
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(student_id)
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn finished_attempts_for_quiz(&self, quiz_id: i64) -> Result<Vec<QuizAttempt>> {
        let attempts = sqlx::query_as::<_, QuizAttempt>(
            r#"
            SELECT * FROM quiz_attempts
            WHERE quiz_id = $1 AND finished_at IS NOT NULL
            ORDER BY score DESC, started_at ASC
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }

    async fn qualifying_attempts(&self, scope: AttemptScope) -> Result<Vec<QuizAttempt>> {
        let (window_start, window_end) = match scope.window {
            Some((start, end)) => (Some(start), Some(end)),
            None => (None, None),
        };
        let attempts = sqlx::query_as::<_, QuizAttempt>(
            r#"
            SELECT a.* FROM quiz_attempts a
            JOIN quizzes q ON q.id = a.quiz_id
            WHERE q.mentor_id = $1
              AND q.mode = 'ranked'
              AND a.finished_at IS NOT NULL
              AND q.available_until IS NOT NULL
              AND a.started_at < q.available_until
              AND ($2::bigint IS NULL OR a.student_id = $2)
              AND ($3::timestamptz IS NULL OR a.started_at >= $3)
              AND ($4::timestamptz IS NULL OR a.started_at <= $4)
            ORDER BY a.started_at ASC
            "#,
        )
        .bind(scope.mentor_id)
        .bind(scope.student_id)
        .bind(window_start)
        .bind(window_end)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }

    async fn get_or_create_season(
        &self,
        mentor_id: i64,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Season> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, Season>(
            r#"
            SELECT * FROM seasons
            WHERE mentor_id = $1 AND start_date <= $2 AND end_date >= $2
            ORDER BY start_date DESC
            LIMIT 1
            "#,
        )
        .bind(mentor_id)
        .bind(date)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(season) = existing {
            tx.commit().await?;
            return Ok(season);
        }

        let (start, end) = month_bounds(date);
        let is_active = start <= today && today <= end;

        if is_active {
            sqlx::query(r#"UPDATE seasons SET is_active = FALSE WHERE mentor_id = $1 AND is_active"#)
                .bind(mentor_id)
                .execute(&mut *tx)
                .await?;
        }

        let season = sqlx::query_as::<_, Season>(
            r#"
            INSERT INTO seasons (mentor_id, name, start_date, end_date, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(mentor_id)
        .bind(month_season_name(date))
        .bind(start)
        .bind(end)
        .bind(is_active)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(season)
    }

    async fn activate_season(&self, season_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let mentor_id = sqlx::query_scalar::<_, i64>(
            r#"SELECT mentor_id FROM seasons WHERE id = $1"#,
        )
        .bind(season_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"UPDATE seasons SET is_active = FALSE WHERE mentor_id = $1 AND id <> $2 AND is_active"#,
        )
        .bind(mentor_id)
        .bind(season_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(r#"UPDATE seasons SET is_active = TRUE WHERE id = $1"#)
            .bind(season_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn active_season(&self, mentor_id: i64) -> Result<Option<Season>> {
        let season = sqlx::query_as::<_, Season>(
            r#"SELECT * FROM seasons WHERE mentor_id = $1 AND is_active LIMIT 1"#,
        )
        .bind(mentor_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(season)
    }

    async fn seasons_for_mentor(&self, mentor_id: i64) -> Result<Vec<Season>> {
        let seasons = sqlx::query_as::<_, Season>(
            r#"SELECT * FROM seasons WHERE mentor_id = $1 ORDER BY start_date DESC"#,
        )
        .bind(mentor_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(seasons)
    }

    async fn get_or_create_season_rating(
        &self,
        season_id: i64,
        student_id: i64,
    ) -> Result<SeasonRating> {
        sqlx::query(
            r#"
            INSERT INTO season_ratings (season_id, student_id)
            VALUES ($1, $2)
            ON CONFLICT (season_id, student_id) DO NOTHING
            "#,
        )
        .bind(season_id)
        .bind(student_id)
        .execute(&self.pool)
        .await?;

        let rating = sqlx::query_as::<_, SeasonRating>(
            r#"SELECT * FROM season_ratings WHERE season_id = $1 AND student_id = $2"#,
        )
        .bind(season_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(rating)
    }

    async fn save_season_rating(&self, rating: &SeasonRating) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE season_ratings
            SET total_ranked_quizzes = $2, total_score = $3, total_possible = $4,
                avg_percentage = $5, rating_score = $6, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(rating.id)
        .bind(rating.total_ranked_quizzes)
        .bind(rating.total_score)
        .bind(rating.total_possible)
        .bind(rating.avg_percentage)
        .bind(rating.rating_score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn season_ratings(&self, season_id: i64) -> Result<Vec<SeasonRating>> {
        let ratings = sqlx::query_as::<_, SeasonRating>(
            r#"SELECT * FROM season_ratings WHERE season_id = $1"#,
        )
        .bind(season_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ratings)
    }

    async fn update_streak(
        &self,
        student_id: i64,
        current: i32,
        longest: i32,
        date: NaiveDate,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE students
            SET current_streak = $2, longest_streak = $3, last_quiz_date = $4
            WHERE id = $1
            "#,
        )
        .bind(student_id)
        .bind(current)
        .bind(longest)
        .bind(date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
