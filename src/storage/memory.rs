//! In-memory implementation of [`QuizStore`], mirroring the Postgres
//! schema's constraints (answer uniqueness, one active season per
//! mentor). Backs the engine tests and local development without a
//! database.

use crate::error::{Error, Result};
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
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    students: HashMap<i64, Student>,
    quizzes: HashMap<i64, Quiz>,
    questions: HashMap<i64, QuizQuestion>,
    attempts: HashMap<i64, QuizAttempt>,
    answers: HashMap<i64, QuizAnswer>,
    seasons: HashMap<i64, Season>,
    ratings: HashMap<i64, SeasonRating>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_student(&self, student: Student) {
        let mut inner = self.inner.lock().unwrap();
        inner.students.insert(student.id, student);
    }

    pub fn insert_quiz(&self, quiz: Quiz) {
        let mut inner = self.inner.lock().unwrap();
        inner.quizzes.insert(quiz.id, quiz);
    }

    pub fn insert_question(&self, question: QuizQuestion) {
        let mut inner = self.inner.lock().unwrap();
        inner.questions.insert(question.id, question);
    }

    fn qualifies(quiz: &Quiz, attempt: &QuizAttempt) -> bool {
        quiz.is_ranked()
            && attempt.finished_at.is_some()
            && quiz
                .available_until
                .map(|until| attempt.started_at < until)
                .unwrap_or(false)
    }
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn get_student(&self, id: i64) -> Result<Student> {
        let inner = self.inner.lock().unwrap();
        inner
            .students
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("student {}", id)))
    }

    async fn get_student_by_telegram(&self, telegram_id: i64) -> Result<Option<Student>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .students
            .values()
            .find(|s| s.telegram_id == telegram_id)
            .cloned())
    }

    async fn get_quiz(&self, id: i64) -> Result<Quiz> {
        let inner = self.inner.lock().unwrap();
        inner
            .quizzes
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("quiz {}", id)))
    }

    async fn questions_ordered(&self, quiz_id: i64) -> Result<Vec<QuizQuestion>> {
        let inner = self.inner.lock().unwrap();
        let mut questions: Vec<QuizQuestion> = inner
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.position);
        Ok(questions)
    }

    async fn create_attempt(
        &self,
        student_id: i64,
        quiz_id: i64,
        total: i32,
        started_at: DateTime<Utc>,
    ) -> Result<QuizAttempt> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id();
        let attempt = QuizAttempt {
            id,
            student_id,
            quiz_id,
            score: 0,
            total,
            started_at,
            finished_at: None,
        };
        inner.attempts.insert(id, attempt.clone());
        Ok(attempt)
    }

    async fn get_attempt(&self, id: i64) -> Result<QuizAttempt> {
        let inner = self.inner.lock().unwrap();
        inner
            .attempts
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("attempt {}", id)))
    }

    async fn finalize_attempt(
        &self,
        id: i64,
        score: i32,
        finished_at: DateTime<Utc>,
    ) -> Result<QuizAttempt> {
        let mut inner = self.inner.lock().unwrap();
        let attempt = inner
            .attempts
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("attempt {}", id)))?;
        attempt.score = score;
        attempt.finished_at = Some(finished_at);
        Ok(attempt.clone())
    }

    async fn save_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        selected: Selection,
        is_correct: bool,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let duplicate = inner
            .answers
            .values()
            .any(|a| a.attempt_id == attempt_id && a.question_id == question_id);
        if duplicate {
            return Ok(false);
        }
        let id = inner.next_id();
        inner.answers.insert(
            id,
            QuizAnswer {
                id,
                attempt_id,
                question_id,
                selected_answer: selected,
                is_correct,
            },
        );
        Ok(true)
    }

    async fn answers_for_attempt(&self, attempt_id: i64) -> Result<Vec<QuizAnswer>> {
        let inner = self.inner.lock().unwrap();
        let mut answers: Vec<QuizAnswer> = inner
            .answers
            .values()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect();
        answers.sort_by_key(|a| {
            inner
                .questions
                .get(&a.question_id)
                .map(|q| q.position)
                .unwrap_or(i32::MAX)
        });
        Ok(answers)
    }

    async fn count_completed_attempts(&self, student_id: i64, quiz_id: i64) -> Result<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .attempts
            .values()
            .filter(|a| {
                a.student_id == student_id && a.quiz_id == quiz_id && a.finished_at.is_some()
            })
            .count() as i64)
    }

    async fn latest_finished_attempt(
        &self,
        student_id: i64,
        quiz_id: i64,
    ) -> Result<Option<QuizAttempt>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .attempts
            .values()
            .filter(|a| {
                a.student_id == student_id && a.quiz_id == quiz_id && a.finished_at.is_some()
            })
            .max_by_key(|a| a.started_at)
            .cloned())
    }

    async fn finished_attempts_for_quiz(&self, quiz_id: i64) -> Result<Vec<QuizAttempt>> {
        let inner = self.inner.lock().unwrap();
        let mut attempts: Vec<QuizAttempt> = inner
            .attempts
            .values()
            .filter(|a| a.quiz_id == quiz_id && a.finished_at.is_some())
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.score.cmp(&a.score).then(a.started_at.cmp(&b.started_at)));
        Ok(attempts)
    }

    async fn qualifying_attempts(&self, scope: AttemptScope) -> Result<Vec<QuizAttempt>> {
        let inner = self.inner.lock().unwrap();
        let mut attempts: Vec<QuizAttempt> = inner
            .attempts
            .values()
            .filter(|a| {
                let Some(quiz) = inner.quizzes.get(&a.quiz_id) else {
                    return false;
                };
                if quiz.mentor_id != scope.mentor_id || !Self::qualifies(quiz, a) {
                    return false;
                }
                if let Some(student_id) = scope.student_id {
                    if a.student_id != student_id {
                        return false;
                    }
                }
                if let Some((start, end)) = scope.window {
                    if a.started_at < start || a.started_at > end {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.started_at);
        Ok(attempts)
    }

    async fn get_or_create_season(
        &self,
        mentor_id: i64,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Season> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(season) = inner
            .seasons
            .values()
            .find(|s| s.mentor_id == mentor_id && s.covers(date))
        {
            return Ok(season.clone());
        }

        let (start, end) = month_bounds(date);
        let is_active = start <= today && today <= end;
        if is_active {
            for season in inner.seasons.values_mut() {
                if season.mentor_id == mentor_id {
                    season.is_active = false;
                }
            }
        }

        let id = inner.next_id();
        let season = Season {
            id,
            mentor_id,
            name: month_season_name(date),
            start_date: start,
            end_date: end,
            is_active,
            created_at: Utc::now(),
        };
        inner.seasons.insert(id, season.clone());
        Ok(season)
    }

    async fn activate_season(&self, season_id: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let mentor_id = inner
            .seasons
            .get(&season_id)
            .map(|s| s.mentor_id)
            .ok_or_else(|| Error::NotFound(format!("season {}", season_id)))?;
        for season in inner.seasons.values_mut() {
            if season.mentor_id == mentor_id {
                season.is_active = season.id == season_id;
            }
        }
        Ok(())
    }

    async fn active_season(&self, mentor_id: i64) -> Result<Option<Season>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .seasons
            .values()
            .find(|s| s.mentor_id == mentor_id && s.is_active)
            .cloned())
    }

    async fn seasons_for_mentor(&self, mentor_id: i64) -> Result<Vec<Season>> {
        let inner = self.inner.lock().unwrap();
        let mut seasons: Vec<Season> = inner
            .seasons
            .values()
            .filter(|s| s.mentor_id == mentor_id)
            .cloned()
            .collect();
        seasons.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(seasons)
    }

    async fn get_or_create_season_rating(
        &self,
        season_id: i64,
        student_id: i64,
    ) -> Result<SeasonRating> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(rating) = inner
            .ratings
            .values()
            .find(|r| r.season_id == season_id && r.student_id == student_id)
        {
            return Ok(rating.clone());
        }
        let id = inner.next_id();
        let rating = SeasonRating {
            id,
            season_id,
            student_id,
            total_ranked_quizzes: 0,
            total_score: 0,
            total_possible: 0,
            avg_percentage: 0.0,
            rating_score: 0.0,
            updated_at: Utc::now(),
        };
        inner.ratings.insert(id, rating.clone());
        Ok(rating)
    }

    async fn save_season_rating(&self, rating: &SeasonRating) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let stored = inner
            .ratings
            .get_mut(&rating.id)
            .ok_or_else(|| Error::NotFound(format!("season rating {}", rating.id)))?;
        *stored = rating.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn season_ratings(&self, season_id: i64) -> Result<Vec<SeasonRating>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .ratings
            .values()
            .filter(|r| r.season_id == season_id)
            .cloned()
            .collect())
    }

    async fn update_streak(
        &self,
        student_id: i64,
        current: i32,
        longest: i32,
        date: NaiveDate,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let student = inner
            .students
            .get_mut(&student_id)
            .ok_or_else(|| Error::NotFound(format!("student {}", student_id)))?;
        student.current_streak = current;
        student.longest_streak = longest;
        student.last_quiz_date = Some(date);
        Ok(())
    }
}
