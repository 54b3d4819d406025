//! Shared fixtures for the end-to-end quiz tests: an in-memory store,
//! a transport that records everything it is asked to send, and a
//! manually advanced clock.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use eduquiz_backend::error::{Error, Result};
use eduquiz_backend::models::answer::{QuizAnswer, Selection};
use eduquiz_backend::models::attempt::QuizAttempt;
use eduquiz_backend::models::question::{AnswerChoice, QuizQuestion};
use eduquiz_backend::models::quiz::{Quiz, QuizMode};
use eduquiz_backend::models::season::{Season, SeasonRating};
use eduquiz_backend::models::student::Student;
use eduquiz_backend::services::quiz_engine::{QuizEngine, QuizTiming};
use eduquiz_backend::storage::{AttemptScope, MemoryStore, QuizStore};
use eduquiz_backend::transport::{Button, MessageRef, Transport};
use eduquiz_backend::utils::time::Clock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct RecordingTransport {
    next_message_id: AtomicI64,
    pub messages: Mutex<Vec<(i64, String)>>,
    pub pinned: Mutex<Vec<MessageRef>>,
    pub unpinned: Mutex<Vec<MessageRef>>,
    pub edits: Mutex<Vec<(MessageRef, String)>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    fn next_ref(&self, chat_id: i64) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<MessageRef> {
        self.messages
            .lock()
            .unwrap()
            .push((chat_id, text.to_string()));
        Ok(self.next_ref(chat_id))
    }

    async fn send_with_buttons(
        &self,
        chat_id: i64,
        text: &str,
        _buttons: &[Button],
    ) -> Result<MessageRef> {
        self.messages
            .lock()
            .unwrap()
            .push((chat_id, text.to_string()));
        Ok(self.next_ref(chat_id))
    }

    async fn edit_message(&self, msg: MessageRef, text: &str, _buttons: &[Button]) -> Result<()> {
        self.edits.lock().unwrap().push((msg, text.to_string()));
        Ok(())
    }

    async fn pin(&self, msg: MessageRef) -> Result<()> {
        self.pinned.lock().unwrap().push(msg);
        Ok(())
    }

    async fn unpin(&self, msg: MessageRef) -> Result<()> {
        self.unpinned.lock().unwrap().push(msg);
        Ok(())
    }

    async fn ack_callback(&self, _callback_id: &str, _text: Option<String>) -> Result<()> {
        Ok(())
    }
}

/// [`MemoryStore`] wrapper that behaves like a real database in the
/// two ways the plain store does not: awaited writes yield to the
/// runtime, and finalization can be switched to fail.
pub struct InstrumentedStore {
    inner: MemoryStore,
    pub fail_finalize: AtomicBool,
}

impl InstrumentedStore {
    pub fn wrap(inner: MemoryStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_finalize: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl QuizStore for InstrumentedStore {
    async fn get_student(&self, id: i64) -> Result<Student> {
        self.inner.get_student(id).await
    }

    async fn get_student_by_telegram(&self, telegram_id: i64) -> Result<Option<Student>> {
        self.inner.get_student_by_telegram(telegram_id).await
    }

    async fn get_quiz(&self, id: i64) -> Result<Quiz> {
        self.inner.get_quiz(id).await
    }

    async fn questions_ordered(&self, quiz_id: i64) -> Result<Vec<QuizQuestion>> {
        self.inner.questions_ordered(quiz_id).await
    }

    async fn create_attempt(
        &self,
        student_id: i64,
        quiz_id: i64,
        total: i32,
        started_at: DateTime<Utc>,
    ) -> Result<QuizAttempt> {
        self.inner
            .create_attempt(student_id, quiz_id, total, started_at)
            .await
    }

    async fn get_attempt(&self, id: i64) -> Result<QuizAttempt> {
        self.inner.get_attempt(id).await
    }

    async fn finalize_attempt(
        &self,
        id: i64,
        score: i32,
        finished_at: DateTime<Utc>,
    ) -> Result<QuizAttempt> {
        tokio::task::yield_now().await;
        if self.fail_finalize.load(Ordering::SeqCst) {
            return Err(Error::Internal("storage outage".to_string()));
        }
        self.inner.finalize_attempt(id, score, finished_at).await
    }

    async fn save_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        selected: Selection,
        is_correct: bool,
    ) -> Result<bool> {
        tokio::task::yield_now().await;
        self.inner
            .save_answer(attempt_id, question_id, selected, is_correct)
            .await
    }

    async fn answers_for_attempt(&self, attempt_id: i64) -> Result<Vec<QuizAnswer>> {
        self.inner.answers_for_attempt(attempt_id).await
    }

    async fn count_completed_attempts(&self, student_id: i64, quiz_id: i64) -> Result<i64> {
        self.inner.count_completed_attempts(student_id, quiz_id).await
    }

    async fn latest_finished_attempt(
        &self,
        student_id: i64,
        quiz_id: i64,
    ) -> Result<Option<QuizAttempt>> {
        self.inner.latest_finished_attempt(student_id, quiz_id).await
    }

    async fn finished_attempts_for_quiz(&self, quiz_id: i64) -> Result<Vec<QuizAttempt>> {
        self.inner.finished_attempts_for_quiz(quiz_id).await
    }

    async fn qualifying_attempts(&self, scope: AttemptScope) -> Result<Vec<QuizAttempt>> {
        self.inner.qualifying_attempts(scope).await
    }

    async fn get_or_create_season(
        &self,
        mentor_id: i64,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Season> {
        self.inner.get_or_create_season(mentor_id, date, today).await
    }

    async fn activate_season(&self, season_id: i64) -> Result<()> {
        self.inner.activate_season(season_id).await
    }

    async fn active_season(&self, mentor_id: i64) -> Result<Option<Season>> {
        self.inner.active_season(mentor_id).await
    }

    async fn seasons_for_mentor(&self, mentor_id: i64) -> Result<Vec<Season>> {
        self.inner.seasons_for_mentor(mentor_id).await
    }

    async fn get_or_create_season_rating(
        &self,
        season_id: i64,
        student_id: i64,
    ) -> Result<SeasonRating> {
        self.inner
            .get_or_create_season_rating(season_id, student_id)
            .await
    }

    async fn save_season_rating(&self, rating: &SeasonRating) -> Result<()> {
        self.inner.save_season_rating(rating).await
    }

    async fn season_ratings(&self, season_id: i64) -> Result<Vec<SeasonRating>> {
        self.inner.season_ratings(season_id).await
    }

    async fn update_streak(
        &self,
        student_id: i64,
        current: i32,
        longest: i32,
        date: NaiveDate,
    ) -> Result<()> {
        self.inner.update_streak(student_id, current, longest, date).await
    }
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(datetime: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(datetime),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

pub fn test_timing() -> QuizTiming {
    QuizTiming {
        question_seconds: 30,
        countdown_tick_seconds: 5,
        session_timeout_minutes: 30,
    }
}

pub fn engine_with(
    store: &MemoryStore,
    transport: Arc<RecordingTransport>,
    clock: Arc<ManualClock>,
) -> QuizEngine {
    QuizEngine::new(
        Arc::new(store.clone()),
        transport,
        clock,
        test_timing(),
    )
}

pub fn student(id: i64, mentor_id: i64) -> Student {
    Student {
        id,
        telegram_id: 7000 + id,
        username: Some(format!("student{}", id)),
        first_name: format!("Student {}", id),
        mentor_id: Some(mentor_id),
        current_streak: 0,
        longest_streak: 0,
        last_quiz_date: None,
        joined_at: base_time(),
    }
}

pub fn ranked_quiz(id: i64, mentor_id: i64, until: DateTime<Utc>) -> Quiz {
    Quiz {
        id,
        mentor_id,
        title: format!("Ranked quiz {}", id),
        topic: Some("algebra".to_string()),
        mode: QuizMode::Ranked,
        is_active: true,
        max_attempts: 1,
        available_from: None,
        available_until: Some(until),
        created_at: base_time(),
    }
}

pub fn practice_quiz(id: i64, mentor_id: i64) -> Quiz {
    Quiz {
        id,
        mentor_id,
        title: format!("Practice quiz {}", id),
        topic: None,
        mode: QuizMode::Practice,
        is_active: true,
        max_attempts: 999,
        available_from: None,
        available_until: None,
        created_at: base_time(),
    }
}

pub fn question(id: i64, quiz_id: i64, position: i32, correct: AnswerChoice) -> QuizQuestion {
    QuizQuestion {
        id,
        quiz_id,
        position,
        question_text: format!("Question {}?", position),
        option_a: "alpha".to_string(),
        option_b: "beta".to_string(),
        option_c: "gamma".to_string(),
        option_d: "delta".to_string(),
        correct_answer: correct,
        time_bonus: 0,
    }
}

pub fn today() -> NaiveDate {
    base_time().date_naive()
}
