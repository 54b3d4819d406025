//! Quiz session state machine: drives one student through an ordered
//! list of questions with per-question countdowns, a question-timeout
//! auto-advance, and a session-inactivity watchdog.
//!
//! The race between "student taps an option" and "timeout fires" is
//! resolved in two layers: both paths cancel the other's timers before
//! doing any work, and both funnel through the session store's
//! check-and-set plus the (attempt, question) uniqueness constraint in
//! storage. At most one of them can record an answer and advance.

use crate::config::Config;
use crate::error::{DenialReason, Error, Result};
use crate::models::answer::Selection;
use crate::models::attempt::QuizAttempt;
use crate::models::question::{AnswerChoice, QuizQuestion};
use crate::models::quiz::Quiz;
use crate::models::student::Student;
use crate::services::rating::RatingService;
use crate::services::session::{Advance, QuizSession, SessionStore};
use crate::services::streak;
use crate::services::timer::TimerCoordinator;
use crate::storage::QuizStore;
use crate::transport::Transport;
use crate::utils::time::Clock;
use chrono::Duration as ChronoDuration;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timer knobs, injected so tests can shrink them.
#[derive(Debug, Clone, Copy)]
pub struct QuizTiming {
    /// Base seconds per question; a question's `time_bonus` adds to it.
    pub question_seconds: i64,
    /// Interval of the best-effort countdown display updater.
    pub countdown_tick_seconds: u64,
    /// Session inactivity limit, measured from attempt start.
    pub session_timeout_minutes: i64,
}

impl QuizTiming {
    pub fn from_config(config: &Config) -> Self {
        Self {
            question_seconds: config.question_time_seconds,
            countdown_tick_seconds: config.countdown_tick_seconds,
            session_timeout_minutes: config.session_timeout_minutes,
        }
    }

    fn session_timeout(&self) -> ChronoDuration {
        ChronoDuration::minutes(self.session_timeout_minutes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied(DenialReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started { attempt_id: i64, total: usize },
    /// Ranked quiz already completed up to its attempt limit; the
    /// previous result is returned instead of a bare denial.
    AlreadyCompleted { score: i32, total: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewLine {
    pub position: i32,
    pub question_text: String,
    pub selected: Selection,
    pub correct: AnswerChoice,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptSummary {
    pub attempt_id: i64,
    pub score: i32,
    pub total: i32,
    /// Present for practice quizzes only; ranked (exam-mode) quizzes
    /// never reveal per-question detail.
    pub review: Option<Vec<ReviewLine>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    Next { index: usize, total: usize },
    Complete(AttemptSummary),
    /// Submission for an already-advanced question; silently dropped.
    Stale,
}

/// Clonable handle; clones share the session table and timer state.
#[derive(Clone)]
pub struct QuizEngine {
    store: Arc<dyn QuizStore>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    rating: RatingService,
    sessions: Arc<SessionStore>,
    timers: Arc<TimerCoordinator>,
    timing: QuizTiming,
}

impl QuizEngine {
    pub fn new(
        store: Arc<dyn QuizStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        timing: QuizTiming,
    ) -> Self {
        let rating = RatingService::new(store.clone(), clock.clone());
        Self {
            store,
            transport,
            clock,
            rating,
            sessions: Arc::new(SessionStore::new()),
            timers: Arc::new(TimerCoordinator::new()),
            timing,
        }
    }

    /// Whether the student may start the quiz right now. Practice
    /// quizzes are always allowed; ranked quizzes check the
    /// availability window and the completed-attempt limit.
    pub async fn admission_check(&self, student_id: i64, quiz: &Quiz) -> Result<Admission> {
        if !quiz.is_ranked() {
            return Ok(Admission::Allowed);
        }
        let now = self.clock.now();
        if let Some(from) = quiz.available_from {
            if now < from {
                return Ok(Admission::Denied(DenialReason::NotStarted));
            }
        }
        if let Some(until) = quiz.available_until {
            if now >= until {
                return Ok(Admission::Denied(DenialReason::Expired));
            }
        }
        let completed = self
            .store
            .count_completed_attempts(student_id, quiz.id)
            .await?;
        if completed >= i64::from(quiz.max_attempts) {
            return Ok(Admission::Denied(DenialReason::MaxAttemptsReached));
        }
        Ok(Admission::Allowed)
    }

    /// Creates an attempt and shows the first question. The session's
    /// question list is snapshotted here; `total` is immune to later
    /// quiz edits.
    pub async fn start(
        &self,
        student: &Student,
        quiz_id: i64,
        chat_id: i64,
    ) -> Result<StartOutcome> {
        let quiz = self.store.get_quiz(quiz_id).await?;
        if !quiz.is_active {
            return Err(Error::BadRequest("quiz is archived".to_string()));
        }

        if let Some(existing) = self.sessions.for_student(student.id) {
            let elapsed = self.clock.now() - existing.started_at;
            if elapsed >= self.timing.session_timeout() {
                // Stuck session from a lost timer or restart; clear it
                // without scoring and let the student retry.
                info!(
                    attempt_id = existing.attempt_id,
                    "clearing stale quiz session on new start"
                );
                self.abandon(existing.attempt_id, false).await;
            } else {
                return Err(Error::BadRequest(
                    "another quiz is already in progress".to_string(),
                ));
            }
        }

        match self.admission_check(student.id, &quiz).await? {
            Admission::Allowed => {}
            Admission::Denied(DenialReason::MaxAttemptsReached) => {
                if let Some(prev) = self
                    .store
                    .latest_finished_attempt(student.id, quiz.id)
                    .await?
                {
                    return Ok(StartOutcome::AlreadyCompleted {
                        score: prev.score,
                        total: prev.total,
                    });
                }
                return Err(Error::AdmissionDenied(DenialReason::MaxAttemptsReached));
            }
            Admission::Denied(reason) => return Err(Error::AdmissionDenied(reason)),
        }

        let questions = self.store.questions_ordered(quiz.id).await?;
        if questions.is_empty() {
            return Err(Error::NoQuestions);
        }

        let now = self.clock.now();
        let attempt = self
            .store
            .create_attempt(student.id, quiz.id, questions.len() as i32, now)
            .await?;

        let session = QuizSession {
            attempt_id: attempt.id,
            student_id: student.id,
            chat_id,
            quiz,
            questions,
            current_index: 0,
            score: 0,
            started_at: now,
            deadline: now,
        };
        let total = session.total();
        self.sessions.insert(session.clone());
        self.spawn_watchdog(attempt.id);
        self.present_question(&session).await;

        info!(
            attempt_id = attempt.id,
            student_id = student.id,
            quiz_id,
            total,
            "quiz attempt started"
        );
        Ok(StartOutcome::Started {
            attempt_id: attempt.id,
            total,
        })
    }

    /// Handles a student's option tap for the question they are on.
    /// Stale or duplicate submissions, and taps on an attempt the
    /// student does not own, resolve to `AnswerOutcome::Stale` without
    /// side effects.
    pub async fn submit_answer(
        &self,
        student_id: i64,
        attempt_id: i64,
        question_id: i64,
        choice: AnswerChoice,
    ) -> Result<AnswerOutcome> {
        if let Some(session) = self.sessions.get(attempt_id) {
            if session.student_id != student_id {
                debug!(
                    attempt_id,
                    student_id, "answer for another student's attempt dropped"
                );
                return Ok(AnswerOutcome::Stale);
            }
        }
        self.record_and_advance(attempt_id, question_id, Selection::from(choice))
            .await
    }

    /// Invoked by the question-timeout task. Records a blank answer
    /// and advances, unless the student answered in the final instant
    /// and the index already moved.
    pub async fn timeout_advance(
        &self,
        attempt_id: i64,
        question_id: i64,
        expected_index: usize,
    ) -> Result<()> {
        let Some(snapshot) = self.sessions.get(attempt_id) else {
            return Ok(());
        };
        if snapshot.current_index != expected_index {
            debug!(
                attempt_id,
                expected_index, "timeout fired for an already-advanced question"
            );
            return Ok(());
        }
        match self
            .record_and_advance(attempt_id, question_id, Selection::Blank)
            .await?
        {
            AnswerOutcome::Stale => {}
            outcome => debug!(attempt_id, ?outcome, "question timed out"),
        }
        Ok(())
    }

    /// Answer review for a finished attempt. `None` for ranked quizzes
    /// and for attempts the requesting student does not own.
    pub async fn attempt_review(
        &self,
        student_id: i64,
        attempt_id: i64,
    ) -> Result<Option<Vec<ReviewLine>>> {
        let attempt = self.store.get_attempt(attempt_id).await?;
        if attempt.student_id != student_id {
            debug!(
                attempt_id,
                student_id, "review request for another student's attempt denied"
            );
            return Ok(None);
        }
        let quiz = self.store.get_quiz(attempt.quiz_id).await?;
        if quiz.is_ranked() {
            return Ok(None);
        }
        let questions = self.store.questions_ordered(quiz.id).await?;
        Ok(Some(self.build_review(attempt_id, &questions).await?))
    }

    /// Boxed rather than `async fn`: the timeout task spawned in
    /// `present_question` awaits this, and this schedules that task,
    /// so the unboxed future type would be infinitely recursive.
    fn record_and_advance(
        &self,
        attempt_id: i64,
        question_id: i64,
        selected: Selection,
    ) -> Pin<Box<dyn Future<Output = Result<AnswerOutcome>> + Send + '_>> {
        Box::pin(async move {
            let Some(snapshot) = self.sessions.get(attempt_id) else {
                return Ok(AnswerOutcome::Stale);
            };
            let Some(question) = snapshot.current_question() else {
                return Ok(AnswerOutcome::Stale);
            };
            if question.id != question_id {
                return Ok(AnswerOutcome::Stale);
            }

            // Cancel the racing pair before any persistence; the unique
            // (attempt, question) constraint and the check-and-set below
            // close the remaining window.
            self.timers.cancel_question_timers(attempt_id);

            let is_correct = selected.matches(question.correct_answer);
            let inserted = self
                .store
                .save_answer(attempt_id, question_id, selected, is_correct)
                .await?;
            if !inserted {
                debug!(attempt_id, question_id, "duplicate answer ignored");
                return Ok(AnswerOutcome::Stale);
            }

            match self
                .sessions
                .advance_if_current(attempt_id, question_id, is_correct)
            {
                Advance::Stale => Ok(AnswerOutcome::Stale),
                Advance::Next { session } => {
                    self.present_question(&session).await;
                    Ok(AnswerOutcome::Next {
                        index: session.current_index,
                        total: session.total(),
                    })
                }
                Advance::Finished { score } => match self.finalize(&snapshot, score).await {
                    Ok(summary) => Ok(AnswerOutcome::Complete(summary)),
                    Err(err) => {
                        // The question timers are already cancelled; the
                        // session must not linger untimed until the
                        // watchdog gets around to it.
                        warn!(attempt_id, %err, "finalize failed, dropping live session");
                        self.abandon(attempt_id, false).await;
                        Err(err)
                    }
                },
            }
        })
    }

    /// Persists the final score, then runs the streak update and (for
    /// ranked quizzes) the season-rating recompute, then tears down
    /// timers, pin, and session.
    async fn finalize(
        &self,
        snapshot: &QuizSession,
        score: i32,
    ) -> Result<AttemptSummary> {
        let attempt_id = snapshot.attempt_id;
        let attempt: QuizAttempt = self
            .store
            .finalize_attempt(attempt_id, score, self.clock.now())
            .await?;

        let student = self.store.get_student(snapshot.student_id).await?;
        let today = self.clock.today();
        let update = streak::advance(
            student.current_streak,
            student.longest_streak,
            student.last_quiz_date,
            today,
        );
        self.store
            .update_streak(student.id, update.current, update.longest, today)
            .await?;

        if snapshot.quiz.is_ranked() {
            self.rating
                .recompute_for_attempt(student.id, snapshot.quiz.mentor_id, attempt.started_at)
                .await?;
        }

        if let Some(pinned) = self.timers.clear(attempt_id) {
            if let Err(err) = self.transport.unpin(pinned).await {
                debug!(attempt_id, %err, "unpin on completion failed");
            }
        }
        self.sessions.remove(attempt_id);

        let review = if snapshot.quiz.is_ranked() {
            None
        } else {
            Some(self.build_review(attempt_id, &snapshot.questions).await?)
        };

        let summary = AttemptSummary {
            attempt_id,
            score: attempt.score,
            total: attempt.total,
            review,
        };
        if let Err(err) = self
            .transport
            .send_message(snapshot.chat_id, &render::result(&summary))
            .await
        {
            warn!(attempt_id, %err, "failed to deliver quiz result");
        }

        info!(
            attempt_id,
            score = summary.score,
            total = summary.total,
            ranked = snapshot.quiz.is_ranked(),
            "quiz attempt finalized"
        );
        Ok(summary)
    }

    async fn build_review(
        &self,
        attempt_id: i64,
        questions: &[QuizQuestion],
    ) -> Result<Vec<ReviewLine>> {
        let answers = self.store.answers_for_attempt(attempt_id).await?;
        Ok(answers
            .iter()
            .filter_map(|answer| {
                let question = questions.iter().find(|q| q.id == answer.question_id)?;
                Some(ReviewLine {
                    position: question.position,
                    question_text: question.question_text.clone(),
                    selected: answer.selected_answer,
                    correct: question.correct_answer,
                    is_correct: answer.is_correct,
                })
            })
            .collect())
    }

    /// Sends (and pins) the session's current question and schedules
    /// its countdown and timeout. All chat I/O here is best-effort:
    /// the timers run even if the message never went out.
    async fn present_question(&self, session: &QuizSession) {
        let attempt_id = session.attempt_id;
        let index = session.current_index;
        let Some(question) = session.current_question() else {
            return;
        };

        let allowed_seconds = self.timing.question_seconds + i64::from(question.time_bonus);
        let deadline = self.clock.now() + ChronoDuration::seconds(allowed_seconds);
        self.sessions.set_deadline(attempt_id, deadline);

        let text = render::question(question, index, session.total(), allowed_seconds);
        let buttons = render::option_buttons(attempt_id, question.id);

        let message = match self
            .transport
            .send_with_buttons(session.chat_id, &text, &buttons)
            .await
        {
            Ok(message) => {
                if let Some(previous) = self.timers.set_pinned(attempt_id, message) {
                    if let Err(err) = self.transport.unpin(previous).await {
                        debug!(attempt_id, %err, "unpin of previous question failed");
                    }
                }
                if let Err(err) = self.transport.pin(message).await {
                    debug!(attempt_id, %err, "pin failed");
                }
                Some(message)
            }
            Err(err) => {
                warn!(attempt_id, %err, "failed to send question message");
                None
            }
        };

        let countdown = {
            let engine = self.clone();
            let question = question.clone();
            let tick = Duration::from_secs(self.timing.countdown_tick_seconds);
            tokio::spawn(async move {
                let Some(message) = message else { return };
                loop {
                    tokio::time::sleep(tick).await;
                    let Some(current) = engine.sessions.get(attempt_id) else {
                        break;
                    };
                    if current.current_index != index {
                        break;
                    }
                    let remaining = (current.deadline - engine.clock.now()).num_seconds();
                    if remaining <= 0 {
                        break;
                    }
                    let text = render::question(&question, index, current.total(), remaining);
                    let buttons = render::option_buttons(attempt_id, question.id);
                    // Best-effort display refresh; the message may have
                    // been deleted by the user.
                    if let Err(err) = engine.transport.edit_message(message, &text, &buttons).await
                    {
                        debug!(attempt_id, %err, "countdown refresh failed");
                    }
                }
            })
        };

        let timeout = {
            let engine = self.clone();
            let question_id = question.id;
            let wait = Duration::from_secs(allowed_seconds.max(0) as u64);
            tokio::spawn(async move {
                tokio::time::sleep(wait).await;
                if let Err(err) = engine.timeout_advance(attempt_id, question_id, index).await {
                    warn!(attempt_id, question_id, %err, "timeout advance failed");
                }
            })
        };

        self.timers.set_question_timers(attempt_id, countdown, timeout);
    }

    fn spawn_watchdog(&self, attempt_id: i64) {
        let engine = self.clone();
        let wait = Duration::from_secs((self.timing.session_timeout_minutes.max(0) as u64) * 60);
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            engine.abandon(attempt_id, true).await;
        });
        self.timers.set_watchdog(attempt_id, watchdog);
    }

    /// Drops an open session without finalizing the attempt: timers
    /// cleared, pin released, attempt left unfinished so the student
    /// can retry later.
    async fn abandon(&self, attempt_id: i64, from_watchdog: bool) {
        if self.sessions.remove(attempt_id).is_none() {
            return;
        }
        let pinned = if from_watchdog {
            self.timers.clear_expired(attempt_id)
        } else {
            self.timers.clear(attempt_id)
        };
        if let Some(pinned) = pinned {
            if let Err(err) = self.transport.unpin(pinned).await {
                debug!(attempt_id, %err, "unpin on abandon failed");
            }
        }
        info!(attempt_id, "quiz session abandoned without scoring");
    }
}

/// Message rendering for the chat transport.
pub mod render {
    use super::{AttemptSummary, QuizQuestion};
    use crate::transport::Button;

    const REVIEW_SNIPPET_CHARS: usize = 50;

    pub fn question(
        question: &QuizQuestion,
        index: usize,
        total: usize,
        remaining_seconds: i64,
    ) -> String {
        format!(
            "<b>Question {}/{}</b>\n\n{}\n\nA) {}\nB) {}\nC) {}\nD) {}\n\n⏱ {}s",
            index + 1,
            total,
            question.question_text,
            question.option_a,
            question.option_b,
            question.option_c,
            question.option_d,
            remaining_seconds,
        )
    }

    pub fn option_buttons(attempt_id: i64, question_id: i64) -> Vec<Button> {
        ["A", "B", "C", "D"]
            .iter()
            .map(|label| {
                Button::new(
                    *label,
                    format!("ans_{}_{}_{}", attempt_id, question_id, label),
                )
            })
            .collect()
    }

    pub fn result(summary: &AttemptSummary) -> String {
        let mut text = format!(
            "🏁 <b>Quiz finished!</b>\nScore: {}/{}",
            summary.score, summary.total
        );
        if let Some(review) = &summary.review {
            text.push_str("\n\nYour answers:");
            for line in review {
                let snippet: String = line
                    .question_text
                    .chars()
                    .take(REVIEW_SNIPPET_CHARS)
                    .collect();
                if line.is_correct {
                    text.push_str(&format!(
                        "\n✅ Q{}. {}: {}",
                        line.position, snippet, line.selected
                    ));
                } else {
                    text.push_str(&format!(
                        "\n❌ Q{}. {}: {} (correct: {})",
                        line.position, snippet, line.selected, line.correct
                    ));
                }
            }
        }
        text
    }
}
