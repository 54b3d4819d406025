//! Typed in-memory session state for quiz taking, one record per live
//! attempt. Replaces framework-style opaque per-user state blobs with
//! a struct the engine can check-and-set atomically.
//!
//! All mutation goes through one mutex held only for short, await-free
//! sections; the store is the single source of truth for "is this
//! attempt still live in memory".

use crate::models::question::QuizQuestion;
use crate::models::quiz::Quiz;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Live state of one student going through one attempt. Questions are
/// snapshotted at start, so later edits to the quiz never affect an
/// attempt in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizSession {
    pub attempt_id: i64,
    pub student_id: i64,
    pub chat_id: i64,
    pub quiz: Quiz,
    pub questions: Vec<QuizQuestion>,
    pub current_index: usize,
    pub score: i32,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

impl QuizSession {
    pub fn total(&self) -> usize {
        self.questions.len()
    }

    pub fn current_question(&self) -> Option<&QuizQuestion> {
        self.questions.get(self.current_index)
    }
}

/// Result of the check-and-set advance. `Stale` means the session is
/// gone or the submitted question is no longer the expected one; the
/// caller must silently drop the event.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Next { session: QuizSession },
    Finished { score: i32 },
    Stale,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, QuizSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session, keyed by attempt id.
    pub fn insert(&self, session: QuizSession) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(session.attempt_id, session);
    }

    pub fn get(&self, attempt_id: i64) -> Option<QuizSession> {
        let sessions = self.sessions.lock().unwrap();
        sessions.get(&attempt_id).cloned()
    }

    pub fn for_student(&self, student_id: i64) -> Option<QuizSession> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .values()
            .find(|s| s.student_id == student_id)
            .cloned()
    }

    /// Atomically verifies that `question_id` is still the expected
    /// question and claims the advance: bumps the score when correct
    /// and moves the index. Exactly one of the racing answer/timeout
    /// paths can win this for a given question.
    pub fn advance_if_current(&self, attempt_id: i64, question_id: i64, correct: bool) -> Advance {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(session) = sessions.get_mut(&attempt_id) else {
            return Advance::Stale;
        };
        let expected = session.questions.get(session.current_index).map(|q| q.id);
        if expected != Some(question_id) {
            return Advance::Stale;
        }

        if correct {
            session.score += 1;
        }
        session.current_index += 1;

        if session.current_index >= session.questions.len() {
            Advance::Finished {
                score: session.score,
            }
        } else {
            Advance::Next {
                session: session.clone(),
            }
        }
    }

    pub fn set_deadline(&self, attempt_id: i64, deadline: DateTime<Utc>) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(&attempt_id) {
            session.deadline = deadline;
        }
    }

    pub fn remove(&self, attempt_id: i64) -> Option<QuizSession> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.remove(&attempt_id)
    }
}
