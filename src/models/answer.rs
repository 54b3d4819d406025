use crate::models::question::AnswerChoice;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// What the student picked for a question. `Blank` is the timeout
/// sentinel, stored as `"-"`, and is always incorrect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "selected_option")]
pub enum Selection {
    A,
    B,
    C,
    D,
    #[serde(rename = "-")]
    #[sqlx(rename = "-")]
    Blank,
}

impl Selection {
    pub fn is_blank(&self) -> bool {
        matches!(self, Selection::Blank)
    }

    /// True when the selection matches the designated correct option.
    pub fn matches(&self, correct: AnswerChoice) -> bool {
        match (self, correct) {
            (Selection::A, AnswerChoice::A) => true,
            (Selection::B, AnswerChoice::B) => true,
            (Selection::C, AnswerChoice::C) => true,
            (Selection::D, AnswerChoice::D) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Selection::A => "A",
            Selection::B => "B",
            Selection::C => "C",
            Selection::D => "D",
            Selection::Blank => "-",
        }
    }
}

impl From<AnswerChoice> for Selection {
    fn from(choice: AnswerChoice) -> Self {
        match choice {
            AnswerChoice::A => Selection::A,
            AnswerChoice::B => Selection::B,
            AnswerChoice::C => Selection::C,
            AnswerChoice::D => Selection::D,
        }
    }
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuizAnswer {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub selected_answer: Selection,
    pub is_correct: bool,
}
