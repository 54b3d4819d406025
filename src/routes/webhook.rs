//! Telegram webhook endpoint. Parses bot API updates, resolves the
//! student, and dispatches button taps and commands to the engine and
//! leaderboard services.
//!
//! The endpoint always answers 200: a non-2xx response would make
//! Telegram redeliver the update, and replays of quiz callbacks are
//! exactly what the stale-submission handling is there to absorb.

use crate::error::{Error, Result};
use crate::models::question::AnswerChoice;
use crate::models::student::Student;
use crate::services::leaderboard::{RankInfo, Standings};
use crate::services::quiz_engine::{AnswerOutcome, StartOutcome};
use crate::transport::Button;
use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
    pub callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    pub r#type: String,
}

#[derive(Debug, Deserialize)]
pub struct TelegramCallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    pub message: Option<TelegramMessage>,
    pub data: Option<String>,
}

pub async fn handle_webhook(
    State(state): State<AppState>,
    Json(update): Json<TelegramUpdate>,
) -> StatusCode {
    debug!(update_id = update.update_id, "telegram update received");
    if let Err(err) = process_update(&state, update).await {
        // Errors are logged, never bounced back to Telegram: a retry
        // of the same update would not fare any better.
        warn!(%err, "failed to process telegram update");
    }
    StatusCode::OK
}

async fn process_update(state: &AppState, update: TelegramUpdate) -> Result<()> {
    if let Some(callback) = update.callback_query {
        return process_callback(state, callback).await;
    }
    if let Some(message) = update.message {
        return process_message(state, message).await;
    }
    Ok(())
}

async fn process_callback(state: &AppState, callback: TelegramCallbackQuery) -> Result<()> {
    let Some(data) = callback.data.as_deref() else {
        return Ok(());
    };
    let Some(chat_id) = callback.message.as_ref().map(|m| m.chat.id) else {
        return Ok(());
    };
    let Some(student) = state.store.get_student_by_telegram(callback.from.id).await? else {
        debug!(
            telegram_id = callback.from.id,
            "callback from unknown user ignored"
        );
        state.transport.ack_callback(&callback.id, None).await.ok();
        return Ok(());
    };

    if let Some(quiz_id) = parse_id(data, "startquiz_") {
        return start_quiz(state, &callback.id, &student, quiz_id, chat_id).await;
    }
    if let Some(rest) = data.strip_prefix("ans_") {
        return submit_answer(state, &callback.id, &student, rest).await;
    }
    if let Some(attempt_id) = parse_id(data, "reviewquiz_") {
        return send_review(state, &callback.id, &student, attempt_id, chat_id).await;
    }
    if let Some(page) = parse_id(data, "lb_") {
        state.transport.ack_callback(&callback.id, None).await.ok();
        return send_leaderboard(state, &student, chat_id, page).await;
    }
    if let Some(page) = parse_id(data, "alltime_") {
        state.transport.ack_callback(&callback.id, None).await.ok();
        return send_all_time(state, &student, chat_id, page).await;
    }
    if let Some(quiz_id) = parse_id(data, "quizstats_") {
        state.transport.ack_callback(&callback.id, None).await.ok();
        return send_quiz_stats(state, quiz_id, chat_id).await;
    }

    debug!(data, "unrecognized callback ignored");
    state.transport.ack_callback(&callback.id, None).await.ok();
    Ok(())
}

async fn process_message(state: &AppState, message: TelegramMessage) -> Result<()> {
    let Some(text) = message.text.as_deref() else {
        return Ok(());
    };
    let Some(from) = &message.from else {
        return Ok(());
    };
    if from.is_bot {
        return Ok(());
    }
    let Some(student) = state.store.get_student_by_telegram(from.id).await? else {
        debug!(telegram_id = from.id, "message from unregistered user ignored");
        return Ok(());
    };
    let chat_id = message.chat.id;

    let command = text.split_whitespace().next().unwrap_or("");
    match command {
        "/start" => {
            let greeting = format!(
                "Hi, {}! Pick a quiz from your mentor's list to begin.\n\
                 /leaderboard shows the season standings, /myrank your place in it,\n\
                 /mystreak your daily streak.",
                student.first_name
            );
            state.transport.send_message(chat_id, &greeting).await?;
        }
        "/leaderboard" => send_leaderboard(state, &student, chat_id, 0).await?,
        "/alltime" => send_all_time(state, &student, chat_id, 0).await?,
        "/myrank" => send_my_rank(state, &student, chat_id).await?,
        "/mystreak" => {
            let text = format!(
                "🔥 Current streak: {} day(s)\n🏆 Longest streak: {} day(s)",
                student.current_streak, student.longest_streak
            );
            state.transport.send_message(chat_id, &text).await?;
        }
        _ => debug!(command, "unhandled command"),
    }
    Ok(())
}

async fn start_quiz(
    state: &AppState,
    callback_id: &str,
    student: &Student,
    quiz_id: i64,
    chat_id: i64,
) -> Result<()> {
    match state.engine.start(student, quiz_id, chat_id).await {
        Ok(StartOutcome::Started { attempt_id, total }) => {
            info!(attempt_id, total, "quiz started from callback");
            state.transport.ack_callback(callback_id, None).await.ok();
        }
        Ok(StartOutcome::AlreadyCompleted { score, total }) => {
            state
                .transport
                .ack_callback(
                    callback_id,
                    Some("You already completed this quiz".to_string()),
                )
                .await
                .ok();
            let text = format!(
                "You have already taken this quiz.\nYour result: {}/{}",
                score, total
            );
            state.transport.send_message(chat_id, &text).await?;
        }
        Err(Error::AdmissionDenied(reason)) => {
            state
                .transport
                .ack_callback(callback_id, Some(reason.to_string()))
                .await
                .ok();
        }
        Err(Error::BadRequest(msg)) => {
            state.transport.ack_callback(callback_id, Some(msg)).await.ok();
        }
        Err(Error::NoQuestions) => {
            state
                .transport
                .ack_callback(callback_id, Some("This quiz has no questions yet".to_string()))
                .await
                .ok();
        }
        Err(err) => {
            state.transport.ack_callback(callback_id, None).await.ok();
            return Err(err);
        }
    }
    Ok(())
}

/// Payload shape: `{attempt_id}_{question_id}_{choice}`. The engine
/// checks that the caller owns the attempt; forged ids come out stale.
async fn submit_answer(
    state: &AppState,
    callback_id: &str,
    student: &Student,
    payload: &str,
) -> Result<()> {
    let mut parts = payload.splitn(3, '_');
    let parsed = (
        parts.next().and_then(|s| s.parse::<i64>().ok()),
        parts.next().and_then(|s| s.parse::<i64>().ok()),
        parts.next().and_then(AnswerChoice::parse),
    );
    let (Some(attempt_id), Some(question_id), Some(choice)) = parsed else {
        warn!(payload, "malformed answer callback");
        state.transport.ack_callback(callback_id, None).await.ok();
        return Ok(());
    };

    match state
        .engine
        .submit_answer(student.id, attempt_id, question_id, choice)
        .await?
    {
        AnswerOutcome::Stale => {
            state
                .transport
                .ack_callback(
                    callback_id,
                    Some("This question has already moved on".to_string()),
                )
                .await
                .ok();
        }
        _ => {
            state.transport.ack_callback(callback_id, None).await.ok();
        }
    }
    Ok(())
}

async fn send_review(
    state: &AppState,
    callback_id: &str,
    student: &Student,
    attempt_id: i64,
    chat_id: i64,
) -> Result<()> {
    match state.engine.attempt_review(student.id, attempt_id).await? {
        None => {
            state
                .transport
                .ack_callback(
                    callback_id,
                    Some("This review is not available".to_string()),
                )
                .await
                .ok();
        }
        Some(review) => {
            state.transport.ack_callback(callback_id, None).await.ok();
            let mut text = String::from("📋 <b>Answer review</b>");
            for line in &review {
                let mark = if line.is_correct { "✅" } else { "❌" };
                text.push_str(&format!(
                    "\n{} Q{}. {}: {} (correct: {})",
                    mark, line.position, line.question_text, line.selected, line.correct
                ));
            }
            state.transport.send_message(chat_id, &text).await?;
        }
    }
    Ok(())
}

async fn send_leaderboard(
    state: &AppState,
    student: &Student,
    chat_id: i64,
    page: i64,
) -> Result<()> {
    let Some(mentor_id) = student.mentor_id else {
        state
            .transport
            .send_message(chat_id, "You are not assigned to a mentor yet.")
            .await?;
        return Ok(());
    };
    let standings = state.leaderboard.season_standings(mentor_id, page).await?;
    let title = match &standings.season {
        Some(name) => format!("🏆 <b>Season {}</b>", name),
        None => "🏆 <b>Leaderboard</b>\n\nNo active season right now.".to_string(),
    };
    let text = standings_text(&title, &standings);
    let buttons = paging_buttons("lb_", &standings);
    state
        .transport
        .send_with_buttons(chat_id, &text, &buttons)
        .await?;
    Ok(())
}

async fn send_all_time(
    state: &AppState,
    student: &Student,
    chat_id: i64,
    page: i64,
) -> Result<()> {
    let Some(mentor_id) = student.mentor_id else {
        state
            .transport
            .send_message(chat_id, "You are not assigned to a mentor yet.")
            .await?;
        return Ok(());
    };
    let standings = state
        .leaderboard
        .all_time_standings(mentor_id, page)
        .await?;
    let text = standings_text("🏆 <b>All-time standings</b>", &standings);
    let buttons = paging_buttons("alltime_", &standings);
    state
        .transport
        .send_with_buttons(chat_id, &text, &buttons)
        .await?;
    Ok(())
}

async fn send_my_rank(state: &AppState, student: &Student, chat_id: i64) -> Result<()> {
    let Some(mentor_id) = student.mentor_id else {
        state
            .transport
            .send_message(chat_id, "You are not assigned to a mentor yet.")
            .await?;
        return Ok(());
    };
    let text = match state.leaderboard.my_rank(mentor_id, student.id).await? {
        Some(RankInfo {
            rank,
            out_of,
            rating_score,
            avg_percentage,
            total_quizzes,
        }) => format!(
            "📊 You are #{} of {} this season.\nRating: {:.1}\nAverage: {:.1}%\nRanked quizzes: {}",
            rank, out_of, rating_score, avg_percentage, total_quizzes
        ),
        None => "You have no rated quizzes this season yet.".to_string(),
    };
    state.transport.send_message(chat_id, &text).await?;
    Ok(())
}

async fn send_quiz_stats(state: &AppState, quiz_id: i64, chat_id: i64) -> Result<()> {
    let quiz = state.store.get_quiz(quiz_id).await?;
    let stats = state.leaderboard.quiz_stats(quiz_id).await?;
    let mut text = format!(
        "📈 <b>{}</b>\nAttempts: {}\nAverage: {:.1}%",
        quiz.title, stats.attempts, stats.avg_percentage
    );
    if !stats.top.is_empty() {
        text.push_str("\n\nTop results:");
        for (name, score, total) in &stats.top {
            text.push_str(&format!("\n• {}: {}/{}", name, score, total));
        }
    }
    state.transport.send_message(chat_id, &text).await?;
    Ok(())
}

fn standings_text(title: &str, standings: &Standings) -> String {
    let mut text = title.to_string();
    for row in &standings.rows {
        let medal = match row.rank {
            1 => "🥇",
            2 => "🥈",
            3 => "🥉",
            _ => "▫️",
        };
        text.push_str(&format!(
            "\n{} {}. {}: {:.1} ({:.1}%, {} quizzes)",
            medal, row.rank, row.name, row.rating_score, row.avg_percentage, row.total_quizzes
        ));
    }
    if standings.rows.is_empty() && standings.season.is_some() {
        text.push_str("\n\nNo rated quizzes yet.");
    }
    text
}

fn paging_buttons(prefix: &str, standings: &Standings) -> Vec<Button> {
    let mut buttons = Vec::new();
    if standings.page > 0 {
        buttons.push(Button::new(
            "⬅️ Back",
            format!("{}{}", prefix, standings.page - 1),
        ));
    }
    if standings.has_more {
        buttons.push(Button::new(
            "Next ➡️",
            format!("{}{}", prefix, standings.page + 1),
        ));
    }
    buttons
}

fn parse_id(data: &str, prefix: &str) -> Option<i64> {
    data.strip_prefix(prefix)?.parse().ok()
}
