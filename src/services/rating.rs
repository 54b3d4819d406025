//! Rating engine: the pure scoring formula, aggregation over
//! qualifying attempts, and the full season-rating recompute.
//!
//! The recompute is deliberately O(attempts) from scratch rather than
//! incremental: redundant runs are idempotent and the cache can never
//! drift from the attempt rows.

use crate::error::Result;
use crate::models::attempt::QuizAttempt;
use crate::models::season::{Season, SeasonRating};
use crate::storage::{AttemptScope, QuizStore};
use crate::utils::time::Clock;
use chrono::{DateTime, NaiveTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

/// Activity bonus saturates once a student has this many distinct
/// ranked quizzes.
const ACTIVITY_CAP: f64 = 10.0;
const ACTIVITY_BONUS_MAX: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RatingSummary {
    pub total_quizzes: i32,
    pub total_score: i32,
    pub total_possible: i32,
    pub avg_percentage: f64,
    pub rating_score: f64,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `avg_percentage × (1 + min(total_quizzes / 10, 1) × 0.5)`, rounded
/// to one decimal. Rewards accuracy and breadth, capped at +50%.
pub fn rating_score(avg_percentage: f64, total_quizzes: i32) -> f64 {
    let activity_bonus = (f64::from(total_quizzes) / ACTIVITY_CAP).min(1.0) * ACTIVITY_BONUS_MAX;
    round1(avg_percentage * (1.0 + activity_bonus))
}

/// Aggregates a set of qualifying attempts into the rating metrics.
pub fn summarize(attempts: &[QuizAttempt]) -> RatingSummary {
    let distinct_quizzes: HashSet<i64> = attempts.iter().map(|a| a.quiz_id).collect();
    let total_quizzes = distinct_quizzes.len() as i32;
    let total_score: i32 = attempts.iter().map(|a| a.score).sum();
    let total_possible: i32 = attempts.iter().map(|a| a.total).sum();

    let avg_percentage = if total_possible > 0 {
        round1(f64::from(total_score) / f64::from(total_possible) * 100.0)
    } else {
        0.0
    };

    RatingSummary {
        total_quizzes,
        total_score,
        total_possible,
        avg_percentage,
        rating_score: rating_score(avg_percentage, total_quizzes),
    }
}

/// Inclusive `[start 00:00:00, end 23:59:59]` window of a season, in UTC.
pub fn season_window(season: &Season) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = season.start_date.and_time(NaiveTime::MIN).and_utc();
    let end = season
        .end_date
        .and_time(NaiveTime::from_hms_opt(23, 59, 59).expect("valid time"))
        .and_utc();
    (start, end)
}

#[derive(Clone)]
pub struct RatingService {
    store: Arc<dyn QuizStore>,
    clock: Arc<dyn Clock>,
}

impl RatingService {
    pub fn new(store: Arc<dyn QuizStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Recomputes the student's season rating for the season covering
    /// `attempt_started`, creating the season lazily.
    pub async fn recompute_for_attempt(
        &self,
        student_id: i64,
        mentor_id: i64,
        attempt_started: DateTime<Utc>,
    ) -> Result<SeasonRating> {
        let season = self
            .store
            .get_or_create_season(mentor_id, attempt_started.date_naive(), self.clock.today())
            .await?;

        let attempts = self
            .store
            .qualifying_attempts(AttemptScope {
                mentor_id,
                student_id: Some(student_id),
                window: Some(season_window(&season)),
            })
            .await?;
        let summary = summarize(&attempts);

        let mut rating = self
            .store
            .get_or_create_season_rating(season.id, student_id)
            .await?;
        rating.total_ranked_quizzes = summary.total_quizzes;
        rating.total_score = summary.total_score;
        rating.total_possible = summary.total_possible;
        rating.avg_percentage = summary.avg_percentage;
        rating.rating_score = summary.rating_score;
        self.store.save_season_rating(&rating).await?;

        tracing::info!(
            student_id,
            season_id = season.id,
            rating = rating.rating_score,
            "season rating recomputed"
        );
        Ok(rating)
    }

    pub async fn activate_season(&self, season_id: i64) -> Result<()> {
        self.store.activate_season(season_id).await
    }
}
