//! Leaderboard queries: ranked standings for the active season, the
//! all-time table, a student's own rank, and per-quiz statistics.
//!
//! Ordering is rating desc, then average percentage desc, then quiz
//! count desc. Ranks are dense over that ordering; "my rank" is the
//! count of strictly higher-rated entries plus one.

use crate::error::Result;
use crate::models::season::SeasonRating;
use crate::services::rating;
use crate::storage::{AttemptScope, QuizStore};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct StandingRow {
    pub rank: usize,
    pub student_id: i64,
    pub name: String,
    pub rating_score: f64,
    pub avg_percentage: f64,
    pub total_quizzes: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Standings {
    /// Season name for season standings, `None` for the all-time table.
    pub season: Option<String>,
    pub rows: Vec<StandingRow>,
    pub page: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankInfo {
    pub rank: usize,
    pub out_of: usize,
    pub rating_score: f64,
    pub avg_percentage: f64,
    pub total_quizzes: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizStats {
    pub attempts: usize,
    pub avg_percentage: f64,
    /// Best scorers, at most three, ordered by score desc.
    pub top: Vec<(String, i32, i32)>,
}

/// Sortable shape shared by season ratings and all-time aggregates.
#[derive(Debug, Clone, Copy)]
struct Entry {
    student_id: i64,
    rating_score: f64,
    avg_percentage: f64,
    total_quizzes: i32,
}

impl From<&SeasonRating> for Entry {
    fn from(r: &SeasonRating) -> Self {
        Self {
            student_id: r.student_id,
            rating_score: r.rating_score,
            avg_percentage: r.avg_percentage,
            total_quizzes: r.total_ranked_quizzes,
        }
    }
}

fn standings_order(a: &Entry, b: &Entry) -> Ordering {
    b.rating_score
        .total_cmp(&a.rating_score)
        .then(b.avg_percentage.total_cmp(&a.avg_percentage))
        .then(b.total_quizzes.cmp(&a.total_quizzes))
}

#[derive(Clone)]
pub struct LeaderboardService {
    store: Arc<dyn QuizStore>,
    page_size: i64,
}

impl LeaderboardService {
    pub fn new(store: Arc<dyn QuizStore>, page_size: i64) -> Self {
        Self { store, page_size }
    }

    /// Standings of the mentor's active season; empty when no season
    /// is active. Pages are zero-based.
    pub async fn season_standings(&self, mentor_id: i64, page: i64) -> Result<Standings> {
        let Some(season) = self.store.active_season(mentor_id).await? else {
            debug!(mentor_id, "no active season for standings");
            return Ok(Standings {
                season: None,
                rows: Vec::new(),
                page,
                has_more: false,
            });
        };

        let ratings = self.store.season_ratings(season.id).await?;
        let entries: Vec<Entry> = ratings
            .iter()
            .filter(|r| r.total_ranked_quizzes > 0)
            .map(Entry::from)
            .collect();
        let (rows, has_more) = self.page_rows(entries, page).await?;
        Ok(Standings {
            season: Some(season.name),
            rows,
            page,
            has_more,
        })
    }

    /// All-time table over every qualifying ranked attempt of the
    /// mentor's students, computed with the same formula as seasons.
    pub async fn all_time_standings(&self, mentor_id: i64, page: i64) -> Result<Standings> {
        let attempts = self
            .store
            .qualifying_attempts(AttemptScope {
                mentor_id,
                student_id: None,
                window: None,
            })
            .await?;

        let mut by_student: HashMap<i64, Vec<_>> = HashMap::new();
        for attempt in attempts {
            by_student.entry(attempt.student_id).or_default().push(attempt);
        }

        let entries: Vec<Entry> = by_student
            .into_iter()
            .map(|(student_id, attempts)| {
                let summary = rating::summarize(&attempts);
                Entry {
                    student_id,
                    rating_score: summary.rating_score,
                    avg_percentage: summary.avg_percentage,
                    total_quizzes: summary.total_quizzes,
                }
            })
            .filter(|e| e.total_quizzes > 0)
            .collect();
        let (rows, has_more) = self.page_rows(entries, page).await?;
        Ok(Standings {
            season: None,
            rows,
            page,
            has_more,
        })
    }

    /// The student's position in the active season, or `None` when no
    /// season is active or they have no rated quizzes yet.
    pub async fn my_rank(&self, mentor_id: i64, student_id: i64) -> Result<Option<RankInfo>> {
        let Some(season) = self.store.active_season(mentor_id).await? else {
            return Ok(None);
        };
        let ratings = self.store.season_ratings(season.id).await?;
        let entries: Vec<Entry> = ratings
            .iter()
            .filter(|r| r.total_ranked_quizzes > 0)
            .map(Entry::from)
            .collect();

        let Some(mine) = entries.iter().find(|e| e.student_id == student_id).copied() else {
            return Ok(None);
        };
        let higher = entries
            .iter()
            .filter(|e| standings_order(e, &mine) == Ordering::Less)
            .count();
        Ok(Some(RankInfo {
            rank: higher + 1,
            out_of: entries.len(),
            rating_score: mine.rating_score,
            avg_percentage: mine.avg_percentage,
            total_quizzes: mine.total_quizzes,
        }))
    }

    /// Aggregate results of one quiz: attempt count, average score
    /// percentage, and the top three scorers.
    pub async fn quiz_stats(&self, quiz_id: i64) -> Result<QuizStats> {
        let attempts = self.store.finished_attempts_for_quiz(quiz_id).await?;
        let total_score: i32 = attempts.iter().map(|a| a.score).sum();
        let total_possible: i32 = attempts.iter().map(|a| a.total).sum();
        let avg_percentage = if total_possible > 0 {
            (f64::from(total_score) / f64::from(total_possible) * 1000.0).round() / 10.0
        } else {
            0.0
        };

        let mut best: HashMap<i64, (i32, i32)> = HashMap::new();
        for attempt in &attempts {
            let entry = best.entry(attempt.student_id).or_insert((attempt.score, attempt.total));
            if attempt.score > entry.0 {
                *entry = (attempt.score, attempt.total);
            }
        }
        let mut ranked: Vec<(i64, i32, i32)> = best
            .into_iter()
            .map(|(student_id, (score, total))| (student_id, score, total))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut top = Vec::new();
        for (student_id, score, total) in ranked.into_iter().take(3) {
            let student = self.store.get_student(student_id).await?;
            top.push((student.display_name(), score, total));
        }

        Ok(QuizStats {
            attempts: attempts.len(),
            avg_percentage,
            top,
        })
    }

    async fn page_rows(
        &self,
        mut entries: Vec<Entry>,
        page: i64,
    ) -> Result<(Vec<StandingRow>, bool)> {
        entries.sort_by(standings_order);

        let page_size = self.page_size.max(1) as usize;
        let offset = (page.max(0) as usize) * page_size;
        let has_more = entries.len() > offset + page_size;

        let mut rows = Vec::new();
        for (i, entry) in entries.iter().enumerate().skip(offset).take(page_size) {
            let student = self.store.get_student(entry.student_id).await?;
            rows.push(StandingRow {
                rank: i + 1,
                student_id: entry.student_id,
                name: student.display_name(),
                rating_score: entry.rating_score,
                avg_percentage: entry.avg_percentage,
                total_quizzes: entry.total_quizzes,
            });
        }
        Ok((rows, has_more))
    }
}
