pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod storage;
pub mod transport;
pub mod utils;

use crate::services::leaderboard::LeaderboardService;
use crate::services::quiz_engine::{QuizEngine, QuizTiming};
use crate::storage::{PgQuizStore, QuizStore};
use crate::transport::{TelegramTransport, Transport};
use crate::utils::time::{Clock, SystemClock};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub store: Arc<dyn QuizStore>,
    pub transport: Arc<dyn Transport>,
    pub engine: QuizEngine,
    pub leaderboard: LeaderboardService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let config = crate::config::get_config();

        let store: Arc<dyn QuizStore> = Arc::new(PgQuizStore::new(pool.clone()));
        let transport: Arc<dyn Transport> =
            Arc::new(TelegramTransport::new(&config.telegram_bot_token));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let engine = QuizEngine::new(
            store.clone(),
            transport.clone(),
            clock,
            QuizTiming::from_config(config),
        );
        let leaderboard = LeaderboardService::new(store.clone(), config.leaderboard_page_size);

        Self {
            pool,
            store,
            transport,
            engine,
            leaderboard,
        }
    }
}
