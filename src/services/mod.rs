pub mod leaderboard;
pub mod quiz_engine;
pub mod rating;
pub mod session;
pub mod streak;
pub mod timer;
