pub mod leaderboard;
pub mod profile;
pub mod sync_queue;
