use crate::progress::ProgressEngine;

/// 跨日检查：连续天数、每日进度归零、生命值回满。同一天内重复执行无副作用。
pub async fn run(engine: &ProgressEngine) {
    match engine.daily_rollover().await {
        Ok(true) => tracing::info!("daily_rollover: new day applied"),
        Ok(false) => tracing::debug!("daily_rollover: already current"),
        Err(e) => tracing::error!(error=%e, "daily_rollover failed"),
    }
}
