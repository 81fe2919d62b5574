use crate::progress::ProgressEngine;

pub async fn run(engine: &ProgressEngine) {
    tracing::debug!("heart_regeneration: start");
    match engine.regenerate_hearts().await {
        Ok(true) => tracing::info!("heart_regeneration: heart granted"),
        Ok(false) => tracing::debug!("heart_regeneration: nothing due"),
        Err(e) => tracing::error!(error=%e, "heart_regeneration failed"),
    }
}
