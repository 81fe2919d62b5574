use crate::sync::SyncClient;

pub async fn run(sync: &SyncClient) {
    if sync.status().pending == 0 {
        return;
    }
    match sync.replay().await {
        Ok(report) => tracing::debug!(
            delivered = report.delivered,
            kept = report.kept,
            remaining = report.remaining,
            "sync_replay: done"
        ),
        Err(e) => tracing::error!(error=%e, "sync_replay failed"),
    }
}
