use std::time::Duration;

use tracing::{info, warn};

use kinship_api::state::AppState;

/// Background task that expires stale friend requests.
///
/// Pending requests older than `ttl` are moved to `expired`, which frees the
/// pair for a new request.
pub async fn run_sweep_loop(state: AppState, ttl: Duration, interval: Duration) {
    let mut interval = tokio::time::interval(interval);

    loop {
        interval.tick().await;

        match sweep_once(&state, ttl).await {
            Ok(count) => {
                if count > 0 {
                    info!("Sweep: expired {} stale friend requests", count);
                }
            }
            Err(e) => {
                warn!("Sweep error: {}", e);
            }
        }
    }
}

async fn sweep_once(state: &AppState, ttl: Duration) -> anyhow::Result<usize> {
    let state = state.clone();
    let count = tokio::task::spawn_blocking(move || state.db.expire_stale_requests(ttl)).await??;
    Ok(count)
}
