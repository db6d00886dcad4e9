//! Nightly retention pruning: GPS logs at 30 days, health events at 90.

use super::JobContext;
use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::info;

pub async fn run(ctx: JobContext) -> Result<()> {
    let now = Utc::now();

    let gps_cutoff = now - Duration::days(ctx.config.gps_retention_days);
    let gps_pruned = ctx.db.prune_gps_logs(gps_cutoff)?;

    let health_cutoff = now - Duration::days(ctx.config.health_event_retention_days);
    let health_pruned = ctx.db.prune_health_events(health_cutoff)?;

    if gps_pruned > 0 || health_pruned > 0 {
        info!(
            "🧹 Cleanup: pruned {gps_pruned} gps logs (>{}d) and {health_pruned} health events (>{}d)",
            ctx.config.gps_retention_days, ctx.config.health_event_retention_days
        );
    }
    Ok(())
}
