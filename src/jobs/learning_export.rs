//! Nightly learning export: completed assignments with predicted vs actual
//! outcomes, dumped as JSONL for the offline training pipeline.

use super::JobContext;
use anyhow::{Context as _, Result};
use chrono::{Duration, Utc};
use tracing::info;

/// Outcomes older than this have already been exported many times over.
const EXPORT_WINDOW_DAYS: i64 = 90;

pub async fn run(ctx: JobContext) -> Result<()> {
    let since = Utc::now().date_naive() - Duration::days(EXPORT_WINDOW_DAYS);
    let records = ctx.db.learning_records_since(since)?;

    if records.is_empty() {
        info!("📚 Learning export: nothing to export");
        return Ok(());
    }

    let mut out = String::new();
    for record in &records {
        out.push_str(&serde_json::to_string(record).context("serialize learning record")?);
        out.push('\n');
    }

    let path = ctx.config.learning_export_path.clone();
    let count = records.len();
    tokio::task::spawn_blocking(move || std::fs::write(&path, out))
        .await
        .context("export task panicked")?
        .context("write learning export")?;

    info!(
        "📚 Learning export: {count} records -> {}",
        ctx.config.learning_export_path
    );
    Ok(())
}
