//! Nightly forecast refresh: re-run the volume forecast for the horizons the
//! dashboards serve, so the day's first readers hit a warm cache.

use super::JobContext;
use crate::forecast::ForecastService;
use anyhow::Result;
use tracing::info;

const HORIZONS: [usize; 2] = [7, 30];

pub async fn run(ctx: JobContext) -> Result<()> {
    let service = ForecastService::new(
        ctx.db.clone(),
        ctx.registry.clone(),
        ctx.cache.clone(),
        ctx.weather.clone(),
        ctx.config.weather_city.clone(),
        ctx.config.payment_per_package,
    );

    for days in HORIZONS {
        let forecast = service.volume_forecast(days).await?;
        info!(
            "📈 Refreshed {days}-day volume forecast ({} points)",
            forecast.len()
        );
    }
    Ok(())
}
