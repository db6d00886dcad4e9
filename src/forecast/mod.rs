//! Forecast + earnings engine: autoregressive volume prediction with weather
//! adjustment and cache-backed serving, decomposed into per-driver earnings.

use crate::cache::{volume_forecast_key, Cache, FORECAST_TTL};
use crate::error::FleetResult;
use crate::ml::{ModelRegistry, VolumeForecaster, VolumePoint};
use crate::store::FleetDb;
use crate::weather::{impact_factor, WeatherOracle};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Trailing window of history fed to the forecaster.
const HISTORY_DAYS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyEarnings {
    pub date: NaiveDate,
    pub predicted_packages: i64,
    pub predicted_earnings: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyEarnings {
    pub week_number: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_packages: i64,
    pub total_earnings: f64,
    pub days_in_week: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningsForecast {
    pub forecast_period_days: usize,
    pub total_predicted_earnings: f64,
    pub average_daily_earnings: f64,
    pub payment_per_package: f64,
    pub driver_share: f64,
    pub daily_breakdown: Vec<DailyEarnings>,
    pub weekly_breakdown: Vec<WeeklyEarnings>,
}

pub struct ForecastService {
    db: FleetDb,
    forecaster: VolumeForecaster,
    cache: Cache,
    weather: Arc<WeatherOracle>,
    city: String,
    payment_per_package: f64,
}

impl ForecastService {
    pub fn new(
        db: FleetDb,
        registry: Arc<ModelRegistry>,
        cache: Cache,
        weather: Arc<WeatherOracle>,
        city: String,
        payment_per_package: f64,
    ) -> Self {
        Self {
            db,
            forecaster: VolumeForecaster::new(registry),
            cache,
            weather,
            city,
            payment_per_package,
        }
    }

    pub async fn volume_forecast(&self, days: usize) -> FleetResult<Vec<VolumePoint>> {
        self.volume_forecast_for(days, Utc::now().date_naive()).await
    }

    /// N-day volume forecast starting at `today + 1`, weather-adjusted,
    /// served from cache when fresh.
    pub async fn volume_forecast_for(
        &self,
        days: usize,
        today: NaiveDate,
    ) -> FleetResult<Vec<VolumePoint>> {
        let key = volume_forecast_key(days);
        if let Some(cached) = self.cache.get_json::<Vec<VolumePoint>>(&key).await {
            if cached.len() == days && cached.first().map(|p| p.date) == Some(today + Duration::days(1)) {
                return Ok(cached);
            }
        }

        let since = today - Duration::days(HISTORY_DAYS);
        let history: Vec<f64> = self
            .db
            .daily_volumes(since)?
            .into_iter()
            .map(|(_, count)| count as f64)
            .collect();

        let mut forecast = self.forecaster.forecast(&history, days, today);

        // Weather only shifts demand; oracle failure leaves the forecast as-is.
        let weather = self.weather.current(&self.city).await;
        let impact = impact_factor(weather.as_ref());
        if (impact - 1.0).abs() > f64::EPSILON {
            info!("🌦️  Applying weather impact factor: {impact:.2}");
            for point in &mut forecast {
                point.predicted_volume = (point.predicted_volume as f64 * impact) as i64;
            }
        }

        self.cache.set_json(&key, &forecast, FORECAST_TTL).await;
        Ok(forecast)
    }

    pub async fn earnings_forecast(
        &self,
        driver_id: &str,
        days: usize,
    ) -> FleetResult<EarningsForecast> {
        self.earnings_forecast_for(driver_id, days, Utc::now().date_naive())
            .await
    }

    /// Volume x driver-share x unit-pay decomposition over the next N days,
    /// grouped into calendar weeks of seven (last group may be short).
    pub async fn earnings_forecast_for(
        &self,
        driver_id: &str,
        days: usize,
        today: NaiveDate,
    ) -> FleetResult<EarningsForecast> {
        let driver_assignments = self.db.count_driver_assignments(driver_id)?;
        let total_assignments = self.db.count_all_assignments()?;
        let driver_share = driver_assignments as f64 / total_assignments.max(1) as f64;

        let volumes = self.volume_forecast_for(days, today).await?;

        let daily_breakdown: Vec<DailyEarnings> = volumes
            .iter()
            .map(|point| {
                let packages = (point.predicted_volume as f64 * driver_share).round() as i64;
                DailyEarnings {
                    date: point.date,
                    predicted_packages: packages,
                    predicted_earnings: packages as f64 * self.payment_per_package,
                    confidence: point.confidence,
                }
            })
            .collect();

        let weekly_breakdown = weekly_rollup(&daily_breakdown);
        let total: f64 = daily_breakdown.iter().map(|d| d.predicted_earnings).sum();

        Ok(EarningsForecast {
            forecast_period_days: days,
            total_predicted_earnings: total,
            average_daily_earnings: total / days.max(1) as f64,
            payment_per_package: self.payment_per_package,
            driver_share,
            daily_breakdown,
            weekly_breakdown,
        })
    }
}

fn weekly_rollup(daily: &[DailyEarnings]) -> Vec<WeeklyEarnings> {
    daily
        .chunks(7)
        .enumerate()
        .map(|(idx, week)| WeeklyEarnings {
            week_number: idx + 1,
            start_date: week[0].date,
            end_date: week[week.len() - 1].date,
            total_packages: week.iter().map(|d| d.predicted_packages).sum(),
            total_earnings: week.iter().map(|d| d.predicted_earnings).sum(),
            days_in_week: week.len(),
        })
        .collect()
}
