//! Weather oracle contract and the OpenWeather client behind it.
//! Unavailable weather is normal: callers get None and carry on.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

const WEATHER_TIMEOUT: Duration = Duration::from_secs(5);
const CURRENT_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherReport {
    pub temperature_c: f64,
    pub humidity: f64,
    pub wind_speed_mps: f64,
    pub description: String,
    pub city: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherForecastPoint {
    pub timestamp: String,
    pub temperature_c: f64,
    pub description: String,
    pub wind_speed_mps: f64,
}

pub struct WeatherOracle {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl WeatherOracle {
    pub fn new(api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(WEATHER_TIMEOUT)
            .build()
            .unwrap_or_default();
        if api_key.is_none() {
            warn!("⚠️  Weather API key not configured - forecasts run unadjusted");
        }
        Self { client, api_key }
    }

    /// Current conditions, or None when the oracle is unavailable.
    pub async fn current(&self, city: &str) -> Option<WeatherReport> {
        let api_key = self.api_key.as_deref()?;

        let response = self
            .client
            .get(CURRENT_URL)
            .query(&[("q", city), ("appid", api_key), ("units", "metric")])
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!("weather oracle error: {}", r.status());
                return None;
            }
            Err(e) => {
                warn!("weather oracle unreachable (non-critical): {e}");
                return None;
            }
        };

        let data: serde_json::Value = response.json().await.ok()?;
        let report = WeatherReport {
            temperature_c: data["main"]["temp"].as_f64()?,
            humidity: data["main"]["humidity"].as_f64().unwrap_or(0.0),
            wind_speed_mps: data["wind"]["speed"].as_f64().unwrap_or(0.0),
            description: data["weather"][0]["description"]
                .as_str()
                .unwrap_or("")
                .to_string(),
            city: city.to_string(),
        };
        info!(
            "🌦️  Weather for {}: {:.1}C, {}",
            city, report.temperature_c, report.description
        );
        Some(report)
    }

    /// 3-hourly forecast points for up to `days` days (max 5).
    pub async fn forecast(&self, city: &str, days: u32) -> Option<Vec<WeatherForecastPoint>> {
        let api_key = self.api_key.as_deref()?;
        let count = (days.min(5) * 8).to_string();

        let response = self
            .client
            .get(FORECAST_URL)
            .query(&[
                ("q", city),
                ("appid", api_key),
                ("units", "metric"),
                ("cnt", count.as_str()),
            ])
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            warn!("weather forecast error: {}", response.status());
            return None;
        }

        let data: serde_json::Value = response.json().await.ok()?;
        let points = data["list"]
            .as_array()?
            .iter()
            .filter_map(|item| {
                Some(WeatherForecastPoint {
                    timestamp: item["dt_txt"].as_str()?.to_string(),
                    temperature_c: item["main"]["temp"].as_f64()?,
                    description: item["weather"][0]["description"]
                        .as_str()
                        .unwrap_or("")
                        .to_string(),
                    wind_speed_mps: item["wind"]["speed"].as_f64().unwrap_or(0.0),
                })
            })
            .collect();
        Some(points)
    }
}

/// Demand multiplier for a volume forecast. Bad weather means more orders;
/// clamped to [0.5, 1.5].
pub fn impact_factor(weather: Option<&WeatherReport>) -> f64 {
    let Some(weather) = weather else {
        return 1.0;
    };

    let mut impact: f64 = 1.0;
    let description = weather.description.to_lowercase();

    if description.contains("storm") || description.contains("thunder") {
        impact += 0.3;
    } else if description.contains("rain") || description.contains("drizzle") {
        impact += 0.2;
    }

    if weather.wind_speed_mps > 15.0 {
        impact += 0.1;
    }
    if weather.temperature_c > 35.0 || weather.temperature_c < 10.0 {
        impact += 0.15;
    }

    impact.clamp(0.5, 1.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(description: &str, temp: f64, wind: f64) -> WeatherReport {
        WeatherReport {
            temperature_c: temp,
            humidity: 60.0,
            wind_speed_mps: wind,
            description: description.to_string(),
            city: "Mumbai".to_string(),
        }
    }

    #[test]
    fn missing_weather_is_neutral() {
        assert_eq!(impact_factor(None), 1.0);
    }

    #[test]
    fn rain_and_heat_stack() {
        let mild = report("clear sky", 25.0, 3.0);
        assert_eq!(impact_factor(Some(&mild)), 1.0);

        let rainy = report("light rain", 25.0, 3.0);
        assert!((impact_factor(Some(&rainy)) - 1.2).abs() < 1e-12);

        let monsoon = report("thunderstorm", 38.0, 18.0);
        // 1.0 + 0.3 + 0.1 + 0.15 clamps at the ceiling.
        assert_eq!(impact_factor(Some(&monsoon)), 1.5);
    }

    #[tokio::test]
    async fn no_api_key_short_circuits() {
        let oracle = WeatherOracle::new(None);
        assert!(oracle.current("Mumbai").await.is_none());
        assert!(oracle.forecast("Mumbai", 3).await.is_none());
    }
}
