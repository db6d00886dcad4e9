//! Weather passthrough endpoints (oracle absence is a null payload).

use super::AppState;
use crate::error::FleetResult;
use crate::weather::{WeatherForecastPoint, WeatherReport};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    pub city: Option<String>,
    pub days: Option<u32>,
}

pub async fn current(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> FleetResult<Json<Option<WeatherReport>>> {
    let city = query.city.unwrap_or_else(|| state.config.weather_city.clone());
    Ok(Json(state.weather.current(&city).await))
}

pub async fn forecast(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> FleetResult<Json<Option<Vec<WeatherForecastPoint>>>> {
    let city = query.city.unwrap_or_else(|| state.config.weather_city.clone());
    let days = query.days.unwrap_or(5).clamp(1, 5);
    Ok(Json(state.weather.forecast(&city, days).await))
}
