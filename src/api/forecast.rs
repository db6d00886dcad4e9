//! Volume and earnings forecast endpoints.

use super::AppState;
use crate::auth::Identity;
use crate::error::{FleetError, FleetResult};
use crate::forecast::EarningsForecast;
use crate::ml::VolumePoint;
use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;

const MAX_FORECAST_DAYS: usize = 90;

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub days: Option<usize>,
}

fn bounded_days(query: &ForecastQuery, default: usize) -> FleetResult<usize> {
    let days = query.days.unwrap_or(default);
    if days == 0 || days > MAX_FORECAST_DAYS {
        return Err(FleetError::validation(format!(
            "days must be between 1 and {MAX_FORECAST_DAYS}"
        )));
    }
    Ok(days)
}

pub async fn volume(
    State(state): State<AppState>,
    Query(query): Query<ForecastQuery>,
) -> FleetResult<Json<Vec<VolumePoint>>> {
    let days = bounded_days(&query, 7)?;
    let forecast = state.forecast_service().volume_forecast(days).await?;
    Ok(Json(forecast))
}

pub async fn earnings(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ForecastQuery>,
) -> FleetResult<Json<EarningsForecast>> {
    let days = bounded_days(&query, 30)?;
    let forecast = state
        .forecast_service()
        .earnings_forecast(&identity.subject, days)
        .await?;
    Ok(Json(forecast))
}
