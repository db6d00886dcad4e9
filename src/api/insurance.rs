//! Insurance claim endpoints.

use super::AppState;
use crate::auth::Identity;
use crate::error::FleetResult;
use crate::insurance::{process_claim, InsuranceCalculator};
use crate::models::InsurancePayout;
use axum::{extract::State, Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
}

pub async fn claim(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<ClaimRequest>,
) -> FleetResult<Json<InsurancePayout>> {
    let calculator = InsuranceCalculator::new(state.config.insurance.clone());
    let payout = process_claim(
        &state.db,
        &calculator,
        &identity.subject,
        request.window_start,
        request.window_end,
    )?;
    Ok(Json(payout))
}

pub async fn payouts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> FleetResult<Json<Vec<InsurancePayout>>> {
    let payouts = state.db.payouts_for_driver(&identity.subject)?;
    Ok(Json(payouts))
}
