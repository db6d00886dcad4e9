//! Swap marketplace endpoints.

use super::AppState;
use crate::auth::Identity;
use crate::error::FleetResult;
use crate::models::Swap;
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ProposeRequest {
    pub offered_package_id: String,
    pub requested_package_id: String,
    pub reason: Option<String>,
}

pub async fn propose(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<ProposeRequest>,
) -> FleetResult<Json<Swap>> {
    let swap = state
        .swap_service()
        .propose(
            &identity.subject,
            &request.offered_package_id,
            &request.requested_package_id,
            request.reason,
            Utc::now().date_naive(),
        )
        .await?;
    Ok(Json(swap))
}

pub async fn marketplace(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> FleetResult<Json<Vec<Swap>>> {
    let swaps = state.swap_service().marketplace(&identity.subject)?;
    Ok(Json(swaps))
}

pub async fn accept(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(swap_id): Path<String>,
) -> FleetResult<Json<Swap>> {
    let swap = state
        .swap_service()
        .accept(&swap_id, &identity.subject, Utc::now().date_naive())
        .await?;
    Ok(Json(swap))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(swap_id): Path<String>,
) -> FleetResult<Json<Swap>> {
    let swap = state.swap_service().cancel(&swap_id, &identity.subject)?;
    Ok(Json(swap))
}
