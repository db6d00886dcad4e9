//! Driver profile mutations.

use super::AppState;
use crate::error::{FleetError, FleetResult};
use crate::models::GpsLog;
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::Identity;

#[derive(Debug, Deserialize)]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
}

pub async fn update_location(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(update): Json<LocationUpdate>,
) -> FleetResult<Json<Value>> {
    if !(-90.0..=90.0).contains(&update.latitude) || !(-180.0..=180.0).contains(&update.longitude) {
        return Err(FleetError::validation("coordinates out of range"));
    }

    state
        .db
        .update_driver_location(&identity.subject, update.latitude, update.longitude)?;
    state.db.insert_gps_log(&GpsLog {
        id: Uuid::new_v4().to_string(),
        driver_id: identity.subject.clone(),
        latitude: update.latitude,
        longitude: update.longitude,
        recorded_at: Utc::now(),
    })?;

    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
pub struct FcmTokenUpdate {
    pub fcm_token: Option<String>,
}

pub async fn update_fcm_token(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(update): Json<FcmTokenUpdate>,
) -> FleetResult<Json<Value>> {
    state
        .db
        .set_fcm_token(&identity.subject, update.fcm_token.as_deref())?;
    Ok(Json(json!({ "status": "ok" })))
}

/// Admin-only. Drivers are deactivated, never deleted.
pub async fn deactivate(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(driver_id): Path<String>,
) -> FleetResult<Json<Value>> {
    if !identity.is_admin() {
        return Err(FleetError::authorization("admin access required"));
    }
    if state.db.get_driver(&driver_id)?.is_none() {
        return Err(FleetError::validation("driver not found"));
    }

    state.db.deactivate_driver(&driver_id)?;
    Ok(Json(json!({ "status": "deactivated", "driver_id": driver_id })))
}
