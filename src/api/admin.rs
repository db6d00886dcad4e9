//! Admin rollups.

use super::AppState;
use crate::auth::Identity;
use crate::error::{FleetError, FleetResult};
use crate::store::FleetSummary;
use axum::{extract::State, Extension, Json};
use chrono::Utc;
use serde_json::{json, Value};

pub async fn summary(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> FleetResult<Json<Value>> {
    if !identity.is_admin() {
        return Err(FleetError::authorization("admin access required"));
    }

    let summary: FleetSummary = state.db.fleet_summary(Utc::now().date_naive())?;
    Ok(Json(json!({
        "fleet": summary,
        "models_ready": state.registry.ready(),
        "live_connections": state.connections.active_count(),
    })))
}
