//! Registration, login, and caller introspection.

use super::AppState;
use crate::auth::{login_driver, register_driver, Identity, LoginRequest, RegisterRequest, TokenResponse};
use crate::error::{FleetError, FleetResult};
use crate::models::Driver;
use axum::{extract::State, Extension, Json};

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> FleetResult<Json<Driver>> {
    let driver = register_driver(&state.db, request)?;
    Ok(Json(driver))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> FleetResult<Json<TokenResponse>> {
    let token = login_driver(&state.db, &state.jwt, &state.config.admin_emails, &request)?;
    Ok(Json(token))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> FleetResult<Json<Driver>> {
    let driver = state
        .db
        .get_driver(&identity.subject)?
        .ok_or_else(|| FleetError::validation("driver not found"))?;
    Ok(Json(driver))
}
