//! Driver registration and login against the fleet store.

use super::jwt::JwtHandler;
use super::models::Role;
use crate::error::{FleetError, FleetResult};
use crate::models::Driver;
use crate::store::FleetDb;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub vehicle_type: String,
    pub vehicle_capacity_kg: f64,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: usize,
    pub driver_id: String,
    pub role: Role,
}

pub fn register_driver(db: &FleetDb, request: RegisterRequest) -> FleetResult<Driver> {
    if request.password.len() < 8 {
        return Err(FleetError::validation("password must be at least 8 characters"));
    }
    if !request.email.contains('@') {
        return Err(FleetError::validation("invalid email address"));
    }
    if db.get_driver_by_email(&request.email)?.is_some() {
        return Err(FleetError::validation("email already registered"));
    }

    let password_hash = hash(&request.password, DEFAULT_COST)
        .map_err(|e| FleetError::Internal(anyhow::Error::new(e)))?;

    let driver = Driver {
        id: Uuid::new_v4().to_string(),
        name: request.name,
        email: request.email,
        phone: request.phone,
        password_hash,
        vehicle_type: request.vehicle_type,
        vehicle_capacity_kg: request.vehicle_capacity_kg,
        is_active: true,
        experience_days: 0,
        total_deliveries: 0,
        successful_deliveries: 0,
        failed_deliveries: 0,
        success_rate: 1.0,
        avg_delivery_time_minutes: 30.0,
        current_latitude: None,
        current_longitude: None,
        fcm_token: None,
        created_at: Utc::now(),
    };
    db.create_driver(&driver)?;

    info!("🚚 Driver registered: {} ({})", driver.name, driver.id);
    Ok(driver)
}

/// Verify the secret and issue a bearer token. The admin check is a separate
/// lookup against the configured admin list.
pub fn login_driver(
    db: &FleetDb,
    jwt: &JwtHandler,
    admin_emails: &[String],
    request: &LoginRequest,
) -> FleetResult<TokenResponse> {
    let driver = db
        .get_driver_by_email(&request.email)?
        .ok_or_else(|| FleetError::authorization("invalid credentials"))?;

    let valid = verify(&request.password, &driver.password_hash)
        .map_err(|e| FleetError::Internal(anyhow::Error::new(e)))?;
    if !valid {
        return Err(FleetError::authorization("invalid credentials"));
    }
    if !driver.is_active {
        return Err(FleetError::authorization("account deactivated"));
    }

    let role = if admin_emails.iter().any(|e| e == &driver.email) {
        Role::Admin
    } else {
        Role::Driver
    };

    let (access_token, expires_in) = jwt
        .generate_token(&driver.id, role)
        .map_err(FleetError::Internal)?;

    Ok(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        expires_in,
        driver_id: driver.id,
        role,
    })
}
