//! HTTP façade: thin axum handlers over the domain services.

pub mod admin;
pub mod assignments;
pub mod auth;
pub mod drivers;
pub mod forecast;
pub mod health;
pub mod insurance;
pub mod swaps;
pub mod weather;
pub mod ws;

use crate::auth::{auth_middleware, JwtHandler};
use crate::cache::Cache;
use crate::config::Config;
use crate::connections::ConnectionRegistry;
use crate::forecast::ForecastService;
use crate::middleware::{rate_limit_middleware, RateLimiter};
use crate::ml::ModelRegistry;
use crate::notify::PushDispatcher;
use crate::store::FleetDb;
use crate::swap::SwapService;
use crate::weather::WeatherOracle;
use axum::{
    middleware as axum_mw,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: FleetDb,
    pub registry: Arc<ModelRegistry>,
    pub connections: Arc<ConnectionRegistry>,
    pub jwt: Arc<JwtHandler>,
    pub cache: Cache,
    pub weather: Arc<WeatherOracle>,
    pub notifier: Arc<dyn PushDispatcher>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn swap_service(&self) -> SwapService {
        SwapService::new(
            self.db.clone(),
            self.config.swap.clone(),
            self.notifier.clone(),
        )
    }

    pub fn forecast_service(&self) -> ForecastService {
        ForecastService::new(
            self.db.clone(),
            self.registry.clone(),
            self.cache.clone(),
            self.weather.clone(),
            self.config.weather_city.clone(),
            self.config.payment_per_package,
        )
    }
}

async fn health_check() -> &'static str {
    "🚚 FleetFair operational"
}

pub fn router(state: AppState, limiter: RateLimiter) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route_layer(axum_mw::from_fn_with_state(
            limiter.clone(),
            rate_limit_middleware,
        ))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/drivers/me/location", put(drivers::update_location))
        .route("/api/drivers/me/fcm-token", put(drivers::update_fcm_token))
        .route("/api/drivers/:id/deactivate", post(drivers::deactivate))
        .route("/api/assignments", get(assignments::list_for_day))
        .route(
            "/api/assignments/predict-difficulty",
            post(assignments::predict_difficulty),
        )
        .route("/api/assignments/:id/accept", post(assignments::accept))
        .route(
            "/api/assignments/:id/explanation",
            get(assignments::explanation),
        )
        .route("/api/assignments/:id/delivery", post(assignments::record_delivery))
        .route("/api/health/vitals", post(health::record_vitals))
        .route("/api/health/risk", get(health::current_risk))
        .route("/api/health/break", get(health::break_recommendation))
        .route("/api/health/history", get(health::history))
        .route("/api/forecast/volume", get(forecast::volume))
        .route("/api/forecast/earnings", get(forecast::earnings))
        .route("/api/swaps", post(swaps::propose))
        .route("/api/swaps/marketplace", get(swaps::marketplace))
        .route("/api/swaps/:id/accept", post(swaps::accept))
        .route("/api/swaps/:id/cancel", post(swaps::cancel))
        .route("/api/insurance/claims", post(insurance::claim))
        .route("/api/insurance/payouts", get(insurance::payouts))
        .route("/api/weather/current", get(weather::current))
        .route("/api/weather/forecast", get(weather::forecast))
        .route("/api/admin/summary", get(admin::summary))
        .route("/ws/:driver_id", get(ws::upgrade))
        // Layer order: auth (added last, outermost) runs first, so the rate
        // limiter can key on the authenticated subject.
        .route_layer(axum_mw::from_fn_with_state(limiter, rate_limit_middleware))
        .route_layer(axum_mw::from_fn_with_state(
            state.jwt.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}
