//! Assignment queries, on-demand difficulty prediction, explanations, and
//! delivery outcomes.

use super::AppState;
use crate::auth::Identity;
use crate::error::{FleetError, FleetResult};
use crate::ml::{DifficultyExplainer, DifficultyScorer, Explanation};
use crate::models::{Assignment, Delivery, DriverFeatures, PackageFeatures};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub date: Option<NaiveDate>,
}

pub async fn list_for_day(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<DayQuery>,
) -> FleetResult<Json<Vec<Assignment>>> {
    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let assignments = state.db.get_driver_assignments(&identity.subject, date)?;
    Ok(Json(assignments))
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    /// Defaults to the caller.
    pub driver_id: Option<String>,
    pub package: PackageFeatures,
}

pub async fn predict_difficulty(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<PredictRequest>,
) -> FleetResult<Json<Value>> {
    let driver_id = request.driver_id.unwrap_or_else(|| identity.subject.clone());
    if !identity.can_act_for(&driver_id) {
        return Err(FleetError::authorization("cannot predict for another driver"));
    }

    let driver = state
        .db
        .get_driver(&driver_id)?
        .ok_or_else(|| FleetError::validation("driver not found"))?;

    let scorer = DifficultyScorer::new(state.registry.clone());
    let difficulty = scorer.score(&DriverFeatures::from(&driver), &request.package);

    Ok(Json(json!({ "driver_id": driver_id, "difficulty": difficulty })))
}

pub async fn accept(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(assignment_id): Path<String>,
) -> FleetResult<Json<Assignment>> {
    let assignment = owned_assignment(&state, &identity, &assignment_id)?;
    if assignment.is_terminal() {
        return Err(FleetError::validation("assignment already finalized"));
    }

    state.db.accept_assignment(&assignment_id, Utc::now())?;
    let updated = state
        .db
        .get_assignment(&assignment_id)?
        .ok_or_else(|| FleetError::validation("assignment disappeared"))?;
    Ok(Json(updated))
}

/// Serve the cached explanation, computing and persisting it on first read.
pub async fn explanation(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(assignment_id): Path<String>,
) -> FleetResult<Json<Explanation>> {
    let assignment = owned_assignment(&state, &identity, &assignment_id)?;

    if let Some(raw) = assignment.explanation_json.as_deref() {
        if let Ok(explanation) = serde_json::from_str::<Explanation>(raw) {
            return Ok(Json(explanation));
        }
    }

    let driver = state
        .db
        .get_driver(&assignment.driver_id)?
        .ok_or_else(|| FleetError::validation("driver not found"))?;
    let package = state
        .db
        .get_package(&assignment.package_id)?
        .ok_or_else(|| FleetError::validation("package not found"))?;

    let explainer = DifficultyExplainer::new(state.registry.clone());
    let explanation = explainer.explain(
        &DriverFeatures::from(&driver),
        &PackageFeatures::from(&package),
        assignment.predicted_difficulty,
    );

    if let Ok(raw) = serde_json::to_string(&explanation) {
        state.db.set_assignment_explanation(&assignment_id, &raw)?;
    }
    Ok(Json(explanation))
}

#[derive(Debug, Deserialize)]
pub struct DeliveryOutcome {
    pub actual_time_minutes: f64,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub actual_difficulty: Option<f64>,
}

pub async fn record_delivery(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(assignment_id): Path<String>,
    Json(outcome): Json<DeliveryOutcome>,
) -> FleetResult<Json<Value>> {
    let assignment = owned_assignment(&state, &identity, &assignment_id)?;
    if assignment.is_terminal() {
        return Err(FleetError::validation("assignment already finalized"));
    }
    if !outcome.success && outcome.failure_reason.is_none() {
        return Err(FleetError::validation("failed delivery requires a reason"));
    }

    let delivery = Delivery {
        id: Uuid::new_v4().to_string(),
        assignment_id: assignment_id.clone(),
        delivered_at: Utc::now(),
        actual_time_minutes: outcome.actual_time_minutes,
        success: outcome.success,
        failure_reason: outcome.failure_reason,
    };
    state
        .db
        .record_delivery(&delivery, outcome.actual_difficulty)?;

    Ok(Json(json!({ "status": "recorded", "delivery_id": delivery.id })))
}

fn owned_assignment(
    state: &AppState,
    identity: &Identity,
    assignment_id: &str,
) -> FleetResult<Assignment> {
    let assignment = state
        .db
        .get_assignment(assignment_id)?
        .ok_or_else(|| FleetError::validation("assignment not found"))?;
    if !identity.can_act_for(&assignment.driver_id) {
        return Err(FleetError::authorization("assignment belongs to another driver"));
    }
    Ok(assignment)
}
