//! Health vitals intake, risk scoring, and break recommendations.

use super::AppState;
use crate::auth::Identity;
use crate::error::{FleetError, FleetResult};
use crate::ml::{health::severity_for, HealthScorer, NEUTRAL_DIFFICULTY};
use crate::models::{HealthEvent, HealthVitals, RiskSeverity, WorkloadSnapshot};
use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct VitalsRequest {
    pub heart_rate_bpm: i64,
    pub fatigue_level: i64,
    pub hours_worked: f64,
    pub hours_since_last_break: f64,
    pub packages_delivered: i64,
    pub packages_remaining: i64,
    pub total_distance_km: f64,
}

/// Record a vitals sample and score it immediately.
pub async fn record_vitals(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<VitalsRequest>,
) -> FleetResult<Json<Value>> {
    if !(1..=10).contains(&request.fatigue_level) {
        return Err(FleetError::validation("fatigue_level must be 1-10"));
    }
    if !(20..=250).contains(&request.heart_rate_bpm) {
        return Err(FleetError::validation("heart_rate_bpm out of range"));
    }
    if request.hours_worked < 0.0 || request.hours_since_last_break < 0.0 {
        return Err(FleetError::validation("hours must be non-negative"));
    }

    let scorer = HealthScorer::new(state.registry.clone());
    let risk_score = scorer.risk_score(
        &HealthVitals {
            heart_rate_bpm: request.heart_rate_bpm as f64,
            fatigue_level: request.fatigue_level as f64,
            hours_worked: request.hours_worked,
            hours_since_last_break: request.hours_since_last_break,
        },
        &WorkloadSnapshot {
            packages_delivered: request.packages_delivered as f64,
            packages_remaining: request.packages_remaining as f64,
            total_distance_km: request.total_distance_km,
            avg_package_difficulty: NEUTRAL_DIFFICULTY,
        },
    );
    let severity = severity_for(risk_score);

    let event = HealthEvent {
        id: Uuid::new_v4().to_string(),
        driver_id: identity.subject.clone(),
        recorded_at: Utc::now(),
        heart_rate_bpm: request.heart_rate_bpm,
        fatigue_level: request.fatigue_level,
        hours_worked: request.hours_worked,
        hours_since_last_break: request.hours_since_last_break,
        packages_delivered: request.packages_delivered,
        packages_remaining: request.packages_remaining,
        total_distance_km: request.total_distance_km,
        predicted_risk_score: risk_score,
        risk_severity: severity,
        break_recommended_minutes: None,
        break_urgency: None,
        break_reason: None,
        alerted_at: None,
    };
    state.db.insert_health_event(&event)?;

    Ok(Json(json!({
        "event_id": event.id,
        "risk_score": risk_score,
        "severity": severity.as_str(),
    })))
}

pub async fn current_risk(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> FleetResult<Json<Value>> {
    let (event, risk_score, severity) = rescore_latest(&state, &identity.subject)?;
    state.db.update_event_risk(&event.id, risk_score, severity)?;

    Ok(Json(json!({
        "driver_id": identity.subject,
        "risk_score": risk_score,
        "severity": severity.as_str(),
        "recorded_at": event.recorded_at,
    })))
}

pub async fn break_recommendation(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> FleetResult<Json<Value>> {
    let (event, risk_score, severity) = rescore_latest(&state, &identity.subject)?;
    state.db.update_event_risk(&event.id, risk_score, severity)?;

    let scorer = HealthScorer::new(state.registry.clone());
    let remaining_difficulty = event.packages_remaining as f64 * NEUTRAL_DIFFICULTY;
    let plan = scorer.recommend_break(risk_score, remaining_difficulty, event.hours_worked);

    if let Some(plan) = &plan {
        state.db.record_break_recommendation(&event.id, plan)?;
    }

    Ok(Json(json!({
        "driver_id": identity.subject,
        "risk_score": risk_score,
        "severity": severity.as_str(),
        "should_break": plan.is_some(),
        "recommendation": plan,
    })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<i64>,
}

pub async fn history(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<HistoryQuery>,
) -> FleetResult<Json<Vec<HealthEvent>>> {
    let days = query.days.unwrap_or(7).clamp(1, 90);
    let events = state.db.recent_health_events(&identity.subject, days * 24)?;
    Ok(Json(events))
}

fn rescore_latest(
    state: &AppState,
    driver_id: &str,
) -> FleetResult<(HealthEvent, f64, RiskSeverity)> {
    let event = state
        .db
        .latest_health_event(driver_id)?
        .ok_or_else(|| FleetError::validation("no health data available"))?;

    let scorer = HealthScorer::new(state.registry.clone());
    let risk_score = scorer.risk_score(
        &HealthVitals {
            heart_rate_bpm: event.heart_rate_bpm as f64,
            fatigue_level: event.fatigue_level as f64,
            hours_worked: event.hours_worked,
            hours_since_last_break: event.hours_since_last_break,
        },
        &WorkloadSnapshot {
            packages_delivered: event.packages_delivered as f64,
            packages_remaining: event.packages_remaining as f64,
            total_distance_km: event.total_distance_km,
            avg_package_difficulty: NEUTRAL_DIFFICULTY,
        },
    );
    let severity = severity_for(risk_score);
    Ok((event, risk_score, severity))
}
