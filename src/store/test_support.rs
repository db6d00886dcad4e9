//! Shared fixtures for store tests.

use crate::models::{Driver, HealthEvent, Package, PackageStatus, RiskSeverity};
use chrono::Utc;

pub(crate) fn sample_driver(id: &str, email: &str) -> Driver {
    Driver {
        id: id.to_string(),
        name: format!("Driver {id}"),
        email: email.to_string(),
        phone: format!("+91-{email}"),
        password_hash: "x".to_string(),
        vehicle_type: "bike".to_string(),
        vehicle_capacity_kg: 50.0,
        is_active: true,
        experience_days: 365,
        total_deliveries: 100,
        successful_deliveries: 95,
        failed_deliveries: 5,
        success_rate: 0.95,
        avg_delivery_time_minutes: 28.0,
        current_latitude: Some(19.07),
        current_longitude: Some(72.87),
        fcm_token: None,
        created_at: Utc::now(),
    }
}

pub(crate) fn sample_package(id: &str, tracking: &str) -> Package {
    Package {
        id: id.to_string(),
        tracking_number: tracking.to_string(),
        status: PackageStatus::Pending,
        weight_kg: 5.0,
        is_fragile: false,
        delivery_latitude: 19.08,
        delivery_longitude: 72.88,
        delivery_address: "221B Marine Drive".to_string(),
        floor_number: 2,
        time_window_hours: Some(4.0),
        priority: 0,
        distance_from_hub_km: Some(8.0),
        created_at: Utc::now(),
    }
}

pub(crate) fn sample_health_event(id: &str, driver_id: &str) -> HealthEvent {
    HealthEvent {
        id: id.to_string(),
        driver_id: driver_id.to_string(),
        recorded_at: Utc::now(),
        heart_rate_bpm: 85,
        fatigue_level: 5,
        hours_worked: 4.0,
        hours_since_last_break: 2.0,
        packages_delivered: 10,
        packages_remaining: 8,
        total_distance_km: 30.0,
        predicted_risk_score: 0.0,
        risk_severity: RiskSeverity::Low,
        break_recommended_minutes: None,
        break_urgency: None,
        break_reason: None,
        alerted_at: None,
    }
}
