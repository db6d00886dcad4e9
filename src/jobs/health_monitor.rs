//! Health monitor sweep: re-score every active driver's latest vitals,
//! advise breaks, and alert with a 15-minute dedup window.

use super::JobContext;
use crate::ml::{health::severity_for, HealthScorer, NEUTRAL_DIFFICULTY};
use crate::models::{HealthVitals, ServerMessage, WorkloadSnapshot};
use anyhow::Result;
use chrono::Utc;
use metrics::counter;
use std::collections::HashMap;
use tracing::{debug, info};

pub async fn run(ctx: JobContext) -> Result<()> {
    debug!("💓 Running health monitoring check...");

    let drivers = ctx.db.get_active_drivers()?;
    if drivers.is_empty() {
        return Ok(());
    }

    let scorer = HealthScorer::new(ctx.registry.clone());
    let mut alerts_sent = 0usize;

    for driver in &drivers {
        let Some(event) = ctx.db.latest_health_event(&driver.id)? else {
            continue;
        };

        let vitals = HealthVitals {
            heart_rate_bpm: event.heart_rate_bpm as f64,
            fatigue_level: event.fatigue_level as f64,
            hours_worked: event.hours_worked,
            hours_since_last_break: event.hours_since_last_break,
        };
        let workload = WorkloadSnapshot {
            packages_delivered: event.packages_delivered as f64,
            packages_remaining: event.packages_remaining as f64,
            total_distance_km: event.total_distance_km,
            avg_package_difficulty: NEUTRAL_DIFFICULTY,
        };

        let risk_score = scorer.risk_score(&vitals, &workload);
        let severity = severity_for(risk_score);
        ctx.db.update_event_risk(&event.id, risk_score, severity)?;

        if risk_score < ctx.config.health.risk_threshold_yellow {
            continue;
        }

        let remaining_difficulty = event.packages_remaining as f64 * NEUTRAL_DIFFICULTY;
        let Some(plan) = scorer.recommend_break(risk_score, remaining_difficulty, event.hours_worked)
        else {
            continue;
        };

        // Dedup check and recommendation write share one transaction, so
        // overlapping sweeps cannot double-alert.
        let due = ctx.db.record_alert_if_due(
            &driver.id,
            &event.id,
            risk_score,
            severity,
            &plan,
            Utc::now(),
            ctx.config.health.alert_dedup_minutes,
        )?;
        if !due {
            continue;
        }

        ctx.connections.send(
            &driver.id,
            ServerMessage::BreakRecommendation {
                risk_score,
                severity: severity.as_str().to_string(),
                duration_minutes: plan.duration_minutes,
                urgency: plan.urgency.clone(),
                reason: plan.reason.clone(),
            },
        );

        if let Some(token) = driver.fcm_token.as_deref() {
            let mut data = HashMap::new();
            data.insert("type".to_string(), "health_alert".to_string());
            data.insert("risk_score".to_string(), format!("{risk_score:.1}"));
            data.insert(
                "break_duration".to_string(),
                plan.duration_minutes.to_string(),
            );
            ctx.notifier
                .send(
                    token,
                    "⚠️ Health Alert",
                    &format!(
                        "Hi {}, your health risk is {:.1}. Take a {} min break.",
                        driver.name, risk_score, plan.duration_minutes
                    ),
                    data,
                )
                .await;
        }

        alerts_sent += 1;
        info!(
            "⚠️  Health alert for driver {}: risk={:.1}, break={}min",
            driver.id, risk_score, plan.duration_minutes
        );
    }

    if alerts_sent > 0 {
        counter!("health_alerts_sent_total", alerts_sent as u64);
        info!("✅ Sent {alerts_sent} health alerts");
    }
    Ok(())
}
