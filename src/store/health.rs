//! Health event persistence. Append-only, latest-wins per driver; the alert
//! dedup check happens inside the same transaction that records the alert.

use super::{parse_opt_ts, parse_ts, FleetDb};
use crate::models::{BreakPlan, HealthEvent, RiskSeverity};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Row};

fn event_from_row(row: &Row) -> rusqlite::Result<HealthEvent> {
    Ok(HealthEvent {
        id: row.get(0)?,
        driver_id: row.get(1)?,
        recorded_at: parse_ts(2, row.get(2)?)?,
        heart_rate_bpm: row.get(3)?,
        fatigue_level: row.get(4)?,
        hours_worked: row.get(5)?,
        hours_since_last_break: row.get(6)?,
        packages_delivered: row.get(7)?,
        packages_remaining: row.get(8)?,
        total_distance_km: row.get(9)?,
        predicted_risk_score: row.get(10)?,
        risk_severity: RiskSeverity::parse(&row.get::<_, String>(11)?)
            .unwrap_or(RiskSeverity::Low),
        break_recommended_minutes: row.get(12)?,
        break_urgency: row.get(13)?,
        break_reason: row.get(14)?,
        alerted_at: parse_opt_ts(15, row.get(15)?)?,
    })
}

const EVENT_COLUMNS: &str = "id, driver_id, recorded_at, heart_rate_bpm, fatigue_level, \
     hours_worked, hours_since_last_break, packages_delivered, packages_remaining, \
     total_distance_km, predicted_risk_score, risk_severity, break_recommended_minutes, \
     break_urgency, break_reason, alerted_at";

impl FleetDb {
    pub fn insert_health_event(&self, event: &HealthEvent) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO health_events (id, driver_id, recorded_at, heart_rate_bpm, \
                 fatigue_level, hours_worked, hours_since_last_break, packages_delivered, \
                 packages_remaining, total_distance_km, predicted_risk_score, risk_severity, \
                 break_recommended_minutes, break_urgency, break_reason, alerted_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    event.id,
                    event.driver_id,
                    event.recorded_at.to_rfc3339(),
                    event.heart_rate_bpm,
                    event.fatigue_level,
                    event.hours_worked,
                    event.hours_since_last_break,
                    event.packages_delivered,
                    event.packages_remaining,
                    event.total_distance_km,
                    event.predicted_risk_score,
                    event.risk_severity.as_str(),
                    event.break_recommended_minutes,
                    event.break_urgency,
                    event.break_reason,
                    event.alerted_at.map(|t| t.to_rfc3339()),
                ],
            )
            .context("insert health event")?;
        Ok(())
    }

    pub fn latest_health_event(&self, driver_id: &str) -> Result<Option<HealthEvent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {EVENT_COLUMNS} FROM health_events \
             WHERE driver_id = ?1 ORDER BY recorded_at DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query_map(params![driver_id], event_from_row)?;
        Ok(rows.next().transpose()?)
    }

    pub fn recent_health_events(&self, driver_id: &str, hours: i64) -> Result<Vec<HealthEvent>> {
        let cutoff = Utc::now() - Duration::hours(hours);
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {EVENT_COLUMNS} FROM health_events \
             WHERE driver_id = ?1 AND recorded_at >= ?2 ORDER BY recorded_at DESC"
        ))?;
        let rows = stmt.query_map(params![driver_id, cutoff.to_rfc3339()], event_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update_event_risk(
        &self,
        event_id: &str,
        risk_score: f64,
        severity: RiskSeverity,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE health_events SET predicted_risk_score = ?2, risk_severity = ?3 \
             WHERE id = ?1",
            params![event_id, risk_score, severity.as_str()],
        )?;
        Ok(())
    }

    pub fn record_break_recommendation(&self, event_id: &str, plan: &BreakPlan) -> Result<()> {
        self.conn().execute(
            "UPDATE health_events SET break_recommended_minutes = ?2, break_urgency = ?3, \
             break_reason = ?4 WHERE id = ?1",
            params![event_id, plan.duration_minutes, plan.urgency, plan.reason],
        )?;
        Ok(())
    }

    /// Alert-with-dedup: inside one transaction, check whether any alert went
    /// out to this driver in the dedup window; if not, stamp the event with
    /// the recommendation and `alerted_at`. Returns true when the caller
    /// should actually dispatch the push notification.
    ///
    /// Concurrent monitor runs serialize on the write transaction, so at most
    /// one of them sees "due" and sends.
    pub fn record_alert_if_due(
        &self,
        driver_id: &str,
        event_id: &str,
        risk_score: f64,
        severity: RiskSeverity,
        plan: &BreakPlan,
        now: DateTime<Utc>,
        dedup_minutes: i64,
    ) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("begin alert tx")?;

        let window_start = (now - Duration::minutes(dedup_minutes)).to_rfc3339();
        let recent_alerts: i64 = tx.query_row(
            "SELECT COUNT(*) FROM health_events \
             WHERE driver_id = ?1 AND alerted_at IS NOT NULL AND alerted_at >= ?2",
            params![driver_id, window_start],
            |row| row.get(0),
        )?;

        if recent_alerts > 0 {
            return Ok(false);
        }

        tx.execute(
            "UPDATE health_events SET predicted_risk_score = ?2, risk_severity = ?3, \
             break_recommended_minutes = ?4, break_urgency = ?5, break_reason = ?6, \
             alerted_at = ?7 WHERE id = ?1",
            params![
                event_id,
                risk_score,
                severity.as_str(),
                plan.duration_minutes,
                plan.urgency,
                plan.reason,
                now.to_rfc3339(),
            ],
        )?;

        tx.commit().context("commit alert tx")?;
        Ok(true)
    }

    pub fn prune_health_events(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let n = self.conn().execute(
            "DELETE FROM health_events WHERE recorded_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(n)
    }
}
