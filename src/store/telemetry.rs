//! GPS telemetry (append-only, retention-bound) and fleet-wide rollups.

use super::{date_str, FleetDb};
use crate::models::GpsLog;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::params;

/// Admin dashboard rollup.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FleetSummary {
    pub active_drivers: i64,
    pub total_drivers: i64,
    pub packages_by_status: Vec<(String, i64)>,
    pub assignments_today: i64,
    pub pending_swaps: i64,
}

impl FleetDb {
    pub fn insert_gps_log(&self, log: &GpsLog) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO gps_logs (id, driver_id, latitude, longitude, recorded_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    log.id,
                    log.driver_id,
                    log.latitude,
                    log.longitude,
                    log.recorded_at.to_rfc3339(),
                ],
            )
            .context("insert gps log")?;
        Ok(())
    }

    pub fn prune_gps_logs(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let n = self.conn().execute(
            "DELETE FROM gps_logs WHERE recorded_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(n)
    }

    pub fn fleet_summary(&self, today: NaiveDate) -> Result<FleetSummary> {
        let packages_by_status = self.count_packages_by_status()?;
        let conn = self.conn();

        let active_drivers: i64 =
            conn.query_row("SELECT COUNT(*) FROM drivers WHERE is_active = 1", [], |r| {
                r.get(0)
            })?;
        let total_drivers: i64 =
            conn.query_row("SELECT COUNT(*) FROM drivers", [], |r| r.get(0))?;
        let assignments_today: i64 = conn.query_row(
            "SELECT COUNT(*) FROM assignments WHERE assignment_date = ?1",
            params![date_str(today)],
            |r| r.get(0),
        )?;
        let pending_swaps: i64 = conn.query_row(
            "SELECT COUNT(*) FROM swaps WHERE status = 'pending'",
            [],
            |r| r.get(0),
        )?;

        Ok(FleetSummary {
            active_drivers,
            total_drivers,
            packages_by_status,
            assignments_today,
            pending_swaps,
        })
    }
}
