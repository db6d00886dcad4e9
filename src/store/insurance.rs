//! Failure statistics and insurance payout persistence.

use super::{date_str, parse_date, parse_ts, FleetDb};
use crate::models::InsurancePayout;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Row};

/// Per-driver delivery outcome counts within a claim window.
#[derive(Debug, Clone)]
pub struct DriverFailureStats {
    pub driver_id: String,
    pub failures: i64,
    pub total: i64,
}

impl DriverFailureStats {
    pub fn failure_rate(&self) -> f64 {
        self.failures as f64 / (self.total.max(1)) as f64
    }
}

fn payout_from_row(row: &Row) -> rusqlite::Result<InsurancePayout> {
    Ok(InsurancePayout {
        id: row.get(0)?,
        driver_id: row.get(1)?,
        window_start: parse_date(2, row.get(2)?)?,
        window_end: parse_date(3, row.get(3)?)?,
        driver_failure_rate: row.get(4)?,
        population_mean: row.get(5)?,
        population_std: row.get(6)?,
        z_score: row.get(7)?,
        excess_failures: row.get(8)?,
        payout_amount: row.get(9)?,
        eligible: row.get::<_, i64>(10)? != 0,
        approved: row.get::<_, i64>(11)? != 0,
        paid: row.get::<_, i64>(12)? != 0,
        reason: row.get(13)?,
        created_at: parse_ts(14, row.get(14)?)?,
    })
}

const PAYOUT_COLUMNS: &str = "id, driver_id, window_start, window_end, driver_failure_rate, \
     population_mean, population_std, z_score, excess_failures, payout_amount, \
     eligible, approved, paid, reason, created_at";

impl FleetDb {
    /// Delivery outcome counts for every driver with at least one delivery in
    /// the window (the claim population).
    pub fn population_failure_stats(
        &self,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Result<Vec<DriverFailureStats>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT a.driver_id, \
                    SUM(CASE WHEN d.success = 0 THEN 1 ELSE 0 END) AS failures, \
                    COUNT(*) AS total \
             FROM deliveries d JOIN assignments a ON a.id = d.assignment_id \
             WHERE substr(d.delivered_at, 1, 10) >= ?1 \
               AND substr(d.delivered_at, 1, 10) <= ?2 \
             GROUP BY a.driver_id ORDER BY a.driver_id",
        )?;
        let rows = stmt.query_map(
            params![date_str(window_start), date_str(window_end)],
            |row| {
                Ok(DriverFailureStats {
                    driver_id: row.get(0)?,
                    failures: row.get(1)?,
                    total: row.get(2)?,
                })
            },
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn insert_insurance_payout(&self, payout: &InsurancePayout) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO insurance_payouts (id, driver_id, window_start, window_end, \
                 driver_failure_rate, population_mean, population_std, z_score, \
                 excess_failures, payout_amount, eligible, approved, paid, reason, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    payout.id,
                    payout.driver_id,
                    date_str(payout.window_start),
                    date_str(payout.window_end),
                    payout.driver_failure_rate,
                    payout.population_mean,
                    payout.population_std,
                    payout.z_score,
                    payout.excess_failures,
                    payout.payout_amount,
                    payout.eligible as i64,
                    payout.approved as i64,
                    payout.paid as i64,
                    payout.reason,
                    payout.created_at.to_rfc3339(),
                ],
            )
            .context("insert insurance payout")?;
        Ok(())
    }

    pub fn payouts_for_driver(&self, driver_id: &str) -> Result<Vec<InsurancePayout>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM insurance_payouts \
             WHERE driver_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![driver_id], payout_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
