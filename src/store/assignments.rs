//! Assignment persistence: the daily batch insert, per-driver queries, and
//! the delivery-completion rollup. Every multi-row mutation is one
//! transaction; the unique (package_id, assignment_date) index is the
//! serialization point for assignment ownership.

use super::{date_str, parse_date, parse_opt_ts, parse_ts, FleetDb};
use crate::models::{Assignment, Delivery, PackageStatus};
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Row};
use tracing::debug;

/// Row produced by the daily pipeline, ready to persist.
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub id: String,
    pub driver_id: String,
    pub package_id: String,
    pub assignment_date: NaiveDate,
    pub predicted_difficulty: f64,
    pub assigned_at: chrono::DateTime<chrono::Utc>,
}

/// Completed assignment with outcome, exported nightly for retraining.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LearningRecord {
    pub assignment_id: String,
    pub driver_id: String,
    pub package_id: String,
    pub assignment_date: String,
    pub predicted_difficulty: f64,
    pub actual_difficulty: Option<f64>,
    pub actual_time_minutes: f64,
    pub success: bool,
}

pub(crate) fn assignment_from_row(row: &Row) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: row.get(0)?,
        driver_id: row.get(1)?,
        package_id: row.get(2)?,
        assignment_date: parse_date(3, row.get(3)?)?,
        predicted_difficulty: row.get(4)?,
        actual_difficulty: row.get(5)?,
        accepted: row.get::<_, i64>(6)? != 0,
        completed: row.get::<_, i64>(7)? != 0,
        failed: row.get::<_, i64>(8)? != 0,
        assigned_at: parse_ts(9, row.get(9)?)?,
        accepted_at: parse_opt_ts(10, row.get(10)?)?,
        started_at: parse_opt_ts(11, row.get(11)?)?,
        completed_at: parse_opt_ts(12, row.get(12)?)?,
        explanation_json: row.get(13)?,
    })
}

pub(crate) const ASSIGNMENT_COLUMNS: &str =
    "id, driver_id, package_id, assignment_date, predicted_difficulty, \
     actual_difficulty, accepted, completed, failed, assigned_at, accepted_at, \
     started_at, completed_at, explanation_json";

impl FleetDb {
    /// Persist the daily batch in one transaction: insert assignment rows and
    /// flip the touched packages pending -> assigned. The unique index on
    /// (package_id, assignment_date) makes a re-run for the same date a no-op
    /// per already-covered package.
    ///
    /// Returns the number of rows actually inserted.
    pub fn insert_daily_assignments(&self, rows: &[NewAssignment]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("begin assignment tx")?;

        let mut inserted = 0usize;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO assignments (id, driver_id, package_id, assignment_date, \
                 predicted_difficulty, assigned_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT (package_id, assignment_date) DO NOTHING",
            )?;
            let mut flip = tx.prepare_cached(
                "UPDATE packages SET status = 'assigned' \
                 WHERE id = ?1 AND status = 'pending'",
            )?;

            for row in rows {
                let n = insert.execute(params![
                    row.id,
                    row.driver_id,
                    row.package_id,
                    date_str(row.assignment_date),
                    row.predicted_difficulty,
                    row.assigned_at.to_rfc3339(),
                ])?;
                if n > 0 {
                    flip.execute(params![row.package_id])?;
                    inserted += 1;
                } else {
                    debug!(
                        package_id = %row.package_id,
                        date = %row.assignment_date,
                        "assignment already exists, skipping"
                    );
                }
            }
        }

        tx.commit().context("commit assignment tx")?;
        Ok(inserted)
    }

    pub fn get_assignment(&self, assignment_id: &str) -> Result<Option<Assignment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![assignment_id], assignment_from_row)?;
        Ok(rows.next().transpose()?)
    }

    pub fn get_assignment_by_package_date(
        &self,
        package_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Assignment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments \
             WHERE package_id = ?1 AND assignment_date = ?2"
        ))?;
        let mut rows = stmt.query_map(params![package_id, date_str(date)], assignment_from_row)?;
        Ok(rows.next().transpose()?)
    }

    pub fn get_driver_assignments(
        &self,
        driver_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<Assignment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments \
             WHERE driver_id = ?1 AND assignment_date = ?2 ORDER BY assigned_at"
        ))?;
        let rows = stmt.query_map(params![driver_id, date_str(date)], assignment_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn assignments_for_date(&self, date: NaiveDate) -> Result<Vec<Assignment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE assignment_date = ?1"
        ))?;
        let rows = stmt.query_map(params![date_str(date)], assignment_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_driver_assignments(&self, driver_id: &str) -> Result<i64> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare_cached("SELECT COUNT(*) FROM assignments WHERE driver_id = ?1")?;
        Ok(stmt.query_row(params![driver_id], |row| row.get(0))?)
    }

    pub fn count_all_assignments(&self) -> Result<i64> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached("SELECT COUNT(*) FROM assignments")?;
        Ok(stmt.query_row([], |row| row.get(0))?)
    }

    pub fn accept_assignment(&self, assignment_id: &str, accepted_at: chrono::DateTime<chrono::Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE assignments SET accepted = 1, accepted_at = ?2 \
             WHERE id = ?1 AND completed = 0 AND failed = 0",
            params![assignment_id, accepted_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn set_assignment_explanation(&self, assignment_id: &str, explanation_json: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE assignments SET explanation_json = ?2 WHERE id = ?1",
            params![assignment_id, explanation_json],
        )?;
        Ok(())
    }

    /// Record a delivery outcome. One transaction covering: the delivery row,
    /// the assignment's terminal transition, the package's terminal status,
    /// and the driver's rolled-up totals (success_rate = successful/total).
    pub fn record_delivery(&self, delivery: &Delivery, actual_difficulty: Option<f64>) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("begin delivery tx")?;

        let (driver_id, package_id, completed, failed): (String, String, i64, i64) = tx
            .query_row(
                "SELECT driver_id, package_id, completed, failed FROM assignments WHERE id = ?1",
                params![delivery.assignment_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .with_context(|| format!("assignment {} not found", delivery.assignment_id))?;

        if completed != 0 || failed != 0 {
            bail!("assignment {} already finalized", delivery.assignment_id);
        }

        tx.execute(
            "INSERT INTO deliveries (id, assignment_id, delivered_at, actual_time_minutes, \
             success, failure_reason) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                delivery.id,
                delivery.assignment_id,
                delivery.delivered_at.to_rfc3339(),
                delivery.actual_time_minutes,
                delivery.success as i64,
                delivery.failure_reason,
            ],
        )?;

        tx.execute(
            "UPDATE assignments SET completed = ?2, failed = ?3, completed_at = ?4, \
             actual_difficulty = ?5 WHERE id = ?1",
            params![
                delivery.assignment_id,
                delivery.success as i64,
                (!delivery.success) as i64,
                delivery.delivered_at.to_rfc3339(),
                actual_difficulty,
            ],
        )?;

        let package_status = if delivery.success {
            PackageStatus::Delivered
        } else {
            PackageStatus::Failed
        };
        tx.execute(
            "UPDATE packages SET status = ?2 WHERE id = ?1",
            params![package_id, package_status.as_str()],
        )?;

        // Rolled-up driver aggregates; success_rate stays successful/total.
        tx.execute(
            "UPDATE drivers SET \
             total_deliveries = total_deliveries + 1, \
             successful_deliveries = successful_deliveries + ?2, \
             failed_deliveries = failed_deliveries + ?3, \
             success_rate = CAST(successful_deliveries + ?2 AS REAL) / (total_deliveries + 1), \
             avg_delivery_time_minutes = \
                 (avg_delivery_time_minutes * total_deliveries + ?4) / (total_deliveries + 1) \
             WHERE id = ?1",
            params![
                driver_id,
                delivery.success as i64,
                (!delivery.success) as i64,
                delivery.actual_time_minutes,
            ],
        )?;

        tx.commit().context("commit delivery tx")?;
        Ok(())
    }

    /// Completed assignments with their delivery outcomes, for the nightly
    /// learning export.
    pub fn learning_records_since(&self, since: NaiveDate) -> Result<Vec<LearningRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT a.id, a.driver_id, a.package_id, a.assignment_date, \
             a.predicted_difficulty, a.actual_difficulty, d.actual_time_minutes, d.success \
             FROM assignments a JOIN deliveries d ON d.assignment_id = a.id \
             WHERE a.assignment_date >= ?1 ORDER BY a.assignment_date",
        )?;
        let rows = stmt.query_map(params![date_str(since)], |row| {
            Ok(LearningRecord {
                assignment_id: row.get(0)?,
                driver_id: row.get(1)?,
                package_id: row.get(2)?,
                assignment_date: row.get(3)?,
                predicted_difficulty: row.get(4)?,
                actual_difficulty: row.get(5)?,
                actual_time_minutes: row.get(6)?,
                success: row.get::<_, i64>(7)? != 0,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
