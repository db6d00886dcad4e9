//! Package queries and status transitions.

use super::{parse_ts, FleetDb};
use crate::models::{Package, PackageStatus};
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Row};

fn package_from_row(row: &Row) -> rusqlite::Result<Package> {
    let status_raw: String = row.get(2)?;
    Ok(Package {
        id: row.get(0)?,
        tracking_number: row.get(1)?,
        status: PackageStatus::parse(&status_raw).unwrap_or(PackageStatus::Pending),
        weight_kg: row.get(3)?,
        is_fragile: row.get::<_, i64>(4)? != 0,
        delivery_latitude: row.get(5)?,
        delivery_longitude: row.get(6)?,
        delivery_address: row.get(7)?,
        floor_number: row.get(8)?,
        time_window_hours: row.get(9)?,
        priority: row.get(10)?,
        distance_from_hub_km: row.get(11)?,
        created_at: parse_ts(12, row.get(12)?)?,
    })
}

const PACKAGE_COLUMNS: &str = "id, tracking_number, status, weight_kg, is_fragile, \
     delivery_latitude, delivery_longitude, delivery_address, floor_number, \
     time_window_hours, priority, distance_from_hub_km, created_at";

impl FleetDb {
    pub fn create_package(&self, package: &Package) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO packages (id, tracking_number, status, weight_kg, is_fragile, \
                 delivery_latitude, delivery_longitude, delivery_address, floor_number, \
                 time_window_hours, priority, distance_from_hub_km, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    package.id,
                    package.tracking_number,
                    package.status.as_str(),
                    package.weight_kg,
                    package.is_fragile as i64,
                    package.delivery_latitude,
                    package.delivery_longitude,
                    package.delivery_address,
                    package.floor_number,
                    package.time_window_hours,
                    package.priority,
                    package.distance_from_hub_km,
                    package.created_at.to_rfc3339(),
                ],
            )
            .context("insert package")?;
        Ok(())
    }

    pub fn get_package(&self, package_id: &str) -> Result<Option<Package>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {PACKAGE_COLUMNS} FROM packages WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![package_id], package_from_row)?;
        Ok(rows.next().transpose()?)
    }

    pub fn get_pending_packages(&self) -> Result<Vec<Package>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {PACKAGE_COLUMNS} FROM packages WHERE status = 'pending' ORDER BY priority DESC, created_at"
        ))?;
        let rows = stmt.query_map([], package_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Status transition with terminal-state protection.
    pub fn update_package_status(&self, package_id: &str, to: PackageStatus) -> Result<()> {
        let current = self
            .get_package(package_id)?
            .with_context(|| format!("package {package_id} not found"))?;
        if current.status.is_terminal() {
            bail!(
                "package {} is terminal ({}), cannot move to {}",
                package_id,
                current.status.as_str(),
                to.as_str()
            );
        }
        self.conn().execute(
            "UPDATE packages SET status = ?2 WHERE id = ?1",
            params![package_id, to.as_str()],
        )?;
        Ok(())
    }

    pub fn count_packages_by_status(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare_cached("SELECT status, COUNT(*) FROM packages GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Daily created-package counts for the trailing window, oldest first.
    /// Days with no packages are absent; the forecaster pads as needed.
    pub fn daily_volumes(&self, since: NaiveDate) -> Result<Vec<(NaiveDate, i64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT substr(created_at, 1, 10) AS day, COUNT(*) \
             FROM packages WHERE substr(created_at, 1, 10) >= ?1 \
             GROUP BY day ORDER BY day",
        )?;
        let rows = stmt.query_map(params![super::date_str(since)], |row| {
            let day: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((super::parse_date(0, day)?, count))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
