//! Driver queries and lifecycle mutations.

use super::{parse_ts, FleetDb};
use crate::models::Driver;
use anyhow::{Context, Result};
use rusqlite::{params, Row};

fn driver_from_row(row: &Row) -> rusqlite::Result<Driver> {
    Ok(Driver {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        password_hash: row.get(4)?,
        vehicle_type: row.get(5)?,
        vehicle_capacity_kg: row.get(6)?,
        is_active: row.get::<_, i64>(7)? != 0,
        experience_days: row.get(8)?,
        total_deliveries: row.get(9)?,
        successful_deliveries: row.get(10)?,
        failed_deliveries: row.get(11)?,
        success_rate: row.get(12)?,
        avg_delivery_time_minutes: row.get(13)?,
        current_latitude: row.get(14)?,
        current_longitude: row.get(15)?,
        fcm_token: row.get(16)?,
        created_at: parse_ts(17, row.get(17)?)?,
    })
}

const DRIVER_COLUMNS: &str = "id, name, email, phone, password_hash, vehicle_type, \
     vehicle_capacity_kg, is_active, experience_days, total_deliveries, \
     successful_deliveries, failed_deliveries, success_rate, \
     avg_delivery_time_minutes, current_latitude, current_longitude, \
     fcm_token, created_at";

impl FleetDb {
    pub fn create_driver(&self, driver: &Driver) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO drivers (id, name, email, phone, password_hash, vehicle_type, \
                 vehicle_capacity_kg, is_active, experience_days, total_deliveries, \
                 successful_deliveries, failed_deliveries, success_rate, \
                 avg_delivery_time_minutes, current_latitude, current_longitude, \
                 fcm_token, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    driver.id,
                    driver.name,
                    driver.email,
                    driver.phone,
                    driver.password_hash,
                    driver.vehicle_type,
                    driver.vehicle_capacity_kg,
                    driver.is_active as i64,
                    driver.experience_days,
                    driver.total_deliveries,
                    driver.successful_deliveries,
                    driver.failed_deliveries,
                    driver.success_rate,
                    driver.avg_delivery_time_minutes,
                    driver.current_latitude,
                    driver.current_longitude,
                    driver.fcm_token,
                    driver.created_at.to_rfc3339(),
                ],
            )
            .context("insert driver")?;
        Ok(())
    }

    pub fn get_driver(&self, driver_id: &str) -> Result<Option<Driver>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {DRIVER_COLUMNS} FROM drivers WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![driver_id], driver_from_row)?;
        Ok(rows.next().transpose()?)
    }

    pub fn get_driver_by_email(&self, email: &str) -> Result<Option<Driver>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {DRIVER_COLUMNS} FROM drivers WHERE email = ?1"
        ))?;
        let mut rows = stmt.query_map(params![email], driver_from_row)?;
        Ok(rows.next().transpose()?)
    }

    pub fn get_active_drivers(&self) -> Result<Vec<Driver>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {DRIVER_COLUMNS} FROM drivers WHERE is_active = 1 ORDER BY created_at"
        ))?;
        let rows = stmt.query_map([], driver_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update_driver_location(&self, driver_id: &str, lat: f64, lon: f64) -> Result<()> {
        self.conn().execute(
            "UPDATE drivers SET current_latitude = ?2, current_longitude = ?3 WHERE id = ?1",
            params![driver_id, lat, lon],
        )?;
        Ok(())
    }

    pub fn set_fcm_token(&self, driver_id: &str, token: Option<&str>) -> Result<()> {
        self.conn().execute(
            "UPDATE drivers SET fcm_token = ?2 WHERE id = ?1",
            params![driver_id, token],
        )?;
        Ok(())
    }

    /// Drivers are never hard-deleted.
    pub fn deactivate_driver(&self, driver_id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE drivers SET is_active = 0 WHERE id = ?1",
            params![driver_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::sample_driver;

    #[test]
    fn create_and_fetch_driver() {
        let db = FleetDb::in_memory().unwrap();
        let driver = sample_driver("d1", "d1@fleet.test");
        db.create_driver(&driver).unwrap();

        let fetched = db.get_driver("d1").unwrap().unwrap();
        assert_eq!(fetched.email, "d1@fleet.test");
        assert_eq!(fetched.successful_deliveries, 95);
        assert!(db.get_driver("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_rejected() {
        let db = FleetDb::in_memory().unwrap();
        db.create_driver(&sample_driver("d1", "same@fleet.test")).unwrap();
        let mut dup = sample_driver("d2", "same@fleet.test");
        dup.phone = "+91-other".to_string();
        assert!(db.create_driver(&dup).is_err());
    }

    #[test]
    fn deactivation_hides_from_active_list() {
        let db = FleetDb::in_memory().unwrap();
        db.create_driver(&sample_driver("d1", "a@fleet.test")).unwrap();
        db.create_driver(&sample_driver("d2", "b@fleet.test")).unwrap();
        db.deactivate_driver("d1").unwrap();

        let active = db.get_active_drivers().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "d2");
        // Still present, just inactive.
        assert!(db.get_driver("d1").unwrap().is_some());
    }
}
