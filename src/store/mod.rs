//! Persistent Store
//! Single-writer SQLite store for the fleet control plane.
//!
//! Key properties:
//! - WAL mode for concurrent reads during writes
//! - Prepared statement caching
//! - Explicit transactions for every multi-row mutation
//! - Query methods return plain values; no lazy loading

mod assignments;
mod drivers;
mod health;
mod insurance;
mod packages;
mod swaps;
mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

pub use assignments::{LearningRecord, NewAssignment};
pub use insurance::DriverFailureStats;
pub use swaps::ExchangeOutcome;
pub use telemetry::FleetSummary;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::Arc;
use tracing::info;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS drivers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT UNIQUE NOT NULL,
    phone TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    vehicle_type TEXT NOT NULL,
    vehicle_capacity_kg REAL NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    experience_days INTEGER NOT NULL DEFAULT 0,
    total_deliveries INTEGER NOT NULL DEFAULT 0,
    successful_deliveries INTEGER NOT NULL DEFAULT 0,
    failed_deliveries INTEGER NOT NULL DEFAULT 0,
    success_rate REAL NOT NULL DEFAULT 1.0,
    avg_delivery_time_minutes REAL NOT NULL DEFAULT 30.0,
    current_latitude REAL,
    current_longitude REAL,
    fcm_token TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS packages (
    id TEXT PRIMARY KEY,
    tracking_number TEXT UNIQUE NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    weight_kg REAL NOT NULL,
    is_fragile INTEGER NOT NULL DEFAULT 0,
    delivery_latitude REAL NOT NULL,
    delivery_longitude REAL NOT NULL,
    delivery_address TEXT NOT NULL,
    floor_number INTEGER NOT NULL DEFAULT 0,
    time_window_hours REAL,
    priority INTEGER NOT NULL DEFAULT 0,
    distance_from_hub_km REAL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_packages_status ON packages(status, created_at);

CREATE TABLE IF NOT EXISTS assignments (
    id TEXT PRIMARY KEY,
    driver_id TEXT NOT NULL REFERENCES drivers(id),
    package_id TEXT NOT NULL REFERENCES packages(id),
    assignment_date TEXT NOT NULL,
    predicted_difficulty REAL NOT NULL,
    actual_difficulty REAL,
    accepted INTEGER NOT NULL DEFAULT 0,
    completed INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    assigned_at TEXT NOT NULL,
    accepted_at TEXT,
    started_at TEXT,
    completed_at TEXT,
    explanation_json TEXT,
    UNIQUE (package_id, assignment_date)
);

CREATE INDEX IF NOT EXISTS idx_assignments_driver_date
    ON assignments(driver_id, assignment_date);

CREATE TABLE IF NOT EXISTS deliveries (
    id TEXT PRIMARY KEY,
    assignment_id TEXT UNIQUE NOT NULL REFERENCES assignments(id),
    delivered_at TEXT NOT NULL,
    actual_time_minutes REAL NOT NULL,
    success INTEGER NOT NULL,
    failure_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_deliveries_delivered_at ON deliveries(delivered_at);

CREATE TABLE IF NOT EXISTS health_events (
    id TEXT PRIMARY KEY,
    driver_id TEXT NOT NULL REFERENCES drivers(id),
    recorded_at TEXT NOT NULL,
    heart_rate_bpm INTEGER NOT NULL,
    fatigue_level INTEGER NOT NULL,
    hours_worked REAL NOT NULL,
    hours_since_last_break REAL NOT NULL,
    packages_delivered INTEGER NOT NULL DEFAULT 0,
    packages_remaining INTEGER NOT NULL DEFAULT 0,
    total_distance_km REAL NOT NULL DEFAULT 0,
    predicted_risk_score REAL NOT NULL DEFAULT 0,
    risk_severity TEXT NOT NULL DEFAULT 'low',
    break_recommended_minutes INTEGER,
    break_urgency TEXT,
    break_reason TEXT,
    alerted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_health_events_driver_time
    ON health_events(driver_id, recorded_at DESC);

CREATE TABLE IF NOT EXISTS swaps (
    id TEXT PRIMARY KEY,
    proposer_id TEXT NOT NULL REFERENCES drivers(id),
    acceptor_id TEXT NOT NULL REFERENCES drivers(id),
    offered_package_id TEXT NOT NULL REFERENCES packages(id),
    requested_package_id TEXT NOT NULL REFERENCES packages(id),
    expected_offered_driver_id TEXT NOT NULL,
    expected_requested_driver_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    reason TEXT,
    compatibility_score REAL,
    distance_saved_km REAL,
    proposed_at TEXT NOT NULL,
    responded_at TEXT,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_swaps_acceptor_status ON swaps(acceptor_id, status);
CREATE INDEX IF NOT EXISTS idx_swaps_proposer_time ON swaps(proposer_id, proposed_at DESC);

CREATE TABLE IF NOT EXISTS insurance_payouts (
    id TEXT PRIMARY KEY,
    driver_id TEXT NOT NULL REFERENCES drivers(id),
    window_start TEXT NOT NULL,
    window_end TEXT NOT NULL,
    driver_failure_rate REAL NOT NULL,
    population_mean REAL NOT NULL,
    population_std REAL NOT NULL,
    z_score REAL NOT NULL,
    excess_failures REAL NOT NULL,
    payout_amount REAL NOT NULL,
    eligible INTEGER NOT NULL,
    approved INTEGER NOT NULL DEFAULT 0,
    paid INTEGER NOT NULL DEFAULT 0,
    reason TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_insurance_driver ON insurance_payouts(driver_id, created_at DESC);

CREATE TABLE IF NOT EXISTS gps_logs (
    id TEXT PRIMARY KEY,
    driver_id TEXT NOT NULL REFERENCES drivers(id),
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_gps_logs_time ON gps_logs(recorded_at);
"#;

/// Handle to the fleet database. Cheap to clone; all clones share one
/// connection guarded by a mutex (SQLite is the single writer anyway).
#[derive(Clone)]
pub struct FleetDb {
    conn: Arc<Mutex<Connection>>,
}

impl FleetDb {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open fleet db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON").ok();
        conn.execute_batch(SCHEMA_SQL).context("apply schema")?;

        info!("📊 Fleet database ready at: {}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory db")?;
        conn.pragma_update(None, "foreign_keys", "ON").ok();
        conn.execute_batch(SCHEMA_SQL).context("apply schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn conn(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

// ---------------------------------------------------------------------------
// Column conversion helpers
// ---------------------------------------------------------------------------

pub(crate) fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(idx, s)).transpose()
}

pub(crate) fn parse_date(idx: usize, raw: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn date_str(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}
