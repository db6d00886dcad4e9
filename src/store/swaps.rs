//! Swap persistence and the atomic two-assignment exchange.

use super::{date_str, parse_opt_ts, parse_ts, FleetDb};
use crate::models::{Swap, SwapStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Row};
use tracing::warn;

/// Result of the exchange transaction. `DriverMismatch` means another swap
/// (or a manual reassignment) won the race; nothing was changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Completed,
    DriverMismatch,
}

fn swap_from_row(row: &Row) -> rusqlite::Result<Swap> {
    let status_raw: String = row.get(7)?;
    Ok(Swap {
        id: row.get(0)?,
        proposer_id: row.get(1)?,
        acceptor_id: row.get(2)?,
        offered_package_id: row.get(3)?,
        requested_package_id: row.get(4)?,
        expected_offered_driver_id: row.get(5)?,
        expected_requested_driver_id: row.get(6)?,
        status: SwapStatus::parse(&status_raw).unwrap_or(SwapStatus::Pending),
        reason: row.get(8)?,
        compatibility_score: row.get(9)?,
        distance_saved_km: row.get(10)?,
        proposed_at: parse_ts(11, row.get(11)?)?,
        responded_at: parse_opt_ts(12, row.get(12)?)?,
        completed_at: parse_opt_ts(13, row.get(13)?)?,
    })
}

const SWAP_COLUMNS: &str = "id, proposer_id, acceptor_id, offered_package_id, \
     requested_package_id, expected_offered_driver_id, expected_requested_driver_id, \
     status, reason, compatibility_score, distance_saved_km, proposed_at, \
     responded_at, completed_at";

impl FleetDb {
    pub fn create_swap(&self, swap: &Swap) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO swaps (id, proposer_id, acceptor_id, offered_package_id, \
                 requested_package_id, expected_offered_driver_id, \
                 expected_requested_driver_id, status, reason, compatibility_score, \
                 distance_saved_km, proposed_at, responded_at, completed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    swap.id,
                    swap.proposer_id,
                    swap.acceptor_id,
                    swap.offered_package_id,
                    swap.requested_package_id,
                    swap.expected_offered_driver_id,
                    swap.expected_requested_driver_id,
                    swap.status.as_str(),
                    swap.reason,
                    swap.compatibility_score,
                    swap.distance_saved_km,
                    swap.proposed_at.to_rfc3339(),
                    swap.responded_at.map(|t| t.to_rfc3339()),
                    swap.completed_at.map(|t| t.to_rfc3339()),
                ],
            )
            .context("insert swap")?;
        Ok(())
    }

    pub fn get_swap(&self, swap_id: &str) -> Result<Option<Swap>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {SWAP_COLUMNS} FROM swaps WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![swap_id], swap_from_row)?;
        Ok(rows.next().transpose()?)
    }

    pub fn pending_swaps_for_acceptor(&self, driver_id: &str) -> Result<Vec<Swap>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SWAP_COLUMNS} FROM swaps \
             WHERE acceptor_id = ?1 AND status = 'pending' \
             ORDER BY compatibility_score DESC"
        ))?;
        let rows = stmt.query_map(params![driver_id], swap_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_swaps_proposed_since(
        &self,
        driver_id: &str,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT COUNT(*) FROM swaps WHERE proposer_id = ?1 AND proposed_at >= ?2",
        )?;
        Ok(stmt.query_row(params![driver_id, since.to_rfc3339()], |row| row.get(0))?)
    }

    pub fn latest_swap_proposed_at(&self, driver_id: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT proposed_at FROM swaps WHERE proposer_id = ?1 \
             ORDER BY proposed_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![driver_id], |row| row.get::<_, String>(0))?;
        match rows.next().transpose()? {
            Some(raw) => Ok(Some(parse_ts(0, raw)?)),
            None => Ok(None),
        }
    }

    /// Cancel a pending swap. Returns false if the swap was no longer pending
    /// (terminal statuses are immutable).
    pub fn cancel_swap(&self, swap_id: &str, responded_at: DateTime<Utc>) -> Result<bool> {
        let n = self.conn().execute(
            "UPDATE swaps SET status = 'cancelled', responded_at = ?2 \
             WHERE id = ?1 AND status = 'pending'",
            params![swap_id, responded_at.to_rfc3339()],
        )?;
        Ok(n > 0)
    }

    /// The atomic exchange: inside one transaction, re-read both current-day
    /// assignments, verify each still belongs to the driver the swap expects,
    /// then exchange the driver ids and finalize the swap. All-or-nothing.
    pub fn execute_swap_exchange(
        &self,
        swap: &Swap,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<ExchangeOutcome> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("begin exchange tx")?;

        let read_current = |package_id: &str| -> rusqlite::Result<Option<(String, String)>> {
            tx.query_row(
                "SELECT id, driver_id FROM assignments \
                 WHERE package_id = ?1 AND assignment_date = ?2 \
                 AND completed = 0 AND failed = 0",
                params![package_id, date_str(date)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        };

        let offered = read_current(&swap.offered_package_id)?;
        let requested = read_current(&swap.requested_package_id)?;

        let (Some((offered_id, offered_driver)), Some((requested_id, requested_driver))) =
            (offered, requested)
        else {
            warn!(swap_id = %swap.id, "exchange aborted: assignment no longer active");
            return Ok(ExchangeOutcome::DriverMismatch);
        };

        if offered_driver != swap.expected_offered_driver_id
            || requested_driver != swap.expected_requested_driver_id
        {
            warn!(
                swap_id = %swap.id,
                "exchange aborted: assignment ownership changed since proposal"
            );
            return Ok(ExchangeOutcome::DriverMismatch);
        }

        tx.execute(
            "UPDATE assignments SET driver_id = ?2 WHERE id = ?1",
            params![offered_id, requested_driver],
        )?;
        tx.execute(
            "UPDATE assignments SET driver_id = ?2 WHERE id = ?1",
            params![requested_id, offered_driver],
        )?;
        tx.execute(
            "UPDATE swaps SET status = 'completed', responded_at = ?2, completed_at = ?2 \
             WHERE id = ?1",
            params![swap.id, now.to_rfc3339()],
        )?;

        tx.commit().context("commit exchange tx")?;
        Ok(ExchangeOutcome::Completed)
    }

    /// Mark a swap whose exchange lost the race. The proposer can re-propose.
    pub fn reject_swap(&self, swap_id: &str, responded_at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE swaps SET status = 'rejected', responded_at = ?2 \
             WHERE id = ?1 AND status = 'pending'",
            params![swap_id, responded_at.to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{sample_driver, sample_package};
    use crate::store::NewAssignment;

    fn seed_two_drivers_two_packages(db: &FleetDb, date: NaiveDate) {
        for (d, e) in [("dA", "a@fleet.test"), ("dB", "b@fleet.test")] {
            db.create_driver(&sample_driver(d, e)).unwrap();
        }
        for (p, t) in [("p1", "TRK-1"), ("p2", "TRK-2")] {
            db.create_package(&sample_package(p, t)).unwrap();
        }
        db.insert_daily_assignments(&[
            NewAssignment {
                id: "a1".to_string(),
                driver_id: "dA".to_string(),
                package_id: "p1".to_string(),
                assignment_date: date,
                predicted_difficulty: 40.0,
                assigned_at: Utc::now(),
            },
            NewAssignment {
                id: "a2".to_string(),
                driver_id: "dB".to_string(),
                package_id: "p2".to_string(),
                assignment_date: date,
                predicted_difficulty: 60.0,
                assigned_at: Utc::now(),
            },
        ])
        .unwrap();
    }

    fn pending_swap(date_label: &str) -> Swap {
        Swap {
            id: format!("s-{date_label}"),
            proposer_id: "dA".to_string(),
            acceptor_id: "dB".to_string(),
            offered_package_id: "p1".to_string(),
            requested_package_id: "p2".to_string(),
            expected_offered_driver_id: "dA".to_string(),
            expected_requested_driver_id: "dB".to_string(),
            status: SwapStatus::Pending,
            reason: Some("closer to my route".to_string()),
            compatibility_score: Some(0.7),
            distance_saved_km: Some(3.2),
            proposed_at: Utc::now(),
            responded_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn exchange_swaps_driver_ids_exactly() {
        let db = FleetDb::in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        seed_two_drivers_two_packages(&db, date);
        let swap = pending_swap("1");
        db.create_swap(&swap).unwrap();

        let outcome = db.execute_swap_exchange(&swap, date, Utc::now()).unwrap();
        assert_eq!(outcome, ExchangeOutcome::Completed);

        let a1 = db.get_assignment("a1").unwrap().unwrap();
        let a2 = db.get_assignment("a2").unwrap().unwrap();
        assert_eq!(a1.driver_id, "dB");
        assert_eq!(a2.driver_id, "dA");
        // Difficulty and dates untouched.
        assert_eq!(a1.predicted_difficulty, 40.0);
        assert_eq!(a2.predicted_difficulty, 60.0);

        let stored = db.get_swap(&swap.id).unwrap().unwrap();
        assert_eq!(stored.status, SwapStatus::Completed);
        assert!(stored.completed_at.is_some());
    }

    #[test]
    fn exchange_refuses_when_ownership_changed() {
        let db = FleetDb::in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        seed_two_drivers_two_packages(&db, date);

        let first = pending_swap("1");
        let second = pending_swap("2");
        db.create_swap(&first).unwrap();
        db.create_swap(&second).unwrap();

        assert_eq!(
            db.execute_swap_exchange(&first, date, Utc::now()).unwrap(),
            ExchangeOutcome::Completed
        );
        // Same expectations, but ownership already flipped: neither row changes.
        assert_eq!(
            db.execute_swap_exchange(&second, date, Utc::now()).unwrap(),
            ExchangeOutcome::DriverMismatch
        );

        let a1 = db.get_assignment("a1").unwrap().unwrap();
        let a2 = db.get_assignment("a2").unwrap().unwrap();
        assert_eq!(a1.driver_id, "dB");
        assert_eq!(a2.driver_id, "dA");
    }

    #[test]
    fn cancel_only_touches_pending() {
        let db = FleetDb::in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        seed_two_drivers_two_packages(&db, date);
        let swap = pending_swap("1");
        db.create_swap(&swap).unwrap();

        assert!(db.cancel_swap(&swap.id, Utc::now()).unwrap());
        // Terminal now; a second cancel is a no-op.
        assert!(!db.cancel_swap(&swap.id, Utc::now()).unwrap());
    }
}
