//! Swap Marketplace
//! Peer-to-peer exchange of same-day assignments with ownership, cooldown,
//! and daily-cap rules. The exchange itself is all-or-nothing in the store.

pub mod matching;

pub use matching::{haversine_km, score_swap, SwapScore, COMPATIBILITY_THRESHOLD};

use crate::config::SwapConfig;
use crate::error::{FleetError, FleetResult};
use crate::models::{Swap, SwapStatus};
use crate::notify::PushDispatcher;
use crate::store::{ExchangeOutcome, FleetDb};
use chrono::{Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct SwapService {
    db: FleetDb,
    config: SwapConfig,
    notifier: Arc<dyn PushDispatcher>,
}

impl SwapService {
    pub fn new(db: FleetDb, config: SwapConfig, notifier: Arc<dyn PushDispatcher>) -> Self {
        Self {
            db,
            config,
            notifier,
        }
    }

    /// Propose exchanging one of the caller's current-day assignments for
    /// another driver's.
    pub async fn propose(
        &self,
        proposer_id: &str,
        offered_package_id: &str,
        requested_package_id: &str,
        reason: Option<String>,
        today: NaiveDate,
    ) -> FleetResult<Swap> {
        if offered_package_id == requested_package_id {
            return Err(FleetError::validation("cannot swap a package for itself"));
        }

        let offered = self
            .db
            .get_assignment_by_package_date(offered_package_id, today)?
            .ok_or_else(|| FleetError::validation("offered package has no assignment today"))?;
        if offered.driver_id != proposer_id {
            return Err(FleetError::authorization(
                "offered package is not assigned to proposer",
            ));
        }
        if offered.is_terminal() {
            return Err(FleetError::validation("offered assignment is already finalized"));
        }

        let requested = self
            .db
            .get_assignment_by_package_date(requested_package_id, today)?
            .ok_or_else(|| FleetError::validation("requested package is not assigned today"))?;
        if requested.driver_id == proposer_id {
            return Err(FleetError::validation("cannot swap with yourself"));
        }
        if requested.is_terminal() {
            return Err(FleetError::validation("requested assignment is already finalized"));
        }

        let now = Utc::now();

        // Daily cap, counted from midnight of the operational date.
        let day_start = today.and_time(chrono::NaiveTime::MIN).and_utc();
        let proposed_today = self.db.count_swaps_proposed_since(proposer_id, day_start)?;
        if proposed_today >= self.config.max_per_day {
            return Err(FleetError::validation(format!(
                "daily swap limit reached ({} per day)",
                self.config.max_per_day
            )));
        }

        if let Some(last) = self.db.latest_swap_proposed_at(proposer_id)? {
            let cooldown_ends = last + Duration::minutes(self.config.cooldown_minutes);
            if now < cooldown_ends {
                return Err(FleetError::validation(format!(
                    "swap cooldown active, retry after {}",
                    cooldown_ends.format("%H:%M UTC")
                )));
            }
        }

        let score = self.compatibility(&offered, &requested)?;

        let swap = Swap {
            id: Uuid::new_v4().to_string(),
            proposer_id: proposer_id.to_string(),
            acceptor_id: requested.driver_id.clone(),
            offered_package_id: offered_package_id.to_string(),
            requested_package_id: requested_package_id.to_string(),
            expected_offered_driver_id: offered.driver_id.clone(),
            expected_requested_driver_id: requested.driver_id.clone(),
            status: SwapStatus::Pending,
            reason,
            compatibility_score: score.as_ref().map(|s| s.compatibility),
            distance_saved_km: score.as_ref().map(|s| s.distance_saved_km),
            proposed_at: now,
            responded_at: None,
            completed_at: None,
        };
        self.db.create_swap(&swap)?;

        info!("🔄 Swap proposed: {} by driver {}", swap.id, proposer_id);

        // Best-effort push to the acceptor.
        if let Some(acceptor) = self.db.get_driver(&swap.acceptor_id)? {
            if let Some(token) = acceptor.fcm_token.as_deref() {
                let mut data = HashMap::new();
                data.insert("type".to_string(), "swap_request".to_string());
                data.insert("swap_id".to_string(), swap.id.clone());
                data.insert(
                    "respond_within_minutes".to_string(),
                    self.config.notification_timeout_minutes.to_string(),
                );
                self.notifier
                    .send(
                        token,
                        "🔄 Swap Request",
                        &format!("Hi {}, you have a new package swap request.", acceptor.name),
                        data,
                    )
                    .await;
            }
        }

        Ok(swap)
    }

    /// Accept a pending swap: verify the caller is the acceptor, then run the
    /// atomic exchange. A concurrency loss retries once before surfacing.
    pub async fn accept(&self, swap_id: &str, caller_id: &str, today: NaiveDate) -> FleetResult<Swap> {
        let swap = self
            .db
            .get_swap(swap_id)?
            .ok_or_else(|| FleetError::validation("swap not found"))?;

        if swap.status != SwapStatus::Pending {
            return Err(FleetError::validation("swap is not pending"));
        }
        if swap.acceptor_id != caller_id {
            return Err(FleetError::authorization("not authorized to accept this swap"));
        }

        let mut outcome = self.db.execute_swap_exchange(&swap, today, Utc::now())?;
        if outcome == ExchangeOutcome::DriverMismatch {
            // One retry: the mismatch may have been a transient overlap with
            // a monitor-side write rather than a lost swap race.
            outcome = self.db.execute_swap_exchange(&swap, today, Utc::now())?;
        }

        match outcome {
            ExchangeOutcome::Completed => {
                info!("✅ Swap completed: {swap_id}");
                let updated = self
                    .db
                    .get_swap(swap_id)?
                    .ok_or_else(|| FleetError::validation("swap disappeared"))?;
                Ok(updated)
            }
            ExchangeOutcome::DriverMismatch => {
                warn!("swap {swap_id} lost the race: assignment ownership changed");
                self.db.reject_swap(swap_id, Utc::now())?;
                Err(FleetError::validation(
                    "assignment ownership changed since the swap was proposed",
                ))
            }
        }
    }

    /// Cancel a pending swap. Proposer only.
    pub fn cancel(&self, swap_id: &str, caller_id: &str) -> FleetResult<Swap> {
        let swap = self
            .db
            .get_swap(swap_id)?
            .ok_or_else(|| FleetError::validation("swap not found"))?;

        if swap.proposer_id != caller_id {
            return Err(FleetError::authorization("only the proposer can cancel a swap"));
        }
        if !self.db.cancel_swap(swap_id, Utc::now())? {
            return Err(FleetError::validation("can only cancel pending swaps"));
        }

        info!("🔄 Swap cancelled: {swap_id}");
        self.db
            .get_swap(swap_id)?
            .ok_or_else(|| FleetError::validation("swap disappeared"))
    }

    /// Pending swaps awaiting this driver, best match first. Swaps that never
    /// cleared the compatibility bar are hidden.
    pub fn marketplace(&self, driver_id: &str) -> FleetResult<Vec<Swap>> {
        let swaps = self.db.pending_swaps_for_acceptor(driver_id)?;
        Ok(swaps
            .into_iter()
            .filter(|s| s.compatibility_score.unwrap_or(0.0) > COMPATIBILITY_THRESHOLD)
            .collect())
    }

    /// Compatibility from the proposer's perspective. None when the proposer
    /// has no known location to measure from.
    fn compatibility(
        &self,
        offered: &crate::models::Assignment,
        requested: &crate::models::Assignment,
    ) -> FleetResult<Option<SwapScore>> {
        let proposer = self.db.get_driver(&offered.driver_id)?;
        let offered_pkg = self.db.get_package(&offered.package_id)?;
        let requested_pkg = self.db.get_package(&requested.package_id)?;

        let (Some(proposer), Some(offered_pkg), Some(requested_pkg)) =
            (proposer, offered_pkg, requested_pkg)
        else {
            return Ok(None);
        };
        let (Some(lat), Some(lon)) = (proposer.current_latitude, proposer.current_longitude)
        else {
            return Ok(None);
        };

        Ok(Some(score_swap(
            (lat, lon),
            (offered_pkg.delivery_latitude, offered_pkg.delivery_longitude),
            offered.predicted_difficulty,
            (requested_pkg.delivery_latitude, requested_pkg.delivery_longitude),
            requested.predicted_difficulty,
        )))
    }
}
