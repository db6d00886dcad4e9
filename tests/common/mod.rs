//! Shared fixtures for integration scenarios.

#![allow(dead_code)]

use chrono::{NaiveDate, Utc};
use fleetfair_backend::cache::Cache;
use fleetfair_backend::config::Config;
use fleetfair_backend::connections::ConnectionRegistry;
use fleetfair_backend::fairness::{MipProblem, MipSolver, SolveOutcome};
use fleetfair_backend::jobs::JobContext;
use fleetfair_backend::ml::ModelRegistry;
use fleetfair_backend::models::{Driver, Package, PackageStatus};
use fleetfair_backend::notify::PushDispatcher;
use fleetfair_backend::store::FleetDb;
use fleetfair_backend::weather::WeatherOracle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub fn operational_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, 1).expect("valid date")
}

pub fn driver(id: &str) -> Driver {
    Driver {
        id: id.to_string(),
        name: format!("Driver {id}"),
        email: format!("{id}@fleet.test"),
        phone: format!("+91-{id}"),
        password_hash: "x".to_string(),
        vehicle_type: "bike".to_string(),
        vehicle_capacity_kg: 50.0,
        is_active: true,
        experience_days: 365,
        total_deliveries: 100,
        successful_deliveries: 95,
        failed_deliveries: 5,
        success_rate: 0.95,
        avg_delivery_time_minutes: 28.0,
        current_latitude: Some(19.076),
        current_longitude: Some(72.877),
        fcm_token: Some(format!("token-{id}")),
        created_at: Utc::now(),
    }
}

pub fn package(id: &str) -> Package {
    Package {
        id: id.to_string(),
        tracking_number: format!("TRK-{id}"),
        status: PackageStatus::Pending,
        weight_kg: 5.0,
        is_fragile: false,
        delivery_latitude: 19.08,
        delivery_longitude: 72.88,
        delivery_address: "221B Marine Drive".to_string(),
        floor_number: 2,
        time_window_hours: Some(4.0),
        priority: 0,
        distance_from_hub_km: Some(8.0),
        created_at: Utc::now(),
    }
}

pub fn seed_fleet(db: &FleetDb, drivers: usize, packages: usize) {
    for i in 0..drivers {
        db.create_driver(&driver(&format!("d{i}"))).expect("create driver");
    }
    for j in 0..packages {
        db.create_package(&package(&format!("p{j}"))).expect("create package");
    }
}

/// Push dispatcher capturing sends for assertions.
#[derive(Default)]
pub struct CapturingDispatcher {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

#[async_trait::async_trait]
impl PushDispatcher for CapturingDispatcher {
    async fn send(
        &self,
        endpoint_token: &str,
        title: &str,
        body: &str,
        _data: HashMap<String, String>,
    ) -> bool {
        self.sent.lock().push((
            endpoint_token.to_string(),
            title.to_string(),
            body.to_string(),
        ));
        true
    }
}

/// Solver stub: round-robin optimal cover, or any fixed outcome.
pub struct ScriptedSolver(pub SolveOutcome);

impl MipSolver for ScriptedSolver {
    fn solve(&self, _problem: &MipProblem, _budget: Duration) -> SolveOutcome {
        self.0.clone()
    }
}

/// An optimal solution spreading packages round-robin across drivers.
pub fn round_robin_solution(drivers: usize, packages: usize) -> SolveOutcome {
    SolveOutcome::Optimal(
        (0..packages)
            .map(|j| (j % drivers, j))
            .collect(),
    )
}

pub fn job_context(db: FleetDb, solver: Arc<dyn MipSolver>) -> (JobContext, Arc<CapturingDispatcher>) {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    (
        JobContext {
            db,
            registry: ModelRegistry::empty(),
            notifier: dispatcher.clone(),
            connections: Arc::new(ConnectionRegistry::new()),
            cache: Cache::in_memory(),
            weather: Arc::new(WeatherOracle::new(None)),
            solver,
            config: Arc::new(Config::from_env()),
        },
        dispatcher,
    )
}
