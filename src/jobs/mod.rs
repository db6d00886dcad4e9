//! Background jobs and their scheduler.

pub mod cleanup;
pub mod daily_assignment;
pub mod forecast_refresh;
pub mod health_monitor;
pub mod learning_export;
pub mod scheduler;

pub use scheduler::{Scheduler, Trigger};

use crate::cache::Cache;
use crate::config::Config;
use crate::connections::ConnectionRegistry;
use crate::fairness::MipSolver;
use crate::ml::ModelRegistry;
use crate::notify::PushDispatcher;
use crate::store::FleetDb;
use crate::weather::WeatherOracle;
use std::sync::Arc;

/// Everything a job needs, wired once at startup and passed explicitly.
#[derive(Clone)]
pub struct JobContext {
    pub db: FleetDb,
    pub registry: Arc<ModelRegistry>,
    pub notifier: Arc<dyn PushDispatcher>,
    pub connections: Arc<ConnectionRegistry>,
    pub cache: Cache,
    pub weather: Arc<WeatherOracle>,
    pub solver: Arc<dyn MipSolver>,
    pub config: Arc<Config>,
}
