//! Daily fair-assignment pipeline: batched difficulty prediction, the
//! constrained distribution solve, one persistence transaction, then
//! best-effort notifications.

use super::JobContext;
use crate::fairness::{FairnessOptimizer, FairnessReport};
use crate::ml::{DifficultyExplainer, DifficultyScorer};
use crate::models::{DriverFeatures, PackageFeatures, ServerMessage};
use crate::store::NewAssignment;
use anyhow::{Context as _, Result};
use chrono::{NaiveDate, Utc};
use metrics::counter;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub date: NaiveDate,
    pub drivers: usize,
    pub packages: usize,
    pub inserted: usize,
    pub fairness: FairnessReport,
}

pub async fn run(ctx: JobContext) -> Result<()> {
    run_for_date(&ctx, Utc::now().date_naive()).await.map(|_| ())
}

/// The full pipeline for one operational date. Returns None when there is
/// nothing to do (no drivers or no pending packages).
pub async fn run_for_date(ctx: &JobContext, date: NaiveDate) -> Result<Option<PipelineReport>> {
    info!("🚀 Starting daily assignment generation for {date}...");

    let drivers = ctx.db.get_active_drivers()?;
    if drivers.is_empty() {
        warn!("No active drivers found");
        return Ok(None);
    }
    let packages = ctx.db.get_pending_packages()?;
    if packages.is_empty() {
        warn!("No pending packages found");
        return Ok(None);
    }
    info!(
        "Found {} active drivers and {} pending packages",
        drivers.len(),
        packages.len()
    );

    let driver_features: Vec<DriverFeatures> = drivers.iter().map(Into::into).collect();
    let package_features: Vec<PackageFeatures> = packages.iter().map(Into::into).collect();

    let scorer = DifficultyScorer::new(ctx.registry.clone());
    let matrix = scorer.score_matrix(&driver_features, &package_features);

    // The solve may shell out to a subprocess and chew CPU; keep it off the
    // async workers.
    let optimizer = FairnessOptimizer::new(ctx.config.fairness.clone());
    let solver = ctx.solver.clone();
    let solve_matrix = matrix.clone();
    let plan = tokio::task::spawn_blocking(move || optimizer.optimize(&solve_matrix, &*solver))
        .await
        .context("optimizer task panicked")??;

    let now = Utc::now();
    let mut rows = Vec::new();
    for (driver_idx, package_idxs) in plan.assignments.iter().enumerate() {
        for &package_idx in package_idxs {
            rows.push(NewAssignment {
                id: Uuid::new_v4().to_string(),
                driver_id: drivers[driver_idx].id.clone(),
                package_id: packages[package_idx].id.clone(),
                assignment_date: date,
                predicted_difficulty: matrix[(driver_idx, package_idx)],
                assigned_at: now,
            });
        }
    }

    let inserted = ctx.db.insert_daily_assignments(&rows)?;
    counter!("assignments_created_total", inserted as u64);
    info!("✅ Created {inserted} assignments for {date}");

    // Attach explanations opportunistically; a failure here never unwinds
    // the committed batch.
    let explainer = DifficultyExplainer::new(ctx.registry.clone());
    for (driver_idx, package_idxs) in plan.assignments.iter().enumerate() {
        for &package_idx in package_idxs {
            let Ok(Some(assignment)) = ctx
                .db
                .get_assignment_by_package_date(&packages[package_idx].id, date)
            else {
                continue;
            };
            let explanation = explainer.explain(
                &driver_features[driver_idx],
                &package_features[package_idx],
                matrix[(driver_idx, package_idx)],
            );
            if let Ok(raw) = serde_json::to_string(&explanation) {
                if let Err(e) = ctx.db.set_assignment_explanation(&assignment.id, &raw) {
                    warn!("failed to attach explanation: {e:#}");
                }
            }
        }
    }

    notify_drivers(ctx, &drivers, &plan.assignments, date).await;

    Ok(Some(PipelineReport {
        date,
        drivers: drivers.len(),
        packages: packages.len(),
        inserted,
        fairness: plan.report,
    }))
}

async fn notify_drivers(
    ctx: &JobContext,
    drivers: &[crate::models::Driver],
    assignments: &[Vec<usize>],
    date: NaiveDate,
) {
    let mut notified = 0usize;
    for (driver_idx, package_idxs) in assignments.iter().enumerate() {
        if package_idxs.is_empty() {
            continue;
        }
        let driver = &drivers[driver_idx];

        ctx.connections.send(
            &driver.id,
            ServerMessage::AssignmentsReady {
                package_count: package_idxs.len(),
                assignment_date: date.to_string(),
            },
        );

        if let Some(token) = driver.fcm_token.as_deref() {
            let mut data = HashMap::new();
            data.insert("type".to_string(), "new_assignment".to_string());
            data.insert("package_count".to_string(), package_idxs.len().to_string());
            let ok = ctx
                .notifier
                .send(
                    token,
                    "📦 New Assignments",
                    &format!(
                        "Hi {}, you have {} new packages to deliver today.",
                        driver.name,
                        package_idxs.len()
                    ),
                    data,
                )
                .await;
            if ok {
                notified += 1;
            }
        }
    }
    if notified > 0 {
        info!("🔔 Sent {notified} assignment notifications");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::Config;
    use crate::connections::ConnectionRegistry;
    use crate::fairness::{DisabledSolver, SolvePath};
    use crate::ml::ModelRegistry;
    use crate::notify::test_support::RecordingDispatcher;
    use crate::store::test_support::{sample_driver, sample_package};
    use crate::store::FleetDb;
    use crate::weather::WeatherOracle;
    use std::sync::Arc;

    fn context(db: FleetDb) -> (JobContext, Arc<RecordingDispatcher>) {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        (
            JobContext {
                db,
                registry: ModelRegistry::empty(),
                notifier: dispatcher.clone(),
                connections: Arc::new(ConnectionRegistry::new()),
                cache: Cache::in_memory(),
                weather: Arc::new(WeatherOracle::new(None)),
                solver: Arc::new(DisabledSolver),
                config: Arc::new(Config::from_env()),
            },
            dispatcher,
        )
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()
    }

    fn seed(db: &FleetDb, drivers: usize, packages: usize) {
        for i in 0..drivers {
            let mut driver = sample_driver(&format!("d{i}"), &format!("d{i}@fleet.test"));
            driver.fcm_token = Some(format!("tok-{i}"));
            db.create_driver(&driver).unwrap();
        }
        for j in 0..packages {
            db.create_package(&sample_package(&format!("p{j}"), &format!("TRK-{j}")))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn empty_inputs_short_circuit() {
        let db = FleetDb::in_memory().unwrap();
        let (ctx, _) = context(db.clone());
        assert!(run_for_date(&ctx, date()).await.unwrap().is_none());

        seed(&db, 1, 0);
        assert!(run_for_date(&ctx, date()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn full_pipeline_covers_every_package() {
        let db = FleetDb::in_memory().unwrap();
        seed(&db, 3, 30);
        let (ctx, dispatcher) = context(db.clone());

        let report = run_for_date(&ctx, date()).await.unwrap().unwrap();
        assert_eq!(report.inserted, 30);
        // Neutral matrix + greedy keeps the split even.
        assert_eq!(report.fairness.path, SolvePath::Greedy);
        assert_eq!(report.fairness.packages_min, 10);
        assert_eq!(report.fairness.packages_max, 10);
        assert_eq!(report.fairness.gini, 0.0);

        // Every pending package became exactly one assignment row.
        let all = db.assignments_for_date(date()).unwrap();
        assert_eq!(all.len(), 30);
        assert!(db.get_pending_packages().unwrap().is_empty());

        // Explanations were attached.
        assert!(all.iter().all(|a| a.explanation_json.is_some()));

        // One push per driver with packages.
        assert_eq!(dispatcher.sent.lock().len(), 3);
    }

    #[tokio::test]
    async fn rerun_for_same_date_is_idempotent() {
        let db = FleetDb::in_memory().unwrap();
        seed(&db, 2, 8);
        let (ctx, _) = context(db.clone());

        let first = run_for_date(&ctx, date()).await.unwrap().unwrap();
        assert_eq!(first.inserted, 8);

        // Re-running with the same set: packages are assigned now, so the
        // pipeline has nothing pending.
        assert!(run_for_date(&ctx, date()).await.unwrap().is_none());
        assert_eq!(db.assignments_for_date(date()).unwrap().len(), 8);
    }
}
