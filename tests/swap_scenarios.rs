//! Swap marketplace scenarios: the happy path and the concurrent loser.

mod common;

use chrono::Utc;
use common::*;
use fleetfair_backend::config::SwapConfig;
use fleetfair_backend::error::FleetError;
use fleetfair_backend::models::SwapStatus;
use fleetfair_backend::store::{FleetDb, NewAssignment};
use fleetfair_backend::swap::SwapService;
use std::sync::Arc;

fn seed_assignments(db: &FleetDb) {
    seed_fleet(db, 2, 0);
    for pkg in ["p1", "p2", "p3"] {
        db.create_package(&package(pkg)).unwrap();
    }
    db.insert_daily_assignments(&[
        NewAssignment {
            id: "a1".to_string(),
            driver_id: "d0".to_string(),
            package_id: "p1".to_string(),
            assignment_date: operational_date(),
            predicted_difficulty: 40.0,
            assigned_at: Utc::now(),
        },
        NewAssignment {
            id: "a2".to_string(),
            driver_id: "d1".to_string(),
            package_id: "p2".to_string(),
            assignment_date: operational_date(),
            predicted_difficulty: 60.0,
            assigned_at: Utc::now(),
        },
        NewAssignment {
            id: "a3".to_string(),
            driver_id: "d0".to_string(),
            package_id: "p3".to_string(),
            assignment_date: operational_date(),
            predicted_difficulty: 55.0,
            assigned_at: Utc::now(),
        },
    ])
    .unwrap();
}

fn service(db: &FleetDb) -> SwapService {
    SwapService::new(
        db.clone(),
        SwapConfig::default(),
        Arc::new(CapturingDispatcher::default()),
    )
}

/// S3: A proposes, B accepts; the two driver ids are exactly exchanged and
/// the swap finishes completed.
#[tokio::test]
async fn swap_happy_path_exchanges_drivers() {
    let db = FleetDb::in_memory().unwrap();
    seed_assignments(&db);
    let svc = service(&db);

    let swap = svc
        .propose("d0", "p1", "p2", None, operational_date())
        .await
        .unwrap();
    assert_eq!(swap.status, SwapStatus::Pending);
    assert_eq!(swap.acceptor_id, "d1");

    let completed = svc
        .accept(&swap.id, "d1", operational_date())
        .await
        .unwrap();
    assert_eq!(completed.status, SwapStatus::Completed);
    assert!(completed.completed_at.is_some());

    let a1 = db.get_assignment("a1").unwrap().unwrap();
    let a2 = db.get_assignment("a2").unwrap().unwrap();
    assert_eq!(a1.driver_id, "d1");
    assert_eq!(a2.driver_id, "d0");

    // Swap atomicity: nothing else about the rows changed.
    assert_eq!(a1.predicted_difficulty, 40.0);
    assert_eq!(a2.predicted_difficulty, 60.0);
    assert_eq!(a1.assignment_date, operational_date());
    assert!(!a1.completed && !a1.failed);
}

/// S4: two proposals target the same assignment; the second accept fails
/// validation because ownership moved, and no state is half-written.
#[tokio::test]
async fn concurrent_swap_loser_fails_cleanly() {
    let db = FleetDb::in_memory().unwrap();
    seed_assignments(&db);
    let svc = service(&db);

    let s1 = svc
        .propose("d0", "p1", "p2", None, operational_date())
        .await
        .unwrap();
    // Second proposal from the same driver via a different offered package;
    // inserted directly to sidestep the proposal cooldown.
    let mut s2 = s1.clone();
    s2.id = "s2".to_string();
    s2.offered_package_id = "p3".to_string();
    db.create_swap(&s2).unwrap();

    svc.accept(&s1.id, "d1", operational_date()).await.unwrap();

    let before_a3 = db.get_assignment("a3").unwrap().unwrap();
    let err = svc.accept("s2", "d1", operational_date()).await.unwrap_err();
    assert!(matches!(err, FleetError::Validation(_)));

    // Loser terminal, nothing exchanged for it.
    assert_eq!(db.get_swap("s2").unwrap().unwrap().status, SwapStatus::Rejected);
    let after_a3 = db.get_assignment("a3").unwrap().unwrap();
    assert_eq!(before_a3.driver_id, after_a3.driver_id);
}

/// Cancelled swaps are terminal and acceptance is refused afterwards.
#[tokio::test]
async fn cancelled_swap_cannot_be_accepted() {
    let db = FleetDb::in_memory().unwrap();
    seed_assignments(&db);
    let svc = service(&db);

    let swap = svc
        .propose("d0", "p1", "p2", None, operational_date())
        .await
        .unwrap();
    svc.cancel(&swap.id, "d0").unwrap();

    let err = svc
        .accept(&swap.id, "d1", operational_date())
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Validation(_)));

    // Assignments untouched.
    assert_eq!(db.get_assignment("a1").unwrap().unwrap().driver_id, "d0");
    assert_eq!(db.get_assignment("a2").unwrap().unwrap().driver_id, "d1");
}
