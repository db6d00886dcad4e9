//! Fairness Optimizer
//! Distributes the daily package batch across drivers by solving a binary
//! integer program (coverage + capacity band + equity band), with a
//! deterministic greedy fallback whenever the solver cannot prove optimality
//! inside its wall-clock budget.

pub mod solver;

pub use solver::{CbcSolver, DisabledSolver, MipProblem, MipSolver, SolveOutcome};

use crate::config::FairnessConfig;
use anyhow::{bail, Result};
use metrics::counter;
use nalgebra::DMatrix;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolvePath {
    Optimal,
    Greedy,
}

/// Distribution quality metrics, logged after every run.
#[derive(Debug, Clone, Serialize)]
pub struct FairnessReport {
    pub path: SolvePath,
    pub packages_min: usize,
    pub packages_max: usize,
    pub packages_mean: f64,
    pub difficulty_min: f64,
    pub difficulty_max: f64,
    pub difficulty_mean: f64,
    pub difficulty_variance: f64,
    pub gini: f64,
}

/// The solved distribution: `assignments[i]` holds the package indices given
/// to driver `i`.
#[derive(Debug, Clone)]
pub struct DistributionPlan {
    pub assignments: Vec<Vec<usize>>,
    pub report: FairnessReport,
}

pub struct FairnessOptimizer {
    config: FairnessConfig,
}

impl FairnessOptimizer {
    pub fn new(config: FairnessConfig) -> Self {
        Self { config }
    }

    /// Solve the daily distribution. `costs[(i, j)]` is the difficulty of
    /// package `j` for driver `i`.
    ///
    /// Fails fast when the batch cannot fit under the per-driver maximum; a
    /// batch too small for the per-driver minimum runs greedy with a warning
    /// (the exact program is infeasible by construction).
    pub fn optimize(&self, costs: &DMatrix<f64>, solver: &dyn MipSolver) -> Result<DistributionPlan> {
        let num_drivers = costs.nrows();
        let num_packages = costs.ncols();

        if num_drivers == 0 {
            bail!("no drivers to assign to");
        }
        if num_packages == 0 {
            bail!("no packages to distribute");
        }
        if num_packages > num_drivers * self.config.max_packages_per_driver {
            // Never silently drop a package.
            bail!(
                "{num_packages} packages exceed fleet capacity ({num_drivers} drivers x {} max)",
                self.config.max_packages_per_driver
            );
        }

        info!(
            "⚖️  Starting fairness optimization: {} drivers, {} packages",
            num_drivers, num_packages
        );

        if num_packages < num_drivers * self.config.min_packages_per_driver {
            warn!(
                "batch below fleet minimum ({} < {} x {}); exact program infeasible, using greedy",
                num_packages, num_drivers, self.config.min_packages_per_driver
            );
            return Ok(self.greedy(costs));
        }

        let matrix_mean = costs.iter().sum::<f64>() / (num_drivers * num_packages) as f64;
        let problem = MipProblem {
            costs: costs.clone(),
            min_per_driver: self.config.min_packages_per_driver,
            max_per_driver: self.config.max_packages_per_driver,
            equity_lower: matrix_mean - self.config.variance_threshold,
            equity_upper: matrix_mean + self.config.variance_threshold,
        };

        let budget = Duration::from_secs(self.config.timeout_seconds);
        match solver.solve(&problem, budget) {
            SolveOutcome::Optimal(pairs) => match self.plan_from_pairs(costs, &pairs) {
                Some(plan) => {
                    counter!("fairness_optimal_runs_total", 1);
                    info!("✅ Optimization status: Optimal");
                    Ok(plan)
                }
                None => {
                    warn!("solver solution did not cover every package exactly once; using greedy");
                    Ok(self.greedy(costs))
                }
            },
            outcome => {
                warn!("optimization did not find optimal solution ({outcome:?}); using greedy");
                Ok(self.greedy(costs))
            }
        }
    }

    fn plan_from_pairs(
        &self,
        costs: &DMatrix<f64>,
        pairs: &[(usize, usize)],
    ) -> Option<DistributionPlan> {
        let num_drivers = costs.nrows();
        let num_packages = costs.ncols();
        let mut assignments = vec![Vec::new(); num_drivers];
        let mut covered = vec![false; num_packages];

        for &(i, j) in pairs {
            if i >= num_drivers || j >= num_packages || covered[j] {
                return None;
            }
            covered[j] = true;
            assignments[i].push(j);
        }
        if !covered.iter().all(|&c| c) {
            return None;
        }

        let report = build_report(SolvePath::Optimal, costs, &assignments);
        log_report(&report);
        Some(DistributionPlan {
            assignments,
            report,
        })
    }

    /// Greedy fallback: rank packages by mean difficulty across drivers,
    /// hardest first, and hand each to the driver with the smallest
    /// accumulated total, honoring the per-driver maximum. Always returns a
    /// complete cover.
    fn greedy(&self, costs: &DMatrix<f64>) -> DistributionPlan {
        counter!("fairness_greedy_runs_total", 1);
        warn!("⚖️  Using greedy fallback assignment");

        let num_drivers = costs.nrows();
        let num_packages = costs.ncols();

        let mut order: Vec<usize> = (0..num_packages).collect();
        let package_mean = |j: usize| costs.column(j).iter().sum::<f64>() / num_drivers as f64;
        order.sort_by(|&a, &b| {
            package_mean(b)
                .partial_cmp(&package_mean(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut assignments = vec![Vec::new(); num_drivers];
        let mut totals = vec![0.0f64; num_drivers];

        for j in order {
            let candidate = (0..num_drivers)
                .filter(|&i| assignments[i].len() < self.config.max_packages_per_driver)
                .min_by(|&a, &b| {
                    totals[a]
                        .partial_cmp(&totals[b])
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                // Capacity was checked up front, so a slot always exists.
                .unwrap_or(0);

            assignments[candidate].push(j);
            totals[candidate] += costs[(candidate, j)];
        }

        let report = build_report(SolvePath::Greedy, costs, &assignments);
        log_report(&report);
        DistributionPlan {
            assignments,
            report,
        }
    }
}

fn build_report(path: SolvePath, costs: &DMatrix<f64>, assignments: &[Vec<usize>]) -> FairnessReport {
    let counts: Vec<usize> = assignments.iter().map(|a| a.len()).collect();
    let totals: Vec<f64> = assignments
        .iter()
        .enumerate()
        .map(|(i, packages)| packages.iter().map(|&j| costs[(i, j)]).sum())
        .collect();

    let n = counts.len().max(1) as f64;
    let count_mean = counts.iter().sum::<usize>() as f64 / n;
    let total_mean = totals.iter().sum::<f64>() / n;
    let variance = totals
        .iter()
        .map(|t| (t - total_mean).powi(2))
        .sum::<f64>()
        / n;

    FairnessReport {
        path,
        packages_min: counts.iter().copied().min().unwrap_or(0),
        packages_max: counts.iter().copied().max().unwrap_or(0),
        packages_mean: count_mean,
        difficulty_min: totals.iter().copied().fold(f64::INFINITY, f64::min),
        difficulty_max: totals.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        difficulty_mean: total_mean,
        difficulty_variance: variance,
        gini: gini_coefficient(&totals),
    }
}

fn log_report(report: &FairnessReport) {
    info!(
        "⚖️  Fairness metrics: packages min={} max={} avg={:.1} | difficulty min={:.2} max={:.2} avg={:.2} var={:.2} | gini={:.4}",
        report.packages_min,
        report.packages_max,
        report.packages_mean,
        report.difficulty_min,
        report.difficulty_max,
        report.difficulty_mean,
        report.difficulty_variance,
        report.gini,
    );
}

/// Gini coefficient over per-driver difficulty totals.
/// 0 = perfect equality, 1 = perfect inequality.
pub fn gini_coefficient(values: &[f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let sum: f64 = sorted.iter().sum();
    if sum <= f64::EPSILON {
        return 0.0;
    }

    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(idx, v)| (idx as f64 + 1.0) * v)
        .sum();
    let n = n as f64;

    (2.0 * weighted) / (n * sum) - (n + 1.0) / n
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Solver stub returning a caller-supplied solution.
    struct StubSolver(SolveOutcome);

    impl MipSolver for StubSolver {
        fn solve(&self, _problem: &MipProblem, _budget: Duration) -> SolveOutcome {
            self.0.clone()
        }
    }

    fn config(min: usize, max: usize) -> FairnessConfig {
        FairnessConfig {
            max_packages_per_driver: max,
            min_packages_per_driver: min,
            variance_threshold: 10.0,
            timeout_seconds: 1,
        }
    }

    #[test]
    fn gini_zero_for_equal_totals() {
        assert_eq!(gini_coefficient(&[500.0, 500.0, 500.0]), 0.0);
        assert_eq!(gini_coefficient(&[]), 0.0);
        assert_eq!(gini_coefficient(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn gini_increases_with_inequality() {
        let even = gini_coefficient(&[100.0, 100.0, 100.0, 100.0]);
        let skewed = gini_coefficient(&[10.0, 10.0, 10.0, 370.0]);
        assert!(skewed > even);
        assert!(skewed < 1.0);
        // Known value: [1, 2, 3] -> 2*(1+4+9)/(3*6) - 4/3 = 28/18 - 24/18.
        assert!((gini_coefficient(&[1.0, 2.0, 3.0]) - 2.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn overfull_batch_fails_fast() {
        let optimizer = FairnessOptimizer::new(config(1, 2));
        let costs = DMatrix::from_element(2, 5, 50.0);
        let result = optimizer.optimize(&costs, &DisabledSolver);
        assert!(result.is_err());
    }

    #[test]
    fn small_batch_warns_and_runs_greedy() {
        let optimizer = FairnessOptimizer::new(config(10, 11));
        let costs = DMatrix::from_element(3, 5, 50.0);
        let plan = optimizer.optimize(&costs, &DisabledSolver).unwrap();
        assert_eq!(plan.report.path, SolvePath::Greedy);
        let covered: usize = plan.assignments.iter().map(|a| a.len()).sum();
        assert_eq!(covered, 5);
    }

    #[test]
    fn greedy_covers_all_and_balances_counts() {
        let optimizer = FairnessOptimizer::new(config(10, 11));
        let costs = DMatrix::from_element(3, 30, 50.0);
        let plan = optimizer.optimize(&costs, &DisabledSolver).unwrap();

        assert_eq!(plan.report.path, SolvePath::Greedy);
        let mut covered = vec![false; 30];
        for packages in &plan.assignments {
            for &j in packages {
                assert!(!covered[j], "package {j} assigned twice");
                covered[j] = true;
            }
        }
        assert!(covered.iter().all(|&c| c));
        assert!(plan.report.packages_max - plan.report.packages_min <= 1);
        assert_eq!(plan.report.gini, 0.0);
    }

    #[test]
    fn greedy_honors_max_per_driver() {
        let optimizer = FairnessOptimizer::new(config(1, 4));
        // Driver 0 is far cheaper on every package; the cap still spreads work.
        let costs = DMatrix::from_fn(3, 10, |i, _| if i == 0 { 1.0 } else { 100.0 });
        let plan = optimizer.optimize(&costs, &DisabledSolver).unwrap();
        for packages in &plan.assignments {
            assert!(packages.len() <= 4);
        }
    }

    #[test]
    fn optimal_solution_accepted_when_cover_is_exact() {
        let optimizer = FairnessOptimizer::new(config(1, 1));
        let costs = DMatrix::from_element(2, 2, 50.0);
        let solver = StubSolver(SolveOutcome::Optimal(vec![(0, 0), (1, 1)]));
        let plan = optimizer.optimize(&costs, &solver).unwrap();
        assert_eq!(plan.report.path, SolvePath::Optimal);
        assert_eq!(plan.assignments[0], vec![0]);
        assert_eq!(plan.assignments[1], vec![1]);
    }

    #[test]
    fn broken_cover_from_solver_falls_back_to_greedy() {
        let optimizer = FairnessOptimizer::new(config(1, 2));
        let costs = DMatrix::from_element(2, 2, 50.0);
        // Package 1 missing from the solution.
        let solver = StubSolver(SolveOutcome::Optimal(vec![(0, 0)]));
        let plan = optimizer.optimize(&costs, &solver).unwrap();
        assert_eq!(plan.report.path, SolvePath::Greedy);
    }

    #[test]
    fn timeout_triggers_greedy() {
        let optimizer = FairnessOptimizer::new(config(1, 2));
        let costs = DMatrix::from_element(2, 4, 50.0);
        let plan = optimizer
            .optimize(&costs, &StubSolver(SolveOutcome::TimedOut))
            .unwrap();
        assert_eq!(plan.report.path, SolvePath::Greedy);
    }

    #[test]
    fn optimal_gini_not_worse_than_greedy_on_structured_costs() {
        // Costs where a balanced optimal split exists.
        let costs = DMatrix::from_fn(2, 4, |i, j| {
            if (i + j) % 2 == 0 {
                30.0
            } else {
                70.0
            }
        });
        let optimizer = FairnessOptimizer::new(config(2, 2));

        // Optimal: each driver takes one cheap and one expensive package.
        let solver = StubSolver(SolveOutcome::Optimal(vec![(0, 0), (0, 1), (1, 2), (1, 3)]));
        let optimal = optimizer.optimize(&costs, &solver).unwrap();
        let greedy = optimizer.optimize(&costs, &DisabledSolver).unwrap();

        assert!(optimal.report.gini <= greedy.report.gini + 1e-12);
    }
}
