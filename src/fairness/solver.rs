//! Binary-MIP solver capability.
//!
//! The optimizer only needs `solve(problem, budget) -> outcome`; everything
//! else (which solver, in-process or subprocess) hides behind the trait. The
//! default implementation shells out to the CBC binary with an LP-format
//! model and suppressed output.

use nalgebra::DMatrix;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, warn};

/// The daily distribution problem in solver-neutral form.
#[derive(Debug, Clone)]
pub struct MipProblem {
    /// d[i, j]: difficulty of package j for driver i.
    pub costs: DMatrix<f64>,
    /// Per-driver package count band.
    pub min_per_driver: usize,
    pub max_per_driver: usize,
    /// Per-driver total-difficulty band (equity).
    pub equity_lower: f64,
    pub equity_upper: f64,
}

impl MipProblem {
    pub fn num_drivers(&self) -> usize {
        self.costs.nrows()
    }

    pub fn num_packages(&self) -> usize {
        self.costs.ncols()
    }

    /// CPLEX-LP rendering with binary variables x_{i}_{j}.
    pub fn to_lp(&self) -> String {
        let (n, p) = (self.num_drivers(), self.num_packages());
        let mut lp = String::with_capacity(64 * n * p);

        lp.push_str("Minimize\n obj:");
        for i in 0..n {
            for j in 0..p {
                let _ = write!(lp, " + {:.6} x_{}_{}", self.costs[(i, j)], i, j);
            }
        }
        lp.push_str("\nSubject To\n");

        // Coverage: every package to exactly one driver.
        for j in 0..p {
            let _ = write!(lp, " cover_{j}:");
            for i in 0..n {
                let _ = write!(lp, " + x_{i}_{j}");
            }
            lp.push_str(" = 1\n");
        }

        // Capacity band per driver.
        for i in 0..n {
            let _ = write!(lp, " cap_lo_{i}:");
            for j in 0..p {
                let _ = write!(lp, " + x_{i}_{j}");
            }
            let _ = writeln!(lp, " >= {}", self.min_per_driver);

            let _ = write!(lp, " cap_hi_{i}:");
            for j in 0..p {
                let _ = write!(lp, " + x_{i}_{j}");
            }
            let _ = writeln!(lp, " <= {}", self.max_per_driver);
        }

        // Equity band per driver over assigned difficulty totals.
        for i in 0..n {
            let _ = write!(lp, " eq_lo_{i}:");
            for j in 0..p {
                let _ = write!(lp, " + {:.6} x_{}_{}", self.costs[(i, j)], i, j);
            }
            let _ = writeln!(lp, " >= {:.6}", self.equity_lower);

            let _ = write!(lp, " eq_hi_{i}:");
            for j in 0..p {
                let _ = write!(lp, " + {:.6} x_{}_{}", self.costs[(i, j)], i, j);
            }
            let _ = writeln!(lp, " <= {:.6}", self.equity_upper);
        }

        lp.push_str("Binary\n");
        for i in 0..n {
            for j in 0..p {
                let _ = write!(lp, " x_{i}_{j}");
            }
        }
        lp.push_str("\nEnd\n");
        lp
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveOutcome {
    /// x[i, j] = 1 pairs from the optimal solution.
    Optimal(Vec<(usize, usize)>),
    Infeasible,
    TimedOut,
    /// No solver available in this deployment; caller falls back.
    Unavailable,
}

pub trait MipSolver: Send + Sync {
    fn solve(&self, problem: &MipProblem, budget: Duration) -> SolveOutcome;
}

/// Shells out to the CBC command-line solver. Output is suppressed; the
/// wall-clock budget is enforced via CBC's own `seconds` limit.
pub struct CbcSolver {
    binary: String,
}

impl CbcSolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn scratch_paths() -> (PathBuf, PathBuf) {
        let tag = uuid::Uuid::new_v4();
        let dir = std::env::temp_dir();
        (
            dir.join(format!("fleetfair-{tag}.lp")),
            dir.join(format!("fleetfair-{tag}.sol")),
        )
    }
}

impl MipSolver for CbcSolver {
    fn solve(&self, problem: &MipProblem, budget: Duration) -> SolveOutcome {
        let (lp_path, sol_path) = Self::scratch_paths();

        if let Err(e) = std::fs::write(&lp_path, problem.to_lp()) {
            warn!("failed to write LP model: {e}");
            return SolveOutcome::Unavailable;
        }

        let run = Command::new(&self.binary)
            .arg(&lp_path)
            .arg("seconds")
            .arg(budget.as_secs().max(1).to_string())
            .arg("solve")
            .arg("solu")
            .arg(&sol_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        let outcome = match run {
            Err(e) => {
                warn!("CBC solver not runnable ({e}); treating as unavailable");
                SolveOutcome::Unavailable
            }
            Ok(status) if !status.success() => {
                warn!("CBC exited with {status}");
                SolveOutcome::Unavailable
            }
            Ok(_) => match std::fs::read_to_string(&sol_path) {
                Err(e) => {
                    warn!("CBC produced no solution file: {e}");
                    SolveOutcome::Unavailable
                }
                Ok(raw) => parse_cbc_solution(&raw, problem.num_packages()),
            },
        };

        let _ = std::fs::remove_file(&lp_path);
        let _ = std::fs::remove_file(&sol_path);
        outcome
    }
}

fn parse_cbc_solution(raw: &str, num_packages: usize) -> SolveOutcome {
    let mut lines = raw.lines();
    let Some(header) = lines.next() else {
        return SolveOutcome::Unavailable;
    };

    let header_lower = header.to_lowercase();
    if header_lower.contains("infeasible") {
        return SolveOutcome::Infeasible;
    }
    if header_lower.contains("stopped") {
        // CBC reports "Stopped on time limit" when the seconds budget ran out.
        return SolveOutcome::TimedOut;
    }
    if !header_lower.contains("optimal") {
        debug!("unrecognized CBC status line: {header}");
        return SolveOutcome::Infeasible;
    }

    let mut chosen = Vec::new();
    for line in lines {
        // Solution rows: <index> <name> <value> <reduced cost>
        let mut parts = line.split_whitespace();
        let (Some(_), Some(name), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let value: f64 = match value.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        if value < 0.5 {
            continue;
        }
        let Some(rest) = name.strip_prefix("x_") else {
            continue;
        };
        let Some((i_raw, j_raw)) = rest.split_once('_') else {
            continue;
        };
        if let (Ok(i), Ok(j)) = (i_raw.parse::<usize>(), j_raw.parse::<usize>()) {
            if j < num_packages {
                chosen.push((i, j));
            }
        }
    }

    SolveOutcome::Optimal(chosen)
}

/// Always reports `Unavailable`. Used in tests and in deployments without a
/// solver binary to force the deterministic greedy path.
pub struct DisabledSolver;

impl MipSolver for DisabledSolver {
    fn solve(&self, _problem: &MipProblem, _budget: Duration) -> SolveOutcome {
        SolveOutcome::Unavailable
    }
}
