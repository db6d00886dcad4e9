//! Insurance Calculator
//! Z-score based payouts shielding drivers from failure spikes caused by
//! external factors rather than their own performance.

use crate::config::InsuranceConfig;
use crate::error::{FleetError, FleetResult};
use crate::models::InsurancePayout;
use crate::store::{DriverFailureStats, FleetDb};
use chrono::{NaiveDate, Utc};
use statrs::statistics::Statistics;
use tracing::info;
use uuid::Uuid;

/// Pure payout computation over a claim population.
#[derive(Debug, Clone)]
pub struct PayoutComputation {
    pub driver_failure_rate: f64,
    pub population_mean: f64,
    pub population_std: f64,
    pub z_score: f64,
    pub eligible: bool,
    pub excess_failures: f64,
    pub payout_amount: f64,
    pub reason: String,
}

pub struct InsuranceCalculator {
    config: InsuranceConfig,
}

impl InsuranceCalculator {
    pub fn new(config: InsuranceConfig) -> Self {
        Self { config }
    }

    /// Standardized distance of `value` from the population. Zero spread
    /// means zero score by definition.
    pub fn z_score(value: f64, mean: f64, std: f64) -> f64 {
        if std == 0.0 {
            0.0
        } else {
            (value - mean) / std
        }
    }

    /// Evaluate one driver's claim against the population of failure rates.
    pub fn evaluate(
        &self,
        driver: &DriverFailureStats,
        population: &[DriverFailureStats],
    ) -> PayoutComputation {
        let rates: Vec<f64> = population.iter().map(|s| s.failure_rate()).collect();
        let population_mean = if rates.is_empty() { 0.0 } else { rates.iter().copied().mean() };
        let population_std = if rates.is_empty() {
            0.0
        } else {
            rates.iter().copied().population_std_dev()
        };

        let driver_rate = driver.failure_rate();
        let z = Self::z_score(driver_rate, population_mean, population_std);
        let eligible = z > self.config.z_score_moderate_threshold;

        let (excess_failures, payout_amount) = if eligible {
            let expected_failures = population_mean * driver.total as f64;
            let excess = (driver.failures as f64 - expected_failures).max(0.0);
            (excess, excess * self.config.base_penalty)
        } else {
            (0.0, 0.0)
        };

        PayoutComputation {
            driver_failure_rate: driver_rate,
            population_mean,
            population_std,
            z_score: z,
            eligible,
            excess_failures,
            payout_amount,
            reason: self.reason(eligible, z),
        }
    }

    fn reason(&self, eligible: bool, z: f64) -> String {
        // Scores sitting on a band boundary (within float noise) take the
        // higher band.
        const Z_EPS: f64 = 1e-9;
        if !eligible {
            return "Failure rate within normal range - no external factors detected".to_string();
        }
        if z + Z_EPS >= self.config.z_score_severe_threshold {
            "Extremely high failure rate - severe external factors detected".to_string()
        } else if z > 2.5 {
            "Very high failure rate - significant external factors detected".to_string()
        } else {
            "High failure rate - moderate external factors detected".to_string()
        }
    }
}

/// Evaluate and persist a claim for one driver over a window.
pub fn process_claim(
    db: &FleetDb,
    calculator: &InsuranceCalculator,
    driver_id: &str,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> FleetResult<InsurancePayout> {
    if window_end < window_start {
        return Err(FleetError::validation("claim window end precedes start"));
    }

    let population = db.population_failure_stats(window_start, window_end)?;
    let driver_stats = population
        .iter()
        .find(|s| s.driver_id == driver_id)
        .cloned()
        .ok_or_else(|| {
            FleetError::validation("driver has no deliveries in the claim window")
        })?;

    let computation = calculator.evaluate(&driver_stats, &population);

    let payout = InsurancePayout {
        id: Uuid::new_v4().to_string(),
        driver_id: driver_id.to_string(),
        window_start,
        window_end,
        driver_failure_rate: computation.driver_failure_rate,
        population_mean: computation.population_mean,
        population_std: computation.population_std,
        z_score: computation.z_score,
        excess_failures: computation.excess_failures,
        payout_amount: computation.payout_amount,
        eligible: computation.eligible,
        approved: false,
        paid: false,
        reason: computation.reason,
        created_at: Utc::now(),
    };
    db.insert_insurance_payout(&payout)?;

    if payout.eligible {
        info!(
            "🛡️  Insurance payout for driver {}: {:.2} (z-score: {:.2})",
            driver_id, payout.payout_amount, payout.z_score
        );
    } else {
        info!(
            "🛡️  Driver {} not eligible for insurance (z-score: {:.2})",
            driver_id, payout.z_score
        );
    }

    Ok(payout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(driver_id: &str, failures: i64, total: i64) -> DriverFailureStats {
        DriverFailureStats {
            driver_id: driver_id.to_string(),
            failures,
            total,
        }
    }

    fn calculator() -> InsuranceCalculator {
        InsuranceCalculator::new(InsuranceConfig::default())
    }

    #[test]
    fn zero_std_means_zero_z() {
        assert_eq!(InsuranceCalculator::z_score(0.5, 0.5, 0.0), 0.0);
        assert_eq!(InsuranceCalculator::z_score(0.9, 0.5, 0.0), 0.0);
    }

    #[test]
    fn identical_population_is_never_eligible() {
        let population: Vec<_> = (0..10).map(|i| stats(&format!("d{i}"), 5, 50)).collect();
        let calc = calculator();
        for driver in &population {
            let result = calc.evaluate(driver, &population);
            assert!(!result.eligible);
            assert_eq!(result.payout_amount, 0.0);
            assert_eq!(result.z_score, 0.0);
        }
    }

    #[test]
    fn outlier_driver_gets_severe_payout() {
        // Nine drivers at 2% failures, one at 30%, 50 tasks each.
        let mut population: Vec<_> = (0..9).map(|i| stats(&format!("d{i}"), 1, 50)).collect();
        population.push(stats("unlucky", 15, 50));

        let calc = calculator();
        let result = calc.evaluate(&population[9], &population);

        assert!((result.population_mean - 0.048).abs() < 1e-9);
        assert!((result.population_std - 0.084).abs() < 1e-3);
        assert!((result.z_score - 3.0).abs() < 0.01);
        assert!(result.eligible);
        // excess = 15 - 0.048 * 50 = 12.6 -> payout 1260.
        assert!((result.excess_failures - 12.6).abs() < 1e-9);
        assert!((result.payout_amount - 1260.0).abs() < 1e-6);
        assert!(result.reason.contains("severe"));
    }

    #[test]
    fn reason_bands_follow_z() {
        let calc = calculator();
        assert!(calc.reason(false, 1.0).contains("normal range"));
        assert!(calc.reason(true, 2.2).contains("moderate"));
        assert!(calc.reason(true, 2.7).contains("significant"));
        assert!(calc.reason(true, 3.5).contains("severe"));
    }

    #[test]
    fn claim_requires_window_activity() {
        let db = FleetDb::in_memory().unwrap();
        let calc = calculator();
        let start = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();

        let err = process_claim(&db, &calc, "ghost", start, end).unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));

        let err = process_claim(&db, &calc, "ghost", end, start).unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));
    }
}
