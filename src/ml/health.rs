//! Health-risk scoring and the break advisor.

use super::registry::ModelRegistry;
use crate::models::{BreakPlan, HealthVitals, RiskSeverity, WorkloadSnapshot};
use std::sync::Arc;
use tracing::{debug, warn};

/// Risk served when the health predictor or scaler is absent.
pub const NEUTRAL_RISK: f64 = 50.0;

pub const HEALTH_FEATURE_COUNT: usize = 12;

/// The 12-dimensional health feature vector: eight raw inputs plus four
/// derived stress terms.
pub fn health_feature_vector(vitals: &HealthVitals, workload: &WorkloadSnapshot) -> Vec<f64> {
    let heart_rate = vitals.heart_rate_bpm;
    let fatigue = vitals.fatigue_level;
    let hours_worked = vitals.hours_worked;
    let last_break = vitals.hours_since_last_break;

    let delivered = workload.packages_delivered;
    let remaining = workload.packages_remaining;
    let distance = workload.total_distance_km;
    let difficulty = workload.avg_package_difficulty;

    let work_intensity = delivered / hours_worked.max(1.0);
    let fatigue_ratio = fatigue / hours_worked.max(1.0);
    let hr_normalized = (heart_rate - 60.0) / 40.0;
    let workload_stress = (remaining * difficulty * distance) / 1000.0;

    vec![
        heart_rate,
        fatigue,
        hours_worked,
        last_break,
        delivered,
        remaining,
        distance,
        difficulty,
        work_intensity,
        fatigue_ratio,
        hr_normalized,
        workload_stress,
    ]
}

/// Severity band for a risk score.
pub fn severity_for(risk_score: f64) -> RiskSeverity {
    if risk_score < 40.0 {
        RiskSeverity::Low
    } else if risk_score < 60.0 {
        RiskSeverity::Medium
    } else if risk_score < 75.0 {
        RiskSeverity::High
    } else {
        RiskSeverity::Critical
    }
}

pub struct HealthScorer {
    registry: Arc<ModelRegistry>,
}

impl HealthScorer {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Risk score in [0, 100]. The classifier exposes P(high-risk), so the
    /// score is that probability times 100.
    pub fn risk_score(&self, vitals: &HealthVitals, workload: &WorkloadSnapshot) -> f64 {
        let (Some(model), Some(scaler)) = (self.registry.health(), self.registry.scaler()) else {
            debug!("health predictor absent, serving neutral risk");
            return NEUTRAL_RISK;
        };

        let features = health_feature_vector(vitals, workload);
        let Some(scaled) = scaler.transform(&features) else {
            warn!("scaler dimensionality mismatch, serving neutral risk");
            return NEUTRAL_RISK;
        };

        (model.prob_high(&scaled) * 100.0).clamp(0.0, 100.0)
    }

    /// Break decision matrix over (risk, remaining difficulty, hours worked).
    /// Returns None when no break is warranted.
    pub fn recommend_break(
        &self,
        risk_score: f64,
        remaining_difficulty: f64,
        hours_worked: f64,
    ) -> Option<BreakPlan> {
        let (duration, urgency, reason) = if risk_score >= 90.0 {
            (60, "critical", "Critical health risk detected. Take extended break immediately.")
        } else if risk_score >= 80.0 {
            (45, "critical", "Very high health risk. Take a substantial break now.")
        } else if risk_score >= 75.0 {
            (30, "critical", "High health risk. Take a break as soon as possible.")
        } else if risk_score >= 60.0 {
            (20, "high", "Elevated health risk. A short break is recommended.")
        } else if risk_score >= 40.0 && (remaining_difficulty > 50.0 || hours_worked > 6.0) {
            (15, "medium", "Moderate risk with significant remaining work. Short break advised.")
        } else if hours_worked > 8.0 {
            (15, "medium", "Extended work hours. Brief rest recommended.")
        } else {
            return None;
        };

        let timing = if remaining_difficulty > 70.0 {
            "after_next_delivery"
        } else if hours_worked > 7.0 {
            "immediately"
        } else {
            "within_30_minutes"
        };

        Some(BreakPlan {
            duration_minutes: duration,
            urgency: urgency.to_string(),
            reason: reason.to_string(),
            timing: timing.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::artifact::{ClassifierArtifact, ScalerArtifact};
    use crate::ml::registry::ModelRegistry;

    fn vitals() -> HealthVitals {
        HealthVitals {
            heart_rate_bpm: 120.0,
            fatigue_level: 9.0,
            hours_worked: 9.0,
            hours_since_last_break: 5.0,
        }
    }

    fn workload() -> WorkloadSnapshot {
        WorkloadSnapshot {
            packages_delivered: 20.0,
            packages_remaining: 10.0,
            total_distance_km: 60.0,
            avg_package_difficulty: 70.0,
        }
    }

    #[test]
    fn feature_vector_derived_terms() {
        let features = health_feature_vector(&vitals(), &workload());
        assert_eq!(features.len(), HEALTH_FEATURE_COUNT);
        // delivered / hours
        assert!((features[8] - 20.0 / 9.0).abs() < 1e-12);
        // (heart_rate - 60) / 40
        assert!((features[10] - 1.5).abs() < 1e-12);
        // remaining * difficulty * distance / 1000
        assert!((features[11] - 42.0).abs() < 1e-12);
    }

    #[test]
    fn severity_band_boundaries() {
        assert_eq!(severity_for(0.0), RiskSeverity::Low);
        assert_eq!(severity_for(39.9), RiskSeverity::Low);
        assert_eq!(severity_for(40.0), RiskSeverity::Medium);
        assert_eq!(severity_for(60.0), RiskSeverity::High);
        assert_eq!(severity_for(75.0), RiskSeverity::Critical);
        assert_eq!(severity_for(100.0), RiskSeverity::Critical);
    }

    #[test]
    fn absent_model_serves_neutral_risk() {
        let scorer = HealthScorer::new(ModelRegistry::empty());
        assert_eq!(scorer.risk_score(&vitals(), &workload()), NEUTRAL_RISK);
    }

    #[test]
    fn classifier_probability_drives_score() {
        let registry = ModelRegistry::with_artifacts(
            None,
            None,
            Some(ClassifierArtifact {
                bias: 0.0,
                weights: vec![0.0; HEALTH_FEATURE_COUNT],
            }),
            None,
            Some(ScalerArtifact {
                mean: vec![0.0; HEALTH_FEATURE_COUNT],
                scale: vec![1.0; HEALTH_FEATURE_COUNT],
            }),
        );
        let scorer = HealthScorer::new(registry);
        // Zero logit -> P = 0.5 -> score 50.
        assert!((scorer.risk_score(&vitals(), &workload()) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn break_matrix_escalates_with_risk() {
        let scorer = HealthScorer::new(ModelRegistry::empty());

        let plan = scorer.recommend_break(95.0, 10.0, 2.0).unwrap();
        assert_eq!(plan.duration_minutes, 60);
        assert_eq!(plan.urgency, "critical");

        let plan = scorer.recommend_break(82.0, 10.0, 2.0).unwrap();
        assert_eq!(plan.duration_minutes, 45);

        let plan = scorer.recommend_break(76.0, 10.0, 2.0).unwrap();
        assert_eq!(plan.duration_minutes, 30);

        let plan = scorer.recommend_break(65.0, 10.0, 2.0).unwrap();
        assert_eq!(plan.duration_minutes, 20);
        assert_eq!(plan.urgency, "high");
    }

    #[test]
    fn medium_risk_needs_workload_or_long_day() {
        let scorer = HealthScorer::new(ModelRegistry::empty());
        assert!(scorer.recommend_break(50.0, 40.0, 5.0).is_none());

        let plan = scorer.recommend_break(50.0, 500.0, 5.0).unwrap();
        assert_eq!(plan.duration_minutes, 15);
        assert_eq!(plan.urgency, "medium");
        assert_eq!(plan.timing, "after_next_delivery");

        let plan = scorer.recommend_break(50.0, 40.0, 6.5).unwrap();
        assert_eq!(plan.duration_minutes, 15);
    }

    #[test]
    fn long_day_alone_earns_short_break() {
        let scorer = HealthScorer::new(ModelRegistry::empty());
        let plan = scorer.recommend_break(20.0, 10.0, 8.5).unwrap();
        assert_eq!(plan.duration_minutes, 15);
        assert_eq!(plan.timing, "immediately");

        assert!(scorer.recommend_break(20.0, 10.0, 4.0).is_none());
    }
}
