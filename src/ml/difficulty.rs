//! Personalized difficulty scoring for (driver, package) pairs.

use super::registry::ModelRegistry;
use crate::models::{DriverFeatures, PackageFeatures};
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Score served when the predictor or scaler is absent.
pub const NEUTRAL_DIFFICULTY: f64 = 50.0;

pub const FEATURE_COUNT: usize = 15;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "experience_days",
    "avg_delivery_time_minutes",
    "success_rate",
    "vehicle_capacity_kg",
    "weight_kg",
    "distance_km",
    "floor_number",
    "is_fragile",
    "time_window_hours",
    "weight_capacity_ratio",
    "experience_distance_ratio",
    "success_weight_interaction",
    "distance_floor_interaction",
    "time_pressure",
    "complexity",
];

/// The 15-dimensional feature vector: eight raw inputs plus seven derived.
pub fn feature_vector(driver: &DriverFeatures, package: &PackageFeatures) -> Vec<f64> {
    let experience = driver.experience_days;
    let avg_time = driver.avg_delivery_time_minutes;
    let success_rate = driver.success_rate;
    let capacity = driver.vehicle_capacity_kg;

    let weight = package.weight_kg;
    let distance = package.distance_km;
    let floor = package.floor_number;
    let fragile = if package.is_fragile { 1.0 } else { 0.0 };
    let time_window = package.time_window_hours;

    let weight_ratio = weight / capacity.max(1.0);
    let exp_distance_ratio = experience / distance.max(1.0);
    let success_weight = success_rate * weight;
    let distance_floor = distance * floor.max(1.0);
    let time_pressure = 1.0 / time_window.max(1.0);
    let complexity = (weight * distance * floor.max(1.0)) / (experience + 1.0);

    vec![
        experience,
        avg_time,
        success_rate,
        capacity,
        weight,
        distance,
        floor,
        fragile,
        time_window,
        weight_ratio,
        exp_distance_ratio,
        success_weight,
        distance_floor,
        time_pressure,
        complexity,
    ]
}

pub struct DifficultyScorer {
    registry: Arc<ModelRegistry>,
}

impl DifficultyScorer {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Difficulty for one pair, clamped to [0, 100].
    pub fn score(&self, driver: &DriverFeatures, package: &PackageFeatures) -> f64 {
        let (Some(model), Some(scaler)) = (self.registry.difficulty(), self.registry.scaler())
        else {
            debug!("difficulty predictor absent, serving neutral score");
            return NEUTRAL_DIFFICULTY;
        };

        let features = feature_vector(driver, package);
        let Some(scaled) = scaler.transform(&features) else {
            warn!("scaler dimensionality mismatch, serving neutral score");
            return NEUTRAL_DIFFICULTY;
        };

        model.score(&scaled).clamp(0.0, 100.0)
    }

    /// Full D x P matrix in a single inference call. Rows are drivers,
    /// columns are packages. Absence fallback is a flat neutral matrix.
    pub fn score_matrix(
        &self,
        drivers: &[DriverFeatures],
        packages: &[PackageFeatures],
    ) -> DMatrix<f64> {
        let num_drivers = drivers.len();
        let num_packages = packages.len();

        let (Some(model), Some(scaler)) = (self.registry.difficulty(), self.registry.scaler())
        else {
            warn!("difficulty predictor absent, serving flat neutral matrix");
            return DMatrix::from_element(num_drivers, num_packages, NEUTRAL_DIFFICULTY);
        };

        // Row-major pair order: driver i, package j -> i * P + j.
        let rows: Vec<Vec<f64>> = (0..num_drivers * num_packages)
            .into_par_iter()
            .map(|idx| {
                let features =
                    feature_vector(&drivers[idx / num_packages], &packages[idx % num_packages]);
                scaler.transform(&features)
            })
            .collect::<Option<Vec<_>>>()
            .unwrap_or_default();

        if rows.len() != num_drivers * num_packages {
            warn!("scaler dimensionality mismatch, serving flat neutral matrix");
            return DMatrix::from_element(num_drivers, num_packages, NEUTRAL_DIFFICULTY);
        }

        let predictions = model.score_batch(&rows);
        info!(
            "📦 Batch difficulty prediction completed: {}x{} matrix",
            num_drivers, num_packages
        );

        DMatrix::from_fn(num_drivers, num_packages, |i, j| {
            predictions[i * num_packages + j].clamp(0.0, 100.0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::artifact::{ScalerArtifact, ScoreArtifact};
    use crate::ml::registry::ModelRegistry;

    fn driver() -> DriverFeatures {
        DriverFeatures {
            experience_days: 365.0,
            avg_delivery_time_minutes: 30.0,
            success_rate: 0.9,
            vehicle_capacity_kg: 50.0,
        }
    }

    fn package() -> PackageFeatures {
        PackageFeatures {
            weight_kg: 5.0,
            distance_km: 10.0,
            floor_number: 3.0,
            is_fragile: true,
            time_window_hours: 4.0,
        }
    }

    fn identity_scaler() -> ScalerArtifact {
        ScalerArtifact {
            mean: vec![0.0; FEATURE_COUNT],
            scale: vec![1.0; FEATURE_COUNT],
        }
    }

    #[test]
    fn feature_vector_has_fifteen_dims_with_derived_terms() {
        let features = feature_vector(&driver(), &package());
        assert_eq!(features.len(), FEATURE_COUNT);
        // weight/capacity
        assert!((features[9] - 5.0 / 50.0).abs() < 1e-12);
        // distance * floor
        assert!((features[12] - 30.0).abs() < 1e-12);
        // time pressure
        assert!((features[13] - 0.25).abs() < 1e-12);
        // (weight * distance * floor) / (experience + 1)
        assert!((features[14] - 150.0 / 366.0).abs() < 1e-12);
    }

    #[test]
    fn floor_zero_counts_as_one_in_interactions() {
        let mut pkg = package();
        pkg.floor_number = 0.0;
        let features = feature_vector(&driver(), &pkg);
        assert!((features[12] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn absent_model_serves_neutral() {
        let scorer = DifficultyScorer::new(ModelRegistry::empty());
        assert_eq!(scorer.score(&driver(), &package()), NEUTRAL_DIFFICULTY);

        let matrix = scorer.score_matrix(&[driver(), driver()], &[package(), package(), package()]);
        assert_eq!(matrix.nrows(), 2);
        assert_eq!(matrix.ncols(), 3);
        assert!(matrix.iter().all(|&v| v == NEUTRAL_DIFFICULTY));
    }

    #[test]
    fn score_is_clamped_to_band() {
        let registry = ModelRegistry::with_artifacts(
            Some(ScoreArtifact {
                bias: 500.0,
                weights: vec![0.0; FEATURE_COUNT],
            }),
            None,
            None,
            None,
            Some(identity_scaler()),
        );
        let scorer = DifficultyScorer::new(registry);
        assert_eq!(scorer.score(&driver(), &package()), 100.0);
    }

    #[test]
    fn matrix_matches_scalar_path() {
        let registry = ModelRegistry::with_artifacts(
            Some(ScoreArtifact {
                bias: 10.0,
                weights: (0..FEATURE_COUNT).map(|i| (i as f64) * 0.1).collect(),
            }),
            None,
            None,
            None,
            Some(identity_scaler()),
        );
        let scorer = DifficultyScorer::new(registry);

        let drivers = vec![driver(), driver()];
        let packages = vec![package(), package(), package()];
        let matrix = scorer.score_matrix(&drivers, &packages);
        for i in 0..2 {
            for j in 0..3 {
                let scalar = scorer.score(&drivers[i], &packages[j]);
                assert!((matrix[(i, j)] - scalar).abs() < 1e-9);
            }
        }
    }
}
