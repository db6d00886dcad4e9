//! Per-feature attribution for difficulty predictions, attached to
//! assignments as an opaque explanation blob.

use super::difficulty::{feature_vector, FEATURE_NAMES};
use super::registry::ModelRegistry;
use crate::models::{DriverFeatures, PackageFeatures};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const TOP_FEATURES: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub value: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub base_value: f64,
    pub predicted_difficulty: f64,
    pub top_features: Vec<FeatureContribution>,
    /// "model" when the explainer artifact produced the attribution,
    /// "heuristic" on the fallback path.
    pub method: String,
}

pub struct DifficultyExplainer {
    registry: Arc<ModelRegistry>,
}

impl DifficultyExplainer {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn explain(
        &self,
        driver: &DriverFeatures,
        package: &PackageFeatures,
        predicted_difficulty: f64,
    ) -> Explanation {
        let features = feature_vector(driver, package);

        if let (Some(explainer), Some(scaler)) =
            (self.registry.explainer(), self.registry.scaler())
        {
            if let Some(scaled) = scaler.transform(&features) {
                let contributions = explainer.contributions(&scaled);
                return Explanation {
                    base_value: explainer.base_value,
                    predicted_difficulty,
                    top_features: rank(&features, &contributions),
                    method: "model".to_string(),
                };
            }
        }

        // Fallback attribution: spread the deviation from the neutral score
        // across features proportionally to their magnitude.
        let total: f64 = features.iter().map(|v| v.abs()).sum::<f64>().max(1.0);
        let deviation = predicted_difficulty - super::NEUTRAL_DIFFICULTY;
        let contributions: Vec<f64> = features
            .iter()
            .map(|v| deviation * v.abs() / total)
            .collect();

        Explanation {
            base_value: super::NEUTRAL_DIFFICULTY,
            predicted_difficulty,
            top_features: rank(&features, &contributions),
            method: "heuristic".to_string(),
        }
    }
}

fn rank(features: &[f64], contributions: &[f64]) -> Vec<FeatureContribution> {
    let mut entries: Vec<FeatureContribution> = FEATURE_NAMES
        .iter()
        .zip(features.iter().zip(contributions.iter()))
        .map(|(name, (value, contribution))| FeatureContribution {
            feature: name.to_string(),
            value: *value,
            contribution: *contribution,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.contribution
            .abs()
            .partial_cmp(&a.contribution.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    entries.truncate(TOP_FEATURES);
    entries
}
