//! On-disk artifact formats.
//!
//! Each artifact is a JSON file exported by the offline training pipeline.
//! The shapes are deliberately minimal: a scoring function is its exported
//! coefficients, and the serving side stays agnostic about how they were fit.

use serde::Deserialize;

fn dot(weights: &[f64], features: &[f64]) -> f64 {
    weights.iter().zip(features).map(|(w, x)| w * x).sum()
}

/// Feature standardizer: `(x - mean) / scale` per dimension.
#[derive(Debug, Clone, Deserialize)]
pub struct ScalerArtifact {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl ScalerArtifact {
    /// Standardize a feature vector. Returns None when the artifact was
    /// trained on a different dimensionality (the caller falls back).
    pub fn transform(&self, features: &[f64]) -> Option<Vec<f64>> {
        if self.mean.len() < features.len() || self.scale.len() < features.len() {
            return None;
        }
        Some(
            features
                .iter()
                .enumerate()
                .map(|(i, x)| (x - self.mean[i]) / non_zero(self.scale[i]))
                .collect(),
        )
    }

    /// Standardize a single value with the first dimension (used by the
    /// one-dimensional volume series).
    pub fn scale_value(&self, value: f64) -> f64 {
        let mean = self.mean.first().copied().unwrap_or(0.0);
        let scale = non_zero(self.scale.first().copied().unwrap_or(1.0));
        (value - mean) / scale
    }

    pub fn unscale_value(&self, value: f64) -> f64 {
        let mean = self.mean.first().copied().unwrap_or(0.0);
        let scale = non_zero(self.scale.first().copied().unwrap_or(1.0));
        value * scale + mean
    }
}

fn non_zero(v: f64) -> f64 {
    if v.abs() < f64::EPSILON {
        1.0
    } else {
        v
    }
}

/// Regression scorer: `bias + w . x` over standardized features.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreArtifact {
    pub bias: f64,
    pub weights: Vec<f64>,
}

impl ScoreArtifact {
    pub fn score(&self, features: &[f64]) -> f64 {
        self.bias + dot(&self.weights, features)
    }

    /// One inference call over a batch of rows.
    pub fn score_batch(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| self.score(row)).collect()
    }
}

/// Binary classifier exposing P(high-risk class) via a logistic link.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierArtifact {
    pub bias: f64,
    pub weights: Vec<f64>,
}

impl ClassifierArtifact {
    pub fn prob_high(&self, features: &[f64]) -> f64 {
        let logit = self.bias + dot(&self.weights, features);
        1.0 / (1.0 + (-logit).exp())
    }
}

/// One-step recurrence over a standardized window: the next scaled value is
/// `bias + w . window`. The rollout loop lives with the forecaster.
#[derive(Debug, Clone, Deserialize)]
pub struct SequenceArtifact {
    pub bias: f64,
    pub weights: Vec<f64>,
}

impl SequenceArtifact {
    pub fn window_len(&self) -> usize {
        self.weights.len()
    }

    pub fn step(&self, window: &[f64]) -> f64 {
        // A short window uses the weight tail so the most recent values keep
        // their trained coefficients.
        let n = window.len().min(self.weights.len());
        let w_tail = &self.weights[self.weights.len() - n..];
        let x_tail = &window[window.len() - n..];
        self.bias + dot(w_tail, x_tail)
    }
}

/// Additive per-feature attribution for a difficulty prediction.
#[derive(Debug, Clone, Deserialize)]
pub struct ExplainerArtifact {
    pub base_value: f64,
    pub weights: Vec<f64>,
}

impl ExplainerArtifact {
    pub fn contributions(&self, scaled_features: &[f64]) -> Vec<f64> {
        scaled_features
            .iter()
            .enumerate()
            .map(|(i, x)| self.weights.get(i).copied().unwrap_or(0.0) * x)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaler_round_trips_scalar() {
        let scaler = ScalerArtifact {
            mean: vec![100.0],
            scale: vec![25.0],
        };
        let scaled = scaler.scale_value(150.0);
        assert!((scaled - 2.0).abs() < 1e-12);
        assert!((scaler.unscale_value(scaled) - 150.0).abs() < 1e-12);
    }

    #[test]
    fn scaler_rejects_dimension_mismatch() {
        let scaler = ScalerArtifact {
            mean: vec![0.0; 3],
            scale: vec![1.0; 3],
        };
        assert!(scaler.transform(&[1.0, 2.0, 3.0, 4.0]).is_none());
        assert!(scaler.transform(&[1.0, 2.0]).is_some());
    }

    #[test]
    fn zero_scale_does_not_divide_by_zero() {
        let scaler = ScalerArtifact {
            mean: vec![5.0],
            scale: vec![0.0],
        };
        assert!(scaler.scale_value(6.0).is_finite());
    }

    #[test]
    fn classifier_probability_bounded() {
        let clf = ClassifierArtifact {
            bias: 3.0,
            weights: vec![10.0],
        };
        let p = clf.prob_high(&[100.0]);
        assert!(p > 0.0 && p <= 1.0);
    }

    #[test]
    fn sequence_step_accepts_short_window() {
        let seq = SequenceArtifact {
            bias: 0.0,
            weights: vec![0.0, 0.0, 1.0],
        };
        // Only the most recent value carries weight.
        assert!((seq.step(&[7.0]) - 7.0).abs() < 1e-12);
        assert!((seq.step(&[1.0, 2.0, 7.0]) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn artifacts_deserialize_from_json() {
        let scorer: ScoreArtifact =
            serde_json::from_str(r#"{"bias": 50.0, "weights": [1.0, -2.0]}"#).unwrap();
        assert!((scorer.score(&[1.0, 1.0]) - 49.0).abs() < 1e-12);
    }
}
