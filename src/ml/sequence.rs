//! Autoregressive daily-volume forecasting.

use super::registry::ModelRegistry;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// History window consumed per prediction step.
pub const SEQUENCE_LEN: usize = 30;

/// Daily volume served on the fallback path.
pub const FALLBACK_BASE_VOLUME: f64 = 100.0;

const BASE_CONFIDENCE: f64 = 0.95;
const CONFIDENCE_DECAY: f64 = 0.01;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumePoint {
    pub date: NaiveDate,
    pub predicted_volume: i64,
    pub day_of_week: String,
    pub confidence: f64,
}

pub struct VolumeForecaster {
    registry: Arc<ModelRegistry>,
}

impl VolumeForecaster {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// N-day forecast starting at `today + 1`. Always returns exactly `days`
    /// consecutive dated points.
    pub fn forecast(&self, historical: &[f64], days: usize, today: NaiveDate) -> Vec<VolumePoint> {
        let (Some(model), Some(scaler)) = (self.registry.sequence(), self.registry.scaler())
        else {
            debug!("sequence predictor absent, serving heuristic forecast");
            return self.fallback(days, today);
        };

        // Left-pad with the series mean when history is short.
        let mean = if historical.is_empty() {
            FALLBACK_BASE_VOLUME
        } else {
            historical.iter().sum::<f64>() / historical.len() as f64
        };
        let mut series: Vec<f64> = Vec::with_capacity(SEQUENCE_LEN);
        if historical.len() < SEQUENCE_LEN {
            series.extend(std::iter::repeat(mean).take(SEQUENCE_LEN - historical.len()));
            series.extend_from_slice(historical);
        } else {
            series.extend_from_slice(&historical[historical.len() - SEQUENCE_LEN..]);
        }

        let mut window: Vec<f64> = series.iter().map(|&v| scaler.scale_value(v)).collect();
        let mut out = Vec::with_capacity(days);

        for day in 0..days {
            let predicted_scaled = model.step(&window);
            let volume = scaler.unscale_value(predicted_scaled).max(0.0) as i64;

            let date = today + chrono::Duration::days(day as i64 + 1);
            out.push(VolumePoint {
                date,
                predicted_volume: volume,
                day_of_week: date.format("%A").to_string(),
                confidence: BASE_CONFIDENCE * (-CONFIDENCE_DECAY * day as f64).exp(),
            });

            // Slide the window left and feed the scaled prediction back in.
            window.rotate_left(1);
            if let Some(last) = window.last_mut() {
                *last = predicted_scaled;
            }
        }

        info!("📈 Generated {days}-day volume forecast");
        out
    }

    /// Deterministic heuristic when the model is absent: weekday base volume,
    /// weekends at 70%, flat low confidence.
    fn fallback(&self, days: usize, today: NaiveDate) -> Vec<VolumePoint> {
        (0..days)
            .map(|day| {
                let date = today + chrono::Duration::days(day as i64 + 1);
                let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
                let volume = if weekend {
                    (FALLBACK_BASE_VOLUME * 0.7).floor() as i64
                } else {
                    FALLBACK_BASE_VOLUME as i64
                };
                VolumePoint {
                    date,
                    predicted_volume: volume,
                    day_of_week: date.format("%A").to_string(),
                    confidence: 0.5,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::artifact::{ScalerArtifact, SequenceArtifact};
    use crate::ml::registry::ModelRegistry;

    fn model_registry() -> Arc<ModelRegistry> {
        // Identity-ish recurrence: prediction = most recent value.
        let mut weights = vec![0.0; SEQUENCE_LEN];
        weights[SEQUENCE_LEN - 1] = 1.0;
        ModelRegistry::with_artifacts(
            None,
            Some(SequenceArtifact { bias: 0.0, weights }),
            None,
            None,
            Some(ScalerArtifact {
                mean: vec![100.0],
                scale: vec![20.0],
            }),
        )
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()
    }

    #[test]
    fn forecast_length_and_consecutive_dates() {
        let forecaster = VolumeForecaster::new(model_registry());
        let history: Vec<f64> = (0..40).map(|i| 90.0 + i as f64).collect();
        let points = forecaster.forecast(&history, 14, today());

        assert_eq!(points.len(), 14);
        for (k, point) in points.iter().enumerate() {
            let expected = today() + chrono::Duration::days(k as i64 + 1);
            assert_eq!(point.date, expected);
        }
    }

    #[test]
    fn confidence_strictly_decays() {
        let forecaster = VolumeForecaster::new(model_registry());
        let history = vec![100.0; 30];
        let points = forecaster.forecast(&history, 30, today());
        for pair in points.windows(2) {
            assert!(pair[1].confidence < pair[0].confidence);
        }
        assert!((points[0].confidence - 0.95).abs() < 1e-12);
    }

    #[test]
    fn short_history_pads_with_mean() {
        let forecaster = VolumeForecaster::new(model_registry());
        // Identity recurrence keeps predicting the latest value.
        let points = forecaster.forecast(&[120.0, 120.0], 3, today());
        assert_eq!(points[0].predicted_volume, 120);
    }

    #[test]
    fn volumes_never_negative() {
        let mut weights = vec![0.0; SEQUENCE_LEN];
        weights[SEQUENCE_LEN - 1] = 1.0;
        let registry = ModelRegistry::with_artifacts(
            None,
            // Strong negative bias pushes raw predictions below zero.
            Some(SequenceArtifact { bias: -50.0, weights }),
            None,
            None,
            Some(ScalerArtifact {
                mean: vec![0.0],
                scale: vec![1.0],
            }),
        );
        let forecaster = VolumeForecaster::new(registry);
        let points = forecaster.forecast(&[1.0; 30], 5, today());
        assert!(points.iter().all(|p| p.predicted_volume >= 0));
    }

    #[test]
    fn fallback_dims_weekends() {
        let forecaster = VolumeForecaster::new(ModelRegistry::empty());
        // 2026-08-01 is a Saturday, so day 1 of the forecast is a Sunday.
        let points = forecaster.forecast(&[], 7, today());
        assert_eq!(points.len(), 7);
        let sunday = &points[0];
        assert_eq!(sunday.day_of_week, "Sunday");
        assert_eq!(sunday.predicted_volume, 70);
        let monday = &points[1];
        assert_eq!(monday.predicted_volume, 100);
        assert!(points.iter().all(|p| (p.confidence - 0.5).abs() < 1e-12));
    }
}
