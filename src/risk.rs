//! Wildfire risk scoring: a heuristic weighted-sum mode usable with zero
//! training data, and a trained mode (logistic regression + isotonic
//! calibration) usable once a model has been fit offline.
//!
//! The feature vector, the Anderson-13 fuel-risk lookup table, and the
//! simplified FWI/ERC/BI formulas below are all taken verbatim from the
//! reference sensor fusion engine; they are not meant to match published
//! fire-weather formulas exactly.

use crate::models::{EnvironmentalConditions, RiskMode, RiskScore};
use linfa::prelude::*;
use linfa_logistic::FittedLogisticRegression;
use ndarray::{Array1, Array2};
use std::collections::HashMap;

const FEATURE_COUNT: usize = 34;

fn fuel_risk(fuel_model: u8) -> f64 {
    match fuel_model {
        1 => 0.1,
        2 => 0.2,
        3 => 0.3,
        4 => 0.4,
        5 => 0.5,
        6 => 0.6,
        7 => 0.7,
        8 => 0.8,
        9 => 0.9,
        10 => 0.8,
        11 => 0.6,
        12 => 0.7,
        13 => 0.8,
        _ => 0.5,
    }
}

fn fire_weather_index(c: &EnvironmentalConditions) -> f64 {
    let mut ffmc = 101.0 - c.relative_humidity;
    if c.temperature_c > 20.0 {
        ffmc += (c.temperature_c - 20.0) * 2.0;
    }
    let wind_factor = 1.0 + (c.wind_speed_mps / 20.0);
    (ffmc * wind_factor / 100.0).clamp(0.0, 1.0)
}

fn energy_release_component(c: &EnvironmentalConditions) -> f64 {
    let base = (c.temperature_c - 10.0) / 30.0 * (100.0 - c.relative_humidity) / 100.0;
    let wind_factor = 1.0 + (c.wind_speed_mps / 15.0);
    (base * wind_factor).clamp(0.0, 1.0)
}

fn burning_index(c: &EnvironmentalConditions) -> f64 {
    let base = (c.temperature_c / 40.0) * (100.0 - c.relative_humidity) / 100.0;
    let wind_slope_factor = 1.0 + (c.wind_speed_mps / 20.0) + (c.slope_deg / 45.0);
    (base * wind_slope_factor).clamp(0.0, 1.0)
}

fn feature_names() -> Vec<String> {
    let mut names: Vec<String> = (1..=13).map(|i| format!("fuel_model_{i}")).collect();
    names.extend(
        [
            "slope_normalized",
            "aspect_sin",
            "aspect_cos",
            "canopy_cover",
            "elevation_normalized",
            "soil_moisture",
            "fuel_moisture",
            "temperature_normalized",
            "humidity_normalized",
            "wind_speed_normalized",
            "wind_direction_sin",
            "wind_direction_cos",
            "lightning_strikes_normalized",
            "historical_ignitions_normalized",
            "fire_weather_index",
            "energy_release_component",
            "burning_index",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    names
}

/// Extracts the 34-dimensional feature vector used by the trained model.
/// `lightning_24h`/`historical_ignitions` come from the request since they
/// aren't part of [`EnvironmentalConditions`] itself.
fn extract_features(c: &EnvironmentalConditions, lightning_24h: u32, historical_ignitions: u32) -> [f64; FEATURE_COUNT] {
    let mut features = [0.0_f64; FEATURE_COUNT];

    if (1..=13).contains(&c.fuel_model) {
        features[(c.fuel_model - 1) as usize] = 1.0;
    }

    features[13] = c.slope_deg / 90.0;
    features[14] = c.aspect_deg.to_radians().sin();
    features[15] = c.aspect_deg.to_radians().cos();
    features[16] = c.canopy_cover;
    features[17] = c.elevation_m / 4000.0;

    features[18] = c.soil_moisture;
    features[19] = c.fuel_moisture;

    features[20] = c.temperature_c / 50.0;
    features[21] = c.relative_humidity / 100.0;
    features[22] = c.wind_speed_mps / 30.0;
    features[23] = c.wind_direction_deg.to_radians().sin();
    features[24] = c.wind_direction_deg.to_radians().cos();

    features[25] = (lightning_24h as f64 / 10.0).min(1.0);
    features[26] = (historical_ignitions as f64 / 5.0).min(1.0);

    features[27] = fire_weather_index(c);
    features[28] = energy_release_component(c);
    features[29] = burning_index(c);

    // Indices 30-33 are reserved derived slots held at zero; the reference
    // engine only populates 30 of the 34 nominal dims via this path.
    features
}

fn calculate_confidence(c: &EnvironmentalConditions) -> f64 {
    let mut confidence = 1.0_f64;

    if c.fuel_model == 0 {
        confidence *= 0.8;
    }
    if c.soil_moisture == 0.0 {
        confidence *= 0.9;
    }
    if c.fuel_moisture == 0.0 {
        confidence *= 0.9;
    }
    if c.wind_speed_mps == 0.0 {
        confidence *= 0.8;
    }
    if c.temperature_c < -20.0 || c.temperature_c > 60.0 {
        confidence *= 0.7;
    }
    if c.relative_humidity < 5.0 || c.relative_humidity > 100.0 {
        confidence *= 0.7;
    }

    confidence
}

/// One isotonic calibration point. A fitted calibrator is a sorted,
/// non-decreasing step function built by the pool-adjacent-violators
/// algorithm (PAVA) over (predicted_probability, observed_label) pairs.
#[derive(Debug, Clone)]
struct IsotonicCalibrator {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl IsotonicCalibrator {
    /// Fits an isotonic (non-decreasing) regression to `(x, y)` pairs via
    /// the pool-adjacent-violators algorithm.
    fn fit(mut pairs: Vec<(f64, f64)>) -> Self {
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("feature values are never NaN"));

        // Each pooled block: (sum_y, weight, x_min, x_max).
        let mut blocks: Vec<(f64, f64, f64, f64)> = Vec::new();
        for (x, y) in pairs {
            blocks.push((y, 1.0, x, x));
            while blocks.len() >= 2 {
                let n = blocks.len();
                let (sum_a, w_a, xmin_a, _) = blocks[n - 2];
                let (sum_b, w_b, _, xmax_b) = blocks[n - 1];
                if sum_a / w_a > sum_b / w_b {
                    blocks.truncate(n - 2);
                    blocks.push((sum_a + sum_b, w_a + w_b, xmin_a, xmax_b));
                } else {
                    break;
                }
            }
        }

        let xs = blocks.iter().map(|b| b.3).collect();
        let ys = blocks.iter().map(|b| b.0 / b.1).collect();
        IsotonicCalibrator { xs, ys }
    }

    /// Clips to [xs[0], xs[last]] and linearly interpolates between the
    /// calibration blocks, matching sklearn's `out_of_bounds='clip'`.
    fn transform(&self, x: f64) -> f64 {
        if self.xs.is_empty() {
            return x;
        }
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= *self.xs.last().expect("checked non-empty above") {
            return *self.ys.last().expect("xs and ys have equal length");
        }
        for i in 1..self.xs.len() {
            if x <= self.xs[i] {
                let (x0, x1) = (self.xs[i - 1], self.xs[i]);
                let (y0, y1) = (self.ys[i - 1], self.ys[i]);
                if (x1 - x0).abs() < f64::EPSILON {
                    return y1;
                }
                let t = (x - x0) / (x1 - x0);
                return y0 + t * (y1 - y0);
            }
        }
        *self.ys.last().expect("checked non-empty above")
    }
}

/// A fitted risk model: standardized logistic regression plus isotonic
/// calibration on top of its predicted probability.
pub struct TrainedRiskModel {
    model: FittedLogisticRegression<f64, bool>,
    feature_mean: [f64; FEATURE_COUNT],
    feature_std: [f64; FEATURE_COUNT],
    calibrator: IsotonicCalibrator,
    coefficients: Vec<f64>,
}

/// One labeled training example: conditions plus recent-activity counters
/// plus the observed/assessed risk outcome.
pub struct TrainingExample {
    pub conditions: EnvironmentalConditions,
    pub lightning_24h: u32,
    pub historical_ignitions: u32,
    /// Observed risk in [0, 1]; binarized at 0.5 to train the classifier,
    /// then used again as the isotonic calibration target.
    pub observed_risk: f64,
}

impl TrainedRiskModel {
    /// Trains a model from labeled examples. Requires at least 10 samples,
    /// matching the reference engine's minimum.
    pub fn train(examples: &[TrainingExample]) -> anyhow::Result<Self> {
        if examples.len() < 10 {
            anyhow::bail!("need at least 10 training samples, got {}", examples.len());
        }

        let raw_features: Vec<[f64; FEATURE_COUNT]> = examples
            .iter()
            .map(|e| extract_features(&e.conditions, e.lightning_24h, e.historical_ignitions))
            .collect();

        let (feature_mean, feature_std) = standardize_stats(&raw_features);

        let n = examples.len();
        let mut x_scaled = Array2::<f64>::zeros((n, FEATURE_COUNT));
        for (row, features) in raw_features.iter().enumerate() {
            for col in 0..FEATURE_COUNT {
                let std = if feature_std[col] < 1e-9 { 1.0 } else { feature_std[col] };
                x_scaled[[row, col]] = (features[col] - feature_mean[col]) / std;
            }
        }

        let labels: Array1<bool> = examples.iter().map(|e| e.observed_risk >= 0.5).collect();

        // Approximate sklearn's class_weight="balanced" via per-sample
        // weights inversely proportional to class frequency.
        let positive = labels.iter().filter(|&&b| b).count().max(1) as f64;
        let negative = (labels.len() - positive as usize).max(1) as f64;
        let total = labels.len() as f64;
        let weights: Array1<f64> = labels
            .iter()
            .map(|&is_positive| {
                if is_positive {
                    total / (2.0 * positive)
                } else {
                    total / (2.0 * negative)
                }
            })
            .collect();

        let dataset = Dataset::new(x_scaled, labels).with_weights(weights);

        let model = linfa_logistic::LogisticRegression::default()
            .max_iterations(1000)
            .fit(&dataset)?;

        let coefficients = model.params().to_vec();

        let probabilities: Vec<f64> = dataset
            .records()
            .outer_iter()
            .map(|row| model.predict_probabilities(&row.insert_axis(ndarray::Axis(0)))[0])
            .collect();

        let calibration_pairs: Vec<(f64, f64)> = probabilities
            .into_iter()
            .zip(examples.iter().map(|e| e.observed_risk))
            .collect();
        let calibrator = IsotonicCalibrator::fit(calibration_pairs);

        Ok(TrainedRiskModel {
            model,
            feature_mean,
            feature_std,
            calibrator,
            coefficients,
        })
    }

    fn score(
        &self,
        conditions: &EnvironmentalConditions,
        lightning_24h: u32,
        historical_ignitions: u32,
    ) -> RiskScore {
        let features = extract_features(conditions, lightning_24h, historical_ignitions);
        let mut scaled = Array2::<f64>::zeros((1, FEATURE_COUNT));
        for col in 0..FEATURE_COUNT {
            let std = if self.feature_std[col] < 1e-9 { 1.0 } else { self.feature_std[col] };
            scaled[[0, col]] = (features[col] - self.feature_mean[col]) / std;
        }

        let probability = self.model.predict_probabilities(&scaled)[0];
        let calibrated = self.calibrator.transform(probability).clamp(0.0, 1.0);

        let names = feature_names();
        let mut contributing_factors = HashMap::new();
        for (i, coef) in self.coefficients.iter().enumerate() {
            if coef.abs() > 0.1 {
                contributing_factors.insert(names[i].clone(), coef * features[i]);
            }
        }

        RiskScore {
            score: calibrated,
            mode: RiskMode::Trained,
            confidence: calculate_confidence(conditions),
            contributing_factors,
            calibrated: true,
        }
    }
}

fn standardize_stats(
    rows: &[[f64; FEATURE_COUNT]],
) -> ([f64; FEATURE_COUNT], [f64; FEATURE_COUNT]) {
    let n = rows.len() as f64;
    let mut mean = [0.0_f64; FEATURE_COUNT];
    for row in rows {
        for i in 0..FEATURE_COUNT {
            mean[i] += row[i];
        }
    }
    for m in mean.iter_mut() {
        *m /= n;
    }

    let mut variance = [0.0_f64; FEATURE_COUNT];
    for row in rows {
        for i in 0..FEATURE_COUNT {
            let d = row[i] - mean[i];
            variance[i] += d * d;
        }
    }
    let mut std = [0.0_f64; FEATURE_COUNT];
    for i in 0..FEATURE_COUNT {
        std[i] = (variance[i] / n).sqrt();
    }

    (mean, std)
}

/// Heuristic risk score used when no trained model is available.
pub fn heuristic_risk_score(
    conditions: &EnvironmentalConditions,
    lightning_24h: u32,
    historical_ignitions: u32,
) -> RiskScore {
    let fuel = fuel_risk(conditions.fuel_model);
    let slope_risk = (conditions.slope_deg / 45.0).min(1.0);
    let moisture_risk =
        (1.0 - conditions.soil_moisture) * 0.5 + (1.0 - conditions.fuel_moisture) * 0.5;

    let temp_risk = ((conditions.temperature_c - 20.0) / 30.0).clamp(0.0, 1.0);
    let humidity_risk = (100.0 - conditions.relative_humidity) / 100.0;
    let wind_risk = (conditions.wind_speed_mps / 20.0).min(1.0);
    let weather_risk = (temp_risk + humidity_risk + wind_risk) / 3.0;

    let history_risk = ((lightning_24h + historical_ignitions) as f64 / 10.0).min(1.0);

    let score = (fuel * 0.3 + slope_risk * 0.2 + moisture_risk * 0.2 + weather_risk * 0.2 + history_risk * 0.1)
        .clamp(0.0, 1.0);

    let mut contributing_factors = HashMap::new();
    contributing_factors.insert("fuel_model".to_string(), fuel);
    contributing_factors.insert("slope".to_string(), slope_risk);
    contributing_factors.insert("moisture".to_string(), moisture_risk);
    contributing_factors.insert("weather".to_string(), weather_risk);
    contributing_factors.insert("history".to_string(), history_risk);

    RiskScore {
        score,
        mode: RiskMode::Heuristic,
        confidence: 0.7,
        contributing_factors,
        calibrated: false,
    }
}

/// Scores environmental conditions, preferring a trained model when one
/// is supplied and falling back to the heuristic otherwise.
pub fn score(
    conditions: &EnvironmentalConditions,
    lightning_24h: u32,
    historical_ignitions: u32,
    model: Option<&TrainedRiskModel>,
) -> RiskScore {
    match model {
        Some(m) => m.score(conditions, lightning_24h, historical_ignitions),
        None => heuristic_risk_score(conditions, lightning_24h, historical_ignitions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_conditions() -> EnvironmentalConditions {
        EnvironmentalConditions {
            timestamp: Utc::now(),
            latitude: 37.0,
            longitude: -120.0,
            temperature_c: 35.0,
            relative_humidity: 15.0,
            wind_speed_mps: 10.0,
            wind_direction_deg: 270.0,
            fuel_moisture: 0.1,
            soil_moisture: 0.1,
            fuel_model: 9,
            slope_deg: 30.0,
            aspect_deg: 180.0,
            canopy_cover: 0.5,
            elevation_m: 800.0,
        }
    }

    #[test]
    fn heuristic_score_is_bounded() {
        let r = heuristic_risk_score(&sample_conditions(), 2, 1);
        assert!(r.score >= 0.0 && r.score <= 1.0);
        assert_eq!(r.mode, RiskMode::Heuristic);
        assert!(!r.calibrated);
    }

    #[test]
    fn hot_dry_windy_conditions_score_higher_than_calm_wet_ones() {
        let hot = sample_conditions();
        let mut calm = sample_conditions();
        calm.temperature_c = 15.0;
        calm.relative_humidity = 80.0;
        calm.wind_speed_mps = 1.0;
        calm.soil_moisture = 0.8;
        calm.fuel_moisture = 0.8;

        let hot_score = heuristic_risk_score(&hot, 0, 0);
        let calm_score = heuristic_risk_score(&calm, 0, 0);
        assert!(hot_score.score > calm_score.score);
    }

    #[test]
    fn isotonic_calibrator_is_non_decreasing() {
        let calibrator = IsotonicCalibrator::fit(vec![
            (0.1, 0.05),
            (0.4, 0.6),
            (0.3, 0.2),
            (0.9, 0.95),
        ]);
        let mut prev = f64::MIN;
        for x in [0.0, 0.2, 0.35, 0.5, 0.8, 1.0] {
            let y = calibrator.transform(x);
            assert!(y >= prev - 1e-9);
            prev = y;
        }
    }

    #[test]
    fn fuel_risk_lookup_matches_anderson_table() {
        assert_eq!(fuel_risk(1), 0.1);
        assert_eq!(fuel_risk(9), 0.9);
        assert_eq!(fuel_risk(13), 0.8);
        assert_eq!(fuel_risk(0), 0.5);
        assert_eq!(fuel_risk(99), 0.5);
    }
}
