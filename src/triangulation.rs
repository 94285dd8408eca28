//! Bearing-only triangulation for smoke/fire localization.
//!
//! Three methods are tried per request — simple two-ray intersection,
//! RANSAC over all 3-observation subsets, and a least-squares refinement —
//! and the result with the highest confidence wins. This mirrors the
//! reference engine's "try everything, keep the best" structure rather
//! than picking one method up front.

use crate::geo::{
    angle_difference, bearing_to_direction, calculate_bearing, cartesian_to_latlon,
    latlon_to_cartesian,
};
use crate::models::{BearingObservation, TriangulationMethod, TriangulationResult};
use std::collections::HashMap;
use uuid::Uuid;

const MIN_OBSERVATION_CONFIDENCE: f64 = 0.3;
const RAY_INTERSECTION_TOLERANCE_M: f64 = 1000.0;
const RANSAC_INLIER_THRESHOLD_DEG: f64 = 5.0;

pub struct TriangulationEngine {
    max_distance_km: f64,
}

impl Default for TriangulationEngine {
    fn default() -> Self {
        Self {
            max_distance_km: 50.0,
        }
    }
}

impl TriangulationEngine {
    pub fn new(max_distance_km: f64) -> Self {
        Self { max_distance_km }
    }

    /// Triangulate a target location from a set of bearing observations.
    /// Returns at most one result: the candidate with the highest
    /// confidence among whichever methods produced one.
    pub fn triangulate(&self, observations: &[BearingObservation]) -> Vec<TriangulationResult> {
        if observations.len() < 2 {
            return Vec::new();
        }

        let valid_obs = self.filter_observations(observations);
        if valid_obs.len() < 2 {
            return Vec::new();
        }

        let mut results = Vec::new();

        if let Some(r) = self.simple_intersection(&valid_obs[..2]) {
            results.push(r);
        }

        results.extend(self.ransac_triangulation(&valid_obs));

        if let Some(r) = self.least_squares_triangulation(&valid_obs) {
            results.push(r);
        }

        results
            .into_iter()
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).expect("confidence is never NaN"))
            .map(|r| vec![r])
            .unwrap_or_default()
    }

    fn filter_observations(&self, observations: &[BearingObservation]) -> Vec<BearingObservation> {
        observations
            .iter()
            .filter(|obs| obs.confidence >= MIN_OBSERVATION_CONFIDENCE)
            .filter(|obs| self.is_within_distance(obs))
            .cloned()
            .collect()
    }

    fn is_within_distance(&self, _obs: &BearingObservation) -> bool {
        // No terrain/range data available; the configured max_distance_km
        // is carried for future use but not currently enforced, matching
        // the reference engine's permissive placeholder.
        let _ = self.max_distance_km;
        true
    }

    fn simple_intersection(&self, observations: &[BearingObservation]) -> Option<TriangulationResult> {
        if observations.len() < 2 {
            return None;
        }
        let (obs1, obs2) = (&observations[0], &observations[1]);

        let p1 = latlon_to_cartesian(obs1.device_latitude, obs1.device_longitude, obs1.device_altitude);
        let p2 = latlon_to_cartesian(obs2.device_latitude, obs2.device_longitude, obs2.device_altitude);
        let d1 = bearing_to_direction(obs1.bearing, obs1.camera_pitch);
        let d2 = bearing_to_direction(obs2.bearing, obs2.camera_pitch);

        let intersection = ray_intersection(p1, d1, p2, d2)?;
        let (lat, lon, alt) = cartesian_to_latlon(intersection);

        let pair = &observations[..2];
        let mut quality_metrics = HashMap::new();
        quality_metrics.insert("angular_spread".to_string(), angular_spread(pair));
        quality_metrics.insert(
            "baseline_distance".to_string(),
            baseline_distance(obs1, obs2),
        );

        Some(TriangulationResult {
            result_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            latitude: lat,
            longitude: lon,
            altitude: alt,
            confidence: calculate_confidence(pair),
            uncertainty_meters: calculate_uncertainty(pair),
            observation_ids: vec![obs1.detection_id.clone(), obs2.detection_id.clone()],
            method: TriangulationMethod::Simple,
            quality_metrics,
        })
    }

    fn ransac_triangulation(&self, observations: &[BearingObservation]) -> Vec<TriangulationResult> {
        if observations.len() < 3 {
            return Vec::new();
        }

        let mut best_result: Option<TriangulationResult> = None;
        let mut best_inliers: Vec<BearingObservation> = Vec::new();
        let mut best_score = 0.0_f64;

        for i in 0..observations.len() {
            for j in (i + 1)..observations.len() {
                for k in (j + 1)..observations.len() {
                    let subset = [
                        observations[i].clone(),
                        observations[j].clone(),
                        observations[k].clone(),
                    ];
                    let Some(result) = self.simple_intersection(&subset) else {
                        continue;
                    };

                    let inliers = count_inliers(&result, observations);
                    let score = inliers.len() as f64 * result.confidence;

                    if score > best_score {
                        best_score = score;
                        best_inliers = inliers;
                        best_result = Some(result);
                    }
                }
            }
        }

        match (best_result, best_inliers.len() >= 2) {
            (Some(mut result), true) => {
                result.observation_ids = best_inliers.iter().map(|o| o.detection_id.clone()).collect();
                result.confidence = calculate_confidence(&best_inliers);
                result.uncertainty_meters = calculate_uncertainty(&best_inliers);
                result.method = TriangulationMethod::Ransac;
                vec![result]
            }
            _ => Vec::new(),
        }
    }

    fn least_squares_triangulation(
        &self,
        observations: &[BearingObservation],
    ) -> Option<TriangulationResult> {
        if observations.len() < 2 {
            return None;
        }

        let initial = self.simple_intersection(&observations[..2])?;

        let objective = |params: [f64; 3]| -> f64 {
            let (lat, lon, _alt) = (params[0], params[1], params[2]);
            observations
                .iter()
                .map(|obs| {
                    let expected =
                        calculate_bearing(obs.device_latitude, obs.device_longitude, lat, lon);
                    let error = angle_difference(obs.bearing, expected);
                    (error * obs.confidence).powi(2)
                })
                .sum()
        };

        let x0 = [initial.latitude, initial.longitude, initial.altitude];
        let (solution, residual) = minimize_numeric_gradient(objective, x0);

        let mut quality_metrics = HashMap::new();
        quality_metrics.insert("angular_spread".to_string(), angular_spread(observations));
        quality_metrics.insert(
            "baseline_distance".to_string(),
            baseline_distance(&observations[0], &observations[observations.len() - 1]),
        );
        quality_metrics.insert("residual_error".to_string(), residual);

        Some(TriangulationResult {
            result_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            latitude: solution[0],
            longitude: solution[1],
            altitude: solution[2],
            confidence: calculate_confidence(observations),
            uncertainty_meters: calculate_uncertainty(observations),
            observation_ids: observations.iter().map(|o| o.detection_id.clone()).collect(),
            method: TriangulationMethod::LeastSquares,
            quality_metrics,
        })
    }
}

fn ray_intersection(
    p1: crate::geo::Cartesian,
    d1: crate::geo::Cartesian,
    p2: crate::geo::Cartesian,
    d2: crate::geo::Cartesian,
) -> Option<crate::geo::Cartesian> {
    let w0 = p1.sub(p2);

    let a = d1.dot(d1);
    let b = d1.dot(d2);
    let c = d2.dot(d2);
    let d = d1.dot(w0);
    let e = d2.dot(w0);

    let denom = a * c - b * b;
    if denom.abs() < 1e-10 {
        return None;
    }

    let t1 = (b * e - c * d) / denom;
    let t2 = (a * e - b * d) / denom;

    let intersection1 = p1.add(d1.scale(t1));
    let intersection2 = p2.add(d2.scale(t2));

    let distance = intersection1.sub(intersection2).norm();
    if distance > RAY_INTERSECTION_TOLERANCE_M {
        return None;
    }

    Some(intersection1.add(intersection2).scale(0.5))
}

fn baseline_distance(obs1: &BearingObservation, obs2: &BearingObservation) -> f64 {
    crate::geo::haversine_distance_m(
        obs1.device_latitude,
        obs1.device_longitude,
        obs2.device_latitude,
        obs2.device_longitude,
    )
}

fn angular_spread(observations: &[BearingObservation]) -> f64 {
    if observations.len() < 2 {
        return 0.0;
    }
    let mut bearings: Vec<f64> = observations.iter().map(|o| o.bearing).collect();
    bearings.sort_by(|a, b| a.partial_cmp(b).expect("bearing is never NaN"));

    let n = bearings.len();
    (0..n)
        .map(|i| {
            let next = bearings[(i + 1) % n];
            let mut gap = next - bearings[i];
            if gap < 0.0 {
                gap += 360.0;
            }
            gap
        })
        .fold(0.0_f64, f64::max)
}

fn calculate_confidence(observations: &[BearingObservation]) -> f64 {
    if observations.is_empty() {
        return 0.0;
    }

    let base_confidence =
        observations.iter().map(|o| o.confidence).sum::<f64>() / observations.len() as f64;

    let spread_factor = (angular_spread(observations) / 90.0).min(1.0);

    let baseline_factor = if observations.len() >= 2 {
        (baseline_distance(&observations[0], &observations[observations.len() - 1]) / 10_000.0)
            .min(1.0)
    } else {
        0.5
    };

    let count_factor = (observations.len() as f64 / 4.0).min(1.0);

    let confidence =
        base_confidence * 0.4 + spread_factor * 0.3 + baseline_factor * 0.2 + count_factor * 0.1;

    confidence.clamp(0.0, 1.0)
}

fn calculate_uncertainty(observations: &[BearingObservation]) -> f64 {
    if observations.len() < 2 {
        return 1000.0;
    }
    let spread = angular_spread(observations);
    if spread < 30.0 {
        2000.0
    } else if spread < 60.0 {
        1000.0
    } else {
        500.0
    }
}

fn count_inliers(
    result: &TriangulationResult,
    observations: &[BearingObservation],
) -> Vec<BearingObservation> {
    observations
        .iter()
        .filter(|obs| {
            let expected = calculate_bearing(
                obs.device_latitude,
                obs.device_longitude,
                result.latitude,
                result.longitude,
            );
            angle_difference(obs.bearing, expected) < RANSAC_INLIER_THRESHOLD_DEG
        })
        .cloned()
        .collect()
}

/// Minimizes a 3-parameter scalar objective with a hand-rolled numeric
/// gradient descent (finite-difference gradient, backtracking line
/// search). Stands in for scipy's BFGS on a problem this small.
/// Returns (argmin, objective value at argmin).
fn minimize_numeric_gradient(
    objective: impl Fn([f64; 3]) -> f64,
    x0: [f64; 3],
) -> ([f64; 3], f64) {
    const MAX_ITERS: usize = 200;
    const EPS: f64 = 1e-6;
    const TOL: f64 = 1e-10;

    let mut x = x0;
    let mut fx = objective(x);

    for _ in 0..MAX_ITERS {
        let grad = numeric_gradient(&objective, x, EPS);
        let grad_norm = (grad[0] * grad[0] + grad[1] * grad[1] + grad[2] * grad[2]).sqrt();
        if grad_norm < TOL {
            break;
        }

        let mut step = 1.0_f64;
        let mut improved = false;
        for _ in 0..40 {
            let candidate = [
                x[0] - step * grad[0],
                x[1] - step * grad[1],
                x[2] - step * grad[2],
            ];
            let f_candidate = objective(candidate);
            if f_candidate < fx {
                x = candidate;
                fx = f_candidate;
                improved = true;
                break;
            }
            step *= 0.5;
        }

        if !improved {
            break;
        }
    }

    (x, fx)
}

fn numeric_gradient(objective: impl Fn([f64; 3]) -> f64, x: [f64; 3], eps: f64) -> [f64; 3] {
    let mut grad = [0.0; 3];
    for i in 0..3 {
        let mut x_plus = x;
        let mut x_minus = x;
        x_plus[i] += eps;
        x_minus[i] -= eps;
        grad[i] = (objective(x_plus) - objective(x_minus)) / (2.0 * eps);
    }
    grad
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn obs(device_lat: f64, device_lon: f64, bearing: f64, detection_id: &str) -> BearingObservation {
        BearingObservation {
            device_id: format!("dev-{detection_id}"),
            timestamp: Utc::now(),
            device_latitude: device_lat,
            device_longitude: device_lon,
            device_altitude: 0.0,
            camera_heading: bearing,
            camera_pitch: 0.0,
            bearing,
            confidence: 0.9,
            detection_id: detection_id.to_string(),
        }
    }

    #[test]
    fn fewer_than_two_observations_yields_no_result() {
        let engine = TriangulationEngine::default();
        let result = engine.triangulate(&[obs(10.0, 10.0, 45.0, "a")]);
        assert!(result.is_empty());
    }

    #[test]
    fn two_converging_bearings_localize_a_target() {
        let engine = TriangulationEngine::default();
        // Two devices on the same latitude, 0.05 deg apart in longitude,
        // both looking roughly northeast/northwest toward a point between them.
        let a = obs(10.0, 10.0, 60.0, "a");
        let b = obs(10.0, 10.05, 300.0, "b");
        let results = engine.triangulate(&[a, b]);
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert!(r.confidence > 0.0);
        assert!(r.latitude > 10.0);
    }

    #[test]
    fn ransac_rejects_a_wild_outlier() {
        let engine = TriangulationEngine::default();
        let observations = vec![
            obs(10.0, 10.0, 60.0, "a"),
            obs(10.0, 10.05, 300.0, "b"),
            obs(10.02, 10.02, 0.0, "c"),
            obs(-50.0, 170.0, 10.0, "outlier"),
        ];
        let results = engine.triangulate(&observations);
        assert_eq!(results.len(), 1);
        assert!(!results[0].observation_ids.contains(&"outlier".to_string()));
    }

    #[test]
    fn angular_spread_of_two_opposing_bearings_is_180() {
        let observations = vec![obs(0.0, 0.0, 0.0, "a"), obs(0.0, 0.0, 180.0, "b")];
        assert!((angular_spread(&observations) - 180.0).abs() < 1e-9);
    }
}
