//! Stochastic cellular-automaton fire spread simulation.
//!
//! Ported directly from the reference engine, including two deliberately
//! preserved quirks documented as open questions rather than bugs to fix:
//!
//! 1. Isochrone geometry does not vary by time checkpoint — every
//!    isochrone in `{6, 12, 18, 24}` hours (that fits within
//!    `simulation_hours`) reports the same union-of-all-runs burned cell
//!    set, only the `hours_from_start` label differs. A correct model
//!    would track each cell's first burn time.
//! 2. Spread probability draws an extra independent uniform sample: the
//!    per-cell probability itself already folds in a `U(0,1)` draw
//!    (`random_factor`), and the caller then compares a *second*
//!    independent draw against it. The compound effect roughly halves
//!    the effective spread probability versus the stated
//!    `base_rate * distance_factor` model.
//!
//! Grid coordinates are derived by dividing raw lat/lon differences by a
//! 100-meter grid size without a meters-per-degree conversion, exactly as
//! in the source; for ignition clusters spanning less than a degree this
//! collapses most of the simulation into a single grid cell. This is
//! preserved rather than corrected.

use crate::models::{Isochrone, Point, SpreadConfidence, SpreadParameters, SpreadResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::HashSet;
use uuid::Uuid;

fn fuel_base_rate(fuel_model: u8) -> f64 {
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
        _ => 0.1,
    }
}

fn wind_factor(wind_speed: f64, wind_direction: f64, _slope: f64, aspect: f64) -> f64 {
    if wind_speed == 0.0 {
        return 1.0;
    }
    let wind_relative = (wind_direction - aspect + 360.0) % 360.0;
    let speed_factor = 1.0 + wind_speed / 10.0;
    let direction_factor = if (0.0..=180.0).contains(&wind_relative) {
        1.0 + (wind_relative / 180.0) * 0.5
    } else {
        1.0 - ((wind_relative - 180.0) / 180.0) * 0.3
    };
    speed_factor * direction_factor
}

fn slope_factor(slope: f64, aspect: f64, wind_direction: f64) -> f64 {
    if slope == 0.0 {
        return 1.0;
    }
    let slope_term = 1.0 + (slope / 45.0) * 0.5;
    let mut aspect_relative = (aspect - wind_direction).abs();
    if aspect_relative > 180.0 {
        aspect_relative = 360.0 - aspect_relative;
    }
    let alignment_factor = if aspect_relative < 90.0 {
        1.0 + (90.0 - aspect_relative) / 90.0 * 0.3
    } else {
        1.0
    };
    slope_term * alignment_factor
}

fn moisture_factor(fuel_moisture: f64, humidity: f64) -> f64 {
    let fuel_factor = 1.0 - fuel_moisture * 0.8;
    let humidity_factor = 1.0 - (humidity / 100.0) * 0.5;
    (fuel_factor * humidity_factor).max(0.1)
}

fn temperature_factor(temperature: f64) -> f64 {
    if temperature < 0.0 {
        0.1
    } else if temperature < 10.0 {
        0.5
    } else if temperature < 30.0 {
        1.0 + (temperature - 10.0) / 20.0 * 0.5
    } else {
        1.5
    }
}

/// Terrain lookup. Always flat until real terrain data is wired in.
fn terrain_at(_lat: f64, _lon: f64) -> (f64, f64) {
    (0.0, 0.0)
}

fn calculate_bounds(points: &[(f64, f64)]) -> (f64, f64, f64, f64) {
    let lats: Vec<f64> = points.iter().map(|p| p.0).collect();
    let lons: Vec<f64> = points.iter().map(|p| p.1).collect();
    (
        lons.iter().cloned().fold(f64::INFINITY, f64::min),
        lats.iter().cloned().fold(f64::INFINITY, f64::min),
        lons.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        lats.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
    )
}

const GRID_SIZE_M: f64 = 100.0;

struct SingleRunResult {
    perimeter: Vec<(f64, f64)>,
    area_hectares: f64,
    max_spread_rate_mph: f64,
}

fn simulate_single_run(params: &SpreadParameters, rng: &mut StdRng) -> SingleRunResult {
    let ignition: Vec<(f64, f64)> = params
        .ignition_points
        .iter()
        .map(|p| (p.latitude, p.longitude))
        .collect();

    let mut fire_front: HashSet<(u64, u64)> = ignition.iter().map(|&(lat, lon)| bits(lat, lon)).collect();
    let mut burned_grid_cells: HashSet<(i64, i64)> = HashSet::new();

    let bounds = calculate_bounds(&ignition);
    let grid_width = ((bounds.2 - bounds.0) / GRID_SIZE_M) as i64 + 1;
    let grid_height = ((bounds.3 - bounds.1) / GRID_SIZE_M) as i64 + 1;

    let mut max_spread_rate = 0.0_f64;
    let time_steps = (params.simulation_hours as f64 * 60.0 / params.time_step_minutes) as u32;

    let conditions = &params.conditions;

    for step in 0..time_steps {
        let mut new_fire_front: HashSet<(u64, u64)> = HashSet::new();

        for &(lat_bits, lon_bits) in &fire_front {
            let lat = f64::from_bits(lat_bits);
            let lon = f64::from_bits(lon_bits);

            let grid_x = ((lon - bounds.0) / GRID_SIZE_M) as i64;
            let grid_y = ((lat - bounds.1) / GRID_SIZE_M) as i64;

            if !(0..grid_width).contains(&grid_x) || !(0..grid_height).contains(&grid_y) {
                continue;
            }

            let (slope, aspect) = terrain_at(lat, lon);
            let spread_rate = calculate_spread_rate(conditions, slope, aspect, fuel_base_rate(conditions.fuel_model));
            max_spread_rate = max_spread_rate.max(spread_rate);

            let _ = step;

            for dx in -1..=1_i64 {
                for dy in -1..=1_i64 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let new_x = grid_x + dx;
                    let new_y = grid_y + dy;
                    if !(0..grid_width).contains(&new_x) || !(0..grid_height).contains(&new_y) {
                        continue;
                    }
                    if burned_grid_cells.contains(&(new_x, new_y)) {
                        continue;
                    }

                    let prob = calculate_spread_probability(spread_rate, rng);
                    if rng.gen::<f64>() < prob {
                        let new_lat = bounds.1 + new_y as f64 * GRID_SIZE_M;
                        let new_lon = bounds.0 + new_x as f64 * GRID_SIZE_M;
                        new_fire_front.insert(bits(new_lat, new_lon));
                        burned_grid_cells.insert((new_x, new_y));
                    }
                }
            }
        }

        fire_front = new_fire_front;
        if fire_front.is_empty() {
            break;
        }
    }

    let perimeter: Vec<(f64, f64)> = burned_grid_cells
        .iter()
        .map(|&(gx, gy)| (bounds.1 + gy as f64 * GRID_SIZE_M, bounds.0 + gx as f64 * GRID_SIZE_M))
        .collect();

    let area_hectares = burned_grid_cells.len() as f64 * GRID_SIZE_M.powi(2) / 10_000.0;

    SingleRunResult {
        perimeter,
        area_hectares,
        max_spread_rate_mph: max_spread_rate,
    }
}

fn calculate_spread_rate(
    conditions: &crate::models::EnvironmentalConditions,
    slope: f64,
    aspect: f64,
    base_rate: f64,
) -> f64 {
    let wind = wind_factor(conditions.wind_speed_mps, conditions.wind_direction_deg, slope, aspect);
    let slope_term = slope_factor(slope, aspect, conditions.wind_direction_deg);
    let moisture = moisture_factor(conditions.fuel_moisture, conditions.relative_humidity);
    let temp = temperature_factor(conditions.temperature_c);

    let spread_rate = base_rate * wind * slope_term * moisture * temp;
    spread_rate * 2.237 // m/s -> mph
}

/// Preserves the reference engine's double-random-draw quirk: the
/// returned probability already folds in one uniform sample, and the
/// caller draws and compares against a second one.
fn calculate_spread_probability(spread_rate: f64, rng: &mut StdRng) -> f64 {
    let base_prob = (spread_rate / 10.0).min(1.0);
    let distance = (2.0_f64).sqrt() * 100.0;
    let distance_factor = 1.0 / (1.0 + distance / 1000.0);
    let random_factor: f64 = rng.gen();
    base_prob * distance_factor * random_factor
}

fn bits(lat: f64, lon: f64) -> (u64, u64) {
    (lat.to_bits(), lon.to_bits())
}

const ISOCHRONE_HOURS: [u32; 4] = [6, 12, 18, 24];

fn generate_isochrones(all_perimeters: &[Vec<(f64, f64)>], params: &SpreadParameters) -> Vec<Isochrone> {
    let mut isochrones = Vec::new();

    for &hours in &ISOCHRONE_HOURS {
        if hours > params.simulation_hours {
            continue;
        }

        // Union of every run's perimeter, regardless of `hours` — the
        // reference engine never tracks per-cell burn time, so this is
        // identical across all four checkpoints.
        let mut burned_cells: HashSet<(u64, u64)> = HashSet::new();
        for perimeter in all_perimeters {
            if !perimeter.is_empty() {
                burned_cells.extend(perimeter.iter().map(|&(lat, lon)| bits(lat, lon)));
            }
        }

        if !burned_cells.is_empty() {
            let geometry: Vec<Point> = burned_cells
                .iter()
                .map(|&(lat_bits, lon_bits)| Point {
                    latitude: f64::from_bits(lat_bits),
                    longitude: f64::from_bits(lon_bits),
                    altitude: 0.0,
                })
                .collect();

            isochrones.push(Isochrone {
                hours_from_start: hours,
                area_hectares: burned_cells.len() as f64 * 0.01,
                perimeter_km: burned_cells.len() as f64 * 0.1,
                geometry,
            });
        }
    }

    isochrones
}

fn calculate_final_perimeter(all_perimeters: &[Vec<(f64, f64)>]) -> Vec<Point> {
    let mut all_points: HashSet<(u64, u64)> = HashSet::new();
    for perimeter in all_perimeters {
        all_points.extend(perimeter.iter().map(|&(lat, lon)| bits(lat, lon)));
    }
    all_points
        .iter()
        .map(|&(lat_bits, lon_bits)| Point {
            latitude: f64::from_bits(lat_bits),
            longitude: f64::from_bits(lon_bits),
            altitude: 0.0,
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

fn calculate_confidence(areas: &[f64], spread_rates: &[f64]) -> f64 {
    if areas.is_empty() || spread_rates.is_empty() {
        return 0.0;
    }
    let area_mean = mean(areas);
    let rate_mean = mean(spread_rates);
    let area_cv = if area_mean > 0.0 { std_dev(areas) / area_mean } else { 1.0 };
    let rate_cv = if rate_mean > 0.0 { std_dev(spread_rates) / rate_mean } else { 1.0 };
    (1.0 - (area_cv + rate_cv) / 2.0).clamp(0.0, 1.0)
}

/// Runs the Monte Carlo fire spread simulation described by `params`.
/// Individual runs are parallelized with rayon; call this from within a
/// `tokio::task::spawn_blocking` so it doesn't stall the async reactor.
pub fn simulate_spread(params: &SpreadParameters) -> SpreadResult {
    let runs: Vec<SingleRunResult> = (0..params.monte_carlo_runs)
        .into_par_iter()
        .map(|i| {
            let mut rng = match params.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(i as u64)),
                None => StdRng::from_entropy(),
            };
            simulate_single_run(params, &mut rng)
        })
        .collect();

    let all_areas: Vec<f64> = runs.iter().map(|r| r.area_hectares).collect();
    let all_spread_rates: Vec<f64> = runs.iter().map(|r| r.max_spread_rate_mph).collect();
    let all_perimeters: Vec<Vec<(f64, f64)>> = runs.iter().map(|r| r.perimeter.clone()).collect();

    let mean_area = mean(&all_areas);
    let std_area = std_dev(&all_areas);
    let mean_rate = mean(&all_spread_rates);
    let max_rate = all_spread_rates.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min_rate = all_spread_rates.iter().cloned().fold(f64::INFINITY, f64::min);

    let isochrones = generate_isochrones(&all_perimeters, params);
    let perimeter = calculate_final_perimeter(&all_perimeters);
    let overall_confidence = calculate_confidence(&all_areas, &all_spread_rates);

    let mut statistics = std::collections::HashMap::new();
    statistics.insert("mean_area_hectares".to_string(), mean_area);
    statistics.insert("std_area_hectares".to_string(), std_area);
    statistics.insert("mean_spread_rate_mph".to_string(), mean_rate);
    statistics.insert("max_spread_rate_mph".to_string(), max_rate);
    statistics.insert("min_spread_rate_mph".to_string(), min_rate);
    statistics.insert("runs_completed".to_string(), params.monte_carlo_runs as f64);

    SpreadResult {
        simulation_id: Uuid::new_v4(),
        created_at: chrono::Utc::now(),
        isochrones,
        perimeter,
        total_area_hectares: mean_area,
        max_spread_rate_mph: mean_rate,
        simulation_duration_hours: params.simulation_hours as f64,
        statistics,
        confidence: SpreadConfidence {
            overall_confidence,
            weather_confidence: overall_confidence,
            fuel_confidence: overall_confidence,
            terrain_confidence: overall_confidence,
            confidence_factors: "heuristic".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EnvironmentalConditions;
    use chrono::Utc;

    fn base_params() -> SpreadParameters {
        SpreadParameters {
            ignition_points: vec![Point {
                latitude: 38.0,
                longitude: -120.0,
                altitude: 0.0,
            }],
            conditions: EnvironmentalConditions {
                timestamp: Utc::now(),
                latitude: 38.0,
                longitude: -120.0,
                temperature_c: 32.0,
                relative_humidity: 20.0,
                wind_speed_mps: 8.0,
                wind_direction_deg: 90.0,
                fuel_moisture: 0.1,
                soil_moisture: 0.1,
                fuel_model: 4,
                slope_deg: 10.0,
                aspect_deg: 90.0,
                canopy_cover: 0.3,
                elevation_m: 500.0,
            },
            fire_lines: vec![],
            simulation_hours: 24,
            time_step_minutes: 60.0,
            monte_carlo_runs: 5,
            custom_parameters: std::collections::HashMap::new(),
            seed: Some(42),
        }
    }

    #[test]
    fn simulate_spread_is_deterministic_with_a_fixed_seed() {
        let params = base_params();
        let a = simulate_spread(&params);
        let b = simulate_spread(&params);
        assert_eq!(a.total_area_hectares, b.total_area_hectares);
        assert_eq!(a.statistics["mean_spread_rate_mph"], b.statistics["mean_spread_rate_mph"]);
    }

    #[test]
    fn isochrones_within_simulation_hours_share_identical_geometry() {
        let params = base_params();
        let result = simulate_spread(&params);
        // All preserved isochrones use the same union-of-runs geometry;
        // only their hour label differs. This mirrors the reference
        // engine's lack of per-cell burn-time tracking.
        if result.isochrones.len() > 1 {
            let first_count = result.isochrones[0].geometry.len();
            for iso in &result.isochrones[1..] {
                assert_eq!(iso.geometry.len(), first_count);
            }
        }
    }

    #[test]
    fn no_isochrones_exceed_requested_simulation_hours() {
        let mut params = base_params();
        params.simulation_hours = 10;
        let result = simulate_spread(&params);
        for iso in &result.isochrones {
            assert!(iso.hours_from_start <= 10);
        }
    }

    #[test]
    fn confidence_is_bounded() {
        let params = base_params();
        let result = simulate_spread(&params);
        assert!(result.confidence.overall_confidence >= 0.0);
        assert!(result.confidence.overall_confidence <= 1.0);
    }
}
