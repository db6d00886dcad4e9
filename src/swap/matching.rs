//! Swap compatibility scoring.
//!
//! Score = 0.4 * distance + 0.3 * difficulty balance + 0.3 * net benefit,
//! where the distance term rewards a shorter driver-to-dropoff leg under the
//! swap and small improvements are amplified 2x before clamping.

/// Minimum score for a swap to appear in the marketplace.
pub const COMPATIBILITY_THRESHOLD: f64 = 0.5;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two (lat, lon) points, in kilometers.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = a;
    let (lat2, lon2) = b;

    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

#[derive(Debug, Clone, Copy)]
pub struct SwapScore {
    pub compatibility: f64,
    pub distance_saved_km: f64,
    pub difficulty_difference: f64,
}

/// Score a candidate exchange from one driver's perspective.
///
/// `driver_location` is where the scoring driver currently is;
/// `current_dropoff` is the package they hold, `candidate_dropoff` the one
/// they would receive.
pub fn score_swap(
    driver_location: (f64, f64),
    current_dropoff: (f64, f64),
    current_difficulty: f64,
    candidate_dropoff: (f64, f64),
    candidate_difficulty: f64,
) -> SwapScore {
    let current_distance = haversine_km(driver_location, current_dropoff);
    let swap_distance = haversine_km(driver_location, candidate_dropoff);

    let distance_improvement = if current_distance > 0.0 {
        ((current_distance - swap_distance) / current_distance).max(0.0)
    } else {
        0.0
    };
    // Amplify small improvements before clamping.
    let distance_score = (distance_improvement * 2.0).min(1.0);

    let difficulty_difference = candidate_difficulty - current_difficulty;
    let difficulty_score = (difficulty_difference.abs() / 50.0).min(1.0);

    let benefit = if distance_improvement > 0.0 { 1.0 } else { 0.0 };

    SwapScore {
        compatibility: 0.4 * distance_score + 0.3 * difficulty_score + 0.3 * benefit,
        distance_saved_km: (current_distance - swap_distance).max(0.0),
        difficulty_difference,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MUMBAI: (f64, f64) = (19.076, 72.8777);
    const PUNE: (f64, f64) = (18.5204, 73.8567);

    #[test]
    fn haversine_known_distance() {
        let d = haversine_km(MUMBAI, PUNE);
        // Mumbai-Pune is roughly 120 km as the crow flies.
        assert!(d > 100.0 && d < 140.0, "got {d}");
        assert!(haversine_km(MUMBAI, MUMBAI) < 1e-9);
    }

    #[test]
    fn closer_dropoff_scores_higher() {
        let near = (19.08, 72.88);
        let far = (18.6, 73.8);

        let improving = score_swap(MUMBAI, far, 50.0, near, 50.0);
        let worsening = score_swap(MUMBAI, near, 50.0, far, 50.0);

        assert!(improving.compatibility > worsening.compatibility);
        assert!(improving.distance_saved_km > 0.0);
        assert_eq!(worsening.distance_saved_km, 0.0);
    }

    #[test]
    fn full_improvement_hits_weight_ceiling() {
        // Candidate dropoff at the driver's feet: 100% improvement.
        let score = score_swap(MUMBAI, PUNE, 20.0, MUMBAI, 90.0);
        // 0.4 * 1.0 + 0.3 * min(1, 70/50) + 0.3 * 1.0
        assert!((score.compatibility - 1.0).abs() < 1e-9);
        assert!((score.difficulty_difference - 70.0).abs() < 1e-9);
    }

    #[test]
    fn no_distance_change_scores_only_difficulty() {
        let score = score_swap(MUMBAI, PUNE, 40.0, PUNE, 65.0);
        // distance term 0, benefit 0, difficulty |25|/50 = 0.5 -> 0.15.
        assert!((score.compatibility - 0.15).abs() < 1e-9);
        assert!(score.compatibility < COMPATIBILITY_THRESHOLD);
    }
}
