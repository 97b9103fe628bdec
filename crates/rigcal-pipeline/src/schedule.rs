//! Per-camera refinement schedule.

use rigcal_core::Real;
use rigcal_linear::ThresholdLadder;
use serde::{Deserialize, Serialize};

use crate::config::RefinementConfig;

/// Thresholds for one camera's refinement, fixed before round 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefinementSchedule {
    /// Outlier threshold for round 1, in pixels.
    pub first_round_threshold: Real,
    /// Outlier threshold for rounds 2 and later.
    pub later_round_threshold: Real,
    pub rounds: usize,
    pub ladder: ThresholdLadder,
}

impl RefinementSchedule {
    /// Derive the schedule from the camera's field of view and image height.
    pub fn derive(config: &RefinementConfig, hfov_deg: Real, height: u32) -> Self {
        let h = height as Real / config.reference_height;
        let max = config.max_threshold_base
            + config.max_threshold_gain * (hfov_deg / 30.0 + h * 0.2);
        let min_inlier_fraction =
            (1.0 - config.min_filtered_gain * (hfov_deg / 60.0 + h * 0.2)).clamp(0.0, 1.0);
        Self {
            first_round_threshold: config.first_round_factor * h,
            later_round_threshold: config.later_round_factor * h,
            rounds: config.rounds,
            ladder: ThresholdLadder {
                initial: config.ransac_initial_threshold,
                step: config.ransac_threshold_step,
                max,
                min_inlier_fraction,
            },
        }
    }

    /// Outlier threshold of refinement round `round` (1-based).
    pub fn filter_threshold(&self, round: usize) -> Real {
        if round <= 1 {
            self.first_round_threshold
        } else {
            self.later_round_threshold
        }
    }
}
