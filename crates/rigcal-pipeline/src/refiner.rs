//! Per-camera intrinsic refinement.
//!
//! Round 0 solves intrinsics from the nominal guess. Each following round
//! estimates a board pose per image, drops corners that reproject badly and
//! solves the intrinsics again from the survivors. The round count is fixed.

use std::fmt;

use log::{debug, info, warn};
use rigcal_core::{
    CalibFlag, Camera, CameraObservation, CameraParameters, CharucoBoard, CorrespondenceView,
    Distortion, FxFyCxCySkew, Iso3, Real, Resolution,
};
use rigcal_linear::{dlt_homography, estimate_intrinsics_from_homographies};
use serde::{Deserialize, Serialize};

use crate::collaborators::{SolveIntrinsics, SolvePoseRobust};
use crate::config::RefinementConfig;
use crate::error::CalibrationError;
use crate::outlier::filter_outliers;
use crate::schedule::RefinementSchedule;
use crate::topology::CameraSpec;

/// What happened in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundDiagnostics {
    /// 0 for the initial solve.
    pub round: usize,
    /// Outlier threshold, `None` for the initial solve.
    pub threshold: Option<Real>,
    /// Corners entering this round's solve.
    pub kept: usize,
    /// Corners the filter dropped this round.
    pub removed: usize,
    /// Reprojection RMS of this round's solve, in pixels.
    pub rms: Real,
    /// Images whose robust pose ran out of thresholds.
    pub no_convergence: usize,
}

/// A camera that finished every round.
#[derive(Debug, Clone)]
pub struct RefinedCamera {
    /// Intrinsics and distortion from the last solve.
    pub parameters: CameraParameters,
    /// Reprojection RMS of the last solve, in pixels.
    pub rms: Real,
    /// Filtered observations after the last round, one per input image.
    pub observations: Vec<CameraObservation>,
    /// One entry per solve, round 0 first.
    pub rounds: Vec<RoundDiagnostics>,
    /// Thresholds derived for this camera.
    pub schedule: RefinementSchedule,
}

/// A camera that failed part-way, with the rounds it completed first.
#[derive(Debug, Clone, PartialEq)]
pub struct RefineFailure {
    pub error: CalibrationError,
    /// Rounds finished before `error`.
    pub rounds: Vec<RoundDiagnostics>,
}

impl RefineFailure {
    fn after(error: CalibrationError, rounds: Vec<RoundDiagnostics>) -> Self {
        Self { error, rounds }
    }
}

impl From<CalibrationError> for RefineFailure {
    fn from(error: CalibrationError) -> Self {
        Self::after(error, Vec::new())
    }
}

impl fmt::Display for RefineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after {} completed rounds", self.error, self.rounds.len())
    }
}

/// Usable images resolved against the board.
fn usable_views(observations: &[CameraObservation], board: &CharucoBoard) -> Vec<CorrespondenceView> {
    observations
        .iter()
        .filter(|o| o.is_usable())
        .filter_map(|o| o.to_view(board).ok())
        .collect()
}

/// Starting intrinsics: from the nominal field of view when known, otherwise
/// Zhang's closed form over the usable views.
fn initial_camera(
    spec: &CameraSpec,
    views: &[CorrespondenceView],
) -> Result<Camera, String> {
    let res = spec.resolution;
    let intrinsics = match spec.hfov_deg {
        Some(hfov) => FxFyCxCySkew::from_hfov(res.width, res.height, hfov),
        None => {
            let homographies = views
                .iter()
                .map(|v| dlt_homography(&v.planar_points(), &v.points_2d))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("initial homography: {e}"))?;
            let mut k = estimate_intrinsics_from_homographies(&homographies, true)
                .map_err(|e| format!("closed-form intrinsics: {e}"))?;
            k.skew = 0.0;
            k
        }
    };
    Ok(Camera::new(intrinsics, Distortion::zero(spec.model)))
}

fn board_poses<S: SolvePoseRobust>(
    name: &str,
    spec: &CameraSpec,
    camera: &Camera,
    observations: &[CameraObservation],
    board: &CharucoBoard,
    schedule: &RefinementSchedule,
    solvers: &S,
) -> (Vec<Option<Iso3>>, usize) {
    let mut no_convergence = 0;
    let poses = observations
        .iter()
        .enumerate()
        .map(|(image, obs)| {
            if !obs.is_usable() {
                return None;
            }
            let view = obs.to_view(board).ok()?;
            let pose = if spec.fixed_sensor {
                solvers.solve_pose_direct(&view, camera)
            } else {
                solvers
                    .solve_pose_robust(&view, camera, &schedule.ladder)
                    .map(|robust| {
                        if !robust.converged {
                            no_convergence += 1;
                            warn!(
                                "camera {name}, image {image}: pose did not reach {:.0}% inliers by {:.1}px",
                                100.0 * schedule.ladder.min_inlier_fraction,
                                schedule.ladder.max
                            );
                        }
                        robust.pose
                    })
            };
            match pose {
                Ok(pose) => Some(pose),
                Err(err) => {
                    warn!("camera {name}, image {image}: no pose ({err}), left unfiltered");
                    None
                }
            }
        })
        .collect();
    (poses, no_convergence)
}

/// Run the full refinement for one camera.
///
/// Performs exactly `1 + config.rounds` intrinsic solves. A failed solve is
/// fatal for this camera and reported with its round index and the
/// diagnostics of the rounds before it.
pub fn refine_camera<S: SolveIntrinsics + SolvePoseRobust>(
    name: &str,
    spec: &CameraSpec,
    observations: &[CameraObservation],
    board: &CharucoBoard,
    config: &RefinementConfig,
    solvers: &S,
) -> Result<RefinedCamera, RefineFailure> {
    let failed = |round: usize, reason: String| CalibrationError::IntrinsicSolveFailed {
        camera: name.to_string(),
        round,
        reason,
    };
    let resolution: Resolution = spec.resolution;
    let flags = spec.flags.with(CalibFlag::UseIntrinsicGuess);

    let mut current: Vec<CameraObservation> = observations.to_vec();
    let views = usable_views(&current, board);
    if views.is_empty() {
        return Err(failed(0, "no usable images".into()).into());
    }
    let initial = initial_camera(spec, &views).map_err(|reason| failed(0, reason))?;
    let fit = solvers
        .solve_intrinsics(&views, resolution, &initial, flags)
        .map_err(|e| failed(0, e.to_string()))?;
    let mut camera = fit.camera;
    let mut rms = fit.rms;

    let hfov = spec
        .hfov_deg
        .unwrap_or_else(|| camera.intrinsics.hfov_deg(resolution.width));
    let schedule = RefinementSchedule::derive(config, hfov, resolution.height);
    info!(
        "camera {name}: {} usable images, initial rms {rms:.4}px, pose ladder {:.1}..{:.1}px",
        views.len(),
        schedule.ladder.initial,
        schedule.ladder.max
    );

    let mut rounds = vec![RoundDiagnostics {
        round: 0,
        threshold: None,
        kept: views.iter().map(CorrespondenceView::len).sum(),
        removed: 0,
        rms,
        no_convergence: 0,
    }];

    for round in 1..=schedule.rounds {
        let (poses, no_convergence) =
            board_poses(name, spec, &camera, &current, board, &schedule, solvers);
        let filtered = filter_outliers(
            &current,
            &poses,
            &camera,
            board,
            Some(schedule.filter_threshold(round)),
        );
        current = filtered.observations.clone();

        let views = usable_views(&current, board);
        if views.is_empty() {
            let error = failed(round, "every image was filtered out".into());
            return Err(RefineFailure::after(error, rounds));
        }
        let fit = match solvers.solve_intrinsics(&views, resolution, &camera, flags) {
            Ok(fit) => fit,
            Err(e) => return Err(RefineFailure::after(failed(round, e.to_string()), rounds)),
        };
        camera = fit.camera;
        rms = fit.rms;

        debug!(
            "camera {name} round {round}: threshold {:.2}px, kept {}, removed {}, rms {rms:.4}px",
            filtered.threshold,
            filtered.kept(),
            filtered.removed()
        );
        rounds.push(RoundDiagnostics {
            round,
            threshold: Some(filtered.threshold),
            kept: filtered.kept(),
            removed: filtered.removed(),
            rms,
            no_convergence,
        });
    }

    info!(
        "camera {name}: fx {:.2} fy {:.2} cx {:.2} cy {:.2}, rms {rms:.4}px",
        camera.intrinsics.fx, camera.intrinsics.fy, camera.intrinsics.cx, camera.intrinsics.cy
    );
    Ok(RefinedCamera {
        parameters: CameraParameters::new(camera, resolution, spec.flags),
        rms,
        observations: current,
        rounds,
        schedule,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::collaborators::{IntrinsicsFit, NativeSolvers, SolveFailed};
    use rigcal_core::synthetic::{board_poses as synthetic_poses, observe_all, with_noise};
    use rigcal_core::{CalibFlags, CameraModel};
    use rigcal_linear::{RobustPose, ThresholdLadder};

    /// Native solvers that count pose calls and fail the intrinsic solve
    /// numbered `fail_at` (1-based).
    #[derive(Default)]
    struct Scripted {
        inner: NativeSolvers,
        fail_at: Option<usize>,
        intrinsics: AtomicUsize,
        robust: AtomicUsize,
        direct: AtomicUsize,
    }

    impl SolveIntrinsics for Scripted {
        fn solve_intrinsics(
            &self,
            views: &[CorrespondenceView],
            resolution: Resolution,
            initial: &Camera,
            flags: CalibFlags,
        ) -> Result<IntrinsicsFit, SolveFailed> {
            let call = self.intrinsics.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_at == Some(call) {
                return Err(SolveFailed("normal equations are singular".into()));
            }
            self.inner.solve_intrinsics(views, resolution, initial, flags)
        }
    }

    impl SolvePoseRobust for Scripted {
        fn solve_pose_robust(
            &self,
            view: &CorrespondenceView,
            camera: &Camera,
            ladder: &ThresholdLadder,
        ) -> Result<RobustPose, SolveFailed> {
            self.robust.fetch_add(1, Ordering::SeqCst);
            self.inner.solve_pose_robust(view, camera, ladder)
        }

        fn solve_pose_direct(&self, view: &CorrespondenceView, camera: &Camera) -> Result<Iso3, SolveFailed> {
            self.direct.fetch_add(1, Ordering::SeqCst);
            self.inner.solve_pose_direct(view, camera)
        }
    }

    fn noisy_captures(board: &CharucoBoard) -> Vec<CameraObservation> {
        observe_all(&truth(), board, &synthetic_poses(board, 8, 700.0), Resolution::new(1280, 800))
            .iter()
            .enumerate()
            .map(|(i, o)| with_noise(o, 0.2, i as u64))
            .collect()
    }

    fn spec(hfov: Option<Real>) -> CameraSpec {
        CameraSpec {
            model: CameraModel::Perspective,
            hfov_deg: hfov,
            flags: CalibFlags::empty().with(CalibFlag::UseIntrinsicGuess),
            fixed_sensor: false,
            resolution: Resolution::new(1280, 800),
            extrinsics: None,
        }
    }

    fn truth() -> Camera {
        Camera::new(
            FxFyCxCySkew {
                fx: 905.0,
                fy: 902.0,
                cx: 636.0,
                cy: 404.0,
                skew: 0.0,
            },
            Distortion::from_coefficients(CameraModel::Perspective, &[-0.12, 0.03, 0.0, 0.0, 0.0]),
        )
    }

    #[test]
    fn recovers_intrinsics_from_hfov_guess() {
        let board = CharucoBoard::new(8, 6, 30.0, 22.0).unwrap();
        let res = Resolution::new(1280, 800);
        let obs: Vec<_> = observe_all(&truth(), &board, &synthetic_poses(&board, 8, 700.0), res)
            .iter()
            .enumerate()
            .map(|(i, o)| with_noise(o, 0.2, i as u64))
            .collect();

        let config = RefinementConfig {
            rounds: 2,
            ..RefinementConfig::default()
        };
        let refined =
            refine_camera("left", &spec(Some(70.0)), &obs, &board, &config, &NativeSolvers::default()).unwrap();
        let k = refined.parameters.camera.intrinsics;
        assert!((k.fx - 905.0).abs() < 3.0, "fx {}", k.fx);
        assert!((k.cy - 404.0).abs() < 3.0, "cy {}", k.cy);
        assert!(refined.rms < 0.3);
        assert_eq!(refined.rounds.len(), 3);
        assert_eq!(refined.observations.len(), obs.len());
    }

    #[test]
    fn no_usable_images_fails_round_zero() {
        let board = CharucoBoard::new(8, 6, 30.0, 22.0).unwrap();
        let obs = vec![CameraObservation::empty(Resolution::new(1280, 800)); 3];
        let err = refine_camera(
            "thermal",
            &spec(None),
            &obs,
            &board,
            &RefinementConfig::default(),
            &NativeSolvers::default(),
        )
        .unwrap_err();
        assert!(err.rounds.is_empty());
        assert!(matches!(
            err.error,
            CalibrationError::IntrinsicSolveFailed { round: 0, ref camera, .. } if camera == "thermal"
        ));
    }

    #[test]
    fn late_failure_keeps_completed_rounds() {
        let board = CharucoBoard::new(8, 6, 30.0, 22.0).unwrap();
        let solvers = Scripted {
            fail_at: Some(4),
            ..Scripted::default()
        };
        let err = refine_camera(
            "left",
            &spec(Some(70.0)),
            &noisy_captures(&board),
            &board,
            &RefinementConfig::default(),
            &solvers,
        )
        .unwrap_err();

        assert!(matches!(err.error, CalibrationError::IntrinsicSolveFailed { round: 3, .. }));
        let rounds: Vec<usize> = err.rounds.iter().map(|r| r.round).collect();
        assert_eq!(rounds, vec![0, 1, 2]);
        assert!(err.rounds.iter().all(|r| r.rms < 0.3));
    }

    #[test]
    fn fixed_sensor_uses_direct_poses() {
        let board = CharucoBoard::new(8, 6, 30.0, 22.0).unwrap();
        let obs = noisy_captures(&board);
        let thermal = CameraSpec {
            fixed_sensor: true,
            ..spec(Some(70.0))
        };
        let config = RefinementConfig {
            rounds: 2,
            ..RefinementConfig::default()
        };
        let solvers = Scripted::default();
        let refined = refine_camera("thermal", &thermal, &obs, &board, &config, &solvers).unwrap();

        assert_eq!(solvers.robust.load(Ordering::SeqCst), 0);
        assert_eq!(solvers.direct.load(Ordering::SeqCst), 2 * obs.len());
        assert_eq!(solvers.intrinsics.load(Ordering::SeqCst), 3);
        let k = refined.parameters.camera.intrinsics;
        assert!((k.fx - 905.0).abs() < 3.0, "fx {}", k.fx);
        assert!(refined.rms < 0.3);
    }
}
