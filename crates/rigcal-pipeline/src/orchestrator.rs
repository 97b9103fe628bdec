//! Rig-level driver.
//!
//! Runs `Idle -> PerCameraIntrinsics -> PerPairExtrinsics -> Assembled |
//! Failed`. Every camera refines independently, then every declared edge
//! whose cameras both refined is reconciled, intersected, solved and scored.
//! Failures are recorded per camera or pair; only a missing primary pair
//! fails the run.

use std::collections::BTreeMap;

use log::{info, warn};
use rigcal_core::{CameraObservation, CameraParameters, CharucoBoard, Resolution};

use crate::collaborators::{NativeSolvers, RigSolvers};
use crate::config::{CalibrationOptions, StereoConfig};
use crate::correspondence::intersect;
use crate::dispatch::{DeferredBatch, ExecutionMode};
use crate::error::{CalibrationError, Unit, UnitFailure};
use crate::observations::RigObservations;
use crate::refiner::{refine_camera, RefinedCamera};
use crate::resolution::{reconcile, scale_intrinsics, scale_observation};
use crate::result::{CameraCalibration, PipelineState, RigCalibrationResult, StereoConfigResult};
use crate::stereo::{solve_pair, StereoPair};
use crate::topology::{Edge, RigTopology};

/// Calibrate the rig with the default solvers.
pub fn calibrate_rig(
    topology: &RigTopology,
    observations: &RigObservations,
    board: &CharucoBoard,
    options: &CalibrationOptions,
) -> RigCalibrationResult {
    let solvers = NativeSolvers::new(options.refinement.ransac, options.solver)
        .with_stereo_start(options.stereo.start);
    calibrate_rig_with(topology, observations, board, options, &solvers)
}

/// Calibrate the rig with caller-supplied solvers.
pub fn calibrate_rig_with<S: RigSolvers + Sync>(
    topology: &RigTopology,
    observations: &RigObservations,
    board: &CharucoBoard,
    options: &CalibrationOptions,
    solvers: &S,
) -> RigCalibrationResult {
    let mut result = RigCalibrationResult::default();
    let mode = ExecutionMode::from_parallel(options.parallel);

    for name in &options.disabled_cameras {
        if topology.camera(name).is_none() {
            warn!("disabled camera {name} is not part of the rig");
        }
    }
    for (name, _) in topology.cameras.iter() {
        let entry = if options.is_disabled(name) {
            CameraCalibration::disabled()
        } else {
            CameraCalibration::failed()
        };
        result.cameras.insert(name.clone(), entry);
    }

    if let Err(err) = topology.validate() {
        warn!("{err}");
        result.failures.push(UnitFailure::new(Unit::Rig, err));
        result.state = PipelineState::Failed;
        return result;
    }

    let (worklist, skipped): (Vec<Edge>, Vec<Edge>) = topology
        .edges()
        .into_iter()
        .partition(|e| !options.is_disabled(&e.pair.left) && !options.is_disabled(&e.pair.right));
    result.skipped_pairs = skipped.into_iter().map(|e| e.pair).collect();

    result.state = PipelineState::PerCameraIntrinsics;
    let refined = refine_cameras(topology, observations, board, options, solvers, mode, &mut result);

    result.state = PipelineState::PerPairExtrinsics;
    solve_pairs(&worklist, &refined, board, &options.stereo, solvers, mode, &mut result);

    result.state = match topology.stereo_config.as_ref() {
        None => PipelineState::Assembled,
        Some(primary) => {
            result.stereo_config = result
                .pair(&primary.left_cam, &primary.right_cam)
                .map(|pair| StereoConfigResult::from_pair(pair, &primary.left_cam, &primary.right_cam));
            if result.stereo_config.is_some() {
                PipelineState::Assembled
            } else {
                warn!(
                    "primary pair {} / {} was not produced",
                    primary.left_cam, primary.right_cam
                );
                PipelineState::Failed
            }
        }
    };
    info!(
        "rig calibration {:?}: {} cameras, {} pairs, {} failures",
        result.state,
        refined.len(),
        result.pairs.len(),
        result.failures.len()
    );
    result
}

fn refine_cameras<S: RigSolvers + Sync>(
    topology: &RigTopology,
    observations: &RigObservations,
    board: &CharucoBoard,
    options: &CalibrationOptions,
    solvers: &S,
    mode: ExecutionMode,
    result: &mut RigCalibrationResult,
) -> BTreeMap<String, RefinedCamera> {
    let mut batch = DeferredBatch::new();
    let mut handles = Vec::new();
    for (name, spec) in topology.cameras.iter().filter(|(n, _)| !options.is_disabled(n)) {
        let images = observations.get(name).unwrap_or(&[]);
        let config = &options.refinement;
        handles.push((
            name.clone(),
            batch.submit(move || refine_camera(name, spec, images, board, config, solvers)),
        ));
    }
    info!("refining {} cameras", batch.len());
    let mut outputs = batch.execute(mode);

    let mut refined = BTreeMap::new();
    for (name, handle) in handles {
        match outputs.take(handle) {
            Some(Ok(camera)) => {
                result
                    .cameras
                    .insert(name.clone(), CameraCalibration::from_refined(&camera));
                refined.insert(name, camera);
            }
            Some(Err(failure)) => {
                warn!("camera {name}: {failure}");
                result
                    .cameras
                    .insert(name.clone(), CameraCalibration::failed_with(failure.rounds));
                result.failures.push(UnitFailure::new(Unit::Camera(name), failure.error));
            }
            None => {}
        }
    }
    refined
}

fn solve_pairs<S: RigSolvers + Sync>(
    worklist: &[Edge],
    refined: &BTreeMap<String, RefinedCamera>,
    board: &CharucoBoard,
    config: &StereoConfig,
    solvers: &S,
    mode: ExecutionMode,
    result: &mut RigCalibrationResult,
) {
    let mut batch = DeferredBatch::new();
    let mut handles = Vec::new();
    for edge in worklist {
        let unit = Unit::Pair(edge.pair.clone());
        let missing = [&edge.pair.left, &edge.pair.right]
            .into_iter()
            .find(|cam| !refined.contains_key(cam.as_str()));
        if let Some(camera) = missing {
            let err = CalibrationError::MissingIntrinsics {
                camera: camera.clone(),
            };
            warn!("pair {}: {err}", edge.pair);
            result.failures.push(UnitFailure::new(unit, err));
            continue;
        }
        let (Some(left), Some(right)) = (refined.get(&edge.pair.left), refined.get(&edge.pair.right)) else {
            continue;
        };
        handles.push((unit, batch.submit(move || solve_edge(edge, left, right, board, config, solvers))));
    }
    info!("solving {} camera pairs", batch.len());
    let mut outputs = batch.execute(mode);

    for (unit, handle) in handles {
        match outputs.take(handle) {
            Some(Ok(pair)) => result.pairs.push(pair),
            Some(Err(err)) => {
                warn!("{unit}: {err}");
                result.failures.push(UnitFailure::new(unit, err));
            }
            None => {}
        }
    }
}

/// Parameters and observations of one camera on the pair's working
/// resolution.
fn on_target(camera: &RefinedCamera, target: Resolution) -> (CameraParameters, Vec<CameraObservation>) {
    let params = camera.parameters;
    if params.resolution == target {
        return (params, camera.observations.clone());
    }
    let scaled = CameraParameters {
        camera: scale_intrinsics(&params.camera, params.resolution, target),
        resolution: target,
        ..params
    };
    let observations = camera
        .observations
        .iter()
        .map(|obs| {
            let obs = CameraObservation {
                resolution: params.resolution,
                ..obs.clone()
            };
            scale_observation(&obs, target)
        })
        .collect();
    (scaled, observations)
}

fn solve_edge<S: RigSolvers>(
    edge: &Edge,
    left: &RefinedCamera,
    right: &RefinedCamera,
    board: &CharucoBoard,
    config: &StereoConfig,
    solvers: &S,
) -> Result<StereoPair, CalibrationError> {
    let (lres, rres) = (left.parameters.resolution, right.parameters.resolution);
    let rec = reconcile(lres, rres);
    if rec.target.width == 0 || rec.target.height == 0 {
        let from = if lres.area() >= rres.area() { lres } else { rres };
        return Err(CalibrationError::InsufficientResolution {
            from,
            to: if from == lres { rres } else { lres },
            scaled_height: rec.target.height,
        });
    }
    if !rec.is_identity() {
        info!(
            "pair {}: working at {} (scale {:.4})",
            edge.pair, rec.target, rec.scale
        );
    }

    let (lp, lobs) = on_target(left, rec.target);
    let (rp, robs) = on_target(right, rec.target);
    let common = intersect(&lobs, &robs, board, config.intrinsics_mode)?;
    solve_pair(
        &edge.pair,
        &lp,
        &rp,
        &common,
        &edge.rotation,
        &edge.translation,
        rec.target,
        config,
        solvers,
    )
}
