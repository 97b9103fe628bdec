use rigcal::prelude::*;

#[test]
fn empty_rig_fails_topology_validation() {
    let board = CharucoBoard::new(8, 6, 4.0, 3.0).unwrap();
    let topology: RigTopology = serde_json::from_str(r#"{"cameras": {}}"#).unwrap();
    let result = calibrate_rig(
        &topology,
        &RigObservations::default(),
        &board,
        &CalibrationOptions::default(),
    );
    assert_eq!(result.state, PipelineState::Failed);
    assert!(matches!(
        result.failures[0].error,
        CalibrationError::InvalidTopology { .. }
    ));

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["state"], "failed");
    assert_eq!(json["failures"][0]["unit"], "rig");
    assert_eq!(json["failures"][0]["kind"], "invalid_topology");
}

#[test]
fn missing_observations_fail_only_that_camera() {
    let board = CharucoBoard::new(8, 6, 4.0, 3.0).unwrap();
    let topology: RigTopology = serde_json::from_str(
        r#"{"cameras": {"thermal": {"resolution": {"width": 256, "height": 192},
                                    "fixed_sensor": true}}}"#,
    )
    .unwrap();
    let result = calibrate_rig(
        &topology,
        &RigObservations::default(),
        &board,
        &CalibrationOptions::default(),
    );
    assert_eq!(result.state, PipelineState::Assembled);
    assert!(!result.camera("thermal").unwrap().is_calibrated());
    assert!(matches!(
        result.failures[0].error,
        CalibrationError::IntrinsicSolveFailed { round: 0, .. }
    ));
}
