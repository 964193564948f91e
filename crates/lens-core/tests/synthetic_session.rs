use lens_core::synthetic::planar::{synthetic_session, tilted_poses};
use lens_core::synthetic::UniformPixelNoise;
use lens_core::{
    BrownConrady5, CalibrationPattern, CalibrationResult, CoreError, FxFyCxCySkew, ImageSize,
    PatternObservation, PinholeCamera, Pt2, ViewPose,
};

fn camera() -> PinholeCamera<f64> {
    PinholeCamera::new(
        FxFyCxCySkew {
            fx: 900.0,
            fy: 880.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        },
        BrownConrady5::from_coeffs([-0.12, 0.03, 0.0, 0.0005, -0.0003]),
    )
}

#[test]
fn noisy_session_is_reproducible_and_bounded() {
    let pattern = CalibrationPattern::new(7, 9, 0.025).unwrap();
    let cam = camera();
    let poses = tilted_poses(&pattern, 8, 0.7);
    let size = ImageSize::new(1280, 720);
    let noise = UniformPixelNoise::new(42, 0.3);

    let a = synthetic_session(&cam, &pattern, &poses, size, &noise).unwrap();
    let b = synthetic_session(&cam, &pattern, &poses, size, &noise).unwrap();
    assert_eq!(a.len(), 8);
    assert_eq!(a.points_per_view(), Some(63));
    assert_eq!(a.image_size(), Some(size));
    assert_eq!(a.observations(), b.observations());

    let clean = synthetic_session(&cam, &pattern, &poses, size, &UniformPixelNoise::default()).unwrap();
    for (noisy, exact) in a.observations().iter().zip(clean.observations()) {
        for (p, q) in noisy.points_2d().iter().zip(exact.points_2d()) {
            assert!((p.x - q.x).abs() <= 0.3 + 1e-12);
            assert!((p.y - q.y).abs() <= 0.3 + 1e-12);
        }
    }
}

#[test]
fn rejected_observation_leaves_session_untouched() {
    let pattern = CalibrationPattern::new(4, 5, 0.03).unwrap();
    let poses = tilted_poses(&pattern, 3, 0.5);
    let size = ImageSize::new(640, 480);
    let mut session =
        synthetic_session(&camera(), &pattern, &poses, size, &UniformPixelNoise::default()).unwrap();
    let before = session.observations().to_vec();

    let other = CalibrationPattern::new(3, 3, 0.03).unwrap();
    let pixels = (0..9).map(|i| Pt2::new(i as f64, i as f64 * 2.0)).collect();
    let small = PatternObservation::from_pattern(&other, pixels).unwrap();
    let err = session.add_observation(small, size).unwrap_err();
    assert!(matches!(err, CoreError::PointCountMismatch { expected: 20, got: 9 }));

    let same_layout = session.observations()[0].clone();
    let err = session
        .add_observation(same_layout, ImageSize::new(1280, 720))
        .unwrap_err();
    assert!(matches!(err, CoreError::ResolutionMismatch { .. }));

    assert_eq!(session.observations(), before.as_slice());
}

#[test]
fn result_survives_a_trip_through_disk() {
    let pattern = CalibrationPattern::new(4, 5, 0.03).unwrap();
    let poses: Vec<ViewPose> = tilted_poses(&pattern, 4, 0.5)
        .iter()
        .map(ViewPose::from_iso)
        .collect();
    let result = CalibrationResult::new(
        ImageSize::new(640, 480),
        camera(),
        poses,
        0.21,
        vec![0.2, 0.25, 0.18, 0.21],
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calibration.json");
    result.save_json(&path).unwrap();
    let loaded = CalibrationResult::load_json(&path).unwrap();
    assert_eq!(loaded, result);

    let missing = CalibrationResult::load_json(dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(missing, CoreError::Io { .. }));

    std::fs::write(&path, "{\"image_size\": 3}").unwrap();
    let garbage = CalibrationResult::load_json(&path).unwrap_err();
    assert!(matches!(garbage, CoreError::Json { .. }));
}
