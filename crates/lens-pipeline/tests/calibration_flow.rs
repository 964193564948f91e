//! Capture and calibration end to end: rendered chessboard frames through the
//! capture controller, and synthetic correspondences through the solver and
//! persistence.

use image::{Rgb, RgbImage};
use lens_core::synthetic::planar::{synthetic_session, tilted_poses};
use lens_core::{
    BrownConrady5, CalibrationPattern, CalibrationResult, FxFyCxCySkew, ImageSize, Iso3, Mat3,
    PinholeCamera, Real, UniformPixelNoise, Vec3,
};
use lens_pipeline::{
    CalibrationError, CalibrationSolver, CaptureController, CaptureEvent, CaptureState,
    ChessboardDetector, Undistorter,
};

fn camera(dist: BrownConrady5<Real>) -> PinholeCamera<Real> {
    PinholeCamera::new(
        FxFyCxCySkew {
            fx: 780.0,
            fy: 770.0,
            cx: 318.0,
            cy: 242.0,
            skew: 0.0,
        },
        dist,
    )
}

/// Board-plane to pixel homography `K [r1 r2 t]`.
fn plane_homography(k: &Mat3, pose: &Iso3) -> Mat3 {
    let r = pose.rotation.to_rotation_matrix();
    let mut h = Mat3::zeros();
    h.set_column(0, &(k * r.matrix().column(0)));
    h.set_column(1, &(k * r.matrix().column(1)));
    h.set_column(2, &(k * pose.translation.vector));
    h
}

/// Chessboard with `pattern`'s inner corners and one square of margin, seen
/// through a distortion-free camera, 2x2 supersampled.
fn render_view(pattern: &CalibrationPattern, k: &Mat3, pose: &Iso3, size: ImageSize) -> RgbImage {
    let h_inv = plane_homography(k, pose).try_inverse().unwrap();
    let s = pattern.spacing;
    let (cols, rows) = (pattern.cols as Real, pattern.rows as Real);
    RgbImage::from_fn(size.width, size.height, |px, py| {
        let mut acc = 0u32;
        for j in 0..2 {
            for i in 0..2 {
                let u = px as Real + (i as Real + 0.5) * 0.5 - 0.5;
                let v = py as Real + (j as Real + 0.5) * 0.5 - 0.5;
                let b = h_inv * Vec3::new(u, v, 1.0);
                let (x, y) = (b.x / b.z / s, b.y / b.z / s);
                let inside = x >= -1.0 && y >= -1.0 && x < cols && y < rows;
                let dark = inside && ((x + 1.0).floor() as i64 + (y + 1.0).floor() as i64) % 2 == 0;
                acc += if dark { 25 } else { 225 };
            }
        }
        let g = (acc / 4) as u8;
        Rgb([g, g, g])
    })
}

#[test]
fn rendered_boards_calibrate_through_capture_controller() {
    let pattern = CalibrationPattern::new(6, 8, 0.03).unwrap();
    let size = ImageSize::new(640, 480);
    let truth = camera(BrownConrady5::default());
    let k = truth.k.k_matrix();

    let solver = CalibrationSolver {
        min_observations: 8,
        ..CalibrationSolver::default()
    };
    let mut ctl = CaptureController::new(ChessboardDetector::new(pattern), solver);

    let blank = RgbImage::from_pixel(size.width, size.height, Rgb([128, 128, 128]));
    assert!(!ctl.process_frame(&blank));

    for pose in tilted_poses(&pattern, 10, 0.8) {
        let frame = render_view(&pattern, &k, &pose, size);
        assert!(ctl.process_frame(&frame), "board not detected");
        ctl.handle(CaptureEvent::Accept).unwrap();
    }
    assert_eq!(ctl.handle(CaptureEvent::Finish).unwrap(), CaptureState::Finished);

    let result = ctl.into_result().unwrap();
    let est = result.intrinsics();
    assert!((est.fx - 780.0).abs() / 780.0 < 0.02, "fx = {}", est.fx);
    assert!((est.fy - 770.0).abs() / 770.0 < 0.02, "fy = {}", est.fy);
    assert!((est.cx - 318.0).abs() < 10.0, "cx = {}", est.cx);
    assert!((est.cy - 242.0).abs() < 10.0, "cy = {}", est.cy);
    assert!(result.rms_error() < 0.5, "rms = {}", result.rms_error());
    assert!(result.mean_reprojection_error().unwrap() < 0.5);
}

fn distorted_session(n_views: usize) -> lens_core::CalibrationSession {
    let pattern = CalibrationPattern::new(6, 8, 0.03).unwrap();
    let dist = BrownConrady5 {
        k1: -0.1,
        k2: 0.02,
        p1: 0.001,
        p2: -0.0005,
        ..Default::default()
    };
    synthetic_session(
        &camera(dist),
        &pattern,
        &tilted_poses(&pattern, n_views, 0.6),
        ImageSize::new(640, 480),
        &UniformPixelNoise::new(7, 0.2),
    )
    .unwrap()
}

#[test]
fn noisy_session_stays_within_half_a_pixel() {
    let result = CalibrationSolver::default().solve(&distorted_session(14)).unwrap();
    assert!(result.rms_error() < 0.5, "rms = {}", result.rms_error());
    assert!((result.intrinsics().fx - 780.0).abs() < 8.0);
    assert!((result.distortion().k1 + 0.1).abs() < 0.03);
    assert_eq!(result.per_view_errors().len(), 14);
}

#[test]
fn solver_is_deterministic() {
    let session = distorted_session(12);
    let a = CalibrationSolver::default().solve(&session).unwrap();
    let b = CalibrationSolver::default().solve(&session).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.to_json_string().unwrap(), b.to_json_string().unwrap());
}

#[test]
fn insufficient_views_never_reach_the_solver() {
    let err = CalibrationSolver::default().solve(&distorted_session(6)).unwrap_err();
    assert!(matches!(err, CalibrationError::InsufficientData { have: 6, need: 10 }));
}

#[test]
fn saved_result_loads_back_exactly() {
    let result = CalibrationSolver::default().solve(&distorted_session(12)).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calib.json");
    result.save_json(&path).unwrap();
    let loaded = CalibrationResult::load_json(&path).unwrap();
    assert_eq!(loaded, result);

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["camera_matrix"].as_array().unwrap().len(), 9);
    assert_eq!(json["distortion_coeffs"].as_array().unwrap().len(), 5);
    assert_eq!(json["rvecs"].as_array().unwrap().len(), 12);
}

#[test]
fn undistorter_from_loaded_result_has_calibrated_size() {
    let result = CalibrationSolver::default().solve(&distorted_session(12)).unwrap();
    let u = Undistorter::for_calibration(&result).unwrap();
    assert_eq!(u.image_size(), ImageSize::new(640, 480));
    let frame = RgbImage::from_pixel(640, 480, Rgb([90, 90, 90]));
    let out = u.apply(&frame);
    assert_eq!(*out.get_pixel(320, 240), Rgb([90, 90, 90]));
}
