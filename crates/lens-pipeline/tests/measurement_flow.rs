//! Runtime measurement end to end on frames rendered through a distorting lens.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use lens_core::{
    distort_to_pixel, pixel_to_normalized, BrownConrady5, CalibrationResult, DistortionModel,
    FxFyCxCySkew, ImageSize, PinholeCamera, Pt2, Real,
};
use lens_imgproc::OverlayStyle;
use lens_pipeline::{
    run_measurements, LensConfig, MeasureError, MeasurementPipeline, ReferenceSelector,
    Undistorter, VecSource,
};

const W: u32 = 480;
const H: u32 = 360;

fn calibration(dist: BrownConrady5<Real>) -> CalibrationResult {
    let camera = PinholeCamera::new(
        FxFyCxCySkew {
            fx: 450.0,
            fy: 450.0,
            cx: 240.0,
            cy: 180.0,
            skew: 0.0,
        },
        dist,
    );
    CalibrationResult::new(ImageSize::new(W, H), camera, Vec::new(), 0.2, Vec::new()).unwrap()
}

fn lens() -> BrownConrady5<Real> {
    BrownConrady5 {
        k1: -0.08,
        k2: 0.01,
        ..Default::default()
    }
}

/// Ideal scene: dark discs on a light background.
fn scene(discs: &[(i32, i32, i32)]) -> GrayImage {
    let mut img = GrayImage::from_pixel(W, H, Luma([230]));
    for &(x, y, r) in discs {
        draw_filled_circle_mut(&mut img, (x, y), r, Luma([20]));
    }
    img
}

/// What the lens records: each raw pixel shows the ideal scene point its ray came from.
fn through_lens(ideal: &GrayImage, result: &CalibrationResult) -> RgbImage {
    let k = *result.intrinsics();
    let dist = *result.distortion();
    RgbImage::from_fn(W, H, |x, y| {
        let n = dist.undistort(&pixel_to_normalized(Pt2::new(x as Real, y as Real), &k));
        let p = distort_to_pixel(n, &k, &BrownConrady5::default());
        let (sx, sy) = (p.x.round() as i64, p.y.round() as i64);
        let g = if sx >= 0 && sy >= 0 && sx < W as i64 && sy < H as i64 {
            ideal.get_pixel(sx as u32, sy as u32)[0]
        } else {
            230
        };
        Rgb([g, g, g])
    })
}

#[test]
fn distance_is_recovered_through_undistortion() {
    let result = calibration(lens());
    let raw = through_lens(&scene(&[(140, 180, 40), (340, 180, 22)]), &result);
    let mut pipeline = MeasurementPipeline::from_config(result, &LensConfig::default()).unwrap();

    let report = pipeline.process(0, &raw).unwrap();
    let m = report.measurement.as_ref().unwrap();
    let primary = m.primary().unwrap();
    assert!((primary.pixel_distance - 200.0).abs() < 3.0, "{primary:?}");
    assert!((primary.metric_distance - 6.25).abs() < 0.3, "{primary:?}");

    let annotated = report.annotated(&OverlayStyle::default());
    assert_eq!(annotated.dimensions(), (W, H));
}

#[test]
fn identical_frames_give_identical_reports() {
    let result = calibration(lens());
    let raw = through_lens(&scene(&[(140, 180, 40), (340, 180, 22)]), &result);
    let mut pipeline = MeasurementPipeline::from_config(result, &LensConfig::default()).unwrap();
    let a = pipeline.process(0, &raw).unwrap();
    let b = pipeline.process(1, &raw).unwrap();
    assert_eq!(a.measurement, b.measurement);
    assert_eq!(a.undistorted, b.undistorted);
}

#[test]
fn single_marker_reports_insufficient_markers() {
    let result = calibration(BrownConrady5::default());
    let raw = through_lens(&scene(&[(240, 180, 35)]), &result);
    let mut pipeline = MeasurementPipeline::from_config(result, &LensConfig::default()).unwrap();
    let report = pipeline.process(0, &raw).unwrap();
    assert_eq!(report.circles.len(), 1);
    assert_eq!(
        report.measurement,
        Err(MeasureError::InsufficientMarkers { found: 1 })
    );
}

#[test]
fn region_selector_without_match_is_recoverable() {
    let mut config = LensConfig::default();
    config.measurement.reference = ReferenceSelector::InRegion {
        x: 0.0,
        y: 0.0,
        width: 40.0,
        height: 40.0,
    };
    let result = calibration(BrownConrady5::default());
    let frames = vec![
        through_lens(&scene(&[(140, 180, 40), (340, 180, 22)]), &result),
        through_lens(&scene(&[]), &result),
    ];
    let mut pipeline = MeasurementPipeline::from_config(result, &config).unwrap();
    let mut outcomes = Vec::new();
    let n = run_measurements(&mut VecSource::new(frames), &mut pipeline, |r| {
        outcomes.push(r.measurement.clone())
    })
    .unwrap();
    assert_eq!(n, 2);
    assert_eq!(outcomes[0], Err(MeasureError::ReferenceNotFound));
    assert_eq!(outcomes[1], Err(MeasureError::InsufficientMarkers { found: 0 }));
}

#[test]
fn zero_distortion_leaves_frames_untouched() {
    let result = calibration(BrownConrady5::default());
    let frame = through_lens(&scene(&[(100, 100, 30)]), &result);
    let u = Undistorter::for_calibration(&result).unwrap();
    assert_eq!(u.apply(&frame), frame);
}
