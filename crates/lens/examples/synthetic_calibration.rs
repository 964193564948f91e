//! Calibrate from synthetic views and print the recovered camera.
//!
//! Run with `cargo run -p spatial-lens --example synthetic_calibration`.

use anyhow::Result;
use spatial_lens::core::synthetic::planar::{synthetic_session, tilted_poses};
use spatial_lens::core::UniformPixelNoise;
use spatial_lens::prelude::*;

fn main() -> Result<()> {
    let pattern = CalibrationPattern::new(7, 9, 0.025)?;
    let truth = PinholeCamera::new(
        FxFyCxCySkew {
            fx: 910.0,
            fy: 905.0,
            cx: 642.0,
            cy: 358.0,
            skew: 0.0,
        },
        BrownConrady5 {
            k1: -0.15,
            k2: 0.04,
            ..Default::default()
        },
    );
    let poses = tilted_poses(&pattern, 15, 0.7);
    let noise = UniformPixelNoise::new(42, 0.3);
    let session = synthetic_session(&truth, &pattern, &poses, ImageSize::new(1280, 720), &noise)?;

    let result = CalibrationSolver::default().solve(&session)?;
    let k = result.intrinsics();
    println!("fx={:.2} fy={:.2} cx={:.2} cy={:.2}", k.fx, k.fy, k.cx, k.cy);
    println!("distortion={:?}", result.distortion().coeffs());
    println!("rms={:.4} px", result.rms_error());
    Ok(())
}
