use nalgebra::{Point3, RealField, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use super::{BrownConrady5, DistortionModel, FxFyCxCySkew, IntrinsicsModel};

/// Unit-norm viewing ray in the camera frame.
#[derive(Clone, Copy, Debug)]
pub struct Ray<S: RealField + Copy> {
    pub dir: Vector3<S>,
}

/// Pinhole camera with Brown-Conrady distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera<S: RealField + Copy> {
    pub k: FxFyCxCySkew<S>,
    pub dist: BrownConrady5<S>,
}

impl<S: RealField + Copy> PinholeCamera<S> {
    pub fn new(k: FxFyCxCySkew<S>, dist: BrownConrady5<S>) -> Self {
        Self { k, dist }
    }

    /// Project a camera-frame point to pixels; `None` behind the camera.
    pub fn project_point_c(&self, p_c: &Vector3<S>) -> Option<Vector2<S>> {
        if p_c.z <= S::zero() {
            return None;
        }
        let n_u = Vector2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        let n_d = self.dist.distort(&n_u);
        Some(self.k.sensor_to_pixel(&n_d))
    }

    pub fn project_point(&self, p_c: &Point3<S>) -> Option<Vector2<S>> {
        self.project_point_c(&p_c.coords)
    }

    pub fn backproject_pixel(&self, px: &Vector2<S>) -> Ray<S> {
        let n_d = self.k.pixel_to_sensor(px);
        let n_u = self.dist.undistort(&n_d);
        let dir = Vector3::new(n_u.x, n_u.y, S::one());
        Ray {
            dir: dir / dir.norm(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> PinholeCamera<f64> {
        PinholeCamera::new(
            FxFyCxCySkew {
                fx: 800.0,
                fy: 810.0,
                cx: 640.0,
                cy: 360.0,
                skew: 0.0,
            },
            BrownConrady5 {
                k1: -0.15,
                k2: 0.02,
                k3: 0.0,
                p1: 0.0005,
                p2: -0.0003,
                iters: 20,
            },
        )
    }

    #[test]
    fn backproject_then_project_returns_pixel() {
        let cam = camera();
        let px = Vector2::new(1000.0, 200.0);
        let ray = cam.backproject_pixel(&px);
        let px2 = cam.project_point_c(&(ray.dir * 2.5)).unwrap();
        assert!((px2 - px).norm() < 1e-6, "err={}", (px2 - px).norm());
    }

    #[test]
    fn points_behind_camera_do_not_project() {
        let cam = camera();
        assert!(cam.project_point_c(&Vector3::new(0.1, 0.1, -1.0)).is_none());
        assert!(cam.project_point_c(&Vector3::new(0.1, 0.1, 0.0)).is_none());
    }
}
