//! Joint refinement of intrinsics, distortion and per-view pattern poses.
//!
//! Parameter vector: the free entries of the intrinsics block
//! `[fx, fy, cx, cy, skew, k1, k2, p1, p2, k3]` (see [`IntrinsicsMask`]),
//! followed by 6 values per view (axis-angle rotation, translation).
//! Residuals: `observed - projected` pixel coordinates, two rows per point.

use lens_core::{
    BrownConrady5, FxFyCxCySkew, Iso3, PatternObservation, PinholeCamera, Real, Vec3,
};
use log::debug;
use nalgebra::{DMatrix, DVector, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jacobian::per_view_jacobian;
use crate::{NllsProblem, NllsSolverBackend, RobustKernel, SolveOptions, SolveReport};

/// Size of the full intrinsics block.
pub const INTRINSICS_DIM: usize = 10;
/// Parameters per view pose.
pub const POSE_DIM: usize = 6;

const SKEW: usize = 4;
const P1: usize = 7;
const P2: usize = 8;
const K3: usize = 9;

#[derive(Debug, Error)]
pub enum PlanarIntrinsicsError {
    #[error("need at least one view")]
    NoViews,
    #[error("{poses} initial poses for {views} views")]
    PoseCountMismatch { poses: usize, views: usize },
}

/// Which intrinsics/distortion entries stay at their initial values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrinsicsMask {
    pub fix_skew: bool,
    pub fix_k3: bool,
    pub fix_tangential: bool,
}

impl Default for IntrinsicsMask {
    fn default() -> Self {
        Self {
            fix_skew: true,
            fix_k3: false,
            fix_tangential: false,
        }
    }
}

/// Mapping between the optimiser's parameter vector and the camera + poses.
#[derive(Debug, Clone)]
pub struct ParamLayout {
    free: Vec<usize>,
    n_views: usize,
}

impl ParamLayout {
    pub fn new(mask: IntrinsicsMask, n_views: usize) -> Self {
        let free = (0..INTRINSICS_DIM)
            .filter(|&i| match i {
                SKEW => !mask.fix_skew,
                K3 => !mask.fix_k3,
                P1 | P2 => !mask.fix_tangential,
                _ => true,
            })
            .collect();
        Self { free, n_views }
    }

    /// Indices into the full intrinsics block that are optimised.
    pub fn free_intrinsics(&self) -> &[usize] {
        &self.free
    }

    pub fn num_views(&self) -> usize {
        self.n_views
    }

    pub fn num_params(&self) -> usize {
        self.free.len() + POSE_DIM * self.n_views
    }

    pub fn pose_offset(&self, view: usize) -> usize {
        self.free.len() + POSE_DIM * view
    }
}

fn intrinsics_block(camera: &PinholeCamera<Real>) -> [Real; INTRINSICS_DIM] {
    let k = &camera.k;
    let d = &camera.dist;
    [k.fx, k.fy, k.cx, k.cy, k.skew, d.k1, d.k2, d.p1, d.p2, d.k3]
}

fn camera_from_block(b: &[Real; INTRINSICS_DIM], iters: u32) -> PinholeCamera<Real> {
    PinholeCamera::new(
        FxFyCxCySkew {
            fx: b[0],
            fy: b[1],
            cx: b[2],
            cy: b[3],
            skew: b[4],
        },
        BrownConrady5 {
            k1: b[5],
            k2: b[6],
            k3: b[9],
            p1: b[7],
            p2: b[8],
            iters,
        },
    )
}

pub(crate) fn pose_from_slice(p: &[Real]) -> Iso3 {
    let rotation = UnitQuaternion::from_scaled_axis(Vec3::new(p[0], p[1], p[2]));
    Iso3::from_parts(Translation3::new(p[3], p[4], p[5]), rotation)
}

/// Project one view; writes `observed - projected` into `out`.
///
/// Returns `false` if any point is at or behind the camera plane.
pub(crate) fn view_residuals(
    camera: &PinholeCamera<Real>,
    pose: &Iso3,
    obs: &PatternObservation,
    out: &mut [Real],
) -> bool {
    for (i, (pw, uv)) in obs.points_3d().iter().zip(obs.points_2d()).enumerate() {
        let Some(proj) = camera.project_point(&pose.transform_point(pw)) else {
            return false;
        };
        out[2 * i] = uv.x - proj.x;
        out[2 * i + 1] = uv.y - proj.y;
    }
    true
}

/// Planar calibration problem over borrowed observations.
#[derive(Debug, Clone)]
pub struct PlanarIntrinsicsProblem<'a> {
    views: &'a [PatternObservation],
    layout: ParamLayout,
    /// Full intrinsics block; fixed entries are read from here.
    base: [Real; INTRINSICS_DIM],
    robust: RobustKernel,
}

impl<'a> PlanarIntrinsicsProblem<'a> {
    /// `initial` supplies values for the masked (fixed) entries.
    pub fn new(
        views: &'a [PatternObservation],
        initial: &PinholeCamera<Real>,
        mask: IntrinsicsMask,
        robust: RobustKernel,
    ) -> Result<Self, PlanarIntrinsicsError> {
        if views.is_empty() {
            return Err(PlanarIntrinsicsError::NoViews);
        }
        Ok(Self {
            views,
            layout: ParamLayout::new(mask, views.len()),
            base: intrinsics_block(initial),
            robust,
        })
    }

    pub fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    pub fn views(&self) -> &[PatternObservation] {
        self.views
    }

    pub fn pack_params(&self, camera: &PinholeCamera<Real>, poses: &[Iso3]) -> DVector<Real> {
        let block = intrinsics_block(camera);
        let mut x = DVector::zeros(self.layout.num_params());
        for (slot, &idx) in self.layout.free.iter().enumerate() {
            x[slot] = block[idx];
        }
        for (view, pose) in poses.iter().enumerate() {
            let o = self.layout.pose_offset(view);
            let r = pose.rotation.scaled_axis();
            let t = pose.translation.vector;
            x.rows_mut(o, POSE_DIM)
                .copy_from_slice(&[r.x, r.y, r.z, t.x, t.y, t.z]);
        }
        x
    }

    pub fn decode_camera(&self, x: &DVector<Real>) -> PinholeCamera<Real> {
        let mut block = self.base;
        for (slot, &idx) in self.layout.free.iter().enumerate() {
            block[idx] = x[slot];
        }
        camera_from_block(&block, 0)
    }

    pub fn decode_pose(&self, x: &DVector<Real>, view: usize) -> Iso3 {
        let o = self.layout.pose_offset(view);
        pose_from_slice(&x.as_slice()[o..o + POSE_DIM])
    }

    pub fn decode_params(&self, x: &DVector<Real>) -> (PinholeCamera<Real>, Vec<Iso3>) {
        let poses = (0..self.layout.num_views())
            .map(|v| self.decode_pose(x, v))
            .collect();
        (self.decode_camera(x), poses)
    }

    /// Row offset of each view's residual block.
    pub(crate) fn row_offsets(&self) -> Vec<usize> {
        self.views
            .iter()
            .scan(0, |acc, v| {
                let start = *acc;
                *acc += 2 * v.len();
                Some(start)
            })
            .collect()
    }
}

impl NllsProblem for PlanarIntrinsicsProblem<'_> {
    fn num_params(&self) -> usize {
        self.layout.num_params()
    }

    fn num_residuals(&self) -> usize {
        self.views.iter().map(|v| 2 * v.len()).sum()
    }

    fn residuals_unweighted(&self, x: &DVector<Real>) -> Option<DVector<Real>> {
        let camera = self.decode_camera(x);
        let mut r = DVector::zeros(self.num_residuals());
        for (view, (obs, start)) in self.views.iter().zip(self.row_offsets()).enumerate() {
            let pose = self.decode_pose(x, view);
            let out = &mut r.as_mut_slice()[start..start + 2 * obs.len()];
            if !view_residuals(&camera, &pose, obs, out) {
                return None;
            }
        }
        Some(r)
    }

    fn jacobian_unweighted(&self, x: &DVector<Real>) -> Option<DMatrix<Real>> {
        per_view_jacobian(self, x)
    }

    fn robust_row_scales(&self, r: &DVector<Real>) -> DVector<Real> {
        let mut scales = DVector::from_element(r.len(), 1.0);
        if self.robust.is_none() {
            return scales;
        }
        for i in 0..r.len() / 2 {
            let r2 = r[2 * i].powi(2) + r[2 * i + 1].powi(2);
            let (_, w) = self.robust.rho_and_weight(r2);
            let s = w.sqrt();
            scales[2 * i] = s;
            scales[2 * i + 1] = s;
        }
        scales
    }
}

/// Pixel reprojection statistics of a camera + poses over observations.
#[derive(Debug, Clone, PartialEq)]
pub struct ReprojectionStats {
    /// RMS of the per-point Euclidean error over all points.
    pub rms: Real,
    /// Mean per-point Euclidean error for each view.
    pub per_view_mean: Vec<Real>,
}

/// `None` if a point projects behind the camera or counts disagree.
pub fn reprojection_stats(
    camera: &PinholeCamera<Real>,
    poses: &[Iso3],
    views: &[PatternObservation],
) -> Option<ReprojectionStats> {
    if poses.len() != views.len() {
        return None;
    }
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    let mut per_view_mean = Vec::with_capacity(views.len());
    for (pose, obs) in poses.iter().zip(views) {
        let mut r = vec![0.0; 2 * obs.len()];
        if !view_residuals(camera, pose, obs, &mut r) {
            return None;
        }
        let mut view_sum = 0.0;
        for pair in r.chunks_exact(2) {
            let e2 = pair[0] * pair[0] + pair[1] * pair[1];
            sum_sq += e2;
            view_sum += e2.sqrt();
        }
        count += obs.len();
        per_view_mean.push(if obs.is_empty() {
            0.0
        } else {
            view_sum / obs.len() as Real
        });
    }
    let rms = if count == 0 {
        0.0
    } else {
        (sum_sq / count as Real).sqrt()
    };
    Some(ReprojectionStats { rms, per_view_mean })
}

/// Outcome of [`refine_planar_intrinsics`].
#[derive(Debug, Clone)]
pub struct PlanarRefinement {
    pub camera: PinholeCamera<Real>,
    pub poses: Vec<Iso3>,
    pub report: SolveReport,
}

/// Refine `initial` camera and poses against `views`.
///
/// Masked entries keep their initial values. Convergence is reported in
/// `report.converged`; the caller decides what a non-converged run means.
pub fn refine_planar_intrinsics<B: NllsSolverBackend>(
    backend: &B,
    views: &[PatternObservation],
    initial: &PinholeCamera<Real>,
    initial_poses: &[Iso3],
    mask: IntrinsicsMask,
    robust: RobustKernel,
    opts: &SolveOptions,
) -> Result<PlanarRefinement, PlanarIntrinsicsError> {
    if initial_poses.len() != views.len() {
        return Err(PlanarIntrinsicsError::PoseCountMismatch {
            poses: initial_poses.len(),
            views: views.len(),
        });
    }
    let problem = PlanarIntrinsicsProblem::new(views, initial, mask, robust)?;
    let x0 = problem.pack_params(initial, initial_poses);
    debug!(
        "refining {} views, {} parameters, {} residuals",
        views.len(),
        problem.num_params(),
        problem.num_residuals()
    );

    let (x, report) = backend.solve(&problem, x0, opts);
    let (mut camera, poses) = problem.decode_params(&x);
    camera.dist.iters = initial.dist.iters;
    Ok(PlanarRefinement {
        camera,
        poses,
        report,
    })
}
