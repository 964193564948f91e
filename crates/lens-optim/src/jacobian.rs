//! Block-sparse finite-difference Jacobian for the planar problem.
//!
//! A view's residuals depend only on the free intrinsics and that view's
//! pose, so each view is differentiated in isolation over `nf + 6` local
//! parameters and the block is scattered into the global matrix.

use lens_core::{PatternObservation, Real};
use nalgebra::{DMatrix, DVector};

use crate::planar_intrinsics::{pose_from_slice, view_residuals, PlanarIntrinsicsProblem, POSE_DIM};
use crate::NllsProblem;

/// Relative central-difference step.
const REL_STEP: Real = 1e-6;

fn step_for(value: Real) -> Real {
    REL_STEP * value.abs().max(1.0)
}

pub(crate) fn per_view_jacobian(
    problem: &PlanarIntrinsicsProblem<'_>,
    x: &DVector<Real>,
) -> Option<DMatrix<Real>> {
    let layout = problem.layout();
    let nf = layout.free_intrinsics().len();
    let mut jac = DMatrix::zeros(problem.num_residuals(), problem.num_params());

    for (view, (obs, row0)) in problem
        .views()
        .iter()
        .zip(problem.row_offsets())
        .enumerate()
    {
        let pose_col = layout.pose_offset(view);
        // Local parameter vector: free intrinsics then this view's pose.
        let mut local: Vec<Real> = x.as_slice()[..nf].to_vec();
        local.extend_from_slice(&x.as_slice()[pose_col..pose_col + POSE_DIM]);

        let block = view_block(problem, x, obs, &mut local)?;
        for (lc, column) in block.column_iter().enumerate() {
            let gc = if lc < nf { lc } else { pose_col + lc - nf };
            jac.view_mut((row0, gc), (column.len(), 1)).copy_from(&column);
        }
    }
    Some(jac)
}

fn view_block(
    problem: &PlanarIntrinsicsProblem<'_>,
    x: &DVector<Real>,
    obs: &PatternObservation,
    local: &mut [Real],
) -> Option<DMatrix<Real>> {
    let nf = problem.layout().free_intrinsics().len();
    let rows = 2 * obs.len();
    let mut block = DMatrix::zeros(rows, local.len());
    let mut r_plus = vec![0.0; rows];
    let mut r_minus = vec![0.0; rows];
    let mut scratch = x.clone();

    let mut eval = |local: &[Real], out: &mut [Real]| -> bool {
        scratch.as_mut_slice()[..nf].copy_from_slice(&local[..nf]);
        let camera = problem.decode_camera(&scratch);
        let pose = pose_from_slice(&local[nf..]);
        view_residuals(&camera, &pose, obs, out)
    };

    for j in 0..local.len() {
        let orig = local[j];
        let h = step_for(orig);

        local[j] = orig + h;
        let ok_plus = eval(local, &mut r_plus);
        local[j] = orig - h;
        let ok_minus = eval(local, &mut r_minus);
        local[j] = orig;
        if !(ok_plus && ok_minus) {
            return None;
        }

        let inv = 1.0 / (2.0 * h);
        for (i, (p, m)) in r_plus.iter().zip(&r_minus).enumerate() {
            block[(i, j)] = (p - m) * inv;
        }
    }
    Some(block)
}
