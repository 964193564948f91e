use lens_core::Real;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Dense nonlinear least-squares problem.
///
/// Residuals and Jacobian rows are scaled by `sqrt(w_i)` from
/// [`NllsProblem::robust_row_scales`] (IRLS without differentiating the
/// weights). `None` means the residuals cannot be evaluated at `x`, e.g. a
/// point moved behind the camera.
pub trait NllsProblem {
    fn num_params(&self) -> usize;
    fn num_residuals(&self) -> usize;

    fn residuals_unweighted(&self, x: &DVector<Real>) -> Option<DVector<Real>>;
    fn jacobian_unweighted(&self, x: &DVector<Real>) -> Option<DMatrix<Real>>;

    /// Per-row IRLS scales computed from unweighted residuals.
    fn robust_row_scales(&self, r_unweighted: &DVector<Real>) -> DVector<Real> {
        DVector::from_element(r_unweighted.len(), 1.0)
    }

    fn residuals(&self, x: &DVector<Real>) -> Option<DVector<Real>> {
        let mut r = self.residuals_unweighted(x)?;
        let scales = self.robust_row_scales(&r);
        r.component_mul_assign(&scales);
        Some(r)
    }

    fn jacobian(&self, x: &DVector<Real>) -> Option<DMatrix<Real>> {
        let r_unweighted = self.residuals_unweighted(x)?;
        let scales = self.robust_row_scales(&r_unweighted);
        let mut j = self.jacobian_unweighted(x)?;
        for (mut row, scale) in j.row_iter_mut().zip(scales.iter()) {
            if *scale != 1.0 {
                row.scale_mut(*scale);
            }
        }
        Some(j)
    }
}

/// Stopping criteria shared by all backends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Iteration cap; the LM backend turns it into a MINPACK-style
    /// evaluation budget of `max_iters * (n + 1)`.
    pub max_iters: usize,
    /// Relative cost-reduction tolerance.
    pub ftol: Real,
    /// Gradient orthogonality tolerance.
    pub gtol: Real,
    /// Relative parameter-step tolerance.
    pub xtol: Real,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            ftol: 1e-10,
            gtol: 1e-10,
            xtol: 1e-10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolveReport {
    /// Residual evaluations spent.
    pub iterations: usize,
    /// `0.5 * ||r||²` at the returned parameters.
    pub final_cost: Real,
    pub converged: bool,
    /// Human-readable termination reason from the backend.
    pub termination: String,
}

pub trait NllsSolverBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport);
}
