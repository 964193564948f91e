use lens_core::Real;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use log::debug;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};

use crate::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};

struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<Real>,
}

impl<P: NllsProblem> LeastSquaresProblem<Real, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<Real, Dyn>;
    type JacobianStorage = Owned<Real, Dyn, Dyn>;
    type ParameterStorage = Owned<Real, Dyn>;

    fn set_params(&mut self, x: &DVector<Real>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<Real> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<Real>> {
        self.problem.residuals(&self.params)
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        self.problem.jacobian(&self.params)
    }
}

/// Levenberg-Marquardt backend (MINPACK port from `levenberg-marquardt`).
#[derive(Debug, Default, Clone)]
pub struct LmBackend;

impl NllsSolverBackend for LmBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport) {
        let lm = LevenbergMarquardt::new()
            .with_ftol(opts.ftol)
            .with_xtol(opts.xtol)
            .with_gtol(opts.gtol)
            .with_patience(opts.max_iters.max(1));

        let wrapper = LmWrapper {
            problem,
            params: x0,
        };
        let (wrapper, report) = lm.minimize(wrapper);
        // Hitting machine precision at a minimum is a stationary point, not a failure.
        let converged = report.termination.was_successful()
            || matches!(report.termination, TerminationReason::NoImprovementPossible(_));
        debug!(
            "lm: {:?} after {} evaluations, cost {:.6e}",
            report.termination, report.number_of_evaluations, report.objective_function
        );

        (
            wrapper.params(),
            SolveReport {
                iterations: report.number_of_evaluations,
                final_cost: report.objective_function,
                converged,
                termination: format!("{:?}", report.termination),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// r = [x0 - 3, 10 * (x1 - x0²)]
    struct Rosenbrockish;

    impl NllsProblem for Rosenbrockish {
        fn num_params(&self) -> usize {
            2
        }

        fn num_residuals(&self) -> usize {
            2
        }

        fn residuals_unweighted(&self, x: &DVector<Real>) -> Option<DVector<Real>> {
            Some(DVector::from_vec(vec![x[0] - 3.0, 10.0 * (x[1] - x[0] * x[0])]))
        }

        fn jacobian_unweighted(&self, x: &DVector<Real>) -> Option<DMatrix<Real>> {
            Some(DMatrix::from_row_slice(2, 2, &[1.0, 0.0, -20.0 * x[0], 10.0]))
        }
    }

    struct NeverEvaluable;

    impl NllsProblem for NeverEvaluable {
        fn num_params(&self) -> usize {
            1
        }

        fn num_residuals(&self) -> usize {
            1
        }

        fn residuals_unweighted(&self, _x: &DVector<Real>) -> Option<DVector<Real>> {
            None
        }

        fn jacobian_unweighted(&self, _x: &DVector<Real>) -> Option<DMatrix<Real>> {
            None
        }
    }

    #[test]
    fn lm_backend_solves_small_problem() {
        let (x, report) = LmBackend.solve(
            &Rosenbrockish,
            DVector::from_vec(vec![-1.0, 2.0]),
            &SolveOptions::default(),
        );
        assert!((x[0] - 3.0).abs() < 1e-6, "x0={}", x[0]);
        assert!((x[1] - 9.0).abs() < 1e-5, "x1={}", x[1]);
        assert!(report.converged, "{report:?}");
        assert!(report.final_cost < 1e-12);
        assert!(report.iterations > 0);
    }

    #[test]
    fn unevaluable_problem_does_not_converge() {
        let (_, report) = LmBackend.solve(
            &NeverEvaluable,
            DVector::from_element(1, 0.0),
            &SolveOptions::default(),
        );
        assert!(!report.converged);
    }
}
