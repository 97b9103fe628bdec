use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::debug;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use rigcal_core::Real;

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
        let r = self.problem.residuals(&self.params);
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        let j = self.problem.jacobian(&self.params);
        j.iter().all(|v| v.is_finite()).then_some(j)
    }
}

/// Levenberg-Marquardt (MINPACK) backend.
#[derive(Debug, Default, Clone, Copy)]
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
        if opts.verbose {
            debug!(
                "lm: {:?} after {} evaluations, cost {:.6e}",
                report.termination, report.number_of_evaluations, report.objective_function
            );
        }

        (
            wrapper.params,
            SolveReport {
                evaluations: report.number_of_evaluations,
                final_cost: report.objective_function,
                converged: report.termination.was_successful(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fit `y = a * exp(b * x)`.
    struct ExpFit {
        xs: Vec<Real>,
        ys: Vec<Real>,
    }

    impl NllsProblem for ExpFit {
        fn num_params(&self) -> usize {
            2
        }

        fn num_residuals(&self) -> usize {
            self.xs.len()
        }

        fn residuals(&self, p: &DVector<Real>) -> DVector<Real> {
            DVector::from_iterator(
                self.xs.len(),
                self.xs
                    .iter()
                    .zip(&self.ys)
                    .map(|(x, y)| p[0] * (p[1] * x).exp() - y),
            )
        }
    }

    #[test]
    fn lm_backend_fits_exponential_with_numeric_jacobian() {
        let xs: Vec<Real> = (0..20).map(|i| i as Real * 0.1).collect();
        let ys = xs.iter().map(|x| 2.5 * (-1.3 * x).exp()).collect();
        let problem = ExpFit { xs, ys };

        let (p, report) = LmBackend.solve(
            &problem,
            DVector::from_vec(vec![1.0, 0.0]),
            &SolveOptions::default(),
        );
        assert!((p[0] - 2.5).abs() < 1e-6, "a = {}", p[0]);
        assert!((p[1] + 1.3).abs() < 1e-6, "b = {}", p[1]);
        assert!(report.final_cost < 1e-12);
        assert!(report.converged, "{report:?}");
        assert!(report.evaluations > 0);
    }
}
