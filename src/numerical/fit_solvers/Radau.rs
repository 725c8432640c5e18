//! Radau IIA, 3 stages, order 5. The collocation system is solved with simplified
//! Newton iterations on the full `3n x 3n` matrix `I - h (A ⊗ J)`; the error is
//! estimated with the embedded formula of Hairer & Wanner ("Solving ODEs II",
//! IV.8) and the step size follows their predictive controller.
use crate::numerical::ODE_problem::VectorField;
use crate::numerical::fit_solvers::common::{
    JacobianSource, MAX_FACTOR, MIN_FACTOR, SolverStats, StepSolver, min_step, newton_tol, norm,
    scale, select_initial_step,
};
use log::debug;
use nalgebra::{DMatrix, DVector, Dyn, LU};

const NEWTON_MAXITER: usize = 6;
const STAGES: usize = 3;

/// Butcher tableau of the 3-stage Radau IIA method
#[derive(Debug, Clone)]
pub struct RadauCoefficients {
    pub c: [f64; STAGES],
    pub a: DMatrix<f64>,
    /// error estimator weights
    pub e: [f64; STAGES],
    /// real eigenvalue of `A^{-1}`
    pub mu_real: f64,
}

impl RadauCoefficients {
    pub fn order5() -> Self {
        let s6 = 6_f64.sqrt();
        let c = [(4.0 - s6) / 10.0, (4.0 + s6) / 10.0, 1.0];
        let a = DMatrix::from_row_slice(
            3,
            3,
            &[
                (88.0 - 7.0 * s6) / 360.0,
                (296.0 - 169.0 * s6) / 1800.0,
                (-2.0 + 3.0 * s6) / 225.0,
                (296.0 + 169.0 * s6) / 1800.0,
                (88.0 + 7.0 * s6) / 360.0,
                (-2.0 - 3.0 * s6) / 225.0,
                (16.0 - s6) / 36.0,
                (16.0 + s6) / 36.0,
                1.0 / 9.0,
            ],
        );
        let e = [(-13.0 - 7.0 * s6) / 3.0, (-13.0 + 7.0 * s6) / 3.0, -1.0 / 3.0];
        let mu_real = 3.0 + 3_f64.powf(2.0 / 3.0) - 3_f64.powf(1.0 / 3.0);
        RadauCoefficients { c, a, e, mu_real }
    }
}

struct Factorizations {
    h: f64,
    full: LU<f64, Dyn, Dyn>,
    real: LU<f64, Dyn, Dyn>,
}

fn predict_factor(h_abs: f64, h_abs_old: Option<f64>, error_norm: f64, error_norm_old: Option<f64>) -> f64 {
    let multiplier = match (h_abs_old, error_norm_old) {
        (Some(h_old), Some(e_old)) if error_norm != 0.0 => h_abs / h_old * (e_old / error_norm).powf(0.25),
        _ => 1.0,
    };
    multiplier.min(1.0) * error_norm.powf(-0.25)
}

pub struct Radau {
    f: VectorField,
    jac: JacobianSource,
    pub t: f64,
    pub y: DVector<f64>,
    f_cur: DVector<f64>,
    rtol: f64,
    atol: f64,
    h_abs: f64,
    h_abs_old: Option<f64>,
    error_norm_old: Option<f64>,
    J: DMatrix<f64>,
    jac_current: bool,
    lu: Option<Factorizations>,
    newton_tol: f64,
    coefficients: RadauCoefficients,
    stats: SolverStats,
}

impl Radau {
    /// `t_final` only sizes the first step.
    pub fn new(
        f: VectorField,
        jac: JacobianSource,
        t0: f64,
        y0: DVector<f64>,
        t_final: f64,
        rtol: f64,
        atol: f64,
    ) -> Self {
        let n = y0.len();
        let f0 = f(t0, &y0);
        let h_abs = select_initial_step(&f, t0, &y0, t_final, &f0, 3.0, rtol, atol);
        let J = jac.evaluate(&f, t0, &y0);
        let stats = SolverStats {
            nfev: 2 + jac.cost(n),
            njev: 1,
            ..SolverStats::default()
        };
        Radau {
            f,
            jac,
            t: t0,
            y: y0,
            f_cur: f0,
            rtol,
            atol,
            h_abs,
            h_abs_old: None,
            error_norm_old: None,
            J,
            jac_current: true,
            lu: None,
            newton_tol: newton_tol(rtol),
            coefficients: RadauCoefficients::order5(),
            stats,
        }
    }

    fn factorize(&mut self, h: f64) {
        let n = self.y.len();
        let a = &self.coefficients.a;
        let mut full = DMatrix::identity(STAGES * n, STAGES * n);
        for i in 0..STAGES {
            for j in 0..STAGES {
                let block = -h * a[(i, j)] * &self.J;
                let mut view = full.view_mut((i * n, j * n), (n, n));
                view += block;
            }
        }
        let real = DMatrix::identity(n, n) * (self.coefficients.mu_real / h) - &self.J;
        self.lu = Some(Factorizations {
            h,
            full: full.lu(),
            real: real.lu(),
        });
        self.stats.nlu += 2;
    }

    /// Returns `(converged, iterations, Z)` with `Z` the stacked stage increments.
    fn solve_collocation_system(&mut self, t: f64, h: f64) -> (bool, usize, DVector<f64>) {
        let n = self.y.len();
        let scale = scale(self.atol, self.rtol, &self.y);
        let scale3 = DVector::from_fn(STAGES * n, |i, _| scale[i % n]);
        let mut z = DVector::zeros(STAGES * n);
        let mut dz_norm_old: Option<f64> = None;
        let mut n_iter = 0;
        let Some(lu) = self.lu.as_ref() else {
            return (false, 0, z);
        };
        for k in 0..NEWTON_MAXITER {
            n_iter = k + 1;
            let mut stage_f = Vec::with_capacity(STAGES);
            for i in 0..STAGES {
                let y_stage = &self.y + z.rows(i * n, n);
                stage_f.push((self.f)(t + self.coefficients.c[i] * h, &y_stage));
            }
            self.stats.nfev += STAGES;
            if stage_f.iter().any(|fi| fi.iter().any(|v| !v.is_finite())) {
                break;
            }
            // residual -G(Z) = h (A ⊗ I) F - Z
            let mut rhs = -z.clone();
            for i in 0..STAGES {
                let mut acc = DVector::zeros(n);
                for (j, fj) in stage_f.iter().enumerate() {
                    acc += self.coefficients.a[(i, j)] * fj;
                }
                let mut rows = rhs.rows_mut(i * n, n);
                rows += h * acc;
            }
            let Some(dz) = lu.full.solve(&rhs) else {
                break;
            };
            let dz_norm = norm(&dz.component_div(&scale3));
            let rate = dz_norm_old.map(|old| dz_norm / old);
            if let Some(rate) = rate {
                if rate >= 1.0
                    || rate.powi((NEWTON_MAXITER - k) as i32) / (1.0 - rate) * dz_norm > self.newton_tol
                {
                    break;
                }
            }
            z += &dz;
            if dz_norm == 0.0
                || rate.is_some_and(|rate| rate / (1.0 - rate) * dz_norm < self.newton_tol)
            {
                return (true, n_iter, z);
            }
            dz_norm_old = Some(dz_norm);
        }
        (false, n_iter, z)
    }
}

impl StepSolver for Radau {
    fn name(&self) -> &'static str {
        "Radau"
    }

    fn t(&self) -> f64 {
        self.t
    }

    fn y(&self) -> &DVector<f64> {
        &self.y
    }

    fn stats(&self) -> SolverStats {
        self.stats
    }

    fn step(&mut self, t_bound: f64) -> Result<(), String> {
        let t = self.t;
        let n = self.y.len();
        let min_step = min_step(t);
        let mut h_abs = self.h_abs.max(min_step);
        let mut rejected = false;

        let (t_new, y_new, h_abs, error_norm, n_iter, safety) = loop {
            if h_abs < min_step {
                return Err(format!("required step size is less than spacing between numbers at t = {}", t));
            }
            let t_new = (t + h_abs).min(t_bound);
            let h = t_new - t;
            h_abs = h.abs();

            if self.lu.as_ref().is_none_or(|lu| lu.h != h) {
                self.factorize(h);
            }
            let (converged, n_iter, z) = self.solve_collocation_system(t, h);
            if !converged {
                if !self.jac_current {
                    self.J = self.jac.evaluate(&self.f, t, &self.y);
                    self.stats.njev += 1;
                    self.stats.nfev += self.jac.cost(n);
                    self.jac_current = true;
                    self.lu = None;
                    continue;
                }
                debug!("Radau Newton iterations failed at t = {}, halving the step", t);
                h_abs *= 0.5;
                self.lu = None;
                rejected = true;
                self.stats.n_rejected += 1;
                continue;
            }

            let y_new = &self.y + z.rows(2 * n, n);
            let e = self.coefficients.e;
            let ze = (e[0] * z.rows(0, n) + e[1] * z.rows(n, n) + e[2] * z.rows(2 * n, n)) / h;
            let scale_err = DVector::from_fn(n, |i, _| {
                self.atol + self.y[i].abs().max(y_new[i].abs()) * self.rtol
            });
            let Some(lu) = self.lu.as_ref() else {
                return Err("LU decomposition unavailable".to_string());
            };
            let mut error = lu
                .real
                .solve(&(&self.f_cur + &ze))
                .ok_or_else(|| "singular error estimator matrix".to_string())?;
            let mut error_norm = norm(&error.component_div(&scale_err));
            let safety = 0.9 * (2 * NEWTON_MAXITER + 1) as f64 / (2 * NEWTON_MAXITER + n_iter) as f64;
            if rejected && error_norm > 1.0 {
                let f_err = (self.f)(t, &(&self.y + &error));
                self.stats.nfev += 1;
                error = lu
                    .real
                    .solve(&(f_err + &ze))
                    .ok_or_else(|| "singular error estimator matrix".to_string())?;
                error_norm = norm(&error.component_div(&scale_err));
            }
            if error_norm > 1.0 {
                let factor = predict_factor(h_abs, self.h_abs_old, error_norm, self.error_norm_old);
                h_abs *= f64::max(MIN_FACTOR, safety * factor);
                self.lu = None;
                rejected = true;
                self.stats.n_rejected += 1;
                debug!("Radau step rejected at t = {}, error norm {:.3e}", t, error_norm);
            } else {
                break (t_new, y_new, h_abs, error_norm, n_iter, safety);
            }
        };

        let recompute_jac = n_iter > 2;
        let mut factor = predict_factor(h_abs, self.h_abs_old, error_norm, self.error_norm_old);
        factor = f64::min(MAX_FACTOR, safety * factor);
        if !recompute_jac && factor < 1.2 {
            factor = 1.0;
        } else {
            self.lu = None;
        }

        self.f_cur = (self.f)(t_new, &y_new);
        self.stats.nfev += 1;
        if recompute_jac {
            self.J = self.jac.evaluate(&self.f, t_new, &y_new);
            self.stats.njev += 1;
            self.stats.nfev += self.jac.cost(n);
            self.jac_current = true;
        } else {
            self.jac_current = false;
        }
        self.stats.n_steps += 1;
        self.t = t_new;
        self.y = y_new;
        self.h_abs_old = Some(h_abs);
        self.error_norm_old = Some(error_norm);
        self.h_abs = h_abs * factor;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerical::fit_solvers::common::integrate_to_points;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    #[test]
    fn test_tableau_row_sums_equal_nodes() {
        let coeffs = RadauCoefficients::order5();
        for i in 0..3 {
            let row_sum: f64 = coeffs.a.row(i).iter().sum();
            assert_relative_eq!(row_sum, coeffs.c[i], epsilon = 1e-14);
        }
    }

    #[test]
    fn test_van_der_pol_mildly_stiff() {
        // compare against a tightly resolved RK45 run
        let mu = 5.0;
        let f: VectorField = Arc::new(move |_t: f64, y: &DVector<f64>| {
            DVector::from_vec(vec![y[1], mu * (1.0 - y[0] * y[0]) * y[1] - y[0]])
        });
        let y0 = DVector::from_vec(vec![2.0, 0.0]);
        let mut radau = Radau::new(
            f.clone(),
            JacobianSource::FiniteDifference,
            0.0,
            y0.clone(),
            1.0,
            1e-9,
            1e-11,
        );
        let mut reference =
            crate::numerical::fit_solvers::DormandPrince::DormandPrince::new(f, 0.0, y0, 1.0, 1e-12, 1e-14);
        let ours = integrate_to_points(&mut radau, &[0.5, 1.0], 100_000).unwrap();
        let theirs = integrate_to_points(&mut reference, &[0.5, 1.0], 100_000).unwrap();
        for (a, b) in ours.iter().zip(theirs.iter()) {
            assert_relative_eq!(a[0], b[0], epsilon = 1e-6);
            assert_relative_eq!(a[1], b[1], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_stiff_decay_with_analytic_jacobian() {
        let f: VectorField = Arc::new(|_t: f64, y: &DVector<f64>| -1000.0 * y);
        let jac = JacobianSource::Analytic(Arc::new(|_t: f64, _y: &DVector<f64>| {
            DMatrix::from_element(1, 1, -1000.0)
        }));
        let mut solver = Radau::new(f, jac, 0.0, DVector::from_vec(vec![1.0]), 1.0, 1e-6, 1e-10);
        let states = integrate_to_points(&mut solver, &[0.01, 1.0], 10_000).unwrap();
        assert_relative_eq!(states[0][0], (-10.0_f64).exp(), epsilon = 1e-6);
        assert!(states[1][0].abs() < 1e-8);
        // implicit method takes few steps on a stiff problem
        assert!(solver.stats().n_steps < 500);
    }
}
