//! Explicit Runge-Kutta 5(4) pair of Dormand and Prince with local extrapolation.
use crate::numerical::ODE_problem::VectorField;
use crate::numerical::fit_solvers::common::{
    MAX_FACTOR, MIN_FACTOR, SolverStats, StepSolver, min_step, norm, select_initial_step,
};
use log::debug;
use nalgebra::DVector;

const SAFETY: f64 = 0.9;
const ERROR_EXPONENT: f64 = -1.0 / 5.0;
const N_STAGES: usize = 6;

const C: [f64; N_STAGES] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0];
const A: [[f64; 5]; N_STAGES] = [
    [0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0],
    [
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
        0.0,
    ],
    [
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
    ],
];
const B: [f64; N_STAGES] = [
    35.0 / 384.0,
    0.0,
    500.0 / 1113.0,
    125.0 / 192.0,
    -2187.0 / 6784.0,
    11.0 / 84.0,
];
/// Difference between the 5th and embedded 4th order weights, last entry for the
/// FSAL stage
const E: [f64; N_STAGES + 1] = [
    -71.0 / 57600.0,
    0.0,
    71.0 / 16695.0,
    -71.0 / 1920.0,
    17253.0 / 339200.0,
    -22.0 / 525.0,
    1.0 / 40.0,
];

pub struct DormandPrince {
    f: VectorField,
    pub t: f64,
    pub y: DVector<f64>,
    f_cur: DVector<f64>,
    h_abs: f64,
    rtol: f64,
    atol: f64,
    stats: SolverStats,
}

impl DormandPrince {
    /// `t_final` only sizes the first step.
    pub fn new(f: VectorField, t0: f64, y0: DVector<f64>, t_final: f64, rtol: f64, atol: f64) -> Self {
        let f0 = f(t0, &y0);
        let h_abs = select_initial_step(&f, t0, &y0, t_final, &f0, 4.0, rtol, atol);
        DormandPrince {
            f,
            t: t0,
            y: y0,
            f_cur: f0,
            h_abs,
            rtol,
            atol,
            stats: SolverStats {
                nfev: 2,
                ..SolverStats::default()
            },
        }
    }

    /// Returns the new state, its derivative and all stage derivatives.
    fn rk_step(&self, t: f64, h: f64) -> (DVector<f64>, DVector<f64>, Vec<DVector<f64>>) {
        let mut k: Vec<DVector<f64>> = Vec::with_capacity(N_STAGES + 1);
        k.push(self.f_cur.clone());
        for s in 1..N_STAGES {
            let mut dy = DVector::zeros(self.y.len());
            for (j, k_j) in k.iter().enumerate().take(s) {
                dy += A[s][j] * k_j;
            }
            let y_stage = &self.y + h * dy;
            k.push((self.f)(t + C[s] * h, &y_stage));
        }
        let mut y_new = self.y.clone();
        for (s, k_s) in k.iter().enumerate() {
            y_new += h * B[s] * k_s;
        }
        let f_new = (self.f)(t + h, &y_new);
        k.push(f_new.clone());
        (y_new, f_new, k)
    }
}

impl StepSolver for DormandPrince {
    fn name(&self) -> &'static str {
        "RK45"
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
        let min_step = min_step(t);
        let mut h_abs = self.h_abs.max(min_step);
        let mut step_rejected = false;
        loop {
            if h_abs < min_step {
                return Err(format!("required step size is less than spacing between numbers at t = {}", t));
            }
            let t_new = (t + h_abs).min(t_bound);
            let h = t_new - t;
            h_abs = h.abs();
            let (y_new, f_new, k) = self.rk_step(t, h);
            self.stats.nfev += N_STAGES;

            let scale = DVector::from_fn(self.y.len(), |i, _| {
                self.atol + self.y[i].abs().max(y_new[i].abs()) * self.rtol
            });
            let mut err = DVector::zeros(self.y.len());
            for (s, k_s) in k.iter().enumerate() {
                err += h * E[s] * k_s;
            }
            let error_norm = norm(&err.component_div(&scale));

            if error_norm < 1.0 {
                let mut factor = if error_norm == 0.0 {
                    MAX_FACTOR
                } else {
                    f64::min(MAX_FACTOR, SAFETY * error_norm.powf(ERROR_EXPONENT))
                };
                if step_rejected {
                    factor = factor.min(1.0);
                }
                self.t = t_new;
                self.y = y_new;
                self.f_cur = f_new;
                self.h_abs = h_abs * factor;
                self.stats.n_steps += 1;
                return Ok(());
            }
            h_abs *= f64::max(MIN_FACTOR, SAFETY * error_norm.powf(ERROR_EXPONENT));
            step_rejected = true;
            self.stats.n_rejected += 1;
            debug!("RK45 step rejected at t = {}, error norm {:.3e}", t, error_norm);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerical::fit_solvers::common::integrate_to_points;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    #[test]
    fn test_harmonic_oscillator() {
        let f: VectorField = Arc::new(|_t: f64, y: &DVector<f64>| DVector::from_vec(vec![y[1], -y[0]]));
        let y0 = DVector::from_vec(vec![1.0, 0.0]);
        let mut solver = DormandPrince::new(f, 0.0, y0, 2.0, 1e-10, 1e-12);
        let points = [0.5, 1.0, 2.0];
        let states = integrate_to_points(&mut solver, &points, 10_000).unwrap();
        for (t, y) in points.iter().zip(states.iter()) {
            assert_relative_eq!(y[0], t.cos(), epsilon = 1e-8);
            assert_relative_eq!(y[1], -t.sin(), epsilon = 1e-8);
        }
        assert_eq!(solver.t(), 2.0);
        assert!(solver.stats().n_steps > 0);
    }

    #[test]
    fn test_step_budget_is_enforced() {
        let f: VectorField = Arc::new(|_t: f64, y: &DVector<f64>| -y.clone());
        let mut solver = DormandPrince::new(f, 0.0, DVector::from_vec(vec![1.0]), 100.0, 1e-12, 1e-14);
        assert!(integrate_to_points(&mut solver, &[100.0], 3).is_err());
    }
}
