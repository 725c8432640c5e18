use crate::numerical::ODE_problem::{JacobianField, VectorField};
use crate::numerical::init_routines::init_error::InitError;
use log::debug;
use nalgebra::{DMatrix, DVector};

pub const EPS: f64 = f64::EPSILON;
/// Minimum allowed decrease in a step size
pub const MIN_FACTOR: f64 = 0.2;
/// Maximum allowed increase in a step size
pub const MAX_FACTOR: f64 = 10.0;

/// One-step integrator that can be driven towards a moving bound.
pub trait StepSolver {
    fn name(&self) -> &'static str;
    fn t(&self) -> f64;
    fn y(&self) -> &DVector<f64>;
    /// Advance by one accepted step, never past `t_bound`.
    fn step(&mut self, t_bound: f64) -> Result<(), String>;
    fn stats(&self) -> SolverStats;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolverStats {
    pub n_steps: usize,
    pub n_rejected: usize,
    pub nfev: usize,
    pub njev: usize,
    pub nlu: usize,
}

/// Root-mean-square norm.
pub fn norm(vector: &DVector<f64>) -> f64 {
    if vector.is_empty() {
        return 0.0;
    }
    vector.norm() / (vector.len() as f64).sqrt()
}

pub fn newton_tol(rtol: f64) -> f64 {
    f64::max(10.0 * EPS / rtol, f64::min(0.03, rtol.powf(0.5)))
}

pub fn scale(atol: f64, rtol: f64, y: &DVector<f64>) -> DVector<f64> {
    y.map(|y_i| atol + y_i.abs() * rtol)
}

/// Smallest meaningful step at `t`.
pub fn min_step(t: f64) -> f64 {
    10.0 * (next_up(t.abs()) - t.abs())
}

fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    f64::from_bits(x.to_bits() + 1)
}

/// Empirical initial step for a method of the given order (Hairer, Norsett &
/// Wanner, "Solving ODEs I", II.4).
pub fn select_initial_step(
    fun: &VectorField,
    t0: f64,
    y0: &DVector<f64>,
    t_bound: f64,
    f0: &DVector<f64>,
    order: f64,
    rtol: f64,
    atol: f64,
) -> f64 {
    if y0.is_empty() {
        return f64::INFINITY;
    }
    let interval_length = (t_bound - t0).abs();
    if interval_length == 0.0 {
        return 0.0;
    }
    let scale = scale(atol, rtol, y0);
    let d0 = norm(&y0.component_div(&scale));
    let d1 = norm(&f0.component_div(&scale));
    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    };
    let h0 = h0.min(interval_length);
    let direction = (t_bound - t0).signum();
    let y1 = y0 + h0 * direction * f0;
    let f1 = fun(t0 + h0 * direction, &y1);
    let d2 = norm(&(f1 - f0).component_div(&scale)) / h0;
    let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
        f64::max(1e-6, h0 * 1e-3)
    } else {
        (0.01 / d1.max(d2)).powf(1.0 / (order + 1.0))
    };
    (100.0 * h0).min(h1).min(interval_length)
}

/// Forward-difference Jacobian `∂f/∂y`.
pub fn num_jac(fun: &VectorField, t: f64, y: &DVector<f64>, f0: &DVector<f64>) -> DMatrix<f64> {
    let n = y.len();
    let mut jac = DMatrix::zeros(f0.len(), n);
    let mut y_pert = y.clone();
    for j in 0..n {
        let h = EPS.sqrt() * y[j].abs().max(1.0);
        y_pert[j] = y[j] + h;
        // recompute the step actually taken to cancel rounding in y + h
        let h = y_pert[j] - y[j];
        let df = (fun(t, &y_pert) - f0) / h;
        jac.set_column(j, &df);
        y_pert[j] = y[j];
    }
    jac
}

/// Analytic Jacobian when available, forward differences otherwise.
pub enum JacobianSource {
    Analytic(JacobianField),
    FiniteDifference,
}

impl JacobianSource {
    pub fn evaluate(&self, fun: &VectorField, t: f64, y: &DVector<f64>) -> DMatrix<f64> {
        match self {
            JacobianSource::Analytic(jac) => jac(t, y),
            JacobianSource::FiniteDifference => num_jac(fun, t, y, &fun(t, y)),
        }
    }

    /// Number of extra right-hand side evaluations per Jacobian.
    pub fn cost(&self, n: usize) -> usize {
        match self {
            JacobianSource::Analytic(_) => 0,
            JacobianSource::FiniteDifference => n + 1,
        }
    }
}

/// Integrates through increasing `points` (all `>= solver.t()`) and returns the
/// state at each of them. Steps are clipped so the solver lands exactly on every
/// point.
pub fn integrate_to_points(
    solver: &mut dyn StepSolver,
    points: &[f64],
    max_steps: usize,
) -> Result<Vec<DVector<f64>>, InitError> {
    let mut states = Vec::with_capacity(points.len());
    let mut taken = 0usize;
    for &t_target in points {
        if t_target < solver.t() {
            return Err(InitError::InvalidConfiguration(format!(
                "sample point {} lies behind the solver time {}",
                t_target,
                solver.t()
            )));
        }
        while solver.t() < t_target {
            if taken >= max_steps {
                return Err(InitError::IntegrationFailure(format!(
                    "{} exceeded {} steps before reaching t = {}",
                    solver.name(),
                    max_steps,
                    t_target
                )));
            }
            solver
                .step(t_target)
                .map_err(|msg| InitError::IntegrationFailure(format!("{}: {}", solver.name(), msg)))?;
            taken += 1;
        }
        let y = solver.y().clone();
        if y.iter().any(|v| !v.is_finite()) {
            return Err(InitError::IntegrationFailure(format!(
                "{} produced a non-finite state at t = {}",
                solver.name(),
                t_target
            )));
        }
        states.push(y);
    }
    debug!("{} finished: {:?}", solver.name(), solver.stats());
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    #[test]
    fn test_norm_and_newton_tol() {
        assert_relative_eq!(norm(&DVector::from_vec(vec![3.0, 4.0])), 5.0 / 2.0_f64.sqrt());
        assert_eq!(norm(&DVector::zeros(0)), 0.0);
        assert_relative_eq!(newton_tol(1e-3), 0.03);
        assert_relative_eq!(newton_tol(1e-8), 1e-4);
    }

    #[test]
    fn test_num_jac_matches_analytic() {
        let fun: VectorField = Arc::new(|t: f64, y: &DVector<f64>| {
            DVector::from_vec(vec![y[0] * y[1] + t, y[0].sin()])
        });
        let y = DVector::from_vec(vec![0.7, -1.3]);
        let jac = num_jac(&fun, 0.5, &y, &fun(0.5, &y));
        assert_relative_eq!(jac[(0, 0)], -1.3, epsilon = 1e-6);
        assert_relative_eq!(jac[(0, 1)], 0.7, epsilon = 1e-6);
        assert_relative_eq!(jac[(1, 0)], 0.7_f64.cos(), epsilon = 1e-6);
        assert_relative_eq!(jac[(1, 1)], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_initial_step_is_positive_and_bounded() {
        let fun: VectorField = Arc::new(|_t: f64, y: &DVector<f64>| -y.clone());
        let y0 = DVector::from_vec(vec![1.0]);
        let f0 = fun(0.0, &y0);
        let h = select_initial_step(&fun, 0.0, &y0, 0.1, &f0, 5.0, 1e-6, 1e-8);
        assert!(h > 0.0 && h <= 0.1);
        assert!(min_step(1.0) > 0.0 && min_step(1.0) < 1e-14);
    }
}
