//! Variable-order (1..=5) variable-step BDF in the quasi-constant step size
//! formulation with numerical differentiation formula corrections (Shampine &
//! Reichelt, "The MATLAB ODE Suite"). The history is kept as the backward
//! difference array `D`, rescaled whenever the step size changes.
use crate::numerical::ODE_problem::VectorField;
use crate::numerical::fit_solvers::common::{
    JacobianSource, MAX_FACTOR, MIN_FACTOR, SolverStats, StepSolver, min_step, newton_tol, norm,
    scale, select_initial_step,
};
use log::{debug, warn};
use nalgebra::{DMatrix, DVector, Dyn, LU};

const MAX_ORDER: usize = 5;
const NEWTON_MAXITER: usize = 4;
const KAPPA: [f64; MAX_ORDER + 1] = [0.0, -0.1850, -1.0 / 9.0, -0.0823, -0.0415, 0.0];

struct BdfCoefficients {
    gamma: [f64; MAX_ORDER + 1],
    alpha: [f64; MAX_ORDER + 1],
    error_const: [f64; MAX_ORDER + 1],
}

impl BdfCoefficients {
    fn new() -> Self {
        let mut gamma = [0.0; MAX_ORDER + 1];
        for k in 1..=MAX_ORDER {
            gamma[k] = gamma[k - 1] + 1.0 / k as f64;
        }
        let mut alpha = [0.0; MAX_ORDER + 1];
        let mut error_const = [0.0; MAX_ORDER + 1];
        for k in 0..=MAX_ORDER {
            alpha[k] = (1.0 - KAPPA[k]) * gamma[k];
            error_const[k] = KAPPA[k] * gamma[k] + 1.0 / (k + 1) as f64;
        }
        BdfCoefficients {
            gamma,
            alpha,
            error_const,
        }
    }
}

/// Cumulative product down each column.
fn cumulative_product_along_columns(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    let (rows, cols) = matrix.shape();
    let mut result = DMatrix::zeros(rows, cols);
    for col in 0..cols {
        let mut cumprod = 1.0;
        for row in 0..rows {
            cumprod *= matrix[(row, col)];
            result[(row, col)] = cumprod;
        }
    }
    result
}

/// Transformation of the difference array for a step size change by `factor`.
fn compute_r(order: usize, factor: f64) -> DMatrix<f64> {
    let mut m = DMatrix::zeros(order + 1, order + 1);
    for i in 1..(order + 1) {
        for j in 1..(order + 1) {
            m[(i, j)] = (i as f64 - 1.0 - factor * j as f64) / i as f64;
        }
    }
    m.row_mut(0).fill(1.0);
    cumulative_product_along_columns(&m)
}

/// `D[0..=order] = (R(factor) U)^T D[0..=order]`, rows of `D` being differences
fn change_D(D: &mut DMatrix<f64>, order: usize, factor: f64) {
    let r = compute_r(order, factor);
    let u = compute_r(order, 1.0);
    let ru = r * u;
    let temp = ru.transpose() * D.rows(0, order + 1);
    D.rows_mut(0, order + 1).copy_from(&temp);
}

struct NewtonOutcome {
    converged: bool,
    n_iter: usize,
    y: DVector<f64>,
    d: DVector<f64>,
}

/// Simplified Newton iterations for `y - c f(t_new, y) - psi = 0`.
fn solve_bdf_system(
    fun: &VectorField,
    t_new: f64,
    y_predict: &DVector<f64>,
    c: f64,
    psi: &DVector<f64>,
    lu: &LU<f64, Dyn, Dyn>,
    scale: &DVector<f64>,
    tol: f64,
    nfev: &mut usize,
) -> NewtonOutcome {
    let mut d = DVector::zeros(y_predict.len());
    let mut y = y_predict.clone();
    let mut dy_norm_old: Option<f64> = None;
    let mut converged = false;
    let mut n_iter = 0;
    for k in 0..NEWTON_MAXITER {
        n_iter = k + 1;
        let f = fun(t_new, &y);
        *nfev += 1;
        if f.iter().any(|v| !v.is_finite()) {
            break;
        }
        let rhs = c * f - psi - &d;
        let Some(dy) = lu.solve(&rhs) else {
            break;
        };
        let dy_norm = norm(&dy.component_div(scale));
        let rate = dy_norm_old.map(|old| dy_norm / old);
        if let Some(rate) = rate {
            if rate >= 1.0 || rate.powi((NEWTON_MAXITER - k) as i32) / (1.0 - rate) * dy_norm > tol {
                break;
            }
        }
        y += &dy;
        d += &dy;
        if dy_norm == 0.0 || rate.is_some_and(|rate| rate / (1.0 - rate) * dy_norm < tol) {
            converged = true;
            break;
        }
        dy_norm_old = Some(dy_norm);
    }
    NewtonOutcome {
        converged,
        n_iter,
        y,
        d,
    }
}

pub struct BDF {
    f: VectorField,
    jac: JacobianSource,
    pub t: f64,
    pub y: DVector<f64>,
    rtol: f64,
    atol: f64,
    h_abs: f64,
    order: usize,
    n_equal_steps: usize,
    D: DMatrix<f64>,
    J: DMatrix<f64>,
    lu: Option<LU<f64, Dyn, Dyn>>,
    jac_current: bool,
    newton_tol: f64,
    coeffs: BdfCoefficients,
    stats: SolverStats,
}

impl BDF {
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
        let h_abs = select_initial_step(&f, t0, &y0, t_final, &f0, 1.0, rtol, atol);
        let mut D = DMatrix::zeros(MAX_ORDER + 3, n);
        D.row_mut(0).copy_from(&y0.transpose());
        D.row_mut(1).copy_from(&(h_abs * &f0).transpose());
        let J = jac.evaluate(&f, t0, &y0);
        let stats = SolverStats {
            nfev: 2 + jac.cost(n),
            njev: 1,
            ..SolverStats::default()
        };
        BDF {
            f,
            jac,
            t: t0,
            y: y0,
            rtol,
            atol,
            h_abs,
            order: 1,
            n_equal_steps: 0,
            D,
            J,
            lu: None,
            jac_current: true,
            newton_tol: newton_tol(rtol),
            coeffs: BdfCoefficients::new(),
            stats,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    fn row(&self, i: usize) -> DVector<f64> {
        self.D.row(i).transpose()
    }
}

impl StepSolver for BDF {
    fn name(&self) -> &'static str {
        "BDF"
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
        let order = self.order;
        let mut h_abs = self.h_abs;
        if h_abs < min_step {
            change_D(&mut self.D, order, min_step / h_abs);
            h_abs = min_step;
            self.n_equal_steps = 0;
        }

        let (t_new, y_new, d, error_norm, safety, scale_new) = loop {
            if h_abs < min_step {
                return Err(format!("required step size is less than spacing between numbers at t = {}", t));
            }
            let mut t_new = t + h_abs;
            if t_new > t_bound {
                t_new = t_bound;
                change_D(&mut self.D, order, (t_new - t).abs() / h_abs);
                self.n_equal_steps = 0;
                self.lu = None;
            }
            let h = t_new - t;
            h_abs = h.abs();

            let mut y_predict = DVector::zeros(n);
            for i in 0..=order {
                y_predict += self.row(i);
            }
            let scale_pred = scale(self.atol, self.rtol, &y_predict);
            let mut psi = DVector::zeros(n);
            for i in 1..=order {
                psi += self.coeffs.gamma[i] * self.row(i);
            }
            psi /= self.coeffs.alpha[order];
            let c = h / self.coeffs.alpha[order];

            let outcome = loop {
                if self.lu.is_none() {
                    let m = DMatrix::identity(n, n) - c * &self.J;
                    self.lu = Some(m.lu());
                    self.stats.nlu += 1;
                }
                let outcome = match self.lu.as_ref() {
                    Some(lu) => solve_bdf_system(
                        &self.f,
                        t_new,
                        &y_predict,
                        c,
                        &psi,
                        lu,
                        &scale_pred,
                        self.newton_tol,
                        &mut self.stats.nfev,
                    ),
                    None => return Err("LU decomposition unavailable".to_string()),
                };
                if outcome.converged || self.jac_current {
                    break outcome;
                }
                self.J = self.jac.evaluate(&self.f, t_new, &y_predict);
                self.stats.njev += 1;
                self.stats.nfev += self.jac.cost(n);
                self.lu = None;
                self.jac_current = true;
            };

            if !outcome.converged {
                debug!("BDF Newton iterations failed at t = {}, halving the step", t_new);
                let factor = 0.5;
                h_abs *= factor;
                change_D(&mut self.D, order, factor);
                self.n_equal_steps = 0;
                self.lu = None;
                self.stats.n_rejected += 1;
                continue;
            }

            let safety = 0.9 * (2 * NEWTON_MAXITER + 1) as f64
                / (2 * NEWTON_MAXITER + outcome.n_iter) as f64;
            let scale_new = scale(self.atol, self.rtol, &outcome.y);
            let error = self.coeffs.error_const[order] * &outcome.d;
            let error_norm = norm(&error.component_div(&scale_new));
            if error_norm > 1.0 {
                let factor = f64::max(MIN_FACTOR, safety * error_norm.powf(-1.0 / (order as f64 + 1.0)));
                h_abs *= factor;
                change_D(&mut self.D, order, factor);
                self.n_equal_steps = 0;
                self.stats.n_rejected += 1;
                debug!("BDF step rejected at t = {}, error norm {:.3e}", t_new, error_norm);
            } else {
                break (t_new, outcome.y, outcome.d, error_norm, safety, scale_new);
            }
        };

        self.stats.n_steps += 1;
        self.n_equal_steps += 1;
        self.t = t_new;
        self.y = y_new;
        self.h_abs = h_abs;
        self.jac_current = false;

        // update the difference array with the correction d
        let d_prev = self.row(order + 1);
        self.D.row_mut(order + 2).copy_from(&(&d - d_prev).transpose());
        self.D.row_mut(order + 1).copy_from(&d.transpose());
        for i in (0..=order).rev() {
            let updated = self.row(i) + self.row(i + 1);
            self.D.row_mut(i).copy_from(&updated.transpose());
        }

        if self.n_equal_steps < order + 1 {
            return Ok(());
        }

        let error_m_norm = if order > 1 {
            let error_m = self.coeffs.error_const[order - 1] * self.row(order);
            norm(&error_m.component_div(&scale_new))
        } else {
            f64::INFINITY
        };
        let error_p_norm = if order < MAX_ORDER {
            let error_p = self.coeffs.error_const[order + 1] * self.row(order + 2);
            norm(&error_p.component_div(&scale_new))
        } else {
            f64::INFINITY
        };
        let error_norms = [error_m_norm, error_norm, error_p_norm];
        let mut best = 0;
        let mut best_factor = f64::NEG_INFINITY;
        for (i, e) in error_norms.iter().enumerate() {
            let exponent = -1.0 / (order + i) as f64;
            let factor = if *e == 0.0 {
                f64::INFINITY
            } else {
                e.powf(exponent)
            };
            if factor > best_factor {
                best_factor = factor;
                best = i;
            }
        }
        let new_order = order + best - 1;
        if new_order != order {
            debug!("BDF order changed from {} to {} at t = {}", order, new_order, t_new);
        }
        self.order = new_order;
        let factor = f64::min(MAX_FACTOR, safety * best_factor);
        self.h_abs *= factor;
        change_D(&mut self.D, new_order, factor);
        self.n_equal_steps = 0;
        self.lu = None;
        if !self.h_abs.is_finite() {
            warn!("BDF step size became non-finite at t = {}", t_new);
            return Err("step size became non-finite".to_string());
        }
        Ok(())
    }
}
