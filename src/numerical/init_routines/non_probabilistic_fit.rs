//! # Initialization by fitting a classical solution
//!
//! A classical integrator is run over the short window `t_j = t0 + j*dt`,
//! `j = 1..=num_samples`. In the scaled time `tau = (t - t0)/dt` each coordinate is
//! modelled as a polynomial of degree `q = num_derivatives`
//!
//! ```text
//! p(tau) = a_0 + a_1 tau + ... + a_q tau^q,    y^(k)(t0) = k! a_k / dt^k
//! ```
//!
//! and fitted in the least-squares sense against the observed values
//! `p(tau_j) = y_j` and slopes `p'(tau_j) = dt f(t_j, y_j)` (plus the curvatures
//! `p''(tau_j) = dt^2 (J f + df/dt)` when a Jacobian is available). The leading
//! coefficients known in closed form at `t0` are pinned and only the remaining ones
//! are fitted.
use crate::numerical::ODE_problem::{JacobianField, ODEProblem, VectorField};
use crate::numerical::fit_solvers::BDF::BDF;
use crate::numerical::fit_solvers::DormandPrince::DormandPrince;
use crate::numerical::fit_solvers::Radau::Radau;
use crate::numerical::fit_solvers::common::{JacobianSource, StepSolver, integrate_to_points};
use crate::numerical::init_routines::init_error::InitError;
use crate::numerical::init_routines::interface::{InitializationRoutine, check_dimensions, log_result};
use crate::numerical::prior_process::PriorProcess;
use crate::numerical::random_variable::RandomVariable;
use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use strum_macros::{Display, EnumIter, EnumString};

pub const DEFAULT_RTOL: f64 = 1e-8;
pub const DEFAULT_ATOL: f64 = 1e-10;
pub const DEFAULT_DT: f64 = 1e-2;
pub const DEFAULT_MAX_STEPS: usize = 10_000;
const BDF_TOLERANCE_FACTOR: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum FitSolver {
    RK45,
    BDF,
    Radau,
}

impl FitSolver {
    pub fn is_implicit(&self) -> bool {
        !matches!(self, FitSolver::RK45)
    }

    /// Tolerances handed to the integrator. BDF runs `1e-4` tighter than requested,
    /// never below `100 * EPSILON`; its error jumps with every order change and the
    /// fit scales such jumps by up to `k!/dt^k`.
    pub fn integration_tolerances(&self, rtol: f64, atol: f64) -> (f64, f64) {
        match self {
            FitSolver::BDF => (
                (rtol * BDF_TOLERANCE_FACTOR).max(100.0 * f64::EPSILON),
                atol * BDF_TOLERANCE_FACTOR,
            ),
            FitSolver::RK45 | FitSolver::Radau => (rtol, atol),
        }
    }

    fn build(
        &self,
        f: VectorField,
        jac: Option<JacobianField>,
        t0: f64,
        y0: DVector<f64>,
        t_final: f64,
        rtol: f64,
        atol: f64,
    ) -> Box<dyn StepSolver> {
        let (rtol, atol) = self.integration_tolerances(rtol, atol);
        let source = match jac {
            Some(jac) => JacobianSource::Analytic(jac),
            None => JacobianSource::FiniteDifference,
        };
        match self {
            FitSolver::RK45 => Box::new(DormandPrince::new(f, t0, y0, t_final, rtol, atol)),
            FitSolver::BDF => Box::new(BDF::new(f, source, t0, y0, t_final, rtol, atol)),
            FitSolver::Radau => Box::new(Radau::new(f, source, t0, y0, t_final, rtol, atol)),
        }
    }
}

/// Options shared by both fit routines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSettings {
    solver: FitSolver,
    rtol: f64,
    atol: f64,
    dt: f64,
    num_samples: Option<usize>,
    max_steps: usize,
}

impl FitSettings {
    fn new(solver: FitSolver, rtol: f64, atol: f64) -> Result<Self, InitError> {
        if !rtol.is_finite() || rtol <= 0.0 || rtol >= 1.0 {
            return Err(InitError::InvalidConfiguration(format!(
                "rtol must lie in (0, 1), got {}",
                rtol
            )));
        }
        if !atol.is_finite() || atol <= 0.0 {
            return Err(InitError::InvalidConfiguration(format!(
                "atol must be positive and finite, got {}",
                atol
            )));
        }
        Ok(FitSettings {
            solver,
            rtol,
            atol,
            dt: DEFAULT_DT,
            num_samples: None,
            max_steps: DEFAULT_MAX_STEPS,
        })
    }

    fn with_dt(mut self, dt: f64) -> Result<Self, InitError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(InitError::InvalidConfiguration(format!(
                "dt must be positive and finite, got {}",
                dt
            )));
        }
        self.dt = dt;
        Ok(self)
    }

    fn with_num_samples(mut self, num_samples: usize) -> Result<Self, InitError> {
        if num_samples == 0 {
            return Err(InitError::InvalidConfiguration(
                "num_samples must be at least 1".to_string(),
            ));
        }
        self.num_samples = Some(num_samples);
        Ok(self)
    }

    fn with_max_steps(mut self, max_steps: usize) -> Result<Self, InitError> {
        if max_steps == 0 {
            return Err(InitError::InvalidConfiguration(
                "max_steps must be at least 1".to_string(),
            ));
        }
        self.max_steps = max_steps;
        Ok(self)
    }

    fn num_samples_for(&self, num_derivatives: usize) -> Result<usize, InitError> {
        match self.num_samples {
            None => Ok(num_derivatives + 2),
            Some(m) if m < num_derivatives => Err(InitError::InvalidConfiguration(format!(
                "{} samples cannot determine {} derivatives",
                m, num_derivatives
            ))),
            Some(m) => Ok(m),
        }
    }

    /// Integrates over the sample grid and fits the scaled Taylor polynomial.
    fn fit(
        &self,
        routine: &'static str,
        ivp: &ODEProblem,
        prior: &PriorProcess,
        jac: Option<JacobianField>,
    ) -> Result<RandomVariable, InitError> {
        let q = prior.num_derivatives();
        let d = prior.dimension();
        let m = self.num_samples_for(q)?;
        let t0 = ivp.t0();
        let y0 = ivp.y0().clone();
        let dt = self.dt;
        info!(
            "{}: dimension {}, {} derivatives, solver {}, {} samples with dt = {}",
            routine, d, q, self.solver, m, dt
        );

        let f0 = ivp.f(t0, &y0);
        let mut pinned = vec![y0.clone(), dt * &f0];
        if let Some(jac) = &jac {
            pinned.push(dt * dt * second_derivative(ivp, jac, t0, &y0, &f0) / 2.0);
        }
        pinned.truncate(q + 1);

        let blocks = if pinned.len() == q + 1 {
            pinned
        } else {
            let points: Vec<f64> = (1..=m).map(|j| t0 + j as f64 * dt).collect();
            let t_final = points[points.len() - 1];
            let mut solver = self.solver.build(
                ivp.vector_field(),
                jac.clone(),
                t0,
                y0.clone(),
                t_final,
                self.rtol,
                self.atol,
            );
            let states = integrate_to_points(solver.as_mut(), &points, self.max_steps)?;
            let observations = observe(ivp, jac.as_ref(), &points, &states, dt);
            let free = fit_free_coefficients(&pinned, q, &observations)?;
            pinned.into_iter().chain(free).collect()
        };

        let mut factor = 1.0;
        let derivatives: Vec<DVector<f64>> = blocks
            .iter()
            .enumerate()
            .map(|(k, a_k)| {
                if k > 0 {
                    factor *= k as f64 / dt;
                }
                a_k * factor
            })
            .collect();
        let (mean, cov) = prior.taylor_coefficients_to_state(&derivatives)?;
        RandomVariable::new(mean, cov)
    }
}

fn second_derivative(
    ivp: &ODEProblem,
    jac: &JacobianField,
    t: f64,
    y: &DVector<f64>,
    f: &DVector<f64>,
) -> DVector<f64> {
    let mut ddy = jac(t, y) * f;
    if let Some(dfdt) = ivp.df_dt(t, y) {
        ddy += dfdt;
    }
    ddy
}

/// Observation of the `order`-th scaled derivative of the polynomial at `tau`.
struct Observation {
    tau: f64,
    order: usize,
    value: DVector<f64>,
}

fn observe(
    ivp: &ODEProblem,
    jac: Option<&JacobianField>,
    points: &[f64],
    states: &[DVector<f64>],
    dt: f64,
) -> Vec<Observation> {
    let t0 = ivp.t0();
    let mut observations = Vec::with_capacity(3 * points.len());
    for (&t, y) in points.iter().zip(states.iter()) {
        let tau = (t - t0) / dt;
        let f = ivp.f(t, y);
        if let Some(jac) = jac {
            observations.push(Observation {
                tau,
                order: 2,
                value: dt * dt * second_derivative(ivp, jac, t, y, &f),
            });
        }
        observations.push(Observation {
            tau,
            order: 1,
            value: dt * f,
        });
        observations.push(Observation {
            tau,
            order: 0,
            value: y.clone(),
        });
    }
    observations
}

/// `d^order/dtau^order tau^k`
fn monomial_derivative(tau: f64, k: usize, order: usize) -> f64 {
    if order > k {
        return 0.0;
    }
    let falling: f64 = ((k - order + 1)..=k).map(|i| i as f64).product();
    falling * tau.powi((k - order) as i32)
}

/// Least-squares solve for the coefficients `a_p..a_q` given the pinned `a_0..a_{p-1}`.
/// All coordinates share the design matrix and are solved together.
fn fit_free_coefficients(
    pinned: &[DVector<f64>],
    q: usize,
    observations: &[Observation],
) -> Result<Vec<DVector<f64>>, InitError> {
    let p = pinned.len();
    let n_free = q + 1 - p;
    let d = pinned[0].len();
    let rows = observations.len();
    if rows < n_free {
        return Err(InitError::InvalidConfiguration(format!(
            "{} observations cannot determine {} coefficients",
            rows, n_free
        )));
    }
    let mut design = DMatrix::zeros(rows, n_free);
    let mut rhs = DMatrix::zeros(rows, d);
    for (r, obs) in observations.iter().enumerate() {
        for c in 0..n_free {
            design[(r, c)] = monomial_derivative(obs.tau, p + c, obs.order);
        }
        let mut residual = obs.value.clone();
        for (k, a_k) in pinned.iter().enumerate() {
            residual -= monomial_derivative(obs.tau, k, obs.order) * a_k;
        }
        rhs.row_mut(r).copy_from(&residual.transpose());
    }
    // equilibrate columns, powers of tau span several decades
    let col_scale: Vec<f64> = (0..n_free)
        .map(|c| design.column(c).amax().max(f64::MIN_POSITIVE))
        .collect();
    for (c, s) in col_scale.iter().enumerate() {
        design.column_mut(c).unscale_mut(*s);
    }
    let svd = design.svd(true, true);
    debug!(
        "fit design {}x{}, singular values {:?}",
        rows,
        n_free,
        svd.singular_values.as_slice()
    );
    let solution = svd
        .solve(&rhs, 1e-14)
        .map_err(|e| InitError::IntegrationFailure(format!("least-squares fit failed: {}", e)))?;
    Ok((0..n_free)
        .map(|c| solution.row(c).transpose() / col_scale[c])
        .collect())
}

/// Fit against values and slopes of an integrator's solution. Implicit solvers
/// use a forward-difference Jacobian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonProbabilisticFit {
    settings: FitSettings,
}

impl NonProbabilisticFit {
    pub fn new(solver: FitSolver, rtol: f64, atol: f64) -> Result<Self, InitError> {
        Ok(NonProbabilisticFit {
            settings: FitSettings::new(solver, rtol, atol)?,
        })
    }

    pub fn with_dt(self, dt: f64) -> Result<Self, InitError> {
        Ok(NonProbabilisticFit {
            settings: self.settings.with_dt(dt)?,
        })
    }

    pub fn with_num_samples(self, num_samples: usize) -> Result<Self, InitError> {
        Ok(NonProbabilisticFit {
            settings: self.settings.with_num_samples(num_samples)?,
        })
    }

    pub fn with_max_steps(self, max_steps: usize) -> Result<Self, InitError> {
        Ok(NonProbabilisticFit {
            settings: self.settings.with_max_steps(max_steps)?,
        })
    }

    pub fn solver(&self) -> FitSolver {
        self.settings.solver
    }

    pub fn settings(&self) -> &FitSettings {
        &self.settings
    }
}

impl Default for NonProbabilisticFit {
    fn default() -> Self {
        NonProbabilisticFit {
            settings: FitSettings {
                solver: FitSolver::RK45,
                rtol: DEFAULT_RTOL,
                atol: DEFAULT_ATOL,
                dt: DEFAULT_DT,
                num_samples: None,
                max_steps: DEFAULT_MAX_STEPS,
            },
        }
    }
}

impl InitializationRoutine for NonProbabilisticFit {
    fn initialize(&self, ivp: &ODEProblem, prior: &PriorProcess) -> Result<RandomVariable, InitError> {
        check_dimensions(ivp, prior)?;
        let rv = self.settings.fit(self.name(), ivp, prior, None)?;
        log_result(self.name(), prior, &rv);
        Ok(rv)
    }

    fn name(&self) -> &'static str {
        "NonProbabilisticFit"
    }

    fn is_exact(&self) -> bool {
        false
    }

    fn requires_autodiff(&self) -> bool {
        false
    }
}

/// Same fit with the curvature observations `J f + df/dt`; implicit solvers use the
/// problem's Jacobian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonProbabilisticFitWithJacobian {
    settings: FitSettings,
}

impl NonProbabilisticFitWithJacobian {
    pub fn new(solver: FitSolver, rtol: f64, atol: f64) -> Result<Self, InitError> {
        Ok(NonProbabilisticFitWithJacobian {
            settings: FitSettings::new(solver, rtol, atol)?,
        })
    }

    pub fn with_dt(self, dt: f64) -> Result<Self, InitError> {
        Ok(NonProbabilisticFitWithJacobian {
            settings: self.settings.with_dt(dt)?,
        })
    }

    pub fn with_num_samples(self, num_samples: usize) -> Result<Self, InitError> {
        Ok(NonProbabilisticFitWithJacobian {
            settings: self.settings.with_num_samples(num_samples)?,
        })
    }

    pub fn with_max_steps(self, max_steps: usize) -> Result<Self, InitError> {
        Ok(NonProbabilisticFitWithJacobian {
            settings: self.settings.with_max_steps(max_steps)?,
        })
    }

    pub fn solver(&self) -> FitSolver {
        self.settings.solver
    }

    pub fn settings(&self) -> &FitSettings {
        &self.settings
    }
}

impl Default for NonProbabilisticFitWithJacobian {
    fn default() -> Self {
        NonProbabilisticFitWithJacobian {
            settings: FitSettings {
                solver: FitSolver::Radau,
                ..NonProbabilisticFit::default().settings
            },
        }
    }
}

impl InitializationRoutine for NonProbabilisticFitWithJacobian {
    fn initialize(&self, ivp: &ODEProblem, prior: &PriorProcess) -> Result<RandomVariable, InitError> {
        check_dimensions(ivp, prior)?;
        let jac = ivp.jacobian_field().ok_or_else(|| {
            InitError::MissingJacobian(format!("{} needs the Jacobian of the vector field", self.name()))
        })?;
        let rv = self.settings.fit(self.name(), ivp, prior, Some(jac))?;
        log_result(self.name(), prior, &rv);
        Ok(rv)
    }

    fn name(&self) -> &'static str {
        "NonProbabilisticFitWithJacobian"
    }

    fn is_exact(&self) -> bool {
        false
    }

    fn requires_autodiff(&self) -> bool {
        false
    }
}

impl FitSettings {
    pub fn solver(&self) -> FitSolver {
        self.solver
    }

    pub fn rtol(&self) -> f64 {
        self.rtol
    }

    pub fn atol(&self) -> f64 {
        self.atol
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn num_samples(&self) -> Option<usize> {
        self.num_samples
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    fn decay() -> ODEProblem {
        ODEProblem::new(|_t, y| -y.clone(), 0.0, DVector::from_vec(vec![1.0, 2.0]))
            .with_jacobian(|_t, _y| -DMatrix::identity(2, 2))
    }

    /// `y' = A y` with eigenvalues `-1` and `-1000`; `y0` lies on the slow eigenvector,
    /// so `y(t) = exp(-t) y0`.
    fn stiff_linear() -> ODEProblem {
        let a = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 999.0, -1000.0]);
        let jac = a.clone();
        ODEProblem::new(move |_t, y| &a * y, 0.0, DVector::from_vec(vec![1.0, 1.0]))
            .with_jacobian(move |_t, _y| jac.clone())
    }

    /// Both problems satisfy `y^(k)(0) = (-1)^k y0`.
    fn assert_alternating_derivatives(routine: &dyn InitializationRoutine, ivp: &ODEProblem, q: usize) {
        let prior = PriorProcess::new(q, ivp.y0().len());
        let rv = routine.initialize(ivp, &prior).unwrap();
        let blocks = prior.state_to_derivatives(&rv.mean).unwrap();
        assert_eq!(blocks.len(), q + 1);
        for (k, block) in blocks.iter().enumerate() {
            let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
            let tol = if k == q { 1e-1 } else { 1e-2 };
            for (value, y0_i) in block.iter().zip(ivp.y0().iter()) {
                assert_relative_eq!(*value, sign * y0_i, max_relative = tol);
            }
        }
    }

    #[test]
    fn test_solver_names() {
        assert_eq!(FitSolver::from_str("Radau").unwrap(), FitSolver::Radau);
        assert!(FitSolver::from_str("LSODA").is_err());
        assert_eq!(FitSolver::iter().count(), 3);
        assert_eq!(FitSolver::BDF.to_string(), "BDF");
        assert!(!FitSolver::RK45.is_implicit());
        assert_eq!(FitSolver::Radau.integration_tolerances(1e-8, 1e-10), (1e-8, 1e-10));
        let (rtol, atol) = FitSolver::BDF.integration_tolerances(1e-8, 1e-10);
        assert_relative_eq!(rtol, 1e-12, max_relative = 1e-12);
        assert_relative_eq!(atol, 1e-14, max_relative = 1e-12);
        assert_eq!(FitSolver::BDF.integration_tolerances(1e-13, 1e-15).0, 100.0 * f64::EPSILON);
    }

    #[test]
    fn test_construction_validation() {
        assert!(NonProbabilisticFit::new(FitSolver::RK45, -1e-6, 1e-8).is_err());
        assert!(NonProbabilisticFit::new(FitSolver::RK45, 1e-6, 0.0).is_err());
        assert!(NonProbabilisticFit::new(FitSolver::RK45, f64::NAN, 1e-8).is_err());
        let fit = NonProbabilisticFit::default();
        assert!(fit.with_dt(0.0).is_err());
        assert!(fit.with_num_samples(0).is_err());
        assert!(fit.with_max_steps(0).is_err());
        let fit = fit.with_dt(0.05).unwrap().with_num_samples(6).unwrap();
        assert_eq!(fit.settings().dt(), 0.05);
        assert_eq!(fit.settings().num_samples(), Some(6));
        assert_eq!(NonProbabilisticFitWithJacobian::default().solver(), FitSolver::Radau);
    }

    #[test]
    fn test_monomial_derivative() {
        assert_eq!(monomial_derivative(2.0, 3, 0), 8.0);
        assert_eq!(monomial_derivative(2.0, 3, 1), 12.0);
        assert_eq!(monomial_derivative(2.0, 3, 2), 12.0);
        assert_eq!(monomial_derivative(2.0, 1, 2), 0.0);
    }

    #[test]
    fn test_fit_recovers_exponential_derivatives() {
        let ivp = decay();
        let prior = PriorProcess::new(3, 2);
        let rv = NonProbabilisticFit::default().initialize(&ivp, &prior).unwrap();
        let blocks = prior.state_to_derivatives(&rv.mean).unwrap();
        for (k, block) in blocks.iter().enumerate() {
            let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
            let tol = [1e-12, 1e-12, 1e-3, 5e-2][k];
            assert_relative_eq!(block[0], sign, max_relative = tol);
            assert_relative_eq!(block[1], 2.0 * sign, max_relative = tol);
        }
        assert!(rv.is_exact());
    }

    #[test]
    fn test_every_solver_fits_with_jacobian() {
        let ivp = decay();
        let prior = PriorProcess::new(3, 2);
        for solver in FitSolver::iter() {
            let rv = NonProbabilisticFitWithJacobian::new(solver, 1e-8, 1e-10)
                .unwrap()
                .initialize(&ivp, &prior)
                .unwrap();
            let blocks = prior.state_to_derivatives(&rv.mean).unwrap();
            assert_relative_eq!(blocks[2][0], 1.0, max_relative = 1e-12);
            assert_relative_eq!(blocks[3][0], -1.0, max_relative = 5e-2);
        }
    }

    #[test]
    fn test_high_order_accuracy_for_every_solver() {
        let ivp = decay();
        for q in [4, 5] {
            for solver in FitSolver::iter() {
                let plain = NonProbabilisticFit::new(solver, DEFAULT_RTOL, DEFAULT_ATOL).unwrap();
                assert_alternating_derivatives(&plain, &ivp, q);
                let with_jacobian =
                    NonProbabilisticFitWithJacobian::new(solver, DEFAULT_RTOL, DEFAULT_ATOL).unwrap();
                assert_alternating_derivatives(&with_jacobian, &ivp, q);
            }
            assert_alternating_derivatives(&NonProbabilisticFit::default(), &ivp, q);
            assert_alternating_derivatives(&NonProbabilisticFitWithJacobian::default(), &ivp, q);
        }
    }

    #[test]
    fn test_stiff_problem_with_implicit_solvers() {
        let ivp = stiff_linear();
        for solver in [FitSolver::BDF, FitSolver::Radau] {
            for q in [4, 5] {
                let plain = NonProbabilisticFit::new(solver, DEFAULT_RTOL, DEFAULT_ATOL).unwrap();
                assert_alternating_derivatives(&plain, &ivp, q);
                let with_jacobian =
                    NonProbabilisticFitWithJacobian::new(solver, DEFAULT_RTOL, DEFAULT_ATOL).unwrap();
                assert_alternating_derivatives(&with_jacobian, &ivp, q);
            }
        }
    }

    #[test]
    fn test_low_order_needs_no_integration() {
        let ivp = decay();
        let prior = PriorProcess::new(1, 2);
        let rv = NonProbabilisticFit::default()
            .with_max_steps(1)
            .unwrap()
            .initialize(&ivp, &prior)
            .unwrap();
        for (value, expected) in rv.mean.iter().zip([1.0, 2.0, -1.0, -2.0]) {
            assert_relative_eq!(*value, expected, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_failures() {
        let closure_only = ODEProblem::new(|_t, y| -y.clone(), 0.0, DVector::from_vec(vec![1.0]));
        let prior = PriorProcess::new(3, 1);
        assert!(matches!(
            NonProbabilisticFitWithJacobian::default().initialize(&closure_only, &prior),
            Err(InitError::MissingJacobian(_))
        ));
        let too_few = NonProbabilisticFit::default().with_num_samples(2).unwrap();
        assert!(matches!(
            too_few.initialize(&closure_only, &prior),
            Err(InitError::InvalidConfiguration(_))
        ));
        let starved = NonProbabilisticFit::new(FitSolver::RK45, 1e-12, 1e-14)
            .unwrap()
            .with_dt(1.0)
            .unwrap()
            .with_max_steps(2)
            .unwrap();
        assert!(matches!(
            starved.initialize(&closure_only, &prior),
            Err(InitError::IntegrationFailure(_))
        ));
    }
}
